//! Property-based tests for the PE image parser and writer.
//!
//! These verify that parsing handles arbitrary input safely, that parsing
//! is deterministic, and that build/emit/parse cycles preserve structure.

use proptest::prelude::*;

use pewter_coff::file_header::IMAGE_FILE_MACHINE_AMD64;
use pewter_coff::optional_header::{
    DataDirectoryType, OptionalHeader, OptionalHeaderPe32Plus,
};
use pewter_coff::section::{
    Section, IMAGE_SCN_CNT_CODE, IMAGE_SCN_CNT_INITIALIZED_DATA, IMAGE_SCN_MEM_EXECUTE,
    IMAGE_SCN_MEM_READ,
};
use pewter_pe::base_relocs::{
    BaseRelocationBlock, BaseRelocationDirectory, BaseRelocationEntry, BaseRelocationType,
};
use pewter_pe::Image;

fn base_image(code: Vec<u8>) -> Image {
    let mut image = Image::new(
        IMAGE_FILE_MACHINE_AMD64,
        OptionalHeader::Pe32Plus(OptionalHeaderPe32Plus::default()),
    );
    let mut text = Section::new(
        ".text",
        IMAGE_SCN_CNT_CODE | IMAGE_SCN_MEM_EXECUTE | IMAGE_SCN_MEM_READ,
    )
    .unwrap();
    text.header.virtual_address = 0x1000;
    text.header.virtual_size = code.len().max(1) as u32;
    text.data = code;
    image.add_section(text);
    image
}

fn reloc_entry_strategy() -> impl Strategy<Value = BaseRelocationEntry> {
    (1u16..=10, 0u16..0x1000).prop_map(|(ty, off)| {
        BaseRelocationEntry::new(BaseRelocationType::from_u4(ty), off)
    })
}

fn reloc_block_strategy() -> impl Strategy<Value = BaseRelocationBlock> {
    (
        (1u32..0x800).prop_map(|page| page * 0x1000),
        prop::collection::vec(reloc_entry_strategy(), 1..24),
    )
        .prop_map(|(page_rva, entries)| BaseRelocationBlock { page_rva, entries })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    /// PE parsing never panics on arbitrary input.
    #[test]
    fn image_parse_never_panics(data in prop::collection::vec(any::<u8>(), 0..1024)) {
        // This should not panic - errors are fine
        let _ = Image::parse(&data);
    }

    /// PE parsing is deterministic.
    #[test]
    fn image_parse_is_deterministic(data in prop::collection::vec(any::<u8>(), 64..512)) {
        let result1 = Image::parse(&data);
        let result2 = Image::parse(&data);

        match (result1, result2) {
            (Ok(a), Ok(b)) => {
                prop_assert_eq!(a.file_header.machine, b.file_header.machine);
                prop_assert_eq!(a.sections().len(), b.sections().len());
                // Emission honors the claimed header size; bound it so a
                // malformed parse cannot balloon the output buffer
                if a.optional_header.size_of_headers() < 0x0010_0000 {
                    prop_assert_eq!(a.to_bytes().unwrap(), b.to_bytes().unwrap());
                }
            }
            (Err(_), Err(_)) => {}
            _ => prop_assert!(false, "results should be consistent"),
        }
    }

    /// A built image survives a write/parse/write cycle byte-identically.
    #[test]
    fn built_image_roundtrips(code in prop::collection::vec(any::<u8>(), 1..512)) {
        let image = base_image(code);
        let bytes = image.to_bytes().unwrap();
        let parsed = Image::parse(&bytes).unwrap();
        prop_assert_eq!(parsed.to_bytes().unwrap(), bytes);
    }

    /// Arbitrary overlay bytes are preserved through a round trip.
    #[test]
    fn overlay_roundtrips(
        code in prop::collection::vec(any::<u8>(), 1..64),
        overlay in prop::collection::vec(any::<u8>(), 1..64),
    ) {
        // A short all-zero tail is certificate alignment padding only when a
        // certificate table exists; with none, it stays overlay.
        let image = base_image(code);
        let mut bytes = image.to_bytes().unwrap();
        bytes.extend_from_slice(&overlay);

        let parsed = Image::parse(&bytes).unwrap();
        prop_assert_eq!(parsed.overlay(), &overlay[..]);
        prop_assert_eq!(parsed.to_bytes().unwrap(), bytes);
    }

    /// Building a .reloc section from arbitrary blocks and reparsing the
    /// image reproduces every non-padding entry in order.
    #[test]
    fn reloc_blocks_roundtrip(blocks in prop::collection::vec(reloc_block_strategy(), 1..6)) {
        let directory = BaseRelocationDirectory { blocks };

        let mut image = base_image(vec![0x90; 32]);
        // Place .reloc past every generated page RVA
        let (section, dd) = directory.build_section(0x0080_1000).unwrap();
        image.add_section(section);
        image.set_data_directory(
            DataDirectoryType::BaseRelocationTable,
            dd.virtual_address,
            dd.size,
        );

        let bytes = image.to_bytes().unwrap();
        let parsed = Image::parse(&bytes).unwrap();
        let reparsed = parsed.base_relocations().expect("reloc directory parsed");

        prop_assert_eq!(reparsed.blocks.len(), directory.blocks.len());
        for (built, got) in directory.blocks.iter().zip(&reparsed.blocks) {
            prop_assert_eq!(built.page_rva, got.page_rva);
            let built_entries: Vec<u16> = built
                .entries
                .iter()
                .filter(|e| !e.is_padding())
                .map(|e| e.value)
                .collect();
            let got_entries: Vec<u16> = got
                .entries
                .iter()
                .filter(|e| !e.is_padding())
                .map(|e| e.value)
                .collect();
            prop_assert_eq!(built_entries, got_entries);
        }
    }

    /// Every section resolves its own start RVA.
    #[test]
    fn section_for_rva_resolves_start(code in prop::collection::vec(any::<u8>(), 1..256)) {
        let image = base_image(code);
        for section in image.sections() {
            let found = image.section_for_rva(section.header.virtual_address);
            prop_assert!(found.is_some());
        }
    }

    /// Layout alignment invariants hold after update_layout.
    #[test]
    fn layout_alignment_holds(
        code in prop::collection::vec(any::<u8>(), 1..2048),
        extra in prop::collection::vec(any::<u8>(), 1..2048),
    ) {
        let mut image = base_image(code);
        let mut section =
            Section::new(".extra", IMAGE_SCN_CNT_INITIALIZED_DATA | IMAGE_SCN_MEM_READ).unwrap();
        section.header.virtual_address = 0x0010_0000;
        section.header.virtual_size = extra.len() as u32;
        section.data = extra;
        image.add_section(section);
        image.update_layout();

        let file_alignment = image.optional_header.file_alignment();
        let section_alignment = image.optional_header.section_alignment();
        prop_assert_eq!(image.optional_header.size_of_headers() % file_alignment, 0);
        prop_assert_eq!(image.optional_header.size_of_image() % section_alignment, 0);
    }
}
