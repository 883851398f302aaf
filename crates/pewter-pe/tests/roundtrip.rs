//! End-to-end scenarios: build synthetic images with the library's own
//! builders, write them, and parse the result back.

use pewter_coff::file_header::{IMAGE_FILE_MACHINE_AMD64, IMAGE_FILE_MACHINE_I386};
use pewter_coff::optional_header::{
    DataDirectory, DataDirectoryType, OptionalHeader, OptionalHeaderPe32, OptionalHeaderPe32Plus,
};
use pewter_coff::section::{
    Section, IMAGE_SCN_CNT_CODE, IMAGE_SCN_CNT_INITIALIZED_DATA, IMAGE_SCN_MEM_EXECUTE,
    IMAGE_SCN_MEM_READ,
};
use pewter_pe::base_relocs::{
    BaseRelocationBlock, BaseRelocationDirectory, BaseRelocationEntry, BaseRelocationType,
};
use pewter_pe::checksum;
use pewter_pe::exports::EdataBuilder;
use pewter_pe::Image;

fn text_section(rva: u32, fill: u8, len: usize) -> Section {
    let mut section = Section::new(
        ".text",
        IMAGE_SCN_CNT_CODE | IMAGE_SCN_MEM_EXECUTE | IMAGE_SCN_MEM_READ,
    )
    .unwrap();
    section.header.virtual_address = rva;
    section.header.virtual_size = len as u32;
    section.data = vec![fill; len];
    section
}

fn rdata_section(name: &str, rva: u32, data: Vec<u8>) -> Section {
    let mut section =
        Section::new(name, IMAGE_SCN_CNT_INITIALIZED_DATA | IMAGE_SCN_MEM_READ).unwrap();
    section.header.virtual_address = rva;
    section.header.virtual_size = data.len() as u32;
    section.data = data;
    section
}

fn pe32_executable() -> Image {
    let mut image = Image::new(
        IMAGE_FILE_MACHINE_I386,
        OptionalHeader::Pe32(OptionalHeaderPe32::default()),
    );
    image.add_section(text_section(0x1000, 0x90, 0x321));
    image.add_section(rdata_section(".rdata", 0x2000, vec![7u8; 0x44]));
    image
}

fn pe32plus_executable() -> Image {
    let mut image = Image::new(
        IMAGE_FILE_MACHINE_AMD64,
        OptionalHeader::Pe32Plus(OptionalHeaderPe32Plus::default()),
    );
    image.add_section(text_section(0x1000, 0xCC, 0x200));
    image
}

#[test]
fn pe32_executable_roundtrip() {
    let image = pe32_executable();
    let bytes = image.to_bytes().unwrap();

    let parsed = Image::parse(&bytes).unwrap();
    assert_eq!(parsed.optional_header.magic(), 0x10B);
    assert_eq!(parsed.file_header.machine, 0x014C);
    assert_eq!(parsed.optional_header.number_of_rva_and_sizes(), 16);

    assert_eq!(parsed.to_bytes().unwrap(), bytes);
}

#[test]
fn pe32plus_executable_roundtrip() {
    let image = pe32plus_executable();
    let bytes = image.to_bytes().unwrap();

    let parsed = Image::parse(&bytes).unwrap();
    assert_eq!(parsed.optional_header.magic(), 0x20B);
    assert_eq!(parsed.file_header.machine, 0x8664);
    match &parsed.optional_header {
        OptionalHeader::Pe32Plus(h) => {
            assert_eq!(h.size_of_stack_reserve, 0x10_0000u64);
        }
        other => panic!("expected PE32+, got magic {:#x}", other.magic()),
    }

    assert_eq!(parsed.to_bytes().unwrap(), bytes);
}

#[test]
fn odd_sized_file_checksum() {
    // Appending one byte exercises the partial-DWORD zero-padding path.
    let image = pe32_executable();
    let mut bytes = image.to_bytes().unwrap();
    bytes.push(b'x');

    let offset = checksum::checksum_field_offset(u32::from_le_bytes([
        bytes[60], bytes[61], bytes[62], bytes[63],
    ]));
    let direct = checksum::compute(&bytes, offset);

    // The odd byte lands in the overlay, so the parsed image serializes to
    // the same bytes and must agree on the checksum.
    let parsed = Image::parse(&bytes).unwrap();
    assert_eq!(parsed.overlay(), b"x");
    assert_eq!(parsed.calculate_checksum().unwrap(), direct);

    // And the checksum differs from the even-sized original
    let even = image.calculate_checksum().unwrap();
    assert_ne!(direct, even);
}

#[test]
fn export_forward_reference_roundtrip() {
    let mut image = pe32plus_executable();

    let builder = EdataBuilder::new("TESTDATA.dll", 1)
        .export("LocalWork", 1, 0x1010)
        .forward("HeapAlloc", 2, "KERNEL32.HeapAlloc");
    let (edata, directory) = builder.build_section(0x3000).unwrap();
    image.add_section(edata);
    image.set_data_directory(
        DataDirectoryType::ExportTable,
        directory.virtual_address,
        directory.size,
    );

    let bytes = image.to_bytes().unwrap();
    let parsed = Image::parse(&bytes).unwrap();
    let exports = parsed.exports().expect("export table parsed");

    assert_eq!(exports.image_name, "TESTDATA.dll");
    assert_eq!(exports.directory.ordinal_base, 1);
    assert_eq!(exports.symbols.len(), 2);

    let first = &exports.symbols[0];
    assert_eq!(
        (first.name.as_str(), first.ordinal, first.rva),
        ("LocalWork", 1, 0x1010)
    );
    assert!(first.forwarder.is_none());

    let second = &exports.symbols[1];
    assert_eq!(second.name, "HeapAlloc");
    assert_eq!(second.ordinal, 2);
    assert_eq!(second.forwarder.as_deref(), Some("KERNEL32.HeapAlloc"));

    assert_eq!(parsed.to_bytes().unwrap(), bytes);
}

#[test]
fn import_by_ordinal_and_name_64bit() {
    // Hand-build a .idata section: one descriptor whose 64-bit lookup table
    // holds an ordinal import, a hint/name import, and the terminator.
    let base = 0x2000u32;
    let mut idata = vec![0u8; 0x100];
    // descriptor 0: OFT at +0x40, name at +0x90, FT at +0x60
    idata[0x00..0x04].copy_from_slice(&(base + 0x40).to_le_bytes());
    idata[0x0C..0x10].copy_from_slice(&(base + 0x90).to_le_bytes());
    idata[0x10..0x14].copy_from_slice(&(base + 0x60).to_le_bytes());
    // lookup table: ordinal 1, name rva, terminator
    idata[0x40..0x48].copy_from_slice(&0x8000_0000_0000_0001u64.to_le_bytes());
    idata[0x48..0x50].copy_from_slice(&((base + 0x80) as u64).to_le_bytes());
    // hint/name: hint 0x0042, "Foo"
    idata[0x80..0x82].copy_from_slice(&0x0042u16.to_le_bytes());
    idata[0x82..0x86].copy_from_slice(b"Foo\0");
    // dll name
    idata[0x90..0x98].copy_from_slice(b"BAR.dll\0");

    let mut image = pe32plus_executable();
    image.add_section(rdata_section(".idata", base, idata));
    image.set_data_directory(DataDirectoryType::ImportTable, base, 40);

    let bytes = image.to_bytes().unwrap();
    let parsed = Image::parse(&bytes).unwrap();

    assert_eq!(parsed.imports().len(), 1);
    let descriptor = &parsed.imports()[0];
    assert_eq!(descriptor.dll_name, "BAR.dll");
    assert_eq!(descriptor.imports.len(), 2);

    assert!(descriptor.imports[0].by_ordinal);
    assert_eq!(descriptor.imports[0].ordinal, 1);
    assert!(!descriptor.imports[1].by_ordinal);
    assert_eq!(descriptor.imports[1].hint, 0x0042);
    assert_eq!(descriptor.imports[1].name, "Foo");
}

#[test]
fn built_idata_roundtrip() {
    let mut image = pe32plus_executable();

    let builder = pewter_pe::IdataBuilder::new(true)
        .dll("KERNEL32.dll")
        .by_name(0x120, "GetProcAddress")
        .by_ordinal(77);
    let (idata, import_dir, iat_dir) = builder.build_section(0x4000).unwrap();
    image.add_section(idata);
    image.set_data_directory(
        DataDirectoryType::ImportTable,
        import_dir.virtual_address,
        import_dir.size,
    );
    image.set_data_directory(
        DataDirectoryType::ImportAddressTable,
        iat_dir.virtual_address,
        iat_dir.size,
    );

    let bytes = image.to_bytes().unwrap();
    let parsed = Image::parse(&bytes).unwrap();

    assert_eq!(parsed.imports().len(), 1);
    let descriptor = &parsed.imports()[0];
    assert_eq!(descriptor.dll_name, "KERNEL32.dll");
    assert_eq!(descriptor.imports.len(), 2);
    assert_eq!(descriptor.imports[0].name, "GetProcAddress");
    assert_eq!(descriptor.imports[0].hint, 0x120);
    assert!(descriptor.imports[1].by_ordinal);
    assert_eq!(descriptor.imports[1].ordinal, 77);

    // The image also passes structural validation
    let report = parsed.validate();
    assert!(!report.has_errors(), "{:?}", report.issues);

    assert_eq!(parsed.to_bytes().unwrap(), bytes);
}

#[test]
fn reloc_section_roundtrip() {
    let directory = BaseRelocationDirectory {
        blocks: vec![
            BaseRelocationBlock {
                page_rva: 0x1000,
                entries: vec![
                    BaseRelocationEntry::new(BaseRelocationType::Dir64, 0x008),
                    BaseRelocationEntry::new(BaseRelocationType::Dir64, 0x020),
                    BaseRelocationEntry::new(BaseRelocationType::HighLow, 0x100),
                ],
            },
            BaseRelocationBlock {
                page_rva: 0x3000,
                entries: vec![BaseRelocationEntry::new(BaseRelocationType::Dir64, 0xFFF)],
            },
        ],
    };

    let mut image = pe32plus_executable();
    let (reloc, dd) = directory.build_section(0x5000).unwrap();
    image.add_section(reloc);
    image.set_data_directory(DataDirectoryType::BaseRelocationTable, dd.virtual_address, dd.size);

    let bytes = image.to_bytes().unwrap();
    let parsed = Image::parse(&bytes).unwrap();
    let relocs = parsed.base_relocations().expect("reloc directory parsed");

    assert_eq!(relocs.blocks.len(), 2);
    for (built, reparsed) in directory.blocks.iter().zip(&relocs.blocks) {
        assert_eq!(built.page_rva, reparsed.page_rva);
        let built_entries: Vec<(u16, u16)> = built
            .entries
            .iter()
            .filter(|e| !e.is_padding())
            .map(|e| (e.reloc_type().to_u4(), e.offset()))
            .collect();
        let reparsed_entries: Vec<(u16, u16)> = reparsed
            .entries
            .iter()
            .filter(|e| !e.is_padding())
            .map(|e| (e.reloc_type().to_u4(), e.offset()))
            .collect();
        assert_eq!(built_entries, reparsed_entries);
    }
}

#[test]
fn section_for_rva_boundaries() {
    let image = pe32_executable();
    for section in image.sections() {
        let found = image
            .section_for_rva(section.header.virtual_address)
            .expect("start rva resolves");
        assert_eq!(found.name(), section.name());

        let end = section.header.virtual_address + section.header.virtual_size;
        match image.section_for_rva(end) {
            // Either the next section, contiguous in VA space, or nothing
            Some(next) => assert_eq!(next.header.virtual_address, end),
            None => {}
        }
    }
}

#[test]
fn layout_alignment_invariants() {
    let mut image = pe32_executable();
    image.add_section(rdata_section(".odd", 0x5000, vec![1u8; 0x123]));
    image.update_layout();

    let file_alignment = image.optional_header.file_alignment();
    let section_alignment = image.optional_header.section_alignment();
    assert_eq!(image.optional_header.size_of_headers() % file_alignment, 0);
    assert_eq!(image.optional_header.size_of_image() % section_alignment, 0);

    for section in image.sections() {
        if section.header.pointer_to_raw_data != 0 {
            assert_eq!(section.header.pointer_to_raw_data % file_alignment, 0);
        }
    }
}

#[test]
fn inflated_size_of_headers_preserved() {
    let mut image = pe32_executable();
    let inflated = image.optional_header.size_of_headers() + 0x400;
    image.optional_header.set_size_of_headers(inflated);
    image.update_layout();
    assert_eq!(image.optional_header.size_of_headers(), inflated);

    let bytes = image.to_bytes().unwrap();
    let parsed = Image::parse(&bytes).unwrap();
    assert_eq!(parsed.optional_header.size_of_headers(), inflated);
    assert_eq!(parsed.to_bytes().unwrap(), bytes);
}

#[test]
fn certificate_table_after_overlay() {
    let mut image = pe32_executable();
    image.add_certificate(pewter_pe::AttributeCertificate {
        revision: pewter_pe::certificates::WIN_CERT_REVISION_2_0,
        certificate_type: pewter_pe::certificates::WIN_CERT_TYPE_PKCS_SIGNED_DATA,
        data: vec![0x5A; 100],
    });

    let bytes = image.to_bytes().unwrap();
    let parsed = Image::parse(&bytes).unwrap();

    assert_eq!(parsed.certificates().len(), 1);
    assert_eq!(parsed.certificates()[0].data.len(), 100);
    assert!(parsed.overlay().is_empty());

    let dir = parsed
        .optional_header
        .data_directory(DataDirectoryType::CertificateTable)
        .unwrap();
    assert_eq!(dir.virtual_address % 8, 0);

    assert_eq!(parsed.to_bytes().unwrap(), bytes);
}

#[test]
fn add_data_directory_grows_array() {
    let mut image = pe32_executable();
    let before = image.optional_header.number_of_rva_and_sizes();
    let index = image.add_data_directory(DataDirectory {
        virtual_address: 0,
        size: 0,
    });
    assert_eq!(index as u32, before);
    assert_eq!(image.optional_header.number_of_rva_and_sizes(), before + 1);

    // The grown array round-trips and the optional header size follows
    let bytes = image.to_bytes().unwrap();
    let parsed = Image::parse(&bytes).unwrap();
    assert_eq!(parsed.optional_header.number_of_rva_and_sizes(), before + 1);
}
