//! The PE layout engine.
//!
//! Emission re-derives every interdependent offset and size: section body
//! pointers, header sizes, the image size, and the symbol-table pointer.
//! The walk is deterministic, so laying out an unmodified parse reproduces
//! the pointers a well-formed input already carries.

use pewter_coff::object::{detect_embedded_symtab, layout_section_bodies, symbol_record_count};
use pewter_coff::section::SectionHeader;
use pewter_coff::{align_up, FileHeader, StringTable, Symbol};

use crate::dos::DosHeader;
use crate::image::Image;

/// Where the layout pass left the image.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LayoutResult {
    /// File offset one past the last section body, symbol table, and
    /// string table; the overlay begins here.
    pub end: u64,
    /// True when the symbol and string tables live inside a `.symtab`
    /// section and must not be emitted a second time.
    pub symbols_embedded: bool,
}

/// Size of the symbol and string tables on disk.
fn symbol_tables_size(symbols: &[Symbol], strings: &StringTable) -> u64 {
    symbol_record_count(symbols) as u64 * Symbol::SIZE as u64 + strings.disk_size() as u64
}

/// Recomputes the full image layout in place.
pub(crate) fn update_image_layout(image: &mut Image) -> LayoutResult {
    image
        .sections
        .sort_by_key(|s| s.header.virtual_address);

    image.dos_header.e_lfanew = (DosHeader::SIZE + image.dos_stub.len()) as u32;
    image.file_header.number_of_sections = image.sections.len() as u16;
    image.file_header.number_of_symbols = symbol_record_count(&image.symbols);
    image.file_header.size_of_optional_header = image.optional_header.size() as u16;

    let file_alignment = image.optional_header.file_alignment() as u64;
    let section_alignment = image.optional_header.section_alignment() as u64;

    if let Some(first_code) = image
        .sections
        .iter()
        .find(|s| s.header.is_code())
        .or_else(|| image.sections.first())
    {
        image
            .optional_header
            .set_base_of_code(first_code.header.virtual_address);
    }

    // Headers end after the section table; some toolchains inflate
    // size_of_headers beyond that, which is preserved.
    let headers_end = image.dos_header.e_lfanew as u64
        + 4
        + FileHeader::SIZE as u64
        + image.file_header.size_of_optional_header as u64
        + image.sections.len() as u64 * SectionHeader::SIZE as u64;
    let size_of_headers = align_up(headers_end, file_alignment)
        .max(image.optional_header.size_of_headers() as u64);
    image.optional_header.set_size_of_headers(size_of_headers as u32);

    if let Some(last) = image.sections.last() {
        let image_end = align_up(last.virtual_end(), section_alignment);
        image.optional_header.set_size_of_image(image_end as u32);
    }

    let embedded = detect_embedded_symtab(
        &image.sections,
        image.file_header.pointer_to_symbol_table,
    );

    let mut cursor = layout_section_bodies(&mut image.sections, size_of_headers, file_alignment);

    let symbols_embedded = embedded.is_some();
    image.file_header.pointer_to_symbol_table = if let Some(idx) = embedded {
        image.sections[idx].header.pointer_to_raw_data
    } else if !image.symbols.is_empty() || !image.string_table.is_empty() {
        let pointer = cursor as u32;
        cursor += symbol_tables_size(&image.symbols, &image.string_table);
        pointer
    } else {
        0
    };

    LayoutResult {
        end: cursor,
        symbols_embedded,
    }
}
