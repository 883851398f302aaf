//! The COFF object file container.
//!
//! A `CoffFile` is the bare container: file header, optional header (absent
//! in practice for objects), section table, symbol table, string table. It
//! shares the section and symbol machinery with the PE layer but has no DOS
//! preamble and no alignment: object files use a file alignment of zero,
//! which means no alignment adjustment at all.

use std::io::{Cursor, Read, Seek, Write};

use log::debug;

use crate::codec::{align_up, ReadExt, WriteExt};
use crate::file_header::FileHeader;
use crate::optional_header::OptionalHeader;
use crate::relocation::{CoffRelocation, LineNumber};
use crate::section::{Section, SectionHeader};
use crate::string_table::StringTable;
use crate::symbol::Symbol;
use crate::{Error, Result};

/// Total number of symbol records, auxiliary records included.
pub fn symbol_record_count(symbols: &[Symbol]) -> u32 {
    symbols.iter().map(Symbol::record_count).sum()
}

/// Walks sections in order, assigning raw-data, relocation, and line-number
/// pointers from `start`, and returns the cursor past the last body byte.
///
/// Raw-data pointers are aligned to `file_alignment` (zero disables
/// alignment); relocation and line-number tables follow unaligned.
/// `size_of_raw_data` is re-derived only when the stored value no longer
/// covers the section data, so an unmodified parse lays out identically.
pub fn layout_section_bodies(
    sections: &mut [Section],
    start: u64,
    file_alignment: u64,
) -> u64 {
    let mut cursor = start;
    for section in sections.iter_mut() {
        if (section.header.size_of_raw_data as usize) < section.data.len() {
            section.header.size_of_raw_data =
                align_up(section.data.len() as u64, file_alignment) as u32;
        }

        if section.header.is_uninitialized() || section.header.size_of_raw_data == 0 {
            section.header.pointer_to_raw_data = 0;
        } else {
            cursor = align_up(cursor, file_alignment);
            section.header.pointer_to_raw_data = cursor as u32;
            cursor += section.header.size_of_raw_data as u64;
        }

        section.header.number_of_relocations = section.relocations.len() as u16;
        if section.relocations.is_empty() {
            section.header.pointer_to_relocations = 0;
        } else {
            section.header.pointer_to_relocations = cursor as u32;
            cursor += section.relocations.len() as u64 * CoffRelocation::SIZE as u64;
        }

        section.header.number_of_line_numbers = section.line_numbers.len() as u16;
        if section.line_numbers.is_empty() {
            section.header.pointer_to_line_numbers = 0;
        } else {
            section.header.pointer_to_line_numbers = cursor as u32;
            cursor += section.line_numbers.len() as u64 * LineNumber::SIZE as u64;
        }
    }
    cursor
}

/// Finds a section that embeds the symbol and string tables in its raw data
/// (the Go linker emits these as a `.symtab` section). Detected by the
/// section's raw-data pointer coinciding with the pre-layout symbol-table
/// pointer.
pub fn detect_embedded_symtab(sections: &[Section], symbol_table_pointer: u32) -> Option<usize> {
    if symbol_table_pointer == 0 {
        return None;
    }
    sections.iter().position(|s| {
        s.name() == ".symtab" && s.header.pointer_to_raw_data == symbol_table_pointer
    })
}

/// A parsed COFF object file.
#[derive(Debug, Clone)]
pub struct CoffFile {
    /// COFF file header
    pub file_header: FileHeader,
    /// Optional header; objects normally carry none
    pub optional_header: Option<OptionalHeader>,
    pub(crate) sections: Vec<Section>,
    pub(crate) symbols: Vec<Symbol>,
    pub(crate) string_table: StringTable,
    pub(crate) layout_suspended: bool,
}

impl CoffFile {
    /// Creates an empty object file for the given machine.
    pub fn new(machine: u16) -> Self {
        Self {
            file_header: FileHeader::new(machine),
            optional_header: None,
            sections: Vec::new(),
            symbols: Vec::new(),
            string_table: StringTable::new(),
            layout_suspended: false,
        }
    }

    /// Parse an object file. Stream offsets are absolute, so the container
    /// must start at position zero.
    pub fn read_from<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let file_header = FileHeader::read_from(r)?;
        debug!(
            "coff: machine {:#06x}, {} sections, {} symbols",
            file_header.machine, file_header.number_of_sections, file_header.number_of_symbols
        );

        let optional_header = if file_header.size_of_optional_header != 0 {
            Some(OptionalHeader::read_from(
                r,
                file_header.size_of_optional_header,
            )?)
        } else {
            None
        };

        let mut sections = Vec::with_capacity(file_header.number_of_sections.min(512) as usize);
        for _ in 0..file_header.number_of_sections {
            sections.push(Section::read_from(r)?);
        }

        let (symbols, string_table) = read_symbol_tables(r, &file_header)?;

        Ok(Self {
            file_header,
            optional_header,
            sections,
            symbols,
            string_table,
            layout_suspended: false,
        })
    }

    /// Parse an object file from a byte slice.
    pub fn parse(data: &[u8]) -> Result<Self> {
        Self::read_from(&mut Cursor::new(data))
    }

    /// Sections in file order.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Mutable access to the sections. Callers editing headers or bodies run
    /// `update_layout` themselves or rely on the final pass in `write`.
    pub fn sections_mut(&mut self) -> &mut Vec<Section> {
        &mut self.sections
    }

    /// Symbol table records.
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// The string table.
    pub fn string_table(&self) -> &StringTable {
        &self.string_table
    }

    /// Mutable access to the string table.
    pub fn string_table_mut(&mut self) -> &mut StringTable {
        &mut self.string_table
    }

    /// Get a section by name.
    pub fn section_by_name(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name() == name)
    }

    /// Appends a section.
    pub fn add_section(&mut self, section: Section) {
        self.sections.push(section);
        self.layout_after_mutation();
    }

    /// Removes the first section with the given name.
    pub fn remove_section(&mut self, name: &str) -> Option<Section> {
        let idx = self.sections.iter().position(|s| s.name() == name)?;
        let section = self.sections.remove(idx);
        self.layout_after_mutation();
        Some(section)
    }

    /// Appends a symbol record.
    pub fn add_symbol(&mut self, symbol: Symbol) {
        self.symbols.push(symbol);
        self.layout_after_mutation();
    }

    /// Removes the symbol at `index`.
    pub fn remove_symbol(&mut self, index: usize) -> Option<Symbol> {
        if index >= self.symbols.len() {
            return None;
        }
        let symbol = self.symbols.remove(index);
        self.layout_after_mutation();
        Some(symbol)
    }

    /// Adds a string to the string table, returning its offset.
    pub fn add_string(&mut self, s: &str) -> u32 {
        let offset = self.string_table.add(s);
        self.layout_after_mutation();
        offset
    }

    /// Removes the string at `offset` from the string table, re-deriving
    /// later offsets. Symbols referencing moved strings are the caller's
    /// responsibility.
    pub fn remove_string(&mut self, offset: u32) -> Option<String> {
        let removed = self.string_table.remove(offset)?;
        self.layout_after_mutation();
        Some(removed)
    }

    /// Appends a relocation to the section at `section_index`.
    pub fn add_relocation(&mut self, section_index: usize, reloc: CoffRelocation) -> Result<()> {
        let section = self
            .sections
            .get_mut(section_index)
            .ok_or_else(|| Error::malformed("relocation", "section index out of bounds"))?;
        section.relocations.push(reloc);
        self.layout_after_mutation();
        Ok(())
    }

    /// Appends a line number to the section at `section_index`.
    pub fn add_line_number(&mut self, section_index: usize, line: LineNumber) -> Result<()> {
        let section = self
            .sections
            .get_mut(section_index)
            .ok_or_else(|| Error::malformed("line number", "section index out of bounds"))?;
        section.line_numbers.push(line);
        self.layout_after_mutation();
        Ok(())
    }

    /// Suspends the implicit layout pass that follows each mutation.
    pub fn suspend_layout(&mut self) {
        self.layout_suspended = true;
    }

    /// Resumes implicit layout and runs one pass immediately.
    pub fn resume_layout(&mut self) {
        self.layout_suspended = false;
        self.update_layout();
    }

    fn layout_after_mutation(&mut self) {
        if !self.layout_suspended {
            self.update_layout();
        }
    }

    /// Recomputes the file layout: section body pointers, header counts, and
    /// the symbol-table pointer. Object files apply no file alignment.
    pub fn update_layout(&mut self) {
        self.sections
            .sort_by_key(|s| s.header.virtual_address);

        self.file_header.number_of_sections = self.sections.len() as u16;
        self.file_header.number_of_symbols = symbol_record_count(&self.symbols);
        self.file_header.size_of_optional_header = self
            .optional_header
            .as_ref()
            .map(|h| h.size() as u16)
            .unwrap_or(0);

        let embedded = detect_embedded_symtab(
            &self.sections,
            self.file_header.pointer_to_symbol_table,
        );

        let headers_end = FileHeader::SIZE as u64
            + self.file_header.size_of_optional_header as u64
            + self.sections.len() as u64 * SectionHeader::SIZE as u64;
        let cursor = layout_section_bodies(&mut self.sections, headers_end, 0);

        self.file_header.pointer_to_symbol_table = if let Some(idx) = embedded {
            self.sections[idx].header.pointer_to_raw_data
        } else if !self.symbols.is_empty() || !self.string_table.is_empty() {
            cursor as u32
        } else {
            0
        };
    }

    /// Serialize the object file. A final layout pass always runs first,
    /// whether or not layout is suspended.
    pub fn write<W: Write + Seek>(&mut self, w: &mut W) -> Result<()> {
        self.update_layout();

        let embedded = detect_embedded_symtab(
            &self.sections,
            self.file_header.pointer_to_symbol_table,
        )
        .is_some();

        self.file_header.write_to(w)?;
        if let Some(header) = &self.optional_header {
            header.write_to(w)?;
        }
        for section in &self.sections {
            section.header.write_to(w)?;
        }
        for section in &self.sections {
            section.write_body(w)?;
        }

        if self.file_header.pointer_to_symbol_table != 0 && !embedded {
            w.pad_to(self.file_header.pointer_to_symbol_table as u64)?;
            for symbol in &self.symbols {
                symbol.write_to(w)?;
            }
            self.string_table.write_to(w)?;
        }

        Ok(())
    }

    /// Serialize the object file to a byte vector.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let mut cur = Cursor::new(Vec::new());
        self.write(&mut cur)?;
        Ok(cur.into_inner())
    }
}

/// Reads the symbol and string tables named by the file header. Returns
/// empty tables when the header carries no symbol-table pointer. The stream
/// position is restored afterwards.
pub fn read_symbol_tables<R: Read + Seek>(
    r: &mut R,
    file_header: &FileHeader,
) -> Result<(Vec<Symbol>, StringTable)> {
    if file_header.pointer_to_symbol_table == 0 {
        return Ok((Vec::new(), StringTable::new()));
    }

    let restore = r.pos()?;
    r.seek_to(file_header.pointer_to_symbol_table as u64)?;

    let mut symbols = Vec::new();
    let mut records = 0u32;
    while records < file_header.number_of_symbols {
        let symbol = Symbol::read_from(r)?;
        records += symbol.record_count();
        symbols.push(symbol);
    }

    // Some producers omit the string table entirely; treat end-of-stream
    // as an empty table.
    let string_table = match StringTable::read_from(r) {
        Ok(table) => table,
        Err(Error::TruncatedStream { .. }) => StringTable::new(),
        Err(e) => return Err(e),
    };

    r.seek_to(restore)?;
    Ok((symbols, string_table))
}
