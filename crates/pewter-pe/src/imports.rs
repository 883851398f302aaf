//! PE import table parsing and `.idata` building.

use log::warn;

use pewter_coff::{DataDirectory, Error, Result, Section};

use crate::rva;

/// Import descriptor size on disk.
pub const IMPORT_DESCRIPTOR_SIZE: usize = 20;

/// An import descriptor (20 bytes) plus its resolved lookup table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImportDescriptor {
    /// RVA of the import lookup table
    pub original_first_thunk: u32,
    /// Time/date stamp
    pub time_date_stamp: u32,
    /// Forwarder chain
    pub forwarder_chain: u32,
    /// RVA of the DLL name
    pub name_rva: u32,
    /// RVA of the import address table
    pub first_thunk: u32,
    /// Resolved DLL name; empty when the name RVA cannot be resolved
    pub dll_name: String,
    /// Resolved lookup-table entries, terminator excluded
    pub imports: Vec<ImportedFunction>,
}

impl ImportDescriptor {
    /// Returns true if this is the all-zero terminator in the fields used
    /// for termination.
    pub fn is_terminator(&self) -> bool {
        self.original_first_thunk == 0 && self.first_thunk == 0
    }
}

/// One resolved import lookup entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImportedFunction {
    /// True for import-by-ordinal entries
    pub by_ordinal: bool,
    /// Ordinal number, valid when `by_ordinal`
    pub ordinal: u16,
    /// Hint into the export name table, valid for by-name entries
    pub hint: u16,
    /// Function name; empty for by-ordinal entries or unresolvable RVAs
    pub name: String,
    /// RVA of this entry's slot in the import address table
    pub iat_rva: u32,
}

/// Decodes one lookup-table entry. The MSB selects import-by-ordinal; the
/// remaining bits are an ordinal or a hint/name RVA.
pub(crate) fn decode_lookup_entry(
    sections: &[Section],
    big_endian: bool,
    entry: u64,
    is_64bit: bool,
    iat_rva: u32,
) -> ImportedFunction {
    let ordinal_flag = if is_64bit { 1u64 << 63 } else { 1u64 << 31 };
    if entry & ordinal_flag != 0 {
        return ImportedFunction {
            by_ordinal: true,
            ordinal: (entry & 0xFFFF) as u16,
            hint: 0,
            name: String::new(),
            iat_rva,
        };
    }

    let hint_name_rva = (entry & 0x7FFF_FFFF) as u32;
    let (hint, name) = match rva::read_u16_at(sections, hint_name_rva, big_endian) {
        Ok(hint) => {
            let name = rva::read_ascii_string_at(sections, hint_name_rva + 2)
                .unwrap_or_default();
            (hint, name)
        }
        Err(_) => {
            warn!(
                "import hint/name rva {:#x} is not in any section",
                hint_name_rva
            );
            (0, String::new())
        }
    };

    ImportedFunction {
        by_ordinal: false,
        ordinal: 0,
        hint,
        name,
        iat_rva,
    }
}

/// Walks a 32- or 64-bit import lookup table until its zero terminator.
pub(crate) fn walk_lookup_table(
    sections: &[Section],
    big_endian: bool,
    table_rva: u32,
    iat_rva: u32,
    is_64bit: bool,
) -> Vec<ImportedFunction> {
    let mut imports = Vec::new();
    let entry_size = if is_64bit { 8u32 } else { 4u32 };
    let mut entry_rva = table_rva;
    let mut slot_rva = iat_rva;

    loop {
        let entry = if is_64bit {
            rva::read_u64_at(sections, entry_rva, big_endian)
        } else {
            rva::read_u32_at(sections, entry_rva, big_endian).map(u64::from)
        };
        let entry = match entry {
            Ok(entry) => entry,
            Err(_) => {
                warn!("import lookup table at {:#x} runs out of section data", entry_rva);
                break;
            }
        };
        if entry == 0 {
            break;
        }

        imports.push(decode_lookup_entry(
            sections, big_endian, entry, is_64bit, slot_rva,
        ));
        entry_rva += entry_size;
        slot_rva += entry_size;
    }

    imports
}

/// Parse the import directory: descriptors until the all-zero terminator,
/// each with its lookup table resolved.
pub(crate) fn parse_imports(
    sections: &[Section],
    big_endian: bool,
    is_64bit: bool,
    dir: DataDirectory,
) -> Vec<ImportDescriptor> {
    let mut descriptors = Vec::new();
    let mut rva = dir.virtual_address;

    loop {
        let field = |off: u32| rva::read_u32_at(sections, rva + off, big_endian);
        let (oft, ts, fwd, name_rva, ft) =
            match (field(0), field(4), field(8), field(12), field(16)) {
                (Ok(a), Ok(b), Ok(c), Ok(d), Ok(e)) => (a, b, c, d, e),
                _ => {
                    warn!("import descriptor at {:#x} is not in any section", rva);
                    break;
                }
            };
        let mut desc = ImportDescriptor {
            original_first_thunk: oft,
            time_date_stamp: ts,
            forwarder_chain: fwd,
            name_rva,
            first_thunk: ft,
            dll_name: String::new(),
            imports: Vec::new(),
        };

        if desc.is_terminator() {
            break;
        }

        desc.dll_name = match rva::read_ascii_string_at(sections, desc.name_rva) {
            Ok(name) => name,
            Err(_) => {
                warn!("import dll name rva {:#x} is not in any section", desc.name_rva);
                String::new()
            }
        };

        // Prefer the lookup table; fall back to the address table when the
        // linker left the lookup table zero.
        let table_rva = if desc.original_first_thunk != 0 {
            desc.original_first_thunk
        } else {
            desc.first_thunk
        };
        desc.imports = walk_lookup_table(
            sections,
            big_endian,
            table_rva,
            desc.first_thunk,
            is_64bit,
        );

        descriptors.push(desc);
        rva += IMPORT_DESCRIPTOR_SIZE as u32;
    }

    descriptors
}

/// One requested import for the `.idata` builder.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ImportRequest {
    /// Import by ordinal
    ByOrdinal(u16),
    /// Import by hint and name
    ByName { hint: u16, name: String },
}

#[derive(Debug, Clone)]
struct DllImports {
    name: String,
    functions: Vec<ImportRequest>,
}

/// Builds `.idata` sections: the descriptor chain, the lookup and address
/// tables, hint/name entries, and DLL name strings.
#[derive(Debug, Clone)]
pub struct IdataBuilder {
    is_64bit: bool,
    dlls: Vec<DllImports>,
}

impl IdataBuilder {
    /// Starts a builder; lookup entries are 8 bytes wide for PE32+.
    pub fn new(is_64bit: bool) -> Self {
        Self {
            is_64bit,
            dlls: Vec::new(),
        }
    }

    /// Starts the import list for another DLL.
    pub fn dll(mut self, name: &str) -> Self {
        self.dlls.push(DllImports {
            name: name.to_string(),
            functions: Vec::new(),
        });
        self
    }

    /// Adds a by-name import to the current DLL.
    pub fn by_name(mut self, hint: u16, name: &str) -> Self {
        if let Some(dll) = self.dlls.last_mut() {
            dll.functions.push(ImportRequest::ByName {
                hint,
                name: name.to_string(),
            });
        }
        self
    }

    /// Adds a by-ordinal import to the current DLL.
    pub fn by_ordinal(mut self, ordinal: u16) -> Self {
        if let Some(dll) = self.dlls.last_mut() {
            dll.functions.push(ImportRequest::ByOrdinal(ordinal));
        }
        self
    }

    fn entry_size(&self) -> u32 {
        if self.is_64bit {
            8
        } else {
            4
        }
    }

    /// Builds the `.idata` section at the given RVA. Returns the section,
    /// the import directory entry, and the import-address-table directory
    /// entry.
    pub fn build_section(
        &self,
        section_rva: u32,
    ) -> Result<(Section, DataDirectory, DataDirectory)> {
        use pewter_coff::section::{
            IMAGE_SCN_CNT_INITIALIZED_DATA, IMAGE_SCN_MEM_READ, IMAGE_SCN_MEM_WRITE,
        };

        if self.dlls.is_empty() {
            return Err(Error::malformed("import", "no DLLs to import from"));
        }

        let entry_size = self.entry_size();
        let descriptor_table = (self.dlls.len() as u32 + 1) * IMPORT_DESCRIPTOR_SIZE as u32;
        let tables: u32 = self
            .dlls
            .iter()
            .map(|d| (d.functions.len() as u32 + 1) * entry_size)
            .sum();

        let ilt_base = section_rva + descriptor_table;
        let iat_base = ilt_base + tables;
        let strings_base = iat_base + tables;

        // Hint/name entries first, then DLL names; hint/name entries are
        // padded to even offsets.
        let mut strings = Vec::new();
        let mut hint_name_rvas: Vec<Vec<Option<u32>>> = Vec::new();
        for dll in &self.dlls {
            let mut rvas = Vec::new();
            for function in &dll.functions {
                match function {
                    ImportRequest::ByOrdinal(_) => rvas.push(None),
                    ImportRequest::ByName { hint, name } => {
                        rvas.push(Some(strings_base + strings.len() as u32));
                        strings.extend_from_slice(&hint.to_le_bytes());
                        strings.extend_from_slice(name.as_bytes());
                        strings.push(0);
                        if strings.len() % 2 != 0 {
                            strings.push(0);
                        }
                    }
                }
            }
            hint_name_rvas.push(rvas);
        }
        let mut dll_name_rvas = Vec::new();
        for dll in &self.dlls {
            dll_name_rvas.push(strings_base + strings.len() as u32);
            strings.extend_from_slice(dll.name.as_bytes());
            strings.push(0);
        }

        let total = (strings_base - section_rva) as usize + strings.len();
        let mut data = vec![0u8; total];
        data[(strings_base - section_rva) as usize..].copy_from_slice(&strings);

        // Lookup and address tables carry identical entries on disk; the
        // loader overwrites the address table at bind time.
        let ordinal_flag: u64 = 1 << (entry_size * 8 - 1);
        let mut table_cursor = 0u32;
        for (dll_index, dll) in self.dlls.iter().enumerate() {
            let ilt_rva = ilt_base + table_cursor;
            let iat_rva = iat_base + table_cursor;

            for (i, function) in dll.functions.iter().enumerate() {
                let entry: u64 = match function {
                    ImportRequest::ByOrdinal(ordinal) => ordinal_flag | *ordinal as u64,
                    ImportRequest::ByName { .. } => {
                        hint_name_rvas[dll_index][i].unwrap_or_default() as u64
                    }
                };
                let off = (ilt_rva - section_rva) as usize + i * entry_size as usize;
                data[off..off + entry_size as usize]
                    .copy_from_slice(&entry.to_le_bytes()[..entry_size as usize]);
                let off = (iat_rva - section_rva) as usize + i * entry_size as usize;
                data[off..off + entry_size as usize]
                    .copy_from_slice(&entry.to_le_bytes()[..entry_size as usize]);
            }

            let descriptor_off = dll_index * IMPORT_DESCRIPTOR_SIZE;
            data[descriptor_off..descriptor_off + 4].copy_from_slice(&ilt_rva.to_le_bytes());
            data[descriptor_off + 12..descriptor_off + 16]
                .copy_from_slice(&dll_name_rvas[dll_index].to_le_bytes());
            data[descriptor_off + 16..descriptor_off + 20]
                .copy_from_slice(&iat_rva.to_le_bytes());

            table_cursor += (dll.functions.len() as u32 + 1) * entry_size;
        }

        let mut section = Section::new(
            ".idata",
            IMAGE_SCN_CNT_INITIALIZED_DATA | IMAGE_SCN_MEM_READ | IMAGE_SCN_MEM_WRITE,
        )?;
        section.header.virtual_address = section_rva;
        section.header.virtual_size = total as u32;
        section.data = data;

        let import_directory = DataDirectory {
            virtual_address: section_rva,
            size: descriptor_table,
        };
        let iat_directory = DataDirectory {
            virtual_address: iat_base,
            size: tables,
        };
        Ok((section, import_directory, iat_directory))
    }
}
