//! PE delay-load import table parsing.
//!
//! Delay-load descriptors are 32 bytes and chain-terminate like the regular
//! import table, but on the pair of delay address/name table fields. Lookup
//! entries share the regular import encoding.

use log::warn;

use pewter_coff::{DataDirectory, Section};

use crate::imports::{walk_lookup_table, ImportedFunction};
use crate::rva;

/// Delay-load descriptor size on disk.
pub const DELAY_IMPORT_DESCRIPTOR_SIZE: usize = 32;

/// A delay-load import descriptor (32 bytes) plus its resolved name table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DelayLoadDescriptor {
    /// Attributes; bit 0 selects RVA-based fields
    pub attributes: u32,
    /// RVA of the DLL name
    pub name_rva: u32,
    /// RVA of the module handle slot
    pub module_handle_rva: u32,
    /// RVA of the delay import address table
    pub delay_import_address_table: u32,
    /// RVA of the delay import name table
    pub delay_import_name_table: u32,
    /// RVA of the bound delay import table, zero when absent
    pub bound_delay_import_table: u32,
    /// RVA of the unload delay import table, zero when absent
    pub unload_delay_import_table: u32,
    /// Time stamp of the bound DLL
    pub time_date_stamp: u32,
    /// Resolved DLL name; empty when the name RVA cannot be resolved
    pub dll_name: String,
    /// Resolved name-table entries, terminator excluded
    pub imports: Vec<ImportedFunction>,
}

impl DelayLoadDescriptor {
    /// Returns true if this is the all-zero terminator in the fields used
    /// for termination.
    pub fn is_terminator(&self) -> bool {
        self.delay_import_address_table == 0 && self.delay_import_name_table == 0
    }
}

/// Parse the delay-load import directory.
pub(crate) fn parse_delay_imports(
    sections: &[Section],
    big_endian: bool,
    is_64bit: bool,
    dir: DataDirectory,
) -> Vec<DelayLoadDescriptor> {
    let mut descriptors = Vec::new();
    let mut rva = dir.virtual_address;

    loop {
        let field = |off: u32| rva::read_u32_at(sections, rva + off, big_endian);
        let fields = (
            field(0),
            field(4),
            field(8),
            field(12),
            field(16),
            field(20),
            field(24),
            field(28),
        );
        let (attrs, name_rva, handle, iat, int, bound, unload, ts) = match fields {
            (Ok(a), Ok(b), Ok(c), Ok(d), Ok(e), Ok(f), Ok(g), Ok(h)) => {
                (a, b, c, d, e, f, g, h)
            }
            _ => {
                warn!("delay import descriptor at {:#x} is not in any section", rva);
                break;
            }
        };

        let mut desc = DelayLoadDescriptor {
            attributes: attrs,
            name_rva,
            module_handle_rva: handle,
            delay_import_address_table: iat,
            delay_import_name_table: int,
            bound_delay_import_table: bound,
            unload_delay_import_table: unload,
            time_date_stamp: ts,
            dll_name: String::new(),
            imports: Vec::new(),
        };

        if desc.is_terminator() {
            break;
        }

        desc.dll_name = match rva::read_ascii_string_at(sections, desc.name_rva) {
            Ok(name) => name,
            Err(_) => {
                warn!(
                    "delay import dll name rva {:#x} is not in any section",
                    desc.name_rva
                );
                String::new()
            }
        };

        desc.imports = walk_lookup_table(
            sections,
            big_endian,
            desc.delay_import_name_table,
            desc.delay_import_address_table,
            is_64bit,
        );

        descriptors.push(desc);
        rva += DELAY_IMPORT_DESCRIPTOR_SIZE as u32;
    }

    descriptors
}
