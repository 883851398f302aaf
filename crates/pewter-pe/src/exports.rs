//! PE export directory parsing and `.edata` building.

use log::warn;

use pewter_coff::section::{IMAGE_SCN_CNT_INITIALIZED_DATA, IMAGE_SCN_MEM_READ};
use pewter_coff::{DataDirectory, Error, Result, Section};

use crate::rva;

/// Export directory header size on disk.
pub const EXPORT_DIRECTORY_SIZE: usize = 40;

/// The export directory header (40 bytes).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExportDirectory {
    /// Export flags, reserved
    pub characteristics: u32,
    /// Time/date stamp
    pub time_date_stamp: u32,
    /// Major version
    pub major_version: u16,
    /// Minor version
    pub minor_version: u16,
    /// RVA of the image name
    pub name_rva: u32,
    /// Starting ordinal number
    pub ordinal_base: u32,
    /// Entries in the export address table
    pub number_of_functions: u32,
    /// Entries in the name pointer and ordinal tables
    pub number_of_names: u32,
    /// RVA of the export address table
    pub address_of_functions: u32,
    /// RVA of the export name pointer table
    pub address_of_names: u32,
    /// RVA of the export ordinal table
    pub address_of_name_ordinals: u32,
}

/// One exported symbol, constructed per name-pointer index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExportedSymbol {
    /// Export name
    pub name: String,
    /// Biased ordinal (`ordinal_table[i] + ordinal_base`)
    pub ordinal: u32,
    /// Export address table entry
    pub rva: u32,
    /// Referenced name when the entry is a forward reference
    /// (`"KERNEL32.HeapAlloc"`-style), None for plain exports
    pub forwarder: Option<String>,
}

/// The parsed export table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExportTable {
    /// The directory header
    pub directory: ExportDirectory,
    /// Resolved image name
    pub image_name: String,
    /// Exported symbols in name-pointer order
    pub symbols: Vec<ExportedSymbol>,
}

/// Parse the export directory. Returns None when the directory header is
/// unreadable; individual table anomalies are recovered per entry.
pub(crate) fn parse_exports(
    sections: &[Section],
    big_endian: bool,
    dir: DataDirectory,
) -> Option<ExportTable> {
    let base = dir.virtual_address;
    let field = |off: u32| rva::read_u32_at(sections, base + off, big_endian);
    let word = |off: u32| rva::read_u16_at(sections, base + off, big_endian);

    let directory = ExportDirectory {
        characteristics: field(0).ok()?,
        time_date_stamp: field(4).ok()?,
        major_version: word(8).ok()?,
        minor_version: word(10).ok()?,
        name_rva: field(12).ok()?,
        ordinal_base: field(16).ok()?,
        number_of_functions: field(20).ok()?,
        number_of_names: field(24).ok()?,
        address_of_functions: field(28).ok()?,
        address_of_names: field(32).ok()?,
        address_of_name_ordinals: field(36).ok()?,
    };

    let image_name = rva::read_ascii_string_at(sections, directory.name_rva).unwrap_or_default();

    // Forward references are EAT entries whose RVA lands back inside the
    // section holding the export directory.
    let (fwd_start, fwd_end) = match rva::section_for_rva(sections, base) {
        Some(section) => (
            section.header.virtual_address,
            section.virtual_end() as u32,
        ),
        None => (base, base.wrapping_add(dir.size)),
    };

    let mut symbols = Vec::new();
    for i in 0..directory.number_of_names {
        let name_ptr =
            match rva::read_u32_at(sections, directory.address_of_names + i * 4, big_endian) {
                Ok(ptr) => ptr,
                Err(_) => {
                    warn!("export name pointer table truncated at index {}", i);
                    break;
                }
            };
        let index = match rva::read_u16_at(
            sections,
            directory.address_of_name_ordinals + i * 2,
            big_endian,
        ) {
            Ok(index) => index,
            Err(_) => {
                warn!("export ordinal table truncated at index {}", i);
                break;
            }
        };

        let entry_rva = rva::read_u32_at(
            sections,
            directory.address_of_functions + index as u32 * 4,
            big_endian,
        )
        .unwrap_or_default();
        let name = rva::read_ascii_string_at(sections, name_ptr).unwrap_or_default();

        let forwarder = if entry_rva >= fwd_start && entry_rva < fwd_end {
            Some(rva::read_ascii_string_at(sections, entry_rva).unwrap_or_default())
        } else {
            None
        };

        symbols.push(ExportedSymbol {
            name,
            ordinal: index as u32 + directory.ordinal_base,
            rva: entry_rva,
            forwarder,
        });
    }

    Some(ExportTable {
        directory,
        image_name,
        symbols,
    })
}

/// Builds `.edata` sections from a list of exported symbols.
///
/// Strings are written first at the known post-table offset, recording their
/// RVAs; the address, name-pointer, and ordinal tables are then filled in.
/// Ordinals are stored unbiased on disk.
#[derive(Debug, Clone)]
pub struct EdataBuilder {
    image_name: String,
    ordinal_base: u32,
    time_date_stamp: u32,
    symbols: Vec<ExportedSymbol>,
}

impl EdataBuilder {
    /// Starts a builder for the given image name and ordinal base.
    pub fn new(image_name: &str, ordinal_base: u32) -> Self {
        Self {
            image_name: image_name.to_string(),
            ordinal_base,
            time_date_stamp: 0,
            symbols: Vec::new(),
        }
    }

    /// Sets the directory time stamp.
    pub fn time_date_stamp(mut self, timestamp: u32) -> Self {
        self.time_date_stamp = timestamp;
        self
    }

    /// Adds a plain export.
    pub fn export(mut self, name: &str, ordinal: u32, rva: u32) -> Self {
        self.symbols.push(ExportedSymbol {
            name: name.to_string(),
            ordinal,
            rva,
            forwarder: None,
        });
        self
    }

    /// Adds a forward reference (`"KERNEL32.HeapAlloc"`-style).
    pub fn forward(mut self, name: &str, ordinal: u32, reference: &str) -> Self {
        self.symbols.push(ExportedSymbol {
            name: name.to_string(),
            ordinal,
            rva: 0,
            forwarder: Some(reference.to_string()),
        });
        self
    }

    /// Total virtual size of the section this builder produces.
    pub fn size(&self) -> usize {
        let n = self.symbols.len();
        EXPORT_DIRECTORY_SIZE
            + 8 * n
            + 2 * n
            + self.image_name.len()
            + 1
            + self
                .symbols
                .iter()
                .map(|s| s.name.len() + 1)
                .sum::<usize>()
            + self
                .symbols
                .iter()
                .filter_map(|s| s.forwarder.as_ref())
                .map(|f| f.len() + 1)
                .sum::<usize>()
    }

    /// Builds the `.edata` section at the given RVA, returning the section
    /// and the directory entry describing it.
    pub fn build_section(&self, section_rva: u32) -> Result<(Section, DataDirectory)> {
        let n = self.symbols.len() as u32;
        for symbol in &self.symbols {
            let index = symbol.ordinal.wrapping_sub(self.ordinal_base);
            if index >= n {
                return Err(Error::malformed(
                    "export",
                    format!(
                        "ordinal {} outside the table for base {} and {} symbols",
                        symbol.ordinal, self.ordinal_base, n
                    ),
                ));
            }
        }

        let eat_rva = section_rva + EXPORT_DIRECTORY_SIZE as u32;
        let npt_rva = eat_rva + 4 * n;
        let ot_rva = npt_rva + 4 * n;
        let strings_rva = ot_rva + 2 * n;

        let total = self.size();
        let mut data = vec![0u8; total];
        let base = section_rva as usize;

        // Strings first, recording RVAs as they land
        let mut cursor = (strings_rva - section_rva) as usize;
        let put_string = |data: &mut Vec<u8>, cursor: &mut usize, s: &str| -> u32 {
            let rva = section_rva + *cursor as u32;
            data[*cursor..*cursor + s.len()].copy_from_slice(s.as_bytes());
            *cursor += s.len() + 1;
            rva
        };

        let image_name_rva = put_string(&mut data, &mut cursor, &self.image_name);
        let mut name_rvas = Vec::with_capacity(self.symbols.len());
        for symbol in &self.symbols {
            name_rvas.push(put_string(&mut data, &mut cursor, &symbol.name));
        }
        let mut forward_rvas = Vec::with_capacity(self.symbols.len());
        for symbol in &self.symbols {
            forward_rvas.push(
                symbol
                    .forwarder
                    .as_ref()
                    .map(|f| put_string(&mut data, &mut cursor, f)),
            );
        }

        // Directory header
        let put_u32 = |data: &mut Vec<u8>, rva: u32, v: u32| {
            let off = rva as usize - base;
            data[off..off + 4].copy_from_slice(&v.to_le_bytes());
        };
        let put_u16 = |data: &mut Vec<u8>, rva: u32, v: u16| {
            let off = rva as usize - base;
            data[off..off + 2].copy_from_slice(&v.to_le_bytes());
        };

        put_u32(&mut data, section_rva + 4, self.time_date_stamp);
        put_u32(&mut data, section_rva + 12, image_name_rva);
        put_u32(&mut data, section_rva + 16, self.ordinal_base);
        put_u32(&mut data, section_rva + 20, n);
        put_u32(&mut data, section_rva + 24, n);
        put_u32(&mut data, section_rva + 28, eat_rva);
        put_u32(&mut data, section_rva + 32, npt_rva);
        put_u32(&mut data, section_rva + 36, ot_rva);

        // Address, name-pointer, and ordinal tables
        for (i, symbol) in self.symbols.iter().enumerate() {
            let index = symbol.ordinal - self.ordinal_base;
            let entry = match forward_rvas[i] {
                Some(fwd_rva) => fwd_rva,
                None => symbol.rva,
            };
            put_u32(&mut data, eat_rva + 4 * index, entry);
            put_u32(&mut data, npt_rva + 4 * i as u32, name_rvas[i]);
            put_u16(&mut data, ot_rva + 2 * i as u32, index as u16);
        }

        let mut section = Section::new(".edata", IMAGE_SCN_CNT_INITIALIZED_DATA | IMAGE_SCN_MEM_READ)?;
        section.header.virtual_address = section_rva;
        section.header.virtual_size = total as u32;
        section.data = data;

        let directory = DataDirectory {
            virtual_address: section_rva,
            size: total as u32,
        };
        Ok((section, directory))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_then_parse() {
        let builder = EdataBuilder::new("SAMPLE.dll", 1)
            .export("DoWork", 1, 0x1100)
            .forward("HeapAlloc", 2, "KERNEL32.HeapAlloc");

        let (section, dir) = builder.build_section(0x3000).unwrap();
        assert_eq!(dir.virtual_address, 0x3000);
        assert_eq!(dir.size as usize, builder.size());

        let sections = vec![section];
        let table = parse_exports(&sections, false, dir).unwrap();

        assert_eq!(table.image_name, "SAMPLE.dll");
        assert_eq!(table.directory.ordinal_base, 1);
        assert_eq!(table.directory.number_of_functions, 2);
        assert_eq!(table.symbols.len(), 2);

        assert_eq!(table.symbols[0].name, "DoWork");
        assert_eq!(table.symbols[0].ordinal, 1);
        assert_eq!(table.symbols[0].rva, 0x1100);
        assert!(table.symbols[0].forwarder.is_none());

        assert_eq!(table.symbols[1].name, "HeapAlloc");
        assert_eq!(table.symbols[1].ordinal, 2);
        assert_eq!(
            table.symbols[1].forwarder.as_deref(),
            Some("KERNEL32.HeapAlloc")
        );
    }

    #[test]
    fn test_ordinal_outside_table_rejected() {
        let builder = EdataBuilder::new("X.dll", 1).export("f", 5, 0x1000);
        assert!(matches!(
            builder.build_section(0x3000),
            Err(Error::MalformedDirectory { .. })
        ));
    }

    #[test]
    fn test_ordinals_stored_unbiased() {
        let builder = EdataBuilder::new("X.dll", 10).export("f", 10, 0x1000);
        let (section, _) = builder.build_section(0x3000).unwrap();
        // Ordinal table entry is ordinal - base = 0
        let ot_off = EXPORT_DIRECTORY_SIZE + 8;
        assert_eq!(
            u16::from_le_bytes([section.data[ot_off], section.data[ot_off + 1]]),
            0
        );
    }
}
