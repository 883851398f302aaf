//! Section headers and section bodies.
//!
//! A section owns its raw data plus its relocation and line-number tables.
//! Bodies live at file offsets recorded in the header; reading seeks out to
//! each pointer and restores the stream so the next header can be read
//! sequentially.

use std::io::{Read, Seek, Write};

use crate::codec::{read_vec, ReadExt, WriteExt};
use crate::relocation::{CoffRelocation, LineNumber};
use crate::{Error, Result};

/// Section characteristics
pub const IMAGE_SCN_TYPE_NO_PAD: u32 = 0x0000_0008;
pub const IMAGE_SCN_CNT_CODE: u32 = 0x0000_0020;
pub const IMAGE_SCN_CNT_INITIALIZED_DATA: u32 = 0x0000_0040;
pub const IMAGE_SCN_CNT_UNINITIALIZED_DATA: u32 = 0x0000_0080;
pub const IMAGE_SCN_LNK_INFO: u32 = 0x0000_0200;
pub const IMAGE_SCN_LNK_REMOVE: u32 = 0x0000_0800;
pub const IMAGE_SCN_LNK_COMDAT: u32 = 0x0000_1000;
pub const IMAGE_SCN_GPREL: u32 = 0x0000_8000;
pub const IMAGE_SCN_LNK_NRELOC_OVFL: u32 = 0x0100_0000;
pub const IMAGE_SCN_MEM_DISCARDABLE: u32 = 0x0200_0000;
pub const IMAGE_SCN_MEM_NOT_CACHED: u32 = 0x0400_0000;
pub const IMAGE_SCN_MEM_NOT_PAGED: u32 = 0x0800_0000;
pub const IMAGE_SCN_MEM_SHARED: u32 = 0x1000_0000;
pub const IMAGE_SCN_MEM_EXECUTE: u32 = 0x2000_0000;
pub const IMAGE_SCN_MEM_READ: u32 = 0x4000_0000;
pub const IMAGE_SCN_MEM_WRITE: u32 = 0x8000_0000;

/// Section header (40 bytes)
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SectionHeader {
    /// Section name, at most 8 ASCII bytes
    name: String,
    /// Size of the section once loaded
    pub virtual_size: u32,
    /// RVA of the section
    pub virtual_address: u32,
    /// Size of the initialized data on disk
    pub size_of_raw_data: u32,
    /// File offset of the raw data, zero when absent
    pub pointer_to_raw_data: u32,
    /// File offset of the relocation table, zero when absent
    pub pointer_to_relocations: u32,
    /// File offset of the line-number table, zero when absent
    pub pointer_to_line_numbers: u32,
    /// Number of relocation records
    pub number_of_relocations: u16,
    /// Number of line-number records
    pub number_of_line_numbers: u16,
    /// Characteristics flags
    pub characteristics: u32,
}

impl SectionHeader {
    /// Size of a section header in bytes.
    pub const SIZE: usize = 40;
    /// Maximum inline section name length.
    pub const MAX_NAME_LEN: usize = 8;

    /// Creates an empty header with the given name.
    pub fn new(name: &str) -> Result<Self> {
        let mut header = Self {
            name: String::new(),
            virtual_size: 0,
            virtual_address: 0,
            size_of_raw_data: 0,
            pointer_to_raw_data: 0,
            pointer_to_relocations: 0,
            pointer_to_line_numbers: 0,
            number_of_relocations: 0,
            number_of_line_numbers: 0,
            characteristics: 0,
        };
        header.set_name(name)?;
        Ok(header)
    }

    /// Section name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets the section name. Long names via string-table `/<offset>`
    /// indirection are not supported on write, so anything over 8 ASCII
    /// bytes is rejected.
    pub fn set_name(&mut self, name: &str) -> Result<()> {
        if name.len() > Self::MAX_NAME_LEN || !name.is_ascii() {
            return Err(Error::BadSectionName(name.to_string()));
        }
        self.name = name.to_string();
        Ok(())
    }

    /// Parse a section header from the current stream position.
    pub fn read_from<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let mut buf = [0u8; Self::SIZE];
        r.read_exact_ctx(&mut buf, "section header")?;

        let name_end = buf[..8].iter().position(|&b| b == 0).unwrap_or(8);
        let name = String::from_utf8_lossy(&buf[..name_end]).into_owned();

        Ok(Self {
            name,
            virtual_size: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            virtual_address: u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]),
            size_of_raw_data: u32::from_le_bytes([buf[16], buf[17], buf[18], buf[19]]),
            pointer_to_raw_data: u32::from_le_bytes([buf[20], buf[21], buf[22], buf[23]]),
            pointer_to_relocations: u32::from_le_bytes([buf[24], buf[25], buf[26], buf[27]]),
            pointer_to_line_numbers: u32::from_le_bytes([buf[28], buf[29], buf[30], buf[31]]),
            number_of_relocations: u16::from_le_bytes([buf[32], buf[33]]),
            number_of_line_numbers: u16::from_le_bytes([buf[34], buf[35]]),
            characteristics: u32::from_le_bytes([buf[36], buf[37], buf[38], buf[39]]),
        })
    }

    /// Write the header at the current stream position.
    pub fn write_to<W: Write + Seek>(&self, w: &mut W) -> Result<()> {
        w.write_fixed_ascii(&self.name, 8)?;
        w.write_u32(self.virtual_size)?;
        w.write_u32(self.virtual_address)?;
        w.write_u32(self.size_of_raw_data)?;
        w.write_u32(self.pointer_to_raw_data)?;
        w.write_u32(self.pointer_to_relocations)?;
        w.write_u32(self.pointer_to_line_numbers)?;
        w.write_u16(self.number_of_relocations)?;
        w.write_u16(self.number_of_line_numbers)?;
        w.write_u32(self.characteristics)?;
        Ok(())
    }

    /// Returns true if this section contains code.
    pub fn is_code(&self) -> bool {
        self.characteristics & IMAGE_SCN_CNT_CODE != 0
    }

    /// Returns true if this section holds no initialized data (`.bss`).
    pub fn is_uninitialized(&self) -> bool {
        self.characteristics & IMAGE_SCN_CNT_UNINITIALIZED_DATA != 0
    }

    /// Returns true if this section is executable.
    pub fn is_executable(&self) -> bool {
        self.characteristics & IMAGE_SCN_MEM_EXECUTE != 0
    }

    /// Returns true if this section is readable.
    pub fn is_readable(&self) -> bool {
        self.characteristics & IMAGE_SCN_MEM_READ != 0
    }

    /// Returns true if this section is writable.
    pub fn is_writable(&self) -> bool {
        self.characteristics & IMAGE_SCN_MEM_WRITE != 0
    }

    /// Returns true if `rva` falls within `[virtual_address,
    /// virtual_address + virtual_size)`.
    pub fn contains_rva(&self, rva: u32) -> bool {
        rva >= self.virtual_address
            && (rva as u64) < self.virtual_address as u64 + self.virtual_size as u64
    }

    /// Get flags string (R/W/X)
    pub fn flags_string(&self) -> String {
        let mut flags = String::with_capacity(3);
        flags.push(if self.is_readable() { 'R' } else { '-' });
        flags.push(if self.is_writable() { 'W' } else { '-' });
        flags.push(if self.is_executable() { 'X' } else { '-' });
        flags
    }
}

/// A section with its owned body tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Section header
    pub header: SectionHeader,
    /// Raw data; padded to `size_of_raw_data` on write
    pub data: Vec<u8>,
    /// Relocation table
    pub relocations: Vec<CoffRelocation>,
    /// Line-number table
    pub line_numbers: Vec<LineNumber>,
}

impl Section {
    /// Creates an empty section with the given name and characteristics.
    pub fn new(name: &str, characteristics: u32) -> Result<Self> {
        let mut header = SectionHeader::new(name)?;
        header.characteristics = characteristics;
        Ok(Self {
            header,
            data: Vec::new(),
            relocations: Vec::new(),
            line_numbers: Vec::new(),
        })
    }

    /// Section name.
    pub fn name(&self) -> &str {
        self.header.name()
    }

    /// Parse a header and its bodies. The stream is left immediately after
    /// the section header so the next header can be read sequentially.
    pub fn read_from<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let header = SectionHeader::read_from(r)?;
        let after_header = r.pos()?;

        let mut data = Vec::new();
        if !header.is_uninitialized()
            && header.pointer_to_raw_data != 0
            && header.size_of_raw_data != 0
        {
            r.seek_to(header.pointer_to_raw_data as u64)?;
            data = read_vec(r, header.size_of_raw_data as usize, "section raw data")?;
        }

        let mut relocations = Vec::new();
        if header.pointer_to_relocations != 0 && header.number_of_relocations != 0 {
            r.seek_to(header.pointer_to_relocations as u64)?;
            for _ in 0..header.number_of_relocations {
                relocations.push(CoffRelocation::read_from(r)?);
            }
        }

        let mut line_numbers = Vec::new();
        if header.pointer_to_line_numbers != 0 && header.number_of_line_numbers != 0 {
            r.seek_to(header.pointer_to_line_numbers as u64)?;
            for _ in 0..header.number_of_line_numbers {
                line_numbers.push(LineNumber::read_from(r)?);
            }
        }

        r.seek_to(after_header)?;

        Ok(Self {
            header,
            data,
            relocations,
            line_numbers,
        })
    }

    /// Write the bodies at the file offsets recorded in the header. Raw data
    /// is zero-padded out to `size_of_raw_data`.
    pub fn write_body<W: Write + Seek>(&self, w: &mut W) -> Result<()> {
        if !self.header.is_uninitialized()
            && self.header.pointer_to_raw_data != 0
            && self.header.size_of_raw_data != 0
        {
            w.pad_to(self.header.pointer_to_raw_data as u64)?;
            let keep = self.data.len().min(self.header.size_of_raw_data as usize);
            w.write_all(&self.data[..keep])?;
            w.pad_to(
                self.header.pointer_to_raw_data as u64 + self.header.size_of_raw_data as u64,
            )?;
        }

        if self.header.pointer_to_relocations != 0 && !self.relocations.is_empty() {
            w.pad_to(self.header.pointer_to_relocations as u64)?;
            for reloc in &self.relocations {
                reloc.write_to(w)?;
            }
        }

        if self.header.pointer_to_line_numbers != 0 && !self.line_numbers.is_empty() {
            w.pad_to(self.header.pointer_to_line_numbers as u64)?;
            for line in &self.line_numbers {
                line.write_to(w)?;
            }
        }

        Ok(())
    }

    /// End of the section's address range (`virtual_address + virtual_size`).
    pub fn virtual_end(&self) -> u64 {
        self.header.virtual_address as u64 + self.header.virtual_size as u64
    }

    /// File offset one past the last body byte this section occupies.
    pub fn file_end(&self) -> u64 {
        let mut end = 0u64;
        if self.header.pointer_to_raw_data != 0 {
            end = end.max(
                self.header.pointer_to_raw_data as u64 + self.header.size_of_raw_data as u64,
            );
        }
        if self.header.pointer_to_relocations != 0 {
            end = end.max(
                self.header.pointer_to_relocations as u64
                    + self.header.number_of_relocations as u64 * CoffRelocation::SIZE as u64,
            );
        }
        if self.header.pointer_to_line_numbers != 0 {
            end = end.max(
                self.header.pointer_to_line_numbers as u64
                    + self.header.number_of_line_numbers as u64 * LineNumber::SIZE as u64,
            );
        }
        end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_section_header_roundtrip() {
        let mut header = SectionHeader::new(".text").unwrap();
        header.virtual_size = 0x1234;
        header.virtual_address = 0x1000;
        header.size_of_raw_data = 0x1400;
        header.pointer_to_raw_data = 0x400;
        header.characteristics = IMAGE_SCN_CNT_CODE | IMAGE_SCN_MEM_EXECUTE | IMAGE_SCN_MEM_READ;

        let mut cur = Cursor::new(Vec::new());
        header.write_to(&mut cur).unwrap();
        assert_eq!(cur.get_ref().len(), SectionHeader::SIZE);

        cur.seek_to(0).unwrap();
        let parsed = SectionHeader::read_from(&mut cur).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.name(), ".text");
        assert!(parsed.is_code());
        assert_eq!(parsed.flags_string(), "R-X");
    }

    #[test]
    fn test_name_too_long() {
        let mut header = SectionHeader::new(".text").unwrap();
        assert!(matches!(
            header.set_name(".averylongname"),
            Err(Error::BadSectionName(_))
        ));
        // The previous name survives a rejected set
        assert_eq!(header.name(), ".text");
    }

    #[test]
    fn test_eight_byte_name_no_nul() {
        let header = SectionHeader::new(".textbss").unwrap();
        let mut cur = Cursor::new(Vec::new());
        header.write_to(&mut cur).unwrap();
        assert_eq!(&cur.get_ref()[..8], b".textbss");
        cur.seek_to(0).unwrap();
        assert_eq!(SectionHeader::read_from(&mut cur).unwrap().name(), ".textbss");
    }

    #[test]
    fn test_contains_rva() {
        let mut header = SectionHeader::new(".data").unwrap();
        header.virtual_address = 0x2000;
        header.virtual_size = 0x100;
        assert!(header.contains_rva(0x2000));
        assert!(header.contains_rva(0x20FF));
        assert!(!header.contains_rva(0x2100));
        assert!(!header.contains_rva(0x1FFF));
    }

    #[test]
    fn test_body_roundtrip_with_seek_restore() {
        // Header at offset 0, raw data at 0x80, relocations after it
        let mut section = Section::new(".rdata", IMAGE_SCN_CNT_INITIALIZED_DATA).unwrap();
        section.data = vec![1, 2, 3, 4];
        section.header.size_of_raw_data = 4;
        section.header.pointer_to_raw_data = 0x80;
        section.relocations.push(CoffRelocation {
            virtual_address: 0x10,
            symbol_table_index: 1,
            type_value: 6,
        });
        section.header.number_of_relocations = 1;
        section.header.pointer_to_relocations = 0x84;

        let mut cur = Cursor::new(Vec::new());
        section.header.write_to(&mut cur).unwrap();
        section.write_body(&mut cur).unwrap();

        cur.seek_to(0).unwrap();
        let parsed = Section::read_from(&mut cur).unwrap();
        assert_eq!(parsed, section);
        // The stream is restored to just after the header
        assert_eq!(cur.pos().unwrap(), SectionHeader::SIZE as u64);
    }

    #[test]
    fn test_uninitialized_data_not_read() {
        let mut section = Section::new(".bss", IMAGE_SCN_CNT_UNINITIALIZED_DATA).unwrap();
        section.header.virtual_size = 0x1000;
        // Bogus pointer; must be ignored for uninitialized sections
        section.header.pointer_to_raw_data = 0xFFFF_0000;
        section.header.size_of_raw_data = 0x1000;

        let mut cur = Cursor::new(Vec::new());
        section.header.write_to(&mut cur).unwrap();
        cur.seek_to(0).unwrap();
        let parsed = Section::read_from(&mut cur).unwrap();
        assert!(parsed.data.is_empty());
    }
}
