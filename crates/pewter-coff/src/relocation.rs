//! Section relocation and line-number records.
//!
//! Relocation type codes are a raw u16 whose meaning depends on
//! `FileHeader::machine`; the same numeric values mean different things on
//! different architectures, so decoding goes through per-machine enums
//! rather than one shared enum.

use std::io::{Read, Seek, Write};

use crate::codec::{ReadExt, WriteExt};
use crate::file_header::{
    IMAGE_FILE_MACHINE_AMD64, IMAGE_FILE_MACHINE_ARM, IMAGE_FILE_MACHINE_ARM64,
    IMAGE_FILE_MACHINE_ARMNT, IMAGE_FILE_MACHINE_I386,
};
use crate::Result;

/// A section relocation record (10 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoffRelocation {
    /// Virtual address of the item to relocate
    pub virtual_address: u32,
    /// Index into the symbol table
    pub symbol_table_index: u32,
    /// Raw machine-dependent relocation type
    pub type_value: u16,
}

impl CoffRelocation {
    /// Size of a relocation record in bytes.
    pub const SIZE: usize = 10;

    /// Parse a relocation record from the current stream position.
    pub fn read_from<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let mut buf = [0u8; Self::SIZE];
        r.read_exact_ctx(&mut buf, "relocation record")?;
        Ok(Self {
            virtual_address: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            symbol_table_index: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            type_value: u16::from_le_bytes([buf[8], buf[9]]),
        })
    }

    /// Write the record at the current stream position.
    pub fn write_to<W: Write + Seek>(&self, w: &mut W) -> Result<()> {
        w.write_u32(self.virtual_address)?;
        w.write_u32(self.symbol_table_index)?;
        w.write_u16(self.type_value)?;
        Ok(())
    }

    /// Decode the relocation type for the given machine.
    pub fn typed(&self, machine: u16) -> CoffRelocationType {
        CoffRelocationType::decode(machine, self.type_value)
    }
}

/// A line-number record (6 bytes). When `line_number` is zero the u32 field
/// is a symbol table index, otherwise it is a virtual address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LineNumber {
    /// Symbol table index or virtual address, keyed by `line_number`
    pub symbol_or_va: u32,
    /// One-based source line number; zero marks a function symbol record
    pub line_number: u16,
}

impl LineNumber {
    /// Size of a line-number record in bytes.
    pub const SIZE: usize = 6;

    /// Parse a line-number record from the current stream position.
    pub fn read_from<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let mut buf = [0u8; Self::SIZE];
        r.read_exact_ctx(&mut buf, "line-number record")?;
        Ok(Self {
            symbol_or_va: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            line_number: u16::from_le_bytes([buf[4], buf[5]]),
        })
    }

    /// Write the record at the current stream position.
    pub fn write_to<W: Write + Seek>(&self, w: &mut W) -> Result<()> {
        w.write_u32(self.symbol_or_va)?;
        w.write_u16(self.line_number)?;
        Ok(())
    }
}

/// A relocation type decoded for a specific machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CoffRelocationType {
    I386(I386RelocationType),
    Amd64(Amd64RelocationType),
    Arm(ArmRelocationType),
    Arm64(Arm64RelocationType),
    /// A machine this crate has no decoder for, or a type code outside the
    /// machine's documented set.
    Unknown { machine: u16, value: u16 },
}

impl CoffRelocationType {
    /// Decode a raw type value for the given machine.
    pub fn decode(machine: u16, value: u16) -> Self {
        let unknown = Self::Unknown { machine, value };
        match machine {
            IMAGE_FILE_MACHINE_I386 => I386RelocationType::from_u16(value)
                .map(Self::I386)
                .unwrap_or(unknown),
            IMAGE_FILE_MACHINE_AMD64 => Amd64RelocationType::from_u16(value)
                .map(Self::Amd64)
                .unwrap_or(unknown),
            // ARM and Thumb-2 objects share one type table
            IMAGE_FILE_MACHINE_ARM | IMAGE_FILE_MACHINE_ARMNT => {
                ArmRelocationType::from_u16(value)
                    .map(Self::Arm)
                    .unwrap_or(unknown)
            }
            IMAGE_FILE_MACHINE_ARM64 => Arm64RelocationType::from_u16(value)
                .map(Self::Arm64)
                .unwrap_or(unknown),
            _ => unknown,
        }
    }
}

/// x86 relocation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum I386RelocationType {
    Absolute = 0x0000,
    Dir16 = 0x0001,
    Rel16 = 0x0002,
    Dir32 = 0x0006,
    Dir32Nb = 0x0007,
    Seg12 = 0x0009,
    Section = 0x000A,
    SecRel = 0x000B,
    Token = 0x000C,
    SecRel7 = 0x000D,
    Rel32 = 0x0014,
}

impl I386RelocationType {
    /// Convert from the raw u16 value.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0000 => Some(Self::Absolute),
            0x0001 => Some(Self::Dir16),
            0x0002 => Some(Self::Rel16),
            0x0006 => Some(Self::Dir32),
            0x0007 => Some(Self::Dir32Nb),
            0x0009 => Some(Self::Seg12),
            0x000A => Some(Self::Section),
            0x000B => Some(Self::SecRel),
            0x000C => Some(Self::Token),
            0x000D => Some(Self::SecRel7),
            0x0014 => Some(Self::Rel32),
            _ => None,
        }
    }
}

/// x64 relocation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum Amd64RelocationType {
    Absolute = 0x0000,
    Addr64 = 0x0001,
    Addr32 = 0x0002,
    Addr32Nb = 0x0003,
    Rel32 = 0x0004,
    Rel32_1 = 0x0005,
    Rel32_2 = 0x0006,
    Rel32_3 = 0x0007,
    Rel32_4 = 0x0008,
    Rel32_5 = 0x0009,
    Section = 0x000A,
    SecRel = 0x000B,
    SecRel7 = 0x000C,
    Token = 0x000D,
    SRel32 = 0x000E,
    Pair = 0x000F,
    SSpan32 = 0x0010,
}

impl Amd64RelocationType {
    /// Convert from the raw u16 value.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0000 => Some(Self::Absolute),
            0x0001 => Some(Self::Addr64),
            0x0002 => Some(Self::Addr32),
            0x0003 => Some(Self::Addr32Nb),
            0x0004 => Some(Self::Rel32),
            0x0005 => Some(Self::Rel32_1),
            0x0006 => Some(Self::Rel32_2),
            0x0007 => Some(Self::Rel32_3),
            0x0008 => Some(Self::Rel32_4),
            0x0009 => Some(Self::Rel32_5),
            0x000A => Some(Self::Section),
            0x000B => Some(Self::SecRel),
            0x000C => Some(Self::SecRel7),
            0x000D => Some(Self::Token),
            0x000E => Some(Self::SRel32),
            0x000F => Some(Self::Pair),
            0x0010 => Some(Self::SSpan32),
            _ => None,
        }
    }
}

/// ARM (and Thumb-2) relocation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum ArmRelocationType {
    Absolute = 0x0000,
    Addr32 = 0x0001,
    Addr32Nb = 0x0002,
    Branch24 = 0x0003,
    Branch11 = 0x0004,
    Token = 0x0005,
    Blx24 = 0x0008,
    Blx11 = 0x0009,
    Section = 0x000E,
    SecRel = 0x000F,
    Mov32A = 0x0010,
    Mov32T = 0x0011,
    Branch20T = 0x0012,
    Branch24T = 0x0014,
    Blx23T = 0x0015,
}

impl ArmRelocationType {
    /// Convert from the raw u16 value.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0000 => Some(Self::Absolute),
            0x0001 => Some(Self::Addr32),
            0x0002 => Some(Self::Addr32Nb),
            0x0003 => Some(Self::Branch24),
            0x0004 => Some(Self::Branch11),
            0x0005 => Some(Self::Token),
            0x0008 => Some(Self::Blx24),
            0x0009 => Some(Self::Blx11),
            0x000E => Some(Self::Section),
            0x000F => Some(Self::SecRel),
            0x0010 => Some(Self::Mov32A),
            0x0011 => Some(Self::Mov32T),
            0x0012 => Some(Self::Branch20T),
            0x0014 => Some(Self::Branch24T),
            0x0015 => Some(Self::Blx23T),
            _ => None,
        }
    }
}

/// ARM64 relocation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum Arm64RelocationType {
    Absolute = 0x0000,
    Addr32 = 0x0001,
    Addr32Nb = 0x0002,
    Branch26 = 0x0003,
    PageBaseRel21 = 0x0004,
    Rel21 = 0x0005,
    PageOffset12A = 0x0006,
    PageOffset12L = 0x0007,
    SecRel = 0x0008,
    SecRelLow12A = 0x0009,
    SecRelHigh12A = 0x000A,
    SecRelLow12L = 0x000B,
    Token = 0x000C,
    Section = 0x000D,
    Addr64 = 0x000E,
    Branch19 = 0x000F,
    Branch14 = 0x0010,
    Rel32 = 0x0011,
}

impl Arm64RelocationType {
    /// Convert from the raw u16 value.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0000 => Some(Self::Absolute),
            0x0001 => Some(Self::Addr32),
            0x0002 => Some(Self::Addr32Nb),
            0x0003 => Some(Self::Branch26),
            0x0004 => Some(Self::PageBaseRel21),
            0x0005 => Some(Self::Rel21),
            0x0006 => Some(Self::PageOffset12A),
            0x0007 => Some(Self::PageOffset12L),
            0x0008 => Some(Self::SecRel),
            0x0009 => Some(Self::SecRelLow12A),
            0x000A => Some(Self::SecRelHigh12A),
            0x000B => Some(Self::SecRelLow12L),
            0x000C => Some(Self::Token),
            0x000D => Some(Self::Section),
            0x000E => Some(Self::Addr64),
            0x000F => Some(Self::Branch19),
            0x0010 => Some(Self::Branch14),
            0x0011 => Some(Self::Rel32),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_relocation_roundtrip() {
        let reloc = CoffRelocation {
            virtual_address: 0x1040,
            symbol_table_index: 7,
            type_value: 0x0004,
        };
        let mut cur = Cursor::new(Vec::new());
        reloc.write_to(&mut cur).unwrap();
        assert_eq!(cur.get_ref().len(), CoffRelocation::SIZE);
        cur.seek_to(0).unwrap();
        assert_eq!(CoffRelocation::read_from(&mut cur).unwrap(), reloc);
    }

    #[test]
    fn test_line_number_roundtrip() {
        let line = LineNumber {
            symbol_or_va: 0x2000,
            line_number: 42,
        };
        let mut cur = Cursor::new(Vec::new());
        line.write_to(&mut cur).unwrap();
        assert_eq!(cur.get_ref().len(), LineNumber::SIZE);
        cur.seek_to(0).unwrap();
        assert_eq!(LineNumber::read_from(&mut cur).unwrap(), line);
    }

    #[test]
    fn test_type_codes_collide_across_machines() {
        // 0x0004 is REL32 on x64 but unassigned on x86
        let reloc = CoffRelocation {
            virtual_address: 0,
            symbol_table_index: 0,
            type_value: 0x0004,
        };
        assert_eq!(
            reloc.typed(IMAGE_FILE_MACHINE_AMD64),
            CoffRelocationType::Amd64(Amd64RelocationType::Rel32)
        );
        assert!(matches!(
            reloc.typed(IMAGE_FILE_MACHINE_I386),
            CoffRelocationType::Unknown { .. }
        ));
    }

    #[test]
    fn test_unknown_machine() {
        let reloc = CoffRelocation {
            virtual_address: 0,
            symbol_table_index: 0,
            type_value: 1,
        };
        assert!(matches!(
            reloc.typed(0x1234),
            CoffRelocationType::Unknown {
                machine: 0x1234,
                value: 1
            }
        ));
    }
}
