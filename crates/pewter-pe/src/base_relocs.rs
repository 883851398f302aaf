//! PE base relocation directory parsing and `.reloc` building.
//!
//! The directory is a run of blocks, each keyed by a page RVA and holding
//! 16-bit entries (`type << 12 | offset`). Block headers start on 4-byte
//! boundaries; ABSOLUTE entries are padding sentinels that keep block sizes
//! aligned and are preserved on write.

use log::warn;

use pewter_coff::section::{
    IMAGE_SCN_CNT_INITIALIZED_DATA, IMAGE_SCN_MEM_DISCARDABLE, IMAGE_SCN_MEM_READ,
};
use pewter_coff::{align_up, DataDirectory, Result, Section};

use crate::rva;

/// Base relocation types. The numeric slots 5, 7, 8, and 9 are shared
/// between architectures (MIPS/ARM/RISC-V), so they decode to
/// machine-shared variants rather than one architecture's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BaseRelocationType {
    /// Padding sentinel
    Absolute,
    /// High 16 bits of a 32-bit field
    High,
    /// Low 16 bits of a 32-bit field
    Low,
    /// Full 32-bit field
    HighLow,
    /// High 16 bits with sign-extension adjustment
    HighAdj,
    /// Machine-dependent slot 5 (MIPS jump / ARM MOV32 / RISC-V high20)
    MachineSpecific5,
    /// Reserved
    Reserved6,
    /// Machine-dependent slot 7 (Thumb MOV32 / RISC-V low12i)
    MachineSpecific7,
    /// Machine-dependent slot 8 (RISC-V low12s / LoongArch32 marker)
    MachineSpecific8,
    /// Machine-dependent slot 9 (MIPS jump16 / IA64 imm64)
    MachineSpecific9,
    /// Full 64-bit field
    Dir64,
    /// A type code outside the documented set
    Unknown(u8),
}

impl BaseRelocationType {
    /// Decode the 4-bit type code.
    pub fn from_u4(value: u16) -> Self {
        match value {
            0 => Self::Absolute,
            1 => Self::High,
            2 => Self::Low,
            3 => Self::HighLow,
            4 => Self::HighAdj,
            5 => Self::MachineSpecific5,
            6 => Self::Reserved6,
            7 => Self::MachineSpecific7,
            8 => Self::MachineSpecific8,
            9 => Self::MachineSpecific9,
            10 => Self::Dir64,
            other => Self::Unknown(other as u8),
        }
    }

    /// The 4-bit type code.
    pub fn to_u4(self) -> u16 {
        match self {
            Self::Absolute => 0,
            Self::High => 1,
            Self::Low => 2,
            Self::HighLow => 3,
            Self::HighAdj => 4,
            Self::MachineSpecific5 => 5,
            Self::Reserved6 => 6,
            Self::MachineSpecific7 => 7,
            Self::MachineSpecific8 => 8,
            Self::MachineSpecific9 => 9,
            Self::Dir64 => 10,
            Self::Unknown(other) => other as u16,
        }
    }
}

/// One 16-bit block entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BaseRelocationEntry {
    /// Raw entry value (`type << 12 | offset`)
    pub value: u16,
}

impl BaseRelocationEntry {
    /// Builds an entry from a type and a 12-bit page offset.
    pub fn new(reloc_type: BaseRelocationType, offset: u16) -> Self {
        Self {
            value: (reloc_type.to_u4() << 12) | (offset & 0x0FFF),
        }
    }

    /// The relocation type.
    pub fn reloc_type(&self) -> BaseRelocationType {
        BaseRelocationType::from_u4(self.value >> 12)
    }

    /// Offset within the block's page.
    pub fn offset(&self) -> u16 {
        self.value & 0x0FFF
    }

    /// Returns true for the ABSOLUTE padding sentinel.
    pub fn is_padding(&self) -> bool {
        self.reloc_type() == BaseRelocationType::Absolute
    }
}

/// One relocation block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BaseRelocationBlock {
    /// Page this block relocates
    pub page_rva: u32,
    /// Block entries, padding sentinels included
    pub entries: Vec<BaseRelocationEntry>,
}

impl BaseRelocationBlock {
    /// On-disk block size: the 8-byte header plus the entries.
    pub fn block_size(&self) -> u32 {
        8 + 2 * self.entries.len() as u32
    }
}

/// The base relocation directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BaseRelocationDirectory {
    /// Blocks in file order
    pub blocks: Vec<BaseRelocationBlock>,
}

impl BaseRelocationDirectory {
    /// Serializes the blocks, padding each odd-length block with one
    /// ABSOLUTE entry so block headers stay 4-byte aligned.
    pub fn build(&self) -> Vec<u8> {
        let mut data = Vec::new();
        for block in &self.blocks {
            let pad = block.entries.len() % 2 != 0;
            let size = block.block_size() + if pad { 2 } else { 0 };
            data.extend_from_slice(&block.page_rva.to_le_bytes());
            data.extend_from_slice(&size.to_le_bytes());
            for entry in &block.entries {
                data.extend_from_slice(&entry.value.to_le_bytes());
            }
            if pad {
                data.extend_from_slice(&0u16.to_le_bytes());
            }
        }
        data
    }

    /// Builds a `.reloc` section holding these blocks at the given RVA,
    /// returning the section and the directory entry describing it.
    pub fn build_section(&self, section_rva: u32) -> Result<(Section, DataDirectory)> {
        let data = self.build();
        let mut section = Section::new(
            ".reloc",
            IMAGE_SCN_CNT_INITIALIZED_DATA | IMAGE_SCN_MEM_READ | IMAGE_SCN_MEM_DISCARDABLE,
        )?;
        section.header.virtual_address = section_rva;
        section.header.virtual_size = data.len() as u32;
        let directory = DataDirectory {
            virtual_address: section_rva,
            size: data.len() as u32,
        };
        section.data = data;
        Ok((section, directory))
    }

    /// Total number of non-padding entries.
    pub fn entry_count(&self) -> usize {
        self.blocks
            .iter()
            .map(|b| b.entries.iter().filter(|e| !e.is_padding()).count())
            .sum()
    }
}

/// Parse the base relocation directory: blocks while the cursor stays
/// within the directory's span, each advanced by its declared size rounded
/// up to 4.
pub(crate) fn parse_base_relocations(
    sections: &[Section],
    big_endian: bool,
    dir: DataDirectory,
) -> Option<BaseRelocationDirectory> {
    let mut blocks = Vec::new();
    let end = dir.virtual_address as u64 + dir.size as u64;
    let mut cursor = dir.virtual_address;

    while (cursor as u64) < end {
        let page_rva = match rva::read_u32_at(sections, cursor, big_endian) {
            Ok(v) => v,
            Err(_) => {
                warn!("base relocation block at {:#x} is not in any section", cursor);
                break;
            }
        };
        let block_size = match rva::read_u32_at(sections, cursor + 4, big_endian) {
            Ok(v) => v,
            Err(_) => break,
        };
        if block_size < 8 {
            warn!(
                "base relocation block at {:#x} declares size {}",
                cursor, block_size
            );
            break;
        }

        let count = (block_size - 8) / 2;
        let mut entries = Vec::with_capacity(count.min(2048) as usize);
        for i in 0..count {
            match rva::read_u16_at(sections, cursor + 8 + 2 * i, big_endian) {
                Ok(value) => entries.push(BaseRelocationEntry { value }),
                Err(_) => {
                    warn!("base relocation block at {:#x} truncated", cursor);
                    break;
                }
            }
        }

        blocks.push(BaseRelocationBlock { page_rva, entries });
        cursor += align_up(block_size as u64, 4) as u32;
    }

    if blocks.is_empty() {
        None
    } else {
        Some(BaseRelocationDirectory { blocks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_encoding() {
        let entry = BaseRelocationEntry::new(BaseRelocationType::HighLow, 0x123);
        assert_eq!(entry.value, 0x3123);
        assert_eq!(entry.reloc_type(), BaseRelocationType::HighLow);
        assert_eq!(entry.offset(), 0x123);
        assert!(!entry.is_padding());
        assert!(BaseRelocationEntry::new(BaseRelocationType::Absolute, 0).is_padding());
    }

    #[test]
    fn test_build_pads_odd_blocks() {
        let dir = BaseRelocationDirectory {
            blocks: vec![BaseRelocationBlock {
                page_rva: 0x1000,
                entries: vec![BaseRelocationEntry::new(BaseRelocationType::Dir64, 0x10)],
            }],
        };
        let data = dir.build();
        // 8-byte header + 1 entry + 1 pad entry
        assert_eq!(data.len(), 12);
        assert_eq!(u32::from_le_bytes([data[4], data[5], data[6], data[7]]), 12);
        // The pad entry is an ABSOLUTE sentinel
        assert_eq!(u16::from_le_bytes([data[10], data[11]]), 0);
    }

    #[test]
    fn test_build_then_parse() {
        let dir = BaseRelocationDirectory {
            blocks: vec![
                BaseRelocationBlock {
                    page_rva: 0x1000,
                    entries: vec![
                        BaseRelocationEntry::new(BaseRelocationType::HighLow, 0x10),
                        BaseRelocationEntry::new(BaseRelocationType::HighLow, 0x18),
                    ],
                },
                BaseRelocationBlock {
                    page_rva: 0x2000,
                    entries: vec![BaseRelocationEntry::new(BaseRelocationType::Dir64, 0x20)],
                },
            ],
        };

        let (section, dd) = dir.build_section(0x5000).unwrap();
        let parsed = parse_base_relocations(&[section], false, dd).unwrap();

        assert_eq!(parsed.blocks.len(), 2);
        assert_eq!(parsed.blocks[0].page_rva, 0x1000);
        assert_eq!(parsed.blocks[0].entries.len(), 2);
        assert_eq!(parsed.blocks[1].page_rva, 0x2000);
        // The odd block kept its padding sentinel
        assert_eq!(parsed.blocks[1].entries.len(), 2);
        assert!(parsed.blocks[1].entries[1].is_padding());
        assert_eq!(parsed.entry_count(), 3);
    }
}
