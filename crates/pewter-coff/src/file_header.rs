//! COFF file header parsing and writing.

use std::io::{Read, Seek, Write};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::codec::{ReadExt, WriteExt};
use crate::Result;

/// Machine types
pub const IMAGE_FILE_MACHINE_UNKNOWN: u16 = 0x0000;
pub const IMAGE_FILE_MACHINE_I386: u16 = 0x014C;
pub const IMAGE_FILE_MACHINE_AMD64: u16 = 0x8664;
pub const IMAGE_FILE_MACHINE_ARM: u16 = 0x01C0;
pub const IMAGE_FILE_MACHINE_ARMNT: u16 = 0x01C4;
pub const IMAGE_FILE_MACHINE_ARM64: u16 = 0xAA64;
pub const IMAGE_FILE_MACHINE_IA64: u16 = 0x0200;
pub const IMAGE_FILE_MACHINE_EBC: u16 = 0x0EBC;
pub const IMAGE_FILE_MACHINE_RISCV32: u16 = 0x5032;
pub const IMAGE_FILE_MACHINE_RISCV64: u16 = 0x5064;

/// Characteristics flags
pub const IMAGE_FILE_RELOCS_STRIPPED: u16 = 0x0001;
pub const IMAGE_FILE_EXECUTABLE_IMAGE: u16 = 0x0002;
pub const IMAGE_FILE_LINE_NUMS_STRIPPED: u16 = 0x0004;
pub const IMAGE_FILE_LOCAL_SYMS_STRIPPED: u16 = 0x0008;
pub const IMAGE_FILE_LARGE_ADDRESS_AWARE: u16 = 0x0020;
/// Bytes of machine word are reversed (obsolete).
pub const IMAGE_FILE_BYTES_REVERSED_LO: u16 = 0x0080;
pub const IMAGE_FILE_32BIT_MACHINE: u16 = 0x0100;
pub const IMAGE_FILE_DEBUG_STRIPPED: u16 = 0x0200;
pub const IMAGE_FILE_SYSTEM: u16 = 0x1000;
pub const IMAGE_FILE_DLL: u16 = 0x2000;
/// Bytes of machine word are reversed (obsolete).
pub const IMAGE_FILE_BYTES_REVERSED_HI: u16 = 0x8000;

/// Machine type as an enum over the common architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
#[non_exhaustive]
pub enum MachineType {
    Unknown = IMAGE_FILE_MACHINE_UNKNOWN,
    I386 = IMAGE_FILE_MACHINE_I386,
    Amd64 = IMAGE_FILE_MACHINE_AMD64,
    Arm = IMAGE_FILE_MACHINE_ARM,
    ArmNt = IMAGE_FILE_MACHINE_ARMNT,
    Arm64 = IMAGE_FILE_MACHINE_ARM64,
    Ia64 = IMAGE_FILE_MACHINE_IA64,
    Ebc = IMAGE_FILE_MACHINE_EBC,
    RiscV32 = IMAGE_FILE_MACHINE_RISCV32,
    RiscV64 = IMAGE_FILE_MACHINE_RISCV64,
}

impl MachineType {
    /// Convert from the raw u16 value.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            IMAGE_FILE_MACHINE_UNKNOWN => Some(Self::Unknown),
            IMAGE_FILE_MACHINE_I386 => Some(Self::I386),
            IMAGE_FILE_MACHINE_AMD64 => Some(Self::Amd64),
            IMAGE_FILE_MACHINE_ARM => Some(Self::Arm),
            IMAGE_FILE_MACHINE_ARMNT => Some(Self::ArmNt),
            IMAGE_FILE_MACHINE_ARM64 => Some(Self::Arm64),
            IMAGE_FILE_MACHINE_IA64 => Some(Self::Ia64),
            IMAGE_FILE_MACHINE_EBC => Some(Self::Ebc),
            IMAGE_FILE_MACHINE_RISCV32 => Some(Self::RiscV32),
            IMAGE_FILE_MACHINE_RISCV64 => Some(Self::RiscV64),
            _ => None,
        }
    }
}

/// COFF File Header (20 bytes)
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileHeader {
    /// Machine type
    pub machine: u16,
    /// Number of sections
    pub number_of_sections: u16,
    /// Seconds since the Unix epoch
    pub time_date_stamp: u32,
    /// File offset of the COFF symbol table, zero when absent
    pub pointer_to_symbol_table: u32,
    /// Number of symbol records, auxiliary records included
    pub number_of_symbols: u32,
    /// Size of the optional header
    pub size_of_optional_header: u16,
    /// Characteristics flags
    pub characteristics: u16,
}

impl FileHeader {
    /// Size of the file header in bytes.
    pub const SIZE: usize = 20;

    /// Creates a header for a new image or object of the given machine.
    pub fn new(machine: u16) -> Self {
        Self {
            machine,
            number_of_sections: 0,
            time_date_stamp: 0,
            pointer_to_symbol_table: 0,
            number_of_symbols: 0,
            size_of_optional_header: 0,
            characteristics: 0,
        }
    }

    /// Parse a file header from bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(crate::Error::truncated("COFF file header"));
        }

        Ok(Self {
            machine: u16::from_le_bytes([data[0], data[1]]),
            number_of_sections: u16::from_le_bytes([data[2], data[3]]),
            time_date_stamp: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
            pointer_to_symbol_table: u32::from_le_bytes([data[8], data[9], data[10], data[11]]),
            number_of_symbols: u32::from_le_bytes([data[12], data[13], data[14], data[15]]),
            size_of_optional_header: u16::from_le_bytes([data[16], data[17]]),
            characteristics: u16::from_le_bytes([data[18], data[19]]),
        })
    }

    /// Parse a file header from the current stream position.
    pub fn read_from<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let mut buf = [0u8; Self::SIZE];
        r.read_exact_ctx(&mut buf, "COFF file header")?;
        Self::parse(&buf)
    }

    /// Write the header at the current stream position.
    pub fn write_to<W: Write + Seek>(&self, w: &mut W) -> Result<()> {
        w.write_u16(self.machine)?;
        w.write_u16(self.number_of_sections)?;
        w.write_u32(self.time_date_stamp)?;
        w.write_u32(self.pointer_to_symbol_table)?;
        w.write_u32(self.number_of_symbols)?;
        w.write_u16(self.size_of_optional_header)?;
        w.write_u16(self.characteristics)?;
        Ok(())
    }

    /// The machine type as an enum, when the value is a known architecture.
    pub fn machine_type(&self) -> Option<MachineType> {
        MachineType::from_u16(self.machine)
    }

    /// The timestamp as host time.
    pub fn timestamp(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.time_date_stamp as u64)
    }

    /// Sets the timestamp from host time. Times before the Unix epoch and
    /// past the u32 range are clamped.
    pub fn set_timestamp(&mut self, time: SystemTime) {
        let secs = time
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.time_date_stamp = secs.min(u32::MAX as u64) as u32;
    }

    /// Returns true if this is a 64-bit machine type.
    pub fn is_64bit(&self) -> bool {
        matches!(
            self.machine,
            IMAGE_FILE_MACHINE_AMD64
                | IMAGE_FILE_MACHINE_ARM64
                | IMAGE_FILE_MACHINE_IA64
                | IMAGE_FILE_MACHINE_RISCV64
        )
    }

    /// Returns true if this is an executable image.
    pub fn is_executable(&self) -> bool {
        self.characteristics & IMAGE_FILE_EXECUTABLE_IMAGE != 0
    }

    /// Returns true if this is a DLL.
    pub fn is_dll(&self) -> bool {
        self.characteristics & IMAGE_FILE_DLL != 0
    }
}
