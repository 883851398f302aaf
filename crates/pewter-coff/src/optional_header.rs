//! Optional header parsing and writing.
//!
//! The optional header is a discriminated record: a 24-byte standard part
//! shared by all variants, then a magic-dependent Windows-specific part and
//! the data directory array. PE32 carries 32-bit image base and stack/heap
//! sizes plus a `base_of_data` field; PE32+ widens those to 64 bits and
//! drops `base_of_data`. ROM images (magic 0x107) are accepted and
//! round-tripped without interpreting their tail.

use std::io::{Read, Seek, Write};

use crate::{Error, Result};

/// PE32 magic
pub const PE32_MAGIC: u16 = 0x10B;
/// PE32+ (64-bit) magic
pub const PE32PLUS_MAGIC: u16 = 0x20B;
/// ROM image magic
pub const ROM_MAGIC: u16 = 0x107;

/// Subsystem values
pub const IMAGE_SUBSYSTEM_NATIVE: u16 = 1;
pub const IMAGE_SUBSYSTEM_WINDOWS_GUI: u16 = 2;
pub const IMAGE_SUBSYSTEM_WINDOWS_CUI: u16 = 3;
pub const IMAGE_SUBSYSTEM_EFI_APPLICATION: u16 = 10;

/// DLL characteristics
pub const IMAGE_DLLCHARACTERISTICS_HIGH_ENTROPY_VA: u16 = 0x0020;
pub const IMAGE_DLLCHARACTERISTICS_DYNAMIC_BASE: u16 = 0x0040;
pub const IMAGE_DLLCHARACTERISTICS_NX_COMPAT: u16 = 0x0100;
pub const IMAGE_DLLCHARACTERISTICS_NO_SEH: u16 = 0x0400;
pub const IMAGE_DLLCHARACTERISTICS_TERMINAL_SERVER_AWARE: u16 = 0x8000;

/// Data directory entry (8 bytes)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DataDirectory {
    /// RVA of the table (a plain file offset for the certificate table)
    pub virtual_address: u32,
    /// Size of the table in bytes
    pub size: u32,
}

impl DataDirectory {
    /// Size of a data directory entry in bytes.
    pub const SIZE: usize = 8;

    /// Returns true if the directory points at a table.
    pub fn is_present(&self) -> bool {
        self.virtual_address != 0
    }
}

/// Well-known data directory indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataDirectoryType {
    ExportTable,
    ImportTable,
    ResourceTable,
    ExceptionTable,
    CertificateTable,
    BaseRelocationTable,
    Debug,
    Architecture,
    GlobalPointer,
    TlsTable,
    LoadConfigTable,
    BoundImport,
    ImportAddressTable,
    DelayImportDescriptor,
    ClrRuntimeHeader,
}

impl DataDirectoryType {
    /// Index of this directory in the data directory array.
    pub fn index(self) -> usize {
        match self {
            Self::ExportTable => 0,
            Self::ImportTable => 1,
            Self::ResourceTable => 2,
            Self::ExceptionTable => 3,
            Self::CertificateTable => 4,
            Self::BaseRelocationTable => 5,
            Self::Debug => 6,
            Self::Architecture => 7,
            Self::GlobalPointer => 8,
            Self::TlsTable => 9,
            Self::LoadConfigTable => 10,
            Self::BoundImport => 11,
            Self::ImportAddressTable => 12,
            Self::DelayImportDescriptor => 13,
            Self::ClrRuntimeHeader => 14,
        }
    }

    /// All well-known directory types, in index order.
    pub fn all() -> [DataDirectoryType; 15] {
        use DataDirectoryType::*;
        [
            ExportTable,
            ImportTable,
            ResourceTable,
            ExceptionTable,
            CertificateTable,
            BaseRelocationTable,
            Debug,
            Architecture,
            GlobalPointer,
            TlsTable,
            LoadConfigTable,
            BoundImport,
            ImportAddressTable,
            DelayImportDescriptor,
            ClrRuntimeHeader,
        ]
    }

    /// Human-readable directory name.
    pub fn name(self) -> &'static str {
        match self {
            Self::ExportTable => "export",
            Self::ImportTable => "import",
            Self::ResourceTable => "resource",
            Self::ExceptionTable => "exception",
            Self::CertificateTable => "certificate",
            Self::BaseRelocationTable => "base relocation",
            Self::Debug => "debug",
            Self::Architecture => "architecture",
            Self::GlobalPointer => "global pointer",
            Self::TlsTable => "tls",
            Self::LoadConfigTable => "load config",
            Self::BoundImport => "bound import",
            Self::ImportAddressTable => "import address",
            Self::DelayImportDescriptor => "delay import",
            Self::ClrRuntimeHeader => "clr runtime",
        }
    }
}

/// PE32 optional header.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OptionalHeaderPe32 {
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
    pub base_of_data: u32,
    pub image_base: u32,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_operating_system_version: u16,
    pub minor_operating_system_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub check_sum: u32,
    pub subsystem: u16,
    pub dll_characteristics: u16,
    pub size_of_stack_reserve: u32,
    pub size_of_stack_commit: u32,
    pub size_of_heap_reserve: u32,
    pub size_of_heap_commit: u32,
    pub loader_flags: u32,
    /// Data directories; `number_of_rva_and_sizes` is derived from the length
    pub data_directories: Vec<DataDirectory>,
}

impl Default for OptionalHeaderPe32 {
    fn default() -> Self {
        Self {
            major_linker_version: 14,
            minor_linker_version: 0,
            size_of_code: 0,
            size_of_initialized_data: 0,
            size_of_uninitialized_data: 0,
            address_of_entry_point: 0,
            base_of_code: 0,
            base_of_data: 0,
            image_base: 0x0040_0000,
            section_alignment: 0x1000,
            file_alignment: 0x200,
            major_operating_system_version: 6,
            minor_operating_system_version: 0,
            major_image_version: 0,
            minor_image_version: 0,
            major_subsystem_version: 6,
            minor_subsystem_version: 0,
            win32_version_value: 0,
            size_of_image: 0,
            size_of_headers: 0,
            check_sum: 0,
            subsystem: IMAGE_SUBSYSTEM_WINDOWS_CUI,
            dll_characteristics: 0,
            size_of_stack_reserve: 0x10_0000,
            size_of_stack_commit: 0x1000,
            size_of_heap_reserve: 0x10_0000,
            size_of_heap_commit: 0x1000,
            loader_flags: 0,
            data_directories: vec![DataDirectory::default(); 16],
        }
    }
}

/// PE32+ optional header.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OptionalHeaderPe32Plus {
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
    pub image_base: u64,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_operating_system_version: u16,
    pub minor_operating_system_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub check_sum: u32,
    pub subsystem: u16,
    pub dll_characteristics: u16,
    pub size_of_stack_reserve: u64,
    pub size_of_stack_commit: u64,
    pub size_of_heap_reserve: u64,
    pub size_of_heap_commit: u64,
    pub loader_flags: u32,
    /// Data directories; `number_of_rva_and_sizes` is derived from the length
    pub data_directories: Vec<DataDirectory>,
}

impl Default for OptionalHeaderPe32Plus {
    fn default() -> Self {
        Self {
            major_linker_version: 14,
            minor_linker_version: 0,
            size_of_code: 0,
            size_of_initialized_data: 0,
            size_of_uninitialized_data: 0,
            address_of_entry_point: 0,
            base_of_code: 0,
            image_base: 0x1_4000_0000,
            section_alignment: 0x1000,
            file_alignment: 0x200,
            major_operating_system_version: 6,
            minor_operating_system_version: 0,
            major_image_version: 0,
            minor_image_version: 0,
            major_subsystem_version: 6,
            minor_subsystem_version: 0,
            win32_version_value: 0,
            size_of_image: 0,
            size_of_headers: 0,
            check_sum: 0,
            subsystem: IMAGE_SUBSYSTEM_WINDOWS_CUI,
            dll_characteristics: 0,
            size_of_stack_reserve: 0x10_0000,
            size_of_stack_commit: 0x1000,
            size_of_heap_reserve: 0x10_0000,
            size_of_heap_commit: 0x1000,
            loader_flags: 0,
            data_directories: vec![DataDirectory::default(); 16],
        }
    }
}

/// ROM optional header: the standard fields, with the rest of the header
/// preserved opaquely.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OptionalHeaderRom {
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
    /// Remaining header bytes, carried verbatim
    pub tail: Vec<u8>,
}

/// Optional header, discriminated on the magic field.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OptionalHeader {
    Pe32(OptionalHeaderPe32),
    Pe32Plus(OptionalHeaderPe32Plus),
    Rom(OptionalHeaderRom),
}

impl OptionalHeader {
    /// Size of the standard (magic-independent) fields in bytes.
    pub const STANDARD_SIZE: usize = 24;
    /// Offset of the data directory array for PE32.
    pub const PE32_DIRECTORY_OFFSET: usize = 96;
    /// Offset of the data directory array for PE32+.
    pub const PE32PLUS_DIRECTORY_OFFSET: usize = 112;

    /// Parse an optional header from a buffer holding exactly
    /// `size_of_optional_header` bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 2 {
            return Err(Error::truncated("optional header magic"));
        }
        let magic = u16::from_le_bytes([data[0], data[1]]);
        match magic {
            PE32_MAGIC => Ok(Self::Pe32(Self::parse_pe32(data)?)),
            PE32PLUS_MAGIC => Ok(Self::Pe32Plus(Self::parse_pe32plus(data)?)),
            ROM_MAGIC => Ok(Self::Rom(Self::parse_rom(data)?)),
            other => Err(Error::UnsupportedOptionalHeaderMagic(other)),
        }
    }

    /// Consume exactly `size` bytes from the stream and parse them.
    pub fn read_from<R: Read + Seek>(r: &mut R, size: u16) -> Result<Self> {
        let buf = crate::codec::read_vec(r, size as usize, "optional header")?;
        Self::parse(&buf)
    }

    fn parse_pe32(data: &[u8]) -> Result<OptionalHeaderPe32> {
        if data.len() < Self::PE32_DIRECTORY_OFFSET {
            return Err(Error::truncated("PE32 optional header"));
        }

        let number_of_rva_and_sizes =
            u32::from_le_bytes([data[92], data[93], data[94], data[95]]);
        let data_directories =
            Self::parse_directories(data, Self::PE32_DIRECTORY_OFFSET, number_of_rva_and_sizes);

        Ok(OptionalHeaderPe32 {
            major_linker_version: data[2],
            minor_linker_version: data[3],
            size_of_code: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
            size_of_initialized_data: u32::from_le_bytes([data[8], data[9], data[10], data[11]]),
            size_of_uninitialized_data: u32::from_le_bytes([
                data[12], data[13], data[14], data[15],
            ]),
            address_of_entry_point: u32::from_le_bytes([data[16], data[17], data[18], data[19]]),
            base_of_code: u32::from_le_bytes([data[20], data[21], data[22], data[23]]),
            base_of_data: u32::from_le_bytes([data[24], data[25], data[26], data[27]]),
            image_base: u32::from_le_bytes([data[28], data[29], data[30], data[31]]),
            section_alignment: u32::from_le_bytes([data[32], data[33], data[34], data[35]]),
            file_alignment: u32::from_le_bytes([data[36], data[37], data[38], data[39]]),
            major_operating_system_version: u16::from_le_bytes([data[40], data[41]]),
            minor_operating_system_version: u16::from_le_bytes([data[42], data[43]]),
            major_image_version: u16::from_le_bytes([data[44], data[45]]),
            minor_image_version: u16::from_le_bytes([data[46], data[47]]),
            major_subsystem_version: u16::from_le_bytes([data[48], data[49]]),
            minor_subsystem_version: u16::from_le_bytes([data[50], data[51]]),
            win32_version_value: u32::from_le_bytes([data[52], data[53], data[54], data[55]]),
            size_of_image: u32::from_le_bytes([data[56], data[57], data[58], data[59]]),
            size_of_headers: u32::from_le_bytes([data[60], data[61], data[62], data[63]]),
            check_sum: u32::from_le_bytes([data[64], data[65], data[66], data[67]]),
            subsystem: u16::from_le_bytes([data[68], data[69]]),
            dll_characteristics: u16::from_le_bytes([data[70], data[71]]),
            size_of_stack_reserve: u32::from_le_bytes([data[72], data[73], data[74], data[75]]),
            size_of_stack_commit: u32::from_le_bytes([data[76], data[77], data[78], data[79]]),
            size_of_heap_reserve: u32::from_le_bytes([data[80], data[81], data[82], data[83]]),
            size_of_heap_commit: u32::from_le_bytes([data[84], data[85], data[86], data[87]]),
            loader_flags: u32::from_le_bytes([data[88], data[89], data[90], data[91]]),
            data_directories,
        })
    }

    fn parse_pe32plus(data: &[u8]) -> Result<OptionalHeaderPe32Plus> {
        if data.len() < Self::PE32PLUS_DIRECTORY_OFFSET {
            return Err(Error::truncated("PE32+ optional header"));
        }

        let number_of_rva_and_sizes =
            u32::from_le_bytes([data[108], data[109], data[110], data[111]]);
        let data_directories = Self::parse_directories(
            data,
            Self::PE32PLUS_DIRECTORY_OFFSET,
            number_of_rva_and_sizes,
        );

        Ok(OptionalHeaderPe32Plus {
            major_linker_version: data[2],
            minor_linker_version: data[3],
            size_of_code: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
            size_of_initialized_data: u32::from_le_bytes([data[8], data[9], data[10], data[11]]),
            size_of_uninitialized_data: u32::from_le_bytes([
                data[12], data[13], data[14], data[15],
            ]),
            address_of_entry_point: u32::from_le_bytes([data[16], data[17], data[18], data[19]]),
            base_of_code: u32::from_le_bytes([data[20], data[21], data[22], data[23]]),
            image_base: u64::from_le_bytes([
                data[24], data[25], data[26], data[27], data[28], data[29], data[30], data[31],
            ]),
            section_alignment: u32::from_le_bytes([data[32], data[33], data[34], data[35]]),
            file_alignment: u32::from_le_bytes([data[36], data[37], data[38], data[39]]),
            major_operating_system_version: u16::from_le_bytes([data[40], data[41]]),
            minor_operating_system_version: u16::from_le_bytes([data[42], data[43]]),
            major_image_version: u16::from_le_bytes([data[44], data[45]]),
            minor_image_version: u16::from_le_bytes([data[46], data[47]]),
            major_subsystem_version: u16::from_le_bytes([data[48], data[49]]),
            minor_subsystem_version: u16::from_le_bytes([data[50], data[51]]),
            win32_version_value: u32::from_le_bytes([data[52], data[53], data[54], data[55]]),
            size_of_image: u32::from_le_bytes([data[56], data[57], data[58], data[59]]),
            size_of_headers: u32::from_le_bytes([data[60], data[61], data[62], data[63]]),
            check_sum: u32::from_le_bytes([data[64], data[65], data[66], data[67]]),
            subsystem: u16::from_le_bytes([data[68], data[69]]),
            dll_characteristics: u16::from_le_bytes([data[70], data[71]]),
            size_of_stack_reserve: u64::from_le_bytes([
                data[72], data[73], data[74], data[75], data[76], data[77], data[78], data[79],
            ]),
            size_of_stack_commit: u64::from_le_bytes([
                data[80], data[81], data[82], data[83], data[84], data[85], data[86], data[87],
            ]),
            size_of_heap_reserve: u64::from_le_bytes([
                data[88], data[89], data[90], data[91], data[92], data[93], data[94], data[95],
            ]),
            size_of_heap_commit: u64::from_le_bytes([
                data[96], data[97], data[98], data[99], data[100], data[101], data[102], data[103],
            ]),
            loader_flags: u32::from_le_bytes([data[104], data[105], data[106], data[107]]),
            data_directories,
        })
    }

    fn parse_rom(data: &[u8]) -> Result<OptionalHeaderRom> {
        if data.len() < Self::STANDARD_SIZE {
            return Err(Error::truncated("ROM optional header"));
        }

        Ok(OptionalHeaderRom {
            major_linker_version: data[2],
            minor_linker_version: data[3],
            size_of_code: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
            size_of_initialized_data: u32::from_le_bytes([data[8], data[9], data[10], data[11]]),
            size_of_uninitialized_data: u32::from_le_bytes([
                data[12], data[13], data[14], data[15],
            ]),
            address_of_entry_point: u32::from_le_bytes([data[16], data[17], data[18], data[19]]),
            base_of_code: u32::from_le_bytes([data[20], data[21], data[22], data[23]]),
            tail: data[Self::STANDARD_SIZE..].to_vec(),
        })
    }

    fn parse_directories(data: &[u8], offset: usize, count: u32) -> Vec<DataDirectory> {
        let mut dirs = Vec::with_capacity(count.min(64) as usize);
        for i in 0..count as usize {
            let off = offset + i * DataDirectory::SIZE;
            if off + DataDirectory::SIZE > data.len() {
                break;
            }
            dirs.push(DataDirectory {
                virtual_address: u32::from_le_bytes([
                    data[off],
                    data[off + 1],
                    data[off + 2],
                    data[off + 3],
                ]),
                size: u32::from_le_bytes([
                    data[off + 4],
                    data[off + 5],
                    data[off + 6],
                    data[off + 7],
                ]),
            });
        }
        dirs
    }

    /// Serialized size in bytes.
    pub fn size(&self) -> usize {
        match self {
            Self::Pe32(h) => {
                Self::PE32_DIRECTORY_OFFSET + h.data_directories.len() * DataDirectory::SIZE
            }
            Self::Pe32Plus(h) => {
                Self::PE32PLUS_DIRECTORY_OFFSET + h.data_directories.len() * DataDirectory::SIZE
            }
            Self::Rom(h) => Self::STANDARD_SIZE + h.tail.len(),
        }
    }

    /// Reserialize the header from the typed fields.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.size());
        match self {
            Self::Pe32(h) => {
                buf.extend_from_slice(&PE32_MAGIC.to_le_bytes());
                buf.push(h.major_linker_version);
                buf.push(h.minor_linker_version);
                buf.extend_from_slice(&h.size_of_code.to_le_bytes());
                buf.extend_from_slice(&h.size_of_initialized_data.to_le_bytes());
                buf.extend_from_slice(&h.size_of_uninitialized_data.to_le_bytes());
                buf.extend_from_slice(&h.address_of_entry_point.to_le_bytes());
                buf.extend_from_slice(&h.base_of_code.to_le_bytes());
                buf.extend_from_slice(&h.base_of_data.to_le_bytes());
                buf.extend_from_slice(&h.image_base.to_le_bytes());
                buf.extend_from_slice(&h.section_alignment.to_le_bytes());
                buf.extend_from_slice(&h.file_alignment.to_le_bytes());
                buf.extend_from_slice(&h.major_operating_system_version.to_le_bytes());
                buf.extend_from_slice(&h.minor_operating_system_version.to_le_bytes());
                buf.extend_from_slice(&h.major_image_version.to_le_bytes());
                buf.extend_from_slice(&h.minor_image_version.to_le_bytes());
                buf.extend_from_slice(&h.major_subsystem_version.to_le_bytes());
                buf.extend_from_slice(&h.minor_subsystem_version.to_le_bytes());
                buf.extend_from_slice(&h.win32_version_value.to_le_bytes());
                buf.extend_from_slice(&h.size_of_image.to_le_bytes());
                buf.extend_from_slice(&h.size_of_headers.to_le_bytes());
                buf.extend_from_slice(&h.check_sum.to_le_bytes());
                buf.extend_from_slice(&h.subsystem.to_le_bytes());
                buf.extend_from_slice(&h.dll_characteristics.to_le_bytes());
                buf.extend_from_slice(&h.size_of_stack_reserve.to_le_bytes());
                buf.extend_from_slice(&h.size_of_stack_commit.to_le_bytes());
                buf.extend_from_slice(&h.size_of_heap_reserve.to_le_bytes());
                buf.extend_from_slice(&h.size_of_heap_commit.to_le_bytes());
                buf.extend_from_slice(&h.loader_flags.to_le_bytes());
                buf.extend_from_slice(&(h.data_directories.len() as u32).to_le_bytes());
                for dir in &h.data_directories {
                    buf.extend_from_slice(&dir.virtual_address.to_le_bytes());
                    buf.extend_from_slice(&dir.size.to_le_bytes());
                }
            }
            Self::Pe32Plus(h) => {
                buf.extend_from_slice(&PE32PLUS_MAGIC.to_le_bytes());
                buf.push(h.major_linker_version);
                buf.push(h.minor_linker_version);
                buf.extend_from_slice(&h.size_of_code.to_le_bytes());
                buf.extend_from_slice(&h.size_of_initialized_data.to_le_bytes());
                buf.extend_from_slice(&h.size_of_uninitialized_data.to_le_bytes());
                buf.extend_from_slice(&h.address_of_entry_point.to_le_bytes());
                buf.extend_from_slice(&h.base_of_code.to_le_bytes());
                buf.extend_from_slice(&h.image_base.to_le_bytes());
                buf.extend_from_slice(&h.section_alignment.to_le_bytes());
                buf.extend_from_slice(&h.file_alignment.to_le_bytes());
                buf.extend_from_slice(&h.major_operating_system_version.to_le_bytes());
                buf.extend_from_slice(&h.minor_operating_system_version.to_le_bytes());
                buf.extend_from_slice(&h.major_image_version.to_le_bytes());
                buf.extend_from_slice(&h.minor_image_version.to_le_bytes());
                buf.extend_from_slice(&h.major_subsystem_version.to_le_bytes());
                buf.extend_from_slice(&h.minor_subsystem_version.to_le_bytes());
                buf.extend_from_slice(&h.win32_version_value.to_le_bytes());
                buf.extend_from_slice(&h.size_of_image.to_le_bytes());
                buf.extend_from_slice(&h.size_of_headers.to_le_bytes());
                buf.extend_from_slice(&h.check_sum.to_le_bytes());
                buf.extend_from_slice(&h.subsystem.to_le_bytes());
                buf.extend_from_slice(&h.dll_characteristics.to_le_bytes());
                buf.extend_from_slice(&h.size_of_stack_reserve.to_le_bytes());
                buf.extend_from_slice(&h.size_of_stack_commit.to_le_bytes());
                buf.extend_from_slice(&h.size_of_heap_reserve.to_le_bytes());
                buf.extend_from_slice(&h.size_of_heap_commit.to_le_bytes());
                buf.extend_from_slice(&h.loader_flags.to_le_bytes());
                buf.extend_from_slice(&(h.data_directories.len() as u32).to_le_bytes());
                for dir in &h.data_directories {
                    buf.extend_from_slice(&dir.virtual_address.to_le_bytes());
                    buf.extend_from_slice(&dir.size.to_le_bytes());
                }
            }
            Self::Rom(h) => {
                buf.extend_from_slice(&ROM_MAGIC.to_le_bytes());
                buf.push(h.major_linker_version);
                buf.push(h.minor_linker_version);
                buf.extend_from_slice(&h.size_of_code.to_le_bytes());
                buf.extend_from_slice(&h.size_of_initialized_data.to_le_bytes());
                buf.extend_from_slice(&h.size_of_uninitialized_data.to_le_bytes());
                buf.extend_from_slice(&h.address_of_entry_point.to_le_bytes());
                buf.extend_from_slice(&h.base_of_code.to_le_bytes());
                buf.extend_from_slice(&h.tail);
            }
        }
        buf
    }

    /// Write the header at the current stream position.
    pub fn write_to<W: Write + Seek>(&self, w: &mut W) -> Result<()> {
        w.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// The magic value of this variant.
    pub fn magic(&self) -> u16 {
        match self {
            Self::Pe32(_) => PE32_MAGIC,
            Self::Pe32Plus(_) => PE32PLUS_MAGIC,
            Self::Rom(_) => ROM_MAGIC,
        }
    }

    /// Returns true if this is a PE32+ header.
    pub fn is_pe32plus(&self) -> bool {
        matches!(self, Self::Pe32Plus(_))
    }

    pub fn address_of_entry_point(&self) -> u32 {
        match self {
            Self::Pe32(h) => h.address_of_entry_point,
            Self::Pe32Plus(h) => h.address_of_entry_point,
            Self::Rom(h) => h.address_of_entry_point,
        }
    }

    pub fn image_base(&self) -> u64 {
        match self {
            Self::Pe32(h) => h.image_base as u64,
            Self::Pe32Plus(h) => h.image_base,
            Self::Rom(_) => 0,
        }
    }

    /// File alignment; zero for ROM headers (no alignment adjustment).
    pub fn file_alignment(&self) -> u32 {
        match self {
            Self::Pe32(h) => h.file_alignment,
            Self::Pe32Plus(h) => h.file_alignment,
            Self::Rom(_) => 0,
        }
    }

    pub fn section_alignment(&self) -> u32 {
        match self {
            Self::Pe32(h) => h.section_alignment,
            Self::Pe32Plus(h) => h.section_alignment,
            Self::Rom(_) => 0,
        }
    }

    pub fn size_of_image(&self) -> u32 {
        match self {
            Self::Pe32(h) => h.size_of_image,
            Self::Pe32Plus(h) => h.size_of_image,
            Self::Rom(_) => 0,
        }
    }

    pub fn set_size_of_image(&mut self, size: u32) {
        match self {
            Self::Pe32(h) => h.size_of_image = size,
            Self::Pe32Plus(h) => h.size_of_image = size,
            Self::Rom(_) => {}
        }
    }

    pub fn size_of_headers(&self) -> u32 {
        match self {
            Self::Pe32(h) => h.size_of_headers,
            Self::Pe32Plus(h) => h.size_of_headers,
            Self::Rom(_) => 0,
        }
    }

    pub fn set_size_of_headers(&mut self, size: u32) {
        match self {
            Self::Pe32(h) => h.size_of_headers = size,
            Self::Pe32Plus(h) => h.size_of_headers = size,
            Self::Rom(_) => {}
        }
    }

    pub fn base_of_code(&self) -> u32 {
        match self {
            Self::Pe32(h) => h.base_of_code,
            Self::Pe32Plus(h) => h.base_of_code,
            Self::Rom(h) => h.base_of_code,
        }
    }

    pub fn set_base_of_code(&mut self, rva: u32) {
        match self {
            Self::Pe32(h) => h.base_of_code = rva,
            Self::Pe32Plus(h) => h.base_of_code = rva,
            Self::Rom(h) => h.base_of_code = rva,
        }
    }

    pub fn check_sum(&self) -> u32 {
        match self {
            Self::Pe32(h) => h.check_sum,
            Self::Pe32Plus(h) => h.check_sum,
            Self::Rom(_) => 0,
        }
    }

    pub fn set_check_sum(&mut self, checksum: u32) {
        match self {
            Self::Pe32(h) => h.check_sum = checksum,
            Self::Pe32Plus(h) => h.check_sum = checksum,
            Self::Rom(_) => {}
        }
    }

    /// Number of data directories (`number_of_rva_and_sizes`).
    pub fn number_of_rva_and_sizes(&self) -> u32 {
        self.data_directories().len() as u32
    }

    pub fn data_directories(&self) -> &[DataDirectory] {
        match self {
            Self::Pe32(h) => &h.data_directories,
            Self::Pe32Plus(h) => &h.data_directories,
            Self::Rom(_) => &[],
        }
    }

    /// Mutable access to the data directory array.
    ///
    /// # Panics
    /// Panics for ROM headers, which carry no directory array.
    pub fn data_directories_mut(&mut self) -> &mut Vec<DataDirectory> {
        match self {
            Self::Pe32(h) => &mut h.data_directories,
            Self::Pe32Plus(h) => &mut h.data_directories,
            Self::Rom(_) => panic!("ROM optional headers have no data directories"),
        }
    }

    /// Get a well-known data directory, if the array extends that far.
    pub fn data_directory(&self, dir_type: DataDirectoryType) -> Option<&DataDirectory> {
        self.data_directories().get(dir_type.index())
    }

    /// Set a well-known data directory. Directories the array does not reach
    /// are ignored; use `add_data_directory` on the image to grow the array.
    pub fn set_data_directory(&mut self, dir_type: DataDirectoryType, rva: u32, size: u32) {
        if matches!(self, Self::Rom(_)) {
            return;
        }
        if let Some(dir) = self.data_directories_mut().get_mut(dir_type.index()) {
            dir.virtual_address = rva;
            dir.size = size;
        }
    }
}
