//! The DOS header and stub.
//!
//! Every PE image begins with the 64-byte DOS executable header; `e_lfanew`
//! holds the absolute file offset of the PE signature, and the bytes between
//! the header and the signature are the DOS stub. All of the legacy fields
//! are carried so that emission is byte-exact.

use std::io::{Read, Seek, Write};

use pewter_coff::codec::{DOS_SIGNATURE, OS2_SIGNATURE, OS2_SIGNATURE_LE};
use pewter_coff::{Error, ReadExt, Result, WriteExt};

/// DOS Header (64 bytes)
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DosHeader {
    /// Magic number, big-endian on disk: MZ, NE, or LE
    pub e_magic: u16,
    /// Bytes on last page of file
    pub e_cblp: u16,
    /// Pages in file
    pub e_cp: u16,
    /// Relocations
    pub e_crlc: u16,
    /// Size of header in paragraphs
    pub e_cparhdr: u16,
    /// Minimum extra paragraphs needed
    pub e_minalloc: u16,
    /// Maximum extra paragraphs needed
    pub e_maxalloc: u16,
    /// Initial (relative) SS value
    pub e_ss: u16,
    /// Initial SP value
    pub e_sp: u16,
    /// Checksum
    pub e_csum: u16,
    /// Initial IP value
    pub e_ip: u16,
    /// Initial (relative) CS value
    pub e_cs: u16,
    /// File address of relocation table
    pub e_lfarlc: u16,
    /// Overlay number
    pub e_ovno: u16,
    /// Reserved words
    pub e_res: [u16; 4],
    /// OEM identifier
    pub e_oemid: u16,
    /// OEM information
    pub e_oeminfo: u16,
    /// Reserved words
    pub e_res2: [u16; 10],
    /// File offset of the PE signature
    pub e_lfanew: u32,
}

impl DosHeader {
    /// Size of the DOS header in bytes.
    pub const SIZE: usize = 64;

    /// Parse a DOS header from the current stream position.
    pub fn read_from<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let e_magic = r.read_u16_be()?;
        if e_magic != DOS_SIGNATURE && e_magic != OS2_SIGNATURE && e_magic != OS2_SIGNATURE_LE {
            return Err(Error::InvalidImageSignature(e_magic as u32));
        }

        let e_cblp = r.read_u16()?;
        let e_cp = r.read_u16()?;
        let e_crlc = r.read_u16()?;
        let e_cparhdr = r.read_u16()?;
        let e_minalloc = r.read_u16()?;
        let e_maxalloc = r.read_u16()?;
        let e_ss = r.read_u16()?;
        let e_sp = r.read_u16()?;
        let e_csum = r.read_u16()?;
        let e_ip = r.read_u16()?;
        let e_cs = r.read_u16()?;
        let e_lfarlc = r.read_u16()?;
        let e_ovno = r.read_u16()?;
        let mut e_res = [0u16; 4];
        for slot in &mut e_res {
            *slot = r.read_u16()?;
        }
        let e_oemid = r.read_u16()?;
        let e_oeminfo = r.read_u16()?;
        let mut e_res2 = [0u16; 10];
        for slot in &mut e_res2 {
            *slot = r.read_u16()?;
        }
        let e_lfanew = r.read_u32()?;

        Ok(Self {
            e_magic,
            e_cblp,
            e_cp,
            e_crlc,
            e_cparhdr,
            e_minalloc,
            e_maxalloc,
            e_ss,
            e_sp,
            e_csum,
            e_ip,
            e_cs,
            e_lfarlc,
            e_ovno,
            e_res,
            e_oemid,
            e_oeminfo,
            e_res2,
            e_lfanew,
        })
    }

    /// Write the header at the current stream position.
    pub fn write_to<W: Write + Seek>(&self, w: &mut W) -> Result<()> {
        w.write_u16_be(self.e_magic)?;
        w.write_u16(self.e_cblp)?;
        w.write_u16(self.e_cp)?;
        w.write_u16(self.e_crlc)?;
        w.write_u16(self.e_cparhdr)?;
        w.write_u16(self.e_minalloc)?;
        w.write_u16(self.e_maxalloc)?;
        w.write_u16(self.e_ss)?;
        w.write_u16(self.e_sp)?;
        w.write_u16(self.e_csum)?;
        w.write_u16(self.e_ip)?;
        w.write_u16(self.e_cs)?;
        w.write_u16(self.e_lfarlc)?;
        w.write_u16(self.e_ovno)?;
        for word in self.e_res {
            w.write_u16(word)?;
        }
        w.write_u16(self.e_oemid)?;
        w.write_u16(self.e_oeminfo)?;
        for word in self.e_res2 {
            w.write_u16(word)?;
        }
        w.write_u32(self.e_lfanew)?;
        Ok(())
    }
}

impl Default for DosHeader {
    /// The header MSVC-era linkers emit in front of the canonical stub.
    fn default() -> Self {
        Self {
            e_magic: DOS_SIGNATURE,
            e_cblp: 0x90,
            e_cp: 3,
            e_crlc: 0,
            e_cparhdr: 4,
            e_minalloc: 0,
            e_maxalloc: 0xFFFF,
            e_ss: 0,
            e_sp: 0xB8,
            e_csum: 0,
            e_ip: 0,
            e_cs: 0,
            e_lfarlc: 0x40,
            e_ovno: 0,
            e_res: [0; 4],
            e_oemid: 0,
            e_oeminfo: 0,
            e_res2: [0; 10],
            e_lfanew: (Self::SIZE + DEFAULT_DOS_STUB.len()) as u32,
        }
    }
}

/// The canonical "This program cannot be run in DOS mode" stub.
pub const DEFAULT_DOS_STUB: [u8; 64] = [
    0x0E, 0x1F, 0xBA, 0x0E, 0x00, 0xB4, 0x09, 0xCD, 0x21, 0xB8, 0x01, 0x4C, 0xCD, 0x21, 0x54,
    0x68, 0x69, 0x73, 0x20, 0x70, 0x72, 0x6F, 0x67, 0x72, 0x61, 0x6D, 0x20, 0x63, 0x61, 0x6E,
    0x6E, 0x6F, 0x74, 0x20, 0x62, 0x65, 0x20, 0x72, 0x75, 0x6E, 0x20, 0x69, 0x6E, 0x20, 0x44,
    0x4F, 0x53, 0x20, 0x6D, 0x6F, 0x64, 0x65, 0x2E, 0x0D, 0x0D, 0x0A, 0x24, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00,
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_roundtrip() {
        let header = DosHeader::default();
        let mut cur = Cursor::new(Vec::new());
        header.write_to(&mut cur).unwrap();
        assert_eq!(cur.get_ref().len(), DosHeader::SIZE);
        assert_eq!(&cur.get_ref()[..2], b"MZ");

        cur.seek_to(0).unwrap();
        assert_eq!(DosHeader::read_from(&mut cur).unwrap(), header);
    }

    #[test]
    fn test_bad_magic() {
        let mut cur = Cursor::new(vec![0u8; 64]);
        assert!(matches!(
            DosHeader::read_from(&mut cur),
            Err(Error::InvalidImageSignature(0))
        ));
    }

    #[test]
    fn test_os2_magics_accepted() {
        let mut bytes = vec![0u8; 64];
        bytes[0] = b'N';
        bytes[1] = b'E';
        let mut cur = Cursor::new(bytes);
        assert!(DosHeader::read_from(&mut cur).is_ok());
    }

    #[test]
    fn test_truncated() {
        let mut cur = Cursor::new(vec![b'M', b'Z', 0]);
        assert!(DosHeader::read_from(&mut cur).is_err());
    }
}
