//! Little-endian byte codec over seekable streams.
//!
//! PE and COFF files are packed little-endian records cross-referenced by
//! absolute file offsets, so both parsing and emission hop around a single
//! seekable stream. The two legacy exceptions are the DOS `e_magic` field and
//! the PE signature, which are stored big-endian.

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::{Error, Result};

/// DOS "MZ" signature value (big-endian on disk).
pub const DOS_SIGNATURE: u16 = 0x4D5A;
/// OS/2 "NE" signature value.
pub const OS2_SIGNATURE: u16 = 0x4E45;
/// OS/2 "LE" signature value.
pub const OS2_SIGNATURE_LE: u16 = 0x4C45;
/// PE signature ("PE\0\0", big-endian on disk).
pub const PE_SIGNATURE: u32 = 0x50450000;

/// Align `value` up to a multiple of `alignment`.
///
/// An alignment of zero means no alignment adjustment (COFF object files).
pub fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment == 0 || value % alignment == 0 {
        value
    } else {
        value - value % alignment + alignment
    }
}

/// Reads `len` bytes into a fresh vector.
///
/// Allocation grows with the bytes actually present, so a bogus length in a
/// malformed header cannot trigger a huge up-front allocation.
pub fn read_vec<R: Read + Seek + ?Sized>(
    r: &mut R,
    len: usize,
    context: &'static str,
) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    (&mut *r).take(len as u64).read_to_end(&mut buf)?;
    if buf.len() < len {
        return Err(Error::truncated(context));
    }
    Ok(buf)
}

/// Extension methods for reading fixed-layout fields from a seekable stream.
pub trait ReadExt: Read + Seek {
    /// Like `read_exact`, but reports end-of-stream as `TruncatedStream`
    /// with the name of the structure being read.
    fn read_exact_ctx(&mut self, buf: &mut [u8], context: &'static str) -> Result<()> {
        self.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => Error::truncated(context),
            _ => Error::Io(e),
        })
    }

    fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact_ctx(&mut buf, "u8")?;
        Ok(buf[0])
    }

    fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_exact_ctx(&mut buf, "u16")?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_u16_be(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_exact_ctx(&mut buf, "u16")?;
        Ok(u16::from_be_bytes(buf))
    }

    fn read_i16(&mut self) -> Result<i16> {
        let mut buf = [0u8; 2];
        self.read_exact_ctx(&mut buf, "i16")?;
        Ok(i16::from_le_bytes(buf))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact_ctx(&mut buf, "u32")?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u32_be(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact_ctx(&mut buf, "u32")?;
        Ok(u32::from_be_bytes(buf))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact_ctx(&mut buf, "u64")?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Reads a fixed-length NUL-padded ASCII field.
    fn read_fixed_ascii(&mut self, len: usize, context: &'static str) -> Result<String> {
        let buf = read_vec(self, len, context)?;
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
    }

    /// Reads a NUL-terminated ASCII string from the current position.
    fn read_cstring(&mut self) -> Result<String> {
        let mut bytes = Vec::new();
        loop {
            let b = self.read_u8()?;
            if b == 0 {
                break;
            }
            bytes.push(b);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Reads a UTF-16LE string terminated by a double NUL.
    fn read_utf16_cstring(&mut self) -> Result<String> {
        let mut units = Vec::new();
        loop {
            let unit = self.read_u16()?;
            if unit == 0 {
                break;
            }
            units.push(unit);
        }
        Ok(String::from_utf16_lossy(&units))
    }

    /// Current stream position.
    fn pos(&mut self) -> Result<u64> {
        self.stream_position().map_err(|_| Error::StreamNotSeekable)
    }

    /// Seeks to an absolute offset.
    fn seek_to(&mut self, offset: u64) -> Result<u64> {
        self.seek(SeekFrom::Start(offset))
            .map_err(|_| Error::StreamNotSeekable)
    }

    /// Total stream length; restores the current position afterwards.
    fn stream_len(&mut self) -> Result<u64> {
        let pos = self.pos()?;
        let len = self
            .seek(SeekFrom::End(0))
            .map_err(|_| Error::StreamNotSeekable)?;
        self.seek_to(pos)?;
        Ok(len)
    }
}

impl<R: Read + Seek + ?Sized> ReadExt for R {}

/// Extension methods for writing fixed-layout fields to a seekable stream.
pub trait WriteExt: Write + Seek {
    fn write_u8(&mut self, v: u8) -> Result<()> {
        self.write_all(&[v])?;
        Ok(())
    }

    fn write_u16(&mut self, v: u16) -> Result<()> {
        self.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    fn write_u16_be(&mut self, v: u16) -> Result<()> {
        self.write_all(&v.to_be_bytes())?;
        Ok(())
    }

    fn write_i16(&mut self, v: i16) -> Result<()> {
        self.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    fn write_u32(&mut self, v: u32) -> Result<()> {
        self.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    fn write_u32_be(&mut self, v: u32) -> Result<()> {
        self.write_all(&v.to_be_bytes())?;
        Ok(())
    }

    fn write_u64(&mut self, v: u64) -> Result<()> {
        self.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    /// Writes a fixed-length ASCII field, NUL-padded. Input longer than the
    /// field is truncated; setters validate lengths before this point.
    fn write_fixed_ascii(&mut self, s: &str, len: usize) -> Result<()> {
        let bytes = s.as_bytes();
        let n = bytes.len().min(len);
        self.write_all(&bytes[..n])?;
        for _ in n..len {
            self.write_all(&[0])?;
        }
        Ok(())
    }

    /// Writes a NUL-terminated ASCII string.
    fn write_cstring(&mut self, s: &str) -> Result<()> {
        self.write_all(s.as_bytes())?;
        self.write_all(&[0])?;
        Ok(())
    }

    /// Current stream position.
    fn wpos(&mut self) -> Result<u64> {
        self.stream_position().map_err(|_| Error::StreamNotSeekable)
    }

    /// Seeks to an absolute offset.
    fn wseek_to(&mut self, offset: u64) -> Result<u64> {
        self.seek(SeekFrom::Start(offset))
            .map_err(|_| Error::StreamNotSeekable)
    }

    /// Advances to `offset`, writing explicit zero bytes rather than leaving
    /// a seek hole. Seeks backwards when the target is behind the cursor.
    fn pad_to(&mut self, offset: u64) -> Result<()> {
        let pos = self.wpos()?;
        if offset <= pos {
            self.wseek_to(offset)?;
            return Ok(());
        }
        let mut remaining = offset - pos;
        let zeros = [0u8; 64];
        while remaining > 0 {
            let n = remaining.min(zeros.len() as u64) as usize;
            self.write_all(&zeros[..n])?;
            remaining -= n as u64;
        }
        Ok(())
    }

    /// Zero-pads to the next multiple of `alignment`.
    fn pad_align(&mut self, alignment: u64) -> Result<()> {
        let pos = self.wpos()?;
        self.pad_to(align_up(pos, alignment))
    }
}

impl<W: Write + Seek + ?Sized> WriteExt for W {}
