//! The COFF string table.
//!
//! On disk: a 4-byte little-endian total size (inclusive of the size field
//! itself), followed by a packed run of NUL-terminated ASCII strings.
//! Offsets follow the PE specification convention: they are relative to the
//! start of the size field, so the first entry sits at offset 4.

use std::io::{Read, Seek, Write};

use crate::codec::{read_vec, ReadExt, WriteExt};
use crate::Result;

/// First valid entry offset: right behind the 4-byte size field.
const FIRST_OFFSET: u32 = 4;

/// The string table: an ordered mapping from byte offset to string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StringTable {
    entries: Vec<(u32, String)>,
    /// A malformed-but-seen-in-the-wild size field of zero; preserved so the
    /// emitted table matches the input byte for byte.
    zero_size_field: bool,
}

impl StringTable {
    /// Creates an empty string table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a string table from the current stream position.
    ///
    /// A size field of zero (observed in malformed `.res`-style files) is
    /// tolerated and yields an empty table.
    pub fn read_from<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let size = r.read_u32()?;
        if size == 0 {
            return Ok(Self {
                entries: Vec::new(),
                zero_size_field: true,
            });
        }

        let blob = read_vec(r, size.saturating_sub(4) as usize, "string table")?;
        let mut entries = Vec::new();
        let mut start = 0usize;
        for (i, &b) in blob.iter().enumerate() {
            if b == 0 {
                let s = String::from_utf8_lossy(&blob[start..i]).into_owned();
                entries.push((FIRST_OFFSET + start as u32, s));
                start = i + 1;
            }
        }
        // An unterminated trailing run still becomes an entry; writing adds
        // the missing NUL.
        if start < blob.len() {
            let s = String::from_utf8_lossy(&blob[start..]).into_owned();
            entries.push((FIRST_OFFSET + start as u32, s));
        }

        Ok(Self {
            entries,
            zero_size_field: false,
        })
    }

    /// Write the table (size field plus strings) at the current position.
    pub fn write_to<W: Write + Seek>(&self, w: &mut W) -> Result<()> {
        if self.entries.is_empty() && self.zero_size_field {
            w.write_u32(0)?;
            return Ok(());
        }
        w.write_u32(self.disk_size())?;
        for (_, s) in &self.entries {
            w.write_cstring(s)?;
        }
        Ok(())
    }

    /// Adds a string and returns its byte offset.
    pub fn add(&mut self, s: &str) -> u32 {
        let offset = self.end_offset();
        self.entries.push((offset, s.to_string()));
        self.zero_size_field = false;
        offset
    }

    /// Removes the entry at exactly `offset`, re-deriving the offsets of all
    /// later entries. Returns the removed string. Symbols still referencing
    /// later offsets must be re-pointed by the caller.
    pub fn remove(&mut self, offset: u32) -> Option<String> {
        let idx = self.entries.iter().position(|(off, _)| *off == offset)?;
        let (_, removed) = self.entries.remove(idx);
        let mut next = if idx == 0 {
            FIRST_OFFSET
        } else {
            let (prev_off, prev) = &self.entries[idx - 1];
            prev_off + prev.len() as u32 + 1
        };
        for (off, s) in &mut self.entries[idx..] {
            *off = next;
            next += s.len() as u32 + 1;
        }
        Some(removed)
    }

    /// Looks up a string by offset. Exact entry offsets return the whole
    /// string; offsets into the middle of an entry return its suffix (real
    /// linkers emit such references for shared suffixes).
    pub fn get(&self, offset: u32) -> Option<&str> {
        for (off, s) in &self.entries {
            if offset == *off {
                return Some(s);
            }
            // The terminating NUL belongs to the entry: a reference to it
            // yields the empty string.
            if offset > *off && offset <= *off + s.len() as u32 {
                return Some(&s[(offset - *off) as usize..]);
            }
        }
        None
    }

    /// Iterates over `(offset, string)` entries in offset order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> + '_ {
        self.entries.iter().map(|(off, s)| (*off, s.as_str()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table holds no strings.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total on-disk size including the 4-byte size field.
    pub fn disk_size(&self) -> u32 {
        self.end_offset()
    }

    fn end_offset(&self) -> u32 {
        FIRST_OFFSET
            + self
                .entries
                .iter()
                .map(|(_, s)| s.len() as u32 + 1)
                .sum::<u32>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_first_offset_is_four() {
        let mut table = StringTable::new();
        assert_eq!(table.add("hello"), 4);
        assert_eq!(table.add("world"), 4 + 6);
        assert_eq!(table.disk_size(), 4 + 6 + 6);
    }

    #[test]
    fn test_roundtrip() {
        let mut table = StringTable::new();
        table.add("first_symbol_name");
        table.add("second");
        table.add("");

        let mut cur = Cursor::new(Vec::new());
        table.write_to(&mut cur).unwrap();
        assert_eq!(cur.get_ref().len() as u32, table.disk_size());

        cur.seek_to(0).unwrap();
        let parsed = StringTable::read_from(&mut cur).unwrap();
        assert_eq!(parsed, table);
    }

    #[test]
    fn test_zero_size_tolerated_and_preserved() {
        let mut cur = Cursor::new(vec![0u8; 4]);
        let parsed = StringTable::read_from(&mut cur).unwrap();
        assert!(parsed.is_empty());

        let mut out = Cursor::new(Vec::new());
        parsed.write_to(&mut out).unwrap();
        assert_eq!(out.into_inner(), vec![0u8; 4]);
    }

    #[test]
    fn test_get_exact_and_suffix() {
        let mut table = StringTable::new();
        let off = table.add("filename.c");
        assert_eq!(table.get(off), Some("filename.c"));
        // Suffix reference into the middle of the entry
        assert_eq!(table.get(off + 8), Some(".c"));
        // Reference to the terminating NUL
        assert_eq!(table.get(off + 10), Some(""));
        assert_eq!(table.get(off + 11), None);
        assert_eq!(table.get(0), None);
    }

    #[test]
    fn test_remove_recomputes_offsets() {
        let mut table = StringTable::new();
        let a = table.add("aaa");
        let b = table.add("bbbb");
        let c = table.add("cc");
        assert_eq!((a, b, c), (4, 8, 13));

        assert_eq!(table.remove(b), Some("bbbb".to_string()));
        let offsets: Vec<u32> = table.iter().map(|(off, _)| off).collect();
        assert_eq!(offsets, vec![4, 8]);
        assert_eq!(table.get(8), Some("cc"));
        assert_eq!(table.remove(100), None);
    }

    #[test]
    fn test_empty_table_disk_size() {
        let table = StringTable::new();
        assert_eq!(table.disk_size(), 4);
        let mut cur = Cursor::new(Vec::new());
        table.write_to(&mut cur).unwrap();
        assert_eq!(cur.into_inner(), 4u32.to_le_bytes().to_vec());
    }
}
