//! The rich header.
//!
//! Microsoft linkers hide a tool-version inventory between the DOS header
//! and the PE signature: a `DanS` start marker, XOR-masked entries of
//! `{product_id, build, use_count}`, and a trailing `Rich` marker followed
//! by the XOR key. The header is undocumented and absent from many images;
//! decoding is read-only and never affects emission, since the stub bytes
//! round-trip verbatim.

/// One rich header entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RichEntry {
    /// Product identifier (the tool that contributed objects)
    pub product_id: u16,
    /// Tool build number
    pub build: u16,
    /// Number of objects the tool contributed
    pub use_count: u32,
}

/// A decoded rich header.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RichHeader {
    /// XOR key stored after the `Rich` marker
    pub key: u32,
    /// Decoded entries in file order
    pub entries: Vec<RichEntry>,
}

const DANS_MARKER: u32 = 0x536E6144; // "DanS"
const RICH_MARKER: u32 = 0x68636952; // "Rich"

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

impl RichHeader {
    /// Decode the rich header from the DOS stub bytes, if present.
    pub fn parse(stub: &[u8]) -> Option<Self> {
        // Find the "Rich" marker; the key follows it
        let mut rich_offset = None;
        let mut offset = 0;
        while offset + 8 <= stub.len() {
            if read_u32(stub, offset) == Some(RICH_MARKER) {
                rich_offset = Some(offset);
            }
            offset += 4;
        }
        let rich_offset = rich_offset?;
        let key = read_u32(stub, rich_offset + 4)?;

        // Walk backwards to the masked "DanS" marker
        let mut start = None;
        let mut offset = rich_offset;
        while offset >= 4 {
            offset -= 4;
            if read_u32(stub, offset)? ^ key == DANS_MARKER {
                start = Some(offset);
                break;
            }
        }
        let start = start?;

        // Entries begin after DanS and three masked padding words
        let mut entries = Vec::new();
        let mut offset = start + 16;
        while offset + 8 <= rich_offset {
            let id_build = read_u32(stub, offset)? ^ key;
            let use_count = read_u32(stub, offset + 4)? ^ key;
            entries.push(RichEntry {
                product_id: (id_build >> 16) as u16,
                build: (id_build & 0xFFFF) as u16,
                use_count,
            });
            offset += 8;
        }

        Some(Self { key, entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_stub(key: u32, entries: &[(u16, u16, u32)]) -> Vec<u8> {
        let mut stub = vec![0u8; 16]; // pretend DOS code before the header
        stub.extend_from_slice(&(DANS_MARKER ^ key).to_le_bytes());
        for _ in 0..3 {
            stub.extend_from_slice(&key.to_le_bytes()); // masked zero padding
        }
        for &(product_id, build, use_count) in entries {
            let id_build = ((product_id as u32) << 16) | build as u32;
            stub.extend_from_slice(&(id_build ^ key).to_le_bytes());
            stub.extend_from_slice(&(use_count ^ key).to_le_bytes());
        }
        stub.extend_from_slice(&RICH_MARKER.to_le_bytes());
        stub.extend_from_slice(&key.to_le_bytes());
        stub
    }

    #[test]
    fn test_decode() {
        let stub = build_stub(0xA1B2C3D4, &[(0x0105, 26706, 12), (0x0001, 0, 3)]);
        let header = RichHeader::parse(&stub).unwrap();
        assert_eq!(header.key, 0xA1B2C3D4);
        assert_eq!(header.entries.len(), 2);
        assert_eq!(header.entries[0].product_id, 0x0105);
        assert_eq!(header.entries[0].build, 26706);
        assert_eq!(header.entries[0].use_count, 12);
    }

    #[test]
    fn test_absent() {
        assert!(RichHeader::parse(&[0u8; 64]).is_none());
        assert!(RichHeader::parse(&[]).is_none());
    }
}
