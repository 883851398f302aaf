//! The PE image: end-to-end parse and emit.
//!
//! Parse order: DOS header, stub, signature, COFF file header, optional
//! header, section headers and bodies, symbol and string tables, then one
//! sub-parser per populated data directory, and finally the overlay and
//! certificate table. Emission is the reverse, with a final layout pass up
//! front and a rewind to re-emit the optional header once the certificate
//! table has been placed.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use log::{debug, warn};

use pewter_coff::file_header::{IMAGE_FILE_BYTES_REVERSED_HI, IMAGE_FILE_BYTES_REVERSED_LO};
use pewter_coff::object::read_symbol_tables;
use pewter_coff::{
    CoffRelocation, DataDirectory, DataDirectoryType, Error, FileHeader, LineNumber,
    OptionalHeader, ReadExt, Result, Section, StringTable, Symbol, WriteExt, PE_SIGNATURE,
};

use crate::base_relocs::{parse_base_relocations, BaseRelocationDirectory};
use crate::certificates::{parse_certificates, AttributeCertificate};
use crate::checksum;
use crate::delay_imports::{parse_delay_imports, DelayLoadDescriptor};
use crate::dos::DosHeader;
use crate::exports::{parse_exports, ExportTable};
use crate::imports::{parse_imports, ImportDescriptor};
use crate::layout;
use crate::rva;

/// Options controlling `Image::read_from`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Discard overlay bytes instead of carrying them in the model.
    pub strip_overlay: bool,
}

/// A parsed PE image.
///
/// The image is a mutable document: mutations go through the component
/// APIs, each followed by an implicit layout pass unless layout is
/// suspended. An unmodified image writes back byte-identically.
#[derive(Debug, Clone)]
pub struct Image {
    /// DOS header
    pub dos_header: DosHeader,
    /// DOS stub bytes between the DOS header and the PE signature
    pub dos_stub: Vec<u8>,
    /// COFF file header
    pub file_header: FileHeader,
    /// Optional header
    pub optional_header: OptionalHeader,
    pub(crate) sections: Vec<Section>,
    pub(crate) symbols: Vec<Symbol>,
    pub(crate) string_table: StringTable,
    pub(crate) overlay: Vec<u8>,
    pub(crate) exports: Option<ExportTable>,
    pub(crate) imports: Vec<ImportDescriptor>,
    pub(crate) delay_imports: Vec<DelayLoadDescriptor>,
    pub(crate) base_relocations: Option<BaseRelocationDirectory>,
    pub(crate) certificates: Vec<AttributeCertificate>,
    pub(crate) layout_suspended: bool,
}

impl Image {
    /// Creates an empty image for the given machine, carrying the default
    /// DOS header and stub.
    pub fn new(machine: u16, optional_header: OptionalHeader) -> Self {
        Self {
            dos_header: DosHeader::default(),
            dos_stub: crate::dos::DEFAULT_DOS_STUB.to_vec(),
            file_header: FileHeader::new(machine),
            optional_header,
            sections: Vec::new(),
            symbols: Vec::new(),
            string_table: StringTable::new(),
            overlay: Vec::new(),
            exports: None,
            imports: Vec::new(),
            delay_imports: Vec::new(),
            base_relocations: None,
            certificates: Vec::new(),
            layout_suspended: false,
        }
    }

    /// Parse an image from a seekable stream. Offsets are absolute, so the
    /// image must start at stream position zero.
    pub fn read_from<R: Read + Seek>(r: &mut R, options: ReadOptions) -> Result<Self> {
        let dos_header = DosHeader::read_from(r)?;
        debug!("dos header: e_lfanew {:#x}", dos_header.e_lfanew);

        let stub_len = (dos_header.e_lfanew as usize).saturating_sub(DosHeader::SIZE);
        let dos_stub = pewter_coff::codec::read_vec(r, stub_len, "DOS stub")?;
        r.seek_to(dos_header.e_lfanew as u64)?;

        let signature = r.read_u32_be()?;
        if signature != PE_SIGNATURE {
            return Err(Error::InvalidImageSignature(signature));
        }

        let file_header = FileHeader::read_from(r)?;
        debug!(
            "file header: machine {:#06x}, {} sections",
            file_header.machine, file_header.number_of_sections
        );
        let optional_header = OptionalHeader::read_from(r, file_header.size_of_optional_header)?;
        debug!(
            "optional header: magic {:#05x}, {} directories",
            optional_header.magic(),
            optional_header.number_of_rva_and_sizes()
        );

        let mut sections = Vec::with_capacity(file_header.number_of_sections.min(512) as usize);
        for _ in 0..file_header.number_of_sections {
            sections.push(Section::read_from(r)?);
        }

        let (symbols, string_table) = read_symbol_tables(r, &file_header)?;

        // End of everything reachable from the headers; the overlay starts
        // here.
        let mut data_end = (optional_header.size_of_headers() as u64).max(r.pos()?);
        for section in &sections {
            data_end = data_end.max(section.file_end());
        }
        if file_header.pointer_to_symbol_table != 0 {
            data_end = data_end.max(
                file_header.pointer_to_symbol_table as u64
                    + file_header.number_of_symbols as u64 * Symbol::SIZE as u64
                    + string_table.disk_size() as u64,
            );
        }

        let big_endian = file_header.characteristics
            & (IMAGE_FILE_BYTES_REVERSED_LO | IMAGE_FILE_BYTES_REVERSED_HI)
            == (IMAGE_FILE_BYTES_REVERSED_LO | IMAGE_FILE_BYTES_REVERSED_HI);
        let is_64bit = optional_header.is_pe32plus();
        let directory = |t: DataDirectoryType| {
            optional_header
                .data_directory(t)
                .copied()
                .filter(DataDirectory::is_present)
        };

        let exports = directory(DataDirectoryType::ExportTable)
            .and_then(|dir| parse_exports(&sections, big_endian, dir));
        let imports = directory(DataDirectoryType::ImportTable)
            .map(|dir| parse_imports(&sections, big_endian, is_64bit, dir))
            .unwrap_or_default();
        let delay_imports = directory(DataDirectoryType::DelayImportDescriptor)
            .map(|dir| parse_delay_imports(&sections, big_endian, is_64bit, dir))
            .unwrap_or_default();
        let base_relocations = directory(DataDirectoryType::BaseRelocationTable)
            .and_then(|dir| parse_base_relocations(&sections, big_endian, dir));

        // The certificate directory also defines the overlay boundary. Its
        // first field is a file offset, not an RVA.
        let stream_len = r.stream_len()?;
        let mut overlay = Vec::new();
        let mut certificates = Vec::new();
        if let Some(dir) = directory(DataDirectoryType::CertificateTable) {
            let cert_offset = dir.virtual_address as u64;
            if cert_offset < data_end {
                warn!(
                    "certificate table at {:#x} overlaps image data ending at {:#x}",
                    cert_offset, data_end
                );
            } else {
                r.seek_to(data_end)?;
                let span =
                    pewter_coff::codec::read_vec(r, (cert_offset - data_end) as usize, "overlay")?;
                // Up to 7 zero bytes before the certificate table are
                // alignment padding, not overlay.
                if span.len() >= 8 || span.iter().any(|&b| b != 0) {
                    overlay = span;
                }
            }
            certificates = parse_certificates(r, dir.virtual_address as u64, dir.size)?;
        } else if data_end < stream_len {
            r.seek_to(data_end)?;
            overlay = pewter_coff::codec::read_vec(r, (stream_len - data_end) as usize, "overlay")?;
        }
        if options.strip_overlay {
            overlay.clear();
        }

        Ok(Self {
            dos_header,
            dos_stub,
            file_header,
            optional_header,
            sections,
            symbols,
            string_table,
            overlay,
            exports,
            imports,
            delay_imports,
            base_relocations,
            certificates,
            layout_suspended: false,
        })
    }

    /// Parse an image from a byte slice.
    pub fn parse(data: &[u8]) -> Result<Self> {
        Self::read_from(&mut Cursor::new(data), ReadOptions::default())
    }

    /// Parse an image from a byte slice with options.
    pub fn parse_with(data: &[u8], options: ReadOptions) -> Result<Self> {
        Self::read_from(&mut Cursor::new(data), options)
    }

    // ----- queries -----

    /// Sections in ascending virtual-address order.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Mutable access to the sections. Callers editing headers or bodies
    /// run `update_layout` themselves or rely on the final pass in `write`.
    pub fn sections_mut(&mut self) -> &mut Vec<Section> {
        &mut self.sections
    }

    /// COFF symbol records.
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// The string table.
    pub fn string_table(&self) -> &StringTable {
        &self.string_table
    }

    /// Mutable access to the string table.
    pub fn string_table_mut(&mut self) -> &mut StringTable {
        &mut self.string_table
    }

    /// Parsed import descriptors.
    pub fn imports(&self) -> &[ImportDescriptor] {
        &self.imports
    }

    /// Parsed delay-load import descriptors.
    pub fn delay_imports(&self) -> &[DelayLoadDescriptor] {
        &self.delay_imports
    }

    /// The parsed export table, when the image has one.
    pub fn exports(&self) -> Option<&ExportTable> {
        self.exports.as_ref()
    }

    /// The parsed base relocation directory, when the image has one.
    pub fn base_relocations(&self) -> Option<&BaseRelocationDirectory> {
        self.base_relocations.as_ref()
    }

    /// Attribute certificates.
    pub fn certificates(&self) -> &[AttributeCertificate] {
        &self.certificates
    }

    /// Overlay bytes past every structure reachable from the headers.
    pub fn overlay(&self) -> &[u8] {
        &self.overlay
    }

    /// Get a section by name.
    pub fn section_by_name(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name() == name)
    }

    /// The first section containing `rva`.
    pub fn section_for_rva(&self, rva: u32) -> Option<&Section> {
        rva::section_for_rva(&self.sections, rva)
    }

    fn reads_big_endian(&self) -> bool {
        let both = IMAGE_FILE_BYTES_REVERSED_LO | IMAGE_FILE_BYTES_REVERSED_HI;
        self.file_header.characteristics & both == both
    }

    fn resolved(&self, rva_value: u32, context: &'static str) -> Result<&Section> {
        self.section_for_rva(rva_value)
            .ok_or_else(|| Error::rva_out_of_range(rva_value, context))
    }

    /// Reads a u16 at `rva`.
    pub fn read_u16_at_rva(&self, rva_value: u32) -> Result<u16> {
        rva::read_u16(
            self.resolved(rva_value, "u16")?,
            rva_value,
            self.reads_big_endian(),
        )
    }

    /// Reads a u32 at `rva`.
    pub fn read_u32_at_rva(&self, rva_value: u32) -> Result<u32> {
        rva::read_u32(
            self.resolved(rva_value, "u32")?,
            rva_value,
            self.reads_big_endian(),
        )
    }

    /// Reads a u64 at `rva`.
    pub fn read_u64_at_rva(&self, rva_value: u32) -> Result<u64> {
        rva::read_u64(
            self.resolved(rva_value, "u64")?,
            rva_value,
            self.reads_big_endian(),
        )
    }

    /// Reads a NUL-terminated ASCII string at `rva`.
    pub fn read_string_at_rva(&self, rva_value: u32) -> Result<String> {
        rva::read_ascii_string(self.resolved(rva_value, "ascii string")?, rva_value)
    }

    /// Reads a double-NUL-terminated UTF-16 string at `rva`.
    pub fn read_utf16_string_at_rva(&self, rva_value: u32) -> Result<String> {
        rva::read_utf16_string(self.resolved(rva_value, "utf-16 string")?, rva_value)
    }

    /// Like `read_u16_at_rva`, returning None instead of an error.
    pub fn try_read_u16_at_rva(&self, rva_value: u32) -> Option<u16> {
        self.read_u16_at_rva(rva_value).ok()
    }

    /// Like `read_u32_at_rva`, returning None instead of an error.
    pub fn try_read_u32_at_rva(&self, rva_value: u32) -> Option<u32> {
        self.read_u32_at_rva(rva_value).ok()
    }

    /// Like `read_u64_at_rva`, returning None instead of an error.
    pub fn try_read_u64_at_rva(&self, rva_value: u32) -> Option<u64> {
        self.read_u64_at_rva(rva_value).ok()
    }

    // ----- mutators -----

    /// Appends a section.
    pub fn add_section(&mut self, section: Section) {
        self.sections.push(section);
        self.layout_after_mutation();
    }

    /// Removes the first section with the given name.
    pub fn remove_section(&mut self, name: &str) -> Option<Section> {
        let idx = self.sections.iter().position(|s| s.name() == name)?;
        let section = self.sections.remove(idx);
        self.layout_after_mutation();
        Some(section)
    }

    /// Appends a symbol record.
    pub fn add_symbol(&mut self, symbol: Symbol) {
        self.symbols.push(symbol);
        self.layout_after_mutation();
    }

    /// Removes the symbol at `index`.
    pub fn remove_symbol(&mut self, index: usize) -> Option<Symbol> {
        if index >= self.symbols.len() {
            return None;
        }
        let symbol = self.symbols.remove(index);
        self.layout_after_mutation();
        Some(symbol)
    }

    /// Adds a string to the string table, returning its offset.
    pub fn add_string(&mut self, s: &str) -> u32 {
        let offset = self.string_table.add(s);
        self.layout_after_mutation();
        offset
    }

    /// Removes the string at `offset` from the string table, re-deriving
    /// later offsets. Symbols referencing moved strings are the caller's
    /// responsibility.
    pub fn remove_string(&mut self, offset: u32) -> Option<String> {
        let removed = self.string_table.remove(offset)?;
        self.layout_after_mutation();
        Some(removed)
    }

    /// Grows the data directory array by one entry, returning its index.
    pub fn add_data_directory(&mut self, directory: DataDirectory) -> usize {
        let dirs = self.optional_header.data_directories_mut();
        dirs.push(directory);
        let index = dirs.len() - 1;
        self.layout_after_mutation();
        index
    }

    /// Points a well-known data directory at `{rva, size}`.
    pub fn set_data_directory(&mut self, dir_type: DataDirectoryType, rva: u32, size: u32) {
        self.optional_header.set_data_directory(dir_type, rva, size);
    }

    /// Appends an attribute certificate.
    pub fn add_certificate(&mut self, certificate: AttributeCertificate) {
        self.certificates.push(certificate);
    }

    /// Appends a relocation to the section at `section_index`.
    pub fn add_relocation(&mut self, section_index: usize, reloc: CoffRelocation) -> Result<()> {
        let section = self
            .sections
            .get_mut(section_index)
            .ok_or_else(|| Error::malformed("relocation", "section index out of bounds"))?;
        section.relocations.push(reloc);
        self.layout_after_mutation();
        Ok(())
    }

    /// Appends a line number to the section at `section_index`.
    pub fn add_line_number(&mut self, section_index: usize, line: LineNumber) -> Result<()> {
        let section = self
            .sections
            .get_mut(section_index)
            .ok_or_else(|| Error::malformed("line number", "section index out of bounds"))?;
        section.line_numbers.push(line);
        self.layout_after_mutation();
        Ok(())
    }

    // ----- lifecycle -----

    /// Suspends the implicit layout pass that follows each mutation.
    pub fn suspend_layout(&mut self) {
        self.layout_suspended = true;
    }

    /// Resumes implicit layout and runs one pass immediately.
    pub fn resume_layout(&mut self) {
        self.layout_suspended = false;
        self.update_layout();
    }

    fn layout_after_mutation(&mut self) {
        if !self.layout_suspended {
            self.update_layout();
        }
    }

    /// Recomputes the full image layout.
    pub fn update_layout(&mut self) {
        layout::update_image_layout(self);
    }

    /// Serialize the image. A final layout pass always runs first, whether
    /// or not layout is suspended. The stored checksum field is left
    /// untouched; call `update_checksum` first to refresh it.
    pub fn write<W: Write + Seek>(&mut self, w: &mut W) -> Result<()> {
        let layout = layout::update_image_layout(self);

        self.dos_header.write_to(w)?;
        w.write_all(&self.dos_stub)?;
        w.write_u32_be(PE_SIGNATURE)?;

        let optional_header_offset = w.wpos()? + FileHeader::SIZE as u64;
        self.file_header.write_to(w)?;
        self.optional_header.write_to(w)?;

        for section in &self.sections {
            section.header.write_to(w)?;
        }
        let header_pad = (self.optional_header.size_of_headers() as u64).max(w.wpos()?);
        w.pad_to(header_pad)?;

        for section in &self.sections {
            section.write_body(w)?;
        }

        if self.file_header.pointer_to_symbol_table != 0 && !layout.symbols_embedded {
            w.pad_to(self.file_header.pointer_to_symbol_table as u64)?;
            for symbol in &self.symbols {
                symbol.write_to(w)?;
            }
            self.string_table.write_to(w)?;
        }

        w.wseek_to(layout.end)?;
        w.write_all(&self.overlay)?;

        let cert_directory_reaches = self
            .optional_header
            .data_directory(DataDirectoryType::CertificateTable)
            .is_some();
        if !self.certificates.is_empty() {
            w.pad_align(8)?;
            let cert_start = w.wpos()?;
            for certificate in &self.certificates {
                w.pad_align(8)?;
                w.write_u32(certificate.length())?;
                w.write_u16(certificate.revision)?;
                w.write_u16(certificate.certificate_type)?;
                w.write_all(&certificate.data)?;
            }
            let total = w.wpos()? - cert_start;

            // Patch the certificate directory and re-emit the optional
            // header in place.
            self.optional_header.set_data_directory(
                DataDirectoryType::CertificateTable,
                cert_start as u32,
                total as u32,
            );
            let end = w.wpos()?;
            w.wseek_to(optional_header_offset)?;
            self.optional_header.write_to(w)?;
            w.wseek_to(end)?;
        } else if cert_directory_reaches {
            let stale = self
                .optional_header
                .data_directory(DataDirectoryType::CertificateTable)
                .map(|d| d.is_present())
                .unwrap_or(false);
            if stale {
                self.optional_header
                    .set_data_directory(DataDirectoryType::CertificateTable, 0, 0);
                let end = w.wpos()?;
                w.wseek_to(optional_header_offset)?;
                self.optional_header.write_to(w)?;
                w.wseek_to(end)?;
            }
        }

        Ok(())
    }

    /// Serialize the image to a byte vector without mutating this image:
    /// the layout pass runs on a clone.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut copy = self.clone();
        let mut cur = Cursor::new(Vec::new());
        copy.write(&mut cur)?;
        Ok(cur.into_inner())
    }

    /// Computes the image checksum over the serialized bytes, equivalent to
    /// `CheckSumMappedFile`. The temporary buffer is dropped on return.
    pub fn calculate_checksum(&self) -> Result<u32> {
        let mut copy = self.clone();
        let mut cur = Cursor::new(Vec::new());
        copy.write(&mut cur)?;
        let bytes = cur.into_inner();
        Ok(checksum::compute(
            &bytes,
            checksum::checksum_field_offset(copy.dos_header.e_lfanew),
        ))
    }

    /// Recomputes the checksum and stores it in the optional header.
    pub fn update_checksum(&mut self) -> Result<()> {
        let sum = self.calculate_checksum()?;
        self.optional_header.set_check_sum(sum);
        Ok(())
    }

    /// Checks the structural invariants a loader relies on, returning every
    /// finding. An empty report means the image passed.
    pub fn validate(&self) -> crate::validation::ValidationReport {
        crate::validation::validate(self)
    }

    /// Decodes the rich header from the DOS stub, when one is present.
    pub fn rich_header(&self) -> Option<crate::rich::RichHeader> {
        crate::rich::RichHeader::parse(&self.dos_stub)
    }
}

/// Convenience for callers holding any seekable writer positioned mid-file:
/// rewinds to the stream start before emitting.
pub fn write_image<W: Write + Seek>(image: &mut Image, w: &mut W) -> Result<()> {
    w.seek(SeekFrom::Start(0))
        .map_err(|_| Error::StreamNotSeekable)?;
    image.write(w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pewter_coff::file_header::{IMAGE_FILE_MACHINE_AMD64, IMAGE_FILE_MACHINE_I386};
    use pewter_coff::optional_header::{OptionalHeaderPe32, OptionalHeaderPe32Plus};
    use pewter_coff::section::{
        IMAGE_SCN_CNT_CODE, IMAGE_SCN_CNT_INITIALIZED_DATA, IMAGE_SCN_MEM_EXECUTE,
        IMAGE_SCN_MEM_READ,
    };

    fn minimal_pe32plus() -> Image {
        let mut image = Image::new(
            IMAGE_FILE_MACHINE_AMD64,
            OptionalHeader::Pe32Plus(OptionalHeaderPe32Plus::default()),
        );
        let mut text = Section::new(
            ".text",
            IMAGE_SCN_CNT_CODE | IMAGE_SCN_MEM_EXECUTE | IMAGE_SCN_MEM_READ,
        )
        .unwrap();
        text.header.virtual_address = 0x1000;
        text.header.virtual_size = 0x20;
        text.data = vec![0xCCu8; 0x20];
        image.add_section(text);
        image
    }

    #[test]
    fn test_build_write_parse() {
        let image = minimal_pe32plus();
        let bytes = image.to_bytes().unwrap();
        assert_eq!(&bytes[0..2], b"MZ");

        let parsed = Image::parse(&bytes).unwrap();
        assert_eq!(parsed.file_header.machine, IMAGE_FILE_MACHINE_AMD64);
        assert!(parsed.optional_header.is_pe32plus());
        assert_eq!(parsed.sections().len(), 1);
        assert_eq!(parsed.sections()[0].name(), ".text");
        assert_eq!(&parsed.sections()[0].data[..0x20], &[0xCCu8; 0x20][..]);
    }

    #[test]
    fn test_roundtrip_is_byte_identical() {
        let image = minimal_pe32plus();
        let bytes = image.to_bytes().unwrap();
        let reparsed = Image::parse(&bytes).unwrap();
        assert_eq!(reparsed.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_invalid_pe_signature() {
        let image = minimal_pe32plus();
        let mut bytes = image.to_bytes().unwrap();
        let sig_offset = u32::from_le_bytes([bytes[60], bytes[61], bytes[62], bytes[63]]) as usize;
        bytes[sig_offset] = b'X';
        assert!(matches!(
            Image::parse(&bytes),
            Err(Error::InvalidImageSignature(_))
        ));
    }

    #[test]
    fn test_overlay_captured_and_stripped() {
        let image = minimal_pe32plus();
        let mut bytes = image.to_bytes().unwrap();
        bytes.extend_from_slice(b"overlay bytes here");

        let parsed = Image::parse(&bytes).unwrap();
        assert_eq!(parsed.overlay(), b"overlay bytes here");
        // Overlay round-trips
        assert_eq!(parsed.to_bytes().unwrap(), bytes);

        let stripped = Image::parse_with(
            &bytes,
            ReadOptions {
                strip_overlay: true,
            },
        )
        .unwrap();
        assert!(stripped.overlay().is_empty());
    }

    #[test]
    fn test_certificates_roundtrip() {
        let mut image = minimal_pe32plus();
        image.add_certificate(AttributeCertificate {
            revision: crate::certificates::WIN_CERT_REVISION_2_0,
            certificate_type: crate::certificates::WIN_CERT_TYPE_PKCS_SIGNED_DATA,
            data: vec![0xDE; 21],
        });
        let bytes = image.to_bytes().unwrap();

        let parsed = Image::parse(&bytes).unwrap();
        assert_eq!(parsed.certificates().len(), 1);
        assert_eq!(parsed.certificates()[0].data, vec![0xDE; 21]);
        // The patched directory entry points at an 8-byte-aligned table
        let dir = parsed
            .optional_header
            .data_directory(DataDirectoryType::CertificateTable)
            .unwrap();
        assert_eq!(dir.virtual_address % 8, 0);
        assert!(dir.is_present());
        // And certificates round-trip byte-exactly
        assert_eq!(parsed.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_pe32_image() {
        let mut image = Image::new(
            IMAGE_FILE_MACHINE_I386,
            OptionalHeader::Pe32(OptionalHeaderPe32::default()),
        );
        let mut data = Section::new(".data", IMAGE_SCN_CNT_INITIALIZED_DATA).unwrap();
        data.header.virtual_address = 0x1000;
        data.header.virtual_size = 4;
        data.data = vec![1, 2, 3, 4];
        image.add_section(data);

        let bytes = image.to_bytes().unwrap();
        let parsed = Image::parse(&bytes).unwrap();
        assert_eq!(parsed.optional_header.magic(), pewter_coff::PE32_MAGIC);
        assert_eq!(parsed.read_u32_at_rva(0x1000).unwrap(), 0x04030201);
        assert_eq!(parsed.try_read_u32_at_rva(0x9000), None);
    }

    #[test]
    fn test_checksum_stable_under_write() {
        let image = minimal_pe32plus();
        let sum = image.calculate_checksum().unwrap();
        assert_ne!(sum, 0);
        // write() must not change the stored (zero) checksum field
        let bytes = image.to_bytes().unwrap();
        let parsed = Image::parse(&bytes).unwrap();
        assert_eq!(parsed.optional_header.check_sum(), 0);

        let mut updated = image.clone();
        updated.update_checksum().unwrap();
        assert_eq!(updated.optional_header.check_sum(), sum);
    }
}
