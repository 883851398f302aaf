//! Traits shared by the COFF and PE containers.

use pewter_coff::{CoffFile, Section, StringTable, Symbol};

use crate::image::Image;

/// A parsed COFF-family container.
///
/// This trait abstracts over bare object files and PE images to provide a
/// uniform read surface for tools that handle both.
pub trait CoffContainer {
    /// Returns the target machine type.
    fn machine(&self) -> u16;

    /// Returns whether this container targets a 64-bit machine.
    fn is_64bit(&self) -> bool;

    /// Returns the sections in file order.
    fn sections(&self) -> &[Section];

    /// Returns the COFF symbol records.
    fn symbols(&self) -> &[Symbol];

    /// Returns the string table backing long symbol names.
    fn string_table(&self) -> &StringTable;

    /// Returns the first section with the given name.
    fn section_by_name(&self, name: &str) -> Option<&Section> {
        self.sections().iter().find(|s| s.name() == name)
    }

    /// Resolves a symbol's name against the container's string table.
    fn symbol_name<'a>(&'a self, symbol: &'a Symbol) -> Option<&'a str> {
        symbol.resolved_name(self.string_table())
    }
}

impl CoffContainer for CoffFile {
    fn machine(&self) -> u16 {
        self.file_header.machine
    }

    fn is_64bit(&self) -> bool {
        self.file_header.is_64bit()
    }

    fn sections(&self) -> &[Section] {
        CoffFile::sections(self)
    }

    fn symbols(&self) -> &[Symbol] {
        CoffFile::symbols(self)
    }

    fn string_table(&self) -> &StringTable {
        CoffFile::string_table(self)
    }
}

impl CoffContainer for Image {
    fn machine(&self) -> u16 {
        self.file_header.machine
    }

    fn is_64bit(&self) -> bool {
        self.optional_header.is_pe32plus()
    }

    fn sections(&self) -> &[Section] {
        Image::sections(self)
    }

    fn symbols(&self) -> &[Symbol] {
        Image::symbols(self)
    }

    fn string_table(&self) -> &StringTable {
        Image::string_table(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pewter_coff::file_header::IMAGE_FILE_MACHINE_AMD64;
    use pewter_coff::optional_header::{OptionalHeader, OptionalHeaderPe32Plus};
    use pewter_coff::section::IMAGE_SCN_CNT_CODE;

    fn section_names<C: CoffContainer>(container: &C) -> Vec<String> {
        container
            .sections()
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    #[test]
    fn test_uniform_access() {
        let mut object = CoffFile::new(IMAGE_FILE_MACHINE_AMD64);
        object.add_section(Section::new(".text", IMAGE_SCN_CNT_CODE).unwrap());

        let mut image = Image::new(
            IMAGE_FILE_MACHINE_AMD64,
            OptionalHeader::Pe32Plus(OptionalHeaderPe32Plus::default()),
        );
        image.add_section(Section::new(".text", IMAGE_SCN_CNT_CODE).unwrap());

        assert_eq!(section_names(&object), vec![".text"]);
        assert_eq!(section_names(&image), vec![".text"]);
        assert!(object.is_64bit());
        assert!(image.is_64bit());
        assert_eq!(
            CoffContainer::machine(&object),
            CoffContainer::machine(&image)
        );
    }
}
