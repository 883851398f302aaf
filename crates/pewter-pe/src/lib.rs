//! # pewter-pe
//!
//! Byte-exact reading, inspecting, editing, and writing of Portable
//! Executable images. This crate layers the PE extension over the COFF
//! container from `pewter-coff`:
//! - DOS header + stub and the PE signature
//! - the `Image` aggregate with end-to-end parse and emit
//! - data-directory parsers: exports, imports, delay-load imports, base
//!   relocations, attribute certificates
//! - the layout engine, the image checksum, and RVA-typed readers
//!
//! A parsed image writes back byte-identically when left unmodified; edits
//! go through the mutator APIs and the layout engine re-derives every
//! dependent offset on write.

pub mod base_relocs;
pub mod certificates;
pub mod checksum;
pub mod delay_imports;
pub mod dos;
pub mod exports;
pub mod image;
pub mod imports;
mod layout;
pub mod rich;
pub mod rva;
pub mod traits;
pub mod validation;

pub use base_relocs::{
    BaseRelocationBlock, BaseRelocationDirectory, BaseRelocationEntry, BaseRelocationType,
};
pub use certificates::AttributeCertificate;
pub use delay_imports::DelayLoadDescriptor;
pub use dos::DosHeader;
pub use exports::{EdataBuilder, ExportDirectory, ExportTable, ExportedSymbol};
pub use image::{Image, ReadOptions};
pub use imports::{IdataBuilder, ImportDescriptor, ImportRequest, ImportedFunction};
pub use rich::{RichEntry, RichHeader};
pub use rva::section_for_rva;
pub use traits::CoffContainer;
pub use validation::{ValidationCode, ValidationIssue, ValidationLevel, ValidationReport};

pub use pewter_coff::{Error, Result};
