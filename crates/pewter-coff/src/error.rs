//! Error types for PE and COFF parsing and writing.

use thiserror::Error;

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type shared by the COFF and PE layers.
#[derive(Error, Debug)]
pub enum Error {
    /// DOS or PE signature does not match a known value.
    #[error("invalid image signature: {0:#010x}")]
    InvalidImageSignature(u32),

    /// Optional header magic is not PE32, PE32+, or ROM.
    #[error("unsupported optional header magic: {0:#06x}")]
    UnsupportedOptionalHeaderMagic(u16),

    /// A fixed-size field would run past end-of-stream.
    #[error("truncated stream while reading {context}")]
    TruncatedStream { context: &'static str },

    /// The supplied stream does not support random access.
    #[error("stream does not support seeking")]
    StreamNotSeekable,

    /// Section names are limited to 8 ASCII bytes on write.
    #[error("section name longer than 8 ASCII bytes: {0:?}")]
    BadSectionName(String),

    /// A typed reader was called with an RVA outside any section, or past
    /// the initialized data within the section.
    #[error("rva {rva:#x} out of range while reading {context}")]
    RvaOutOfRange { rva: u32, context: &'static str },

    /// Anomaly inside a data directory. Raised by builders on inconsistent
    /// input; parsers recover from this condition in place.
    #[error("malformed {kind} directory: {reason}")]
    MalformedDirectory { kind: &'static str, reason: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Creates a new TruncatedStream error.
    pub fn truncated(context: &'static str) -> Self {
        Self::TruncatedStream { context }
    }

    /// Creates a new RvaOutOfRange error.
    pub fn rva_out_of_range(rva: u32, context: &'static str) -> Self {
        Self::RvaOutOfRange { rva, context }
    }

    /// Creates a new MalformedDirectory error.
    pub fn malformed(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedDirectory {
            kind,
            reason: reason.into(),
        }
    }
}
