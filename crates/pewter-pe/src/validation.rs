//! Structural validation of an image.
//!
//! `Image::validate` checks the format invariants a loader relies on and
//! returns every finding rather than stopping at the first. Findings are
//! graded: errors break loading, warnings are tolerated by real loaders
//! but worth surfacing.

use std::fmt;

use pewter_coff::DataDirectoryType;

use crate::image::Image;

/// Severity of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValidationLevel {
    Error,
    Warning,
}

/// What a validation finding is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValidationCode {
    InvalidFileAlignment,
    InvalidSectionAlignment,
    MisalignedSizeOfHeaders,
    MisalignedSizeOfImage,
    EntryPointOutsideSections,
    OverlappingSections,
    DirectoryOutsideSections,
    ChecksumMismatch,
    NoSections,
}

/// One validation finding.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValidationIssue {
    pub level: ValidationLevel,
    pub code: ValidationCode,
    pub message: String,
}

impl ValidationIssue {
    fn error(code: ValidationCode, message: impl Into<String>) -> Self {
        Self {
            level: ValidationLevel::Error,
            code,
            message: message.into(),
        }
    }

    fn warning(code: ValidationCode, message: impl Into<String>) -> Self {
        Self {
            level: ValidationLevel::Warning,
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            ValidationLevel::Error => "error",
            ValidationLevel::Warning => "warning",
        };
        write!(f, "{}: {}", level, self.message)
    }
}

/// All findings from one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Returns true when nothing was found.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Returns true when any error-level finding is present.
    pub fn has_errors(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.level == ValidationLevel::Error)
    }

    /// Error-level findings.
    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> + '_ {
        self.issues
            .iter()
            .filter(|i| i.level == ValidationLevel::Error)
    }

    /// Warning-level findings.
    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> + '_ {
        self.issues
            .iter()
            .filter(|i| i.level == ValidationLevel::Warning)
    }

    fn push(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }
}

pub(crate) fn validate(image: &Image) -> ValidationReport {
    let mut report = ValidationReport::default();

    let file_alignment = image.optional_header.file_alignment();
    let section_alignment = image.optional_header.section_alignment();

    if file_alignment != 0 {
        if !file_alignment.is_power_of_two()
            || !(512..=65536).contains(&file_alignment)
        {
            report.push(ValidationIssue::error(
                ValidationCode::InvalidFileAlignment,
                format!("file alignment {:#x} is not a power of two in [512, 65536]", file_alignment),
            ));
        }
        if section_alignment < file_alignment || !section_alignment.is_power_of_two() {
            report.push(ValidationIssue::error(
                ValidationCode::InvalidSectionAlignment,
                format!(
                    "section alignment {:#x} is below the file alignment {:#x} or not a power of two",
                    section_alignment, file_alignment
                ),
            ));
        }
        if image.optional_header.size_of_headers() % file_alignment != 0 {
            report.push(ValidationIssue::error(
                ValidationCode::MisalignedSizeOfHeaders,
                format!(
                    "size of headers {:#x} is not a multiple of the file alignment",
                    image.optional_header.size_of_headers()
                ),
            ));
        }
        if section_alignment != 0
            && image.optional_header.size_of_image() % section_alignment != 0
        {
            report.push(ValidationIssue::error(
                ValidationCode::MisalignedSizeOfImage,
                format!(
                    "size of image {:#x} is not a multiple of the section alignment",
                    image.optional_header.size_of_image()
                ),
            ));
        }
    }

    if image.sections().is_empty() {
        report.push(ValidationIssue::warning(
            ValidationCode::NoSections,
            "image has no sections",
        ));
    }

    let entry = image.optional_header.address_of_entry_point();
    if entry != 0 && image.section_for_rva(entry).is_none() {
        report.push(ValidationIssue::warning(
            ValidationCode::EntryPointOutsideSections,
            format!("entry point {:#x} is not within any section", entry),
        ));
    }

    let sections = image.sections();
    for (i, a) in sections.iter().enumerate() {
        if a.header.virtual_size == 0 {
            continue;
        }
        for b in sections.iter().skip(i + 1) {
            if b.header.virtual_size == 0 {
                continue;
            }
            let a_end = a.virtual_end();
            let b_end = b.virtual_end();
            if (a.header.virtual_address as u64) < b_end
                && (b.header.virtual_address as u64) < a_end
            {
                report.push(ValidationIssue::error(
                    ValidationCode::OverlappingSections,
                    format!(
                        "sections {:?} and {:?} overlap in virtual memory",
                        a.name(),
                        b.name()
                    ),
                ));
            }
        }
    }

    for dir_type in DataDirectoryType::all() {
        // The certificate directory holds a file offset, not an RVA
        if dir_type == DataDirectoryType::CertificateTable {
            continue;
        }
        if let Some(dir) = image.optional_header.data_directory(dir_type) {
            if dir.is_present() && image.section_for_rva(dir.virtual_address).is_none() {
                report.push(ValidationIssue::warning(
                    ValidationCode::DirectoryOutsideSections,
                    format!(
                        "{} directory rva {:#x} is not within any section",
                        dir_type.name(),
                        dir.virtual_address
                    ),
                ));
            }
        }
    }

    let stored = image.optional_header.check_sum();
    if stored != 0 {
        if let Ok(computed) = image.calculate_checksum() {
            if computed != stored {
                report.push(ValidationIssue::warning(
                    ValidationCode::ChecksumMismatch,
                    format!("stored checksum {:#x}, computed {:#x}", stored, computed),
                ));
            }
        }
    }

    report
}
