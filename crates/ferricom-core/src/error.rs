use std::fmt;

use crate::cartridge::header::NES_HEADER_LEN;

#[derive(Debug)]
pub enum Error {
    /// Provided buffer is shorter than the 16-byte header.
    TooShort { actual: usize },
    /// Magic number ("NES<EOF>") is missing.
    InvalidMagic,
    /// A ROM section (PRG/CHR/trainer) is shorter than the header advertises.
    SectionTooShort {
        section: &'static str,
        expected: usize,
        actual: usize,
    },
    /// The header names a mapper this core does not implement.
    UnsupportedMapper(u16),
    /// A save state was produced by an incompatible core revision.
    SaveStateVersionMismatch { found: u32, expected: u32 },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { actual } => {
                write!(f, "header expected {NES_HEADER_LEN} bytes, got {actual}")
            }
            Self::InvalidMagic => write!(f, "missing NES magic bytes"),
            Self::SectionTooShort {
                section,
                expected,
                actual,
            } => write!(
                f,
                "{section} section expected {expected} bytes, got {actual}"
            ),
            Self::UnsupportedMapper(id) => write!(f, "unsupported mapper {id}"),
            Self::SaveStateVersionMismatch { found, expected } => {
                write!(f, "save state version {found}, this core expects {expected}")
            }
        }
    }
}

impl std::error::Error for Error {}
