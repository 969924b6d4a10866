use std::io;
use thiserror::Error;

/// The single error type returned by every fallible operation in this crate.
///
/// Each variant corresponds to one of the error kinds named in the design:
/// truncated reads, structural corruption, unsupported format variants,
/// caller-supplied invalid arguments, and lower-level I/O failure.
#[derive(Error, Debug)]
pub enum DbaseError {
    /// EOF was reached while a fixed-size structure was still being read.
    #[error("truncated file: expected {expected} bytes at offset {offset}, found {found}")]
    TruncatedFile {
        offset: u64,
        expected: usize,
        found: usize,
    },

    /// A sentinel or cross-check mismatched what the format requires.
    #[error("corrupt structure: {detail}")]
    CorruptStructure { detail: String },

    /// A recognized-but-unsupported format variant was encountered.
    #[error("unsupported variant: {detail}")]
    UnsupportedVariant { detail: String },

    /// The caller passed an argument that is invalid for the current state.
    #[error("invalid argument: {detail}")]
    InvalidArgument { detail: String },

    /// A lower-level I/O failure, e.g. disk error or missing file.
    #[error("I/O failure: {0}")]
    IoFailure(#[from] io::Error),
}

impl DbaseError {
    pub fn corrupt(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        log::error!("{detail}");
        DbaseError::CorruptStructure { detail }
    }

    pub fn unsupported(detail: impl Into<String>) -> Self {
        DbaseError::UnsupportedVariant {
            detail: detail.into(),
        }
    }

    pub fn invalid(detail: impl Into<String>) -> Self {
        DbaseError::InvalidArgument {
            detail: detail.into(),
        }
    }

    pub fn truncated(offset: u64, expected: usize, found: usize) -> Self {
        log::error!("truncated read at offset {offset}: expected {expected}, found {found}");
        DbaseError::TruncatedFile {
            offset,
            expected,
            found,
        }
    }
}

pub type DbaseResult<T> = Result<T, DbaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_has_a_message() {
        let variants: Vec<DbaseError> = vec![
            DbaseError::truncated(10, 32, 4),
            DbaseError::corrupt("bad sentinel"),
            DbaseError::unsupported("unknown field type"),
            DbaseError::invalid("field not found"),
            DbaseError::IoFailure(io::Error::new(io::ErrorKind::Other, "disk gone")),
        ];
        for err in variants {
            assert!(!err.to_string().is_empty());
        }
    }
}
