use std::path::PathBuf;

use thiserror::Error;

/// Identifies which half of a record failed its digest comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumPart {
    Header,
    Content,
}

impl std::fmt::Display for ChecksumPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChecksumPart::Header => write!(f, "header"),
            ChecksumPart::Content => write!(f, "content"),
        }
    }
}

/// The primary error type for all operations in the `catfile` crate.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// An I/O error occurred, typically while reading or writing a file.
    /// Includes the path where the error happened when one is known.
    #[error("I/O error on path '{path}': {source}")]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// The container violates the record format: bad magic, a malformed field,
    /// or a non-regular entry declaring a nonzero size. `index` is the
    /// zero-based record at which decoding failed (0 for the container header).
    #[error("format error in record {index}: {msg}")]
    Format { index: u64, msg: String },

    /// End of stream reached before the declared entry count or content length
    /// was consumed.
    #[error("truncated container in record {index}: {expected} more bytes expected")]
    Truncated { index: u64, expected: u64 },

    /// A hard-link record references a target that was not materialized
    /// earlier in the same stream. Indicates corruption or an out-of-order
    /// pack, both unrecoverable.
    #[error("hard link '{path}' references target '{target}' which has not been unpacked yet")]
    HardLinkOrdering { path: String, target: String },

    /// A requested codec, checksum method or foreign-format reader is not
    /// available in this build. Raised before any output is produced.
    #[error("unsupported capability: {0}")]
    UnsupportedCapability(String),

    /// An error occurred when trying to strip a base prefix from a file path.
    #[error("could not strip prefix '{prefix}' from path '{path}'")]
    StripPrefix { prefix: PathBuf, path: PathBuf },

    /// An error reported by a foreign-format library while reading its container.
    #[error("{format} read error: {source}")]
    Foreign {
        format: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ArchiveError {
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        ArchiveError::Io {
            source,
            path: path.into(),
        }
    }

    pub fn format(index: u64, msg: impl Into<String>) -> Self {
        ArchiveError::Format {
            index,
            msg: msg.into(),
        }
    }
}

// Generic IO conversion for errors that carry no useful path context.
impl From<std::io::Error> for ArchiveError {
    fn from(err: std::io::Error) -> Self {
        ArchiveError::Io {
            source: err,
            path: PathBuf::new(),
        }
    }
}
