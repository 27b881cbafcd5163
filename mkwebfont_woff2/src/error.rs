use crate::tag::Tag;
use thiserror::Error;

pub type Result<T, E = Woff2Error> = std::result::Result<T, E>;

/// Errors produced while encoding or decoding WOFF2 data.
#[derive(Error, Debug)]
pub enum Woff2Error {
    #[error("unexpected end of data")]
    Truncated,
    #[error("malformed font data: {0}")]
    Malformed(&'static str),
    #[error("malformed '{tag}' table: {reason}")]
    MalformedTable { tag: Tag, reason: &'static str },
    #[error("checksum mismatch in '{tag}' table (stored {stored:#x}, computed {computed:#x})")]
    ChecksumMismatch { tag: Tag, stored: u32, computed: u32 },
    #[error("output buffer is too small ({available} bytes available, {required} required)")]
    InsufficientCapacity { required: usize, available: usize },
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
    #[error("brotli quality {0} is out of range (expected 0..=11)")]
    InvalidQuality(u32),
    #[error("brotli stream error: {0}")]
    Brotli(#[from] std::io::Error),
}
impl Woff2Error {
    /// Whether this error was caused by the input data itself, rather than by the parameters or
    /// output buffer passed alongside it.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            Woff2Error::Truncated
                | Woff2Error::Malformed(_)
                | Woff2Error::MalformedTable { .. }
                | Woff2Error::ChecksumMismatch { .. }
                | Woff2Error::Brotli(_)
        )
    }

    pub(crate) fn table(tag: Tag, reason: &'static str) -> Woff2Error {
        Woff2Error::MalformedTable { tag, reason }
    }
}
