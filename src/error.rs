//! Error taxonomy for delta decoding, application, and argument validation.

use thiserror::Error;

/// Errors produced while decoding or applying a delta, or when a caller
/// passes unusable parameters.
///
/// All framing problems (short header, bad magic, truncated payloads,
/// unknown command bytes) and all out-of-range apply commands collapse into
/// the single [`DeltaError::Malformed`] class, which carries the offset at
/// which processing gave up and a description of what was expected there.
#[derive(Debug, Error)]
pub enum DeltaError {
    /// The delta byte stream, or a command decoded from it, is not well
    /// formed. `pos` is a byte offset into the delta during decoding, or an
    /// output offset during application.
    #[error("malformed delta at offset {pos}: expected {expected}")]
    Malformed { pos: usize, expected: String },

    /// A caller-supplied parameter is unusable. Reported before any work.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O failure while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeltaError {
    pub(crate) fn malformed(pos: usize, expected: impl Into<String>) -> Self {
        DeltaError::Malformed {
            pos,
            expected: expected.into(),
        }
    }
}
