//! Fatal back-end errors.
//!
//! Compilation of a translation unit either succeeds end to end or is
//! aborted with one of these; there are no retries.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A symbol name does not fit the fixed-size label buffer.
    #[error("symbol too long for label buffer: {0:?}")]
    SymbolTooLong(String),
    /// Every XMM register is claimed by an in-flight call sequence.
    #[error("no free XMM register for wide move")]
    NoXmmScratch,
    /// The IR text was malformed.
    #[error(transparent)]
    Read(#[from] crate::middle::read::ReadError),
}

pub type Result<T> = std::result::Result<T, Error>;
