//! Fatal error taxonomy for the polishing pipeline.
//!
//! The core never attempts local recovery: every fallible operation surfaces
//! a [`PolishError`] that propagates via `?` to the single boundary in
//! `main`, which logs it and maps it to a process exit code.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PolishError {
    #[error("input unavailable: {0}")]
    InputUnavailable(String),

    #[error("input mismatch: {0}")]
    InputMismatch(String),

    #[error("parameter inconsistent: {0}")]
    ParameterInconsistent(String),

    #[error("empty coverage: {0}")]
    EmptyCoverage(String),

    #[error("chunk {chunk_index} ({contig}:{start}-{end}) failed: {source_message}")]
    ChunkFailure {
        chunk_index: usize,
        contig: String,
        start: u64,
        end: u64,
        source_message: String,
    },
}

impl PolishError {
    pub fn chunk_failure(
        chunk_index: usize,
        contig: impl Into<String>,
        start: u64,
        end: u64,
        source_message: impl Into<String>,
    ) -> Self {
        PolishError::ChunkFailure {
            chunk_index,
            contig: contig.into(),
            start,
            end,
            source_message: source_message.into(),
        }
    }
}

pub type PolishResult<T> = Result<T, PolishError>;
