use std::path::PathBuf;

use thiserror::Error;

use crate::types::PlatformKey;

/// Failure kinds surfaced by the merge and distribute pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Distribution was requested before any platform had merged rows.
    #[error("No merged data found. Merge some files first.")]
    NoMergedData,

    /// Accounts or rows-per-account is not a positive number.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// An upload could not be read as header + data rows.
    #[error("Could not parse `{file}`: {reason}")]
    UnparseableUpload { file: String, reason: String },

    /// An upload's columns differ from the rest of its platform batch.
    #[error("Columns of `{file}` do not match the {platform} dataset (expected {expected:?}, found {found:?})")]
    SchemaMismatch {
        file: String,
        platform: PlatformKey,
        expected: Vec<String>,
        found: Vec<String>,
    },

    /// Writing or verifying the distribution archive failed.
    #[error("Failed to write archive {}: {source}", path.display())]
    ArchiveWriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A merged dataset could not be written; the previous file is kept.
    #[error("Failed to write merged dataset for {platform} to {}: {reason}", path.display())]
    WriteFailure {
        platform: PlatformKey,
        path: PathBuf,
        reason: String,
    },

    /// Another merge or distribute run holds the data directory lock.
    #[error("Another run is in progress (lock file {} exists; remove it if no run is active)", lock_path.display())]
    Busy { lock_path: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn unparseable(file: impl Into<String>, reason: impl ToString) -> Self {
        PipelineError::UnparseableUpload {
            file: file.into(),
            reason: reason.to_string(),
        }
    }
}
