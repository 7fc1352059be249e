//! Error taxonomy for the upload pipeline.
//!
//! The variants map onto how the scheduler reacts:
//! - [`AuthError`]: fatal, the whole run aborts.
//! - [`TransferError::Transient`]: retried inside the transport, never seen by the scheduler.
//! - [`TransferError::Fatal`]: the candidate is counted as an error and the run continues.
//! - [`LedgerError::DuplicateRecord`] and [`LedgerError::Persistence`]: fatal.
//!
//! A metadata skip is not an error at all, see [`crate::metadata::Resolution`].

use std::path::PathBuf;

use thiserror::Error;

/// The credential provider could not hand out a usable token.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("no stored credential at {0}")]
    MissingCredential(PathBuf),

    #[error("credential expired and cannot be refreshed: {0}")]
    RefreshFailed(String),

    #[error("invalid credential: {0}")]
    Invalid(String),
}

/// Failure of a single transfer.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Retryable server condition (e.g. HTTP 503). Carries the status code.
    #[error("transient failure (status {status}): {message}")]
    Transient { status: u16, message: String },

    /// Non-retryable failure, or a transient one that exhausted its attempts.
    #[error("transfer failed: {0}")]
    Fatal(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("cannot read asset {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TransferError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TransferError::Transient { .. })
    }
}

/// Ledger failures. Both variants are fatal for a run.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("an upload record already exists for locale {locale:?}, item {item_key:?}")]
    DuplicateRecord { locale: String, item_key: String },

    #[error("failed to persist ledger to {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ledger file {path} is not valid: {message}")]
    Corrupt { path: PathBuf, message: String },
}

/// Errors raised by a [`crate::contract::DatasetStore`].
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset for locale {0:?} not found")]
    NotFound(String),

    #[error("dataset I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed dataset {path}: {message}")]
    Malformed { path: PathBuf, message: String },
}

/// Errors reading or writing the persisted locale selection.
#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("selection file I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("selection file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Conditions that abort an upload run.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
