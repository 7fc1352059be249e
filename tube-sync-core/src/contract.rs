//! # contract: collaborator interfaces for the upload pipeline
//!
//! The scheduler never talks to the network, the file tree or the credential
//! store directly. Each of those is a trait here:
//!
//! - [`Authenticator`]: hands out a currently valid access token.
//! - [`DatasetStore`]: discovers locales, loads and saves their tabular datasets.
//! - [`Transport`]: transfers one asset and returns its remote reference.
//! - [`UploadEndpoint`]: the wire protocol underneath a resumable transfer.
//! - [`Clock`]: the process-local wall clock used for quota buckets.
//!
//! ## Mocking & Testing
//! Every trait is annotated for `mockall`; the mocks are exported behind the
//! default `test-export-mocks` feature so integration tests can build them.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDateTime;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::error::{AuthError, DatasetError, TransferError};
use crate::locale::Locale;

/// A bearer credential accepted by the upload endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    pub access_token: String,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Where an uploaded asset ended up (a watch URL).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteRef(pub String);

impl RemoteRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolved, publish-ready text for one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishMetadata {
    pub title: String,
    pub description: String,
}

/// Handle on a server-side resumable upload session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub uri: String,
}

/// What the endpoint reports after receiving (or being asked about) bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkStatus {
    /// The server holds bytes `0..committed`; more are expected.
    Incomplete { committed: u64 },
    /// The upload finished and the server assigned a reference.
    Complete(RemoteRef),
}

/// Provides a currently valid credential or fails.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn get_valid_token(&self) -> Result<Token, AuthError>;
}

/// Loads and saves per-locale datasets.
///
/// The store owns the physical format (CSV, database, ...). The core only
/// relies on the logical row shape described by [`Dataset`].
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait DatasetStore: Send + Sync {
    /// All locales the store can serve, in no particular order.
    fn discover_locales(&self) -> Result<Vec<Locale>, DatasetError>;

    fn load(&self, locale: &Locale) -> Result<Dataset, DatasetError>;

    /// Durably replaces the stored dataset for `dataset.locale`.
    fn save(&self, dataset: &Dataset) -> Result<(), DatasetError>;
}

/// Transfers a single asset.
///
/// Implementations recover transient failures internally; a returned
/// [`TransferError::Transient`] is treated as fatal by callers.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn transfer(
        &self,
        asset_path: &Path,
        metadata: &PublishMetadata,
    ) -> Result<RemoteRef, TransferError>;
}

/// The resumable-upload wire protocol.
///
/// Errors carrying a retryable status must be reported as
/// [`TransferError::Transient`]; everything else as [`TransferError::Fatal`].
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait UploadEndpoint: Send + Sync {
    /// Starts a session for an asset of `total_len` bytes.
    async fn open_session(
        &self,
        token: &Token,
        metadata: &PublishMetadata,
        total_len: u64,
        content_type: &str,
    ) -> Result<UploadSession, TransferError>;

    /// Sends `chunk`, which starts at byte `offset` of the asset.
    async fn send_chunk(
        &self,
        token: &Token,
        session: &UploadSession,
        offset: u64,
        chunk: &[u8],
        total_len: u64,
    ) -> Result<ChunkStatus, TransferError>;

    /// Asks the server how many bytes it has committed so far.
    async fn query_offset(
        &self,
        token: &Token,
        session: &UploadSession,
        total_len: u64,
    ) -> Result<ChunkStatus, TransferError>;
}

/// Process-local wall clock. Quota buckets are the calendar date of `now()`.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// [`Clock`] backed by the system's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}
