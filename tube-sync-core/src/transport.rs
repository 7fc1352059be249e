//! Chunked, resumable transfer of one asset over an [`UploadEndpoint`].
//!
//! The asset is sent in `chunk_size` pieces through a single server-side
//! session. A chunk failing with a retryable status is retried (after asking
//! the server how much it already committed) up to the policy's attempt
//! ceiling; anything else ends the transfer at once. Nothing is cached
//! across process restarts: a new `transfer` call always starts at byte zero.

use std::io::SeekFrom;
use std::path::Path;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info};

use crate::contract::{
    Authenticator, ChunkStatus, PublishMetadata, RemoteRef, Transport, UploadEndpoint, UploadSession,
};
use crate::error::TransferError;
use crate::retry::{retry, RetryOutcome, RetryPolicy};

/// 8 MiB; resumable endpoints want multiples of 256 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// HTTP statuses worth retrying.
pub const RETRYABLE_STATUSES: [u16; 4] = [500, 502, 503, 504];

/// Maps a failed HTTP status to the transfer error class.
pub fn classify_status(status: u16, message: impl Into<String>) -> TransferError {
    let message = message.into();
    if RETRYABLE_STATUSES.contains(&status) {
        TransferError::Transient { status, message }
    } else {
        TransferError::Fatal(format!("status {status}: {message}"))
    }
}

/// MIME type sent with the upload, by file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        Some("avi") => "video/x-msvideo",
        Some("mkv") => "video/x-matroska",
        _ => "video/*",
    }
}

pub struct ChunkedTransport<E, A> {
    endpoint: E,
    auth: A,
    policy: RetryPolicy,
    chunk_size: usize,
}

impl<E, A> ChunkedTransport<E, A>
where
    E: UploadEndpoint,
    A: Authenticator,
{
    pub fn new(endpoint: E, auth: A, policy: RetryPolicy, chunk_size: usize) -> Self {
        Self {
            endpoint,
            auth,
            policy,
            chunk_size: chunk_size.max(1),
        }
    }

    async fn open_session(
        &self,
        metadata: &PublishMetadata,
        total_len: u64,
        content_type: &str,
    ) -> Result<UploadSession, TransferError> {
        let token = self.auth.get_valid_token().await?;
        let endpoint = &self.endpoint;
        let token = &token;
        let outcome = retry(&self.policy, TransferError::is_transient, |_| async move {
            endpoint.open_session(token, metadata, total_len, content_type).await
        })
        .await;
        settle(outcome, "opening upload session")
    }

    /// Delivers `chunk` (bytes `offset..offset + chunk.len()`), resyncing
    /// with the server before each retry.
    async fn send_chunk(
        &self,
        session: &UploadSession,
        offset: u64,
        chunk: &[u8],
        total_len: u64,
    ) -> Result<ChunkStatus, TransferError> {
        let token = self.auth.get_valid_token().await?;
        let endpoint = &self.endpoint;
        let token = &token;
        let end = offset + chunk.len() as u64;

        let outcome = retry(&self.policy, TransferError::is_transient, |attempt| async move {
            let mut start = offset;
            if attempt > 1 {
                match endpoint.query_offset(token, session, total_len).await? {
                    ChunkStatus::Complete(remote) => return Ok(ChunkStatus::Complete(remote)),
                    ChunkStatus::Incomplete { committed } if committed == end => {
                        return Ok(ChunkStatus::Incomplete { committed })
                    }
                    ChunkStatus::Incomplete { committed } if (offset..end).contains(&committed) => {
                        debug!(offset, committed, "Resuming chunk from committed offset");
                        start = committed;
                    }
                    ChunkStatus::Incomplete { committed } => {
                        return Err(TransferError::Fatal(format!(
                            "server reports offset {committed} outside chunk {offset}..{end}"
                        )))
                    }
                }
            }
            let slice = &chunk[(start - offset) as usize..];
            endpoint.send_chunk(token, session, start, slice, total_len).await
        })
        .await;
        settle(outcome, &format!("sending chunk at offset {offset}"))
    }
}

fn settle<T>(outcome: RetryOutcome<T, TransferError>, what: &str) -> Result<T, TransferError> {
    match outcome {
        RetryOutcome::Success(value) => Ok(value),
        RetryOutcome::Exhausted { attempts, last_error } => Err(TransferError::Fatal(format!(
            "{what} failed after {attempts} attempts: {last_error}"
        ))),
        RetryOutcome::Fatal(e) => Err(e),
    }
}

#[async_trait]
impl<E, A> Transport for ChunkedTransport<E, A>
where
    E: UploadEndpoint,
    A: Authenticator,
{
    async fn transfer(
        &self,
        asset_path: &Path,
        metadata: &PublishMetadata,
    ) -> Result<RemoteRef, TransferError> {
        let io_err = |source: std::io::Error| TransferError::Io {
            path: asset_path.to_path_buf(),
            source,
        };

        let mut file = tokio::fs::File::open(asset_path).await.map_err(io_err)?;
        let total_len = file.metadata().await.map_err(io_err)?.len();
        if total_len == 0 {
            return Err(TransferError::Fatal(format!(
                "asset {} is empty",
                asset_path.display()
            )));
        }

        let content_type = content_type_for(asset_path);
        let session = self.open_session(metadata, total_len, content_type).await?;
        info!(asset = %asset_path.display(), total_len, content_type, "Upload session opened");

        let mut offset = 0u64;
        let mut buf = vec![0u8; self.chunk_size];
        while offset < total_len {
            let len = (total_len - offset).min(self.chunk_size as u64) as usize;
            file.seek(SeekFrom::Start(offset)).await.map_err(io_err)?;
            file.read_exact(&mut buf[..len]).await.map_err(io_err)?;

            match self.send_chunk(&session, offset, &buf[..len], total_len).await? {
                ChunkStatus::Complete(remote) => {
                    info!(asset = %asset_path.display(), remote_ref = %remote, "Upload complete");
                    return Ok(remote);
                }
                ChunkStatus::Incomplete { committed } if committed <= offset || committed > total_len => {
                    return Err(TransferError::Fatal(format!(
                        "server committed offset {committed} after chunk at {offset} of {total_len}"
                    )));
                }
                ChunkStatus::Incomplete { committed } => {
                    offset = committed;
                    debug!(
                        offset,
                        total = total_len,
                        progress_pct = offset * 100 / total_len,
                        "Chunk acknowledged"
                    );
                }
            }
        }

        Err(TransferError::Fatal(format!(
            "all {total_len} bytes sent but the server never confirmed completion"
        )))
    }
}
