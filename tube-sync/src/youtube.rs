//! YouTube Data API v3 resumable upload endpoint.
//!
//! One session per video: a `POST` with the video resource opens it and the
//! `Location` header names the session URI; `PUT`s with a `Content-Range`
//! deliver bytes. The server answers `308 Resume Incomplete` with a `Range`
//! header while bytes are missing, and `200`/`201` with the video resource
//! once the last byte lands.

use async_trait::async_trait;
use reqwest::header::{CONTENT_RANGE, LOCATION, RANGE};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use tube_sync_core::contract::{
    ChunkStatus, PublishMetadata, RemoteRef, Token, UploadEndpoint, UploadSession,
};
use tube_sync_core::error::TransferError;
use tube_sync_core::transport::classify_status;

pub const UPLOAD_URL: &str = "https://www.googleapis.com/upload/youtube/v3/videos";
pub const WATCH_URL_PREFIX: &str = "https://www.youtube.com/watch?v=";

const RESUME_INCOMPLETE: u16 = 308;

/// Fixed per-video settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSettings {
    pub category_id: String,
    pub privacy_status: String,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            category_id: "22".to_string(),
            privacy_status: "public".to_string(),
        }
    }
}

/// The `snippet` + `status` video resource sent when opening a session.
pub fn video_resource(metadata: &PublishMetadata, settings: &VideoSettings) -> Value {
    json!({
        "snippet": {
            "title": metadata.title,
            "description": metadata.description,
            "categoryId": settings.category_id,
        },
        "status": {
            "privacyStatus": settings.privacy_status,
            "selfDeclaredMadeForKids": false,
        }
    })
}

pub fn watch_url(video_id: &str) -> RemoteRef {
    RemoteRef(format!("{WATCH_URL_PREFIX}{video_id}"))
}

/// Bytes committed according to a `Range: bytes=0-<last>` header.
pub fn committed_from_range(header: Option<&str>) -> Option<u64> {
    let Some(raw) = header else {
        return Some(0);
    };
    let last = raw.trim().strip_prefix("bytes=")?.split_once('-')?.1;
    last.trim().parse::<u64>().ok().map(|n| n + 1)
}

#[derive(Deserialize)]
struct VideoResource {
    id: String,
}

pub struct YouTubeEndpoint {
    client: reqwest::Client,
    upload_url: String,
    settings: VideoSettings,
}

impl YouTubeEndpoint {
    pub fn new(client: reqwest::Client, settings: VideoSettings) -> Self {
        Self {
            client,
            upload_url: UPLOAD_URL.to_string(),
            settings,
        }
    }

    pub fn with_upload_url(mut self, upload_url: impl Into<String>) -> Self {
        self.upload_url = upload_url.into();
        self
    }
}

fn request_failed(e: reqwest::Error) -> TransferError {
    TransferError::Fatal(format!("request failed: {e}"))
}

async fn failure(response: Response) -> TransferError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    classify_status(status, body)
}

/// Maps a chunk or status-query response onto [`ChunkStatus`].
async fn chunk_status(response: Response) -> Result<ChunkStatus, TransferError> {
    match response.status() {
        StatusCode::OK | StatusCode::CREATED => {
            let video: VideoResource = response
                .json()
                .await
                .map_err(|e| TransferError::Fatal(format!("unexpected upload response: {e}")))?;
            Ok(ChunkStatus::Complete(watch_url(&video.id)))
        }
        status if status.as_u16() == RESUME_INCOMPLETE => {
            let range = response.headers().get(RANGE).and_then(|v| v.to_str().ok());
            let committed = committed_from_range(range).ok_or_else(|| {
                TransferError::Fatal(format!("unparsable Range header {range:?}"))
            })?;
            Ok(ChunkStatus::Incomplete { committed })
        }
        _ => Err(failure(response).await),
    }
}

#[async_trait]
impl UploadEndpoint for YouTubeEndpoint {
    async fn open_session(
        &self,
        token: &Token,
        metadata: &PublishMetadata,
        total_len: u64,
        content_type: &str,
    ) -> Result<UploadSession, TransferError> {
        let response = self
            .client
            .post(&self.upload_url)
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .bearer_auth(&token.access_token)
            .header("X-Upload-Content-Length", total_len)
            .header("X-Upload-Content-Type", content_type)
            .json(&video_resource(metadata, &self.settings))
            .send()
            .await
            .map_err(request_failed)?;

        if !response.status().is_success() {
            return Err(failure(response).await);
        }
        let uri = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| TransferError::Fatal("session response has no Location header".to_string()))?;
        debug!(session = %uri, "Resumable session created");
        Ok(UploadSession { uri: uri.to_string() })
    }

    async fn send_chunk(
        &self,
        token: &Token,
        session: &UploadSession,
        offset: u64,
        chunk: &[u8],
        total_len: u64,
    ) -> Result<ChunkStatus, TransferError> {
        let last = offset + chunk.len() as u64 - 1;
        let response = self
            .client
            .put(&session.uri)
            .bearer_auth(&token.access_token)
            .header(CONTENT_RANGE, format!("bytes {offset}-{last}/{total_len}"))
            .body(chunk.to_vec())
            .send()
            .await
            .map_err(request_failed)?;
        chunk_status(response).await
    }

    async fn query_offset(
        &self,
        token: &Token,
        session: &UploadSession,
        total_len: u64,
    ) -> Result<ChunkStatus, TransferError> {
        let response = self
            .client
            .put(&session.uri)
            .bearer_auth(&token.access_token)
            .header(CONTENT_RANGE, format!("bytes */{total_len}"))
            .body(Vec::new())
            .send()
            .await
            .map_err(request_failed)?;
        chunk_status(response).await
    }
}
