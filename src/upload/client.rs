use std::pin::Pin;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use reqwest::{Body, Client, Response};
use serde::Deserialize;
use serde_json::json;
use super::errors::{Result, UploadError};
use super::types::{PrivacyStatus, TransferDescriptor};

pub const YOUTUBE_API_BASE: &str = "https://www.googleapis.com";

const VIDEO_CONTENT_TYPE: &str = "video/*";

/// Byte stream handed to the host as the request body.
pub type UploadBody = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send + Sync>>;

/// Remote video hosting API, authenticated with a bearer token.
#[async_trait]
pub trait VideoHost: Send + Sync {
    /// Cheap authenticated call used to reject bad credentials early.
    /// Returns the id of the account's channel.
    async fn whoami(&self, access_token: &str) -> Result<String>;

    /// Streams `body` as a new video and returns the created video id.
    async fn upload_video(
        &self,
        access_token: &str,
        descriptor: &TransferDescriptor,
        privacy: PrivacyStatus,
        body: UploadBody,
    ) -> Result<String>;

    async fn add_to_playlist(&self, access_token: &str, playlist_id: &str, video_id: &str) -> Result<()>;
}

#[derive(Deserialize)]
struct ChannelList {
    #[serde(default)]
    items: Vec<Resource>,
}

#[derive(Deserialize)]
struct Resource {
    id: String,
}

/// YouTube Data API v3 over resumable uploads.
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    client: Client,
    api_base: String,
}

impl YouTubeClient {
    pub fn new(client: Client) -> Self {
        Self::with_api_base(client, YOUTUBE_API_BASE)
    }

    pub fn with_api_base(client: Client, api_base: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn create_headers(access_token: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", access_token))
            .map_err(|err| UploadError::transfer(format!("invalid access token: {}", err)))?;
        headers.insert("Authorization", bearer);
        Ok(headers)
    }

    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to get error text".to_string());
        Err(UploadError::server_error(status.as_u16(), message))
    }

    /// Opens a resumable upload session and returns its URL.
    async fn create_session(
        &self,
        access_token: &str,
        descriptor: &TransferDescriptor,
        privacy: PrivacyStatus,
    ) -> Result<String> {
        let url = format!("{}/upload/youtube/v3/videos", self.api_base);
        let metadata = json!({
            "snippet": { "title": descriptor.display_title },
            "status": { "privacyStatus": privacy.as_str() },
        });

        let response = self.client
            .post(url)
            .headers(Self::create_headers(access_token)?)
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .header("X-Upload-Content-Length", descriptor.declared_total_size_bytes)
            .header("X-Upload-Content-Type", VIDEO_CONTENT_TYPE)
            .json(&metadata)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(String::from)
            .ok_or_else(|| UploadError::transfer("upload session response has no Location header"))
    }
}

#[async_trait]
impl VideoHost for YouTubeClient {
    async fn whoami(&self, access_token: &str) -> Result<String> {
        let url = format!("{}/youtube/v3/channels", self.api_base);
        let response = self.client
            .get(url)
            .headers(Self::create_headers(access_token)?)
            .query(&[("part", "id"), ("mine", "true")])
            .send()
            .await?;

        let channels: ChannelList = Self::check_status(response).await?.json().await?;
        channels.items
            .into_iter()
            .next()
            .map(|channel| channel.id)
            .ok_or_else(|| UploadError::transfer("account has no channel"))
    }

    async fn upload_video(
        &self,
        access_token: &str,
        descriptor: &TransferDescriptor,
        privacy: PrivacyStatus,
        body: UploadBody,
    ) -> Result<String> {
        let session_url = self.create_session(access_token, descriptor, privacy).await?;
        tracing::debug!(id = %descriptor.id, "Opened upload session");

        let response = self.client
            .put(session_url)
            .headers(Self::create_headers(access_token)?)
            .header(CONTENT_LENGTH, descriptor.declared_total_size_bytes)
            .header(CONTENT_TYPE, VIDEO_CONTENT_TYPE)
            .body(Body::wrap_stream(body))
            .send()
            .await?;

        let video: Resource = Self::check_status(response).await?.json().await?;
        Ok(video.id)
    }

    async fn add_to_playlist(&self, access_token: &str, playlist_id: &str, video_id: &str) -> Result<()> {
        let url = format!("{}/youtube/v3/playlistItems", self.api_base);
        let item = json!({
            "snippet": {
                "playlistId": playlist_id,
                "resourceId": { "kind": "youtube#video", "videoId": video_id },
            }
        });

        let response = self.client
            .post(url)
            .headers(Self::create_headers(access_token)?)
            .query(&[("part", "snippet")])
            .json(&item)
            .send()
            .await?;
        Self::check_status(response).await?;

        Ok(())
    }
}
