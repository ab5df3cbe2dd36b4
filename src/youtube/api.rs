use crate::{
    config::ClientConfig,
    error::{Result, SnowballError},
    model::{ChannelId, ChannelMetadata, VideoRecord},
    source::MetadataService,
    youtube::watch::parse_iso_duration,
};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use std::time::Duration;

/// `videos.list` accepts at most this many ids per call.
pub const MAX_IDS_PER_CALL: usize = 50;

#[derive(Deserialize)]
#[serde(bound = "T: DeserializeOwned")]
struct ListResponse<T> {
    #[serde(default)]
    items: Vec<T>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelItem {
    pub id: String,
    pub snippet: ChannelSnippet,
    pub content_details: Option<ChannelContentDetails>,
    pub statistics: Option<ChannelStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSnippet {
    pub title: String,
    pub description: Option<String>,
    pub custom_url: Option<String>,
    pub published_at: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelContentDetails {
    pub related_playlists: RelatedPlaylists,
}

#[derive(Debug, Deserialize)]
pub struct RelatedPlaylists {
    pub uploads: Option<String>,
}

/// The API sends counts as decimal strings.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStatistics {
    pub view_count: Option<String>,
    pub subscriber_count: Option<String>,
    #[serde(default)]
    pub hidden_subscriber_count: bool,
    pub video_count: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoItem {
    pub id: String,
    pub snippet: Option<VideoSnippet>,
    pub statistics: Option<VideoStatistics>,
    pub content_details: Option<VideoContentDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSnippet {
    pub channel_id: String,
    pub channel_title: Option<String>,
    pub title: Option<String>,
    pub published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatistics {
    pub view_count: Option<String>,
    pub like_count: Option<String>,
    pub comment_count: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VideoContentDetails {
    pub duration: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItem {
    content_details: PlaylistItemDetails,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemDetails {
    video_id: String,
}

#[derive(Deserialize)]
struct SearchItem {
    snippet: SearchSnippet,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchSnippet {
    channel_id: String,
}

fn count(raw: &Option<String>) -> Option<u64> {
    raw.as_deref().and_then(|s| s.parse().ok())
}

impl ChannelItem {
    pub fn uploads_playlist(&self) -> Option<&str> {
        self.content_details
            .as_ref()
            .and_then(|d| d.related_playlists.uploads.as_deref())
    }

    pub fn into_metadata(self) -> ChannelMetadata {
        let uploads_playlist = self.uploads_playlist().map(str::to_owned);
        let stats = self.statistics.as_ref();
        ChannelMetadata {
            id: ChannelId::new(self.id),
            title: self.snippet.title,
            description: self.snippet.description,
            custom_url: self.snippet.custom_url,
            published_at: self.snippet.published_at,
            country: self.snippet.country,
            subscriber_count: stats
                .filter(|s| !s.hidden_subscriber_count)
                .and_then(|s| count(&s.subscriber_count)),
            video_count: stats.and_then(|s| count(&s.video_count)),
            view_count: stats.and_then(|s| count(&s.view_count)),
            uploads_playlist,
            fetched_at: Utc::now(),
        }
    }
}

impl VideoItem {
    pub fn into_record(self) -> VideoRecord {
        let mut record = VideoRecord::new(self.id);
        if let Some(snippet) = self.snippet {
            record.channel_id = Some(ChannelId::new(snippet.channel_id));
            record.channel_title = snippet.channel_title;
            record.title = snippet.title;
            record.published_at = snippet.published_at;
        }
        if let Some(stats) = self.statistics {
            record.views = count(&stats.view_count);
            record.likes = count(&stats.like_count);
            record.comments = count(&stats.comment_count);
        }
        record.duration_seconds = self
            .content_details
            .and_then(|d| d.duration)
            .and_then(|d| parse_iso_duration(&d));
        record
    }
}

/// Thin client over the YouTube Data API v3, authenticated with an API key.
pub struct YouTubeApiClient {
    client: Client,
    config: ClientConfig,
    api_key: String,
}

impl YouTubeApiClient {
    pub fn new(api_key: String, config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    /// One cheap call so a bad key fails the run before any fetching.
    pub async fn verify_credentials(&self) -> Result<()> {
        let result: Result<ListResponse<serde_json::Value>> = self
            .get("videoCategories", &[("part", "snippet"), ("regionCode", "US")])
            .await;
        match result {
            Ok(_) => {
                info!("API credentials accepted");
                Ok(())
            }
            Err(SnowballError::Api { status, message }) if matches!(status, 400 | 401 | 403) => {
                Err(SnowballError::Unauthorized { status, message })
            }
            Err(e) => Err(e),
        }
    }

    pub async fn channel(&self, channel_id: &ChannelId) -> Result<Option<ChannelItem>> {
        let response: ListResponse<ChannelItem> = self
            .get(
                "channels",
                &[
                    ("part", "snippet,contentDetails,statistics"),
                    ("id", channel_id.as_str()),
                ],
            )
            .await?;
        Ok(response.items.into_iter().next())
    }

    /// Newest video id of an uploads playlist.
    pub async fn latest_upload(&self, playlist_id: &str) -> Result<Option<String>> {
        let response: ListResponse<PlaylistItem> = self
            .get(
                "playlistItems",
                &[
                    ("part", "contentDetails"),
                    ("playlistId", playlist_id),
                    ("maxResults", "1"),
                ],
            )
            .await?;
        Ok(response
            .items
            .into_iter()
            .next()
            .map(|item| item.content_details.video_id))
    }

    /// Looks videos up in batches. Ids the API does not know are absent.
    pub async fn videos(&self, ids: &[String]) -> Result<Vec<VideoItem>> {
        let mut videos = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_IDS_PER_CALL) {
            let joined = chunk.join(",");
            debug!("Calling YouTube API to collect info about {} videos", chunk.len());
            let response: ListResponse<VideoItem> = self
                .get(
                    "videos",
                    &[
                        ("part", "snippet,contentDetails,statistics"),
                        ("id", joined.as_str()),
                    ],
                )
                .await?;
            videos.extend(response.items);
        }
        Ok(videos)
    }

    /// Channels behind a keyword search's video results, in result order.
    pub async fn search_channels(&self, query: &str) -> Result<Vec<ChannelId>> {
        let max_results = self.config.search_results.to_string();
        let response: ListResponse<SearchItem> = self
            .get(
                "search",
                &[
                    ("part", "snippet"),
                    ("type", "video"),
                    ("q", query),
                    ("maxResults", max_results.as_str()),
                ],
            )
            .await?;
        Ok(response
            .items
            .into_iter()
            .map(|item| ChannelId::new(item.snippet.channel_id))
            .collect())
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<T> {
        let url = format!(
            "{}/{endpoint}",
            self.config.api_base_url.trim_end_matches('/')
        );
        let mut attempt = 0;
        loop {
            match self.get_once(&url, params).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let delay = self.retry_delay(attempt);
                    warn!(
                        "Attempt {} failed for {endpoint}: {e}, retrying in {delay:?}",
                        attempt + 1
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once<T: DeserializeOwned>(&self, url: &str, params: &[(&str, &str)]) -> Result<T> {
        let resp = self
            .client
            .get(url)
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| status.canonical_reason().unwrap_or("Unknown").to_string());
            return Err(SnowballError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp.json::<T>().await?)
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        Duration::from_millis(self.config.retry_delay_ms.saturating_mul(factor))
    }
}

#[async_trait]
impl MetadataService for YouTubeApiClient {
    async fn fetch_metadata(&self, channel_id: &ChannelId) -> Result<Option<ChannelMetadata>> {
        Ok(self.channel(channel_id).await?.map(ChannelItem::into_metadata))
    }
}
