use crate::{
    config::ClientConfig,
    error::{Result, SnowballError},
    model::{ChannelId, LatestVideo, RecommendedVideo, VideoRecord},
    source::RecommendationFetcher,
    youtube::{
        api::YouTubeApiClient,
        watch::{parse_watch_page, watch_url, WatchPage},
    },
};
use async_trait::async_trait;
use log::{debug, info};
use reqwest::{Client, Url};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tokio::sync::RwLock;

/// Recommendations scraped from the watch page of a channel's newest upload,
/// with recommended videos resolved to their channels through the API.
///
/// Latest uploads, watch pages and video lookups are cached for the life of
/// the recommender, so rounds after the first mostly hit memory.
pub struct YouTubeRecommender {
    api: Arc<YouTubeApiClient>,
    client: Client,
    watch_base: Url,
    latest: RwLock<HashMap<ChannelId, Option<String>>>,
    pages: RwLock<HashMap<String, WatchPage>>,
    videos: RwLock<HashMap<String, VideoRecord>>,
    unknown_videos: RwLock<HashSet<String>>,
}

impl YouTubeRecommender {
    pub fn new(api: Arc<YouTubeApiClient>, config: &ClientConfig) -> Result<Self> {
        let watch_base = Url::parse(&config.watch_base_url).map_err(|e| {
            SnowballError::Config(format!("watch_base_url {}: {e}", config.watch_base_url))
        })?;
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            api,
            client,
            watch_base,
            latest: RwLock::new(HashMap::new()),
            pages: RwLock::new(HashMap::new()),
            videos: RwLock::new(HashMap::new()),
            unknown_videos: RwLock::new(HashSet::new()),
        })
    }

    async fn latest_video_id(&self, channel_id: &ChannelId) -> Result<Option<String>> {
        if let Some(cached) = self.latest.read().await.get(channel_id) {
            return Ok(cached.clone());
        }

        let latest = match self.api.channel(channel_id).await? {
            None => {
                info!("    Channel {channel_id} not found by the API");
                None
            }
            Some(channel) => match channel.uploads_playlist() {
                Some(uploads) => self.api.latest_upload(uploads).await?,
                None => None,
            },
        };
        self.latest
            .write()
            .await
            .insert(channel_id.clone(), latest.clone());
        Ok(latest)
    }

    async fn watch_page(&self, video_id: &str) -> Result<WatchPage> {
        if let Some(page) = self.pages.read().await.get(video_id) {
            return Ok(page.clone());
        }

        let url = watch_url(&self.watch_base, video_id)
            .ok_or_else(|| SnowballError::Parse(format!("bad watch url for {video_id}")))?;
        let resp = self
            .client
            .get(url.as_str())
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SnowballError::Api {
                status: status.as_u16(),
                message: format!("watch page of {video_id}"),
            });
        }
        let final_url = resp.url().clone();
        let text = resp.text().await?;

        let page = parse_watch_page(video_id, &final_url, &text);
        info!(
            "{video_id}: {} [{}] {} views and {} recommendations",
            page.title.as_deref().unwrap_or(""),
            page.channel_title.as_deref().unwrap_or(""),
            page.views.map_or_else(|| "?".to_string(), |v| v.to_string()),
            page.recommendations.len()
        );
        self.pages
            .write()
            .await
            .insert(video_id.to_owned(), page.clone());
        Ok(page)
    }

    /// Makes sure every id has been looked up through the API once.
    async fn resolve_videos(&self, ids: &[String]) -> Result<()> {
        let missing: Vec<String> = {
            let videos = self.videos.read().await;
            let unknown = self.unknown_videos.read().await;
            ids.iter()
                .filter(|id| !videos.contains_key(*id) && !unknown.contains(*id))
                .cloned()
                .collect()
        };
        if missing.is_empty() {
            return Ok(());
        }

        let found = self.api.videos(&missing).await?;
        let mut videos = self.videos.write().await;
        for item in found {
            videos.insert(item.id.clone(), item.into_record());
        }
        let mut unknown = self.unknown_videos.write().await;
        for id in missing {
            if !videos.contains_key(&id) {
                debug!("    Skipping video {id} unknown to the API");
                unknown.insert(id);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RecommendationFetcher for YouTubeRecommender {
    async fn fetch_recommendations(&self, channel_id: &ChannelId) -> Result<Option<LatestVideo>> {
        let Some(video_id) = self.latest_video_id(channel_id).await? else {
            return Ok(None);
        };
        let page = self.watch_page(&video_id).await?;

        let mut lookup = page.recommendations.clone();
        lookup.push(video_id);
        self.resolve_videos(&lookup).await?;

        let videos = self.videos.read().await;
        Ok(Some(latest_video(&page, &videos)))
    }
}

/// Combines a scraped page with the API records of the videos it shows. The
/// page fills what the API left out; recommended videos the API does not know,
/// or knows without a channel, are dropped.
fn latest_video(page: &WatchPage, videos: &HashMap<String, VideoRecord>) -> LatestVideo {
    let mut video = match videos.get(&page.video_id) {
        Some(record) => record.clone(),
        None => page.to_record(),
    };
    page.merge_into(&mut video);

    let recommendations = page
        .recommendations
        .iter()
        .filter_map(|id| {
            let record = videos.get(id)?;
            Some(RecommendedVideo {
                video_id: id.clone(),
                channel_id: record.channel_id.clone()?,
                channel_title: record.channel_title.clone(),
                video: Some(record.clone()),
            })
        })
        .collect();

    LatestVideo {
        video,
        recommendations,
    }
}
