//! Boundary contracts between the snowball engine and the video platform.

use crate::{
    error::Result,
    model::{ChannelId, ChannelMetadata, LatestVideo},
};
use async_trait::async_trait;
use std::sync::Arc;

/// Looks up what the platform recommends next to a channel's latest video.
#[async_trait]
pub trait RecommendationFetcher: Send + Sync {
    /// `Ok(None)` when the channel has no video. An error only affects this
    /// channel for the current round.
    async fn fetch_recommendations(&self, channel_id: &ChannelId) -> Result<Option<LatestVideo>>;
}

/// Descriptive channel data. Never used for ranking.
#[async_trait]
pub trait MetadataService: Send + Sync {
    /// `Ok(None)` when the platform does not know the channel.
    async fn fetch_metadata(&self, channel_id: &ChannelId) -> Result<Option<ChannelMetadata>>;
}

#[async_trait]
impl<T: RecommendationFetcher + ?Sized> RecommendationFetcher for Arc<T> {
    async fn fetch_recommendations(&self, channel_id: &ChannelId) -> Result<Option<LatestVideo>> {
        (**self).fetch_recommendations(channel_id).await
    }
}

#[async_trait]
impl<T: MetadataService + ?Sized> MetadataService for Arc<T> {
    async fn fetch_metadata(&self, channel_id: &ChannelId) -> Result<Option<ChannelMetadata>> {
        (**self).fetch_metadata(channel_id).await
    }
}
