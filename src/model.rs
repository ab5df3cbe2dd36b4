use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fmt::Display,
};

/// Most recommendations a single latest video contributes to a round.
pub const MAX_RECOMMENDATIONS: usize = 20;

/// Platform-assigned channel identifier, e.g. `UC...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for ChannelId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for ChannelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A channel as seen by the snowball, whether in the set or only a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub name: Option<String>,
    /// Count from the latest round that tallied this channel.
    pub recommendation_count: usize,
    pub in_set: bool,
    /// 0 for seeds.
    pub first_observed_round: usize,
    pub promoted_in_round: Option<usize>,
}

impl Channel {
    pub fn seed(id: ChannelId) -> Self {
        Self {
            id,
            name: None,
            recommendation_count: 0,
            in_set: true,
            first_observed_round: 0,
            promoted_in_round: None,
        }
    }

    pub fn candidate(id: ChannelId, round: usize) -> Self {
        Self {
            id,
            name: None,
            recommendation_count: 0,
            in_set: false,
            first_observed_round: round,
            promoted_in_round: None,
        }
    }
}

/// Ordered, duplicate-free channel list. Order is promotion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<ChannelId>", into = "Vec<ChannelId>")]
pub struct ChannelSet {
    order: Vec<ChannelId>,
    members: HashSet<ChannelId>,
}

impl ChannelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `id` unless it is already a member. Returns whether it was added.
    pub fn push(&mut self, id: ChannelId) -> bool {
        if !self.members.insert(id.clone()) {
            return false;
        }
        self.order.push(id);
        true
    }

    pub fn contains(&self, id: &ChannelId) -> bool {
        self.members.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelId> {
        self.order.iter()
    }

    pub fn as_slice(&self) -> &[ChannelId] {
        &self.order
    }
}

impl From<Vec<ChannelId>> for ChannelSet {
    fn from(ids: Vec<ChannelId>) -> Self {
        let mut set = ChannelSet::new();
        for id in ids {
            set.push(id);
        }
        set
    }
}

impl From<ChannelSet> for Vec<ChannelId> {
    fn from(set: ChannelSet) -> Self {
        set.order
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMetadata {
    pub id: ChannelId,
    pub title: String,
    pub description: Option<String>,
    pub custom_url: Option<String>,
    pub published_at: Option<String>,
    pub country: Option<String>,
    /// Absent when the channel hides it.
    pub subscriber_count: Option<u64>,
    pub video_count: Option<u64>,
    pub view_count: Option<u64>,
    pub uploads_playlist: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub id: String,
    pub channel_id: Option<ChannelId>,
    pub channel_title: Option<String>,
    pub title: Option<String>,
    pub published_at: Option<String>,
    pub views: Option<u64>,
    pub likes: Option<u64>,
    pub comments: Option<u64>,
    pub duration_seconds: Option<u64>,
    pub fetched_at: DateTime<Utc>,
}

impl VideoRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            channel_id: None,
            channel_title: None,
            title: None,
            published_at: None,
            views: None,
            likes: None,
            comments: None,
            duration_seconds: None,
            fetched_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedVideo {
    pub video_id: String,
    pub channel_id: ChannelId,
    pub channel_title: Option<String>,
    /// What the API returned for the video, when it was looked up.
    pub video: Option<VideoRecord>,
}

/// A channel's newest upload and what the platform recommends next to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestVideo {
    pub video: VideoRecord,
    /// In the platform's displayed order.
    pub recommendations: Vec<RecommendedVideo>,
}

impl LatestVideo {
    /// Recommended channels in displayed order, capped at [`MAX_RECOMMENDATIONS`].
    pub fn recommended_channels(&self) -> Vec<ChannelId> {
        self.counted().map(|r| r.channel_id.clone()).collect()
    }

    /// The recommendations a round takes into account.
    pub fn counted(&self) -> impl Iterator<Item = &RecommendedVideo> {
        self.recommendations.iter().take(MAX_RECOMMENDATIONS)
    }
}

/// What one in-set channel contributed to a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub channel_id: ChannelId,
    pub video_id: Option<String>,
    /// Displayed order, blacklisted channels removed.
    pub recommended: Vec<ChannelId>,
    /// Ids of the recommended videos behind `recommended`, same order.
    #[serde(default)]
    pub recommended_videos: Vec<String>,
    pub error: Option<String>,
}

impl SourceRecord {
    /// A channel that contributed nothing this round.
    pub fn skipped(channel_id: ChannelId, error: impl Into<String>) -> Self {
        Self {
            channel_id,
            video_id: None,
            recommended: Vec::new(),
            recommended_videos: Vec::new(),
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round: usize,
    pub set_size_before: usize,
    pub sources: Vec<SourceRecord>,
    pub promoted: Option<ChannelId>,
    pub promoted_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    /// Target size reached.
    Complete,
    /// No eligible candidate was left before the target size.
    Exhausted,
    Interrupted,
}

/// Everything a run accumulates. Written after every round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnowballReport {
    pub set_name: String,
    pub target_size: usize,
    pub seed_size: usize,
    pub status: RunStatus,
    pub channel_set: ChannelSet,
    pub channels: BTreeMap<ChannelId, Channel>,
    pub metadata: BTreeMap<ChannelId, ChannelMetadata>,
    pub videos: BTreeMap<String, VideoRecord>,
    pub rounds: Vec<RoundRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SnowballReport {
    pub fn new(set_name: impl Into<String>, seed: ChannelSet, target_size: usize) -> Self {
        let channels = seed
            .iter()
            .map(|id| (id.clone(), Channel::seed(id.clone())))
            .collect();
        Self {
            set_name: set_name.into(),
            target_size,
            seed_size: seed.len(),
            status: RunStatus::Running,
            channel_set: seed,
            channels,
            metadata: BTreeMap::new(),
            videos: BTreeMap::new(),
            rounds: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Complete
    }

    pub fn channel_name(&self, id: &ChannelId) -> Option<&str> {
        self.metadata
            .get(id)
            .map(|m| m.title.as_str())
            .or_else(|| self.channels.get(id).and_then(|c| c.name.as_deref()))
    }

    /// Records `id` as observed in `round`, keeping the first observation.
    pub fn observe(&mut self, id: &ChannelId, name: Option<&str>, round: usize) {
        let channel = self
            .channels
            .entry(id.clone())
            .or_insert_with(|| Channel::candidate(id.clone(), round));
        if channel.name.is_none() {
            channel.name = name.map(str::to_owned);
        }
    }

    /// Forgets every observed channel `keep` rejects, along with its metadata,
    /// its videos and its appearances in round records. Members are not
    /// touched. Returns how many channels were forgotten.
    pub fn forget_channels(&mut self, keep: impl Fn(&ChannelId) -> bool) -> usize {
        let members = &self.channel_set;
        let before = self.channels.len();
        self.channels.retain(|id, _| members.contains(id) || keep(id));
        self.metadata.retain(|id, _| members.contains(id) || keep(id));
        self.videos.retain(|_, video| match &video.channel_id {
            Some(id) => members.contains(id) || keep(id),
            None => true,
        });

        for source in self.rounds.iter_mut().flat_map(|r| r.sources.iter_mut()) {
            if source.recommended_videos.len() == source.recommended.len() {
                let (channels, videos): (Vec<ChannelId>, Vec<String>) = source
                    .recommended
                    .drain(..)
                    .zip(source.recommended_videos.drain(..))
                    .filter(|(id, _)| keep(id))
                    .unzip();
                source.recommended = channels;
                source.recommended_videos = videos;
            } else {
                source.recommended.retain(|id| keep(id));
            }
        }
        before - self.channels.len()
    }

    /// Each scanned video with the videos recommended next to it. A video
    /// scanned in several rounds keeps its latest recommendations.
    pub fn scanned_videos(&self) -> BTreeMap<&str, &[String]> {
        let mut scanned = BTreeMap::new();
        for source in self.rounds.iter().flat_map(|r| &r.sources) {
            if let Some(video_id) = &source.video_id {
                scanned.insert(video_id.as_str(), source.recommended_videos.as_slice());
            }
        }
        scanned
    }

    /// Recommended videos by how many scanned videos recommend them, most
    /// recommended first, then by id.
    pub fn video_recommendation_counts(&self) -> Vec<(&str, usize)> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for recommended in self.scanned_videos().into_values() {
            for id in recommended {
                *counts.entry(id.as_str()).or_default() += 1;
            }
        }
        let mut ranked: Vec<_> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
    }
}
