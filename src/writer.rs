use crate::{
    error::Result,
    model::{Channel, ChannelId, ChannelMetadata, RunStatus, SnowballReport},
};
use chrono::NaiveDate;
use log::{debug, info};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

const REPORT_FILE: &str = "snowball.json";
const CHANNEL_SET_FILE: &str = "channel_set.json";
const CHANNELS_FILE: &str = "all_channels.json";
const VIDEOS_FILE: &str = "api_videos.json";
const RECOMMENDATIONS_FILE: &str = "recommendations.json";
const SCANNED_VIDEOS_FILE: &str = "scanned_videos.json";
const RECOMMENDED_VIDEOS_FILE: &str = "recommended_videos.json";

/// Videos recommended fewer times are left out of the ranked video file.
const MIN_VIDEO_RECOMMENDATIONS: usize = 2;

/// Persists a run into its own dated folder.
pub struct ResultWriter {
    folder: PathBuf,
}

#[derive(Serialize)]
struct ChannelSetSummary<'a> {
    set_name: &'a str,
    status: RunStatus,
    complete: bool,
    target_size: usize,
    seed_size: usize,
    rounds: usize,
    channels: Vec<ChannelSummary<'a>>,
}

#[derive(Serialize)]
struct ChannelSummary<'a> {
    id: &'a ChannelId,
    name: Option<&'a str>,
}

#[derive(Serialize)]
struct RecommendedVideoEntry<'a> {
    id: &'a str,
    recommendations: usize,
    title: Option<&'a str>,
    channel_id: Option<&'a ChannelId>,
    channel: Option<&'a str>,
    published_at: Option<&'a str>,
    views: Option<u64>,
    likes: Option<u64>,
    comments: Option<u64>,
}

#[derive(Serialize)]
struct ChannelEntry<'a> {
    #[serde(flatten)]
    channel: &'a Channel,
    metadata: Option<&'a ChannelMetadata>,
}

impl ResultWriter {
    /// `<data_directory>/<prefix><dd-mm-yyyy>`, created if missing.
    pub fn new(data_directory: &Path, prefix: &str, date: NaiveDate) -> Result<Self> {
        let folder = data_directory.join(format!("{prefix}{}", date.format("%d-%m-%Y")));
        Self::open(folder)
    }

    pub fn open(folder: PathBuf) -> Result<Self> {
        fs::create_dir_all(&folder)?;
        Ok(Self { folder })
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Writes every artifact of the report. Safe to call after each round.
    pub fn save(&self, report: &SnowballReport) -> Result<()> {
        self.save_json(REPORT_FILE, report)?;

        let summary = ChannelSetSummary {
            set_name: &report.set_name,
            status: report.status,
            complete: report.is_complete(),
            target_size: report.target_size,
            seed_size: report.seed_size,
            rounds: report.rounds.len(),
            channels: report
                .channel_set
                .iter()
                .map(|id| ChannelSummary {
                    id,
                    name: report.channel_name(id),
                })
                .collect(),
        };
        self.save_json(CHANNEL_SET_FILE, &summary)?;

        let channels: BTreeMap<_, _> = report
            .channels
            .iter()
            .map(|(id, channel)| {
                (
                    id,
                    ChannelEntry {
                        channel,
                        metadata: report.metadata.get(id),
                    },
                )
            })
            .collect();
        self.save_json(CHANNELS_FILE, &channels)?;
        self.save_json(VIDEOS_FILE, &report.videos)?;
        self.save_json(RECOMMENDATIONS_FILE, &report.rounds)?;
        self.save_json(SCANNED_VIDEOS_FILE, &report.scanned_videos())?;
        self.save_json(RECOMMENDED_VIDEOS_FILE, &recommended_videos(report))?;

        info!(
            "Saved {} channels ({} in set) to {}",
            report.channels.len(),
            report.channel_set.len(),
            self.folder.display()
        );
        Ok(())
    }

    /// The report saved by an earlier run into this folder, if any.
    pub fn load_report(&self) -> Result<Option<SnowballReport>> {
        self.load_json(REPORT_FILE)
    }

    /// The saved report if it belongs to `set_name` and can be resumed.
    pub fn load_checkpoint(&self, set_name: &str) -> Result<Option<SnowballReport>> {
        Ok(self
            .load_report()?
            .filter(|report| report.set_name == set_name))
    }

    fn save_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.folder.join(name);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
        fs::rename(&tmp, &path)?;
        debug!("    Wrote {}", path.display());
        Ok(())
    }

    fn load_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.folder.join(name);
        if !path.exists() {
            return Ok(None);
        }
        debug!("Loading {}", path.display());
        let text = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&text)?))
    }
}

/// Videos recommended next to at least [`MIN_VIDEO_RECOMMENDATIONS`] scanned
/// videos, most recommended first. Videos without a record are skipped.
fn recommended_videos(report: &SnowballReport) -> Vec<RecommendedVideoEntry<'_>> {
    let mut entries = Vec::new();
    let mut unknown = 0;
    for (id, count) in report.video_recommendation_counts() {
        if count < MIN_VIDEO_RECOMMENDATIONS {
            break;
        }
        let Some(video) = report.videos.get(id) else {
            unknown += 1;
            continue;
        };
        entries.push(RecommendedVideoEntry {
            id,
            recommendations: count,
            title: video.title.as_deref(),
            channel_id: video.channel_id.as_ref(),
            channel: video.channel_title.as_deref(),
            published_at: video.published_at.as_deref(),
            views: video.views,
            likes: video.likes,
            comments: video.comments,
        });
    }
    if unknown > 0 {
        debug!("    {unknown} recommended videos have no record and were left out");
    }
    entries
}
