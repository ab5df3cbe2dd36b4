use crate::{
    blacklist::Blacklist,
    error::{Result, SnowballError},
    model::{ChannelId, ChannelSet, RoundRecord, RunStatus, SnowballReport, SourceRecord},
    source::{MetadataService, RecommendationFetcher},
    tally::RecommendationTally,
    writer::ResultWriter,
};
use chrono::Utc;
use log::{debug, info, warn};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Grows a channel set one promotion per round, ranking candidates by how
/// many in-set channels recommend them.
pub struct Snowball<R, M> {
    recommender: R,
    metadata: M,
    checkpoint: Option<ResultWriter>,
    stop: Option<Arc<AtomicBool>>,
}

impl<R: RecommendationFetcher, M: MetadataService> Snowball<R, M> {
    pub fn new(recommender: R, metadata: M) -> Self {
        Self {
            recommender,
            metadata,
            checkpoint: None,
            stop: None,
        }
    }

    /// Saves the report after the seed is loaded and after every round.
    pub fn with_checkpoint(mut self, writer: ResultWriter) -> Self {
        self.checkpoint = Some(writer);
        self
    }

    /// Checked between rounds; once set the run ends as interrupted.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn checkpoint(&self) -> Option<&ResultWriter> {
        self.checkpoint.as_ref()
    }

    pub async fn run(
        &self,
        set_name: &str,
        seed: &[ChannelId],
        target_size: usize,
        blacklist: &Blacklist,
    ) -> Result<SnowballReport> {
        let mut channel_set = ChannelSet::new();
        for id in seed {
            if blacklist.contains(id) {
                debug!("Dropping blacklisted seed channel {id}");
            } else if !channel_set.push(id.clone()) {
                warn!("Seed channel {id} listed twice");
            }
        }
        info!("We start from {} channels", channel_set.len());
        if target_size < channel_set.len() {
            return Err(SnowballError::InvalidTarget {
                target: target_size,
                seed: channel_set.len(),
            });
        }

        let mut report = SnowballReport::new(set_name, channel_set, target_size);
        let seeds: Vec<ChannelId> = report.channel_set.iter().cloned().collect();
        for id in &seeds {
            self.record_metadata(&mut report, id).await;
        }
        self.resume(report, target_size, blacklist).await
    }

    /// Continues a run from a saved report. Round numbers carry on.
    ///
    /// A report whose set holds a blacklisted channel is refused. Blacklisted
    /// candidates it only observed are forgotten.
    pub async fn resume(
        &self,
        mut report: SnowballReport,
        target_size: usize,
        blacklist: &Blacklist,
    ) -> Result<SnowballReport> {
        if target_size < report.channel_set.len() {
            return Err(SnowballError::InvalidTarget {
                target: target_size,
                seed: report.channel_set.len(),
            });
        }
        let banned: Vec<&str> = report
            .channel_set
            .iter()
            .filter(|id| blacklist.contains(id))
            .map(ChannelId::as_str)
            .collect();
        if !banned.is_empty() {
            return Err(SnowballError::Config(format!(
                "the saved set of {} holds blacklisted channels {}, start over with --fresh",
                report.set_name,
                banned.join(", ")
            )));
        }
        let forgotten = report.forget_channels(|id| !blacklist.contains(id));
        if forgotten > 0 {
            warn!("Forgot {forgotten} blacklisted candidates from the saved report");
        }
        report.target_size = target_size;
        report.status = RunStatus::Running;
        report.finished_at = None;
        self.save(&report)?;

        while report.channel_set.len() < target_size {
            if self.stop_requested() {
                warn!(
                    "Stopping after {} rounds with {} of {} channels",
                    report.rounds.len(),
                    report.channel_set.len(),
                    target_size
                );
                report.status = RunStatus::Interrupted;
                break;
            }

            let promoted = self.round(&mut report, blacklist).await;
            let promoted = match promoted {
                Some(id) => id,
                None => {
                    warn!(
                        "No eligible candidate left: stopping with {} of {} channels",
                        report.channel_set.len(),
                        target_size
                    );
                    report.status = RunStatus::Exhausted;
                    break;
                }
            };
            self.record_metadata(&mut report, &promoted).await;
            self.save(&report)?;
        }

        if report.status == RunStatus::Running {
            report.status = RunStatus::Complete;
        }
        report.finished_at = Some(Utc::now());
        self.save(&report)?;
        Ok(report)
    }

    /// Scans every in-set channel, tallies eligible candidates and promotes
    /// the winner. Returns the promoted channel, if any.
    pub async fn round(
        &self,
        report: &mut SnowballReport,
        blacklist: &Blacklist,
    ) -> Option<ChannelId> {
        let round = report.rounds.len() + 1;
        let members: Vec<ChannelId> = report.channel_set.iter().cloned().collect();
        info!("Round {round}: scanning {} channels", members.len());

        let mut tally = RecommendationTally::new();
        let mut sources = Vec::with_capacity(members.len());

        for source in &members {
            let latest = match self.recommender.fetch_recommendations(source).await {
                Ok(Some(latest)) => latest,
                Ok(None) => {
                    warn!("    {source} has no video, skipping");
                    sources.push(SourceRecord::skipped(source.clone(), "no video"));
                    continue;
                }
                Err(e) => {
                    warn!("    Could not get recommendations for {source}: {e}");
                    sources.push(SourceRecord::skipped(source.clone(), e.to_string()));
                    continue;
                }
            };

            let mut recommended = Vec::new();
            let mut recommended_videos = Vec::new();
            for rec in latest.counted() {
                if blacklist.contains(&rec.channel_id) {
                    continue;
                }
                if !report.channel_set.contains(&rec.channel_id) {
                    report.observe(&rec.channel_id, rec.channel_title.as_deref(), round);
                }
                if let Some(video) = &rec.video {
                    report
                        .videos
                        .entry(rec.video_id.clone())
                        .or_insert_with(|| video.clone());
                }
                recommended.push(rec.channel_id.clone());
                recommended_videos.push(rec.video_id.clone());
            }
            debug!(
                "    {source}: {} recommendations on {}",
                recommended.len(),
                latest.video.id
            );
            tally.observe(
                source,
                recommended.iter().filter(|id| !report.channel_set.contains(id)),
            );

            sources.push(SourceRecord {
                channel_id: source.clone(),
                video_id: Some(latest.video.id.clone()),
                recommended,
                recommended_videos,
                error: None,
            });
            report.videos.insert(latest.video.id.clone(), latest.video);
        }

        let ranked = tally.ranked();
        for (id, count) in &ranked {
            if let Some(channel) = report.channels.get_mut(id) {
                channel.recommendation_count = *count;
            }
        }
        for (id, count) in ranked.iter().take(20) {
            debug!(
                "   - {id} ({}) - {count}",
                report.channel_name(id).unwrap_or("unknown")
            );
        }

        let winner = tally.winner();
        if let Some((id, count)) = &winner {
            info!(
                "Round {round}: promoting {id} ({}) recommended by {count} of {} channels",
                report.channel_name(id).unwrap_or("unknown"),
                members.len()
            );
            report.channel_set.push(id.clone());
            if let Some(channel) = report.channels.get_mut(id) {
                channel.in_set = true;
                channel.promoted_in_round = Some(round);
            }
        }

        report.rounds.push(RoundRecord {
            round,
            set_size_before: members.len(),
            sources,
            promoted: winner.as_ref().map(|(id, _)| id.clone()),
            promoted_count: winner.as_ref().map_or(0, |(_, n)| *n),
        });
        winner.map(|(id, _)| id)
    }

    async fn record_metadata(&self, report: &mut SnowballReport, id: &ChannelId) {
        match self.metadata.fetch_metadata(id).await {
            Ok(Some(metadata)) => {
                if let Some(channel) = report.channels.get_mut(id) {
                    channel.name = Some(metadata.title.clone());
                }
                report.metadata.insert(id.clone(), metadata);
            }
            Ok(None) => warn!("    No metadata for channel {id}"),
            Err(e) => warn!("    Could not get metadata for channel {id}: {e}"),
        }
    }

    fn save(&self, report: &SnowballReport) -> Result<()> {
        match &self.checkpoint {
            Some(writer) => writer.save(report),
            None => Ok(()),
        }
    }

    fn stop_requested(&self) -> bool {
        self.stop
            .as_ref()
            .map_or(false, |stop| stop.load(Ordering::SeqCst))
    }
}
