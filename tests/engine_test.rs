//! Snowball engine behaviour against scripted recommendation and metadata
//! sources. No network.

use async_trait::async_trait;
use chrono::Utc;
use snowball::{
    Blacklist, ChannelId, ChannelMetadata, LatestVideo, MetadataService, RecommendationFetcher,
    RecommendationTally, RecommendedVideo, Result, ResultWriter, RunStatus, Snowball,
    SnowballError, SnowballReport, VideoRecord,
};
use std::{
    collections::{HashMap, HashSet},
    sync::{atomic::AtomicBool, Arc, Mutex},
};

// ---------------------------------------------------------------------------
// Scripted sources
// ---------------------------------------------------------------------------

enum Script {
    Recommends(Vec<&'static str>),
    NoVideo,
    Fails,
}

#[derive(Default)]
struct ScriptedFetcher {
    scripts: HashMap<ChannelId, Script>,
    calls: Mutex<Vec<ChannelId>>,
}

impl ScriptedFetcher {
    fn new() -> Self {
        Self::default()
    }

    fn recommends(mut self, channel: &str, recommended: &[&'static str]) -> Self {
        self.scripts
            .insert(channel.into(), Script::Recommends(recommended.to_vec()));
        self
    }

    fn no_video(mut self, channel: &str) -> Self {
        self.scripts.insert(channel.into(), Script::NoVideo);
        self
    }

    fn fails(mut self, channel: &str) -> Self {
        self.scripts.insert(channel.into(), Script::Fails);
        self
    }

    fn calls(&self) -> Vec<ChannelId> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecommendationFetcher for ScriptedFetcher {
    async fn fetch_recommendations(&self, channel_id: &ChannelId) -> Result<Option<LatestVideo>> {
        self.calls.lock().unwrap().push(channel_id.clone());
        match self.scripts.get(channel_id) {
            Some(Script::Recommends(channels)) => {
                let mut video = VideoRecord::new(format!("latest-{channel_id}"));
                video.channel_id = Some(channel_id.clone());
                Ok(Some(LatestVideo {
                    video,
                    recommendations: channels
                        .iter()
                        .enumerate()
                        .map(|(i, c)| {
                            let video_id = format!("{c}-video-{i}");
                            let mut video = VideoRecord::new(video_id.clone());
                            video.channel_id = Some(ChannelId::from(*c));
                            RecommendedVideo {
                                video_id,
                                channel_id: ChannelId::from(*c),
                                channel_title: Some(format!("{c} channel")),
                                video: Some(video),
                            }
                        })
                        .collect(),
                }))
            }
            Some(Script::NoVideo) | None => Ok(None),
            Some(Script::Fails) => Err(SnowballError::Api {
                status: 503,
                message: "backend unavailable".into(),
            }),
        }
    }
}

#[derive(Default)]
struct ScriptedMetadata {
    unknown: HashSet<ChannelId>,
    calls: Mutex<Vec<ChannelId>>,
}

impl ScriptedMetadata {
    fn unknown(mut self, channel: &str) -> Self {
        self.unknown.insert(channel.into());
        self
    }

    fn calls(&self) -> Vec<ChannelId> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetadataService for ScriptedMetadata {
    async fn fetch_metadata(&self, channel_id: &ChannelId) -> Result<Option<ChannelMetadata>> {
        self.calls.lock().unwrap().push(channel_id.clone());
        if self.unknown.contains(channel_id) {
            return Ok(None);
        }
        Ok(Some(ChannelMetadata {
            id: channel_id.clone(),
            title: format!("Title of {channel_id}"),
            description: None,
            custom_url: None,
            published_at: None,
            country: None,
            subscriber_count: Some(1000),
            video_count: Some(10),
            view_count: Some(100_000),
            uploads_playlist: None,
            fetched_at: Utc::now(),
        }))
    }
}

fn ids(raw: &[&str]) -> Vec<ChannelId> {
    raw.iter().map(|s| ChannelId::from(*s)).collect()
}

fn blacklist(raw: &[&str]) -> Blacklist {
    ids(raw).into_iter().collect()
}

/// A → B, C; B → C, D; C → D, A; D → E
fn chain() -> ScriptedFetcher {
    ScriptedFetcher::new()
        .recommends("A", &["B", "C"])
        .recommends("B", &["C", "D"])
        .recommends("C", &["D", "A"])
        .recommends("D", &["E"])
}

async fn run(
    fetcher: ScriptedFetcher,
    seed: &[&str],
    target: usize,
    blacklist: &Blacklist,
) -> SnowballReport {
    Snowball::new(fetcher, ScriptedMetadata::default())
        .run("test", &ids(seed), target, blacklist)
        .await
        .unwrap()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shared_recommendation_is_promoted() {
    let fetcher = ScriptedFetcher::new()
        .recommends("A", &["X", "Y"])
        .recommends("B", &["X", "Z"]);
    let report = run(fetcher, &["A", "B"], 3, &Blacklist::new()).await;

    assert_eq!(report.channel_set.as_slice(), ids(&["A", "B", "X"]).as_slice());
    assert_eq!(report.status, RunStatus::Complete);
    assert!(report.is_complete());
    assert_eq!(report.rounds.len(), 1);

    let round = &report.rounds[0];
    assert_eq!(round.promoted, Some("X".into()));
    assert_eq!(round.promoted_count, 2);

    let tally = RecommendationTally::replay(round, report.channel_set.as_slice());
    assert_eq!(tally.count(&"X".into()), 2);
    assert_eq!(tally.count(&"Y".into()), 1);
    assert_eq!(tally.count(&"Z".into()), 1);
    assert_eq!(tally.len(), 3);

    let x = &report.channels[&ChannelId::from("X")];
    assert!(x.in_set);
    assert_eq!(x.promoted_in_round, Some(1));
    assert_eq!(x.recommendation_count, 2);
    assert!(report.metadata.contains_key(&ChannelId::from("X")));
    assert!(!report.channels[&ChannelId::from("Y")].in_set);
}

#[tokio::test]
async fn blacklisted_only_candidate_ends_run_early() {
    let fetcher = ScriptedFetcher::new().recommends("A", &["X"]);
    let blacklist = blacklist(&["X"]);
    let report = run(fetcher, &["A"], 2, &blacklist).await;

    assert_eq!(report.channel_set.as_slice(), ids(&["A"]).as_slice());
    assert_eq!(report.status, RunStatus::Exhausted);
    assert!(!report.is_complete());

    let x = ChannelId::from("X");
    assert!(!report.channels.contains_key(&x));
    assert!(!report.metadata.contains_key(&x));
    assert!(report
        .rounds
        .iter()
        .flat_map(|r| &r.sources)
        .all(|s| !s.recommended.contains(&x)));
    assert_eq!(report.rounds.len(), 1);
    assert_eq!(report.rounds[0].promoted, None);
}

#[tokio::test]
async fn target_equal_to_seed_runs_no_rounds() {
    let fetcher = Arc::new(chain());
    let report = Snowball::new(fetcher.clone(), ScriptedMetadata::default())
        .run("test", &ids(&["A", "B"]), 2, &Blacklist::new())
        .await
        .unwrap();

    assert_eq!(report.channel_set.as_slice(), ids(&["A", "B"]).as_slice());
    assert!(report.rounds.is_empty());
    assert!(report.is_complete());
    assert!(fetcher.calls().is_empty());
}

#[tokio::test]
async fn set_grows_by_one_per_round_without_duplicates() {
    let report = run(chain(), &["A"], 4, &Blacklist::new()).await;

    assert_eq!(report.channel_set.as_slice(), ids(&["A", "B", "C", "D"]).as_slice());
    assert_eq!(report.rounds.len(), 3);
    for (i, round) in report.rounds.iter().enumerate() {
        assert_eq!(round.round, i + 1);
        assert_eq!(round.set_size_before, i + 1);
        assert_eq!(round.sources.len(), i + 1);
    }

    let unique: HashSet<_> = report.channel_set.iter().collect();
    assert_eq!(unique.len(), report.channel_set.len());
}

#[tokio::test]
async fn runs_are_deterministic() {
    let first = run(chain(), &["A"], 4, &Blacklist::new()).await;
    let second = run(chain(), &["A"], 4, &Blacklist::new()).await;

    assert_eq!(first.channel_set, second.channel_set);
    assert_eq!(first.rounds, second.rounds);
}

#[tokio::test]
async fn ties_go_to_the_first_observed_candidate() {
    let fetcher = ScriptedFetcher::new()
        .recommends("A", &["P", "Q"])
        .recommends("B", &["Q", "P"]);
    let report = run(fetcher, &["A", "B"], 3, &Blacklist::new()).await;

    assert_eq!(report.rounds[0].promoted, Some("P".into()));
    assert_eq!(report.rounds[0].promoted_count, 2);
}

#[tokio::test]
async fn members_are_never_candidates() {
    let fetcher = ScriptedFetcher::new()
        .recommends("A", &["B", "X"])
        .recommends("B", &["A"])
        .recommends("C", &["A", "B"]);
    let report = run(fetcher, &["A", "B", "C"], 4, &Blacklist::new()).await;

    assert_eq!(report.rounds[0].promoted, Some("X".into()));
    assert_eq!(report.rounds[0].promoted_count, 1);
}

#[tokio::test]
async fn failing_source_does_not_abort_the_round() {
    let fetcher = ScriptedFetcher::new()
        .fails("A")
        .no_video("B")
        .recommends("C", &["X"]);
    let report = run(fetcher, &["A", "B", "C"], 4, &Blacklist::new()).await;

    assert_eq!(report.channel_set.as_slice(), ids(&["A", "B", "C", "X"]).as_slice());
    let sources = &report.rounds[0].sources;
    assert_eq!(sources.len(), 3);
    assert!(sources[0].error.as_deref().unwrap().contains("backend unavailable"));
    assert!(sources[0].recommended.is_empty());
    assert_eq!(sources[1].video_id, None);
    assert_eq!(sources[2].video_id.as_deref(), Some("latest-C"));
    assert!(report.videos.contains_key("latest-C"));
}

#[tokio::test]
async fn blacklisted_channels_are_never_fetched_or_promoted() {
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .recommends("A", &["X", "Y"])
            .recommends("X", &["Z"])
            .recommends("Y", &["Z"]),
    );
    let metadata = Arc::new(ScriptedMetadata::default());
    let blacklist = blacklist(&["X", "S"]);
    let report = Snowball::new(fetcher.clone(), metadata.clone())
        .run("test", &ids(&["S", "A"]), 3, &blacklist)
        .await
        .unwrap();

    assert_eq!(report.channel_set.as_slice(), ids(&["A", "Y", "Z"]).as_slice());
    assert_eq!(report.seed_size, 1);
    for id in ids(&["X", "S"]) {
        assert!(!fetcher.calls().contains(&id));
        assert!(!metadata.calls().contains(&id));
        assert!(!report.channel_set.contains(&id));
        assert!(!report.channels.contains_key(&id));
        assert!(!report.metadata.contains_key(&id));
    }
}

#[tokio::test]
async fn duplicate_seeds_are_dropped() {
    let report = run(chain(), &["A", "A", "B"], 2, &Blacklist::new()).await;
    assert_eq!(report.channel_set.as_slice(), ids(&["A", "B"]).as_slice());
    assert_eq!(report.seed_size, 2);
}

#[tokio::test]
async fn target_below_seed_is_rejected() {
    let result = Snowball::new(chain(), ScriptedMetadata::default())
        .run("test", &ids(&["A", "B", "C"]), 2, &Blacklist::new())
        .await;
    assert!(matches!(
        result,
        Err(SnowballError::InvalidTarget { target: 2, seed: 3 })
    ));
}

#[tokio::test]
async fn missing_metadata_is_not_fatal() {
    let fetcher = ScriptedFetcher::new().recommends("A", &["X"]);
    let report = Snowball::new(fetcher, ScriptedMetadata::default().unknown("X"))
        .run("test", &ids(&["A"]), 2, &Blacklist::new())
        .await
        .unwrap();

    assert!(report.is_complete());
    assert!(report.metadata.contains_key(&ChannelId::from("A")));
    assert!(!report.metadata.contains_key(&ChannelId::from("X")));
    assert_eq!(report.channel_name(&"X".into()), Some("X channel"));
    assert_eq!(report.channel_name(&"A".into()), Some("Title of A"));
}

#[tokio::test]
async fn recorded_rounds_replay_every_promotion() {
    let report = run(chain(), &["A"], 4, &Blacklist::new()).await;

    for round in &report.rounds {
        let tally = RecommendationTally::replay(round, report.channel_set.as_slice());
        let (winner, count) = tally.winner().unwrap();
        assert_eq!(Some(winner), round.promoted);
        assert_eq!(count, round.promoted_count);
    }
}

#[tokio::test]
async fn resume_continues_round_numbering() {
    let engine = Snowball::new(chain(), ScriptedMetadata::default());
    let partial = engine
        .run("test", &ids(&["A"]), 2, &Blacklist::new())
        .await
        .unwrap();
    assert_eq!(partial.rounds.len(), 1);

    let resumed = engine.resume(partial, 4, &Blacklist::new()).await.unwrap();
    assert_eq!(resumed.channel_set.as_slice(), ids(&["A", "B", "C", "D"]).as_slice());
    let numbers: Vec<_> = resumed.rounds.iter().map(|r| r.round).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert_eq!(resumed.target_size, 4);
    assert!(resumed.is_complete());
}

#[tokio::test]
async fn recommended_videos_are_recorded_with_their_channels() {
    let fetcher = ScriptedFetcher::new()
        .recommends("A", &["X", "Y", "Z"])
        .recommends("B", &["X"]);
    let report = run(fetcher, &["A", "B"], 3, &blacklist(&["Y"])).await;

    let source = &report.rounds[0].sources[0];
    assert_eq!(source.recommended, ids(&["X", "Z"]));
    assert_eq!(source.recommended_videos, vec!["X-video-0", "Z-video-2"]);
    assert!(report.videos.contains_key("X-video-0"));
    assert!(!report.videos.contains_key("Y-video-1"));

    let scanned = report.scanned_videos();
    assert_eq!(scanned.len(), 2);
    assert_eq!(report.video_recommendation_counts()[0], ("X-video-0", 2));
}

#[tokio::test]
async fn resume_refuses_a_set_holding_a_newly_blacklisted_channel() {
    let fetcher = Arc::new(chain());
    let engine = Snowball::new(fetcher.clone(), ScriptedMetadata::default());
    let partial = engine
        .run("test", &ids(&["A"]), 2, &Blacklist::new())
        .await
        .unwrap();
    assert_eq!(partial.channel_set.as_slice(), ids(&["A", "B"]).as_slice());
    let calls_before = fetcher.calls().len();

    let result = engine.resume(partial, 3, &blacklist(&["B"])).await;
    match result {
        Err(SnowballError::Config(message)) => assert!(message.contains('B')),
        other => panic!("expected a configuration error, got {other:?}"),
    }
    assert_eq!(fetcher.calls().len(), calls_before);
}

#[tokio::test]
async fn resume_forgets_newly_blacklisted_candidates() {
    let fetcher = Arc::new(chain());
    let metadata = Arc::new(ScriptedMetadata::default());
    let engine = Snowball::new(fetcher.clone(), metadata.clone());
    let partial = engine
        .run("test", &ids(&["A"]), 2, &Blacklist::new())
        .await
        .unwrap();
    assert!(partial.channels.contains_key(&ChannelId::from("C")));

    let blacklist = blacklist(&["C"]);
    let resumed = engine.resume(partial, 3, &blacklist).await.unwrap();
    assert_eq!(resumed.channel_set.as_slice(), ids(&["A", "B", "D"]).as_slice());

    let c = ChannelId::from("C");
    assert!(!fetcher.calls().contains(&c));
    assert!(!metadata.calls().contains(&c));
    assert!(!resumed.channels.contains_key(&c));
    assert!(!resumed.metadata.contains_key(&c));
    assert!(!resumed.videos.keys().any(|v| v.starts_with("C-")));
    for source in resumed.rounds.iter().flat_map(|r| &r.sources) {
        assert!(!source.recommended.contains(&c));
        assert!(source.recommended_videos.iter().all(|v| !v.starts_with("C-")));
    }
}

#[tokio::test]
async fn every_round_is_checkpointed() {
    let dir = tempfile::tempdir().unwrap();
    let writer = ResultWriter::open(dir.path().join("test-14-10-2018")).unwrap();
    let report = Snowball::new(chain(), ScriptedMetadata::default())
        .with_checkpoint(writer)
        .run("test", &ids(&["A"]), 4, &Blacklist::new())
        .await
        .unwrap();

    let saved = ResultWriter::open(dir.path().join("test-14-10-2018"))
        .unwrap()
        .load_report()
        .unwrap()
        .unwrap();
    assert_eq!(saved, report);
    assert!(dir
        .path()
        .join("test-14-10-2018/recommendations.json")
        .is_file());
}

#[tokio::test]
async fn stop_flag_interrupts_between_rounds() {
    let stop = Arc::new(AtomicBool::new(true));
    let report = Snowball::new(chain(), ScriptedMetadata::default())
        .with_stop_flag(stop)
        .run("test", &ids(&["A"]), 4, &Blacklist::new())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Interrupted);
    assert!(report.rounds.is_empty());
    assert!(!report.is_complete());
}
