use clap::Parser;
use log::{error, info, warn};
use snowball::{
    config, Blacklist, ChannelId, RecommendationTally, Result, ResultWriter, RunStatus, Snowball,
    SnowballConfig, SnowballError, SnowballReport,
};
use snowball::youtube::{YouTubeApiClient, YouTubeRecommender};
use std::{
    path::PathBuf,
    process::ExitCode,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

/// Grow a set of YouTube channels from a seed by following recommendations.
#[derive(Parser, Debug)]
#[command(version)]
struct Cli {
    /// The starting set of channels
    #[arg(long)]
    set: String,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// The date of the run folder, in format dd-mm-yyyy
    #[arg(long)]
    date: Option<String>,

    /// Only report on the run folder, without fetching anything
    #[arg(long)]
    summarize: bool,

    /// Ignore a checkpoint left in the run folder
    #[arg(long)]
    fresh: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(None) | Ok(Some(RunStatus::Complete)) => ExitCode::SUCCESS,
        Ok(Some(status)) => {
            warn!("Run ended {status:?}: the channel set is incomplete");
            ExitCode::from(2)
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<Option<RunStatus>> {
    let config = SnowballConfig::load_or_default(cli.config.as_deref())?;
    let (set_name, set) = config.starting_set(&cli.set)?;
    let date = config::run_date(cli.date.as_deref())?;
    let writer = ResultWriter::new(&config.data_directory, &set.output_prefix, date)?;
    info!("Folder used: {}", writer.folder().display());

    if cli.summarize {
        let report = writer.load_report()?.ok_or_else(|| {
            SnowballError::Config(format!("no run found in {}", writer.folder().display()))
        })?;
        summarize(&report);
        return Ok(None);
    }

    let api = Arc::new(YouTubeApiClient::new(config.api_key()?, config.client.clone())?);
    api.verify_credentials().await?;

    let blacklist = match &config.blacklist {
        Some(path) => Blacklist::load(path)?,
        None => Blacklist::new(),
    };

    let previous = if cli.fresh {
        None
    } else {
        writer.load_checkpoint(set_name)?
    };

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping after the current round");
                stop.store(true, Ordering::SeqCst);
            }
        });
    }

    let recommender = YouTubeRecommender::new(api.clone(), &config.client)?;
    let engine = Snowball::new(recommender, api.clone())
        .with_checkpoint(writer)
        .with_stop_flag(stop);

    let report = match previous {
        Some(report) => {
            info!(
                "Resuming from checkpoint with {} channels after {} rounds",
                report.channel_set.len(),
                report.rounds.len()
            );
            engine.resume(report, set.target_size, &blacklist).await?
        }
        None => {
            let seed = expand_seed(&api, set.load_seed()?, &set.searches).await;
            engine
                .run(set_name, &seed, set.target_size, &blacklist)
                .await?
        }
    };

    info!(
        "Done with {}: {} of {} channels",
        set_name,
        report.channel_set.len(),
        report.target_size
    );
    Ok(Some(report.status))
}

/// Appends the channels found by each search to the seed, skipping repeats.
/// A failed search is logged and skipped.
async fn expand_seed(
    api: &YouTubeApiClient,
    mut seed: Vec<ChannelId>,
    searches: &[String],
) -> Vec<ChannelId> {
    for query in searches {
        match api.search_channels(query).await {
            Ok(found) => {
                for id in found {
                    if !seed.contains(&id) {
                        info!("Adding channel {id} from search \"{query}\"");
                        seed.push(id);
                    }
                }
            }
            Err(e) => warn!("Search \"{query}\" failed: {e}"),
        }
    }
    seed
}

fn summarize(report: &SnowballReport) {
    info!(
        "Set {}: {:?}, {} of {} channels after {} rounds",
        report.set_name,
        report.status,
        report.channel_set.len(),
        report.target_size,
        report.rounds.len()
    );
    for (i, id) in report.channel_set.iter().enumerate() {
        let origin = if i < report.seed_size { "seed" } else { "promoted" };
        info!("   {:>4}. {id} ({}) [{origin}]", i + 1, name(report, id));
    }

    if let Some(last) = report.rounds.last() {
        let tally = RecommendationTally::replay(last, report.channel_set.as_slice());
        info!("Most recommended candidates of round {}:", last.round);
        for (id, count) in tally.ranked().into_iter().take(20) {
            info!("   - {id} ({}) - {count}", name(report, &id));
        }
    }
}

fn name<'a>(report: &'a SnowballReport, id: &ChannelId) -> &'a str {
    report.channel_name(id).unwrap_or("unknown channel")
}
