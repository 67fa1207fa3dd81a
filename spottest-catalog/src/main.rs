//! spottest - voting candidates from your listening history
//!
//! Subcommands:
//! - `candidates`: fetch the user's tracks, filter them for a voting
//!   event and print the ranked result
//! - `prepare-list`: convert a published voting list (stdin) into a
//!   reference list document (stdout)
//! - `events`: list the built-in voting events

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use spottest_catalog::countdown::{self, EventSettings, VotingEvent};
use spottest_catalog::models::{prepare_voting_list, ReferenceList, Source, Track};
use spottest_catalog::pager::PagedFetcher;
use spottest_catalog::provider::SpotifyClient;
use spottest_catalog::session::{collect_sources, CatalogSession};
use spottest_common::config::{load_or_default, TomlConfig};
use spottest_common::logging::init_tracing;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

/// Command-line arguments for spottest
#[derive(Parser, Debug)]
#[command(name = "spottest")]
#[command(about = "Find voting candidates in your Spotify listening history")]
#[command(version)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, env = "SPOTTEST_CONFIG")]
    config: Option<PathBuf>,

    /// Log level, overrides the config file
    #[arg(long, global = true, env = "SPOTTEST_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, filter and print ranked candidates
    Candidates(CandidatesArgs),
    /// Convert a published voting list on stdin into a reference list on stdout
    PrepareList,
    /// List built-in voting events
    Events,
}

#[derive(Args, Debug)]
struct CandidatesArgs {
    /// OAuth bearer token for the Spotify Web API
    #[arg(long, env = "SPOTTEST_TOKEN", hide_env_values = true)]
    token: String,

    /// Voting event id
    #[arg(long, env = "SPOTTEST_EVENT")]
    event: Option<String>,

    /// Reference list document for the event
    #[arg(long, env = "SPOTTEST_VOTING_LIST")]
    voting_list: Option<PathBuf>,

    /// Judge eligibility by release year instead of the voting list
    #[arg(long)]
    by_release_year: bool,

    /// Eligibility year for --by-release-year, overrides the event's own
    #[arg(long, requires = "by_release_year")]
    year: Option<i32>,

    /// Maximum tracks per artist (unlimited when absent)
    #[arg(long, env = "SPOTTEST_MAX_PER_ARTIST")]
    max_per_artist: Option<usize>,

    /// List to read candidates from
    #[arg(long, value_enum, default_value_t = SourceArg::LongTerm)]
    source: SourceArg,

    /// Fetch every list completely and merge them instead
    #[arg(long, conflicts_with = "source")]
    all_sources: bool,

    /// Matches to gather before stopping (single-list mode)
    #[arg(long)]
    min_matches: Option<usize>,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum SourceArg {
    LongTerm,
    MediumTerm,
    ShortTerm,
    Library,
}

impl From<SourceArg> for Source {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::LongTerm => Source::LongTerm,
            SourceArg::MediumTerm => Source::MediumTerm,
            SourceArg::ShortTerm => Source::ShortTerm,
            SourceArg::Library => Source::Library,
        }
    }
}

const ALL_SOURCES: [Source; 4] = [
    Source::LongTerm,
    Source::MediumTerm,
    Source::ShortTerm,
    Source::Library,
];

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, config_problem) = load_or_default(cli.config.as_deref());
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    init_tracing(&config.logging).context("Failed to initialize logging")?;
    if let Some(problem) = config_problem {
        warn!("{}; using defaults", problem);
    }

    match cli.command {
        Command::Candidates(args) => candidates(args, &config).await,
        Command::PrepareList => prepare_list().await,
        Command::Events => {
            for event in countdown::all() {
                println!("{:<18} {}", event.id, event.name);
            }
            Ok(())
        }
    }
}

async fn candidates(args: CandidatesArgs, config: &TomlConfig) -> Result<()> {
    let event = resolve_event(args.event.as_deref().or(config.event.as_deref()))?;
    let settings = EventSettings {
        max_per_artist: args.max_per_artist.or(config.max_per_artist),
        year: args.year,
        use_voting_list: !args.by_release_year,
    };

    let reference = match args.voting_list.as_ref().or(config.voting_list.as_ref()) {
        // A list that fails to load stays "not loaded" and filters nothing
        Some(path) => match ReferenceList::load(path).await {
            Ok(list) => Some(Arc::new(list)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Voting list not loaded");
                None
            }
        },
        None => {
            warn!(event = event.id, "No voting list configured, membership filter disabled");
            None
        }
    };

    let client = Arc::new(SpotifyClient::new(args.token).context("Failed to build HTTP client")?);
    info!(event = event.id, "Collecting candidates for {}", event.name);

    let tracks = if args.all_sources {
        let fetchers: Vec<PagedFetcher> = ALL_SOURCES
            .iter()
            .map(|&source| PagedFetcher::new(Arc::new(client.pager(source)), source, &config.fetch))
            .collect();
        let collection = collect_sources(&fetchers).await;
        if !collection.failures.is_empty() {
            warn!(failed_pages = collection.failures.len(), "Some pages could not be fetched");
        }
        event
            .pipeline(&settings, reference)
            .apply_ranked(&collection.ordered())
    } else {
        let source = Source::from(args.source);
        let fetcher = PagedFetcher::new(Arc::new(client.pager(source)), source, &config.fetch);
        let mut session = CatalogSession::new(fetcher, event, reference, &config.driver);
        session.update_settings(settings);

        let report = match args.min_matches {
            Some(target) => session.loader().start_session(target).await,
            None => session.start().await,
        }
        .context("Failed to fetch the first page")?;
        info!(matches = report.matches, stop = ?report.stop, "Fetching finished");

        session.filtered_tracks()
    };

    print_tracks(&tracks, args.json)
}

fn resolve_event(id: Option<&str>) -> Result<&'static VotingEvent> {
    match id {
        Some(id) => Ok(countdown::find(id)?),
        None => Ok(countdown::default_event()),
    }
}

fn print_tracks(tracks: &[Track], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(tracks)?);
        return Ok(());
    }
    for track in tracks {
        let sources: Vec<String> = track.sources.iter().map(Source::to_string).collect();
        println!(
            "{:>4}. {} - {} [{}]",
            track.rank,
            track.title,
            track.artist_line(),
            sources.join(", ")
        );
    }
    Ok(())
}

async fn prepare_list() -> Result<()> {
    let mut raw = String::new();
    tokio::io::stdin()
        .read_to_string(&mut raw)
        .await
        .context("Failed to read stdin")?;

    let entries = prepare_voting_list(&raw).context("Failed to convert voting list")?;
    info!(entries = entries.len(), "Voting list prepared");
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}
