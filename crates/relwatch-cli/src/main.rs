use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use relwatch_api::LinearClient;
use relwatch_cache::CacheManager;
use relwatch_core::linear::parse_linear_key;
use relwatch_core::markup::to_markdown;
use relwatch_core::summary::{
    build_summary_context, parse_summary_key, recent_releases, week_of, WINDOW_DAYS,
};
use relwatch_core::{
    CachedAggregator, ChatGenerator, Clock, Config, LinearDigest, LinearStore, Release,
    ReleaseAggregator, ReleaseContext, SourceConfig, SummaryStore, SystemClock,
    WeeklySummarizer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "relwatch")]
#[command(version, about = "Release notes from every upstream, in one list", long_about = None)]
struct Cli {
    /// Config file (defaults to <config dir>/relwatch/config.toml)
    #[arg(long, global = true, env = "RELWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Skip the release cache
    #[arg(long, global = true)]
    no_cache: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// List merged releases, newest first
    Releases {
        /// Repo substring, optionally prefixed with a source kind (gh:wallet)
        #[arg(long)]
        repo: Option<String>,

        #[arg(long, default_value = "releases")]
        context: ReleaseContext,

        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },
    /// Show the fetch units a context resolves to
    Sources {
        #[arg(long, default_value = "releases")]
        context: ReleaseContext,
    },
    /// Weekly summaries for the chat channel
    Summary {
        #[command(subcommand)]
        action: SummaryCommand,
    },
}

#[derive(clap::Subcommand)]
enum SummaryCommand {
    /// Print the input the release summary generator would get
    Context {
        #[arg(long, default_value_t = WINDOW_DAYS)]
        days: i64,
    },
    /// Summarize this week's releases and store the result
    Generate,
    /// Summarize the Linear issues completed this week and store the result
    Linear {
        #[arg(long, default_value_t = WINDOW_DAYS)]
        days: i64,
    },
    /// Print a stored summary
    Show {
        /// weekly-summary:YYYY-MM-DD, a bare YYYY-MM-DD, or weekly-linear-summary-YEAR-WEEK
        key: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Markdown,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load()?,
    };
    Ok(config)
}

fn open_cache() -> Option<Arc<CacheManager>> {
    let path = dirs::cache_dir()?.join("relwatch").join("cache.db");
    match CacheManager::new(&path) {
        Ok(cache) => Some(Arc::new(cache)),
        Err(e) => {
            tracing::warn!("Cache unavailable at {}: {}", path.display(), e);
            None
        }
    }
}

/// What a unit fetches, without its token
fn describe_targets(config: &SourceConfig) -> String {
    let mut targets: Vec<String> = config.repos.clone();
    targets.extend(config.packages.iter().cloned());
    if let Some(projects) = &config.projects {
        targets.extend(projects.projects().into_iter().map(|p| p.name));
    }

    let mut line = if targets.is_empty() {
        "-".to_string()
    } else {
        targets.join(", ")
    };
    if !config.enabled {
        line.push_str(" (disabled)");
    }
    if config.token().is_some() {
        line.push_str(" [token]");
    }
    line
}

fn print_markdown(releases: &[Release]) {
    for release in releases {
        println!("## {}\n", release.title);
        println!(
            "{} {} | {} | {}\n",
            release.repo,
            release.tag,
            release.date.format("%Y-%m-%d"),
            release.url
        );
        let body = to_markdown(&release.body);
        if !body.trim().is_empty() {
            println!("{}\n", body.trim_end());
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_summary(
    action: SummaryCommand,
    config: Config,
    cache: Option<Arc<CacheManager>>,
) -> anyhow::Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match action {
        SummaryCommand::Context { days } => {
            let aggregator = ReleaseAggregator::new(config);
            let releases = aggregator
                .list_releases(ReleaseContext::Summary, None)
                .await?;

            let now = clock.now();
            let recent = recent_releases(&releases, now, days);
            let previous = cache
                .map(|cache| SummaryStore::new(cache).previous(week_of(now)))
                .unwrap_or_default();

            tracing::info!("{} releases in the last {} days", recent.len(), days);
            println!("{}", build_summary_context(&recent, &previous));
        }
        SummaryCommand::Generate => {
            let generator = ChatGenerator::from_config(&config, &config.ai.model);
            let releases = ReleaseAggregator::new(config)
                .list_releases(ReleaseContext::Summary, None)
                .await?;

            let mut summarizer = WeeklySummarizer::new(generator, clock);
            match cache {
                Some(cache) => summarizer = summarizer.with_store(SummaryStore::new(cache)),
                None => tracing::warn!("No cache, the summary will not be stored"),
            }

            let summary = summarizer.summarize(&releases).await;
            print_json(&summary)?;
        }
        SummaryCommand::Linear { days } => {
            let api_key = config.linear.api_key().with_context(|| {
                format!(
                    "No Linear API key, set linear.api_key or ${}",
                    config.linear.api_key_env
                )
            })?;
            let client = LinearClient::with_url(
                api_key,
                config.endpoints.linear_api.clone(),
                &config.http.to_http_config(),
            );
            let model = config.ai.linear_model.clone();
            let generator = ChatGenerator::from_config(&config, &model);

            let mut digest = LinearDigest::new(client, generator, model, clock);
            match cache {
                Some(cache) => digest = digest.with_store(LinearStore::new(cache)),
                None => tracing::warn!("No cache, the digest will not be stored"),
            }

            match digest.run(days).await? {
                Some(summary) => print_json(&summary)?,
                None => println!("No issues to report"),
            }
        }
        SummaryCommand::Show { key } => {
            let cache = cache.context("Stored summaries live in the cache, drop --no-cache")?;

            if let Some(week) = parse_summary_key(&key) {
                let summary = SummaryStore::new(cache)
                    .load(week)?
                    .with_context(|| format!("Summary not found: {}", key))?;
                print_json(&summary)?;
            } else if let Some((year, week)) = parse_linear_key(&key) {
                let summary = LinearStore::new(cache)
                    .load(year, week)?
                    .with_context(|| format!("Summary not found: {}", key))?;
                print_json(&summary)?;
            } else {
                anyhow::bail!("Unrecognized summary key '{}'", key);
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relwatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    let cache = if cli.no_cache { None } else { open_cache() };

    match cli.command {
        Some(Commands::Releases {
            repo,
            context,
            format,
        }) => {
            tracing::info!("Listing {} for {} source groups", context, config.sources.len());
            let aggregator = ReleaseAggregator::new(config);
            let aggregator = match cache {
                Some(cache) => CachedAggregator::with_cache(aggregator, cache),
                None => CachedAggregator::new(aggregator),
            };

            let releases = aggregator.list_releases(context, repo.as_deref()).await?;
            match format {
                Format::Json => print_json(&releases)?,
                Format::Markdown => print_markdown(&releases),
            }
        }
        Some(Commands::Sources { context }) => {
            let aggregator = ReleaseAggregator::new(config);
            for unit in aggregator.units(context)? {
                println!(
                    "{:<24} {:<24} {}",
                    unit.group_label,
                    unit.kind.display_name(),
                    describe_targets(&unit.config)
                );
            }
        }
        Some(Commands::Summary { action }) => run_summary(action, config, cache).await?,
        None => {
            println!("No command specified. Try --help");
        }
    }

    Ok(())
}
