//! scorecache - query and follow a sports-results feed from the terminal.
//!
//! Every subcommand builds one in-process stack (feed client, cache,
//! catalog) from the effective configuration. Nothing outlives the process.

mod format;

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use scorecache_core::api::{bounded, FeedClient};
use scorecache_core::cache::{LivePoller, MatchCache, PrefetchReport, Prefetcher, Selection};
use scorecache_core::catalog::{CatalogStore, CatalogUpserter, DetailSync, OVERVIEW_VIEW};
use scorecache_core::clock::{Clock, SystemClock};
use scorecache_core::config::SyncConfig;
use scorecache_core::models::Match;
use scorecache_core::service::{MatchQuery, MatchService};
use scorecache_core::snapshot::{SnapshotKey, TabSnapshotStore};
use scorecache_core::timezone;

#[derive(Parser)]
#[command(name = "scorecache")]
#[command(about = "Local mirror of a sports-results feed", version)]
struct Cli {
    /// IANA timezone for day grouping, overrides the configured default
    #[arg(long, global = true)]
    tz: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query the matches of one day
    Matches {
        /// Sport to query, e.g. rugby
        sport: String,

        /// Calendar day (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,

        /// Only matches in this status (scheduled, live, final)
        #[arg(long)]
        status: Option<String>,

        /// Only in-progress matches, straight from the live feed
        #[arg(long)]
        live: bool,

        /// Print the response body as JSON
        #[arg(long)]
        json: bool,
    },

    /// Follow today's live scores until Ctrl-C
    Watch {
        /// Sport to follow
        sport: String,
    },

    /// Upsert tournament-detail payloads into the catalog
    Ingest {
        /// Read payloads from JSON files, in order. A file identical to an
        /// earlier one for the same tournament and view is not re-ingested
        #[arg(long, num_args = 1.., required_unless_present = "tournament", conflicts_with = "tournament")]
        file: Vec<PathBuf>,

        /// Fetch the payload for this tournament id from the feed
        #[arg(long)]
        tournament: Option<String>,

        /// Detail view (standings, top-scorers, fixtures, results)
        #[arg(long)]
        view: Option<String>,

        /// Sport tag for entities that do not carry one
        #[arg(long)]
        sport: String,

        /// Upstream version marker used for change detection
        #[arg(long)]
        source_version: Option<String>,
    },

    /// Print the effective configuration
    Config {
        /// Print only the config file path
        #[arg(long)]
        path: bool,

        /// Write the effective configuration to the config file
        #[arg(long, conflicts_with = "path")]
        save: bool,
    },
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=scorecache_core=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let config = SyncConfig::load().context("Failed to load configuration")?;
    let tz = cli.tz.or_else(|| config.default_timezone.clone());

    match cli.command {
        Commands::Matches { sport, date, status, live, json } => {
            let query = MatchQuery {
                date,
                sport,
                status,
                tz,
                live,
                external: false,
            };
            run_matches(&config, query, json).await
        }
        Commands::Watch { sport } => run_watch(&config, &sport, tz).await,
        Commands::Ingest {
            file,
            tournament,
            view,
            sport,
            source_version,
        } => {
            let payload = match tournament {
                Some(id) => IngestSource::Feed(id),
                None if !file.is_empty() => IngestSource::Files(file),
                None => anyhow::bail!("Either --file or --tournament is required"),
            };
            run_ingest(&config, payload, view, &sport, source_version).await
        }
        Commands::Config { path, save } => run_config(&config, path, save),
    }
}

/// Everything a query needs, wired once per process.
struct Stack {
    clock: Arc<dyn Clock>,
    cache: Arc<MatchCache>,
    service: MatchService,
}

impl Stack {
    fn new(config: &SyncConfig) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let client = FeedClient::from_config(config).context("Failed to build feed client")?;
        let cache = Arc::new(MatchCache::new(
            Arc::new(client),
            clock.clone(),
            config.cache_policy(),
        ));
        let catalog = Arc::new(CatalogUpserter::new(
            Arc::new(CatalogStore::new()),
            clock.clone(),
        ));
        let service = MatchService::new(cache.clone(), catalog, clock.clone());
        Ok(Self { clock, cache, service })
    }
}

async fn run_matches(config: &SyncConfig, query: MatchQuery, as_json: bool) -> Result<()> {
    let stack = Stack::new(config)?;
    let cancel = CancellationToken::new();

    if as_json {
        let body = stack.service.respond(&query, &cancel).await;
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let response = stack.service.query(&query, &cancel).await?;
    let zone = timezone::resolve_zone(query.tz.as_deref());

    println!("{} {} ({})", query.sport, response.day, response.timezone);
    if response.loading {
        eprintln!("Feed unavailable, no matches loaded yet");
    } else if response.matches.is_empty() {
        println!("No matches");
    }
    for m in &response.matches {
        println!("{}", format::match_line(m, zone));
    }
    Ok(())
}

async fn run_watch(config: &SyncConfig, sport: &str, tz: Option<String>) -> Result<()> {
    let stack = Stack::new(config)?;
    let zone = timezone::resolve_zone(tz.as_deref());
    let cancel = CancellationToken::new();

    let mut current = Selection::new(timezone::day_key_in(stack.clock.now(), zone), sport, tz.clone());
    let mut last_seen = show_day(&stack, &current, zone, &cancel).await?;

    let shutdown = CancellationToken::new();
    let (selection_tx, selection_rx) = watch::channel(current.clone());
    let poller = Arc::new(LivePoller::new(stack.cache.clone(), config.poller_policy()));
    let poller_task = poller.spawn(selection_rx, shutdown.clone());
    let prefetcher = Arc::new(Prefetcher::new(stack.cache.clone(), config.prefetch_policy()));
    let mut prefetch_task = prefetcher.clone().spawn(current.clone());

    let mut ticker = tokio::time::interval(config.poller_policy().interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    info!(sport = sport, day = %current.day, "Watching live scores");

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = ticker.tick() => {
                let today = timezone::day_key_in(stack.clock.now(), zone);
                if today != current.day {
                    current = Selection::new(today, sport, tz.clone());
                    prefetch_task = restart_prefetch(&prefetcher, prefetch_task, &current).await;
                    selection_tx.send_replace(current.clone());
                    last_seen = show_day(&stack, &current, zone, &cancel).await?;
                    continue;
                }

                let Some(entry) = stack.cache.peek(&current.key()).await else {
                    continue;
                };
                for m in entry.data {
                    let changed = last_seen
                        .get(&m.id)
                        .map_or(true, |seen| seen.status != m.status || seen.score != m.score);
                    if changed {
                        println!("{}", format::match_line(&m, zone));
                        last_seen.insert(m.id.clone(), m);
                    }
                }
            }
        }
    }

    shutdown.cancel();
    prefetcher.cancel().await;
    stack.cache.shutdown();

    if let Err(e) = poller_task.await {
        warn!(error = %e, "Live poller task ended abnormally");
    }
    match prefetch_task.await {
        Ok(report) => info!(
            fetched = report.fetched,
            failed = report.failed,
            skipped = report.skipped,
            cancelled = report.cancelled,
            "Prefetch summary"
        ),
        Err(e) => warn!(error = %e, "Prefetch task ended abnormally"),
    }
    Ok(())
}

/// Abort the running prefetch and start one for `selection`'s window.
async fn restart_prefetch(
    prefetcher: &Arc<Prefetcher>,
    previous: JoinHandle<PrefetchReport>,
    selection: &Selection,
) -> JoinHandle<PrefetchReport> {
    prefetcher.cancel().await;
    match previous.await {
        Ok(report) => info!(cancelled = report.cancelled, fetched = report.fetched, "Previous prefetch stopped"),
        Err(e) => warn!(error = %e, "Prefetch task ended abnormally"),
    }
    Arc::clone(prefetcher).spawn(selection.clone())
}

/// Print the whole day once and remember what was shown.
async fn show_day(
    stack: &Stack,
    selection: &Selection,
    zone: Option<chrono_tz::Tz>,
    cancel: &CancellationToken,
) -> Result<HashMap<String, Match>> {
    let mut query = MatchQuery::new(selection.sport.clone());
    query.date = Some(selection.day.clone());
    query.tz = selection.timezone.clone();
    let response = stack.service.query(&query, cancel).await?;

    println!("-- {} {} ({}) --", selection.sport, response.day, response.timezone);
    for m in &response.matches {
        println!("{}", format::match_line(m, zone));
    }
    Ok(response
        .matches
        .into_iter()
        .map(|m| (m.id.clone(), m))
        .collect())
}

enum IngestSource {
    Files(Vec<PathBuf>),
    Feed(String),
}

async fn run_ingest(
    config: &SyncConfig,
    source: IngestSource,
    view: Option<String>,
    sport: &str,
    source_version: Option<String>,
) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let sync = DetailSync::new(
        Arc::new(CatalogUpserter::new(Arc::new(CatalogStore::new()), clock.clone())),
        Arc::new(TabSnapshotStore::new(clock)),
    );

    let mut reports = Vec::new();
    match source {
        IngestSource::Files(paths) => {
            for path in paths {
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "unknown".to_string());
                let payload = read_payload(&path)?;
                let key = DetailSync::key_for(&payload, &stem, view.as_deref());
                let report = sync
                    .sync(key, payload, sport, source_version.clone())
                    .with_context(|| format!("Failed to ingest {}", path.display()))?;
                if !report.changed {
                    info!(file = %path.display(), key = %report.key, "Unchanged payload, skipped");
                }
                reports.push(report);
            }
        }
        IngestSource::Feed(id) => {
            let client = FeedClient::from_config(config).context("Failed to build feed client")?;
            let cancel = CancellationToken::new();
            let fetched = bounded(
                config.request_timeout(),
                &cancel,
                client.fetch_tournament_detail(&id, view.as_deref()),
            )
            .await;
            let payload = match fetched {
                Ok(payload) => payload,
                Err(e) => {
                    let key = SnapshotKey::new("tournament", id.clone(), view.as_deref().unwrap_or(OVERVIEW_VIEW));
                    sync.record_failure(&key, e.to_string());
                    return Err(e).with_context(|| format!("Failed to fetch tournament {}", id));
                }
            };
            let key = DetailSync::key_for(&payload, &id, view.as_deref());
            reports.push(sync.sync(key, payload, sport, source_version)?);
        }
    }

    let store = sync.upserter().store();
    let report = json!({
        "snapshots": reports,
        "catalog": {
            "counts": store.counts(),
            "tournaments": store.tournaments(),
            "clubs": store.clubs(),
            "players": store.players(),
        },
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn read_payload(path: &Path) -> Result<Value> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn run_config(config: &SyncConfig, path_only: bool, save: bool) -> Result<()> {
    let path = SyncConfig::config_path()?;
    if path_only {
        println!("{}", path.display());
        return Ok(());
    }
    if save {
        config.save().context("Failed to save configuration")?;
        eprintln!("Saved {}", path.display());
    }

    let mut shown = config.clone();
    if shown.api_key.is_some() {
        shown.api_key = Some("********".to_string());
    }
    println!("{}", serde_json::to_string_pretty(&shown)?);
    Ok(())
}
