// runwatch CLI.
// Tracks repositories and prints or watches their recent workflow runs.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use runwatch::cache::FileCacheStore;
use runwatch::github::{GitHubClient, RepoCoordinates, StatusTone, WorkflowRun};
use runwatch::poller::{self, RunsUpdate};
use runwatch::registry::{self, TrackOutcome};
use runwatch::{Config, EngineSettings, Revalidator, Session, logging};

/// Number of repositories shown by `search`, matching the web dashboard.
const SEARCH_LIMIT: u32 = 10;

#[derive(Parser)]
#[command(name = "runwatch", version)]
#[command(about = "Track GitHub repositories and watch their workflow runs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config.toml
    #[arg(short, long, env = "RUNWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "JSON_LOGS")]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start tracking a repository (owner/name)
    Track { repo: RepoCoordinates },
    /// Stop tracking a repository (owner/name)
    Untrack { repo: RepoCoordinates },
    /// List tracked repositories
    List,
    /// Show the recent workflow runs of a tracked repository
    Runs { repo: RepoCoordinates },
    /// Poll tracked repositories and print updates; press Enter to refresh
    Watch {
        /// Repositories to watch (defaults to all tracked)
        repos: Vec<RepoCoordinates>,
    },
    /// Search GitHub repositories
    Search {
        query: String,
        #[arg(long, default_value_t = SEARCH_LIMIT)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level, cli.json_logs);

    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    debug!(?config, "loaded configuration");

    let client = GitHubClient::new(&config.api_base, config.request_timeout())?
        .with_runs_per_page(config.page_size);
    let session = Session::from_env(&client)
        .await
        .context("resolving GitHub session")?;
    info!(user = %session.owner_identity, "authenticated");

    let store = match &config.cache_dir {
        Some(dir) => FileCacheStore::new(dir),
        None => FileCacheStore::open_default()?,
    };

    match cli.command {
        Commands::Track { repo } => {
            match registry::track(&store, Some(&session), &repo, Utc::now())? {
                TrackOutcome::Added => println!("Tracking {}", repo),
                TrackOutcome::AlreadyTracked => println!("{} is already tracked", repo),
            }
        }
        Commands::Untrack { repo } => {
            let engine = Revalidator::new(store, client, EngineSettings::from_config(&config)?);
            if engine.untrack(Some(&session), &repo).await? {
                println!("Stopped tracking {}", repo);
            } else {
                println!("{} was not tracked", repo);
            }
        }
        Commands::List => {
            for record in registry::tracked(&store, Some(&session))? {
                let checked = record
                    .last_checked_at()
                    .map(|at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "never".to_string());
                println!("{:<40} last checked {}", record.repo().to_string(), checked);
            }
        }
        Commands::Runs { repo } => {
            let engine = Revalidator::new(store, client, EngineSettings::from_config(&config)?);
            let result = engine
                .revalidate_detailed(Some(&session), &repo, Utc::now())
                .await?;
            debug!(
                outcome = ?result.outcome,
                upstream = result.outcome.contacted_upstream(),
                "revalidated"
            );
            print_runs(&repo, &result.runs);
        }
        Commands::Watch { repos } => {
            let repos = if repos.is_empty() {
                registry::tracked(&store, Some(&session))?
                    .iter()
                    .map(|record| record.repo().clone())
                    .collect()
            } else {
                repos
            };
            if repos.is_empty() {
                println!("No tracked repositories. Add one with `runwatch track owner/name`.");
                return Ok(());
            }

            let interval = config.poll_interval();
            let engine = Arc::new(Revalidator::new(
                store,
                client,
                EngineSettings::from_config(&config)?,
            ));
            watch(engine, session, repos, interval).await?;
        }
        Commands::Search { query, limit } => {
            let repos = client
                .search_repos(&session.credential, &query, limit)
                .await
                .unwrap_or_else(|err| {
                    tracing::warn!(error = %err, "repository search failed");
                    Vec::new()
                });
            for repo in repos {
                println!(
                    "{:<40} {}",
                    repo.coordinates().to_string(),
                    repo.description.as_deref().unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}

async fn watch(
    engine: Arc<Revalidator<FileCacheStore, GitHubClient>>,
    session: Session,
    repos: Vec<RepoCoordinates>,
    interval: std::time::Duration,
) -> Result<()> {
    let (handle, mut updates) = poller::spawn(engine, session, repos, interval);
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(update) => print_update(update),
                None => break,
            },
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(_)) => handle.refresh_all(),
                _ => stdin_open = false,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.shutdown();
    Ok(())
}

fn print_update(update: RunsUpdate) {
    match update.result {
        Ok(revalidation) => print_runs(&update.repo, &revalidation.runs),
        Err(err) => eprintln!("{}: {}", update.repo, err),
    }
}

fn print_runs(repo: &RepoCoordinates, runs: &[WorkflowRun]) {
    println!("{}", repo);
    if runs.is_empty() {
        println!("  No workflow runs found.");
        return;
    }
    for run in runs {
        let marker = match run.tone() {
            StatusTone::Success => '+',
            StatusTone::Failure => 'x',
            StatusTone::Pending => '~',
            StatusTone::Neutral => '-',
        };
        println!(
            "  {} {:<16} {:<30} [{}] {}  {}",
            marker,
            run.display_state(),
            run.name.as_deref().unwrap_or("(unnamed)"),
            run.head_branch.as_deref().unwrap_or("-"),
            run.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            run.html_url,
        );
    }
}
