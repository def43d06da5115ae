use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use cli::{Args, Commands};
use logging::setup_logging;
use progress::{spawn_event_handler, ProgressGuard};
use repodex_config::Config;
use repodex_core::{DefaultFetcher, RepoStorage};
use repodex_events::{ChannelSink, EventSinkHandle};
use tracing::debug;
use utils::{progress_enabled, set_flag, COLOR, PROGRESS};

mod cli;
mod logging;
mod progress;
mod query;
mod repos;
mod sync;
mod utils;

fn config_path(args: &Args) -> PathBuf {
    match &args.config {
        Some(path) => PathBuf::from(path),
        None => Config::default_path(),
    }
}

/// Opens the repository storage, with a progress renderer when enabled.
fn create_storage(config: Config) -> miette::Result<(RepoStorage, Option<ProgressGuard>)> {
    let storage = RepoStorage::open(config, Arc::new(DefaultFetcher::default()))?;

    if progress_enabled() {
        let (sink, receiver) = ChannelSink::new();
        let events: EventSinkHandle = Arc::new(sink);
        let guard = spawn_event_handler(receiver);
        Ok((storage.with_events(events), Some(guard)))
    } else {
        Ok((storage, None))
    }
}

fn handle_cli() -> miette::Result<()> {
    let args = Args::parse();
    setup_logging(&args);

    if args.no_color {
        set_flag(&COLOR, false);
    }
    if args.no_progress || args.json || args.quiet {
        set_flag(&PROGRESS, false);
    }

    let path = config_path(&args);
    let config = Config::load(&path)?;
    debug!(
        config = %path.display(),
        repositories = config.repositories.len(),
        "configuration loaded"
    );

    let (storage, progress_guard) = create_storage(config)?;
    let json = args.json;

    let result = match &args.command {
        Commands::Sync { force } => sync::sync_repositories(&storage, *force, json),
        Commands::Repos => repos::list_repositories(&storage, &path, json),
        command => {
            // queries read whatever the caches hold, refreshing expired manifests
            storage
                .sync_all(false)
                .map_err(miette::Report::from)
                .and_then(|_| {
                    match command {
                        Commands::List { patterns, all } => {
                            query::list_packages(&storage, patterns, *all, json)
                        }
                        Commands::Provides { name } => query::find_providers(&storage, name, json),
                        Commands::Requires { name } => query::find_requirers(&storage, name, json),
                        Commands::Info { package, changelog } => {
                            query::package_info(&storage, package, *changelog, json)
                        }
                        Commands::Sync { .. } | Commands::Repos => Ok(()),
                    }
                })
        }
    };

    // Close the storage first so the event channel hangs up and the
    // progress thread can drain.
    storage.close();
    if let Some(guard) = progress_guard {
        guard.finish();
    }
    progress::stop();

    result
}

fn main() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    if let Err(err) = handle_cli() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}
