// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use curator::{
    host::{ManifestHost, WorkspaceHost},
    path::{self, NormalizedPath},
    vcs::LocatorChain,
    workspace::{selection, Outcome, Reconciler},
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::{
    path::{Path, PathBuf},
    process::exit,
    time::Duration,
};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

type Session = Reconciler<ManifestHost, LocatorChain>;

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "curator [options] <curator-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to workspace manifest.
    #[arg(short, long, global = true, value_name = "path", default_value = "workspace.toml")]
    pub manifest: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    async fn run(self) -> Result<()> {
        let mut session = open_session(&self.manifest)?;
        match self.command {
            Command::Refresh(opts) => run_refresh(&mut session, opts).await,
            Command::Open(opts) => run_open(&mut session, opts).await,
            Command::Close(opts) => run_close(&mut session, opts).await,
            Command::Status => run_status(&session),
            Command::Watch(opts) => run_watch(&mut session, opts).await,
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Reconcile workspace folders against include and exclude patterns.
    #[command(override_usage = "curator refresh [options]")]
    Refresh(RefreshOptions),

    /// Open closed folders by removing their exclude entries.
    #[command(override_usage = "curator open [options] <folder>...")]
    Open(SelectionOptions),

    /// Close folders by adding exclude entries for them.
    #[command(override_usage = "curator close [options] <folder>...")]
    Close(SelectionOptions),

    /// Show open and closed workspace folders.
    #[command(override_usage = "curator status [options]")]
    Status,

    /// Keep workspace reconciled while manifest changes.
    #[command(override_usage = "curator watch [options]")]
    Watch(WatchOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RefreshOptions {
    /// Treat this as the first pass, and fail if the update is rejected.
    #[arg(short, long)]
    pub initial: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SelectionOptions {
    /// Display name or path of folders to select.
    #[arg(required = true, value_name = "folder")]
    pub folders: Vec<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct WatchOptions {
    /// Seconds between periodic refreshes.
    #[arg(
        short,
        long,
        value_name = "secs",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub interval: u64,
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run().await {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

async fn run() -> Result<()> {
    Cli::parse().run().await
}

fn open_session(manifest: impl AsRef<Path>) -> Result<Session> {
    let host = ManifestHost::open(manifest)?;
    let locator = LocatorChain::from_settings(&host.settings()?.vcs);
    Ok(Reconciler::new(host, locator))
}

async fn run_refresh(session: &mut Session, opts: RefreshOptions) -> Result<()> {
    let bar = spinner("reconciling workspace folders")?;
    let outcome = if opts.initial {
        match session.activate().await {
            Ok(outcome) => session.settle().await.map(|_| outcome),
            Err(error) => Err(error),
        }
    } else {
        session.refresh().await
    };
    bar.finish_and_clear();

    match outcome? {
        Outcome::Unchanged => info!("workspace is up to date"),
        Outcome::Applied { added, removed } => info!("added {added} and removed {removed} folders"),
        Outcome::ReloadRequested => warn!("workspace was reloaded"),
    }

    Ok(())
}

async fn run_open(session: &mut Session, opts: SelectionOptions) -> Result<()> {
    let selection = resolve_selection(session, &opts.folders)?;
    let root = session.placeholder_root().to_path_buf();
    if !selection::open_folders(session.host_mut(), &root, &selection)? {
        info!("nothing to open");
        return Ok(());
    }
    settle_with_spinner(session).await
}

async fn run_close(session: &mut Session, opts: SelectionOptions) -> Result<()> {
    let selection = resolve_selection(session, &opts.folders)?;
    if !selection::close_folders(session.host_mut(), &selection)? {
        info!("nothing to close");
        return Ok(());
    }
    settle_with_spinner(session).await
}

fn run_status(session: &Session) -> Result<()> {
    let folders = session.host().folders();
    if folders.is_empty() {
        info!("no folders are open");
    }

    for folder in folders {
        let state = if folder.is_placeholder() { "closed" } else { "open" };
        println!("{state:<6} {:<32} {}", folder.name, folder.path);
    }

    Ok(())
}

async fn run_watch(session: &mut Session, opts: WatchOptions) -> Result<()> {
    session.activate().await?;
    session.settle().await?;

    let manifest = session.host().path().to_path_buf();
    let dir = manifest.parent().unwrap_or(Path::new("/")).to_path_buf();
    let dir = dir.canonicalize().unwrap_or(dir);
    let (sender, mut receiver) = mpsc::unbounded_channel();
    let mut watcher = RecommendedWatcher::new(
        move |event: notify::Result<notify::Event>| {
            // Receiver only goes away on shutdown.
            let _ = sender.send(event);
        },
        notify::Config::default(),
    )?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    info!("watching {:?}", manifest.display());

    let mut focus = tokio::time::interval(Duration::from_secs(opts.interval));
    focus.tick().await;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("stop watching");
                break;
            }
            _ = focus.tick() => {
                if let Err(error) = session.refresh().await {
                    error!("{error:?}");
                }
            }
            Some(event) = receiver.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(error) => {
                        warn!("watch error: {error}");
                        continue;
                    }
                };
                if !event.paths.iter().any(|path| session.host().is_manifest(path)) {
                    continue;
                }

                // Coalesce bursts of writes into one pass.
                while receiver.try_recv().is_ok() {}
                if let Err(error) = session.settle().await {
                    error!("{error:?}");
                }
            }
        }
    }

    Ok(())
}

async fn settle_with_spinner(session: &mut Session) -> Result<()> {
    let bar = spinner("reconciling workspace folders")?;
    let result = session.settle().await;
    bar.finish_and_clear();
    info!("handled {} workspace events", result?);

    Ok(())
}

fn resolve_selection(session: &Session, targets: &[String]) -> Result<Vec<NormalizedPath>> {
    let folders = session.host().folders();
    targets
        .iter()
        .map(|target| -> Result<NormalizedPath> {
            match folders.iter().find(|folder| &folder.name == target) {
                Some(folder) => Ok(folder.path.clone()),
                None => Ok(NormalizedPath::from_path(path::absolute(target)?)),
            }
        })
        .collect()
}

fn spinner(message: &'static str) -> Result<ProgressBar> {
    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));

    Ok(bar)
}
