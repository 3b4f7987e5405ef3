use std::cmp::Reverse;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use release_channel::config::{
    UpdaterConfig, config_path, data_dir, db_path, download_dir, log_path,
};
use release_channel::install::{GitHubInstaller, InstallFlow};
use release_channel::logging::init_logging;
use release_channel::version::cache::Cache;
use release_channel::version::checker::{CheckOutcome, CheckTrigger, UpdateChecker};
use release_channel::version::registries::GitHubReleases;
use release_channel::version::semver::{ReleaseVersion, compare_versions};
use release_channel::version::types::{Channel, UpdateDecision, UpdateState};

const APP_NAME: &str = "release-channel";

#[derive(Parser)]
#[command(name = "release-channel")]
#[command(version, about = "Update channel resolution and self-update")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compare two versions
    Compare { a: String, b: String },
    /// Print versions newest first
    Sort { versions: Vec<String> },
    /// Check the selected channel for an update
    Check {
        /// Ignore the minimum interval since the last check
        #[arg(long)]
        force: bool,
        /// Version to check from (defaults to this build)
        #[arg(long)]
        current: Option<String>,
    },
    /// Show or change the update channel
    Channel { channel: Option<Channel> },
    /// Download and install the update offered on the selected channel
    Install {
        #[arg(long)]
        current: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Compare { a, b } => {
            let word = match compare_versions(&a, &b) {
                std::cmp::Ordering::Greater => "greater",
                std::cmp::Ordering::Less => "less",
                std::cmp::Ordering::Equal => "equal",
            };
            println!("{word}");
            Ok(())
        }
        Command::Sort { mut versions } => {
            versions.sort_by_cached_key(|version| Reverse(ReleaseVersion::parse(version)));
            for version in versions {
                println!("{version}");
            }
            Ok(())
        }
        command => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?
            .block_on(run(command)),
    }
}

async fn run(command: Command) -> anyhow::Result<()> {
    let data_dir = data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;
    let _guard = init_logging(&log_path())?;

    let config = UpdaterConfig::load(&config_path());
    let cache = Arc::new(Cache::new(&db_path())?);

    let checker = |current: Option<String>| -> anyhow::Result<UpdateChecker<Cache>> {
        let source = GitHubReleases::new(&config.api_base_url, &config.repository)?;
        Ok(UpdateChecker::new(
            cache.clone(),
            Arc::new(source),
            current.as_deref().unwrap_or(env!("CARGO_PKG_VERSION")),
            config.check_interval,
        ))
    };

    match command {
        Command::Channel { channel: None } => {
            println!("{}", checker(None)?.channel()?);
        }
        Command::Channel {
            channel: Some(channel),
        } => {
            checker(None)?.switch_channel(channel)?;
            println!("{channel}");
        }
        Command::Check { force, current } => {
            let checker = checker(current)?;
            if let Some(cached) = checker.cached_update()? {
                println!("cached: {}", describe(&cached));
            }

            let trigger = if force {
                CheckTrigger::Manual
            } else {
                CheckTrigger::Automatic
            };
            match checker.check(trigger).await? {
                CheckOutcome::Throttled => println!("skipped: checked recently"),
                CheckOutcome::AlreadyRunning => println!("skipped: check in progress"),
                CheckOutcome::Decided(decision) => {
                    println!("{}: {}", checker.current_version(), describe(&decision));
                    if UpdateState::from_decision(&decision) == UpdateState::DowngradeAvailable {
                        println!(
                            "the {} channel is behind the running prerelease",
                            checker.channel()?
                        );
                    }
                }
            }
        }
        Command::Install { current } => {
            let checker = checker(current)?;
            let (tx, rx) = mpsc::channel(16);
            let printer = tokio::spawn(print_states(rx));

            let result = install(&checker, &config, tx).await;
            printer.await?;
            result?;
        }
        Command::Compare { .. } | Command::Sort { .. } => {}
    }

    Ok(())
}

/// Check the selected channel and move to the release it offers
async fn install(
    checker: &UpdateChecker<Cache>,
    config: &UpdaterConfig,
    states: mpsc::Sender<UpdateState>,
) -> anyhow::Result<()> {
    let _ = states.send(UpdateState::Checking).await;
    let decision = match checker.check(CheckTrigger::Manual).await {
        Ok(CheckOutcome::Decided(decision)) => decision,
        Ok(_) => {
            let _ = states.send(UpdateState::Idle).await;
            anyhow::bail!("Update check did not run");
        }
        Err(e) => {
            let _ = states.send(UpdateState::Idle).await;
            return Err(e.into());
        }
    };
    let _ = states.send(UpdateState::from_decision(&decision)).await;

    let Some(target) = decision.target() else {
        return Ok(());
    };

    let installer = GitHubInstaller::new(
        &config.web_base_url,
        &config.repository,
        APP_NAME,
        &download_dir(),
    )?;
    InstallFlow::new(installer).run(target, states).await?;
    Ok(())
}

async fn print_states(mut states: mpsc::Receiver<UpdateState>) {
    while let Some(state) = states.recv().await {
        match state {
            UpdateState::Idle => println!("update cancelled"),
            UpdateState::Checking => println!("checking"),
            UpdateState::UpToDate => println!("up to date"),
            UpdateState::UpdateAvailable => println!("update available"),
            UpdateState::DowngradeAvailable => println!("downgrade available"),
            UpdateState::Downloading {
                percent: Some(percent),
            } => println!("downloading: {percent}%"),
            UpdateState::Downloading { percent: None } => println!("downloading"),
            UpdateState::Ready => println!("ready"),
            UpdateState::Installing => println!("installing"),
        }
    }
}

fn describe(decision: &UpdateDecision) -> String {
    match decision {
        UpdateDecision::NoUpdate => "up to date".to_string(),
        UpdateDecision::Upgrade(release) => format!("upgrade available: {}", release.tag),
        UpdateDecision::Downgrade(release) => format!("downgrade available: {}", release.tag),
    }
}
