use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::clock::Clock;
use crate::platform::shell::{default_runner, execute};
use crate::schedule::{ScanOutcome, ScheduleParser};
use crate::store::ScheduleStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescanReport {
    Installed { generation: u64 },
    /// The sync sentinel was present; the previous schedule stays.
    SyncInProgress,
    /// Listing failed; the previous schedule stays.
    Failed,
}

/// One rescan tick: optional sync command, tree scan, atomic install.
pub struct Rescanner<C: Clock> {
    root: PathBuf,
    parser: ScheduleParser,
    store: Arc<ScheduleStore>,
    clock: Arc<C>,
    sync_command: Option<String>,
}

impl<C: Clock> Rescanner<C> {
    pub fn new(
        root: PathBuf,
        parser: ScheduleParser,
        store: Arc<ScheduleStore>,
        clock: Arc<C>,
        sync_command: Option<String>,
    ) -> Self {
        Self {
            root,
            parser,
            store,
            clock,
            sync_command,
        }
    }

    pub async fn rescan_once(&self) -> Result<RescanReport> {
        if let Some(command) = self.sync_command.clone() {
            let execution =
                tokio::task::spawn_blocking(move || execute(&default_runner(), &command))
                    .await
                    .context("sync command task panicked")?;
            if execution.success {
                debug!(command = execution.command, "sync command finished");
            } else {
                warn!(
                    command = execution.command,
                    exit_code = ?execution.exit_code,
                    stderr = execution.stderr,
                    "sync command failed; scanning local tree"
                );
            }
        }

        let parser = self.parser.clone();
        let root = self.root.clone();
        let now = self.clock.now();
        let outcome = tokio::task::spawn_blocking(move || parser.scan(&root, now))
            .await
            .context("scan task panicked")?;

        Ok(match outcome {
            Ok(ScanOutcome::Snapshot(snapshot)) => RescanReport::Installed {
                generation: self.store.install(snapshot),
            },
            Ok(ScanOutcome::SyncInProgress) => RescanReport::SyncInProgress,
            Err(err) => {
                warn!(error = %err, "rescan failed; keeping previous schedule");
                RescanReport::Failed
            }
        })
    }
}

/// Rescan every `interval` plus up to `jitter` until cancelled.
#[instrument(skip_all, fields(root = %rescanner.root.display()))]
pub async fn run<C: Clock>(
    rescanner: Rescanner<C>,
    interval: Duration,
    jitter: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    info!(
        interval = %humantime::format_duration(interval),
        jitter = %humantime::format_duration(jitter),
        "periodic rescan started"
    );
    loop {
        let pause = interval + random_jitter(jitter);
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("cancel received; exiting rescan task");
                break;
            }
            _ = sleep(pause) => {}
        }
        match rescanner.rescan_once().await {
            Ok(report) => debug!(?report, "rescan tick complete"),
            Err(err) => warn!(error = %err, "rescan tick aborted"),
        }
    }
    Ok(())
}

fn random_jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis().min(u128::from(u64::MAX)) as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=max_ms))
}
