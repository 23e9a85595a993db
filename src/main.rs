//! Binary entrypoint for the signage player.
//!
//! Delegates all logic to the library crate; this file only wires the tasks together.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::NaiveDateTime;
use clap::{ArgAction, Parser};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use mosaic_signage::clock::{Clock, ManualClock, SystemClock};
use mosaic_signage::config::Configuration;
use mosaic_signage::media::MediaClassifier;
use mosaic_signage::platform::display_switch::DisplaySwitch;
use mosaic_signage::playlist::{PlaylistBuilder, RenderState};
use mosaic_signage::render::{CommandRenderer, QueueKind, RenderQueues, RenderReceivers};
use mosaic_signage::schedule::ScheduleParser;
use mosaic_signage::store::ScheduleStore;
use mosaic_signage::tasks;
use mosaic_signage::tasks::player::{CommandPlayer, Playback};
use mosaic_signage::tasks::rescan::{RescanReport, Rescanner};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(
    name = "mosaic-signage",
    version,
    about = "Scheduled mosaic signage player"
)]
struct Args {
    /// Path to YAML config
    #[arg(value_name = "CONFIG")]
    config: PathBuf,
    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
    /// Scan once and print the schedule and current selection without rendering or playing
    #[arg(long = "dry-run")]
    dry_run: bool,
    /// Evaluate the dry-run selection at this local time instead of now
    #[arg(long = "now", value_name = "YYYY-MM-DDTHH:MM", requires = "dry_run")]
    now: Option<String>,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive(format!("mosaic_signage={level}").parse()?);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let Args {
        config,
        verbose,
        dry_run,
        now,
    } = Args::parse();
    init_tracing(verbose)?;

    let cfg = Configuration::from_yaml_file(&config)
        .with_context(|| format!("failed to load configuration from {}", config.display()))?
        .validated()
        .context("invalid configuration values")?;
    tracing::debug!("Loaded configuration from {}:\n{:#?}", config.display(), cfg);

    if dry_run {
        let now = match now {
            Some(raw) => NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M")
                .with_context(|| format!("failed to parse --now {raw:?}"))?,
            None => SystemClock::new(cfg.timezone).now(),
        };
        return run_dry_run(&cfg, now).await;
    }

    cfg.check_prerequisites()
        .context("missing external prerequisites")?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    let (
        queues,
        RenderReceivers {
            video: video_rx,
            image: image_rx,
            orphans: orphan_rx,
        },
    ) = RenderQueues::channel(&cfg.queues);
    let store = Arc::new(ScheduleStore::new(cfg.standard_recheck));
    let clock = Arc::new(SystemClock::new(cfg.timezone));
    let renderer = Arc::new(CommandRenderer::new(cfg.tools.clone()));
    let display_switch = cfg
        .display_switch
        .clone()
        .map(DisplaySwitch::new)
        .transpose()
        .context("invalid display-switch configuration")?;

    let mut workers = JoinSet::new();

    // Render workers: exactly one consumer per queue
    workers.spawn({
        let renderer = Arc::clone(&renderer);
        let cancel = cancel.clone();
        async move {
            tasks::render::run(QueueKind::Video, video_rx, renderer, cancel)
                .await
                .context("video render task failed")
        }
    });
    workers.spawn({
        let renderer = Arc::clone(&renderer);
        let cancel = cancel.clone();
        async move {
            tasks::render::run(QueueKind::Image, image_rx, renderer, cancel)
                .await
                .context("image render task failed")
        }
    });
    workers.spawn({
        let cancel = cancel.clone();
        async move {
            tasks::orphans::run(orphan_rx, cancel)
                .await
                .context("orphan cleanup task failed")
        }
    });

    let builder = PlaylistBuilder::new(
        queues.clone(),
        MediaClassifier::new(cfg.default_image_duration),
        cfg.render.clone(),
    );
    let rescanner = Rescanner::new(
        cfg.media_root.clone(),
        ScheduleParser::new(builder),
        Arc::clone(&store),
        Arc::clone(&clock),
        cfg.sync_command.clone(),
    );

    // The first schedule is in place before playback starts.
    match rescanner.rescan_once().await? {
        RescanReport::Installed { generation } => {
            tracing::info!(generation, "initial schedule loaded")
        }
        other => tracing::warn!(report = ?other, "initial scan did not produce a schedule"),
    }

    workers.spawn({
        let cancel = cancel.clone();
        let interval = cfg.rescan_interval;
        let jitter = cfg.rescan_jitter;
        async move {
            tasks::rescan::run(rescanner, interval, jitter, cancel)
                .await
                .context("rescan task failed")
        }
    });

    workers.spawn({
        let playback = Playback::new(
            Arc::clone(&store),
            Arc::new(CommandPlayer::new(cfg.player.clone())),
            Arc::clone(&clock),
            queues.clone(),
            display_switch,
            cfg.standard_recheck,
        );
        let cancel = cancel.clone();
        async move { playback.run(cancel).await.context("playback task failed") }
    });

    cancel.cancelled().await;

    let drain = async {
        while let Some(res) = workers.join_next().await {
            match res {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!("task error: {e:?}"),
                Err(e) if e.is_cancelled() => {}
                Err(e) => tracing::error!("join error: {e}"),
            }
        }
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        tracing::warn!("tasks still busy after shutdown grace period; aborting");
        workers.abort_all();
    }

    Ok(())
}

async fn run_dry_run(cfg: &Configuration, now: NaiveDateTime) -> Result<()> {
    let (
        queues,
        RenderReceivers {
            mut video,
            mut image,
            mut orphans,
        },
    ) = RenderQueues::channel(&cfg.queues);
    // Nothing renders in a dry run; keep the queues flowing so the scan never blocks.
    tokio::spawn(async move { while video.recv().await.is_some() {} });
    tokio::spawn(async move { while image.recv().await.is_some() {} });
    tokio::spawn(async move { while orphans.recv().await.is_some() {} });

    let parser = ScheduleParser::new(PlaylistBuilder::new(
        queues,
        MediaClassifier::new(cfg.default_image_duration),
        cfg.render.clone(),
    ));
    let store = Arc::new(ScheduleStore::new(cfg.standard_recheck));
    let rescanner = Rescanner::new(
        cfg.media_root.clone(),
        parser,
        Arc::clone(&store),
        Arc::new(ManualClock::new(now)),
        None,
    );
    match rescanner.rescan_once().await? {
        RescanReport::Installed { .. } => {}
        RescanReport::SyncInProgress => {
            println!("(sync in progress; {} is locked)", cfg.media_root.display());
            return Ok(());
        }
        RescanReport::Failed => bail!("scan of {} failed", cfg.media_root.display()),
    }
    let snapshot = store.snapshot();

    println!(
        "# schedule dry run\n# root: {}\n# now: {}\n",
        cfg.media_root.display(),
        now.format("%Y-%m-%d %H:%M")
    );
    println!("# once events: {}", snapshot.once_events.len());
    for event in &snapshot.once_events {
        println!(
            "  {} .. {}  ({} items)",
            event.start.format("%Y-%m-%d %H:%M"),
            event.end.format("%Y-%m-%d %H:%M"),
            event.playlist.len()
        );
    }
    println!("# weekly events: {}", snapshot.weekly_events.len());
    for event in &snapshot.weekly_events {
        println!(
            "  weekday {} {:02}-{:02}  ({} items)",
            event.weekday,
            event.start_hour,
            event.end_hour,
            event.playlist.len()
        );
    }
    println!("# standard: {} items", snapshot.standard.len());

    let selection = store.select_current(now);
    println!(
        "\n# selection: {:?}\n# valid until: {}",
        selection.source,
        selection.valid_until.format("%Y-%m-%d %H:%M:%S")
    );
    if selection.playlist.is_empty() {
        println!("(playlist empty)");
    }
    for (idx, item) in selection.playlist.iter().enumerate() {
        let state = match item.render_state() {
            RenderState::Done => "rendered",
            RenderState::Pending => "pending",
        };
        println!(
            "  {:>3}: [{:<14}] [{state:<8}] {}",
            idx + 1,
            item.role().as_str(),
            item.source_path().display()
        );
    }
    Ok(())
}
