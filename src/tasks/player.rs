//! The playback loop.
//!
//! Asks the store for the current playlist, plays it item by item and
//! re-selects whenever the selection's `valid_until` has passed. A video
//! whose rendition fails to play has that rendition deleted and is sent
//! back to the video queue; nothing else is retried.

use std::ffi::OsString;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::process::Command;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::clock::Clock;
use crate::config::PlayerOptions;
use crate::platform::display_switch::{DisplayMode, DisplaySwitch};
use crate::playlist::PlaylistItem;
use crate::render::RenderQueues;
use crate::store::{ScheduleStore, Selection, SelectionSource};

/// Blocking play-out of one artifact; returns when it has finished showing.
pub trait Player: Send + Sync + 'static {
    fn play_video(&self, path: &Path) -> impl Future<Output = Result<()>> + Send;
    fn show_image(
        &self,
        path: &Path,
        duration: Duration,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Runs the configured external players (mpv / feh by default).
#[derive(Debug, Clone)]
pub struct CommandPlayer {
    options: PlayerOptions,
}

impl CommandPlayer {
    pub fn new(options: PlayerOptions) -> Self {
        Self { options }
    }
}

/// Substitute `{path}` and `{seconds}` in an argv template.
pub fn expand_template(
    template: &[String],
    path: &Path,
    duration: Option<Duration>,
) -> Vec<OsString> {
    template
        .iter()
        .map(|arg| {
            if arg == "{path}" {
                return path.as_os_str().to_os_string();
            }
            let mut arg = arg.replace("{path}", &path.to_string_lossy());
            if let Some(duration) = duration {
                arg = arg.replace("{seconds}", &duration.as_secs().to_string());
            }
            OsString::from(arg)
        })
        .collect()
}

async fn run_argv(argv: Vec<OsString>) -> Result<()> {
    let Some((program, args)) = argv.split_first() else {
        bail!("empty player command");
    };
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .status()
        .await
        .with_context(|| format!("failed to spawn {}", program.to_string_lossy()))?;
    if !status.success() {
        bail!("{} exited with {}", program.to_string_lossy(), status);
    }
    Ok(())
}

impl Player for CommandPlayer {
    async fn play_video(&self, path: &Path) -> Result<()> {
        run_argv(expand_template(&self.options.video_command, path, None)).await
    }

    async fn show_image(&self, path: &Path, duration: Duration) -> Result<()> {
        if let Some(background) = &self.options.image_background_command {
            if let Err(err) = run_argv(expand_template(background, path, Some(duration))).await {
                warn!(path = %path.display(), error = %err, "failed to set background image");
            }
        }
        run_argv(expand_template(&self.options.image_command, path, Some(duration))).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    Played,
    /// Playback failed; nothing else happened.
    Failed,
    /// A rendered video failed; its rendition was dropped and re-queued.
    Requeued,
}

/// Where the next pass through a playlist starts.
#[derive(Debug, Default)]
struct PlaylistPosition {
    source: Option<SelectionSource>,
    files: Vec<PathBuf>,
    next: usize,
}

impl PlaylistPosition {
    /// Index to continue from; resets when the selection names a different playlist.
    fn resume(&mut self, selection: &Selection) -> usize {
        let same = self.source == Some(selection.source)
            && self.files.len() == selection.playlist.len()
            && self
                .files
                .iter()
                .zip(&selection.playlist)
                .all(|(file, item)| file.as_path() == item.source_path());
        if !same {
            self.source = Some(selection.source);
            self.files = selection
                .playlist
                .iter()
                .map(|item| item.source_path().to_path_buf())
                .collect();
            self.next = 0;
        }
        self.next
    }
}

pub struct Playback<P: Player, C: Clock> {
    store: Arc<ScheduleStore>,
    player: Arc<P>,
    clock: Arc<C>,
    queues: RenderQueues,
    display_switch: Option<DisplaySwitch>,
    idle_cap: Duration,
}

impl<P: Player, C: Clock> Playback<P, C> {
    pub fn new(
        store: Arc<ScheduleStore>,
        player: Arc<P>,
        clock: Arc<C>,
        queues: RenderQueues,
        display_switch: Option<DisplaySwitch>,
        idle_cap: Duration,
    ) -> Self {
        Self {
            store,
            player,
            clock,
            queues,
            display_switch,
            idle_cap,
        }
    }

    /// Play until cancelled.
    ///
    /// The standard playlist is re-selected every `standard-recheck`, usually
    /// in the middle of a pass. Playback resumes where it left off as long as
    /// the re-selected playlist is the same one (same source, same files), and
    /// starts over from the first item when it changed.
    #[instrument(skip_all)]
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let mut last_generation = None;
        let mut position = PlaylistPosition::default();
        while !cancel.is_cancelled() {
            let selection = self.store.select_current(self.clock.now());
            if last_generation != Some(selection.generation) {
                debug!(
                    generation = selection.generation,
                    source = ?selection.source,
                    items = selection.playlist.len(),
                    "playing from schedule generation"
                );
                last_generation = Some(selection.generation);
            }
            self.switch_displays(&selection).await;

            if selection.playlist.is_empty() {
                position = PlaylistPosition::default();
                let wait = self.idle_wait(&selection);
                debug!(wait_ms = wait.as_millis() as u64, "selected playlist is empty; idling");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = sleep(wait) => {}
                }
                continue;
            }

            let mut next = position.resume(&selection);
            let mut played = 0usize;
            while next < selection.playlist.len() {
                if cancel.is_cancelled() || self.clock.now() >= selection.valid_until {
                    break;
                }
                let item = &selection.playlist[next];
                next += 1;
                if self.play_item(item).await == PlayOutcome::Played {
                    played += 1;
                }
            }
            position.next = next % selection.playlist.len();

            if played == 0 {
                // nothing played this round; back off before the next pass
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = sleep(Duration::from_secs(1)) => {}
                }
            }
        }
        info!("cancel received; exiting playback loop");
        Ok(())
    }

    pub async fn play_item(&self, item: &Arc<PlaylistItem>) -> PlayOutcome {
        let path = item.playable_path().to_path_buf();
        if item.is_image() {
            let duration = item
                .image_duration()
                .unwrap_or(crate::media::DEFAULT_IMAGE_DURATION);
            return match self.player.show_image(&path, duration).await {
                Ok(()) => PlayOutcome::Played,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to show image");
                    PlayOutcome::Failed
                }
            };
        }

        let Err(err) = self.player.play_video(&path).await else {
            return PlayOutcome::Played;
        };
        warn!(path = %path.display(), error = %err, "failed to play video");
        if !item.is_rendered() || item.rendered_path() == item.source_path() {
            return PlayOutcome::Failed;
        }

        match fs::remove_file(item.rendered_path()) {
            Ok(()) => info!(path = %path.display(), "deleted unplayable rendition; re-rendering"),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to delete unplayable rendition")
            }
        }
        item.mark_pending();
        match self.queues.submit(Arc::clone(item)).await {
            Ok(_) => PlayOutcome::Requeued,
            Err(err) => {
                warn!(error = %err, "could not re-queue render");
                PlayOutcome::Failed
            }
        }
    }

    async fn switch_displays(&self, selection: &Selection) {
        let Some(switch) = self.display_switch.clone() else {
            return;
        };
        let mode = if selection.source.is_event() {
            DisplayMode::Event
        } else {
            DisplayMode::Standard
        };
        if let Err(err) = tokio::task::spawn_blocking(move || switch.apply(mode)).await {
            warn!(error = %err, "display switch task panicked");
        }
    }

    fn idle_wait(&self, selection: &Selection) -> Duration {
        (selection.valid_until - self.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO)
            .clamp(Duration::from_secs(1), self.idle_cap.max(Duration::from_secs(1)))
    }
}
