use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::events::RenderRequest;
use crate::playlist::PlaylistItem;
use crate::render::{JobRunner, QueueKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// The item was done, or its rendition was already on disk; nothing ran.
    AlreadyRendered,
    Rendered,
    /// A job failed; the item stays pending for this generation.
    Failed,
}

/// Single consumer of one render queue. Items are processed in arrival order;
/// a started job always runs to completion, cancellation is only observed between items.
#[instrument(skip(rx, runner, cancel), fields(queue = queue.as_str()))]
pub async fn run<R: JobRunner>(
    queue: QueueKind,
    mut rx: Receiver<RenderRequest>,
    runner: Arc<R>,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("cancel received; exiting render worker");
                break;
            }
            maybe = rx.recv() => match maybe {
                Some(RenderRequest(item)) => {
                    process(queue, &item, runner.as_ref()).await;
                }
                None => {
                    debug!("render queue closed");
                    break;
                }
            }
        }
    }
    Ok(())
}

/// Run every job of `item` in order, then move the result into place and flip it to done.
///
/// An item whose rendition already exists on disk is done without running
/// anything; rescans queue a fresh item for the same source every tick
/// until its render lands.
pub async fn process<R: JobRunner>(
    queue: QueueKind,
    item: &PlaylistItem,
    runner: &R,
) -> RenderOutcome {
    if item.is_rendered() {
        debug!(path = %item.source_path().display(), "already rendered; skipping");
        return RenderOutcome::AlreadyRendered;
    }
    if item.rendered_path().exists() {
        item.mark_rendered();
        debug!(path = %item.rendered_path().display(), "rendition already on disk; skipping");
        return RenderOutcome::AlreadyRendered;
    }
    if item.render_jobs().is_empty() {
        item.mark_rendered();
        return RenderOutcome::Rendered;
    }

    let scratch = item.scratch_path();
    for (step, job) in item.render_jobs().iter().enumerate() {
        if let Err(err) = runner.run(job).await {
            warn!(
                queue = queue.as_str(),
                path = %item.source_path().display(),
                step,
                error = %err,
                "render failed; playing source until next rescan"
            );
            remove_scratch(&scratch);
            return RenderOutcome::Failed;
        }
    }

    if let Err(err) = fs::rename(&scratch, item.rendered_path()) {
        warn!(
            queue = queue.as_str(),
            path = %scratch.display(),
            error = %err,
            "failed to move finished render into place"
        );
        remove_scratch(&scratch);
        return RenderOutcome::Failed;
    }

    if item.mark_rendered() {
        info!(
            queue = queue.as_str(),
            path = %item.rendered_path().display(),
            "render finished"
        );
    }
    RenderOutcome::Rendered
}

fn remove_scratch(scratch: &Path) {
    match fs::remove_file(scratch) {
        Ok(()) => debug!(path = %scratch.display(), "removed partial rendition"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            warn!(path = %scratch.display(), error = %e, "failed to remove partial rendition")
        }
    }
}
