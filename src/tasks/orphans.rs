use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::Result;
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::events::OrphanArtifact;

/// Deletes cached renditions whose source disappeared. Failures are logged, never retried.
#[instrument(skip_all)]
pub async fn run(mut rx: Receiver<OrphanArtifact>, cancel: CancellationToken) -> Result<()> {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("cancel received; exiting orphan cleanup");
                break;
            }
            maybe = rx.recv() => match maybe {
                Some(OrphanArtifact(path)) => {
                    remove_orphan(&path);
                }
                None => break,
            }
        }
    }
    Ok(())
}

/// Returns `true` if the file is gone afterwards.
pub fn remove_orphan(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "removed orphaned rendition");
            true
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "orphan vanished before removal");
            true
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to remove orphaned rendition");
            false
        }
    }
}
