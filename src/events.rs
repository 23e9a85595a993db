use std::path::PathBuf;
use std::sync::Arc;

use crate::playlist::PlaylistItem;

/// Rescan/Player -> render worker: render this item unless it already is.
#[derive(Debug, Clone)]
pub struct RenderRequest(pub Arc<PlaylistItem>);

/// Playlist builder -> orphan worker: a cached rendition whose source is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanArtifact(pub PathBuf);
