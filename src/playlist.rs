//! Playlist items and the per-directory playlist builder.
//!
//! The rendered mosaic of a source lives next to it as `<source>.mosaic.mov`
//! or `<source>.mosaic.jpg`. The presence of that file is the only record
//! that a render happened, so a rescan re-derives every item's state from
//! the filesystem. Renders are written to a hidden `.partial-` sibling and
//! renamed into place once complete, so a rendition never exists half-written.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::RenderOptions;
use crate::error::Error;
use crate::media::{MediaClassifier, MediaRole};
use crate::render::{RenderJob, RenderQueues};

pub const VIDEO_CACHE_SUFFIX: &str = ".mosaic.mov";
pub const IMAGE_CACHE_SUFFIX: &str = ".mosaic.jpg";
/// Prefix of the in-progress file a render writes before it is renamed into place.
pub const SCRATCH_PREFIX: &str = ".partial-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Pending,
    Done,
}

/// One playable unit of a playlist generation.
#[derive(Debug)]
pub struct PlaylistItem {
    source_path: PathBuf,
    rendered_path: PathBuf,
    role: MediaRole,
    image_duration: Option<Duration>,
    render_jobs: Vec<RenderJob>,
    rendered: AtomicBool,
}

impl PlaylistItem {
    pub fn new(
        source_path: PathBuf,
        rendered_path: PathBuf,
        role: MediaRole,
        image_duration: Option<Duration>,
        render_jobs: Vec<RenderJob>,
        state: RenderState,
    ) -> Self {
        Self {
            source_path,
            rendered_path,
            role,
            image_duration: image_duration.filter(|_| role.is_image()),
            render_jobs,
            rendered: AtomicBool::new(state == RenderState::Done),
        }
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn rendered_path(&self) -> &Path {
        &self.rendered_path
    }

    /// Where the render jobs write before the result is renamed to [`Self::rendered_path`].
    pub fn scratch_path(&self) -> PathBuf {
        scratch_path_for(&self.rendered_path)
    }

    pub fn role(&self) -> MediaRole {
        self.role
    }

    pub fn is_image(&self) -> bool {
        self.role.is_image()
    }

    pub fn image_duration(&self) -> Option<Duration> {
        self.image_duration
    }

    pub fn render_jobs(&self) -> &[RenderJob] {
        &self.render_jobs
    }

    pub fn render_state(&self) -> RenderState {
        if self.rendered.load(Ordering::Acquire) {
            RenderState::Done
        } else {
            RenderState::Pending
        }
    }

    pub fn is_rendered(&self) -> bool {
        self.render_state() == RenderState::Done
    }

    /// The path the player should open: the rendition once it exists, the source until then.
    pub fn playable_path(&self) -> &Path {
        if self.is_rendered() {
            &self.rendered_path
        } else {
            &self.source_path
        }
    }

    /// Flip Pending -> Done. Returns `false` if the item was already done.
    pub fn mark_rendered(&self) -> bool {
        !self.rendered.swap(true, Ordering::AcqRel)
    }

    /// Forget a rendition that turned out to be unplayable.
    pub fn mark_pending(&self) {
        self.rendered.store(false, Ordering::Release);
    }
}

/// `<source><suffix>` for the roles that produce a rendition.
pub fn rendered_path_for(source: &Path, role: MediaRole) -> PathBuf {
    let suffix = if role.is_image() {
        IMAGE_CACHE_SUFFIX
    } else {
        VIDEO_CACHE_SUFFIX
    };
    let mut raw: OsString = source.as_os_str().to_os_string();
    raw.push(suffix);
    PathBuf::from(raw)
}

/// `.partial-<rendition name>` next to the rendition; keeps the extension the encoders key on.
pub fn scratch_path_for(rendered: &Path) -> PathBuf {
    let mut name = OsString::from(SCRATCH_PREFIX);
    name.push(rendered.file_name().unwrap_or_default());
    rendered.with_file_name(name)
}

/// If `name` is a cache artifact, the file name of the source it was rendered from.
pub fn cache_source_name(name: &str) -> Option<&str> {
    [VIDEO_CACHE_SUFFIX, IMAGE_CACHE_SUFFIX]
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
}

/// One entry of a directory listing.
#[derive(Debug, Clone)]
pub(crate) struct Listing {
    pub path: PathBuf,
    pub name: String,
    pub is_dir: bool,
}

/// Non-recursive listing sorted by file name.
pub(crate) fn list_dir(dir: &Path) -> Result<Vec<Listing>, Error> {
    let mut out = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| Error::List {
            path: dir.to_path_buf(),
            source,
        })?;
        out.push(Listing {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir: entry.file_type().is_dir(),
            path: entry.into_path(),
        });
    }
    Ok(out)
}

/// Turns one media directory into an ordered playlist, queueing missing renditions.
#[derive(Debug, Clone)]
pub struct PlaylistBuilder {
    queues: RenderQueues,
    classifier: MediaClassifier,
    render: RenderOptions,
}

impl PlaylistBuilder {
    pub fn new(queues: RenderQueues, classifier: MediaClassifier, render: RenderOptions) -> Self {
        Self {
            queues,
            classifier,
            render,
        }
    }

    /// Build the playlist of `dir`.
    ///
    /// Blocks while a render queue is full; call it from a blocking context.
    ///
    /// # Errors
    /// [`Error::List`] if the directory cannot be listed, [`Error::QueueClosed`]
    /// if a worker has gone away.
    pub fn build(&self, dir: &Path) -> Result<Vec<Arc<PlaylistItem>>, Error> {
        let mut media = Vec::new();
        for entry in list_dir(dir)? {
            if entry.name.starts_with('.') {
                debug!(path = %entry.path.display(), "ignoring hidden entry");
                continue;
            }
            if let Some(source_name) = cache_source_name(&entry.name) {
                let source = entry.path.with_file_name(source_name);
                if !source.exists() {
                    info!(
                        artifact = %entry.path.display(),
                        "queueing orphaned rendition for removal"
                    );
                    self.queues.discard_orphan_blocking(entry.path)?;
                }
                continue;
            }
            if entry.is_dir {
                debug!(path = %entry.path.display(), "ignoring nested directory in media folder");
                continue;
            }
            media.push(entry);
        }
        media.sort_by(|a, b| a.name.cmp(&b.name));

        let mut playlist = Vec::with_capacity(media.len());
        for entry in media {
            let class = self.classifier.classify(&entry.name);
            if class.role == MediaRole::Invalid {
                info!(path = %entry.path.display(), "skipping invalid file");
                continue;
            }

            let rendered = rendered_path_for(&entry.path, class.role);
            let scratch = scratch_path_for(&rendered);
            let jobs = RenderJob::plan(class.role, &entry.path, &scratch, &self.render);
            if jobs.is_empty() {
                playlist.push(Arc::new(PlaylistItem::new(
                    entry.path.clone(),
                    entry.path,
                    class.role,
                    class.display_duration,
                    jobs,
                    RenderState::Done,
                )));
                continue;
            }

            let state = if rendered.exists() {
                RenderState::Done
            } else {
                RenderState::Pending
            };
            let item = Arc::new(PlaylistItem::new(
                entry.path,
                rendered,
                class.role,
                class.display_duration,
                jobs,
                state,
            ));
            if state == RenderState::Pending {
                let queue = self.queues.submit_blocking(Arc::clone(&item))?;
                debug!(
                    path = %item.source_path().display(),
                    queue = queue.as_str(),
                    "queued render"
                );
            }
            playlist.push(item);
        }
        Ok(playlist)
    }
}
