//! Render jobs and the queues feeding the render workers.
//!
//! A [`RenderJob`] is one opaque transform step (an ffmpeg or ImageMagick
//! invocation). Each playlist item carries the ordered jobs that turn its
//! source file into the cached mosaic rendition.

use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::process::Command;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tracing::debug;

use crate::config::{QueueOptions, RenderOptions, ToolPaths};
use crate::error::Error;
use crate::events::{OrphanArtifact, RenderRequest};
use crate::media::MediaRole;
use crate::playlist::PlaylistItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    fn geometry(self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    fn scale_pad_filter(self) -> String {
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:-1:-1:color=black",
            w = self.width,
            h = self.height
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderJob {
    /// Fit each frame to one screen and repeat it across `tiles` screens.
    VideoMosaic {
        input: PathBuf,
        output: PathBuf,
        screen: Canvas,
        tiles: u32,
        frame_rate: u32,
        quality: u32,
    },
    /// Fit the whole video onto the banner canvas spanning all screens.
    VideoBanner {
        input: PathBuf,
        output: PathBuf,
        canvas: Canvas,
        frame_rate: u32,
        quality: u32,
    },
    /// Scale an image onto a black canvas, centred.
    ImageFit {
        input: PathBuf,
        output: PathBuf,
        canvas: Canvas,
    },
    /// Repeat an image `tiles` times side by side.
    ImageTile {
        input: PathBuf,
        output: PathBuf,
        tiles: u32,
    },
}

/// A fully resolved external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl CommandLine {
    fn new(program: &Path) -> Self {
        Self {
            program: program.to_path_buf(),
            args: Vec::new(),
        }
    }

    fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn display(&self) -> String {
        let mut out = self.program.display().to_string();
        for arg in &self.args {
            out.push(' ');
            out.push_str(&arg.to_string_lossy());
        }
        out
    }
}

impl RenderJob {
    /// The ordered jobs producing `output` from `source` for the given role.
    ///
    /// Every job writes into `output`; later jobs read it back. Returns an
    /// empty list when the source is played as-is.
    pub fn plan(
        role: MediaRole,
        source: &Path,
        output: &Path,
        opts: &RenderOptions,
    ) -> Vec<Self> {
        let screen = Canvas {
            width: opts.screen_width,
            height: opts.screen_height,
        };
        let banner = Canvas {
            width: opts.banner_width(),
            height: opts.screen_height,
        };
        match role {
            MediaRole::Video => vec![Self::VideoMosaic {
                input: source.to_path_buf(),
                output: output.to_path_buf(),
                screen,
                tiles: opts.screens,
                frame_rate: opts.frame_rate,
                quality: opts.quality,
            }],
            MediaRole::BannerVideo if opts.banner_video_passthrough => Vec::new(),
            MediaRole::BannerVideo => vec![Self::VideoBanner {
                input: source.to_path_buf(),
                output: output.to_path_buf(),
                canvas: banner,
                frame_rate: opts.frame_rate,
                quality: opts.quality,
            }],
            MediaRole::Picture => vec![
                Self::ImageFit {
                    input: source.to_path_buf(),
                    output: output.to_path_buf(),
                    canvas: screen,
                },
                Self::ImageTile {
                    input: output.to_path_buf(),
                    output: output.to_path_buf(),
                    tiles: opts.screens,
                },
            ],
            MediaRole::BannerPicture => vec![Self::ImageFit {
                input: source.to_path_buf(),
                output: output.to_path_buf(),
                canvas: banner,
            }],
            MediaRole::Invalid => Vec::new(),
        }
    }

    pub fn output(&self) -> &Path {
        match self {
            Self::VideoMosaic { output, .. }
            | Self::VideoBanner { output, .. }
            | Self::ImageFit { output, .. }
            | Self::ImageTile { output, .. } => output,
        }
    }

    pub fn command(&self, tools: &ToolPaths) -> CommandLine {
        match self {
            Self::VideoMosaic {
                input,
                output,
                screen,
                tiles,
                frame_rate,
                quality,
            } => {
                let graph = mosaic_filter_graph(*screen, *tiles);
                CommandLine::new(&tools.ffmpeg)
                    .arg("-y")
                    .arg("-i")
                    .arg(input.as_os_str())
                    .arg("-filter_complex")
                    .arg(graph)
                    .arg("-map")
                    .arg("[out]")
                    .arg("-c:v")
                    .arg("mjpeg")
                    .arg("-q:v")
                    .arg(quality.to_string())
                    .arg("-r")
                    .arg(frame_rate.to_string())
                    .arg(output.as_os_str())
            }
            Self::VideoBanner {
                input,
                output,
                canvas,
                frame_rate,
                quality,
            } => CommandLine::new(&tools.ffmpeg)
                .arg("-y")
                .arg("-i")
                .arg(input.as_os_str())
                .arg("-c:v")
                .arg("mjpeg")
                .arg("-q:v")
                .arg(quality.to_string())
                .arg("-r")
                .arg(frame_rate.to_string())
                .arg("-vf")
                .arg(canvas.scale_pad_filter())
                .arg(output.as_os_str()),
            Self::ImageFit {
                input,
                output,
                canvas,
            } => CommandLine::new(&tools.convert)
                .arg(input.as_os_str())
                .arg("-scale")
                .arg(canvas.geometry())
                .arg("-background")
                .arg("black")
                .arg("-gravity")
                .arg("center")
                .arg("-extent")
                .arg(canvas.geometry())
                .arg(output.as_os_str()),
            Self::ImageTile {
                input,
                output,
                tiles,
            } => {
                let mut cmd = CommandLine::new(&tools.convert);
                for _ in 0..(*tiles).max(1) {
                    cmd = cmd.arg(input.as_os_str());
                }
                cmd.arg("+append").arg(output.as_os_str())
            }
        }
    }
}

fn mosaic_filter_graph(screen: Canvas, tiles: u32) -> String {
    let fitted = format!("[0:v]setpts=PTS-STARTPTS,{}", screen.scale_pad_filter());
    if tiles <= 1 {
        return format!("{fitted}[out]");
    }
    let labels: String = (0..tiles).map(|i| format!("[a{i}]")).collect();
    format!("{fitted},split={tiles}{labels};{labels}hstack=inputs={tiles}[out]")
}

/// Executes a single render job.
pub trait JobRunner: Send + Sync + 'static {
    fn run(&self, job: &RenderJob) -> impl Future<Output = Result<()>> + Send;
}

/// Runs render jobs as ffmpeg / ImageMagick child processes.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    tools: ToolPaths,
}

impl CommandRenderer {
    pub fn new(tools: ToolPaths) -> Self {
        Self { tools }
    }
}

impl JobRunner for CommandRenderer {
    async fn run(&self, job: &RenderJob) -> Result<()> {
        let cmd = job.command(&self.tools);
        debug!(command = cmd.display(), "running render job");
        let output = Command::new(&cmd.program)
            .args(&cmd.args)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("failed to spawn {}", cmd.program.display()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last = stderr.lines().last().unwrap_or("").trim().to_string();
            bail!(
                "{} exited with {}: {}",
                cmd.program.display(),
                output
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                last
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    Video,
    Image,
}

impl QueueKind {
    pub fn for_role(role: MediaRole) -> Option<Self> {
        if role.is_video() {
            Some(Self::Video)
        } else if role.is_image() {
            Some(Self::Image)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Image => "image",
        }
    }
}

/// Producer side of the video, image and orphan queues.
#[derive(Debug, Clone)]
pub struct RenderQueues {
    video: Sender<RenderRequest>,
    image: Sender<RenderRequest>,
    orphans: Sender<OrphanArtifact>,
}

/// Consumer side, one receiver per worker.
#[derive(Debug)]
pub struct RenderReceivers {
    pub video: Receiver<RenderRequest>,
    pub image: Receiver<RenderRequest>,
    pub orphans: Receiver<OrphanArtifact>,
}

impl RenderQueues {
    pub fn channel(capacity: &QueueOptions) -> (Self, RenderReceivers) {
        let (video_tx, video_rx) = mpsc::channel(capacity.video_capacity);
        let (image_tx, image_rx) = mpsc::channel(capacity.image_capacity);
        let (orphan_tx, orphan_rx) = mpsc::channel(capacity.orphan_capacity);
        (
            Self {
                video: video_tx,
                image: image_tx,
                orphans: orphan_tx,
            },
            RenderReceivers {
                video: video_rx,
                image: image_rx,
                orphans: orphan_rx,
            },
        )
    }

    fn sender(&self, kind: QueueKind) -> &Sender<RenderRequest> {
        match kind {
            QueueKind::Video => &self.video,
            QueueKind::Image => &self.image,
        }
    }

    fn route(item: &PlaylistItem) -> Result<QueueKind, Error> {
        QueueKind::for_role(item.role()).ok_or_else(|| {
            Error::malformed(&item.source_path().display().to_string(), "a media role")
        })
    }

    /// Enqueue from synchronous code (the scanner); blocks while the queue is full.
    ///
    /// Must not be called from within an async task.
    pub fn submit_blocking(&self, item: Arc<PlaylistItem>) -> Result<QueueKind, Error> {
        let kind = Self::route(&item)?;
        self.sender(kind)
            .blocking_send(RenderRequest(item))
            .map_err(|_| Error::QueueClosed(kind.as_str()))?;
        Ok(kind)
    }

    /// Enqueue from async code; waits while the queue is full.
    pub async fn submit(&self, item: Arc<PlaylistItem>) -> Result<QueueKind, Error> {
        let kind = Self::route(&item)?;
        self.sender(kind)
            .send(RenderRequest(item))
            .await
            .map_err(|_| Error::QueueClosed(kind.as_str()))?;
        Ok(kind)
    }

    /// Hand a stale cache file to the orphan worker; blocks while the queue is full.
    pub fn discard_orphan_blocking(&self, path: PathBuf) -> Result<(), Error> {
        self.orphans
            .blocking_send(OrphanArtifact(path))
            .map_err(|_| Error::QueueClosed("orphan"))
    }
}
