use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, ensure};
use chrono_tz::Tz;
use serde::Deserialize;

pub const DEFAULT_RESCAN_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_STANDARD_RECHECK: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Configuration {
    /// Root of the synced media tree (`once/`, `weekly/`, `standard/`).
    pub media_root: PathBuf,
    /// IANA timezone used for wall-clock schedule evaluation; host local time when unset.
    #[serde(default)]
    pub timezone: Option<Tz>,
    /// Pause between two rescans of the media tree.
    #[serde(default = "Configuration::default_rescan_interval", with = "humantime_serde")]
    pub rescan_interval: Duration,
    /// Upper bound of a random delay added to each rescan pause.
    #[serde(default, with = "humantime_serde")]
    pub rescan_jitter: Duration,
    /// How long a standard-playlist selection stays valid before re-checking the schedule.
    #[serde(default = "Configuration::default_standard_recheck", with = "humantime_serde")]
    pub standard_recheck: Duration,
    /// Display time for pictures whose name carries no duration.
    #[serde(
        default = "Configuration::default_image_duration",
        with = "humantime_serde"
    )]
    pub default_image_duration: Duration,
    #[serde(default)]
    pub queues: QueueOptions,
    #[serde(default)]
    pub render: RenderOptions,
    #[serde(default)]
    pub tools: ToolPaths,
    #[serde(default)]
    pub player: PlayerOptions,
    /// Shell command executed before every rescan (e.g. an rclone sync).
    #[serde(default)]
    pub sync_command: Option<String>,
    /// Shell commands toggling the displays between event and standard mode.
    #[serde(default)]
    pub display_switch: Option<DisplaySwitchOptions>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct QueueOptions {
    pub video_capacity: usize,
    pub image_capacity: usize,
    pub orphan_capacity: usize,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            video_capacity: 100,
            image_capacity: 100,
            orphan_capacity: 10,
        }
    }
}

/// Geometry and encoding parameters of the mosaic renditions.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct RenderOptions {
    pub screen_width: u32,
    pub screen_height: u32,
    /// Number of side-by-side screens the mosaic spans.
    pub screens: u32,
    pub frame_rate: u32,
    /// MJPEG quantizer passed to ffmpeg (`-q:v`).
    pub quality: u32,
    /// Play banner videos straight from the source instead of re-encoding them.
    pub banner_video_passthrough: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            screen_width: 1920,
            screen_height: 1080,
            screens: 3,
            frame_rate: 25,
            quality: 3,
            banner_video_passthrough: false,
        }
    }
}

impl RenderOptions {
    pub fn banner_width(&self) -> u32 {
        self.screen_width.saturating_mul(self.screens)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub convert: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            convert: PathBuf::from("convert"),
        }
    }
}

/// Argument templates for the external players. `{path}` and `{seconds}` are substituted.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PlayerOptions {
    pub video_command: Vec<String>,
    pub image_command: Vec<String>,
    pub image_background_command: Option<Vec<String>>,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        let argv = |args: &[&str]| args.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            video_command: argv(&["mpv", "--fs", "--hwdec=auto", "{path}"]),
            image_command: argv(&[
                "feh",
                "-F",
                "-Y",
                "-D",
                "{seconds}",
                "-Z",
                "--on-last-slide",
                "quit",
                "{path}",
            ]),
            image_background_command: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct DisplaySwitchOptions {
    /// Run when a once or weekly event becomes current.
    #[serde(default)]
    pub event_command: Option<String>,
    /// Run when playback falls back to the standard playlist.
    #[serde(default)]
    pub standard_command: Option<String>,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    const fn default_rescan_interval() -> Duration {
        DEFAULT_RESCAN_INTERVAL
    }

    const fn default_standard_recheck() -> Duration {
        DEFAULT_STANDARD_RECHECK
    }

    const fn default_image_duration() -> Duration {
        crate::media::DEFAULT_IMAGE_DURATION
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            self.media_root.is_dir(),
            "media-root {} does not exist or is not a directory",
            self.media_root.display()
        );
        ensure!(
            !self.rescan_interval.is_zero(),
            "rescan-interval must be greater than zero"
        );
        ensure!(
            !self.standard_recheck.is_zero(),
            "standard-recheck must be greater than zero"
        );
        ensure!(
            !self.default_image_duration.is_zero(),
            "default-image-duration must be greater than zero"
        );
        ensure!(
            self.queues.video_capacity > 0
                && self.queues.image_capacity > 0
                && self.queues.orphan_capacity > 0,
            "queue capacities must be greater than zero"
        );
        ensure!(
            self.render.screens > 0
                && self.render.screen_width > 0
                && self.render.screen_height > 0,
            "render geometry must be non-zero"
        );
        ensure!(self.render.frame_rate > 0, "frame-rate must be greater than zero");
        ensure!(
            !self.player.video_command.is_empty(),
            "player.video-command must not be empty"
        );
        ensure!(
            !self.player.image_command.is_empty(),
            "player.image-command must not be empty"
        );
        if let Some(background) = &self.player.image_background_command {
            ensure!(
                !background.is_empty(),
                "player.image-background-command must not be empty when set"
            );
        }
        Ok(self)
    }

    /// Check that every external program the render pipeline and player need is installed.
    pub fn check_prerequisites(&self) -> Result<()> {
        let mut programs = vec![self.tools.ffmpeg.clone(), self.tools.convert.clone()];
        programs.extend(self.player.video_command.first().map(PathBuf::from));
        programs.extend(self.player.image_command.first().map(PathBuf::from));
        if let Some(program) = self
            .player
            .image_background_command
            .as_ref()
            .and_then(|argv| argv.first())
        {
            programs.push(PathBuf::from(program));
        }
        for program in programs {
            resolve_program(&program)
                .with_context(|| format!("required tool {} is unavailable", program.display()))?;
        }
        Ok(())
    }
}

/// Locate `program` either as an explicit path or on `PATH`.
pub fn resolve_program(program: &Path) -> Result<PathBuf> {
    if program.components().count() > 1 {
        return if program.is_file() {
            Ok(program.to_path_buf())
        } else {
            Err(anyhow!("{} is not a file", program.display()))
        };
    }
    let search = std::env::var_os("PATH").ok_or_else(|| anyhow!("PATH is not set"))?;
    std::env::split_paths(&search)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| anyhow!("{} not found on PATH", program.display()))
}
