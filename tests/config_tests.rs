use mosaic_signage::config::Configuration;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn parse_kebab_case_config() {
    let yaml = r#"
media-root: "/srv/media"
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(cfg.media_root, PathBuf::from("/srv/media"));
    assert_eq!(cfg.rescan_interval, Duration::from_secs(30));
    assert_eq!(cfg.standard_recheck, Duration::from_secs(30));
    assert_eq!(cfg.default_image_duration, Duration::from_secs(30));
    assert_eq!(cfg.rescan_jitter, Duration::ZERO);
    assert_eq!(cfg.queues.video_capacity, 100);
    assert_eq!(cfg.queues.orphan_capacity, 10);
    assert_eq!(cfg.render.screens, 3);
    assert_eq!(cfg.render.banner_width(), 5760);
    assert_eq!(cfg.player.video_command[0], "mpv");
    assert!(cfg.sync_command.is_none());
    assert!(cfg.display_switch.is_none());
    assert!(cfg.timezone.is_none());
}

#[test]
fn parse_full_config() {
    let yaml = r#"
media-root: "/srv/media"
timezone: "Europe/Berlin"
rescan-interval: 2m
rescan-jitter: 10s
standard-recheck: 45s
default-image-duration: 12s
queues:
  video-capacity: 4
render:
  screens: 2
  banner-video-passthrough: true
tools:
  ffmpeg: /opt/ffmpeg/bin/ffmpeg
player:
  image-background-command: ["feh", "--bg-fill", "{path}"]
sync-command: "rclone sync remote:media /srv/media"
display-switch:
  event-command: "xrandr --output HDMI-2 --auto"
  standard-command: "xrandr --output HDMI-2 --off"
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(cfg.timezone, Some(chrono_tz::Europe::Berlin));
    assert_eq!(cfg.rescan_interval, Duration::from_secs(120));
    assert_eq!(cfg.rescan_jitter, Duration::from_secs(10));
    assert_eq!(cfg.standard_recheck, Duration::from_secs(45));
    assert_eq!(cfg.default_image_duration, Duration::from_secs(12));
    assert_eq!(cfg.queues.video_capacity, 4);
    assert_eq!(cfg.queues.image_capacity, 100);
    assert_eq!(cfg.render.screens, 2);
    assert!(cfg.render.banner_video_passthrough);
    assert_eq!(cfg.tools.ffmpeg, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
    assert_eq!(cfg.tools.convert, PathBuf::from("convert"));
    assert_eq!(
        cfg.player.image_background_command.as_deref(),
        Some(&["feh".to_string(), "--bg-fill".to_string(), "{path}".to_string()][..])
    );
    let switch = cfg.display_switch.unwrap();
    assert!(switch.event_command.unwrap().contains("--auto"));
    assert!(switch.standard_command.unwrap().contains("--off"));
}

#[test]
fn unknown_keys_are_rejected() {
    let yaml = r#"
media-root: "/srv/media"
rescan-intervall: 5s
"#;
    assert!(serde_yaml::from_str::<Configuration>(yaml).is_err());
}

#[test]
fn validation_requires_existing_media_root() {
    let tmp = tempdir().unwrap();
    let missing = tmp.path().join("nope");
    let yaml = format!("media-root: {:?}\n", missing.display().to_string());
    let cfg: Configuration = serde_yaml::from_str(&yaml).unwrap();
    let err = cfg.validated().unwrap_err();
    assert!(err.to_string().contains("media-root"), "{err}");
}

#[test]
fn validation_rejects_zero_intervals() {
    let tmp = tempdir().unwrap();
    let yaml = format!(
        "media-root: {:?}\nrescan-interval: 0s\n",
        tmp.path().display().to_string()
    );
    let cfg: Configuration = serde_yaml::from_str(&yaml).unwrap();
    assert!(cfg.validated().is_err());

    let yaml = format!("media-root: {:?}\n", tmp.path().display().to_string());
    let cfg: Configuration = serde_yaml::from_str(&yaml).unwrap();
    assert!(cfg.validated().is_ok());
}

#[test]
fn load_from_file() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("config.yaml");
    std::fs::write(
        &path,
        format!(
            "media-root: {:?}\nsync-command: \"true\"\n",
            tmp.path().display().to_string()
        ),
    )
    .unwrap();
    let cfg = Configuration::from_yaml_file(&path).unwrap().validated().unwrap();
    assert_eq!(cfg.media_root, tmp.path());
    assert_eq!(cfg.sync_command.as_deref(), Some("true"));
}
