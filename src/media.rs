//! File-name based media classification.
//!
//! Media content is never inspected; the role of a file (and, for pictures,
//! how long it stays on screen) is taken from its name alone:
//!
//! | pattern                       | role             |
//! |-------------------------------|------------------|
//! | `NN-banner-video…`            | banner video     |
//! | `NN-banner-bild<seconds>…`    | banner picture   |
//! | `NN-video…`                   | video            |
//! | `NN-bild<seconds>…`           | picture          |
//!
//! Banner patterns are tested first; anything else is [`MediaRole::Invalid`].

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::warn;

/// Display time used when a picture name carries no usable duration.
pub const DEFAULT_IMAGE_DURATION: Duration = Duration::from_secs(30);

static BANNER_VIDEO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{2}-banner-video").expect("banner video pattern"));
static BANNER_PICTURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{2}-banner-bild-?([0-9]*)").expect("banner picture pattern")
});
static VIDEO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{2}-video").expect("video pattern"));
static PICTURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{2}-bild-?([0-9]*)").expect("picture pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaRole {
    Video,
    BannerVideo,
    Picture,
    BannerPicture,
    Invalid,
}

impl MediaRole {
    pub fn is_image(self) -> bool {
        matches!(self, Self::Picture | Self::BannerPicture)
    }

    pub fn is_video(self) -> bool {
        matches!(self, Self::Video | Self::BannerVideo)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::BannerVideo => "banner-video",
            Self::Picture => "picture",
            Self::BannerPicture => "banner-picture",
            Self::Invalid => "invalid",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub role: MediaRole,
    /// Only set for picture roles.
    pub display_duration: Option<Duration>,
}

impl Classification {
    fn plain(role: MediaRole) -> Self {
        Self {
            role,
            display_duration: None,
        }
    }
}

/// Classifier with a configurable fallback display duration.
#[derive(Debug, Clone, Copy)]
pub struct MediaClassifier {
    default_duration: Duration,
}

impl Default for MediaClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_DURATION)
    }
}

impl MediaClassifier {
    pub fn new(default_duration: Duration) -> Self {
        Self { default_duration }
    }

    pub fn classify(&self, file_name: &str) -> Classification {
        if BANNER_VIDEO.is_match(file_name) {
            return Classification::plain(MediaRole::BannerVideo);
        }
        if let Some(caps) = BANNER_PICTURE.captures(file_name) {
            let digits = caps.get(1).map(|m| m.as_str());
            return self.picture(MediaRole::BannerPicture, file_name, digits);
        }
        if VIDEO.is_match(file_name) {
            return Classification::plain(MediaRole::Video);
        }
        if let Some(caps) = PICTURE.captures(file_name) {
            let digits = caps.get(1).map(|m| m.as_str());
            return self.picture(MediaRole::Picture, file_name, digits);
        }
        Classification::plain(MediaRole::Invalid)
    }

    fn picture(&self, role: MediaRole, file_name: &str, digits: Option<&str>) -> Classification {
        let parsed = digits
            .filter(|d| !d.is_empty())
            .and_then(|d| d.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        let duration = parsed.unwrap_or_else(|| {
            warn!(
                file = file_name,
                default_secs = self.default_duration.as_secs(),
                "missing display duration; using default"
            );
            self.default_duration
        });
        Classification {
            role,
            display_duration: Some(duration),
        }
    }
}

/// Classify with the stock 30 second picture duration.
pub fn classify(file_name: &str) -> Classification {
    MediaClassifier::default().classify(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banner_patterns_win_over_plain_ones() {
        assert_eq!(classify("01-banner-video.mp4").role, MediaRole::BannerVideo);
        let banner = classify("02-banner-bild20.png");
        assert_eq!(banner.role, MediaRole::BannerPicture);
        assert_eq!(banner.display_duration, Some(Duration::from_secs(20)));
    }

    #[test]
    fn plain_roles_and_durations() {
        assert_eq!(
            classify("01-video.mp4"),
            Classification {
                role: MediaRole::Video,
                display_duration: None
            }
        );
        let pic = classify("02-bild15.jpg");
        assert_eq!(pic.role, MediaRole::Picture);
        assert_eq!(pic.display_duration, Some(Duration::from_secs(15)));
        let dashed = classify("03-bild-45.jpg");
        assert_eq!(dashed.display_duration, Some(Duration::from_secs(45)));
    }

    #[test]
    fn missing_or_zero_duration_falls_back_to_default() {
        assert_eq!(
            classify("04-bild.jpg").display_duration,
            Some(DEFAULT_IMAGE_DURATION)
        );
        assert_eq!(
            classify("04-bild0.jpg").display_duration,
            Some(DEFAULT_IMAGE_DURATION)
        );
        let custom = MediaClassifier::new(Duration::from_secs(7)).classify("05-banner-bild.jpg");
        assert_eq!(custom.display_duration, Some(Duration::from_secs(7)));
    }

    #[test]
    fn unknown_names_are_invalid() {
        for name in ["party.mp4", "1-video.mp4", "notes.txt", "xx01-video.mp4"] {
            assert_eq!(classify(name).role, MediaRole::Invalid, "{name}");
        }
    }
}
