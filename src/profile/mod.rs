// Compression profiles
//
// A profile is a named pair of video and image settings. Before a job starts
// the chosen profile is resolved into a `ProfileParams` snapshot which is
// stored in the job record and never re-resolved on resume.

pub mod manager;
pub mod presets;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use manager::ProfileManager;
pub use presets::{builtin_profile, builtin_profile_names, QualityPreset};

use crate::error::{Result, CompressifyError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    Mp4,
    Avi,
    Mkv,
    Webm,
    Mov,
}

impl VideoFormat {
    pub const ALL: [VideoFormat; 5] = [Self::Mp4, Self::Avi, Self::Mkv, Self::Webm, Self::Mov];

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Avi => "avi",
            Self::Mkv => "mkv",
            Self::Webm => "webm",
            Self::Mov => "mov",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
    Avif,
    Tiff,
    Bmp,
}

impl ImageFormat {
    pub const ALL: [ImageFormat; 6] = [
        Self::Jpeg,
        Self::Png,
        Self::Webp,
        Self::Avif,
        Self::Tiff,
        Self::Bmp,
    ];

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Avif => "avif",
            Self::Tiff => "tiff",
            Self::Bmp => "bmp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoResolution {
    #[serde(rename = "original")]
    Original,
    #[serde(rename = "3840x2160")]
    Uhd4k,
    #[serde(rename = "2560x1440")]
    Qhd1440p,
    #[serde(rename = "1920x1080")]
    Fhd1080p,
    #[serde(rename = "1280x720")]
    Hd720p,
    #[serde(rename = "854x480")]
    Sd480p,
    #[serde(rename = "640x360")]
    Sd360p,
}

impl VideoResolution {
    pub const ALL: [VideoResolution; 7] = [
        Self::Original,
        Self::Uhd4k,
        Self::Qhd1440p,
        Self::Fhd1080p,
        Self::Hd720p,
        Self::Sd480p,
        Self::Sd360p,
    ];

    /// Target frame size, `None` for original
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            Self::Original => None,
            Self::Uhd4k => Some((3840, 2160)),
            Self::Qhd1440p => Some((2560, 1440)),
            Self::Fhd1080p => Some((1920, 1080)),
            Self::Hd720p => Some((1280, 720)),
            Self::Sd480p => Some((854, 480)),
            Self::Sd360p => Some((640, 360)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSettings {
    pub format: VideoFormat,
    pub resolution: VideoResolution,
    pub quality_level: QualityLevel,
    /// Explicit CRF, overrides the quality level preset (0-51)
    pub crf: Option<u8>,
    /// Target bitrate such as "2M" or "500k"; takes precedence over CRF
    pub bitrate: Option<String>,
    pub codec: String,
    pub audio_codec: String,
    /// Encoder preset; the quality level preset is used when absent
    pub preset: Option<String>,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            format: VideoFormat::Mp4,
            resolution: VideoResolution::Original,
            quality_level: QualityLevel::Medium,
            crf: None,
            bitrate: None,
            codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            preset: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSettings {
    pub format: ImageFormat,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub quality_level: QualityLevel,
    /// Explicit quality, overrides the quality level preset (1-100)
    pub quality: Option<u8>,
    pub preserve_aspect_ratio: bool,
    pub lossless: bool,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            format: ImageFormat::Jpeg,
            width: None,
            height: None,
            quality_level: QualityLevel::Medium,
            quality: None,
            preserve_aspect_ratio: true,
            lossless: false,
        }
    }
}

/// A named, user-facing compression profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionProfile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub video: VideoSettings,
    #[serde(default)]
    pub image: ImageSettings,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl CompressionProfile {
    /// Resolve quality levels into concrete encoder values
    pub fn resolve(&self) -> Result<ProfileParams> {
        let video_preset = QualityPreset::for_level(self.video.quality_level);
        let image_preset = QualityPreset::for_level(self.image.quality_level);

        let params = ProfileParams {
            profile_name: self.name.clone(),
            video: VideoParams {
                format: self.video.format,
                codec: self.video.codec.clone(),
                audio_codec: self.video.audio_codec.clone(),
                preset: self
                    .video
                    .preset
                    .clone()
                    .unwrap_or_else(|| video_preset.preset.to_string()),
                crf: self.video.crf.unwrap_or(video_preset.crf),
                bitrate: self.video.bitrate.clone(),
                resolution: self.video.resolution,
            },
            image: ImageParams {
                format: self.image.format,
                quality: self.image.quality.unwrap_or(image_preset.image_quality),
                width: self.image.width,
                height: self.image.height,
                preserve_aspect_ratio: self.image.preserve_aspect_ratio,
                lossless: self.image.lossless,
            },
        };

        params.validate()?;
        Ok(params)
    }
}

/// Frozen encoder parameters stored with a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileParams {
    pub profile_name: String,
    pub video: VideoParams,
    pub image: ImageParams,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoParams {
    pub format: VideoFormat,
    pub codec: String,
    pub audio_codec: String,
    pub preset: String,
    pub crf: u8,
    pub bitrate: Option<String>,
    pub resolution: VideoResolution,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageParams {
    pub format: ImageFormat,
    pub quality: u8,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub preserve_aspect_ratio: bool,
    pub lossless: bool,
}

impl ProfileParams {
    pub fn validate(&self) -> Result<()> {
        if self.video.crf > 51 {
            return Err(CompressifyError::Profile(format!(
                "CRF value {} out of range (0-51)",
                self.video.crf
            )));
        }
        if let Some(bitrate) = &self.video.bitrate {
            if !is_valid_bitrate(bitrate) {
                return Err(CompressifyError::Profile(format!(
                    "Invalid bitrate '{}', expected e.g. 2M or 500k",
                    bitrate
                )));
            }
        }
        if self.video.codec.trim().is_empty() {
            return Err(CompressifyError::Profile("Video codec must not be empty".to_string()));
        }
        if !(1..=100).contains(&self.image.quality) {
            return Err(CompressifyError::Profile(format!(
                "Image quality {} out of range (1-100)",
                self.image.quality
            )));
        }
        if self.image.width == Some(0) || self.image.height == Some(0) {
            return Err(CompressifyError::Profile("Image dimensions must be positive".to_string()));
        }
        Ok(())
    }

    /// Human readable list of fields that differ from `other`
    pub fn differences(&self, other: &ProfileParams) -> Vec<String> {
        let mut diffs = Vec::new();
        let mut check = |field: &str, a: String, b: String| {
            if a != b {
                diffs.push(format!("{}: {} -> {}", field, a, b));
            }
        };

        check("profile", self.profile_name.clone(), other.profile_name.clone());
        check("video.format", format!("{:?}", self.video.format), format!("{:?}", other.video.format));
        check("video.codec", self.video.codec.clone(), other.video.codec.clone());
        check("video.audio_codec", self.video.audio_codec.clone(), other.video.audio_codec.clone());
        check("video.preset", self.video.preset.clone(), other.video.preset.clone());
        check("video.crf", self.video.crf.to_string(), other.video.crf.to_string());
        check("video.bitrate", format!("{:?}", self.video.bitrate), format!("{:?}", other.video.bitrate));
        check("video.resolution", format!("{:?}", self.video.resolution), format!("{:?}", other.video.resolution));
        check("image.format", format!("{:?}", self.image.format), format!("{:?}", other.image.format));
        check("image.quality", self.image.quality.to_string(), other.image.quality.to_string());
        check("image.width", format!("{:?}", self.image.width), format!("{:?}", other.image.width));
        check("image.height", format!("{:?}", self.image.height), format!("{:?}", other.image.height));
        check(
            "image.preserve_aspect_ratio",
            self.image.preserve_aspect_ratio.to_string(),
            other.image.preserve_aspect_ratio.to_string(),
        );
        check("image.lossless", self.image.lossless.to_string(), other.image.lossless.to_string());

        diffs
    }
}

/// Accepts plain numbers with an optional k/M/G suffix, e.g. "2M", "500k", "1.5M"
pub fn is_valid_bitrate(bitrate: &str) -> bool {
    let digits = bitrate.trim_end_matches(['k', 'K', 'm', 'M', 'g', 'G']);
    if digits.is_empty() || bitrate.len() - digits.len() > 1 {
        return false;
    }
    let mut parts = digits.splitn(2, '.');
    let whole = parts.next().unwrap_or_default();
    let frac = parts.next();
    let numeric = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    numeric(whole) && frac.is_none_or(numeric)
}
