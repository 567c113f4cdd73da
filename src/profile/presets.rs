use super::{
    CompressionProfile, ImageFormat, ImageSettings, QualityLevel, VideoFormat, VideoResolution,
    VideoSettings,
};

/// Encoder values behind a quality level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityPreset {
    pub crf: u8,
    pub preset: &'static str,
    pub image_quality: u8,
    pub description: &'static str,
}

impl QualityPreset {
    pub fn for_level(level: QualityLevel) -> Self {
        match level {
            QualityLevel::Low => Self {
                crf: 28,
                preset: "fast",
                image_quality: 60,
                description: "Fast compression with smaller files",
            },
            QualityLevel::Medium => Self {
                crf: 23,
                preset: "medium",
                image_quality: 85,
                description: "Balanced quality and file size",
            },
            QualityLevel::High => Self {
                crf: 18,
                preset: "slow",
                image_quality: 95,
                description: "High quality with larger files",
            },
        }
    }
}

const BUILTIN_NAMES: [&str; 4] = ["low", "medium", "high", "web_optimized"];

pub fn builtin_profile_names() -> &'static [&'static str] {
    &BUILTIN_NAMES
}

pub fn builtin_profile(name: &str) -> Option<CompressionProfile> {
    let level_profile = |name: &str, description: &str, level: QualityLevel| CompressionProfile {
        name: name.to_string(),
        description: description.to_string(),
        video: VideoSettings {
            quality_level: level,
            ..VideoSettings::default()
        },
        image: ImageSettings {
            quality_level: level,
            ..ImageSettings::default()
        },
        created_at: None,
    };

    match name {
        "low" => Some(level_profile(
            "low",
            "Fast compression with smaller files, optimized for web sharing",
            QualityLevel::Low,
        )),
        "medium" => Some(level_profile(
            "medium",
            "Balanced quality and file size for general use",
            QualityLevel::Medium,
        )),
        "high" => Some(level_profile(
            "high",
            "High quality compression for professional use",
            QualityLevel::High,
        )),
        "web_optimized" => Some(CompressionProfile {
            name: "web_optimized".to_string(),
            description: "Optimized for web delivery with modern formats".to_string(),
            video: VideoSettings {
                format: VideoFormat::Webm,
                resolution: VideoResolution::Fhd1080p,
                codec: "libvpx-vp9".to_string(),
                audio_codec: "libopus".to_string(),
                ..VideoSettings::default()
            },
            image: ImageSettings {
                format: ImageFormat::Webp,
                ..ImageSettings::default()
            },
            created_at: None,
        }),
        _ => None,
    }
}
