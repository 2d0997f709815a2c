//! Compression policy: maps a (target format, level) pair to codec settings.
//!
//! [`resolve`] is a pure, total function. The settings it returns are the
//! only way converters receive quality parameters; nothing downstream
//! assembles them by hand.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::formats::{Format, FormatGroup};

/// Lowest quality a lossy image encode is allowed to use.
pub const LOSSY_IMAGE_QUALITY_FLOOR: f32 = 0.5;

// ---------------------------------------------------------------------------
// CompressionLevel
// ---------------------------------------------------------------------------

/// User-facing compression level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl CompressionLevel {
    pub const ALL: [CompressionLevel; 4] = [
        CompressionLevel::None,
        CompressionLevel::Low,
        CompressionLevel::Medium,
        CompressionLevel::High,
    ];

    /// Parse a level, falling back to [`CompressionLevel::None`] for anything
    /// unrecognized.
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }

    /// Base quality factor for this level.
    pub fn quality(self) -> f32 {
        match self {
            Self::None => 1.0,
            Self::Low => 0.9,
            Self::Medium => 0.75,
            Self::High => 0.6,
        }
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

impl FromStr for CompressionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown compression level '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-family settings
// ---------------------------------------------------------------------------

/// Settings for raster image encoders.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageSettings {
    /// 0.0..=1.0
    pub quality: f32,
    pub compress: bool,
}

impl ImageSettings {
    /// JPEG-style 1..=100 quality.
    pub fn quality_percent(&self) -> u8 {
        (self.quality * 100.0).round().clamp(1.0, 100.0) as u8
    }
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            quality: 1.0,
            compress: false,
        }
    }
}

/// Settings for audio and video re-encodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaSettings {
    pub quality: f32,
    pub compress: bool,
    /// Target bitrate in ffmpeg notation (`192k`, `2M`), when the format
    /// carries one.
    pub bitrate: Option<String>,
    /// Constant rate factor for video encodes.
    pub crf: u32,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            quality: 1.0,
            compress: false,
            bitrate: None,
            crf: video_crf(1.0),
        }
    }
}

/// Settings for zip-based document and workbook containers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSettings {
    /// Deflate container entries instead of storing them.
    pub compress: bool,
}

/// Resolved settings, tagged by target family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum CompressionSettings {
    Image(ImageSettings),
    Media(MediaSettings),
    Document(DocumentSettings),
}

impl CompressionSettings {
    /// Image settings, or lossless defaults when these settings target
    /// another family.
    pub fn image(&self) -> ImageSettings {
        match self {
            Self::Image(s) => *s,
            _ => ImageSettings::default(),
        }
    }

    /// Media settings, or pass-through defaults.
    pub fn media(&self) -> MediaSettings {
        match self {
            Self::Media(s) => s.clone(),
            _ => MediaSettings::default(),
        }
    }

    /// Document settings, or store-only defaults.
    pub fn document(&self) -> DocumentSettings {
        match self {
            Self::Document(s) => *s,
            _ => DocumentSettings::default(),
        }
    }

    pub fn compress(&self) -> bool {
        match self {
            Self::Image(s) => s.compress,
            Self::Media(s) => s.compress,
            Self::Document(s) => s.compress,
        }
    }
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self::Document(DocumentSettings::default())
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

fn mp3_bitrate(level: CompressionLevel) -> Option<&'static str> {
    match level {
        CompressionLevel::None => None,
        CompressionLevel::Low => Some("256k"),
        CompressionLevel::Medium => Some("192k"),
        CompressionLevel::High => Some("128k"),
    }
}

fn video_bitrate(level: CompressionLevel) -> Option<&'static str> {
    match level {
        CompressionLevel::None => None,
        CompressionLevel::Low => Some("4M"),
        CompressionLevel::Medium => Some("2M"),
        CompressionLevel::High => Some("1M"),
    }
}

/// CRF for a quality factor: 18 at full quality, +1 per 5% given up.
pub fn video_crf(quality: f32) -> u32 {
    18 + ((1.0 - quality.clamp(0.0, 1.0)) * 20.0).round() as u32
}

/// Resolve settings for writing `target` at `level`.
pub fn resolve(target: Format, level: CompressionLevel) -> CompressionSettings {
    let compress = level != CompressionLevel::None;
    let quality = level.quality();

    match target.group() {
        FormatGroup::Image => {
            let quality = if target.is_lossy() {
                quality.max(LOSSY_IMAGE_QUALITY_FLOOR)
            } else {
                quality
            };
            CompressionSettings::Image(ImageSettings { quality, compress })
        }
        FormatGroup::Audio | FormatGroup::Video => {
            let bitrate = match target {
                Format::Mp3 => mp3_bitrate(level),
                Format::Mp4 | Format::Mov => video_bitrate(level),
                _ => None,
            };
            CompressionSettings::Media(MediaSettings {
                quality,
                compress,
                bitrate: bitrate.map(str::to_string),
                crf: video_crf(quality),
            })
        }
        FormatGroup::Document | FormatGroup::Spreadsheet => {
            CompressionSettings::Document(DocumentSettings { compress })
        }
    }
}

/// [`resolve`] over raw strings. Unknown targets or levels fall back to the
/// `none` settings.
pub fn resolve_str(target_ext: &str, level: &str) -> CompressionSettings {
    let level = CompressionLevel::parse_lenient(level);
    match Format::from_extension(target_ext) {
        Some(target) => resolve(target, level),
        None => CompressionSettings::default(),
    }
}
