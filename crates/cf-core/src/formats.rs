//! Format registry: the static table of supported extensions.
//!
//! All enums serialize in lowercase (via `serde(rename_all = "lowercase")`)
//! and implement `Display` manually so the extension string is the single
//! textual representation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// FormatGroup
// ---------------------------------------------------------------------------

/// A family of mutually inter-convertible formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatGroup {
    Document,
    Spreadsheet,
    Image,
    Audio,
    Video,
}

impl FormatGroup {
    /// All groups in registry order.
    pub const ALL: [FormatGroup; 5] = [
        FormatGroup::Document,
        FormatGroup::Spreadsheet,
        FormatGroup::Image,
        FormatGroup::Audio,
        FormatGroup::Video,
    ];

    /// Formats belonging to this group, in registry order.
    pub fn formats(self) -> impl Iterator<Item = Format> {
        Format::ALL.into_iter().filter(move |f| f.group() == self)
    }
}

impl fmt::Display for FormatGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document => write!(f, "document"),
            Self::Spreadsheet => write!(f, "spreadsheet"),
            Self::Image => write!(f, "image"),
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
        }
    }
}

// ---------------------------------------------------------------------------
// Format
// ---------------------------------------------------------------------------

/// A registered file format, identified by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Doc,
    Docx,
    Odt,
    Rtf,
    Txt,
    Xls,
    Xlsx,
    Csv,
    Jpeg,
    Jpg,
    Png,
    Gif,
    Heic,
    Wav,
    Mp3,
    Mp4,
    Mov,
}

impl Format {
    /// Every registered format, grouped by family.
    pub const ALL: [Format; 17] = [
        Format::Doc,
        Format::Docx,
        Format::Odt,
        Format::Rtf,
        Format::Txt,
        Format::Xls,
        Format::Xlsx,
        Format::Csv,
        Format::Jpeg,
        Format::Jpg,
        Format::Png,
        Format::Gif,
        Format::Heic,
        Format::Wav,
        Format::Mp3,
        Format::Mp4,
        Format::Mov,
    ];

    /// Lowercase extension without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Doc => "doc",
            Self::Docx => "docx",
            Self::Odt => "odt",
            Self::Rtf => "rtf",
            Self::Txt => "txt",
            Self::Xls => "xls",
            Self::Xlsx => "xlsx",
            Self::Csv => "csv",
            Self::Jpeg => "jpeg",
            Self::Jpg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Heic => "heic",
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::Mp4 => "mp4",
            Self::Mov => "mov",
        }
    }

    /// The family this format belongs to.
    pub fn group(self) -> FormatGroup {
        match self {
            Self::Doc | Self::Docx | Self::Odt | Self::Rtf | Self::Txt => FormatGroup::Document,
            Self::Xls | Self::Xlsx | Self::Csv => FormatGroup::Spreadsheet,
            Self::Jpeg | Self::Jpg | Self::Png | Self::Gif | Self::Heic => FormatGroup::Image,
            Self::Wav | Self::Mp3 => FormatGroup::Audio,
            Self::Mp4 | Self::Mov => FormatGroup::Video,
        }
    }

    /// MIME type of an artifact in this format.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Doc => "application/msword",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Odt => "application/vnd.oasis.opendocument.text",
            Self::Rtf => "application/rtf",
            Self::Txt => "text/plain",
            Self::Xls => "application/vnd.ms-excel",
            Self::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Self::Csv => "text/csv",
            Self::Jpeg | Self::Jpg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Heic => "image/heic",
            Self::Wav => "audio/wav",
            Self::Mp3 => "audio/mpeg",
            Self::Mp4 => "video/mp4",
            Self::Mov => "video/quicktime",
        }
    }

    /// Whether encoding to this format discards information.
    pub fn is_lossy(self) -> bool {
        matches!(
            self,
            Self::Jpeg | Self::Jpg | Self::Heic | Self::Mp3 | Self::Mp4 | Self::Mov
        )
    }

    /// Look up a format by extension. Case-insensitive, leading dot optional.
    pub fn from_extension(ext: &str) -> Option<Format> {
        let ext = ext.trim().trim_start_matches('.');
        Format::ALL
            .into_iter()
            .find(|f| f.extension().eq_ignore_ascii_case(ext))
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Format::from_extension(s).ok_or_else(|| Error::UnsupportedFormat(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Registry queries
// ---------------------------------------------------------------------------

/// Lowercase extension after the last dot of `filename`, or `""`.
pub fn extension_of(filename: &str) -> String {
    let name = filename
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(filename);
    match name.rfind('.') {
        Some(idx) if idx + 1 < name.len() => name[idx + 1..].to_ascii_lowercase(),
        _ => String::new(),
    }
}

/// The group `extension` belongs to, if registered.
pub fn group_of(extension: &str) -> Option<FormatGroup> {
    Format::from_extension(extension).map(Format::group)
}

/// Formats the given extension can be converted to within its own group,
/// in registry order. Unregistered extensions yield an empty list.
pub fn possible_targets(extension: &str) -> Vec<Format> {
    let Some(source) = Format::from_extension(extension) else {
        return Vec::new();
    };
    source
        .group()
        .formats()
        .filter(|f| *f != source)
        .collect()
}

/// [`possible_targets`] keyed by filename.
pub fn possible_targets_for(filename: &str) -> Vec<Format> {
    possible_targets(&extension_of(filename))
}

/// Whether a conversion from `source` to `target` exists.
///
/// Same-group conversions are always allowed (except identity). Cross-group
/// paths: video to audio (track extraction) and video/audio to image
/// (representative still).
pub fn has_path(source: Format, target: Format) -> bool {
    if source == target {
        return false;
    }
    match (source.group(), target.group()) {
        (a, b) if a == b => true,
        (FormatGroup::Video, FormatGroup::Audio) => true,
        (FormatGroup::Video | FormatGroup::Audio, FormatGroup::Image) => true,
        _ => false,
    }
}

/// Validate and resolve a conversion path from two extensions.
pub fn resolve_path(source_ext: &str, target_ext: &str) -> Result<(Format, Format)> {
    let source = Format::from_extension(source_ext).ok_or_else(|| {
        Error::UnsupportedFormat(format!("unregistered source extension '{source_ext}'"))
    })?;
    let target = Format::from_extension(target_ext).ok_or_else(|| {
        Error::UnsupportedFormat(format!("unregistered target extension '{target_ext}'"))
    })?;
    if !has_path(source, target) {
        return Err(Error::UnsupportedFormat(format!(
            "no conversion path from {source} ({}) to {target} ({})",
            source.group(),
            target.group()
        )));
    }
    Ok((source, target))
}
