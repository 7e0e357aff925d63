//! Release metadata supplied by the tagging layer.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Release type used when no explicit type is known.
pub const DEFAULT_RELEASE_TYPE: &str = "ALBUM";

/// Descriptive metadata for one audio release.
///
/// Produced by the tag extraction layer and treated as read-only here.
/// Category and format lookups use `release_type` and `format` upper-cased.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReleaseMetadata {
    pub artist: String,
    pub album: String,
    pub year: Option<u16>,
    #[serde(default)]
    pub tracklist: Vec<Track>,
    /// Audio container/codec, e.g. `FLAC` or `MP3`
    pub format: String,
    pub bit_depth: Option<u8>,
    pub sample_rate: Option<u32>,
    pub barcode: Option<String>,
    /// Sum of all file sizes in the release
    pub total_size: u64,
    /// `ALBUM`, `EP`, `SINGLE`, ...
    pub release_type: Option<String>,
    /// Source medium, e.g. `CD` or `WEB`
    pub media: Option<String>,
    /// Pre-rendered upload name; overrides the generated one
    pub release_name: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
}

/// Single entry in a release tracklist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub title: String,
    pub duration: Duration,
}

impl ReleaseMetadata {
    /// Returns the category lookup key (`release_type` upper-cased, `ALBUM` by default).
    pub fn release_type_key(&self) -> String {
        self.release_type
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_RELEASE_TYPE)
            .to_uppercase()
    }

    /// Returns the format lookup key.
    pub fn format_key(&self) -> String {
        self.format.trim().to_uppercase()
    }

    /// Builds the upload name: `Artist - Album (Year) FORMAT`.
    pub fn upload_name(&self) -> String {
        if let Some(name) = self.release_name.as_deref().map(str::trim)
            && !name.is_empty()
        {
            return name.to_string();
        }

        let mut name = format!("{} - {}", self.artist, self.album);
        if let Some(year) = self.year {
            name.push_str(&format!(" ({year})"));
        }
        if !self.format.is_empty() {
            name.push(' ');
            name.push_str(&self.format_key());
        }
        name
    }

    /// Total running time of the tracklist.
    pub fn total_duration(&self) -> Duration {
        self.tracklist.iter().map(|track| track.duration).sum()
    }
}
