//! Writing torrents to disk and re-stamping them for a specific tracker

use std::path::{Path, PathBuf};

use bytes::Bytes;

use super::bencode::{BencodeError, Value};
use super::metainfo::TorrentSummary;
use super::BuildError;

/// Characters that are not allowed in file names on common filesystems.
const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

const FALLBACK_NAME: &str = "release";

/// Rewrites announce and source for a tracker.
///
/// `announce` replaces the primary URL and drops any `announce-list`;
/// `source` is written into the info dictionary, so the returned torrent has
/// a different infohash whenever the source changes.
///
/// # Errors
///
/// - `BencodeError::Parse` - If the input is not bencode
/// - `BencodeError::Field` - If the input has no info dictionary
pub fn retarget(
    torrent: &[u8],
    announce: &str,
    source: Option<&str>,
) -> Result<(Bytes, TorrentSummary), BencodeError> {
    let mut root = Value::decode(torrent)?;
    if !matches!(root.get("info"), Some(Value::Dict(_))) {
        return Err(BencodeError::Field {
            field: "info".to_string(),
        });
    }

    root.insert("announce", Value::string(announce));
    root.remove("announce-list");

    if let Some(info) = root.get_mut("info") {
        match source.map(str::trim).filter(|source| !source.is_empty()) {
            Some(source) => info.insert("source", Value::string(source)),
            None => {
                info.remove("source");
            }
        }
    }

    let bytes = root.encode();
    let summary = TorrentSummary::parse(&bytes)?;
    Ok((Bytes::from(bytes), summary))
}

/// Makes `name` safe to use as a file name.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if FORBIDDEN_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = replaced.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Writes `bytes` to `<output_dir>/<name>.torrent`, or
/// `<name> [TRACKER].torrent` when a tracker tag is given.
///
/// # Errors
/// - `BuildError::Io` - The directory could not be created or the file written
pub async fn write_torrent(
    output_dir: &Path,
    name: &str,
    tracker: Option<&str>,
    bytes: &[u8],
) -> Result<PathBuf, BuildError> {
    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|e| BuildError::io(output_dir, e))?;

    let mut file_name = sanitize_filename(name);
    if let Some(tracker) = tracker.map(str::trim).filter(|tracker| !tracker.is_empty()) {
        file_name.push_str(&format!(" [{}]", sanitize_filename(&tracker.to_uppercase())));
    }
    file_name.push_str(".torrent");

    let path = output_dir.join(file_name);
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| BuildError::io(&path, e))?;

    tracing::debug!("Wrote torrent to {}", path.display());
    Ok(path)
}
