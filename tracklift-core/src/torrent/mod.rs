//! Deterministic torrent construction and bencode handling

pub mod bencode;
pub mod creation;
pub mod files;
pub mod hashing;
pub mod metainfo;
pub mod output;

use std::fmt;
use std::path::PathBuf;

pub use bencode::{BencodeError, Value};
pub use creation::{BuildOptions, BuiltTorrent, PieceLengthPolicy, TorrentBuilder};
pub use files::{FileEntry, FileSource};
pub use hashing::{ChunkPlan, ChunkSpan, PieceHash};
pub use metainfo::{TorrentFile, TorrentMetainfo, TorrentSummary, last_piece_length, piece_count};
pub use output::{retarget, sanitize_filename, write_torrent};

/// SHA-1 hash identifying a unique torrent.
///
/// 20-byte SHA-1 hash of the bencoded info dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Creates InfoHash from 20-byte SHA-1 hash.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Returns reference to underlying 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Parses a 40-character hex string.
    pub fn from_hex(value: &str) -> Option<Self> {
        let bytes = hex::decode(value).ok()?;
        let hash: [u8; 20] = bytes.try_into().ok()?;
        Some(Self(hash))
    }
}

impl serde::Serialize for InfoHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Errors that can occur while building a torrent.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Empty input: {reason}")]
    EmptyInput { reason: String },

    #[error("Invalid build input: {reason}")]
    InvalidInput { reason: String },

    #[error("Invalid piece length {length}: must be a power of two between 16 KiB and 16 MiB")]
    InvalidPieceLength { length: u64 },

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Torrent build was cancelled")]
    Cancelled,

    #[error("Hashing worker failed: {reason}")]
    Worker { reason: String },

    #[error("Bencode error: {0}")]
    Bencode(#[from] BencodeError),
}

impl BuildError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
