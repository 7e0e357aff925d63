//! Torrent metainfo model, bencode mapping and summaries of existing torrents

use sha1::{Digest, Sha1};

use super::bencode::{self, BencodeError, Value};
use super::hashing::PieceHash;
use super::InfoHash;

/// Number of pieces needed for `total_length` bytes.
pub fn piece_count(total_length: u64, piece_length: u64) -> usize {
    if piece_length == 0 {
        return 0;
    }
    total_length.div_ceil(piece_length) as usize
}

/// Length of the final piece; a full piece when the total divides evenly.
pub fn last_piece_length(total_length: u64, piece_length: u64) -> u64 {
    if total_length == 0 || piece_length == 0 {
        return 0;
    }
    match total_length % piece_length {
        0 => piece_length,
        remainder => remainder,
    }
}

/// File listed in a torrent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentFile {
    pub path: Vec<String>,
    pub length: u64,
}

/// Complete torrent metainfo ready for serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentMetainfo {
    pub name: String,
    pub piece_length: u64,
    pub piece_hashes: Vec<PieceHash>,
    pub files: Vec<TorrentFile>,
    pub total_length: u64,
    /// First entry is `announce`; more than one also writes `announce-list`
    pub announce: Vec<String>,
    pub private: bool,
    pub source: Option<String>,
    pub comment: Option<String>,
    pub created_by: Option<String>,
    pub creation_date: Option<i64>,
    /// Single-file layout uses `length` instead of `files`
    pub single_file: bool,
}

impl TorrentMetainfo {
    /// Builds the info dictionary.
    pub fn info_value(&self) -> Value {
        let mut info = Value::dict();
        info.insert("name", Value::string(&self.name));
        info.insert("piece length", Value::Integer(self.piece_length as i64));

        let mut pieces = Vec::with_capacity(self.piece_hashes.len() * 20);
        for hash in &self.piece_hashes {
            pieces.extend_from_slice(hash);
        }
        info.insert("pieces", Value::Bytes(pieces));

        if self.single_file {
            info.insert("length", Value::Integer(self.total_length as i64));
        } else {
            let files = self
                .files
                .iter()
                .map(|file| {
                    let mut entry = Value::dict();
                    entry.insert("length", Value::Integer(file.length as i64));
                    entry.insert(
                        "path",
                        Value::List(file.path.iter().map(Value::string).collect()),
                    );
                    entry
                })
                .collect();
            info.insert("files", Value::List(files));
        }

        if self.private {
            info.insert("private", Value::Integer(1));
        }
        if let Some(source) = &self.source {
            info.insert("source", Value::string(source));
        }

        info
    }

    /// Builds the full torrent dictionary.
    pub fn to_value(&self) -> Value {
        let mut root = Value::dict();
        root.insert("info", self.info_value());

        if let Some(primary) = self.announce.first() {
            root.insert("announce", Value::string(primary));
        }
        if self.announce.len() > 1 {
            let tiers = self
                .announce
                .iter()
                .map(|url| Value::List(vec![Value::string(url)]))
                .collect();
            root.insert("announce-list", Value::List(tiers));
        }
        if let Some(comment) = &self.comment {
            root.insert("comment", Value::string(comment));
        }
        if let Some(created_by) = &self.created_by {
            root.insert("created by", Value::string(created_by));
        }
        if let Some(date) = self.creation_date {
            root.insert("creation date", Value::Integer(date));
        }

        root
    }

    pub fn encode(&self) -> Vec<u8> {
        self.to_value().encode()
    }

    pub fn info_hash(&self) -> InfoHash {
        InfoHash::new(Sha1::digest(self.info_value().encode()).into())
    }

    pub fn piece_count(&self) -> usize {
        self.piece_hashes.len()
    }

    pub fn last_piece_length(&self) -> u64 {
        last_piece_length(self.total_length, self.piece_length)
    }
}

/// Key facts read back from encoded torrent bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentSummary {
    pub name: String,
    pub info_hash: InfoHash,
    pub piece_length: u64,
    pub piece_count: usize,
    pub total_length: u64,
    pub announce: Option<String>,
    pub source: Option<String>,
    pub private: bool,
}

impl TorrentSummary {
    /// Parses torrent bytes. The infohash covers the raw `info` span as written.
    ///
    /// # Errors
    ///
    /// - `BencodeError::Parse` - If the bytes are not bencode
    /// - `BencodeError::Field` - If a required info field is missing or malformed
    pub fn parse(data: &[u8]) -> Result<Self, BencodeError> {
        let root = Value::decode(data)?;
        let span = bencode::info_dict_span(data)?;
        let info_hash = InfoHash::new(Sha1::digest(&data[span]).into());

        let info = root.get("info").ok_or_else(|| field("info"))?;
        let name = info
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| field("info.name"))?
            .to_string();
        let piece_length = info
            .get("piece length")
            .and_then(Value::as_integer)
            .filter(|&length| length > 0)
            .ok_or_else(|| field("info.piece length"))? as u64;
        let pieces = info
            .get("pieces")
            .and_then(Value::as_bytes)
            .filter(|pieces| pieces.len() % 20 == 0)
            .ok_or_else(|| field("info.pieces"))?;

        let total_length = match info.get("length").and_then(Value::as_integer) {
            Some(length) => length as u64,
            None => info
                .get("files")
                .and_then(Value::as_list)
                .ok_or_else(|| field("info.files"))?
                .iter()
                .map(|file| {
                    file.get("length")
                        .and_then(Value::as_integer)
                        .map(|length| length as u64)
                        .ok_or_else(|| field("info.files.length"))
                })
                .sum::<Result<u64, BencodeError>>()?,
        };

        Ok(Self {
            name,
            info_hash,
            piece_length,
            piece_count: pieces.len() / 20,
            total_length,
            announce: root.get("announce").and_then(Value::as_str).map(str::to_string),
            source: info.get("source").and_then(Value::as_str).map(str::to_string),
            private: info.get("private").and_then(Value::as_integer) == Some(1),
        })
    }
}

fn field(name: &str) -> BencodeError {
    BencodeError::Field {
        field: name.to_string(),
    }
}
