//! Torrent creation from ordered file entries
//!
//! Produces byte-for-byte reproducible metainfo: the piece length is derived
//! only from the inputs, dictionary keys are emitted canonically and the
//! creation date is written only when explicitly supplied.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;

use super::files::FileEntry;
use super::hashing::{self, ChunkPlan};
use super::metainfo::{TorrentFile, TorrentMetainfo};
use super::{BuildError, InfoHash};
use crate::cancel::CancelSignal;
use crate::config::TorrentConfig;

/// Smallest piece length chosen automatically (16 KiB)
pub const MIN_AUTO_PIECE_LENGTH: u64 = 16 * 1024;

/// Largest piece length chosen automatically (16 MiB)
pub const MAX_AUTO_PIECE_LENGTH: u64 = 16 * 1024 * 1024;

/// Piece count the automatic policy aims to stay under
pub const DEFAULT_MAX_PIECES: u64 = 2048;

/// How the piece length is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceLengthPolicy {
    /// Smallest power of two in `[min, max]` giving at most `max_pieces` pieces
    Auto { min: u64, max: u64, max_pieces: u64 },
    /// Exact piece length; must be a power of two within
    /// `[MIN_AUTO_PIECE_LENGTH, MAX_AUTO_PIECE_LENGTH]`
    Fixed(u64),
}

impl Default for PieceLengthPolicy {
    fn default() -> Self {
        Self::Auto {
            min: MIN_AUTO_PIECE_LENGTH,
            max: MAX_AUTO_PIECE_LENGTH,
            max_pieces: DEFAULT_MAX_PIECES,
        }
    }
}

impl PieceLengthPolicy {
    /// Resolves the piece length for a stream of `total_length` bytes.
    ///
    /// # Errors
    /// - `BuildError::InvalidPieceLength` - Fixed length or bounds are not
    ///   powers of two, or fall outside the supported range
    pub fn resolve(&self, total_length: u64) -> Result<u64, BuildError> {
        match *self {
            Self::Fixed(length) => check_piece_length(length),
            Self::Auto {
                min,
                max,
                max_pieces,
            } => {
                check_piece_length(min)?;
                check_piece_length(max)?;
                if min > max {
                    return Err(BuildError::InvalidPieceLength { length: min });
                }

                let max_pieces = max_pieces.max(1);
                let mut length = min;
                while length < max && total_length.div_ceil(length) > max_pieces {
                    length *= 2;
                }
                Ok(length)
            }
        }
    }
}

fn check_piece_length(length: u64) -> Result<u64, BuildError> {
    if length.is_power_of_two() && (MIN_AUTO_PIECE_LENGTH..=MAX_AUTO_PIECE_LENGTH).contains(&length) {
        Ok(length)
    } else {
        Err(BuildError::InvalidPieceLength { length })
    }
}

/// Options controlling a single build.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Torrent name; defaults to the file name for single-file builds
    pub name: Option<String>,
    pub piece_length: PieceLengthPolicy,
    /// Announce URLs; the first becomes `announce`
    pub announce: Vec<String>,
    pub private: bool,
    pub source: Option<String>,
    pub comment: Option<String>,
    pub created_by: Option<String>,
    /// Unix timestamp; omitted from the output when `None`
    pub creation_date: Option<i64>,
    /// Hashing worker count; `None` uses available parallelism
    pub hash_workers: Option<usize>,
    pub cancel: CancelSignal,
}

impl BuildOptions {
    /// Creates options for `announce` using defaults from `config`.
    pub fn from_config(config: &TorrentConfig, announce: impl Into<String>) -> Self {
        Self {
            piece_length: config.piece_length,
            announce: vec![announce.into()],
            private: config.private,
            comment: config.comment.clone(),
            created_by: config.created_by.clone(),
            hash_workers: Some(config.hash_workers),
            ..Self::default()
        }
    }

    /// Stamps the current time as the creation date.
    ///
    /// The date lives outside the info dictionary, so the infohash is
    /// unaffected, but the output bytes stop being reproducible.
    pub fn stamped_now(mut self) -> Self {
        self.creation_date = Some(chrono::Utc::now().timestamp());
        self
    }
}

/// Result of a successful build.
#[derive(Debug, Clone)]
pub struct BuiltTorrent {
    /// Bencoded torrent file
    pub bytes: Bytes,
    pub info_hash: InfoHash,
    pub metainfo: TorrentMetainfo,
}

/// Builds deterministic torrents from file entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct TorrentBuilder;

impl TorrentBuilder {
    /// Hashes `files` and produces the encoded torrent.
    ///
    /// Files form one concatenated stream in the given order. The same inputs
    /// always produce identical bytes and infohash.
    ///
    /// # Errors
    /// - `BuildError::EmptyInput` - No files, or a zero-length file
    /// - `BuildError::InvalidInput` - Missing announce URL or unresolvable name
    /// - `BuildError::InvalidPieceLength` - Piece length is not a power of two
    /// - `BuildError::Io` - A file could not be read in full
    /// - `BuildError::Cancelled` - Cancellation observed between chunks
    pub async fn build(
        files: Vec<FileEntry>,
        options: BuildOptions,
    ) -> Result<BuiltTorrent, BuildError> {
        let started = Instant::now();
        validate_files(&files)?;

        if options.announce.is_empty() {
            return Err(BuildError::InvalidInput {
                reason: "at least one announce URL is required".to_string(),
            });
        }
        for announce in &options.announce {
            url::Url::parse(announce).map_err(|e| BuildError::InvalidInput {
                reason: format!("invalid announce URL {announce}: {e}"),
            })?;
        }

        let single_file = files.len() == 1 && files[0].path.len() == 1;
        let name = resolve_name(&files, options.name.as_deref(), single_file)?;

        let total_length: u64 = files.iter().map(|file| file.length).sum();
        let piece_length = options.piece_length.resolve(total_length)?;
        let plan = ChunkPlan::new(&files, piece_length);
        let workers = options.hash_workers.unwrap_or_else(num_cpus::get).max(1);

        tracing::debug!(
            "Building torrent '{}': {} files, {} bytes, {} pieces of {} bytes, {} hashing workers",
            name,
            files.len(),
            total_length,
            plan.len(),
            piece_length,
            workers
        );

        let torrent_files: Vec<TorrentFile> = files
            .iter()
            .map(|file| TorrentFile {
                path: file.path.clone(),
                length: file.length,
            })
            .collect();

        let piece_hashes = if workers == 1 {
            let cancel = options.cancel.clone();
            tokio::task::spawn_blocking(move || hashing::hash_sequential(&files, &plan, &cancel))
                .await
                .map_err(|e| BuildError::Worker {
                    reason: e.to_string(),
                })??
        } else {
            hashing::hash_parallel(files.into(), Arc::new(plan), workers, options.cancel.clone())
                .await?
        };

        let metainfo = TorrentMetainfo {
            name,
            piece_length,
            piece_hashes,
            files: torrent_files,
            total_length,
            announce: options.announce,
            private: options.private,
            source: options.source,
            comment: options.comment,
            created_by: options.created_by,
            creation_date: options.creation_date,
            single_file,
        };

        let bytes = Bytes::from(metainfo.encode());
        let info_hash = metainfo.info_hash();

        tracing::info!(
            "Built torrent '{}' ({}) in {:?}",
            metainfo.name,
            info_hash,
            started.elapsed()
        );

        Ok(BuiltTorrent {
            bytes,
            info_hash,
            metainfo,
        })
    }

    /// Scans `root` and builds a torrent named after the directory.
    ///
    /// # Errors
    /// Same as [`TorrentBuilder::build`], plus directory read failures.
    pub async fn build_directory(
        root: &std::path::Path,
        mut options: BuildOptions,
    ) -> Result<BuiltTorrent, BuildError> {
        let files = FileEntry::scan_directory(root).await?;
        if options.name.is_none() {
            options.name = root
                .file_name()
                .and_then(|name| name.to_str())
                .map(str::to_string);
        }
        Self::build(files, options).await
    }

    /// Builds `root` for `announce` with the configured torrent defaults.
    ///
    /// # Errors
    /// Same as [`TorrentBuilder::build_directory`].
    pub async fn build_release(
        root: &std::path::Path,
        config: &TorrentConfig,
        announce: impl Into<String>,
    ) -> Result<BuiltTorrent, BuildError> {
        Self::build_directory(root, BuildOptions::from_config(config, announce)).await
    }
}

fn validate_files(files: &[FileEntry]) -> Result<(), BuildError> {
    if files.is_empty() {
        return Err(BuildError::EmptyInput {
            reason: "no files supplied".to_string(),
        });
    }

    for file in files {
        if file.length == 0 {
            return Err(BuildError::EmptyInput {
                reason: format!("{} is empty", file.display_path()),
            });
        }
        if file.path.is_empty() || file.path.iter().any(|component| component.is_empty()) {
            return Err(BuildError::InvalidInput {
                reason: format!("invalid file path '{}'", file.display_path()),
            });
        }
    }

    Ok(())
}

fn resolve_name(
    files: &[FileEntry],
    name: Option<&str>,
    single_file: bool,
) -> Result<String, BuildError> {
    if let Some(name) = name.map(str::trim)
        && !name.is_empty()
    {
        return Ok(name.to_string());
    }

    if single_file && let Some(file_name) = files[0].path.first() {
        return Ok(file_name.clone());
    }

    Err(BuildError::InvalidInput {
        reason: "multi-file torrents require a name".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::torrent::metainfo::TorrentSummary;

    const ANNOUNCE: &str = "https://tracker.example/announce/abc";

    fn options() -> BuildOptions {
        BuildOptions {
            name: Some("Artist - Album (2020) FLAC".to_string()),
            announce: vec![ANNOUNCE.to_string()],
            private: true,
            ..BuildOptions::default()
        }
    }

    fn release_files() -> Vec<FileEntry> {
        (0..4)
            .map(|index| {
                let data: Vec<u8> = (0..50_000u32).map(|i| (i as u8).wrapping_mul(index + 3)).collect();
                FileEntry::from_bytes(vec![format!("{:02} - Track.flac", index + 1)], data)
            })
            .collect()
    }

    #[test]
    fn test_auto_piece_length() {
        let policy = PieceLengthPolicy::default();
        assert_eq!(policy.resolve(1000).unwrap(), MIN_AUTO_PIECE_LENGTH);
        assert_eq!(policy.resolve(2048 * 16 * 1024).unwrap(), 16 * 1024);
        assert_eq!(policy.resolve(2048 * 16 * 1024 + 1).unwrap(), 32 * 1024);
        assert_eq!(policy.resolve(u64::MAX / 2).unwrap(), MAX_AUTO_PIECE_LENGTH);
    }

    #[test]
    fn test_fixed_piece_length_must_be_power_of_two() {
        assert_eq!(PieceLengthPolicy::Fixed(262_144).resolve(10).unwrap(), 262_144);
        assert!(matches!(
            PieceLengthPolicy::Fixed(300_000).resolve(10),
            Err(BuildError::InvalidPieceLength { length: 300_000 })
        ));
        assert!(matches!(
            PieceLengthPolicy::Fixed(0).resolve(10),
            Err(BuildError::InvalidPieceLength { length: 0 })
        ));
    }

    #[test]
    fn test_piece_length_outside_range_rejected() {
        for length in [8 * 1024, 32 * 1024 * 1024, 1 << 45, 1 << 63] {
            assert!(matches!(
                PieceLengthPolicy::Fixed(length).resolve(10),
                Err(BuildError::InvalidPieceLength { length: l }) if l == length
            ));
        }
        assert_eq!(
            PieceLengthPolicy::Fixed(MAX_AUTO_PIECE_LENGTH).resolve(10).unwrap(),
            MAX_AUTO_PIECE_LENGTH
        );

        let policy = PieceLengthPolicy::Auto {
            min: MIN_AUTO_PIECE_LENGTH,
            max: 1 << 40,
            max_pieces: DEFAULT_MAX_PIECES,
        };
        assert!(matches!(
            policy.resolve(10),
            Err(BuildError::InvalidPieceLength { length }) if length == 1 << 40
        ));
    }

    #[tokio::test]
    async fn test_config_defaults_reach_torrent() {
        let config = TorrentConfig {
            piece_length: PieceLengthPolicy::Fixed(32 * 1024),
            hash_workers: 3,
            created_by: Some("tracklift/test".to_string()),
            comment: Some("EAC rip".to_string()),
            private: false,
        };

        let options = BuildOptions::from_config(&config, ANNOUNCE);
        assert_eq!(options.hash_workers, Some(3));
        assert_eq!(options.announce, vec![ANNOUNCE.to_string()]);

        let built = TorrentBuilder::build(
            release_files(),
            BuildOptions {
                name: Some("Release".to_string()),
                ..options
            },
        )
        .await
        .unwrap();

        assert_eq!(built.metainfo.piece_length, 32 * 1024);
        assert_eq!(built.metainfo.created_by.as_deref(), Some("tracklift/test"));
        assert_eq!(built.metainfo.comment.as_deref(), Some("EAC rip"));
        assert!(!built.metainfo.private);
        assert!(contains(&built.bytes, b"10:created by14:tracklift/test"));
        assert!(!contains(&built.bytes, b"7:privatei1e"));
    }

    #[tokio::test]
    async fn test_oversized_fixed_piece_length_fails_build() {
        let result = TorrentBuilder::build(
            vec![FileEntry::from_bytes(vec!["tiny.flac".to_string()], vec![0u8; 10])],
            BuildOptions {
                piece_length: PieceLengthPolicy::Fixed(1 << 45),
                ..options()
            },
        )
        .await;
        assert!(matches!(result, Err(BuildError::InvalidPieceLength { .. })));
    }

    #[tokio::test]
    async fn test_build_piece_arithmetic() {
        let data = vec![0x5au8; 15_000_000];
        let files = vec![FileEntry::from_bytes(vec!["mix.flac".to_string()], data)];
        let built = TorrentBuilder::build(
            files,
            BuildOptions {
                piece_length: PieceLengthPolicy::Fixed(262_144),
                ..options()
            },
        )
        .await
        .unwrap();

        assert_eq!(built.metainfo.piece_count(), 58);
        assert_eq!(built.metainfo.last_piece_length(), 15_000_000 - 57 * 262_144);
    }

    #[tokio::test]
    async fn test_build_is_deterministic() {
        let first = TorrentBuilder::build(release_files(), options()).await.unwrap();
        let second = TorrentBuilder::build(release_files(), options()).await.unwrap();

        assert_eq!(first.bytes, second.bytes);
        assert_eq!(first.info_hash, second.info_hash);
    }

    #[tokio::test]
    async fn test_worker_count_does_not_change_output() {
        let sequential = TorrentBuilder::build(
            release_files(),
            BuildOptions {
                hash_workers: Some(1),
                piece_length: PieceLengthPolicy::Fixed(16 * 1024),
                ..options()
            },
        )
        .await
        .unwrap();
        let parallel = TorrentBuilder::build(
            release_files(),
            BuildOptions {
                hash_workers: Some(6),
                piece_length: PieceLengthPolicy::Fixed(16 * 1024),
                ..options()
            },
        )
        .await
        .unwrap();

        assert_eq!(sequential.bytes, parallel.bytes);
    }

    #[tokio::test]
    async fn test_info_hash_matches_encoded_bytes() {
        let built = TorrentBuilder::build(release_files(), options()).await.unwrap();
        let summary = TorrentSummary::parse(&built.bytes).unwrap();

        assert_eq!(summary.info_hash, built.info_hash);
        assert_eq!(summary.name, "Artist - Album (2020) FLAC");
        assert_eq!(summary.total_length, 200_000);
        assert!(summary.private);
    }

    #[tokio::test]
    async fn test_creation_date_only_when_supplied() {
        let without = TorrentBuilder::build(release_files(), options()).await.unwrap();
        assert!(!contains(&without.bytes, b"13:creation date"));

        let with = TorrentBuilder::build(
            release_files(),
            BuildOptions {
                creation_date: Some(1_700_000_000),
                ..options()
            },
        )
        .await
        .unwrap();
        assert!(contains(&with.bytes, b"13:creation datei1700000000e"));
        assert_eq!(with.info_hash, without.info_hash);

        let stamped = options().stamped_now();
        assert!(stamped.creation_date.is_some_and(|date| date > 1_700_000_000));
    }

    #[tokio::test]
    async fn test_source_changes_info_hash() {
        let plain = TorrentBuilder::build(release_files(), options()).await.unwrap();
        let sourced = TorrentBuilder::build(
            release_files(),
            BuildOptions {
                source: Some("YUS".to_string()),
                ..options()
            },
        )
        .await
        .unwrap();

        assert_ne!(plain.info_hash, sourced.info_hash);
    }

    #[tokio::test]
    async fn test_empty_inputs_rejected() {
        let result = TorrentBuilder::build(Vec::new(), options()).await;
        assert!(matches!(result, Err(BuildError::EmptyInput { .. })));

        let files = vec![
            FileEntry::from_bytes(vec!["a.flac".to_string()], vec![1u8; 10]),
            FileEntry::from_bytes(vec!["b.flac".to_string()], Vec::<u8>::new()),
        ];
        let result = TorrentBuilder::build(files, options()).await;
        assert!(matches!(result, Err(BuildError::EmptyInput { .. })));
    }

    #[tokio::test]
    async fn test_missing_announce_rejected() {
        let result = TorrentBuilder::build(
            release_files(),
            BuildOptions {
                announce: Vec::new(),
                ..options()
            },
        )
        .await;
        assert!(matches!(result, Err(BuildError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn test_single_file_name_defaults_to_file_name() {
        let files = vec![FileEntry::from_bytes(vec!["single.flac".to_string()], vec![7u8; 100])];
        let built = TorrentBuilder::build(
            files,
            BuildOptions {
                name: None,
                ..options()
            },
        )
        .await
        .unwrap();

        assert_eq!(built.metainfo.name, "single.flac");
        assert!(contains(&built.bytes, b"6:lengthi100e"));
    }

    #[tokio::test]
    async fn test_multi_file_requires_name() {
        let result = TorrentBuilder::build(
            release_files(),
            BuildOptions {
                name: None,
                ..options()
            },
        )
        .await;
        assert!(matches!(result, Err(BuildError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn test_cancelled_build() {
        let cancel = CancelSignal::new();
        cancel.cancel();
        let result = TorrentBuilder::build(
            release_files(),
            BuildOptions {
                cancel,
                ..options()
            },
        )
        .await;
        assert!(matches!(result, Err(BuildError::Cancelled)));
    }

    #[tokio::test]
    async fn test_build_directory_uses_directory_name() {
        let root = tempfile::tempdir().unwrap();
        let release = root.path().join("Some Release");
        std::fs::create_dir(&release).unwrap();
        std::fs::write(release.join("01.flac"), vec![1u8; 40_000]).unwrap();
        std::fs::write(release.join("cover.jpg"), vec![2u8; 3_000]).unwrap();

        let built = TorrentBuilder::build_directory(
            &release,
            BuildOptions {
                name: None,
                ..options()
            },
        )
        .await
        .unwrap();

        assert_eq!(built.metainfo.name, "Some Release");
        assert_eq!(built.metainfo.files.len(), 2);
        assert_eq!(built.metainfo.total_length, 43_000);
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|window| window == needle)
    }
}
