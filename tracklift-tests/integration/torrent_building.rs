//! Torrent construction from files on disk
//!
//! Covers determinism, piece arithmetic, worker-count independence and the
//! re-stamping path used before uploads.

use std::sync::Arc;

use proptest::prelude::*;
use tempfile::TempDir;
use tracklift_core::CancelSignal;
use tracklift_core::config::TrackliftConfig;
use tracklift_core::torrent::hashing::{hash_parallel, hash_sequential};
use tracklift_core::torrent::{
    BuildError, BuildOptions, ChunkPlan, FileEntry, PieceLengthPolicy, TorrentBuilder,
    TorrentSummary, last_piece_length, piece_count, retarget, write_torrent,
};

use super::support::{ANNOUNCE, release_files};

fn options(name: &str) -> BuildOptions {
    BuildOptions {
        name: Some(name.to_string()),
        announce: vec![ANNOUNCE.to_string()],
        private: true,
        ..BuildOptions::default()
    }
}

async fn write_release(dir: &TempDir) {
    let album = dir.path().join("Long Player");
    tokio::fs::create_dir_all(album.join("Extras")).await.unwrap();
    for track in 1..=3u8 {
        let data = vec![track; 40_000 + track as usize * 1_000];
        tokio::fs::write(album.join(format!("{track:02} - Song.flac")), data)
            .await
            .unwrap();
    }
    tokio::fs::write(album.join("Extras/rip.log"), b"EAC extraction log")
        .await
        .unwrap();
    tokio::fs::write(album.join(".DS_Store"), b"junk").await.unwrap();
    tokio::fs::create_dir_all(album.join(".AppleDouble")).await.unwrap();
    tokio::fs::write(album.join(".AppleDouble/01 - Song.flac"), b"resource fork")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_directory_build_is_deterministic() {
    let dir = TempDir::new().unwrap();
    write_release(&dir).await;
    let root = dir.path().join("Long Player");

    let first = TorrentBuilder::build_directory(&root, options("Long Player"))
        .await
        .unwrap();
    let second = TorrentBuilder::build_directory(&root, options("Long Player"))
        .await
        .unwrap();

    assert_eq!(first.bytes, second.bytes);
    assert_eq!(first.info_hash, second.info_hash);

    let paths: Vec<String> = first
        .metainfo
        .files
        .iter()
        .map(|file| file.path.join("/"))
        .collect();
    assert_eq!(
        paths,
        vec![
            "01 - Song.flac",
            "02 - Song.flac",
            "03 - Song.flac",
            "Extras/rip.log"
        ]
    );
}

#[tokio::test]
async fn test_disk_and_memory_sources_agree() {
    let dir = TempDir::new().unwrap();
    let mut memory = Vec::new();
    let mut disk = Vec::new();
    for track in 1..=3u8 {
        let name = format!("{track:02} - Song.flac");
        let data: Vec<u8> = (0..30_001u32).map(|i| (i % 13) as u8 + track).collect();
        let path = dir.path().join(&name);
        tokio::fs::write(&path, &data).await.unwrap();

        disk.push(FileEntry::from_disk(vec![name.clone()], &path).await.unwrap());
        memory.push(FileEntry::from_bytes(vec![name], data));
    }

    let from_memory = TorrentBuilder::build(memory, options("Mixed")).await.unwrap();
    let from_disk = TorrentBuilder::build(disk, options("Mixed")).await.unwrap();

    assert_eq!(from_memory.bytes, from_disk.bytes);
}

#[tokio::test]
async fn test_fifteen_megabyte_release_piece_count() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("side-a.flac");
    tokio::fs::write(&path, vec![0xa5u8; 15_000_000]).await.unwrap();

    let entry = FileEntry::from_disk(vec!["side-a.flac".to_string()], &path)
        .await
        .unwrap();
    let built = TorrentBuilder::build(
        vec![entry],
        BuildOptions {
            name: None,
            piece_length: PieceLengthPolicy::Fixed(262_144),
            ..options("unused")
        },
    )
    .await
    .unwrap();

    assert_eq!(built.metainfo.name, "side-a.flac");
    assert_eq!(built.metainfo.piece_count(), 58);
    assert_eq!(built.metainfo.last_piece_length(), 15_000_000 - 57 * 262_144);
    assert_eq!(built.metainfo.piece_hashes.len(), 58);
}

#[tokio::test]
async fn test_parallel_hashing_matches_sequential() {
    let files = release_files();
    let plan = ChunkPlan::new(&files, 16 * 1024);
    let cancel = CancelSignal::new();

    let sequential = hash_sequential(&files, &plan, &cancel).unwrap();
    let files: Arc<[FileEntry]> = files.into();
    let plan = Arc::new(plan);
    for workers in [1, 2, 3, 8] {
        let parallel = hash_parallel(Arc::clone(&files), Arc::clone(&plan), workers, cancel.clone())
            .await
            .unwrap();
        assert_eq!(parallel, sequential, "workers = {workers}");
    }
}

#[tokio::test]
async fn test_missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("present.flac");
    tokio::fs::write(&path, vec![1u8; 1000]).await.unwrap();
    let entry = FileEntry::from_disk(vec!["present.flac".to_string()], &path)
        .await
        .unwrap();
    tokio::fs::remove_file(&path).await.unwrap();

    let result = TorrentBuilder::build(vec![entry], options("gone")).await;
    assert!(matches!(result, Err(BuildError::Io { .. })));
}

#[tokio::test]
async fn test_release_built_with_configured_defaults() {
    let dir = TempDir::new().unwrap();
    write_release(&dir).await;
    let mut config = TrackliftConfig::for_testing();
    config.torrent.comment = Some("Ripped with EAC".to_string());
    config.torrent.created_by = Some("tracklift/integration".to_string());

    let built = TorrentBuilder::build_release(&dir.path().join("Long Player"), &config.torrent, ANNOUNCE)
        .await
        .unwrap();

    assert_eq!(built.metainfo.name, "Long Player");
    assert_eq!(built.metainfo.created_by.as_deref(), Some("tracklift/integration"));
    assert_eq!(built.metainfo.comment.as_deref(), Some("Ripped with EAC"));
    assert!(built.metainfo.private);
    assert_eq!(built.metainfo.announce, vec![ANNOUNCE.to_string()]);
    assert_eq!(built.metainfo.files.len(), 4);
}

#[tokio::test]
async fn test_build_cancelled_while_hashing() {
    for workers in [1, 4] {
        let files = vec![FileEntry::from_bytes(vec!["long.flac".to_string()], vec![7u8; 128 << 20])];
        let cancel = CancelSignal::new();
        let options = BuildOptions {
            piece_length: PieceLengthPolicy::Fixed(16 * 1024),
            hash_workers: Some(workers),
            cancel: cancel.clone(),
            ..options("Long Player")
        };

        let build = tokio::spawn(TorrentBuilder::build(files, options));
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        cancel.cancel();

        let result = build.await.unwrap();
        assert!(matches!(result, Err(BuildError::Cancelled)), "workers = {workers}");
    }
}

#[tokio::test]
async fn test_retarget_and_write_per_tracker_copy() {
    let built = TorrentBuilder::build(release_files(), options("The Artist - Long Player"))
        .await
        .unwrap();

    let (stamped, summary) =
        retarget(&built.bytes, "https://yus.example/announce/pk", Some("YUS")).unwrap();
    assert_ne!(summary.info_hash, built.info_hash);
    assert_eq!(summary.source.as_deref(), Some("YUS"));
    assert_eq!(summary.piece_count, built.metainfo.piece_count());

    let dir = TempDir::new().unwrap();
    let path = write_torrent(dir.path(), "The Artist - Long Player", Some("YUS"), &stamped)
        .await
        .unwrap();
    assert_eq!(
        path.file_name().unwrap().to_str().unwrap(),
        "The Artist - Long Player [YUS].torrent"
    );

    let on_disk = tokio::fs::read(&path).await.unwrap();
    let reread = TorrentSummary::parse(&on_disk).unwrap();
    assert_eq!(reread.info_hash, summary.info_hash);
    assert_eq!(reread.announce.as_deref(), Some("https://yus.example/announce/pk"));
}

proptest! {
    #[test]
    fn prop_piece_arithmetic(total in 1u64..50_000_000, exponent in 14u32..24) {
        let piece_length = 1u64 << exponent;
        let count = piece_count(total, piece_length) as u64;
        let last = last_piece_length(total, piece_length);

        prop_assert!(last > 0 && last <= piece_length);
        prop_assert_eq!((count - 1) * piece_length + last, total);
    }

    #[test]
    fn prop_auto_piece_length_bounds(total in 1u64..200_000_000_000) {
        let length = PieceLengthPolicy::default().resolve(total).unwrap();
        prop_assert!(length.is_power_of_two());
        prop_assert!((16 * 1024..=16 * 1024 * 1024).contains(&length));
        if length < 16 * 1024 * 1024 {
            prop_assert!(piece_count(total, length) <= 2048);
        }
    }
}
