//! Piece hashing over the concatenated file stream
//!
//! Chunk boundaries are planned up front; each chunk maps to one or more file
//! segments. Chunks are then hashed either sequentially or by a bounded pool
//! of blocking workers that pull the next chunk index and store the digest in
//! a pre-allocated slot, so the output order never depends on completion order.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use sha1::{Digest, Sha1};

use super::files::{FileEntry, FileSource};
use super::BuildError;
use crate::cancel::CancelSignal;

/// SHA-1 digest of one piece.
pub type PieceHash = [u8; 20];

/// Part of a chunk that lives in a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Index into the file list
    pub file: usize,
    /// Byte offset within that file
    pub offset: u64,
    pub len: usize,
}

/// One piece of the stream and the file segments it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    pub index: usize,
    pub segments: Vec<Segment>,
}

impl ChunkSpan {
    pub fn len(&self) -> usize {
        self.segments.iter().map(|segment| segment.len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Precomputed chunk boundaries for a file list.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    piece_length: u64,
    total_length: u64,
    chunks: Vec<ChunkSpan>,
}

impl ChunkPlan {
    /// Splits the concatenated stream of `files` into `piece_length` chunks.
    pub fn new(files: &[FileEntry], piece_length: u64) -> Self {
        let total_length: u64 = files.iter().map(|file| file.length).sum();
        let mut chunks = Vec::new();
        let mut current = ChunkSpan {
            index: 0,
            segments: Vec::new(),
        };
        let mut filled = 0u64;

        for (file_index, file) in files.iter().enumerate() {
            let mut offset = 0u64;
            while offset < file.length {
                let take = (piece_length - filled).min(file.length - offset);
                current.segments.push(Segment {
                    file: file_index,
                    offset,
                    len: take as usize,
                });
                offset += take;
                filled += take;

                if filled == piece_length {
                    let next = ChunkSpan {
                        index: current.index + 1,
                        segments: Vec::new(),
                    };
                    chunks.push(std::mem::replace(&mut current, next));
                    filled = 0;
                }
            }
        }

        if filled > 0 {
            chunks.push(current);
        }

        Self {
            piece_length,
            total_length,
            chunks,
        }
    }

    pub fn piece_length(&self) -> u64 {
        self.piece_length
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    pub fn chunks(&self) -> &[ChunkSpan] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Per-worker reader keeping file handles open across chunks.
struct SourceReader<'a> {
    files: &'a [FileEntry],
    handles: HashMap<usize, File>,
    buffer: Vec<u8>,
}

impl<'a> SourceReader<'a> {
    fn new(files: &'a [FileEntry], plan: &ChunkPlan) -> Self {
        let capacity = plan.piece_length().min(plan.total_length());
        Self {
            files,
            handles: HashMap::new(),
            buffer: Vec::with_capacity(usize::try_from(capacity).unwrap_or(0)),
        }
    }

    /// Reads and hashes one chunk.
    fn hash_chunk(&mut self, chunk: &ChunkSpan) -> Result<PieceHash, BuildError> {
        self.buffer.clear();

        for segment in &chunk.segments {
            let entry = &self.files[segment.file];
            match &entry.source {
                FileSource::Memory(data) => {
                    let start = segment.offset as usize;
                    let end = start + segment.len;
                    let slice = data.get(start..end).ok_or_else(|| {
                        BuildError::io(
                            entry.display_path(),
                            std::io::Error::new(
                                std::io::ErrorKind::UnexpectedEof,
                                "in-memory file shorter than its declared length",
                            ),
                        )
                    })?;
                    self.buffer.extend_from_slice(slice);
                }
                FileSource::Disk(path) => {
                    let file = match self.handles.entry(segment.file) {
                        std::collections::hash_map::Entry::Occupied(slot) => slot.into_mut(),
                        std::collections::hash_map::Entry::Vacant(slot) => {
                            let file = File::open(path).map_err(|e| BuildError::io(path, e))?;
                            slot.insert(file)
                        }
                    };

                    let start = self.buffer.len();
                    self.buffer.resize(start + segment.len, 0);
                    file.seek(SeekFrom::Start(segment.offset))
                        .and_then(|_| file.read_exact(&mut self.buffer[start..]))
                        .map_err(|e| BuildError::io(path, e))?;
                }
            }
        }

        let mut hasher = Sha1::new();
        hasher.update(&self.buffer);
        Ok(hasher.finalize().into())
    }
}

/// Hashes every chunk on the calling thread.
///
/// # Errors
/// - `BuildError::Io` - A source file could not be read
/// - `BuildError::Cancelled` - The signal fired between chunks
pub fn hash_sequential(
    files: &[FileEntry],
    plan: &ChunkPlan,
    cancel: &CancelSignal,
) -> Result<Vec<PieceHash>, BuildError> {
    let mut reader = SourceReader::new(files, plan);
    let mut hashes = Vec::with_capacity(plan.len());

    for chunk in plan.chunks() {
        if cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }
        hashes.push(reader.hash_chunk(chunk)?);
    }

    Ok(hashes)
}

/// Hashes chunks on up to `workers` blocking threads.
///
/// Each worker claims the next unhashed chunk index and writes the digest
/// into that index's slot. The first failure stops all workers at their next
/// chunk boundary.
///
/// # Errors
/// - `BuildError::Io` - A source file could not be read
/// - `BuildError::Cancelled` - The signal fired between chunks
/// - `BuildError::Worker` - A worker thread panicked
pub async fn hash_parallel(
    files: Arc<[FileEntry]>,
    plan: Arc<ChunkPlan>,
    workers: usize,
    cancel: CancelSignal,
) -> Result<Vec<PieceHash>, BuildError> {
    let chunk_count = plan.len();
    let workers = workers.clamp(1, chunk_count.max(1));

    let slots: Arc<Mutex<Vec<Option<PieceHash>>>> = Arc::new(Mutex::new(vec![None; chunk_count]));
    let next_chunk = Arc::new(AtomicUsize::new(0));
    let abort = Arc::new(AtomicBool::new(false));

    tracing::debug!("Hashing {} pieces with {} workers", chunk_count, workers);

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..workers {
        let files = Arc::clone(&files);
        let plan = Arc::clone(&plan);
        let slots = Arc::clone(&slots);
        let next_chunk = Arc::clone(&next_chunk);
        let abort = Arc::clone(&abort);
        let cancel = cancel.clone();

        tasks.spawn_blocking(move || -> Result<(), BuildError> {
            let mut reader = SourceReader::new(&files, &plan);
            loop {
                if abort.load(Ordering::SeqCst) {
                    return Ok(());
                }
                if cancel.is_cancelled() {
                    abort.store(true, Ordering::SeqCst);
                    return Err(BuildError::Cancelled);
                }

                let index = next_chunk.fetch_add(1, Ordering::SeqCst);
                let Some(chunk) = plan.chunks().get(index) else {
                    return Ok(());
                };

                match reader.hash_chunk(chunk) {
                    Ok(hash) => slots.lock()[index] = Some(hash),
                    Err(e) => {
                        abort.store(true, Ordering::SeqCst);
                        return Err(e);
                    }
                }
            }
        });
    }

    let mut first_error: Option<BuildError> = None;
    while let Some(joined) = tasks.join_next().await {
        let outcome = joined.map_err(|e| BuildError::Worker {
            reason: e.to_string(),
        });
        let error = match outcome {
            Ok(Ok(())) => continue,
            Ok(Err(e)) | Err(e) => e,
        };

        // An I/O failure is more useful to the caller than the cancellation it triggered.
        match &first_error {
            None => first_error = Some(error),
            Some(BuildError::Cancelled) if !matches!(error, BuildError::Cancelled) => {
                first_error = Some(error)
            }
            Some(_) => {}
        }
    }

    if let Some(error) = first_error {
        return Err(error);
    }

    let slots = std::mem::take(&mut *slots.lock());
    slots
        .into_iter()
        .map(|slot| slot.ok_or(BuildError::Cancelled))
        .collect()
}
