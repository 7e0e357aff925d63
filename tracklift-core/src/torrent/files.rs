//! Release file entries and directory scanning

use std::path::{Path, PathBuf};

use bytes::Bytes;

use super::BuildError;

/// Where the bytes of a file entry come from.
#[derive(Debug, Clone, PartialEq)]
pub enum FileSource {
    /// File on disk, read at hashing time
    Disk(PathBuf),
    /// In-memory contents
    Memory(Bytes),
}

/// One file of a release, in torrent layout order.
#[derive(Debug, Clone, PartialEq)]
pub struct FileEntry {
    /// Path components relative to the torrent root
    pub path: Vec<String>,
    pub length: u64,
    pub source: FileSource,
}

impl FileEntry {
    /// Creates an entry backed by a file on disk, reading its length.
    ///
    /// # Errors
    /// - `BuildError::Io` - File metadata could not be read
    pub async fn from_disk(
        relative_path: Vec<String>,
        disk_path: impl Into<PathBuf>,
    ) -> Result<Self, BuildError> {
        let disk_path = disk_path.into();
        let metadata = tokio::fs::metadata(&disk_path)
            .await
            .map_err(|e| BuildError::io(&disk_path, e))?;

        Ok(Self {
            path: relative_path,
            length: metadata.len(),
            source: FileSource::Disk(disk_path),
        })
    }

    /// Creates an entry from in-memory bytes.
    pub fn from_bytes(relative_path: Vec<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            path: relative_path,
            length: data.len() as u64,
            source: FileSource::Memory(data),
        }
    }

    /// Returns the slash-joined relative path for display.
    pub fn display_path(&self) -> String {
        self.path.join("/")
    }

    /// Collects all files under `root` using iterative depth-first traversal.
    ///
    /// Hidden (`.`) and editor temp (`~`) files are skipped. Entries are
    /// sorted by path components so the layout does not depend on the
    /// order the filesystem returns directory entries.
    ///
    /// # Errors
    /// - `BuildError::Io` - Directory read error
    /// - `BuildError::EmptyInput` - Directory contains no files
    pub async fn scan_directory(root: &Path) -> Result<Vec<FileEntry>, BuildError> {
        let mut files = Vec::new();
        let mut dirs_to_process = vec![root.to_path_buf()];

        while let Some(current_dir) = dirs_to_process.pop() {
            let mut entries = tokio::fs::read_dir(&current_dir)
                .await
                .map_err(|e| BuildError::io(&current_dir, e))?;

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| BuildError::io(&current_dir, e))?
            {
                let path = entry.path();
                // Hidden and temporary entries are skipped, directories included.
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if name.starts_with('.') || name.starts_with('~') {
                    continue;
                }

                let metadata = entry
                    .metadata()
                    .await
                    .map_err(|e| BuildError::io(&path, e))?;

                if metadata.is_dir() {
                    dirs_to_process.push(path);
                    continue;
                }

                if !metadata.is_file() {
                    continue;
                }

                let relative_path =
                    path.strip_prefix(root)
                        .map_err(|_| BuildError::InvalidInput {
                            reason: format!("{} is outside {}", path.display(), root.display()),
                        })?;

                let components: Vec<String> = relative_path
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().to_string())
                    .collect();

                files.push(FileEntry {
                    path: components,
                    length: metadata.len(),
                    source: FileSource::Disk(path),
                });
            }
        }

        if files.is_empty() {
            return Err(BuildError::EmptyInput {
                reason: format!("{} contains no files", root.display()),
            });
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scan_directory_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("CD2")).unwrap();
        std::fs::write(dir.path().join("02 - B.flac"), b"bb").unwrap();
        std::fs::write(dir.path().join("01 - A.flac"), b"a").unwrap();
        std::fs::write(dir.path().join("CD2").join("01 - C.flac"), b"ccc").unwrap();
        std::fs::write(dir.path().join(".DS_Store"), b"junk").unwrap();
        std::fs::write(dir.path().join("~lock"), b"junk").unwrap();

        let files = FileEntry::scan_directory(dir.path()).await.unwrap();
        let paths: Vec<String> = files.iter().map(FileEntry::display_path).collect();

        assert_eq!(paths, vec!["01 - A.flac", "02 - B.flac", "CD2/01 - C.flac"]);
        assert_eq!(files[2].length, 3);
    }

    #[tokio::test]
    async fn test_scan_skips_hidden_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git/objects")).unwrap();
        std::fs::create_dir_all(dir.path().join("~partial")).unwrap();
        std::fs::write(dir.path().join(".git/config"), b"[core]").unwrap();
        std::fs::write(dir.path().join(".git/objects/ab"), b"blob").unwrap();
        std::fs::write(dir.path().join("~partial/01.flac"), b"half").unwrap();
        std::fs::write(dir.path().join("01 - A.flac"), b"a").unwrap();

        let files = FileEntry::scan_directory(dir.path()).await.unwrap();
        let paths: Vec<String> = files.iter().map(FileEntry::display_path).collect();
        assert_eq!(paths, vec!["01 - A.flac"]);
    }

    #[tokio::test]
    async fn test_scan_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileEntry::scan_directory(dir.path()).await;
        assert!(matches!(result, Err(BuildError::EmptyInput { .. })));
    }

    #[tokio::test]
    async fn test_from_disk_missing_file() {
        let result = FileEntry::from_disk(
            vec!["missing.flac".to_string()],
            "/nonexistent/missing.flac",
        )
        .await;
        assert!(matches!(result, Err(BuildError::Io { .. })));
    }

    #[test]
    fn test_from_bytes_length() {
        let entry = FileEntry::from_bytes(vec!["a".to_string(), "b.log".to_string()], vec![1u8; 10]);
        assert_eq!(entry.length, 10);
        assert_eq!(entry.display_path(), "a/b.log");
    }
}
