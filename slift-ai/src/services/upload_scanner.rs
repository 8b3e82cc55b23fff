//! Upload-area scanner
//!
//! Discovers candidate audio objects dropped into the environment's upload
//! area. Extension filtering happens first (cheap), then magic-byte
//! verification (reliable); everything else is left where it is for the
//! ingest gates to judge or skip.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Upload scanner errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Cannot access file
    #[error("File access error {0}: {1}")]
    FileAccessError(PathBuf, String),
}

/// Upload-area scanner
pub struct UploadScanner {
    ignore_patterns: Vec<String>,
}

impl UploadScanner {
    /// Create a scanner with default ignore patterns for system litter
    pub fn new() -> Self {
        Self {
            ignore_patterns: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                ".git".to_string(),
                ".partial".to_string(),
                ".tmp".to_string(),
            ],
        }
    }

    /// Scan the upload area and return candidate keys relative to it
    pub fn scan(&self, upload_root: &Path) -> Result<Vec<String>, ScanError> {
        if !upload_root.exists() {
            return Err(ScanError::PathNotFound(upload_root.to_path_buf()));
        }
        if !upload_root.is_dir() {
            return Err(ScanError::NotADirectory(upload_root.to_path_buf()));
        }

        let mut symlink_visited = HashSet::new();
        let mut keys = Vec::new();

        let walker = WalkDir::new(upload_root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| self.should_process_entry(e, &mut symlink_visited));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Error accessing upload entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();

            match self.is_audio_file(path) {
                Ok(true) => {
                    if let Ok(relative) = path.strip_prefix(upload_root) {
                        let key = relative
                            .components()
                            .map(|c| c.as_os_str().to_string_lossy())
                            .collect::<Vec<_>>()
                            .join("/");
                        keys.push(key);
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("Error verifying {}: {}", path.display(), e);
                }
            }
        }

        keys.sort();
        tracing::debug!("Upload scan found {} candidate objects", keys.len());
        Ok(keys)
    }

    fn should_process_entry(
        &self,
        entry: &DirEntry,
        symlink_visited: &mut HashSet<PathBuf>,
    ) -> bool {
        let file_name = entry.file_name().to_string_lossy();

        for pattern in &self.ignore_patterns {
            if file_name.contains(pattern) {
                return false;
            }
        }

        if entry.file_type().is_symlink() {
            if let Ok(canonical) = entry.path().canonicalize() {
                if !symlink_visited.insert(canonical) {
                    tracing::warn!("Symlink loop detected: {}", entry.path().display());
                    return false;
                }
            }
        }

        true
    }

    fn is_audio_file(&self, path: &Path) -> Result<bool, ScanError> {
        let Some(ext) = path.extension() else {
            return Ok(false);
        };
        if ingest_extension(&ext.to_string_lossy().to_lowercase()).is_none() {
            return Ok(false);
        }
        self.verify_magic_bytes(path)
    }

    /// Verify file type using magic bytes
    fn verify_magic_bytes(&self, path: &Path) -> Result<bool, ScanError> {
        let mut file = File::open(path)
            .map_err(|e| ScanError::FileAccessError(path.to_path_buf(), e.to_string()))?;

        let mut buffer = [0u8; 12];
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| ScanError::FileAccessError(path.to_path_buf(), e.to_string()))?;

        if bytes_read < 4 {
            return Ok(false); // Too small to be audio
        }

        let is_audio = match &buffer[..bytes_read.min(12)] {
            // MP3
            [0xFF, 0xFB, ..] | [0xFF, 0xF3, ..] | [0xFF, 0xF2, ..] => true,
            [b'I', b'D', b'3', ..] => true, // MP3 with ID3 tag

            // FLAC
            [b'f', b'L', b'a', b'C', ..] => true,

            // OGG
            [b'O', b'g', b'g', b'S', ..] => true,

            // M4A/AAC (MP4 container)
            [_, _, _, _, b'f', b't', b'y', b'p', ..] => true,

            // WAV
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E'] => true,

            _ => false,
        };

        Ok(is_audio)
    }
}

impl Default for UploadScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Recognized audio extension (lowercase, no dot) or `None`
pub fn ingest_extension(ext: &str) -> Option<&str> {
    match ext {
        "mp3" | "wav" | "flac" | "m4a" | "aac" | "ogg" => Some(ext),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn recognized_extensions() {
        assert!(ingest_extension("mp3").is_some());
        assert!(ingest_extension("wav").is_some());
        assert!(ingest_extension("flac").is_some());
        assert!(ingest_extension("txt").is_none());
        assert!(ingest_extension("jpg").is_none());
    }

    #[test]
    fn scan_nonexistent_path() {
        let scanner = UploadScanner::new();
        let result = scanner.scan(Path::new("/nonexistent/uploads"));
        assert!(matches!(result, Err(ScanError::PathNotFound(_))));
    }

    #[test]
    fn scan_skips_non_audio_content() {
        let dir = TempDir::new().unwrap();
        // Right extension, wrong bytes
        fs::write(dir.path().join("fake.mp3"), b"just some text").unwrap();
        // Wrong extension
        fs::write(dir.path().join("readme.txt"), b"hello").unwrap();
        // Real-looking MP3 header
        let mut mp3 = b"ID3".to_vec();
        mp3.extend_from_slice(&[0u8; 64]);
        fs::write(dir.path().join("real.mp3"), &mp3).unwrap();

        let scanner = UploadScanner::new();
        let keys = scanner.scan(dir.path()).unwrap();
        assert_eq!(keys, vec!["real.mp3"]);
    }

    #[test]
    fn scan_recurses_and_returns_relative_keys() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("batch1")).unwrap();
        let mut wav = b"RIFF".to_vec();
        wav.extend_from_slice(&[0u8; 4]);
        wav.extend_from_slice(b"WAVE");
        wav.extend_from_slice(&[0u8; 32]);
        fs::write(dir.path().join("batch1").join("take one.wav"), &wav).unwrap();

        let scanner = UploadScanner::new();
        let keys = scanner.scan(dir.path()).unwrap();
        assert_eq!(keys, vec!["batch1/take one.wav"]);
    }
}
