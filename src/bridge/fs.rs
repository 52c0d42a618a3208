//! Filesystem bridge
//!
//! Treats a directory as a container and each regular file directly inside
//! it as a sub-unit. Wrapping reads the file into memory; finalizing hashes
//! the payload and sniffs its type.

use super::{ImportBridge, WrappedRecord};
use crate::content::{compute_checksum, sniff};
use crate::error::{BridgeError, BridgeResult};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

/// Payload of one file
#[derive(Debug, Clone)]
pub struct FileGeometry {
    /// Where the payload was read from
    pub path: PathBuf,

    /// File contents
    pub data: Arc<[u8]>,

    /// blake3 checksum, set by finalize
    pub checksum: Option<String>,

    /// Detected MIME type, set by finalize
    pub mime_type: Option<String>,

    /// Whether the payload looks like an image, set by finalize
    pub image: bool,
}

impl FileGeometry {
    fn staged(path: PathBuf, data: Vec<u8>) -> Self {
        Self {
            path,
            data: data.into(),
            checksum: None,
            mime_type: None,
            image: false,
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_finalized(&self) -> bool {
        self.checksum.is_some()
    }
}

/// Bridge that imports directories of files
#[derive(Debug, Clone)]
pub struct FsBridge {
    exclude_patterns: Vec<Regex>,
    max_payload: u64,
}

impl FsBridge {
    pub fn new(max_payload: u64) -> Self {
        Self {
            exclude_patterns: Vec::new(),
            max_payload,
        }
    }

    /// Skip files whose path matches any of `patterns`
    pub fn with_exclude_patterns(mut self, patterns: Vec<Regex>) -> Self {
        self.exclude_patterns = patterns;
        self
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let path = path.to_string_lossy();
        self.exclude_patterns.iter().any(|re| re.is_match(&path))
    }
}

impl ImportBridge for FsBridge {
    type Container = PathBuf;
    type SubUnit = PathBuf;
    type Geometry = FileGeometry;

    fn sub_units(&self, source_id: &str, dir: &PathBuf) -> BridgeResult<Vec<PathBuf>> {
        let unreadable = |e: std::io::Error| BridgeError::ContainerUnreadable {
            source_id: source_id.to_string(),
            reason: e.to_string(),
        };

        let mut files = Vec::new();
        for entry in fs::read_dir(dir).map_err(unreadable)? {
            let entry = entry.map_err(unreadable)?;
            let path = entry.path();
            if !entry.file_type().map_err(unreadable)?.is_file() {
                continue;
            }
            if self.is_excluded(&path) {
                trace!(path = %path.display(), "Excluded by pattern");
                continue;
            }
            files.push(path);
        }

        // Sorted for consistent ordering across runs
        files.sort();
        Ok(files)
    }

    fn wrap(
        &self,
        source_id: &str,
        _dir: &PathBuf,
        path: PathBuf,
    ) -> Option<WrappedRecord<FileGeometry>> {
        let name = path.file_name()?.to_string_lossy().into_owned();
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Unreadable file skipped");
                return None;
            }
        };

        if data.is_empty() {
            return None;
        }

        Some(WrappedRecord::new(
            source_id,
            name,
            FileGeometry::staged(path, data),
        ))
    }

    fn finalize(&self, name: &str, staged: &FileGeometry) -> BridgeResult<FileGeometry> {
        if staged.size() > self.max_payload {
            return Err(BridgeError::FinalizeFailed {
                name: name.to_string(),
                reason: format!(
                    "payload of {} bytes exceeds limit of {}",
                    staged.size(),
                    self.max_payload
                ),
            });
        }

        let sniffed = sniff(&staged.data);
        Ok(FileGeometry {
            path: staged.path.clone(),
            data: Arc::clone(&staged.data),
            checksum: Some(compute_checksum(&staged.data)),
            mime_type: sniffed.mime_type,
            image: sniffed.image,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sub_units_are_sorted_regular_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.bin"), b"b").unwrap();
        fs::write(dir.path().join("a.bin"), b"a").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();

        let bridge = FsBridge::new(1024);
        let units = bridge
            .sub_units("row_0", &dir.path().to_path_buf())
            .unwrap();
        let names: Vec<_> = units
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.bin", "b.bin"]);
    }

    #[test]
    fn test_missing_directory_fails_container() {
        let bridge = FsBridge::new(1024);
        let err = bridge
            .sub_units("gone", &PathBuf::from("/nonexistent/dc-import/dir"))
            .unwrap_err();
        assert!(matches!(err, BridgeError::ContainerUnreadable { .. }));
    }

    #[test]
    fn test_exclude_patterns() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("tile.tif"), b"x").unwrap();
        fs::write(dir.path().join("tile.tmp"), b"x").unwrap();

        let bridge =
            FsBridge::new(1024).with_exclude_patterns(vec![Regex::new(r"\.tmp$").unwrap()]);
        let units = bridge.sub_units("row_0", &dir.path().to_path_buf()).unwrap();
        assert_eq!(units.len(), 1);
        assert!(units[0].ends_with("tile.tif"));
    }

    #[test]
    fn test_empty_file_is_skipped() {
        let dir = tempdir().unwrap();
        let empty = dir.path().join("empty.bin");
        fs::write(&empty, b"").unwrap();

        let bridge = FsBridge::new(1024);
        assert!(bridge.wrap("row_0", &dir.path().to_path_buf(), empty).is_none());
    }

    #[test]
    fn test_wrap_and_finalize() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tile.png");
        fs::write(&path, [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]).unwrap();

        let bridge = FsBridge::new(1024);
        let record = bridge.wrap("row_0", &dir.path().to_path_buf(), path).unwrap();
        assert_eq!(record.name, "tile.png");
        assert_eq!(&*record.source_id, "row_0");
        assert!(!record.geometry.is_finalized());

        let done = bridge.finalize(&record.name, &record.geometry).unwrap();
        assert!(done.is_finalized());
        assert_eq!(done.mime_type.as_deref(), Some("image/png"));
        assert!(done.image);
        assert_eq!(done.size(), 8);
    }

    #[test]
    fn test_finalize_rejects_oversized_payload() {
        let bridge = FsBridge::new(4);
        let staged = FileGeometry::staged(PathBuf::from("big.bin"), vec![0u8; 5]);
        let err = bridge.finalize("big.bin", &staged).unwrap_err();
        assert!(matches!(err, BridgeError::FinalizeFailed { .. }));
    }
}
