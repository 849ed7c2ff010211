//! ローカルミラー
//!
//! `aws s3 sync` などで取得したディレクトリを、バケットと同じ
//! プレフィックス構造のまま読む。

use super::{is_parquet_key, PartObject, PartSource};
use crate::error::ExtractionError;
use std::fs::File;
use std::path::PathBuf;
use walkdir::WalkDir;

pub struct LocalSource {
    root: PathBuf,
}

impl LocalSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl PartSource for LocalSource {
    type Reader = File;

    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    fn list(&self, prefix: &str) -> Result<Vec<PartObject>, ExtractionError> {
        let dir = self.root.join(prefix.trim_end_matches('/'));
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut parts = Vec::new();
        for entry in WalkDir::new(&dir).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if !is_parquet_key(&key) {
                continue;
            }
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            parts.push(PartObject { key, size });
        }

        parts.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(parts)
    }

    fn open(&self, part: &PartObject) -> Result<File, ExtractionError> {
        let path = self.root.join(&part.key);
        File::open(&path).map_err(|source| ExtractionError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_list_sorted_parquet_only() {
        let dir = tempdir().unwrap();
        let prefix = "release/2026-01-21.0/theme=places/type=place/";
        let part_dir = dir.path().join(prefix);
        std::fs::create_dir_all(&part_dir).unwrap();
        std::fs::write(part_dir.join("part-00001.parquet"), b"b").unwrap();
        std::fs::write(part_dir.join("part-00000.parquet"), b"aa").unwrap();
        std::fs::write(part_dir.join("_SUCCESS"), b"").unwrap();

        let source = LocalSource::new(dir.path());
        let parts = source.list(prefix).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].key, format!("{}part-00000.parquet", prefix));
        assert_eq!(parts[0].size, 2);
    }

    #[test]
    fn test_missing_prefix_is_empty() {
        let dir = tempdir().unwrap();
        let source = LocalSource::new(dir.path());
        assert!(source.list("release/1999-01-01.0/theme=places/type=place/").unwrap().is_empty());
    }
}
