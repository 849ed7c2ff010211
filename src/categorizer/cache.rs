//! 分類応答キャッシュ
//!
//! モデル名＋プロンプトのSHA-256をキーに生の応答を保存し、
//! 同じPOIの再問い合わせをスキップする。

use crate::error::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

pub const CACHE_FILE_NAME: &str = ".categorizer-cache.json";

/// キャッシュファイルの構造
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseCache {
    /// バージョン（互換性チェック用）
    version: u32,
    /// キー → 応答
    entries: HashMap<String, CacheEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub model: String,
    pub response: String,
}

impl ResponseCache {
    const CURRENT_VERSION: u32 = 1;

    pub fn path_in(folder: &Path) -> PathBuf {
        folder.join(CACHE_FILE_NAME)
    }

    /// キャッシュファイルを読み込み（壊れていれば空で開始）
    pub fn load(folder: &Path) -> Self {
        let cache_path = Self::path_in(folder);
        if !cache_path.exists() {
            return Self::default();
        }

        let file = match File::open(&cache_path) {
            Ok(f) => f,
            Err(_) => return Self::default(),
        };

        match serde_json::from_reader::<_, ResponseCache>(BufReader::new(file)) {
            Ok(cache) if cache.version == Self::CURRENT_VERSION => cache,
            Ok(_) => {
                tracing::warn!("キャッシュバージョン不一致、再生成します");
                Self::default()
            }
            Err(e) => {
                tracing::warn!(error = %e, "キャッシュを読めません、再生成します");
                Self::default()
            }
        }
    }

    pub fn save(&self, folder: &Path) -> Result<()> {
        std::fs::create_dir_all(folder)?;
        let file = File::create(Self::path_in(folder))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|e| e.response.as_str())
    }

    pub fn insert(&mut self, key: String, model: &str, response: String) {
        self.entries.insert(
            key,
            CacheEntry {
                model: model.to_string(),
                response,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// モデル別の件数
    pub fn count_by_model(&self) -> HashMap<&str, usize> {
        let mut counts = HashMap::new();
        for entry in self.entries.values() {
            *counts.entry(entry.model.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            entries: HashMap::new(),
        }
    }
}

/// キャッシュキー（SHA-256 hex）
pub fn cache_key(model: &str, prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update([0u8]);
    hasher.update(prompt.as_bytes());
    hex::encode(hasher.finalize())
}

/// キャッシュファイルを削除（存在しなければfalse）
pub fn clear_cache(folder: &Path) -> Result<bool> {
    let path = ResponseCache::path_in(folder);
    if path.exists() {
        std::fs::remove_file(path)?;
        Ok(true)
    } else {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_depends_on_model_and_prompt() {
        let a = cache_key("gpt-4.1-mini", "prompt");
        assert_eq!(a.len(), 64);
        assert_eq!(a, cache_key("gpt-4.1-mini", "prompt"));
        assert_ne!(a, cache_key("claude", "prompt"));
        assert_ne!(a, cache_key("gpt-4.1-mini", "prompt2"));
    }

    #[test]
    fn test_count_by_model() {
        let mut cache = ResponseCache::default();
        cache.insert("k1".into(), "m1", "r".into());
        cache.insert("k2".into(), "m1", "r".into());
        cache.insert("k3".into(), "m2", "r".into());
        let counts = cache.count_by_model();
        assert_eq!(counts["m1"], 2);
        assert_eq!(counts["m2"], 1);
    }
}
