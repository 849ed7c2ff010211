//! リリース解決
//!
//! `YYYY-MM-DD.N` 形式のリリース識別子からplacesテーマのプレフィックスを
//! 組み立て、配下のパーツを一覧する。一覧は唯一の副作用で、
//! プロセス内ではバージョンごとに1回だけ行う。

use crate::error::{ReleaseError, UnresolvedReleaseError};
use crate::source::{PartObject, PartSource};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Mutex;

pub const DEFAULT_RELEASE: &str = "2026-01-21.0";

lazy_static! {
    static ref VERSION_RE: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}\.\d+$").unwrap();
}

/// 解決済みリリース（1回の実行中は不変）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseRef {
    version: String,
    prefix: String,
    parts: Vec<PartObject>,
}

impl ReleaseRef {
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn parts(&self) -> &[PartObject] {
        &self.parts
    }

    pub fn total_bytes(&self) -> u64 {
        self.parts.iter().map(|p| p.size).sum()
    }
}

/// placesテーマのプレフィックス
pub fn places_prefix(version: &str) -> String {
    format!("release/{}/theme=places/type=place/", version)
}

pub fn is_valid_version(version: &str) -> bool {
    VERSION_RE.is_match(version)
}

pub struct ReleaseLocator<'a, S: PartSource> {
    source: &'a S,
    resolved: Mutex<HashMap<String, ReleaseRef>>,
}

impl<'a, S: PartSource> ReleaseLocator<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self {
            source,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    pub fn resolve(&self, version: &str) -> Result<ReleaseRef, ReleaseError> {
        let version = version.trim();
        if !is_valid_version(version) {
            return Err(UnresolvedReleaseError::new(version, "YYYY-MM-DD.N 形式ではありません").into());
        }

        let mut resolved = self
            .resolved
            .lock()
            .map_err(|_| UnresolvedReleaseError::new(version, "内部状態が壊れています"))?;
        if let Some(release) = resolved.get(version) {
            return Ok(release.clone());
        }

        let prefix = places_prefix(version);
        let parts = self.source.list(&prefix)?;

        if parts.is_empty() {
            return Err(UnresolvedReleaseError::new(
                version,
                format!("{} にParquetパーツがありません", prefix),
            )
            .into());
        }

        tracing::info!(version, parts = parts.len(), source = %self.source.describe(), "リリース解決");

        let release = ReleaseRef {
            version: version.to_string(),
            prefix,
            parts,
        };
        resolved.insert(version.to_string(), release.clone());
        Ok(release)
    }
}
