//! エラー型定義

use thiserror::Error;

/// 共通エラー型
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    InvalidBoundingBox(#[from] InvalidBoundingBoxError),

    #[error("Taxonomy error: {0}")]
    Taxonomy(String),
}

/// バウンディングボックスの不変条件違反
#[derive(Error, Debug, Clone, PartialEq)]
#[error("不正なバウンディングボックス: {reason}")]
pub struct InvalidBoundingBoxError {
    pub reason: String,
}

impl InvalidBoundingBoxError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// 分類器の応答がカテゴリ列挙に一致しなかった（POI単位、評価から除外）
#[derive(Error, Debug, Clone, PartialEq)]
#[error("ラベルを解釈できません (POI {poi_id}): {reason}")]
pub struct UnparseableLabelError {
    pub poi_id: String,
    pub reason: String,
}

impl UnparseableLabelError {
    pub fn new(poi_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            poi_id: poi_id.into(),
            reason: reason.into(),
        }
    }
}

/// Result型エイリアス
pub type Result<T> = std::result::Result<T, Error>;
