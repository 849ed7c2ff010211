//! パーツ（Parquetファイル）の取得元
//!
//! - S3Source: 公開バケットをHTTPで一覧・Range読み込み
//! - LocalSource: ローカルに同期したミラー（同じプレフィックス構造）

pub mod http;
pub mod local;

pub use http::{HttpRangeReader, S3Source};
pub use local::LocalSource;

use crate::error::ExtractionError;
use parquet::file::reader::ChunkReader;

/// プレフィックス配下の1オブジェクト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartObject {
    pub key: String,
    pub size: u64,
}

pub trait PartSource: Send + Sync {
    type Reader: ChunkReader + 'static;

    /// ログ表示用の場所
    fn describe(&self) -> String;

    /// プレフィックス配下の `.parquet` を一覧（キー昇順）
    fn list(&self, prefix: &str) -> Result<Vec<PartObject>, ExtractionError>;

    fn open(&self, part: &PartObject) -> Result<Self::Reader, ExtractionError>;
}

pub(crate) fn is_parquet_key(key: &str) -> bool {
    let file_name = key.rsplit('/').next().unwrap_or(key);
    !file_name.starts_with('.') && !file_name.starts_with('_') && !file_name.is_empty()
        && (file_name.ends_with(".parquet") || !file_name.contains('.'))
}
