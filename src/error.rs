use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlacesEvalError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("APIキーが設定されていません。`places-eval config --set-api-key YOUR_KEY` または OPENAI_API_KEY で設定してください")]
    MissingApiKey,

    #[error("ファイルが見つかりません: {0}")]
    FileNotFound(String),

    #[error(transparent)]
    InvalidBoundingBox(#[from] places_eval_common::InvalidBoundingBoxError),

    #[error(transparent)]
    UnresolvedRelease(#[from] UnresolvedReleaseError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("成果物の書き込みに失敗: {failed}/{total} 件 ({names})")]
    ArtifactsFailed {
        failed: usize,
        total: usize,
        names: String,
    },

    #[error("POIが見つかりません: {0}")]
    NoPlacesFound(String),

    #[error("API呼び出しエラー: {0}")]
    ApiCall(String),

    #[error("Excel生成エラー: {0}")]
    ExcelGeneration(String),

    #[error("画像生成エラー: {0}")]
    ImageGeneration(String),

    #[error(transparent)]
    Evaluation(#[from] places_eval_common::EvaluationError),

    #[error(transparent)]
    Common(#[from] places_eval_common::Error),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),
}

/// リリース識別子を解決できない
#[derive(Error, Debug)]
#[error("リリースを解決できません: {version} ({reason})")]
pub struct UnresolvedReleaseError {
    pub version: String,
    pub reason: String,
}

impl UnresolvedReleaseError {
    pub fn new(version: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            reason: reason.into(),
        }
    }
}

/// リリース解決の失敗
///
/// 識別子の不正・パーツなしは `Unresolved`、一覧取得の通信失敗は
/// 原因を保ったまま `Extraction` で返す。
#[derive(Error, Debug)]
pub enum ReleaseError {
    #[error(transparent)]
    Unresolved(#[from] UnresolvedReleaseError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

impl From<ReleaseError> for PlacesEvalError {
    fn from(err: ReleaseError) -> Self {
        match err {
            ReleaseError::Unresolved(e) => PlacesEvalError::UnresolvedRelease(e),
            ReleaseError::Extraction(e) => PlacesEvalError::Extraction(e),
        }
    }
}

/// 抽出エラー（通信・リモートスキーマ）。部分結果は返さない。
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("通信エラー ({url}): {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} ({url})")]
    HttpStatus { url: String, status: u16 },

    #[error("一覧レスポンスが不正 ({url}): {reason}")]
    Listing { url: String, reason: String },

    #[error("リモートスキーマが不正 ({part}): {reason}")]
    Schema { part: String, reason: String },

    #[error("Parquet読み込みエラー ({part}): {source}")]
    Parquet {
        part: String,
        #[source]
        source: parquet::errors::ParquetError,
    },

    #[error("Arrow変換エラー ({part}): {source}")]
    Arrow {
        part: String,
        #[source]
        source: arrow::error::ArrowError,
    },

    #[error("IOエラー ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    InvalidBoundingBox(#[from] places_eval_common::InvalidBoundingBoxError),

    #[error("抽出タスクが異常終了: {0}")]
    Task(String),
}

/// 成果物1件の書き込み失敗（他の成果物には影響しない）
#[derive(Error, Debug)]
#[error("{artifact} の書き込みに失敗 ({path}): {reason}")]
pub struct ArtifactWriteError {
    pub artifact: &'static str,
    pub path: PathBuf,
    pub reason: String,
}

pub type Result<T> = std::result::Result<T, PlacesEvalError>;
