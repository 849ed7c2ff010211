//! places-eval Common Library
//!
//! 抽出・評価の両パイプラインで共有される型とロジック:
//! バウンディングボックス、カテゴリ体系、POI型、GeoJSON変換、
//! プロンプト生成、応答パーサー、評価エンジン、CSV入出力

pub mod bbox;
pub mod error;
pub mod evaluation;
pub mod geojson;
pub mod parser;
pub mod prompts;
pub mod table;
pub mod taxonomy;
pub mod types;

pub use bbox::{BoundingBox, DEFAULT_BBOX};
pub use error::{Error, InvalidBoundingBoxError, Result, UnparseableLabelError};
pub use evaluation::{
    evaluate, evaluate_subset, select_confusable, ConfusablePair, ConfusionMatrix,
    DisambiguationContext, DisambiguationReport, EvaluationError, EvaluationReport,
    PredictionOutcome,
};
pub use parser::{extract_json_object, parse_label_response};
pub use prompts::build_categorize_prompt;
pub use taxonomy::{CategoryLabel, Taxonomy, TopLevelCategory, TAXONOMY_VERSION};
pub use types::{LabeledPoi, Point, PoiContext, PoiRecord, PredictionRecord};
