//! places-eval
//!
//! Overture Places の範囲抽出・成果物出力と、LLMによるカテゴリ分類の精度評価。

pub mod ai_provider;
pub mod categorizer;
pub mod cli;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod export;
pub mod extractor;
pub mod release;
pub mod source;
