//! 評価結果のCSV出力
//!
//! すべてヘッダー固定。予測の状態は status 列に
//! ok / unparseable / unlabeled / missing で記録する。

use crate::error::Result;
use crate::export::atomic::write_bytes_atomic;
use places_eval_common::table::{CsvWriter, Table};
use places_eval_common::{
    ConfusionMatrix, DisambiguationReport, EvaluationReport, LabeledPoi, PredictionOutcome,
};
use std::collections::HashMap;
use std::path::Path;

pub const PREDICTIONS_FILE: &str = "predictions.csv";
pub const COMPARISON_FILE: &str = "comparison.csv";
pub const CONFUSION_FILE: &str = "confusion.csv";
pub const DISAMBIGUATION_FILE: &str = "disambiguation.csv";

pub const PREDICTIONS_COLUMNS: &[&str] = &[
    "id",
    "primary_name",
    "top_level_category",
    "subcategory",
    "predicted_top_level",
    "predicted_subcategory",
    "status",
];
pub const COMPARISON_COLUMNS: &[&str] = &["id", "primary_name", "ground_truth", "predicted", "correct"];
pub const DISAMBIGUATION_COLUMNS: &[&str] = &[
    "id",
    "ground_truth",
    "first_pass",
    "second_pass",
    "first_correct",
    "second_correct",
];

/// 後着優先でPOI ID → 結果
fn outcomes_by_id(outcomes: &[PredictionOutcome]) -> HashMap<&str, &PredictionOutcome> {
    outcomes.iter().map(|o| (o.poi_id.as_str(), o)).collect()
}

pub fn write_predictions(path: &Path, labeled: &[LabeledPoi], outcomes: &[PredictionOutcome]) -> Result<()> {
    let by_id = outcomes_by_id(outcomes);
    let mut writer = CsvWriter::new(Vec::new(), PREDICTIONS_COLUMNS)?;

    for poi in labeled {
        let truth = poi.ground_truth.as_ref();
        let (predicted_top, predicted_sub, status) = match by_id.get(poi.id()).map(|o| &o.result) {
            Some(Ok(label)) => (
                label.top_level.to_string(),
                label.subcategory.clone().unwrap_or_default(),
                if truth.is_some() { "ok" } else { "unlabeled" },
            ),
            Some(Err(_)) => (String::new(), String::new(), "unparseable"),
            None if truth.is_none() => (String::new(), String::new(), "unlabeled"),
            None => (String::new(), String::new(), "missing"),
        };

        writer.write_row([
            poi.id().to_string(),
            poi.record.name.clone(),
            truth.map(|t| t.top_level.to_string()).unwrap_or_default(),
            truth.and_then(|t| t.subcategory.clone()).unwrap_or_default(),
            predicted_top,
            predicted_sub,
            status.to_string(),
        ])?;
    }
    write_bytes_atomic(path, &writer.into_inner()?)?;
    Ok(())
}

pub fn write_comparison(path: &Path, labeled: &[LabeledPoi], report: &EvaluationReport) -> Result<()> {
    let names: HashMap<&str, &str> = labeled.iter().map(|p| (p.id(), p.record.name.as_str())).collect();
    let mut writer = CsvWriter::new(Vec::new(), COMPARISON_COLUMNS)?;

    for record in &report.records {
        writer.write_row([
            record.poi_id.as_str(),
            names.get(record.poi_id.as_str()).copied().unwrap_or(""),
            record.ground_truth.top_level.as_str(),
            record.predicted.top_level.as_str(),
            if record.is_correct() { "true" } else { "false" },
        ])?;
    }
    write_bytes_atomic(path, &writer.into_inner()?)?;
    Ok(())
}

/// 行=正解、列=予測
pub fn write_confusion(path: &Path, confusion: &ConfusionMatrix) -> Result<()> {
    let truths = confusion.truth_labels();
    let predicted = confusion.predicted_labels();

    let mut headers = vec!["ground_truth"];
    headers.extend(predicted.iter().map(|p| p.as_str()));
    let mut writer = CsvWriter::new(Vec::new(), &headers)?;

    for truth in &truths {
        let mut row = vec![truth.to_string()];
        row.extend(predicted.iter().map(|p| confusion.get(*truth, *p).to_string()));
        writer.write_row(row)?;
    }
    write_bytes_atomic(path, &writer.into_inner()?)?;
    Ok(())
}

pub fn write_disambiguation(
    path: &Path,
    disambiguation: &DisambiguationReport,
    second_outcomes: &[PredictionOutcome],
) -> Result<()> {
    let second = outcomes_by_id(second_outcomes);
    let mut writer = CsvWriter::new(Vec::new(), DISAMBIGUATION_COLUMNS)?;

    for first in &disambiguation.first_pass {
        let truth = first.ground_truth.top_level;
        let second_label = match second.get(first.poi_id.as_str()).map(|o| &o.result) {
            Some(Ok(label)) => Some(label.top_level),
            _ => None,
        };
        writer.write_row([
            first.poi_id.clone(),
            truth.to_string(),
            first.predicted.top_level.to_string(),
            second_label
                .map(|l| l.to_string())
                .unwrap_or_else(|| "unparseable".into()),
            first.is_correct().to_string(),
            second_label.map(|l| l == truth).unwrap_or(false).to_string(),
        ])?;
    }
    write_bytes_atomic(path, &writer.into_inner()?)?;
    Ok(())
}

/// confusion.csv を読み込んだ行列
#[derive(Debug, Clone, PartialEq)]
pub struct ConfusionTable {
    pub truth_labels: Vec<String>,
    pub predicted_labels: Vec<String>,
    /// counts[row][col]
    pub counts: Vec<Vec<u64>>,
}

impl ConfusionTable {
    pub fn max_count(&self) -> u64 {
        self.counts.iter().flatten().copied().max().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }
}

/// 先頭列を行ラベル、残りを予測ラベルとして読む（空・非数値は0）
pub fn read_confusion(path: &Path) -> Result<ConfusionTable> {
    let table = Table::read(path)?;
    let predicted_labels: Vec<String> = table.headers().iter().skip(1).map(|h| h.trim().to_string()).collect();

    let mut truth_labels = Vec::new();
    let mut counts = Vec::new();
    for row in table.rows() {
        truth_labels.push(row.first().trim().to_string());
        let values = row.values();
        counts.push(
            (0..predicted_labels.len())
                .map(|i| {
                    values
                        .get(i + 1)
                        .and_then(|v| v.trim().parse::<f64>().ok())
                        .map(|v| v.max(0.0) as u64)
                        .unwrap_or(0)
                })
                .collect(),
        );
    }

    Ok(ConfusionTable {
        truth_labels,
        predicted_labels,
        counts,
    })
}
