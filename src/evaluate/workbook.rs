//! 評価結果のExcel出力
//!
//! Summary / Confusion / Predictions の3シート。

use super::EvaluationSummary;
use crate::error::{PlacesEvalError, Result};
use crate::export::atomic::write_bytes_atomic;
use places_eval_common::{ConfusionMatrix, LabeledPoi, PredictionOutcome};
use rust_xlsxwriter::*;
use std::collections::HashMap;
use std::path::Path;

pub const WORKBOOK_FILE: &str = "evaluation.xlsx";

pub fn write_workbook(
    path: &Path,
    summary: &EvaluationSummary,
    confusion: &ConfusionMatrix,
    labeled: &[LabeledPoi],
    outcomes: &[PredictionOutcome],
) -> Result<()> {
    let buffer = generate_workbook_buffer(summary, confusion, labeled, outcomes)
        .map_err(|e| PlacesEvalError::ExcelGeneration(e.to_string()))?;
    write_bytes_atomic(path, &buffer)?;
    Ok(())
}

/// Excelをバッファに生成
pub fn generate_workbook_buffer(
    summary: &EvaluationSummary,
    confusion: &ConfusionMatrix,
    labeled: &[LabeledPoi],
    outcomes: &[PredictionOutcome],
) -> std::result::Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();

    let header_format = Format::new()
        .set_bold()
        .set_font_color(Color::RGB(0x333333))
        .set_background_color(Color::RGB(0xF5F5F5))
        .set_align(FormatAlign::Center)
        .set_border(FormatBorder::Hair)
        .set_border_color(Color::RGB(0xAAAAAA));
    let percent_format = Format::new().set_num_format("0.0%");
    let diagonal_format = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0xDEEBF7));

    // Summary
    let sheet = workbook.add_worksheet();
    sheet.set_name("Summary")?;
    sheet.set_column_width(0, 24.0)?;
    sheet.set_column_width(1, 28.0)?;

    let texts: [(&str, &str); 4] = [
        ("generated_at", &summary.generated_at),
        ("provider", &summary.provider),
        ("model", &summary.model),
        ("taxonomy_version", &summary.taxonomy_version),
    ];
    let counts: [(&str, usize); 6] = [
        ("total_pois", summary.total_pois),
        ("evaluated", summary.evaluated),
        ("correct", summary.correct),
        ("unlabeled", summary.unlabeled),
        ("unparseable", summary.unparseable),
        ("missing", summary.missing),
    ];

    let mut row: u32 = 0;
    for (label, value) in texts {
        sheet.write_string_with_format(row, 0, label, &header_format)?;
        sheet.write_string(row, 1, value)?;
        row += 1;
    }
    for (label, value) in counts {
        sheet.write_string_with_format(row, 0, label, &header_format)?;
        sheet.write_number(row, 1, value as f64)?;
        row += 1;
    }
    sheet.write_string_with_format(row, 0, "accuracy", &header_format)?;
    sheet.write_number_with_format(row, 1, summary.accuracy, &percent_format)?;
    row += 1;
    sheet.write_string_with_format(row, 0, "accuracy_all_rows", &header_format)?;
    sheet.write_number_with_format(row, 1, summary.accuracy_all_rows, &percent_format)?;
    row += 1;

    if let Some(d) = &summary.disambiguation {
        row += 1;
        sheet.write_string_with_format(row, 0, "pair", &header_format)?;
        sheet.write_string(row, 1, format!("{},{}", d.pair.0, d.pair.1))?;
        sheet.write_string_with_format(row + 1, 0, "subset_size", &header_format)?;
        sheet.write_number(row + 1, 1, d.subset_size as f64)?;
        sheet.write_string_with_format(row + 2, 0, "first_pass_accuracy", &header_format)?;
        sheet.write_number_with_format(row + 2, 1, d.first_pass_accuracy, &percent_format)?;
        sheet.write_string_with_format(row + 3, 0, "second_pass_accuracy", &header_format)?;
        sheet.write_number_with_format(row + 3, 1, d.second_pass_accuracy, &percent_format)?;
        row += 4;
    }

    // クラス別
    row += 1;
    for (col, title) in ["class", "support", "correct", "accuracy"].iter().enumerate() {
        sheet.write_string_with_format(row, col as u16, *title, &header_format)?;
    }
    for (class, stats) in &summary.per_class {
        row += 1;
        sheet.write_string(row, 0, class.as_str())?;
        sheet.write_number(row, 1, stats.support as f64)?;
        sheet.write_number(row, 2, stats.correct as f64)?;
        sheet.write_number_with_format(row, 3, stats.accuracy(), &percent_format)?;
    }

    // Confusion（行=正解、列=予測）
    let sheet = workbook.add_worksheet();
    sheet.set_name("Confusion")?;
    let truths = confusion.truth_labels();
    let predicted = confusion.predicted_labels();
    sheet.set_column_width(0, 26.0)?;
    sheet.write_string_with_format(0, 0, "ground_truth \\ predicted", &header_format)?;
    for (c, label) in predicted.iter().enumerate() {
        sheet.write_string_with_format(0, c as u16 + 1, label.as_str(), &header_format)?;
        sheet.set_column_width(c as u16 + 1, 14.0)?;
    }
    for (r, truth) in truths.iter().enumerate() {
        let r = r as u32 + 1;
        sheet.write_string_with_format(r, 0, truth.as_str(), &header_format)?;
        for (c, label) in predicted.iter().enumerate() {
            let count = confusion.get(*truth, *label) as f64;
            if truth == label {
                sheet.write_number_with_format(r, c as u16 + 1, count, &diagonal_format)?;
            } else {
                sheet.write_number(r, c as u16 + 1, count)?;
            }
        }
    }
    sheet.set_freeze_panes(1, 1)?;

    // Predictions
    let sheet = workbook.add_worksheet();
    sheet.set_name("Predictions")?;
    for (col, title) in ["id", "primary_name", "ground_truth", "predicted", "status"].iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, &header_format)?;
    }
    sheet.set_column_width(0, 28.0)?;
    sheet.set_column_width(1, 36.0)?;
    sheet.set_column_width(2, 22.0)?;
    sheet.set_column_width(3, 22.0)?;

    let by_id: HashMap<&str, &PredictionOutcome> = outcomes.iter().map(|o| (o.poi_id.as_str(), o)).collect();
    for (i, poi) in labeled.iter().enumerate() {
        let r = i as u32 + 1;
        let truth = poi.ground_truth.as_ref().map(|t| t.top_level.as_str()).unwrap_or("");
        let (predicted, status) = match by_id.get(poi.id()).map(|o| &o.result) {
            Some(Ok(label)) if poi.ground_truth.is_some() => (label.top_level.as_str(), "ok"),
            Some(Ok(label)) => (label.top_level.as_str(), "unlabeled"),
            Some(Err(_)) => ("", "unparseable"),
            None if poi.ground_truth.is_none() => ("", "unlabeled"),
            None => ("", "missing"),
        };
        sheet.write_string(r, 0, poi.id())?;
        sheet.write_string(r, 1, &poi.record.name)?;
        sheet.write_string(r, 2, truth)?;
        sheet.write_string(r, 3, predicted)?;
        sheet.write_string(r, 4, status)?;
    }
    sheet.set_freeze_panes(1, 0)?;

    workbook.save_to_buffer()
}
