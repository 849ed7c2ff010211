//! 評価パイプライン
//!
//! サブセットCSV → 分類 → 評価エンジン → 表・ワークブック出力。
//! 取り違えペアが指定されていれば、該当POIのみサブカテゴリ列挙付きで再判定する。

pub mod heatmap;
pub mod subset;
pub mod tables;
pub mod workbook;

use crate::categorizer::{categorize_all, progress_bar, Categorizer};
use crate::error::{PlacesEvalError, Result};
use crate::export::atomic::write_bytes_atomic;
use places_eval_common::evaluation::ClassStats;
use places_eval_common::{
    evaluate, evaluate_subset, select_confusable, ConfusablePair, DisambiguationContext,
    DisambiguationReport, EvaluationReport, LabeledPoi, PoiRecord, PredictionOutcome, Taxonomy,
    TopLevelCategory, TAXONOMY_VERSION,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const METRICS_FILE: &str = "evaluation_metrics.json";
const TOP_CONFUSIONS: usize = 10;

/// 評価の実行条件
#[derive(Debug, Clone)]
pub struct EvaluateOptions {
    pub out_dir: PathBuf,
    /// 0 = 全件
    pub n: usize,
    pub seed: u64,
    pub pair: Option<ConfusablePair>,
    pub concurrency: usize,
    pub provider: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfusionEntry {
    pub ground_truth: TopLevelCategory,
    pub predicted: TopLevelCategory,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DisambiguationSummary {
    pub pair: (TopLevelCategory, TopLevelCategory),
    pub subset_size: usize,
    pub first_pass_accuracy: f64,
    pub second_pass_accuracy: f64,
    pub second_pass_unparseable: usize,
}

/// evaluation_metrics.json の内容
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationSummary {
    pub generated_at: String,
    pub provider: String,
    pub model: String,
    pub taxonomy_version: String,
    pub total_pois: usize,
    pub evaluated: usize,
    pub correct: usize,
    pub accuracy: f64,
    /// 除外行も分母に含めた精度
    pub accuracy_all_rows: f64,
    pub unlabeled: usize,
    pub unparseable: usize,
    pub missing: usize,
    pub per_class: BTreeMap<TopLevelCategory, ClassStats>,
    pub top_confusions: Vec<ConfusionEntry>,
    pub disambiguation: Option<DisambiguationSummary>,
}

impl EvaluationSummary {
    pub fn new(
        options: &EvaluateOptions,
        total_pois: usize,
        report: &EvaluationReport,
        disambiguation: Option<&DisambiguationReport>,
    ) -> Self {
        Self {
            generated_at: chrono::Local::now().to_rfc3339(),
            provider: options.provider.clone(),
            model: options.model.clone(),
            taxonomy_version: TAXONOMY_VERSION.to_string(),
            total_pois,
            evaluated: report.evaluated(),
            correct: report.correct(),
            accuracy: report.accuracy(),
            accuracy_all_rows: report.accuracy_all_rows(),
            unlabeled: report.unlabeled,
            unparseable: report.unparseable,
            missing: report.missing,
            per_class: report.per_class(),
            top_confusions: report
                .confusion
                .top_confusions(TOP_CONFUSIONS)
                .into_iter()
                .map(|(ground_truth, predicted, count)| ConfusionEntry {
                    ground_truth,
                    predicted,
                    count,
                })
                .collect(),
            disambiguation: disambiguation.map(|d| DisambiguationSummary {
                pair: (d.pair.first(), d.pair.second()),
                subset_size: d.subset_size(),
                first_pass_accuracy: d.first_pass_accuracy(),
                second_pass_accuracy: d.second_pass_accuracy(),
                second_pass_unparseable: d.second_pass.unparseable,
            }),
        }
    }
}

/// 1回分の評価結果
#[derive(Debug)]
pub struct EvaluationRun {
    pub sample: Vec<LabeledPoi>,
    pub outcomes: Vec<PredictionOutcome>,
    pub report: EvaluationReport,
    pub disambiguation: Option<(DisambiguationReport, Vec<PredictionOutcome>)>,
    pub summary: EvaluationSummary,
}

/// 分類と評価を実行（ファイル出力はしない）
///
/// 正解ラベルのないPOIは分類せず、unlabeled として計数する。
pub async fn run_evaluation<C: Categorizer + ?Sized>(
    categorizer: &C,
    labeled: Vec<LabeledPoi>,
    taxonomy: &Taxonomy,
    options: &EvaluateOptions,
) -> Result<EvaluationRun> {
    let sample = subset::sample(&labeled, options.n, options.seed);
    let targets: Vec<&PoiRecord> = sample
        .iter()
        .filter(|p| p.ground_truth.is_some())
        .map(|p| &p.record)
        .collect();

    println!("- 分類中: {} 件（並列 {}）", targets.len(), options.concurrency);
    let pb = progress_bar(targets.len());
    let outcomes = categorize_all(categorizer, &targets, None, options.concurrency, Some(&pb)).await;
    pb.finish_and_clear();

    let report = evaluate(&sample, &outcomes)?;
    println!(
        "✔ 精度: {:.1}% ({}/{})、全行基準 {:.1}%、解釈不能 {} 件、未ラベル {} 件",
        report.accuracy() * 100.0,
        report.correct(),
        report.evaluated(),
        report.accuracy_all_rows() * 100.0,
        report.unparseable,
        report.unlabeled
    );
    for err in &report.unparseable_ids {
        tracing::debug!(poi = %err.poi_id, reason = %err.reason, "解釈不能");
    }

    let disambiguation = match options.pair {
        Some(pair) => Some(run_disambiguation(categorizer, &sample, &report, pair, taxonomy, options).await?),
        None => None,
    };

    let summary = EvaluationSummary::new(
        options,
        sample.len(),
        &report,
        disambiguation.as_ref().map(|(d, _)| d),
    );

    Ok(EvaluationRun {
        sample,
        outcomes,
        report,
        disambiguation,
        summary,
    })
}

async fn run_disambiguation<C: Categorizer + ?Sized>(
    categorizer: &C,
    sample: &[LabeledPoi],
    report: &EvaluationReport,
    pair: ConfusablePair,
    taxonomy: &Taxonomy,
    options: &EvaluateOptions,
) -> Result<(DisambiguationReport, Vec<PredictionOutcome>)> {
    let subset = select_confusable(sample, report, &pair);
    let context = DisambiguationContext::from_taxonomy(&pair, taxonomy);
    println!("- 再判定中: {} / {}（{} 件）", pair.first(), pair.second(), subset.len());

    let records: Vec<&PoiRecord> = subset.iter().map(|p| &p.record).collect();
    let pb = progress_bar(records.len());
    let second = categorize_all(categorizer, &records, Some(&context), options.concurrency, Some(&pb)).await;
    pb.finish_and_clear();

    let result = evaluate_subset(&subset, report, pair, &second)?;
    println!(
        "✔ 再判定: {:.1}% → {:.1}%",
        result.first_pass_accuracy() * 100.0,
        result.second_pass_accuracy() * 100.0
    );
    Ok((result, second))
}

/// 評価結果を出力ディレクトリへ書き出す
pub fn write_evaluation_outputs(run: &EvaluationRun, out_dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(out_dir)?;
    let mut written = Vec::new();

    let path = out_dir.join(tables::PREDICTIONS_FILE);
    tables::write_predictions(&path, &run.sample, &run.outcomes)?;
    written.push(path);

    let path = out_dir.join(tables::COMPARISON_FILE);
    tables::write_comparison(&path, &run.sample, &run.report)?;
    written.push(path);

    let path = out_dir.join(tables::CONFUSION_FILE);
    tables::write_confusion(&path, &run.report.confusion)?;
    written.push(path);

    if let Some((disambiguation, second)) = &run.disambiguation {
        let path = out_dir.join(tables::DISAMBIGUATION_FILE);
        tables::write_disambiguation(&path, disambiguation, second)?;
        written.push(path);
    }

    let path = out_dir.join(METRICS_FILE);
    let json = serde_json::to_string_pretty(&run.summary)?;
    write_bytes_atomic(&path, json.as_bytes())?;
    written.push(path);

    let path = out_dir.join(workbook::WORKBOOK_FILE);
    workbook::write_workbook(&path, &run.summary, &run.report.confusion, &run.sample, &run.outcomes)?;
    written.push(path);

    Ok(written)
}

/// confusion.csv → PNGヒートマップ
pub fn plot_confusion(confusion_csv: &Path, out: &Path) -> Result<()> {
    if !confusion_csv.exists() {
        return Err(PlacesEvalError::FileNotFound(confusion_csv.display().to_string()));
    }
    let table = tables::read_confusion(confusion_csv)?;
    if table.counts.is_empty() || table.predicted_labels.is_empty() {
        return Err(PlacesEvalError::ImageGeneration(format!(
            "混同行列が空です: {}",
            confusion_csv.display()
        )));
    }

    let img = heatmap::render_heatmap(&table);
    let mut buffer = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buffer, image::ImageFormat::Png)
        .map_err(|e| PlacesEvalError::ImageGeneration(e.to_string()))?;

    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    write_bytes_atomic(out, buffer.get_ref())?;
    tracing::info!(
        rows = table.truth_labels.len(),
        cols = table.predicted_labels.len(),
        total = table.total(),
        "ヒートマップを出力"
    );
    Ok(())
}
