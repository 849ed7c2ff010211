//! 評価用サブセットの準備
//!
//! places.geojson を読み、カテゴリコードをトップレベルに対応付けて
//! シード固定で n 件を抽出する。分類表CSVがなければダウンロードして保存する。

use crate::error::{PlacesEvalError, Result};
use crate::export::atomic::write_bytes_atomic;
use places_eval_common::table::{CsvWriter, Row, Table};
use places_eval_common::{
    CategoryLabel, EvaluationError, LabeledPoi, PoiContext, PoiRecord, Taxonomy, TopLevelCategory,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const SUBSET_FILE: &str = "poi_subset.csv";
pub const TOP_LEVEL_FILE: &str = "top_level_categories.csv";
pub const SUBCATEGORIES_FILE: &str = "subcategories.csv";
pub const BASELINE_FILE: &str = "baseline_metrics.json";

pub const SUBSET_COLUMNS: &[&str] = &[
    "id",
    "primary_name",
    "overture_primary_category",
    "top_level_category",
    "subcategory",
    "confidence",
    "operating_status",
    "addresses",
    "brand",
    "alternate_names",
    "lon",
    "lat",
];

/// サンプル前の全体集計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BaselineMetrics {
    pub total_pois: usize,
    pub sample_size: usize,
    pub with_primary_category: usize,
    pub with_top_level_mapping: usize,
}

#[derive(Debug, Clone)]
pub struct PreparedSubset {
    pub sample: Vec<LabeledPoi>,
    pub metrics: BaselineMetrics,
}

/// 分類表を読み込む（なければURLから取得してキャッシュ）
pub async fn load_taxonomy(path: &Path, url: &str) -> Result<Taxonomy> {
    if !path.exists() {
        println!("- 分類表をダウンロード中: {}", url);
        let response = reqwest::get(url)
            .await
            .map_err(|e| PlacesEvalError::ApiCall(format!("分類表の取得に失敗: {}", e)))?;
        if !response.status().is_success() {
            return Err(PlacesEvalError::ApiCall(format!(
                "分類表の取得に失敗: HTTP {}",
                response.status().as_u16()
            )));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| PlacesEvalError::ApiCall(format!("分類表の取得に失敗: {}", e)))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        write_bytes_atomic(path, &body)?;
        println!("✔ 分類表を保存: {}", path.display());
    }

    let taxonomy = Taxonomy::from_csv(path)?;
    tracing::info!(
        categories = taxonomy.len(),
        skipped = taxonomy.skipped_rows(),
        "分類表を読み込み"
    );
    Ok(taxonomy)
}

/// シード固定の抽出（n が 0 または全件以上なら元の順で全件）
pub fn sample<T: Clone>(items: &[T], n: usize, seed: u64) -> Vec<T> {
    if n == 0 || n >= items.len() {
        return items.to_vec();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    rand::seq::index::sample(&mut rng, items.len(), n)
        .into_iter()
        .map(|i| items[i].clone())
        .collect()
}

pub fn prepare_subset(records: Vec<PoiRecord>, taxonomy: &Taxonomy, n: usize, seed: u64) -> PreparedSubset {
    let labeled: Vec<LabeledPoi> = records
        .into_iter()
        .map(|r| LabeledPoi::from_taxonomy(r, taxonomy))
        .collect();

    let with_primary_category = labeled.iter().filter(|p| p.record.category.is_some()).count();
    let with_top_level_mapping = labeled.iter().filter(|p| p.ground_truth.is_some()).count();
    let sample = sample(&labeled, n, seed);

    PreparedSubset {
        metrics: BaselineMetrics {
            total_pois: labeled.len(),
            sample_size: sample.len(),
            with_primary_category,
            with_top_level_mapping,
        },
        sample,
    }
}

/// サブセット・分類一覧・集計を書き出す
pub fn write_subset_outputs(prepared: &PreparedSubset, taxonomy: &Taxonomy, out_dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(out_dir)?;

    let subset_path = out_dir.join(SUBSET_FILE);
    let mut writer = CsvWriter::new(Vec::new(), SUBSET_COLUMNS)?;
    for poi in &prepared.sample {
        writer.write_row(subset_row(poi))?;
    }
    write_bytes_atomic(&subset_path, &writer.into_inner()?)?;

    let top_path = out_dir.join(TOP_LEVEL_FILE);
    let mut writer = CsvWriter::new(Vec::new(), &["top_level_category"])?;
    for top in taxonomy.top_levels() {
        writer.write_row([top.as_str()])?;
    }
    write_bytes_atomic(&top_path, &writer.into_inner()?)?;

    let sub_path = out_dir.join(SUBCATEGORIES_FILE);
    let mut writer = CsvWriter::new(Vec::new(), &["top_level_category", "subcategory"])?;
    for (top, sub) in taxonomy.subcategory_rows() {
        writer.write_row([top.as_str(), sub])?;
    }
    write_bytes_atomic(&sub_path, &writer.into_inner()?)?;

    let metrics_path = out_dir.join(BASELINE_FILE);
    let json = serde_json::to_string_pretty(&prepared.metrics)?;
    write_bytes_atomic(&metrics_path, json.as_bytes())?;

    Ok(vec![subset_path, top_path, sub_path, metrics_path])
}

fn subset_row(poi: &LabeledPoi) -> Vec<String> {
    let r = &poi.record;
    let truth = poi.ground_truth.as_ref();
    vec![
        r.id.clone(),
        r.name.clone(),
        r.category.clone().unwrap_or_default(),
        truth.map(|t| t.top_level.to_string()).unwrap_or_default(),
        truth.and_then(|t| t.subcategory.clone()).unwrap_or_default(),
        r.confidence.map(|c| c.to_string()).unwrap_or_default(),
        r.context.operating_status.clone().unwrap_or_default(),
        r.context.addresses.join("|"),
        r.context.brand.clone().unwrap_or_default(),
        r.context.alternate_names.join("|"),
        r.geometry.lon.to_string(),
        r.geometry.lat.to_string(),
    ]
}

/// 列名の揺れ（primaryname / toplevelcategory など）を吸収
fn column<'a>(row: &Row<'a>, names: &[&str]) -> Option<&'a str> {
    names.iter().find_map(|n| row.get(n))
}

/// poi_subset.csv を読み戻す
///
/// トップレベルが列挙外・空の行は未ラベルとして残す（評価で除外・計数）。
/// サブカテゴリは分類表で正規化し、トップレベルに属さないものは捨てる。
/// IDの重複は分類を始める前にエラーにする。
pub fn read_subset_csv(path: &Path, taxonomy: &Taxonomy) -> Result<Vec<LabeledPoi>> {
    if !path.exists() {
        return Err(PlacesEvalError::FileNotFound(path.display().to_string()));
    }
    let table = Table::read(path)?;
    let has_any = |names: &[&str]| names.iter().any(|n| table.has_column(n));
    if !has_any(&["id"]) || !has_any(&["primary_name", "primaryname"]) || !has_any(&["top_level_category", "toplevelcategory"]) {
        return Err(PlacesEvalError::Config(format!(
            "{} には id, primary_name, top_level_category 列が必要です",
            path.display()
        )));
    }

    let mut labeled = Vec::with_capacity(table.len());
    let mut seen = HashSet::new();
    let mut dropped_subcategories = 0;
    for (i, row) in table.rows().enumerate() {
        let id = row.get("id").map(str::to_string).unwrap_or_else(|| format!("row-{}", i + 1));
        if !seen.insert(id.clone()) {
            return Err(EvaluationError::DuplicatePoi(id).into());
        }
        let name = column(&row, &["primary_name", "primaryname"]).unwrap_or("");

        let lon = row.get_f64("lon").unwrap_or(0.0);
        let lat = row.get_f64("lat").unwrap_or(0.0);
        let mut record = PoiRecord::new(id, lon, lat, name);
        record.category = column(&row, &["overture_primary_category", "primary_category"]).map(str::to_string);
        record.confidence = row.get_f64("confidence");
        record.context = PoiContext {
            operating_status: row.get("operating_status").map(str::to_string),
            addresses: row.get_list("addresses"),
            brand: row.get("brand").map(str::to_string),
            alternate_names: row.get_list("alternate_names"),
        };

        let ground_truth = column(&row, &["top_level_category", "toplevelcategory"])
            .and_then(TopLevelCategory::lookup)
            .map(|top| match row.get("subcategory") {
                Some(sub) => CategoryLabel::with_subcategory(top, sub, taxonomy).unwrap_or_else(|e| {
                    tracing::debug!(poi = %record.id, error = %e, "サブカテゴリを破棄");
                    dropped_subcategories += 1;
                    CategoryLabel::top_level(top)
                }),
                None => CategoryLabel::top_level(top),
            });

        labeled.push(LabeledPoi { record, ground_truth });
    }

    if dropped_subcategories > 0 {
        tracing::warn!(dropped = dropped_subcategories, "分類表にないサブカテゴリを破棄しました");
    }
    Ok(labeled)
}
