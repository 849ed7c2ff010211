//! 成果物出力モジュール
//!
//! places.geojson / places.png / places.html を個別に書き出す。
//! 1つが失敗しても他の成果物はロールバックせず、失敗だけを報告する。

pub mod atomic;
pub mod map_html;
pub mod preview;

use crate::error::{ArtifactWriteError, PlacesEvalError, Result};
use atomic::{write_atomic, write_bytes_atomic};
use places_eval_common::geojson::to_feature_collection;
use places_eval_common::{BoundingBox, PoiRecord};
use std::path::{Path, PathBuf};

pub const GEOJSON_FILE: &str = "places.geojson";
pub const PREVIEW_FILE: &str = "places.png";
pub const MAP_FILE: &str = "places.html";

/// 出力結果
#[derive(Debug, Default)]
pub struct ExportReport {
    pub written: Vec<(&'static str, PathBuf)>,
    pub failures: Vec<ArtifactWriteError>,
}

impl ExportReport {
    pub fn total(&self) -> usize {
        self.written.len() + self.failures.len()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn path_of(&self, artifact: &str) -> Option<&Path> {
        self.written
            .iter()
            .find(|(name, _)| *name == artifact)
            .map(|(_, p)| p.as_path())
    }

    /// 失敗があればエラーに変換（終了コード用）
    pub fn into_result(self) -> Result<Vec<(&'static str, PathBuf)>> {
        if self.failures.is_empty() {
            return Ok(self.written);
        }
        let total = self.total();
        Err(PlacesEvalError::ArtifactsFailed {
            failed: self.failures.len(),
            total,
            names: self
                .failures
                .iter()
                .map(|f| f.artifact)
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    fn record(&mut self, artifact: &'static str, path: PathBuf, result: std::result::Result<(), String>) {
        match result {
            Ok(()) => {
                println!("✔ {} 出力: {}", artifact, path.display());
                self.written.push((artifact, path));
            }
            Err(reason) => {
                tracing::warn!(artifact, path = %path.display(), %reason, "成果物の書き込みに失敗");
                self.failures.push(ArtifactWriteError { artifact, path, reason });
            }
        }
    }
}

/// 3つの成果物を書き出す
pub fn export_artifacts(
    records: &[PoiRecord],
    bbox: &BoundingBox,
    release: &str,
    out_dir: &Path,
) -> ExportReport {
    let mut report = ExportReport::default();
    let targets = [
        ("geojson", out_dir.join(GEOJSON_FILE)),
        ("png", out_dir.join(PREVIEW_FILE)),
        ("html", out_dir.join(MAP_FILE)),
    ];

    if let Err(e) = std::fs::create_dir_all(out_dir) {
        for (artifact, path) in targets {
            report.record(artifact, path, Err(format!("出力先を作成できません: {}", e)));
        }
        return report;
    }

    for (artifact, path) in targets {
        let result = match artifact {
            "geojson" => write_geojson(records, &path),
            "png" => write_preview(records, bbox, &path),
            _ => write_map(records, bbox, release, &path),
        };
        report.record(artifact, path, result);
    }
    report
}

fn write_geojson(records: &[PoiRecord], path: &Path) -> std::result::Result<(), String> {
    let collection = to_feature_collection(records);
    write_atomic(path, |w| {
        serde_json::to_writer(&mut *w, &collection)?;
        w.write_all(b"\n")
    })
    .map_err(|e| e.to_string())
}

fn write_preview(records: &[PoiRecord], bbox: &BoundingBox, path: &Path) -> std::result::Result<(), String> {
    let img = preview::render_preview(records, bbox);
    let bytes = preview::encode_png(&img).map_err(|e| format!("PNGエンコード失敗: {}", e))?;
    write_bytes_atomic(path, &bytes).map_err(|e| e.to_string())
}

fn write_map(
    records: &[PoiRecord],
    bbox: &BoundingBox,
    release: &str,
    path: &Path,
) -> std::result::Result<(), String> {
    let html = map_html::render_map_html(records, bbox, release).map_err(|e| e.to_string())?;
    write_bytes_atomic(path, html.as_bytes()).map_err(|e| e.to_string())
}
