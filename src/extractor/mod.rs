//! 空間抽出モジュール
//!
//! リリースの全パーツを一覧順に読み、範囲と交差する行だけをPoiRecordにする。
//! - 必要な列だけを投影（リモートではRangeで該当チャンクのみ取得）
//! - 行グループの bbox 統計が範囲外なら読まずにスキップ
//! - limit > 0 なら抽出順で先頭N件（正準なサブセットではない）
//! - エラー時は部分結果を返さない

pub mod decode;
pub mod wkb;

pub use decode::DecodeStats;

use crate::error::ExtractionError;
use crate::release::ReleaseRef;
use crate::source::{PartObject, PartSource};
use decode::{BatchDecoder, OPTIONAL_COLUMNS, REQUIRED_COLUMNS};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ProjectionMask;
use parquet::file::metadata::ParquetMetaData;
use parquet::file::statistics::Statistics;
use places_eval_common::{BoundingBox, PoiRecord};

const DEFAULT_BATCH_SIZE: usize = 8192;

/// 抽出結果と除外件数
#[derive(Debug, Default)]
pub struct Extraction {
    pub records: Vec<PoiRecord>,
    pub stats: DecodeStats,
    pub parts_read: usize,
    pub row_groups_read: usize,
    pub row_groups_skipped: usize,
    /// limit到達で打ち切ったか
    pub truncated: bool,
}

pub struct SpatialExtractor<'a, S: PartSource> {
    source: &'a S,
}

impl<'a, S: PartSource> SpatialExtractor<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    /// 範囲内のPOIを抽出（limit 0 は無制限）
    pub fn extract(
        &self,
        release: &ReleaseRef,
        bbox: &BoundingBox,
        limit: usize,
    ) -> Result<Vec<PoiRecord>, ExtractionError> {
        Ok(self.extract_with_stats(release, bbox, limit)?.records)
    }

    pub fn extract_with_stats(
        &self,
        release: &ReleaseRef,
        bbox: &BoundingBox,
        limit: usize,
    ) -> Result<Extraction, ExtractionError> {
        let mut extraction = Extraction::default();

        for part in release.parts() {
            let remaining = if limit == 0 {
                None
            } else {
                Some(limit - extraction.records.len())
            };
            self.read_part(part, bbox, remaining, &mut extraction)?;

            if limit > 0 && extraction.records.len() >= limit {
                extraction.truncated = true;
                break;
            }
        }

        let stats = &extraction.stats;
        tracing::info!(
            records = extraction.records.len(),
            parts = extraction.parts_read,
            row_groups_read = extraction.row_groups_read,
            row_groups_skipped = extraction.row_groups_skipped,
            rows_scanned = stats.rows_scanned,
            non_point = stats.non_point,
            malformed = stats.malformed_geometry,
            "抽出完了"
        );
        Ok(extraction)
    }

    fn read_part(
        &self,
        part: &PartObject,
        bbox: &BoundingBox,
        remaining: Option<usize>,
        extraction: &mut Extraction,
    ) -> Result<(), ExtractionError> {
        let part_name = part.key.as_str();
        let parquet_error = |source: parquet::errors::ParquetError| ExtractionError::Parquet {
            part: part_name.to_string(),
            source,
        };

        let reader = self.source.open(part)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(reader).map_err(parquet_error)?;

        let projection = {
            let schema = builder.parquet_schema();
            let names: Vec<&str> = schema
                .root_schema()
                .get_fields()
                .iter()
                .map(|f| f.name())
                .collect();

            let missing: Vec<&str> = REQUIRED_COLUMNS
                .iter()
                .copied()
                .filter(|c| !names.contains(c))
                .collect();
            if !missing.is_empty() {
                return Err(ExtractionError::Schema {
                    part: part_name.to_string(),
                    reason: format!("必須列がありません: {}", missing.join(", ")),
                });
            }

            let indices: Vec<usize> = names
                .iter()
                .enumerate()
                .filter(|(_, n)| REQUIRED_COLUMNS.contains(*n) || OPTIONAL_COLUMNS.contains(*n))
                .map(|(i, _)| i)
                .collect();
            ProjectionMask::roots(schema, indices)
        };

        let (row_groups, skipped) = select_row_groups(builder.metadata(), bbox);
        extraction.parts_read += 1;
        extraction.row_groups_skipped += skipped;
        tracing::debug!(part = part_name, row_groups = row_groups.len(), skipped, "パーツ読み込み");
        if row_groups.is_empty() {
            return Ok(());
        }
        extraction.row_groups_read += row_groups.len();

        let batches = builder
            .with_projection(projection)
            .with_row_groups(row_groups)
            .with_batch_size(DEFAULT_BATCH_SIZE)
            .build()
            .map_err(parquet_error)?;

        let decoder = BatchDecoder::new(part_name);
        let mut taken = 0;
        for batch in batches {
            let batch = batch.map_err(|source| ExtractionError::Arrow {
                part: part_name.to_string(),
                source,
            })?;
            let mut records = decoder.decode(&batch, bbox, &mut extraction.stats)?;

            if let Some(remaining) = remaining {
                records.truncate(remaining - taken);
            }
            taken += records.len();
            extraction.records.extend(records);

            if remaining.is_some_and(|r| taken >= r) {
                break;
            }
        }
        Ok(())
    }
}

/// bbox 列の統計で範囲と交差しうる行グループを選ぶ
///
/// 統計がない行グループは読む。戻り値は (読む行グループ, スキップ数)。
pub fn select_row_groups(metadata: &ParquetMetaData, bbox: &BoundingBox) -> (Vec<usize>, usize) {
    let mut selected = Vec::new();
    let mut skipped = 0;

    for (i, row_group) in metadata.row_groups().iter().enumerate() {
        let stat = |path: &str, min: bool| -> Option<f64> {
            let column = row_group
                .columns()
                .iter()
                .find(|c| c.column_path().string() == path)?;
            statistic_value(column.statistics()?, min)
        };

        let keep = match (
            stat("bbox.xmin", true),
            stat("bbox.ymin", true),
            stat("bbox.xmax", false),
            stat("bbox.ymax", false),
        ) {
            (Some(xmin), Some(ymin), Some(xmax), Some(ymax)) => bbox.intersects(xmin, ymin, xmax, ymax),
            _ => true,
        };

        if keep {
            selected.push(i);
        } else {
            skipped += 1;
        }
    }
    (selected, skipped)
}

fn statistic_value(statistics: &Statistics, min: bool) -> Option<f64> {
    match statistics {
        Statistics::Float(s) => (if min { s.min_opt() } else { s.max_opt() }).map(|v| *v as f64),
        Statistics::Double(s) => (if min { s.min_opt() } else { s.max_opt() }).copied(),
        _ => None,
    }
}
