//! RecordBatch → PoiRecord 変換
//!
//! Overtureのスキーマはリリースごとに細かく揺れるため、文字列・数値は
//! 一度 `cast` してから読む。構造体の子列は親がnullの行をnullとして扱う。

use super::wkb::{read_shape, WkbShape};
use crate::error::ExtractionError;
use arrow::array::{Array, ArrayRef, AsArray, BinaryArray, Float64Array, StringArray, StructArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use places_eval_common::{BoundingBox, PoiContext, PoiRecord};

/// 必須のトップレベル列
pub const REQUIRED_COLUMNS: &[&str] = &["id", "geometry", "bbox", "names", "categories"];

/// リリースによっては存在しない列
pub const OPTIONAL_COLUMNS: &[&str] = &[
    "confidence",
    "basic_category",
    "operating_status",
    "addresses",
    "brand",
];

/// 1回の抽出での除外件数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    pub rows_scanned: usize,
    pub outside_bbox: usize,
    pub null_geometry: usize,
    pub non_point: usize,
    pub malformed_geometry: usize,
}

pub(crate) struct BatchDecoder<'a> {
    part: &'a str,
}

struct BboxColumns {
    parent: StructArray,
    xmin: Float64Array,
    xmax: Float64Array,
    ymin: Float64Array,
    ymax: Float64Array,
}

impl BboxColumns {
    fn row(&self, i: usize) -> Option<(f64, f64, f64, f64)> {
        let valid = self.parent.is_valid(i)
            && self.xmin.is_valid(i)
            && self.xmax.is_valid(i)
            && self.ymin.is_valid(i)
            && self.ymax.is_valid(i);
        valid.then(|| {
            (
                self.xmin.value(i),
                self.ymin.value(i),
                self.xmax.value(i),
                self.ymax.value(i),
            )
        })
    }
}

impl<'a> BatchDecoder<'a> {
    pub fn new(part: &'a str) -> Self {
        Self { part }
    }

    fn schema_error(&self, reason: impl Into<String>) -> ExtractionError {
        ExtractionError::Schema {
            part: self.part.to_string(),
            reason: reason.into(),
        }
    }

    fn arrow_error(&self, source: ArrowError) -> ExtractionError {
        ExtractionError::Arrow {
            part: self.part.to_string(),
            source,
        }
    }

    fn required<'b>(&self, batch: &'b RecordBatch, name: &str) -> Result<&'b ArrayRef, ExtractionError> {
        batch
            .column_by_name(name)
            .ok_or_else(|| self.schema_error(format!("必須列 {} がありません", name)))
    }

    fn as_struct(&self, array: &ArrayRef, name: &str) -> Result<StructArray, ExtractionError> {
        array
            .as_struct_opt()
            .cloned()
            .ok_or_else(|| self.schema_error(format!("{} が構造体ではありません: {}", name, array.data_type())))
    }

    fn child<'b>(&self, parent: &'b StructArray, parent_name: &str, name: &str) -> Result<&'b ArrayRef, ExtractionError> {
        parent
            .column_by_name(name)
            .ok_or_else(|| self.schema_error(format!("{}.{} がありません", parent_name, name)))
    }

    fn utf8(&self, array: &dyn Array) -> Result<StringArray, ExtractionError> {
        let casted = cast(array, &DataType::Utf8).map_err(|e| self.arrow_error(e))?;
        casted
            .as_string_opt::<i32>()
            .cloned()
            .ok_or_else(|| self.schema_error("文字列に変換できません"))
    }

    fn float64(&self, array: &dyn Array) -> Result<Float64Array, ExtractionError> {
        let casted = cast(array, &DataType::Float64).map_err(|e| self.arrow_error(e))?;
        casted
            .as_primitive_opt::<Float64Type>()
            .cloned()
            .ok_or_else(|| self.schema_error("数値に変換できません"))
    }

    fn binary(&self, array: &dyn Array) -> Result<BinaryArray, ExtractionError> {
        let casted = cast(array, &DataType::Binary).map_err(|e| self.arrow_error(e))?;
        casted
            .as_binary_opt::<i32>()
            .cloned()
            .ok_or_else(|| self.schema_error("geometry がバイナリではありません"))
    }

    fn bbox_columns(&self, batch: &RecordBatch) -> Result<BboxColumns, ExtractionError> {
        let parent = self.as_struct(self.required(batch, "bbox")?, "bbox")?;
        let xmin = self.float64(self.child(&parent, "bbox", "xmin")?.as_ref())?;
        let xmax = self.float64(self.child(&parent, "bbox", "xmax")?.as_ref())?;
        let ymin = self.float64(self.child(&parent, "bbox", "ymin")?.as_ref())?;
        let ymax = self.float64(self.child(&parent, "bbox", "ymax")?.as_ref())?;
        Ok(BboxColumns {
            parent,
            xmin,
            xmax,
            ymin,
            ymax,
        })
    }

    fn optional_utf8(&self, batch: &RecordBatch, name: &str) -> Result<Option<StringArray>, ExtractionError> {
        batch
            .column_by_name(name)
            .map(|a| self.utf8(a.as_ref()))
            .transpose()
    }

    /// 範囲内かつPointのみをPoiRecordに変換
    pub fn decode(
        &self,
        batch: &RecordBatch,
        bbox: &BoundingBox,
        stats: &mut DecodeStats,
    ) -> Result<Vec<PoiRecord>, ExtractionError> {
        let ids = self.utf8(self.required(batch, "id")?.as_ref())?;
        let geometry = self.binary(self.required(batch, "geometry")?.as_ref())?;
        let boxes = self.bbox_columns(batch)?;

        let names = self.as_struct(self.required(batch, "names")?, "names")?;
        let primary_names = self.utf8(self.child(&names, "names", "primary")?.as_ref())?;
        let common_names = names.column_by_name("common");

        let categories = self.as_struct(self.required(batch, "categories")?, "categories")?;
        let primary_categories = self.utf8(self.child(&categories, "categories", "primary")?.as_ref())?;
        let alternate_categories = categories.column_by_name("alternate");

        let confidence = batch
            .column_by_name("confidence")
            .map(|a| self.float64(a.as_ref()))
            .transpose()?;
        let basic_category = self.optional_utf8(batch, "basic_category")?;
        let operating_status = self.optional_utf8(batch, "operating_status")?;
        let addresses = batch.column_by_name("addresses");
        let brand = batch
            .column_by_name("brand")
            .map(|a| self.as_struct(a, "brand"))
            .transpose()?;

        let mut records = Vec::new();
        for i in 0..batch.num_rows() {
            stats.rows_scanned += 1;

            let Some((xmin, ymin, xmax, ymax)) = boxes.row(i) else {
                stats.outside_bbox += 1;
                continue;
            };
            if !bbox.intersects(xmin, ymin, xmax, ymax) {
                stats.outside_bbox += 1;
                continue;
            }
            if geometry.is_null(i) {
                stats.null_geometry += 1;
                continue;
            }
            let point = match read_shape(geometry.value(i)) {
                Ok(WkbShape::Point(p)) => p,
                Ok(WkbShape::Empty) => {
                    stats.null_geometry += 1;
                    continue;
                }
                Ok(WkbShape::Other(kind)) => {
                    tracing::trace!(kind, "Point以外のジオメトリをスキップ");
                    stats.non_point += 1;
                    continue;
                }
                Err(e) => {
                    tracing::debug!(part = self.part, row = i, error = %e, "WKBを読めません");
                    stats.malformed_geometry += 1;
                    continue;
                }
            };
            // bbox列はfloat32で外側に丸められているため点そのもので判定する
            if !bbox.contains(point.lon, point.lat) {
                stats.outside_bbox += 1;
                continue;
            }

            let Some(id) = string_at(&ids, i) else {
                return Err(self.schema_error(format!("id がnullの行があります (row {})", i)));
            };
            let primary_name = if names.is_valid(i) {
                string_at(&primary_names, i).unwrap_or_default()
            } else {
                String::new()
            };
            let categories_valid = categories.is_valid(i);

            let mut record = PoiRecord::new(id, point.lon, point.lat, primary_name);
            if categories_valid {
                record.category = string_at(&primary_categories, i);
                if let Some(alt) = alternate_categories {
                    record.alternate_categories = self.list_strings(alt, i)?;
                }
            }
            record.confidence = confidence
                .as_ref()
                .and_then(|c| c.is_valid(i).then(|| c.value(i)));
            record.basic_category = basic_category.as_ref().and_then(|c| string_at(c, i));

            let mut context = PoiContext {
                operating_status: operating_status.as_ref().and_then(|c| string_at(c, i)),
                ..Default::default()
            };
            if let Some(addresses) = addresses {
                context.addresses = self.address_lines(addresses, i)?;
            }
            if let Some(brand) = &brand {
                context.brand = self.brand_name(brand, i)?;
            }
            if let Some(common) = common_names.filter(|_| names.is_valid(i)) {
                context.alternate_names = self
                    .map_values(common, i)?
                    .into_iter()
                    .filter(|n| *n != record.name)
                    .collect();
            }
            record.context = context;

            records.push(record);
        }
        Ok(records)
    }

    /// list<string> の1行
    fn list_strings(&self, array: &ArrayRef, row: usize) -> Result<Vec<String>, ExtractionError> {
        if array.is_null(row) {
            return Ok(Vec::new());
        }
        let values = if let Some(list) = array.as_list_opt::<i32>() {
            list.value(row)
        } else if let Some(list) = array.as_list_opt::<i64>() {
            list.value(row)
        } else {
            return Err(self.schema_error(format!("リスト型ではありません: {}", array.data_type())));
        };
        let strings = self.utf8(values.as_ref())?;
        Ok((0..strings.len()).filter_map(|i| string_at(&strings, i)).collect())
    }

    /// addresses[].freeform（＋locality）
    fn address_lines(&self, array: &ArrayRef, row: usize) -> Result<Vec<String>, ExtractionError> {
        if array.is_null(row) {
            return Ok(Vec::new());
        }
        let Some(list) = array.as_list_opt::<i32>() else {
            return Err(self.schema_error(format!("addresses がリストではありません: {}", array.data_type())));
        };
        let entries = list.value(row);
        let entries = self.as_struct(&entries, "addresses")?;
        let freeform = entries
            .column_by_name("freeform")
            .map(|a| self.utf8(a.as_ref()))
            .transpose()?;
        let locality = entries
            .column_by_name("locality")
            .map(|a| self.utf8(a.as_ref()))
            .transpose()?;

        let mut lines = Vec::new();
        for i in 0..entries.len() {
            if entries.is_null(i) {
                continue;
            }
            let parts: Vec<String> = [freeform.as_ref(), locality.as_ref()]
                .into_iter()
                .flatten()
                .filter_map(|c| string_at(c, i))
                .collect();
            if !parts.is_empty() {
                lines.push(parts.join(", "));
            }
        }
        Ok(lines)
    }

    /// brand.names.primary、なければ brand.wikidata
    fn brand_name(&self, brand: &StructArray, row: usize) -> Result<Option<String>, ExtractionError> {
        if brand.is_null(row) {
            return Ok(None);
        }
        if let Some(names) = brand.column_by_name("names") {
            let names = self.as_struct(names, "brand.names")?;
            if names.is_valid(row) {
                if let Some(primary) = names.column_by_name("primary") {
                    let primary = self.utf8(primary.as_ref())?;
                    if let Some(name) = string_at(&primary, row) {
                        return Ok(Some(name));
                    }
                }
            }
        }
        match brand.column_by_name("wikidata") {
            Some(wikidata) => Ok(string_at(&self.utf8(wikidata.as_ref())?, row)),
            None => Ok(None),
        }
    }

    /// map<string,string> の値（names.common）
    fn map_values(&self, array: &ArrayRef, row: usize) -> Result<Vec<String>, ExtractionError> {
        if array.is_null(row) {
            return Ok(Vec::new());
        }
        let Some(map) = array.as_map_opt() else {
            // 古いリリースでは list<struct> の場合がある
            return Ok(Vec::new());
        };
        let entries = map.value(row);
        if entries.num_columns() < 2 {
            return Ok(Vec::new());
        }
        let values = self.utf8(entries.column(1).as_ref())?;
        Ok((0..values.len()).filter_map(|i| string_at(&values, i)).collect())
    }
}

fn string_at(array: &StringArray, i: usize) -> Option<String> {
    if array.is_null(i) {
        return None;
    }
    let value = array.value(i).trim();
    (!value.is_empty()).then(|| value.to_string())
}
