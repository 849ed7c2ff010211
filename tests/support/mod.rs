//! 統合テスト共通のフィクスチャ
//!
//! GeoParquet 相当のパーツ（id / geometry(WKB) / bbox / names / categories）を組み立てる。

#![allow(dead_code)]

use arrow::array::{ArrayRef, BinaryBuilder, Float32Array, StringBuilder, StructArray};
use arrow::datatypes::{DataType, Field, Fields, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use places_eval::extractor::wkb::write_point;
use places_eval::release::places_prefix;
use places_eval_common::BoundingBox;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

pub const VERSION: &str = "2026-01-21.0";

pub struct Row {
    pub id: &'static str,
    pub lon: f64,
    pub lat: f64,
    pub name: &'static str,
    pub category: &'static str,
}

pub fn row(id: &'static str, lon: f64, lat: f64, name: &'static str, category: &'static str) -> Row {
    Row { id, lon, lat, name, category }
}

fn struct_of(fields: Fields, columns: Vec<ArrayRef>) -> StructArray {
    StructArray::new(fields, columns, None)
}

pub fn places_batch(rows: &[Row], with_categories: bool) -> RecordBatch {
    let mut ids = StringBuilder::new();
    let mut geoms = BinaryBuilder::new();
    let mut names = StringBuilder::new();
    let mut cats = StringBuilder::new();
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    for r in rows {
        ids.append_value(r.id);
        geoms.append_value(write_point(r.lon, r.lat));
        names.append_value(r.name);
        cats.append_value(r.category);
        xs.push(r.lon as f32);
        ys.push(r.lat as f32);
    }

    let bbox_fields = Fields::from(vec![
        Field::new("xmin", DataType::Float32, true),
        Field::new("xmax", DataType::Float32, true),
        Field::new("ymin", DataType::Float32, true),
        Field::new("ymax", DataType::Float32, true),
    ]);
    let floats = |v: &[f32]| Arc::new(Float32Array::from(v.to_vec())) as ArrayRef;
    let bbox = struct_of(bbox_fields.clone(), vec![floats(&xs), floats(&xs), floats(&ys), floats(&ys)]);
    let primary = Fields::from(vec![Field::new("primary", DataType::Utf8, true)]);
    let names = struct_of(primary.clone(), vec![Arc::new(names.finish()) as ArrayRef]);
    let cats = struct_of(primary.clone(), vec![Arc::new(cats.finish()) as ArrayRef]);

    let mut fields = vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("geometry", DataType::Binary, true),
        Field::new("bbox", DataType::Struct(bbox_fields), true),
        Field::new("names", DataType::Struct(primary.clone()), true),
    ];
    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(ids.finish()),
        Arc::new(geoms.finish()),
        Arc::new(bbox),
        Arc::new(names),
    ];
    if with_categories {
        fields.push(Field::new("categories", DataType::Struct(primary), true));
        columns.push(Arc::new(cats));
    }
    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).unwrap()
}

/// 1パーツを書き出す（row_group_size 行ごとに行グループを分ける）
pub fn write_part(root: &Path, name: &str, rows: &[Row], row_group_size: usize, with_categories: bool) {
    let dir = root.join(places_prefix(VERSION));
    std::fs::create_dir_all(&dir).unwrap();
    let file = File::create(dir.join(name)).unwrap();
    write_parquet(file, rows, row_group_size, with_categories);
}

/// メモリ上にパーツを書き出す
pub fn part_bytes(rows: &[Row], row_group_size: usize) -> Vec<u8> {
    let mut buffer = Vec::new();
    write_parquet(&mut buffer, rows, row_group_size, true);
    buffer
}

fn write_parquet<W: std::io::Write + Send>(out: W, rows: &[Row], row_group_size: usize, with_categories: bool) {
    let batch = places_batch(rows, with_categories);
    let props = WriterProperties::builder()
        .set_max_row_group_size(row_group_size)
        .build();
    let mut writer = ArrowWriter::try_new(out, batch.schema(), Some(props)).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
}

pub fn sf() -> BoundingBox {
    "-122.52,37.70,-122.35,37.83".parse().unwrap()
}

/// SF 5件 + LA 3件（LAは独立した行グループ）
pub fn mirror(root: &Path) {
    write_part(
        root,
        "part-00000.parquet",
        &[
            row("sf-1", -122.42, 37.77, "Tartine", "bakery"),
            row("sf-2", -122.41, 37.78, "Blue Bottle", "coffee_shop"),
            row("sf-3", -122.40, 37.79, "City Lights", "bookstore"),
            row("la-1", -118.24, 34.05, "Grand Central", "market"),
            row("la-2", -118.25, 34.06, "Angels Flight", "landmark"),
            row("la-3", -118.26, 34.04, "Clifton's", "restaurant"),
        ],
        3,
        true,
    );
    write_part(
        root,
        "part-00001.parquet",
        &[
            row("sf-4", -122.45, 37.76, "Golden Gate Park", "park"),
            row("sf-5", -122.39, 37.80, "Ferry Building", "market"),
        ],
        3,
        true,
    );
}
