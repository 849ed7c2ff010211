//! 抽出パイプラインの統合テスト
//!
//! テスト内で GeoParquet 相当のパーツを書き出し、ローカルミラーとして読む。

mod support;

use places_eval::error::{ExtractionError, PlacesEvalError};
use places_eval::export::{export_artifacts, GEOJSON_FILE};
use places_eval::extractor::SpatialExtractor;
use places_eval::release::ReleaseLocator;
use places_eval::source::LocalSource;
use places_eval_common::geojson::read_feature_collection;
use places_eval_common::BoundingBox;
use support::{mirror, row, sf, write_part, VERSION};
use tempfile::tempdir;

#[test]
fn test_limit_three_yields_three_records_inside_bbox() {
    let dir = tempdir().expect("Failed to create temp dir");
    mirror(dir.path());
    let source = LocalSource::new(dir.path());

    let release = ReleaseLocator::new(&source).resolve(VERSION).unwrap();
    assert_eq!(release.parts().len(), 2);

    let records = SpatialExtractor::new(&source).extract(&release, &sf(), 3).unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| sf().contains(r.geometry.lon, r.geometry.lat)));
}

#[test]
fn test_unlimited_returns_all_in_bbox_and_prunes_row_groups() {
    let dir = tempdir().expect("Failed to create temp dir");
    mirror(dir.path());
    let source = LocalSource::new(dir.path());
    let release = ReleaseLocator::new(&source).resolve(VERSION).unwrap();

    let extraction = SpatialExtractor::new(&source)
        .extract_with_stats(&release, &sf(), 0)
        .unwrap();

    let mut ids: Vec<&str> = extraction.records.iter().map(|r| r.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["sf-1", "sf-2", "sf-3", "sf-4", "sf-5"]);
    assert_eq!(extraction.parts_read, 2);
    // LA だけの行グループは統計で読み飛ばす
    assert_eq!(extraction.row_groups_skipped, 1);
    assert!(!extraction.truncated);
}

#[test]
fn test_empty_bbox_result() {
    let dir = tempdir().expect("Failed to create temp dir");
    mirror(dir.path());
    let source = LocalSource::new(dir.path());
    let release = ReleaseLocator::new(&source).resolve(VERSION).unwrap();

    let tokyo: BoundingBox = "139.6,35.6,139.8,35.8".parse().unwrap();
    let records = SpatialExtractor::new(&source).extract(&release, &tokyo, 0).unwrap();
    assert!(records.is_empty());
}

#[test]
fn test_missing_required_column_aborts() {
    let dir = tempdir().expect("Failed to create temp dir");
    write_part(
        dir.path(),
        "part-00000.parquet",
        &[row("sf-1", -122.42, 37.77, "Tartine", "bakery")],
        10,
        false,
    );
    let source = LocalSource::new(dir.path());
    let release = ReleaseLocator::new(&source).resolve(VERSION).unwrap();

    let err = SpatialExtractor::new(&source).extract(&release, &sf(), 0).unwrap_err();
    assert!(matches!(err, ExtractionError::Schema { .. }));
    assert!(err.to_string().contains("categories"));
}

#[test]
fn test_unknown_release_is_unresolved() {
    let dir = tempdir().expect("Failed to create temp dir");
    mirror(dir.path());
    let source = LocalSource::new(dir.path());

    let err: PlacesEvalError = ReleaseLocator::new(&source).resolve("2020-01-01.0").unwrap_err().into();
    assert!(matches!(err, PlacesEvalError::UnresolvedRelease(ref e) if e.version == "2020-01-01.0"));

    let err: PlacesEvalError = ReleaseLocator::new(&source).resolve("latest").unwrap_err().into();
    assert!(matches!(err, PlacesEvalError::UnresolvedRelease(_)));
}

#[test]
fn test_extract_then_export_geojson() {
    let dir = tempdir().expect("Failed to create temp dir");
    mirror(dir.path());
    let source = LocalSource::new(dir.path());
    let release = ReleaseLocator::new(&source).resolve(VERSION).unwrap();
    let records = SpatialExtractor::new(&source).extract(&release, &sf(), 3).unwrap();

    let out = dir.path().join("out");
    let report = export_artifacts(&records, &sf(), release.version(), &out);
    assert!(report.is_success());

    let features = read_feature_collection(&out.join(GEOJSON_FILE)).unwrap();
    assert_eq!(features.len(), 3);
    for (feature, record) in features.iter().zip(&records) {
        assert_eq!(feature.id, record.id);
        assert_eq!(feature.name, record.name);
        assert_eq!(feature.category, record.category);
        assert!(sf().contains(feature.geometry.lon, feature.geometry.lat));
    }
}
