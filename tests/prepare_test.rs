//! 評価用サブセット作成の統合テスト
//!
//! places.geojson → 分類表で正解付け → シード固定抽出 → CSV/JSON → 読み戻し

use places_eval::evaluate::subset::{
    load_taxonomy, prepare_subset, read_subset_csv, write_subset_outputs, BASELINE_FILE,
    SUBCATEGORIES_FILE, SUBSET_FILE, TOP_LEVEL_FILE,
};
use places_eval::export::{export_artifacts, GEOJSON_FILE};
use places_eval_common::geojson::read_feature_collection;
use places_eval_common::{BoundingBox, PoiRecord, TopLevelCategory};
use tempfile::tempdir;

const TAXONOMY_CSV: &str = "Category code; Overture Taxonomy
bakery; [eat_and_drink,bakery]
coffee_shop; [eat_and_drink,cafe,coffee_shop]
bookstore; [retail,bookstore]
park; [attractions_and_activities,park]
";

fn records() -> Vec<PoiRecord> {
    let mut tartine = PoiRecord::new("sf-1", -122.42, 37.77, "Tartine").with_category("bakery");
    tartine.confidence = Some(0.93);
    tartine.context.addresses = vec!["600 Guerrero St".into()];
    vec![
        tartine,
        PoiRecord::new("sf-2", -122.41, 37.78, "Blue Bottle").with_category("coffee_shop"),
        PoiRecord::new("sf-3", -122.40, 37.79, "City Lights, Books").with_category("bookstore"),
        PoiRecord::new("sf-4", -122.45, 37.76, "Golden Gate Park").with_category("park"),
        PoiRecord::new("sf-5", -122.39, 37.80, "Unmapped").with_category("spaceport"),
        PoiRecord::new("sf-6", -122.38, 37.81, "No Category"),
    ]
}

#[tokio::test]
async fn test_prepare_and_read_back() {
    let dir = tempdir().expect("Failed to create temp dir");
    let bbox: BoundingBox = "-122.52,37.70,-122.35,37.83".parse().unwrap();
    export_artifacts(&records(), &bbox, "2026-01-21.0", dir.path())
        .into_result()
        .unwrap();

    let categories = dir.path().join("overture_categories.csv");
    std::fs::write(&categories, TAXONOMY_CSV).unwrap();
    let taxonomy = load_taxonomy(&categories, "http://127.0.0.1:9/unused.csv").await.unwrap();

    let places = read_feature_collection(&dir.path().join(GEOJSON_FILE)).unwrap();
    let prepared = prepare_subset(places, &taxonomy, 0, 42);
    assert_eq!(prepared.metrics.total_pois, 6);
    assert_eq!(prepared.metrics.sample_size, 6);
    assert_eq!(prepared.metrics.with_primary_category, 5);
    assert_eq!(prepared.metrics.with_top_level_mapping, 4);

    let out = dir.path().join("eval");
    let written = write_subset_outputs(&prepared, &taxonomy, &out).unwrap();
    for name in [SUBSET_FILE, TOP_LEVEL_FILE, SUBCATEGORIES_FILE, BASELINE_FILE] {
        assert!(written.contains(&out.join(name)), "{} がありません", name);
    }

    let labeled = read_subset_csv(&out.join(SUBSET_FILE), &taxonomy).unwrap();
    assert_eq!(labeled.len(), 6);
    let tartine = labeled.iter().find(|p| p.id() == "sf-1").unwrap();
    let truth = tartine.ground_truth.as_ref().unwrap();
    assert_eq!(truth.top_level, TopLevelCategory::EatAndDrink);
    assert_eq!(truth.subcategory.as_deref(), Some("bakery"));
    assert_eq!(tartine.record.confidence, Some(0.93));
    assert_eq!(tartine.record.context.addresses, vec!["600 Guerrero St"]);

    let books = labeled.iter().find(|p| p.id() == "sf-3").unwrap();
    assert_eq!(books.record.name, "City Lights, Books");
    assert!(labeled.iter().find(|p| p.id() == "sf-5").unwrap().ground_truth.is_none());

    let baseline: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join(BASELINE_FILE)).unwrap()).unwrap();
    assert_eq!(baseline["with_top_level_mapping"], 4);

    let subcategories = std::fs::read_to_string(out.join(SUBCATEGORIES_FILE)).unwrap();
    assert!(subcategories.starts_with("top_level_category,subcategory\n"));
    assert!(subcategories.contains("retail,bookstore"));
}

#[test]
fn test_sampling_is_reproducible() {
    let taxonomy = places_eval_common::Taxonomy::from_csv_str(TAXONOMY_CSV).unwrap();
    let a = prepare_subset(records(), &taxonomy, 3, 42);
    let b = prepare_subset(records(), &taxonomy, 3, 42);

    let ids = |p: &places_eval::evaluate::subset::PreparedSubset| {
        p.sample.iter().map(|l| l.id().to_string()).collect::<Vec<_>>()
    };
    assert_eq!(a.sample.len(), 3);
    assert_eq!(ids(&a), ids(&b));
    assert_eq!(a.metrics.total_pois, 6);
}
