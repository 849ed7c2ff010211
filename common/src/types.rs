//! POIレコードの型定義
//!
//! - PoiRecord: 抽出器が生成する1件のPOI（下流では読み取り専用）
//! - LabeledPoi: 正解ラベル付きPOI（評価用）
//! - PredictionRecord: 予測と正解の組（1回の評価内でのみ存在）

use crate::taxonomy::{CategoryLabel, Taxonomy};
use serde::{Deserialize, Serialize};

/// WGS84 の点ジオメトリ
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lon: f64,
    pub lat: f64,
}

/// 文脈属性（分類器に任意で渡す）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoiContext {
    /// 営業状態（open / temporarily_closed / permanently_closed）
    pub operating_status: Option<String>,
    /// 住所（freeform）
    pub addresses: Vec<String>,
    /// ブランド名
    pub brand: Option<String>,
    /// 別名
    pub alternate_names: Vec<String>,
}

impl PoiContext {
    pub fn is_empty(&self) -> bool {
        self.operating_status.is_none()
            && self.addresses.is_empty()
            && self.brand.is_none()
            && self.alternate_names.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoiRecord {
    pub id: String,
    pub geometry: Point,
    /// names.primary
    pub name: String,
    /// categories.primary（Overtureカテゴリコード）
    pub category: Option<String>,
    #[serde(default)]
    pub alternate_categories: Vec<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub basic_category: Option<String>,
    #[serde(default)]
    pub context: PoiContext,
}

impl PoiRecord {
    pub fn new(id: impl Into<String>, lon: f64, lat: f64, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            geometry: Point { lon, lat },
            name: name.into(),
            category: None,
            alternate_categories: Vec::new(),
            confidence: None,
            basic_category: None,
            context: PoiContext::default(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// 正解ラベル付きPOI
///
/// `ground_truth` が None の場合はカテゴリ列挙外（未ラベル）。
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledPoi {
    pub record: PoiRecord,
    pub ground_truth: Option<CategoryLabel>,
}

impl LabeledPoi {
    pub fn from_taxonomy(record: PoiRecord, taxonomy: &Taxonomy) -> Self {
        let ground_truth = record
            .category
            .as_deref()
            .and_then(|code| taxonomy.label_for(code))
            .cloned();
        Self { record, ground_truth }
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }
}

/// 予測と正解の組
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub poi_id: String,
    pub predicted: CategoryLabel,
    pub ground_truth: CategoryLabel,
}

impl PredictionRecord {
    /// トップレベルでの一致
    pub fn is_correct(&self) -> bool {
        self.predicted.top_level == self.ground_truth.top_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::TopLevelCategory;

    #[test]
    fn test_labeled_poi_from_taxonomy() {
        let taxonomy = Taxonomy::from_csv_str(crate::taxonomy::tests::SAMPLE_CSV).unwrap();

        let labeled = LabeledPoi::from_taxonomy(
            PoiRecord::new("a", 0.0, 0.0, "Blue Bottle").with_category("coffee_shop"),
            &taxonomy,
        );
        let truth = labeled.ground_truth.unwrap();
        assert_eq!(truth.top_level, TopLevelCategory::EatAndDrink);

        let unlabeled = LabeledPoi::from_taxonomy(
            PoiRecord::new("b", 0.0, 0.0, "???").with_category("unknown_thing"),
            &taxonomy,
        );
        assert!(unlabeled.ground_truth.is_none());

        let no_category = LabeledPoi::from_taxonomy(PoiRecord::new("c", 0.0, 0.0, "x"), &taxonomy);
        assert!(no_category.ground_truth.is_none());
    }

    #[test]
    fn test_prediction_correct_ignores_subcategory() {
        let record = PredictionRecord {
            poi_id: "a".into(),
            predicted: CategoryLabel::top_level(TopLevelCategory::Retail),
            ground_truth: CategoryLabel {
                top_level: TopLevelCategory::Retail,
                subcategory: Some("food".into()),
            },
        };
        assert!(record.is_correct());
    }

    #[test]
    fn test_context_is_empty() {
        let mut ctx = PoiContext::default();
        assert!(ctx.is_empty());
        ctx.brand = Some("Starbucks".into());
        assert!(!ctx.is_empty());
    }
}
