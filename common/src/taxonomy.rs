//! カテゴリ体系モジュール
//!
//! Overture Places のトップレベルカテゴリ（閉じた列挙）と、
//! `overture_categories.csv` から構築するサブカテゴリ表を管理する。
//! 分類結果の妥当性判定は正規化キーの集合照合で行う。

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

/// 組み込みトップレベル列挙のバージョン
pub const TAXONOMY_VERSION: &str = "overture-places-2026-01";

/// Overture公式カテゴリCSV
pub const DEFAULT_CATEGORIES_URL: &str = "https://raw.githubusercontent.com/OvertureMaps/schema/main/docs/schema/concepts/by-theme/places/overture_categories.csv";

macro_rules! top_level_categories {
    ($($variant:ident => $key:literal),+ $(,)?) => {
        /// トップレベルカテゴリ
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum TopLevelCategory {
            $($variant),+
        }

        impl TopLevelCategory {
            pub const ALL: &'static [TopLevelCategory] = &[$(TopLevelCategory::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(TopLevelCategory::$variant => $key),+
                }
            }
        }
    };
}

top_level_categories! {
    Accommodation => "accommodation",
    ActiveLife => "active_life",
    ArtsAndEntertainment => "arts_and_entertainment",
    AttractionsAndActivities => "attractions_and_activities",
    Automotive => "automotive",
    BeautyAndSpa => "beauty_and_spa",
    BusinessToBusiness => "business_to_business",
    EatAndDrink => "eat_and_drink",
    Education => "education",
    FinancialService => "financial_service",
    HealthAndMedical => "health_and_medical",
    HomeService => "home_service",
    MassMedia => "mass_media",
    Pets => "pets",
    PrivateEstablishmentsAndCorporates => "private_establishments_and_corporates",
    ProfessionalServices => "professional_services",
    PublicServiceAndGovernment => "public_service_and_government",
    RealEstate => "real_estate",
    ReligiousOrganization => "religious_organization",
    Retail => "retail",
    StructureAndGeography => "structure_and_geography",
    Travel => "travel",
}

impl TopLevelCategory {
    /// 正規化キーから検索（"eat_and_drink" / "eatanddrink" / "Eat And Drink" を同一視）
    pub fn lookup(value: &str) -> Option<Self> {
        let key = normalize_key(value);
        if key.is_empty() {
            return None;
        }
        Self::ALL
            .iter()
            .copied()
            .find(|c| normalize_key(c.as_str()) == key)
    }
}

impl fmt::Display for TopLevelCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TopLevelCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::lookup(s).ok_or_else(|| Error::Taxonomy(format!("未知のトップレベルカテゴリ: {}", s)))
    }
}

/// 小文字化し英数字以外を除去
pub fn normalize_key(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// トップレベル + 任意のサブカテゴリ
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CategoryLabel {
    pub top_level: TopLevelCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
}

impl CategoryLabel {
    pub fn top_level(top_level: TopLevelCategory) -> Self {
        Self { top_level, subcategory: None }
    }

    /// サブカテゴリをタクソノミーで検証して生成
    pub fn with_subcategory(
        top_level: TopLevelCategory,
        subcategory: &str,
        taxonomy: &Taxonomy,
    ) -> Result<Self> {
        let canonical = taxonomy.canonical_subcategory(top_level, subcategory).ok_or_else(|| {
            Error::Taxonomy(format!("{}に属さないサブカテゴリ: {}", top_level, subcategory))
        })?;
        Ok(Self {
            top_level,
            subcategory: Some(canonical.to_string()),
        })
    }
}

impl fmt::Display for CategoryLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subcategory {
            Some(sub) => write!(f, "{} > {}", self.top_level, sub),
            None => write!(f, "{}", self.top_level),
        }
    }
}

/// カテゴリコード → 階層パスの表
#[derive(Debug, Clone, Default)]
pub struct Taxonomy {
    /// カテゴリコード → ラベル
    codes: HashMap<String, CategoryLabel>,
    /// トップレベル → サブカテゴリ一覧
    subcategories: BTreeMap<TopLevelCategory, BTreeSet<String>>,
    /// トップレベル列挙外で読み飛ばした行数
    skipped_rows: usize,
}

impl Taxonomy {
    /// `overture_categories.csv` 形式を読み込む
    ///
    /// ```text
    /// Category code; Overture Taxonomy
    /// accommodation; [accommodation]
    /// bed_and_breakfast; [accommodation,bed_and_breakfast]
    /// ```
    pub fn from_csv_str(content: &str) -> Result<Self> {
        let mut lines = content.lines().filter(|l| !l.trim().is_empty());
        let header = lines
            .next()
            .ok_or_else(|| Error::Taxonomy("カテゴリCSVが空です".into()))?;
        let header_fields: Vec<String> = header.split(';').map(|h| h.trim().to_lowercase()).collect();
        let code_idx = header_fields
            .iter()
            .position(|h| h.contains("code") || h.contains("category"))
            .unwrap_or(0);
        let taxonomy_idx = header_fields
            .iter()
            .position(|h| h.contains("taxonomy") || h.contains("path") || h.contains("hierarchy"))
            .ok_or_else(|| Error::Taxonomy(format!("taxonomy列が見つかりません: {}", header)))?;

        let mut taxonomy = Taxonomy::default();

        for line in lines {
            let fields: Vec<&str> = line.split(';').map(str::trim).collect();
            let (Some(code), Some(path)) = (fields.get(code_idx), fields.get(taxonomy_idx)) else {
                taxonomy.skipped_rows += 1;
                continue;
            };
            let path = split_taxonomy_path(path);
            let Some(top_level) = path.first().and_then(|p| TopLevelCategory::lookup(p)) else {
                taxonomy.skipped_rows += 1;
                continue;
            };
            let subcategory = path.get(1).map(|s| s.to_string());
            if let Some(sub) = &subcategory {
                taxonomy
                    .subcategories
                    .entry(top_level)
                    .or_default()
                    .insert(sub.clone());
            }
            taxonomy.codes.insert(
                code.to_string(),
                CategoryLabel { top_level, subcategory },
            );
        }

        if taxonomy.codes.is_empty() {
            return Err(Error::Taxonomy("有効なカテゴリ行がありません".into()));
        }

        Ok(taxonomy)
    }

    pub fn from_csv(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_csv_str(&content)
    }

    /// カテゴリコードの正解ラベル（列挙外ならNone）
    pub fn label_for(&self, category_code: &str) -> Option<&CategoryLabel> {
        self.codes.get(category_code.trim())
    }

    /// トップレベルに属するサブカテゴリ一覧
    pub fn subcategories_of(&self, top_level: TopLevelCategory) -> Vec<&str> {
        self.subcategories
            .get(&top_level)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// 表記揺れを吸収して正規のサブカテゴリ名を返す
    pub fn canonical_subcategory(&self, top_level: TopLevelCategory, value: &str) -> Option<&str> {
        let key = normalize_key(value);
        self.subcategories
            .get(&top_level)?
            .iter()
            .find(|s| normalize_key(s) == key)
            .map(String::as_str)
    }

    /// 表に現れるトップレベル（ソート済み）
    pub fn top_levels(&self) -> Vec<TopLevelCategory> {
        let mut tops: BTreeSet<TopLevelCategory> = self.subcategories.keys().copied().collect();
        tops.extend(self.codes.values().map(|l| l.top_level));
        tops.into_iter().collect()
    }

    /// (トップレベル, サブカテゴリ) の全組
    pub fn subcategory_rows(&self) -> Vec<(TopLevelCategory, &str)> {
        self.subcategories
            .iter()
            .flat_map(|(top, subs)| subs.iter().map(move |s| (*top, s.as_str())))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }
}

/// "[a,b,c]" → ["a","b","c"]、"a > b" 形式も受け付ける
fn split_taxonomy_path(value: &str) -> Vec<&str> {
    let text = value.trim();
    let text = text
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .unwrap_or(text);
    let sep = if text.contains('>') { '>' } else { ',' };
    text.split(sep)
        .map(|p| p.trim().trim_matches('"').trim_matches('\''))
        .filter(|p| !p.is_empty())
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE_CSV: &str = "Category code; Overture Taxonomy
eat_and_drink; [eat_and_drink]
restaurant; [eat_and_drink,restaurant]
coffee_shop; [eat_and_drink,cafe,coffee_shop]
cafe; [eat_and_drink,cafe]
bar; [eat_and_drink,bar]
retail; [retail]
grocery_store; [retail,food,grocery_store]
bakery; [retail,food,bakery]
clothing_store; [retail,shopping,clothing_store]
hotel; [accommodation,hotel]
park; [attractions_and_activities,park]
unknown_thing; [not_a_top_level,thing]
";

    #[test]
    fn test_lookup_normalizes() {
        assert_eq!(TopLevelCategory::lookup("eat_and_drink"), Some(TopLevelCategory::EatAndDrink));
        assert_eq!(TopLevelCategory::lookup("eatanddrink"), Some(TopLevelCategory::EatAndDrink));
        assert_eq!(TopLevelCategory::lookup("Eat And Drink"), Some(TopLevelCategory::EatAndDrink));
        assert_eq!(TopLevelCategory::lookup("food"), None);
        assert_eq!(TopLevelCategory::lookup(""), None);
    }

    #[test]
    fn test_all_has_22_unique_keys() {
        let keys: BTreeSet<String> = TopLevelCategory::ALL.iter().map(|c| normalize_key(c.as_str())).collect();
        assert_eq!(TopLevelCategory::ALL.len(), 22);
        assert_eq!(keys.len(), 22);
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&TopLevelCategory::PublicServiceAndGovernment).unwrap();
        assert_eq!(json, "\"public_service_and_government\"");
    }

    #[test]
    fn test_from_csv_str() {
        let taxonomy = Taxonomy::from_csv_str(SAMPLE_CSV).unwrap();
        assert_eq!(taxonomy.len(), 11);
        assert_eq!(taxonomy.skipped_rows(), 1);

        let coffee = taxonomy.label_for("coffee_shop").unwrap();
        assert_eq!(coffee.top_level, TopLevelCategory::EatAndDrink);
        assert_eq!(coffee.subcategory.as_deref(), Some("cafe"));

        let top_only = taxonomy.label_for("retail").unwrap();
        assert_eq!(top_only.subcategory, None);

        assert!(taxonomy.label_for("unknown_thing").is_none());
    }

    #[test]
    fn test_subcategories_of() {
        let taxonomy = Taxonomy::from_csv_str(SAMPLE_CSV).unwrap();
        assert_eq!(
            taxonomy.subcategories_of(TopLevelCategory::EatAndDrink),
            vec!["bar", "cafe", "restaurant"]
        );
        assert_eq!(taxonomy.subcategories_of(TopLevelCategory::Retail), vec!["food", "shopping"]);
        assert!(taxonomy.subcategories_of(TopLevelCategory::Pets).is_empty());
    }

    #[test]
    fn test_label_with_subcategory_validation() {
        let taxonomy = Taxonomy::from_csv_str(SAMPLE_CSV).unwrap();
        let label = CategoryLabel::with_subcategory(TopLevelCategory::Retail, "Food", &taxonomy).unwrap();
        assert_eq!(label.subcategory.as_deref(), Some("food"));

        assert!(CategoryLabel::with_subcategory(TopLevelCategory::Retail, "cafe", &taxonomy).is_err());
    }

    #[test]
    fn test_empty_csv_is_error() {
        assert!(Taxonomy::from_csv_str("").is_err());
        assert!(Taxonomy::from_csv_str("Category code; Overture Taxonomy\n").is_err());
    }

    #[test]
    fn test_split_taxonomy_path_variants() {
        assert_eq!(split_taxonomy_path("[a,b]"), vec!["a", "b"]);
        assert_eq!(split_taxonomy_path("a > b > c"), vec!["a", "b", "c"]);
        assert_eq!(split_taxonomy_path("[]"), Vec::<&str>::new());
    }
}
