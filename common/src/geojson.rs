//! GeoJSON 変換
//!
//! PoiRecord ⇔ Feature の相互変換。書き出した文書を読み戻すと
//! id / name / category / geometry が完全に復元される。

use crate::error::{Error, Result};
use crate::types::{Point, PoiContext, PoiRecord};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: String,
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: String,
    pub geometry: Geometry,
    pub properties: FeatureProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: [f64; 2],
}

/// Feature のプロパティ（列名は元のエクスポート形式に合わせる）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureProperties {
    pub id: String,
    pub primary_name: String,
    pub primary_category: Option<String>,
    pub alternate_categories: Vec<String>,
    pub confidence: Option<f64>,
    pub basic_category: Option<String>,
    pub operating_status: Option<String>,
    pub addresses: Vec<String>,
    pub brand: Option<String>,
    pub alternate_names: Vec<String>,
}

impl From<&PoiRecord> for Feature {
    fn from(r: &PoiRecord) -> Self {
        Feature {
            kind: "Feature".into(),
            geometry: Geometry {
                kind: "Point".into(),
                coordinates: [r.geometry.lon, r.geometry.lat],
            },
            properties: FeatureProperties {
                id: r.id.clone(),
                primary_name: r.name.clone(),
                primary_category: r.category.clone(),
                alternate_categories: r.alternate_categories.clone(),
                confidence: r.confidence,
                basic_category: r.basic_category.clone(),
                operating_status: r.context.operating_status.clone(),
                addresses: r.context.addresses.clone(),
                brand: r.context.brand.clone(),
                alternate_names: r.context.alternate_names.clone(),
            },
        }
    }
}

impl TryFrom<Feature> for PoiRecord {
    type Error = Error;

    fn try_from(f: Feature) -> Result<Self> {
        if f.geometry.kind != "Point" {
            return Err(Error::Parse(format!(
                "Point以外のジオメトリ: {} (id={})",
                f.geometry.kind, f.properties.id
            )));
        }
        let p = f.properties;
        Ok(PoiRecord {
            id: p.id,
            geometry: Point {
                lon: f.geometry.coordinates[0],
                lat: f.geometry.coordinates[1],
            },
            name: p.primary_name,
            category: p.primary_category,
            alternate_categories: p.alternate_categories,
            confidence: p.confidence,
            basic_category: p.basic_category,
            context: PoiContext {
                operating_status: p.operating_status,
                addresses: p.addresses,
                brand: p.brand,
                alternate_names: p.alternate_names,
            },
        })
    }
}

pub fn to_feature_collection(records: &[PoiRecord]) -> FeatureCollection {
    FeatureCollection {
        kind: "FeatureCollection".into(),
        features: records.iter().map(Feature::from).collect(),
    }
}

/// GeoJSON文字列からPOIを読み込む
pub fn parse_feature_collection(content: &str) -> Result<Vec<PoiRecord>> {
    let collection: FeatureCollection = serde_json::from_str(content)?;
    if collection.kind != "FeatureCollection" {
        return Err(Error::Parse(format!("FeatureCollectionではありません: {}", collection.kind)));
    }
    collection.features.into_iter().map(PoiRecord::try_from).collect()
}

pub fn read_feature_collection(path: &std::path::Path) -> Result<Vec<PoiRecord>> {
    let content = std::fs::read_to_string(path)?;
    parse_feature_collection(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<PoiRecord> {
        let mut a = PoiRecord::new("08f2", -122.4194, 37.7749, "Tartine Bakery").with_category("bakery");
        a.confidence = Some(0.97);
        a.context.addresses = vec!["600 Guerrero St".into()];
        a.context.operating_status = Some("open".into());
        let b = PoiRecord::new("08f3", -122.40, 37.79, "Ferry Building");
        vec![a, b]
    }

    #[test]
    fn test_roundtrip_preserves_identity_fields() {
        let records = sample();
        let json = serde_json::to_string(&to_feature_collection(&records)).unwrap();
        let parsed = parse_feature_collection(&json).unwrap();

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].id, "08f2");
        assert_eq!(parsed[0].name, "Tartine Bakery");
        assert_eq!(parsed[0].category.as_deref(), Some("bakery"));
        assert_eq!(parsed[0].geometry, records[0].geometry);
        assert_eq!(parsed[0].context.addresses, vec!["600 Guerrero St".to_string()]);
        assert_eq!(parsed[1].category, None);
    }

    #[test]
    fn test_geometry_is_lon_lat() {
        let fc = to_feature_collection(&sample());
        let value = serde_json::to_value(&fc).unwrap();
        assert_eq!(value["type"], "FeatureCollection");
        assert_eq!(value["features"][0]["geometry"]["type"], "Point");
        assert_eq!(value["features"][0]["geometry"]["coordinates"][0], -122.4194);
        assert_eq!(value["features"][0]["properties"]["primary_name"], "Tartine Bakery");
    }

    #[test]
    fn test_rejects_non_point() {
        let json = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","geometry":{"type":"LineString","coordinates":[0,0]},"properties":{"id":"x"}}
        ]}"#;
        assert!(parse_feature_collection(json).is_err());
    }
}
