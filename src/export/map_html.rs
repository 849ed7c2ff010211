//! インタラクティブ地図（Leaflet）
//!
//! GeoJSONをHTML内に埋め込んだ1ファイルの文書を生成する。
//! 地図タイルとLeaflet本体はCDNから読み込む。

use places_eval_common::geojson::to_feature_collection;
use places_eval_common::{BoundingBox, PoiRecord};

const LEAFLET_VERSION: &str = "1.9.4";

/// `</script>` で埋め込みが閉じないようにする
fn escape_for_script(json: &str) -> String {
    json.replace("</", "<\\/")
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn render_map_html(
    records: &[PoiRecord],
    bbox: &BoundingBox,
    release: &str,
) -> serde_json::Result<String> {
    let collection = to_feature_collection(records);
    let data = escape_for_script(&serde_json::to_string(&collection)?);
    let title = escape_html(&format!("Overture places (release {})", release));

    Ok(format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<link rel="stylesheet" href="https://unpkg.com/leaflet@{version}/dist/leaflet.css">
<script src="https://unpkg.com/leaflet@{version}/dist/leaflet.js"></script>
<style>
  html, body, #map {{ height: 100%; margin: 0; }}
  .legend {{ background: #fff; padding: 6px 10px; font: 13px sans-serif; }}
</style>
</head>
<body>
<div id="map"></div>
<script>
const places = {data};
const map = L.map("map");
L.tileLayer("https://{{s}}.tile.openstreetmap.org/{{z}}/{{x}}/{{y}}.png", {{
  maxZoom: 19,
  attribution: "&copy; OpenStreetMap contributors"
}}).addTo(map);

function esc(value) {{
  return String(value ?? "").replace(/[&<>"]/g, c => ({{"&": "&amp;", "<": "&lt;", ">": "&gt;", '"': "&quot;"}}[c]));
}}

L.geoJSON(places, {{
  pointToLayer: (feature, latlng) => L.circleMarker(latlng, {{
    radius: 4, weight: 1, color: "#1f77b4", fillOpacity: 0.7
  }}),
  onEachFeature: (feature, layer) => {{
    const p = feature.properties;
    layer.bindPopup(
      "<b>" + esc(p.primary_name) + "</b><br>" +
      "category: " + esc(p.primary_category) + "<br>" +
      "confidence: " + esc(p.confidence) + "<br>" +
      "id: " + esc(p.id)
    );
  }}
}}).addTo(map);

map.fitBounds([[{south}, {west}], [{north}, {east}]]);

const legend = L.control({{ position: "topright" }});
legend.onAdd = () => {{
  const div = L.DomUtil.create("div", "legend");
  div.innerHTML = "{title}<br>" + places.features.length + " places";
  return div;
}};
legend.addTo(map);
</script>
</body>
</html>
"##,
        title = title,
        version = LEAFLET_VERSION,
        data = data,
        south = bbox.south(),
        west = bbox.west(),
        north = bbox.north(),
        east = bbox.east(),
    ))
}
