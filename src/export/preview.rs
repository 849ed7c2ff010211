//! 静的プレビュー画像（PNG）
//!
//! 長辺1024px、短辺は範囲の縦横比（中心緯度で経度を補正）に合わせる。

use image::{ImageFormat, Rgb, RgbImage};
use places_eval_common::{BoundingBox, PoiRecord};
use std::io::Cursor;

pub const LONG_SIDE: u32 = 1024;

const BACKGROUND: Rgb<u8> = Rgb([245, 245, 240]);
const FRAME: Rgb<u8> = Rgb([190, 190, 185]);
const MARKER: Rgb<u8> = Rgb([31, 119, 180]);

/// 画像サイズ（幅, 高さ）
pub fn preview_dimensions(bbox: &BoundingBox) -> (u32, u32) {
    let aspect = bbox.aspect_ratio();
    if aspect >= 1.0 {
        let height = (LONG_SIDE as f64 / aspect).round().max(1.0) as u32;
        (LONG_SIDE, height.min(LONG_SIDE))
    } else {
        let width = (LONG_SIDE as f64 * aspect).round().max(1.0) as u32;
        (width.min(LONG_SIDE), LONG_SIDE)
    }
}

pub fn render_preview(records: &[PoiRecord], bbox: &BoundingBox) -> RgbImage {
    let (width, height) = preview_dimensions(bbox);
    let mut img = RgbImage::from_pixel(width, height, BACKGROUND);

    for x in 0..width {
        img.put_pixel(x, 0, FRAME);
        img.put_pixel(x, height - 1, FRAME);
    }
    for y in 0..height {
        img.put_pixel(0, y, FRAME);
        img.put_pixel(width - 1, y, FRAME);
    }

    let span_x = bbox.east() - bbox.west();
    let span_y = bbox.north() - bbox.south();
    for record in records {
        let p = record.geometry;
        if !bbox.contains(p.lon, p.lat) {
            continue;
        }
        let x = ((p.lon - bbox.west()) / span_x * (width - 1) as f64).round() as i64;
        let y = ((bbox.north() - p.lat) / span_y * (height - 1) as f64).round() as i64;
        draw_marker(&mut img, x, y);
    }
    img
}

/// 3x3 の点
fn draw_marker(img: &mut RgbImage, cx: i64, cy: i64) {
    for dy in -1..=1 {
        for dx in -1..=1 {
            let (x, y) = (cx + dx, cy + dy);
            if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
                img.put_pixel(x as u32, y as u32, MARKER);
            }
        }
    }
}

pub fn encode_png(img: &RgbImage) -> image::ImageResult<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}
