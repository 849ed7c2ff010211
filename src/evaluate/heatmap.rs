//! 混同行列ヒートマップ（PNG）
//!
//! 1セル = CELL px の正方形。色は件数の最大値に対する比率で白→青。
//! 対角セル（正解＝予測のラベル）は枠で囲む。行・列の並びは confusion.csv と同じ。

use super::tables::ConfusionTable;
use image::{Rgb, RgbImage};

pub const CELL: u32 = 32;
const MARGIN: u32 = 8;

const GRID: Rgb<u8> = Rgb([220, 220, 220]);
const DIAGONAL: Rgb<u8> = Rgb([200, 60, 40]);
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// 白 (247,251,255) → 濃い青 (8,48,107)
fn blues(t: f64) -> Rgb<u8> {
    let t = t.clamp(0.0, 1.0);
    let lerp = |a: f64, b: f64| (a + (b - a) * t).round() as u8;
    Rgb([lerp(247.0, 8.0), lerp(251.0, 48.0), lerp(255.0, 107.0)])
}

pub fn render_heatmap(table: &ConfusionTable) -> RgbImage {
    let cols = table.predicted_labels.len().max(1) as u32;
    let rows = table.truth_labels.len().max(1) as u32;
    let width = cols * CELL + MARGIN * 2;
    let height = rows * CELL + MARGIN * 2;
    let mut img = RgbImage::from_pixel(width, height, BACKGROUND);

    let max = table.max_count().max(1) as f64;
    for (r, row) in table.counts.iter().enumerate() {
        for (c, count) in row.iter().enumerate() {
            let x0 = MARGIN + c as u32 * CELL;
            let y0 = MARGIN + r as u32 * CELL;
            let color = blues(*count as f64 / max);
            fill_cell(&mut img, x0, y0, color);

            let same_label = table.truth_labels.get(r) == table.predicted_labels.get(c);
            outline_cell(&mut img, x0, y0, if same_label { DIAGONAL } else { GRID });
        }
    }
    img
}

fn fill_cell(img: &mut RgbImage, x0: u32, y0: u32, color: Rgb<u8>) {
    for y in y0..y0 + CELL {
        for x in x0..x0 + CELL {
            img.put_pixel(x, y, color);
        }
    }
}

fn outline_cell(img: &mut RgbImage, x0: u32, y0: u32, color: Rgb<u8>) {
    let (x1, y1) = (x0 + CELL - 1, y0 + CELL - 1);
    for x in x0..=x1 {
        img.put_pixel(x, y0, color);
        img.put_pixel(x, y1, color);
    }
    for y in y0..=y1 {
        img.put_pixel(x0, y, color);
        img.put_pixel(x1, y, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ConfusionTable {
        ConfusionTable {
            truth_labels: vec!["eat_and_drink".into(), "retail".into()],
            predicted_labels: vec!["eat_and_drink".into(), "retail".into(), "travel".into()],
            counts: vec![vec![4, 1, 0], vec![0, 2, 1]],
        }
    }

    #[test]
    fn test_size_matches_matrix() {
        let img = render_heatmap(&table());
        assert_eq!(img.dimensions(), (3 * CELL + 2 * MARGIN, 2 * CELL + 2 * MARGIN));
    }

    #[test]
    fn test_max_cell_is_darkest() {
        let img = render_heatmap(&table());
        let center = |r: u32, c: u32| *img.get_pixel(MARGIN + c * CELL + CELL / 2, MARGIN + r * CELL + CELL / 2);
        assert_eq!(center(0, 0), blues(1.0));
        assert_eq!(center(0, 2), blues(0.0));
        // 対角は枠色
        assert_eq!(*img.get_pixel(MARGIN, MARGIN), DIAGONAL);
    }
}
