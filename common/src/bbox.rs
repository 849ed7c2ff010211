//! バウンディングボックス（EPSG:4326）
//!
//! west < east かつ south < north を構築時に検証し、以後は不変。

use crate::error::InvalidBoundingBoxError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// サンフランシスコ中心部（デフォルト抽出範囲）
pub const DEFAULT_BBOX: &str = "-122.52,37.70,-122.35,37.83";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    west: f64,
    south: f64,
    east: f64,
    north: f64,
}

impl BoundingBox {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Result<Self, InvalidBoundingBoxError> {
        for (name, value) in [("west", west), ("south", south), ("east", east), ("north", north)] {
            if !value.is_finite() {
                return Err(InvalidBoundingBoxError::new(format!("{}が有限値ではありません: {}", name, value)));
            }
        }
        if !(-180.0..=180.0).contains(&west) || !(-180.0..=180.0).contains(&east) {
            return Err(InvalidBoundingBoxError::new(format!(
                "経度が範囲外です: west={}, east={}",
                west, east
            )));
        }
        if !(-90.0..=90.0).contains(&south) || !(-90.0..=90.0).contains(&north) {
            return Err(InvalidBoundingBoxError::new(format!(
                "緯度が範囲外です: south={}, north={}",
                south, north
            )));
        }
        if west >= east {
            return Err(InvalidBoundingBoxError::new(format!(
                "west < east を満たしません: west={}, east={}",
                west, east
            )));
        }
        if south >= north {
            return Err(InvalidBoundingBoxError::new(format!(
                "south < north を満たしません: south={}, north={}",
                south, north
            )));
        }
        Ok(Self { west, south, east, north })
    }

    pub fn west(&self) -> f64 {
        self.west
    }

    pub fn south(&self) -> f64 {
        self.south
    }

    pub fn east(&self) -> f64 {
        self.east
    }

    pub fn north(&self) -> f64 {
        self.north
    }

    /// 点が範囲内か（境界を含む）
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.west && lon <= self.east && lat >= self.south && lat <= self.north
    }

    /// 矩形 [xmin, xmax] x [ymin, ymax] と交差するか
    ///
    /// 抽出時のフィルタ条件と同じ:
    /// `xmin <= east AND xmax >= west AND ymin <= north AND ymax >= south`
    pub fn intersects(&self, xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> bool {
        xmin <= self.east && xmax >= self.west && ymin <= self.north && ymax >= self.south
    }

    /// 中心緯度での経度方向の縮尺を考慮した横縦比（幅 / 高さ）
    pub fn aspect_ratio(&self) -> f64 {
        let mid_lat = ((self.south + self.north) / 2.0).to_radians();
        let width = (self.east - self.west) * mid_lat.cos().max(1e-6);
        let height = self.north - self.south;
        width / height
    }
}

impl FromStr for BoundingBox {
    type Err = InvalidBoundingBoxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(InvalidBoundingBoxError::new(format!(
                "west,south,east,north の4値が必要です: {}",
                s
            )));
        }
        let mut values = [0.0f64; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| InvalidBoundingBoxError::new(format!("数値ではありません: {}", part)))?;
        }
        Self::new(values[0], values[1], values[2], values[3])
    }
}

impl TryFrom<[f64; 4]> for BoundingBox {
    type Error = InvalidBoundingBoxError;

    fn try_from(v: [f64; 4]) -> Result<Self, Self::Error> {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.west, b.south, b.east, b.north]
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.west, self.south, self.east, self.north)
    }
}
