//! WKB（Well-Known Binary）の点ジオメトリ読み取り
//!
//! ISO WKB と EWKB（SRIDフラグ付き）の両方を受け付ける。
//! Point以外は型番号だけ返し、呼び出し側でスキップする。

use places_eval_common::Point;
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::io::{self, Cursor};

const EWKB_Z: u32 = 0x8000_0000;
const EWKB_M: u32 = 0x4000_0000;
const EWKB_SRID: u32 = 0x2000_0000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WkbShape {
    Point(Point),
    /// POINT EMPTY（座標がNaN）
    Empty,
    /// Point以外（基本型番号 1-7）
    Other(u32),
}

pub fn read_shape(wkb: &[u8]) -> io::Result<WkbShape> {
    let mut cursor = Cursor::new(wkb);
    let little_endian = match cursor.read_u8()? {
        0 => false,
        1 => true,
        other => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("不正なバイト順: {}", other),
            ))
        }
    };

    let raw_type = read_u32(&mut cursor, little_endian)?;
    let has_srid = raw_type & EWKB_SRID != 0;
    let flags = raw_type & (EWKB_Z | EWKB_M | EWKB_SRID);
    // ISO: 1001 / 2001 / 3001
    let base_type = (raw_type & !flags) % 1000;

    if base_type != 1 {
        return Ok(WkbShape::Other(base_type));
    }
    if has_srid {
        read_u32(&mut cursor, little_endian)?;
    }

    let lon = read_f64(&mut cursor, little_endian)?;
    let lat = read_f64(&mut cursor, little_endian)?;
    if lon.is_nan() || lat.is_nan() {
        return Ok(WkbShape::Empty);
    }
    Ok(WkbShape::Point(Point { lon, lat }))
}

fn read_u32(cursor: &mut Cursor<&[u8]>, little_endian: bool) -> io::Result<u32> {
    if little_endian {
        cursor.read_u32::<LittleEndian>()
    } else {
        cursor.read_u32::<BigEndian>()
    }
}

fn read_f64(cursor: &mut Cursor<&[u8]>, little_endian: bool) -> io::Result<f64> {
    if little_endian {
        cursor.read_f64::<LittleEndian>()
    } else {
        cursor.read_f64::<BigEndian>()
    }
}

/// 点をリトルエンディアンWKBに書き出す（テストデータ作成用）
pub fn write_point(lon: f64, lat: f64) -> Vec<u8> {
    let mut out = Vec::with_capacity(21);
    out.push(1);
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&lon.to_le_bytes());
    out.extend_from_slice(&lat.to_le_bytes());
    out
}
