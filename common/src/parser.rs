//! LLMレスポンスパーサー
//!
//! 分類器の自然言語出力から CategoryLabel を取り出す。
//!
//! 抽出優先順位:
//! 1. ```json ... ``` ブロック、または生の {...} オブジェクト
//! 2. 本文中で最初に現れるカテゴリ名（単語境界で照合）
//! 3. エラー（UnparseableLabel として扱われる）

use crate::error::{Error, Result};
use crate::taxonomy::{normalize_key, CategoryLabel, Taxonomy, TopLevelCategory};

/// APIレスポンスからJSONオブジェクト部分を抽出
///
/// # Examples
/// ```
/// use places_eval_common::extract_json_object;
///
/// let response = "Answer: {\"top_level_category\": \"retail\"}";
/// let json = extract_json_object(response).unwrap();
/// assert!(json.starts_with('{'));
/// ```
pub fn extract_json_object(response: &str) -> Result<&str> {
    // ```json ... ``` ブロックを探す
    if let Some(start_marker) = response.find("```json") {
        let start = start_marker + 7; // "```json" の長さ
        if let Some(end_offset) = response[start..].find("```") {
            let end = start + end_offset;
            return Ok(response[start..end].trim());
        }
    }

    // 生の {...} を探す
    if let Some(start) = response.find('{') {
        if let Some(end) = response.rfind('}') {
            if end >= start {
                return Ok(&response[start..=end]);
            }
        }
    }

    Err(Error::Parse("JSONが見つかりません".into()))
}

/// 分類レスポンスをパース
///
/// サブカテゴリは `taxonomy` が与えられた場合のみ検証し、
/// 該当トップレベルに存在しない値は捨てる（トップレベルは保持）。
pub fn parse_label_response(response: &str, taxonomy: Option<&Taxonomy>) -> Result<CategoryLabel> {
    let text = response.trim();
    if text.is_empty() {
        return Err(Error::Parse("空のレスポンス".into()));
    }

    if let Some((top_level, subcategory)) = parse_json_label(text) {
        let subcategory = match (subcategory, taxonomy) {
            (Some(sub), Some(tax)) => tax.canonical_subcategory(top_level, &sub).map(str::to_string),
            _ => None,
        };
        return Ok(CategoryLabel { top_level, subcategory });
    }

    // フォールバック: 本文中のカテゴリ名
    find_category_in_text(text)
        .map(CategoryLabel::top_level)
        .ok_or_else(|| {
            let preview: String = text.chars().take(80).collect();
            Error::Parse(format!("カテゴリ列挙に一致しません: {}", preview))
        })
}

fn parse_json_label(text: &str) -> Option<(TopLevelCategory, Option<String>)> {
    let json_str = extract_json_object(text).ok()?;
    let value: serde_json::Value = serde_json::from_str(json_str).ok()?;
    let object = value.as_object()?;

    let mut top_level = None;
    let mut subcategory = None;
    for (key, v) in object {
        match normalize_key(key).as_str() {
            "toplevelcategory" | "category" | "toplevel" if top_level.is_none() => {
                top_level = v.as_str().and_then(TopLevelCategory::lookup);
            }
            "subcategory" => {
                subcategory = v
                    .as_str()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string);
            }
            _ => {}
        }
    }
    top_level.map(|t| (t, subcategory))
}

/// 本文中で最初に現れるカテゴリ（同位置なら長い方）
fn find_category_in_text(text: &str) -> Option<TopLevelCategory> {
    let lower = text.to_lowercase();
    let mut best: Option<(usize, usize, TopLevelCategory)> = None;

    for &category in TopLevelCategory::ALL {
        let snake = category.as_str();
        let variants = [
            snake.to_string(),
            snake.replace('_', " "),
            normalize_key(snake),
        ];
        for variant in &variants {
            if let Some(pos) = find_word(&lower, variant) {
                let candidate = (pos, variant.len(), category);
                best = match best {
                    Some((p, len, _)) if p < pos || (p == pos && len >= variant.len()) => best,
                    _ => Some(candidate),
                };
            }
        }
    }

    best.map(|(_, _, c)| c)
}

/// 単語境界つきの部分文字列検索（"carpets" に "pets" は一致しない）
fn find_word(haystack: &str, needle: &str) -> Option<usize> {
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';
    let mut from = 0;
    while let Some(offset) = haystack[from..].find(needle) {
        let start = from + offset;
        let end = start + needle.len();
        let before_ok = haystack[..start].chars().next_back().map_or(true, |c| !is_word(c));
        let after_ok = haystack[end..].chars().next().map_or(true, |c| !is_word(c));
        if before_ok && after_ok {
            return Some(start);
        }
        from = start + haystack[start..].chars().next().map_or(1, char::len_utf8);
    }
    None
}
