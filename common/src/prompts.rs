//! プロンプト生成モジュール
//!
//! - build_categorize_prompt: POI 1件をトップレベルカテゴリへ分類させるプロンプト
//! - 紛らわしい2クラスの再判定時はサブカテゴリ列挙を添える

use crate::evaluation::DisambiguationContext;
use crate::taxonomy::TopLevelCategory;
use crate::types::PoiRecord;

/// 応答JSONのキー
pub const RESPONSE_KEY: &str = "top_level_category";

/// 分類プロンプト生成
///
/// # Arguments
/// * `poi` - 分類対象
/// * `include_context` - 営業状態・住所・ブランド・別名を含めるか
/// * `disambiguation` - 紛らわしいペアのサブカテゴリ列挙（2回目の判定時のみ）
pub fn build_categorize_prompt(
    poi: &PoiRecord,
    include_context: bool,
    disambiguation: Option<&DisambiguationContext>,
) -> String {
    let categories = TopLevelCategory::ALL
        .iter()
        .map(|c| format!("- {}", c))
        .collect::<Vec<_>>()
        .join("\n");

    let context_block = if include_context {
        format_context(poi)
    } else {
        String::new()
    };

    let disambiguation_block = disambiguation
        .map(format_disambiguation)
        .unwrap_or_default();

    format!(
        r#"You are classifying Points of Interest (POIs) into top-level Overture Places categories.

Possible top-level categories:
{categories}

Given the POI name:

"{name}"
{context_block}{disambiguation_block}
Choose exactly ONE category from the list above.
Return your answer strictly as JSON in this format:

{{"{key}": "<one_of_the_categories_above>", "subcategory": "<optional subcategory>"}}
"#,
        name = poi.name.replace('"', "'"),
        key = RESPONSE_KEY,
    )
}

fn format_context(poi: &PoiRecord) -> String {
    let ctx = &poi.context;
    if ctx.is_empty() {
        return String::new();
    }
    let mut lines = Vec::new();
    if let Some(status) = &ctx.operating_status {
        lines.push(format!("- operating status: {}", status));
    }
    if !ctx.addresses.is_empty() {
        lines.push(format!("- address: {}", ctx.addresses.join("; ")));
    }
    if let Some(brand) = &ctx.brand {
        lines.push(format!("- brand: {}", brand));
    }
    if !ctx.alternate_names.is_empty() {
        lines.push(format!("- also known as: {}", ctx.alternate_names.join(", ")));
    }
    format!("\nAdditional context:\n{}\n", lines.join("\n"))
}

fn format_disambiguation(ctx: &DisambiguationContext) -> String {
    let blocks = ctx
        .entries()
        .map(|(top, subs)| {
            let list = if subs.is_empty() {
                "(no subcategories listed)".to_string()
            } else {
                subs.join(", ")
            };
            format!("- {}: {}", top, list)
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "\nThis POI is often confused between the categories below. Use their subcategories to decide, \
and report the best matching subcategory:\n{}\n",
        blocks
    )
}
