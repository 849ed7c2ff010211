//! 表形式（CSV）の読み書き
//!
//! 評価成果物はすべてヘッダー固定のCSVで出力する。
//! フィールド内の改行は扱わない簡易パーサー（書き出し時は空白に置換）。

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::io::Write;

/// 読み込んだCSV
#[derive(Debug, Clone, Default)]
pub struct Table {
    headers: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn parse(content: &str) -> Result<Self> {
        let mut lines = content.lines().filter(|l| !l.trim().is_empty());
        let header_line = lines.next().ok_or_else(|| Error::Parse("CSVが空です".into()))?;
        let headers: Vec<String> = parse_csv_line(header_line.trim_start_matches('\u{feff}'));
        let index = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().to_string(), i))
            .collect();
        let rows = lines.map(parse_csv_line).collect();
        Ok(Self { headers, index, rows })
    }

    pub fn read(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(move |values| Row { table: self, values })
    }
}

/// 1行分のビュー
pub struct Row<'a> {
    table: &'a Table,
    values: &'a [String],
}

impl<'a> Row<'a> {
    /// 列値（列なし・空文字はNone）
    pub fn get(&self, column: &str) -> Option<&'a str> {
        let idx = *self.table.index.get(column)?;
        self.values
            .get(idx)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// 数値に変換（変換できなければNone）
    pub fn get_f64(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(|v| v.trim().parse().ok())
    }

    /// `|` 区切りのリスト列
    pub fn get_list(&self, column: &str) -> Vec<String> {
        self.get(column)
            .map(|v| v.split('|').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// 先頭列（混同行列の行ラベルなど）
    pub fn first(&self) -> &'a str {
        self.values.first().map(String::as_str).unwrap_or("")
    }

    pub fn values(&self) -> &'a [String] {
        self.values
    }
}

/// ヘッダー付きCSVを書き出す
pub struct CsvWriter<W: Write> {
    inner: W,
    columns: usize,
}

impl<W: Write> CsvWriter<W> {
    pub fn new(mut inner: W, headers: &[&str]) -> Result<Self> {
        write_record(&mut inner, headers.iter().copied())?;
        Ok(Self {
            inner,
            columns: headers.len(),
        })
    }

    pub fn write_row<I, S>(&mut self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let values: Vec<S> = values.into_iter().collect();
        if values.len() != self.columns {
            return Err(Error::Parse(format!(
                "列数が一致しません: expected {}, got {}",
                self.columns,
                values.len()
            )));
        }
        write_record(&mut self.inner, values.iter().map(|v| v.as_ref()))
    }

    pub fn into_inner(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

fn write_record<'a, W: Write>(w: &mut W, values: impl Iterator<Item = &'a str>) -> Result<()> {
    let line = values.map(quote_field).collect::<Vec<_>>().join(",");
    writeln!(w, "{}", line)?;
    Ok(())
}

/// 必要な場合のみクォート（内部の " は "" にエスケープ）
pub fn quote_field(value: &str) -> String {
    let value = value.replace(['\r', '\n'], " ");
    if value.contains([',', '"']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value
    }
}

/// CSV 1行をパース
fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                // フィールド終了
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }

    // 最後のフィールド
    fields.push(current);
    fields
}
