//! 公開S3バケットへのHTTPアクセス
//!
//! 認証なしのListObjectsV2で一覧し、パーツ本体はRangeリクエストで
//! フッターと必要な列チャンクだけを読む。blocking クライアントを使うため
//! 非同期ランタイム上では `spawn_blocking` 内から呼び出すこと。

use super::{is_parquet_key, PartObject, PartSource};
use crate::error::ExtractionError;
use bytes::{Buf, Bytes};
use parquet::errors::ParquetError;
use parquet::file::reader::{ChunkReader, Length};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::blocking::Client;
use reqwest::header::RANGE;
use reqwest::StatusCode;
use std::io::{self, Read};
use std::sync::Arc;
use std::time::Duration;

/// `get_read` で逐次読みする際の1回の取得サイズ
const READ_WINDOW: usize = 64 * 1024;

pub struct S3Source {
    client: Client,
    endpoint: String,
}

impl S3Source {
    /// 仮想ホスト形式のエンドポイントで作成
    pub fn new(bucket: &str, region: &str, timeout: Duration) -> Result<Self, ExtractionError> {
        Self::with_endpoint(format!("https://{}.s3.{}.amazonaws.com", bucket, region), timeout)
    }

    pub fn with_endpoint(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ExtractionError> {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ExtractionError::Network {
                url: endpoint.clone(),
                source,
            })?;
        Ok(Self { client, endpoint })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.endpoint, key)
    }

    fn list_page(&self, prefix: &str, token: Option<&str>) -> Result<ListPage, ExtractionError> {
        let url = format!("{}/", self.endpoint);
        let mut query = vec![("list-type", "2"), ("prefix", prefix)];
        if let Some(token) = token {
            query.push(("continuation-token", token));
        }

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .map_err(|source| ExtractionError::Network {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractionError::HttpStatus {
                url,
                status: status.as_u16(),
            });
        }

        let body = response.text().map_err(|source| ExtractionError::Network {
            url: url.clone(),
            source,
        })?;
        parse_list_page(&url, &body)
    }
}

impl PartSource for S3Source {
    type Reader = HttpRangeReader;

    fn describe(&self) -> String {
        self.endpoint.clone()
    }

    fn list(&self, prefix: &str) -> Result<Vec<PartObject>, ExtractionError> {
        let mut parts = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let page = self.list_page(prefix, token.as_deref())?;
            tracing::debug!(objects = page.objects.len(), truncated = page.next_token.is_some(), "一覧ページ取得");
            parts.extend(page.objects.into_iter().filter(|p| is_parquet_key(&p.key)));

            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        parts.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(parts)
    }

    fn open(&self, part: &PartObject) -> Result<HttpRangeReader, ExtractionError> {
        Ok(HttpRangeReader::new(
            self.client.clone(),
            self.object_url(&part.key),
            part.size,
        ))
    }
}

/// ListObjectsV2 レスポンス1ページ分
#[derive(Debug, Default)]
pub(crate) struct ListPage {
    pub objects: Vec<PartObject>,
    pub next_token: Option<String>,
}

pub(crate) fn parse_list_page(url: &str, body: &str) -> Result<ListPage, ExtractionError> {
    let invalid = |reason: String| ExtractionError::Listing {
        url: url.to_string(),
        reason,
    };

    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut path: Vec<String> = Vec::new();
    let mut objects = Vec::new();
    let mut key: Option<String> = None;
    let mut size: u64 = 0;
    let mut truncated = false;
    let mut token: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == "Contents" {
                    key = None;
                    size = 0;
                }
                path.push(name);
            }
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().map_err(|err| invalid(err.to_string()))?;
                let depth = path.len();
                let parent = depth.checked_sub(2).and_then(|i| path.get(i)).map(String::as_str);
                match (parent, path.last().map(String::as_str)) {
                    (Some("Contents"), Some("Key")) => key = Some(text.into_owned()),
                    (Some("Contents"), Some("Size")) => {
                        size = text
                            .trim()
                            .parse()
                            .map_err(|_| invalid(format!("Size が数値ではありません: {}", text)))?;
                    }
                    (Some("ListBucketResult"), Some("IsTruncated")) => truncated = text.trim() == "true",
                    (Some("ListBucketResult"), Some("NextContinuationToken")) => {
                        token = Some(text.into_owned())
                    }
                    _ => {}
                }
            }
            Ok(Event::End(_)) => {
                if path.pop().as_deref() == Some("Contents") {
                    if let Some(key) = key.take() {
                        objects.push(PartObject { key, size });
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(invalid(format!(
                    "{} バイト目付近: {}",
                    reader.buffer_position(),
                    err
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    let next_token = match (truncated, token) {
        (false, _) => None,
        (true, Some(token)) => Some(token),
        (true, None) => {
            return Err(invalid(
                "IsTruncated=true ですが NextContinuationToken がありません".to_string(),
            ))
        }
    };

    Ok(ListPage { objects, next_token })
}

/// Rangeリクエストで読むParquetリーダー
#[derive(Clone)]
pub struct HttpRangeReader {
    inner: Arc<RangeTarget>,
}

struct RangeTarget {
    client: Client,
    url: String,
    len: u64,
}

impl HttpRangeReader {
    pub fn new(client: Client, url: String, len: u64) -> Self {
        Self {
            inner: Arc::new(RangeTarget { client, url, len }),
        }
    }

    fn fetch(&self, start: u64, length: usize) -> Result<Bytes, ExtractionError> {
        if length == 0 {
            return Ok(Bytes::new());
        }
        let target = &self.inner;
        let end = start + length as u64 - 1;

        let response = target
            .client
            .get(&target.url)
            .header(RANGE, format!("bytes={}-{}", start, end))
            .send()
            .map_err(|source| ExtractionError::Network {
                url: target.url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractionError::HttpStatus {
                url: target.url.clone(),
                status: status.as_u16(),
            });
        }

        let mut body = response.bytes().map_err(|source| ExtractionError::Network {
            url: target.url.clone(),
            source,
        })?;

        // Rangeを無視して全体を返すサーバー
        if status == StatusCode::OK && body.len() as u64 > end {
            body = body.slice(start as usize..=end as usize);
        }

        if body.len() != length {
            return Err(ExtractionError::Io {
                path: target.url.clone(),
                source: io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("{} bytes 要求に対して {} bytes", length, body.len()),
                ),
            });
        }
        Ok(body)
    }
}

impl Length for HttpRangeReader {
    fn len(&self) -> u64 {
        self.inner.len
    }
}

impl ChunkReader for HttpRangeReader {
    type T = WindowedRead;

    fn get_read(&self, start: u64) -> parquet::errors::Result<WindowedRead> {
        Ok(WindowedRead {
            reader: self.clone(),
            next_offset: start,
            buffer: Bytes::new(),
        })
    }

    fn get_bytes(&self, start: u64, length: usize) -> parquet::errors::Result<Bytes> {
        self.fetch(start, length)
            .map_err(|e| ParquetError::External(Box::new(e)))
    }
}

/// 指定位置から必要な分だけ順に取得する Read
pub struct WindowedRead {
    reader: HttpRangeReader,
    next_offset: u64,
    buffer: Bytes,
}

impl Read for WindowedRead {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.buffer.is_empty() {
            let remaining = self.reader.len().saturating_sub(self.next_offset);
            if remaining == 0 {
                return Ok(0);
            }
            let window = remaining.min(READ_WINDOW as u64) as usize;
            self.buffer = self
                .reader
                .fetch(self.next_offset, window)
                .map_err(io::Error::other)?;
            self.next_offset += self.buffer.len() as u64;
        }

        let n = out.len().min(self.buffer.len());
        out[..n].copy_from_slice(&self.buffer[..n]);
        self.buffer.advance(n);
        Ok(n)
    }
}
