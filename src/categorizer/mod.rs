//! 分類器クライアント
//!
//! POI 1件ごとにプロンプトを組み立ててバックエンドへ送り、応答を
//! CategoryLabel に解釈する。呼び出しは互いに独立で、上限付きで並行実行する。
//!
//! - 一時的な失敗は待ってから1回だけ再試行
//! - 解釈できない応答は再試行せず UnparseableLabelError
//! - 応答キャッシュは任意（--use-cache）

pub mod backend;
pub mod cache;
pub mod cli_backend;

pub use backend::{BackendError, CompletionBackend, OpenAiBackend};
pub use cache::ResponseCache;
pub use cli_backend::CliBackend;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use places_eval_common::{
    build_categorize_prompt, parse_label_response, CategoryLabel, DisambiguationContext,
    PoiRecord, PredictionOutcome, Taxonomy, UnparseableLabelError,
};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

#[async_trait]
pub trait Categorizer: Send + Sync {
    async fn categorize(
        &self,
        poi: &PoiRecord,
        disambiguation: Option<&DisambiguationContext>,
    ) -> Result<CategoryLabel, UnparseableLabelError>;
}

pub struct LlmCategorizer<B: CompletionBackend> {
    backend: B,
    taxonomy: Option<Taxonomy>,
    include_context: bool,
    retry_backoff: Duration,
    cache: Option<Mutex<ResponseCache>>,
}

impl<B: CompletionBackend> LlmCategorizer<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            taxonomy: None,
            include_context: false,
            retry_backoff: Duration::from_millis(1000),
            cache: None,
        }
    }

    /// サブカテゴリ検証用
    pub fn with_taxonomy(mut self, taxonomy: Taxonomy) -> Self {
        self.taxonomy = Some(taxonomy);
        self
    }

    /// 営業状態・住所・ブランド・別名をプロンプトに含める
    pub fn with_context(mut self, include_context: bool) -> Self {
        self.include_context = include_context;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(Mutex::new(cache));
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn cache_len(&self) -> usize {
        self.cache
            .as_ref()
            .and_then(|c| c.lock().ok().map(|c| c.len()))
            .unwrap_or(0)
    }

    pub fn save_cache(&self, folder: &Path) -> crate::error::Result<()> {
        if let Some(cache) = &self.cache {
            if let Ok(cache) = cache.lock() {
                cache.save(folder)?;
            }
        }
        Ok(())
    }

    fn cached(&self, key: &str) -> Option<String> {
        let cache = self.cache.as_ref()?.lock().ok()?;
        cache.get(key).map(str::to_string)
    }

    fn store(&self, key: String, response: &str) {
        if let Some(cache) = &self.cache {
            if let Ok(mut cache) = cache.lock() {
                cache.insert(key, self.backend.model(), response.to_string());
            }
        }
    }

    async fn complete_with_retry(&self, prompt: &str) -> Result<String, BackendError> {
        match self.backend.complete(prompt).await {
            Err(e) if e.is_transient() => {
                tracing::debug!(error = %e, backoff_ms = self.retry_backoff.as_millis() as u64, "再試行します");
                tokio::time::sleep(self.retry_backoff).await;
                self.backend.complete(prompt).await
            }
            other => other,
        }
    }

    fn parse(&self, poi: &PoiRecord, response: &str) -> Result<CategoryLabel, UnparseableLabelError> {
        parse_label_response(response, self.taxonomy.as_ref()).map_err(|e| {
            let snippet: String = response.chars().take(120).collect();
            UnparseableLabelError::new(&poi.id, format!("{} (応答: {})", e, snippet.trim()))
        })
    }
}

#[async_trait]
impl<B: CompletionBackend> Categorizer for LlmCategorizer<B> {
    async fn categorize(
        &self,
        poi: &PoiRecord,
        disambiguation: Option<&DisambiguationContext>,
    ) -> Result<CategoryLabel, UnparseableLabelError> {
        let prompt = build_categorize_prompt(poi, self.include_context, disambiguation);
        let key = cache::cache_key(self.backend.model(), &prompt);

        if let Some(response) = self.cached(&key) {
            tracing::trace!(poi = %poi.id, "キャッシュ使用");
            return self.parse(poi, &response);
        }

        let response = self.complete_with_retry(&prompt).await.map_err(|e| {
            tracing::warn!(poi = %poi.id, error = %e, "分類呼び出しに失敗");
            UnparseableLabelError::new(&poi.id, e.to_string())
        })?;

        self.store(key, &response);
        self.parse(poi, &response)
    }
}

/// 全POIを並行に分類（結果は到着順、POI IDで突き合わせる）
pub async fn categorize_all<C: Categorizer + ?Sized>(
    categorizer: &C,
    pois: &[&PoiRecord],
    disambiguation: Option<&DisambiguationContext>,
    concurrency: usize,
    progress: Option<&ProgressBar>,
) -> Vec<PredictionOutcome> {
    stream::iter(pois.iter().copied())
        .map(|poi| async move {
            let result = categorizer.categorize(poi, disambiguation).await;
            if let Some(pb) = progress {
                pb.inc(1);
            }
            PredictionOutcome {
                poi_id: poi.id.clone(),
                result,
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await
}

/// 分類呼び出し用の進捗バー
pub fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::with_template("  {bar:40.cyan/blue} {pos}/{len} ({eta}) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}
