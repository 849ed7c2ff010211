//! 補完バックエンド
//!
//! プロンプト1件を送って自由文の応答を受け取るだけの境界。
//! 解釈は LlmCategorizer 側で行う。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// 再試行で回復しうる失敗（通信・429・5xx・タイムアウト）
    #[error("一時的なエラー: {0}")]
    Transient(String),

    #[error("バックエンドエラー: {0}")]
    Fatal(String),
}

impl BackendError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Transient(_))
    }
}

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// キャッシュキーに含めるモデル名
    fn model(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String, BackendError>;
}

/// OpenAI互換 Chat Completions API
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

impl OpenAiBackend {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Fatal(format!("HTTPクライアント作成失敗: {}", e)))?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.0,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| BackendError::Transient(format!("送信失敗: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            let message = format!("HTTP {}: {}", status.as_u16(), snippet);
            return if status.as_u16() == 429 || status.is_server_error() {
                Err(BackendError::Transient(message))
            } else {
                Err(BackendError::Fatal(message))
            };
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Fatal(format!("応答JSONが不正: {}", e)))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| BackendError::Fatal("応答に choices[0].message.content がありません".into()))
    }
}
