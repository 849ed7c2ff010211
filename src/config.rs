use crate::ai_provider::AiProvider;
use crate::error::{PlacesEvalError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,
    pub provider: AiProvider,
    pub model: String,
    /// OpenAI互換APIのベースURL
    pub api_base: String,
    /// 分類器の同時実行数
    pub concurrency: usize,
    pub timeout_seconds: u64,
    /// 一時的な失敗からの再試行までの待ち時間
    pub retry_backoff_ms: u64,
    pub s3_bucket: String,
    pub s3_region: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: AiProvider::OpenAi,
            model: "gpt-4.1-mini".into(),
            api_base: "https://api.openai.com/v1".into(),
            concurrency: 4,
            timeout_seconds: 120,
            retry_backoff_ms: 1000,
            s3_bucket: "overturemaps-us-west-2".into(),
            s3_region: "us-west-2".into(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| PlacesEvalError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("places-eval").join("config.json"))
    }

    pub fn get_api_key(&self) -> Result<String> {
        // 環境変数を優先
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.trim().is_empty() {
                return Ok(key);
            }
        }

        self.api_key.clone().ok_or(PlacesEvalError::MissingApiKey)
    }

    pub fn set_api_key(&mut self, key: String) -> Result<()> {
        self.api_key = Some(key);
        self.save()
    }
}
