use clap::ValueEnum;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    /// OpenAI互換 Chat Completions API
    #[default]
    #[value(name = "openai")]
    OpenAi,
    Claude,
    Codex,
    Gemini,
}

impl AiProvider {
    /// ローカルCLIのコマンド名（HTTP APIを使うプロバイダはNone）
    pub fn command_name(&self) -> Option<&'static str> {
        match self {
            AiProvider::OpenAi => None,
            AiProvider::Claude => Some("claude"),
            AiProvider::Codex => Some("codex"),
            AiProvider::Gemini => Some("gemini"),
        }
    }

    /// 1プロンプトを実行する引数
    pub fn prompt_args(&self, prompt: &str) -> Vec<String> {
        match self {
            AiProvider::Claude => vec!["-p".into(), prompt.into(), "--output-format".into(), "text".into()],
            AiProvider::Codex => vec!["exec".into(), prompt.into()],
            AiProvider::Gemini => vec!["-p".into(), prompt.into()],
            AiProvider::OpenAi => Vec::new(),
        }
    }
}

impl std::fmt::Display for AiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AiProvider::OpenAi => write!(f, "openai"),
            AiProvider::Claude => write!(f, "claude"),
            AiProvider::Codex => write!(f, "codex"),
            AiProvider::Gemini => write!(f, "gemini"),
        }
    }
}
