//! ローカルAI CLI（claude / codex / gemini）をサブプロセスで呼ぶバックエンド

use super::backend::{BackendError, CompletionBackend};
use crate::ai_provider::AiProvider;
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;

pub struct CliBackend {
    provider: AiProvider,
    command: &'static str,
    timeout: Duration,
}

impl CliBackend {
    pub fn new(provider: AiProvider, timeout: Duration) -> Result<Self, BackendError> {
        let command = provider
            .command_name()
            .ok_or_else(|| BackendError::Fatal(format!("{} はCLIプロバイダではありません", provider)))?;
        Ok(Self {
            provider,
            command,
            timeout,
        })
    }

    fn build_command(&self, prompt: &str) -> Command {
        let args = self.provider.prompt_args(prompt);

        // Windowsではcmd /c経由
        #[cfg(windows)]
        let mut cmd = {
            let mut c = Command::new("cmd");
            c.arg("/c").arg(self.command);
            c
        };

        #[cfg(not(windows))]
        let mut cmd = Command::new(self.command);

        cmd.args(args).kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl CompletionBackend for CliBackend {
    fn model(&self) -> &str {
        self.command
    }

    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        let output = tokio::time::timeout(self.timeout, self.build_command(prompt).output())
            .await
            .map_err(|_| BackendError::Transient(format!("{} がタイムアウト", self.command)))?
            .map_err(|e| BackendError::Fatal(format!("{} 実行エラー: {}", self.command, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::Transient(format!(
                "{} failed (code {:?}): {}",
                self.command,
                output.status.code(),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_is_not_cli() {
        assert!(CliBackend::new(AiProvider::OpenAi, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_model_is_command_name() {
        let backend = CliBackend::new(AiProvider::Gemini, Duration::from_secs(1)).unwrap();
        assert_eq!(backend.model(), "gemini");
    }
}
