//! System prompt loading and persistence.

use std::path::{Path, PathBuf};

use crate::client::ClientError;

/// Prompt used when the prompt file is missing, unreadable or blank.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a teaching assistant for Saint Louis College.
You are kind, patient and an expert in education.
You answer clearly and pedagogically, in French.";

/// Where the current prompt text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptSource {
    File,
    Default,
}

/// The system prompt, backed by a text file that can be edited while running.
#[derive(Debug, Clone)]
pub struct SystemPrompt {
    path: PathBuf,
    text: String,
    source: PromptSource,
}

impl SystemPrompt {
    /// Load the prompt from `path`, falling back to [`DEFAULT_SYSTEM_PROMPT`].
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let mut prompt = Self {
            path: path.into(),
            text: DEFAULT_SYSTEM_PROMPT.to_string(),
            source: PromptSource::Default,
        };
        prompt.reload().await;
        prompt
    }

    /// Re-read the prompt file.
    pub async fn reload(&mut self) -> PromptSource {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) if !text.trim().is_empty() => {
                tracing::info!(
                    path = %self.path.display(),
                    chars = text.chars().count(),
                    "system prompt loaded"
                );
                self.text = text;
                self.source = PromptSource::File;
            }
            Ok(_) => {
                tracing::warn!(path = %self.path.display(), "system prompt file is blank, using default");
                self.use_default();
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "cannot read system prompt, using default");
                self.use_default();
            }
        }
        self.source
    }

    /// Replace the prompt and write it to the prompt file.
    ///
    /// The in-memory prompt only changes once the file is written.
    pub async fn save(&mut self, text: impl Into<String>) -> Result<(), ClientError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ClientError::InvalidRequest("prompt is required".to_string()));
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, &text).await?;

        tracing::info!(path = %self.path.display(), chars = text.chars().count(), "system prompt saved");
        self.text = text;
        self.source = PromptSource::File;
        Ok(())
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source(&self) -> PromptSource {
        self.source
    }

    /// Length of the prompt in characters.
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    fn use_default(&mut self) {
        self.text = DEFAULT_SYSTEM_PROMPT.to_string();
        self.source = PromptSource::Default;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let prompt = SystemPrompt::load(dir.path().join("absent.txt")).await;

        assert_eq!(prompt.source(), PromptSource::Default);
        assert_eq!(prompt.text(), DEFAULT_SYSTEM_PROMPT);
    }

    #[tokio::test]
    async fn test_blank_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.txt");
        std::fs::write(&path, "  \n").unwrap();

        let prompt = SystemPrompt::load(&path).await;
        assert_eq!(prompt.source(), PromptSource::Default);
    }

    #[tokio::test]
    async fn test_load_and_reload_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.txt");
        std::fs::write(&path, "Réponds en français.").unwrap();

        let mut prompt = SystemPrompt::load(&path).await;
        assert_eq!(prompt.source(), PromptSource::File);
        assert_eq!(prompt.text(), "Réponds en français.");
        assert_eq!(prompt.len(), 20);

        std::fs::write(&path, "Sois bref.").unwrap();
        assert_eq!(prompt.reload().await, PromptSource::File);
        assert_eq!(prompt.text(), "Sois bref.");

        std::fs::remove_file(&path).unwrap();
        assert_eq!(prompt.reload().await, PromptSource::Default);
    }

    #[tokio::test]
    async fn test_save_creates_parent_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join("system-prompt.txt");

        let mut prompt = SystemPrompt::load(&path).await;
        prompt.save("Nouveau prompt").await.unwrap();

        assert_eq!(prompt.text(), "Nouveau prompt");
        assert_eq!(prompt.source(), PromptSource::File);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Nouveau prompt");
    }

    #[tokio::test]
    async fn test_save_rejects_blank_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let mut prompt = SystemPrompt::load(dir.path().join("p.txt")).await;

        let result = prompt.save("   ").await;
        assert!(matches!(result, Err(ClientError::InvalidRequest(_))));
        assert_eq!(prompt.text(), DEFAULT_SYSTEM_PROMPT);
    }
}
