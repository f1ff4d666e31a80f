//! Query transcripts.

use std::path::Path;

use tokio::fs;

use crate::Error;

/// Renders the transcript of one query.
pub fn render(query: &str, answer: &str) -> String {
    format!("用户提问：{query}\n模型回复：\n{answer}\n")
}

/// Persists query/answer pairs.
#[derive(Clone, Copy, Debug, Default)]
pub struct TranscriptWriter;

impl TranscriptWriter {
    /// Writes the transcript to `path`, creating its directory if needed.
    ///
    /// An existing file at `path` is overwritten.
    pub async fn write(
        &self,
        path: &Path,
        query: &str,
        answer: &str,
    ) -> Result<(), Error> {
        let io_err = |source| Error::Transcript {
            path: path.to_owned(),
            source,
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await.map_err(io_err)?;
        }
        fs::write(path, render(query, answer))
            .await
            .map_err(io_err)?;
        debug!("transcript saved to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("llm_outputs").join("你好_20250314_090507.txt");

        TranscriptWriter.write(&path, "你好", "你好！").await.unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "用户提问：你好\n模型回复：\n你好！\n");

        TranscriptWriter.write(&path, "你好", "再见").await.unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "用户提问：你好\n模型回复：\n再见\n");
    }

    #[tokio::test]
    async fn test_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();

        let err = TranscriptWriter
            .write(&blocker.join("a.txt"), "q", "a")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transcript { .. }));
    }
}
