//! Config Sources
//!
//! Where the authoritative weapon document comes from.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Fetch failures. All of them are treated as transient by the loader.
#[derive(Debug, Error)]
pub enum SourceError {
    /// No response within the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// Server answered with a non-success status.
    #[error("HTTP status {0}")]
    Status(u16),
    /// Transport-level failure.
    #[error("network error: {0}")]
    Network(String),
    /// Local document could not be read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return SourceError::Network(format!("timeout: {}", e));
        }
        match e.status() {
            Some(status) => SourceError::Status(status.as_u16()),
            None => SourceError::Network(e.to_string()),
        }
    }
}

/// A provider of the raw config document.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Retrieve the document text.
    async fn fetch(&self) -> Result<String, SourceError>;

    /// Identifier recorded in snapshots (usually a URL).
    fn describe(&self) -> String;
}

/// HTTP GET source.
pub struct HttpSource {
    url: String,
    client: reqwest::Client,
}

impl HttpSource {
    /// Create a source for `url` whose requests give up after `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl ConfigSource for HttpSource {
    async fn fetch(&self) -> Result<String, SourceError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }
        Ok(response.text().await?)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Document shipped with the game build.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    /// Read the document at `path` on every fetch.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ConfigSource for FileSource {
    async fn fetch(&self) -> Result<String, SourceError> {
        Ok(tokio::fs::read_to_string(&self.path).await?)
    }

    fn describe(&self) -> String {
        format!("file://{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weapons.csv");
        std::fs::write(&path, "id,damage,cooldown\npistol,10,0.5").unwrap();

        let source = FileSource::new(&path);
        assert!(source.fetch().await.unwrap().starts_with("id,damage"));
        assert!(source.describe().starts_with("file://"));
    }

    #[tokio::test]
    async fn test_file_source_missing() {
        let source = FileSource::new("/nonexistent/weapons.csv");
        assert!(matches!(source.fetch().await, Err(SourceError::Io(_))));
    }

    #[test]
    fn test_http_source_describe() {
        let source = HttpSource::new("https://example.test/w.csv", Duration::from_secs(10)).unwrap();
        assert_eq!(source.describe(), "https://example.test/w.csv");
    }
}
