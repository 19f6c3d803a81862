//! Asset list sources for the question bank
//!
//! A source supplies two flat lists of file names: sound assets and image
//! assets. Any failure is a question bank load failure.

use crate::error::{QuizError, Result};
use async_trait::async_trait;
use sqz_common::assets::{is_listable, list_assets};
use sqz_common::config::AssetConfig;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Supplier of sound and image asset names
#[async_trait]
pub trait QuestionSource: Send + Sync {
    async fn list_sounds(&self) -> Result<Vec<String>>;

    async fn list_images(&self) -> Result<Vec<String>>;

    /// Short description for logs
    fn describe(&self) -> String;
}

/// Lists the asset directories under the root folder
pub struct DirectorySource {
    root: PathBuf,
    assets: AssetConfig,
}

impl DirectorySource {
    pub fn new(root: PathBuf, assets: AssetConfig) -> Self {
        Self { root, assets }
    }

    async fn list(&self, dir: &str, extension: &str) -> Result<Vec<String>> {
        let path = self.root.join(dir);
        list_assets(&path, extension)
            .await
            .map_err(|e| QuizError::QuestionBankLoad(format!("Failed to list {}: {}", path.display(), e)))
    }
}

#[async_trait]
impl QuestionSource for DirectorySource {
    async fn list_sounds(&self) -> Result<Vec<String>> {
        self.list(&self.assets.sound_dir, &self.assets.sound_extension).await
    }

    async fn list_images(&self) -> Result<Vec<String>> {
        self.list(&self.assets.image_dir, &self.assets.image_extension).await
    }

    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }
}

/// Fixed lists, or a forced failure
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    sounds: Vec<String>,
    images: Vec<String>,
    failure: Option<String>,
}

impl StaticSource {
    pub fn new<S: Into<String>>(
        sounds: impl IntoIterator<Item = S>,
        images: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            sounds: sounds.into_iter().map(Into::into).collect(),
            images: images.into_iter().map(Into::into).collect(),
            failure: None,
        }
    }

    /// Source whose every listing fails with `message`
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    fn check(&self) -> Result<()> {
        match &self.failure {
            Some(message) => Err(QuizError::QuestionBankLoad(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl QuestionSource for StaticSource {
    async fn list_sounds(&self) -> Result<Vec<String>> {
        self.check()?;
        Ok(self.sounds.clone())
    }

    async fn list_images(&self) -> Result<Vec<String>> {
        self.check()?;
        Ok(self.images.clone())
    }

    fn describe(&self) -> String {
        format!("static ({} sounds, {} images)", self.sounds.len(), self.images.len())
    }
}

/// Fetches `{base}/api/sounds` and `{base}/api/images` (JSON string arrays)
pub struct HttpSource {
    base_url: String,
    client: reqwest::Client,
    assets: AssetConfig,
}

impl HttpSource {
    pub fn new(base_url: impl Into<String>, assets: AssetConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            assets,
        })
    }

    async fn fetch(&self, kind: &str, extension: &str) -> Result<Vec<String>> {
        let url = format!("{}/api/{}", self.base_url, kind);
        debug!("Fetching asset list from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| QuizError::QuestionBankLoad(format!("GET {} failed: {}", url, e)))?;
        if !response.status().is_success() {
            return Err(QuizError::QuestionBankLoad(format!(
                "GET {} returned {}",
                url,
                response.status()
            )));
        }

        let names: Vec<String> = response
            .json()
            .await
            .map_err(|e| QuizError::QuestionBankLoad(format!("Invalid list from {}: {}", url, e)))?;
        Ok(names
            .into_iter()
            .filter(|name| is_listable(name, extension))
            .collect())
    }
}

#[async_trait]
impl QuestionSource for HttpSource {
    async fn list_sounds(&self) -> Result<Vec<String>> {
        self.fetch("sounds", &self.assets.sound_extension).await
    }

    async fn list_images(&self) -> Result<Vec<String>> {
        self.fetch("images", &self.assets.image_extension).await
    }

    fn describe(&self) -> String {
        format!("http {}", self.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Json, Router};

    #[tokio::test]
    async fn test_directory_source_lists_configured_dirs() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("sound")).unwrap();
        std::fs::create_dir(root.path().join("img")).unwrap();
        for name in ["cat.mp3", "dog.mp3", ".keep"] {
            std::fs::write(root.path().join("sound").join(name), b"x").unwrap();
        }
        for name in ["cat.webp", "notes.txt"] {
            std::fs::write(root.path().join("img").join(name), b"x").unwrap();
        }

        let source = DirectorySource::new(root.path().to_path_buf(), AssetConfig::default());
        assert_eq!(source.list_sounds().await.unwrap(), vec!["cat.mp3", "dog.mp3"]);
        assert_eq!(source.list_images().await.unwrap(), vec!["cat.webp"]);
    }

    #[tokio::test]
    async fn test_directory_source_missing_dir_is_load_error() {
        let root = tempfile::tempdir().unwrap();
        let source = DirectorySource::new(root.path().to_path_buf(), AssetConfig::default());
        assert!(matches!(
            source.list_sounds().await,
            Err(QuizError::QuestionBankLoad(_))
        ));
    }

    #[tokio::test]
    async fn test_static_source_failure() {
        let source = StaticSource::failing("offline");
        assert!(matches!(
            source.list_images().await,
            Err(QuizError::QuestionBankLoad(msg)) if msg == "offline"
        ));
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_http_source_fetches_lists() {
        let app = Router::new()
            .route("/api/sounds", get(|| async { Json(vec!["a.mp3", "b.mp3", "x.txt"]) }))
            .route("/api/images", get(|| async { Json(vec!["a.webp"]) }));
        let base = serve(app).await;

        let source = HttpSource::new(format!("{}/", base), AssetConfig::default()).unwrap();
        assert_eq!(source.list_sounds().await.unwrap(), vec!["a.mp3", "b.mp3"]);
        assert_eq!(source.list_images().await.unwrap(), vec!["a.webp"]);
    }

    #[tokio::test]
    async fn test_http_source_error_status() {
        let app = Router::new().route(
            "/api/sounds",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let base = serve(app).await;

        let source = HttpSource::new(base, AssetConfig::default()).unwrap();
        assert!(matches!(
            source.list_sounds().await,
            Err(QuizError::QuestionBankLoad(_))
        ));
    }
}
