use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::future::try_join_all;
use reqwest::header::CONTENT_TYPE;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, info, instrument};

use crate::{
    error::{Result, ResultExt, ToonError},
    models::ArtifactRef,
    storyboard::Storyboard,
};

const DEFAULT_EXTENSION: &str = "png";

/// A downloaded artifact on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedArtifact {
    pub path: PathBuf,
    /// Hex-encoded SHA-256 of the saved bytes.
    pub sha256: String,
    pub bytes: usize,
}

/// Helper for persisting generated images.
#[derive(Clone)]
pub struct ArtifactStore {
    http: reqwest::Client,
}

impl ArtifactStore {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Save `artifact` as `<dir>/<stem>.<ext>`.
    ///
    /// URLs are downloaded; `data:` URIs are decoded locally. The extension
    /// follows the content type and defaults to `png`.
    #[instrument(skip(self, artifact, dir))]
    pub async fn download(
        &self,
        artifact: &ArtifactRef,
        dir: impl AsRef<Path>,
        stem: &str,
    ) -> Result<SavedArtifact> {
        let (bytes, content_type) = if artifact.is_inline() {
            decode_data_uri(artifact.as_str())?
        } else {
            self.fetch(artifact.as_str()).await?
        };

        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .await
            .with_context(format!("creating {}", dir.display()))?;
        let path = dir.join(format!("{stem}.{}", extension_for(content_type.as_deref())));
        fs::write(&path, &bytes)
            .await
            .with_context(format!("saving {}", path.display()))?;

        let sha256 = format!("{:x}", Sha256::digest(&bytes));
        debug!(path = %path.display(), bytes = bytes.len(), "Artifact saved");
        Ok(SavedArtifact {
            path,
            sha256,
            bytes: bytes.len(),
        })
    }

    /// Save every cut that produced an image as `webtoon_cut_<n>`, downloading concurrently.
    pub async fn save_storyboard(
        &self,
        storyboard: &Storyboard,
        dir: impl AsRef<Path>,
    ) -> Result<Vec<SavedArtifact>> {
        let dir = dir.as_ref();
        let downloads = storyboard.artifacts().map(|(index, artifact)| {
            let stem = format!("webtoon_cut_{}", index + 1);
            async move { self.download(artifact, dir, &stem).await }
        });
        let saved = try_join_all(downloads).await?;
        info!(count = saved.len(), dir = %dir.display(), "Storyboard saved");
        Ok(saved)
    }

    async fn fetch(&self, url: &str) -> Result<(Vec<u8>, Option<String>)> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(ToonError::api(
                "image download",
                status.as_u16(),
                String::from_utf8_lossy(&bytes).into_owned(),
            ));
        }
        Ok((bytes.to_vec(), content_type))
    }
}

/// Decode a `data:<mime>;base64,<payload>` URI.
pub fn decode_data_uri(uri: &str) -> Result<(Vec<u8>, Option<String>)> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| ToonError::InvalidInput("not a data URI".into()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| ToonError::InvalidInput("data URI has no payload".into()))?;
    let mime = meta
        .strip_suffix(";base64")
        .ok_or_else(|| ToonError::InvalidInput("only base64 data URIs are supported".into()))?;
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| ToonError::InvalidInput(format!("invalid base64 payload: {e}")))?;
    let mime = (!mime.is_empty()).then(|| mime.to_string());
    Ok((bytes, mime))
}

/// File extension for a MIME type.
pub fn extension_for(content_type: Option<&str>) -> &'static str {
    let Some(extensions) = content_type.and_then(mime_guess::get_mime_extensions_str) else {
        return DEFAULT_EXTENSION;
    };
    extensions
        .iter()
        .copied()
        .find(|ext| matches!(*ext, "png" | "jpg" | "webp" | "gif"))
        .or_else(|| extensions.first().copied())
        .unwrap_or(DEFAULT_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_for_content_types() {
        assert_eq!(extension_for(Some("image/png")), "png");
        assert_eq!(extension_for(Some("image/jpeg")), "jpg");
        assert_eq!(extension_for(Some("image/webp")), "webp");
        assert_eq!(extension_for(Some("application/x-unknown-thing")), "png");
        assert_eq!(extension_for(None), "png");
    }

    #[test]
    fn test_decode_data_uri() {
        let (bytes, mime) = decode_data_uri("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(bytes, b"hello");
        assert_eq!(mime.as_deref(), Some("image/png"));

        assert!(decode_data_uri("https://example.com/a.png").is_err());
        assert!(decode_data_uri("data:text/plain,hello").is_err());
        assert!(decode_data_uri("data:image/png;base64,@@@").is_err());
    }

    #[tokio::test]
    async fn test_inline_artifact_is_saved_with_digest() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(reqwest::Client::new());
        let artifact = ArtifactRef::new("data:image/png;base64,aGVsbG8=");

        let saved = store
            .download(&artifact, dir.path().join("out"), "webtoon_cut_1")
            .await
            .unwrap();

        assert_eq!(saved.path, dir.path().join("out").join("webtoon_cut_1.png"));
        assert_eq!(std::fs::read(&saved.path).unwrap(), b"hello");
        assert_eq!(
            saved.sha256,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(saved.bytes, 5);
    }

    #[tokio::test]
    async fn test_write_failure_names_the_target() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"x").unwrap();
        let store = ArtifactStore::new(reqwest::Client::new());

        let err = store
            .download(
                &ArtifactRef::new("data:image/png;base64,aGVsbG8="),
                &blocker,
                "webtoon_cut_1",
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ToonError::Context(_)));
        assert!(err.to_string().contains("not_a_dir"));
    }
}
