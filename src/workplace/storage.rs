use std::path::{Path, PathBuf};

use crate::errors::WorkplaceError;

/// Local-disk store for uploaded and generated media, served at `/static`.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    public_url: String,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>, public_url: &str) -> Self {
        Self {
            dir: dir.into(),
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn url_for(&self, name: &str) -> String {
        format!("{}/static/{}", self.public_url, name)
    }

    /// Write `bytes` as `name` (sanitized) and return its public URL.
    pub async fn save(&self, name: &str, bytes: &[u8]) -> Result<String, WorkplaceError> {
        let name = sanitize_filename(name);
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(WorkplaceError::Storage)?;
        tokio::fs::write(self.dir.join(&name), bytes)
            .await
            .map_err(WorkplaceError::Storage)?;
        tracing::debug!(file = %name, size = bytes.len(), "stored upload");
        Ok(self.url_for(&name))
    }
}

/// Reduce an uploaded file name to a single safe path component.
pub fn sanitize_filename(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = last
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_directories() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\tmp\\clip.webm"), "clip.webm");
        assert_eq!(sanitize_filename("standup_1_rec.webm"), "standup_1_rec.webm");
    }

    #[test]
    fn test_sanitize_replaces_odd_characters() {
        assert_eq!(sanitize_filename("my clip (1).mp4"), "my_clip__1_.mp4");
        assert_eq!(sanitize_filename(".."), "upload");
        assert_eq!(sanitize_filename(""), "upload");
        assert_eq!(sanitize_filename(".hidden"), "hidden");
    }

    #[test]
    fn test_url_for_uses_public_base() {
        let store = UploadStore::new("static", "http://localhost:8000/");
        assert_eq!(
            store.url_for("retro_1_a.webm"),
            "http://localhost:8000/static/retro_1_a.webm"
        );
    }

    #[tokio::test]
    async fn test_save_writes_file_and_returns_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path().join("static"), "http://localhost:8000");
        let url = store.save("standup_1_../rec.webm", b"audio").await.unwrap();
        assert_eq!(url, "http://localhost:8000/static/rec.webm");
        let written = std::fs::read(dir.path().join("static").join("rec.webm")).unwrap();
        assert_eq!(written, b"audio");
    }
}
