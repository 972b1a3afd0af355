//! Profile photo storage on the local filesystem
//!
//! Files live at `<dir>/<user_id>/<uuid>.<ext>` and are served read-only
//! under `/uploads`. The database keeps the path relative to `dir`.

use std::path::{Component, Path, PathBuf};

use uuid::Uuid;

/// URL prefix the upload directory is served under
pub const PUBLIC_PREFIX: &str = "/uploads";

/// Upload error type
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("unsupported image type: {0}")]
    UnsupportedType(String),

    #[error("file content does not match {0}")]
    ContentMismatch(&'static str),

    #[error("file is empty")]
    Empty,

    #[error("file exceeds {max} bytes")]
    TooLarge { max: usize },

    #[error("invalid stored path: {0}")]
    InvalidPath(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Accepted image formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl ImageKind {
    pub fn from_content_type(content_type: &str) -> Result<Self, UploadError> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "image/jpeg" | "image/jpg" => Ok(Self::Jpeg),
            "image/png" => Ok(Self::Png),
            "image/gif" => Ok(Self::Gif),
            "image/webp" => Ok(Self::Webp),
            _ => Err(UploadError::UnsupportedType(content_type.to_owned())),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Webp => "webp",
        }
    }

    fn mime(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }

    /// Check the file's magic bytes
    fn matches(&self, bytes: &[u8]) -> bool {
        match self {
            Self::Jpeg => bytes.starts_with(&[0xFF, 0xD8, 0xFF]),
            Self::Png => bytes.starts_with(b"\x89PNG\r\n\x1a\n"),
            Self::Gif => bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a"),
            Self::Webp => bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP",
        }
    }
}

/// Photo store rooted at the configured upload directory
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    max_bytes: usize,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Create the root directory if needed
    pub async fn ensure_dir(&self) -> Result<(), UploadError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Validate and write a photo for `user_id`, returning its relative path.
    pub async fn save_photo(
        &self,
        user_id: Uuid,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<String, UploadError> {
        let kind = ImageKind::from_content_type(content_type)?;

        if bytes.is_empty() {
            return Err(UploadError::Empty);
        }
        if bytes.len() > self.max_bytes {
            return Err(UploadError::TooLarge { max: self.max_bytes });
        }
        if !kind.matches(bytes) {
            return Err(UploadError::ContentMismatch(kind.mime()));
        }

        let relative = format!("{}/{}.{}", user_id, Uuid::new_v4(), kind.extension());
        let path = self.dir.join(&relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        tracing::debug!(%user_id, path = %path.display(), size = bytes.len(), "stored photo");
        Ok(relative)
    }

    /// Delete a previously stored file. A missing file is not an error.
    pub async fn remove(&self, relative: &str) -> Result<(), UploadError> {
        let path = self.resolve(relative)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Absolute path of a stored file. Rejects anything escaping `dir`.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, UploadError> {
        let rel = Path::new(relative);
        let only_normal = rel.components().all(|c| matches!(c, Component::Normal(_)));
        if relative.is_empty() || !only_normal {
            return Err(UploadError::InvalidPath(relative.to_owned()));
        }
        Ok(self.dir.join(rel))
    }
}

/// Public URL for a stored relative path
pub fn public_url(relative: &str) -> String {
    format!("{PUBLIC_PREFIX}/{relative}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    fn store(dir: &Path) -> UploadStore {
        UploadStore::new(dir, 64)
    }

    #[test]
    fn content_types() {
        assert_eq!(ImageKind::from_content_type("image/png").unwrap(), ImageKind::Png);
        assert_eq!(
            ImageKind::from_content_type("IMAGE/JPEG; charset=binary").unwrap(),
            ImageKind::Jpeg
        );
        assert!(ImageKind::from_content_type("application/pdf").is_err());
    }

    #[tokio::test]
    async fn save_and_remove() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        let user = Uuid::new_v4();

        let rel = store.save_photo(user, "image/png", PNG).await.unwrap();
        assert!(rel.starts_with(&user.to_string()));
        assert!(rel.ends_with(".png"));

        let path = store.resolve(&rel).unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), PNG);

        store.remove(&rel).await.unwrap();
        assert!(!path.exists());
        // second remove is a no-op
        store.remove(&rel).await.unwrap();
    }

    #[tokio::test]
    async fn rejects_bad_uploads() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        let user = Uuid::new_v4();

        assert!(matches!(
            store.save_photo(user, "image/png", b"").await.unwrap_err(),
            UploadError::Empty
        ));
        assert!(matches!(
            store.save_photo(user, "image/png", &[0u8; 65]).await.unwrap_err(),
            UploadError::TooLarge { max: 64 }
        ));
        assert!(matches!(
            store.save_photo(user, "image/jpeg", PNG).await.unwrap_err(),
            UploadError::ContentMismatch(_)
        ));
        assert!(matches!(
            store.save_photo(user, "text/html", PNG).await.unwrap_err(),
            UploadError::UnsupportedType(_)
        ));
    }

    #[test]
    fn resolve_rejects_traversal() {
        let store = UploadStore::new("/srv/uploads", 10);
        assert!(store.resolve("../etc/passwd").is_err());
        assert!(store.resolve("/etc/passwd").is_err());
        assert!(store.resolve("").is_err());
        assert_eq!(
            store.resolve("a/b.png").unwrap(),
            PathBuf::from("/srv/uploads/a/b.png")
        );
    }

    #[test]
    fn public_urls() {
        assert_eq!(public_url("u/p.png"), "/uploads/u/p.png");
    }
}
