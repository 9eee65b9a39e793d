use std::path::{Path, PathBuf};

use anyhow::Context;
use bytes::Bytes;

/// Local-disk store for uploaded originals and their annotated derivatives.
///
/// Files are addressed by generated names (`{record-id}.{ext}`); the store never
/// trusts a client-supplied name.
#[derive(Debug, Clone)]
pub struct ImageStore {
    uploads_dir: PathBuf,
    annotated_dir: PathBuf,
}

impl ImageStore {
    /// Create both artifact directories if they do not exist yet.
    pub fn open(uploads_dir: &Path, annotated_dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(uploads_dir)
            .with_context(|| format!("create upload dir {}", uploads_dir.display()))?;
        std::fs::create_dir_all(annotated_dir)
            .with_context(|| format!("create annotated dir {}", annotated_dir.display()))?;
        Ok(Self {
            uploads_dir: uploads_dir.to_path_buf(),
            annotated_dir: annotated_dir.to_path_buf(),
        })
    }

    pub async fn save_original(&self, name: &str, body: Bytes) -> anyhow::Result<PathBuf> {
        let path = self.original_file(name);
        tokio::fs::write(&path, &body)
            .await
            .with_context(|| format!("write original {}", path.display()))?;
        Ok(path)
    }

    pub fn original_file(&self, name: &str) -> PathBuf {
        self.uploads_dir.join(name)
    }

    pub fn annotated_file(&self, name: &str) -> PathBuf {
        self.annotated_dir.join(name)
    }
}

/// Reject anything that could escape the artifact directories when a
/// client-supplied filename is joined onto them.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains("..")
}

pub fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

pub fn mime_from_name(name: &str) -> &'static str {
    match name.rsplit('.').next() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}
