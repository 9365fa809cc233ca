// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! On-disk image storage.
//!
//! Uploaded images and annotated renders live in two separate directories.
//! Every stored file gets a fresh random token as its name, so two requests
//! can never overwrite each other.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use uuid::Uuid;

use crate::error::{Error, Result};

/// File extensions accepted for upload.
pub const ALLOWED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "webp", "bmp"];

/// JPEG quality used for annotated outputs.
pub const OUTPUT_JPEG_QUALITY: u8 = 92;

/// Which directory a stored image belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    /// User-provided inputs.
    Uploads,
    /// Annotated renders.
    Outputs,
}

impl Namespace {
    /// URL path prefix the namespace is served under.
    #[must_use]
    pub const fn url_prefix(self) -> &'static str {
        match self {
            Self::Uploads => "/uploads",
            Self::Outputs => "/outputs",
        }
    }
}

/// A file written by [`ImageStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    /// Namespace the file was written to.
    pub namespace: Namespace,
    /// `<token>.<ext>` file name.
    pub name: String,
    /// Full path on disk.
    pub path: PathBuf,
}

impl StoredImage {
    /// Server-relative URL, e.g. `/outputs/3f2a....jpg`.
    #[must_use]
    pub fn url(&self) -> String {
        format!("{}/{}", self.namespace.url_prefix(), self.name)
    }
}

/// Return the lowercased extension if it is on the allow-list.
///
/// ```
/// use yolo_web::storage::allowed_extension;
///
/// assert_eq!(allowed_extension("Cat.JPG").as_deref(), Some("jpg"));
/// assert_eq!(allowed_extension("notes.txt"), None);
/// assert_eq!(allowed_extension("noext"), None);
/// ```
#[must_use]
pub fn allowed_extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

fn fresh_name(ext: &str) -> String {
    format!("{}.{ext}", Uuid::new_v4().simple())
}

/// Persists uploads and annotated outputs.
#[derive(Debug, Clone)]
pub struct ImageStore {
    upload_dir: PathBuf,
    output_dir: PathBuf,
}

impl ImageStore {
    /// Create the store, making both directories if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if a directory cannot be created.
    pub fn new(upload_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Result<Self> {
        let store = Self {
            upload_dir: upload_dir.into(),
            output_dir: output_dir.into(),
        };
        std::fs::create_dir_all(&store.upload_dir)?;
        std::fs::create_dir_all(&store.output_dir)?;
        Ok(store)
    }

    /// Directory holding uploads.
    #[must_use]
    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Directory holding annotated outputs.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    const fn dir(&self, namespace: Namespace) -> &PathBuf {
        match namespace {
            Namespace::Uploads => &self.upload_dir,
            Namespace::Outputs => &self.output_dir,
        }
    }

    /// Validate and persist an uploaded file.
    ///
    /// # Errors
    ///
    /// * [`Error::ValidationError`] if the filename is missing or empty, or
    ///   its extension is not allowed.
    /// * [`Error::Io`] if the write fails.
    pub async fn accept(&self, filename: Option<&str>, bytes: &[u8]) -> Result<StoredImage> {
        let filename = filename
            .filter(|f| !f.is_empty())
            .ok_or_else(|| Error::ValidationError("empty filename".to_string()))?;
        let ext = allowed_extension(filename)
            .ok_or_else(|| Error::ValidationError("unsupported file type".to_string()))?;

        let name = fresh_name(&ext);
        let path = self.upload_dir.join(&name);
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(original = filename, stored = %name, size = bytes.len(), "Saved upload");

        Ok(StoredImage {
            namespace: Namespace::Uploads,
            name,
            path,
        })
    }

    /// Write an annotated image as JPEG into the outputs directory.
    ///
    /// Blocking; call from a blocking context.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or encoded.
    pub fn save_annotated(&self, image: &DynamicImage) -> Result<StoredImage> {
        let name = fresh_name("jpg");
        let path = self.output_dir.join(&name);

        let mut writer = BufWriter::new(File::create(&path)?);
        let encoder = JpegEncoder::new_with_quality(&mut writer, OUTPUT_JPEG_QUALITY);
        image.to_rgb8().write_with_encoder(encoder)?;
        writer.flush()?;

        Ok(StoredImage {
            namespace: Namespace::Outputs,
            name,
            path,
        })
    }

    /// Delete stored files older than `ttl` from both namespaces.
    ///
    /// Returns the number of files removed. Files that vanish or cannot be
    /// inspected mid-sweep are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if a directory cannot be listed.
    pub async fn sweep_expired(&self, ttl: Duration) -> Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0;

        for namespace in [Namespace::Uploads, Namespace::Outputs] {
            let mut entries = tokio::fs::read_dir(self.dir(namespace)).await?;
            while let Some(entry) = entries.next_entry().await? {
                let Ok(meta) = entry.metadata().await else {
                    continue;
                };
                if !meta.is_file() {
                    continue;
                }
                let age = meta
                    .modified()
                    .ok()
                    .and_then(|modified| now.duration_since(modified).ok())
                    .unwrap_or_default();
                if age < ttl {
                    continue;
                }
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) => {
                        tracing::warn!(path = %entry.path().display(), error = %e, "Failed to remove expired file");
                    }
                }
            }
        }

        if removed > 0 {
            tracing::info!(removed, "Swept expired images");
        }
        Ok(removed)
    }
}
