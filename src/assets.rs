//! Asset Manager: upload validation, placement and contained deletion.
//!
//! Uploaded images live under a single asset root inside the site root
//! (`<site_root>/<asset_dir>`). Records store the reference relative to the
//! site root, e.g. `images/aspen-heights.jpg`, so the same string works as a
//! page-relative `src` attribute.
//!
//! An upload is accepted only if:
//!
//! 1. the transport delivered it completely (see [`UploadFailure`]),
//! 2. it is within the configured size ceiling,
//! 3. its bytes sniff as JPEG, PNG, WebP or GIF,
//! 4. its filename extension is one of [`ALLOWED_EXTENSIONS`].
//!
//! The stored file is named after the owning record's slug and overwrites any
//! previous file of that name.

use crate::error::{Error, Result};
use crate::store::ContentStore;
use crate::types::Collection;
use chrono::Utc;
use image::ImageFormat;
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];

const ALLOWED_FORMATS: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::WebP,
    ImageFormat::Gif,
];

/// Transport-level reasons an upload never fully arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFailure {
    /// Larger than the server accepts for a request body.
    ServerLimit,
    /// Larger than the form allows.
    FormLimit,
    Partial,
    NoFile,
    NoTempDir,
    CantWrite,
    Other(u8),
}

impl UploadFailure {
    /// Map a numeric transport code; `0` means the upload succeeded.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => None,
            1 => Some(Self::ServerLimit),
            2 => Some(Self::FormLimit),
            3 => Some(Self::Partial),
            4 => Some(Self::NoFile),
            6 => Some(Self::NoTempDir),
            7 => Some(Self::CantWrite),
            other => Some(Self::Other(other)),
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::ServerLimit => "File too large (server limit)".into(),
            Self::FormLimit => "File too large (form limit)".into(),
            Self::Partial => "Only partially uploaded".into(),
            Self::NoFile => "No file was uploaded".into(),
            Self::NoTempDir => "Missing temp folder".into(),
            Self::CantWrite => "Failed to write to disk".into(),
            Self::Other(code) => format!("Upload error code {code}"),
        }
    }
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("{}", .0.message())]
    Transport(UploadFailure),
    #[error("File too large. Maximum is {}.", human_size(.limit))]
    TooLarge { limit: u64 },
    #[error("Invalid file type: {0}. Allowed: JPG, PNG, WEBP, GIF.")]
    InvalidType(String),
    #[error("Invalid file extension: .{0}")]
    InvalidExtension(String),
}

/// One received file part.
#[derive(Debug, Clone, Default)]
pub struct Upload {
    /// Client-supplied filename; only its extension is used.
    pub filename: String,
    pub bytes: Vec<u8>,
    pub failure: Option<UploadFailure>,
}

impl Upload {
    pub fn received(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
            failure: None,
        }
    }

    pub fn failed(failure: UploadFailure) -> Self {
        Self {
            failure: Some(failure),
            ..Default::default()
        }
    }

    fn extension(&self) -> String {
        Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase()
    }
}

pub struct AssetManager {
    site_root: PathBuf,
    asset_dir: String,
    max_bytes: u64,
}

impl AssetManager {
    /// `asset_dir` is relative to `site_root` and becomes the prefix of every
    /// stored reference.
    pub fn new(site_root: impl Into<PathBuf>, asset_dir: &str, max_bytes: u64) -> Self {
        Self {
            site_root: site_root.into(),
            asset_dir: asset_dir.trim_matches('/').to_string(),
            max_bytes,
        }
    }

    pub fn root(&self) -> PathBuf {
        self.site_root.join(&self.asset_dir)
    }

    /// Validate an upload and return its normalised extension.
    pub fn check(&self, upload: &Upload) -> std::result::Result<String, UploadError> {
        if let Some(failure) = upload.failure {
            return Err(UploadError::Transport(failure));
        }
        if upload.bytes.is_empty() {
            return Err(UploadError::Transport(UploadFailure::NoFile));
        }
        if upload.bytes.len() as u64 > self.max_bytes {
            return Err(UploadError::TooLarge {
                limit: self.max_bytes,
            });
        }
        match image::guess_format(&upload.bytes) {
            Ok(format) if ALLOWED_FORMATS.contains(&format) => {}
            Ok(format) => {
                return Err(UploadError::InvalidType(format.to_mime_type().to_string()));
            }
            Err(_) => return Err(UploadError::InvalidType("unknown".into())),
        }
        let ext = upload.extension();
        if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(UploadError::InvalidExtension(ext));
        }
        Ok(ext)
    }

    /// Validate, place the file, and point the owning record at it.
    ///
    /// Without an owner the file is still stored, under a timestamped name,
    /// and the reference is returned for the caller to use in a later save.
    pub fn accept(
        &self,
        store: &ContentStore,
        upload: &Upload,
        collection: Collection,
        owner: Option<i64>,
    ) -> Result<String> {
        let ext = self.check(upload)?;
        let stem = match owner {
            Some(id) => store
                .slug_of(collection, id)?
                .ok_or(Error::NotFound { collection, id })?,
            None => format!("{}-{}", collection, Utc::now().format("%Y%m%d-%H%M%S")),
        };
        let filename = format!("{stem}.{ext}");

        let root = self.root();
        fs::create_dir_all(&root)?;
        fs::write(root.join(&filename), &upload.bytes)?;
        let reference = self.reference_for(&filename);
        info!(%collection, ?owner, reference = %reference, bytes = upload.bytes.len(), "image stored");

        if let Some(id) = owner {
            store.set_image(collection, id, &reference)?;
        }
        Ok(reference)
    }

    fn reference_for(&self, filename: &str) -> String {
        if self.asset_dir.is_empty() {
            filename.to_string()
        } else {
            format!("{}/{filename}", self.asset_dir)
        }
    }

    /// Delete the file behind a stored reference, if it lies inside the
    /// asset root. Returns whether a file was removed; failures are logged
    /// and otherwise ignored.
    pub fn remove(&self, reference: &str) -> bool {
        let root = match self.root().canonicalize() {
            Ok(root) => root,
            Err(e) => {
                warn!(error = %e, "asset root unavailable, skipping removal");
                return false;
            }
        };
        let resolved = match self.site_root.join(reference).canonicalize() {
            Ok(path) => path,
            Err(_) => {
                debug!(reference, "asset already absent");
                return false;
            }
        };
        if resolved == root || !resolved.starts_with(&root) {
            warn!(reference, "refusing to delete outside the asset root");
            return false;
        }
        match fs::remove_file(&resolved) {
            Ok(()) => {
                info!(reference, "asset removed");
                true
            }
            Err(e) => {
                warn!(reference, error = %e, "asset removal failed");
                false
            }
        }
    }
}

/// A reference is safe when it is a plain relative path: no root, no `..`,
/// no drive or scheme prefix, no backslashes.
pub fn is_safe_reference(path: &str) -> bool {
    !path.is_empty()
        && !path.contains('\\')
        && !path.contains(':')
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

/// A stored image reference must name a file below `asset_dir`, written
/// as `<asset_dir>/<safe relative path>`.
pub fn is_asset_reference(asset_dir: &str, path: &str) -> bool {
    let asset_dir = asset_dir.trim_matches('/');
    if asset_dir.is_empty() {
        return is_safe_reference(path);
    }
    path.strip_prefix(asset_dir)
        .and_then(|rest| rest.strip_prefix('/'))
        .is_some_and(is_safe_reference)
}

fn human_size(bytes: &u64) -> String {
    const MIB: u64 = 1024 * 1024;
    let bytes = *bytes;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else if bytes >= 1024 {
        format!("{}KB", bytes / 1024)
    } else {
        format!("{bytes} bytes")
    }
}
