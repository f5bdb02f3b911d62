//! Error taxonomy shared by every component.
//!
//! Each variant corresponds to one caller-visible failure class. The
//! dispatcher in [`crate::api`] turns any of them into a response envelope
//! through [`Error::to_public`]; nothing below that boundary formats
//! messages for clients.
//!
//! Storage-shaped failures (`Store`, `Io`, `Sqlite`, `Config`, `Json`) never
//! reach the caller verbatim. They are logged with a short reference id and
//! the client only sees `internal error (ref <id>)`.

use crate::assets::UploadError;
use crate::config::ConfigError;
use crate::types::Collection;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Validation(String),
    #[error("Not authenticated.")]
    Unauthorized,
    #[error("{collection} {id} not found")]
    NotFound { collection: Collection, id: i64 },
    #[error("{0}")]
    Template(String),
    #[error("{0}")]
    NoOp(String),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("store error: {0}")]
    Store(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Caller-safe rendering of an [`Error`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicError {
    pub code: &'static str,
    pub message: String,
    pub status: u16,
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Stable snake-case code for the envelope's `code` field.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::Unauthorized => "unauthorized",
            Error::NotFound { .. } => "not_found",
            Error::Template(_) => "template_error",
            Error::NoOp(_) => "noop_error",
            Error::Upload(_) => "upload_error",
            Error::Store(_)
            | Error::Io(_)
            | Error::Sqlite(_)
            | Error::Config(_)
            | Error::Json(_) => "store_error",
        }
    }

    /// HTTP status the surface should answer with.
    pub fn status(&self) -> u16 {
        match self {
            Error::Validation(_) | Error::Upload(_) => 400,
            Error::Unauthorized => 401,
            Error::NotFound { .. } => 404,
            Error::Template(_) | Error::NoOp(_) => 409,
            _ => 500,
        }
    }

    fn is_store_shaped(&self) -> bool {
        self.code() == "store_error"
    }

    /// Convert into the caller-facing shape, logging store-shaped detail
    /// under a fresh reference id.
    pub fn to_public(&self) -> PublicError {
        let message = if self.is_store_shaped() {
            let reference = short_reference();
            error!(reference = %reference, error = %self, "request failed");
            format!("internal error (ref {reference})")
        } else {
            self.to_string()
        };
        PublicError {
            code: self.code(),
            message,
            status: self.status(),
        }
    }
}

fn short_reference() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}
