//! `pagewright.toml`: paths, server, credential and rendering settings.
//!
//! Handles loading, validating, and merging `pagewright.toml`. Stock defaults
//! are serialized to a TOML table and the user file is merged over them, so
//! a config file only needs the keys it wants to change.
//!
//! ## Config File Location
//!
//! `pagewright.toml` in the working directory, or any path given with
//! `--config`. A missing file means "all defaults".
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [server]
//! bind = "127.0.0.1:8080"
//! session_cookie = "pagewright_admin"
//! session_ttl_secs = 28800
//! login_failure_delay_ms = 500
//!
//! [paths]
//! site_root = "site"            # Directory holding the public pages
//! projects_page = "projects.html"
//! blog_page = "blog.html"
//! asset_dir = "images"          # Relative to site_root
//! database = "pagewright.db"    # Relative to the working directory
//!
//! [admin]
//! username = "admin"
//! password_hash = ""            # argon2 PHC string from `pagewright hash-password`
//!
//! [uploads]
//! max_bytes = 5242880
//!
//! [render]
//! project_link = "/project-detail?slug="
//! post_link = "/blog-detail?slug="
//! project_placeholder_image = "images/placeholder.jpg"
//! post_placeholder_image = "images/post-placeholder.jpg"
//! default_author = "Editorial Team"
//! ```
//!
//! Unknown keys are an error.

use crate::assets::is_safe_reference;
use crate::types::Page;
use argon2::PasswordHash;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "pagewright.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Site configuration loaded from `pagewright.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// HTTP surface and session settings.
    pub server: ServerConfig,
    /// Where pages, assets and the database live.
    pub paths: PathsConfig,
    /// The single administrator credential.
    pub admin: AdminConfig,
    pub uploads: UploadsConfig,
    /// Link prefixes and placeholders used in rendered markup.
    pub render: RenderConfig,
}

impl SiteConfig {
    /// Reject settings the console cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.bind.trim().is_empty() {
            return Err(ConfigError::Validation("server.bind must not be empty".into()));
        }
        let cookie = &self.server.session_cookie;
        if cookie.is_empty()
            || !cookie
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ConfigError::Validation(
                "server.session_cookie must be a non-empty token of [A-Za-z0-9_-]".into(),
            ));
        }
        if self.server.session_ttl_secs == 0 {
            return Err(ConfigError::Validation(
                "server.session_ttl_secs must be positive".into(),
            ));
        }
        if self.uploads.max_bytes == 0 {
            return Err(ConfigError::Validation(
                "uploads.max_bytes must be positive".into(),
            ));
        }
        for (key, value) in [
            ("paths.projects_page", &self.paths.projects_page),
            ("paths.blog_page", &self.paths.blog_page),
            ("paths.asset_dir", &self.paths.asset_dir),
        ] {
            if !is_safe_reference(value) {
                return Err(ConfigError::Validation(format!(
                    "{key} must be a relative path inside site_root, got {value:?}"
                )));
            }
        }
        if !self.admin.password_hash.is_empty()
            && PasswordHash::new(&self.admin.password_hash).is_err()
        {
            return Err(ConfigError::Validation(
                "admin.password_hash is not a PHC hash string".into(),
            ));
        }
        let route = |link: &str| link.split('?').next().unwrap_or("").to_string();
        if route(&self.render.project_link) == route(&self.render.post_link) {
            return Err(ConfigError::Validation(
                "render.project_link and render.post_link must use different paths".into(),
            ));
        }
        Ok(())
    }

    pub fn site_root(&self) -> PathBuf {
        PathBuf::from(&self.paths.site_root)
    }

    /// Filesystem path of a target document.
    pub fn page_path(&self, page: Page) -> PathBuf {
        let file = match page {
            Page::Projects => &self.paths.projects_page,
            Page::Blog => &self.paths.blog_page,
        };
        self.site_root().join(file)
    }

    pub fn asset_root(&self) -> PathBuf {
        self.site_root().join(&self.paths.asset_dir)
    }

    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.paths.database)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address the HTTP surface listens on.
    pub bind: String,
    pub session_cookie: String,
    /// Idle sessions older than this are dropped.
    pub session_ttl_secs: u64,
    /// Pause before answering a failed login.
    pub login_failure_delay_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".into(),
            session_cookie: "pagewright_admin".into(),
            session_ttl_secs: 8 * 60 * 60,
            login_failure_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub site_root: String,
    /// Relative to `site_root`.
    pub projects_page: String,
    /// Relative to `site_root`.
    pub blog_page: String,
    /// Relative to `site_root`; also the prefix of stored image references.
    pub asset_dir: String,
    pub database: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            site_root: "site".into(),
            projects_page: "projects.html".into(),
            blog_page: "blog.html".into(),
            asset_dir: "images".into(),
            database: "pagewright.db".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdminConfig {
    pub username: String,
    /// argon2 PHC string. Empty disables logins.
    pub password_hash: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            username: "admin".into(),
            password_hash: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadsConfig {
    pub max_bytes: u64,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            max_bytes: 5 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// Prefix for project links; the slug is appended.
    pub project_link: String,
    /// Prefix for post links; the slug is appended.
    pub post_link: String,
    pub project_placeholder_image: String,
    pub post_placeholder_image: String,
    /// Author used when a post is saved without one.
    pub default_author: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            project_link: "/project-detail?slug=".into(),
            post_link: "/blog-detail?slug=".into(),
            project_placeholder_image: "images/placeholder.jpg".into(),
            post_placeholder_image: "images/post-placeholder.jpg".into(),
            default_author: "Editorial Team".into(),
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(SiteConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value; `Ok(None)` if it does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto the stock defaults, then deserialize and
/// validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load and validate the config file at `path`.
pub fn load_config(path: &Path) -> Result<SiteConfig, ConfigError> {
    resolve_config(load_raw_config(path)?)
}

/// Returns a fully-commented stock `pagewright.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Pagewright Configuration
# ========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# HTTP surface
# ---------------------------------------------------------------------------
[server]
# Address the console and detail pages are served on.
bind = "127.0.0.1:8080"

# Name of the session cookie issued on login.
session_cookie = "pagewright_admin"

# Sessions idle longer than this many seconds must log in again.
session_ttl_secs = 28800

# Pause before answering a failed login, in milliseconds.
login_failure_delay_ms = 500

# ---------------------------------------------------------------------------
# Paths
# ---------------------------------------------------------------------------
[paths]
# Directory holding the public site.
site_root = "site"

# Target documents, relative to site_root. Each must contain its marker pair:
#   <!-- ADMIN:PROJECTS:START --> ... <!-- ADMIN:PROJECTS:END -->
#   <!-- ADMIN:BLOG:START --> ... <!-- ADMIN:BLOG:END -->
projects_page = "projects.html"
blog_page = "blog.html"

# Upload directory, relative to site_root.
asset_dir = "images"

# SQLite database file, relative to the working directory.
# Keep it outside site_root so it is never served.
database = "pagewright.db"

# ---------------------------------------------------------------------------
# Administrator
# ---------------------------------------------------------------------------
[admin]
username = "admin"

# argon2 hash produced by `pagewright hash-password`. Empty = logins disabled.
password_hash = ""

# ---------------------------------------------------------------------------
# Uploads
# ---------------------------------------------------------------------------
[uploads]
# Largest accepted image, in bytes.
max_bytes = 5242880

# ---------------------------------------------------------------------------
# Rendering
# ---------------------------------------------------------------------------
[render]
# Link prefixes; the record's slug is appended.
project_link = "/project-detail?slug="
post_link = "/blog-detail?slug="

# Images shown for records without an upload.
project_placeholder_image = "images/placeholder.jpg"
post_placeholder_image = "images/post-placeholder.jpg"

# Author used when a post is saved without one.
default_author = "Editorial Team"
"##
}
