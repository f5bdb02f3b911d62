//! Shared test utilities.
//!
//! Record builders, tiny but real image payloads, and an isolated copy of
//! `fixtures/site/` wired into a logged-in [`TestApp`].
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let t = TestApp::new();
//! let resp = t.call(Request::new("get_projects"));
//! assert!(resp.success());
//! ```

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use crate::api::{App, Request, Response};
use crate::config::SiteConfig;
use crate::store::ContentStore;
use crate::types::{
    Page, Post, PostFields, PostStatus, Project, ProjectFields, ProjectStatus,
};

// =========================================================================
// Payloads
// =========================================================================

/// A valid 1x1 RGBA PNG.
pub const TINY_PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
    0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0b, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0xf8,
    0x0f, 0x04, 0x00, 0x09, 0xfb, 0x03, 0xfd, 0xfb, 0x5e, 0x6b, 0x2b, 0x00, 0x00, 0x00, 0x00,
    0x49, 0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

/// A valid 1x1 GIF89a.
pub const TINY_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

// =========================================================================
// Record builders
// =========================================================================

pub fn project_fields(name: &str) -> ProjectFields {
    ProjectFields {
        name: name.to_string(),
        category: "Residential".into(),
        status: ProjectStatus::Ongoing,
        year: Some(2024),
        location: Some("Lagos".into()),
        description: format!("About {name}."),
        image_path: None,
    }
}

pub fn post_fields(title: &str, status: PostStatus) -> PostFields {
    PostFields {
        title: title.to_string(),
        excerpt: None,
        body: format!("<p>{title} body text.</p>"),
        author: "Editorial Team".into(),
        category: "News".into(),
        tags: None,
        status,
        image_path: None,
        published_at: None,
    }
}

/// A stored-looking project, for renderer tests that skip the store.
pub fn sample_project(id: i64, name: &str, slug: &str) -> Project {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    Project {
        id,
        name: name.to_string(),
        slug: slug.to_string(),
        category: "Residential".into(),
        status: ProjectStatus::Upcoming,
        year: Some(2024),
        location: None,
        description: format!("About {name}."),
        image_path: None,
        sort_order: 0,
        created_at: at,
        updated_at: at,
    }
}

pub fn sample_post(id: i64, title: &str, slug: &str, status: PostStatus) -> Post {
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
    Post {
        id,
        title: title.to_string(),
        slug: slug.to_string(),
        excerpt: None,
        body: format!("<p>{title} body text.</p>"),
        author: "Editorial Team".into(),
        category: "News".into(),
        tags: None,
        status,
        image_path: None,
        views: 0,
        published_at: (status == PostStatus::Published).then_some(at),
        created_at: at,
        updated_at: at,
    }
}

// =========================================================================
// Site setup
// =========================================================================

/// Copy `fixtures/site/` into `<tmp>/site/` and create the asset directory.
pub fn setup_site() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let site = tmp.path().join("site");
    std::fs::create_dir_all(site.join("images")).unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/site");
    for entry in std::fs::read_dir(&fixtures).unwrap() {
        let entry = entry.unwrap();
        if entry.file_type().unwrap().is_file() {
            std::fs::copy(entry.path(), site.join(entry.file_name())).unwrap();
        }
    }
    tmp
}

/// Stock config pointed at a directory made by [`setup_site`].
pub fn site_config(root: &Path) -> SiteConfig {
    let mut config = SiteConfig::default();
    config.paths.site_root = root.join("site").to_string_lossy().into_owned();
    config.paths.database = root.join("pagewright.db").to_string_lossy().into_owned();
    config.server.login_failure_delay_ms = 0;
    config
}

fn password_hash() -> &'static str {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| crate::auth::hash_password(TestApp::PASSWORD).unwrap())
}

// =========================================================================
// Logged-in console
// =========================================================================

pub struct TestApp {
    pub dir: TempDir,
    pub app: App,
    pub session: String,
}

impl TestApp {
    pub const PASSWORD: &'static str = "correct horse";

    pub fn new() -> Self {
        let dir = setup_site();
        let mut config = site_config(dir.path());
        config.admin.password_hash = password_hash().to_string();
        let app = App::new(config, ContentStore::open_in_memory().unwrap());
        let session = app
            .gate()
            .authenticate("admin", Self::PASSWORD, None)
            .unwrap();
        Self { dir, app, session }
    }

    /// Dispatch with the logged-in session attached.
    pub fn call(&self, req: Request) -> Response {
        self.app.dispatch(&req.with_session(Some(&self.session)))
    }

    pub fn page(&self, page: Page) -> PathBuf {
        self.app.config().page_path(page)
    }
}
