//! Action dispatcher.
//!
//! Every console operation is one named action with a flat map of string
//! fields, answered with a JSON envelope:
//!
//! ```json
//! { "success": true,  ...action data }
//! { "success": false, "error": "Name is required.", "code": "validation_error" }
//! ```
//!
//! | Action | Grant | Data |
//! |--------|-------|------|
//! | `login` | no | `authenticated` (sets the session) |
//! | `logout` | no | clears the session |
//! | `check_auth` | no | `authenticated`, `configured` |
//! | `get_projects` / `get_posts` | yes | `projects` / `posts` |
//! | `create_*` / `update_*` | yes | `project` / `post`, `rebuild` |
//! | `delete_*` | yes | `deleted`, `rebuild` |
//! | `upload_image` | yes | `path`, `rebuild` when an owner was given |
//! | `rebuild_projects_page` / `rebuild_blog_page` | yes | `count`, `changed` |
//! | `diagnose` | yes | `ok`, `checks`, `stats` |
//!
//! Mutations rebuild the affected page straight away; the outcome rides
//! along as `rebuild: { success, changed, count | error }` and a failed
//! rebuild never undoes the mutation. An explicit `rebuild_*` whose output
//! equals the current document is a `noop_error`.

use crate::assets::{AssetManager, Upload, UploadFailure};
use crate::auth::SessionGate;
use crate::config::SiteConfig;
use crate::diagnose;
use crate::error::{Error, Result};
use crate::patch::{OnUnchanged, patch_file};
use crate::render;
use crate::store::ContentStore;
use crate::types::{Collection, Page, PostInput, ProjectInput};
use maud::Markup;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Number of related posts shown on a post page.
const RELATED_POSTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Login,
    Logout,
    CheckAuth,
    GetProjects,
    CreateProject,
    UpdateProject,
    DeleteProject,
    UploadImage,
    RebuildProjectsPage,
    GetPosts,
    CreatePost,
    UpdatePost,
    DeletePost,
    RebuildBlogPage,
    Diagnose,
}

impl Action {
    pub const ALL: [Action; 15] = [
        Action::Login,
        Action::Logout,
        Action::CheckAuth,
        Action::GetProjects,
        Action::CreateProject,
        Action::UpdateProject,
        Action::DeleteProject,
        Action::UploadImage,
        Action::RebuildProjectsPage,
        Action::GetPosts,
        Action::CreatePost,
        Action::UpdatePost,
        Action::DeletePost,
        Action::RebuildBlogPage,
        Action::Diagnose,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Action::Login => "login",
            Action::Logout => "logout",
            Action::CheckAuth => "check_auth",
            Action::GetProjects => "get_projects",
            Action::CreateProject => "create_project",
            Action::UpdateProject => "update_project",
            Action::DeleteProject => "delete_project",
            Action::UploadImage => "upload_image",
            Action::RebuildProjectsPage => "rebuild_projects_page",
            Action::GetPosts => "get_posts",
            Action::CreatePost => "create_post",
            Action::UpdatePost => "update_post",
            Action::DeletePost => "delete_post",
            Action::RebuildBlogPage => "rebuild_blog_page",
            Action::Diagnose => "diagnose",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name() == name)
    }

    pub fn requires_grant(self) -> bool {
        !matches!(self, Action::Login | Action::Logout | Action::CheckAuth)
    }
}

/// One decoded console request.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub action: String,
    pub fields: HashMap<String, String>,
    pub upload: Option<Upload>,
    /// Session id presented by the caller, if any.
    pub session: Option<String>,
}

impl Request {
    pub fn new(action: &str) -> Self {
        Self {
            action: action.to_string(),
            ..Default::default()
        }
    }

    pub fn field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn with_session(mut self, session: Option<&str>) -> Self {
        self.session = session.map(str::to_string);
        self
    }

    pub fn with_upload(mut self, upload: Upload) -> Self {
        self.upload = Some(upload);
        self
    }

    fn get(&self, key: &str) -> &str {
        self.fields.get(key).map(|s| s.trim()).unwrap_or("")
    }

    /// Required positive record id.
    fn id(&self) -> Result<i64> {
        match self.get("id").parse::<i64>() {
            Ok(id) if id > 0 => Ok(id),
            _ => Err(Error::validation("A valid id is required.")),
        }
    }

    /// Deserialize the flat field map into a typed input.
    fn input<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(serde_json::to_value(&self.fields)?)?)
    }
}

/// What the transport should do with the session cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChange {
    Keep,
    Set(String),
    Clear,
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub body: Value,
    pub session: SessionChange,
}

fn envelope(success: bool, data: Value) -> Value {
    let mut map = Map::new();
    map.insert("success".into(), Value::Bool(success));
    if let Value::Object(extra) = data {
        map.extend(extra);
    }
    Value::Object(map)
}

impl Response {
    pub fn ok(data: Value) -> Self {
        Self {
            status: 200,
            body: envelope(true, data),
            session: SessionChange::Keep,
        }
    }

    pub fn error(err: &Error) -> Self {
        let public = err.to_public();
        Self::failure(public.status, public.code, &public.message)
    }

    fn failure(status: u16, code: &str, message: &str) -> Self {
        Self {
            status,
            body: envelope(false, json!({ "error": message, "code": code })),
            session: SessionChange::Keep,
        }
    }

    fn with_session(mut self, change: SessionChange) -> Self {
        self.session = change;
        self
    }

    pub fn success(&self) -> bool {
        self.body["success"].as_bool().unwrap_or(false)
    }
}

/// Result of rebuilding one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub page: Page,
    /// Rows rendered into the region.
    pub count: usize,
    /// Whether the document was written.
    pub changed: bool,
}

/// The console: configuration, store, assets and sessions.
pub struct App {
    config: SiteConfig,
    store: ContentStore,
    assets: AssetManager,
    gate: SessionGate,
}

impl App {
    pub fn new(config: SiteConfig, store: ContentStore) -> Self {
        let assets = AssetManager::new(
            config.site_root(),
            &config.paths.asset_dir,
            config.uploads.max_bytes,
        );
        let gate = SessionGate::from_config(&config);
        Self {
            config,
            store,
            assets,
            gate,
        }
    }

    /// Open the configured database and build the console around it.
    pub fn open(config: SiteConfig) -> Result<Self> {
        let store = ContentStore::open(&config.database_path())?;
        Ok(Self::new(config, store))
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn gate(&self) -> &SessionGate {
        &self.gate
    }

    /// Release the store.
    pub fn close(self) -> Result<()> {
        self.store.close()
    }

    // ------------------------------------------------------------------
    // Rebuild
    // ------------------------------------------------------------------

    /// Render `page`'s rows and patch them into its document.
    pub fn rebuild(&self, page: Page, on_unchanged: OnUnchanged) -> Result<RebuildReport> {
        let (fragment, count) = match page {
            Page::Projects => {
                let rows = self.store.list_projects()?;
                (render::render_projects(&rows, &self.config.render), rows.len())
            }
            Page::Blog => {
                let rows = self.store.list_published_posts()?;
                (render::render_posts(&rows, &self.config.render), rows.len())
            }
        };
        let path = self.config.page_path(page);
        let changed = patch_file(&path, page.marker(), &fragment, on_unchanged)?;
        info!(%page, count, changed, "page rebuilt");
        Ok(RebuildReport {
            page,
            count,
            changed,
        })
    }

    /// Rebuild after a mutation; failures are reported, not propagated.
    fn auto_rebuild(&self, page: Page) -> Value {
        match self.rebuild(page, OnUnchanged::Skip) {
            Ok(report) => json!({
                "success": true,
                "changed": report.changed,
                "count": report.count,
            }),
            Err(e) => {
                warn!(%page, error = %e, "automatic rebuild failed");
                let public = e.to_public();
                json!({
                    "success": false,
                    "error": public.message,
                    "code": public.code,
                })
            }
        }
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Handle one request. Never panics on bad input; every failure becomes
    /// an error envelope.
    pub fn dispatch(&self, req: &Request) -> Response {
        let Some(action) = Action::parse(req.action.trim()) else {
            return Response::error(&Error::validation(format!(
                "Unknown action: {}",
                req.action
            )));
        };
        debug!(action = action.name(), "dispatching");

        if action.requires_grant() {
            if let Err(e) = self.gate.require_grant(req.session.as_deref()) {
                return Response::error(&e);
            }
        }

        self.handle(action, req)
            .unwrap_or_else(|e| Response::error(&e))
    }

    fn handle(&self, action: Action, req: &Request) -> Result<Response> {
        match action {
            Action::Login => Ok(self.login(req)),
            Action::Logout => {
                self.gate.logout(req.session.as_deref());
                Ok(Response::ok(json!({})).with_session(SessionChange::Clear))
            }
            Action::CheckAuth => Ok(Response::ok(json!({
                "authenticated": self.gate.is_authorized(req.session.as_deref()),
                "configured": self.gate.is_configured(),
            }))),

            Action::GetProjects => Ok(Response::ok(json!({
                "projects": self.store.list_projects()?,
            }))),
            Action::CreateProject => {
                let fields = req
                    .input::<ProjectInput>()?
                    .validate(&self.config.paths.asset_dir)?;
                let project = self.store.create_project(&fields)?;
                Ok(Response::ok(json!({
                    "project": project,
                    "rebuild": self.auto_rebuild(Page::Projects),
                })))
            }
            Action::UpdateProject => {
                let id = req.id()?;
                let fields = req
                    .input::<ProjectInput>()?
                    .validate(&self.config.paths.asset_dir)?;
                let project = self.store.update_project(id, &fields)?;
                Ok(Response::ok(json!({
                    "project": project,
                    "rebuild": self.auto_rebuild(Page::Projects),
                })))
            }
            Action::DeleteProject => {
                let id = req.id()?;
                let removed = self.store.delete_project(id)?;
                if let Some(path) = &removed.image_path {
                    self.assets.remove(path);
                }
                Ok(Response::ok(json!({
                    "deleted": id,
                    "rebuild": self.auto_rebuild(Page::Projects),
                })))
            }

            Action::GetPosts => Ok(Response::ok(json!({
                "posts": self.store.list_posts()?,
            }))),
            Action::CreatePost => {
                let fields = req
                    .input::<PostInput>()?
                    .validate(
                        &self.config.render.default_author,
                        &self.config.paths.asset_dir,
                    )?;
                let post = self.store.create_post(&fields)?;
                Ok(Response::ok(json!({
                    "post": post,
                    "rebuild": self.auto_rebuild(Page::Blog),
                })))
            }
            Action::UpdatePost => {
                let id = req.id()?;
                let fields = req
                    .input::<PostInput>()?
                    .validate(
                        &self.config.render.default_author,
                        &self.config.paths.asset_dir,
                    )?;
                let post = self.store.update_post(id, &fields)?;
                Ok(Response::ok(json!({
                    "post": post,
                    "rebuild": self.auto_rebuild(Page::Blog),
                })))
            }
            Action::DeletePost => {
                let id = req.id()?;
                let removed = self.store.delete_post(id)?;
                if let Some(path) = &removed.image_path {
                    self.assets.remove(path);
                }
                Ok(Response::ok(json!({
                    "deleted": id,
                    "rebuild": self.auto_rebuild(Page::Blog),
                })))
            }

            Action::UploadImage => self.upload_image(req),
            Action::RebuildProjectsPage => self.explicit_rebuild(Page::Projects),
            Action::RebuildBlogPage => self.explicit_rebuild(Page::Blog),
            Action::Diagnose => {
                let report = diagnose::run(&self.config, &self.store);
                Ok(Response::ok(serde_json::to_value(&report)?))
            }
        }
    }

    fn login(&self, req: &Request) -> Response {
        match self.gate.authenticate(
            req.get("username"),
            req.fields.get("password").map(String::as_str).unwrap_or(""),
            req.session.as_deref(),
        ) {
            Some(id) => Response::ok(json!({ "authenticated": true }))
                .with_session(SessionChange::Set(id)),
            None => Response::failure(401, "unauthorized", "Invalid username or password."),
        }
    }

    fn upload_image(&self, req: &Request) -> Result<Response> {
        let collection = match req.get("collection") {
            "" => Collection::Project,
            raw => Collection::parse(raw)
                .ok_or_else(|| Error::validation(format!("Unknown collection: {raw}")))?,
        };
        let owner = match req.get("id") {
            "" | "0" => None,
            _ => Some(req.id()?),
        };
        let missing = Upload::failed(UploadFailure::NoFile);
        let upload = req.upload.as_ref().unwrap_or(&missing);

        let path = self.assets.accept(&self.store, upload, collection, owner)?;
        let mut data = json!({ "path": path });
        if owner.is_some() {
            data["rebuild"] = self.auto_rebuild(Page::for_collection(collection));
        }
        Ok(Response::ok(data))
    }

    fn explicit_rebuild(&self, page: Page) -> Result<Response> {
        let report = self.rebuild(page, OnUnchanged::Fail)?;
        Ok(Response::ok(json!({
            "count": report.count,
            "changed": report.changed,
        })))
    }

    // ------------------------------------------------------------------
    // Public detail pages
    // ------------------------------------------------------------------

    fn listing_href(&self, page: Page) -> String {
        let file = match page {
            Page::Projects => &self.config.paths.projects_page,
            Page::Blog => &self.config.paths.blog_page,
        };
        format!("/{file}")
    }

    /// Project page for a requested slug, or `None` if there is no such project.
    pub fn project_page(&self, raw_slug: &str) -> Result<Option<Markup>> {
        let Some(slug) = normalize_slug(raw_slug) else {
            return Ok(None);
        };
        let Some(project) = self.store.find_project_by_slug(&slug)? else {
            return Ok(None);
        };
        let neighbors = self.store.project_neighbors(&project)?;
        Ok(Some(render::render_project_detail(
            &project,
            &neighbors,
            &self.listing_href(Page::Projects),
            &self.config.render,
        )))
    }

    /// Published post page for a requested slug; counts the view.
    pub fn post_page(&self, raw_slug: &str) -> Result<Option<Markup>> {
        let Some(slug) = normalize_slug(raw_slug) else {
            return Ok(None);
        };
        let Some(mut post) = self.store.find_published_post(&slug)? else {
            return Ok(None);
        };
        match self.store.record_view(post.id) {
            Ok(()) => post.views += 1,
            Err(e) => warn!(id = post.id, error = %e, "could not record view"),
        }
        let neighbors = self.store.post_neighbors(&post)?;
        let related = self.store.related_posts(&post, RELATED_POSTS)?;
        Ok(Some(render::render_post_detail(
            &post,
            &neighbors,
            &related,
            &self.listing_href(Page::Blog),
            &self.config.render,
        )))
    }

    pub fn not_found_page(&self, page: Page) -> Markup {
        let what = match page {
            Page::Projects => "Project",
            Page::Blog => "Post",
        };
        render::render_not_found(what, &self.listing_href(page))
    }
}

/// Reduce a requested slug to `[a-z0-9-]`; empty means "no slug".
pub fn normalize_slug(raw: &str) -> Option<String> {
    let slug: String = raw
        .trim()
        .to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect();
    (!slug.is_empty()).then_some(slug)
}
