//! HTTP surface.
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `GET/POST /admin/api` | console actions (`action` field, form or multipart) |
//! | `GET <project link>?slug=` | project detail page |
//! | `GET <post link>?slug=` | post detail page, counts a view |
//! | anything else | static files under the site root |
//!
//! The detail routes are taken from `render.project_link` and
//! `render.post_link`, so cards and routes never disagree. Store and
//! document work runs on the blocking pool; the async side only moves bytes.

use crate::api::{App, Request, Response, SessionChange};
use crate::assets::{Upload, UploadFailure};
use crate::error::{Error, Result};
use crate::types::Page;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, FromRequest, Multipart, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{Html, IntoResponse},
    routing::get,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

type Shared = Arc<App>;

/// Multipart overhead allowed on top of the upload ceiling, so an oversized
/// file still arrives whole and gets the precise "too large" message.
const BODY_SLACK: usize = 64 * 1024;

const SESSION_SWEEP: Duration = Duration::from_secs(60);

/// Build the router around a shared console.
pub fn router(app: Shared) -> Router {
    let cfg = app.config();
    let body_limit = usize::try_from(cfg.uploads.max_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(BODY_SLACK);
    let project_route = detail_route(&cfg.render.project_link, "/project-detail");
    let post_route = detail_route(&cfg.render.post_link, "/blog-detail");
    let site_root = cfg.site_root();

    Router::new()
        .route("/admin/api", get(admin_api).post(admin_api))
        .route(&project_route, get(project_detail))
        .route(&post_route, get(post_detail))
        .fallback_service(ServeDir::new(site_root))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(app)
}

/// Path part of a configured detail link (`/blog-detail?slug=` → `/blog-detail`).
fn detail_route(link: &str, fallback: &str) -> String {
    match link.split('?').next() {
        Some(path) if path.starts_with('/') && path.len() > 1 => path.to_string(),
        _ => fallback.to_string(),
    }
}

/// Serve until Ctrl-C, then close the store.
pub async fn serve(app: App) -> Result<()> {
    let bind = app.config().server.bind.clone();
    let shared = Arc::new(app);

    let sweeper = {
        let app = Arc::clone(&shared);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(SESSION_SWEEP);
            loop {
                tick.tick().await;
                let dropped = app.gate().purge_expired();
                if dropped > 0 {
                    info!(dropped, "expired sessions purged");
                }
            }
        })
    };

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(addr = %bind, site_root = %shared.config().site_root().display(), "listening");
    axum::serve(listener, router(Arc::clone(&shared)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    let _ = sweeper.await;
    match Arc::try_unwrap(shared) {
        Ok(app) => app.close(),
        Err(_) => {
            warn!("console still referenced at shutdown; store closes on drop");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

// ----------------------------------------------------------------------------
// Console API
// ----------------------------------------------------------------------------

async fn admin_api(State(app): State<Shared>, request: axum::extract::Request) -> axum::response::Response {
    let cookie_name = app.config().server.session_cookie.clone();
    let session = session_from_headers(request.headers(), &cookie_name);

    let mut req = match decode(request).await {
        Ok(req) => req,
        Err(e) => return into_http(Response::error(&e), &cookie_name),
    };
    req.session = session;

    let worker = Arc::clone(&app);
    let resp = match tokio::task::spawn_blocking(move || worker.dispatch(&req)).await {
        Ok(resp) => resp,
        Err(e) => Response::error(&Error::store(format!("dispatch task failed: {e}"))),
    };
    into_http(resp, &cookie_name)
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"))
}

/// Turn a form, query string or multipart body into a [`Request`].
async fn decode(request: axum::extract::Request) -> Result<Request> {
    if !is_multipart(request.headers()) {
        let axum::Form(fields) =
            axum::Form::<HashMap<String, String>>::from_request(request, &())
                .await
                .map_err(|e| Error::validation(format!("Malformed request: {}", e.body_text())))?;
        return Ok(Request {
            action: fields.get("action").cloned().unwrap_or_default(),
            fields,
            ..Default::default()
        });
    }

    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| Error::validation(format!("Malformed upload: {}", e.body_text())))?;
    let mut req = Request::default();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                let failure = if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                    UploadFailure::ServerLimit
                } else {
                    UploadFailure::Partial
                };
                warn!(error = %e, "multipart body ended early");
                req.upload = Some(Upload::failed(failure));
                break;
            }
        };
        let name = field.name().unwrap_or_default().to_string();
        if name == "image" {
            let filename = field.file_name().unwrap_or_default().to_string();
            req.upload = Some(match field.bytes().await {
                Ok(bytes) if filename.is_empty() && bytes.is_empty() => {
                    Upload::failed(UploadFailure::NoFile)
                }
                Ok(bytes) => Upload::received(filename, bytes.to_vec()),
                Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                    Upload::failed(UploadFailure::ServerLimit)
                }
                Err(e) => {
                    warn!(error = %e, "upload part unreadable");
                    Upload::failed(UploadFailure::Partial)
                }
            });
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| Error::validation(format!("Malformed field {name}: {}", e.body_text())))?;
            if name == "action" {
                req.action = value.clone();
            }
            req.fields.insert(name, value);
        }
    }
    Ok(req)
}

fn into_http(resp: Response, cookie_name: &str) -> axum::response::Response {
    let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut out = (status, Json(resp.body)).into_response();
    let cookie = match resp.session {
        SessionChange::Keep => None,
        SessionChange::Set(id) => Some(session_cookie(cookie_name, &id)),
        SessionChange::Clear => Some(cleared_cookie(cookie_name)),
    };
    if let Some(value) = cookie.and_then(|c| HeaderValue::from_str(&c).ok()) {
        out.headers_mut().insert(header::SET_COOKIE, value);
    }
    out
}

pub fn session_cookie(name: &str, id: &str) -> String {
    format!("{name}={id}; HttpOnly; SameSite=Strict; Path=/")
}

pub fn cleared_cookie(name: &str) -> String {
    format!("{name}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0")
}

/// Value of cookie `name` from the request headers.
pub fn session_from_headers(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, v)| *k == name && !v.is_empty())
        .map(|(_, v)| v.to_string())
}

// ----------------------------------------------------------------------------
// Detail pages
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct DetailQuery {
    #[serde(default)]
    slug: String,
}

async fn project_detail(State(app): State<Shared>, Query(q): Query<DetailQuery>) -> axum::response::Response {
    detail(app, Page::Projects, q.slug).await
}

async fn post_detail(State(app): State<Shared>, Query(q): Query<DetailQuery>) -> axum::response::Response {
    detail(app, Page::Blog, q.slug).await
}

async fn detail(app: Shared, page: Page, slug: String) -> axum::response::Response {
    let result = tokio::task::spawn_blocking(move || {
        let found = match page {
            Page::Projects => app.project_page(&slug),
            Page::Blog => app.post_page(&slug),
        }?;
        Ok::<_, Error>(match found {
            Some(markup) => (StatusCode::OK, markup),
            None => (StatusCode::NOT_FOUND, app.not_found_page(page)),
        })
    })
    .await;

    match result {
        Ok(Ok((status, markup))) => (status, Html(markup.into_string())).into_response(),
        Ok(Err(e)) => {
            let public = e.to_public();
            (StatusCode::INTERNAL_SERVER_ERROR, public.message).into_response()
        }
        Err(e) => {
            error!(error = %e, "detail task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
