//! Operator workflows against a real on-disk site and database.

use pagewright::api::{App, Request, Response, SessionChange};
use pagewright::assets::Upload;
use pagewright::auth::hash_password;
use pagewright::config::{self, SiteConfig};
use pagewright::diagnose;
use pagewright::patch::OnUnchanged;
use pagewright::types::Page;
use std::fs;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tempfile::TempDir;

const PASSWORD: &str = "site-admin-pass";

const PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
    0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0b, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0xf8,
    0x0f, 0x04, 0x00, 0x09, 0xfb, 0x03, 0xfd, 0xfb, 0x5e, 0x6b, 0x2b, 0x00, 0x00, 0x00, 0x00,
    0x49, 0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

fn password_hash() -> &'static str {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| hash_password(PASSWORD).unwrap())
}

/// Copy the fixture site into a temp dir and write a `pagewright.toml` for it.
fn site() -> (TempDir, SiteConfig) {
    let tmp = TempDir::new().unwrap();
    let site = tmp.path().join("site");
    fs::create_dir_all(site.join("images")).unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/site");
    for name in ["projects.html", "blog.html"] {
        fs::copy(fixtures.join(name), site.join(name)).unwrap();
    }

    let toml = format!(
        r#"
[server]
login_failure_delay_ms = 0

[paths]
site_root = {site:?}
database = {db:?}

[admin]
username = "editor"
password_hash = {hash:?}
"#,
        site = site.to_string_lossy(),
        db = tmp.path().join("data/pagewright.db").to_string_lossy(),
        hash = password_hash(),
    );
    let config_path = tmp.path().join(config::CONFIG_FILE);
    fs::write(&config_path, toml).unwrap();
    let config = config::load_config(&config_path).unwrap();
    (tmp, config)
}

fn login(app: &App) -> String {
    let resp = app.dispatch(
        &Request::new("login")
            .field("username", "editor")
            .field("password", PASSWORD),
    );
    match resp.session {
        SessionChange::Set(id) => id,
        other => panic!("login failed: {other:?} {}", resp.body),
    }
}

fn call(app: &App, session: &str, req: Request) -> Response {
    app.dispatch(&req.with_session(Some(session)))
}

fn region(doc: &str, name: &str) -> String {
    let start = format!("<!-- ADMIN:{name}:START -->");
    let end = format!("<!-- ADMIN:{name}:END -->");
    let from = doc.find(&start).unwrap() + start.len();
    let to = doc.find(&end).unwrap();
    doc[from..to].to_string()
}

fn outside(doc: &str, name: &str) -> (String, String) {
    let start = format!("<!-- ADMIN:{name}:START -->");
    let end = format!("<!-- ADMIN:{name}:END -->");
    let from = doc.find(&start).unwrap();
    let to = doc.find(&end).unwrap();
    (doc[..from].to_string(), doc[to..].to_string())
}

#[test]
fn project_lifecycle_keeps_page_in_sync() {
    let (_tmp, config) = site();
    let page = config.page_path(Page::Projects);
    let original = fs::read_to_string(&page).unwrap();
    let app = App::open(config).unwrap();
    let session = login(&app);

    let resp = call(
        &app,
        &session,
        Request::new("create_project")
            .field("name", "Aspen Heights, Phase II")
            .field("category", "Residential")
            .field("status", "ongoing")
            .field("year", "2024")
            .field("description", "Forty units over a shared courtyard."),
    );
    assert!(resp.success(), "{}", resp.body);
    assert_eq!(resp.body["project"]["slug"], "aspen-heights-phase-ii");
    let id = resp.body["project"]["id"].as_i64().unwrap();

    let doc = fs::read_to_string(&page).unwrap();
    let cards = region(&doc, "PROJECTS");
    assert_eq!(cards.matches("project-item").count(), 1);
    assert!(cards.contains("slug=aspen-heights-phase-ii"));
    assert!(!cards.contains("hand-written sample"));
    assert_eq!(outside(&doc, "PROJECTS"), outside(&original, "PROJECTS"));

    let resp = call(
        &app,
        &session,
        Request::new("upload_image")
            .field("collection", "project")
            .field("id", id.to_string())
            .with_upload(Upload::received("DSC_0042.PNG", PNG.to_vec())),
    );
    assert!(resp.success(), "{}", resp.body);
    let image = app.config().site_root().join("images/aspen-heights-phase-ii.png");
    assert!(image.is_file());

    let resp = call(
        &app,
        &session,
        Request::new("delete_project").field("id", id.to_string()),
    );
    assert!(resp.success(), "{}", resp.body);
    assert!(!image.exists());
    let doc = fs::read_to_string(&page).unwrap();
    assert_eq!(region(&doc, "PROJECTS").trim(), "<!-- No projects yet -->");

    app.close().unwrap();
}

#[test]
fn drafts_stay_off_the_blog_page() {
    let (_tmp, config) = site();
    let blog = config.page_path(Page::Blog);
    let app = App::open(config).unwrap();
    let session = login(&app);

    for (title, status) in [("Topping out", "published"), ("Unannounced tower", "draft")] {
        let resp = call(
            &app,
            &session,
            Request::new("create_post")
                .field("title", title)
                .field("category", "News")
                .field("status", status)
                .field("body", "<p>Notes from site.</p><script>alert(1)</script>"),
        );
        assert!(resp.success(), "{}", resp.body);
    }

    let doc = fs::read_to_string(&blog).unwrap();
    let cards = region(&doc, "BLOG");
    assert!(cards.contains("topping-out"));
    assert!(!cards.contains("unannounced-tower"));
    assert!(!doc.contains("<script>"));

    assert!(app.post_page("unannounced-tower").unwrap().is_none());
    let detail = app.post_page("topping-out").unwrap().unwrap().into_string();
    assert!(detail.contains("Notes from site."));
    assert!(!detail.contains("alert(1)"));
}

#[test]
fn console_requires_login() {
    let (_tmp, config) = site();
    let page = config.page_path(Page::Projects);
    let before = fs::read(&page).unwrap();
    let app = App::open(config).unwrap();

    let resp = app.dispatch(
        &Request::new("create_project")
            .field("name", "Intruder")
            .field("category", "x")
            .field("status", "ongoing")
            .field("description", "x")
            .with_session(Some("guessed-session-id")),
    );
    assert_eq!(resp.status, 401);
    assert_eq!(resp.body["success"], false);
    assert_eq!(fs::read(&page).unwrap(), before);

    let resp = app.dispatch(&Request::new("login").field("username", "editor").field("password", "wrong"));
    assert_eq!(resp.status, 401);
    assert_eq!(resp.session, SessionChange::Keep);
}

#[test]
fn traversal_references_never_delete_outside_asset_root() {
    let (tmp, config) = site();
    let victim = tmp.path().join("secrets.txt");
    fs::write(&victim, "do not delete").unwrap();
    let app = App::open(config).unwrap();
    let session = login(&app);

    // The console refuses to store such a reference in the first place.
    let resp = call(
        &app,
        &session,
        Request::new("create_project")
            .field("name", "Sneaky")
            .field("category", "x")
            .field("status", "ongoing")
            .field("description", "x")
            .field("image_path", "../secrets.txt"),
    );
    assert_eq!(resp.status, 400);

    // A reference planted directly in the store is still not followed.
    let resp = call(
        &app,
        &session,
        Request::new("create_project")
            .field("name", "Sneaky")
            .field("category", "x")
            .field("status", "ongoing")
            .field("description", "x"),
    );
    let id = resp.body["project"]["id"].as_i64().unwrap();
    app.store()
        .with_conn(|conn| {
            conn.execute(
                "UPDATE projects SET image_path = '../secrets.txt' WHERE id = ?1",
                [id],
            )?;
            Ok(())
        })
        .unwrap();

    let resp = call(
        &app,
        &session,
        Request::new("delete_project").field("id", id.to_string()),
    );
    assert!(resp.success(), "{}", resp.body);
    assert_eq!(fs::read_to_string(&victim).unwrap(), "do not delete");
}

#[test]
fn page_without_markers_is_left_alone() {
    let (_tmp, config) = site();
    let page = config.page_path(Page::Blog);
    fs::write(&page, "<html><body>redesigned</body></html>").unwrap();
    let app = App::open(config).unwrap();
    let session = login(&app);

    let resp = call(&app, &session, Request::new("rebuild_blog_page"));
    assert_eq!(resp.body["code"], "template_error");
    assert!(resp.body["error"].as_str().unwrap().contains("BLOG"));
    assert_eq!(
        fs::read_to_string(&page).unwrap(),
        "<html><body>redesigned</body></html>"
    );

    let report = diagnose::run(app.config(), app.store());
    assert!(!report.ok);
}

#[test]
fn content_survives_restart() {
    let (_tmp, config) = site();
    let page = config.page_path(Page::Projects);

    let app = App::open(config.clone()).unwrap();
    let session = login(&app);
    call(
        &app,
        &session,
        Request::new("create_project")
            .field("name", "Harbour View")
            .field("category", "Commercial")
            .field("status", "completed")
            .field("description", "Offices."),
    );
    app.close().unwrap();

    fs::write(&page, fs::read_to_string(&page).unwrap().replace("harbour-view", "stale")).unwrap();

    let app = App::open(config).unwrap();
    let report = app.rebuild(Page::Projects, OnUnchanged::Skip).unwrap();
    assert!(report.changed);
    assert_eq!(report.count, 1);
    assert!(fs::read_to_string(&page).unwrap().contains("harbour-view"));
}

#[test]
fn concurrent_rebuilds_leave_one_region() {
    let (_tmp, config) = site();
    let page = config.page_path(Page::Projects);
    let app = Arc::new(App::open(config).unwrap());
    let session = login(&app);
    for name in ["North Wing", "South Wing", "East Wing"] {
        call(
            &app,
            &session,
            Request::new("create_project")
                .field("name", name)
                .field("category", "Residential")
                .field("status", "upcoming")
                .field("description", "Wing."),
        );
    }

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let app = Arc::clone(&app);
            std::thread::spawn(move || app.rebuild(Page::Projects, OnUnchanged::Skip).unwrap())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let doc = fs::read_to_string(&page).unwrap();
    assert_eq!(doc.matches("<!-- ADMIN:PROJECTS:START -->").count(), 1);
    assert_eq!(doc.matches("<!-- ADMIN:PROJECTS:END -->").count(), 1);
    assert_eq!(region(&doc, "PROJECTS").matches("project-item").count(), 3);
}
