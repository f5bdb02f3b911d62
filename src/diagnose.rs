//! Diagnostic Probe: read-only health report.
//!
//! Checks, in order:
//!
//! - each target document exists, is writable and carries both markers
//! - the asset root exists and is writable (with a file count)
//! - the store answers (with row counts)
//! - an administrator credential is configured
//!
//! Documents and the store are never written. Writability is tested the way
//! a rebuild or upload writes: a throwaway file is created and removed next
//! to each page and inside the asset root.

use crate::config::SiteConfig;
use crate::patch::{check_writable, create_and_remove, marker_status};
use crate::store::{ContentStore, StoreStats};
use crate::types::Page;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::warn;
use uuid::Uuid;
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Check {
    pub name: String,
    pub ok: bool,
    pub detail: String,
}

impl Check {
    fn new(name: impl Into<String>, ok: bool, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ok,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub ok: bool,
    pub checks: Vec<Check>,
    pub stats: Option<StoreStats>,
}

impl DiagnosticReport {
    pub fn failures(&self) -> impl Iterator<Item = &Check> {
        self.checks.iter().filter(|c| !c.ok)
    }
}

/// Diagnose against the console's open store.
pub fn run(config: &SiteConfig, store: &ContentStore) -> DiagnosticReport {
    report(config, Ok(store))
}

/// Diagnose without a running console. The database is opened read-only, and
/// a missing one is a failed check rather than a new empty file.
pub fn run_detached(config: &SiteConfig) -> DiagnosticReport {
    let path = config.database_path();
    if !path.is_file() {
        return report(config, Err(format!("{} not found", path.display())));
    }
    match ContentStore::open_read_only(&path) {
        Ok(store) => {
            let report = run(config, &store);
            if let Err(e) = store.close() {
                warn!(error = %e, "closing read-only store failed");
            }
            report
        }
        Err(e) => report(config, Err(e.to_public().message)),
    }
}

fn report(config: &SiteConfig, store: Result<&ContentStore, String>) -> DiagnosticReport {
    let mut checks = Vec::new();

    for page in Page::ALL {
        check_document(&mut checks, page, &config.page_path(page));
    }
    check_asset_root(&mut checks, &config.asset_root());

    let stats = store.and_then(|store| store.stats().map_err(|e| e.to_public().message));
    let stats = match stats {
        Ok(stats) => {
            checks.push(Check::new(
                "store",
                true,
                format!(
                    "{} projects, {} posts ({} published)",
                    stats.projects, stats.posts, stats.published_posts
                ),
            ));
            Some(stats)
        }
        Err(detail) => {
            checks.push(Check::new("store", false, detail));
            None
        }
    };

    let configured = !config.admin.password_hash.is_empty();
    checks.push(Check::new(
        "admin credential",
        configured,
        if configured {
            "configured"
        } else {
            "admin.password_hash is empty; logins are disabled"
        },
    ));

    DiagnosticReport {
        ok: checks.iter().all(|c| c.ok),
        checks,
        stats,
    }
}

fn check_document(checks: &mut Vec<Check>, page: Page, path: &Path) {
    let label = |what: &str| format!("{page} page {what}");
    let shown = path.display().to_string();

    if !path.is_file() {
        checks.push(Check::new(label("exists"), false, format!("{shown} not found")));
        return;
    }
    checks.push(Check::new(label("exists"), true, shown.clone()));

    checks.push(match check_writable(path) {
        Ok(()) => Check::new(label("writable"), true, "ok"),
        Err(e) => Check::new(
            label("writable"),
            false,
            format!("cannot write beside page: {e}"),
        ),
    });

    match fs::read_to_string(path) {
        Ok(doc) => {
            let status = marker_status(&doc, page.marker());
            let found = |ok: bool| if ok { "found" } else { "missing" };
            checks.push(Check::new(
                label("start marker"),
                status.start,
                found(status.start),
            ));
            // A missing end marker is repaired on the next rebuild.
            checks.push(Check::new(
                label("end marker"),
                status.end,
                if status.end || !status.start {
                    found(status.end).to_string()
                } else {
                    "missing (added on next rebuild)".to_string()
                },
            ));
        }
        Err(e) => checks.push(Check::new(label("readable"), false, e.to_string())),
    }
}

fn check_asset_root(checks: &mut Vec<Check>, root: &Path) {
    let shown = root.display().to_string();
    let Ok(meta) = fs::metadata(root) else {
        checks.push(Check::new("asset root exists", false, format!("{shown} not found")));
        return;
    };
    if !meta.is_dir() {
        checks.push(Check::new(
            "asset root exists",
            false,
            format!("{shown} is not a directory"),
        ));
        return;
    }
    let files = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count();
    checks.push(Check::new(
        "asset root exists",
        true,
        format!("{shown} ({files} files)"),
    ));
    let probe = root.join(format!(".pagewright-probe-{}", Uuid::new_v4().simple()));
    checks.push(match create_and_remove(&probe) {
        Ok(()) => Check::new("asset root writable", true, "ok"),
        Err(e) => Check::new("asset root writable", false, e.to_string()),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{setup_site, site_config};

    fn check<'a>(report: &'a DiagnosticReport, name: &str) -> &'a Check {
        report
            .checks
            .iter()
            .find(|c| c.name == name)
            .unwrap_or_else(|| panic!("no check named {name}"))
    }

    #[test]
    fn healthy_site_passes() {
        let tmp = setup_site();
        let mut config = site_config(tmp.path());
        config.admin.password_hash = crate::auth::hash_password("pw").unwrap();
        let store = ContentStore::open_in_memory().unwrap();

        let report = run(&config, &store);
        assert!(report.ok, "{:?}", report.failures().collect::<Vec<_>>());
        assert_eq!(check(&report, "projects page start marker").detail, "found");
        assert_eq!(report.stats.unwrap().projects, 0);
    }

    #[test]
    fn missing_pieces_fail_individually() {
        let tmp = setup_site();
        let config = site_config(tmp.path());
        fs::remove_file(config.page_path(Page::Blog)).unwrap();
        fs::remove_dir_all(config.asset_root()).unwrap();
        let store = ContentStore::open_in_memory().unwrap();

        let report = run(&config, &store);
        assert!(!report.ok);
        assert!(!check(&report, "blog page exists").ok);
        assert!(check(&report, "projects page exists").ok);
        assert!(!check(&report, "asset root exists").ok);
        assert!(!check(&report, "admin credential").ok);
        assert!(check(&report, "store").ok);
    }

    #[test]
    fn missing_end_marker_is_flagged() {
        let tmp = setup_site();
        let config = site_config(tmp.path());
        fs::write(
            config.page_path(Page::Projects),
            "<html><!-- ADMIN:PROJECTS:START --></html>",
        )
        .unwrap();
        let store = ContentStore::open_in_memory().unwrap();

        let report = run(&config, &store);
        assert!(check(&report, "projects page start marker").ok);
        let end = check(&report, "projects page end marker");
        assert!(!end.ok);
        assert!(end.detail.contains("next rebuild"));
    }

    #[test]
    fn probe_does_not_modify_documents() {
        let tmp = setup_site();
        let config = site_config(tmp.path());
        let before = fs::read(config.page_path(Page::Projects)).unwrap();
        let store = ContentStore::open_in_memory().unwrap();
        run(&config, &store);
        assert_eq!(fs::read(config.page_path(Page::Projects)).unwrap(), before);
    }

    #[test]
    fn counts_asset_files() {
        let tmp = setup_site();
        let config = site_config(tmp.path());
        fs::write(config.asset_root().join("a.jpg"), b"x").unwrap();
        let store = ContentStore::open_in_memory().unwrap();
        let report = run(&config, &store);
        assert!(check(&report, "asset root exists").detail.ends_with("(1 files)"));
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn writability_checks_leave_no_files_behind() {
        let tmp = setup_site();
        let config = site_config(tmp.path());
        let store = ContentStore::open_in_memory().unwrap();
        let site_before = entries(&config.site_root());
        let assets_before = entries(&config.asset_root());

        let report = run(&config, &store);
        assert!(check(&report, "projects page writable").ok);
        assert!(check(&report, "asset root writable").ok);
        assert_eq!(entries(&config.site_root()), site_before);
        assert_eq!(entries(&config.asset_root()), assets_before);
    }

    #[test]
    fn unusable_lock_file_fails_page_writable() {
        let tmp = setup_site();
        let config = site_config(tmp.path());
        let page = config.page_path(Page::Blog);
        fs::create_dir(config.site_root().join(".blog.html.lock")).unwrap();
        let store = ContentStore::open_in_memory().unwrap();

        let report = run(&config, &store);
        assert!(!check(&report, "blog page writable").ok);
        assert!(check(&report, "projects page writable").ok);

        // A rebuild hits the same wall.
        let rebuilt = crate::patch::patch_file(&page, "BLOG", "x", crate::patch::OnUnchanged::Skip);
        assert!(rebuilt.is_err());
    }

    /// Root ignores mode bits; these checks only mean something without that.
    #[cfg(unix)]
    fn mode_bits_enforced(dir: &Path) -> bool {
        let attempt = dir.join(".mode-check");
        match fs::File::create(&attempt) {
            Ok(_) => {
                let _ = fs::remove_file(&attempt);
                false
            }
            Err(_) => true,
        }
    }

    #[cfg(unix)]
    #[test]
    fn read_only_page_directory_is_not_writable() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = setup_site();
        let config = site_config(tmp.path());
        let site = config.site_root();
        fs::set_permissions(&site, fs::Permissions::from_mode(0o555)).unwrap();

        if mode_bits_enforced(&site) {
            let store = ContentStore::open_in_memory().unwrap();
            let report = run(&config, &store);
            assert!(!check(&report, "projects page writable").ok);
            assert!(!check(&report, "blog page writable").ok);
        }
        fs::set_permissions(&site, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn read_only_asset_root_is_not_writable() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = setup_site();
        let config = site_config(tmp.path());
        let root = config.asset_root();
        fs::set_permissions(&root, fs::Permissions::from_mode(0o555)).unwrap();

        if mode_bits_enforced(&root) {
            let store = ContentStore::open_in_memory().unwrap();
            let report = run(&config, &store);
            assert!(!check(&report, "asset root writable").ok);
            assert!(check(&report, "asset root exists").ok);
        }
        fs::set_permissions(&root, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn detached_run_reports_missing_database_without_creating_it() {
        let tmp = setup_site();
        let config = site_config(tmp.path());
        let db = config.database_path();

        let report = run_detached(&config);
        let store = check(&report, "store");
        assert!(!store.ok);
        assert!(store.detail.contains("not found"), "{}", store.detail);
        assert!(report.stats.is_none());
        assert!(!db.exists());
    }

    #[test]
    fn detached_run_reads_existing_database() {
        let tmp = setup_site();
        let config = site_config(tmp.path());
        let store = ContentStore::open(&config.database_path()).unwrap();
        store
            .create_project(&crate::test_helpers::project_fields("Aspen"))
            .unwrap();
        store.close().unwrap();

        let report = run_detached(&config);
        assert!(check(&report, "store").ok);
        assert_eq!(report.stats.unwrap().projects, 1);
    }
}
