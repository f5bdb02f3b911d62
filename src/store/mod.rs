//! SQLite-backed content store.
//!
//! One [`ContentStore`] owns one connection for the life of the process: it
//! is opened at startup, injected into the dispatcher, and closed explicitly
//! at shutdown with [`ContentStore::close`]. There is no process-wide handle.
//!
//! ## Tables
//!
//! - `projects`: portfolio entries, listed by `sort_order` then newest first
//! - `posts`: blog entries; only `published` rows reach the public page
//!
//! Every write runs in a single transaction together with its slug
//! allocation, so a failed write leaves nothing behind.

pub mod posts;
pub mod projects;
pub mod schema;

use crate::error::{Error, Result};
use crate::slug::SlugIndex;
use crate::types::{
    Collection, Neighbors, Post, PostFields, Project, ProjectFields,
};
use rusqlite::{Connection, OpenFlags, Transaction, params};
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

pub struct ContentStore {
    conn: Mutex<Connection>,
}

/// Row counts reported by the diagnostic probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub projects: u64,
    pub posts: u64,
    pub published_posts: u64,
}

impl ContentStore {
    /// Open or create the database file.
    pub fn open(path: &Path) -> Result<Self> {
        info!(path = %path.display(), "opening content store");
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::from_connection(conn)
    }

    /// Open an existing database without creating, migrating or writing it.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "opening content store read-only");
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory database (tests, dry runs).
    pub fn open_in_memory() -> Result<Self> {
        debug!("opening in-memory content store");
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Close the connection, surfacing any error SQLite reports on close.
    pub fn close(self) -> Result<()> {
        let conn = self
            .conn
            .into_inner()
            .map_err(|_| Error::store("connection lock poisoned"))?;
        conn.close().map_err(|(_, e)| Error::Sqlite(e))?;
        info!("content store closed");
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::store("connection lock poisoned"))
    }

    /// Run a read against the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run a write inside a transaction; any error rolls it back.
    pub fn with_tx<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        self.with_conn(|conn| {
            let count = |sql: &str| -> Result<u64> {
                let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
                Ok(n as u64)
            };
            Ok(StoreStats {
                projects: count("SELECT COUNT(*) FROM projects")?,
                posts: count("SELECT COUNT(*) FROM posts")?,
                published_posts: count("SELECT COUNT(*) FROM posts WHERE status = 'published'")?,
            })
        })
    }

    // ------------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------------

    /// All projects: `sort_order` ascending, newest first within a tie.
    pub fn list_projects(&self) -> Result<Vec<Project>> {
        self.with_conn(projects::list)
    }

    pub fn get_project(&self, id: i64) -> Result<Option<Project>> {
        self.with_conn(|conn| projects::get(conn, id))
    }

    pub fn find_project_by_slug(&self, slug: &str) -> Result<Option<Project>> {
        self.with_conn(|conn| projects::find_by_slug(conn, slug))
    }

    pub fn create_project(&self, fields: &ProjectFields) -> Result<Project> {
        let project = self.with_tx(|tx| projects::create(tx, fields))?;
        info!(id = project.id, slug = %project.slug, "project created");
        Ok(project)
    }

    pub fn update_project(&self, id: i64, fields: &ProjectFields) -> Result<Project> {
        let project = self.with_tx(|tx| projects::update(tx, id, fields))?;
        info!(id, slug = %project.slug, "project updated");
        Ok(project)
    }

    /// Delete and return the removed row.
    pub fn delete_project(&self, id: i64) -> Result<Project> {
        let project = self.with_tx(|tx| projects::delete(tx, id))?;
        info!(id, slug = %project.slug, "project deleted");
        Ok(project)
    }

    pub fn project_neighbors(&self, project: &Project) -> Result<Neighbors> {
        self.with_conn(|conn| projects::neighbors(conn, project))
    }

    // ------------------------------------------------------------------
    // Posts
    // ------------------------------------------------------------------

    /// Console listing: every status, newest first.
    pub fn list_posts(&self) -> Result<Vec<Post>> {
        self.with_conn(posts::list_all)
    }

    /// Public listing: published only, by publish time then creation time.
    pub fn list_published_posts(&self) -> Result<Vec<Post>> {
        self.with_conn(posts::list_published)
    }

    pub fn get_post(&self, id: i64) -> Result<Option<Post>> {
        self.with_conn(|conn| posts::get(conn, id))
    }

    pub fn find_published_post(&self, slug: &str) -> Result<Option<Post>> {
        self.with_conn(|conn| posts::find_published_by_slug(conn, slug))
    }

    pub fn create_post(&self, fields: &PostFields) -> Result<Post> {
        let post = self.with_tx(|tx| posts::create(tx, fields))?;
        info!(id = post.id, slug = %post.slug, status = post.status.as_str(), "post created");
        Ok(post)
    }

    pub fn update_post(&self, id: i64, fields: &PostFields) -> Result<Post> {
        let post = self.with_tx(|tx| posts::update(tx, id, fields))?;
        info!(id, slug = %post.slug, status = post.status.as_str(), "post updated");
        Ok(post)
    }

    pub fn delete_post(&self, id: i64) -> Result<Post> {
        let post = self.with_tx(|tx| posts::delete(tx, id))?;
        info!(id, slug = %post.slug, "post deleted");
        Ok(post)
    }

    /// Bump the view counter of a published post.
    pub fn record_view(&self, id: i64) -> Result<()> {
        self.with_conn(|conn| posts::record_view(conn, id))
    }

    pub fn post_neighbors(&self, post: &Post) -> Result<Neighbors> {
        self.with_conn(|conn| posts::neighbors(conn, post))
    }

    pub fn related_posts(&self, post: &Post, limit: usize) -> Result<Vec<Post>> {
        self.with_conn(|conn| posts::related(conn, post, limit))
    }

    // ------------------------------------------------------------------
    // Shared
    // ------------------------------------------------------------------

    /// Slug of a record, if it exists.
    pub fn slug_of(&self, collection: Collection, id: i64) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT slug FROM {} WHERE id = ?1", collection.table());
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![id])?;
            match rows.next()? {
                Some(row) => Ok(Some(row.get(0)?)),
                None => Ok(None),
            }
        })
    }

    /// Point a record's image reference at `path`.
    pub fn set_image(&self, collection: Collection, id: i64, path: &str) -> Result<()> {
        self.with_tx(|tx| {
            let sql = format!(
                "UPDATE {} SET image_path = ?1, updated_at = ?2 WHERE id = ?3",
                collection.table()
            );
            let changed = tx.execute(&sql, params![path, chrono::Utc::now(), id])?;
            if changed == 0 {
                return Err(Error::NotFound { collection, id });
            }
            Ok(())
        })?;
        debug!(%collection, id, path, "image reference updated");
        Ok(())
    }
}

impl SlugIndex for Connection {
    fn slug_taken(
        &self,
        collection: Collection,
        slug: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE slug = ?1 AND id != ?2)",
            collection.table()
        );
        let taken: bool = self.query_row(&sql, params![slug, exclude_id.unwrap_or(0)], |row| {
            row.get(0)
        })?;
        Ok(taken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{post_fields, project_fields};
    use crate::types::PostStatus;
    use tempfile::TempDir;

    #[test]
    fn stats_count_rows() {
        let store = ContentStore::open_in_memory().unwrap();
        store.create_project(&project_fields("One")).unwrap();
        store
            .create_post(&post_fields("Draft", PostStatus::Draft))
            .unwrap();
        store
            .create_post(&post_fields("Live", PostStatus::Published))
            .unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(
            stats,
            StoreStats {
                projects: 1,
                posts: 2,
                published_posts: 1
            }
        );
    }

    #[test]
    fn file_store_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data/site.db");
        let store = ContentStore::open(&path).unwrap();
        let created = store.create_project(&project_fields("Aspen")).unwrap();
        store.close().unwrap();

        let store = ContentStore::open(&path).unwrap();
        let loaded = store.get_project(created.id).unwrap().unwrap();
        assert_eq!(loaded.slug, "aspen");
        store.close().unwrap();
    }

    #[test]
    fn set_image_unknown_record_is_not_found() {
        let store = ContentStore::open_in_memory().unwrap();
        let err = store
            .set_image(Collection::Post, 99, "images/x.jpg")
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { id: 99, .. }));
    }

    #[test]
    fn slug_of_reads_either_collection() {
        let store = ContentStore::open_in_memory().unwrap();
        let project = store.create_project(&project_fields("Tower")).unwrap();
        assert_eq!(
            store.slug_of(Collection::Project, project.id).unwrap().as_deref(),
            Some("tower")
        );
        assert_eq!(store.slug_of(Collection::Post, project.id).unwrap(), None);
    }

    #[test]
    fn failed_write_leaves_no_partial_row() {
        let store = ContentStore::open_in_memory().unwrap();
        let result = store.with_tx(|tx| {
            projects::create(tx, &project_fields("Ghost"))?;
            Err::<(), _>(Error::store("simulated failure"))
        });
        assert!(result.is_err());
        assert!(store.list_projects().unwrap().is_empty());
    }
}
