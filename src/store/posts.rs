//! Post CRUD.
//!
//! `published_at` follows the status: saving a post as published keeps the
//! time it was first published (unless the caller supplies one), saving it
//! as a draft clears it.

use crate::error::{Error, Result};
use crate::slug;
use crate::types::{Collection, LinkRef, Neighbors, Post, PostFields, PostStatus};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::debug;

impl Post {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let status: String = row.get("status")?;
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            slug: row.get("slug")?,
            excerpt: row.get("excerpt")?,
            body: row.get("body")?,
            author: row.get("author")?,
            category: row.get("category")?,
            tags: row.get("tags")?,
            status: PostStatus::coerce(&status),
            image_path: row.get("image_path")?,
            views: row.get("views")?,
            published_at: row.get("published_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

fn query_posts(conn: &Connection, sql: &str, args: impl rusqlite::Params) -> Result<Vec<Post>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(args, |row| Post::from_row(row))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn list_all(conn: &Connection) -> Result<Vec<Post>> {
    let rows = query_posts(
        conn,
        "SELECT * FROM posts ORDER BY created_at DESC, id DESC",
        [],
    )?;
    debug!(count = rows.len(), "listed posts");
    Ok(rows)
}

pub fn list_published(conn: &Connection) -> Result<Vec<Post>> {
    query_posts(
        conn,
        "SELECT * FROM posts WHERE status = 'published'
         ORDER BY published_at DESC, created_at DESC, id DESC",
        [],
    )
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Post>> {
    let row = conn
        .query_row("SELECT * FROM posts WHERE id = ?1", params![id], |row| {
            Post::from_row(row)
        })
        .optional()?;
    Ok(row)
}

pub fn find_published_by_slug(conn: &Connection, slug: &str) -> Result<Option<Post>> {
    let row = conn
        .query_row(
            "SELECT * FROM posts WHERE slug = ?1 AND status = 'published'",
            params![slug],
            |row| Post::from_row(row),
        )
        .optional()?;
    Ok(row)
}

fn require(conn: &Connection, id: i64) -> Result<Post> {
    get(conn, id)?.ok_or(Error::NotFound {
        collection: Collection::Post,
        id,
    })
}

/// Decide the stored publish time for a write.
pub fn resolve_published_at(
    fields: &PostFields,
    existing: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match fields.status {
        PostStatus::Draft => None,
        PostStatus::Published => Some(fields.published_at.or(existing).unwrap_or(now)),
    }
}

pub fn create(conn: &Connection, fields: &PostFields) -> Result<Post> {
    let slug = slug::allocate(conn, &fields.title, Collection::Post, None)?;
    let now = Utc::now();
    conn.execute(
        "INSERT INTO posts
            (title, slug, excerpt, body, author, category, tags, status, image_path,
             published_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
        params![
            fields.title,
            slug,
            fields.excerpt,
            fields.body,
            fields.author,
            fields.category,
            fields.tags,
            fields.status.as_str(),
            fields.image_path,
            resolve_published_at(fields, None, now),
            now,
        ],
    )?;
    require(conn, conn.last_insert_rowid())
}

pub fn update(conn: &Connection, id: i64, fields: &PostFields) -> Result<Post> {
    let existing = require(conn, id)?;
    let slug = slug::allocate(conn, &fields.title, Collection::Post, Some(id))?;
    let now = Utc::now();
    conn.execute(
        "UPDATE posts SET
            title = ?1, slug = ?2, excerpt = ?3, body = ?4, author = ?5, category = ?6,
            tags = ?7, status = ?8, image_path = ?9, published_at = ?10, updated_at = ?11
         WHERE id = ?12",
        params![
            fields.title,
            slug,
            fields.excerpt,
            fields.body,
            fields.author,
            fields.category,
            fields.tags,
            fields.status.as_str(),
            fields.image_path,
            resolve_published_at(fields, existing.published_at, now),
            now,
            id,
        ],
    )?;
    require(conn, id)
}

pub fn delete(conn: &Connection, id: i64) -> Result<Post> {
    let post = require(conn, id)?;
    conn.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
    Ok(post)
}

pub fn record_view(conn: &Connection, id: i64) -> Result<()> {
    let changed = conn.execute(
        "UPDATE posts SET views = views + 1 WHERE id = ?1 AND status = 'published'",
        params![id],
    )?;
    if changed == 0 {
        return Err(Error::NotFound {
            collection: Collection::Post,
            id,
        });
    }
    Ok(())
}

/// Previous/next published post by id.
pub fn neighbors(conn: &Connection, post: &Post) -> Result<Neighbors> {
    let link = |sql: &str| -> Result<Option<LinkRef>> {
        let row = conn
            .query_row(sql, params![post.id], |row| {
                Ok(LinkRef {
                    title: row.get(0)?,
                    slug: row.get(1)?,
                })
            })
            .optional()?;
        Ok(row)
    };
    Ok(Neighbors {
        prev: link(
            "SELECT title, slug FROM posts WHERE status = 'published' AND id < ?1
             ORDER BY id DESC LIMIT 1",
        )?,
        next: link(
            "SELECT title, slug FROM posts WHERE status = 'published' AND id > ?1
             ORDER BY id ASC LIMIT 1",
        )?,
    })
}

/// Published posts sharing the category, newest first.
pub fn related(conn: &Connection, post: &Post, limit: usize) -> Result<Vec<Post>> {
    query_posts(
        conn,
        "SELECT * FROM posts
         WHERE status = 'published' AND category = ?1 AND id != ?2
         ORDER BY published_at DESC, id DESC LIMIT ?3",
        params![post.category, post.id, limit as i64],
    )
}
