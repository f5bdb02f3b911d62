//! Project CRUD.

use crate::error::{Error, Result};
use crate::slug;
use crate::types::{Collection, LinkRef, Neighbors, Project, ProjectFields, ProjectStatus};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::debug;

const ORDER: &str = "ORDER BY sort_order ASC, created_at DESC, id DESC";

impl Project {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let status: String = row.get("status")?;
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            slug: row.get("slug")?,
            category: row.get("category")?,
            status: ProjectStatus::coerce(&status),
            year: row.get("year")?,
            location: row.get("location")?,
            description: row.get("description")?,
            image_path: row.get("image_path")?,
            sort_order: row.get("sort_order")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub fn list(conn: &Connection) -> Result<Vec<Project>> {
    let mut stmt = conn.prepare(&format!("SELECT * FROM projects {ORDER}"))?;
    let rows = stmt
        .query_map([], |row| Project::from_row(row))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    debug!(count = rows.len(), "listed projects");
    Ok(rows)
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Project>> {
    let row = conn
        .query_row("SELECT * FROM projects WHERE id = ?1", params![id], |row| {
            Project::from_row(row)
        })
        .optional()?;
    Ok(row)
}

pub fn find_by_slug(conn: &Connection, slug: &str) -> Result<Option<Project>> {
    let row = conn
        .query_row(
            "SELECT * FROM projects WHERE slug = ?1",
            params![slug],
            |row| Project::from_row(row),
        )
        .optional()?;
    Ok(row)
}

fn require(conn: &Connection, id: i64) -> Result<Project> {
    get(conn, id)?.ok_or(Error::NotFound {
        collection: Collection::Project,
        id,
    })
}

pub fn create(conn: &Connection, fields: &ProjectFields) -> Result<Project> {
    let slug = slug::allocate(conn, &fields.name, Collection::Project, None)?;
    let max_order: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order), 0) FROM projects",
        [],
        |row| row.get(0),
    )?;
    let now = Utc::now();
    conn.execute(
        "INSERT INTO projects
            (name, slug, category, status, year, location, description, image_path,
             sort_order, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
        params![
            fields.name,
            slug,
            fields.category,
            fields.status.as_str(),
            fields.year,
            fields.location,
            fields.description,
            fields.image_path,
            max_order + 1,
            now,
        ],
    )?;
    require(conn, conn.last_insert_rowid())
}

/// Rewrite every editable field. `sort_order` and `created_at` are kept.
pub fn update(conn: &Connection, id: i64, fields: &ProjectFields) -> Result<Project> {
    require(conn, id)?;
    let slug = slug::allocate(conn, &fields.name, Collection::Project, Some(id))?;
    conn.execute(
        "UPDATE projects SET
            name = ?1, slug = ?2, category = ?3, status = ?4, year = ?5,
            location = ?6, description = ?7, image_path = ?8, updated_at = ?9
         WHERE id = ?10",
        params![
            fields.name,
            slug,
            fields.category,
            fields.status.as_str(),
            fields.year,
            fields.location,
            fields.description,
            fields.image_path,
            Utc::now(),
            id,
        ],
    )?;
    require(conn, id)
}

pub fn delete(conn: &Connection, id: i64) -> Result<Project> {
    let project = require(conn, id)?;
    conn.execute("DELETE FROM projects WHERE id = ?1", params![id])?;
    Ok(project)
}

/// Previous/next project by `(sort_order, id)`.
pub fn neighbors(conn: &Connection, project: &Project) -> Result<Neighbors> {
    let link = |sql: &str| -> Result<Option<LinkRef>> {
        let row = conn
            .query_row(sql, params![project.sort_order, project.id], |row| {
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
            "SELECT name, slug FROM projects
             WHERE sort_order < ?1 OR (sort_order = ?1 AND id < ?2)
             ORDER BY sort_order DESC, id DESC LIMIT 1",
        )?,
        next: link(
            "SELECT name, slug FROM projects
             WHERE sort_order > ?1 OR (sort_order = ?1 AND id > ?2)
             ORDER BY sort_order ASC, id ASC LIMIT 1",
        )?,
    })
}
