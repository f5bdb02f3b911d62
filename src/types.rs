//! Content records shared by the store, the renderer and the dispatcher.
//!
//! Two shapes exist per collection: the raw `*Input` assembled from request
//! fields, and the validated `*Fields` that the store is allowed to write.
//! Validation never rejects text for being long; it truncates to the
//! per-field ceilings below. It rejects only missing required fields and
//! unsafe image references.

use crate::assets::is_asset_reference;
use crate::error::{Error, Result};
use crate::sanitize::{sanitize_body, text_content, truncate_chars};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const NAME_MAX: usize = 200;
pub const TITLE_MAX: usize = 300;
pub const CATEGORY_MAX: usize = 80;
pub const LOCATION_MAX: usize = 200;
pub const IMAGE_PATH_MAX: usize = 300;
pub const EXCERPT_MAX: usize = 500;
pub const AUTHOR_MAX: usize = 120;
pub const TAGS_MAX: usize = 400;
pub const DESCRIPTION_MAX: usize = 5_000;
/// Applied to the raw body before sanitizing.
pub const BODY_MAX: usize = 100_000;

/// Plausible calendar range for a project's year; anything else is dropped.
pub const YEAR_RANGE: std::ops::RangeInclusive<i32> = 1900..=2100;

/// The two content collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Project,
    Post,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Project => "project",
            Collection::Post => "post",
        }
    }

    pub(crate) fn table(self) -> &'static str {
        match self {
            Collection::Project => "projects",
            Collection::Post => "posts",
        }
    }

    /// Parse a request value; anything unrecognised is `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "project" | "projects" => Some(Collection::Project),
            "post" | "posts" | "blog" => Some(Collection::Post),
            _ => None,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two target documents, one per collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Page {
    Projects,
    Blog,
}

impl Page {
    pub const ALL: [Page; 2] = [Page::Projects, Page::Blog];

    pub fn as_str(self) -> &'static str {
        match self {
            Page::Projects => "projects",
            Page::Blog => "blog",
        }
    }

    /// Name used in the document's `ADMIN:<NAME>:START/END` comments.
    pub fn marker(self) -> &'static str {
        match self {
            Page::Projects => "PROJECTS",
            Page::Blog => "BLOG",
        }
    }

    pub fn collection(self) -> Collection {
        match self {
            Page::Projects => Collection::Project,
            Page::Blog => Collection::Post,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Collection::parse(value).map(Self::for_collection)
    }

    pub fn for_collection(collection: Collection) -> Self {
        match collection {
            Collection::Project => Page::Projects,
            Collection::Post => Page::Blog,
        }
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Ongoing,
    Completed,
    #[default]
    Upcoming,
}

impl ProjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectStatus::Ongoing => "ongoing",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Upcoming => "upcoming",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ProjectStatus::Ongoing => "Ongoing",
            ProjectStatus::Completed => "Completed",
            ProjectStatus::Upcoming => "Upcoming",
        }
    }

    /// Unknown values fall back to the default status.
    pub fn coerce(value: &str) -> Self {
        match value.trim() {
            "ongoing" => ProjectStatus::Ongoing,
            "completed" => ProjectStatus::Completed,
            _ => ProjectStatus::Upcoming,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
}

impl PostStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
        }
    }

    /// Unknown values fall back to the default status.
    pub fn coerce(value: &str) -> Self {
        match value.trim() {
            "published" => PostStatus::Published,
            _ => PostStatus::Draft,
        }
    }
}

/// A portfolio project as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub category: String,
    pub status: ProjectStatus,
    pub year: Option<i32>,
    pub location: Option<String>,
    pub description: String,
    pub image_path: Option<String>,
    pub sort_order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A blog post as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    /// Already reduced to the structural allow-list at write time.
    pub body: String,
    pub author: String,
    pub category: String,
    /// Comma-delimited.
    pub tags: Option<String>,
    pub status: PostStatus,
    pub image_path: Option<String>,
    pub views: i64,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn tag_list(&self) -> Vec<&str> {
        self.tags
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// Estimated reading time at 200 words per minute, never below one.
    pub fn reading_minutes(&self) -> usize {
        let words = text_content(&self.body).split_whitespace().count();
        words.div_ceil(200).max(1)
    }
}

/// A `(title, slug)` pair used for previous/next and related links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkRef {
    pub title: String,
    pub slug: String,
}

/// Neighbouring records in display order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Neighbors {
    pub prev: Option<LinkRef>,
    pub next: Option<LinkRef>,
}

// ============================================================================
// Write inputs
// ============================================================================

/// Raw project fields as received.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProjectInput {
    pub name: String,
    pub category: String,
    pub status: String,
    pub year: String,
    pub location: String,
    pub description: String,
    pub image_path: String,
}

/// Validated project fields, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectFields {
    pub name: String,
    pub category: String,
    pub status: ProjectStatus,
    pub year: Option<i32>,
    pub location: Option<String>,
    pub description: String,
    pub image_path: Option<String>,
}

impl ProjectInput {
    /// `asset_dir` is the directory image references must point into.
    pub fn validate(&self, asset_dir: &str) -> Result<ProjectFields> {
        let name = required(&self.name, "Name")?;
        let category = required(&self.category, "Category")?;
        let status = required(&self.status, "Status")?;
        let description = required(&self.description, "Description")?;
        Ok(ProjectFields {
            name: truncate_chars(name, NAME_MAX),
            category: truncate_chars(category, CATEGORY_MAX),
            status: ProjectStatus::coerce(status),
            year: parse_year(&self.year),
            location: optional(&self.location, LOCATION_MAX),
            description: truncate_chars(description, DESCRIPTION_MAX),
            image_path: image_reference(&self.image_path, asset_dir)?,
        })
    }
}

/// Raw post fields as received.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PostInput {
    pub title: String,
    pub excerpt: String,
    pub body: String,
    pub author: String,
    pub category: String,
    pub tags: String,
    pub status: String,
    pub image_path: String,
    pub published_at: String,
}

/// Validated post fields, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct PostFields {
    pub title: String,
    pub excerpt: Option<String>,
    pub body: String,
    pub author: String,
    pub category: String,
    pub tags: Option<String>,
    pub status: PostStatus,
    pub image_path: Option<String>,
    /// Explicit publish time supplied by the caller, if any.
    pub published_at: Option<DateTime<Utc>>,
}

impl PostInput {
    pub fn validate(&self, default_author: &str, asset_dir: &str) -> Result<PostFields> {
        let title = required(&self.title, "Title")?;
        let category = required(&self.category, "Category")?;
        let status = required(&self.status, "Status")?;
        let body = sanitize_body(&truncate_chars(&self.body, BODY_MAX));
        if text_content(&body).trim().is_empty() {
            return Err(Error::validation("Body is required."));
        }
        let author = match self.author.trim() {
            "" => default_author,
            a => a,
        };
        let published_at = match self.published_at.trim() {
            "" => None,
            raw => Some(parse_timestamp(raw)?),
        };
        Ok(PostFields {
            title: truncate_chars(title, TITLE_MAX),
            excerpt: optional(&self.excerpt, EXCERPT_MAX),
            body,
            author: truncate_chars(author, AUTHOR_MAX),
            category: truncate_chars(category, CATEGORY_MAX),
            tags: optional(&self.tags, TAGS_MAX),
            status: PostStatus::coerce(status),
            image_path: image_reference(&self.image_path, asset_dir)?,
            published_at,
        })
    }
}

fn required<'a>(value: &'a str, label: &str) -> Result<&'a str> {
    match value.trim() {
        "" => Err(Error::validation(format!("{label} is required."))),
        v => Ok(v),
    }
}

fn optional(value: &str, max: usize) -> Option<String> {
    match value.trim() {
        "" => None,
        v => Some(truncate_chars(v, max)),
    }
}

fn parse_year(value: &str) -> Option<i32> {
    value
        .trim()
        .parse::<i32>()
        .ok()
        .filter(|y| YEAR_RANGE.contains(y))
}

fn image_reference(value: &str, asset_dir: &str) -> Result<Option<String>> {
    let Some(path) = optional(value, IMAGE_PATH_MAX) else {
        return Ok(None);
    };
    if !is_asset_reference(asset_dir, &path) {
        return Err(Error::validation(format!(
            "Image path must point into {}/: {path}",
            asset_dir.trim_matches('/')
        )));
    }
    Ok(Some(path))
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) or a bare date.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }
    if let Some(naive) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(naive.and_utc());
    }
    Err(Error::validation(format!("Invalid publish date: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project_input() -> ProjectInput {
        ProjectInput {
            name: "Aspen Heights".into(),
            category: "Residential".into(),
            status: "ongoing".into(),
            year: "2024".into(),
            location: "Lagos".into(),
            description: "Twelve units.".into(),
            image_path: String::new(),
        }
    }

    fn post_input() -> PostInput {
        PostInput {
            title: "Site visit".into(),
            body: "<p>We poured the slab.</p>".into(),
            category: "News".into(),
            status: "published".into(),
            ..Default::default()
        }
    }

    #[test]
    fn project_requires_name() {
        let input = ProjectInput {
            name: "   ".into(),
            ..project_input()
        };
        let err = input.validate("images").unwrap_err();
        assert!(matches!(err, Error::Validation(ref m) if m == "Name is required."));
    }

    #[test]
    fn project_requires_status_value() {
        let input = ProjectInput {
            status: String::new(),
            ..project_input()
        };
        assert!(input.validate("images").is_err());
    }

    #[test]
    fn unknown_status_is_coerced() {
        let input = ProjectInput {
            status: "demolished".into(),
            ..project_input()
        };
        assert_eq!(input.validate("images").unwrap().status, ProjectStatus::Upcoming);
        assert_eq!(PostStatus::coerce("archived"), PostStatus::Draft);
    }

    #[test]
    fn year_outside_range_is_dropped() {
        for raw in ["1850", "2500", "soon", ""] {
            let input = ProjectInput {
                year: raw.into(),
                ..project_input()
            };
            assert_eq!(input.validate("images").unwrap().year, None, "year {raw:?}");
        }
        assert_eq!(project_input().validate("images").unwrap().year, Some(2024));
    }

    #[test]
    fn long_text_is_truncated_not_rejected() {
        let input = ProjectInput {
            name: "x".repeat(NAME_MAX + 50),
            category: "é".repeat(CATEGORY_MAX + 1),
            ..project_input()
        };
        let fields = input.validate("images").unwrap();
        assert_eq!(fields.name.chars().count(), NAME_MAX);
        assert_eq!(fields.category.chars().count(), CATEGORY_MAX);
    }

    #[test]
    fn long_description_and_body_are_truncated() {
        let input = ProjectInput {
            description: "d".repeat(DESCRIPTION_MAX + 10),
            ..project_input()
        };
        assert_eq!(
            input.validate("images").unwrap().description.chars().count(),
            DESCRIPTION_MAX
        );

        let fields = PostInput {
            body: format!("<p>{}</p>", "b".repeat(BODY_MAX)),
            ..post_input()
        }
        .validate("Team", "images")
        .unwrap();
        assert_eq!(fields.body, format!("<p>{}", "b".repeat(BODY_MAX - 3)));
    }

    #[test]
    fn empty_optional_text_becomes_none() {
        let input = ProjectInput {
            location: "  ".into(),
            ..project_input()
        };
        assert_eq!(input.validate("images").unwrap().location, None);
    }

    #[test]
    fn image_path_must_point_into_asset_dir() {
        for raw in [
            "../../etc/passwd",
            "/etc/passwd",
            "images/../../x.jpg",
            "projects.html",
            "css/style.css",
            "images",
            "imagesx/a.jpg",
        ] {
            let input = ProjectInput {
                image_path: raw.into(),
                ..project_input()
            };
            let err = input.validate("images").unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "path {raw:?}");
        }
        let input = ProjectInput {
            image_path: "images/aspen.jpg".into(),
            ..project_input()
        };
        assert_eq!(
            input.validate("images").unwrap().image_path.as_deref(),
            Some("images/aspen.jpg")
        );
    }

    #[test]
    fn post_body_is_sanitized_and_required() {
        let fields = PostInput {
            body: "<p>Hi</p><script>alert(1)</script>".into(),
            ..post_input()
        }
        .validate("Team", "images")
        .unwrap();
        assert_eq!(fields.body, "<p>Hi</p>");

        let err = PostInput {
            body: "<script>alert(1)</script><p> </p>".into(),
            ..post_input()
        }
        .validate("Team", "images")
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn post_author_defaults() {
        let fields = post_input().validate("Editorial Team", "images").unwrap();
        assert_eq!(fields.author, "Editorial Team");
    }

    #[test]
    fn post_publish_date_formats() {
        let fields = PostInput {
            published_at: "2024-03-01 09:30:00".into(),
            ..post_input()
        }
        .validate("Team", "images")
        .unwrap();
        assert_eq!(
            fields.published_at.unwrap().to_rfc3339(),
            "2024-03-01T09:30:00+00:00"
        );
        assert!(parse_timestamp("2024-03-01T09:30:00Z").is_ok());
        assert!(parse_timestamp("2024-03-01").is_ok());
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn tags_split_on_commas() {
        let post = Post {
            id: 1,
            title: "t".into(),
            slug: "t".into(),
            excerpt: None,
            body: "<p>one two three</p>".into(),
            author: "a".into(),
            category: "c".into(),
            tags: Some("steel, , glass ,timber".into()),
            status: PostStatus::Draft,
            image_path: None,
            views: 0,
            published_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(post.tag_list(), vec!["steel", "glass", "timber"]);
        assert_eq!(post.reading_minutes(), 1);
    }

    #[test]
    fn collection_parse_accepts_aliases() {
        assert_eq!(Collection::parse("blog"), Some(Collection::Post));
        assert_eq!(Collection::parse("projects"), Some(Collection::Project));
        assert_eq!(Collection::parse("pages"), None);
    }
}
