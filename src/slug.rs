//! Slug derivation and per-collection allocation.
//!
//! Every record gets a URL-safe slug derived from its title. Slugs are unique
//! within a collection: the allocator probes the collection and appends
//! `-2`, `-3`, … until it finds a free one.
//!
//! ## Derivation
//!
//! - `"Aspen Heights!"` → `"aspen-heights"`
//! - `"Aspen Heights, Phase II"` → `"aspen-heights-phase-ii"`
//! - `"  --Déjà vu--  "` → `"dj-vu"` (non-ASCII letters are dropped, not transliterated)
//! - `"   "` → [`DEFAULT_SLUG`]
//!
//! ## Concurrency
//!
//! Allocation is check-then-write. Two creates racing on the same base can
//! both see it free; the `UNIQUE` constraint on the slug column turns the
//! loser into a store error rather than a duplicate.

use crate::error::Result;
use crate::types::Collection;

/// Slug used when a title contains nothing slug-worthy.
pub const DEFAULT_SLUG: &str = "untitled";

/// Anything that can answer "is this slug already used in the collection?".
pub trait SlugIndex {
    /// `exclude_id` is the record being edited, which may keep its own slug.
    fn slug_taken(&self, collection: Collection, slug: &str, exclude_id: Option<i64>)
    -> Result<bool>;
}

/// Derive the base slug for `text`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;

    for c in text.chars().map(|c| c.to_ascii_lowercase()) {
        match c {
            'a'..='z' | '0'..='9' => {
                if pending_dash && !slug.is_empty() {
                    slug.push('-');
                }
                pending_dash = false;
                slug.push(c);
            }
            '-' => pending_dash = true,
            c if c.is_ascii_whitespace() => pending_dash = true,
            _ => {}
        }
    }

    if slug.is_empty() {
        DEFAULT_SLUG.to_string()
    } else {
        slug
    }
}

/// Pick the first free slug for `text` in `collection`.
pub fn allocate(
    index: &impl SlugIndex,
    text: &str,
    collection: Collection,
    exclude_id: Option<i64>,
) -> Result<String> {
    let base = slugify(text);
    let mut candidate = base.clone();
    let mut suffix = 2;
    while index.slug_taken(collection, &candidate, exclude_id)? {
        candidate = format!("{base}-{suffix}");
        suffix += 1;
    }
    Ok(candidate)
}
