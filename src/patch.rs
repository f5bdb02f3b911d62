//! Marker Patcher: rewrites one labelled region of a target document.
//!
//! A target document owns exactly one region per name, delimited by two
//! comments:
//!
//! ```html
//! <!-- ADMIN:PROJECTS:START -->
//! ...generated, fully owned by the patcher...
//! <!-- ADMIN:PROJECTS:END -->
//! ```
//!
//! Whitespace inside the comment delimiters is tolerated when scanning
//! (`<!--ADMIN:PROJECTS:START-->` matches); the rewritten region always uses
//! the canonical spelling.
//!
//! ## Algorithm
//!
//! 1. Normalise line endings (`\r\n` and lone `\r` become `\n`).
//! 2. Scan comment by comment for the start token. None is a
//!    [`Error::Template`]: the document predates the marker convention.
//! 3. Find the first end token after it. If there is none, an empty region is
//!    synthesised right after the start token. A second start token before
//!    the end is a [`Error::Template`] too.
//! 4. Replace start-through-end with `start + fragment + end`.
//!
//! [`splice`] is pure and idempotent: splicing its own output with the same
//! fragment returns identical bytes. [`patch`] adds the byte-for-byte
//! comparison against the input and fails with [`Error::NoOp`] when nothing
//! changed.
//!
//! ## Writing
//!
//! [`patch_file`] holds an exclusive advisory lock on a sidecar
//! `.<name>.lock` file for the whole read-splice-write cycle, writes the new
//! bytes to a temporary file in the same directory and renames it over the
//! document. Readers see either the old or the new document, never a mix.
//! Two patchers on one document serialize on the lock; the later one wins.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// Canonical start comment for region `name`.
pub fn start_token(name: &str) -> String {
    format!("<!-- ADMIN:{name}:START -->")
}

/// Canonical end comment for region `name`.
pub fn end_token(name: &str) -> String {
    format!("<!-- ADMIN:{name}:END -->")
}

/// Convert every line-ending variant to `\n`.
pub fn normalize_newlines(doc: &str) -> String {
    doc.replace("\r\n", "\n").replace('\r', "\n")
}

/// Byte span `[open, close)` of one marker comment.
type Span = (usize, usize);

/// First comment at or after `from` whose trimmed body is `ADMIN:<name>:<kind>`.
fn find_marker(doc: &str, from: usize, name: &str, kind: &str) -> Option<Span> {
    let wanted = format!("ADMIN:{name}:{kind}");
    let mut pos = from;
    while let Some(rel) = doc[pos..].find("<!--") {
        let open = pos + rel;
        let body_start = open + 4;
        let close_rel = doc[body_start..].find("-->")?;
        let body_end = body_start + close_rel;
        if doc[body_start..body_end].trim() == wanted {
            return Some((open, body_end + 3));
        }
        pos = body_start;
    }
    None
}

/// Marker presence, as reported by the diagnostic probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerStatus {
    pub start: bool,
    pub end: bool,
}

pub fn marker_status(doc: &str, name: &str) -> MarkerStatus {
    let doc = normalize_newlines(doc);
    let start = find_marker(&doc, 0, name, "START");
    MarkerStatus {
        start: start.is_some(),
        end: start.is_some_and(|(_, after)| find_marker(&doc, after, name, "END").is_some()),
    }
}

/// Located region: the start comment and, if present, the end comment.
struct Region {
    start: Span,
    end: Option<Span>,
}

fn locate(doc: &str, name: &str) -> Result<Region> {
    let start = find_marker(doc, 0, name, "START").ok_or_else(|| {
        Error::Template(format!(
            "Marker {} not found. Replace the page with a version that carries the marker comments.",
            start_token(name)
        ))
    })?;
    let end = find_marker(doc, start.1, name, "END");
    let limit = end.map_or(doc.len(), |(open, _)| open);
    if find_marker(&doc[..limit], start.1, name, "START").is_some() {
        return Err(Error::Template(format!(
            "Marker {} appears more than once. Remove the duplicate.",
            start_token(name)
        )));
    }
    Ok(Region { start, end })
}

/// Replace region `name` of `doc` with `fragment`.
pub fn splice(doc: &str, name: &str, fragment: &str) -> Result<String> {
    let doc = normalize_newlines(doc);
    let region = locate(&doc, name)?;
    let (head_end, tail_start) = match region.end {
        Some((_, end_close)) => (region.start.0, end_close),
        None => {
            debug!(marker = name, "end marker missing, synthesising empty region");
            (region.start.0, region.start.1)
        }
    };

    let start = start_token(name);
    let end = end_token(name);
    let mut out = String::with_capacity(doc.len() + fragment.len());
    out.push_str(&doc[..head_end]);
    out.push_str(&start);
    out.push_str(fragment);
    out.push_str(&end);
    out.push_str(&doc[tail_start..]);
    Ok(out)
}

/// Splice and insist that something changed.
pub fn patch(doc: &str, name: &str, fragment: &str) -> Result<String> {
    let updated = splice(doc, name, fragment)?;
    if updated == doc {
        return Err(Error::NoOp(format!(
            "Region {name} already holds this content; nothing was written."
        )));
    }
    Ok(updated)
}

/// What [`patch_file`] should do when the document would not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnUnchanged {
    /// Report [`Error::NoOp`].
    Fail,
    /// Succeed without writing.
    Skip,
}

/// Patch the document at `path` in place. Returns `true` if it was written.
///
/// On any error the document is left untouched.
pub fn patch_file(path: &Path, name: &str, fragment: &str, on_unchanged: OnUnchanged) -> Result<bool> {
    let _lock = DocumentLock::acquire(path)?;
    let original = read_document(path)?;

    let updated = match patch(&original, name, fragment) {
        Ok(updated) => updated,
        Err(Error::NoOp(_)) if on_unchanged == OnUnchanged::Skip => {
            debug!(path = %path.display(), marker = name, "region unchanged, skipping write");
            return Ok(false);
        }
        Err(e) => return Err(e),
    };

    write_atomic(path, updated.as_bytes())?;
    info!(path = %path.display(), marker = name, bytes = updated.len(), "document patched");
    Ok(true)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Read a target document, turning "absent" and "not readable" into
/// operator-facing template errors.
pub fn read_document(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Error::Template(format!(
            "{} not found. Upload the page with its marker comments.",
            display_name(path)
        )),
        io::ErrorKind::PermissionDenied => Error::Template(format!(
            "{} is not readable by the console.",
            display_name(path)
        )),
        _ => Error::Io(e),
    })
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let name = display_name(path);
    path.with_file_name(format!(".{name}.{suffix}"))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = sibling(path, &format!("tmp-{}", std::process::id()));
    let result = (|| -> io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        if let Ok(meta) = fs::metadata(path) {
            fs::set_permissions(&tmp, meta.permissions())?;
        }
        fs::rename(&tmp, path)
    })();
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(match e.kind() {
            io::ErrorKind::PermissionDenied => Error::Template(format!(
                "{} is not writable. Check the permissions on the page and its directory.",
                display_name(path)
            )),
            _ => Error::Io(e),
        });
    }
    Ok(())
}

/// Check that [`patch_file`] could write `path`: its lock file opens for
/// writing, and a file can be created and removed beside it so the rename
/// will go through. The directory is left as it was found.
pub fn check_writable(path: &Path) -> io::Result<()> {
    let lock = sibling(path, "lock");
    if lock.exists() {
        OpenOptions::new().write(true).open(&lock)?;
    }
    create_and_remove(&sibling(path, &format!("probe-{}", Uuid::new_v4().simple())))
}

/// Create `path` exclusively, then remove it.
pub fn create_and_remove(path: &Path) -> io::Result<()> {
    OpenOptions::new().write(true).create_new(true).open(path)?;
    fs::remove_file(path)
}

/// Exclusive advisory lock on a document, held until dropped.
struct DocumentLock {
    file: File,
}

impl DocumentLock {
    fn acquire(document: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(sibling(document, "lock"))?;
        file.lock_exclusive()?;
        Ok(Self { file })
    }
}

impl Drop for DocumentLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
