//! # Pagewright
//!
//! A small content console for a hand-written marketing site. Projects and
//! blog posts live in SQLite; the public listing pages stay plain HTML files
//! that the console keeps in sync by rewriting one marked region per page.
//!
//! # Architecture
//!
//! ```text
//!   console action ──► api::App::dispatch ──► store (SQLite)
//!                              │
//!                              ├──► render  rows → card fragment
//!                              │
//!                              └──► patch   fragment → <!-- ADMIN:X:START --> … <!-- ADMIN:X:END -->
//! ```
//!
//! Every successful mutation re-renders the affected page, so the files on
//! disk always describe what the store holds. Detail pages (`?slug=`) are
//! rendered per request and never written to disk.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`api`] | Action dispatcher, response envelope, rebuild orchestration |
//! | [`server`] | axum surface: console endpoint, detail pages, static files |
//! | [`store`] | SQLite persistence for projects and posts |
//! | [`render`] | Maud card fragments and detail pages |
//! | [`patch`] | Marker-delimited region replacement with locking and atomic writes |
//! | [`assets`] | Upload checks, naming and contained deletion under the asset root |
//! | [`auth`] | Administrator credential and in-memory sessions |
//! | [`diagnose`] | Read-only health report |
//! | [`config`] | `pagewright.toml` loading, stock defaults, validation |
//! | [`types`] | Records, write inputs and their validation |
//! | [`slug`] | Slug derivation and collision suffixes |
//! | [`sanitize`] | Allow-list reduction of post bodies |
//! | [`error`] | Error taxonomy and its caller-safe form |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## The page stays the source of layout
//!
//! Only the text between the two markers is owned by the console. Everything
//! else in the document is carried through unchanged, except that line
//! endings are normalised to `\n`. A page without a start marker is never
//! touched.
//!
//! ## One store handle, passed explicitly
//!
//! The store is opened once by the binary, handed to [`api::App`], and closed
//! on shutdown. Nothing reaches for a global connection.
//!
//! ## Escaping by construction
//!
//! Cards and detail pages are Maud templates, so every record field is
//! escaped unless it is explicitly marked pre-escaped. The only such field
//! is a post body, which is reduced to an allow-list when it is written.

pub mod api;
pub mod assets;
pub mod auth;
pub mod config;
pub mod diagnose;
pub mod error;
pub mod output;
pub mod patch;
pub mod render;
pub mod sanitize;
pub mod server;
pub mod slug;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
