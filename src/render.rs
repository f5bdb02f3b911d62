//! Fragment and detail-page rendering.
//!
//! Two kinds of output come out of this module:
//!
//! - **Listing fragments** ([`render_projects`], [`render_posts`]): the markup
//!   that the patcher places between a page's marker comments. One card per
//!   row, in the order given.
//! - **Detail pages** ([`render_project_detail`], [`render_post_detail`],
//!   [`render_not_found`]): complete documents served by the HTTP surface.
//!
//! ## Fragment Shape
//!
//! ```text
//! \n<card 1>\n<card 2>\n ... <card n>\n
//! ```
//!
//! An empty row set renders a single placeholder comment instead, so the
//! region is never silently blank. Rendering is a pure function of the rows
//! and the link settings: the same rows always give the same bytes.
//!
//! ## Staggered Reveal
//!
//! Each card carries a `data-wow-delay` taken round-robin from a fixed list
//! by position. Post cards omit the attribute when the delay is `0s`.
//!
//! ## Escaping
//!
//! Uses [maud](https://maud.lambda.xyz/), so every interpolated value is
//! escaped. The post body is the one exception: it was reduced to the
//! structural allow-list when it was saved and is embedded as-is, on the
//! detail page only.

use crate::config::RenderConfig;
use crate::types::{LinkRef, Neighbors, Post, PostStatus, Project};
use chrono::{DateTime, Utc};
use maud::{DOCTYPE, Markup, PreEscaped, html};

pub const PROJECT_DELAYS: [&str; 6] = ["0.25s", "0.5s", "0.75s", "1s", "1.25s", "1.5s"];
pub const POST_DELAYS: [&str; 6] = ["0s", "0.25s", "0.5s", "0.75s", "1s", "1.25s"];

pub const NO_PROJECTS: &str = "<!-- No projects yet -->";
pub const NO_POSTS: &str = "<!-- No published posts yet -->";

const CSS: &str = include_str!("../static/detail.css");

/// Delay token for the card at `index`.
pub fn delay_for<'a>(delays: &[&'a str], index: usize) -> &'a str {
    delays[index % delays.len()]
}

fn fragment(cards: Vec<Markup>, placeholder: &str) -> String {
    if cards.is_empty() {
        return format!("\n{placeholder}\n");
    }
    let mut out = String::new();
    for card in cards {
        out.push('\n');
        out.push_str(&card.into_string());
    }
    out.push('\n');
    out
}

// ============================================================================
// Listing fragments
// ============================================================================

/// Render the projects region. Every row is included regardless of status.
pub fn render_projects(rows: &[Project], cfg: &RenderConfig) -> String {
    let cards = rows
        .iter()
        .enumerate()
        .map(|(i, p)| project_card(p, delay_for(&PROJECT_DELAYS, i), cfg))
        .collect();
    fragment(cards, NO_PROJECTS)
}

/// Render the blog region. Only published rows are eligible; anything else
/// passed in is skipped.
pub fn render_posts(rows: &[Post], cfg: &RenderConfig) -> String {
    let cards = rows
        .iter()
        .filter(|p| p.status == PostStatus::Published)
        .enumerate()
        .map(|(i, p)| post_card(p, delay_for(&POST_DELAYS, i), cfg))
        .collect();
    fragment(cards, NO_POSTS)
}

fn project_card(project: &Project, delay: &str, cfg: &RenderConfig) -> Markup {
    let href = format!("{}{}", cfg.project_link, project.slug);
    let image = project
        .image_path
        .as_deref()
        .unwrap_or(&cfg.project_placeholder_image);

    html! {
        div."col-lg-4"."col-md-6" {
            div.project-item.wow.fadeInUp data-wow-delay=(delay) {
                div.project-image data-cursor-text="View" {
                    a href=(href) {
                        figure {
                            img src=(image) alt=(project.name);
                        }
                    }
                }
                div.project-body {
                    div.project-body-title {
                        h3 { (project.name.to_lowercase()) }
                    }
                    div.project-content {
                        p { (project.description) }
                        div.project-content-footer {
                            a.readmore-btn href=(href) { "view more" }
                        }
                    }
                }
            }
        }
    }
}

fn post_card(post: &Post, delay: &str, cfg: &RenderConfig) -> Markup {
    let href = format!("{}{}", cfg.post_link, post.slug);
    let image = post
        .image_path
        .as_deref()
        .unwrap_or(&cfg.post_placeholder_image);
    let delay_attr = (delay != "0s").then_some(delay);

    html! {
        div."col-lg-4"."col-md-6" {
            div.blog-item.wow.fadeInUp data-wow-delay=[delay_attr] {
                div.post-featured-image data-cursor-text="View" {
                    figure {
                        a.image-anime href=(href) {
                            img src=(image) alt=(post.title);
                        }
                    }
                }
                div.post-item-content {
                    div.post-item-body {
                        h2 { a href=(href) { (post.title) } }
                    }
                    div.post-item-footer {
                        a.readmore-btn href=(href) { "read more" }
                    }
                }
            }
        }
    }
}

// ============================================================================
// Detail pages
// ============================================================================

fn base_document(title: &str, description: &str, content: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                meta name="description" content=(description);
                title { (title) }
                style { (PreEscaped(CSS)) }
            }
            body {
                (content)
            }
        }
    }
}

fn page_header(section: &str, section_href: &str, title: &str) -> Markup {
    html! {
        header.page-header {
            nav.breadcrumb {
                a href="/" { "Home" }
                " › "
                a href=(section_href) { (section) }
                " › "
                span aria-current="page" { (title) }
            }
        }
    }
}

fn pager(neighbors: &Neighbors, link_prefix: &str, prev_label: &str, next_label: &str) -> Markup {
    let link = |l: &LinkRef, class: &str, label: &str| {
        html! {
            a class=(class) href={ (link_prefix) (l.slug) } {
                span.label { (label) }
                (l.title)
            }
        }
    };
    html! {
        nav.pager {
            @if let Some(prev) = &neighbors.prev {
                (link(prev, "prev", prev_label))
            }
            @if let Some(next) = &neighbors.next {
                (link(next, "next", next_label))
            }
        }
    }
}

/// Human date for a publish time, e.g. `March 1, 2024`.
pub fn format_date(ts: &DateTime<Utc>) -> String {
    ts.format("%B %-d, %Y").to_string()
}

/// Render one project page with previous/next navigation.
pub fn render_project_detail(
    project: &Project,
    neighbors: &Neighbors,
    listing_href: &str,
    cfg: &RenderConfig,
) -> Markup {
    let status_class = format!("status status-{}", project.status.as_str());

    let content = html! {
        (page_header("Projects", listing_href, &project.name))
        main.detail {
            @if let Some(image) = &project.image_path {
                img.hero-image src=(image) alt=(project.name);
            }
            h1 { (project.name) }
            dl.meta {
                @if !project.category.is_empty() {
                    div { dt { "Category" } dd { (project.category) } }
                }
                div { dt { "Status" } dd { span class=(status_class) { (project.status.label()) } } }
                @if let Some(year) = project.year {
                    div { dt { "Year" } dd { (year) } }
                }
                @if let Some(location) = &project.location {
                    div { dt { "Location" } dd { (location) } }
                }
            }
            p.description {
                @for (i, line) in project.description.lines().enumerate() {
                    @if i > 0 { br; }
                    (line)
                }
            }
            (pager(neighbors, &cfg.project_link, "Previous project", "Next project"))
        }
    };

    base_document(&project.name, &project.description, content)
}

/// Render one published post with navigation and related posts.
pub fn render_post_detail(
    post: &Post,
    neighbors: &Neighbors,
    related: &[Post],
    listing_href: &str,
    cfg: &RenderConfig,
) -> Markup {
    let published = post.published_at.as_ref().map(format_date);
    let description = post.excerpt.as_deref().unwrap_or(&post.title);
    let tags = post.tag_list();

    let content = html! {
        (page_header("Blog", listing_href, &post.title))
        main.detail {
            @if let Some(image) = &post.image_path {
                img.hero-image src=(image) alt=(post.title);
            }
            ul.meta {
                @if !post.category.is_empty() {
                    li.category { (post.category) }
                }
                @if let Some(date) = &published {
                    li { time { (date) } }
                }
                li.author { (post.author) }
                li { (post.reading_minutes()) " min read" }
                li { (post.views) " views" }
            }
            h1 { (post.title) }
            article.post-body {
                (PreEscaped(&post.body))
            }
            @if !tags.is_empty() {
                ul.tags {
                    @for tag in &tags {
                        li { (tag) }
                    }
                }
            }
            (pager(neighbors, &cfg.post_link, "Previous post", "Next post"))
            @if !related.is_empty() {
                section.related {
                    h2 { "Related posts" }
                    ul {
                        @for r in related {
                            li {
                                img src=(r.image_path.as_deref().unwrap_or(&cfg.post_placeholder_image)) alt=(r.title);
                                div {
                                    a href={ (cfg.post_link) (r.slug) } { (r.title) }
                                    @if let Some(ts) = &r.published_at {
                                        time { (format_date(ts)) }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    };

    base_document(&post.title, description, content)
}

/// Page shown for unknown or unpublished slugs.
pub fn render_not_found(what: &str, listing_href: &str) -> Markup {
    let content = html! {
        main.not-found {
            h1 { (what) " not found" }
            p { a href=(listing_href) { "Back to the listing" } }
        }
    };
    base_document("Not found", "", content)
}
