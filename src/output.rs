//! CLI output formatting.
//!
//! Each command has a `format_*` function returning lines, so tests can
//! check output without capturing stdout, and a `print_*` wrapper.
//!
//! # Output Format
//!
//! ## Rebuild
//!
//! ```text
//! projects → site/projects.html
//!     4 cards rendered
//!     written
//! ```
//!
//! ## Diagnose
//!
//! ```text
//! ok    projects page exists        site/projects.html
//! ok    projects page start marker  found
//! FAIL  blog page end marker        missing (added on next rebuild)
//! ...
//!
//! 1 of 10 checks failed
//! ```

use crate::api::RebuildReport;
use crate::diagnose::DiagnosticReport;
use std::path::Path;

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

pub fn format_rebuild(report: &RebuildReport, document: &Path) -> Vec<String> {
    let noun = match report.page {
        crate::types::Page::Projects => ("card", "cards"),
        crate::types::Page::Blog => ("post", "posts"),
    };
    vec![
        format!("{} → {}", report.page, document.display()),
        format!("{}{} rendered", indent(1), plural(report.count, noun.0, noun.1)),
        format!(
            "{}{}",
            indent(1),
            if report.changed { "written" } else { "unchanged" }
        ),
    ]
}

pub fn print_rebuild(report: &RebuildReport, document: &Path) {
    for line in format_rebuild(report, document) {
        println!("{line}");
    }
}

pub fn format_diagnose(report: &DiagnosticReport) -> Vec<String> {
    let width = report
        .checks
        .iter()
        .map(|c| c.name.chars().count())
        .max()
        .unwrap_or(0);
    let mut lines: Vec<String> = report
        .checks
        .iter()
        .map(|c| {
            let tag = if c.ok { "ok" } else { "FAIL" };
            format!("{tag:<5} {:<width$}  {}", c.name, c.detail)
                .trim_end()
                .to_string()
        })
        .collect();

    lines.push(String::new());
    let failed = report.failures().count();
    lines.push(if failed == 0 {
        format!("All {} checks passed", report.checks.len())
    } else {
        format!("{failed} of {} checks failed", report.checks.len())
    });
    lines
}

pub fn print_diagnose(report: &DiagnosticReport) {
    for line in format_diagnose(report) {
        println!("{line}");
    }
}
