//! CLI output formatting for every command.
//!
//! # Output Format
//!
//! ## encode
//!
//! ```text
//! photo.arw → photo.png
//!     Source: arw, 6000x4000 (converted)
//!     Output: 2400x1600 at 40%, 6.8 MiB, 3 attempts
//! ```
//!
//! ## check
//!
//! ```text
//! photo.arw: ok
//!     Kind: RAW (arw)
//!     Size: 24.1 MiB
//! ```
//!
//! ## batch
//!
//! ```text
//! Transcoding 3 files
//!     001-dawn.arw → out/001-dawn.png (2400x1600, 6.8 MiB)
//!     002-dusk.jpg → out/002-dusk.png (1200x800, 1.1 MiB, over budget)
//!     notes.png: failed: unsupported or corrupt image data
//! 2 written, 1 failed, 7.9 MiB total
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.

use crate::batch::{BatchEntry, BatchEvent, BatchReport, Outcome};
use crate::pipeline::{InputCheck, InputKind, Transcoded};
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Human-readable byte count in binary units.
///
/// ```text
/// 512 B, 1.5 KiB, 6.8 MiB
/// ```
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn percent(scale: f64) -> String {
    format!("{:.0}%", scale * 100.0)
}

// ============================================================================
// encode / convert-raw
// ============================================================================

pub fn format_transcoded(source: &Path, written: &Path, result: &Transcoded) -> Vec<String> {
    let e = &result.encoded;
    let mut lines = vec![format!("{} \u{2192} {}", source.display(), written.display())];

    let origin = if result.from_raw { " (converted)" } else { "" };
    lines.push(format!(
        "{}Source: {}, {}x{}{}",
        indent(1),
        result.source_format,
        e.source_width,
        e.source_height,
        origin
    ));

    let size = if e.is_downscaled() {
        format!("{}x{} at {}", e.width, e.height, percent(e.scale))
    } else {
        format!("{}x{}", e.width, e.height)
    };
    let attempts = match e.attempts {
        1 => "1 attempt".to_string(),
        n => format!("{n} attempts"),
    };
    lines.push(format!(
        "{}Output: {}, {}, {}",
        indent(1),
        size,
        human_bytes(e.len() as u64),
        attempts
    ));
    if !e.budget_met {
        lines.push(format!(
            "{}Warning: smallest candidate is still over the byte budget",
            indent(1)
        ));
    }
    lines
}

pub fn print_transcoded(source: &Path, written: &Path, result: &Transcoded) {
    for line in format_transcoded(source, written, result) {
        println!("{line}");
    }
}

pub fn format_raw_conversion(source: &Path, written: &Path, bytes: usize) -> Vec<String> {
    vec![
        format!("{} \u{2192} {}", source.display(), written.display()),
        format!("{}PNG, {}", indent(1), human_bytes(bytes as u64)),
    ]
}

pub fn print_raw_conversion(source: &Path, written: &Path, bytes: usize) {
    for line in format_raw_conversion(source, written, bytes) {
        println!("{line}");
    }
}

// ============================================================================
// check
// ============================================================================

pub fn format_check(source: &Path, check: &InputCheck) -> Vec<String> {
    let kind = match &check.kind {
        InputKind::Raw { extension } => format!("RAW ({extension})"),
        InputKind::Image {
            format,
            width,
            height,
        } => format!("{format}, {width}x{height}"),
    };
    vec![
        format!("{}: ok", source.display()),
        format!("{}Kind: {}", indent(1), kind),
        format!("{}Size: {}", indent(1), human_bytes(check.size)),
    ]
}

pub fn print_check(source: &Path, check: &InputCheck) {
    for line in format_check(source, check) {
        println!("{line}");
    }
}

// ============================================================================
// batch
// ============================================================================

fn entry_line(entry: &BatchEntry) -> String {
    match &entry.outcome {
        Outcome::Written {
            output,
            width,
            height,
            bytes,
            budget_met,
            ..
        } => {
            let over = if *budget_met { "" } else { ", over budget" };
            format!(
                "{}{} \u{2192} {} ({}x{}, {}{})",
                indent(1),
                entry.source.display(),
                output.display(),
                width,
                height,
                human_bytes(*bytes),
                over
            )
        }
        Outcome::Failed { error } => {
            format!("{}{}: failed: {}", indent(1), entry.source.display(), error)
        }
    }
}

/// Format a single batch progress event as display lines.
pub fn format_batch_event(event: &BatchEvent) -> Vec<String> {
    match event {
        BatchEvent::Started { total: 1 } => vec!["Transcoding 1 file".to_string()],
        BatchEvent::Started { total } => vec![format!("Transcoding {total} files")],
        BatchEvent::Finished(entry) => vec![entry_line(entry)],
    }
}

pub fn format_batch_summary(report: &BatchReport) -> Vec<String> {
    vec![format!(
        "{} written, {} failed, {} total",
        report.succeeded(),
        report.failed(),
        human_bytes(report.total_bytes())
    )]
}

pub fn print_batch_summary(report: &BatchReport) {
    for line in format_batch_summary(report) {
        println!("{line}");
    }
}
