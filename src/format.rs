// Text renderings shared by listings and selection prompts.

use chrono::{DateTime, Datelike, Utc};

use crate::store::{Metadata, RevisionDescriptor};

/// `1.5 KB`, `20.0 MB`, ... with one decimal, 1024-based.
pub fn human_readable_size(size: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = size as f64;
    for unit in &UNITS[..UNITS.len() - 1] {
        if value < 1024.0 {
            return format!("{value:.1} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.1} {}", UNITS[UNITS.len() - 1])
}

/// `Mar 04 17:21`, with the year appended when it differs from `now`'s.
pub fn format_datetime(dt: DateTime<Utc>, now: DateTime<Utc>) -> String {
    if dt.year() == now.year() {
        dt.format("%b %d %H:%M").to_string()
    } else {
        dt.format("%b %d %H:%M %Y").to_string()
    }
}

pub fn describe_revision(rev: &RevisionDescriptor) -> String {
    format!(
        "{} {} {}",
        human_readable_size(rev.size_bytes),
        format_datetime(rev.modified_at, Utc::now()),
        rev.revision_id
    )
}

pub fn describe_file(meta: &Metadata) -> String {
    format!(
        "{} {} {}",
        human_readable_size(meta.size),
        format_datetime(meta.server_modified, Utc::now()),
        meta.name
    )
}
