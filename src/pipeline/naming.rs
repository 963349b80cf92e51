//! Artifact file names.
//!
//! A pure function of the identity, the timestamp and the extension: callers
//! pass the time in, so the same inputs always give the same name.

use crate::config::DateStyle;
use crate::identity::Identity;
use chrono::NaiveDateTime;

/// Name for a whole-batch artifact.
///
/// * With an identity: `{identity}_{date}.{ext}`, e.g. `1234567890123_16-10-2026.pdf`
/// * Without: `scan_{yyyymmdd-hhmmss}.{ext}`
pub fn artifact_name(
    identity: Option<&Identity>,
    at: NaiveDateTime,
    style: DateStyle,
    ext: &str,
) -> String {
    format!("{}.{}", artifact_stem(identity, at, style), ext)
}

/// Name for page `ordinal` (1-based) of a per-page upload: `{stem}_{ordinal}.{ext}`.
pub fn page_name(
    identity: Option<&Identity>,
    at: NaiveDateTime,
    style: DateStyle,
    ordinal: usize,
    ext: &str,
) -> String {
    format!("{}_{}.{}", artifact_stem(identity, at, style), ordinal, ext)
}

fn artifact_stem(identity: Option<&Identity>, at: NaiveDateTime, style: DateStyle) -> String {
    match identity {
        Some(id) => {
            let date = match style {
                DateStyle::DayMonthYear => at.format("%d-%m-%Y"),
                DateStyle::Iso => at.format("%Y-%m-%d"),
            };
            format!("{}_{}", id, date)
        }
        None => format!("scan_{}", at.format("%Y%m%d-%H%M%S")),
    }
}
