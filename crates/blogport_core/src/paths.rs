//! Deterministic local paths for fetched images.

use std::path::{Path, PathBuf};

use chrono::{Datelike, TimeZone, Utc};
use percent_encoding::percent_decode_str;
use url::Url;

/// Derives the local filename from the URL's final non-empty path segment,
/// percent-decoded. `None` when the URL has no usable segment, the decoded
/// bytes are not UTF-8, or the decoded name is not a single path component
/// (an encoded separator or dot-dot must not escape the slug directory).
pub fn filename_from_url(url: &Url) -> Option<String> {
    let segment = url
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()?;
    let decoded = percent_decode_str(segment).decode_utf8().ok()?.into_owned();
    if !is_single_component(&decoded) {
        return None;
    }
    Some(decoded)
}

fn is_single_component(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// `(year, month)` of an epoch-millisecond timestamp, UTC. `None` only for
/// timestamps outside chrono's representable range.
pub fn year_month(created_at_ms: i64) -> Option<(i32, u32)> {
    let when = Utc.timestamp_millis_opt(created_at_ms).single()?;
    Some((when.year(), when.month()))
}

/// Relative location of one image under the image root:
/// `[YYYY/MM/]slug/filename`.
pub fn image_rel_path(
    slug: &str,
    created_at_ms: i64,
    filename: &str,
    year_month_subdirs: bool,
) -> PathBuf {
    let mut rel = PathBuf::new();
    if year_month_subdirs {
        if let Some((year, month)) = year_month(created_at_ms) {
            rel.push(format!("{year:04}"));
            rel.push(format!("{month:02}"));
        }
    }
    rel.push(slug);
    rel.push(filename);
    rel
}

/// Placeholder-prefixed source written back into a card. Always uses
/// forward slashes, whatever the platform separator is.
pub fn placeholder_src(prefix: &str, rel: &Path) -> String {
    let mut out = prefix.trim_end_matches('/').to_string();
    for component in rel.components() {
        out.push('/');
        out.push_str(&component.as_os_str().to_string_lossy());
    }
    out
}
