use crate::ReaderError;
use std::time::Duration;
use url::Url;

/// Turns the raw path target into an absolute http(s) URL.
///
/// Targets that do not start with `http` are treated as scheme-less and get
/// `http://` prepended. Anything that then fails to parse, or parses to a
/// non-http(s) scheme, is rejected.
pub fn normalize_target_url(raw: &str) -> Result<Url, ReaderError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ReaderError::InvalidUrl("empty target".to_string()));
    }

    let candidate = if raw.starts_with("http") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };

    let parsed =
        Url::parse(&candidate).map_err(|e| ReaderError::InvalidUrl(format!("{candidate}: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(ReaderError::InvalidUrl(format!(
            "unsupported scheme {other}"
        ))),
    }
}

/// A single path segment with no traversal or separators.
pub fn is_safe_filename(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name
            .chars()
            .any(|c| matches!(c, '/' | '\\' | ':' | '\0') || c.is_control())
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    let millis = duration.subsec_millis();

    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else if seconds > 0 {
        format!("{}.{}s", seconds, millis / 100)
    } else {
        format!("{millis}ms")
    }
}

pub fn format_bytes(bytes: usize) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}
