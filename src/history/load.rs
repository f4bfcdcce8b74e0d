use crate::{Error, Result};
use std::{fs, path::Path};
use tracing::{debug, warn};

static DOCTYPE: &str = "<!doctype";
static BODY_OPEN: &str = "<body";
static BODY_CLOSE: &str = "</body";

/// Read the whole history document. It must exist and have some content.
pub fn load(path: &Path) -> Result<String> {
    if !path.is_file() {
        return Err(Error::MissingInput(path.to_path_buf()));
    }
    let raw = fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        return Err(Error::EmptyInput(path.to_path_buf()));
    }
    if !has_doctype(&raw) {
        warn!(path = %path.display(), "File does not start with a DOCTYPE declaration, parsing anyway");
    }
    Ok(raw)
}

fn has_doctype(raw: &str) -> bool {
    raw.trim_start_matches('\u{feff}')
        .trim_start()
        .get(..DOCTYPE.len())
        .is_some_and(|s| s.eq_ignore_ascii_case(DOCTYPE))
}

/// The contents of the body element, or the whole input if there is no body to cut out.
/// Everything we look for lives in the body, so this only saves the parser some work.
pub fn body(raw: &str) -> &str {
    let bytes = raw.as_bytes();
    let Some(open) = find_ascii_ci(bytes, BODY_OPEN.as_bytes()) else {
        return raw;
    };
    let Some(start) = bytes[open..]
        .iter()
        .position(|b| *b == b'>')
        .map(|i| open + i + 1)
    else {
        return raw;
    };
    // both ends sit next to ASCII bytes, so they are char boundaries
    match rfind_ascii_ci(&bytes[start..], BODY_CLOSE.as_bytes()) {
        Some(len) => {
            debug!(bytes = len, total = raw.len(), "Cut document down to body");
            &raw[start..start + len]
        }
        None => &raw[start..],
    }
}

fn find_ascii_ci(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle))
}

fn rfind_ascii_ci(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .rposition(|w| w.eq_ignore_ascii_case(needle))
}
