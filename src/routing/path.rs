//! Pathname helpers shared by the matcher and the classifier.
//!
//! # Design Decisions
//! - Basename comparison is case-insensitive and must end on a `/` boundary
//! - Percent-decoding is per segment; an encoded `/` stays encoded so it
//!   never splits a segment

/// `/app/` and `app` both become `/app`; empty becomes `/`.
pub fn normalize_basename(basename: &str) -> String {
    let trimmed = basename.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Remove the basename prefix, or `None` when the path lies outside it.
pub fn strip_basename<'a>(pathname: &'a str, basename: &str) -> Option<&'a str> {
    if basename.is_empty() || basename == "/" {
        return Some(pathname);
    }
    let prefix = pathname.get(..basename.len())?;
    if !prefix.eq_ignore_ascii_case(basename) {
        return None;
    }
    let start = if basename.ends_with('/') {
        basename.len() - 1
    } else {
        basename.len()
    };
    let rest = &pathname[start..];
    if !rest.is_empty() && !rest.starts_with('/') {
        return None;
    }
    Some(if rest.is_empty() { "/" } else { rest })
}

/// Collapse runs of `/` after joining.
pub fn join_paths(paths: &[&str]) -> String {
    let joined = paths.join("/");
    let mut out = String::with_capacity(joined.len());
    let mut prev_slash = false;
    for c in joined.chars() {
        if c == '/' {
            if !prev_slash {
                out.push(c);
            }
            prev_slash = true;
        } else {
            out.push(c);
            prev_slash = false;
        }
    }
    out
}

/// Drop trailing slashes and force exactly one leading slash.
pub fn normalize_pathname(pathname: &str) -> String {
    let trimmed = pathname.trim_end_matches('/').trim_start_matches('/');
    format!("/{trimmed}")
}

/// The manifest endpoint under the app's basename.
pub fn manifest_url(manifest_path: &str, basename: &str) -> String {
    join_paths(&[basename, manifest_path])
}

/// Percent-decode each segment. Invalid encodings leave the whole path as-is.
pub fn decode_path(value: &str) -> String {
    let mut segments = Vec::new();
    for segment in value.split('/') {
        match urlencoding::decode(segment) {
            Ok(decoded) => segments.push(decoded.replace('/', "%2F")),
            Err(_) => return value.to_string(),
        }
    }
    segments.join("/")
}
