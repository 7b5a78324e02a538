//! VFS path utilities: prefix extraction and per-segment sanitization.
//!
//! A VFS path has the form `<prefix>:<absolute-path>`, e.g.
//! `home:/docs/file.txt`. Every path coming in from a client goes through
//! [`sanitize`] before it reaches a mountpoint or an adapter.

/// Returns the substring before the first `:`.
pub fn get_prefix(path: &str) -> &str {
    path.split(':').next().unwrap_or("")
}

/// Characters that are never allowed inside a path segment.
const ILLEGAL: &[char] = &['/', '?', '<', '>', '\\', ':', '*', '|', '"'];

/// Strips characters that are illegal in filenames. Segments consisting
/// only of dots (`.`, `..`) collapse to an empty string, which removes
/// any traversal attempt while keeping segment order intact.
fn sanitize_segment(segment: &str) -> String {
    if !segment.is_empty() && segment.chars().all(|c| c == '.') {
        return String::new();
    }

    segment
        .chars()
        .filter(|c| !ILLEGAL.contains(c) && !c.is_control())
        .collect()
}

/// Sanitizes a full VFS path, preserving the prefix exactly.
///
/// Fails closed: input without a recognizable `prefix:` shape yields a
/// path with an empty prefix, which the mountpoint resolver rejects.
pub fn sanitize(path: &str) -> String {
    let (prefix, rest) = match path.split_once(':') {
        Some((p, r)) if !p.is_empty() && p.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') => {
            (p, r)
        }
        _ => ("", path),
    };

    let mut sane = String::new();
    for segment in rest.split('/').map(sanitize_segment) {
        if !sane.is_empty() && !sane.ends_with('/') {
            sane.push('/');
        }
        if sane.is_empty() && segment.is_empty() {
            sane.push('/');
            continue;
        }
        sane.push_str(&segment);
    }

    // Collapse duplicate slashes left behind by emptied segments
    let mut collapsed = String::with_capacity(sane.len());
    let mut last_slash = false;
    for c in sane.chars() {
        if c == '/' {
            if !last_slash {
                collapsed.push(c);
            }
            last_slash = true;
        } else {
            collapsed.push(c);
            last_slash = false;
        }
    }

    format!("{prefix}:{collapsed}")
}
