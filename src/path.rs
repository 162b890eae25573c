//! Helpers for the slash-delimited node namespace.
//!
//! Paths are absolute (`/` is the root), segments are separated by a single `/`, and no path
//! other than the root ends in `/`.

use failure::bail;

/// Number of digits in the suffix the service appends to sequential nodes.
pub const SEQUENCE_DIGITS: usize = 10;

/// Checks that `path` is a well-formed absolute node path.
///
/// With `sequential` set, a trailing `/` is accepted: the service appends the sequence number
/// directly, so `/queue/` yields `/queue/0000000003`.
pub fn validate(path: &str, sequential: bool) -> Result<(), failure::Error> {
    if !path.starts_with('/') {
        bail!("path must start with '/': {:?}", path);
    }
    if path == "/" {
        return Ok(());
    }
    if path.ends_with('/') && !sequential {
        bail!("path must not end with '/': {:?}", path);
    }

    // only a sequential path gets this far with a trailing '/'
    let body = path.strip_suffix('/').unwrap_or(path);
    for segment in body[1..].split('/') {
        match segment {
            "" => bail!("empty path segment in {:?}", path),
            "." | ".." => bail!("relative path segment {:?} in {:?}", segment, path),
            _ => {}
        }
        if segment.chars().any(|c| c == '\u{0}' || c.is_control()) {
            bail!("invalid character in path {:?}", path);
        }
    }
    Ok(())
}

/// Appends `child` (a single name) to `parent`.
pub fn join(parent: &str, child: &str) -> String {
    if parent.ends_with('/') {
        format!("{}{}", parent, child)
    } else {
        format!("{}/{}", parent, child)
    }
}

/// The parent of `path`, or `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(i) => Some(&path[..i]),
        None => None,
    }
}

/// The last segment of `path` (empty for the root).
pub fn basename(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[i + 1..],
        None => path,
    }
}

/// The service-assigned sequence number at the end of a sequential node's name.
pub fn sequence_number(name: &str) -> Option<i64> {
    let name = basename(name).as_bytes();
    if name.len() < SEQUENCE_DIGITS {
        return None;
    }
    let digits = &name[name.len() - SEQUENCE_DIGITS..];
    if !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_paths() {
        assert!(validate("/", false).is_ok());
        assert!(validate("/a", false).is_ok());
        assert!(validate("/a/b-c/d_e.f", false).is_ok());
        assert!(validate("/queue/", true).is_ok());
        assert!(validate("/queue/item-", true).is_ok());
    }

    #[test]
    fn malformed_paths() {
        assert!(validate("", false).is_err());
        assert!(validate("a/b", false).is_err());
        assert!(validate("/a/", false).is_err());
        assert!(validate("/a//b", false).is_err());
        assert!(validate("/a/./b", false).is_err());
        assert!(validate("/a/../b", false).is_err());
        assert!(validate("/a\u{0}b", false).is_err());
        assert!(validate("//", true).is_err());
        assert!(validate("/a//", true).is_err());
    }

    #[test]
    fn construction() {
        assert_eq!(join("/", "a"), "/a");
        assert_eq!(join("/a", "b"), "/a/b");
        assert_eq!(parent("/a/b"), Some("/a"));
        assert_eq!(parent("/a"), Some("/"));
        assert_eq!(parent("/"), None);
        assert_eq!(basename("/a/b-0000000001"), "b-0000000001");
        assert_eq!(basename("/"), "");
    }

    #[test]
    fn sequence_suffix() {
        assert_eq!(sequence_number("/a/b-0000000001"), Some(1));
        assert_eq!(sequence_number("lock-0000000042"), Some(42));
        assert_eq!(sequence_number("/a/b"), None);
        assert_eq!(sequence_number("/a/b-00000x0001"), None);
    }
}
