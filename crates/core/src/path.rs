//! Node path helpers
//!
//! Paths are absolute, `/`-separated, and never end with `/` except the root.

use crate::error::{Error, Result};

/// Path of the root node
pub const ROOT: &str = "/";

/// Split a path into `(parent, child_name)`.
///
/// Returns `None` for the root, which has no parent.
pub fn split_parent(path: &str) -> Option<(&str, &str)> {
    if path == ROOT {
        return None;
    }
    let idx = path.rfind('/')?;
    let parent = if idx == 0 { ROOT } else { &path[..idx] };
    Some((parent, &path[idx + 1..]))
}

/// Join a parent path and a child name.
pub fn join(parent: &str, child: &str) -> String {
    if parent == ROOT {
        format!("/{}", child)
    } else {
        format!("{}/{}", parent, child)
    }
}

/// Validate a node path.
pub fn validate(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(Error::InvalidPath {
            path: path.to_string(),
            reason: "path is empty",
        });
    }
    if !path.starts_with('/') {
        return Err(Error::InvalidPath {
            path: path.to_string(),
            reason: "path must start with /",
        });
    }
    if path == ROOT {
        return Ok(());
    }
    if path.ends_with('/') {
        return Err(Error::InvalidPath {
            path: path.to_string(),
            reason: "path must not end with /",
        });
    }
    for segment in path[1..].split('/') {
        if segment.is_empty() {
            return Err(Error::InvalidPath {
                path: path.to_string(),
                reason: "empty node name",
            });
        }
        if segment == "." || segment == ".." {
            return Err(Error::InvalidPath {
                path: path.to_string(),
                reason: "relative names are not allowed",
            });
        }
        if segment.contains('\0') {
            return Err(Error::InvalidPath {
                path: path.to_string(),
                reason: "null character",
            });
        }
    }
    Ok(())
}

/// Name for the next sequential child: `prefix` followed by the 10-digit
/// zero-padded counter.
pub fn sequential_name(prefix: &str, counter: i32) -> String {
    format!("{}{:010}", prefix, counter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_parent() {
        assert_eq!(split_parent("/a"), Some(("/", "a")));
        assert_eq!(split_parent("/a/b/c"), Some(("/a/b", "c")));
        assert_eq!(split_parent("/"), None);
    }

    #[test]
    fn test_join() {
        assert_eq!(join("/", "a"), "/a");
        assert_eq!(join("/a", "b"), "/a/b");
    }

    #[test]
    fn test_validate() {
        assert!(validate("/").is_ok());
        assert!(validate("/a/b").is_ok());
        assert!(validate("").is_err());
        assert!(validate("a").is_err());
        assert!(validate("/a/").is_err());
        assert!(validate("/a//b").is_err());
        assert!(validate("/a/../b").is_err());
    }

    #[test]
    fn test_sequential_name() {
        assert_eq!(sequential_name("/q/test-", 300), "/q/test-0000000300");
    }
}
