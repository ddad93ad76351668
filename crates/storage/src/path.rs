//! Path validation.
//!
//! Package names arrive from a remote feed and end up as directory names in
//! the mirror, so every path handed to a backend is normalised here first
//! and anything that would leave the mirror root is rejected.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a storage path relative to the mirror root.
///
/// `.` components and repeated separators are dropped, `..` is resolved
/// lexically, and the result must still be inside the root. Null bytes and
/// Windows path prefixes are rejected, as is a path that normalises to
/// nothing.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use idxsync_storage::validate_path;
/// assert!(validate_path("simple/requests/index.html").is_ok());
/// assert!(validate_path("simple/../index.html").is_ok());
/// assert!(validate_path("../last_serial.txt").is_err());
/// assert!(validate_path("simple/../../etc").is_err());
/// assert!(validate_path("simple/a\0b").is_err());
/// assert_eq!(
///     validate_path("./simple//numpy/./index.html").unwrap(),
///     Path::new("simple/numpy/index.html")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let mut components = Vec::new();
    for component in original.components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but
                // truncate in C-based syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
                }
                components.push(s);
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(original.to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
                }
            },
        }
    }
    if components.is_empty() {
        exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
    }
    Ok(components.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("simple/requests/index.html", "simple/requests/index.html")]
    #[case("index.html", "index.html")]
    #[case("simple//numpy//index.html", "simple/numpy/index.html")]
    #[case("./simple/./numpy", "simple/numpy")]
    #[case("simple/numpy/", "simple/numpy")]
    #[case("simple/numpy/..", "simple")]
    #[case("/simple/numpy", "simple/numpy")]
    fn test_normalises(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(validate(input).unwrap(), Path::new(expected));
    }

    #[rstest]
    #[case("../last_serial.txt")]
    #[case("simple/../../etc/passwd")]
    #[case("..")]
    #[case("")]
    #[case(".")]
    #[case("./.")]
    #[case("//")]
    #[case("simple/a\0b")]
    fn test_rejects(#[case] input: &str) {
        let err = validate(input).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }
}
