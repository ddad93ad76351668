use crate::error::{ErrorKind, Result};
use derive_more::Display;
use std::borrow::Borrow;
use std::str::FromStr;

/// Identifier of one package in the index.
///
/// Opaque: case and normalisation follow whatever the remote feed uses. The
/// only rules enforced are the ones that keep the name usable as a single
/// visible directory component in the mirror (no separators, no leading `.`,
/// no control characters, no surrounding whitespace).
#[derive(Clone, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageId(String);

impl PackageId {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        // Dot-prefixed entries are hidden from storage listings.
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && name.trim() == name
            && !name.chars().any(|c| c == '/' || c == '\\' || c.is_control());
        if !valid {
            exn::bail!(ErrorKind::InvalidPackage(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl FromStr for PackageId {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}
impl AsRef<str> for PackageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
impl Borrow<str> for PackageId {
    fn borrow(&self) -> &str {
        &self.0
    }
}
