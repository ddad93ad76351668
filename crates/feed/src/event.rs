//! Typed changelog events.
//!
//! The feed hands out loosely structured rows; they are decoded exactly once
//! here and everything downstream matches on [`EventKind`].

use crate::consts;
use crate::error::{ErrorKind, Result};
use crate::package::PackageId;
use exn::ResultExt;

/// Position in the remote changelog.
pub type Serial = u64;

/// What happened to a package.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    Created,
    Added,
    Updated,
    DocUpdate,
    Removed,
    /// The package used to be known as `from`.
    Renamed { from: PackageId },
}
impl EventKind {
    /// Decode the free-text action column of a changelog row.
    ///
    /// Returns `Ok(None)` for actions that do not affect the simple index
    /// (ownership changes and the like are not distinguishable from the
    /// package's point of view, so only the known verbs are kept).
    pub fn from_action(action: &str) -> Result<Option<Self>> {
        let action = action.trim();
        if let Some(captures) = consts::RENAME_REGEX.captures(action) {
            let from = PackageId::new(&captures[1]).or_raise(|| ErrorKind::Decode(format!("bad rename: {action}")))?;
            return Ok(Some(Self::Renamed { from }));
        }
        let mut words = action.split_whitespace();
        let kind = match (words.next(), words.next()) {
            (Some("new"), _) | (Some("create"), _) => Self::Created,
            (Some("add"), _) => Self::Added,
            (Some("update"), _) => Self::Updated,
            (Some("docupdate"), _) => Self::DocUpdate,
            (Some("remove"), None) | (Some("remove"), Some("project")) => Self::Removed,
            // A release, file or role went away but the package is still
            // listed; its own index changed.
            (Some("remove"), Some(_)) | (Some("yank"), _) | (Some("unyank"), _) => Self::Updated,
            _ => return Ok(None),
        };
        Ok(Some(kind))
    }
}

/// The columns of a changelog row that matter to the mirror.
///
/// Rows also carry a release version and a timestamp; a simple index
/// listing is refetched whole, so neither is kept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawChange {
    pub name: String,
    pub action: String,
    pub serial: Serial,
}

/// A decoded change to a single package.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangelogEvent {
    pub package: PackageId,
    pub kind: EventKind,
    pub cursor: Serial,
}
impl ChangelogEvent {
    pub fn new(package: PackageId, kind: EventKind, cursor: Serial) -> Self {
        Self { package, kind, cursor }
    }

    /// Decode a raw row. `Ok(None)` means the row is irrelevant to the mirror.
    pub fn decode(raw: &RawChange) -> Result<Option<Self>> {
        let Some(kind) = EventKind::from_action(&raw.action)? else {
            tracing::trace!(package = %raw.name, action = %raw.action, serial = raw.serial, "Ignoring changelog action");
            return Ok(None);
        };
        let package = PackageId::new(&raw.name)?;
        Ok(Some(Self::new(package, kind, raw.serial)))
    }
}

/// One page of changelog, as returned by a single feed request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Page {
    /// Decoded events, in the order the feed delivered them.
    pub events: Vec<ChangelogEvent>,
    /// Serial of the last row on the page, including rows that decoded to
    /// nothing. `None` means the page was empty: the feed is exhausted.
    pub last_cursor: Option<Serial>,
}
impl Page {
    /// Decode a page of raw rows.
    ///
    /// Rows with names that cannot be mirrored are logged and skipped rather
    /// than failing the page; the cursor still moves past them.
    pub fn decode(rows: &[RawChange]) -> Self {
        let events = rows
            .iter()
            .filter_map(|raw| match ChangelogEvent::decode(raw) {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(package = %raw.name, serial = raw.serial, error = %e, "Skipping undecodable changelog row");
                    None
                },
            })
            .collect();
        Self { events, last_cursor: rows.last().map(|raw| raw.serial) }
    }

    pub fn is_empty(&self) -> bool {
        self.last_cursor.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn raw(name: &str, action: &str, serial: Serial) -> RawChange {
        RawChange {
            name: name.to_string(),
            action: action.to_string(),
            serial,
        }
    }

    #[rstest]
    #[case("new release", Some(EventKind::Created))]
    #[case("create", Some(EventKind::Created))]
    #[case("add py3 file requests-2.0-py3-none-any.whl", Some(EventKind::Added))]
    #[case("add source file requests-2.0.tar.gz", Some(EventKind::Added))]
    #[case("update classifiers", Some(EventKind::Updated))]
    #[case("docupdate", Some(EventKind::DocUpdate))]
    #[case("remove", Some(EventKind::Removed))]
    #[case("remove project", Some(EventKind::Removed))]
    #[case("remove release", Some(EventKind::Updated))]
    #[case("remove file requests-2.0.tar.gz", Some(EventKind::Updated))]
    #[case("yank release", Some(EventKind::Updated))]
    #[case("unyank release", Some(EventKind::Updated))]
    #[case("add Owner alice", Some(EventKind::Added))]
    #[case("invite Maintainer bob", None)]
    #[case("", None)]
    fn test_from_action(#[case] action: &str, #[case] expected: Option<EventKind>) {
        assert_eq!(EventKind::from_action(action).unwrap(), expected);
    }

    #[test]
    fn test_rename_carries_old_name() {
        let kind = EventKind::from_action("rename from pkgE").unwrap().unwrap();
        assert_eq!(kind, EventKind::Renamed { from: PackageId::new("pkgE").unwrap() });
    }

    #[test]
    fn test_rename_with_unsafe_old_name_is_rejected() {
        let err = EventKind::from_action("rename from ../etc").unwrap_err();
        assert!(matches!(&*err, ErrorKind::Decode(_)));
    }

    #[test]
    fn test_page_keeps_cursor_of_ignored_rows() {
        let page = Page::decode(&[raw("pkgA", "new release", 10), raw("pkgB", "invite Owner x", 11)]);
        assert_eq!(page.events.len(), 1);
        assert_eq!(page.events[0].cursor, 10);
        assert_eq!(page.last_cursor, Some(11));
    }

    #[test]
    fn test_page_skips_unsafe_names() {
        let page = Page::decode(&[raw("../../etc", "new release", 3), raw("ok", "create", 4)]);
        assert_eq!(page.events.len(), 1);
        assert_eq!(page.events[0].package.as_str(), "ok");
        assert_eq!(page.last_cursor, Some(4));
    }

    #[test]
    fn test_empty_page() {
        let page = Page::decode(&[]);
        assert!(page.is_empty());
        assert!(page.events.is_empty());
    }
}
