//! Root listing link extraction.

use crate::consts;
use crate::package::PackageId;
use scraper::Html;
use std::collections::BTreeSet;
use tracing::instrument;

/// Every package named by the root listing.
///
/// The text of each link is the package identifier. Links whose text cannot
/// be used as a package name are logged and skipped. Invalid UTF-8 is
/// replaced rather than rejected.
///
/// ```
/// use idxsync_feed::parse_root_listing;
///
/// let html = br#"<html><body>
///     <a href="/simple/requests/">requests</a>
///     <a href="/simple/numpy/">numpy</a>
/// </body></html>"#;
/// let packages = parse_root_listing(html);
/// assert_eq!(packages.len(), 2);
/// ```
#[instrument(skip(html), fields(html_size = html.len()))]
pub fn parse_root_listing(html: &[u8]) -> BTreeSet<PackageId> {
    let html = String::from_utf8_lossy(html);
    let document = Html::parse_document(&html);
    let mut packages = BTreeSet::new();
    for element in document.select(&consts::ANCHOR_SELECTOR) {
        let text = element.text().collect::<String>();
        match PackageId::new(text.trim()) {
            Ok(package) => {
                packages.insert(package);
            },
            Err(e) => tracing::debug!(text = %text, error = %e, "Skipping unusable link in root listing"),
        }
    }
    tracing::debug!(packages = packages.len(), "Parsed root listing");
    packages
}
