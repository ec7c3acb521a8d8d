//! Content pipeline: path classification, tree indexing, and site building.
//!
//! A build runs the three stages in order: [`index::index`] walks the
//! content root and classifies every entry via [`classify::classify`], and
//! [`site::SiteSnapshot::build`] turns the resulting [`index::TreeIndex`]
//! into an immutable, atomically-swappable snapshot of the served site.

pub mod classify;
pub mod index;
pub mod site;

use std::path::{Component, Path};

/// Join the normal components of a root-relative path with `/` for use in
/// URL paths and template names.
pub(crate) fn url_path(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
