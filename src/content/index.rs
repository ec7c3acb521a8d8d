//! One-pass content tree indexing.
//!
//! Walks the content root once, classifies every entry, and accumulates the
//! raw material for a site build: template paths (public and hidden), asset
//! bytes, and discovered Git passthrough roots.  The walk is deterministic
//! (directory entries are visited in sorted order) and never descends into
//! passthrough directories.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::config::ContentConfig;
use crate::content::classify::{self, Bucket, Visibility};
use crate::content::url_path;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Everything a site build needs, gathered in one traversal.
///
/// All paths are relative to the indexed root.  Immutable once returned.
#[derive(Debug, Default)]
pub struct TreeIndex {
    /// Routable template files, in walk order.
    pub templates: Vec<PathBuf>,
    /// Templates under dot-directories, in walk order.  Compiled before the
    /// public set so public templates can reference them; never routed.
    pub hidden_templates: Vec<PathBuf>,
    /// Asset bytes keyed by `/`-joined relative path.
    pub assets: BTreeMap<String, Vec<u8>>,
    /// Git-served directories, deduplicated.
    pub passthrough_roots: BTreeSet<PathBuf>,
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Indexing
// ---------------------------------------------------------------------------

/// Walk `root` and build a [`TreeIndex`].
///
/// Fails on the first unreadable directory or file; a failed walk must not
/// replace a live snapshot, so errors propagate instead of being skipped.
pub fn index(root: &Path, config: &ContentConfig) -> Result<TreeIndex, IndexError> {
    let mut out = TreeIndex::default();
    walk(root, Path::new(""), config, &mut out)?;
    debug!(
        templates = out.templates.len(),
        hidden_templates = out.hidden_templates.len(),
        assets = out.assets.len(),
        git_roots = out.passthrough_roots.len(),
        "content tree indexed"
    );
    Ok(out)
}

fn walk(
    abs_dir: &Path,
    rel_dir: &Path,
    config: &ContentConfig,
    out: &mut TreeIndex,
) -> Result<(), IndexError> {
    let reader = fs::read_dir(abs_dir).map_err(|source| IndexError::Io {
        path: abs_dir.to_path_buf(),
        source,
    })?;

    let mut entries = reader
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| IndexError::Io {
            path: abs_dir.to_path_buf(),
            source,
        })?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let abs = entry.path();
        let rel = rel_dir.join(entry.file_name());
        let file_type = entry.file_type().map_err(|source| IndexError::Io {
            path: abs.clone(),
            source,
        })?;

        if file_type.is_dir() {
            if let Some(git_root) = classify::passthrough_root(&rel, &config.git_dirs) {
                // Recorded once; contents are the Git bridge's business.
                out.passthrough_roots.insert(git_root);
                continue;
            }
            walk(&abs, &rel, config, out)?;
            continue;
        }

        let classified = classify::classify(&rel, config);
        match (classified.bucket, classified.visibility) {
            (Bucket::Template, Visibility::Public) => out.templates.push(rel),
            (Bucket::Template, Visibility::Hidden) => out.hidden_templates.push(rel),
            (Bucket::Asset, Visibility::Public) => {
                let bytes = fs::read(&abs).map_err(|source| IndexError::Io {
                    path: abs.clone(),
                    source,
                })?;
                out.assets.insert(url_path(&rel), bytes);
            }
            // Assets under dot-directories have no consumer; skip them.
            (Bucket::Asset, Visibility::Hidden) => {}
            (Bucket::Passthrough | Bucket::Ignored, _) => {}
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ContentConfig {
        let mut config = ContentConfig::default();
        config
            .assets
            .insert(".css".to_string(), "text/css".to_string());
        config
    }

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn indexes_templates_assets_and_git_roots() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "index.tmpl", "home");
        write(root, "blog/#.tmpl", "blog");
        write(root, ".partials/header.tmpl", "header");
        write(root, "style.css", "body {}");
        write(root, "notes.txt", "ignored");
        write(root, ".env", "ignored dotfile");
        write(root, "repo/.git/HEAD", "ref: refs/heads/main");
        write(root, "repo/.git/refs/heads/main", "abc123");

        let idx = index(root, &config()).unwrap();

        assert_eq!(
            idx.templates,
            vec![PathBuf::from("blog/#.tmpl"), PathBuf::from("index.tmpl")]
        );
        assert_eq!(idx.hidden_templates, vec![PathBuf::from(".partials/header.tmpl")]);
        assert_eq!(idx.assets.len(), 1);
        assert_eq!(idx.assets["style.css"], b"body {}".to_vec());
        assert_eq!(
            idx.passthrough_roots,
            BTreeSet::from([PathBuf::from("repo/.git")])
        );
    }

    #[test]
    fn git_root_recorded_once_and_not_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "repo/.git/a.tmpl", "not a page");
        write(root, "repo/.git/sub/b.css", "not an asset");

        let idx = index(root, &config()).unwrap();

        assert_eq!(idx.passthrough_roots.len(), 1);
        assert!(idx.templates.is_empty());
        assert!(idx.assets.is_empty());
    }

    #[test]
    fn hidden_assets_are_not_stored() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, ".theme/style.css", "body {}");

        let idx = index(root, &config()).unwrap();
        assert!(idx.assets.is_empty());
    }

    #[test]
    fn missing_root_propagates_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("nope");
        let err = index(&gone, &config()).unwrap_err();
        match err {
            IndexError::Io { path, .. } => assert_eq!(path, gone),
        }
    }
}
