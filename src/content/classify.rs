//! Pure classification of content-root paths.
//!
//! Classification is a function of the path string and the configured
//! extension sets alone; it never touches the filesystem, so rebuilds are
//! reproducible and the rules are unit-testable in isolation.

use std::path::{Component, Path, PathBuf};

use crate::config::ContentConfig;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What a file is used for once indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    /// A page template (extension equals the configured template extension).
    Template,
    /// A static asset with a configured MIME type.
    Asset,
    /// Inside a directory served over the Git bridge; excluded from
    /// template/asset indexing entirely.
    Passthrough,
    /// Not served: unrecognized extension, or a dotfile.
    Ignored,
}

/// Whether a file is directly routable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    /// Under a dot-prefixed directory segment.  Hidden templates are
    /// compiled for reuse by public templates but never get a route.
    Hidden,
}

/// A root-relative path plus its classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedPath {
    pub rel: PathBuf,
    pub ext: Option<String>,
    pub bucket: Bucket,
    pub visibility: Visibility,
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Classify a root-relative file path against the configured extension sets.
pub fn classify(rel: &Path, config: &ContentConfig) -> ClassifiedPath {
    let file_name = rel.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = ext_of(rel);

    let visibility = if rel.parent().is_some_and(|p| has_dot_component(p)) {
        Visibility::Hidden
    } else {
        Visibility::Public
    };

    let under_passthrough = rel
        .parent()
        .and_then(|p| passthrough_root(p, &config.git_dirs))
        .is_some();

    let bucket = if under_passthrough {
        Bucket::Passthrough
    } else if file_name.starts_with('.') {
        // Dotfiles are never served.
        Bucket::Ignored
    } else {
        match ext.as_deref() {
            Some(e) if e == config.template_ext => Bucket::Template,
            Some(e) if config.assets.contains_key(e) => Bucket::Asset,
            _ => Bucket::Ignored,
        }
    };

    ClassifiedPath {
        rel: rel.to_path_buf(),
        ext,
        bucket,
        visibility,
    }
}

/// The shallowest directory along `dir` whose name marks it as a
/// passthrough (Git-served) directory, if any.
///
/// Every component of `dir` must itself be a directory; pass
/// `rel.parent()` when asking about a file.
pub fn passthrough_root(dir: &Path, git_dirs: &[String]) -> Option<PathBuf> {
    let mut prefix = PathBuf::new();
    for component in dir.components() {
        prefix.push(component);
        if let Component::Normal(name) = component {
            let name = name.to_str().unwrap_or("");
            if matches_git_dir(name, git_dirs) {
                return Some(prefix);
            }
        }
    }
    None
}

/// A directory name matches when it equals or ends with a configured entry,
/// so `.git` covers both `repo/.git` and bare `project.git` layouts.
pub(crate) fn matches_git_dir(name: &str, git_dirs: &[String]) -> bool {
    git_dirs.iter().any(|d| name.ends_with(d.as_str()))
}

/// The file extension including its leading dot (`".tmpl"`), if any.
pub(crate) fn ext_of(rel: &Path) -> Option<String> {
    rel.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
}

fn has_dot_component(dir: &Path) -> bool {
    dir.components().any(|c| match c {
        Component::Normal(s) => s.to_str().is_some_and(|s| s.starts_with('.')),
        _ => false,
    })
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

    #[test]
    fn template_extension_is_template() {
        let c = classify(Path::new("foo/bar/baz.tmpl"), &config());
        assert_eq!(c.bucket, Bucket::Template);
        assert_eq!(c.visibility, Visibility::Public);
        assert_eq!(c.ext.as_deref(), Some(".tmpl"));
    }

    #[test]
    fn known_asset_extension_is_asset() {
        let c = classify(Path::new("style.css"), &config());
        assert_eq!(c.bucket, Bucket::Asset);
        assert_eq!(c.visibility, Visibility::Public);
    }

    #[test]
    fn unknown_extension_is_ignored() {
        assert_eq!(classify(Path::new("notes.txt"), &config()).bucket, Bucket::Ignored);
        assert_eq!(classify(Path::new("README"), &config()).bucket, Bucket::Ignored);
    }

    #[test]
    fn dotfile_is_always_ignored() {
        let c = classify(Path::new(".secret.tmpl"), &config());
        assert_eq!(c.bucket, Bucket::Ignored);
        let c = classify(Path::new("sub/.hidden.css"), &config());
        assert_eq!(c.bucket, Bucket::Ignored);
    }

    #[test]
    fn dot_directory_marks_hidden() {
        let c = classify(Path::new(".partials/header.tmpl"), &config());
        assert_eq!(c.bucket, Bucket::Template);
        assert_eq!(c.visibility, Visibility::Hidden);

        let c = classify(Path::new("a/.b/c/page.tmpl"), &config());
        assert_eq!(c.visibility, Visibility::Hidden);
    }

    #[test]
    fn classification_is_deterministic() {
        let first = classify(Path::new("blog/#.tmpl"), &config());
        let second = classify(Path::new("blog/#.tmpl"), &config());
        assert_eq!(first, second);
    }

    #[test]
    fn files_under_git_dir_are_passthrough() {
        let c = classify(Path::new("repo/.git/config.tmpl"), &config());
        assert_eq!(c.bucket, Bucket::Passthrough);
        let c = classify(Path::new("project.git/HEAD"), &config());
        assert_eq!(c.bucket, Bucket::Passthrough);
    }

    #[test]
    fn passthrough_root_finds_shallowest_match() {
        let git_dirs = vec![".git".to_string()];
        assert_eq!(
            passthrough_root(Path::new("repo/.git/refs/heads"), &git_dirs),
            Some(PathBuf::from("repo/.git"))
        );
        assert_eq!(
            passthrough_root(Path::new("project.git/objects"), &git_dirs),
            Some(PathBuf::from("project.git"))
        );
        assert_eq!(passthrough_root(Path::new("docs/api"), &git_dirs), None);
    }

    #[test]
    fn git_dir_file_name_does_not_mark_file_passthrough() {
        // Only ancestor directories count; a *file* named `x.git` is just an
        // unrecognized extension.
        let c = classify(Path::new("downloads/x.git"), &config());
        assert_eq!(c.bucket, Bucket::Ignored);
    }
}
