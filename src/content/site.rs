//! Immutable site snapshots.
//!
//! A [`SiteSnapshot`] is one fully-built view of the served site: a route
//! table, a compiled template set, and the Git passthrough prefixes.  It is
//! constructed in full or not at all — a build failure leaves the caller's
//! previous snapshot untouched — and is installed with a single atomic swap,
//! so request handlers never observe a half-built site.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tera::{Context, Tera};
use thiserror::Error;
use tracing::warn;

use crate::config::ContentConfig;
use crate::content::classify::ext_of;
use crate::content::index::TreeIndex;
use crate::content::url_path;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Base filename that routes to its containing directory instead of itself,
/// so `blog/#.tmpl` serves `/blog` and a root-level `#.tmpl` serves `/`.
const DIRECTORY_SENTINEL: &str = "#";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How a URL path is answered.  Routes are plain data dispatched by lookup;
/// there is one table, not one closure per file.
#[derive(Debug, Clone)]
pub enum Route {
    /// Serve cached bytes with a fixed content type.
    Asset { body: Bytes, content_type: String },
    /// Execute the named template from the snapshot's compiled set.
    Template { name: String },
}

/// A URL prefix delegated to the Git smart HTTP bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassthroughPrefix {
    /// URL prefix, always ending in `/`.
    pub prefix: String,
    /// Absolute filesystem directory of the repository.
    pub dir: PathBuf,
}

/// One immutable, fully-built view of the served site.
#[derive(Debug)]
pub struct SiteSnapshot {
    routes: HashMap<String, Route>,
    templates: Tera,
    passthrough: Vec<PassthroughPrefix>,
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to read template {file}: {source}")]
    Read {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to compile template {file}: {source}")]
    TemplateCompile {
        file: PathBuf,
        #[source]
        source: tera::Error,
    },
}

// ---------------------------------------------------------------------------
// Building
// ---------------------------------------------------------------------------

impl SiteSnapshot {
    /// Build a snapshot from an indexed tree.
    ///
    /// Hidden templates are registered first so public templates can
    /// reference them by name.  Template names equal their route paths
    /// (`/index`, `/blog`, `/.partials/header`), one naming scheme for
    /// routing and `{% include %}` references alike.
    pub fn build(index: TreeIndex, root: &Path, config: &ContentConfig) -> Result<Self, BuildError> {
        let mut templates = Tera::default();
        let mut routes = HashMap::new();

        for rel in &index.hidden_templates {
            register_template(&mut templates, root, rel)?;
        }
        for rel in &index.templates {
            let name = register_template(&mut templates, root, rel)?;
            if routes.contains_key(&name) {
                warn!(
                    route = %name,
                    file = %rel.display(),
                    "route collision: replacing earlier registration"
                );
            }
            routes.insert(name.clone(), Route::Template { name });
        }

        for (rel, bytes) in index.assets {
            let path = format!("/{rel}");
            let content_type = content_type_for(&rel, config);
            if routes.contains_key(&path) {
                warn!(route = %path, "route collision: replacing earlier registration");
            }
            routes.insert(
                path,
                Route::Asset {
                    body: Bytes::from(bytes),
                    content_type,
                },
            );
        }

        let passthrough = index
            .passthrough_roots
            .iter()
            .map(|rel| PassthroughPrefix {
                prefix: format!("/{}/", url_path(rel)),
                dir: root.join(rel),
            })
            .collect();

        Ok(Self {
            routes,
            templates,
            passthrough,
        })
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// Exact route-table lookup.
    pub fn route(&self, path: &str) -> Option<&Route> {
        self.routes.get(path)
    }

    /// The passthrough prefix covering `path`, if any.
    pub fn passthrough_for(&self, path: &str) -> Option<&PassthroughPrefix> {
        self.passthrough.iter().find(|p| path.starts_with(&p.prefix))
    }

    /// Execute a template from the compiled set.  Templates render with an
    /// empty context; there is no per-request data.
    pub fn render(&self, name: &str) -> Result<String, tera::Error> {
        self.templates.render(name, &Context::new())
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub fn passthrough_count(&self) -> usize {
        self.passthrough.len()
    }
}

/// Read, name, and register one template file.  Returns the template name.
fn register_template(templates: &mut Tera, root: &Path, rel: &Path) -> Result<String, BuildError> {
    let contents = std::fs::read_to_string(root.join(rel)).map_err(|source| BuildError::Read {
        file: rel.to_path_buf(),
        source,
    })?;
    let name = route_path(rel);
    templates
        .add_raw_template(&name, &contents)
        .map_err(|source| BuildError::TemplateCompile {
            file: rel.to_path_buf(),
            source,
        })?;
    Ok(name)
}

/// Derive the URL path (and template name) for a template file: strip the
/// template extension; the `#` sentinel maps to the containing directory.
pub(crate) fn route_path(rel: &Path) -> String {
    let stem = rel.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    let parent = rel.parent().filter(|p| !p.as_os_str().is_empty());

    if stem == DIRECTORY_SENTINEL {
        match parent {
            Some(dir) => format!("/{}", url_path(dir)),
            None => "/".to_string(),
        }
    } else {
        match parent {
            Some(dir) => format!("/{}/{}", url_path(dir), stem),
            None => format!("/{stem}"),
        }
    }
}

fn content_type_for(rel: &str, config: &ContentConfig) -> String {
    ext_of(Path::new(rel))
        .and_then(|ext| config.assets.get(&ext).cloned())
        .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::index;

    fn config() -> ContentConfig {
        let mut config = ContentConfig::default();
        config
            .assets
            .insert(".css".to_string(), "text/css".to_string());
        config
            .assets
            .insert(".bin".to_string(), FALLBACK_CONTENT_TYPE.to_string());
        config
    }

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn build_from(root: &Path) -> SiteSnapshot {
        let config = config();
        let idx = index::index(root, &config).unwrap();
        SiteSnapshot::build(idx, root, &config).unwrap()
    }

    #[test]
    fn route_path_strips_template_extension() {
        assert_eq!(route_path(Path::new("index.tmpl")), "/index");
        assert_eq!(route_path(Path::new("foo/bar/baz.tmpl")), "/foo/bar/baz");
    }

    #[test]
    fn route_path_sentinel_maps_to_directory() {
        assert_eq!(route_path(Path::new("blog/#.tmpl")), "/blog");
        assert_eq!(route_path(Path::new("a/b/#.tmpl")), "/a/b");
        assert_eq!(route_path(Path::new("#.tmpl")), "/");
    }

    #[test]
    fn template_file_gets_template_route() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "index.tmpl", "home");

        let site = build_from(dir.path());
        match site.route("/index") {
            Some(Route::Template { name }) => assert_eq!(name, "/index"),
            other => panic!("expected template route, got {other:?}"),
        }
        assert_eq!(site.render("/index").unwrap(), "home");
    }

    #[test]
    fn sentinel_template_serves_directory_url() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "blog/#.tmpl", "blog home");

        let site = build_from(dir.path());
        assert!(site.route("/blog").is_some());
        assert!(site.route("/blog/#").is_none());
        assert_eq!(site.render("/blog").unwrap(), "blog home");
    }

    #[test]
    fn root_sentinel_serves_root_url() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "#.tmpl", "front page");

        let site = build_from(dir.path());
        assert!(site.route("/").is_some());
        assert_eq!(site.render("/").unwrap(), "front page");
    }

    #[test]
    fn hidden_template_included_but_not_routed() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".partials/header.tmpl", "HEADER");
        write(
            dir.path(),
            "page.tmpl",
            "{% include \"/.partials/header\" %}<p>body</p>",
        );

        let site = build_from(dir.path());
        assert!(site.route("/.partials/header").is_none());
        let rendered = site.render("/page").unwrap();
        assert!(rendered.contains("HEADER"));
        assert!(rendered.contains("<p>body</p>"));
    }

    #[test]
    fn asset_serves_identical_bytes_with_configured_type() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "style.css", "body { color: red }");

        let site = build_from(dir.path());
        match site.route("/style.css") {
            Some(Route::Asset { body, content_type }) => {
                assert_eq!(body.as_ref(), b"body { color: red }");
                assert_eq!(content_type, "text/css");
            }
            other => panic!("expected asset route, got {other:?}"),
        }
    }

    #[test]
    fn unmapped_asset_extension_falls_back_to_octet_stream() {
        let mut config = config();
        config.assets.remove(".bin");
        assert_eq!(content_type_for("blob.bin", &config), FALLBACK_CONTENT_TYPE);
    }

    #[test]
    fn passthrough_prefix_per_git_root() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "repo/.git/HEAD", "ref: refs/heads/main");
        write(dir.path(), "repo/.git/refs/heads/main", "abc");

        let site = build_from(dir.path());
        assert_eq!(site.passthrough_count(), 1);
        let pt = site.passthrough_for("/repo/.git/info/refs").unwrap();
        assert_eq!(pt.prefix, "/repo/.git/");
        assert!(pt.dir.ends_with("repo/.git"));
        assert!(site.passthrough_for("/elsewhere").is_none());
    }

    #[test]
    fn colliding_routes_warn_last_wins() {
        // `a/#.tmpl` and `a.tmpl` both canonicalize to `/a`; the later file
        // in walk order replaces the earlier registration.
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a/#.tmpl", "from directory sentinel");
        write(dir.path(), "a.tmpl", "from plain file");

        let site = build_from(dir.path());
        assert!(site.route("/a").is_some());
        assert_eq!(site.render("/a").unwrap(), "from plain file");
    }

    #[test]
    fn malformed_template_reports_offending_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "broken.tmpl", "{% if unclosed %}");

        let config = config();
        let idx = index::index(dir.path(), &config).unwrap();
        let err = SiteSnapshot::build(idx, dir.path(), &config).unwrap_err();
        match err {
            BuildError::TemplateCompile { file, .. } => {
                assert_eq!(file, PathBuf::from("broken.tmpl"));
            }
            other => panic!("expected compile error, got {other:?}"),
        }
    }
}
