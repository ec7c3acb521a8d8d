//! Snapshot ownership and the live-reload loop.
//!
//! The current [`SiteSnapshot`] lives behind an `ArcSwap` in
//! [`crate::AppState`]: request handlers `load()` it lock-free, and the
//! rebuild loop `store()`s a fully-built replacement, so every in-flight
//! request sees either the whole old site or the whole new one.
//!
//! Rebuilds run sequentially inside the loop — a burst of filesystem
//! events queues on the watcher channel and collapses into one rebuild
//! rather than running in parallel.  Any failure parks the loop in a
//! terminal state: the error goes out on the rebuild error channel, the
//! channel closes, and the last good snapshot keeps serving.  A closed
//! channel is the operator's signal that content is now stale.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::config::ContentConfig;
use crate::content::index::{self, IndexError};
use crate::content::site::{BuildError, SiteSnapshot};
use crate::watch::{ChangeWatcher, WatchError};
use crate::AppState;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Why the live-reload loop stopped.  Surfaced on the rebuild error channel.
#[derive(Debug, Error)]
pub enum RebuildError {
    #[error("content indexing failed: {0}")]
    Index(#[from] IndexError),
    #[error("site build failed: {0}")]
    Build(#[from] BuildError),
    #[error("watch set re-install failed: {0}")]
    Watch(#[from] WatchError),
}

// ---------------------------------------------------------------------------
// Building
// ---------------------------------------------------------------------------

/// Index the content root and build a fresh snapshot from scratch.
pub fn build_site(root: &Path, config: &ContentConfig) -> Result<SiteSnapshot, RebuildError> {
    let idx = index::index(root, config)?;
    Ok(SiteSnapshot::build(idx, root, config)?)
}

// ---------------------------------------------------------------------------
// Rebuild loop
// ---------------------------------------------------------------------------

/// Consume change signals, rebuilding and swapping the site for each.
///
/// Runs until the watcher backend disappears or a rebuild step fails.  The
/// error channel closes when this task returns; `err_tx` must not be held
/// anywhere else.
pub async fn run_rebuild_loop(
    state: Arc<AppState>,
    mut watcher: ChangeWatcher,
    err_tx: mpsc::UnboundedSender<RebuildError>,
) {
    while watcher.changed().await.is_some() {
        loop {
            watcher.drain();
            info!("content change detected; rebuilding site");

            let root = state.root.clone();
            let config = Arc::clone(&state.config);
            let built =
                tokio::task::spawn_blocking(move || build_site(&root, &config.content)).await;

            let snapshot = match built {
                Ok(Ok(snapshot)) => snapshot,
                Ok(Err(e)) => {
                    error!(error = %e, "rebuild failed; keeping previous site");
                    let _ = err_tx.send(e);
                    return;
                }
                Err(e) => {
                    error!(error = %e, "rebuild task panicked; keeping previous site");
                    return;
                }
            };

            info!(
                routes = snapshot.route_count(),
                git_prefixes = snapshot.passthrough_count(),
                "new site snapshot installed"
            );
            state.site.store(Arc::new(snapshot));

            // Events that landed while rebuilding sit on the old watcher's
            // channel; carry them into another pass instead of dropping
            // them with the old subscription.
            let carried = watcher.take_pending();

            match ChangeWatcher::install(&state.root, &state.config.content.git_dirs) {
                Ok(next) => watcher = next,
                Err(e) => {
                    error!(error = %e, "failed to re-install watch set");
                    let _ = err_tx.send(e.into());
                    return;
                }
            }

            if !carried {
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use arc_swap::ArcSwap;
    use std::fs;

    fn config() -> ContentConfig {
        let mut config = ContentConfig::default();
        config
            .assets
            .insert(".css".to_string(), "text/css".to_string());
        config
    }

    #[test]
    fn rebuild_picks_up_new_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.tmpl"), "v1").unwrap();

        let config = config();
        let first = build_site(dir.path(), &config).unwrap();
        assert!(first.route("/index").is_some());
        assert!(first.route("/about").is_none());

        fs::write(dir.path().join("about.tmpl"), "about").unwrap();
        let second = build_site(dir.path(), &config).unwrap();
        assert!(second.route("/about").is_some());
    }

    #[test]
    fn failed_rebuild_leaves_previous_snapshot_live() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.tmpl"), "v1").unwrap();

        let config = config();
        let site = ArcSwap::from_pointee(build_site(dir.path(), &config).unwrap());

        fs::write(dir.path().join("broken.tmpl"), "{% if unclosed %}").unwrap();
        let result = build_site(dir.path(), &config);
        assert!(matches!(result, Err(RebuildError::Build(_))));

        // The caller never stores a failed build; readers still see v1.
        assert_eq!(site.load().render("/index").unwrap(), "v1");
    }

    #[test]
    fn swap_is_atomic_under_concurrent_readers() {
        let dir = tempfile::tempdir().unwrap();
        let config = config();

        fs::write(dir.path().join("marker.tmpl"), "one").unwrap();
        let one = Arc::new(build_site(dir.path(), &config).unwrap());
        fs::write(dir.path().join("marker.tmpl"), "two").unwrap();
        let two = Arc::new(build_site(dir.path(), &config).unwrap());

        let site = Arc::new(ArcSwap::from(Arc::clone(&one)));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let site = Arc::clone(&site);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        // Each loaded snapshot must be internally consistent:
                        // its route table and template set came from the
                        // same build.
                        let snapshot = site.load_full();
                        assert!(snapshot.route("/marker").is_some());
                        let rendered = snapshot.render("/marker").unwrap();
                        assert!(rendered == "one" || rendered == "two");
                    }
                })
            })
            .collect();

        for _ in 0..500 {
            site.store(Arc::clone(&two));
            site.store(Arc::clone(&one));
        }
        site.store(two);

        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(site.load().render("/marker").unwrap(), "two");
    }
}
