//! Filesystem change watching.
//!
//! Every directory under the content root (except Git passthrough
//! directories) gets its own non-recursive watch; there is no single
//! recursive-subscribe primitive assumed.  All mutation events coalesce
//! into a unit "rebuild needed" signal — the server rebuilds the whole tree
//! rather than diffing, so the event payload carries no information.
//!
//! A watcher covers one generation of the directory tree.  The server
//! installs a fresh watcher after every successful rebuild so directories
//! created or removed since the last walk are picked up.

use std::fs;
use std::path::{Path, PathBuf};

use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::content::classify::matches_git_dir;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to initialise filesystem watcher: {0}")]
    Init(#[source] notify::Error),
    #[error("failed to watch {path}: {source}")]
    Subscribe {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
    #[error("failed to enumerate watch directories under {path}: {source}")]
    Enumerate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// An installed watch set.  Dropping it releases every subscription.
pub struct ChangeWatcher {
    // Kept alive for the subscriptions it owns; events arrive via `rx`.
    _watcher: RecommendedWatcher,
    rx: mpsc::UnboundedReceiver<()>,
}

// ---------------------------------------------------------------------------
// Installation
// ---------------------------------------------------------------------------

impl ChangeWatcher {
    /// Subscribe to every directory under `root` except Git passthrough
    /// directories, funnelling all mutation events into one signal stream.
    pub fn install(root: &Path, git_dirs: &[String]) -> Result<Self, WatchError> {
        let dirs = watch_dirs(root, git_dirs)?;
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) if is_mutation(&event.kind) => {
                    let _ = tx.send(());
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "filesystem watch backend error");
                }
            },
            NotifyConfig::default(),
        )
        .map_err(WatchError::Init)?;

        for dir in &dirs {
            watcher
                .watch(dir, RecursiveMode::NonRecursive)
                .map_err(|source| WatchError::Subscribe {
                    path: dir.clone(),
                    source,
                })?;
        }

        debug!(directories = dirs.len(), "watch set installed");
        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// Wait for the next change signal.  `None` means the backend is gone.
    pub async fn changed(&mut self) -> Option<()> {
        self.rx.recv().await
    }

    /// Discard queued signals so a burst of events triggers one rebuild.
    pub fn drain(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }

    /// True if at least one signal is queued (consumes it).
    pub fn take_pending(&mut self) -> bool {
        self.rx.try_recv().is_ok()
    }
}

/// Write, create, remove, and rename all mean the same thing here: the
/// tree changed and the site must be rebuilt.
fn is_mutation(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Enumerate every directory under `root`, skipping Git passthrough
/// directories (and everything below them).
pub(crate) fn watch_dirs(root: &Path, git_dirs: &[String]) -> Result<Vec<PathBuf>, WatchError> {
    let mut dirs = vec![root.to_path_buf()];
    let mut i = 0;
    while i < dirs.len() {
        let dir = dirs[i].clone();
        i += 1;
        let reader = fs::read_dir(&dir).map_err(|source| WatchError::Enumerate {
            path: dir.clone(),
            source,
        })?;
        let mut children: Vec<PathBuf> = Vec::new();
        for entry in reader {
            let entry = entry.map_err(|source| WatchError::Enumerate {
                path: dir.clone(),
                source,
            })?;
            let file_type = entry.file_type().map_err(|source| WatchError::Enumerate {
                path: entry.path(),
                source,
            })?;
            if !file_type.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_str().unwrap_or("");
            if matches_git_dir(name, git_dirs) {
                continue;
            }
            children.push(entry.path());
        }
        children.sort();
        dirs.extend(children);
    }
    Ok(dirs)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
