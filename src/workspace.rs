//! Workspace Store: one isolated temporary directory per uploaded document.
//!
//! A workspace is the only place page rasters live between the analyze call
//! and the confirm call. Its id is a random UUIDv4 and is the sole credential
//! needed to address the document later, so it is never sequential.
//!
//! ## Lifecycle
//!
//! ```text
//! allocate() ──▶ set_pages() ──▶ resolve() … claim() ──▶ destroy()
//!   (analyze)     (once)          (confirm, at most once)  (always)
//! ```
//!
//! `destroy` removes the id from the map *before* touching the filesystem, so
//! an id cannot resolve again even when the directory removal fails. The
//! directories themselves are [`TempDir`]s: anything the store still owns when
//! it is dropped is removed with it.

use crate::error::RedactError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Opaque, unguessable workspace identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(Uuid);

impl WorkspaceId {
    fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for WorkspaceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// One rasterised page persisted inside a workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPage {
    /// Zero-based page index.
    pub index: usize,
    pub width: u32,
    pub height: u32,
    /// Absolute path of the PNG inside the workspace directory.
    pub path: PathBuf,
}

/// The storage scope of exactly one uploaded document.
#[derive(Debug)]
pub struct Workspace {
    id: WorkspaceId,
    root: PathBuf,
    created_at: DateTime<Utc>,
    dpi: u32,
    pages: OnceLock<Vec<StoredPage>>,
    consumed: AtomicBool,
}

impl Workspace {
    pub fn id(&self) -> WorkspaceId {
        self.id
    }

    /// Directory holding this document's page rasters.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Rendering density the pages were rasterised at.
    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    /// Index-addressable file name for page `index` inside the workspace.
    pub fn page_path(&self, index: usize) -> PathBuf {
        self.root.join(format!("page-{index}.png"))
    }

    /// Record the rasterised pages. A workspace is populated exactly once;
    /// a second call is rejected.
    pub fn set_pages(&self, mut pages: Vec<StoredPage>) -> Result<(), RedactError> {
        pages.sort_by_key(|p| p.index);
        self.pages.set(pages).map_err(|_| {
            RedactError::Internal(format!("workspace {} already populated", self.id))
        })
    }

    /// Pages in ascending index order (empty until [`Self::set_pages`]).
    pub fn pages(&self) -> &[StoredPage] {
        self.pages.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn page(&self, index: usize) -> Option<&StoredPage> {
        self.pages().iter().find(|p| p.index == index)
    }

    /// Mark the workspace as consumed by a redaction job.
    ///
    /// Returns `false` when an earlier job already claimed it.
    pub fn claim(&self) -> bool {
        !self.consumed.swap(true, Ordering::SeqCst)
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed.load(Ordering::SeqCst)
    }
}

struct Entry {
    workspace: Arc<Workspace>,
    dir: TempDir,
}

/// Allocates, resolves and destroys workspaces.
///
/// Create one per service instance and share it behind an `Arc`; there is no
/// process-wide store.
pub struct WorkspaceStore {
    root: TempDir,
    entries: Mutex<HashMap<WorkspaceId, Entry>>,
}

impl fmt::Debug for WorkspaceStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkspaceStore")
            .field("root", &self.root.path())
            .field("live", &self.len())
            .finish()
    }
}

impl WorkspaceStore {
    /// Create a store whose workspaces live under a fresh directory inside
    /// `base` (or the system temp directory when `None`).
    pub fn new(base: Option<&Path>) -> Result<Self, RedactError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("sigredact-");
        let root = match base {
            Some(base) => {
                std::fs::create_dir_all(base).map_err(RedactError::Storage)?;
                builder.tempdir_in(base)
            }
            None => builder.tempdir(),
        }
        .map_err(RedactError::Storage)?;

        info!("Workspace store rooted at {}", root.path().display());
        Ok(Self {
            root,
            entries: Mutex::new(HashMap::new()),
        })
    }

    /// Directory under which every workspace of this store is created.
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Allocate a fresh, empty workspace rendered at `dpi`.
    pub fn allocate(&self, dpi: u32) -> Result<Arc<Workspace>, RedactError> {
        let id = WorkspaceId::random();
        let dir = tempfile::Builder::new()
            .prefix("ws-")
            .tempdir_in(self.root.path())
            .map_err(RedactError::Storage)?;

        let workspace = Arc::new(Workspace {
            id,
            root: dir.path().to_path_buf(),
            created_at: Utc::now(),
            dpi,
            pages: OnceLock::new(),
            consumed: AtomicBool::new(false),
        });

        self.lock().insert(
            id,
            Entry {
                workspace: Arc::clone(&workspace),
                dir,
            },
        );
        debug!("Allocated workspace {}", id);
        Ok(workspace)
    }

    /// Look up a live workspace.
    pub fn resolve(&self, id: &WorkspaceId) -> Option<Arc<Workspace>> {
        self.lock().get(id).map(|e| Arc::clone(&e.workspace))
    }

    /// Tear down a workspace. Idempotent: unknown ids are a no-op.
    ///
    /// Returns `true` when a live workspace was removed. Filesystem errors are
    /// logged, never returned; the id is unresolvable either way.
    pub fn destroy(&self, id: &WorkspaceId) -> bool {
        let entry = self.lock().remove(id);
        match entry {
            Some(entry) => {
                let path = entry.dir.path().to_path_buf();
                if let Err(e) = entry.dir.close() {
                    warn!(
                        "Workspace {}: failed to remove {}: {}",
                        id,
                        path.display(),
                        e
                    );
                } else {
                    debug!("Destroyed workspace {}", id);
                }
                true
            }
            None => false,
        }
    }

    /// Destroy every workspace older than `ttl`. Returns how many were removed.
    ///
    /// Covers documents that were analyzed but never confirmed.
    pub fn sweep_expired(&self, ttl: Duration) -> usize {
        let cutoff = Utc::now() - ttl;
        let expired: Vec<WorkspaceId> = self
            .lock()
            .iter()
            .filter(|(_, e)| e.workspace.created_at < cutoff)
            .map(|(id, _)| *id)
            .collect();

        let removed = expired.iter().filter(|id| self.destroy(id)).count();
        if removed > 0 {
            info!("Swept {} expired workspace(s)", removed);
        }
        removed
    }

    /// Number of live workspaces.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<WorkspaceId, Entry>> {
        // A panic while holding the guard leaves the map itself consistent.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
