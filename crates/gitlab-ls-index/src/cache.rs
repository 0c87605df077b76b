//! On-disk copy of project generations
//!
//! Written after every successful refresh and read once at startup so
//! completions work before the first fetch returns. The file is replaced
//! through a temporary sibling so a crash never leaves half a cache behind.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use gitlab_ls_gitlab::{ProjectPath, TrackedItem};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::error::{IndexError, IndexResult};
use crate::project::RefreshState;

const CACHE_VERSION: u32 = 1;

/// One project's cached generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedProject {
    /// When the items were fetched
    pub fetched_at: DateTime<Utc>,
    /// The generation's items
    pub items: Vec<TrackedItem>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    #[serde(default)]
    projects: BTreeMap<String, CachedProject>,
}

impl Default for CacheFile {
    fn default() -> Self {
        Self {
            version: CACHE_VERSION,
            projects: BTreeMap::new(),
        }
    }
}

/// JSON cache file holding every project's last generation
#[derive(Debug)]
pub struct IndexCache {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl IndexCache {
    /// Cache stored at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// `<data_local_dir>/gitlab-ls/index.json`, if the platform has such a directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| dir.join("gitlab-ls").join("index.json"))
    }

    /// File location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every cached project; a missing file is an empty cache
    pub async fn load(&self) -> IndexResult<BTreeMap<ProjectPath, CachedProject>> {
        let file = self.read_file().await?;
        let mut projects = BTreeMap::new();
        for (name, cached) in file.projects {
            match ProjectPath::parse(name.as_str()) {
                Ok(path) => {
                    projects.insert(path, cached);
                }
                Err(e) => warn!("Ignoring cached project '{}': {}", name, e),
            }
        }
        Ok(projects)
    }

    /// Seed every configured project found in the cache
    ///
    /// Returns each seeded project with its cached item count.
    pub async fn seed(&self, catalog: &Catalog) -> Vec<(ProjectPath, usize)> {
        let cached = match self.load().await {
            Ok(cached) => cached,
            Err(e) => {
                warn!("Ignoring index cache {}: {}", self.path.display(), e);
                return Vec::new();
            }
        };

        let mut seeded = Vec::new();
        for project in catalog.projects() {
            if let Some(entry) = cached.get(project.path()) {
                catalog.seed(project, entry.items.clone(), entry.fetched_at);
                seeded.push((project.path().clone(), entry.items.len()));
            }
        }

        if !seeded.is_empty() {
            info!(
                "Seeded {} project(s) from cache {}",
                seeded.len(),
                self.path.display()
            );
        }
        seeded
    }

    /// Write the catalog's current generations
    ///
    /// Entries for projects this catalog does not know are kept. A failed
    /// project's entry is removed; a project that never completed a fetch
    /// keeps whatever entry it had.
    pub async fn store(&self, catalog: &Catalog) -> IndexResult<()> {
        let _guard = self.write_lock.lock().await;

        let mut file = match self.read_file().await {
            Ok(file) => file,
            Err(e) => {
                debug!("Rewriting unreadable cache {}: {}", self.path.display(), e);
                CacheFile::default()
            }
        };

        for project in catalog.projects() {
            let name = project.path().to_string();
            if project.state() == RefreshState::Failed {
                file.projects.remove(&name);
                continue;
            }
            let snapshot = project.snapshot();
            if let Some(fetched_at) = snapshot.fetched_at() {
                let items = snapshot.items().map(|item| item.as_ref().clone()).collect();
                file.projects.insert(name, CachedProject { fetched_at, items });
            }
        }

        let json = serde_json::to_vec(&file)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!("Stored index cache {}", self.path.display());
        Ok(())
    }

    async fn read_file(&self) -> IndexResult<CacheFile> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(CacheFile::default()),
            Err(e) => return Err(e.into()),
        };
        let file: CacheFile = serde_json::from_slice(&bytes)?;
        if file.version != CACHE_VERSION {
            return Err(IndexError::UnsupportedVersion(file.version));
        }
        Ok(file)
    }
}
