//! Cache directory path management
//!
//! This module provides the `CachePaths` struct which manages all filesystem paths
//! for one branch below the cache root:
//!
//! ```text
//! /etc/condor/config.git/
//! └── <branch>/
//!     ├── cache.json                # Metadata of the last successful refresh
//!     ├── cache.<branch>.lock       # flock-based locking
//!     └── repo/                     # Working tree handed to HTCondor
//!         └── .git/
//! ```

use std::io;
use std::path::{Path, PathBuf};

/// Default cache root used when `--cache-path` is not given.
pub const DEFAULT_CACHE_ROOT: &str = "/etc/condor/config.git/";

/// Name of the version-control metadata directory inside the working tree.
pub const GIT_DIR_NAME: &str = ".git";

/// Manages all filesystem paths for one branch's cache
#[derive(Debug, Clone)]
pub struct CachePaths {
    work_dir: PathBuf,
    branch: String,
}

impl CachePaths {
    /// Creates the work directory `{root}/{branch}` (and any parents) and
    /// binds paths to its canonical location.
    pub fn create(root: &Path, branch: &str) -> io::Result<Self> {
        std::fs::create_dir_all(root.join(branch))?;
        let work_dir = root.canonicalize()?.join(branch);
        Ok(Self {
            work_dir,
            branch: branch.to_string(),
        })
    }

    /// Returns the work directory: `{root}/{branch}`
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Returns the content root handed to the consumer: `{root}/{branch}/repo`
    pub fn repo_dir(&self) -> PathBuf {
        self.work_dir.join("repo")
    }

    /// Returns the git metadata dir of the content root: `{root}/{branch}/repo/.git`
    pub fn git_dir(&self) -> PathBuf {
        self.repo_dir().join(GIT_DIR_NAME)
    }

    /// Returns the metadata file path: `{root}/{branch}/cache.json`
    pub fn meta_file(&self) -> PathBuf {
        self.work_dir.join("cache.json")
    }

    /// Returns the lock file path: `{root}/{branch}/cache.{branch}.lock`
    ///
    /// Slashes in the branch name become `__` so the lock stays a single file.
    pub fn lock_path(&self) -> PathBuf {
        self.work_dir
            .join(format!("cache.{}.lock", self.branch.replace('/', "__")))
    }
}
