//! Configuration cache manager
//!
//! This module provides `ConfigCache`, which owns one branch's work directory,
//! and `LockedCache`, the view of it that exists only while the branch lock is
//! held. Staleness checks, refreshes and file listings all go through
//! `LockedCache`, so none of them can run unlocked.

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::git::{Fetcher, GitCli, GitError, head_commit, validate_branch, validate_uri};
use super::lock::CacheLock;
use super::metadata::{CacheMetadata, MetadataError, unix_now};
use super::paths::CachePaths;
use super::staleness::is_stale;
use super::walk::CacheFiles;
use crate::select::SelectorError;
use crate::types::{CacheIdentity, MaxAge};

/// Errors returned by cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A git operation failed.
    #[error("git error: {0}")]
    Git(#[from] GitError),
    /// An underlying IO operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The metadata file could not be read or written.
    #[error("cache metadata error: {0}")]
    Metadata(#[from] MetadataError),
    /// Listing the working tree failed.
    #[error("failed to list cache content: {0}")]
    Walk(#[from] walkdir::Error),
    /// A symlink in the working tree points nowhere.
    #[error("dangling symlink {path}: {source}")]
    DanglingSymlink {
        path: PathBuf,
        source: std::io::Error,
    },
    /// A listed path could not be matched against the selection patterns.
    #[error("failed to select configuration: {0}")]
    Select(#[from] SelectorError),
    /// Failed to acquire the branch lock.
    #[error("failed to lock {path}: {source}")]
    LockFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The work directory already holds a different repository or branch.
    #[error("config cache {path} used for conflicting hooks: holds {found}, requested {expected}")]
    Conflict {
        path: PathBuf,
        expected: CacheIdentity,
        found: CacheIdentity,
    },
}

/// Cache of configuration files from one branch of a git repository.
pub struct ConfigCache<F = GitCli> {
    identity: CacheIdentity,
    max_age: MaxAge,
    paths: CachePaths,
    fetcher: F,
}

impl ConfigCache<GitCli> {
    /// Create the cache for `branch` of `git_uri` below `cache_root`, using
    /// the system git.
    pub fn new(
        git_uri: &str,
        branch: &str,
        cache_root: &Path,
        max_age: MaxAge,
    ) -> Result<Self, CacheError> {
        Self::with_fetcher(git_uri, branch, cache_root, max_age, GitCli::new())
    }
}

impl<F: Fetcher> ConfigCache<F> {
    /// Create the cache with a custom fetch/update implementation.
    ///
    /// The work directory `{cache_root}/{branch}` is created if missing.
    pub fn with_fetcher(
        git_uri: &str,
        branch: &str,
        cache_root: &Path,
        max_age: MaxAge,
        fetcher: F,
    ) -> Result<Self, CacheError> {
        validate_uri(git_uri)?;
        validate_branch(branch)?;

        let paths = CachePaths::create(cache_root, branch)?;
        Ok(Self {
            identity: CacheIdentity::new(git_uri, branch),
            max_age,
            paths,
            fetcher,
        })
    }

    pub fn identity(&self) -> &CacheIdentity {
        &self.identity
    }

    pub fn paths(&self) -> &CachePaths {
        &self.paths
    }

    /// Root of the checked-out content.
    pub fn repo_dir(&self) -> PathBuf {
        self.paths.repo_dir()
    }

    /// Take the branch lock, blocking until no other process holds it.
    ///
    /// The lock is released when the returned guard is dropped, on every
    /// exit path.
    pub fn lock(&self) -> Result<LockedCache<'_, F>, CacheError> {
        let lock_path = self.paths.lock_path();
        log::debug!("waiting for cache lock {}", lock_path.display());
        let lock = CacheLock::acquire(&lock_path).map_err(|source| CacheError::LockFailed {
            path: lock_path.clone(),
            source,
        })?;
        log::debug!("acquired cache lock {}", lock_path.display());

        Ok(LockedCache {
            cache: self,
            _lock: lock,
        })
    }
}

/// Exclusive access to a [`ConfigCache`].
pub struct LockedCache<'a, F> {
    cache: &'a ConfigCache<F>,
    _lock: CacheLock,
}

impl<F: Fetcher> LockedCache<'_, F> {
    /// Root of the checked-out content.
    pub fn repo_dir(&self) -> PathBuf {
        self.cache.repo_dir()
    }

    /// Metadata of the last successful refresh, if any.
    pub fn last_refresh(&self) -> Result<Option<CacheMetadata>, CacheError> {
        Ok(CacheMetadata::load(&self.cache.paths.meta_file())?)
    }

    /// Whether the content must be refreshed.
    ///
    /// Fails with [`CacheError::Conflict`] if the work directory was
    /// populated for another repository or branch.
    pub fn outdated(&self) -> Result<bool, CacheError> {
        let meta = self.last_refresh()?;

        if let Some(meta) = &meta
            && !meta.matches(&self.cache.identity)
        {
            log::error!(
                "cache {} corrupted by other hook: {:?}",
                self.cache.paths.work_dir().display(),
                meta
            );
            return Err(CacheError::Conflict {
                path: self.cache.paths.work_dir().to_path_buf(),
                expected: self.cache.identity.clone(),
                found: meta.identity(),
            });
        }

        let stale = is_stale(meta.as_ref(), self.cache.max_age, unix_now());
        log::debug!(
            "cache {} is {} (max age {})",
            self.cache.identity,
            if stale { "stale" } else { "fresh" },
            self.cache.max_age
        );
        Ok(stale)
    }

    /// Clone or pull if the content is outdated.
    ///
    /// Returns whether a refresh happened. Metadata is only rewritten after
    /// git succeeded, so a failed refresh is retried by the next invocation.
    pub fn refresh(&self) -> Result<bool, CacheError> {
        if !self.outdated()? {
            return Ok(false);
        }

        let cache = self.cache;
        let repo_dir = cache.repo_dir();
        if !cache.paths.git_dir().exists() {
            log::info!("cloning {} into {}", cache.identity, repo_dir.display());
            cache
                .fetcher
                .fetch(&cache.identity.git_uri, &cache.identity.branch, &repo_dir)?;
        } else {
            log::info!("pulling {} in {}", cache.identity, repo_dir.display());
            cache.fetcher.update(&repo_dir)?;
        }

        match head_commit(&repo_dir) {
            Ok(commit) => log::info!("refreshed {} at {}", cache.identity, commit),
            Err(e) => log::warn!("refreshed {} but cannot read HEAD: {}", cache.identity, e),
        }

        CacheMetadata::now(&cache.identity).store(&cache.paths.meta_file())?;
        Ok(true)
    }

    /// Relative paths of all files in the content, in traversal order.
    ///
    /// Every call starts a fresh traversal.
    pub fn files(&self) -> CacheFiles {
        CacheFiles::new(&self.cache.repo_dir())
    }
}
