//! Git-backed configuration cache

mod git;
mod lock;
mod metadata;
mod paths;
mod repo;
mod staleness;
mod swap;
mod walk;

pub use git::Fetcher;
pub use paths::DEFAULT_CACHE_ROOT;
pub use repo::{CacheError, ConfigCache, LockedCache};

#[cfg(test)]
pub(crate) use git::testing;
