//! The HTCondor configuration hook: refresh the cache and emit includes.

use std::fmt::Write as _;
use std::io::Write;

use crate::cache::{CacheError, ConfigCache, Fetcher};
use crate::select::ConfigSelector;

/// Default name of the config key exposing the cache path.
pub const DEFAULT_PATH_KEY: &str = "GIT_CONFIG_CACHE_PATH";

/// Refresh `cache` if needed and write HTCondor config lines to `out`:
///
/// ```text
/// GIT_CONFIG_CACHE_PATH = /etc/condor/config.git/master/repo
/// include : /etc/condor/config.git/master/repo/site.cfg
/// ```
///
/// Output is rendered in full while the cache lock is held and written only
/// once everything succeeded; on error `out` is left untouched.
pub fn include_configs<F: Fetcher, W: Write>(
    path_key: &str,
    cache: &ConfigCache<F>,
    selector: &ConfigSelector,
    out: &mut W,
) -> Result<(), CacheError> {
    let locked = cache.lock()?;
    locked.refresh()?;

    let repo_dir = locked.repo_dir();
    let mut rendered = String::new();
    let _ = writeln!(rendered, "{} = {}", path_key, repo_dir.display());
    for config_path in selector.get_paths(&repo_dir, locked.files()) {
        let _ = writeln!(rendered, "include : {}", config_path?.display());
    }

    out.write_all(rendered.as_bytes())?;
    out.flush()?;
    Ok(())
}
