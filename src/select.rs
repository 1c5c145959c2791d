//! Selection of configuration files from a cache listing.

use std::path::{Path, PathBuf};

use fancy_regex::Regex;
use thiserror::Error;

/// Default include pattern: visible `.cfg` files.
pub const DEFAULT_PATTERN: &str = r"^[^.].*\.cfg$";

/// Errors from compiling or evaluating selection patterns.
#[derive(Debug, Error)]
pub enum SelectorError {
    /// A pattern expression failed to compile.
    #[error("invalid pattern {pattern:?}: {source}")]
    Invalid {
        pattern: String,
        #[source]
        source: fancy_regex::Error,
    },
    /// Matching gave up, e.g. on the backtracking limit.
    #[error("cannot match {path:?} against {pattern:?}: {source}")]
    Match {
        pattern: String,
        path: String,
        #[source]
        source: fancy_regex::Error,
    },
}

/// Filter for a configuration file listing.
///
/// A path is selected if it matches `pattern` and either does not match
/// `blacklist` or matches `whitelist`. The whitelist only overrides the
/// blacklist; it never selects a path that failed `pattern`.
///
/// Patterns may use look-around and backreferences.
#[derive(Debug, Clone)]
pub struct ConfigSelector {
    pattern: Option<Regex>,
    blacklist: Option<Regex>,
    whitelist: Option<Regex>,
    recurse: bool,
}

impl ConfigSelector {
    /// Compile the three pattern sets.
    ///
    /// An empty `pattern` set matches everything; empty `blacklist` and
    /// `whitelist` sets match nothing.
    pub fn new<S: AsRef<str>>(
        pattern: &[S],
        blacklist: &[S],
        whitelist: &[S],
        recurse: bool,
    ) -> Result<Self, SelectorError> {
        Ok(Self {
            pattern: compile(pattern)?,
            blacklist: compile(blacklist)?,
            whitelist: compile(whitelist)?,
            recurse,
        })
    }

    /// Whether the relative path `rel_path` is selected.
    pub fn selects(&self, rel_path: &Path) -> Result<bool, SelectorError> {
        if !self.recurse && !is_top_level(rel_path) {
            return Ok(false);
        }
        let str_path = rel_path.to_string_lossy();
        if let Some(pattern) = &self.pattern
            && !search(pattern, &str_path)?
        {
            return Ok(false);
        }
        let blacklisted = match &self.blacklist {
            Some(blacklist) => search(blacklist, &str_path)?,
            None => false,
        };
        if !blacklisted {
            return Ok(true);
        }
        match &self.whitelist {
            Some(whitelist) => search(whitelist, &str_path),
            None => Ok(false),
        }
    }

    /// Select from `rel_paths` and resolve the survivors below `root`.
    ///
    /// Order is preserved and errors from the listing are passed through.
    pub fn get_paths<'a, I, E>(
        &'a self,
        root: &'a Path,
        rel_paths: I,
    ) -> impl Iterator<Item = Result<PathBuf, E>> + 'a
    where
        I: IntoIterator<Item = Result<PathBuf, E>>,
        I::IntoIter: 'a,
        E: From<SelectorError> + 'a,
    {
        rel_paths.into_iter().filter_map(move |rel_path| {
            let rel_path = match rel_path {
                Ok(rel_path) => rel_path,
                Err(e) => return Some(Err(e)),
            };
            match self.selects(&rel_path) {
                Ok(true) => Some(Ok(root.join(rel_path))),
                Ok(false) => None,
                Err(e) => Some(Err(e.into())),
            }
        })
    }
}

fn search(re: &Regex, str_path: &str) -> Result<bool, SelectorError> {
    re.is_match(str_path).map_err(|source| SelectorError::Match {
        pattern: re.as_str().to_string(),
        path: str_path.to_string(),
        source,
    })
}

/// Join pattern expressions into one alternation; `None` if there are none.
fn compile<S: AsRef<str>>(pieces: &[S]) -> Result<Option<Regex>, SelectorError> {
    // Compile each piece on its own first so errors name the culprit
    for piece in pieces {
        Regex::new(piece.as_ref()).map_err(|source| SelectorError::Invalid {
            pattern: piece.as_ref().to_string(),
            source,
        })?;
    }

    let joined = match pieces {
        [] => return Ok(None),
        [single] => single.as_ref().to_string(),
        _ => pieces
            .iter()
            .map(|piece| format!("(?:{})", piece.as_ref()))
            .collect::<Vec<_>>()
            .join("|"),
    };

    Regex::new(&joined)
        .map(Some)
        .map_err(|source| SelectorError::Invalid {
            pattern: joined,
            source,
        })
}

fn is_top_level(rel_path: &Path) -> bool {
    rel_path.components().count() == 1
}
