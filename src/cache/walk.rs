//! Deterministic listing of the files in a working tree.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, FilterEntry, WalkDir};

use super::CacheError;
use super::paths::GIT_DIR_NAME;

type Walker = FilterEntry<walkdir::IntoIter, fn(&DirEntry) -> bool>;

/// Relative paths of every regular file below a content root.
///
/// Files of a directory come before its subdirectories, each group sorted by
/// name. `.git` directories are pruned, symlinked directories are listed but
/// not descended, and each relative path is yielded once.
pub struct CacheFiles {
    root: PathBuf,
    walker: Option<Walker>,
    seen: HashSet<PathBuf>,
}

impl CacheFiles {
    pub(crate) fn new(root: &Path) -> Self {
        // Nothing checked out yet
        let walker = root.is_dir().then(|| {
            WalkDir::new(root)
                .follow_links(false)
                .sort_by(|a, b| {
                    a.file_type()
                        .is_dir()
                        .cmp(&b.file_type().is_dir())
                        .then_with(|| a.file_name().cmp(b.file_name()))
                })
                .into_iter()
                .filter_entry(keep_entry as fn(&DirEntry) -> bool)
        });

        Self {
            root: root.to_path_buf(),
            walker,
            seen: HashSet::new(),
        }
    }
}

fn keep_entry(entry: &DirEntry) -> bool {
    !(entry.depth() > 0 && entry.file_type().is_dir() && entry.file_name() == GIT_DIR_NAME)
}

impl Iterator for CacheFiles {
    type Item = Result<PathBuf, CacheError>;

    fn next(&mut self) -> Option<Self::Item> {
        let walker = self.walker.as_mut()?;

        loop {
            let entry = match walker.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e.into())),
            };

            let file_type = entry.file_type();
            if file_type.is_symlink() {
                match std::fs::metadata(entry.path()) {
                    Ok(target) if target.is_file() => {}
                    Ok(_) => continue,
                    Err(source) => {
                        return Some(Err(CacheError::DanglingSymlink {
                            path: entry.path().to_path_buf(),
                            source,
                        }));
                    }
                }
            } else if !file_type.is_file() {
                continue;
            }

            let Ok(rel_path) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            if self.seen.insert(rel_path.to_path_buf()) {
                return Some(Ok(rel_path.to_path_buf()));
            }
        }
    }
}
