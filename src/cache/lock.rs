use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use fs2::FileExt;

/// A guard that holds the exclusive lock on one branch's cache.
/// Lock is released when dropped.
///
/// The lock is an OS-level `flock`, so a holder that dies releases it
/// with its file descriptor.
#[derive(Debug)]
pub struct CacheLock {
    file: File,
}

impl CacheLock {
    /// Acquire the exclusive lock, blocking until it is available.
    /// Creates the lock file and parent dirs if needed.
    pub fn acquire(lock_path: &Path) -> io::Result<Self> {
        let file = open_lock_file(lock_path)?;
        file.lock_exclusive()?;
        Ok(Self { file })
    }

    /// Try to acquire lock without blocking.
    /// Returns None if lock is held by another holder.
    #[cfg(test)]
    pub fn try_acquire(lock_path: &Path) -> io::Result<Option<Self>> {
        let file = open_lock_file(lock_path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { file })),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn open_lock_file(lock_path: &Path) -> io::Result<File> {
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    #[test]
    fn test_acquire_creates_lock_file() {
        let dir = tempdir().unwrap();
        let lock_path = dir.path().join("master").join("cache.master.lock");

        assert!(!lock_path.exists());

        let lock = CacheLock::acquire(&lock_path).unwrap();

        assert!(lock_path.exists());

        drop(lock);
    }

    #[test]
    fn test_try_acquire_returns_none_when_locked() {
        let dir = tempdir().unwrap();
        let lock_path = dir.path().join("cache.master.lock");

        let _lock = CacheLock::acquire(&lock_path).unwrap();
        let result = CacheLock::try_acquire(&lock_path).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_lock_released_on_drop() {
        let dir = tempdir().unwrap();
        let lock_path = dir.path().join("cache.master.lock");

        {
            let _lock = CacheLock::acquire(&lock_path).unwrap();
            assert!(CacheLock::try_acquire(&lock_path).unwrap().is_none());
        }
        let lock = CacheLock::try_acquire(&lock_path).unwrap();
        assert!(lock.is_some());
    }

    #[test]
    fn test_separate_lock_files_are_independent() {
        let dir = tempdir().unwrap();
        let master = dir.path().join("master").join("cache.master.lock");
        let devel = dir.path().join("devel").join("cache.devel.lock");

        let _master = CacheLock::acquire(&master).unwrap();
        assert!(CacheLock::try_acquire(&devel).unwrap().is_some());
    }

    #[test]
    fn test_acquire_blocks_until_released() {
        let dir = tempdir().unwrap();
        let lock_path = Arc::new(dir.path().join("cache.master.lock"));
        let barrier = Arc::new(Barrier::new(2));

        let lock_path_clone = Arc::clone(&lock_path);
        let barrier_clone = Arc::clone(&barrier);

        let holder = thread::spawn(move || {
            let lock = CacheLock::acquire(&lock_path_clone).unwrap();
            barrier_clone.wait();
            thread::sleep(Duration::from_millis(200));
            drop(lock);
        });

        let waiter = thread::spawn(move || {
            barrier.wait();
            let start = Instant::now();
            let lock = CacheLock::acquire(&lock_path).unwrap();
            let waited = start.elapsed();
            drop(lock);
            waited
        });

        holder.join().unwrap();
        let waited = waiter.join().unwrap();
        assert!(
            waited >= Duration::from_millis(100),
            "acquire returned after {:?} while the lock was held",
            waited
        );
    }
}
