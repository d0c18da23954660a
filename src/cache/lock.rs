//! Cross-process advisory file locking for cache coordination.
//!
//! Provides shared and exclusive locks over named lockfiles. On Unix the
//! locks are `flock(2)` advisory locks, so they coexist with unrelated
//! processes and are released by the kernel if a holder dies. On non-Unix
//! platforms the lockfiles are still created but no OS lock is taken, so
//! concurrent processes may race.
//!
//! Shared acquisition must tolerate the lockfile not existing yet. Opening
//! for shared access and creating on absence cannot be done atomically
//! across processes, so absence is handled with a bounded retry loop:
//! create the file under a brief exclusive lock, then try the shared open
//! again.

use camino::{Utf8Path, Utf8PathBuf};
use std::fs::{File, OpenOptions};
use std::io;

#[cfg(unix)]
use std::os::unix::fs::DirBuilderExt;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Attempts made to create-then-open a missing lockfile for shared access.
///
/// The create/open race is between processes, so it cannot be eliminated
/// with an in-process mutex; eight rounds is far beyond what contention
/// produces in practice. Callers with unusual needs can pass their own
/// bound to [`LockFile::acquire_shared_with_retries`].
pub const DEFAULT_CREATE_RETRIES: u32 = 8;

/// Guard holding an advisory lock on a lockfile until released or dropped.
#[derive(Debug)]
pub struct LockFile {
    file: Option<File>,
}

impl LockFile {
    /// Acquires an exclusive lock, creating the lockfile if absent.
    ///
    /// Blocks until every shared holder releases.
    ///
    /// # Errors
    ///
    /// Returns an error if the lockfile or its parent directories cannot be
    /// created, or the lock cannot be taken.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use camino::Utf8Path;
    /// use pg_dev_server::cache::LockFile;
    ///
    /// let lockfile = Utf8Path::new("/tmp/pgdev-cache/.locks/v17_4_0");
    /// let _lock = LockFile::acquire_exclusive(lockfile)?;
    /// // Exclusive access to the v17_4_0 entry
    /// # Ok::<(), std::io::Error>(())
    /// ```
    pub fn acquire_exclusive(path: &Utf8Path) -> io::Result<Self> {
        create_parent_dirs(path)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_std_path())?;
        flock(&file, FlockOp::Exclusive)?;
        Ok(Self { file: Some(file) })
    }

    /// Acquires a shared lock, retrying lockfile creation when absent.
    ///
    /// Equivalent to [`LockFile::acquire_shared_with_retries`] with
    /// [`DEFAULT_CREATE_RETRIES`].
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::NotFound`] if the lockfile still cannot be
    /// opened after the creation retries, or any other error from the
    /// filesystem or lock call.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use camino::Utf8Path;
    /// use pg_dev_server::cache::LockFile;
    ///
    /// let lockfile = Utf8Path::new("/tmp/pgdev-cache/.locks/v17_4_0");
    /// let _lock = LockFile::acquire_shared(lockfile)?;
    /// // Shared access whilst other readers hold their own locks
    /// # Ok::<(), std::io::Error>(())
    /// ```
    pub fn acquire_shared(path: &Utf8Path) -> io::Result<Self> {
        Self::acquire_shared_with_retries(path, DEFAULT_CREATE_RETRIES)
    }

    /// Acquires a shared lock with a caller-chosen creation-retry bound.
    ///
    /// Each round creates parent directories, tries a read-only open, and on
    /// absence creates the lockfile under a brief exclusive lock before
    /// trying again. Another process may evict the lockfile between rounds,
    /// which is why a single create is not enough.
    pub fn acquire_shared_with_retries(path: &Utf8Path, retries: u32) -> io::Result<Self> {
        for _ in 0..retries {
            create_parent_dirs(path)?;
            match OpenOptions::new().read(true).open(path.as_std_path()) {
                Ok(file) => {
                    flock(&file, FlockOp::Shared)?;
                    return Ok(Self { file: Some(file) });
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    let mut placeholder = Self::acquire_exclusive(path)?;
                    placeholder.release()?;
                }
                Err(err) => return Err(err),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("lockfile {path} kept vanishing during shared acquisition"),
        ))
    }

    /// Releases the lock. Idempotent: releasing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the unlock syscall fails.
    pub fn release(&mut self) -> io::Result<()> {
        if let Some(file) = self.file.take() {
            flock(&file, FlockOp::Unlock)?;
        }
        Ok(())
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        // Closing the descriptor releases the flock; errors here have no
        // recovery path.
        drop(self.release());
    }
}

#[derive(Debug, Clone, Copy)]
enum FlockOp {
    Shared,
    Exclusive,
    Unlock,
}

#[cfg(unix)]
fn flock(file: &File, op: FlockOp) -> io::Result<()> {
    let flock_arg = match op {
        FlockOp::Shared => libc::LOCK_SH,
        FlockOp::Exclusive => libc::LOCK_EX,
        FlockOp::Unlock => libc::LOCK_UN,
    };
    // SAFETY: the descriptor from `file.as_raw_fd()` is valid because `file`
    // stays borrowed for the duration of the call; nothing closes or moves
    // the descriptor while `flock` runs.
    let result = unsafe { libc::flock(file.as_raw_fd(), flock_arg) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn flock(_file: &File, _op: FlockOp) -> io::Result<()> {
    // Cross-process locking is not supported here; concurrent processes may
    // race on non-Unix platforms.
    Ok(())
}

/// Creates the lockfile's parent directories with permissive mode.
///
/// Lock directories are shared between users running against the same cache
/// root, so they must not be restricted to the creator.
fn create_parent_dirs(path: &Utf8Path) -> io::Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o777);
    builder.create(parent.as_std_path())
}

/// Returns the lockfile path for `key` under `root`'s lock directory.
pub(crate) fn lockfile_path(root: &Utf8Path, key: &str) -> Utf8PathBuf {
    root.join(LOCKS_SUBDIR).join(key)
}

/// Subdirectory within a cache root holding the lockfiles.
pub(crate) const LOCKS_SUBDIR: &str = ".locks";

/// Lockfile name guarding the cache root itself.
pub(crate) const ROOT_LOCK: &str = ".root";
