//! Keyed blob-directory cache with cross-process reader/writer coordination.
//!
//! Every entry is a directory owned by the cache and guarded by a pair of
//! advisory locks: a per-key lockfile plus a root lockfile shared by all
//! per-entry operations. Readers hold both shared for the lifetime of a
//! [`Lease`]; populators and evictors take the key lock exclusively, so a
//! reader never observes an entry mid-populate and eviction waits for every
//! in-flight reader.
//!
//! Entry validity is decided by a caller-supplied validator, consulted both
//! before and after population. A populator therefore may rely on the
//! validator as its correctness oracle: a half-written entry simply fails
//! validation on the next read and is rebuilt.

use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io;
use tracing::debug;

use super::lock::{lockfile_path, LockFile, ROOT_LOCK};
use crate::error::{join_release, CacheError, CacheResult};
use crate::fsutil;

const LOG_TARGET: &str = "pgdev::cache";

/// Decides whether an entry directory is currently usable.
pub type ValidateFn<'a> = dyn Fn(&Utf8Path) -> color_eyre::Result<()> + 'a;

/// Produces a valid entry inside a fresh or cleaned entry directory.
pub type PopulateFn<'a> = dyn Fn(&Utf8Path) -> color_eyre::Result<()> + 'a;

/// A directory cache rooted at a single filesystem path.
///
/// Keys name entry directories directly under the root; lockfiles live in a
/// hidden `.locks/` subdirectory. Two caches with the same root, in the same
/// process or not, coordinate purely through those lockfiles.
#[derive(Debug, Clone)]
pub struct DirCache {
    root: Utf8PathBuf,
}

/// A read lease on one cache entry.
///
/// Holds a shared lock on the entry's key and on the cache root. The entry
/// directory's contents may be relied on until [`Lease::release`] is called;
/// afterwards they may change without warning. Dropping the lease releases
/// the locks best-effort, but callers that care about unlock errors should
/// release explicitly on every path.
#[derive(Debug)]
pub struct Lease {
    dir: Utf8PathBuf,
    key_lock: LockFile,
    root_lock: LockFile,
}

impl Lease {
    /// Path of the leased entry directory.
    #[must_use]
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Releases the lease, key lock before root lock.
    ///
    /// # Errors
    ///
    /// Returns the first unlock error; both unlocks are always attempted.
    pub fn release(mut self) -> io::Result<()> {
        let key = self.key_lock.release();
        let root = self.root_lock.release();
        key.and(root)
    }
}

impl DirCache {
    /// Creates a cache over `root`. The directory is created lazily by the
    /// first operation.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The cache root directory.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Returns a lease on the entry for `key`, populating it if necessary.
    ///
    /// The entry is validated first under a shared lease. On failure with a
    /// populator present, the lease is dropped, the entry is (re)built under
    /// an exclusive lock, and validation runs once more under a fresh shared
    /// lease. A second validation failure is surfaced, not retried.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidKey`] for syntactically invalid keys;
    /// [`CacheError::EntryMissing`] or the validator's error when no
    /// populator is supplied; populate and lock failures otherwise.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use camino::Utf8Path;
    /// use pg_dev_server::cache::DirCache;
    ///
    /// # fn main() -> color_eyre::Result<()> {
    /// let cache = DirCache::new("/tmp/pgdev-cache");
    /// let populate = |dir: &Utf8Path| -> color_eyre::Result<()> {
    ///     std::fs::write(dir.join("payload.txt").as_std_path(), "data")?;
    ///     Ok(())
    /// };
    /// let lease = cache.dir("payload", None, Some(&populate))?;
    /// println!("entry lives at {}", lease.dir());
    /// lease.release()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn dir(
        &self,
        key: &str,
        validate: Option<&ValidateFn<'_>>,
        populate: Option<&PopulateFn<'_>>,
    ) -> CacheResult<Lease> {
        let key = parse_key(key)?;
        let lease = self.shared_lease(key)?;
        let validate_err = match validate_dir(lease.dir(), validate) {
            Ok(()) => {
                debug!(target: LOG_TARGET, key, dir = %lease.dir(), "cache hit");
                return Ok(lease);
            }
            Err(err) => err,
        };
        let Some(populate) = populate else {
            return join_release(Err(validate_err), lease.release());
        };
        debug!(target: LOG_TARGET, key, "cache miss");
        lease.release().map_err(CacheError::Release)?;
        self.populate_key(key, validate, populate)?;
        let lease = self.shared_lease(key)?;
        match validate_dir(lease.dir(), validate) {
            Ok(()) => Ok(lease),
            Err(err) => join_release(Err(err), lease.release()),
        }
    }

    /// Removes the entry for `key`, waiting for in-flight readers.
    ///
    /// Succeeds if the entry is already absent. The exclusive key lock is
    /// released *before* the lockfile itself is deleted; some platforms
    /// refuse to delete a file that is still locked.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidKey`], [`CacheError::NotADirectory`] when the
    /// entry path is a file, or filesystem and lock failures.
    pub fn evict(&self, key: &str) -> CacheResult<()> {
        let key = parse_key(key)?;
        let mut root_lock = self.lock_root_shared()?;
        let mut key_lock = match LockFile::acquire_exclusive(&self.lockfile(key)) {
            Ok(lock) => lock,
            Err(err) => {
                return join_release(Err(CacheError::LockFailed(err)), root_lock.release());
            }
        };

        let dir = self.entry_dir(key);
        let removed = match remove_entry_dir(&dir) {
            Ok(removed) => removed,
            Err(err) => {
                let release = key_lock.release().and(root_lock.release());
                return join_release(Err(err), release);
            }
        };
        key_lock.release().map_err(CacheError::Release)?;
        root_lock.release().map_err(CacheError::Release)?;
        if removed {
            debug!(target: LOG_TARGET, key, "evicted cache entry");
            let lockfile = self.lockfile(key);
            fs::remove_file(lockfile.as_std_path())
                .map_err(|err| CacheError::io(format!("remove lockfile {lockfile}"), err))?;
        }
        Ok(())
    }

    /// Calls `walk_fn` with a shared lease on every entry, in key order.
    ///
    /// Names that fail key validation are skipped silently, which is how the
    /// `.locks/` directory stays hidden. Walking stops at the first callback
    /// error.
    ///
    /// # Errors
    ///
    /// Propagates the first callback error as [`CacheError::Walk`], or any
    /// lock and filesystem failure.
    pub fn walk(
        &self,
        mut walk_fn: impl FnMut(&Utf8Path) -> color_eyre::Result<()>,
    ) -> CacheResult<()> {
        let mut root_lock = self.lock_root_shared()?;
        let result = self.walk_locked(&mut walk_fn);
        join_release(result, root_lock.release())
    }

    fn walk_locked(
        &self,
        walk_fn: &mut dyn FnMut(&Utf8Path) -> color_eyre::Result<()>,
    ) -> CacheResult<()> {
        let entries = fs::read_dir(self.root.as_std_path())
            .map_err(|err| CacheError::io(format!("read cache root {}", self.root), err))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|err| CacheError::io(format!("read cache root {}", self.root), err))?;
            if let Ok(name) = entry.file_name().into_string() {
                if parse_key(&name).is_ok() {
                    names.push(name);
                }
            }
        }
        names.sort_unstable();
        for name in names {
            let lease = self.shared_lease(&name)?;
            let result = walk_fn(lease.dir()).map_err(CacheError::Walk);
            join_release(result, lease.release())?;
        }
        Ok(())
    }

    /// Builds or repairs the entry for `key` under an exclusive lock.
    ///
    /// If another writer already produced a valid entry, this is a no-op. An
    /// existing invalid entry is removed wholesale before the populator runs
    /// so partial state never leaks into the fresh build.
    fn populate_key(
        &self,
        key: &str,
        validate: Option<&ValidateFn<'_>>,
        populate: &PopulateFn<'_>,
    ) -> CacheResult<()> {
        let lease = self.exclusive_lease(key)?;
        let result = populate_locked(lease.dir(), validate, populate);
        join_release(result, lease.release())
    }

    fn shared_lease(&self, key: &str) -> CacheResult<Lease> {
        let mut root_lock = self.lock_root_shared()?;
        match LockFile::acquire_shared(&self.lockfile(key)) {
            Ok(key_lock) => Ok(Lease {
                dir: self.entry_dir(key),
                key_lock,
                root_lock,
            }),
            Err(err) => {
                join_release(Err(CacheError::LockFailed(err)), root_lock.release())
            }
        }
    }

    fn exclusive_lease(&self, key: &str) -> CacheResult<Lease> {
        let mut root_lock = self.lock_root_shared()?;
        match LockFile::acquire_exclusive(&self.lockfile(key)) {
            Ok(key_lock) => Ok(Lease {
                dir: self.entry_dir(key),
                key_lock,
                root_lock,
            }),
            Err(err) => {
                join_release(Err(CacheError::LockFailed(err)), root_lock.release())
            }
        }
    }

    fn lock_root_shared(&self) -> CacheResult<LockFile> {
        LockFile::acquire_shared(&self.lockfile(ROOT_LOCK)).map_err(CacheError::LockFailed)
    }

    fn lockfile(&self, key: &str) -> Utf8PathBuf {
        lockfile_path(&self.root, key)
    }

    fn entry_dir(&self, key: &str) -> Utf8PathBuf {
        self.root.join(key)
    }
}

/// Removes a cache root and everything under it. The nuclear option.
///
/// Takes the root lock exclusively, which waits for every per-entry
/// operation in flight, then releases it before deleting the tree (locked
/// files cannot be deleted on some platforms).
///
/// # Errors
///
/// Returns lock or filesystem failures.
pub fn remove_root(root: &Utf8Path) -> CacheResult<()> {
    let mut root_lock = LockFile::acquire_exclusive(&lockfile_path(root, ROOT_LOCK))
        .map_err(CacheError::LockFailed)?;
    root_lock.release().map_err(CacheError::Release)?;
    fs::remove_dir_all(root.as_std_path())
        .map_err(|err| CacheError::io(format!("remove cache root {root}"), err))
}

fn populate_locked(
    dir: &Utf8Path,
    validate: Option<&ValidateFn<'_>>,
    populate: &PopulateFn<'_>,
) -> CacheResult<()> {
    match fs::metadata(dir.as_std_path()) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(CacheError::io(format!("stat {dir}"), err)),
        Ok(meta) if meta.is_dir() => {
            if validate_dir(dir, validate).is_ok() {
                // Another writer won the populate race.
                debug!(target: LOG_TARGET, dir = %dir, "entry already valid, skipping populate");
                return Ok(());
            }
            fs::remove_dir_all(dir.as_std_path())
                .map_err(|err| CacheError::io(format!("remove invalid entry {dir}"), err))?;
        }
        Ok(_) => {
            // A file squatting on the entry path counts as invalid.
            fs::remove_file(dir.as_std_path())
                .map_err(|err| CacheError::io(format!("remove invalid entry {dir}"), err))?;
        }
    }
    fsutil::create_dir_all_mode(dir, 0o777)
        .map_err(|err| CacheError::io(format!("create entry {dir}"), err))?;
    debug!(target: LOG_TARGET, dir = %dir, "populating cache entry");
    populate(dir).map_err(CacheError::Populate)
}

fn validate_dir(dir: &Utf8Path, validate: Option<&ValidateFn<'_>>) -> CacheResult<()> {
    let meta = match fs::metadata(dir.as_std_path()) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(CacheError::EntryMissing);
        }
        Err(err) => return Err(CacheError::io(format!("stat {dir}"), err)),
        Ok(meta) => meta,
    };
    if !meta.is_dir() {
        return Err(CacheError::NotADirectory);
    }
    match validate {
        None => Ok(()),
        Some(validate) => validate(dir).map_err(CacheError::Invalid),
    }
}

/// Removes the entry directory, reporting whether anything was removed.
fn remove_entry_dir(dir: &Utf8Path) -> CacheResult<bool> {
    let meta = match fs::metadata(dir.as_std_path()) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(CacheError::io(format!("stat {dir}"), err)),
        Ok(meta) => meta,
    };
    if !meta.is_dir() {
        return Err(CacheError::NotADirectory);
    }
    fs::remove_dir_all(dir.as_std_path())
        .map_err(|err| CacheError::io(format!("remove entry {dir}"), err))?;
    Ok(true)
}

/// Checks that `key` is usable as an entry name.
///
/// Keys must be non-empty base names without path separators; names
/// starting with a dot are reserved for internal use.
fn parse_key(key: &str) -> CacheResult<&str> {
    if key.is_empty()
        || key.starts_with('.')
        || key.contains('/')
        || key.contains(std::path::MAIN_SEPARATOR)
    {
        return Err(CacheError::InvalidKey);
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_eyre::eyre::eyre;
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn cache_at(temp: &tempfile::TempDir) -> DirCache {
        DirCache::new(Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8 path"))
    }

    fn write_entry_file(cache: &DirCache, key: &str, name: &str, content: &str) {
        let dir = cache.root().join(key);
        fs::create_dir_all(dir.as_std_path()).expect("create entry dir");
        fs::write(dir.join(name).as_std_path(), content).expect("write entry file");
    }

    fn file_validator(
        name: &'static str,
        want: &'static str,
    ) -> impl Fn(&Utf8Path) -> color_eyre::Result<()> {
        move |dir| {
            let content = fs::read_to_string(dir.join(name).as_std_path())?;
            if content != want {
                return Err(eyre!("invalid entry"));
            }
            Ok(())
        }
    }

    fn file_populator(
        name: &'static str,
        content: &'static str,
    ) -> impl Fn(&Utf8Path) -> color_eyre::Result<()> {
        move |dir| {
            fs::write(dir.join(name).as_std_path(), content)?;
            Ok(())
        }
    }

    #[test]
    fn dir_reads_existing_entry() {
        let temp = tempdir().expect("tempdir");
        let cache = cache_at(&temp);
        write_entry_file(&cache, "foo", "foo.txt", "bar");
        let validate = file_validator("foo.txt", "bar");
        let lease = cache.dir("foo", Some(&validate), None).expect("lease");
        let content =
            fs::read_to_string(lease.dir().join("foo.txt").as_std_path()).expect("read file");
        assert_eq!(content, "bar");
        lease.release().expect("release");
    }

    #[test]
    fn dir_reads_existing_entry_without_validator() {
        let temp = tempdir().expect("tempdir");
        let cache = cache_at(&temp);
        write_entry_file(&cache, "foo", "foo.txt", "bar");
        let lease = cache.dir("foo", None, None).expect("lease");
        assert!(lease.dir().join("foo.txt").exists());
        lease.release().expect("release");
    }

    #[test]
    fn dir_populates_missing_entry() {
        let temp = tempdir().expect("tempdir");
        let cache = cache_at(&temp);
        let validate = file_validator("foo.txt", "bar");
        let populate = file_populator("foo.txt", "bar");
        let lease = cache
            .dir("foo", Some(&validate), Some(&populate))
            .expect("lease");
        let content =
            fs::read_to_string(lease.dir().join("foo.txt").as_std_path()).expect("read file");
        assert_eq!(content, "bar");
        lease.release().expect("release");
    }

    #[test]
    fn dir_invokes_populator_at_most_once_for_valid_entry() {
        let temp = tempdir().expect("tempdir");
        let cache = cache_at(&temp);
        let calls = AtomicUsize::new(0);
        let validate = file_validator("foo.txt", "bar");
        let populate = |dir: &Utf8Path| -> color_eyre::Result<()> {
            calls.fetch_add(1, Ordering::SeqCst);
            fs::write(dir.join("foo.txt").as_std_path(), "bar")?;
            Ok(())
        };
        for _ in 0..2 {
            let lease = cache
                .dir("foo", Some(&validate), Some(&populate))
                .expect("lease");
            lease.release().expect("release");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dir_repopulates_invalid_entry_and_drops_extraneous_files() {
        let temp = tempdir().expect("tempdir");
        let cache = cache_at(&temp);
        write_entry_file(&cache, "foo", "foo.txt", "invalid");
        write_entry_file(&cache, "foo", "extra.txt", "extra");
        let validate = file_validator("foo.txt", "bar");
        let populate = file_populator("foo.txt", "bar");
        let lease = cache
            .dir("foo", Some(&validate), Some(&populate))
            .expect("lease");
        let content =
            fs::read_to_string(lease.dir().join("foo.txt").as_std_path()).expect("read file");
        assert_eq!(content, "bar");
        assert!(
            !lease.dir().join("extra.txt").exists(),
            "extraneous file should be removed by repopulation"
        );
        lease.release().expect("release");
    }

    #[test]
    fn dir_without_populator_fails_on_missing_entry() {
        let temp = tempdir().expect("tempdir");
        let cache = cache_at(&temp);
        let validate = file_validator("foo.txt", "bar");
        let err = cache
            .dir("foo", Some(&validate), None)
            .expect_err("missing entry");
        assert!(matches!(err, CacheError::EntryMissing), "got {err:?}");
    }

    #[test]
    fn dir_without_populator_surfaces_validator_error() {
        let temp = tempdir().expect("tempdir");
        let cache = cache_at(&temp);
        write_entry_file(&cache, "foo", "foo.txt", "invalid");
        let validate = file_validator("foo.txt", "bar");
        let err = cache
            .dir("foo", Some(&validate), None)
            .expect_err("invalid entry");
        assert!(matches!(err, CacheError::Invalid(_)), "got {err:?}");
        assert_eq!(err.to_string(), "invalid entry");
    }

    #[test]
    fn dir_fails_when_populated_content_is_invalid() {
        let temp = tempdir().expect("tempdir");
        let cache = cache_at(&temp);
        let validate = file_validator("foo.txt", "bar");
        let noop = |_: &Utf8Path| -> color_eyre::Result<()> { Ok(()) };
        let err = cache
            .dir("foo", Some(&validate), Some(&noop))
            .expect_err("populated content stays invalid");
        assert!(matches!(err, CacheError::Invalid(_)), "got {err:?}");
    }

    #[test]
    fn dir_surfaces_populator_error() {
        let temp = tempdir().expect("tempdir");
        let cache = cache_at(&temp);
        let validate = file_validator("foo.txt", "bar");
        let populate =
            |_: &Utf8Path| -> color_eyre::Result<()> { Err(eyre!("populate exploded")) };
        let err = cache
            .dir("foo", Some(&validate), Some(&populate))
            .expect_err("populator error");
        assert!(matches!(err, CacheError::Populate(_)), "got {err:?}");
        assert_eq!(err.to_string(), "populate exploded");
    }

    #[test]
    fn dir_fails_when_entry_is_a_file() {
        let temp = tempdir().expect("tempdir");
        let cache = cache_at(&temp);
        fs::create_dir_all(cache.root().as_std_path()).expect("create root");
        fs::write(cache.root().join("foo.txt").as_std_path(), "bar").expect("write file");
        let err = cache.dir("foo.txt", None, None).expect_err("file entry");
        assert!(matches!(err, CacheError::NotADirectory), "got {err:?}");
    }

    #[test]
    fn dir_allows_multiple_read_leases() {
        let temp = tempdir().expect("tempdir");
        let cache = cache_at(&temp);
        let validate = file_validator("foo.txt", "bar");
        let populate = file_populator("foo.txt", "bar");
        let lease1 = cache
            .dir("foo", Some(&validate), Some(&populate))
            .expect("lease 1");
        let lease2 = cache
            .dir("foo", Some(&validate), Some(&populate))
            .expect("lease 2");
        assert_eq!(lease1.dir(), lease2.dir());
        lease1.release().expect("release 1");
        lease2.release().expect("release 2");
    }

    #[test]
    fn dir_release_then_reacquire() {
        let temp = tempdir().expect("tempdir");
        let cache = cache_at(&temp);
        let validate = file_validator("foo.txt", "bar");
        let populate = file_populator("foo.txt", "bar");
        let lease = cache
            .dir("foo", Some(&validate), Some(&populate))
            .expect("first lease");
        lease.release().expect("release");
        let lease = cache
            .dir("foo", Some(&validate), Some(&populate))
            .expect("second lease");
        lease.release().expect("release");
    }

    #[test]
    fn dir_retries_validation_only_once_after_populate() {
        let temp = tempdir().expect("tempdir");
        let cache = cache_at(&temp);
        write_entry_file(&cache, "foo", "foo.txt", "bar");
        let calls = AtomicUsize::new(0);
        let flaky_validate = |dir: &Utf8Path| -> color_eyre::Result<()> {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(eyre!("transient"));
            }
            file_validator("foo.txt", "bar")(dir)
        };
        let populate = file_populator("foo.txt", "bar");
        let lease = cache
            .dir("foo", Some(&flaky_validate), Some(&populate))
            .expect("entry becomes valid on revalidation");
        lease.release().expect("release");
    }

    #[rstest]
    #[case::empty("")]
    #[case::dotted(".foo")]
    #[case::rooted("/foo")]
    #[case::parent("../foo")]
    #[case::trailing_slash("foo/")]
    #[case::traversal("foo/../bar")]
    fn dir_rejects_invalid_keys(#[case] key: &str) {
        let temp = tempdir().expect("tempdir");
        let cache = cache_at(&temp);
        let err = cache.dir(key, None, None).expect_err("invalid key");
        assert!(matches!(err, CacheError::InvalidKey), "got {err:?}");
    }

    #[rstest]
    #[case::empty("")]
    #[case::dotted(".foo")]
    #[case::rooted("/foo")]
    #[case::parent("../foo")]
    #[case::trailing_slash("foo/")]
    #[case::traversal("foo/../bar")]
    fn evict_rejects_invalid_keys(#[case] key: &str) {
        let temp = tempdir().expect("tempdir");
        let cache = cache_at(&temp);
        let err = cache.evict(key).expect_err("invalid key");
        assert!(matches!(err, CacheError::InvalidKey), "got {err:?}");
    }

    #[test]
    fn evict_is_a_noop_for_missing_entry() {
        let temp = tempdir().expect("tempdir");
        let cache = cache_at(&temp);
        cache.evict("foo").expect("evicting nothing succeeds");
    }

    #[test]
    fn evict_removes_existing_entry() {
        let temp = tempdir().expect("tempdir");
        let cache = cache_at(&temp);
        let validate = file_validator("foo.txt", "bar");
        let populate = file_populator("foo.txt", "bar");
        let lease = cache
            .dir("foo", Some(&validate), Some(&populate))
            .expect("lease");
        lease.release().expect("release");
        assert!(cache.root().join("foo/foo.txt").exists());

        cache.evict("foo").expect("evict");
        assert!(!cache.root().join("foo").exists());
        let err = cache.dir("foo", None, None).expect_err("entry gone");
        assert!(matches!(err, CacheError::EntryMissing), "got {err:?}");
    }

    #[test]
    fn evict_fails_when_entry_is_a_file() {
        let temp = tempdir().expect("tempdir");
        let cache = cache_at(&temp);
        fs::create_dir_all(cache.root().as_std_path()).expect("create root");
        fs::write(cache.root().join("foo.txt").as_std_path(), "bar").expect("write file");
        let err = cache.evict("foo.txt").expect_err("file entry");
        assert!(matches!(err, CacheError::NotADirectory), "got {err:?}");
    }

    #[test]
    fn walk_visits_nothing_in_empty_cache() {
        let temp = tempdir().expect("tempdir");
        let cache = cache_at(&temp);
        cache
            .walk(|dir| Err(eyre!("should not be called for {dir}")))
            .expect("empty walk");
    }

    #[test]
    fn walk_visits_entries_in_key_order() {
        let temp = tempdir().expect("tempdir");
        let cache = cache_at(&temp);
        write_entry_file(&cache, "foo", "foo.txt", "bar");
        write_entry_file(&cache, "bar", "bar.txt", "foo");
        let mut keys = Vec::new();
        cache
            .walk(|dir| {
                keys.push(dir.file_name().expect("entry name").to_owned());
                Ok(())
            })
            .expect("walk");
        assert_eq!(keys, ["bar", "foo"]);
    }

    #[test]
    fn walk_stops_on_first_error() {
        let temp = tempdir().expect("tempdir");
        let cache = cache_at(&temp);
        write_entry_file(&cache, "foo", "foo.txt", "bar");
        write_entry_file(&cache, "bar", "bar.txt", "foo");
        let err = cache
            .walk(|dir| {
                if dir.file_name() == Some("bar") {
                    return Err(eyre!("boom"));
                }
                Ok(())
            })
            .expect_err("walk error");
        assert!(matches!(err, CacheError::Walk(_)), "got {err:?}");
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn remove_root_deletes_everything() {
        let temp = tempdir().expect("tempdir");
        let cache = cache_at(&temp);
        write_entry_file(&cache, "foo", "foo.txt", "bar");
        let lease = cache.dir("foo", None, None).expect("lease");
        lease.release().expect("release");

        remove_root(cache.root()).expect("remove root");
        assert!(!cache.root().exists());
    }
}
