//! Mode-aware filesystem helpers shared across the crate.
//!
//! Cache roots and lock directories are world-accessible so multiple users
//! can share a cache; config material written next to a cluster is
//! restricted to the owner. On non-Unix platforms the modes are advisory
//! and silently ignored.

use camino::Utf8Path;
use std::fs::{DirBuilder, OpenOptions};
use std::io::{self, Write};

#[cfg(unix)]
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};

/// Creates `path` and any missing parents with the given POSIX mode.
pub(crate) fn create_dir_all_mode(path: &Utf8Path, mode: u32) -> io::Result<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(mode);
    #[cfg(not(unix))]
    let _ = mode;
    builder.create(path.as_std_path())
}

/// Writes `contents` to `path`, creating or truncating it with the given
/// POSIX mode.
pub(crate) fn write_file_mode(path: &Utf8Path, contents: &[u8], mode: u32) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(mode);
    #[cfg(not(unix))]
    let _ = mode;
    let mut file = options.open(path.as_std_path())?;
    file.write_all(contents)
}
