//! Double extraction of jar-wrapped txz binary archives.
//!
//! Upstream publishes each binary build as a jar (a zip container) holding
//! exactly one xz-compressed tarball with the actual binaries. The outer
//! container is opened in memory, the single `.txz` member is identified by
//! extension, and its tar stream is unpacked into the destination
//! directory.
//!
//! Member paths are sanitized before any destination path is resolved: a
//! cleaned path that would escape the destination root fails extraction
//! outright rather than being clamped inside it.

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use std::fs::OpenOptions;
use std::io::{self, Read};
use tar::EntryType;
use tracing::debug;
use xz2::read::XzDecoder;
use zip::ZipArchive;

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

use crate::error::{ManagerError, ManagerResult};
use crate::fsutil;

const LOG_TARGET: &str = "pgdev::manager";

/// Extracts a downloaded jar into `dest`.
pub(crate) fn extract_archive(dest: &Utf8Path, content: &[u8]) -> ManagerResult<()> {
    let mut jar = ZipArchive::new(io::Cursor::new(content)).map_err(ManagerError::Zip)?;

    let inner_names: Vec<String> = jar
        .file_names()
        .filter(|name| !name.contains('/') && name.ends_with(".txz"))
        .map(str::to_owned)
        .collect();
    if inner_names.len() != 1 {
        return Err(ManagerError::ArchiveMalformed(format!(
            "expected 1 txz file, got {}",
            inner_names.len()
        )));
    }
    let inner_name = &inner_names[0];
    debug!(target: LOG_TARGET, member = %inner_name, dest = %dest, "extracting inner tarball");

    let inner = jar.by_name(inner_name).map_err(ManagerError::Zip)?;
    let mut tarball = tar::Archive::new(XzDecoder::new(inner));
    let entries = tarball
        .entries()
        .map_err(|err| ManagerError::io(format!("read tarball {inner_name}"), err))?;
    for entry in entries {
        let entry =
            entry.map_err(|err| ManagerError::io(format!("read tarball {inner_name}"), err))?;
        unpack_entry(dest, entry)?;
    }
    Ok(())
}

fn unpack_entry<R: Read>(dest_root: &Utf8Path, mut entry: tar::Entry<'_, R>) -> ManagerResult<()> {
    let name = {
        let raw_path = entry
            .path()
            .map_err(|err| ManagerError::io("read tarball member path".to_owned(), err))?;
        match raw_path.to_str() {
            Some(name) => name.to_owned(),
            None => {
                return Err(ManagerError::ArchiveMalformed(
                    "tarball member path is not valid utf-8".to_owned(),
                ));
            }
        }
    };
    let dest = entry_destination(dest_root, &name)?;

    let mode = entry.header().mode().unwrap_or(0o755);
    let entry_type = entry.header().entry_type();
    if let Some(parent) = dest.parent() {
        fsutil::create_dir_all_mode(parent, 0o700)
            .map_err(|err| ManagerError::io(format!("create directory {parent}"), err))?;
    }

    match entry_type {
        EntryType::Directory => fsutil::create_dir_all_mode(&dest, mode)
            .map_err(|err| ManagerError::io(format!("create directory {dest}"), err)),
        EntryType::Symlink => {
            let target = entry
                .link_name()
                .map_err(|err| ManagerError::io(format!("read link target of {name}"), err))?
                .ok_or_else(|| {
                    ManagerError::ArchiveMalformed(format!("symlink {name} has no target"))
                })?;
            materialize_symlink(&target, &dest)
                .map_err(|err| ManagerError::io(format!("create symlink {dest}"), err))
        }
        entry_type if entry_type.is_file() => write_entry_file(&dest, mode, &mut entry),
        other => {
            debug!(target: LOG_TARGET, name = %name, kind = ?other, "skipping tarball member");
            Ok(())
        }
    }
}

fn write_entry_file<R: Read>(
    dest: &Utf8Path,
    mode: u32,
    entry: &mut tar::Entry<'_, R>,
) -> ManagerResult<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true);
    #[cfg(unix)]
    options.mode(mode);
    #[cfg(not(unix))]
    let _ = mode;
    let mut file = options
        .open(dest.as_std_path())
        .map_err(|err| ManagerError::io(format!("create file {dest}"), err))?;
    io::copy(entry, &mut file).map_err(|err| ManagerError::io(format!("write file {dest}"), err))?;
    Ok(())
}

#[cfg(unix)]
fn materialize_symlink(target: &std::path::Path, dest: &Utf8Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, dest.as_std_path())
}

#[cfg(not(unix))]
fn materialize_symlink(_target: &std::path::Path, _dest: &Utf8Path) -> io::Result<()> {
    // Symbolic links in upstream archives only alias binaries; without Unix
    // symlink support the aliases are simply absent.
    Ok(())
}

/// Resolves a tarball member name to its destination path.
///
/// The name is cleaned component-wise; `.` and root markers are dropped and
/// `..` pops the path built so far. A `..` with nothing left to pop would
/// escape the destination and fails the whole extraction.
fn entry_destination(dest_root: &Utf8Path, name: &str) -> ManagerResult<Utf8PathBuf> {
    let mut clean = Utf8PathBuf::new();
    for component in Utf8Path::new(name).components() {
        match component {
            Utf8Component::Normal(part) => clean.push(part),
            Utf8Component::CurDir | Utf8Component::RootDir | Utf8Component::Prefix(_) => {}
            Utf8Component::ParentDir => {
                if !clean.pop() {
                    return Err(ManagerError::ArchiveMalformed(format!(
                        "illegal file path: {name}"
                    )));
                }
            }
        }
    }
    Ok(dest_root.join(clean))
}
