//! TCP port selection and per-entry persistence.
//!
//! A server without an explicit port gets one from the OS on first start
//! and keeps it in `config/tcp_port` inside its cache entry, so the
//! connection URL stays stable across restarts of the same entry. The
//! recorded port is trusted on re-open; if an unrelated process grabbed it
//! in the meantime the failure surfaces at startup, which is also where a
//! verification check would have raced anyway.

use camino::Utf8Path;
use std::fs;
use std::io;
use std::net::TcpListener;
use tracing::debug;

use crate::fsutil;

const LOG_TARGET: &str = "pgdev::server";

/// Returns the persisted port for a server entry, allocating one if absent.
pub(crate) fn port_from_file(entry_dir: &Utf8Path) -> io::Result<String> {
    let config_dir = entry_dir.join("config");
    let port_file = config_dir.join("tcp_port");
    match fs::read_to_string(port_file.as_std_path()) {
        Ok(content) => return Ok(content.trim().to_owned()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }
    let port = available_tcp_port(None)?.to_string();
    fsutil::create_dir_all_mode(&config_dir, 0o700)?;
    fsutil::write_file_mode(&port_file, port.as_bytes(), 0o600)?;
    debug!(target: LOG_TARGET, port = %port, file = %port_file, "persisted allocated tcp port");
    Ok(port)
}

/// Asks the OS for a free TCP port.
///
/// A preferred port is tried first and falls back once to an ephemeral
/// port when it cannot be bound.
pub(crate) fn available_tcp_port(preferred: Option<u16>) -> io::Result<u16> {
    let listener = match TcpListener::bind(("127.0.0.1", preferred.unwrap_or(0))) {
        Ok(listener) => listener,
        Err(err) => {
            if preferred.is_some() {
                return available_tcp_port(None);
            }
            return Err(err);
        }
    };
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::tempdir;

    fn entry_dir(temp: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8 path")
    }

    #[test]
    fn allocates_and_persists_a_port() {
        let temp = tempdir().expect("tempdir");
        let dir = entry_dir(&temp);
        let port = port_from_file(&dir).expect("allocate port");
        assert!(port.parse::<u16>().expect("numeric port") > 0);
        let recorded =
            fs::read_to_string(dir.join("config/tcp_port").as_std_path()).expect("port file");
        assert_eq!(recorded, port);
    }

    #[test]
    fn reuses_the_recorded_port() {
        let temp = tempdir().expect("tempdir");
        let dir = entry_dir(&temp);
        let first = port_from_file(&dir).expect("allocate port");
        let second = port_from_file(&dir).expect("reread port");
        assert_eq!(first, second);
    }

    #[test]
    fn trusts_a_preexisting_record() {
        let temp = tempdir().expect("tempdir");
        let dir = entry_dir(&temp);
        fs::create_dir_all(dir.join("config").as_std_path()).expect("create config dir");
        fs::write(dir.join("config/tcp_port").as_std_path(), "5433\n").expect("write record");
        assert_eq!(port_from_file(&dir).expect("read record"), "5433");
    }

    #[test]
    fn preferred_port_in_use_falls_back_to_ephemeral() {
        let taken = TcpListener::bind(("127.0.0.1", 0)).expect("occupy a port");
        let busy = taken.local_addr().expect("addr").port();
        let port = available_tcp_port(Some(busy)).expect("fallback");
        // The fallback may legally return any free port; it only must not
        // fail outright.
        assert!(port > 0);
    }
}
