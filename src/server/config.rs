//! Server configuration, defaults, and the cache fingerprint.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// Postgres version used when a configuration leaves it empty.
pub const DEFAULT_POSTGRES_VERSION: &str = "17.2.0";

/// Server name used when a configuration leaves it empty.
pub const DEFAULT_SERVER_NAME: &str = "default";

/// Directory name under the user cache home holding all dev-server state.
const CACHE_TAG: &str = "pgdev-server";

/// Bytes of the fingerprint digest kept in a server's ID.
const KEY_WIDTH: usize = 10;

/// Configuration for a dev server.
///
/// The serialized form is the `config/config.json` record stored inside
/// each server entry. The cache directory is deliberately not part of the
/// record (or of the fingerprint): the same logical server stays
/// addressable from differently rooted caches, and the loader re-injects
/// the root it read the record from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Version of the postgres binaries to use. Empty means
    /// [`DEFAULT_POSTGRES_VERSION`].
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub postgres_version: String,

    /// Distinguishes servers that otherwise share a configuration. Empty
    /// means [`DEFAULT_SERVER_NAME`].
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Additional options passed to postgres on startup.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub postgres_options: Vec<String>,

    /// Additional arguments passed to initdb when creating the cluster.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub init_db_args: Vec<String>,

    /// Port for the cluster. Empty picks a random port, persisted inside
    /// the server entry.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub port: String,

    /// Root directory of the cache. Empty means the user cache home joined
    /// with the project tag.
    #[serde(skip)]
    pub cache_dir: Utf8PathBuf,
}

impl ServerConfig {
    /// Returns the configuration with empty fields replaced by defaults.
    #[must_use]
    pub(crate) fn with_defaults(mut self) -> Self {
        if self.postgres_version.is_empty() {
            self.postgres_version = DEFAULT_POSTGRES_VERSION.to_owned();
        }
        if self.name.is_empty() {
            self.name = DEFAULT_SERVER_NAME.to_owned();
        }
        if self.cache_dir.as_str().is_empty() {
            self.cache_dir = default_cache_root();
        }
        self
    }

    /// The server's fingerprint: its key in the server cache.
    ///
    /// Stable across runs and machines for semantically equal
    /// configurations. The fingerprint function is a compatibility
    /// contract; changing it strands every existing cache entry.
    #[must_use]
    pub(crate) fn cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        for (field, value) in [
            ("Name", self.name.clone()),
            ("Port", self.port.clone()),
            ("InitDBArgs", self.init_db_args.join("\0")),
            ("Postgres", self.postgres_version.clone()),
            ("PostgresOptions", self.postgres_options.join("\0")),
        ] {
            hasher.update(field.as_bytes());
            hasher.update([0u8]);
            hasher.update(value.as_bytes());
        }
        let digest = hasher.finalize();
        let hex = format!("{digest:x}");
        format!("{}-{}", self.name, &hex[..KEY_WIDTH * 2])
    }
}

/// Resolves the default cache root.
///
/// The resolution order is:
///
/// 1. `PGDEV_CACHE_DIR` environment variable if set and valid UTF-8
/// 2. `$XDG_CACHE_HOME/pgdev-server` if `XDG_CACHE_HOME` is set
/// 3. `~/.cache/pgdev-server` as fallback
/// 4. `/tmp/pgdev-server` as last resort
#[must_use]
pub fn default_cache_root() -> Utf8PathBuf {
    if let Some(dir) = resolve_from_env() {
        return dir;
    }
    if let Some(dir) = resolve_from_xdg_cache() {
        return dir;
    }
    if let Some(dir) = resolve_from_home() {
        return dir;
    }
    Utf8PathBuf::from("/tmp").join(CACHE_TAG)
}

fn resolve_from_env() -> Option<Utf8PathBuf> {
    let raw = std::env::var("PGDEV_CACHE_DIR").ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Utf8PathBuf::from_path_buf(PathBuf::from(trimmed)).ok()
}

fn resolve_from_xdg_cache() -> Option<Utf8PathBuf> {
    let raw = std::env::var("XDG_CACHE_HOME").ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let path = Utf8PathBuf::from_path_buf(PathBuf::from(trimmed)).ok()?;
    Some(path.join(CACHE_TAG))
}

fn resolve_from_home() -> Option<Utf8PathBuf> {
    let home = dirs::home_dir()?;
    let path = Utf8PathBuf::from_path_buf(home).ok()?;
    Some(path.join(".cache").join(CACHE_TAG))
}
