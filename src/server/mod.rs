//! Lifecycle engine for per-developer postgres dev servers.
//!
//! A [`Server`] is addressed by the fingerprint of its configuration and
//! lives in one server-cache entry holding the config record, the
//! initialized cluster, its log file, and the persisted port:
//!
//! ```text
//! {cache}/server/{name}-{hex}/
//!   config/config.json
//!   config/tcp_port
//!   data/...
//!   log/server.log
//! ```
//!
//! Every operation runs under a shared lease on that entry; initializing
//! the cluster happens in the cache populator, which in turn leases the
//! binary entry for the configured version while `initdb` runs.

mod config;
mod port;
mod status;

pub use config::{default_cache_root, ServerConfig, DEFAULT_POSTGRES_VERSION, DEFAULT_SERVER_NAME};
pub use status::Status;

use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::process::Command;
use std::sync::Arc;
use tracing::info;

use crate::cache::{DirCache, Lease};
use crate::error::{CacheError, ServerError, ServerResult};
use crate::exec;
use crate::fsutil;
use crate::manager::{BinaryManager, ManagerConfig};

const LOG_TARGET: &str = "pgdev::server";

/// Exit code `pg_ctl status` uses for "no server running".
const PG_CTL_STATUS_STOPPED: i32 = 3;

/// A postgres dev server bound to one cache entry.
#[derive(Debug, Clone)]
pub struct Server {
    config: ServerConfig,
    cache: DirCache,
    manager: Arc<BinaryManager>,
}

impl Server {
    /// Builds a server, applying defaults to the configuration once.
    ///
    /// The binary manager shares the server's cache root under a
    /// `postgres/` suffix, so binaries are reused across every server of
    /// the same version.
    ///
    /// # Errors
    ///
    /// Returns an error if the default binary manager cannot be built.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let config = config.with_defaults();
        let manager = BinaryManager::new(ManagerConfig {
            cache_dir: config.cache_dir.join("postgres"),
            ..ManagerConfig::default()
        })?;
        Ok(Self::with_manager(config, Arc::new(manager)))
    }

    /// Builds a server around an existing binary manager.
    ///
    /// Use this to share one manager between servers or to inject a manager
    /// with a custom repository or HTTP client.
    #[must_use]
    pub fn with_manager(config: ServerConfig, manager: Arc<BinaryManager>) -> Self {
        let config = config.with_defaults();
        let cache = DirCache::new(config.cache_dir.join("server"));
        Self {
            config,
            cache,
            manager,
        }
    }

    /// Reports the cluster's status via `pg_ctl status`.
    ///
    /// # Errors
    ///
    /// Fails if the entry cannot be populated or the control binary cannot
    /// be launched. A non-zero `pg_ctl` exit is a status, not an error.
    pub fn status(&self) -> ServerResult<Status> {
        self.with_lease(|entry_dir| self.status_at(entry_dir))
    }

    /// Starts the server if it is not already running.
    ///
    /// # Errors
    ///
    /// Fails with [`ServerError::InvalidState`] when the cluster is neither
    /// running nor stopped, and with [`ServerError::Subprocess`] carrying
    /// the combined output when `pg_ctl start` exits non-zero.
    pub fn start(&self) -> ServerResult<()> {
        self.with_lease(|entry_dir| self.start_at(entry_dir))
    }

    /// Stops the server if it is running.
    ///
    /// # Errors
    ///
    /// Fails when `pg_ctl stop` exits non-zero or cannot be launched.
    pub fn stop(&self) -> ServerResult<()> {
        self.with_lease(|entry_dir| self.stop_at(entry_dir))
    }

    /// The current connection URL of this server.
    ///
    /// With dynamic ports the URL may change each time the server starts
    /// from a stopped state in a fresh entry.
    ///
    /// # Errors
    ///
    /// Fails if a port cannot be determined.
    pub fn connection_url(&self) -> ServerResult<String> {
        let port = self.port()?;
        Ok(format!("postgresql://postgres@localhost:{port}"))
    }

    /// Path of the server's log file inside its cache entry.
    ///
    /// The file itself is created on first start.
    ///
    /// # Errors
    ///
    /// Fails if the entry cannot be populated.
    pub fn logfile(&self) -> ServerResult<Utf8PathBuf> {
        self.with_lease(|entry_dir| Ok(logfile_path(entry_dir)))
    }

    /// The effective configuration after defaults.
    #[must_use]
    pub fn config(&self) -> ServerConfig {
        self.config.clone()
    }

    /// The server's unique identifier within the cache.
    #[must_use]
    pub fn id(&self) -> String {
        self.config.cache_key()
    }

    /// Runs `op` with a shared lease on the server's entry, populating the
    /// entry first when needed.
    fn with_lease<T>(&self, op: impl FnOnce(&Utf8Path) -> ServerResult<T>) -> ServerResult<T> {
        let validate = |entry_dir: &Utf8Path| -> color_eyre::Result<()> {
            fs::metadata(entry_dir.join("data").join("PG_VERSION").as_std_path())?;
            Ok(())
        };
        let populate = |entry_dir: &Utf8Path| -> color_eyre::Result<()> {
            self.populate_entry(entry_dir)
                .map_err(color_eyre::Report::new)
        };
        let lease = self.cache.dir(
            &self.id(),
            Some(&validate),
            Some(&populate),
        )?;
        let result = op(lease.dir());
        finish_lease(result, lease)
    }

    fn status_at(&self, entry_dir: &Utf8Path) -> ServerResult<Status> {
        let (bin_dir, lease) = self.manager.bin(&self.config.postgres_version)?;
        let result = (|| {
            let pg_ctl = bin_dir.join("pg_ctl");
            let mut cmd = Command::new(pg_ctl.as_std_path());
            cmd.args(["status", "--silent", "-D"])
                .arg(entry_dir.join("data").as_std_path());
            let output = exec::run_capture(&mut cmd)
                .map_err(|err| ServerError::io(format!("running {pg_ctl} status"), err))?;
            let status = match output.status.code() {
                Some(0) => Status::Running,
                Some(PG_CTL_STATUS_STOPPED) => Status::Stopped,
                _ => Status::Invalid,
            };
            Ok(status)
        })();
        finish_lease(result, lease)
    }

    fn start_at(&self, entry_dir: &Utf8Path) -> ServerResult<()> {
        match self.status_at(entry_dir)? {
            Status::Running => return Ok(()),
            Status::Stopped => {}
            _ => return Err(ServerError::InvalidState),
        }
        let port = self.port_at(entry_dir)?;
        let logfile = logfile_path(entry_dir);
        fsutil::create_dir_all_mode(&entry_dir.join("log"), 0o700)
            .map_err(|err| ServerError::io("creating log directory".to_owned(), err))?;

        let (bin_dir, lease) = self.manager.bin(&self.config.postgres_version)?;
        let result = (|| {
            let pg_ctl = bin_dir.join("pg_ctl");
            let mut cmd = Command::new(pg_ctl.as_std_path());
            cmd.args(["start", "--silent", "--pgdata"])
                .arg(entry_dir.join("data").as_std_path())
                .arg("--options")
                .arg(format!("-p {port}"))
                .arg("--log")
                .arg(logfile.as_std_path());
            for option in &self.config.postgres_options {
                cmd.arg("--option").arg(option);
            }
            let output = exec::run_capture(&mut cmd)
                .map_err(|err| ServerError::io(format!("running {pg_ctl} start"), err))?;
            if !output.status.success() {
                return Err(ServerError::Subprocess(exec::render_failure(
                    "running pg_ctl start",
                    &output,
                )));
            }
            info!(target: LOG_TARGET, id = %self.id(), port = %port, "server started");
            Ok(())
        })();
        finish_lease(result, lease)
    }

    fn stop_at(&self, entry_dir: &Utf8Path) -> ServerResult<()> {
        if self.status_at(entry_dir)? == Status::Stopped {
            return Ok(());
        }
        let (bin_dir, lease) = self.manager.bin(&self.config.postgres_version)?;
        let result = (|| {
            let pg_ctl = bin_dir.join("pg_ctl");
            let mut cmd = Command::new(pg_ctl.as_std_path());
            cmd.args(["stop", "--silent", "-D"])
                .arg(entry_dir.join("data").as_std_path());
            let output = exec::run_capture(&mut cmd)
                .map_err(|err| ServerError::io(format!("running {pg_ctl} stop"), err))?;
            if !output.status.success() {
                return Err(ServerError::Subprocess(exec::render_failure(
                    "running pg_ctl stop",
                    &output,
                )));
            }
            info!(target: LOG_TARGET, id = %self.id(), "server stopped");
            Ok(())
        })();
        finish_lease(result, lease)
    }

    fn port(&self) -> ServerResult<String> {
        if !self.config.port.is_empty() {
            return Ok(self.config.port.clone());
        }
        self.with_lease(|entry_dir| self.port_at(entry_dir))
    }

    fn port_at(&self, entry_dir: &Utf8Path) -> ServerResult<String> {
        if !self.config.port.is_empty() {
            return Ok(self.config.port.clone());
        }
        port::port_from_file(entry_dir)
            .map_err(|err| ServerError::io("allocating tcp port".to_owned(), err))
    }

    /// Initializes a fresh server entry: config record first, then the
    /// cluster itself.
    fn populate_entry(&self, entry_dir: &Utf8Path) -> ServerResult<()> {
        info!(target: LOG_TARGET, id = %self.id(), dir = %entry_dir, "initializing server entry");
        self.write_config_record(entry_dir)?;
        let (bin_dir, lease) = self.manager.bin(&self.config.postgres_version)?;
        let result = (|| {
            let initdb = bin_dir.join("initdb");
            let mut cmd = Command::new(initdb.as_std_path());
            cmd.arg("--pgdata")
                .arg(entry_dir.join("data").as_std_path())
                .args(["--username", "postgres"])
                .args(&self.config.init_db_args);
            let output = exec::run_capture(&mut cmd)
                .map_err(|err| ServerError::io(format!("running {initdb}"), err))?;
            if !output.status.success() {
                return Err(ServerError::Subprocess(exec::render_failure(
                    "running initdb",
                    &output,
                )));
            }
            Ok(())
        })();
        finish_lease(result, lease)
    }

    fn write_config_record(&self, entry_dir: &Utf8Path) -> ServerResult<()> {
        let config_file = config_json_path(entry_dir);
        fsutil::create_dir_all_mode(&entry_dir.join("config"), 0o700)
            .map_err(|err| ServerError::io("creating config directory".to_owned(), err))?;
        let mut record = serde_json::to_vec_pretty(&self.config).map_err(ServerError::Json)?;
        record.push(b'\n');
        fs::write(config_file.as_std_path(), record)
            .map_err(|err| ServerError::io(format!("write {config_file}"), err))
    }
}

/// Loads every server recorded in the cache.
///
/// # Errors
///
/// Fails if an entry's config record is missing or unparseable, or on
/// cache errors.
pub fn servers_from_cache(cache_dir: &Utf8Path) -> ServerResult<Vec<Server>> {
    let server_cache = DirCache::new(cache_dir.join("server"));
    let mut servers = Vec::new();
    server_cache.walk(|entry_dir| {
        let server = server_from_entry(cache_dir, entry_dir).map_err(color_eyre::Report::new)?;
        servers.push(server);
        Ok(())
    })?;
    Ok(servers)
}

/// Loads one server from the cache by ID.
///
/// # Errors
///
/// Fails with the cache's entry-missing error for unknown IDs.
pub fn server_from_cache(cache_dir: &Utf8Path, id: &str) -> ServerResult<Server> {
    let server_cache = DirCache::new(cache_dir.join("server"));
    let lease = server_cache.dir(id, None, None)?;
    let result = server_from_entry(cache_dir, lease.dir());
    finish_lease(result, lease)
}

fn server_from_entry(cache_root: &Utf8Path, entry_dir: &Utf8Path) -> ServerResult<Server> {
    let config_file = config_json_path(entry_dir);
    let record = fs::read_to_string(config_file.as_std_path())
        .map_err(|err| ServerError::io(format!("read {config_file}"), err))?;
    let mut config: ServerConfig = serde_json::from_str(&record).map_err(ServerError::Json)?;
    config.cache_dir = cache_root.to_owned();
    Server::new(config)
}

fn logfile_path(entry_dir: &Utf8Path) -> Utf8PathBuf {
    entry_dir.join("log").join("server.log")
}

fn config_json_path(entry_dir: &Utf8Path) -> Utf8PathBuf {
    entry_dir.join("config").join("config.json")
}

/// Joins a lease release onto an operation result.
///
/// A release failure after success surfaces as an error; after a failure it
/// is joined onto the principal error, never replacing it.
fn finish_lease<T>(result: ServerResult<T>, lease: Lease) -> ServerResult<T> {
    match (result, lease.release()) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(ServerError::Cache(CacheError::Release(err))),
        (Err(primary), Ok(())) => Err(primary),
        (Err(primary), Err(release)) => Err(primary.joined(release)),
    }
}
