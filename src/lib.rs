//! Per-developer, on-disk postgres clusters for local and test use.
//!
//! Ask for a server matching a configuration and the crate downloads and
//! extracts the right binaries, initializes a cluster, and starts, stops,
//! and inspects it. Servers with different configurations coexist in one
//! cache; binaries are shared across servers of the same version.
//!
//! Coordination is entirely on-disk: a blob-directory cache ([`cache`])
//! guards every entry with advisory file locks, so any number of
//! processes can share a cache root without a daemon.
//!
//! # Examples
//!
//! ```no_run
//! use pg_dev_server::{Server, ServerConfig};
//!
//! # fn main() -> pg_dev_server::Result<()> {
//! let server = Server::new(ServerConfig {
//!     postgres_version: "17.1.0".to_owned(),
//!     ..ServerConfig::default()
//! })?;
//! server.start()?;
//! println!("{}", server.connection_url()?);
//! server.stop()?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod cli;
mod error;
mod exec;
mod fsutil;
pub mod manager;
pub mod registry;
pub mod server;

pub use error::{
    CacheError, CacheResult, Error, ManagerError, ManagerResult, Result, ServerError, ServerResult,
};
pub use manager::{BinaryManager, ManagerConfig};
pub use server::{
    default_cache_root, server_from_cache, servers_from_cache, Server, ServerConfig, Status,
    DEFAULT_POSTGRES_VERSION, DEFAULT_SERVER_NAME,
};
