//! Domain error types for the dev-server cache and lifecycle engine.
//!
//! Each layer of the crate has its own error enum so callers can match on
//! failure kinds without string inspection. Caller-supplied validators and
//! populators report type-erased [`Report`]s which travel through the cache
//! unchanged, so their messages surface verbatim.

use color_eyre::Report;
use std::io;
use thiserror::Error;

/// Result alias for operations returning the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Result alias for directory-cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Result alias for binary-manager operations.
pub type ManagerResult<T> = std::result::Result<T, ManagerError>;

/// Result alias for server lifecycle operations.
pub type ServerResult<T> = std::result::Result<T, ServerError>;

/// Top-level error exposed by the crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A directory-cache operation failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
    /// A binary-manager operation failed.
    #[error(transparent)]
    Manager(#[from] ManagerError),
    /// A server lifecycle operation failed.
    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Failures raised by the blob-directory cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The key failed the syntactic check (empty, dotted, or containing a
    /// path separator).
    #[error("invalid key")]
    InvalidKey,
    /// A read was requested without a populator and the entry is absent.
    #[error("entry does not exist")]
    EntryMissing,
    /// The entry path exists but is not a directory.
    #[error("not a directory")]
    NotADirectory,
    /// An advisory lock could not be acquired after creation retries.
    #[error("failed to acquire lock")]
    LockFailed(#[source] io::Error),
    /// The caller's validator rejected the entry and no populator remained
    /// to repair it.
    #[error(transparent)]
    Invalid(Report),
    /// The caller's populator failed. The entry is left as-is for the next
    /// reader to revalidate.
    #[error(transparent)]
    Populate(Report),
    /// A walk callback failed; walking stopped at this entry.
    #[error(transparent)]
    Walk(Report),
    /// A filesystem operation failed.
    #[error("{context}")]
    Io {
        /// The operation that failed, with its path.
        context: String,
        #[source]
        source: io::Error,
    },
    /// Releasing a lease failed after the operation itself succeeded.
    #[error("failed to release cache lease")]
    Release(#[source] io::Error),
    /// A primary failure with a secondary lease-release failure attached.
    #[error("{primary} (lease release also failed: {release})")]
    Joined {
        primary: Box<CacheError>,
        release: io::Error,
    },
}

impl CacheError {
    /// Wraps an [`io::Error`] with the failing operation and path.
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Attaches a lease-release failure to this error.
    pub(crate) fn joined(self, release: io::Error) -> Self {
        Self::Joined {
            primary: Box::new(self),
            release,
        }
    }
}

/// Joins a lease-release result onto an operation result.
///
/// Release errors never mask the principal error: a failed release after a
/// failed operation is attached to the operation's error, and a failed
/// release after success becomes [`CacheError::Release`].
pub(crate) fn join_release<T>(result: CacheResult<T>, release: io::Result<()>) -> CacheResult<T> {
    match (result, release) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(CacheError::Release(err)),
        (Err(primary), Ok(())) => Err(primary),
        (Err(primary), Err(err)) => Err(primary.joined(err)),
    }
}

/// Failures raised by the binary manager and version registry.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The requested version is not a parseable semver triple.
    #[error("invalid version")]
    InvalidVersion(#[source] semver::Error),
    /// The host system has no upstream binary builds.
    #[error("system {0} not supported")]
    UnsupportedSystem(String),
    /// No upstream artifact provides the requested version for the system.
    #[error("version {version} not found for system {system}")]
    VersionNotFound { version: String, system: String },
    /// The upstream repository answered with a non-success status.
    #[error("unexpected http status {status} from {url}")]
    HttpStatus {
        status: reqwest::StatusCode,
        url: String,
    },
    /// The HTTP request itself failed.
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    /// Upstream metadata could not be decoded.
    #[error("decoding maven metadata")]
    Xml(#[source] quick_xml::DeError),
    /// The downloaded archive violated the expected jar-wraps-one-txz shape
    /// or contained an entry escaping the destination.
    #[error("malformed archive: {0}")]
    ArchiveMalformed(String),
    /// The outer archive container could not be read.
    #[error("reading archive container")]
    Zip(#[source] zip::result::ZipError),
    /// A filesystem operation failed.
    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    /// The underlying cache operation failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl ManagerError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Failures raised by the server lifecycle engine.
#[derive(Debug, Error)]
pub enum ServerError {
    /// `start` was called on a cluster reported neither running nor stopped.
    #[error("cluster is in an invalid state")]
    InvalidState,
    /// A control binary exited non-zero; the message carries its truncated
    /// combined output for display.
    #[error("{0}")]
    Subprocess(String),
    /// A filesystem operation failed.
    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    /// The server's config record could not be serialized or parsed.
    #[error("server config record")]
    Json(#[source] serde_json::Error),
    /// The underlying cache operation failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
    /// Installing or locking postgres binaries failed.
    #[error(transparent)]
    Manager(#[from] ManagerError),
    /// A primary failure with a secondary lease-release failure attached.
    #[error("{primary} (lease release also failed: {release})")]
    Joined {
        primary: Box<ServerError>,
        release: io::Error,
    },
}

impl ServerError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Attaches a lease-release failure to this error.
    pub(crate) fn joined(self, release: io::Error) -> Self {
        Self::Joined {
            primary: Box::new(self),
            release,
        }
    }
}
