//! Download, extraction, and cache management for postgres binaries.
//!
//! One cache entry per version, shared by every server of that version.
//! Populating an entry downloads the upstream jar, double-extracts it (see
//! [`archive`]), and records the installed version in `version.txt` for
//! enumeration. Readers hold a [`Lease`] on the entry for as long as they
//! run binaries out of it, which keeps eviction from pulling binaries out
//! from under a live cluster.

mod archive;

use camino::{Utf8Path, Utf8PathBuf};
use semver::{Version, VersionReq};
use std::fs;
use std::io;
use std::time::Duration;
use tracing::{info, warn};

use crate::cache::{DirCache, Lease};
use crate::error::{CacheError, ManagerError, ManagerResult};
use crate::fsutil;
use crate::registry::{
    artifact_id, default_excluded_versions, fetch_maven_versions, filter_versions, host_system,
    known_system_versions, sort_versions, DEFAULT_MAVEN_URL, MAVEN_GROUP_PATH, SUPPORTED_SYSTEMS,
};
use crate::server::default_cache_root;

const LOG_TARGET: &str = "pgdev::manager";

/// Connect-and-read timeout for metadata queries.
const METADATA_TIMEOUT: Duration = Duration::from_secs(60);

/// Overall timeout for archive downloads, which run to tens of megabytes.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Configuration for [`BinaryManager`]. Zero-valued fields take defaults at
/// construction.
#[derive(Debug, Default)]
pub struct ManagerConfig {
    /// Base URL for the Maven repository. Default is the central repository.
    pub maven_url: String,
    /// Directory containing the binary cache. Default is `postgres/` under
    /// the user cache root.
    pub cache_dir: Utf8PathBuf,
    /// HTTP client used for both metadata and downloads. When unset,
    /// separate default clients with metadata/download timeouts are built.
    pub http: Option<reqwest::blocking::Client>,
    /// Upstream version ranges to hide from listings and installs. `None`
    /// takes [`default_excluded_versions`]; an empty vec disables the
    /// filter.
    pub excluded_versions: Option<Vec<VersionReq>>,
}

/// Downloads postgres binaries and manages their shared on-disk cache.
#[derive(Debug)]
pub struct BinaryManager {
    maven_url: String,
    cache: DirCache,
    metadata_client: reqwest::blocking::Client,
    download_client: reqwest::blocking::Client,
    excluded_versions: Vec<VersionReq>,
}

/// Cache key for a version: dots become underscores behind a `v` prefix.
fn binary_cache_key(version: &str) -> String {
    format!("v{}", version.replace('.', "_"))
}

fn version_file(entry_dir: &Utf8Path) -> Utf8PathBuf {
    entry_dir.join("version.txt")
}

impl BinaryManager {
    /// Builds a manager, filling unset config fields with defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a default HTTP client cannot be constructed.
    pub fn new(config: ManagerConfig) -> ManagerResult<Self> {
        let maven_url = if config.maven_url.is_empty() {
            DEFAULT_MAVEN_URL.to_owned()
        } else {
            config.maven_url
        };
        let cache_dir = if config.cache_dir.as_str().is_empty() {
            default_cache_root().join("postgres")
        } else {
            config.cache_dir
        };
        let (metadata_client, download_client) = match config.http {
            Some(client) => (client.clone(), client),
            None => (
                reqwest::blocking::Client::builder()
                    .timeout(METADATA_TIMEOUT)
                    .build()?,
                reqwest::blocking::Client::builder()
                    .timeout(DOWNLOAD_TIMEOUT)
                    .build()?,
            ),
        };
        Ok(Self {
            maven_url,
            cache: DirCache::new(cache_dir),
            metadata_client,
            download_client,
            excluded_versions: config
                .excluded_versions
                .unwrap_or_else(default_excluded_versions),
        })
    }

    /// Root directory of the binary cache.
    #[must_use]
    pub fn cache_dir(&self) -> &Utf8Path {
        self.cache.root()
    }

    /// Versions of postgres available for download on this host.
    ///
    /// On `darwin/arm64` the listing also includes `darwin/amd64` builds,
    /// which the platform runs under emulation.
    ///
    /// # Errors
    ///
    /// Fails on unsupported hosts and on metadata transport errors.
    pub fn available_versions(&self) -> ManagerResult<Vec<String>> {
        let system = host_system();
        let mut versions = self.system_versions(&system)?;
        if system == "darwin/arm64" {
            versions.extend(self.system_versions("darwin/amd64")?);
            sort_versions(&mut versions);
            versions.dedup();
        }
        Ok(versions)
    }

    /// Versions currently installed in the cache.
    ///
    /// Entries without a `version.txt` are skipped; they are either broken
    /// or mid-populate, and either way enumeration has nothing to say about
    /// them.
    ///
    /// # Errors
    ///
    /// Fails on cache or filesystem errors.
    pub fn installed_versions(&self) -> ManagerResult<Vec<String>> {
        let mut versions = Vec::new();
        self.cache.walk(|entry_dir| {
            match fs::read_to_string(version_file(entry_dir).as_std_path()) {
                Ok(content) => {
                    versions.push(content.trim().to_owned());
                    Ok(())
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(err.into()),
            }
        })?;
        Ok(versions)
    }

    /// Ensures the given version is installed in the cache.
    ///
    /// # Errors
    ///
    /// Fails on invalid versions, download or extraction errors.
    pub fn install(&self, version: &str) -> ManagerResult<()> {
        let lease = self.lease_version(version)?;
        lease
            .release()
            .map_err(|err| ManagerError::Cache(CacheError::Release(err)))
    }

    /// Returns the `bin/` directory for a version plus the lease guarding
    /// it.
    ///
    /// The binaries may be executed until the lease is released; use this
    /// to run `pg_ctl`, `initdb`, and friends.
    ///
    /// # Errors
    ///
    /// Fails on invalid versions, download or extraction errors.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use pg_dev_server::{BinaryManager, ManagerConfig};
    ///
    /// # fn main() -> Result<(), pg_dev_server::ManagerError> {
    /// let manager = BinaryManager::new(ManagerConfig::default())?;
    /// let (bin_dir, lease) = manager.bin("17.2.0")?;
    /// println!("control binaries live in {bin_dir}");
    /// drop(lease);
    /// # Ok(())
    /// # }
    /// ```
    pub fn bin(&self, version: &str) -> ManagerResult<(Utf8PathBuf, Lease)> {
        let lease = self.lease_version(version)?;
        let bin_dir = lease.dir().join("bin");
        Ok((bin_dir, lease))
    }

    /// Removes the cache entry for a version, waiting for in-flight users.
    ///
    /// # Errors
    ///
    /// Fails on cache or filesystem errors.
    pub fn remove(&self, version: &str) -> ManagerResult<()> {
        Ok(self.cache.evict(&binary_cache_key(version))?)
    }

    fn lease_version(&self, version: &str) -> ManagerResult<Lease> {
        Version::parse(version).map_err(ManagerError::InvalidVersion)?;
        let validate = |entry_dir: &Utf8Path| -> color_eyre::Result<()> {
            fs::metadata(entry_dir.join("bin").join("pg_ctl").as_std_path())?;
            Ok(())
        };
        let populate = |entry_dir: &Utf8Path| -> color_eyre::Result<()> {
            self.populate_entry(entry_dir, version)
                .map_err(color_eyre::Report::new)
        };
        let lease = self.cache.dir(
            &binary_cache_key(version),
            Some(&validate),
            Some(&populate),
        )?;
        Ok(lease)
    }

    fn populate_entry(&self, entry_dir: &Utf8Path, version: &str) -> ManagerResult<()> {
        let jar = self.download(version)?;
        archive::extract_archive(entry_dir, &jar)?;
        let path = version_file(entry_dir);
        fsutil::write_file_mode(&path, format!("{version}\n").as_bytes(), 0o600)
            .map_err(|err| ManagerError::io(format!("write {path}"), err))
    }

    fn download(&self, version: &str) -> ManagerResult<Vec<u8>> {
        let system = host_system();
        let artifact = self.resolve_artifact_id(&system, version)?;
        let url = format!(
            "{}/{}/{artifact}/{version}/{artifact}-{version}.jar",
            self.maven_url, MAVEN_GROUP_PATH,
        );
        info!(target: LOG_TARGET, url = %url, version, "downloading postgres binaries");
        let response = self.download_client.get(&url).send()?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(ManagerError::HttpStatus { status, url });
        }
        let bytes = response.bytes()?;
        Ok(bytes.to_vec())
    }

    /// Resolves the Maven artifact id that carries `version` for `system`.
    ///
    /// The bundled snapshot answers without a network round-trip; versions
    /// newer than the snapshot fall through to a live metadata query. A
    /// `darwin/arm64` host can also run `darwin/amd64` binaries under
    /// emulation, so unknown versions there retry against the amd64
    /// artifact before giving up.
    fn resolve_artifact_id(&self, system: &str, version: &str) -> ManagerResult<String> {
        if known_system_versions(system).iter().any(|v| v == version) {
            return Ok(artifact_id(system));
        }
        let versions = self.system_versions(system)?;
        if versions.iter().any(|v| v == version) {
            return Ok(artifact_id(system));
        }
        if system == "darwin/arm64" {
            warn!(
                target: LOG_TARGET,
                version, "version unavailable for darwin/arm64, trying darwin/amd64"
            );
            return self.resolve_artifact_id("darwin/amd64", version);
        }
        Err(ManagerError::VersionNotFound {
            version: version.to_owned(),
            system: system.to_owned(),
        })
    }

    fn system_versions(&self, system: &str) -> ManagerResult<Vec<String>> {
        if !SUPPORTED_SYSTEMS.contains(&system) {
            return Err(ManagerError::UnsupportedSystem(system.to_owned()));
        }
        let versions = fetch_maven_versions(
            &self.metadata_client,
            &self.maven_url,
            MAVEN_GROUP_PATH,
            &artifact_id(system),
        )?;
        let mut versions = filter_versions(versions, &self.excluded_versions);
        sort_versions(&mut versions);
        Ok(versions)
    }
}
