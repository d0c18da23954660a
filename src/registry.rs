//! Upstream version registry for embedded postgres binary artifacts.
//!
//! Binary archives are published to a Maven-style repository, one artifact
//! per `os/arch` pair. This module derives artifact ids, lists available
//! versions from `maven-metadata.xml`, and carries per-system snapshots of
//! the versions known at build time so common lookups need no network
//! round-trip. The snapshots are regenerated with the
//! `refresh-known-versions` binary.

use semver::{Version, VersionReq};
use serde::Deserialize;
use std::cmp::Ordering;
use tracing::debug;

use crate::error::{ManagerError, ManagerResult};

const LOG_TARGET: &str = "pgdev::registry";

/// `os/arch` pairs the upstream publishes binaries for.
pub const SUPPORTED_SYSTEMS: [&str; 4] = [
    "linux/amd64",
    "linux/arm64",
    "darwin/amd64",
    "darwin/arm64",
];

/// Repository path of the group that publishes the binary artifacts.
pub const MAVEN_GROUP_PATH: &str = "io/zonky/test/postgres";

/// Default Maven repository base URL.
pub const DEFAULT_MAVEN_URL: &str = "https://repo1.maven.org/maven2";

const KNOWN_LINUX_AMD64: &str = include_str!("registry/knownversions/linux_amd64.txt");
const KNOWN_LINUX_ARM64: &str = include_str!("registry/knownversions/linux_arm64.txt");
const KNOWN_DARWIN_AMD64: &str = include_str!("registry/knownversions/darwin_amd64.txt");
const KNOWN_DARWIN_ARM64: &str = include_str!("registry/knownversions/darwin_arm64.txt");

/// The running host's `os/arch` tag in upstream notation.
#[must_use]
pub fn host_system() -> String {
    let os = match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    };
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    };
    format!("{os}/{arch}")
}

/// Maven artifact id for the given system.
///
/// The upstream names its arm64 artifacts `arm64v8`.
#[must_use]
pub fn artifact_id(system: &str) -> String {
    let system = system.replace("arm64", "arm64v8").replace('/', "-");
    format!("embedded-postgres-binaries-{system}")
}

/// Versions known for `system` at build time, without querying the network.
///
/// Returns an empty list for systems without a bundled snapshot.
#[must_use]
pub fn known_system_versions(system: &str) -> Vec<String> {
    let bundled = match system {
        "linux/amd64" => KNOWN_LINUX_AMD64,
        "linux/arm64" => KNOWN_LINUX_ARM64,
        "darwin/amd64" => KNOWN_DARWIN_AMD64,
        "darwin/arm64" => KNOWN_DARWIN_ARM64,
        _ => return Vec::new(),
    };
    bundled
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

#[derive(Debug, Deserialize)]
struct MavenMetadata {
    versioning: Versioning,
}

#[derive(Debug, Deserialize)]
struct Versioning {
    versions: VersionList,
}

#[derive(Debug, Default, Deserialize)]
struct VersionList {
    #[serde(rename = "version", default)]
    version: Vec<String>,
}

/// Fetches the version list from a Maven-style `maven-metadata.xml`.
///
/// # Errors
///
/// Fails on transport errors, a non-200 status, or undecodable metadata.
pub fn fetch_maven_versions(
    client: &reqwest::blocking::Client,
    maven_url: &str,
    group: &str,
    artifact: &str,
) -> ManagerResult<Vec<String>> {
    let url = format!("{maven_url}/{group}/{artifact}/maven-metadata.xml");
    debug!(target: LOG_TARGET, url = %url, "fetching maven metadata");
    let response = client.get(&url).send()?;
    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(ManagerError::HttpStatus { status, url });
    }
    let body = response.text()?;
    let metadata: MavenMetadata = quick_xml::de::from_str(&body).map_err(ManagerError::Xml)?;
    Ok(metadata.versioning.versions.version)
}

/// Default exclusion ranges for upstream builds known to be broken.
///
/// Everything before 11.7.0 plus the 12.0.x/12.1.x line. Expressed as two
/// requirements because the semver crate has no `||` operator.
#[must_use]
pub fn default_excluded_versions() -> Vec<VersionReq> {
    vec![
        VersionReq::parse("<11.7.0-0").expect("static version requirement"),
        VersionReq::parse(">=12.0.0-0, <12.2.0-0").expect("static version requirement"),
    ]
}

/// Drops unparseable versions and versions matching any exclusion range.
#[must_use]
pub fn filter_versions(versions: Vec<String>, excluded: &[VersionReq]) -> Vec<String> {
    versions
        .into_iter()
        .filter(|raw| match Version::parse(raw) {
            Ok(version) => !excluded.iter().any(|req| req.matches(&version)),
            Err(_) => false,
        })
        .collect()
}

/// Sorts versions ascending by semver.
///
/// Unparseable versions sort last and compare lexicographically among
/// themselves.
pub fn sort_versions(versions: &mut [String]) {
    versions.sort_by(|a, b| match (Version::parse(a), Version::parse(b)) {
        (Ok(left), Ok(right)) => left.cmp(&right),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    });
}
