//! Regenerates the bundled known-version snapshot files.
//!
//! Queries the upstream repository for every supported system and rewrites
//! `src/registry/knownversions/*.txt`. Run from the repository root after
//! upstream publishes new builds, then commit the result.

use camino::Utf8PathBuf;
use color_eyre::eyre::Context;
use std::fs;
use std::time::Duration;

use pg_dev_server::registry::{
    artifact_id, default_excluded_versions, fetch_maven_versions, filter_versions, sort_versions,
    DEFAULT_MAVEN_URL, MAVEN_GROUP_PATH, SUPPORTED_SYSTEMS,
};

fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    let output_dir = std::env::args()
        .nth(1)
        .map(Utf8PathBuf::from)
        .unwrap_or_else(|| Utf8PathBuf::from("src/registry/knownversions"));
    fs::create_dir_all(output_dir.as_std_path())
        .with_context(|| format!("create {output_dir}"))?;

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .context("build http client")?;
    let excluded = default_excluded_versions();

    for system in SUPPORTED_SYSTEMS {
        let versions = fetch_maven_versions(
            &client,
            DEFAULT_MAVEN_URL,
            MAVEN_GROUP_PATH,
            &artifact_id(system),
        )
        .with_context(|| format!("list versions for {system}"))?;
        let mut versions = filter_versions(versions, &excluded);
        sort_versions(&mut versions);
        let filename = output_dir.join(format!("{}.txt", system.replace('/', "_")));
        fs::write(filename.as_std_path(), versions.join("\n") + "\n")
            .with_context(|| format!("write {filename}"))?;
        println!("wrote {filename} ({} versions)", versions.len());
    }
    Ok(())
}
