//! Enumerating and loading servers recorded in a cache.
#![cfg(unix)]

mod support;

use camino::Utf8Path;
use pg_dev_server::{
    server_from_cache, servers_from_cache, CacheError, Server, ServerConfig, ServerError,
};
use std::fs;
use support::{seed_mock_binaries, utf8_path};

/// Seeds a bare server entry holding only a config record, the way an
/// interrupted-but-validated cache may leave one.
fn seed_server_entry(cache_root: &Utf8Path, entry_name: &str, server_name: &str) {
    let config_dir = cache_root
        .join("server")
        .join(entry_name)
        .join("config");
    fs::create_dir_all(config_dir.as_std_path()).expect("create config dir");
    fs::write(
        config_dir.join("config.json").as_std_path(),
        format!("{{\n  \"postgres_version\": \"17.1.0\",\n  \"name\": \"{server_name}\"\n}}\n"),
    )
    .expect("write config record");
}

#[test]
fn enumerates_every_recorded_server() {
    let temp = tempfile::tempdir().expect("tempdir");
    let cache_root = utf8_path(&temp);
    seed_server_entry(&cache_root, "foo", "foo");
    seed_server_entry(&cache_root, "bar", "bar");

    let servers = servers_from_cache(&cache_root).expect("servers from cache");
    let mut names: Vec<String> = servers.iter().map(|s| s.config().name).collect();
    names.sort();
    assert_eq!(names, ["bar", "foo"]);

    for server in &servers {
        // The loader re-injects the cache root the record came from.
        assert_eq!(server.config().cache_dir, cache_root);
        // IDs are recomputed from the recorded configuration.
        let expected = Server::new(ServerConfig {
            postgres_version: "17.1.0".to_owned(),
            name: server.config().name,
            cache_dir: cache_root.clone(),
            ..ServerConfig::default()
        })
        .expect("reference server")
        .id();
        assert_eq!(server.id(), expected);
    }
}

#[test]
fn empty_cache_enumerates_to_nothing() {
    let temp = tempfile::tempdir().expect("tempdir");
    let cache_root = utf8_path(&temp);
    let servers = servers_from_cache(&cache_root).expect("servers from cache");
    assert!(servers.is_empty());
}

#[test]
fn populated_server_round_trips_through_enumeration() {
    let temp = tempfile::tempdir().expect("tempdir");
    let cache_root = utf8_path(&temp);
    seed_mock_binaries(&cache_root, "17.1.0");
    let server = Server::new(ServerConfig {
        postgres_version: "17.1.0".to_owned(),
        name: "roundtrip".to_owned(),
        cache_dir: cache_root.clone(),
        ..ServerConfig::default()
    })
    .expect("build server");
    // Forces the entry into existence.
    server.logfile().expect("logfile");

    let servers = servers_from_cache(&cache_root).expect("servers from cache");
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].id(), server.id());
    assert_eq!(servers[0].config().name, "roundtrip");
}

#[test]
fn loads_a_single_server_by_id() {
    let temp = tempfile::tempdir().expect("tempdir");
    let cache_root = utf8_path(&temp);
    seed_server_entry(&cache_root, "known-entry", "known");

    let server = server_from_cache(&cache_root, "known-entry").expect("load server");
    assert_eq!(server.config().name, "known");
    assert_eq!(server.config().cache_dir, cache_root);
}

#[test]
fn unknown_id_fails_with_entry_missing() {
    let temp = tempfile::tempdir().expect("tempdir");
    let cache_root = utf8_path(&temp);
    let err = server_from_cache(&cache_root, "absent").expect_err("unknown id");
    assert!(
        matches!(err, ServerError::Cache(CacheError::EntryMissing)),
        "got {err:?}"
    );
}
