//! Shared fixtures for integration tests.
//!
//! Real postgres binaries are slow to download and irrelevant to most of
//! what these tests assert, so the binary cache is seeded with small shell
//! scripts that honour the `pg_ctl`/`initdb` contract: `initdb` creates a
//! data directory with a `PG_VERSION` marker, `pg_ctl status` exits 0 when
//! a state file says the server is running and 3 when it is not, and
//! `start`/`stop` toggle that state file.

// Not every test binary uses every helper.
#![allow(dead_code)]

use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// `pg_ctl` stand-in driving a `mock_running` state file next to the data
/// directory.
const MOCK_PG_CTL: &str = r#"#!/bin/sh
cmd="$1"; shift
data=""
prev=""
for arg in "$@"; do
  case "$prev" in
    -D|--pgdata) data="$arg" ;;
  esac
  prev="$arg"
done
state="$(dirname "$data")/mock_running"
case "$cmd" in
  status)
    [ -e "$state" ] && exit 0
    [ -f "$data/PG_VERSION" ] && exit 3
    exit 1
    ;;
  start)
    [ -f "$data/PG_VERSION" ] || exit 1
    touch "$state"
    exit 0
    ;;
  stop)
    rm -f "$state"
    exit 0
    ;;
esac
exit 1
"#;

/// `initdb` stand-in: materializes a minimal cluster directory.
const MOCK_INITDB: &str = r#"#!/bin/sh
data=""
prev=""
for arg in "$@"; do
  case "$prev" in
    --pgdata) data="$arg" ;;
  esac
  prev="$arg"
done
[ -n "$data" ] || exit 1
mkdir -p "$data"
printf '17\n' > "$data/PG_VERSION"
exit 0
"#;

/// Returns the tempdir's path as UTF-8.
pub fn utf8_path(temp: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8 tempdir path")
}

/// Cache key of a version's binary entry, mirroring the on-disk layout.
pub fn binary_entry_key(version: &str) -> String {
    format!("v{}", version.replace('.', "_"))
}

/// Seeds a binary cache entry under `cache_root` with the default mock
/// control binaries.
pub fn seed_mock_binaries(cache_root: &Utf8Path, version: &str) {
    seed_mock_binaries_with(cache_root, version, MOCK_PG_CTL, MOCK_INITDB);
}

/// Seeds a binary cache entry with caller-chosen script bodies.
pub fn seed_mock_binaries_with(
    cache_root: &Utf8Path,
    version: &str,
    pg_ctl: &str,
    initdb: &str,
) {
    let entry = cache_root
        .join("postgres")
        .join(binary_entry_key(version));
    let bin = entry.join("bin");
    fs::create_dir_all(bin.as_std_path()).expect("create bin dir");
    write_script(&bin.join("pg_ctl"), pg_ctl);
    write_script(&bin.join("initdb"), initdb);
    write_script(&bin.join("postgres"), "#!/bin/sh\nexit 0\n");
    fs::write(
        entry.join("version.txt").as_std_path(),
        format!("{version}\n"),
    )
    .expect("write version.txt");
}

fn write_script(path: &Utf8Path, body: &str) {
    fs::write(path.as_std_path(), body).expect("write script");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path.as_std_path(), fs::Permissions::from_mode(0o755))
            .expect("make script executable");
    }
}

/// A `pg_ctl` stand-in that answers `status` with a fixed exit code.
pub fn fixed_status_pg_ctl(exit_code: i32) -> String {
    format!(
        "#!/bin/sh\ncase \"$1\" in\n  status) exit {exit_code} ;;\nesac\nexit 0\n"
    )
}

/// A `pg_ctl` stand-in whose `status` reports stopped but whose `start`
/// fails loudly.
pub fn failing_start_pg_ctl() -> String {
    concat!(
        "#!/bin/sh\n",
        "case \"$1\" in\n",
        "  status) exit 3 ;;\n",
        "  start) echo 'could not bind socket' ; echo 'FATAL: boom' >&2 ; exit 1 ;;\n",
        "esac\n",
        "exit 0\n",
    )
    .to_owned()
}
