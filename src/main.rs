//! `pgdev`: manage per-developer postgres dev servers.
//!
//! The binary exits with status code `0` on success and non-zero with a
//! rendered error report on failure.

fn main() -> color_eyre::eyre::Result<()> {
    pg_dev_server::cli::run()
}
