//! Command-line surface for `pgdev`.
//!
//! Server commands address a server either by configuration flags (which
//! determine its fingerprint) or directly by `--id` for servers already in
//! the cache. Binary-cache maintenance lives under the `pg` subcommand.

mod pg;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{bail, eyre, Context};
use std::io::Write;
use tracing_subscriber::EnvFilter;

use crate::manager::{BinaryManager, ManagerConfig};
use crate::server::{
    default_cache_root, server_from_cache, servers_from_cache, Server, ServerConfig, Status,
    DEFAULT_POSTGRES_VERSION, DEFAULT_SERVER_NAME,
};
use crate::cache::DirCache;

/// Options prepended by `--recommended`: a throwaway dev server trades
/// durability for speed.
const RECOMMENDED_OPTIONS: [&str; 6] = [
    "-c shared_buffers=128MB",
    "-c fsync=off",
    "-c synchronous_commit=off",
    "-c full_page_writes=off",
    "-c max_connections=100",
    "-c client_min_messages=warning",
];

#[derive(Debug, Parser)]
#[command(name = "pgdev", version, about = "Manage per-developer postgres dev servers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start a server and print its connection URL.
    Start(StartCmd),
    /// Stop a server.
    Stop(StopCmd),
    /// List servers in the cache.
    Ls(LsCmd),
    /// Remove a server from the cache.
    Rm(RmCmd),
    /// Manage postgres binaries.
    #[command(subcommand)]
    Pg(pg::PgCommand),
}

#[derive(Debug, Args)]
struct CacheArgs {
    /// Cache for binaries and server data. Defaults to the user cache
    /// directory.
    #[arg(long, value_name = "DIR")]
    cache: Option<Utf8PathBuf>,
}

impl CacheArgs {
    fn cache_dir(&self) -> Utf8PathBuf {
        self.cache.clone().unwrap_or_else(default_cache_root)
    }
}

#[derive(Debug, Args)]
struct ServerArgs {
    /// Act on the server with this ID. When set, other server options are
    /// ignored.
    #[arg(long)]
    id: Option<String>,
    /// Postgres version.
    #[arg(long = "pg", value_name = "VERSION", default_value = DEFAULT_POSTGRES_VERSION)]
    postgres_version: String,
    /// A name to distinguish this server from others that have the same
    /// configuration.
    #[arg(long = "name", value_name = "NAME", default_value = DEFAULT_SERVER_NAME)]
    server_name: String,
    /// Extra arguments to pass to initdb. May be specified multiple times.
    #[arg(long = "init-db-arg", value_name = "ARG")]
    init_db_args: Vec<String>,
    /// Port to listen on. When left empty, a random port will be chosen.
    #[arg(long, value_name = "PORT")]
    port: Option<String>,
    /// Extra options to pass to postgres. May be specified multiple times.
    #[arg(long = "option", short = 'o', value_name = "OPTION")]
    pg_options: Vec<String>,
    /// Use recommended options for a disposable dev server.
    #[arg(long)]
    recommended: bool,
}

impl ServerArgs {
    fn server(&self, cache_dir: Utf8PathBuf) -> color_eyre::Result<Server> {
        if let Some(id) = &self.id {
            return server_from_cache(&cache_dir, id)
                .with_context(|| format!("loading server {id} from cache"));
        }
        let mut options: Vec<String> = Vec::new();
        if self.recommended {
            options.extend(RECOMMENDED_OPTIONS.iter().map(|s| (*s).to_owned()));
        }
        options.extend(self.pg_options.iter().cloned());
        let server = Server::new(ServerConfig {
            postgres_version: self.postgres_version.clone(),
            name: self.server_name.clone(),
            postgres_options: options,
            init_db_args: self.init_db_args.clone(),
            port: self.port.clone().unwrap_or_default(),
            cache_dir,
        })?;
        Ok(server)
    }
}

#[derive(Debug, Args)]
struct StartCmd {
    #[command(flatten)]
    server: ServerArgs,
    #[command(flatten)]
    cache: CacheArgs,
}

impl StartCmd {
    fn run(&self) -> color_eyre::Result<()> {
        let server = self.server.server(self.cache.cache_dir())?;
        server.start()?;
        println!("{}", server.connection_url()?);
        Ok(())
    }
}

#[derive(Debug, Args)]
struct StopCmd {
    #[command(flatten)]
    server: ServerArgs,
    #[command(flatten)]
    cache: CacheArgs,
}

impl StopCmd {
    fn run(&self) -> color_eyre::Result<()> {
        let server = self.server.server(self.cache.cache_dir())?;
        server.stop()?;
        Ok(())
    }
}

#[derive(Debug, Args)]
struct LsCmd {
    #[command(flatten)]
    cache: CacheArgs,
    /// Show server status.
    #[arg(long)]
    status: bool,
    /// Show server connection URL for started servers.
    #[arg(long)]
    url: bool,
    /// Show postgres version.
    #[arg(long)]
    pg: bool,
    /// Do not show headers.
    #[arg(long)]
    no_headers: bool,
}

impl LsCmd {
    fn run(&self) -> color_eyre::Result<()> {
        let servers = servers_from_cache(&self.cache.cache_dir())?;
        let mut rows: Vec<Vec<String>> = Vec::new();
        if !self.no_headers {
            let mut header = vec!["ID".to_owned()];
            if self.pg {
                header.push("Postgres".to_owned());
            }
            if self.status {
                header.push("Status".to_owned());
            }
            if self.url {
                header.push("URL".to_owned());
            }
            rows.push(header);
        }
        for server in &servers {
            rows.push(self.server_row(server));
        }
        print_columns(&rows)
    }

    fn server_row(&self, server: &Server) -> Vec<String> {
        let mut row = vec![server.id()];
        let status = (self.status || self.url)
            .then(|| server.status().unwrap_or(Status::Unknown));
        if self.pg {
            row.push(server.config().postgres_version);
        }
        if self.status {
            if let Some(status) = status {
                row.push(status.to_string());
            }
        }
        if self.url && status == Some(Status::Running) {
            row.push(
                server
                    .connection_url()
                    .unwrap_or_else(|_| "unknown".to_owned()),
            );
        }
        row
    }
}

/// Prints rows padded into aligned columns.
fn print_columns(rows: &[Vec<String>]) -> color_eyre::Result<()> {
    let mut widths: Vec<usize> = Vec::new();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if widths.len() <= i {
                widths.push(0);
            }
            widths[i] = widths[i].max(cell.len());
        }
    }
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for row in rows {
        let mut line = String::new();
        for (i, cell) in row.iter().enumerate() {
            if i + 1 == row.len() {
                line.push_str(cell);
            } else {
                line.push_str(&format!("{cell:<width$}   ", width = widths[i]));
            }
        }
        writeln!(out, "{}", line.trim_end()).context("write listing")?;
    }
    Ok(())
}

#[derive(Debug, Args)]
struct RmCmd {
    /// ID of the server to remove.
    #[arg(long)]
    id: String,
    /// Remove the server even if it is running.
    #[arg(long)]
    force: bool,
    #[command(flatten)]
    cache: CacheArgs,
}

impl RmCmd {
    fn run(&self) -> color_eyre::Result<()> {
        let cache_dir = self.cache.cache_dir();
        let server = server_from_cache(&cache_dir, &self.id)?;
        let status = server.status().unwrap_or(Status::Unknown);
        if status != Status::Stopped && !self.force {
            bail!(
                "server {} is not stopped. Use --force to remove it anyway",
                self.id
            );
        }
        let server_cache = DirCache::new(cache_dir.join("server"));
        server_cache.evict(&self.id)?;
        Ok(())
    }
}

fn binary_manager(cache_dir: Utf8PathBuf) -> color_eyre::Result<BinaryManager> {
    let manager = BinaryManager::new(ManagerConfig {
        cache_dir: cache_dir.join("postgres"),
        ..ManagerConfig::default()
    })?;
    Ok(manager)
}

/// CLI entry point: parses arguments and dispatches.
///
/// # Errors
///
/// Returns the failing command's error for the binary to render.
pub fn run() -> color_eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| eyre!("installing tracing subscriber: {err}"))?;
    let cli = Cli::parse();
    match cli.command {
        Command::Start(cmd) => cmd.run(),
        Command::Stop(cmd) => cmd.run(),
        Command::Ls(cmd) => cmd.run(),
        Command::Rm(cmd) => cmd.run(),
        Command::Pg(cmd) => cmd.run(),
    }
}
