//! Binary-cache maintenance subcommands.

use clap::{Args, Subcommand};

use super::{binary_manager, CacheArgs};

#[derive(Debug, Subcommand)]
pub(super) enum PgCommand {
    /// List installed postgres versions.
    Ls(PgLsCmd),
    /// List postgres versions available to download.
    Available(PgAvailableCmd),
    /// Install a postgres version.
    Install(PgInstallCmd),
    /// Remove a postgres version.
    Rm(PgRmCmd),
}

impl PgCommand {
    pub(super) fn run(&self) -> color_eyre::Result<()> {
        match self {
            Self::Ls(cmd) => cmd.run(),
            Self::Available(cmd) => cmd.run(),
            Self::Install(cmd) => cmd.run(),
            Self::Rm(cmd) => cmd.run(),
        }
    }
}

#[derive(Debug, Args)]
pub(super) struct PgLsCmd {
    #[command(flatten)]
    cache: CacheArgs,
}

impl PgLsCmd {
    fn run(&self) -> color_eyre::Result<()> {
        let manager = binary_manager(self.cache.cache_dir())?;
        for version in manager.installed_versions()? {
            println!("{version}");
        }
        Ok(())
    }
}

#[derive(Debug, Args)]
pub(super) struct PgAvailableCmd {
    #[command(flatten)]
    cache: CacheArgs,
}

impl PgAvailableCmd {
    fn run(&self) -> color_eyre::Result<()> {
        let manager = binary_manager(self.cache.cache_dir())?;
        for version in manager.available_versions()? {
            println!("{version}");
        }
        Ok(())
    }
}

#[derive(Debug, Args)]
pub(super) struct PgInstallCmd {
    /// The version to install.
    version: String,
    #[command(flatten)]
    cache: CacheArgs,
}

impl PgInstallCmd {
    fn run(&self) -> color_eyre::Result<()> {
        let manager = binary_manager(self.cache.cache_dir())?;
        manager.install(&self.version)?;
        Ok(())
    }
}

#[derive(Debug, Args)]
pub(super) struct PgRmCmd {
    /// The version to remove.
    version: String,
    #[command(flatten)]
    cache: CacheArgs,
}

impl PgRmCmd {
    fn run(&self) -> color_eyre::Result<()> {
        let manager = binary_manager(self.cache.cache_dir())?;
        manager.remove(&self.version)?;
        Ok(())
    }
}
