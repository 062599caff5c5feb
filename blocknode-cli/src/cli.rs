use crate::config::{Config, DEFAULT_CONFIG_FILE};
use anyhow::{anyhow, Context, Result};
use blocknode_core::{Manager, MigrationError, StorageCategory, StorageLayoutResolver};
use blocknode_tools::{
    default_registry, Collaborators, HelmCli, KubectlCli, ProcessRunner, StrictPathSanitizer,
    UpgradeRequest, Upgrader,
};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Exit code for failures that left the deployment half-migrated
pub const EXIT_MANUAL_INTERVENTION: u8 = 2;
/// Exit code for every other failure
pub const EXIT_FAILURE: u8 = 1;

#[derive(Debug, Parser)]
#[command(name = "blocknode")]
#[command(about = "Upgrade a Block Node deployment across breaking releases")]
#[command(version)]
pub struct Cli {
    /// Configuration file
    #[arg(long, short, global = true, default_value = DEFAULT_CONFIG_FILE, env = "BLOCKNODE_CONFIG")]
    pub config: PathBuf,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Upgrade the release, running any migrations between the versions
    Upgrade {
        #[command(flatten)]
        overrides: Overrides,

        /// Print the migrations that would run and change nothing
        #[arg(long)]
        dry_run: bool,
    },
    /// Report whether upgrading to the target requires migrations
    Check {
        #[command(flatten)]
        overrides: Overrides,
    },
    /// Print the storage paths the target version would use
    Storage {
        #[command(flatten)]
        overrides: Overrides,
    },
}

/// Settings that override the configuration file
#[derive(Debug, Clone, Default, Args)]
pub struct Overrides {
    /// Chart version to upgrade to
    #[arg(long, short)]
    pub target: Option<String>,

    /// Packaged values profile
    #[arg(long)]
    pub profile: Option<String>,

    /// Values file to install with
    #[arg(long = "values")]
    pub values_file: Option<PathBuf>,

    /// Reinstall with the values currently deployed
    #[arg(long)]
    pub reuse_values: bool,

    /// Base directory for storage categories without an explicit path
    #[arg(long)]
    pub base_path: Option<String>,
}

impl Command {
    fn overrides(&self) -> &Overrides {
        match self {
            Command::Upgrade { overrides, .. }
            | Command::Check { overrides }
            | Command::Storage { overrides } => overrides,
        }
    }
}

/// Applies command line overrides to the file settings.
pub fn apply_overrides(config: &mut Config, overrides: &Overrides) {
    if let Some(target) = &overrides.target {
        config.upgrade.target_version = Some(target.clone());
    }
    if let Some(profile) = &overrides.profile {
        config.upgrade.profile = Some(profile.clone());
    }
    if let Some(file) = &overrides.values_file {
        config.upgrade.values_file = Some(file.clone());
    }
    if overrides.reuse_values {
        config.upgrade.reuse_values = true;
    }
    if let Some(base) = &overrides.base_path {
        config.storage.base_path = base.clone();
    }
}

fn target_version(config: &Config) -> Result<String> {
    config
        .upgrade
        .target_version
        .clone()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("no target version: pass --target or set upgrade.target_version"))
}

fn request(config: &Config) -> Result<UpgradeRequest> {
    Ok(config.upgrade_request(target_version(config)?))
}

fn upgrader(config: &Config) -> Result<Upgrader> {
    let mut runner = ProcessRunner::new();
    if let Some(secs) = config.tools.command_timeout {
        runner = runner.with_timeout(Duration::from_secs(secs));
    }
    let runner = Arc::new(runner);

    let mut helm = HelmCli::with_runner(runner.clone()).binary(config.tools.helm.clone());
    let mut kubectl = KubectlCli::with_runner(runner).binary(config.tools.kubectl.clone());
    if let Some(context) = &config.tools.kube_context {
        helm = helm.kube_context(context.clone());
        kubectl = kubectl.context(context.clone());
    }

    let registry = default_registry().context("invalid migration registry")?;
    Ok(Upgrader::new(
        Manager::new(Arc::new(registry)),
        Collaborators::local(helm, kubectl),
    ))
}

/// One line per storage category: `name<TAB>path`
pub fn storage_report(config: &Config) -> Result<Vec<String>> {
    let target = target_version(config)?;
    let layout = StorageLayoutResolver::new(Arc::new(StrictPathSanitizer::new()))
        .resolve(&config.storage, &target)
        .map_err(MigrationError::from)?;

    Ok(StorageCategory::ALL
        .iter()
        .map(|category| match layout.path(*category) {
            Some(path) => format!("{}\t{}", category, path.display()),
            None => format!("{}\t(not required before {})", category, category.min_version().unwrap_or_default()),
        })
        .collect())
}

/// Loads the configuration and runs the selected command.
pub async fn run(cli: Cli, cancel: CancellationToken) -> Result<()> {
    let mut config = Config::load(&cli.config)
        .await
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    apply_overrides(&mut config, cli.command.overrides());

    match cli.command {
        Command::Storage { .. } => {
            for line in storage_report(&config)? {
                println!("{}", line);
            }
        }
        Command::Check { .. } => {
            let plan = upgrader(&config)?.plan(&request(&config)?).await?;
            println!("{}", plan);
        }
        Command::Upgrade { dry_run: true, .. } => {
            let plan = upgrader(&config)?.plan(&request(&config)?).await?;
            println!("dry run, nothing changed");
            println!("{}", plan);
        }
        Command::Upgrade { dry_run: false, .. } => {
            let outcome = upgrader(&config)?.run(&request(&config)?, cancel).await?;
            log::info!("{}", outcome);
            println!("{}", outcome);
        }
    }
    Ok(())
}

/// Maps a failed run to the process exit code.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    let manual = err
        .chain()
        .filter_map(|e| e.downcast_ref::<MigrationError>())
        .any(MigrationError::requires_manual_intervention);
    if manual {
        EXIT_MANUAL_INTERVENTION
    } else {
        EXIT_FAILURE
    }
}
