//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod check;
pub mod env;
pub mod init;
pub mod lock;
pub mod pin;
pub mod platforms;
pub mod resolve;
pub mod shell;
pub mod store;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

use crate::config::defaults::{DESCRIPTOR_FILE, LOCK_FILE};
use crate::core::channel::{Channel, ToolchainPin};
use crate::core::descriptor::Descriptor;
use crate::core::digest::Sha256Digest;
use crate::core::environment::Environment;
use crate::core::global_config::GlobalConfig;
use crate::core::lock::LockFile;
use crate::core::platform::Platform;
use crate::core::resolver::{ResolutionPlan, Resolver};
use crate::error::{DescriptorError, ResolveError};
use crate::infra::dirs::MilenvDirs;

use super::output::create_spinner;

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a milenv.toml in the project directory
    Init {
        /// Project name (defaults to the directory name)
        #[arg(long)]
        name: Option<String>,

        /// Toolchain channel
        #[arg(long)]
        channel: Option<String>,

        /// Overwrite an existing descriptor
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the descriptor without network access
    Check,

    /// List the platforms the descriptor supports
    Platforms,

    /// Record the digest of the channel manifest in the descriptor
    Pin {
        /// Switch to this channel before pinning
        #[arg(long)]
        channel: Option<String>,
    },

    /// Resolve the environment and report it
    Resolve {
        #[command(flatten)]
        args: ResolveArgs,
    },

    /// Print a script that activates the environment
    Env {
        #[command(flatten)]
        args: ResolveArgs,

        /// Shell dialect (bash, zsh, fish); defaults to $SHELL
        #[arg(long)]
        shell: Option<String>,

        /// Leave the caller's PATH out
        #[arg(long)]
        pure: bool,
    },

    /// Start a shell, or run a command, inside the environment
    Shell {
        #[command(flatten)]
        args: ResolveArgs,

        /// Leave the caller's environment out
        #[arg(long)]
        pure: bool,

        /// Command to run instead of the login shell
        #[arg(last = true)]
        command: Vec<String>,
    },

    /// Write milenv.lock for the supported platforms
    Lock {
        /// Platforms to lock (defaults to all supported)
        #[arg(long = "platform")]
        platforms: Vec<String>,
    },

    /// Inspect or clear the artifact store
    Store {
        #[command(subcommand)]
        command: StoreCommands,
    },
}

/// Store subcommands
#[derive(Subcommand, Debug)]
pub enum StoreCommands {
    /// Show store location and size
    Info,
    /// Remove every store entry
    Clean,
}

/// Options shared by every command that resolves
#[derive(Args, Debug, Clone, Default)]
pub struct ResolveArgs {
    /// Platform to resolve for (defaults to the host)
    #[arg(long)]
    pub platform: Option<String>,

    /// Substitute the toolchain channel
    #[arg(long, requires = "digest")]
    pub channel: Option<String>,

    /// Substitute the channel manifest digest
    #[arg(long)]
    pub digest: Option<String>,

    /// Fail if the resolution differs from milenv.lock
    #[arg(long)]
    pub locked: bool,
}

impl Commands {
    /// Execute the command
    pub async fn run(self, dir: &Path) -> Result<i32> {
        match self {
            Self::Init {
                name,
                channel,
                force,
            } => init::execute(dir, name, channel.as_deref(), force).await?,
            Self::Check => check::execute(dir).await?,
            Self::Platforms => platforms::execute(dir).await?,
            Self::Pin { channel } => pin::execute(dir, channel.as_deref()).await?,
            Self::Resolve { args } => resolve::execute(dir, &args).await?,
            Self::Env { args, shell, pure } => {
                env::execute(dir, &args, shell.as_deref(), pure).await?;
            }
            Self::Shell {
                args,
                pure,
                command,
            } => return shell::execute(dir, &args, pure, &command).await,
            Self::Lock { platforms } => lock::execute(dir, &platforms).await?,
            Self::Store { command } => match command {
                StoreCommands::Info => store::execute_info().await?,
                StoreCommands::Clean => store::execute_clean().await?,
            },
        }
        Ok(0)
    }
}

/// A project directory with its descriptor
#[derive(Debug)]
pub struct Project {
    pub root: PathBuf,
    pub descriptor_path: PathBuf,
    pub descriptor: Descriptor,
}

impl Project {
    /// Find and load the descriptor in `dir` or its parents
    pub fn locate(dir: &Path) -> Result<Self> {
        let descriptor_path =
            Descriptor::find(dir).ok_or_else(|| DescriptorError::NotFound {
                path: dir.join(DESCRIPTOR_FILE),
            })?;
        let descriptor = Descriptor::load(&descriptor_path)?;
        let root = descriptor_path
            .parent()
            .map_or_else(|| dir.to_path_buf(), Path::to_path_buf);
        Ok(Self {
            root,
            descriptor_path,
            descriptor,
        })
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    /// Resolver using the user's directories and configuration
    pub fn resolver(&self) -> Result<Resolver> {
        let dirs = MilenvDirs::new();
        let config = GlobalConfig::load(&dirs).context("Failed to load global configuration")?;
        Ok(Resolver::new(self.descriptor.clone(), &config, &dirs))
    }
}

/// Platform to resolve for: the requested one or the host
pub fn target_platform(requested: Option<&str>) -> Result<String> {
    match requested {
        Some(platform) => Ok(platform.to_string()),
        None => Platform::host()
            .map(|p| p.to_string())
            .map_err(|raw| {
                ResolveError::PlatformUnsupported {
                    platform: raw,
                    supported: Platform::ALL.iter().map(ToString::to_string).collect(),
                }
                .into()
            }),
    }
}

/// Toolchain override requested on the command line
pub fn toolchain_override(project: &Project, args: &ResolveArgs) -> Result<Option<ToolchainPin>> {
    let Some(digest) = &args.digest else {
        return Ok(None);
    };
    let digest = Sha256Digest::parse(digest)
        .map_err(|e| anyhow::anyhow!("Invalid --digest: {e}"))?;
    let channel = match &args.channel {
        Some(channel) => channel
            .parse::<Channel>()
            .map_err(|e| anyhow::anyhow!("Invalid --channel: {e}"))?,
        None => project.descriptor.toolchain.channel.clone(),
    };
    Ok(Some(ToolchainPin::new(channel, digest)))
}

/// Plan and realize the environment for the requested platform
pub async fn resolve_environment(
    project: &Project,
    args: &ResolveArgs,
) -> Result<(ResolutionPlan, Environment)> {
    let platform = target_platform(args.platform.as_deref())?;
    let mut resolver = project.resolver()?;
    if let Some(pin) = toolchain_override(project, args)? {
        resolver = resolver.with_toolchain(pin);
    }

    let spinner = create_spinner(&format!("Resolving for {platform}..."));
    let result = plan_and_realize(project, &resolver, &platform, args.locked).await;
    spinner.finish_and_clear();
    result
}

async fn plan_and_realize(
    project: &Project,
    resolver: &Resolver,
    platform: &str,
    locked: bool,
) -> Result<(ResolutionPlan, Environment)> {
    let plan = resolver.plan(platform).await?;
    if locked {
        LockFile::load(&project.lock_path())?.verify(&plan)?;
    }
    let environment = resolver.realize(&plan).await?;
    Ok((plan, environment))
}
