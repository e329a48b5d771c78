//! gitfs command line.
//!
//! - `gitfs mount <repository> <mountpoint>`: mount read-only, wait for
//!   SIGINT/SIGTERM, unmount. SIGQUIT logs live counters.
//! - `gitfs umount <mountpoint>`: stop a daemonized mount.
//! - `gitfs version`: print version and build stamp.

pub mod config;
pub mod daemon;
pub mod logging;
pub mod paths;
pub mod repository;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand};

use gitfs_kernel::{GitFs, MountOptions, MountStats, mount_root, spawn_mount};

use crate::config::Config;
use crate::daemon::PidFile;

/// Mount a git repository as a read-only filesystem of branches, tags and commits.
#[derive(Debug, Parser)]
#[command(name = "gitfs")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Mount git repository into directory
    Mount(MountArgs),
    /// Unmount git repository from directory
    Umount {
        mountpoint: PathBuf,
    },
    /// Print version information
    Version,
}

#[derive(Debug, Args)]
pub struct MountArgs {
    /// Local work tree, git directory, or a URL to clone
    pub repository: String,

    pub mountpoint: PathBuf,

    /// Enable verbose output (repeat for more)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Run in daemon mode
    #[arg(short, long)]
    pub daemon: bool,

    /// Configuration file (default: $XDG_CONFIG_HOME/gitfs/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Let other users access the mount
    #[arg(long)]
    pub allow_other: bool,

    /// Unmount automatically when the process exits
    #[arg(long)]
    pub auto_unmount: bool,

    /// Attribute cache lifetime in seconds
    #[arg(long)]
    pub ttl: Option<u64>,
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Mount(args) => mount(args),
        Command::Umount { mountpoint } => daemon::signal_unmount(&mountpoint),
        Command::Version => {
            println!("{}", version_string());
            Ok(())
        }
    }
}

pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match (
        option_env!("GITFS_BUILD_REVISION"),
        option_env!("GITFS_BUILD_DATE"),
    ) {
        (Some(revision), Some(date)) => {
            format!("gitfs: version {}, build {} {}", version, revision, date)
        }
        _ => format!("gitfs: version {}", version),
    }
}

/// Combine flags, config file and repository into kernel mount options.
///
/// Flags win over the file; the file wins over built-in defaults.
pub fn mount_options(
    args: &MountArgs,
    config: &Config,
    default_fs_name: &str,
    repository_base: &str,
    mountpoint: &Path,
) -> MountOptions {
    let ttl = args
        .ttl
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.attr_ttl());
    let volume_name = cfg!(target_os = "macos").then(|| {
        let mount_base = mountpoint
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{} ({})", mount_base, repository_base)
    });
    MountOptions {
        ttl,
        allow_other: args.allow_other || config.allow_other,
        auto_unmount: args.auto_unmount || config.auto_unmount,
        fs_name: config
            .fs_name
            .clone()
            .unwrap_or_else(|| default_fs_name.to_string()),
        volume_name,
    }
}

/// Absolute path for an existing local repository; anything else is a URL.
fn resolve_location(repository: &str) -> Result<String> {
    let path = Path::new(repository);
    if path.exists() {
        Ok(paths::absolute(path)?.to_string_lossy().into_owned())
    } else {
        Ok(repository.to_string())
    }
}

fn mount(args: MountArgs) -> Result<()> {
    let config = Config::load(args.config.as_deref())?;
    let mountpoint = paths::absolute(&args.mountpoint)?;
    if !mountpoint.is_dir() {
        bail!("mountpoint {} is not a directory", mountpoint.display());
    }
    // Daemonizing changes the working directory.
    let location = resolve_location(&args.repository)?;

    let mut log_file = None;
    if args.daemon {
        paths::ensure_dirs()?;
        let log_path = paths::log_file(&mountpoint);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("failed to open log file {}", log_path.display()))?;
        println!(
            "Running in daemon mode, logs could be discovered in {}",
            log_path.display()
        );
        daemon::daemonize()?;
        log_file = Some(file);
    }

    logging::init(args.verbose, config.log_filter.as_deref(), log_file)?;
    logging::report_failure(serve(&args, &config, &mountpoint, &location))
}

/// Open the repository, mount it and block until a shutdown signal.
fn serve(args: &MountArgs, config: &Config, mountpoint: &Path, location: &str) -> Result<()> {
    // Released last, after the session unmounts.
    let _pid_file = args
        .daemon
        .then(|| PidFile::create(&paths::pid_file(mountpoint)))
        .transpose()?;
    let opened = repository::open_or_clone(location)?;
    let options = mount_options(args, config, &opened.fs_name, &opened.base_name, mountpoint);
    let fs = GitFs::new(mount_root(opened.repo.clone()), options.clone());
    let stats = fs.stats();

    eprintln!("Mounting filesystem...");
    let session = spawn_mount(fs, mountpoint, &options)
        .with_context(|| format!("failed to mount filesystem at {}", mountpoint.display()))?;
    eprintln!(
        "Filesystem successfully mounted into directory: {}",
        mountpoint.display()
    );
    tracing::info!(
        mountpoint = %mountpoint.display(),
        repository = %location,
        cloned = opened.is_clone(),
        daemon = args.daemon,
        "mounted"
    );

    // Runtime starts after daemonizing; forking a multi-threaded process is unsafe.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start signal runtime")?;
    runtime.block_on(wait_for_shutdown(stats))?;

    drop(session);
    tracing::info!(mountpoint = %mountpoint.display(), "unmounted");
    drop(opened);
    Ok(())
}

async fn wait_for_shutdown(stats: Arc<MountStats>) -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt()).context("failed to watch SIGINT")?;
    let mut terminate = signal(SignalKind::terminate()).context("failed to watch SIGTERM")?;
    let mut quit = signal(SignalKind::quit()).context("failed to watch SIGQUIT")?;

    loop {
        tokio::select! {
            _ = interrupt.recv() => {
                eprintln!("Received SIGINT, unmounting...");
                return Ok(());
            }
            _ = terminate.recv() => {
                eprintln!("Received SIGTERM, unmounting...");
                return Ok(());
            }
            _ = quit.recv() => {
                let snapshot = stats.snapshot();
                eprintln!("gitfs {}: {}", env!("CARGO_PKG_VERSION"), snapshot);
                tracing::warn!(stats = %snapshot, "SIGQUIT");
            }
        }
    }
}
