//! GlusterFS Share Driver
//!
//! Command-line front-end to the volume lifecycle manager. Every invocation
//! runs driver setup against the configured servers, re-attaches the shares
//! named with `--used`, then performs one operation and prints the result as
//! JSON on stdout. Logs go to stderr.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gluster_share_driver::{
    AccessRule, DriverConfig, PoolVolume, ProcessExecutor, Share, ShareDriver, Snapshot,
    UsedVolume, VolumeAddress, VolumeLifecycleManager,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// GlusterFS native share driver
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Driver configuration file (YAML)
    #[arg(long, env = "GLUSTER_DRIVER_CONFIG", default_value = "/etc/gluster-share-driver.yaml")]
    config: PathBuf,

    /// Export location of a share already bound to a volume (repeatable)
    ///
    /// The driver keeps no state between invocations. Every existing share
    /// must be listed here, or create-share and clone may hand its volume to
    /// a new share and reset its allow-list.
    #[arg(long = "used", value_name = "EXPORT")]
    used: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve server versions and report the pool
    Setup,
    /// Show free, used and poisoned volumes
    Pool,
    /// Show the backend capability report
    Stats,
    /// Bind a volume to a new share
    CreateShare {
        share_id: String,
        /// Requested size in GB
        #[arg(long)]
        size: Option<u64>,
    },
    /// Wipe and reclaim a share's volume
    DeleteShare { share_id: String, export: String },
    /// Grant a principal access to a share
    Allow {
        export: String,
        principal: String,
        #[arg(long, default_value = "cert")]
        access_type: String,
    },
    /// Revoke a principal's access to a share
    Deny {
        export: String,
        principal: String,
        #[arg(long, default_value = "cert")]
        access_type: String,
    },
    /// Snapshot a share
    SnapshotCreate { export: String, snapshot_id: String },
    /// Delete a share snapshot
    SnapshotDelete { export: String, snapshot_id: String },
    /// Create a share from a snapshot
    Clone {
        export: String,
        snapshot_id: String,
        share_id: String,
        #[arg(long)]
        size: Option<u64>,
    },
}

impl Command {
    /// Whether the command binds a volume to a new share
    fn binds_volume(&self) -> bool {
        matches!(self, Command::CreateShare { .. } | Command::Clone { .. })
    }
}

#[derive(Serialize)]
struct PoolReport {
    free: Vec<PoolVolume>,
    used: Vec<UsedVolume>,
    poisoned: Vec<VolumeAddress>,
}

#[derive(Serialize)]
struct ExportReport {
    share_id: String,
    export_location: String,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting GlusterFS share driver");
    info!("  Version: {}", gluster_share_driver::VERSION);
    info!("  Config: {}", args.config.display());

    let config = DriverConfig::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let executor = Arc::new(ProcessExecutor::new(config.executor_config()));
    let driver = VolumeLifecycleManager::new(&config, executor)?;

    driver.do_setup().await.context("driver setup failed")?;
    if args.used.is_empty() && args.command.binds_volume() {
        warn!("No --used shares given; every listed volume is treated as free");
    }
    for export in &args.used {
        let share = Share::new(export.clone(), None).with_export_location(export.clone());
        driver
            .ensure_share(&share)
            .await
            .with_context(|| format!("re-attaching {}", export))?;
    }

    match args.command {
        Command::Setup => {
            print_json(&driver.versions().resolved())?;
        }
        Command::Pool => {
            print_json(&PoolReport {
                free: driver.free_volumes(),
                used: driver.used_volumes(),
                poisoned: driver.poisoned_volumes(),
            })?;
        }
        Command::Stats => {
            print_json(&driver.get_share_stats(true).await)?;
        }
        Command::CreateShare { share_id, size } => {
            let export_location = driver.create_share(&Share::new(share_id.clone(), size)).await?;
            print_json(&ExportReport {
                share_id,
                export_location,
            })?;
        }
        Command::DeleteShare { share_id, export } => {
            driver
                .delete_share(&Share::new(share_id, None).with_export_location(export))
                .await?;
        }
        Command::Allow {
            export,
            principal,
            access_type,
        } => {
            let rule = AccessRule {
                access_type,
                access_to: principal,
            };
            driver.allow_access(&bound(&export), &rule).await?;
        }
        Command::Deny {
            export,
            principal,
            access_type,
        } => {
            let rule = AccessRule {
                access_type,
                access_to: principal,
            };
            driver.deny_access(&bound(&export), &rule).await?;
        }
        Command::SnapshotCreate {
            export,
            snapshot_id,
        } => {
            let snapshot = Snapshot {
                id: snapshot_id,
                share: bound(&export),
            };
            if let Err(e) = driver.create_snapshot(&snapshot).await {
                if e.is_soft() {
                    info!("Snapshots not supported: {}", e);
                }
                return Err(e.into());
            }
        }
        Command::SnapshotDelete {
            export,
            snapshot_id,
        } => {
            let snapshot = Snapshot {
                id: snapshot_id,
                share: bound(&export),
            };
            driver.delete_snapshot(&snapshot).await?;
        }
        Command::Clone {
            export,
            snapshot_id,
            share_id,
            size,
        } => {
            let snapshot = Snapshot {
                id: snapshot_id,
                share: bound(&export),
            };
            let export_location = driver
                .create_share_from_snapshot(&Share::new(share_id.clone(), size), &snapshot)
                .await?;
            print_json(&ExportReport {
                share_id,
                export_location,
            })?;
        }
    }

    Ok(())
}

/// A share identified only by its export location
fn bound(export: &str) -> Share {
    Share::new(export, None).with_export_location(export)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
