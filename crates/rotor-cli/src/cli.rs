//! CLI structure and command definitions.

use anyhow::Result;
use clap::{Parser, Subcommand};
use rotor_core::RotorConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rotor")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Zero-downtime database credential rotation", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ~/.rotor/config)
    #[arg(short, long, global = true, env = "ROTOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create (or replace) a principal with the standard application grants
    Provision {
        /// Principal name
        principal: String,

        /// Also schedule expiry using the default TTL
        #[arg(long)]
        schedule: bool,
    },

    /// Rotate a principal's secret in place
    Rotate {
        /// Principal name
        principal: String,

        /// Skip authenticating with the new secret
        #[arg(long)]
        no_verify: bool,
    },

    /// Rotate through a shadow principal with a transition window
    RotateDual {
        /// Principal name
        principal: String,

        /// Transition window (e.g. 30s, 5m); defaults to the configured window
        #[arg(short, long)]
        window: Option<String>,
    },

    /// Finish an interrupted dual rotation
    Resume {
        /// Principal name
        principal: String,

        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// List shadow principals left behind by earlier rotations
    Reconcile,

    /// Record an expected expiry for a principal (kept if one exists)
    Schedule {
        /// Principal name
        principal: String,

        /// Time to live (e.g. 90d); defaults to the configured TTL
        #[arg(short, long)]
        ttl: Option<String>,
    },

    /// Replace a principal's expiry schedule
    Renew {
        /// Principal name
        principal: String,

        /// Time to live (e.g. 90d); defaults to the configured TTL
        #[arg(short, long)]
        ttl: Option<String>,
    },

    /// List credentials expiring within a horizon
    Expiring {
        /// Look-ahead (e.g. 7d); defaults to the configured horizon
        #[arg(long)]
        horizon: Option<String>,
    },

    /// Show the rotation audit history
    History {
        /// Only records for this principal
        #[arg(short, long)]
        principal: Option<String>,

        /// Oldest first
        #[arg(long)]
        oldest_first: bool,

        /// Print records as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Generate a secret without touching any backend
    Generate {
        /// Secret length; defaults to the configured length
        #[arg(short, long)]
        length: Option<usize>,
    },

    /// Show version information
    Version {
        /// Show detailed build info
        #[arg(long)]
        detailed: bool,
    },
}

impl Cli {
    pub async fn execute(&self, config: &RotorConfig) -> Result<()> {
        use crate::commands::*;

        match &self.command {
            Commands::Provision { principal, schedule } => {
                provision::execute(config, principal, *schedule).await
            }
            Commands::Rotate { principal, no_verify } => {
                rotate::single(config, principal, !*no_verify).await
            }
            Commands::RotateDual { principal, window } => {
                rotate::dual(config, principal, window.as_deref()).await
            }
            Commands::Resume { principal, yes } => {
                rotate::resume(config, principal, *yes).await
            }
            Commands::Reconcile => {
                reconcile::execute(config).await
            }
            Commands::Schedule { principal, ttl } => {
                expiry::schedule(config, principal, ttl.as_deref()).await
            }
            Commands::Renew { principal, ttl } => {
                expiry::renew(config, principal, ttl.as_deref()).await
            }
            Commands::Expiring { horizon } => {
                expiry::expiring(config, horizon.as_deref()).await
            }
            Commands::History { principal, oldest_first, json } => {
                history::execute(config, principal.as_deref(), *oldest_first, *json).await
            }
            Commands::Generate { length } => {
                generate::execute(config, *length).await
            }
            Commands::Version { detailed } => {
                version::execute(*detailed).await
            }
        }
    }
}
