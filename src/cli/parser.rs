//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use crate::config::{BridgeConfig, CALL_TIMEOUT_ENV, parse_timeout_ms};
use crate::engine::DEFAULT_BINDING_CUTOFF;
use crate::error::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// pskit: batch protein-structure computations.
///
/// Splits complexes and chains, extracts fragments, and computes
/// protein/nucleic-acid binding pairs and residue contact maps for PDB and
/// mmCIF files. Every computation runs on an isolated worker.
#[derive(Parser, Debug)]
#[command(name = "pskit")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// Per-file timeout in milliseconds.
    #[arg(long, env = CALL_TIMEOUT_ENV, global = true)]
    pub timeout_ms: Option<String>,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Split protein-nucleic acid complexes into protein and nucleic parts.
    SplitComplex {
        /// Structure files (.pdb or .cif).
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output directory.
        #[arg(short, long)]
        out_dir: PathBuf,
    },

    /// Split structures into one file per chain.
    SplitChain {
        /// Structure files (.pdb or .cif).
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output directory.
        #[arg(short, long)]
        out_dir: PathBuf,
    },

    /// Extract a residue range of one chain.
    Fragment {
        /// Structure files (.pdb or .cif).
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Chain id.
        #[arg(short, long)]
        chain: String,

        /// First residue number (default: first residue of the chain).
        #[arg(long, allow_hyphen_values = true)]
        start: Option<i64>,

        /// Last residue number (default: last residue of the chain).
        #[arg(long, allow_hyphen_values = true)]
        end: Option<i64>,

        /// Output directory.
        #[arg(short, long)]
        out_dir: PathBuf,
    },

    /// List protein/nucleic residue pairs within a distance cutoff.
    BindingPairs {
        /// Structure files (.pdb or .cif).
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Distance cutoff in angstroms.
        #[arg(long, default_value_t = DEFAULT_BINDING_CUTOFF)]
        cutoff: f64,
    },

    /// Compute residue-residue distance maps.
    #[command(alias = "d-map")]
    ContactMap {
        /// Structure files (.pdb or .cif).
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Restrict the map to one chain.
        #[arg(short, long)]
        chain: Option<String>,
    },
}

impl Commands {
    /// Input files of the command.
    #[must_use]
    pub fn files(&self) -> &[PathBuf] {
        match self {
            Self::SplitComplex { files, .. }
            | Self::SplitChain { files, .. }
            | Self::Fragment { files, .. }
            | Self::BindingPairs { files, .. }
            | Self::ContactMap { files, .. } => files,
        }
    }
}

impl Cli {
    /// Builds the bridge configuration from the environment and flags.
    ///
    /// Starts from [`BridgeConfig::from_env`]; `--timeout-ms` then takes
    /// precedence over `PSKIT_CALL_TIMEOUT_MS`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the timeout is not a positive
    /// integer.
    pub fn bridge_config(&self) -> Result<BridgeConfig> {
        self.bridge_config_from(BridgeConfig::from_env()?)
    }

    fn bridge_config_from(&self, config: BridgeConfig) -> Result<BridgeConfig> {
        match self.timeout_ms.as_deref() {
            Some(value) => Ok(config.with_call_timeout(parse_timeout_ms(value)?)),
            None => Ok(config),
        }
    }
}
