//! Command line interface definition

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// bundlefetch - fetch, decrypt and cache asset bundles
#[derive(Parser)]
#[command(name = "bundlefetch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Fetch, decrypt and cache asset bundles")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Asset catalog (TOML)
    #[arg(long, global = true, value_name = "PATH", env = "BUNDLEFETCH_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// AES-128 key as 32 hex digits; bundles are read unencrypted without one
    #[arg(long, global = true, value_name = "HEX", env = "BUNDLEFETCH_KEY", hide_env_values = true)]
    pub key: Option<String>,

    /// Override the bundle cache directory
    #[arg(long, global = true, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Fail when the trailing ciphertext does not decrypt
    #[arg(long, global = true)]
    pub strict_decrypt: bool,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Show how many bytes still have to be downloaded
    Size {
        /// Asset names
        #[arg(required = true)]
        assets: Vec<String>,
    },

    /// Download bundles into the cache
    #[command(alias = "dl")]
    Download {
        /// Asset names
        #[arg(required = true)]
        assets: Vec<String>,

        /// Milliseconds between progress samples (0 = every tick)
        #[arg(long, value_name = "MS")]
        interval_ms: Option<u64>,
    },

    /// Fetch and load a bundle
    Load {
        /// Asset name
        asset: String,

        /// Write the decrypted bundle here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Encrypt a bundle for distribution
    Encrypt {
        /// Plain bundle
        input: PathBuf,

        /// Encrypted output
        output: PathBuf,

        /// Bundle name passed to the cipher (defaults to the file stem)
        #[arg(long)]
        bundle_name: Option<String>,
    },

    /// Decrypt a bundle file
    Decrypt {
        /// Encrypted bundle
        input: PathBuf,

        /// Decrypted output
        output: PathBuf,

        /// Bundle name passed to the cipher (defaults to the file stem)
        #[arg(long)]
        bundle_name: Option<String>,
    },
}
