//! bundlefetch - fetch, decrypt and cache asset bundles
//!
//! Thin CLI over the provider crate: resolves assets through a TOML catalog,
//! downloads and decrypts their bundles into the local cache and reports
//! progress from the event bus.

mod cli;
mod error;
mod events;
mod logging;

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::events::EventHandler;
use bundlefetch_config::Config;
use bundlefetch_crypto::{
    decrypt_file, encrypt_file, Aes128CbcFactory, CryptoStreamFactory, PassthroughFactory,
    SinkSettings,
};
use bundlefetch_events::{AppEvent, EventBus};
use bundlefetch_provider::{AssetProvider, Catalog};
use bundlefetch_types::FetchOptions;
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json_mode = cli.global.json;

    init_tracing(json_mode, cli.global.debug);

    if let Err(e) = run(cli).await {
        error!("Application error: {}", e);
        if json_mode {
            println!("{}", e.to_json());
        } else {
            eprintln!("Error: {e}");
        }
        process::exit(1);
    }
}

/// Result of a command, rendered as text or JSON
#[derive(Debug, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
enum OperationResult {
    Sizes { sizes: Vec<AssetSize> },
    Downloaded { assets: Vec<String> },
    Loaded {
        asset: String,
        bundle: String,
        bytes: usize,
        crc: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        output: Option<PathBuf>,
    },
    Encrypted { output: PathBuf, bytes: u64 },
    Decrypted { output: PathBuf, bytes: u64 },
}

#[derive(Debug, Serialize)]
struct AssetSize {
    asset: String,
    bytes: u64,
}

impl OperationResult {
    fn render(&self, json_mode: bool) -> Result<(), CliError> {
        if json_mode {
            let text = serde_json::to_string_pretty(self)
                .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
            println!("{text}");
            return Ok(());
        }

        match self {
            Self::Sizes { sizes } => {
                for size in sizes {
                    println!("{:<24} {} bytes", size.asset, size.bytes);
                }
            }
            Self::Downloaded { assets } => {
                println!("Downloaded {} asset(s)", assets.len());
            }
            Self::Loaded {
                asset,
                bundle,
                bytes,
                crc,
                output,
            } => {
                println!("Loaded {asset} from {bundle}: {bytes} bytes, crc {crc:08x}");
                if let Some(output) = output {
                    println!("Written to {}", output.display());
                }
            }
            Self::Encrypted { output, bytes } => {
                println!("Encrypted {} ({bytes} bytes)", output.display());
            }
            Self::Decrypted { output, bytes } => {
                println!("Decrypted {} ({bytes} bytes)", output.display());
            }
        }
        Ok(())
    }
}

/// Main application logic
async fn run(cli: Cli) -> Result<(), CliError> {
    info!("Starting bundlefetch v{}", env!("CARGO_PKG_VERSION"));

    // Precedence: file (or defaults), then environment, then flags
    let mut config = Config::load_or_default(cli.global.config.as_deref()).await?;
    config.merge_env()?;
    apply_cli_config(&mut config, &cli.global);

    let factory = crypto_factory(cli.global.key.as_deref())?;
    let bus = EventBus::default();
    let events = bus.subscribe();
    let mut event_handler = EventHandler::new(cli.global.json);

    let result = execute_command_with_events(
        cli.command,
        &cli.global,
        &config,
        factory,
        bus,
        events,
        &mut event_handler,
    )
    .await?;

    result.render(cli.global.json)?;
    info!("Command completed successfully");
    Ok(())
}

/// Execute command with concurrent event handling
async fn execute_command_with_events(
    command: Commands,
    global: &cli::GlobalArgs,
    config: &Config,
    factory: Arc<dyn CryptoStreamFactory>,
    bus: EventBus,
    mut events: broadcast::Receiver<AppEvent>,
    event_handler: &mut EventHandler,
) -> Result<OperationResult, CliError> {
    let mut command_future = Box::pin(execute_command(command, global, config, factory, bus));

    loop {
        select! {
            result = &mut command_future => {
                while let Ok(event) = events.try_recv() {
                    event_handler.handle_event(&event);
                }
                return result;
            }

            event = events.recv() => {
                match event {
                    Ok(event) => event_handler.handle_event(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "event handler lagged");
                    }
                    Err(RecvError::Closed) => { /* keep waiting for the command */ }
                }
            }
        }
    }
}

/// Execute the specified command
async fn execute_command(
    command: Commands,
    global: &cli::GlobalArgs,
    config: &Config,
    factory: Arc<dyn CryptoStreamFactory>,
    bus: EventBus,
) -> Result<OperationResult, CliError> {
    match command {
        Commands::Size { assets } => {
            let provider = build_provider(global, config, factory, bus).await?;
            let mut sizes = Vec::with_capacity(assets.len());
            for asset in assets {
                let bytes = provider.get_download_size(&asset).await?;
                sizes.push(AssetSize { asset, bytes });
            }
            Ok(OperationResult::Sizes { sizes })
        }

        Commands::Download {
            assets,
            interval_ms,
        } => {
            let provider = build_provider(global, config, factory, bus).await?;
            let interval = interval_ms.map(Duration::from_millis);
            for asset in &assets {
                provider.download(asset, interval).await?;
            }
            Ok(OperationResult::Downloaded { assets })
        }

        Commands::Load { asset, output } => {
            let provider = build_provider(global, config, factory, bus).await?;
            let handle = provider.load_asset(&asset).await?;
            if let Some(output) = &output {
                tokio::fs::write(output, &handle.data).await?;
            }
            let result = OperationResult::Loaded {
                asset,
                bundle: handle.bundle_name.clone(),
                bytes: handle.data.len(),
                crc: handle.crc,
                output,
            };
            handle.dispose();
            Ok(result)
        }

        Commands::Encrypt {
            input,
            output,
            bundle_name,
        } => {
            require_key(global)?;
            let options = FetchOptions::new(bundle_name_for(bundle_name, &input));
            let bytes = encrypt_file(factory.as_ref(), &options, &input, &output).await?;
            Ok(OperationResult::Encrypted { output, bytes })
        }

        Commands::Decrypt {
            input,
            output,
            bundle_name,
        } => {
            require_key(global)?;
            let options = FetchOptions::new(bundle_name_for(bundle_name, &input));
            let settings = SinkSettings {
                block_size: config.fetch.block_size,
                strict_decrypt: config.fetch.strict_decrypt,
            };
            let bytes = decrypt_file(factory, options, settings, &input, &output).await?;
            Ok(OperationResult::Decrypted { output, bytes })
        }
    }
}

async fn build_provider(
    global: &cli::GlobalArgs,
    config: &Config,
    factory: Arc<dyn CryptoStreamFactory>,
    bus: EventBus,
) -> Result<AssetProvider, CliError> {
    let Some(catalog_path) = &global.catalog else {
        return Err(CliError::InvalidArguments(
            "--catalog (or BUNDLEFETCH_CATALOG) is required".to_string(),
        ));
    };
    let catalog = Catalog::load(catalog_path).await?;
    Ok(AssetProvider::from_config(
        config,
        Arc::new(catalog),
        factory,
        bus,
    )?)
}

fn crypto_factory(key: Option<&str>) -> Result<Arc<dyn CryptoStreamFactory>, CliError> {
    match key {
        Some(key) => Ok(Arc::new(Aes128CbcFactory::from_hex(key)?)),
        None => Ok(Arc::new(PassthroughFactory)),
    }
}

fn require_key(global: &cli::GlobalArgs) -> Result<(), CliError> {
    if global.key.is_none() {
        return Err(CliError::InvalidArguments(
            "--key (or BUNDLEFETCH_KEY) is required".to_string(),
        ));
    }
    Ok(())
}

fn bundle_name_for(explicit: Option<String>, path: &Path) -> String {
    explicit.unwrap_or_else(|| {
        path.file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    })
}

/// Apply CLI configuration overrides (highest precedence)
fn apply_cli_config(config: &mut Config, global: &cli::GlobalArgs) {
    if let Some(cache_dir) = &global.cache_dir {
        config.fetch.cache_dir = Some(cache_dir.clone());
    }
    if global.strict_decrypt {
        config.fetch.strict_decrypt = true;
    }
}

/// Initialize tracing/logging
///
/// Logs go to stderr so stdout stays clean for command results.
fn init_tracing(json_mode: bool, debug_enabled: bool) {
    let default_filter = if debug_enabled {
        "info,bundlefetch=debug"
    } else {
        "warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    if json_mode {
        tracing_subscriber::fmt()
            .json()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_target(debug_enabled)
            .with_env_filter(filter)
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_name_defaults_to_file_stem() {
        assert_eq!(bundle_name_for(None, Path::new("/tmp/shapes.bundle")), "shapes");
        assert_eq!(
            bundle_name_for(Some("cube".to_string()), Path::new("/tmp/shapes.bundle")),
            "cube"
        );
    }

    #[test]
    fn missing_key_falls_back_to_passthrough() {
        let factory = crypto_factory(None).unwrap();
        assert_eq!(factory.header_len(), 0);
        assert!(crypto_factory(Some("not-hex")).is_err());
    }

    #[test]
    fn cli_flags_override_config() {
        let cli = Cli::parse_from([
            "bundlefetch",
            "--cache-dir",
            "/tmp/bf-cache",
            "--strict-decrypt",
            "size",
            "cube",
        ]);
        let mut config = Config::default();
        apply_cli_config(&mut config, &cli.global);
        assert_eq!(config.cache_dir(), PathBuf::from("/tmp/bf-cache"));
        assert!(config.fetch.strict_decrypt);
    }
}
