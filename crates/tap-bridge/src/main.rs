//! TAP bridge entry point.
//!
//! Opens a TAP-Windows virtual Ethernet adapter, brings its link up, and
//! counts the frames flowing through it until Ctrl+C.  The same adapter
//! object is what an emulated network device would drive; this binary plugs
//! in a [`FrameMonitor`] as the frame consumer.
//!
//! # Usage
//!
//! ```text
//! tap-bridge [OPTIONS]
//!
//! Options:
//!   --config       <PATH>   Config file [default: platform config dir]
//!   --log-level    <LEVEL>  Log filter, overrides the config file
//!   --component-id <ID>     Driver component id, overrides the config file
//! ```
//!
//! `RUST_LOG`, when set, takes precedence over both `--log-level` and the
//! config file.
//!
//! # Architecture overview
//!
//! ```text
//! main()
//!  └─ load BridgeConfig            (infrastructure::storage::config)
//!  └─ TapAdapter::new(
//!        NativeDirectory,           (infrastructure::directory)
//!        NativeOpener,              (infrastructure::device)
//!        FrameMonitor)              (application::frame_monitor)
//!  └─ activate() → recv_start() → wait for Ctrl+C → deactivate()
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tap_bridge::application::frame_monitor::FrameMonitor;
use tap_bridge::infrastructure::storage::config::{
    load_config, load_config_from, BridgeConfig, ConfigError,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Bridges an emulated network device to a host TAP-Windows adapter.
#[derive(Debug, Parser)]
#[command(
    name = "tap-bridge",
    about = "Bridge to a host TAP-Windows virtual Ethernet adapter",
    version
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, env = "TAP_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter (`error`, `warn`, `info`, `debug`, `trace`, or an
    /// `EnvFilter` directive).
    #[arg(long, env = "TAP_BRIDGE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Driver component id to look for (e.g. `tap0901`).
    #[arg(long, env = "TAP_BRIDGE_COMPONENT_ID")]
    component_id: Option<String>,
}

impl Cli {
    /// Applies command-line overrides on top of the loaded config.
    fn apply_overrides(&self, config: &mut BridgeConfig) {
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(component_id) = &self.component_id {
            config.adapter.component_id = component_id.clone();
        }
    }
}

/// Loads the config from `--config`, or the platform config file.
///
/// A missing platform config dir is not fatal: defaults are used and the
/// returned warning is logged once logging is up.
fn load(cli: &Cli) -> anyhow::Result<(BridgeConfig, Option<String>)> {
    match &cli.config {
        Some(path) => {
            let config = load_config_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?;
            Ok((config, None))
        }
        None => match load_config() {
            Ok(config) => Ok((config, None)),
            Err(ConfigError::NoPlatformConfigDir) => Ok((
                BridgeConfig::default(),
                Some("no platform config directory; using defaults".to_string()),
            )),
            Err(e) => Err(e).context("failed to load config"),
        },
    }
}

/// `RUST_LOG` wins; otherwise the configured level, falling back to `info`
/// if it does not parse.
fn log_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (mut config, load_warning) = load(&cli)?;
    cli.apply_overrides(&mut config);

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(&config.logging.level))
        .init();
    if let Some(warning) = load_warning {
        warn!("{warning}");
    }

    info!(
        "TAP bridge starting (component id {})",
        config.adapter.component_id
    );

    let monitor = Arc::new(FrameMonitor::new());
    run(&config, Arc::clone(&monitor)).await?;

    info!("TAP bridge stopped: {}", monitor.snapshot());
    Ok(())
}

#[cfg(target_os = "windows")]
async fn run(config: &BridgeConfig, monitor: Arc<FrameMonitor>) -> anyhow::Result<()> {
    use tap_bridge::infrastructure::device::NativeOpener;
    use tap_bridge::infrastructure::directory::NativeDirectory;
    use tap_core::TapAdapter;

    let mut adapter = TapAdapter::new(
        NativeDirectory::new(),
        NativeOpener::new(),
        monitor,
        config.adapter_options(),
    );
    adapter
        .activate()
        .context("failed to activate the TAP adapter")?;
    adapter.recv_start();

    info!("TAP bridge ready.  Press Ctrl-C to exit.");
    let signal = tokio::signal::ctrl_c().await;

    adapter.deactivate();
    signal.context("failed to listen for Ctrl+C")?;
    Ok(())
}

#[cfg(not(target_os = "windows"))]
async fn run(_config: &BridgeConfig, _monitor: Arc<FrameMonitor>) -> anyhow::Result<()> {
    anyhow::bail!("unsupported platform: TAP-Windows adapters are only available on Windows")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
