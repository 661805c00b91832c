//! Visor host — entry point.
//!
//! ```text
//! visor-host                     Run in the foreground
//! visor-host --config <path>    Load a custom config TOML
//! visor-host --gen-config       Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use visor_core::auth::TokenProvider;
use visor_core::host::HostOrchestrator;
use visor_core::hub::message::HostInfo;
use visor_core::session::SessionRegistry;
use visor_core::transport::TransportClient;

use visor_host::access::build_validator;
use visor_host::config::HostConfig;
use visor_host::providers::build_providers;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "visor-host", about = "Visor remote-desktop control host")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "visor-host.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&HostConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // Load config.
    let config = HostConfig::load(&cli.config);

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("visor-host v{}", env!("CARGO_PKG_VERSION"));
    info!("hub: {}", config.server.hub_addr);
    info!("max sessions: {}", config.session.max_sessions);
    info!("providers: {}", config.providers.kind);

    // Subsystem initialization; failures here stop the host.
    let providers = build_providers(&config)?;

    let tokens = if config.server.token_url.is_empty() {
        TokenProvider::static_token(&config.server.host_secret)
    } else {
        TokenProvider::new(
            &config.server.token_url,
            &config.server.host_id,
            &config.server.host_secret,
        )
    };

    let host_name = if config.server.host_name.is_empty() {
        gethostname::gethostname().to_string_lossy().into_owned()
    } else {
        config.server.host_name.clone()
    };
    let host_info = HostInfo {
        host_id: config.server.host_id.clone(),
        host_name,
        os: std::env::consts::OS.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        monitor_count: providers.capture.monitor_count(),
    };

    let (transport, commands) = TransportClient::new(tokens, host_info);
    let transport = Arc::new(transport);
    let registry = Arc::new(SessionRegistry::new(config.session.max_sessions));
    let validator = build_validator(&config.server.access_url);

    let orchestrator = HostOrchestrator::new(
        Arc::clone(&transport),
        commands,
        registry,
        validator,
        providers.capture,
        providers.input,
        providers.clipboard,
        providers.clipboard_changes,
        config.max_clipboard_bytes(),
        config.to_host_options(),
    );

    // Ctrl-C stops the orchestrator and any in-flight reconnect.
    let shutdown = orchestrator.shutdown_token();
    let ctrlc_transport = Arc::clone(&transport);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received — shutting down");
        shutdown.cancel();
        ctrlc_transport.disconnect();
    });

    // The initial connection retries on the reconnect schedule; once
    // up, the transport's supervisor owns the link.
    transport.connect_with_retry(&config.server.hub_addr).await?;
    info!("registered with hub");

    orchestrator.run().await?;
    Ok(())
}
