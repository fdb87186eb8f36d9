#![cfg_attr(not(test), deny(clippy::panic))]

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use wolfden_server::config::{self, Config};
use wolfden_server::logging;
use wolfden_server::server::{EngineConfig, GameServer, HmacVoiceTokenProvider};
use wolfden_server::websocket;

/// Wolfden: authoritative session engine for a voice-enabled werewolf game
#[derive(Parser, Debug)]
#[command(name = "wolfden-server", version)]
#[command(about = "Runs the Wolfden game session engine")]
struct Cli {
    /// Check the merged configuration, print a summary, and exit
    /// (non-zero when the configuration is rejected)
    #[arg(long, short = 'c', conflicts_with = "print_config")]
    validate_config: bool,

    /// Dump the merged configuration as JSON and exit
    #[arg(long, conflicts_with = "validate_config")]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = Arc::new(config::load());

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&*cfg)?);
        return Ok(());
    }

    // load() already warned; from here on a bad config is fatal
    let checked = config::validate_config_security(&cfg);
    if cli.validate_config {
        return match checked {
            Ok(()) => {
                summarize(&cfg);
                Ok(())
            }
            Err(reason) => {
                eprintln!("configuration rejected: {reason}");
                std::process::exit(1);
            }
        };
    }
    checked.map_err(|reason| anyhow::anyhow!("configuration rejected: {reason}"))?;

    logging::init_with_config(&cfg.logging);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    tracing::info!(%addr, "Starting Wolfden server");

    let voice = Arc::new(HmacVoiceTokenProvider::new(
        cfg.security
            .voice_token_secret
            .clone()
            .unwrap_or_else(|| {
                tracing::warn!("voice_token_secret not set, using an ephemeral secret");
                uuid::Uuid::new_v4().to_string()
            })
            .into_bytes(),
        Duration::from_secs(cfg.security.voice_token_ttl_secs),
    ));

    let game_server = GameServer::new(EngineConfig::from_config(&cfg), voice);
    // No-op on a fresh boot; re-arms timers when state was carried over
    game_server.resume_all_sessions();

    let app = websocket::create_router(&cfg.security.cors_origins).with_state(game_server.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let shutdown_server = game_server.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
            shutdown_server.shutdown().await;
        })
        .await?;

    Ok(())
}

/// Human-oriented settings digest for `--validate-config`.
fn summarize(cfg: &Config) {
    println!("configuration ok");
    println!("  listen port      {}", cfg.port);
    println!("  storage          in-memory");
    println!("  lock timeout     {} ms", cfg.server.lock_timeout_ms);
    println!("  event buffer     {} rows", cfg.server.event_buffer_size);
    println!("  session cap      {}", cfg.server.max_sessions);
    println!("  voice token ttl  {} s", cfg.security.voice_token_ttl_secs);
    println!(
        "  voice secret     {}",
        if cfg.security.voice_token_secret.is_some() {
            "configured"
        } else {
            "ephemeral (set security.voice_token_secret for production)"
        }
    );
}
