use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bn_domain::config::{Config, ConfigSeverity};
use bn_engines::OpenAiCompatEngine;
use bn_gateway::cli::{Cli, Command, ConfigCommand};
use bn_gateway::router::build_router;
use bn_gateway::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            init_tracing();
            let config = Config::from_env();
            run_server(Arc::new(config)).await
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let config = Config::from_env();
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let config = Config::from_env();
            let issues = config.validate();
            for issue in &issues {
                let tag = match issue.severity {
                    ConfigSeverity::Warning => "warning",
                    ConfigSeverity::Error => "error",
                };
                println!("{tag}: {issue}");
            }
            if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
                std::process::exit(1);
            }
            println!("configuration ok");
            Ok(())
        }
        Some(Command::Version) => {
            println!("banter {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Initialize structured JSON tracing (only for the `serve` command).
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,bn_gateway=debug")),
        )
        .json()
        .init();
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("banter starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Engines ──────────────────────────────────────────────────────
    let engine_timeout = Duration::from_secs_f64(config.engines.timeout_s);
    let chat = Arc::new(
        OpenAiCompatEngine::new(
            config.engines.chat_url.clone(),
            config.engines.chat_model.clone(),
            engine_timeout,
        )
        .context("building chat engine client")?,
    );
    tracing::info!(url = %config.engines.chat_url, model = %config.engines.chat_model, "chat engine ready");

    let tool: Option<Arc<OpenAiCompatEngine>> = if config.engines.tool_url.is_empty() {
        tracing::warn!("no tool classifier configured; prefilter only");
        None
    } else {
        let engine = OpenAiCompatEngine::new(
            config.engines.tool_url.clone(),
            config.engines.tool_model.clone(),
            engine_timeout,
        )
        .context("building tool classifier client")?;
        tracing::info!(url = %config.engines.tool_url, model = %config.engines.tool_model, "tool classifier ready");
        Some(Arc::new(engine))
    };

    // ── State & router ───────────────────────────────────────────────
    let bind_addr = config.server.bind_addr.clone();
    let state = AppState::new(
        config,
        chat,
        tool.map(|t| t as Arc<dyn bn_engines::ToolClassifier>),
    );
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("banter stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
