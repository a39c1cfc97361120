use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use sa_domain::config::{Config, ConfigSeverity, LogFormat, ObservabilityConfig};
use sa_gateway::bootstrap;
use sa_gateway::cli::{Cli, Command, ConfigCommand};
use sa_gateway::pump::PlatformPump;
use sa_gateway::transport::{StdioTransport, Transport};
use sa_gateway::{api, cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    match args.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            let config = Arc::new(cli::load_config(&args.config)?);
            init_tracing(&config.observability);
            run_server(config).await
        }
        Some(Command::Chat { user }) => {
            let config = Arc::new(cli::load_config(&args.config)?);
            init_tracing(&config.observability);
            run_chat(config, user).await
        }
        Some(Command::Run { message, user }) => {
            let config = Arc::new(cli::load_config(&args.config)?);
            init_tracing(&config.observability);
            run_once(config, user, message).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let config = cli::load_config(&args.config)?;
            if !cli::config::validate(&config, &args.config) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let config = cli::load_config(&args.config)?;
            cli::config::show(&config);
            Ok(())
        }
        Some(Command::Version) => {
            println!("agentd {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));
    match config.format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

fn check_config(config: &Config) -> anyhow::Result<()> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    let errors = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    if errors > 0 {
        anyhow::bail!("config validation failed with {errors} error(s)");
    }
    Ok(())
}

/// Start the gateway server with the given configuration.
async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("agent runtime starting");
    check_config(&config)?;

    let state = bootstrap::build_app_state(config.clone()).await?;
    bootstrap::spawn_background_tasks(&state);

    // ── CORS layer (config-aware) ────────────────────────────────────
    let cors_layer = build_cors_layer(&config.server.cors);

    // ── Rate-limit layer (per-IP token bucket via governor) ─────────
    let governor_layer = config.server.rate_limit.as_ref().map(|rl| {
        use tower_governor::governor::GovernorConfigBuilder;
        use tower_governor::GovernorLayer;

        let gov_config = GovernorConfigBuilder::default()
            .per_second(rl.requests_per_second.into())
            .burst_size(rl.burst_size)
            .finish()
            .expect("rate_limit: requests_per_second and burst_size must be > 0");

        tracing::info!(
            requests_per_second = rl.requests_per_second,
            burst_size = rl.burst_size,
            "per-IP rate limiting enabled"
        );

        GovernorLayer {
            config: std::sync::Arc::new(gov_config),
        }
    });
    if governor_layer.is_none() {
        tracing::info!("per-IP rate limiting disabled (no [server.rate_limit] in config)");
    }

    // ── Router ───────────────────────────────────────────────────────
    let app = api::router(state.clone())
        .layer(cors_layer)
        .layer(tower::limit::ConcurrencyLimitLayer::new(
            config.server.max_concurrent_requests,
        ));
    let app = match governor_layer {
        Some(gov) => app.layer(gov),
        None => app,
    };

    // ── Bind ─────────────────────────────────────────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "agent runtime listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("axum server error")?;

    // Drain: every acknowledged append must be durable before exit.
    tracing::info!("shutting down, flushing dirty sessions");
    state.sessions.flush_all().await.context("final session flush")?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Interactive REPL over stdin/stdout. Events are handled one at a
/// time — a conversation, not a fleet — so replies print in order.
async fn run_chat(config: Arc<Config>, user: String) -> anyhow::Result<()> {
    check_config(&config)?;
    let state = bootstrap::build_app_state(config.clone()).await?;
    bootstrap::spawn_background_tasks(&state);

    let transport = StdioTransport::new(user);
    let pump = PlatformPump::new(
        transport.name(),
        state.agent.clone(),
        state.ratelimiter.clone(),
        &config.security,
        &config.server,
        transport.max_message_len(),
    )?;

    eprintln!("Interactive chat — Ctrl+D to exit");
    while let Some(event) = transport.receive().await {
        let outcome = pump.handle_event(&event.user_id, &event.text).await;
        for message in outcome.into_messages() {
            transport.send(&event.user_id, &message).await?;
        }
    }

    state.sessions.flush_all().await?;
    eprintln!("Goodbye!");
    Ok(())
}

/// One-shot: send a single message through the pump and print the reply.
async fn run_once(config: Arc<Config>, user: String, message: String) -> anyhow::Result<()> {
    check_config(&config)?;
    let state = bootstrap::build_app_state(config.clone()).await?;

    let pump = PlatformPump::new(
        "cli",
        state.agent.clone(),
        state.ratelimiter.clone(),
        &config.security,
        &config.server,
        usize::MAX,
    )?;

    let outcome = pump.handle_event(&user, &message).await;
    for line in outcome.into_messages() {
        println!("{line}");
    }

    state.sessions.flush_all().await?;
    Ok(())
}

/// Build a [`CorsLayer`] from the configured allowed origins.
///
/// Origins may carry a trailing `*` wildcard for the port segment
/// (e.g. `http://localhost:*`), expanded into a predicate matching any
/// port on that host. A literal `"*"` allows all origins.
fn build_cors_layer(cors: &sa_domain::config::CorsConfig) -> CorsLayer {
    use axum::http::header;

    // Note: allow_credentials is incompatible with wildcard origins.
    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();

    for origin in &cors.allowed_origins {
        if origin.ends_with(":*") {
            // e.g. "http://localhost:*" -> prefix "http://localhost:"
            wildcard_prefixes.push(origin.trim_end_matches('*').to_owned());
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            // Remainder after the prefix must be digits only, so
            // "http://localhost:3000.evil.com" can't sneak through.
            wildcard_prefixes.iter().any(|prefix| {
                origin_str
                    .strip_prefix(prefix.as_str())
                    .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
