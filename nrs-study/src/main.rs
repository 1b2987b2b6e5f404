//! nrs-study - news recommendation study service
//!
//! Loads the bootstrap configuration and the article corpus, opens the
//! response database, and serves the participant wizard plus the
//! administrative routes.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use nrs_common::articles::load_article_table;
use nrs_common::config::TomlConfig;
use nrs_common::db::init_database;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use nrs_study::{build_router, AppState};

/// Command-line arguments for nrs-study
#[derive(Parser, Debug)]
#[command(name = "nrs-study")]
#[command(about = "News recommendation study service")]
#[command(version)]
struct Args {
    /// Bootstrap configuration file
    #[arg(short, long, env = "NRS_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long, env = "NRS_PORT")]
    port: Option<u16>,

    /// Response database path (overrides config)
    #[arg(long, env = "NRS_DATABASE")]
    database: Option<PathBuf>,

    /// Article corpus file (overrides config)
    #[arg(long, env = "NRS_ARTICLES")]
    articles: Option<PathBuf>,

    /// Study profile: six-round or three-round (overrides config)
    #[arg(long, env = "NRS_PROFILE")]
    profile: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before the subscriber exists; its own log lines are lost
    let mut config = TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(
        "Starting News Recommendation Study (nrs-study) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(database) = args.database {
        config.database_path = database;
    }
    if let Some(articles) = args.articles {
        config.articles.path = articles;
    }
    if let Some(profile) = args.profile {
        config.study.profile = profile;
    }

    let profile = config.study.resolve().context("Invalid study configuration")?;
    info!(
        "Study profile '{}': {} rounds, favourite main topic {}, mid-questionnaire {}, post-questionnaire {}, assignment {:?}",
        profile.name,
        profile.total_rounds,
        profile.enforce_favourite_main_topic,
        profile.mid_questionnaire,
        profile.post_questionnaire,
        profile.assignment
    );

    info!("Database path: {}", config.database_path.display());
    let pool = match init_database(&config.database_path).await {
        Ok(pool) => {
            info!("✓ Database ready");
            pool
        }
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            return Err(e.into());
        }
    };

    let source = &config.articles;
    let articles = load_article_table(
        &source.path,
        source.kind,
        &source.table,
        source.header_in_first_row,
        &source.fields,
    )
    .await
    .with_context(|| format!("Failed to load articles from {}", source.path.display()))?;
    info!(
        "✓ Loaded {} articles from {} (topic column '{}')",
        articles.len(),
        source.path.display(),
        articles.topic_column()
    );

    if config.admin.token.as_deref().map_or(true, str::is_empty) {
        warn!("No admin token configured; /admin routes are open");
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.host, config.port))?;

    let state = AppState::new(pool, articles, profile, &config);
    let app = build_router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("nrs-study listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
