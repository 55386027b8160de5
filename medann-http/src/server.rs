use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use medann::Classifier;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::handlers::{classify, health, labels, page_handler, AppState};
use crate::openapi::openapi_json;

pub const DEFAULT_BODY_LIMIT_MB: usize = 20;

#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub bind_addr: String,
    pub body_limit_mb: usize,
    /// Shown in the startup banner.
    pub embeddings_dir: String,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8501".to_string(),
            body_limit_mb: DEFAULT_BODY_LIMIT_MB,
            embeddings_dir: "./embeddings".to_string(),
        }
    }
}

/// `RUST_LOG` filter, defaulting to `info`. Logs go to stderr so stdout
/// stays machine-readable for `classify --json`.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

pub fn router(state: Arc<AppState>, body_limit_mb: usize) -> Router {
    Router::new()
        .route("/", get(page_handler))
        .route("/classify", post(classify))
        .route("/labels", get(labels))
        .route("/health", get(health))
        .route("/api-docs/openapi.json", get(openapi_json))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit_bytes(body_limit_mb)))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive().max_age(std::time::Duration::from_secs(86400)))
}

fn body_limit_bytes(mb: usize) -> usize {
    mb.saturating_mul(1024 * 1024)
}

pub async fn serve(
    classifier: Classifier,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let startup_start = std::time::Instant::now();
    let state = Arc::new(AppState::new(classifier));

    tracing::info!(
        corpus_size = state.classifier.corpus().len(),
        dimensions = state.classifier.corpus().dimensions(),
        backbone = state.classifier.extractor().backbone_name(),
        "Classifier ready"
    );

    let app = router(Arc::clone(&state), options.body_limit_mb);
    let listener = tokio::net::TcpListener::bind(&options.bind_addr).await?;
    let local_addr = listener.local_addr()?;

    print_startup_banner(
        &options,
        local_addr,
        &state,
        startup_start.elapsed().as_millis(),
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

fn print_startup_banner(
    options: &ServeOptions,
    local_addr: std::net::SocketAddr,
    state: &AppState,
    startup_ms: u128,
) {
    use colored::Colorize;

    // The resolved address, so `--auto-port` runs print the real port.
    let url = format!("http://{}", local_addr);
    let version = format!("v{}", env!("CARGO_PKG_VERSION"));
    let timing = format!("ready in {}ms", startup_ms);
    let corpus = state.classifier.corpus();

    println!();
    println!(
        "  {} {}  {}",
        "🩻 medann".bold().bright_green(),
        version.as_str().dimmed(),
        timing.as_str().dimmed(),
    );
    println!();
    println!("  {}  Upload:     {}", "➜".green(), url.as_str().cyan());
    let docs = format!("{}/api-docs/openapi.json", url);
    println!("  {}  API Docs:   {}", "➜".green(), docs.as_str().cyan());
    println!();
    println!(
        "  {}  Corpus:     {} samples, {} dims ({})",
        "📦".bold(),
        corpus.len().to_string().bold(),
        corpus.dimensions(),
        options.embeddings_dir.as_str().cyan(),
    );
    for (label, count) in corpus.corpus().class_counts() {
        println!(
            "     • {:<16} {}",
            medann::display_name(&label),
            count.to_string().dimmed()
        );
    }
    println!(
        "  {}  Backbone:   {}",
        "🧠".bold(),
        state.classifier.extractor().backbone_name().cyan()
    );
    println!();
}
