//! aichat server - Entry Point
//!
//! Loads configuration, picks the inference and search capabilities once, and
//! serves the chat API.

use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aichat::inference::engine::LlamaEngine;
use aichat::inference::simulated::SimulatedInference;
use aichat::inference::{Inference, LocalInference};
use aichat::research::{DisabledSearch, DuckDuckGoSearch, WebSearch};
use aichat::server::{create_router, AppState};
use aichat::storage::settings::{load_config, ServerConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aichat=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config();

    if let Err(e) = run(config).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config.socket_addr()?;

    let inference: Arc<dyn Inference> = match LlamaEngine::new(
        config.gpu_layers,
        config.context_size,
        config.data_dir.join("models"),
    ) {
        Ok(engine) => Arc::new(LocalInference::new(
            engine.with_hub_aliases(config.hub_aliases.clone()),
            config.models_dir.clone(),
        )),
        Err(e) => {
            warn!("Native backend unavailable, using simulated responses: {}", e);
            Arc::new(SimulatedInference)
        }
    };

    let search: Arc<dyn WebSearch> = if config.deep_research_enabled {
        Arc::new(DuckDuckGoSearch::new(config.search_url.clone()))
    } else {
        info!("Deep research disabled");
        Arc::new(DisabledSearch)
    };

    info!(
        "Starting aichat on {} (base {}, backend {}, models in {})",
        addr,
        config.base_url,
        inference.backend_name(),
        config.models_dir.display()
    );

    let app = create_router(AppState::new(config, inference, search));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    Ok(())
}
