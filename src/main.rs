use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use arena_backend::api::{self, AppState};
use arena_backend::config::Config;
use arena_backend::db::Persistence;
use arena_backend::metrics;
use arena_backend::openrag::FilterService;
use arena_backend::vision::VisionService;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arena_backend=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load();
    metrics::register_metrics();

    // The server keeps running without a database; character routes then
    // answer with an error envelope.
    let store = Persistence::connect(&config.database_url).await;

    let vision = VisionService::from_config(config.langflow.as_ref());
    if !vision.is_available() {
        tracing::info!("LANGFLOW_SERVER_URL / LANGFLOW_FLOW_ID not set, vision disabled");
    }
    let filters = FilterService::from_config(config.openrag.as_ref());

    let state = AppState {
        store,
        assets: config.assets.clone(),
        vision,
        filters,
    };

    let mut app = api::router(state);

    // Monster images are served from the same prefix the sync job writes
    // into `image_url`.
    let cdn_prefix = config.assets.cdn_prefix.trim_end_matches('/');
    if cdn_prefix.starts_with('/') && cdn_prefix.len() > 1 {
        app = app.nest_service(cdn_prefix, ServeDir::new(&config.assets.monsters_dir));
    }

    // Serve the frontend build if configured, falling back to index.html
    // for client-side routing.
    if let Some(static_dir) = &config.static_dir {
        let index = static_dir.join("index.html");
        tracing::info!("Serving static files from {}", static_dir.display());
        app = app.fallback_service(
            ServeDir::new(static_dir).not_found_service(ServeFile::new(index)),
        );
    }

    let app = app.layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {addr}: {e}"));

    tracing::info!("Arena backend listening on {addr}");
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
