pub mod handlers;
pub mod middleware;

use crate::{
    models::{InferenceEngine, ModelState, OnnxModelLoader},
    screening::PredictionPipeline,
    utils::error::ScreeningError,
    Config, Result,
};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer};

pub use handlers::AppState;

pub async fn serve(config: Config) -> Result<()> {
    // 模型在后台线程加载，服务立即开始监听
    let engine = Arc::new(InferenceEngine::new(Box::new(OnnxModelLoader::new(
        config.clone(),
    ))));
    engine.start_background_load()?;

    let state = AppState {
        pipeline: PredictionPipeline::new(Arc::clone(&engine)),
        config: config.clone(),
    };
    let app = create_app(state)?;

    let addr: SocketAddr = config.bind_addr.parse().map_err(|e| {
        ScreeningError::Config(format!("Invalid bind address {}: {}", config.bind_addr, e))
    })?;

    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("API endpoints:");
    tracing::info!("  POST /api/analyze       - Multipart fundus image upload");
    tracing::info!("  GET  /api/warmup        - Load and warm up the model");
    tracing::info!("  GET  /api/model-status  - Model loading status");

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        ScreeningError::Internal(format!("Failed to bind to address {}: {}", addr, e))
    })?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ScreeningError::Internal(format!("Server failed: {}", e)))?;

    // 关停时回收后台加载线程
    let engine_for_join = Arc::clone(&engine);
    let loader_state = tokio::task::spawn_blocking(move || engine_for_join.join_background_load())
        .await
        .map_err(|e| ScreeningError::Internal(format!("Failed to join model loader: {}", e)))?;
    match loader_state {
        Some(ModelState::Failed) => tracing::warn!(
            "Model loader finished in failed state: {}",
            engine.last_error().unwrap_or_default()
        ),
        Some(state) => tracing::info!("Model loader finished: {:?}", state),
        None => {}
    }

    tracing::info!("Server stopped");
    Ok(())
}

/// 构建应用路由
pub fn create_app(state: AppState) -> Result<Router> {
    let max_request_size = state.config.server_config.max_request_size;
    let request_timeout = Duration::from_secs(state.config.server_config.request_timeout);

    let origin = HeaderValue::from_str(&state.config.cors_origin).map_err(|e| {
        ScreeningError::Config(format!(
            "Invalid CORS origin {}: {}",
            state.config.cors_origin, e
        ))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    let api = Router::new()
        .route("/analyze", post(handlers::analyze_handler))
        .route(
            "/warmup",
            get(handlers::warmup_handler).post(handlers::warmup_handler),
        )
        .route("/model-status", get(handlers::model_status_handler));

    let app = Router::new()
        .route("/", get(handlers::root_handler))
        .nest("/api", api)
        .layer(from_fn(middleware::security_headers))
        .layer(from_fn(middleware::request_logging))
        // multipart默认2MB上限，改由RequestBodyLimitLayer统一控制
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_request_size))
        .layer(from_fn_with_state(request_timeout, middleware::request_timeout))
        .layer(cors)
        .with_state(state);

    Ok(app)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
