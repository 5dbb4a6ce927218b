use crate::{
    models::ModelState,
    screening::{PredictionPipeline, PredictionResult},
    utils::error::ScreeningError,
    Config, Result,
};
use axum::{
    body::Bytes,
    extract::{Multipart, State},
    response::Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Instant;

/// 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub pipeline: PredictionPipeline,
    pub config: Config,
}

/// 筛查响应
#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    #[serde(flatten)]
    pub result: PredictionResult,
    /// 处理耗时（秒）
    pub processing_time: f32,
}

/// 模型状态响应
#[derive(Debug, Serialize)]
pub struct ModelStatusResponse {
    pub model_loaded: bool,
    pub status: &'static str,
}

impl ModelStatusResponse {
    pub fn from_state(state: ModelState) -> Self {
        let status = match state {
            ModelState::Ready => "ready",
            ModelState::Unloaded | ModelState::Loading => "loading",
            ModelState::Failed => "failed",
        };
        Self {
            model_loaded: state == ModelState::Ready,
            status,
        }
    }
}

pub async fn root_handler() -> Json<Value> {
    Json(json!({ "message": "Welcome to the Retinopathy API" }))
}

/// 眼底图上传筛查
pub async fn analyze_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AnalyzeResponse>> {
    let start_time = Instant::now();
    let request_id = uuid::Uuid::new_v4().to_string();

    tracing::info!("Processing analyze request: request_id={}", request_id);

    let mut image_data: Option<Bytes> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ScreeningError::InvalidInput(format!("Failed to read multipart field: {}", e))
    })? {
        let field_name = field.name().unwrap_or("unknown").to_string();

        if field_name != "image" {
            tracing::debug!("Ignoring unknown field: {}", field_name);
            continue;
        }

        if field.file_name().map(str::is_empty).unwrap_or(false) {
            return Err(ScreeningError::InvalidInput("No selected file".to_string()));
        }

        let data = field.bytes().await.map_err(|e| {
            ScreeningError::InvalidInput(format!("Failed to read file data: {}", e))
        })?;

        tracing::debug!("Received image: {} bytes", data.len());
        image_data = Some(data);
    }

    let image_data =
        image_data.ok_or_else(|| ScreeningError::InvalidInput("No image part".to_string()))?;

    // 校验与推理都是CPU密集型，放到阻塞线程池
    let pipeline = state.pipeline.clone();
    let result = tokio::task::spawn_blocking(move || pipeline.run_bytes(&image_data))
        .await
        .map_err(|e| ScreeningError::Internal(format!("Screening task failed: {}", e)))??;

    let processing_time = start_time.elapsed();

    tracing::info!(
        "Analyze completed: request_id={}, stage={}, confidence={:.2}, time={:.3}s",
        request_id,
        result.stage.label(),
        result.confidence_percent,
        processing_time.as_secs_f32()
    );

    Ok(Json(AnalyzeResponse {
        result,
        processing_time: processing_time.as_secs_f32(),
    }))
}

/// 强制加载并预热模型
pub async fn warmup_handler(State(state): State<AppState>) -> Result<Json<Value>> {
    let engine = state.pipeline.engine().clone();

    let ready = tokio::task::spawn_blocking(move || {
        if engine.ensure_ready() {
            engine.warm_up().map(|_| true)
        } else {
            Err(ScreeningError::ModelLoad(
                engine
                    .last_error()
                    .unwrap_or_else(|| "model is unavailable".to_string()),
            ))
        }
    })
    .await
    .map_err(|e| ScreeningError::Internal(format!("Warm-up task failed: {}", e)))??;

    tracing::info!("Warm-up request finished: ready={}", ready);
    Ok(Json(json!({ "status": "Model warmed up successfully" })))
}

/// 模型加载状态，不阻塞
pub async fn model_status_handler(State(state): State<AppState>) -> Json<ModelStatusResponse> {
    let stats = state.pipeline.engine().stats();
    tracing::debug!(
        "Model status: state={:?}, loads={}, load_time={}ms",
        stats.state,
        stats.load_count,
        stats.load_time_ms
    );
    Json(ModelStatusResponse::from_state(stats.state))
}
