use anyhow::Result;
use clap::Parser;
use retina_screen::{config::Config, web::serve};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "retina-screen")]
#[command(about = "Diabetic retinopathy screening service for fundus photographs")]
struct Args {
    /// Server bind address
    #[arg(long, default_value = "0.0.0.0:5000")]
    bind: String,

    /// Path to the ONNX screening model
    #[arg(long, default_value = "model/diabetic-retino-model.onnx")]
    model_path: String,

    /// Number of worker threads
    #[arg(long)]
    workers: Option<usize>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Allowed CORS origin (frontend URL)
    #[arg(long, default_value = "http://localhost:5173")]
    cors_origin: String,

    /// Enable development mode
    #[arg(long)]
    dev: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志系统
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_target(false)
        .init();

    tracing::info!("Starting retinopathy screening service...");
    tracing::info!("Bind address: {}", args.bind);
    tracing::info!("Model path: {}", args.model_path);

    let config = Config::new(
        args.bind,
        args.model_path,
        args.workers,
        args.cors_origin,
        args.dev,
    )?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers)
        .enable_all()
        .build()?;

    runtime.block_on(serve(config))?;

    Ok(())
}
