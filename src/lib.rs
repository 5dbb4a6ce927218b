pub mod config;
pub mod image;
pub mod models;
pub mod screening;
pub mod utils;
pub mod validation;
pub mod web;

// 重新导出主要类型
pub use config::Config;
pub use models::{InferenceEngine, ModelState};
pub use screening::{DrStage, PredictionPipeline, PredictionResult};
pub use utils::error::ScreeningError;
pub use validation::{ImageValidator, ValidationVerdict};

pub type Result<T> = std::result::Result<T, ScreeningError>;
