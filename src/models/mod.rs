pub mod backend;
pub mod engine;

pub use backend::{ModelLoader, OnnxModel, OnnxModelLoader, ScreeningModel};
pub use engine::{EngineStats, InferenceEngine, ModelState};
