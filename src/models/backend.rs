use crate::image::MODEL_INPUT_SIZE;
use crate::utils::error::ScreeningError;
use crate::{Config, Result};
use ndarray::Array4;
use ort::{
    inputs,
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

/// 视网膜病变分类模型：输入 `[1,224,224,3]`，输出单个概率值
pub trait ScreeningModel: Send + Sync {
    fn predict(&self, input: &Array4<f32>) -> Result<f32>;
}

/// 模型构建器，由推理引擎在加载阶段调用一次
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> Result<Arc<dyn ScreeningModel>>;

    /// 用于日志的模型描述
    fn describe(&self) -> String;
}

/// 基于ONNX Runtime的分类模型
pub struct OnnxModel {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxModel {
    pub fn new(config: &Config) -> Result<Self> {
        let model_path = &config.model_path;

        if !model_path.exists() {
            return Err(ScreeningError::ModelLoad(format!(
                "Screening model not found: {}",
                model_path.display()
            )));
        }

        tracing::info!("Loading screening model from: {}", model_path.display());

        let session = Session::builder()?
            .with_optimization_level(optimization_level(config.onnx_config.optimization_level))?
            .with_intra_threads(config.onnx_config.intra_threads)?
            .commit_from_file(model_path)?;

        // 动态发现输入输出名称
        let input_name = match session.inputs.first() {
            Some(input) => input.name.clone(),
            None => {
                return Err(ScreeningError::ModelLoad(
                    "Screening model has no inputs".to_string(),
                ))
            }
        };
        let output_name = match session.outputs.first() {
            Some(output) => output.name.clone(),
            None => {
                return Err(ScreeningError::ModelLoad(
                    "Screening model has no outputs".to_string(),
                ))
            }
        };
        tracing::info!(
            "Screening model input: '{}', output: '{}'",
            input_name,
            output_name
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }
}

impl ScreeningModel for OnnxModel {
    fn predict(&self, input: &Array4<f32>) -> Result<f32> {
        let input_tensor = Tensor::from_array(input.clone())?;

        let mut session = self.session.lock();
        let outputs = session.run(inputs![self.input_name.as_str() => input_tensor])?;

        let output = match outputs.get(&self.output_name) {
            Some(output) => output.try_extract_array::<f32>()?,
            None => {
                let available: Vec<String> = outputs.keys().map(|s| s.to_string()).collect();
                return Err(ScreeningError::Inference(format!(
                    "Output '{}' not found. Available outputs: {:?}",
                    self.output_name, available
                )));
            }
        };

        // 单输出单元 `[1, 1]`
        output.iter().next().copied().ok_or_else(|| {
            ScreeningError::Inference("Model returned an empty output tensor".to_string())
        })
    }
}

fn optimization_level(level: i32) -> GraphOptimizationLevel {
    match level {
        0 => GraphOptimizationLevel::Disable,
        1 => GraphOptimizationLevel::Level1,
        2 => GraphOptimizationLevel::Level2,
        _ => GraphOptimizationLevel::Level3,
    }
}

/// 从磁盘加载ONNX模型
pub struct OnnxModelLoader {
    config: Config,
}

impl OnnxModelLoader {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn model_path(&self) -> &PathBuf {
        &self.config.model_path
    }
}

impl ModelLoader for OnnxModelLoader {
    fn load(&self) -> Result<Arc<dyn ScreeningModel>> {
        let model = OnnxModel::new(&self.config)?;
        Ok(Arc::new(model))
    }

    fn describe(&self) -> String {
        format!(
            "onnx:{} ({}x{}x3)",
            self.model_path().display(),
            MODEL_INPUT_SIZE,
            MODEL_INPUT_SIZE
        )
    }
}
