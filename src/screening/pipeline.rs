use crate::image::{ImageLoader, ImageTransforms};
use crate::models::{InferenceEngine, ModelState};
use crate::screening::types::PredictionResult;
use crate::utils::error::ScreeningError;
use crate::validation::ImageValidator;
use crate::Result;
use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;

/// 筛查流水线：校验 → 预处理 → 推理 → 分数解读
#[derive(Clone)]
pub struct PredictionPipeline {
    engine: Arc<InferenceEngine>,
    validator: ImageValidator,
}

impl PredictionPipeline {
    pub fn new(engine: Arc<InferenceEngine>) -> Self {
        Self {
            engine,
            validator: ImageValidator::new(),
        }
    }

    pub fn engine(&self) -> &Arc<InferenceEngine> {
        &self.engine
    }

    /// 处理上传的原始字节
    pub fn run_bytes(&self, bytes: &[u8]) -> Result<PredictionResult> {
        if self.engine.status() != ModelState::Ready {
            return Err(ScreeningError::ModelNotReady);
        }
        let image = ImageLoader::from_bytes(bytes)?;
        self.run(&image)
    }

    /// 处理单张已解码图像
    ///
    /// 模型未就绪时立即失败，不等待加载。
    pub fn run(&self, image: &DynamicImage) -> Result<PredictionResult> {
        if self.engine.status() != ModelState::Ready {
            return Err(ScreeningError::ModelNotReady);
        }

        let start = Instant::now();
        let verdict = self.validator.validate(image);
        if !verdict.accepted {
            tracing::info!(
                "Image rejected by validator after {}ms: {}",
                start.elapsed().as_millis(),
                verdict.reason
            );
            return Err(ScreeningError::Rejected(verdict.reason));
        }
        let validation_time = start.elapsed();

        let tensor = ImageTransforms::to_model_input(image)?;

        let inference_start = Instant::now();
        let probability = self.engine.predict(&tensor)?;
        let inference_time = inference_start.elapsed();

        let result = PredictionResult::from_probability(probability);

        tracing::info!(
            "Screening completed: stage={}, confidence={:.2}, raw={:.4}, validation={}ms, inference={}ms",
            result.stage.label(),
            result.confidence_percent,
            probability,
            validation_time.as_millis(),
            inference_time.as_millis()
        );

        Ok(result)
    }
}
