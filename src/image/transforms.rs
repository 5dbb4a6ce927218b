use crate::utils::error::ScreeningError;
use crate::Result;
use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::{Array3, Array4, Axis};

/// 模型输入边长
pub const MODEL_INPUT_SIZE: u32 = 224;

/// 图像变换工具集
pub struct ImageTransforms;

impl ImageTransforms {
    /// 缩放到模型输入尺寸，归一化到[0,1]，并添加batch维度
    ///
    /// 输出布局为NHWC: `[1, 224, 224, 3]`。
    pub fn to_model_input(image: &DynamicImage) -> Result<Array4<f32>> {
        let resized = image
            .resize_exact(MODEL_INPUT_SIZE, MODEL_INPUT_SIZE, FilterType::Lanczos3)
            .to_rgb8();

        let side = MODEL_INPUT_SIZE as usize;
        let normalized: Vec<f32> = resized
            .into_raw()
            .into_iter()
            .map(|v| v as f32 / 255.0)
            .collect();

        let array = Array3::from_shape_vec((side, side, 3), normalized).map_err(|e| {
            ScreeningError::ImageProcessing(format!("Failed to build input tensor: {}", e))
        })?;

        Ok(array.insert_axis(Axis(0)))
    }

    /// 预热用的均匀分布随机输入
    pub fn random_input() -> Array4<f32> {
        use rand::Rng;

        let side = MODEL_INPUT_SIZE as usize;
        let mut rng = rand::thread_rng();
        Array4::from_shape_simple_fn((1, side, side, 3), || rng.gen::<f32>())
    }
}
