#![allow(dead_code)]

use image::{DynamicImage, GrayImage, ImageFormat, Rgb, RgbImage};
use ndarray::Array4;
use retina_screen::models::{ModelLoader, ScreeningModel};
use retina_screen::{InferenceEngine, Result, ScreeningError};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 记录调用次数的测试模型
pub struct CountingModel {
    score: f32,
    predictions: Arc<AtomicUsize>,
}

impl ScreeningModel for CountingModel {
    fn predict(&self, _input: &Array4<f32>) -> Result<f32> {
        self.predictions.fetch_add(1, Ordering::SeqCst);
        Ok(self.score)
    }
}

/// 可配置延迟与失败的测试加载器
pub struct CountingLoader {
    pub score: f32,
    pub delay: Duration,
    pub fail: bool,
    pub loads: Arc<AtomicUsize>,
    pub predictions: Arc<AtomicUsize>,
}

impl ModelLoader for CountingLoader {
    fn load(&self) -> Result<Arc<dyn ScreeningModel>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        if self.fail {
            return Err(ScreeningError::ModelLoad("simulated load failure".to_string()));
        }
        Ok(Arc::new(CountingModel {
            score: self.score,
            predictions: Arc::clone(&self.predictions),
        }))
    }

    fn describe(&self) -> String {
        "counting-test-model".to_string()
    }
}

pub struct Harness {
    pub engine: Arc<InferenceEngine>,
    pub loads: Arc<AtomicUsize>,
    pub predictions: Arc<AtomicUsize>,
}

impl Harness {
    pub fn new(score: f32, delay: Duration, fail: bool) -> Self {
        let loads = Arc::new(AtomicUsize::new(0));
        let predictions = Arc::new(AtomicUsize::new(0));
        let loader = CountingLoader {
            score,
            delay,
            fail,
            loads: Arc::clone(&loads),
            predictions: Arc::clone(&predictions),
        };
        Self {
            engine: Arc::new(InferenceEngine::new(Box::new(loader))),
            loads,
            predictions,
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn predictions(&self) -> usize {
        self.predictions.load(Ordering::SeqCst)
    }
}

/// 黑色背景上的橙红色圆盘
pub fn synthetic_fundus(size: u32) -> DynamicImage {
    let mut rgb = RgbImage::from_pixel(size, size, Rgb([0, 0, 0]));
    let center = size as i64 / 2;
    let radius = size as i64 * 3 / 8;
    for y in 0..size {
        for x in 0..size {
            let (dx, dy) = (x as i64 - center, y as i64 - center);
            if dx * dx + dy * dy <= radius * radius {
                rgb.put_pixel(x, y, Rgb([185, 75, 35]));
            }
        }
    }
    DynamicImage::ImageRgb8(rgb)
}

pub fn black_gray(size: u32) -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::new(size, size))
}

pub fn encode_png(image: &DynamicImage) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .expect("encode png");
    buffer.into_inner()
}
