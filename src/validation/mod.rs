pub mod stages;

use image::DynamicImage;
use serde::Serialize;

pub use stages::{
    detect_fundus, detect_medical_scan, detect_regular_photo, StageOutcome, MEDICAL_SCAN_REASON,
    NOT_COLOR_REASON, NOT_FUNDUS_REASON, PHOTO_REASON, VALID_FUNDUS_MESSAGE,
};

/// 校验结论，拒绝时reason必有内容
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationVerdict {
    pub accepted: bool,
    pub reason: String,
}

impl ValidationVerdict {
    pub fn accept(message: impl Into<String>) -> Self {
        Self {
            accepted: true,
            reason: message.into(),
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reason: reason.into(),
        }
    }
}

/// 眼底图像校验器：无状态，三个阶段依次短路
///
/// 1. 普通照片（亮边框 + 多条直线）
/// 2. X光/医学扫描（明亮、低对比度的灰度图）
/// 3. 眼底正向检查（暗边框 + 圆形或红色调占比）
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageValidator;

impl ImageValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, image: &DynamicImage) -> ValidationVerdict {
        let photo = detect_regular_photo(image);
        if photo.matched {
            return ValidationVerdict::reject(photo.message);
        }

        let scan = detect_medical_scan(image);
        if scan.matched {
            return ValidationVerdict::reject(scan.message);
        }

        let fundus = detect_fundus(image);
        if fundus.matched {
            ValidationVerdict::accept(fundus.message)
        } else {
            ValidationVerdict::reject(fundus.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    /// 合成眼底图：黑色背景上的橙红色圆盘
    fn synthetic_fundus(size: u32) -> DynamicImage {
        let mut rgb = RgbImage::from_pixel(size, size, Rgb([0, 0, 0]));
        let center = size as i64 / 2;
        let radius = size as i64 * 2 / 5;
        for y in 0..size {
            for x in 0..size {
                let (dx, dy) = (x as i64 - center, y as i64 - center);
                if dx * dx + dy * dy <= radius * radius {
                    rgb.put_pixel(x, y, Rgb([190, 80, 40]));
                }
            }
        }
        DynamicImage::ImageRgb8(rgb)
    }

    #[test]
    fn accepts_dark_bordered_reddish_disc() {
        let verdict = ImageValidator::new().validate(&synthetic_fundus(200));
        assert!(verdict.accepted, "rejected: {}", verdict.reason);
        assert_eq!(verdict.reason, VALID_FUNDUS_MESSAGE);
    }

    #[test]
    fn rejects_xray_like_gray_regardless_of_borders() {
        // 暗边框 + 明亮内部，但整体仍是明亮低对比度灰度
        let mut gray = GrayImage::from_pixel(100, 100, Luma([200]));
        for y in 0..100 {
            for x in 0..100 {
                if x < 3 || y < 3 || x > 96 || y > 96 {
                    gray.put_pixel(x, y, Luma([120]));
                }
            }
        }
        let verdict = ImageValidator::new().validate(&DynamicImage::ImageLuma8(gray));
        assert!(!verdict.accepted);
        assert_eq!(verdict.reason, MEDICAL_SCAN_REASON);
    }

    #[test]
    fn rejects_uniform_black_single_channel_image() {
        let black = DynamicImage::ImageLuma8(GrayImage::new(64, 64));
        let verdict = ImageValidator::new().validate(&black);
        assert!(!verdict.accepted);
        assert_eq!(verdict.reason, NOT_COLOR_REASON);
    }

    #[test]
    fn achromatic_rgb_black_image_passes_hue_check() {
        // 无彩色像素色相为0，落在红色区间，纯黑RGB图因此通过第三阶段
        let black = DynamicImage::ImageRgb8(RgbImage::new(64, 64));
        assert!(ImageValidator::new().validate(&black).accepted);
    }

    #[test]
    fn validation_is_pure() {
        let validator = ImageValidator::new();
        let image = synthetic_fundus(160);
        assert_eq!(validator.validate(&image), validator.validate(&image));
    }
}
