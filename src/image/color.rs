use image::{DynamicImage, GrayImage, Luma, RgbImage};

/// 判定灰度图时两个通道间允许的最大差值
pub const GRAYSCALE_TOLERANCE: u8 = 5;

/// RGB转灰度（BT.601，14位定点系数，与OpenCV的8位实现逐像素一致）
pub fn rgb_to_gray(rgb: &RgbImage) -> GrayImage {
    const R: u32 = 4899;
    const G: u32 = 9617;
    const B: u32 = 1868;
    const SHIFT: u32 = 14;

    let (width, height) = rgb.dimensions();
    let mut gray = GrayImage::new(width, height);
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let luma = (r as u32 * R + g as u32 * G + b as u32 * B + (1 << (SHIFT - 1))) >> SHIFT;
        gray.put_pixel(x, y, Luma([luma.min(255) as u8]));
    }
    gray
}

/// 任意输入转灰度；单通道图像直接复用
pub fn to_gray(image: &DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        other if is_single_channel(other) => other.to_luma8(),
        other => rgb_to_gray(&other.to_rgb8()),
    }
}

pub fn is_single_channel(image: &DynamicImage) -> bool {
    image.color().channel_count() <= 2
}

/// 是否为灰度图：单通道，或R、G两通道逐像素差值都在容差内
pub fn is_grayscale(image: &DynamicImage) -> bool {
    if is_single_channel(image) {
        return true;
    }
    let rgb = image.to_rgb8();
    rgb.pixels()
        .all(|p| p.0[0].abs_diff(p.0[1]) <= GRAYSCALE_TOLERANCE)
}

/// 计算8位HSV色相通道，取值范围[0,180]
pub fn hue_channel(rgb: &RgbImage) -> GrayImage {
    let (width, height) = rgb.dimensions();
    let mut hue = GrayImage::new(width, height);
    for (x, y, pixel) in rgb.enumerate_pixels() {
        hue.put_pixel(x, y, Luma([rgb_to_hue(pixel.0)]));
    }
    hue
}

fn rgb_to_hue([r, g, b]: [u8; 3]) -> u8 {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let v = r.max(g).max(b);
    let vmin = r.min(g).min(b);
    let diff = v - vmin;
    if diff <= f32::EPSILON {
        return 0;
    }

    let scale = 60.0 / diff;
    let mut h = if v == r {
        (g - b) * scale
    } else if v == g {
        (b - r) * scale + 120.0
    } else {
        (r - g) * scale + 240.0
    };
    if h < 0.0 {
        h += 360.0;
    }

    (h * 0.5).round_ties_even().clamp(0.0, 255.0) as u8
}

/// 灰度均值与总体标准差
pub fn mean_std(gray: &GrayImage) -> (f64, f64) {
    let count = (gray.width() as u64 * gray.height() as u64) as f64;
    if count == 0.0 {
        return (0.0, 0.0);
    }

    let (sum, sum_sq) = gray.pixels().fold((0.0f64, 0.0f64), |(s, sq), p| {
        let v = p.0[0] as f64;
        (s + v, sq + v * v)
    });
    let mean = sum / count;
    let variance = (sum_sq / count - mean * mean).max(0.0);
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn gray_conversion_matches_bt601() {
        let mut rgb = RgbImage::new(3, 1);
        rgb.put_pixel(0, 0, Rgb([255, 0, 0]));
        rgb.put_pixel(1, 0, Rgb([0, 255, 0]));
        rgb.put_pixel(2, 0, Rgb([255, 255, 255]));
        let gray = rgb_to_gray(&rgb);
        assert_eq!(gray.get_pixel(0, 0).0[0], 76);
        assert_eq!(gray.get_pixel(1, 0).0[0], 150);
        assert_eq!(gray.get_pixel(2, 0).0[0], 255);
    }

    #[test]
    fn hue_uses_half_degree_scale() {
        assert_eq!(rgb_to_hue([255, 0, 0]), 0);
        assert_eq!(rgb_to_hue([0, 255, 0]), 60);
        assert_eq!(rgb_to_hue([0, 0, 255]), 120);
        assert_eq!(rgb_to_hue([255, 0, 255]), 150);
        // 无彩色像素色相为0
        assert_eq!(rgb_to_hue([90, 90, 90]), 0);
    }

    #[test]
    fn grayscale_detection_tolerates_small_channel_drift() {
        let near_gray = RgbImage::from_pixel(4, 4, Rgb([120, 124, 200]));
        assert!(is_grayscale(&DynamicImage::ImageRgb8(near_gray)));

        let colored = RgbImage::from_pixel(4, 4, Rgb([120, 126, 120]));
        assert!(!is_grayscale(&DynamicImage::ImageRgb8(colored)));

        assert!(is_grayscale(&DynamicImage::ImageLuma8(GrayImage::new(2, 2))));
    }

    #[test]
    fn mean_and_population_std() {
        let mut gray = GrayImage::new(2, 1);
        gray.put_pixel(0, 0, Luma([0]));
        gray.put_pixel(1, 0, Luma([200]));
        let (mean, std) = mean_std(&gray);
        assert!((mean - 100.0).abs() < 1e-9);
        assert!((std - 100.0).abs() < 1e-9);
    }
}
