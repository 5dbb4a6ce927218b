use crate::image::color::{hue_channel, is_grayscale, is_single_channel, mean_std, to_gray};
use crate::image::features::{border_mean, canny};
use crate::image::hough::{hough_circles, hough_lines_p, CircleParams, LineParams};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage};
use std::borrow::Cow;

pub const PHOTO_REASON: &str = "This appears to be a photograph with straight lines.";
pub const MEDICAL_SCAN_REASON: &str = "This appears to be an X-ray or medical scan image.";
pub const NOT_COLOR_REASON: &str = "Image must be in color.";
pub const NOT_FUNDUS_REASON: &str = "The image does not appear to be a retinal fundus photograph.";
pub const VALID_FUNDUS_MESSAGE: &str = "Valid fundus image";

/// 边框均值低于该值视为暗边框
const DARK_BORDER_THRESHOLD: f64 = 50.0;

/// 超过该数量的直线判定为普通照片
const MAX_STRAIGHT_LINES: usize = 5;

const CANNY_LOW: i32 = 50;
const CANNY_HIGH: i32 = 150;

const MEDICAL_MIN_MEAN: f64 = 100.0;
const MEDICAL_MAX_STD: f64 = 60.0;

/// 视网膜组织的色相范围（红、粉、橙）
const HUE_RANGES: [(u8, u8); 2] = [(0, 50), (150, 180)];
const MIN_HUE_FRACTION: f64 = 0.1;

/// 圆检测所用图像的最长边上限，大图先缩小再检测
pub const MAX_CIRCLE_ANALYSIS_SIDE: u32 = 512;

/// 单个检测阶段的结果
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    pub matched: bool,
    pub message: String,
}

impl StageOutcome {
    pub fn no_match() -> Self {
        Self {
            matched: false,
            message: String::new(),
        }
    }

    pub fn matched(message: &str) -> Self {
        Self {
            matched: true,
            message: message.to_string(),
        }
    }
}

/// 阶段一：带直线的普通照片
///
/// 暗边框直接放行（不再统计直线），否则直线数超过5即判为照片。
pub fn detect_regular_photo(image: &DynamicImage) -> StageOutcome {
    let gray = to_gray(image);

    let borders = border_mean(&gray);
    if borders < DARK_BORDER_THRESHOLD {
        tracing::debug!(border_mean = borders, "Dark borders, skipping photo check");
        return StageOutcome::no_match();
    }

    let edges = canny(&gray, CANNY_LOW, CANNY_HIGH);
    let lines = hough_lines_p(
        &edges,
        &LineParams {
            rho: 1.0,
            theta: std::f32::consts::PI / 180.0,
            threshold: 100,
            min_line_length: 100,
            max_line_gap: 10,
        },
    );

    tracing::debug!(border_mean = borders, lines = lines.len(), "Photo check");
    if lines.len() > MAX_STRAIGHT_LINES {
        return StageOutcome::matched(PHOTO_REASON);
    }
    StageOutcome::no_match()
}

/// 阶段二：X光/医学扫描（明亮且低对比度的灰度图）
pub fn detect_medical_scan(image: &DynamicImage) -> StageOutcome {
    if !is_grayscale(image) {
        return StageOutcome::no_match();
    }
    let gray = to_gray(image);

    let (mean, std) = mean_std(&gray);
    tracing::debug!(mean, std, "Medical scan check");
    if mean > MEDICAL_MIN_MEAN && std < MEDICAL_MAX_STD {
        return StageOutcome::matched(MEDICAL_SCAN_REASON);
    }
    StageOutcome::no_match()
}

/// 阶段三：眼底正向检查，matched=true 表示是有效眼底图
pub fn detect_fundus(image: &DynamicImage) -> StageOutcome {
    if is_single_channel(image) {
        return StageOutcome {
            matched: false,
            message: NOT_COLOR_REASON.to_string(),
        };
    }

    let rgb = image.to_rgb8();
    let hue = hue_channel(&rgb);
    let gray = to_gray(image);
    let (width, height) = gray.dimensions();

    let has_dark_borders = border_mean(&gray) < DARK_BORDER_THRESHOLD;

    let analysis = circle_analysis_image(&gray);
    let min_dim = analysis.width().min(analysis.height()) as i32;
    let circles = hough_circles(
        &analysis,
        &CircleParams {
            min_dist: (min_dim / 2) as f32,
            canny_threshold: 40,
            acc_threshold: 20,
            min_radius: min_dim / 5,
            max_radius: (min_dim as f64 * 0.8) as i32,
        },
    );

    let total = (width as u64 * height as u64).max(1) as f64;
    let matching = hue
        .pixels()
        .filter(|p| {
            let h = p.0[0];
            HUE_RANGES.iter().any(|(lo, hi)| (*lo..=*hi).contains(&h))
        })
        .count();
    let hue_fraction = matching as f64 / total;

    tracing::debug!(
        has_dark_borders,
        circles = circles.len(),
        hue_fraction,
        "Fundus check"
    );

    if has_dark_borders && (!circles.is_empty() || hue_fraction > MIN_HUE_FRACTION) {
        return StageOutcome::matched(VALID_FUNDUS_MESSAGE);
    }
    StageOutcome {
        matched: false,
        message: NOT_FUNDUS_REASON.to_string(),
    }
}

/// 圆检测的输入：最长边不超过 MAX_CIRCLE_ANALYSIS_SIDE，圆参数按缩小后的尺寸计算
pub fn circle_analysis_image(gray: &GrayImage) -> Cow<'_, GrayImage> {
    let (width, height) = gray.dimensions();
    let longest = width.max(height);
    if longest <= MAX_CIRCLE_ANALYSIS_SIDE {
        return Cow::Borrowed(gray);
    }
    let scale = MAX_CIRCLE_ANALYSIS_SIDE as f64 / longest as f64;
    let new_width = ((width as f64 * scale).round() as u32).max(1);
    let new_height = ((height as f64 * scale).round() as u32).max(1);
    Cow::Owned(imageops::resize(gray, new_width, new_height, FilterType::Triangle))
}
