use image::GrayImage;
use std::collections::VecDeque;

/// 边框条带厚度 = 较短边 / 10（整除）
pub fn border_size(width: u32, height: u32) -> u32 {
    width.min(height) / 10
}

/// 上、下、左、右四条边框的平均亮度
///
/// 四条条带分别采样后拼接再求均值，角落像素在横向和纵向条带中各计一次。
/// 厚度为0时，下边框与右边框退化为整幅图像（负零切片），结果即全图均值。
pub fn border_mean(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return 0.0;
    }

    let size = border_size(width, height);
    if size == 0 {
        let total: u64 = gray.pixels().map(|p| p.0[0] as u64).sum();
        return total as f64 / (width as u64 * height as u64) as f64;
    }

    let mut sum = 0u64;
    let mut count = 0u64;

    for y in (0..size).chain(height - size..height) {
        for x in 0..width {
            sum += gray.get_pixel(x, y).0[0] as u64;
        }
        count += width as u64;
    }
    for x in (0..size).chain(width - size..width) {
        for y in 0..height {
            sum += gray.get_pixel(x, y).0[0] as u64;
        }
        count += height as u64;
    }

    sum as f64 / count as f64
}

/// Sobel 3x3 梯度（边界复制）
pub struct Gradients {
    pub width: usize,
    pub height: usize,
    pub dx: Vec<i32>,
    pub dy: Vec<i32>,
}

impl Gradients {
    pub fn sobel(gray: &GrayImage) -> Self {
        let (width, height) = (gray.width() as usize, gray.height() as usize);
        let mut dx = vec![0i32; width * height];
        let mut dy = vec![0i32; width * height];

        let at = |x: isize, y: isize| -> i32 {
            let cx = x.clamp(0, width as isize - 1) as u32;
            let cy = y.clamp(0, height as isize - 1) as u32;
            gray.get_pixel(cx, cy).0[0] as i32
        };

        for y in 0..height as isize {
            for x in 0..width as isize {
                let gx = (at(x + 1, y - 1) + 2 * at(x + 1, y) + at(x + 1, y + 1))
                    - (at(x - 1, y - 1) + 2 * at(x - 1, y) + at(x - 1, y + 1));
                let gy = (at(x - 1, y + 1) + 2 * at(x, y + 1) + at(x + 1, y + 1))
                    - (at(x - 1, y - 1) + 2 * at(x, y - 1) + at(x + 1, y - 1));
                let idx = y as usize * width + x as usize;
                dx[idx] = gx;
                dy[idx] = gy;
            }
        }

        Self { width, height, dx, dy }
    }

    /// L1梯度幅值
    fn magnitude(&self) -> Vec<i32> {
        self.dx
            .iter()
            .zip(&self.dy)
            .map(|(gx, gy)| gx.abs() + gy.abs())
            .collect()
    }
}

/// 二值边缘图
#[derive(Debug, Clone)]
pub struct EdgeMap {
    pub width: usize,
    pub height: usize,
    pub edges: Vec<bool>,
}

impl EdgeMap {
    pub fn is_edge(&self, x: usize, y: usize) -> bool {
        self.edges[y * self.width + x]
    }

    pub fn count(&self) -> usize {
        self.edges.iter().filter(|e| **e).count()
    }

    /// 按光栅顺序返回所有边缘点坐标
    pub fn points(&self) -> Vec<(usize, usize)> {
        let mut points = Vec::new();
        for y in 0..self.height {
            for x in 0..self.width {
                if self.is_edge(x, y) {
                    points.push((x, y));
                }
            }
        }
        points
    }
}

/// Canny边缘检测（Sobel孔径3，L1幅值，非极大值抑制 + 滞后阈值）
pub fn canny(gray: &GrayImage, low: i32, high: i32) -> EdgeMap {
    let gradients = Gradients::sobel(gray);
    canny_from_gradients(&gradients, low, high)
}

pub fn canny_from_gradients(gradients: &Gradients, low: i32, high: i32) -> EdgeMap {
    // tan(22.5°) 的Q15定点表示
    const TG22: i64 = 13573;

    let (width, height) = (gradients.width, gradients.height);
    let magnitude = gradients.magnitude();
    let mag = |x: isize, y: isize| -> i32 {
        if x < 0 || y < 0 || x >= width as isize || y >= height as isize {
            0
        } else {
            magnitude[y as usize * width + x as usize]
        }
    };

    // 0: 非边缘, 1: 弱边缘候选, 2: 强边缘
    let mut marks = vec![0u8; width * height];
    let mut queue = VecDeque::new();

    for y in 0..height as isize {
        for x in 0..width as isize {
            let idx = y as usize * width + x as usize;
            let m = magnitude[idx];
            if m <= low {
                continue;
            }

            let gx = gradients.dx[idx] as i64;
            let gy = gradients.dy[idx] as i64;
            let (ax, ay) = (gx.abs(), gy.abs());
            let tg22x = ax * TG22;
            let y_shifted = ay << 15;

            let is_max = if y_shifted < tg22x {
                m > mag(x - 1, y) && m >= mag(x + 1, y)
            } else {
                let tg67x = tg22x + (ax << 16);
                if y_shifted > tg67x {
                    m > mag(x, y - 1) && m >= mag(x, y + 1)
                } else {
                    let s: isize = if (gx ^ gy) < 0 { -1 } else { 1 };
                    m > mag(x - s, y - 1) && m > mag(x + s, y + 1)
                }
            };

            if !is_max {
                continue;
            }
            if m > high {
                marks[idx] = 2;
                queue.push_back(idx);
            } else {
                marks[idx] = 1;
            }
        }
    }

    // 从强边缘出发沿8邻域连通弱边缘
    while let Some(idx) = queue.pop_front() {
        let (x, y) = ((idx % width) as isize, (idx / width) as isize);
        for dy in -1isize..=1 {
            for dx in -1isize..=1 {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= width as isize || ny >= height as isize {
                    continue;
                }
                let nidx = ny as usize * width + nx as usize;
                if marks[nidx] == 1 {
                    marks[nidx] = 2;
                    queue.push_back(nidx);
                }
            }
        }
    }

    EdgeMap {
        width,
        height,
        edges: marks.into_iter().map(|m| m == 2).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn border_mean_double_counts_corners() {
        // 20x20图像，边框厚度2，仅左上角像素为255
        let mut gray = GrayImage::new(20, 20);
        gray.put_pixel(0, 0, Luma([255]));
        let count = 2 * 2 * 20 + 2 * 2 * 20;
        let expected = 2.0 * 255.0 / count as f64;
        assert!((border_mean(&gray) - expected).abs() < 1e-9);
    }

    #[test]
    fn border_mean_ignores_interior() {
        let mut gray = GrayImage::from_pixel(100, 60, Luma([10]));
        for y in 10..50 {
            for x in 10..90 {
                gray.put_pixel(x, y, Luma([250]));
            }
        }
        assert!((border_mean(&gray) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn tiny_images_fall_back_to_full_mean() {
        let mut gray = GrayImage::from_pixel(4, 4, Luma([0]));
        gray.put_pixel(2, 2, Luma([160]));
        assert!((border_mean(&gray) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn canny_finds_vertical_step_edge() {
        let mut gray = GrayImage::from_pixel(40, 40, Luma([0]));
        for y in 0..40 {
            for x in 20..40 {
                gray.put_pixel(x, y, Luma([200]));
            }
        }
        let edges = canny(&gray, 50, 150);
        assert!(edges.count() > 0);
        for (x, _) in edges.points() {
            assert!((19..=20).contains(&x), "edge at unexpected column {}", x);
        }
    }

    #[test]
    fn canny_on_flat_image_is_empty() {
        let gray = GrayImage::from_pixel(32, 32, Luma([128]));
        assert_eq!(canny(&gray, 50, 150).count(), 0);
    }
}
