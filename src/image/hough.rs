use crate::image::features::{canny_from_gradients, EdgeMap, Gradients};
use image::GrayImage;

/// 线段端点 (x1, y1, x2, y2)
pub type LineSegment = [i32; 4];

/// 概率霍夫直线参数
#[derive(Debug, Clone, Copy)]
pub struct LineParams {
    pub rho: f32,
    pub theta: f32,
    pub threshold: i32,
    pub min_line_length: i32,
    pub max_line_gap: i32,
}

/// 梯度霍夫圆参数
#[derive(Debug, Clone, Copy)]
pub struct CircleParams {
    pub min_dist: f32,
    /// Canny高阈值，低阈值取其一半
    pub canny_threshold: i32,
    pub acc_threshold: i32,
    pub min_radius: i32,
    pub max_radius: i32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
}

/// 乘-进位随机数生成器，固定种子保证检测结果可复现
struct MwcRng {
    state: u64,
}

impl MwcRng {
    const COEFF: u64 = 4_164_903_690;

    fn new() -> Self {
        Self { state: u64::MAX }
    }

    fn next(&mut self) -> u32 {
        self.state = (self.state as u32 as u64)
            .wrapping_mul(Self::COEFF)
            .wrapping_add(self.state >> 32);
        self.state as u32
    }

    fn uniform(&mut self, a: usize, b: usize) -> usize {
        if a == b {
            a
        } else {
            a + (self.next() as usize) % (b - a)
        }
    }
}

/// 渐进式概率霍夫直线检测
pub fn hough_lines_p(edges: &EdgeMap, params: &LineParams) -> Vec<LineSegment> {
    const SHIFT: i32 = 16;

    let (width, height) = (edges.width as i32, edges.height as i32);
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let irho = 1.0 / params.rho;
    let numangle = (std::f32::consts::PI / params.theta).round() as usize;
    let numrho = (((width + height) * 2 + 1) as f32 / params.rho).round() as usize;
    let rho_offset = (numrho as i32 - 1) / 2;

    let trig: Vec<(f32, f32)> = (0..numangle)
        .map(|n| {
            let angle = n as f64 * params.theta as f64;
            ((angle.cos() * irho as f64) as f32, (angle.sin() * irho as f64) as f32)
        })
        .collect();

    let rho_index = |x: i32, y: i32, n: usize| -> usize {
        let (cos, sin) = trig[n];
        let r = (x as f32 * cos + y as f32 * sin).round_ties_even() as i32 + rho_offset;
        r as usize
    };

    let mut accum = vec![0i32; numangle * numrho];
    let mut mask = edges.edges.clone();
    let mut points: Vec<(i32, i32)> = edges
        .points()
        .into_iter()
        .map(|(x, y)| (x as i32, y as i32))
        .collect();

    let mut rng = MwcRng::new();
    let mut lines = Vec::new();
    let in_bounds = |x: i32, y: i32| x >= 0 && y >= 0 && x < width && y < height;

    let mut count = points.len();
    while count > 0 {
        let idx = rng.uniform(0, count);
        let (j, i) = points[idx];
        count -= 1;
        points[idx] = points[count];

        // 已被其他直线占用
        if !mask[(i * width + j) as usize] {
            continue;
        }

        let mut max_val = params.threshold - 1;
        let mut max_n = 0;
        for n in 0..numangle {
            let cell = &mut accum[n * numrho + rho_index(j, i, n)];
            *cell += 1;
            if max_val < *cell {
                max_val = *cell;
                max_n = n;
            }
        }

        if max_val < params.threshold {
            continue;
        }

        // 沿该直线方向双向行走
        let angle = max_n as f32 * params.theta;
        let a = -angle.sin();
        let b = angle.cos();
        let (mut x0, mut y0) = (j, i);
        let (dx0, dy0, xflag) = if a.abs() > b.abs() {
            let dx0 = if a > 0.0 { 1 } else { -1 };
            let dy0 = (b * (1 << SHIFT) as f32 / a.abs()).round_ties_even() as i32;
            y0 = (y0 << SHIFT) + (1 << (SHIFT - 1));
            (dx0, dy0, true)
        } else {
            let dy0 = if b > 0.0 { 1 } else { -1 };
            let dx0 = (a * (1 << SHIFT) as f32 / b.abs()).round_ties_even() as i32;
            x0 = (x0 << SHIFT) + (1 << (SHIFT - 1));
            (dx0, dy0, false)
        };
        let locate = |x: i32, y: i32| -> (i32, i32) {
            if xflag {
                (x, y >> SHIFT)
            } else {
                (x >> SHIFT, y)
            }
        };

        let mut line_end = [(j, i); 2];
        for (k, end) in line_end.iter_mut().enumerate() {
            let (dx, dy) = if k == 0 { (dx0, dy0) } else { (-dx0, -dy0) };
            let (mut x, mut y) = (x0, y0);
            let mut gap = 0;
            loop {
                let (j1, i1) = locate(x, y);
                if !in_bounds(j1, i1) {
                    break;
                }
                if mask[(i1 * width + j1) as usize] {
                    gap = 0;
                    *end = (j1, i1);
                } else {
                    gap += 1;
                    if gap > params.max_line_gap {
                        break;
                    }
                }
                x += dx;
                y += dy;
            }
        }

        let good_line = (line_end[1].0 - line_end[0].0).abs() >= params.min_line_length
            || (line_end[1].1 - line_end[0].1).abs() >= params.min_line_length;

        // 清除线段上的点，合格线段同时撤销其投票
        for (k, end) in line_end.iter().enumerate() {
            let (dx, dy) = if k == 0 { (dx0, dy0) } else { (-dx0, -dy0) };
            let (mut x, mut y) = (x0, y0);
            loop {
                let (j1, i1) = locate(x, y);
                if !in_bounds(j1, i1) {
                    break;
                }
                let cell = (i1 * width + j1) as usize;
                if mask[cell] {
                    if good_line {
                        for n in 0..numangle {
                            accum[n * numrho + rho_index(j1, i1, n)] -= 1;
                        }
                    }
                    mask[cell] = false;
                }
                if (j1, i1) == *end {
                    break;
                }
                x += dx;
                y += dy;
            }
        }

        if good_line {
            lines.push([line_end[0].0, line_end[0].1, line_end[1].0, line_end[1].1]);
        }
    }

    lines
}

/// 圆心投票的定点精度
const VOTE_SHIFT: u32 = 10;

/// 参与半径估计的候选圆心上限
const MAX_CENTER_CANDIDATES: usize = 64;

/// 求梯度方向前的高斯平滑，减小锯齿边界上的方向误差
const DIRECTION_SIGMA: f32 = 1.5;

/// 梯度霍夫圆检测（dp = 1）
///
/// 边缘点沿梯度正反方向以定点步进投票，累加器经3x3盒式滤波后取局部极大值为候选圆心；
/// 半径取 ±1 带宽内支持度按周长归一化后最高者。
pub fn hough_circles(gray: &GrayImage, params: &CircleParams) -> Vec<Circle> {
    let (width, height) = (gray.width() as usize, gray.height() as usize);
    if width < 3 || height < 3 {
        return Vec::new();
    }

    let edges = canny_from_gradients(
        &Gradients::sobel(gray),
        (params.canny_threshold / 2).max(1),
        params.canny_threshold,
    );
    let directions = Gradients::sobel(&image::imageops::blur(gray, DIRECTION_SIGMA));

    let min_radius = params.min_radius.max(0);
    let max_radius = params.max_radius.max(min_radius);

    let points = edges.points();
    let accum = vote_centers(&points, &directions, min_radius, max_radius);
    let smoothed = box_filter_3x3(&accum, width, height);

    let mut centers = Vec::new();
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let idx = y * width + x;
            let v = smoothed[idx];
            if v > params.acc_threshold
                && v > smoothed[idx - 1]
                && v >= smoothed[idx + 1]
                && v > smoothed[idx - width]
                && v >= smoothed[idx + width]
            {
                centers.push(idx);
            }
        }
    }
    centers.sort_by(|a, b| smoothed[*b].cmp(&smoothed[*a]).then(a.cmp(b)));

    // 按行分桶，半径估计只扫描圆心外接框内的边缘点
    let mut rows: Vec<Vec<i32>> = vec![Vec::new(); height];
    for (x, y) in &points {
        rows[*y].push(*x as i32);
    }

    let min_dist_sq = params.min_dist * params.min_dist;
    let mut circles: Vec<Circle> = Vec::new();
    let mut evaluated = 0;

    for idx in centers {
        if evaluated >= MAX_CENTER_CANDIDATES {
            break;
        }
        let (cx, cy) = ((idx % width) as i32, (idx / width) as i32);
        let too_close = circles.iter().any(|c| {
            let (dx, dy) = (c.x - cx as f32, c.y - cy as f32);
            dx * dx + dy * dy < min_dist_sq
        });
        if too_close {
            continue;
        }
        evaluated += 1;

        let estimate = estimate_radius(&rows, cx, cy, min_radius, max_radius, params.acc_threshold);
        if let Some((radius, _)) = estimate {
            circles.push(Circle {
                x: cx as f32,
                y: cy as f32,
                radius: radius as f32,
            });
        }
    }

    circles
}

fn vote_centers(
    points: &[(usize, usize)],
    directions: &Gradients,
    min_radius: i32,
    max_radius: i32,
) -> Vec<i32> {
    let one = (1i64 << VOTE_SHIFT) as f32;
    let half = 1i64 << (VOTE_SHIFT - 1);
    let (width, height) = (directions.width as i64, directions.height as i64);
    let mut accum = vec![0i32; directions.width * directions.height];

    for (x, y) in points {
        let idx = y * directions.width + x;
        let (vx, vy) = (directions.dx[idx] as f32, directions.dy[idx] as f32);
        let mag = (vx * vx + vy * vy).sqrt();
        if mag < 1.0 {
            continue;
        }
        let sx = (vx * one / mag).round() as i64;
        let sy = (vy * one / mag).round() as i64;
        let x0 = ((*x as i64) << VOTE_SHIFT) + half;
        let y0 = ((*y as i64) << VOTE_SHIFT) + half;

        for (sx, sy) in [(sx, sy), (-sx, -sy)] {
            let mut x1 = x0 + min_radius as i64 * sx;
            let mut y1 = y0 + min_radius as i64 * sy;
            for _ in min_radius..=max_radius {
                let (x2, y2) = (x1 >> VOTE_SHIFT, y1 >> VOTE_SHIFT);
                if x2 < 0 || y2 < 0 || x2 >= width || y2 >= height {
                    break;
                }
                accum[(y2 * width + x2) as usize] += 1;
                x1 += sx;
                y1 += sy;
            }
        }
    }

    accum
}

/// 3x3 盒式滤波（求和），越界部分按0计
fn box_filter_3x3(values: &[i32], width: usize, height: usize) -> Vec<i32> {
    let mut horizontal = vec![0i32; values.len()];
    for y in 0..height {
        let row = &values[y * width..(y + 1) * width];
        for x in 0..width {
            let mut sum = row[x];
            if x > 0 {
                sum += row[x - 1];
            }
            if x + 1 < width {
                sum += row[x + 1];
            }
            horizontal[y * width + x] = sum;
        }
    }

    let mut out = vec![0i32; values.len()];
    for y in 0..height {
        for x in 0..width {
            let idx = y * width + x;
            let mut sum = horizontal[idx];
            if y > 0 {
                sum += horizontal[idx - width];
            }
            if y + 1 < height {
                sum += horizontal[idx + width];
            }
            out[idx] = sum;
        }
    }
    out
}

/// 返回支持度超过阈值的最佳 (半径, 支持度)
fn estimate_radius(
    rows: &[Vec<i32>],
    cx: i32,
    cy: i32,
    min_radius: i32,
    max_radius: i32,
    threshold: i32,
) -> Option<(i32, i32)> {
    // 直方图覆盖 [min_radius - 1, max_radius + 1]
    let lo = min_radius - 1;
    let mut histogram = vec![0i32; (max_radius - min_radius + 3) as usize];
    let reach = max_radius + 1;

    let y_start = (cy - reach).max(0) as usize;
    let y_end = ((cy + reach) as usize).min(rows.len().saturating_sub(1));
    for (y, row) in rows.iter().enumerate().take(y_end + 1).skip(y_start) {
        let dy = (y as i32 - cy) as f32;
        for px in row {
            if (px - cx).abs() > reach {
                continue;
            }
            let dx = (px - cx) as f32;
            let r = (dx * dx + dy * dy).sqrt().round() as i32;
            if (lo..=reach).contains(&r) {
                histogram[(r - lo) as usize] += 1;
            }
        }
    }

    let mut best: Option<(i32, i32)> = None;
    for radius in min_radius.max(1)..=max_radius {
        let bin = (radius - lo) as usize;
        let support = histogram[bin - 1] + histogram[bin] + histogram[bin + 1];
        if support <= threshold {
            continue;
        }
        let better = match best {
            None => true,
            Some((best_r, best_support)) => {
                (support as i64) * (best_r as i64) > (best_support as i64) * (radius as i64)
            }
        };
        if better {
            best = Some((radius, support));
        }
    }
    best
}
