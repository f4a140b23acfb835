//! Grayscale template matching with zero-mean normalized cross-correlation.
//!
//! Scores are in `[-1, 1]`; 1 means the window is a linear brightness/contrast
//! transform of the template. Large templates are first searched on a
//! downscaled pyramid level and the best candidates are refined at full
//! resolution, which keeps a full-screen search interactive.
//!
//! The pyramid search is approximate: detail that vanishes when downscaled,
//! or more look-alikes than there are candidates, can hide the true best
//! placement. When the refined score falls below a caller-supplied floor the
//! whole screen is scanned again at full resolution.

use image::{imageops::FilterType, GrayImage};

/// Smallest template side allowed on the coarse level
const MIN_COARSE_SIDE: u32 = 8;
/// Candidates carried from the coarse level to refinement
const COARSE_CANDIDATES: usize = 8;
const FLAT_EPSILON: f64 = 1e-6;
/// Refined scores below this trigger the full-resolution scan in [`best_match`]
pub const DEFAULT_FLOOR: f32 = 0.5;

/// Best placement of a template, top-left corner in image coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    pub x: u32,
    pub y: u32,
    pub score: f32,
}

/// Summed-area tables for O(1) window sums and sums of squares.
struct Integral {
    stride: usize,
    sum: Vec<f64>,
    sq: Vec<f64>,
}

impl Integral {
    fn new(img: &GrayImage) -> Self {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let stride = w + 1;
        let mut sum = vec![0.0; stride * (h + 1)];
        let mut sq = vec![0.0; stride * (h + 1)];
        let raw = img.as_raw();
        for y in 0..h {
            let mut row_sum = 0.0;
            let mut row_sq = 0.0;
            for x in 0..w {
                let v = raw[y * w + x] as f64;
                row_sum += v;
                row_sq += v * v;
                let idx = (y + 1) * stride + x + 1;
                sum[idx] = sum[idx - stride] + row_sum;
                sq[idx] = sq[idx - stride] + row_sq;
            }
        }
        Self { stride, sum, sq }
    }

    fn window(&self, x: usize, y: usize, w: usize, h: usize) -> (f64, f64) {
        let s = self.stride;
        let a = y * s + x;
        let b = y * s + x + w;
        let c = (y + h) * s + x;
        let d = (y + h) * s + x + w;
        (
            self.sum[d] - self.sum[b] - self.sum[c] + self.sum[a],
            self.sq[d] - self.sq[b] - self.sq[c] + self.sq[a],
        )
    }
}

struct PreparedTemplate {
    width: usize,
    height: usize,
    zero_mean: Vec<f64>,
    norm: f64,
    mean: f64,
}

impl PreparedTemplate {
    fn new(img: &GrayImage) -> Self {
        let n = (img.width() * img.height()) as f64;
        let mean = img.as_raw().iter().map(|&v| v as f64).sum::<f64>() / n;
        let zero_mean: Vec<f64> = img.as_raw().iter().map(|&v| v as f64 - mean).collect();
        let norm = zero_mean.iter().map(|v| v * v).sum::<f64>().sqrt();
        Self {
            width: img.width() as usize,
            height: img.height() as usize,
            zero_mean,
            norm,
            mean,
        }
    }

    fn is_flat(&self) -> bool {
        self.norm < FLAT_EPSILON
    }
}

fn score_at(
    screen: &GrayImage,
    integral: &Integral,
    template: &PreparedTemplate,
    x: usize,
    y: usize,
) -> f32 {
    let (tw, th) = (template.width, template.height);
    let n = (tw * th) as f64;
    let (sum, sq) = integral.window(x, y, tw, th);
    let window_var = (sq - sum * sum / n).max(0.0);
    let window_flat = window_var < FLAT_EPSILON * n;

    if template.is_flat() || window_flat {
        if template.is_flat() && window_flat {
            let diff = (sum / n - template.mean).abs();
            return (1.0 - diff / 255.0) as f32;
        }
        return 0.0;
    }

    let raw = screen.as_raw();
    let sw = screen.width() as usize;
    let mut num = 0.0;
    for j in 0..th {
        let row = &raw[(y + j) * sw + x..(y + j) * sw + x + tw];
        let trow = &template.zero_mean[j * tw..(j + 1) * tw];
        for (s, t) in row.iter().zip(trow) {
            num += *s as f64 * t;
        }
    }
    let score = num / (window_var.sqrt() * template.norm);
    score.clamp(-1.0, 1.0) as f32
}

/// Keeps the best `capacity` matches, suppressing near-duplicates.
struct TopMatches {
    capacity: usize,
    radius: u32,
    items: Vec<Match>,
}

impl TopMatches {
    fn new(capacity: usize, radius: u32) -> Self {
        Self {
            capacity,
            radius,
            items: Vec::with_capacity(capacity + 1),
        }
    }

    fn offer(&mut self, m: Match) {
        if let Some(near) = self
            .items
            .iter_mut()
            .find(|o| o.x.abs_diff(m.x) <= self.radius && o.y.abs_diff(m.y) <= self.radius)
        {
            if m.score > near.score {
                *near = m;
            }
            return;
        }
        if self.items.len() < self.capacity {
            self.items.push(m);
        } else if let Some((idx, worst)) = self
            .items
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.score.total_cmp(&b.1.score))
        {
            if m.score > worst.score {
                self.items[idx] = m;
            }
        }
    }

    fn into_sorted(mut self) -> Vec<Match> {
        self.items.sort_by(|a, b| b.score.total_cmp(&a.score));
        self.items
    }
}

fn scan(
    screen: &GrayImage,
    integral: &Integral,
    template: &PreparedTemplate,
    xs: std::ops::RangeInclusive<usize>,
    ys: std::ops::RangeInclusive<usize>,
    top: &mut TopMatches,
) {
    for y in ys {
        for x in xs.clone() {
            let score = score_at(screen, integral, template, x, y);
            top.offer(Match {
                x: x as u32,
                y: y as u32,
                score,
            });
        }
    }
}

fn exhaustive(screen: &GrayImage, template: &GrayImage, keep: usize, radius: u32) -> Vec<Match> {
    let integral = Integral::new(screen);
    let prepared = PreparedTemplate::new(template);
    let max_x = (screen.width() - template.width()) as usize;
    let max_y = (screen.height() - template.height()) as usize;
    let mut top = TopMatches::new(keep, radius);
    scan(screen, &integral, &prepared, 0..=max_x, 0..=max_y, &mut top);
    top.into_sorted()
}

fn coarse_factor(screen: &GrayImage, template: &GrayImage) -> Option<u32> {
    [4u32, 2].into_iter().find(|f| {
        template.width() / f >= MIN_COARSE_SIDE
            && template.height() / f >= MIN_COARSE_SIDE
            && screen.width() / f >= template.width() / f
            && screen.height() / f >= template.height() / f
    })
}

/// Find the best placement of `template` inside `screen`.
///
/// Returns None when the template does not fit in the screen or either image is empty.
pub fn best_match(screen: &GrayImage, template: &GrayImage) -> Option<Match> {
    best_match_with_floor(screen, template, DEFAULT_FLOOR)
}

/// [`best_match`], falling back to an exhaustive full-resolution scan when the
/// pyramid result scores below `floor`.
pub fn best_match_with_floor(
    screen: &GrayImage,
    template: &GrayImage,
    floor: f32,
) -> Option<Match> {
    if template.width() == 0
        || template.height() == 0
        || template.width() > screen.width()
        || template.height() > screen.height()
    {
        return None;
    }

    let Some(factor) = coarse_factor(screen, template) else {
        return exhaustive(screen, template, 1, 0).into_iter().next();
    };

    let small_screen = image::imageops::resize(
        screen,
        screen.width() / factor,
        screen.height() / factor,
        FilterType::Triangle,
    );
    let small_template = image::imageops::resize(
        template,
        template.width() / factor,
        template.height() / factor,
        FilterType::Triangle,
    );
    let candidates = exhaustive(&small_screen, &small_template, COARSE_CANDIDATES, 2);

    let integral = Integral::new(screen);
    let prepared = PreparedTemplate::new(template);
    let max_x = (screen.width() - template.width()) as usize;
    let max_y = (screen.height() - template.height()) as usize;
    let reach = (factor * 2) as usize;
    let mut top = TopMatches::new(1, 0);
    for c in candidates {
        let cx = (c.x * factor) as usize;
        let cy = (c.y * factor) as usize;
        let xs = cx.saturating_sub(reach)..=(cx + reach).min(max_x);
        let ys = cy.saturating_sub(reach)..=(cy + reach).min(max_y);
        scan(screen, &integral, &prepared, xs, ys, &mut top);
    }
    match top.into_sorted().into_iter().next() {
        Some(best) if best.score >= floor => Some(best),
        _ => exhaustive(screen, template, 1, 0).into_iter().next(),
    }
}
