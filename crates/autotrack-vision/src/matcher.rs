use autotrack_proto::Point;
use image::RgbImage;
use tracing::trace;

use crate::{Patch, SearchWindow, Template, VisionError};

#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Best integer candidate relative to the rounded window centre.
    pub offset: (i64, i64),
    /// Sub-pixel template centre of the best match.
    pub center: Point,
    pub score: f64,
    pub runner_up: Option<f64>,
    /// Image region under the template at the best integer candidate.
    pub region: Patch,
}

/// Scores a template against every candidate of a search window.
pub trait TemplateSearch {
    fn search(
        &self,
        template: &Template,
        image: &RgbImage,
        window: &SearchWindow,
    ) -> Result<MatchResult, VisionError>;
}

/// Masked sum-of-squared-differences matcher.
///
/// The score of a candidate is `mean / d - 1` where `d` is its SSD and `mean`
/// is the mean SSD over the window, so a score of 4 means the candidate is five
/// times closer than an average one. An exact match scores infinity.
#[derive(Debug, Clone, Copy, Default)]
pub struct SsdMatcher;

impl SsdMatcher {
    fn ssd(template: &Template, image: &RgbImage, left: i64, top: i64) -> f64 {
        let tw = template.width();
        let iw = image.width() as i64;
        let raw = image.as_raw();
        let tpl = template.patch().rgb();
        let mut sum = 0.0f64;
        for (k, on) in template.mask().iter().enumerate() {
            if !*on {
                continue;
            }
            let i = (k as u32 % tw) as i64;
            let j = (k as u32 / tw) as i64;
            let p = (((top + j) * iw + left + i) * 3) as usize;
            for c in 0..3 {
                let d = raw[p + c] as f64 - tpl[k * 3 + c] as f64;
                sum += d * d;
            }
        }
        sum
    }

    fn score(mean: f64, d: f64) -> f64 {
        if d > 0.0 {
            mean / d - 1.0
        } else if mean > 0.0 {
            f64::INFINITY
        } else {
            // flat window, nothing to tell candidates apart
            0.0
        }
    }

    /// Parabolic vertex through three SSD samples, limited to half a pixel.
    fn vertex(left: f64, mid: f64, right: f64) -> f64 {
        let denom = left - 2.0 * mid + right;
        if denom <= 0.0 {
            return 0.0;
        }
        (0.5 * (left - right) / denom).clamp(-0.5, 0.5)
    }
}

impl TemplateSearch for SsdMatcher {
    fn search(
        &self,
        template: &Template,
        image: &RgbImage,
        window: &SearchWindow,
    ) -> Result<MatchResult, VisionError> {
        let shape = window.shape();
        if (template.width(), template.height()) != (shape.width, shape.height) {
            return Err(VisionError::SizeMismatch {
                expected: (shape.width, shape.height),
                got: (template.width(), template.height()),
            });
        }
        if window.len() < 2 {
            return Err(VisionError::SearchWindowEmpty);
        }

        let (left, top) = (shape.left() as i64, shape.top() as i64);
        let (x0, y0, x1, y1) = window.bounds();
        if x0 < left
            || y0 < top
            || x1 + shape.right() as i64 > image.width() as i64
            || y1 + shape.bottom() as i64 > image.height() as i64
        {
            return Err(VisionError::SizeMismatch {
                expected: (image.width(), image.height()),
                got: ((x1 + shape.right() as i64) as u32, (y1 + shape.bottom() as i64) as u32),
            });
        }
        let diffs: Vec<f64> = window
            .candidates()
            .iter()
            .map(|&(x, y)| Self::ssd(template, image, x - left, y - top))
            .collect();
        let mean = diffs.iter().sum::<f64>() / diffs.len() as f64;

        let c = window.center();
        let dist2 = |(x, y): (i64, i64)| {
            let (dx, dy) = (x as f64 - c.x, y as f64 - c.y);
            dx * dx + dy * dy
        };
        let mut best = 0usize;
        for (k, d) in diffs.iter().enumerate().skip(1) {
            let cand = window.candidates()[k];
            let cur = window.candidates()[best];
            if *d < diffs[best] || (*d == diffs[best] && dist2(cand) < dist2(cur)) {
                best = k;
            }
        }
        let (bx, by) = window.candidates()[best];
        let score = Self::score(mean, diffs[best]);

        let reach = (template.width().min(template.height()) as f64 / 4.0).max(1.0);
        let runner_up = window
            .candidates()
            .iter()
            .zip(&diffs)
            .filter(|((x, y), _)| ((x - bx).abs().max((y - by).abs()) as f64) > reach)
            .map(|(_, d)| *d)
            .reduce(f64::min)
            .map(|d| Self::score(mean, d));

        let sample = |x: i64, y: i64| window.index_of(x, y).map(|k| diffs[k]);
        let mid = diffs[best];
        let mut ox = match (sample(bx - 1, by), sample(bx + 1, by)) {
            (Some(l), Some(r)) => Self::vertex(l, mid, r),
            _ => 0.0,
        };
        let mut oy = match (sample(bx, by - 1), sample(bx, by + 1)) {
            (Some(u), Some(d)) => Self::vertex(u, mid, d),
            _ => 0.0,
        };
        if let Some(line) = window.line() {
            (ox, oy) = line.project(ox, oy);
        }

        let (wx, wy) = c.round();
        let (region, _) = Patch::cut(image, bx - left, by - top, template.width(), template.height());
        trace!(bx, by, score, mean, candidates = window.len(), "template search");

        Ok(MatchResult {
            offset: (bx - wx, by - wy),
            center: Point::new(bx as f64 + ox, by as f64 + oy),
            score,
            runner_up,
            region,
        })
    }
}
