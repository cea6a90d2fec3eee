use serde::{Deserialize, Serialize};

pub use autotrack_proto::record::MaskKind;

/// Geometry of the template patch and of the search strip.
///
/// `line_spread > 0` selects 1-D tracking: candidates are restricted to a strip
/// of that half-width around a reference line. Otherwise candidates cover the
/// full rectangular window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskShape {
    pub width: u32,
    pub height: u32,
    pub kind: MaskKind,
    pub line_spread: i32,
}

impl MaskShape {
    pub fn new(width: u32, height: u32, kind: MaskKind, line_spread: i32) -> Self {
        Self { width, height, kind, line_spread }
    }

    pub fn is_line(&self) -> bool {
        self.line_spread > 0
    }

    /// Pixels left of and above the centre pixel.
    pub fn left(&self) -> u32 {
        self.width / 2
    }

    pub fn top(&self) -> u32 {
        self.height / 2
    }

    /// Pixels from the centre pixel (inclusive) to the right/bottom edge.
    pub fn right(&self) -> u32 {
        self.width - self.left()
    }

    pub fn bottom(&self) -> u32 {
        self.height - self.top()
    }

    /// True when pixel (i, j) of the mask box participates in matching.
    /// For ellipses a pixel counts only if all four of its corners are inside.
    pub fn contains_pixel(&self, i: u32, j: u32) -> bool {
        if i >= self.width || j >= self.height {
            return false;
        }
        match self.kind {
            MaskKind::Rectangle => true,
            MaskKind::Ellipse => {
                let rx = self.width as f64 / 2.0;
                let ry = self.height as f64 / 2.0;
                [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)]
                    .iter()
                    .all(|(a, b)| {
                        let dx = (i as f64 + a - rx) / rx;
                        let dy = (j as f64 + b - ry) / ry;
                        dx * dx + dy * dy <= 1.0 + 1e-9
                    })
            }
        }
    }

    /// Row-major participation flags for the whole mask box.
    pub fn coverage(&self) -> Vec<bool> {
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize);
        for j in 0..self.height {
            for i in 0..self.width {
                out.push(self.contains_pixel(i, j));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rectangle_covers_everything() {
        let m = MaskShape::new(4, 3, MaskKind::Rectangle, -1);
        assert!(m.coverage().iter().all(|c| *c));
        assert!(!m.is_line());
    }

    #[test]
    fn ellipse_drops_corners_keeps_centre() {
        let m = MaskShape::new(21, 21, MaskKind::Ellipse, -1);
        assert!(!m.contains_pixel(0, 0));
        assert!(!m.contains_pixel(20, 20));
        assert!(m.contains_pixel(10, 10));
        assert!(m.contains_pixel(10, 1));
        let n = m.coverage().iter().filter(|c| **c).count();
        // roughly pi/4 of the box
        assert!(n > 250 && n < 441, "coverage {}", n);
    }

    #[test]
    fn insets_for_odd_and_even() {
        let m = MaskShape::new(21, 10, MaskKind::Rectangle, 0);
        assert_eq!((m.left(), m.right()), (10, 11));
        assert_eq!((m.top(), m.bottom()), (5, 5));
    }

    #[test]
    fn positive_spread_is_line_mode() {
        assert!(MaskShape::new(9, 9, MaskKind::Ellipse, 10).is_line());
        assert!(!MaskShape::new(9, 9, MaskKind::Ellipse, 0).is_line());
    }
}
