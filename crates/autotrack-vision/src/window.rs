use autotrack_proto::Point;

use crate::{MaskShape, VisionError, MIN_WINDOW_SPAN};

/// Reference line for 1-D tracking. `angle` is in radians, counter-clockwise
/// from the image x-axis with y pointing down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineRef {
    pub origin: Point,
    pub angle: f64,
}

impl LineRef {
    pub fn new(origin: Point, angle: f64) -> Self {
        Self { origin, angle }
    }

    pub fn through(a: Point, b: Point) -> Self {
        let (dx, dy) = b.minus(a);
        Self { origin: a, angle: (-dy).atan2(dx) }
    }

    /// Unit vector along the line in pixel space.
    pub fn direction(&self) -> (f64, f64) {
        (self.angle.cos(), -self.angle.sin())
    }

    pub fn perpendicular_distance(&self, p: Point) -> f64 {
        let (ux, uy) = self.direction();
        let (dx, dy) = p.minus(self.origin);
        (dx * uy - dy * ux).abs()
    }

    /// Component of (dx, dy) along the line, as a vector.
    pub fn project(&self, dx: f64, dy: f64) -> (f64, f64) {
        let (ux, uy) = self.direction();
        let t = dx * ux + dy * uy;
        (t * ux, t * uy)
    }
}

/// Candidate template centres for one matcher call.
///
/// Built from an anchor and a radius, clipped so that the whole template box
/// stays inside the frame, and restricted to a strip around a reference line
/// when the mask shape is in line mode. Candidates are kept in row-major order.
#[derive(Debug, Clone)]
pub struct SearchWindow {
    center: Point,
    shape: MaskShape,
    bounds: (i64, i64, i64, i64),
    line: Option<LineRef>,
    candidates: Vec<(i64, i64)>,
}

impl SearchWindow {
    pub fn around(
        center: Point,
        radius: u32,
        shape: &MaskShape,
        frame_w: u32,
        frame_h: u32,
        line: Option<LineRef>,
    ) -> Result<Self, VisionError> {
        let (cx, cy) = center.round();
        let r = radius as i64;
        let x0 = (cx - r).max(shape.left() as i64);
        let y0 = (cy - r).max(shape.top() as i64);
        let x1 = (cx + r).min(frame_w as i64 - shape.right() as i64);
        let y1 = (cy + r).min(frame_h as i64 - shape.bottom() as i64);

        let line = if shape.is_line() {
            Some(line.unwrap_or_else(|| LineRef::new(center, 0.0)))
        } else {
            None
        };

        if !shape.is_line() && (x1 - x0 + 1 < MIN_WINDOW_SPAN || y1 - y0 + 1 < MIN_WINDOW_SPAN) {
            return Err(VisionError::SearchWindowEmpty);
        }

        let mut candidates = Vec::new();
        for y in y0..=y1 {
            for x in x0..=x1 {
                if let Some(l) = &line {
                    let p = Point::new(x as f64, y as f64);
                    if l.perpendicular_distance(p) > shape.line_spread as f64 {
                        continue;
                    }
                }
                candidates.push((x, y));
            }
        }
        if (candidates.len() as i64) < MIN_WINDOW_SPAN {
            return Err(VisionError::SearchWindowEmpty);
        }

        Ok(Self { center, shape: *shape, bounds: (x0, y0, x1, y1), line, candidates })
    }

    pub fn center(&self) -> Point {
        self.center
    }

    pub fn shape(&self) -> &MaskShape {
        &self.shape
    }

    /// Inclusive (x0, y0, x1, y1) of the clipped candidate rectangle.
    pub fn bounds(&self) -> (i64, i64, i64, i64) {
        self.bounds
    }

    pub fn line(&self) -> Option<&LineRef> {
        self.line.as_ref()
    }

    pub fn candidates(&self) -> &[(i64, i64)] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn index_of(&self, x: i64, y: i64) -> Option<usize> {
        self.candidates
            .binary_search_by_key(&(y, x), |&(cx, cy)| (cy, cx))
            .ok()
    }

    pub fn contains(&self, x: i64, y: i64) -> bool {
        self.index_of(x, y).is_some()
    }
}
