use serde::{Deserialize, Serialize};

/// Sub-pixel position in image space (pixels, y down).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self { x: self.x + dx, y: self.y + dy }
    }

    pub fn minus(self, other: Point) -> (f64, f64) {
        (self.x - other.x, self.y - other.y)
    }

    /// Nearest integer pixel.
    pub fn round(self) -> (i64, i64) {
        (self.x.round() as i64, self.y.round() as i64)
    }
}
