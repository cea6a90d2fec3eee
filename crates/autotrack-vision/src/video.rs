use std::path::Path;

use anyhow::{ensure, Context, Result};
use autotrack_proto::Point;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{LineRef, VisionError};

/// Image coordinate system of a frame; only the x-axis is needed here.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImageCoords {
    pub origin: Point,
    /// Radians, counter-clockwise from the image x-axis.
    #[serde(default)]
    pub angle: f64,
}

impl ImageCoords {
    /// Coordinates whose x-axis runs from `a` through `b`.
    pub fn through(a: Point, b: Point) -> Self {
        let axis = LineRef::through(a, b);
        Self { origin: axis.origin, angle: axis.angle }
    }

    pub fn axis(&self) -> LineRef {
        LineRef::new(self.origin, self.angle)
    }
}

/// The collaborator that owns the video and moves through its frames.
///
/// Steps are positions in the clip; frames are positions in the underlying
/// video. With a stride above 1 some frames fall between steps.
pub trait FrameStepper {
    /// Advances one step in the stepping direction; false at the end of the clip.
    fn step(&mut self) -> bool;
    fn frame_number(&self) -> u32;
    fn image(&self) -> Option<&RgbImage>;
    fn can_step(&self) -> bool;
    fn is_reverse(&self) -> bool;
    fn step_to_frame(&self, step: u32) -> u32;
    /// Frames between two steps map to the earlier step.
    fn frame_to_step(&self, frame: u32) -> u32;
    fn frame_count(&self) -> u32;
    fn coords(&self, frame: u32) -> ImageCoords;
    fn is_video_valid(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipSpec {
    pub start: u32,
    pub stride: u32,
    pub reverse: bool,
}

impl Default for ClipSpec {
    fn default() -> Self {
        Self { start: 0, stride: 1, reverse: false }
    }
}

/// Decoded frames held in memory, stepped according to a [`ClipSpec`].
#[derive(Debug, Clone)]
pub struct ImageSequence {
    frames: Vec<RgbImage>,
    clip: ClipSpec,
    coords: ImageCoords,
    step: u32,
}

impl ImageSequence {
    pub fn new(frames: Vec<RgbImage>, clip: ClipSpec) -> Result<Self, VisionError> {
        if clip.stride == 0 {
            return Err(VisionError::Sequence("stride must be at least 1".into()));
        }
        if !frames.is_empty() && clip.start as usize >= frames.len() {
            return Err(VisionError::Sequence(format!(
                "clip start {} past last frame {}",
                clip.start,
                frames.len() - 1
            )));
        }
        if let Some(first) = frames.first() {
            let dims = first.dimensions();
            if let Some(k) = frames.iter().position(|f| f.dimensions() != dims) {
                return Err(VisionError::Sequence(format!(
                    "frame {} is {:?}, expected {:?}",
                    k,
                    frames[k].dimensions(),
                    dims
                )));
            }
        }
        let mut seq = Self { frames, clip, coords: ImageCoords::default(), step: 0 };
        if clip.reverse {
            seq.step = seq.step_count().saturating_sub(1);
        }
        Ok(seq)
    }

    /// Loads every png/jpg file in `dir`, sorted by file name.
    pub fn load_dir(dir: &Path, clip: ClipSpec) -> Result<Self> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).with_context(|| format!("read frames dir {}", dir.display()))? {
            let path = entry?.path();
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase());
            if matches!(ext.as_deref(), Some("png" | "jpg" | "jpeg")) {
                paths.push(path);
            }
        }
        paths.sort();
        ensure!(!paths.is_empty(), "no png/jpg frames in {}", dir.display());

        let mut frames = Vec::with_capacity(paths.len());
        for p in &paths {
            let img = image::open(p).with_context(|| format!("decode {}", p.display()))?;
            debug!(path = %p.display(), "frame decoded");
            frames.push(img.to_rgb8());
        }
        info!(count = frames.len(), dir = %dir.display(), "frames loaded");
        Ok(Self::new(frames, clip)?)
    }

    pub fn with_coords(mut self, coords: ImageCoords) -> Self {
        self.coords = coords;
        self
    }

    pub fn clip(&self) -> ClipSpec {
        self.clip
    }

    pub fn step_count(&self) -> u32 {
        let n = self.frames.len() as u32;
        if n <= self.clip.start {
            return 0;
        }
        (n - self.clip.start).div_ceil(self.clip.stride)
    }

    /// Moves to the step containing `frame`. Returns false if it lies outside the clip.
    pub fn seek_frame(&mut self, frame: u32) -> bool {
        if frame < self.clip.start || frame >= self.frames.len() as u32 {
            return false;
        }
        let step = self.frame_to_step(frame);
        if step >= self.step_count() {
            return false;
        }
        self.step = step;
        true
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.frames.first().map(|f| f.dimensions())
    }
}

impl FrameStepper for ImageSequence {
    fn step(&mut self) -> bool {
        if !self.can_step() {
            return false;
        }
        if self.clip.reverse {
            self.step -= 1;
        } else {
            self.step += 1;
        }
        true
    }

    fn frame_number(&self) -> u32 {
        self.step_to_frame(self.step)
    }

    fn image(&self) -> Option<&RgbImage> {
        self.frames.get(self.frame_number() as usize)
    }

    fn can_step(&self) -> bool {
        if self.clip.reverse {
            self.step > 0
        } else {
            self.step + 1 < self.step_count()
        }
    }

    fn is_reverse(&self) -> bool {
        self.clip.reverse
    }

    fn step_to_frame(&self, step: u32) -> u32 {
        self.clip.start + step * self.clip.stride
    }

    fn frame_to_step(&self, frame: u32) -> u32 {
        frame.saturating_sub(self.clip.start) / self.clip.stride
    }

    fn frame_count(&self) -> u32 {
        self.frames.len() as u32
    }

    fn coords(&self, _frame: u32) -> ImageCoords {
        self.coords
    }

    fn is_video_valid(&self) -> bool {
        !self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(n: u32) -> Vec<RgbImage> {
        (0..n)
            .map(|k| RgbImage::from_pixel(8, 6, image::Rgb([k as u8, 0, 0])))
            .collect()
    }

    #[test]
    fn stride_maps_frames_to_steps() {
        let seq = ImageSequence::new(frames(10), ClipSpec { start: 1, stride: 3, reverse: false }).unwrap();
        assert_eq!(seq.step_count(), 3);
        assert_eq!(seq.step_to_frame(2), 7);
        assert_eq!(seq.frame_to_step(6), 1);
        assert_eq!(seq.frame_to_step(7), 2);
    }

    #[test]
    fn forward_stepping_stops_at_end() {
        let mut seq = ImageSequence::new(frames(5), ClipSpec { start: 0, stride: 2, reverse: false }).unwrap();
        let mut seen = vec![seq.frame_number()];
        while seq.step() {
            seen.push(seq.frame_number());
        }
        assert_eq!(seen, vec![0, 2, 4]);
        assert!(!seq.can_step());
        assert_eq!(seq.image().unwrap().get_pixel(0, 0).0[0], 4);
    }

    #[test]
    fn reverse_starts_at_last_step() {
        let mut seq = ImageSequence::new(frames(4), ClipSpec { start: 0, stride: 1, reverse: true }).unwrap();
        assert_eq!(seq.frame_number(), 3);
        assert!(seq.seek_frame(2));
        assert!(seq.step());
        assert_eq!(seq.frame_number(), 1);
    }

    #[test]
    fn rejects_bad_clip() {
        assert!(ImageSequence::new(frames(3), ClipSpec { start: 3, stride: 1, reverse: false }).is_err());
        assert!(ImageSequence::new(frames(3), ClipSpec { start: 0, stride: 0, reverse: false }).is_err());
        let empty = ImageSequence::new(vec![], ClipSpec::default()).unwrap();
        assert!(!empty.is_video_valid());
        assert!(empty.image().is_none());
    }

    #[test]
    fn coords_through_two_points() {
        let c = ImageCoords::through(Point::new(0.0, 100.0), Point::new(100.0, 0.0));
        assert_eq!(c.origin, Point::new(0.0, 100.0));
        assert!((c.angle - std::f64::consts::FRAC_PI_4).abs() < 1e-12);
        assert!(c.axis().perpendicular_distance(Point::new(50.0, 50.0)) < 1e-9);
        assert!((c.axis().perpendicular_distance(Point::new(0.0, 0.0)) - 100.0 / 2f64.sqrt()).abs() < 1e-9);
    }
}
