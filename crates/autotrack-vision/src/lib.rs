pub mod evolve;
pub mod mask;
pub mod matcher;
pub mod patch;
pub mod video;
pub mod window;

pub use image::RgbImage;
pub use mask::{MaskKind, MaskShape};
pub use matcher::{MatchResult, SsdMatcher, TemplateSearch};
pub use patch::{Patch, Template};
pub use video::{ClipSpec, FrameStepper, ImageCoords, ImageSequence};
pub use window::{LineRef, SearchWindow};

/// Smallest number of mask columns/rows a template must keep after clipping.
pub const MIN_MASK_EXTENT: u32 = 3;

/// Largest mask width/height a track accepts.
pub const MAX_MASK_EXTENT: u32 = 4096;

/// Smallest number of candidate positions per axis a search window must keep.
pub const MIN_WINDOW_SPAN: i64 = 2;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VisionError {
    #[error("search window is empty after clipping to the frame")]
    SearchWindowEmpty,
    #[error("mask keeps {cols}x{rows} usable pixels, need at least {min}x{min}")]
    MaskTooSmall { cols: u32, rows: u32, min: u32 },
    #[error("patch size mismatch: expected {expected:?}, got {got:?}")]
    SizeMismatch { expected: (u32, u32), got: (u32, u32) },
    #[error("image sequence: {0}")]
    Sequence(String),
}
