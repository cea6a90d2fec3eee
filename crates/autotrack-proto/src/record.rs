use serde::{Deserialize, Serialize};

/// How a frame record came into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOrigin {
    Key,
    Good,
    Possible,
    Recovered,
    Accepted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskKind {
    #[default]
    Ellipse,
    Rectangle,
}

/// Mask a key frame's template was cut with; the size is the template's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMask {
    pub kind: MaskKind,
    pub line_spread: i32,
}

/// Template pixels as 8-bit RGB plus the participation mask.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchData {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
    pub mask: Vec<bool>,
}

/// Persistable view of one frame of an autotrack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub frame: u32,
    pub x: f64,
    pub y: f64,
    pub key_frame: bool,
    pub origin: RecordOrigin,
    // non-finite scores are written as f64::MAX
    pub score: Option<f64>,
    pub runner_up: Option<f64>,
    pub template_generation: u32,
    /// Key frames only: tracked point relative to the template centre.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_offset: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_mask: Option<KeyMask>,
    pub template: PatchData,
}
