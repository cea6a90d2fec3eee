use autotrack_proto::report::StallReport;
use autotrack_vision::VisionError;

/// An option value rejected by a setter.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("goodMatch ({good}) must be greater than possibleMatch ({possible})")]
    ThresholdOrder { good: f64, possible: f64 },
    #[error("{option} must be a finite value >= 0, got {value}")]
    BadThreshold { option: &'static str, value: f64 },
    #[error("{option} = {value} is outside {range}")]
    OutOfRange { option: &'static str, value: i64, range: &'static str },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrackError {
    #[error("no key frame has been set")]
    NoReferenceTemplate,
    #[error(
        "autotrack stalled at frame {}: {} (last good frame {})",
        .0.failed_frame, .0.reason, .0.last_good_frame
    )]
    EngineStalled(StallReport),
    #[error("video has no frame image to search")]
    VideoUnavailable,
    #[error("key frame {frame}: mask keeps {cols}x{rows} pixels inside the image")]
    MaskTooSmall { frame: u32, cols: u32, rows: u32 },
    #[error("key frame position ({x:.1}, {y:.1}) lies outside the {width}x{height} image")]
    KeyFrameOutsideImage { x: f64, y: f64, width: u32, height: u32 },
    #[error("frame {0} holds no possible match to accept")]
    NotAPossibleMatch(u32),
    #[error("a track named {0:?} already exists")]
    DuplicateTrack(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Vision(#[from] VisionError),
}
