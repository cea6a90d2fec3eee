use anyhow::Result;
use autotrack_proto::Point;
use autotrack_vision::{ImageCoords, MIN_MASK_EXTENT};

use crate::TrackerSettings;

pub fn check_settings(s: &TrackerSettings) -> Result<()> {
    s.validate().map_err(|e| anyhow::anyhow!("tracker: {e}"))?;
    anyhow::ensure!(
        s.mask_width >= MIN_MASK_EXTENT && s.mask_height >= MIN_MASK_EXTENT,
        "tracker.mask_width/mask_height below {MIN_MASK_EXTENT}"
    );
    anyhow::ensure!(s.evolve_rate <= 100, "tracker.evolve_rate must be 0..=100");
    Ok(())
}

/// The key frame must leave room for the mask and a search window.
pub fn check_key_frame(s: &TrackerSettings, position: Point, width: u32, height: u32) -> Result<()> {
    anyhow::ensure!(
        position.x >= 0.0 && position.y >= 0.0 && position.x < width as f64 && position.y < height as f64,
        "key_frame ({}, {}) outside the {}x{} frame",
        position.x,
        position.y,
        width,
        height
    );
    anyhow::ensure!(
        s.mask_width < width && s.mask_height < height,
        "mask {}x{} does not fit the {}x{} frame",
        s.mask_width,
        s.mask_height,
        width,
        height
    );
    Ok(())
}

/// In 1-D mode the key frame has to lie within the strip around the
/// configured reference line.
pub fn check_line_mode(s: &TrackerSettings, coords: &ImageCoords, position: Point) -> Result<()> {
    if s.line_spread <= 0 {
        return Ok(());
    }
    let d = coords.axis().perpendicular_distance(position);
    anyhow::ensure!(
        d <= s.line_spread as f64,
        "key_frame is {:.1}px off the x-axis, line_spread is {}",
        d,
        s.line_spread
    );
    Ok(())
}
