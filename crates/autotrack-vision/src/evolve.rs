use crate::{Patch, Template, VisionError};

/// Blend weight for an evolution rate in percent.
pub fn blend_weight(rate: u32) -> f32 {
    rate.min(100) as f32 / 100.0
}

/// Mixes a freshly matched region into the template: `t * (1 - w) + m * w`.
/// The mask is kept as is.
pub fn evolve(current: &Template, matched: &Patch, rate: u32) -> Result<Template, VisionError> {
    if matched.dimensions() != current.patch().dimensions() {
        return Err(VisionError::SizeMismatch {
            expected: current.patch().dimensions(),
            got: matched.dimensions(),
        });
    }
    if rate == 0 {
        return Ok(current.clone());
    }
    if rate >= 100 {
        return current.with_patch(matched.clone());
    }

    let w = blend_weight(rate);
    let rgb = current
        .patch()
        .rgb()
        .iter()
        .zip(matched.rgb())
        .map(|(t, m)| t * (1.0 - w) + m * w)
        .collect();
    let (width, height) = current.patch().dimensions();
    current.with_patch(Patch::new(width, height, rgb)?)
}
