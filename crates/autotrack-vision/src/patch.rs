use autotrack_proto::record::PatchData;
use image::RgbImage;

use crate::{MaskShape, VisionError, MIN_MASK_EXTENT};

/// Owned RGB pixel block with fractional channel values.
///
/// Patches are always copied out of a frame so the decoder is free to reuse its
/// buffers between steps.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    width: u32,
    height: u32,
    rgb: Vec<f32>,
}

impl Patch {
    pub fn new(width: u32, height: u32, rgb: Vec<f32>) -> Result<Self, VisionError> {
        let want = pixel_count(width, height).and_then(|n| n.checked_mul(3));
        if want != Some(rgb.len()) {
            return Err(VisionError::SizeMismatch {
                expected: (width, height),
                got: (rgb.len() as u32 / 3, 1),
            });
        }
        Ok(Self { width, height, rgb })
    }

    pub fn filled(width: u32, height: u32, value: [f32; 3]) -> Self {
        let n = width as usize * height as usize;
        let rgb = value.iter().copied().cycle().take(n * 3).collect();
        Self { width, height, rgb }
    }

    /// Copies the `width x height` block whose top-left pixel is (left, top).
    /// Off-frame pixels read as black and are flagged `false` in the returned mask.
    pub fn cut(image: &RgbImage, left: i64, top: i64, width: u32, height: u32) -> (Self, Vec<bool>) {
        let (iw, ih) = (image.width() as i64, image.height() as i64);
        let n = width as usize * height as usize;
        let mut rgb = Vec::with_capacity(n * 3);
        let mut inside = Vec::with_capacity(n);
        for j in 0..height as i64 {
            for i in 0..width as i64 {
                let (x, y) = (left + i, top + j);
                if x >= 0 && y >= 0 && x < iw && y < ih {
                    let p = image.get_pixel(x as u32, y as u32).0;
                    rgb.extend_from_slice(&[p[0] as f32, p[1] as f32, p[2] as f32]);
                    inside.push(true);
                } else {
                    rgb.extend_from_slice(&[0.0, 0.0, 0.0]);
                    inside.push(false);
                }
            }
        }
        (Self { width, height, rgb }, inside)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn rgb(&self) -> &[f32] {
        &self.rgb
    }

    pub fn pixel(&self, i: u32, j: u32) -> [f32; 3] {
        let k = (j as usize * self.width as usize + i as usize) * 3;
        [self.rgb[k], self.rgb[k + 1], self.rgb[k + 2]]
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.rgb.iter().map(|v| v.round().clamp(0.0, 255.0) as u8).collect()
    }

}

fn pixel_count(width: u32, height: u32) -> Option<usize> {
    (width as usize).checked_mul(height as usize)
}

/// Reference appearance of the tracked feature: pixels plus the mask of
/// pixels that take part in matching.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    patch: Patch,
    mask: Vec<bool>,
}

impl Template {
    pub fn new(patch: Patch, mask: Vec<bool>) -> Result<Self, VisionError> {
        if pixel_count(patch.width, patch.height) != Some(mask.len()) {
            return Err(VisionError::SizeMismatch {
                expected: patch.dimensions(),
                got: (mask.len() as u32, 1),
            });
        }
        let t = Self { patch, mask };
        t.check_extent()?;
        Ok(t)
    }

    /// Cuts a template centred on pixel `center` using the mask geometry.
    pub fn capture(image: &RgbImage, center: (i64, i64), shape: &MaskShape) -> Result<Self, VisionError> {
        let left = center.0 - shape.left() as i64;
        let top = center.1 - shape.top() as i64;
        let (patch, inside) = Patch::cut(image, left, top, shape.width, shape.height);
        let mask = shape
            .coverage()
            .into_iter()
            .zip(inside)
            .map(|(m, i)| m && i)
            .collect();
        Self::new(patch, mask)
    }

    pub fn patch(&self) -> &Patch {
        &self.patch
    }

    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    pub fn width(&self) -> u32 {
        self.patch.width
    }

    pub fn height(&self) -> u32 {
        self.patch.height
    }

    /// Same mask, new pixels.
    pub fn with_patch(&self, patch: Patch) -> Result<Self, VisionError> {
        if patch.dimensions() != self.patch.dimensions() {
            return Err(VisionError::SizeMismatch {
                expected: self.patch.dimensions(),
                got: patch.dimensions(),
            });
        }
        Ok(Self { patch, mask: self.mask.clone() })
    }

    pub fn to_data(&self) -> PatchData {
        PatchData {
            width: self.patch.width,
            height: self.patch.height,
            rgb: self.patch.to_bytes(),
            mask: self.mask.clone(),
        }
    }

    pub fn from_data(data: &PatchData) -> Result<Self, VisionError> {
        let rgb = data.rgb.iter().map(|b| *b as f32).collect();
        Self::new(Patch::new(data.width, data.height, rgb)?, data.mask.clone())
    }

    fn check_extent(&self) -> Result<(), VisionError> {
        let w = self.patch.width as usize;
        let h = self.patch.height as usize;
        let cols = (0..w).filter(|i| (0..h).any(|j| self.mask[j * w + i])).count() as u32;
        let rows = (0..h).filter(|j| (0..w).any(|i| self.mask[j * w + i])).count() as u32;
        if cols < MIN_MASK_EXTENT || rows < MIN_MASK_EXTENT {
            return Err(VisionError::MaskTooSmall { cols, rows, min: MIN_MASK_EXTENT });
        }
        Ok(())
    }
}
