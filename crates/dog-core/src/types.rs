//! Core data types shared by the training and serving paths.

use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Image dimensions expected by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
}

impl ImageDimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            channels: 3,
        }
    }

    pub fn square(size: u32) -> Self {
        Self::new(size, size)
    }

    /// Number of scalar values in one image of these dimensions.
    pub fn num_values(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }
}

impl Default for ImageDimensions {
    fn default() -> Self {
        Self::square(224)
    }
}

impl fmt::Display for ImageDimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.channels)
    }
}

/// Fixed-shape RGB image with values in `[0, 1]`, stored row-major as HWC.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    dims: ImageDimensions,
    data: Vec<f32>,
}

impl ImageTensor {
    /// Wrap HWC data, checking the length against the dimensions.
    pub fn from_hwc(dims: ImageDimensions, data: Vec<f32>) -> Result<Self> {
        if dims.channels != 3 {
            return Err(Error::InvalidArgument(format!(
                "image tensors are RGB, got {} channels",
                dims.channels
            )));
        }
        if data.len() != dims.num_values() {
            return Err(Error::InvalidArgument(format!(
                "expected {} values for {}, got {}",
                dims.num_values(),
                dims,
                data.len()
            )));
        }
        Ok(Self { dims, data })
    }

    /// Scale an 8-bit RGB image into `[0, 1]` without resizing.
    pub fn from_rgb_image(img: &RgbImage) -> Self {
        let dims = ImageDimensions::new(img.width(), img.height());
        let data = img
            .pixels()
            .flat_map(|p| p.0)
            .map(|v| v as f32 / 255.0)
            .collect();
        Self { dims, data }
    }

    pub fn dims(&self) -> ImageDimensions {
        self.dims
    }

    pub fn as_hwc(&self) -> &[f32] {
        &self.data
    }

    /// Value at row `y`, column `x`, channel `c`.
    pub fn get(&self, y: u32, x: u32, c: u32) -> f32 {
        let w = self.dims.width as usize;
        self.data[(y as usize * w + x as usize) * 3 + c as usize]
    }

    /// Channel-first copy, the layout the numeric engine consumes.
    pub fn to_chw(&self) -> Vec<f32> {
        let plane = self.dims.width as usize * self.dims.height as usize;
        let mut chw = vec![0.0f32; plane * 3];
        for (i, px) in self.data.chunks_exact(3).enumerate() {
            chw[i] = px[0];
            chw[plane + i] = px[1];
            chw[2 * plane + i] = px[2];
        }
        chw
    }

    /// Re-encode as an 8-bit image (values scaled by 255 and rounded).
    pub fn to_rgb_image(&self) -> RgbImage {
        let mut img = RgbImage::new(self.dims.width, self.dims.height);
        for (i, px) in self.data.chunks_exact(3).enumerate() {
            let x = (i % self.dims.width as usize) as u32;
            let y = (i / self.dims.width as usize) as u32;
            let to_u8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
            img.put_pixel(x, y, Rgb([to_u8(px[0]), to_u8(px[1]), to_u8(px[2])]));
        }
        img
    }

    /// Mirror the image left to right.
    pub fn flip_horizontal(&self) -> Self {
        let w = self.dims.width as usize;
        let mut data = Vec::with_capacity(self.data.len());
        for row in self.data.chunks_exact(w * 3) {
            for px in row.chunks_exact(3).rev() {
                data.extend_from_slice(px);
            }
        }
        Self {
            dims: self.dims,
            data,
        }
    }

    pub fn min_max(&self) -> (f32, f32) {
        self.data
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            })
    }
}

/// Dataset split type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataSplit {
    Train,
    Validation,
}

impl fmt::Display for DataSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSplit::Train => write!(f, "train"),
            DataSplit::Validation => write!(f, "validation"),
        }
    }
}
