//! Image normalization shared by training and serving.
//!
//! Every image the model ever sees, whether loaded from the dataset directory or
//! uploaded to the API, goes through [`ImageNormalizer::normalize_image`]:
//! decode to RGB, resize to the exact target resolution (no aspect-preserving
//! crop), then scale each channel into `[0, 1]`.

use std::fs;
use std::path::Path;

use dog_core::{Error, ImageDimensions, ImageTensor, Result};
use image::imageops::{self, FilterType};
use image::DynamicImage;

/// Deterministic raw-bytes to [`ImageTensor`] conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageNormalizer {
    target: ImageDimensions,
}

impl ImageNormalizer {
    pub fn new(target: ImageDimensions) -> Self {
        Self { target }
    }

    pub fn square(size: u32) -> Self {
        Self::new(ImageDimensions::square(size))
    }

    pub fn target(&self) -> ImageDimensions {
        self.target
    }

    /// Decode encoded image bytes (JPEG, PNG, ...) and normalize them.
    pub fn normalize(&self, raw: &[u8]) -> Result<ImageTensor> {
        if raw.is_empty() {
            return Err(Error::Decode("no image data".into()));
        }
        let image = image::load_from_memory(raw)
            .map_err(|e| Error::Decode(format!("unreadable image: {e}")))?;
        Ok(self.normalize_image(&image))
    }

    /// Read a file from disk and normalize it.
    pub fn normalize_path(&self, path: &Path) -> Result<ImageTensor> {
        let raw = fs::read(path)
            .map_err(|e| Error::NotFound(format!("image {}: {e}", path.display())))?;
        self.normalize(&raw).map_err(|e| match e {
            Error::Decode(msg) => Error::Decode(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn normalize_image(&self, image: &DynamicImage) -> ImageTensor {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();

        let rgb = if width == self.target.width && height == self.target.height {
            rgb
        } else {
            imageops::resize(&rgb, self.target.width, self.target.height, FilterType::Triangle)
        };

        ImageTensor::from_rgb_image(&rgb)
    }
}

impl Default for ImageNormalizer {
    fn default() -> Self {
        Self::new(ImageDimensions::default())
    }
}
