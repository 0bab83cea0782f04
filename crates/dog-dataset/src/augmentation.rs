//! Training-time augmentation applied to already-normalized images.
//!
//! Augmentation runs after [`crate::ImageNormalizer`], so the decode, resize
//! and scale steps stay identical to the serving path.

use dog_core::{AugmentationConfig, ImageTensor, Result};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Random flip, rotation and zoom for training images
#[derive(Debug, Clone)]
pub struct AugmentationPipeline {
    config: AugmentationConfig,
}

impl AugmentationPipeline {
    pub fn new(config: AugmentationConfig) -> Self {
        Self { config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
            && (self.config.horizontal_flip
                || self.config.rotation_range > 0.0
                || self.config.zoom_range > 0.0)
    }

    pub fn augment(&self, image: &ImageTensor, rng: &mut ChaCha8Rng) -> Result<ImageTensor> {
        if !self.config.enabled {
            return Ok(image.clone());
        }

        let augmented = if self.config.horizontal_flip && rng.gen_bool(0.5) {
            image.flip_horizontal()
        } else {
            image.clone()
        };

        let angle = if self.config.rotation_range > 0.0 {
            rng.gen_range(-self.config.rotation_range..=self.config.rotation_range)
        } else {
            0.0
        };
        let scale = if self.config.zoom_range > 0.0 {
            rng.gen_range((1.0 - self.config.zoom_range)..=(1.0 + self.config.zoom_range))
        } else {
            1.0
        };

        transform_center(&augmented, angle, scale)
    }
}

/// Rotate by `angle_degrees` and zoom by `scale` around the image center.
///
/// `scale < 1` zooms in, `scale > 1` zooms out. Output pixels are sampled with
/// nearest neighbour; samples falling outside the image repeat the edge pixel.
fn transform_center(image: &ImageTensor, angle_degrees: f64, scale: f64) -> Result<ImageTensor> {
    if angle_degrees == 0.0 && scale == 1.0 {
        return Ok(image.clone());
    }

    let dims = image.dims();
    let (w, h) = (dims.width as f64, dims.height as f64);
    let (cx, cy) = (w / 2.0, h / 2.0);
    let (sin, cos) = angle_degrees.to_radians().sin_cos();
    let max_x = dims.width.saturating_sub(1) as f64;
    let max_y = dims.height.saturating_sub(1) as f64;

    let mut data = Vec::with_capacity(dims.num_values());
    for y in 0..dims.height {
        let dy = y as f64 + 0.5 - cy;
        for x in 0..dims.width {
            let dx = x as f64 + 0.5 - cx;
            let src_x = cx + scale * (cos * dx - sin * dy);
            let src_y = cy + scale * (sin * dx + cos * dy);
            let sx = src_x.floor().clamp(0.0, max_x) as u32;
            let sy = src_y.floor().clamp(0.0, max_y) as u32;
            for c in 0..3 {
                data.push(image.get(sy, sx, c));
            }
        }
    }

    ImageTensor::from_hwc(dims, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use rand::SeedableRng;

    fn sample() -> ImageTensor {
        let img = RgbImage::from_fn(12, 12, |x, y| Rgb([(x * 20) as u8, (y * 20) as u8, 7]));
        ImageTensor::from_rgb_image(&img)
    }

    #[test]
    fn test_disabled_pipeline_is_identity() {
        let pipeline = AugmentationPipeline::new(AugmentationConfig {
            enabled: false,
            ..AugmentationConfig::default()
        });
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let image = sample();
        assert_eq!(pipeline.augment(&image, &mut rng).unwrap(), image);
        assert!(!pipeline.is_enabled());
    }

    #[test]
    fn test_augmentation_preserves_shape_and_range() {
        let pipeline = AugmentationPipeline::new(AugmentationConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let image = sample();

        for _ in 0..10 {
            let out = pipeline.augment(&image, &mut rng).unwrap();
            assert_eq!(out.dims(), image.dims());
            let (lo, hi) = out.min_max();
            assert!(lo >= 0.0 && hi <= 1.0);
        }
    }

    #[test]
    fn test_same_seed_same_output() {
        let pipeline = AugmentationPipeline::new(AugmentationConfig::default());
        let image = sample();
        let a = pipeline
            .augment(&image, &mut ChaCha8Rng::seed_from_u64(3))
            .unwrap();
        let b = pipeline
            .augment(&image, &mut ChaCha8Rng::seed_from_u64(3))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_zoom_in_keeps_center_pixel() {
        let image = sample();
        let zoomed = transform_center(&image, 0.0, 0.5).unwrap();
        assert_eq!(zoomed.get(6, 6, 0), image.get(6, 6, 0));
        assert_ne!(zoomed.get(0, 0, 0), image.get(0, 0, 0));
        assert_eq!(transform_center(&image, 0.0, 1.0).unwrap(), image);
    }

    #[test]
    fn test_zoom_out_repeats_edges() {
        let image = sample();
        let zoomed = transform_center(&image, 0.0, 2.0).unwrap();

        assert_eq!(zoomed.get(5, 5, 0), image.get(5, 5, 0));
        // pixel 3 samples source 1; the border clamps to the source border
        assert_eq!(zoomed.get(3, 3, 0), image.get(1, 1, 0));
        assert_eq!(zoomed.get(0, 0, 0), image.get(0, 0, 0));
        assert_eq!(zoomed.get(11, 11, 1), image.get(11, 11, 1));
    }

    #[test]
    fn test_half_turn_mirrors_both_axes() {
        let image = sample();
        let rotated = transform_center(&image, 180.0, 1.0).unwrap();

        for (y, x) in [(0, 0), (2, 9), (11, 4)] {
            for c in 0..3 {
                assert_eq!(rotated.get(y, x, c), image.get(11 - y, 11 - x, c));
            }
        }
    }

    #[test]
    fn test_rotation_only_pipeline_changes_pixels() {
        let pipeline = AugmentationPipeline::new(AugmentationConfig {
            enabled: true,
            horizontal_flip: false,
            rotation_range: 20.0,
            zoom_range: 0.0,
        });
        assert!(pipeline.is_enabled());

        let image = sample();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let changed = (0..10)
            .map(|_| pipeline.augment(&image, &mut rng).unwrap())
            .filter(|out| *out != image)
            .count();
        assert!(changed > 0);
    }

    #[test]
    fn test_zoom_factor_covers_both_directions() {
        let pipeline = AugmentationPipeline::new(AugmentationConfig {
            enabled: true,
            horizontal_flip: false,
            rotation_range: 0.0,
            zoom_range: 0.5,
        });
        let image = sample();
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        // zooming out repeats the top-left pixel along the border, zooming in drops it
        let (mut zoomed_in, mut zoomed_out) = (false, false);
        for _ in 0..50 {
            let out = pipeline.augment(&image, &mut rng).unwrap();
            if out.get(1, 1, 0) == image.get(0, 0, 0) && out.get(1, 1, 1) == image.get(0, 0, 1) {
                zoomed_out = true;
            } else if out.get(0, 0, 0) != image.get(0, 0, 0) {
                zoomed_in = true;
            }
        }
        assert!(zoomed_in && zoomed_out);
    }
}
