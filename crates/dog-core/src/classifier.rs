//! The seam between normalized images and whatever model produces probabilities.

use crate::types::{ImageDimensions, ImageTensor};
use crate::{Error, Result};

/// A trained model that maps normalized images to class probabilities.
///
/// Implementations must be safe to call concurrently.
pub trait Classifier: Send + Sync {
    /// Width of the probability vector.
    fn num_classes(&self) -> usize;

    /// Resolution the model was trained at.
    fn input_dims(&self) -> ImageDimensions;

    /// One probability vector per image, in input order.
    fn predict_batch(&self, images: &[ImageTensor]) -> Result<Vec<Vec<f32>>>;

    fn predict(&self, image: &ImageTensor) -> Result<Vec<f32>> {
        self.predict_batch(std::slice::from_ref(image))?
            .pop()
            .ok_or_else(|| Error::Model("classifier returned no output".into()))
    }
}
