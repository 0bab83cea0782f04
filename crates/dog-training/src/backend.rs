//! Backend selection.
//!
//! CPU (`ndarray`) by default; the `backend-wgpu` feature switches to the GPU.

use burn::backend::Autodiff;

#[cfg(not(feature = "backend-wgpu"))]
pub type DefaultBackend = burn_ndarray::NdArray<f32>;

#[cfg(feature = "backend-wgpu")]
pub type DefaultBackend = burn::backend::Wgpu;

/// The default autodiff backend for training
pub type TrainingBackend = Autodiff<DefaultBackend>;

pub fn default_device() -> <DefaultBackend as burn::tensor::backend::Backend>::Device {
    Default::default()
}

/// Human-readable name of the compiled-in backend
pub fn backend_name() -> &'static str {
    #[cfg(feature = "backend-wgpu")]
    {
        "WGPU (GPU)"
    }
    #[cfg(not(feature = "backend-wgpu"))]
    {
        "NdArray (CPU)"
    }
}
