//! Backend abstraction layer
//!
//! Provides the binding contract and the two implementations: wgpu for real
//! GPUs and a CPU reference backend for tests and GPU-less hosts.

pub mod software;
pub mod traits;
pub mod types;
pub mod wgpu_backend;

pub use software::{FragmentContext, FragmentKernel, SoftwareBackend, SoftwareCall};
pub use traits::*;
pub use types::*;
pub use wgpu_backend::{WgpuBackend, WgpuConfig};
