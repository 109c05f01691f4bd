//! Resource management
//!
//! Image resources (decoded images, cubemaps and render-target buffers),
//! their sampler presets and buffer formats.

mod format;
mod manager;
mod texture;

pub use format::*;
pub use manager::*;
pub use texture::*;
