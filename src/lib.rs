//! passgraph - multi-pass full-screen rendering on wgpu
//!
//! A scene is configured once (shaders, images, cubemaps, render-target
//! buffers, uniform data blocks and an ordered list of passes) and then
//! rendered once per host frame. Each pass samples its inputs with one
//! fragment program and writes its outputs, or the screen when it has none.
//!
//! # Features
//! - GLSL 450 fragment programs with `#include` and preprocessor defines,
//!   translated to WGSL with naga
//! - Fixed sampler presets and GL-style buffer formats
//! - Shared uniform arrays uploaded once per frame
//! - Explicit unbinding so no texture is ever sampled while it is a render target
//! - A wgpu backend (windowed or headless) and a CPU reference backend
//!
//! # Example
//!
//! ```ignore
//! use passgraph::{Scene, SoftwareBackend, MemoryAssetLoader, ShaderOptions};
//! use passgraph::shader::library;
//!
//! let mut scene = Scene::new(SoftwareBackend::with_library_kernels(400, 300), MemoryAssetLoader::new());
//! let hdr = scene.add_buffer("hdr", 400, 300)?;
//! let tonemap = scene.compile_builtin(&library::TONEMAP, &ShaderOptions::default())?;
//! scene.add_pass(&[hdr], tonemap, &[])?;
//! scene.render()?;
//! ```

pub mod assets;
pub mod backend;
pub mod error;
pub mod render_graph;
pub mod resources;
pub mod scene;
pub mod shader;
pub mod window;

pub use assets::{AssetLoader, FileAssetLoader, MemoryAssetLoader};
pub use backend::{GraphicsBackend, SoftwareBackend, WgpuBackend, WgpuConfig};
pub use error::{AssetError, CompileError, ConfigError, EngineError, EngineResult};
pub use render_graph::{BoundResources, DataBlockId, PassId, UniformArray, UniformSource};
pub use resources::{BufferFormat, DecodedImage, ImageId, ImageKind, SamplerPreset};
pub use scene::{Scene, SceneState};
pub use shader::{ShaderId, ShaderOptions};
pub use window::{HostEvent, Window};

/// Defaults a scene applies when a call does not say otherwise.
#[derive(Debug, Clone)]
pub struct SceneConfig {
    /// Format of buffers created with [`Scene::add_buffer`]
    pub default_buffer_format: BufferFormat,
    /// Preset of loaded images and cubemaps
    pub default_image_preset: SamplerPreset,
    /// Preset of buffers created with [`Scene::add_buffer`]
    pub default_buffer_preset: SamplerPreset,
    /// Maximum number of outputs of one pass
    pub max_color_targets: usize,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            default_buffer_format: BufferFormat::RGBA16F,
            default_image_preset: SamplerPreset::LinearRepeat,
            default_buffer_preset: SamplerPreset::NearestClamp,
            max_color_targets: 4,
        }
    }
}
