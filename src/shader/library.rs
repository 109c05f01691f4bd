//! Built-in shader sources.
//!
//! Two kinds of sources live here:
//!
//! - include modules, available to any program through `#include "path"`;
//! - complete post-processing programs ([`BuiltinShader`]) that scenes
//!   compile with [`Scene::compile_builtin`](crate::scene::Scene::compile_builtin).
//!
//! | Include path | Contents |
//! |--------------|----------|
//! | `passgraph/color.glsl` | `luma`, `aces_tonemap` |
//! | `passgraph/noise.glsl` | `hash12`, `value_noise`, `fbm`, `interleaved_gradient_noise` |
//! | `passgraph/camera.glsl` | `rotate_x`, `rotate_y`, `camera_ray` |

/// Vertex stage shared by every program: one screen-covering triangle.
pub const FULLSCREEN_VERTEX_SHADER: &str = include_str!("../../shaders/fullscreen.wgsl");

/// Entry point of [`FULLSCREEN_VERTEX_SHADER`].
pub const VERTEX_ENTRY_POINT: &str = "vs_main";

/// Entry point of every fragment program (GLSL `main`).
pub const FRAGMENT_ENTRY_POINT: &str = "main";

const COLOR_MODULE: &str = include_str!("../../shaders/library/color.glsl");
const NOISE_MODULE: &str = include_str!("../../shaders/library/noise.glsl");
const CAMERA_MODULE: &str = include_str!("../../shaders/library/camera.glsl");

/// A complete program shipped with the crate.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinShader {
    /// Program label, also the key software kernels are registered under.
    pub label: &'static str,
    pub source: &'static str,
    /// Sampler names in input order.
    pub samplers: &'static [&'static str],
}

pub const BLIT: BuiltinShader = BuiltinShader {
    label: "builtin/blit.glsl",
    source: include_str!("../../shaders/builtin/blit.glsl"),
    samplers: &["image"],
};

pub const DOWNSAMPLE: BuiltinShader = BuiltinShader {
    label: "builtin/downsample.glsl",
    source: include_str!("../../shaders/builtin/downsample.glsl"),
    samplers: &["srcTexture"],
};

pub const UPSAMPLE: BuiltinShader = BuiltinShader {
    label: "builtin/upsample.glsl",
    source: include_str!("../../shaders/builtin/upsample.glsl"),
    samplers: &["srcTexture"],
};

pub const MIX: BuiltinShader = BuiltinShader {
    label: "builtin/mix.glsl",
    source: include_str!("../../shaders/builtin/mix.glsl"),
    samplers: &["first", "second"],
};

pub const TONEMAP: BuiltinShader = BuiltinShader {
    label: "builtin/tonemap.glsl",
    source: include_str!("../../shaders/builtin/tonemap.glsl"),
    samplers: &["image"],
};

pub const DITHER: BuiltinShader = BuiltinShader {
    label: "builtin/dither.glsl",
    source: include_str!("../../shaders/builtin/dither.glsl"),
    samplers: &["image"],
};

pub const FXAA: BuiltinShader = BuiltinShader {
    label: "builtin/fxaa.glsl",
    source: include_str!("../../shaders/builtin/fxaa.glsl"),
    samplers: &["iChannel0"],
};

pub const BLUR: BuiltinShader = BuiltinShader {
    label: "builtin/blur.glsl",
    source: include_str!("../../shaders/builtin/blur.glsl"),
    samplers: &["iChannel0"],
};

/// Every built-in program.
pub const BUILTIN_SHADERS: [BuiltinShader; 8] =
    [BLIT, DOWNSAMPLE, UPSAMPLE, MIX, TONEMAP, DITHER, FXAA, BLUR];

/// Collection of include modules.
pub struct ShaderLibrary {
    modules: Vec<(&'static str, &'static str)>,
}

impl ShaderLibrary {
    /// The modules listed in the module documentation.
    pub fn standard() -> Self {
        Self {
            modules: vec![
                ("passgraph/color.glsl", COLOR_MODULE),
                ("passgraph/noise.glsl", NOISE_MODULE),
                ("passgraph/camera.glsl", CAMERA_MODULE),
            ],
        }
    }

    pub fn empty() -> Self {
        Self {
            modules: Vec::new(),
        }
    }

    /// Get an iterator over all modules (path, source).
    pub fn modules(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.modules.iter().copied()
    }

    pub fn with_module(mut self, path: &'static str, source: &'static str) -> Self {
        self.modules.push((path, source));
        self
    }
}
