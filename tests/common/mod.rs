//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use passgraph::backend::SoftwareBackend;
use passgraph::{GraphicsBackend, MemoryAssetLoader, Scene, WgpuBackend};

/// Which backend a parameterized test runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Software,
    Wgpu,
}

pub type TestScene = Scene<Box<dyn GraphicsBackend>, MemoryAssetLoader>;

pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .is_test(true)
        .try_init();
}

/// Writes the `color` member of the `tint` data block.
pub const SOLID: &str = r#"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 frag_color;
layout(set = 0, binding = 0) uniform tint {
    vec4 color;
};
void main() {
    frag_color = color;
}
"#;

pub const COPY: &str = r#"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 frag_color;
layout(set = 1, binding = 0) uniform texture2D src;
layout(set = 1, binding = 1) uniform sampler src_sampler;
void main() {
    frag_color = texture(sampler2D(src, src_sampler), v_uv);
}
"#;

/// Adds 0.25 to every channel of `src`.
pub const INCREMENT: &str = r#"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 frag_color;
layout(set = 1, binding = 0) uniform texture2D src;
layout(set = 1, binding = 1) uniform sampler src_sampler;
void main() {
    frag_color = texture(sampler2D(src, src_sampler), v_uv) + vec4(0.25);
}
"#;

pub const DEFINED_VALUE: &str = r#"#version 450
#ifndef VALUE
#define VALUE 0.0
#endif
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 frag_color;
void main() {
    frag_color = vec4(VALUE, VALUE, VALUE, 1.0);
}
"#;

/// Samples `sky` along the direction held in the `probe` data block.
pub const CUBE_PROBE: &str = r#"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 frag_color;
layout(set = 0, binding = 0) uniform probe {
    vec4 direction;
};
layout(set = 1, binding = 0) uniform textureCube sky;
layout(set = 1, binding = 1) uniform sampler sky_sampler;
void main() {
    frag_color = texture(samplerCube(sky, sky_sampler), direction.xyz);
}
"#;

/// Writes red to the first output and blue to the second.
pub const SPLIT: &str = r#"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 first;
layout(location = 1) out vec4 second;
void main() {
    first = vec4(1.0, 0.0, 0.0, 1.0);
    second = vec4(0.0, 0.0, 1.0, 1.0);
}
"#;

/// Software backend with kernels for the library and the shaders above.
pub fn software(width: u32, height: u32) -> SoftwareBackend {
    let mut backend = SoftwareBackend::with_library_kernels(width, height);
    backend.register_kernel("test/solid", |ctx| {
        [0, 1, 2, 3].map(|i| ctx.uniform_f32("tint", i))
    });
    backend.register_kernel("test/copy", |ctx| ctx.sample(0, ctx.uv));
    backend.register_kernel("test/increment", |ctx| {
        ctx.sample(0, ctx.uv).map(|c| c + 0.25)
    });
    backend.register_kernel("test/defined_value", |ctx| {
        let v = ctx.define_f32("VALUE", 0.0);
        [v, v, v, 1.0]
    });
    backend.register_kernel("test/cube_probe", |ctx| {
        let dir = [0, 1, 2].map(|i| ctx.uniform_f32("probe", i));
        ctx.sample_cube(0, dir)
    });
    backend.register_mrt_kernel("test/split", |_, out| {
        let colors = [[1.0, 0.0, 0.0, 1.0], [0.0, 0.0, 1.0, 1.0]];
        for (slot, color) in out.iter_mut().zip(colors) {
            *slot = color;
        }
    });
    backend
}

/// Backend of the requested kind, or `None` when no GPU adapter exists.
pub fn backend(kind: Backend, width: u32, height: u32) -> Option<Box<dyn GraphicsBackend>> {
    match kind {
        Backend::Software => Some(Box::new(software(width, height))),
        Backend::Wgpu => match WgpuBackend::new_headless(width, height) {
            Ok(backend) => Some(Box::new(backend)),
            Err(error) => {
                eprintln!("skipping wgpu case: {error}");
                None
            }
        },
    }
}

pub fn scene(kind: Backend, width: u32, height: u32) -> Option<TestScene> {
    init_logging();
    backend(kind, width, height).map(|backend| Scene::new(backend, MemoryAssetLoader::new()))
}

pub fn assert_color(pixel: [f32; 4], expected: [f32; 4], tolerance: f32) {
    for (actual, expected) in pixel.iter().zip(expected.iter()) {
        assert!(
            (actual - expected).abs() <= tolerance,
            "pixel {pixel:?} differs from {expected:?}"
        );
    }
}

pub fn assert_uniform(pixels: &[[f32; 4]], expected: [f32; 4], tolerance: f32) {
    assert!(!pixels.is_empty());
    for pixel in pixels {
        assert_color(*pixel, expected, tolerance);
    }
}
