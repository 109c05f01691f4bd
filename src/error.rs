//! Error types for the render graph engine.

use thiserror::Error;

use crate::backend::BackendError;

/// Invalid scene configuration, reported by the call that introduced it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown sampler preset: {0}")]
    UnknownSamplerPreset(String),
    #[error("Unknown pixel format: {0}")]
    UnknownPixelFormat(String),
    #[error("Unknown internal format: {0}")]
    UnknownInternalFormat(String),
    #[error("Unknown component type: {0}")]
    UnknownComponentType(String),
    #[error("Unsupported buffer format: {pixel} / {internal} / {component}")]
    UnsupportedBufferFormat {
        pixel: String,
        internal: String,
        component: String,
    },
    #[error("Cubemap faces must be square and of one size: {0}")]
    CubemapFaceMismatch(String),
    #[error("Pass with shader '{shader}' expects {expected} inputs, got {actual}")]
    InputCountMismatch {
        shader: String,
        expected: usize,
        actual: usize,
    },
    #[error("Input {index} of shader '{shader}' ({sampler}) expects a {expected} image")]
    InputKindMismatch {
        shader: String,
        index: usize,
        sampler: String,
        expected: &'static str,
    },
    #[error("Image {0} is not a render target")]
    NotRenderTarget(u64),
    #[error("Outputs of one pass must share a size: {first:?} vs {other:?}")]
    OutputSizeMismatch {
        first: (u32, u32),
        other: (u32, u32),
    },
    #[error("Pass writes {count} outputs, the limit is {max}")]
    TooManyOutputs { count: usize, max: usize },
    #[error("Pass reads {count} inputs, the backend has {max} sampling units")]
    TooManyInputs { count: usize, max: usize },
    #[error("Unknown image {0}")]
    UnknownImage(u64),
    #[error("Unknown shader {0}")]
    UnknownShader(u64),
    #[error("Image {image} is used by pass {pass}")]
    ImageInUse { image: u64, pass: usize },
    #[error("Data block '{0}' already exists")]
    DuplicateDataBlock(String),
    #[error("Data block '{0}' has no arrays")]
    EmptyDataBlock(String),
    #[error("Shader '{shader}' uses uniform block '{block}' which is not registered")]
    UnknownDataBlock { shader: String, block: String },
    #[error("Data block '{block}' holds {actual} bytes, shader '{shader}' expects {expected}")]
    DataBlockTooSmall {
        shader: String,
        block: String,
        expected: u64,
        actual: u64,
    },
    #[error("Pass {pass} reads image {image} before any pass writes it")]
    ReadBeforeWrite { pass: usize, image: u64 },
    #[error("Pass {pass} reads its own output {image}")]
    FeedbackLoop { pass: usize, image: u64 },
}

/// Shader compilation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("Include not found in '{shader}': \"{path}\"")]
    Include { shader: String, path: String },
    #[error("GLSL parse error in '{shader}':\n{message}")]
    Parse { shader: String, message: String },
    #[error("Validation error in '{shader}': {message}")]
    Validation { shader: String, message: String },
    #[error("WGSL generation error in '{shader}': {message}")]
    Emit { shader: String, message: String },
    #[error("Sampler '{name}' is not declared by '{shader}' (expected `{name}` and `{name}_sampler`)")]
    UnresolvedSampler { shader: String, name: String },
    #[error("'{shader}' declares texture or sampler '{name}' that is not in its input list")]
    UnlistedInput { shader: String, name: String },
}

/// Asset loading failures.
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to decode '{path}': {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("Asset not found: '{0}'")]
    NotFound(String),
    #[error("'{0}' is not valid UTF-8")]
    InvalidText(String),
}

/// Top-level error of every scene operation.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error("Scene has been destroyed")]
    Destroyed,
    #[error("Window error: {0}")]
    Window(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
