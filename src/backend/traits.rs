//! Core backend abstraction traits
//!
//! The render graph talks to the GPU through a small GL-style binding
//! contract: textures are attached to numbered sampling units, a program is
//! made current, render targets are attached, and a full-screen draw is
//! issued. Both the wgpu backend and the software reference backend
//! implement it.

use crate::backend::types::*;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create surface: {0}")]
    SurfaceCreationFailed(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to acquire next image: {0}")]
    AcquireImageFailed(String),
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create program: {0}")]
    ProgramCreationFailed(String),
    #[error("Draw failed: {0}")]
    DrawFailed(String),
    #[error("Readback failed: {0}")]
    ReadbackFailed(String),
    #[error("Unknown {kind} handle {id}")]
    InvalidHandle { kind: &'static str, id: u64 },
    #[error("Surface lost")]
    SurfaceLost,
    #[error("Out of memory")]
    OutOfMemory,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a GPU uniform buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u64);

/// Handle to a GPU texture (with its sampler state)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to a compiled full-screen program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub(crate) u64);

/// Main graphics backend trait
pub trait GraphicsBackend {
    /// Human readable backend name
    fn name(&self) -> &'static str;

    /// Size of the screen (surface or headless target)
    fn screen_size(&self) -> (u32, u32);

    /// Format used when drawing to the screen
    fn screen_format(&self) -> TextureFormat;

    /// Resize the screen
    fn resize(&mut self, width: u32, height: u32);

    /// Number of sampling units available to one draw
    fn max_texture_units(&self) -> u32;

    // Resource creation

    /// Create a texture with fixed sampler state and optional initial content.
    ///
    /// `data` holds tightly packed rows for every layer, layer-major.
    fn create_texture(
        &mut self,
        desc: &TextureDescriptor,
        sampler: &SamplerDescriptor,
        data: Option<&[u8]>,
    ) -> BackendResult<TextureHandle>;

    /// Read a 2D texture back as RGBA floats, first row first
    fn read_texture(&mut self, texture: TextureHandle) -> BackendResult<Vec<[f32; 4]>>;

    /// Read the screen back as RGBA floats, when the backend supports it
    fn read_screen(&mut self) -> BackendResult<Vec<[f32; 4]>>;

    /// Create a program from reflected GLSL translated to WGSL
    fn create_program(&mut self, desc: &ProgramDescriptor) -> BackendResult<ProgramHandle>;

    /// Create a uniform buffer of `size` bytes
    fn create_uniform_buffer(&mut self, label: &str, size: u64) -> BackendResult<BufferHandle>;

    /// Write data to a uniform buffer
    fn write_uniform_buffer(&mut self, buffer: BufferHandle, data: &[u8]);

    // Binding state and drawing

    /// Start recording a frame
    fn begin_frame(&mut self) -> BackendResult<()>;

    /// Attach a texture to a sampling unit, or clear the unit
    fn bind_texture(&mut self, unit: u32, texture: Option<TextureHandle>);

    /// Attach render targets; an empty list selects the screen
    fn set_render_targets(&mut self, targets: &[TextureHandle]);

    /// Make a program current
    fn use_program(&mut self, program: ProgramHandle);

    /// Attach a uniform buffer to a reflected block slot
    fn bind_uniform_buffer(&mut self, slot: BindingSlot, buffer: BufferHandle);

    /// Draw one screen-covering triangle with the current state
    fn draw_fullscreen(&mut self) -> BackendResult<()>;

    /// Submit and present the frame
    fn end_frame(&mut self) -> BackendResult<()>;

    // Resource cleanup

    /// Destroy a texture
    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Destroy a program
    fn destroy_program(&mut self, program: ProgramHandle);

    /// Destroy a uniform buffer
    fn destroy_buffer(&mut self, buffer: BufferHandle);
}

impl<T: GraphicsBackend + ?Sized> GraphicsBackend for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn screen_size(&self) -> (u32, u32) {
        (**self).screen_size()
    }

    fn screen_format(&self) -> TextureFormat {
        (**self).screen_format()
    }

    fn resize(&mut self, width: u32, height: u32) {
        (**self).resize(width, height)
    }

    fn max_texture_units(&self) -> u32 {
        (**self).max_texture_units()
    }

    fn create_texture(
        &mut self,
        desc: &TextureDescriptor,
        sampler: &SamplerDescriptor,
        data: Option<&[u8]>,
    ) -> BackendResult<TextureHandle> {
        (**self).create_texture(desc, sampler, data)
    }

    fn read_texture(&mut self, texture: TextureHandle) -> BackendResult<Vec<[f32; 4]>> {
        (**self).read_texture(texture)
    }

    fn read_screen(&mut self) -> BackendResult<Vec<[f32; 4]>> {
        (**self).read_screen()
    }

    fn create_program(&mut self, desc: &ProgramDescriptor) -> BackendResult<ProgramHandle> {
        (**self).create_program(desc)
    }

    fn create_uniform_buffer(&mut self, label: &str, size: u64) -> BackendResult<BufferHandle> {
        (**self).create_uniform_buffer(label, size)
    }

    fn write_uniform_buffer(&mut self, buffer: BufferHandle, data: &[u8]) {
        (**self).write_uniform_buffer(buffer, data)
    }

    fn begin_frame(&mut self) -> BackendResult<()> {
        (**self).begin_frame()
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureHandle>) {
        (**self).bind_texture(unit, texture)
    }

    fn set_render_targets(&mut self, targets: &[TextureHandle]) {
        (**self).set_render_targets(targets)
    }

    fn use_program(&mut self, program: ProgramHandle) {
        (**self).use_program(program)
    }

    fn bind_uniform_buffer(&mut self, slot: BindingSlot, buffer: BufferHandle) {
        (**self).bind_uniform_buffer(slot, buffer)
    }

    fn draw_fullscreen(&mut self) -> BackendResult<()> {
        (**self).draw_fullscreen()
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        (**self).end_frame()
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        (**self).destroy_texture(texture)
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        (**self).destroy_program(program)
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        (**self).destroy_buffer(buffer)
    }
}
