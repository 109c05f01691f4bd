//! Software reference backend.
//!
//! Runs full-screen programs on the CPU. The translated WGSL is ignored;
//! instead every program label is matched against a registered Rust
//! fragment kernel that reads the same sampling units and uniform blocks the
//! GLSL source declares. Texels are stored as RGBA `f32` and quantized to
//! the texture format on every write, so readbacks behave like a GPU's.
//!
//! Every state-changing call is appended to a journal that tests can
//! inspect to audit binding order and hazard handling.

mod kernels;

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::backend::traits::*;
use crate::backend::types::*;

pub use kernels::register_library_kernels;

const MAX_TEXTURE_UNITS: u32 = 16;
const MAX_TEXTURE_SIZE: u32 = 8192;

/// Fragment kernel: fills one color per bound output (a single entry when
/// drawing to the screen).
pub type FragmentKernel = Rc<dyn Fn(&FragmentContext<'_>, &mut [[f32; 4]])>;

/// A recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum SoftwareCall {
    BeginFrame,
    BindTexture {
        unit: u32,
        texture: Option<TextureHandle>,
    },
    SetRenderTargets(Vec<TextureHandle>),
    UseProgram(ProgramHandle),
    BindUniformBuffer {
        slot: BindingSlot,
        buffer: BufferHandle,
    },
    WriteUniformBuffer(BufferHandle),
    Draw {
        program: ProgramHandle,
        targets: Vec<TextureHandle>,
    },
    EndFrame,
}

#[derive(Clone)]
struct SoftTexture {
    desc: TextureDescriptor,
    sampler: SamplerDescriptor,
    layers: Vec<Vec<[f32; 4]>>,
}

struct SoftProgram {
    desc: ProgramDescriptor,
    kernel: FragmentKernel,
}

/// Per-fragment view of the draw state handed to a kernel.
pub struct FragmentContext<'a> {
    /// Interpolated texture coordinate, `y` grows with the row index.
    pub uv: [f32; 2],
    /// Pixel center in target pixels.
    pub frag_coord: [f32; 2],
    /// Target size in pixels.
    pub resolution: [f32; 2],
    inputs: &'a [Option<SoftTexture>],
    uniforms: &'a [(String, Vec<u8>)],
    defines: &'a BTreeMap<String, String>,
}

impl<'a> FragmentContext<'a> {
    /// Sample a 2D input at `uv` using the texture's sampler preset.
    /// Unbound units read transparent black.
    pub fn sample(&self, unit: usize, uv: [f32; 2]) -> [f32; 4] {
        match self.inputs.get(unit).and_then(Option::as_ref) {
            Some(texture) => texture.sample_layer(
                0,
                uv,
                (
                    texture.sampler.address_mode_u,
                    texture.sampler.address_mode_v,
                ),
            ),
            None => [0.0; 4],
        }
    }

    /// Sample a cubemap input along direction `dir`.
    pub fn sample_cube(&self, unit: usize, dir: [f32; 3]) -> [f32; 4] {
        match self.inputs.get(unit).and_then(Option::as_ref) {
            Some(texture) if texture.desc.dimension == TextureDimension::Cube => {
                texture.sample_cube(dir)
            }
            _ => [0.0; 4],
        }
    }

    /// Size of the texture bound to `unit`, zero when unbound.
    pub fn texture_size(&self, unit: usize) -> [u32; 2] {
        self.inputs
            .get(unit)
            .and_then(Option::as_ref)
            .map(|t| [t.desc.width, t.desc.height])
            .unwrap_or([0, 0])
    }

    /// Raw bytes of a uniform block by its declared name.
    pub fn uniform_bytes(&self, block: &str) -> Option<&[u8]> {
        self.uniforms
            .iter()
            .find(|(name, _)| name == block)
            .map(|(_, bytes)| bytes.as_slice())
    }

    /// The `index`-th 32-bit float of a uniform block, zero when out of range.
    pub fn uniform_f32(&self, block: &str, index: usize) -> f32 {
        self.uniform_bytes(block)
            .and_then(|bytes| bytes.get(index * 4..index * 4 + 4))
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .unwrap_or(0.0)
    }

    /// A define parsed as a float, or `default` when absent or malformed.
    pub fn define_f32(&self, name: &str, default: f32) -> f32 {
        self.defines
            .get(name)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }
}

/// CPU implementation of [`GraphicsBackend`].
pub struct SoftwareBackend {
    screen: Vec<[f32; 4]>,
    screen_width: u32,
    screen_height: u32,

    textures: HashMap<u64, SoftTexture>,
    programs: HashMap<u64, SoftProgram>,
    buffers: HashMap<u64, Vec<u8>>,
    kernels: HashMap<String, FragmentKernel>,

    next_texture_id: u64,
    next_program_id: u64,
    next_buffer_id: u64,

    units: Vec<Option<TextureHandle>>,
    targets: Vec<TextureHandle>,
    current_program: Option<ProgramHandle>,
    uniform_bindings: HashMap<BindingSlot, BufferHandle>,

    calls: Vec<SoftwareCall>,
    record_calls: bool,
    hazard_draws: usize,
    frames: usize,
}

impl SoftwareBackend {
    pub fn new(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            screen: vec![[0.0; 4]; (width * height) as usize],
            screen_width: width,
            screen_height: height,
            textures: HashMap::new(),
            programs: HashMap::new(),
            buffers: HashMap::new(),
            kernels: HashMap::new(),
            next_texture_id: 1,
            next_program_id: 1,
            next_buffer_id: 1,
            units: vec![None; MAX_TEXTURE_UNITS as usize],
            targets: Vec::new(),
            current_program: None,
            uniform_bindings: HashMap::new(),
            calls: Vec::new(),
            record_calls: true,
            hazard_draws: 0,
            frames: 0,
        }
    }

    /// Backend with kernels for every built-in library program registered.
    pub fn with_library_kernels(width: u32, height: u32) -> Self {
        let mut backend = Self::new(width, height);
        register_library_kernels(&mut backend);
        backend
    }

    /// Register a single-output kernel for programs labelled `label`.
    pub fn register_kernel<F>(&mut self, label: &str, kernel: F)
    where
        F: Fn(&FragmentContext<'_>) -> [f32; 4] + 'static,
    {
        self.register_mrt_kernel(label, move |ctx, out| {
            let color = kernel(ctx);
            for slot in out.iter_mut() {
                *slot = color;
            }
        });
    }

    /// Register a kernel that writes each output attachment separately.
    pub fn register_mrt_kernel<F>(&mut self, label: &str, kernel: F)
    where
        F: Fn(&FragmentContext<'_>, &mut [[f32; 4]]) + 'static,
    {
        self.kernels.insert(label.to_string(), Rc::new(kernel));
    }

    /// Turn the call journal on or off. It is on by default and grows with
    /// every frame, so hosts that render continuously should turn it off.
    pub fn set_call_recording(&mut self, enabled: bool) {
        self.record_calls = enabled;
        if !enabled {
            self.calls.clear();
        }
    }

    fn record(&mut self, call: SoftwareCall) {
        if self.record_calls {
            self.calls.push(call);
        }
    }

    /// Journal of every binding, draw and frame boundary recorded so far.
    pub fn calls(&self) -> &[SoftwareCall] {
        &self.calls
    }

    /// Drain the call journal.
    pub fn take_calls(&mut self) -> Vec<SoftwareCall> {
        std::mem::take(&mut self.calls)
    }

    /// Number of draws issued while an input aliased a render target.
    pub fn hazard_draws(&self) -> usize {
        self.hazard_draws
    }

    /// Number of completed frames.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Live object counts: (textures, programs, buffers).
    pub fn live_objects(&self) -> (usize, usize, usize) {
        (self.textures.len(), self.programs.len(), self.buffers.len())
    }

    /// Sampler state a texture was created with.
    pub fn texture_sampler(&self, texture: TextureHandle) -> Option<&SamplerDescriptor> {
        self.textures.get(&texture.0).map(|t| &t.sampler)
    }

    /// Texture currently attached to a sampling unit.
    pub fn bound_texture(&self, unit: u32) -> Option<TextureHandle> {
        self.units.get(unit as usize).copied().flatten()
    }

    fn resolve_targets(&self) -> BackendResult<(u32, u32, Vec<TextureFormat>)> {
        if self.targets.is_empty() {
            return Ok((
                self.screen_width,
                self.screen_height,
                vec![self.screen_format()],
            ));
        }

        let mut size = None;
        let mut formats = Vec::with_capacity(self.targets.len());
        for handle in &self.targets {
            let texture = self.textures.get(&handle.0).ok_or(BackendError::InvalidHandle {
                kind: "texture",
                id: handle.0,
            })?;
            if !texture.desc.usage.contains(TextureUsage::RENDER_ATTACHMENT) {
                return Err(BackendError::DrawFailed(format!(
                    "texture {:?} is not a render target",
                    texture.desc.label
                )));
            }
            let dims = (texture.desc.width, texture.desc.height);
            if *size.get_or_insert(dims) != dims {
                return Err(BackendError::DrawFailed(
                    "render targets differ in size".into(),
                ));
            }
            formats.push(texture.desc.format);
        }

        let (width, height) = size.unwrap_or((self.screen_width, self.screen_height));
        Ok((width, height, formats))
    }
}

impl GraphicsBackend for SoftwareBackend {
    fn name(&self) -> &'static str {
        "Software"
    }

    fn screen_size(&self) -> (u32, u32) {
        (self.screen_width, self.screen_height)
    }

    fn screen_format(&self) -> TextureFormat {
        TextureFormat::Rgba8Unorm
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.screen_width = width;
            self.screen_height = height;
            self.screen = vec![[0.0; 4]; (width * height) as usize];
        }
    }

    fn max_texture_units(&self) -> u32 {
        MAX_TEXTURE_UNITS
    }

    fn create_texture(
        &mut self,
        desc: &TextureDescriptor,
        sampler: &SamplerDescriptor,
        data: Option<&[u8]>,
    ) -> BackendResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?} has zero size",
                desc.label
            )));
        }
        if desc.width > MAX_TEXTURE_SIZE || desc.height > MAX_TEXTURE_SIZE {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?} exceeds {MAX_TEXTURE_SIZE}x{MAX_TEXTURE_SIZE}",
                desc.label
            )));
        }
        if desc.dimension == TextureDimension::Cube && desc.width != desc.height {
            return Err(BackendError::TextureCreationFailed(
                "cubemap faces must be square".into(),
            ));
        }

        let texels = (desc.width * desc.height) as usize;
        let layers = match data {
            Some(bytes) => {
                if bytes.len() != desc.data_size() {
                    return Err(BackendError::TextureCreationFailed(format!(
                        "expected {} bytes of texel data, got {}",
                        desc.data_size(),
                        bytes.len()
                    )));
                }
                let decoded = decode_texels(desc.format, bytes);
                decoded.chunks(texels).map(<[_]>::to_vec).collect()
            }
            None => vec![vec![[0.0; 4]; texels]; desc.layers() as usize],
        };

        log::trace!(
            "SoftwareBackend: creating texture {:?} ({}x{}, {:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.format
        );

        let id = self.next_texture_id;
        self.next_texture_id += 1;
        self.textures.insert(
            id,
            SoftTexture {
                desc: desc.clone(),
                sampler: sampler.clone(),
                layers,
            },
        );
        Ok(TextureHandle(id))
    }

    fn read_texture(&mut self, texture: TextureHandle) -> BackendResult<Vec<[f32; 4]>> {
        self.textures
            .get(&texture.0)
            .map(|t| t.layers[0].clone())
            .ok_or(BackendError::InvalidHandle {
                kind: "texture",
                id: texture.0,
            })
    }

    fn read_screen(&mut self) -> BackendResult<Vec<[f32; 4]>> {
        Ok(self.screen.clone())
    }

    fn create_program(&mut self, desc: &ProgramDescriptor) -> BackendResult<ProgramHandle> {
        let kernel = self.kernels.get(&desc.label).cloned().ok_or_else(|| {
            BackendError::ProgramCreationFailed(format!(
                "no fragment kernel registered for '{}'",
                desc.label
            ))
        })?;

        let id = self.next_program_id;
        self.next_program_id += 1;
        self.programs.insert(
            id,
            SoftProgram {
                desc: desc.clone(),
                kernel,
            },
        );
        Ok(ProgramHandle(id))
    }

    fn create_uniform_buffer(&mut self, label: &str, size: u64) -> BackendResult<BufferHandle> {
        if size == 0 {
            return Err(BackendError::BufferCreationFailed(format!(
                "uniform buffer '{label}' has zero size"
            )));
        }
        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        self.buffers.insert(id, vec![0; size as usize]);
        Ok(BufferHandle(id))
    }

    fn write_uniform_buffer(&mut self, buffer: BufferHandle, data: &[u8]) {
        if let Some(storage) = self.buffers.get_mut(&buffer.0) {
            let len = data.len().min(storage.len());
            storage[..len].copy_from_slice(&data[..len]);
            self.record(SoftwareCall::WriteUniformBuffer(buffer));
        }
    }

    fn begin_frame(&mut self) -> BackendResult<()> {
        self.record(SoftwareCall::BeginFrame);
        Ok(())
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureHandle>) {
        if let Some(slot) = self.units.get_mut(unit as usize) {
            *slot = texture;
            self.record(SoftwareCall::BindTexture { unit, texture });
        }
    }

    fn set_render_targets(&mut self, targets: &[TextureHandle]) {
        self.targets = targets.to_vec();
        self.record(SoftwareCall::SetRenderTargets(targets.to_vec()));
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.current_program = Some(program);
        self.record(SoftwareCall::UseProgram(program));
    }

    fn bind_uniform_buffer(&mut self, slot: BindingSlot, buffer: BufferHandle) {
        self.uniform_bindings.insert(slot, buffer);
        self.record(SoftwareCall::BindUniformBuffer { slot, buffer });
    }

    fn draw_fullscreen(&mut self) -> BackendResult<()> {
        let program_handle = self
            .current_program
            .ok_or_else(|| BackendError::DrawFailed("no program in use".into()))?;
        let program = self
            .programs
            .get(&program_handle.0)
            .ok_or(BackendError::InvalidHandle {
                kind: "program",
                id: program_handle.0,
            })?;
        let kernel = Rc::clone(&program.kernel);
        let defines = program.desc.defines.clone();
        let sampler_count = program.desc.samplers.len();

        let uniforms: Vec<(String, Vec<u8>)> = program
            .desc
            .uniform_blocks
            .iter()
            .map(|block| {
                let bytes = self
                    .uniform_bindings
                    .get(&block.slot)
                    .and_then(|buffer| self.buffers.get(&buffer.0))
                    .cloned()
                    .unwrap_or_default();
                (block.name.clone(), bytes)
            })
            .collect();

        // Inputs are snapshotted, so an input aliasing a target reads the
        // pre-draw content, which is exactly the stale data a hazard produces.
        let mut inputs = Vec::with_capacity(sampler_count);
        for unit in 0..sampler_count {
            let bound = self.units.get(unit).copied().flatten();
            if let Some(handle) = bound {
                if self.targets.contains(&handle) {
                    log::warn!(
                        "SoftwareBackend: texture {:?} is bound to unit {unit} while being a render target",
                        handle
                    );
                    self.hazard_draws += 1;
                }
            }
            inputs.push(bound.and_then(|h| self.textures.get(&h.0)).cloned());
        }

        let (width, height, formats) = self.resolve_targets()?;
        let pixel_count = (width * height) as usize;
        let mut outputs: Vec<Vec<[f32; 4]>> = formats
            .iter()
            .map(|_| Vec::with_capacity(pixel_count))
            .collect();
        let mut fragment = vec![[0.0f32; 4]; formats.len()];
        let resolution = [width as f32, height as f32];

        for y in 0..height {
            for x in 0..width {
                let frag_coord = [x as f32 + 0.5, y as f32 + 0.5];
                let ctx = FragmentContext {
                    uv: [frag_coord[0] / resolution[0], frag_coord[1] / resolution[1]],
                    frag_coord,
                    resolution,
                    inputs: &inputs,
                    uniforms: &uniforms,
                    defines: &defines,
                };
                fragment.fill([0.0; 4]);
                kernel(&ctx, &mut fragment);
                for ((output, color), format) in
                    outputs.iter_mut().zip(&fragment).zip(&formats)
                {
                    output.push(quantize(*format, *color));
                }
            }
        }

        if self.targets.is_empty() {
            if let Some(screen) = outputs.into_iter().next() {
                self.screen = screen;
            }
        } else {
            for (handle, output) in self.targets.iter().zip(outputs) {
                if let Some(texture) = self.textures.get_mut(&handle.0) {
                    texture.layers[0] = output;
                }
            }
        }

        let targets = self.targets.clone();
        self.record(SoftwareCall::Draw {
            program: program_handle,
            targets,
        });
        Ok(())
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        self.frames += 1;
        self.record(SoftwareCall::EndFrame);
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture.0);
        for unit in self.units.iter_mut() {
            if *unit == Some(texture) {
                *unit = None;
            }
        }
        self.targets.retain(|t| *t != texture);
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program.0);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer.0);
        self.uniform_bindings.retain(|_, b| *b != buffer);
    }
}

impl SoftTexture {
    fn fetch(&self, layer: usize, x: i64, y: i64, address: (AddressMode, AddressMode)) -> [f32; 4] {
        let width = self.desc.width;
        let xi = wrap(x, width, address.0);
        let yi = wrap(y, self.desc.height, address.1);
        self.layers[layer][yi * width as usize + xi]
    }

    fn sample_layer(
        &self,
        layer: usize,
        uv: [f32; 2],
        address: (AddressMode, AddressMode),
    ) -> [f32; 4] {
        let width = self.desc.width as f32;
        let height = self.desc.height as f32;

        match self.sampler.mag_filter {
            FilterMode::Nearest => self.fetch(
                layer,
                (uv[0] * width).floor() as i64,
                (uv[1] * height).floor() as i64,
                address,
            ),
            FilterMode::Linear => {
                let fx = uv[0] * width - 0.5;
                let fy = uv[1] * height - 0.5;
                let x0 = fx.floor();
                let y0 = fy.floor();
                let tx = fx - x0;
                let ty = fy - y0;
                let (x0, y0) = (x0 as i64, y0 as i64);

                let top = lerp(
                    self.fetch(layer, x0, y0, address),
                    self.fetch(layer, x0 + 1, y0, address),
                    tx,
                );
                let bottom = lerp(
                    self.fetch(layer, x0, y0 + 1, address),
                    self.fetch(layer, x0 + 1, y0 + 1, address),
                    tx,
                );
                lerp(top, bottom, ty)
            }
        }
    }

    /// Face selection follows the usual major-axis table, faces stored in
    /// +X, -X, +Y, -Y, +Z, -Z order.
    fn sample_cube(&self, dir: [f32; 3]) -> [f32; 4] {
        let [x, y, z] = dir;
        let (ax, ay, az) = (x.abs(), y.abs(), z.abs());

        let (face, sc, tc, ma) = if ax >= ay && ax >= az {
            if x > 0.0 {
                (0, -z, -y, ax)
            } else {
                (1, z, -y, ax)
            }
        } else if ay >= az {
            if y > 0.0 {
                (2, x, z, ay)
            } else {
                (3, x, -z, ay)
            }
        } else if z > 0.0 {
            (4, x, -y, az)
        } else {
            (5, -x, -y, az)
        };

        if ma == 0.0 {
            return [0.0; 4];
        }

        let uv = [(sc / ma + 1.0) * 0.5, (tc / ma + 1.0) * 0.5];
        self.sample_layer(face, uv, (AddressMode::ClampToEdge, AddressMode::ClampToEdge))
    }
}

fn wrap(coord: i64, size: u32, mode: AddressMode) -> usize {
    let size = i64::from(size);
    match mode {
        AddressMode::Repeat => coord.rem_euclid(size) as usize,
        AddressMode::ClampToEdge => coord.clamp(0, size - 1) as usize,
    }
}

fn lerp(a: [f32; 4], b: [f32; 4], t: f32) -> [f32; 4] {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
        a[3] + (b[3] - a[3]) * t,
    ]
}

fn quantize(format: TextureFormat, color: [f32; 4]) -> [f32; 4] {
    let half = |v: f32| half::f16::from_f32(v).to_f32();
    match format {
        TextureFormat::Rgba8Unorm
        | TextureFormat::Rgba8UnormSrgb
        | TextureFormat::Bgra8Unorm
        | TextureFormat::Bgra8UnormSrgb => color.map(|v| (v.clamp(0.0, 1.0) * 255.0).round() / 255.0),
        TextureFormat::Rgba16Float => color.map(half),
        TextureFormat::Rgba32Float => color,
        TextureFormat::R16Float => [half(color[0]), 0.0, 0.0, 1.0],
        TextureFormat::R32Float => [color[0], 0.0, 0.0, 1.0],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_recording_can_be_disabled() {
        let mut backend = SoftwareBackend::new(2, 2);
        backend.begin_frame().unwrap();
        backend.end_frame().unwrap();
        assert_eq!(
            backend.calls(),
            &[SoftwareCall::BeginFrame, SoftwareCall::EndFrame]
        );

        backend.set_call_recording(false);
        assert!(backend.calls().is_empty());
        for _ in 0..3 {
            backend.begin_frame().unwrap();
            backend.bind_texture(0, None);
            backend.end_frame().unwrap();
        }
        assert!(backend.calls().is_empty());
        assert_eq!(backend.frames(), 4);
    }

    fn rgba8(width: u32, height: u32, usage: TextureUsage) -> TextureDescriptor {
        TextureDescriptor {
            label: Some("test".into()),
            width,
            height,
            dimension: TextureDimension::D2,
            format: TextureFormat::Rgba8Unorm,
            usage,
        }
    }

    fn program(label: &str, samplers: usize) -> ProgramDescriptor {
        ProgramDescriptor {
            label: label.into(),
            vertex_wgsl: String::new(),
            fragment_wgsl: String::new(),
            samplers: (0..samplers)
                .map(|i| SamplerBinding {
                    name: format!("input{i}"),
                    texture: BindingSlot::new(1, 2 * i as u32),
                    sampler: BindingSlot::new(1, 2 * i as u32 + 1),
                    dimension: TextureDimension::D2,
                })
                .collect(),
            uniform_blocks: Vec::new(),
            defines: BTreeMap::new(),
        }
    }

    #[test]
    fn test_wrap_modes() {
        assert_eq!(wrap(-1, 4, AddressMode::Repeat), 3);
        assert_eq!(wrap(5, 4, AddressMode::Repeat), 1);
        assert_eq!(wrap(-1, 4, AddressMode::ClampToEdge), 0);
        assert_eq!(wrap(9, 4, AddressMode::ClampToEdge), 3);
    }

    #[test]
    fn test_quantize_rgba8() {
        let q = quantize(TextureFormat::Rgba8Unorm, [0.5, 1.5, -1.0, 0.2]);
        assert_eq!(q[0], 128.0 / 255.0);
        assert_eq!(q[1], 1.0);
        assert_eq!(q[2], 0.0);
        assert_eq!(q[3], 51.0 / 255.0);
    }

    #[test]
    fn test_linear_sampling_interpolates_between_texels() {
        let mut backend = SoftwareBackend::new(4, 4);
        let sampler = SamplerDescriptor {
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            ..Default::default()
        };
        let data = [0u8, 0, 0, 255, 255, 255, 255, 255];
        let texture = backend
            .create_texture(&rgba8(2, 1, TextureUsage::TEXTURE_BINDING), &sampler, Some(&data))
            .unwrap();
        let soft = backend.textures.get(&texture.0).unwrap();
        let mid = soft.sample_layer(0, [0.5, 0.5], (AddressMode::ClampToEdge, AddressMode::ClampToEdge));
        assert!((mid[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_repeat_wraps_around() {
        let mut backend = SoftwareBackend::new(4, 4);
        let sampler = SamplerDescriptor {
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            address_mode_u: AddressMode::Repeat,
            address_mode_v: AddressMode::Repeat,
            ..Default::default()
        };
        let data = [10u8, 0, 0, 255, 20, 0, 0, 255];
        let texture = backend
            .create_texture(&rgba8(2, 1, TextureUsage::TEXTURE_BINDING), &sampler, Some(&data))
            .unwrap();
        let soft = backend.textures.get(&texture.0).unwrap();
        let wrapped = soft.sample_layer(0, [1.25, 0.5], (AddressMode::Repeat, AddressMode::Repeat));
        assert_eq!(wrapped[0], 10.0 / 255.0);
    }

    #[test]
    fn test_cube_face_selection() {
        let mut backend = SoftwareBackend::new(4, 4);
        let mut data = Vec::new();
        for face in 0..6u8 {
            data.extend_from_slice(&[face * 40, 0, 0, 255]);
        }
        let desc = TextureDescriptor {
            dimension: TextureDimension::Cube,
            ..rgba8(1, 1, TextureUsage::TEXTURE_BINDING)
        };
        let texture = backend
            .create_texture(&desc, &SamplerDescriptor::default(), Some(&data))
            .unwrap();
        let soft = backend.textures.get(&texture.0).unwrap();
        assert_eq!(soft.sample_cube([1.0, 0.0, 0.0])[0], 0.0);
        assert_eq!(soft.sample_cube([-1.0, 0.1, 0.0])[0], 40.0 / 255.0);
        assert_eq!(soft.sample_cube([0.0, 1.0, 0.0])[0], 80.0 / 255.0);
        assert_eq!(soft.sample_cube([0.0, -1.0, 0.2])[0], 120.0 / 255.0);
        assert_eq!(soft.sample_cube([0.0, 0.0, 1.0])[0], 160.0 / 255.0);
        assert_eq!(soft.sample_cube([0.1, 0.0, -1.0])[0], 200.0 / 255.0);
    }

    #[test]
    fn test_texture_data_size_checked() {
        let mut backend = SoftwareBackend::new(4, 4);
        let result = backend.create_texture(
            &rgba8(2, 2, TextureUsage::TEXTURE_BINDING),
            &SamplerDescriptor::default(),
            Some(&[0u8; 3]),
        );
        assert!(matches!(result, Err(BackendError::TextureCreationFailed(_))));
    }

    #[test]
    fn test_missing_kernel_fails_program_creation() {
        let mut backend = SoftwareBackend::new(4, 4);
        let result = backend.create_program(&program("unknown.glsl", 0));
        assert!(matches!(result, Err(BackendError::ProgramCreationFailed(_))));
    }

    #[test]
    fn test_draw_to_screen() {
        let mut backend = SoftwareBackend::new(2, 2);
        backend.register_kernel("solid", |_| [1.0, 0.0, 0.0, 1.0]);
        let program = backend.create_program(&program("solid", 0)).unwrap();
        backend.begin_frame().unwrap();
        backend.set_render_targets(&[]);
        backend.use_program(program);
        backend.draw_fullscreen().unwrap();
        backend.end_frame().unwrap();

        let screen = backend.read_screen().unwrap();
        assert_eq!(screen.len(), 4);
        assert!(screen.iter().all(|p| *p == [1.0, 0.0, 0.0, 1.0]));
        assert_eq!(backend.frames(), 1);
    }

    #[test]
    fn test_draw_with_aliased_input_counts_hazard() {
        let mut backend = SoftwareBackend::new(2, 2);
        backend.register_kernel("copy", |ctx| ctx.sample(0, ctx.uv));
        let program = backend.create_program(&program("copy", 1)).unwrap();
        let target = backend
            .create_texture(
                &rgba8(2, 2, TextureUsage::TEXTURE_BINDING | TextureUsage::RENDER_ATTACHMENT),
                &SamplerDescriptor::default(),
                None,
            )
            .unwrap();

        backend.set_render_targets(&[target]);
        backend.bind_texture(0, Some(target));
        backend.use_program(program);
        backend.draw_fullscreen().unwrap();
        assert_eq!(backend.hazard_draws(), 1);
    }

    #[test]
    fn test_destroy_clears_bindings() {
        let mut backend = SoftwareBackend::new(2, 2);
        let texture = backend
            .create_texture(
                &rgba8(1, 1, TextureUsage::TEXTURE_BINDING),
                &SamplerDescriptor::default(),
                None,
            )
            .unwrap();
        backend.bind_texture(3, Some(texture));
        backend.destroy_texture(texture);
        assert_eq!(backend.bound_texture(3), None);
        assert_eq!(backend.live_objects(), (0, 0, 0));
    }
}
