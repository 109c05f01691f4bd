//! wgpu backend implementation
//!
//! Emulates the GL-style binding contract on top of wgpu: sampling units,
//! render targets and uniform slots are plain state on the backend, and
//! every `draw_fullscreen` turns the current state into one render pass
//! with freshly built bind groups. Pipelines are cached per program and
//! target formats.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::shader::library::{FRAGMENT_ENTRY_POINT, VERTEX_ENTRY_POINT};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

const MAX_TEXTURE_UNITS: u32 = 16;

/// Options for creating a [`WgpuBackend`].
#[derive(Debug, Clone)]
pub struct WgpuConfig {
    /// Wait for vertical blank when presenting
    pub vsync: bool,
    pub power_preference: wgpu::PowerPreference,
    /// Backends the instance may use; `WGPU_BACKEND` in the environment overrides it
    pub backends: wgpu::Backends,
}

impl Default for WgpuConfig {
    fn default() -> Self {
        Self {
            vsync: true,
            power_preference: wgpu::PowerPreference::HighPerformance,
            backends: wgpu::Backends::all(),
        }
    }
}

/// Where screen draws land.
enum Screen {
    Surface {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
        current: Option<wgpu::SurfaceTexture>,
    },
    /// Off-screen stand-in for a window, readable after each frame.
    Headless {
        texture: wgpu::Texture,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    },
}

struct GpuTexture {
    desc: TextureDescriptor,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    /// Whether the texture may be sampled through a filtering sampler.
    filterable: bool,
}

struct GpuProgram {
    desc: ProgramDescriptor,
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: u64,
    targets: Vec<wgpu::TextureFormat>,
    /// Bit `i` is set when sampling unit `i` holds an unfilterable texture.
    unfilterable: u32,
}

struct CachedPipeline {
    pipeline: wgpu::RenderPipeline,
    layouts: Vec<wgpu::BindGroupLayout>,
}

/// Stand-ins for empty sampling units: transparent black.
struct Fallback {
    view_2d: wgpu::TextureView,
    view_cube: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

/// wgpu backend implementation
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    screen: Screen,
    float32_filterable: bool,
    fallback: Fallback,

    // Resource storage
    textures: HashMap<u64, GpuTexture>,
    programs: HashMap<u64, GpuProgram>,
    buffers: HashMap<u64, wgpu::Buffer>,
    pipelines: HashMap<PipelineKey, CachedPipeline>,

    // Handle counters
    next_texture_id: u64,
    next_program_id: u64,
    next_buffer_id: u64,

    // Binding state
    units: Vec<Option<TextureHandle>>,
    targets: Vec<TextureHandle>,
    current_program: Option<ProgramHandle>,
    uniform_bindings: HashMap<BindingSlot, BufferHandle>,

    // Command encoding
    encoder: Option<wgpu::CommandEncoder>,
}

impl WgpuBackend {
    fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
        match format {
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
            TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
            TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
            TextureFormat::R16Float => wgpu::TextureFormat::R16Float,
            TextureFormat::R32Float => wgpu::TextureFormat::R32Float,
        }
    }

    fn convert_texture_format_back(format: wgpu::TextureFormat) -> Option<TextureFormat> {
        Some(match format {
            wgpu::TextureFormat::Rgba8Unorm => TextureFormat::Rgba8Unorm,
            wgpu::TextureFormat::Rgba8UnormSrgb => TextureFormat::Rgba8UnormSrgb,
            wgpu::TextureFormat::Bgra8Unorm => TextureFormat::Bgra8Unorm,
            wgpu::TextureFormat::Bgra8UnormSrgb => TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Rgba16Float => TextureFormat::Rgba16Float,
            wgpu::TextureFormat::Rgba32Float => TextureFormat::Rgba32Float,
            wgpu::TextureFormat::R16Float => TextureFormat::R16Float,
            wgpu::TextureFormat::R32Float => TextureFormat::R32Float,
            _ => return None,
        })
    }

    fn convert_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
        let mut result = wgpu::TextureUsages::empty();
        if usage.contains(TextureUsage::COPY_SRC) {
            result |= wgpu::TextureUsages::COPY_SRC;
        }
        if usage.contains(TextureUsage::COPY_DST) {
            result |= wgpu::TextureUsages::COPY_DST;
        }
        if usage.contains(TextureUsage::TEXTURE_BINDING) {
            result |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
            result |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        result
    }

    fn convert_filter_mode(mode: FilterMode) -> wgpu::FilterMode {
        match mode {
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
            FilterMode::Linear => wgpu::FilterMode::Linear,
        }
    }

    fn convert_address_mode(mode: AddressMode) -> wgpu::AddressMode {
        match mode {
            AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            AddressMode::Repeat => wgpu::AddressMode::Repeat,
        }
    }

    fn clamp_to_limits(device: &wgpu::Device, width: u32, height: u32) -> (u32, u32) {
        // Clamp to device limits while maintaining aspect ratio
        let max_size = device.limits().max_texture_dimension_2d;
        if width > max_size || height > max_size {
            let scale = (max_size as f32 / width as f32).min(max_size as f32 / height as f32);
            (
                ((width as f32 * scale) as u32).max(1),
                ((height as f32 * scale) as u32).max(1),
            )
        } else {
            (width.max(1), height.max(1))
        }
    }
}

impl WgpuBackend {
    /// Create a backend presenting to `window`.
    pub fn new(window: Arc<winit::window::Window>, config: &WgpuConfig) -> BackendResult<Self> {
        pollster::block_on(Self::new_async(window, config))
    }

    pub async fn new_async(
        window: Arc<winit::window::Window>,
        config: &WgpuConfig,
    ) -> BackendResult<Self> {
        let backends = Self::select_backends(config);
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });
        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| BackendError::SurfaceCreationFailed(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: config.power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await;

        // If no adapter found with preferred backend, try with all backends
        let (instance, surface, adapter) = match adapter {
            Some(adapter) => (instance, surface, adapter),
            None if backends != wgpu::Backends::all() => {
                log::warn!("Preferred backend not available, falling back to all backends");
                let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
                    backends: wgpu::Backends::all(),
                    ..Default::default()
                });
                let surface = instance
                    .create_surface(window.clone())
                    .map_err(|e| BackendError::SurfaceCreationFailed(e.to_string()))?;
                let adapter = instance
                    .request_adapter(&wgpu::RequestAdapterOptions {
                        power_preference: config.power_preference,
                        compatible_surface: Some(&surface),
                        force_fallback_adapter: false,
                    })
                    .await
                    .ok_or_else(|| {
                        BackendError::InitializationFailed("No suitable adapter found".into())
                    })?;
                (instance, surface, adapter)
            }
            None => {
                return Err(BackendError::InitializationFailed(
                    "No suitable adapter found".into(),
                ))
            }
        };

        let (device, queue, float32_filterable) = Self::request_device(&adapter).await?;

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        // Programs write display values themselves, so prefer a linear swapchain.
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb() && Self::convert_texture_format_back(*f).is_some())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| {
                BackendError::SurfaceCreationFailed("surface reports no formats".into())
            })?;

        let present_mode = if config.vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };

        let (width, height) = Self::clamp_to_limits(&device, size.width, size.height);
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);
        log::info!(
            "Surface configured: {}x{} {:?} ({:?})",
            width,
            height,
            surface_format,
            present_mode
        );

        let screen = Screen::Surface {
            surface,
            config: surface_config,
            current: None,
        };
        Ok(Self::from_parts(
            instance,
            adapter,
            device,
            queue,
            screen,
            float32_filterable,
        ))
    }

    /// Create a windowless backend that draws the screen into an
    /// off-screen `width`x`height` texture.
    pub fn new_headless(width: u32, height: u32) -> BackendResult<Self> {
        pollster::block_on(Self::new_headless_async(width, height, &WgpuConfig::default()))
    }

    pub async fn new_headless_async(
        width: u32,
        height: u32,
        config: &WgpuConfig,
    ) -> BackendResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: Self::select_backends(config),
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: config.power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| BackendError::InitializationFailed("No suitable adapter found".into()))?;

        let (device, queue, float32_filterable) = Self::request_device(&adapter).await?;
        let (width, height) = Self::clamp_to_limits(&device, width, height);
        let format = wgpu::TextureFormat::Rgba8Unorm;
        let texture = Self::create_headless_screen(&device, format, width, height);

        Ok(Self::from_parts(
            instance,
            adapter,
            device,
            queue,
            Screen::Headless {
                texture,
                format,
                width,
                height,
            },
            float32_filterable,
        ))
    }

    fn select_backends(config: &WgpuConfig) -> wgpu::Backends {
        if std::env::var("WGPU_BACKEND").is_ok() {
            wgpu::util::backend_bits_from_env().unwrap_or(config.backends)
        } else {
            config.backends
        }
    }

    async fn request_device(
        adapter: &wgpu::Adapter,
    ) -> BackendResult<(wgpu::Device, wgpu::Queue, bool)> {
        let adapter_info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?} backend)",
            adapter_info.name,
            adapter_info.backend
        );

        let float32_filterable = adapter
            .features()
            .contains(wgpu::Features::FLOAT32_FILTERABLE);
        let required_features = if float32_filterable {
            wgpu::Features::FLOAT32_FILTERABLE
        } else {
            log::warn!("32-bit float textures are not filterable on this adapter, sampling them nearest");
            wgpu::Features::empty()
        };

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("passgraph device"),
                    required_features,
                    required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))?;

        device.on_uncaptured_error(Box::new(|error| {
            log::error!("wgpu error: {error}");
        }));

        Ok((device, queue, float32_filterable))
    }

    fn create_headless_screen(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> wgpu::Texture {
        device.create_texture(&wgpu::TextureDescriptor {
            label: Some("headless screen"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        })
    }

    fn from_parts(
        instance: wgpu::Instance,
        adapter: wgpu::Adapter,
        device: wgpu::Device,
        queue: wgpu::Queue,
        screen: Screen,
        float32_filterable: bool,
    ) -> Self {
        let fallback = Self::create_fallback(&device, &queue);
        Self {
            instance,
            adapter,
            device,
            queue,
            screen,
            float32_filterable,
            fallback,
            textures: HashMap::new(),
            programs: HashMap::new(),
            buffers: HashMap::new(),
            pipelines: HashMap::new(),
            next_texture_id: 1,
            next_program_id: 1,
            next_buffer_id: 1,
            units: vec![None; MAX_TEXTURE_UNITS as usize],
            targets: Vec::new(),
            current_program: None,
            uniform_bindings: HashMap::new(),
            encoder: None,
        }
    }

    /// Zero-filled 1x1 texture with `layers` array layers.
    fn create_empty_texture(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        layers: u32,
    ) -> wgpu::Texture {
        let size = wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: layers,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &vec![0u8; 4 * layers as usize],
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: Some(1),
            },
            size,
        );
        texture
    }

    // 2D views need a single-layer texture of their own.
    fn create_fallback(device: &wgpu::Device, queue: &wgpu::Queue) -> Fallback {
        let texture_2d = Self::create_empty_texture(device, queue, "empty unit 2d", 1);
        let texture_cube = Self::create_empty_texture(device, queue, "empty unit cube", 6);

        let view_2d = texture_2d.create_view(&wgpu::TextureViewDescriptor {
            label: Some("empty unit 2d"),
            dimension: Some(wgpu::TextureViewDimension::D2),
            ..Default::default()
        });
        let view_cube = texture_cube.create_view(&wgpu::TextureViewDescriptor {
            label: Some("empty unit cube"),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("empty unit"),
            ..Default::default()
        });

        Fallback {
            view_2d,
            view_cube,
            sampler,
        }
    }

    /// Adapter the device was created from.
    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Whether this backend draws into an off-screen texture instead of a window.
    pub fn is_headless(&self) -> bool {
        matches!(self.screen, Screen::Headless { .. })
    }

    fn screen_wgpu_format(&self) -> wgpu::TextureFormat {
        match &self.screen {
            Screen::Surface { config, .. } => config.format,
            Screen::Headless { format, .. } => *format,
        }
    }

    fn texture(&self, handle: TextureHandle) -> BackendResult<&GpuTexture> {
        self.textures
            .get(&handle.0)
            .ok_or(BackendError::InvalidHandle {
                kind: "texture",
                id: handle.0,
            })
    }

    fn unfilterable_mask(&self, program: &GpuProgram) -> u32 {
        program
            .desc
            .samplers
            .iter()
            .enumerate()
            .filter(|(unit, _)| {
                self.units
                    .get(*unit)
                    .copied()
                    .flatten()
                    .and_then(|handle| self.textures.get(&handle.0))
                    .is_some_and(|texture| !texture.filterable)
            })
            .fold(0u32, |mask, (unit, _)| mask | (1u32 << unit))
    }

    fn build_pipeline(&self, program: &GpuProgram, key: &PipelineKey) -> CachedPipeline {
        let desc = &program.desc;
        let group_count = desc
            .samplers
            .iter()
            .flat_map(|s| [s.texture.group, s.sampler.group])
            .chain(desc.uniform_blocks.iter().map(|b| b.slot.group))
            .max()
            .map_or(0, |max| max + 1);

        let mut entries: Vec<Vec<wgpu::BindGroupLayoutEntry>> =
            vec![Vec::new(); group_count as usize];
        for block in &desc.uniform_blocks {
            entries[block.slot.group as usize].push(wgpu::BindGroupLayoutEntry {
                binding: block.slot.binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(block.size),
                },
                count: None,
            });
        }
        for (unit, sampler) in desc.samplers.iter().enumerate() {
            let filterable = (key.unfilterable & (1u32 << unit)) == 0;
            entries[sampler.texture.group as usize].push(wgpu::BindGroupLayoutEntry {
                binding: sampler.texture.binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable },
                    view_dimension: match sampler.dimension {
                        TextureDimension::D2 => wgpu::TextureViewDimension::D2,
                        TextureDimension::Cube => wgpu::TextureViewDimension::Cube,
                    },
                    multisampled: false,
                },
                count: None,
            });
            entries[sampler.sampler.group as usize].push(wgpu::BindGroupLayoutEntry {
                binding: sampler.sampler.binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(if filterable {
                    wgpu::SamplerBindingType::Filtering
                } else {
                    wgpu::SamplerBindingType::NonFiltering
                }),
                count: None,
            });
        }

        let layouts: Vec<wgpu::BindGroupLayout> = entries
            .iter()
            .enumerate()
            .map(|(group, entries)| {
                self.device
                    .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                        label: Some(&format!("{} group {group}", desc.label)),
                        entries,
                    })
            })
            .collect();
        let layout_refs: Vec<&wgpu::BindGroupLayout> = layouts.iter().collect();
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&desc.label),
                bind_group_layouts: &layout_refs,
                push_constant_ranges: &[],
            });

        let targets: Vec<Option<wgpu::ColorTargetState>> = key
            .targets
            .iter()
            .map(|format| {
                Some(wgpu::ColorTargetState {
                    format: *format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        log::debug!(
            "Building pipeline for '{}' (targets {:?}, unfilterable units {:#b})",
            desc.label,
            key.targets,
            key.unfilterable
        );

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&desc.label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &program.vertex,
                    entry_point: VERTEX_ENTRY_POINT,
                    compilation_options: Default::default(),
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &program.fragment,
                    entry_point: FRAGMENT_ENTRY_POINT,
                    compilation_options: Default::default(),
                    targets: &targets,
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            });

        CachedPipeline { pipeline, layouts }
    }

    fn build_bind_groups(
        &self,
        program: &GpuProgram,
        cached: &CachedPipeline,
    ) -> BackendResult<Vec<wgpu::BindGroup>> {
        let desc = &program.desc;
        let mut entries: Vec<Vec<wgpu::BindGroupEntry>> =
            (0..cached.layouts.len()).map(|_| Vec::new()).collect();

        for block in &desc.uniform_blocks {
            let handle = self.uniform_bindings.get(&block.slot).ok_or_else(|| {
                BackendError::DrawFailed(format!(
                    "'{}': no buffer bound for uniform block '{}' at {}",
                    desc.label, block.name, block.slot
                ))
            })?;
            let buffer = self.buffers.get(&handle.0).ok_or(BackendError::InvalidHandle {
                kind: "buffer",
                id: handle.0,
            })?;
            entries[block.slot.group as usize].push(wgpu::BindGroupEntry {
                binding: block.slot.binding,
                resource: buffer.as_entire_binding(),
            });
        }

        for (unit, binding) in desc.samplers.iter().enumerate() {
            let bound = match self.units.get(unit).copied().flatten() {
                Some(handle) => Some(self.texture(handle)?),
                None => None,
            };
            let (view, sampler) = match (bound, binding.dimension) {
                (Some(texture), _) => (&texture.view, &texture.sampler),
                (None, TextureDimension::D2) => (&self.fallback.view_2d, &self.fallback.sampler),
                (None, TextureDimension::Cube) => {
                    (&self.fallback.view_cube, &self.fallback.sampler)
                }
            };
            entries[binding.texture.group as usize].push(wgpu::BindGroupEntry {
                binding: binding.texture.binding,
                resource: wgpu::BindingResource::TextureView(view),
            });
            entries[binding.sampler.group as usize].push(wgpu::BindGroupEntry {
                binding: binding.sampler.binding,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }

        Ok(cached
            .layouts
            .iter()
            .zip(entries.iter())
            .map(|(layout, entries)| {
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&desc.label),
                    layout,
                    entries,
                })
            })
            .collect())
    }

    fn read_back(
        &self,
        texture: &wgpu::Texture,
        format: TextureFormat,
        width: u32,
        height: u32,
    ) -> BackendResult<Vec<[f32; 4]>> {
        let unpadded = width * format.bytes_per_pixel();
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback"),
            size: u64::from(padded) * u64::from(height),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|e| BackendError::ReadbackFailed(e.to_string()))?
            .map_err(|e| BackendError::ReadbackFailed(e.to_string()))?;

        let mut texels = Vec::with_capacity((width * height) as usize);
        {
            let data = slice.get_mapped_range();
            for row in data.chunks(padded as usize).take(height as usize) {
                texels.extend(decode_texels(format, &row[..unpadded as usize]));
            }
        }
        staging.unmap();
        Ok(texels)
    }
}

impl GraphicsBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn screen_size(&self) -> (u32, u32) {
        match &self.screen {
            Screen::Surface { config, .. } => (config.width, config.height),
            Screen::Headless { width, height, .. } => (*width, *height),
        }
    }

    fn screen_format(&self) -> TextureFormat {
        let format = self.screen_wgpu_format();
        Self::convert_texture_format_back(format).unwrap_or_else(|| {
            log::warn!("Screen format {format:?} has no engine equivalent, reporting Rgba8Unorm");
            TextureFormat::Rgba8Unorm
        })
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        let (width, height) = Self::clamp_to_limits(&self.device, width, height);
        match &mut self.screen {
            Screen::Surface {
                surface, config, ..
            } => {
                config.width = width;
                config.height = height;
                surface.configure(&self.device, config);
            }
            Screen::Headless {
                texture,
                format,
                width: w,
                height: h,
            } => {
                *texture = Self::create_headless_screen(&self.device, *format, width, height);
                *w = width;
                *h = height;
            }
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
        let max_size = self.device.limits().max_texture_dimension_2d;
        if desc.width == 0 || desc.height == 0 || desc.width > max_size || desc.height > max_size {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?}: size {}x{} outside 1..={max_size}",
                desc.label, desc.width, desc.height
            )));
        }
        if desc.dimension == TextureDimension::Cube && desc.width != desc.height {
            return Err(BackendError::TextureCreationFailed(
                "cubemap faces must be square".into(),
            ));
        }
        if let Some(bytes) = data {
            if bytes.len() != desc.data_size() {
                return Err(BackendError::TextureCreationFailed(format!(
                    "expected {} bytes of texel data, got {}",
                    desc.data_size(),
                    bytes.len()
                )));
            }
        }

        let size = wgpu::Extent3d {
            width: desc.width,
            height: desc.height,
            depth_or_array_layers: desc.layers(),
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::convert_texture_format(desc.format),
            usage: Self::convert_texture_usage(desc.usage),
            view_formats: &[],
        });

        if let Some(bytes) = data {
            self.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                bytes,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(desc.width * desc.format.bytes_per_pixel()),
                    rows_per_image: Some(desc.height),
                },
                size,
            );
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: desc.label.as_deref(),
            dimension: Some(match desc.dimension {
                TextureDimension::D2 => wgpu::TextureViewDimension::D2,
                TextureDimension::Cube => wgpu::TextureViewDimension::Cube,
            }),
            ..Default::default()
        });

        let filterable = desc.format.is_filterable() || self.float32_filterable;
        let (mag_filter, min_filter) = if filterable {
            (
                Self::convert_filter_mode(sampler.mag_filter),
                Self::convert_filter_mode(sampler.min_filter),
            )
        } else {
            if sampler.mag_filter == FilterMode::Linear || sampler.min_filter == FilterMode::Linear {
                log::warn!(
                    "{:?}: {:?} cannot be filtered on this device, sampling nearest",
                    desc.label,
                    desc.format
                );
            }
            (wgpu::FilterMode::Nearest, wgpu::FilterMode::Nearest)
        };
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: sampler.label.as_deref().or(desc.label.as_deref()),
            address_mode_u: Self::convert_address_mode(sampler.address_mode_u),
            address_mode_v: Self::convert_address_mode(sampler.address_mode_v),
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter,
            min_filter,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        log::trace!(
            "WgpuBackend: creating texture {:?} ({}x{}, {:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.format
        );

        let id = self.next_texture_id;
        self.next_texture_id += 1;
        self.textures.insert(
            id,
            GpuTexture {
                desc: desc.clone(),
                texture,
                view,
                sampler,
                filterable,
            },
        );
        Ok(TextureHandle(id))
    }

    fn read_texture(&mut self, texture: TextureHandle) -> BackendResult<Vec<[f32; 4]>> {
        let texture = self.texture(texture)?;
        if !texture.desc.usage.contains(TextureUsage::COPY_SRC) {
            return Err(BackendError::ReadbackFailed(format!(
                "{:?} was not created for readback",
                texture.desc.label
            )));
        }
        self.read_back(
            &texture.texture,
            texture.desc.format,
            texture.desc.width,
            texture.desc.height,
        )
    }

    fn read_screen(&mut self) -> BackendResult<Vec<[f32; 4]>> {
        match &self.screen {
            Screen::Headless {
                texture,
                format,
                width,
                height,
            } => {
                let format = Self::convert_texture_format_back(*format)
                    .unwrap_or(TextureFormat::Rgba8Unorm);
                self.read_back(texture, format, *width, *height)
            }
            Screen::Surface { .. } => Err(BackendError::ReadbackFailed(
                "a presented surface cannot be read back".into(),
            )),
        }
    }

    fn create_program(&mut self, desc: &ProgramDescriptor) -> BackendResult<ProgramHandle> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let vertex = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("fullscreen vertex"),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(&desc.vertex_wgsl)),
            });
        let fragment = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&desc.label),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(&desc.fragment_wgsl)),
            });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BackendError::ProgramCreationFailed(format!(
                "'{}': {error}",
                desc.label
            )));
        }

        let id = self.next_program_id;
        self.next_program_id += 1;
        self.programs.insert(
            id,
            GpuProgram {
                desc: desc.clone(),
                vertex,
                fragment,
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
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        self.buffers.insert(id, buffer);
        Ok(BufferHandle(id))
    }

    fn write_uniform_buffer(&mut self, buffer: BufferHandle, data: &[u8]) {
        if let Some(buf) = self.buffers.get(&buffer.0) {
            self.queue.write_buffer(buf, 0, data);
        }
    }

    fn begin_frame(&mut self) -> BackendResult<()> {
        if let Screen::Surface {
            surface, current, ..
        } = &mut self.screen
        {
            let output = surface.get_current_texture().map_err(|e| match e {
                wgpu::SurfaceError::Lost => BackendError::SurfaceLost,
                wgpu::SurfaceError::OutOfMemory => BackendError::OutOfMemory,
                _ => BackendError::AcquireImageFailed(e.to_string()),
            })?;
            *current = Some(output);
        }

        self.encoder = Some(
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Frame Encoder"),
                }),
        );
        Ok(())
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureHandle>) {
        if let Some(slot) = self.units.get_mut(unit as usize) {
            *slot = texture;
        }
    }

    fn set_render_targets(&mut self, targets: &[TextureHandle]) {
        self.targets = targets.to_vec();
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.current_program = Some(program);
    }

    fn bind_uniform_buffer(&mut self, slot: BindingSlot, buffer: BufferHandle) {
        self.uniform_bindings.insert(slot, buffer);
    }

    fn draw_fullscreen(&mut self) -> BackendResult<()> {
        let program_handle = self
            .current_program
            .ok_or_else(|| BackendError::DrawFailed("no program in use".into()))?;
        let mut encoder = self
            .encoder
            .take()
            .ok_or_else(|| BackendError::DrawFailed("no frame in progress".into()))?;
        let result = self.encode_draw(&mut encoder, program_handle);
        self.encoder = Some(encoder);
        result
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        // Submit any pending commands
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }

        // Present the swapchain
        if let Screen::Surface { current, .. } = &mut self.screen {
            if let Some(texture) = current.take() {
                texture.present();
            }
        }
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if let Some(gpu) = self.textures.remove(&texture.0) {
            gpu.texture.destroy();
        }
        for slot in self.units.iter_mut().filter(|s| **s == Some(texture)) {
            *slot = None;
        }
        self.targets.retain(|t| *t != texture);
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program.0);
        self.pipelines.retain(|key, _| key.program != program.0);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if let Some(buf) = self.buffers.remove(&buffer.0) {
            buf.destroy();
        }
        self.uniform_bindings.retain(|_, b| *b != buffer);
    }
}

impl WgpuBackend {
    fn encode_draw(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        program_handle: ProgramHandle,
    ) -> BackendResult<()> {
        let program = self
            .programs
            .get(&program_handle.0)
            .ok_or(BackendError::InvalidHandle {
                kind: "program",
                id: program_handle.0,
            })?;

        let screen_view = if self.targets.is_empty() {
            Some(match &self.screen {
                Screen::Surface { current, .. } => current
                    .as_ref()
                    .ok_or_else(|| BackendError::DrawFailed("no surface texture acquired".into()))?
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default()),
                Screen::Headless { texture, .. } => {
                    texture.create_view(&wgpu::TextureViewDescriptor::default())
                }
            })
        } else {
            None
        };

        let mut target_formats = Vec::with_capacity(self.targets.len().max(1));
        let mut size = None;
        for handle in &self.targets {
            let texture = self.texture(*handle)?;
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
            target_formats.push(Self::convert_texture_format(texture.desc.format));
        }
        if screen_view.is_some() {
            target_formats.push(self.screen_wgpu_format());
        }

        let key = PipelineKey {
            program: program_handle.0,
            targets: target_formats,
            unfilterable: self.unfilterable_mask(program),
        };
        if !self.pipelines.contains_key(&key) {
            let cached = self.build_pipeline(program, &key);
            self.pipelines.insert(key.clone(), cached);
        }

        let program = self
            .programs
            .get(&program_handle.0)
            .ok_or(BackendError::InvalidHandle {
                kind: "program",
                id: program_handle.0,
            })?;
        let cached = self
            .pipelines
            .get(&key)
            .ok_or_else(|| BackendError::DrawFailed("pipeline cache miss".into()))?;
        let bind_groups = self.build_bind_groups(program, cached)?;

        let target_views: Vec<&wgpu::TextureView> = match &screen_view {
            Some(view) => vec![view],
            None => self
                .targets
                .iter()
                .map(|handle| self.texture(*handle).map(|t| &t.view))
                .collect::<BackendResult<_>>()?,
        };
        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = target_views
            .iter()
            .copied()
            .map(|view| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect();

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&program.desc.label),
            color_attachments: &color_attachments,
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&cached.pipeline);
        for (index, group) in bind_groups.iter().enumerate() {
            pass.set_bind_group(index as u32, group, &[]);
        }
        pass.draw(0..3, 0..1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_conversion_round_trip() {
        for format in [
            TextureFormat::Rgba8Unorm,
            TextureFormat::Bgra8Unorm,
            TextureFormat::Rgba16Float,
            TextureFormat::Rgba32Float,
            TextureFormat::R16Float,
            TextureFormat::R32Float,
        ] {
            let converted = WgpuBackend::convert_texture_format(format);
            assert_eq!(WgpuBackend::convert_texture_format_back(converted), Some(format));
        }
        assert_eq!(
            WgpuBackend::convert_texture_format_back(wgpu::TextureFormat::Rgb10a2Unorm),
            None
        );
    }

    #[test]
    fn test_usage_conversion() {
        let usage = WgpuBackend::convert_texture_usage(
            TextureUsage::TEXTURE_BINDING | TextureUsage::RENDER_ATTACHMENT,
        );
        assert!(usage.contains(wgpu::TextureUsages::TEXTURE_BINDING));
        assert!(usage.contains(wgpu::TextureUsages::RENDER_ATTACHMENT));
        assert!(!usage.contains(wgpu::TextureUsages::COPY_SRC));
    }

    #[test]
    fn test_default_config() {
        let config = WgpuConfig::default();
        assert!(config.vsync);
        assert_eq!(config.backends, wgpu::Backends::all());
    }
}
