//! Common types shared between backends

use std::collections::BTreeMap;

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
    Rgba32Float,
    R16Float,
    R32Float,
}

impl TextureFormat {
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Bgra8Unorm
            | TextureFormat::Bgra8UnormSrgb
            | TextureFormat::R32Float => 4,
            TextureFormat::R16Float => 2,
            TextureFormat::Rgba16Float => 8,
            TextureFormat::Rgba32Float => 16,
        }
    }

    /// Number of color channels stored per texel.
    pub fn channels(&self) -> usize {
        match self {
            TextureFormat::R16Float | TextureFormat::R32Float => 1,
            _ => 4,
        }
    }

    /// Whether linear filtering is available without optional device features.
    pub fn is_filterable(&self) -> bool {
        !matches!(self, TextureFormat::Rgba32Float | TextureFormat::R32Float)
    }
}

fn half_to_f32(bytes: &[u8]) -> f32 {
    half::f16::from_le_bytes([bytes[0], bytes[1]]).to_f32()
}

fn float_from(bytes: &[u8]) -> f32 {
    f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Decode tightly packed texels of `format` into RGBA floats.
pub(crate) fn decode_texels(format: TextureFormat, bytes: &[u8]) -> Vec<[f32; 4]> {
    let bpp = format.bytes_per_pixel() as usize;
    bytes
        .chunks_exact(bpp)
        .map(|t| match format {
            TextureFormat::Rgba8Unorm | TextureFormat::Rgba8UnormSrgb => {
                [t[0], t[1], t[2], t[3]].map(|b| f32::from(b) / 255.0)
            }
            TextureFormat::Bgra8Unorm | TextureFormat::Bgra8UnormSrgb => {
                [t[2], t[1], t[0], t[3]].map(|b| f32::from(b) / 255.0)
            }
            TextureFormat::Rgba16Float => [
                half_to_f32(&t[0..2]),
                half_to_f32(&t[2..4]),
                half_to_f32(&t[4..6]),
                half_to_f32(&t[6..8]),
            ],
            TextureFormat::Rgba32Float => [
                float_from(&t[0..4]),
                float_from(&t[4..8]),
                float_from(&t[8..12]),
                float_from(&t[12..16]),
            ],
            TextureFormat::R16Float => [half_to_f32(t), 0.0, 0.0, 1.0],
            TextureFormat::R32Float => [float_from(t), 0.0, 0.0, 1.0],
        })
        .collect()
}

/// Texture usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureUsage(u32);

impl TextureUsage {
    pub const COPY_SRC: Self = Self(1 << 0);
    pub const COPY_DST: Self = Self(1 << 1);
    pub const TEXTURE_BINDING: Self = Self(1 << 2);
    pub const RENDER_ATTACHMENT: Self = Self(1 << 4);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for TextureUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Texture dimensionality as seen by a shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    D2,
    Cube,
}

/// Texture descriptor
#[derive(Debug, Clone)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub dimension: TextureDimension,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

impl TextureDescriptor {
    /// Number of array layers backing the texture (six for cubemaps).
    pub fn layers(&self) -> u32 {
        match self.dimension {
            TextureDimension::D2 => 1,
            TextureDimension::Cube => 6,
        }
    }

    /// Size in bytes of tightly packed texel data for every layer.
    pub fn data_size(&self) -> usize {
        self.width as usize
            * self.height as usize
            * self.layers() as usize
            * self.format.bytes_per_pixel() as usize
    }
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            width: 1,
            height: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        }
    }
}

/// Filter mode for samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Address mode for samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    ClampToEdge,
    Repeat,
}

/// Sampler descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerDescriptor {
    pub label: Option<String>,
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub address_mode_u: AddressMode,
    pub address_mode_v: AddressMode,
}

impl Default for SamplerDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
        }
    }
}

/// A (group, binding) pair as declared by a shader's `layout(set, binding)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingSlot {
    pub group: u32,
    pub binding: u32,
}

impl BindingSlot {
    pub const fn new(group: u32, binding: u32) -> Self {
        Self { group, binding }
    }
}

impl std::fmt::Display for BindingSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "set {} binding {}", self.group, self.binding)
    }
}

/// Reflected texture/sampler pair feeding one sampling unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerBinding {
    pub name: String,
    pub texture: BindingSlot,
    pub sampler: BindingSlot,
    pub dimension: TextureDimension,
}

/// Reflected uniform block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformBlockBinding {
    pub name: String,
    pub slot: BindingSlot,
    pub size: u64,
}

/// Everything a backend needs to build a full-screen program.
#[derive(Debug, Clone)]
pub struct ProgramDescriptor {
    pub label: String,
    pub vertex_wgsl: String,
    pub fragment_wgsl: String,
    /// Sampler inputs in unit order: entry `i` reads sampling unit `i`.
    pub samplers: Vec<SamplerBinding>,
    pub uniform_blocks: Vec<UniformBlockBinding>,
    /// Preprocessor defines the fragment stage was compiled with.
    pub defines: BTreeMap<String, String>,
}
