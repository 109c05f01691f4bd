//! Sampler presets and render-target formats.
//!
//! Both are closed enums with exhaustive mapping tables. Names coming from
//! configuration strings go through [`FromStr`], which accepts the GL
//! spelling (`LINEAR_REPEAT`, `RGBA16F`, `HALF_FLOAT`) case-insensitively
//! with `-` allowed in place of `_`.

use std::fmt;
use std::str::FromStr;

use crate::backend::{AddressMode, FilterMode, SamplerDescriptor, TextureFormat};
use crate::error::ConfigError;

fn normalize(name: &str) -> String {
    name.trim().to_ascii_uppercase().replace('-', "_")
}

/// Filter and wrap settings fixed at resource creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerPreset {
    LinearRepeat,
    LinearClamp,
    NearestClamp,
}

impl SamplerPreset {
    pub const ALL: [SamplerPreset; 3] = [
        SamplerPreset::LinearRepeat,
        SamplerPreset::LinearClamp,
        SamplerPreset::NearestClamp,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SamplerPreset::LinearRepeat => "LINEAR_REPEAT",
            SamplerPreset::LinearClamp => "LINEAR_CLAMP",
            SamplerPreset::NearestClamp => "NEAREST_CLAMP",
        }
    }

    pub fn filter(&self) -> FilterMode {
        match self {
            SamplerPreset::LinearRepeat | SamplerPreset::LinearClamp => FilterMode::Linear,
            SamplerPreset::NearestClamp => FilterMode::Nearest,
        }
    }

    pub fn address_mode(&self) -> AddressMode {
        match self {
            SamplerPreset::LinearRepeat => AddressMode::Repeat,
            SamplerPreset::LinearClamp | SamplerPreset::NearestClamp => AddressMode::ClampToEdge,
        }
    }

    /// Sampler state applying the preset to both filters and both wrap axes.
    pub fn descriptor(&self) -> SamplerDescriptor {
        SamplerDescriptor {
            label: Some(self.name().to_string()),
            mag_filter: self.filter(),
            min_filter: self.filter(),
            address_mode_u: self.address_mode(),
            address_mode_v: self.address_mode(),
        }
    }
}

impl fmt::Display for SamplerPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SamplerPreset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        Self::ALL
            .into_iter()
            .find(|preset| preset.name() == normalized)
            .ok_or_else(|| ConfigError::UnknownSamplerPreset(s.to_string()))
    }
}

/// Channel layout of a buffer (`GL_RGBA`, `GL_RED`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgba,
    Red,
}

/// Sized storage format (`GL_RGBA16F` and friends).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InternalFormat {
    Rgba8,
    Rgba16F,
    Rgba32F,
    R16F,
    R32F,
}

/// Component type of texel data (`GL_HALF_FLOAT` and friends).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    UnsignedByte,
    HalfFloat,
    Float,
}

macro_rules! named_enum {
    ($ty:ident, $err:ident, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn name(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }

        impl FromStr for $ty {
            type Err = ConfigError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match normalize(s).as_str() {
                    $($name => Ok($ty::$variant),)+
                    _ => Err(ConfigError::$err(s.to_string())),
                }
            }
        }
    };
}

named_enum!(PixelFormat, UnknownPixelFormat, {
    Rgba => "RGBA",
    Red => "RED",
});

named_enum!(InternalFormat, UnknownInternalFormat, {
    Rgba8 => "RGBA8",
    Rgba16F => "RGBA16F",
    Rgba32F => "RGBA32F",
    R16F => "R16F",
    R32F => "R32F",
});

named_enum!(ComponentType, UnknownComponentType, {
    UnsignedByte => "UNSIGNED_BYTE",
    HalfFloat => "HALF_FLOAT",
    Float => "FLOAT",
});

/// A validated (pixel format, internal format, component type) triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferFormat {
    pixel: PixelFormat,
    internal: InternalFormat,
    component: ComponentType,
    texture: TextureFormat,
}

impl BufferFormat {
    pub const RGBA8: BufferFormat = BufferFormat {
        pixel: PixelFormat::Rgba,
        internal: InternalFormat::Rgba8,
        component: ComponentType::UnsignedByte,
        texture: TextureFormat::Rgba8Unorm,
    };

    pub const RGBA16F: BufferFormat = BufferFormat {
        pixel: PixelFormat::Rgba,
        internal: InternalFormat::Rgba16F,
        component: ComponentType::HalfFloat,
        texture: TextureFormat::Rgba16Float,
    };

    pub const RGBA32F: BufferFormat = BufferFormat {
        pixel: PixelFormat::Rgba,
        internal: InternalFormat::Rgba32F,
        component: ComponentType::Float,
        texture: TextureFormat::Rgba32Float,
    };

    /// Validate a GL-style format triple.
    pub fn new(
        pixel: PixelFormat,
        internal: InternalFormat,
        component: ComponentType,
    ) -> Result<Self, ConfigError> {
        use ComponentType::*;
        use InternalFormat::*;

        let texture = match (pixel, internal, component) {
            (PixelFormat::Rgba, Rgba8, UnsignedByte) => TextureFormat::Rgba8Unorm,
            (PixelFormat::Rgba, Rgba16F, HalfFloat | Float) => TextureFormat::Rgba16Float,
            (PixelFormat::Rgba, Rgba32F, Float) => TextureFormat::Rgba32Float,
            (PixelFormat::Red, R16F, HalfFloat | Float) => TextureFormat::R16Float,
            (PixelFormat::Red, R32F, Float) => TextureFormat::R32Float,
            _ => {
                return Err(ConfigError::UnsupportedBufferFormat {
                    pixel: pixel.to_string(),
                    internal: internal.to_string(),
                    component: component.to_string(),
                })
            }
        };

        Ok(Self {
            pixel,
            internal,
            component,
            texture,
        })
    }

    /// Parse and validate a triple of format names.
    pub fn parse(pixel: &str, internal: &str, component: &str) -> Result<Self, ConfigError> {
        Self::new(pixel.parse()?, internal.parse()?, component.parse()?)
    }

    pub fn pixel(&self) -> PixelFormat {
        self.pixel
    }

    pub fn internal(&self) -> InternalFormat {
        self.internal
    }

    pub fn component(&self) -> ComponentType {
        self.component
    }

    pub fn texture_format(&self) -> TextureFormat {
        self.texture
    }
}

impl Default for BufferFormat {
    fn default() -> Self {
        Self::RGBA16F
    }
}
