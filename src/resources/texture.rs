//! Decoded image data

use image::{DynamicImage, GenericImageView};

/// RGBA8 pixels ready for upload, first row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub name: String,
}

impl DecodedImage {
    /// Decode an encoded image (PNG, JPEG, ...) from memory
    pub fn from_bytes(bytes: &[u8], name: &str) -> Result<Self, image::ImageError> {
        let img = image::load_from_memory(bytes)?;
        Ok(Self::from_image(img, name))
    }

    pub fn from_image(img: DynamicImage, name: &str) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            data: img.to_rgba8().into_raw(),
            name: name.to_string(),
        }
    }

    /// Wrap raw RGBA8 pixels; `None` when the length does not match the size
    pub fn from_rgba8(width: u32, height: u32, data: Vec<u8>, name: &str) -> Option<Self> {
        (data.len() == width as usize * height as usize * 4).then(|| Self {
            width,
            height,
            data,
            name: name.to_string(),
        })
    }

    /// A single-color image
    pub fn solid_color(width: u32, height: u32, color: [u8; 4], name: &str) -> Self {
        let data = color
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self {
            width,
            height,
            data,
            name: name.to_string(),
        }
    }

    /// Create a checkerboard texture
    pub fn checkerboard(size: u32, cell: u32, color1: [u8; 4], color2: [u8; 4]) -> Self {
        let cell = cell.max(1);
        let mut data = Vec::with_capacity((size * size * 4) as usize);

        for y in 0..size {
            for x in 0..size {
                let is_even = ((x / cell) + (y / cell)) % 2 == 0;
                data.extend_from_slice(if is_even { &color1 } else { &color2 });
            }
        }

        Self {
            width: size,
            height: size,
            data,
            name: "checkerboard".to_string(),
        }
    }

    /// RGBA8 texel at (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y * self.width + x) * 4) as usize;
        self.data.get(i..i + 4).map(|p| [p[0], p[1], p[2], p[3]])
    }
}
