//! Image resources owned by a scene

use std::collections::BTreeMap;

use crate::backend::{
    GraphicsBackend, SamplerDescriptor, TextureDescriptor, TextureDimension, TextureFormat,
    TextureHandle, TextureUsage,
};
use crate::error::{ConfigError, EngineResult};
use crate::render_graph::BoundResources;

use super::{BufferFormat, DecodedImage, SamplerPreset};

/// Identifier of an image resource within a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(pub(crate) u64);

impl ImageId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ImageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "image#{}", self.0)
    }
}

/// What an image holds and how passes may use it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    /// Decoded 2D image, uploaded once
    Image2d,
    /// Six decoded faces, uploaded once
    Cubemap,
    /// Off-screen buffer written by passes
    RenderTarget,
}

impl ImageKind {
    pub fn dimension(&self) -> TextureDimension {
        match self {
            ImageKind::Image2d | ImageKind::RenderTarget => TextureDimension::D2,
            ImageKind::Cubemap => TextureDimension::Cube,
        }
    }
}

/// A GPU-visible image and its fixed sampler state.
#[derive(Debug, Clone)]
pub struct ImageResource {
    pub id: ImageId,
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub kind: ImageKind,
    pub preset: SamplerPreset,
    pub sampler: SamplerDescriptor,
    pub handle: TextureHandle,
}

impl ImageResource {
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_render_target(&self) -> bool {
        self.kind == ImageKind::RenderTarget
    }
}

/// Creates, tracks and destroys image resources.
#[derive(Default)]
pub struct ResourceManager {
    images: BTreeMap<ImageId, ImageResource>,
    next_id: u64,
}

impl ResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        desc: TextureDescriptor,
        kind: ImageKind,
        preset: SamplerPreset,
        data: Option<&[u8]>,
    ) -> EngineResult<ImageId> {
        let sampler = preset.descriptor();
        let handle = backend.create_texture(&desc, &sampler, data)?;

        self.next_id += 1;
        let id = ImageId(self.next_id);
        let label = desc.label.unwrap_or_else(|| id.to_string());

        log::debug!(
            "Created {:?} '{}' as {} ({}x{}, {:?}, {})",
            kind,
            label,
            id,
            desc.width,
            desc.height,
            desc.format,
            preset
        );

        self.images.insert(
            id,
            ImageResource {
                id,
                label,
                width: desc.width,
                height: desc.height,
                format: desc.format,
                kind,
                preset,
                sampler,
                handle,
            },
        );
        Ok(id)
    }

    /// Upload a decoded image as an RGBA8 2D texture.
    pub fn create_image<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        image: &DecodedImage,
        preset: SamplerPreset,
    ) -> EngineResult<ImageId> {
        let desc = TextureDescriptor {
            label: Some(image.name.clone()),
            width: image.width,
            height: image.height,
            dimension: TextureDimension::D2,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST | TextureUsage::COPY_SRC,
        };
        self.allocate(backend, desc, ImageKind::Image2d, preset, Some(&image.data))
    }

    /// Upload six faces (+X, -X, +Y, -Y, +Z, -Z) as a cubemap.
    pub fn create_cubemap<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        faces: &[DecodedImage; 6],
        preset: SamplerPreset,
    ) -> EngineResult<ImageId> {
        let size = faces[0].width;
        if let Some(face) = faces
            .iter()
            .find(|f| f.width != size || f.height != size)
        {
            return Err(ConfigError::CubemapFaceMismatch(format!(
                "'{}' is {}x{}, expected {size}x{size}",
                face.name, face.width, face.height
            ))
            .into());
        }

        let data: Vec<u8> = faces.iter().flat_map(|f| f.data.iter().copied()).collect();
        let label = faces[0]
            .name
            .rsplit_once('/')
            .map(|(dir, _)| dir.to_string())
            .unwrap_or_else(|| faces[0].name.clone());
        let desc = TextureDescriptor {
            label: Some(label),
            width: size,
            height: size,
            dimension: TextureDimension::Cube,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        };
        self.allocate(backend, desc, ImageKind::Cubemap, preset, Some(&data))
    }

    /// Allocate an uninitialized render target.
    pub fn create_buffer<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        label: &str,
        width: u32,
        height: u32,
        format: BufferFormat,
        preset: SamplerPreset,
    ) -> EngineResult<ImageId> {
        let desc = TextureDescriptor {
            label: Some(label.to_string()),
            width,
            height,
            dimension: TextureDimension::D2,
            format: format.texture_format(),
            usage: TextureUsage::TEXTURE_BINDING
                | TextureUsage::RENDER_ATTACHMENT
                | TextureUsage::COPY_SRC,
        };
        self.allocate(backend, desc, ImageKind::RenderTarget, preset, None)
    }

    /// Destroy an image; its id becomes invalid.
    pub fn release<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        id: ImageId,
    ) -> Result<(), ConfigError> {
        let image = self
            .images
            .remove(&id)
            .ok_or(ConfigError::UnknownImage(id.0))?;
        log::debug!("Releasing image '{}' ({})", image.label, id);
        backend.destroy_texture(image.handle);
        Ok(())
    }

    /// Destroy every image.
    pub fn release_all<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) {
        for (_, image) in std::mem::take(&mut self.images) {
            backend.destroy_texture(image.handle);
        }
    }

    /// Attach an image to a sampling unit and record it in `bound`.
    pub fn bind_as_input<B: GraphicsBackend + ?Sized>(
        &self,
        backend: &mut B,
        bound: &mut BoundResources,
        id: ImageId,
        unit: u32,
    ) -> Result<(), ConfigError> {
        let image = self.get(id)?;
        backend.bind_texture(unit, Some(image.handle));
        bound.set_unit(unit, Some(id));
        Ok(())
    }

    pub fn get(&self, id: ImageId) -> Result<&ImageResource, ConfigError> {
        self.images.get(&id).ok_or(ConfigError::UnknownImage(id.0))
    }

    pub fn contains(&self, id: ImageId) -> bool {
        self.images.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageResource> {
        self.images.values()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AddressMode, FilterMode, SoftwareBackend, SoftwareCall};

    fn face(size: u32, value: u8) -> DecodedImage {
        DecodedImage::solid_color(size, size, [value, 0, 0, 255], "sky/px")
    }

    #[test]
    fn test_create_image_applies_preset() {
        let mut backend = SoftwareBackend::new(4, 4);
        let mut resources = ResourceManager::new();
        let image = DecodedImage::solid_color(2, 2, [255, 0, 0, 255], "red");

        for preset in SamplerPreset::ALL {
            let id = resources
                .create_image(&mut backend, &image, preset)
                .unwrap();
            let resource = resources.get(id).unwrap();
            assert_eq!(resource.kind, ImageKind::Image2d);
            assert_eq!(backend.texture_sampler(resource.handle), Some(&preset.descriptor()));
        }
    }

    #[test]
    fn test_create_buffer() {
        let mut backend = SoftwareBackend::new(4, 4);
        let mut resources = ResourceManager::new();
        let id = resources
            .create_buffer(
                &mut backend,
                "hdr",
                400,
                300,
                BufferFormat::default(),
                SamplerPreset::NearestClamp,
            )
            .unwrap();

        let buffer = resources.get(id).unwrap();
        assert!(buffer.is_render_target());
        assert_eq!(buffer.size(), (400, 300));
        assert_eq!(buffer.format, TextureFormat::Rgba16Float);
        assert_eq!(buffer.sampler.mag_filter, FilterMode::Nearest);
        assert_eq!(buffer.sampler.address_mode_u, AddressMode::ClampToEdge);
    }

    #[test]
    fn test_zero_sized_image_fails() {
        let mut backend = SoftwareBackend::new(4, 4);
        let mut resources = ResourceManager::new();
        let image = DecodedImage::solid_color(0, 0, [0; 4], "empty");
        assert!(resources
            .create_image(&mut backend, &image, SamplerPreset::LinearRepeat)
            .is_err());
        assert!(resources.is_empty());
    }

    #[test]
    fn test_cubemap_face_mismatch() {
        let mut backend = SoftwareBackend::new(4, 4);
        let mut resources = ResourceManager::new();
        let faces = [face(2, 0), face(2, 1), face(2, 2), face(4, 3), face(2, 4), face(2, 5)];
        let result = resources.create_cubemap(&mut backend, &faces, SamplerPreset::LinearRepeat);
        assert!(matches!(
            result,
            Err(crate::EngineError::Config(ConfigError::CubemapFaceMismatch(_)))
        ));
        assert_eq!(backend.live_objects().0, 0);
    }

    #[test]
    fn test_cubemap_label_from_directory() {
        let mut backend = SoftwareBackend::new(4, 4);
        let mut resources = ResourceManager::new();
        let faces = [face(2, 0), face(2, 1), face(2, 2), face(2, 3), face(2, 4), face(2, 5)];
        let id = resources
            .create_cubemap(&mut backend, &faces, SamplerPreset::LinearRepeat)
            .unwrap();
        let cubemap = resources.get(id).unwrap();
        assert_eq!(cubemap.label, "sky");
        assert_eq!(cubemap.kind.dimension(), TextureDimension::Cube);
    }

    #[test]
    fn test_release() {
        let mut backend = SoftwareBackend::new(4, 4);
        let mut resources = ResourceManager::new();
        let image = DecodedImage::solid_color(1, 1, [0; 4], "one");
        let id = resources
            .create_image(&mut backend, &image, SamplerPreset::LinearClamp)
            .unwrap();

        resources.release(&mut backend, id).unwrap();
        assert_eq!(backend.live_objects().0, 0);
        assert_eq!(
            resources.release(&mut backend, id),
            Err(ConfigError::UnknownImage(id.raw()))
        );
    }

    #[test]
    fn test_bind_as_input_records_unit() {
        let mut backend = SoftwareBackend::new(4, 4);
        let mut resources = ResourceManager::new();
        let mut bound = BoundResources::new(backend_units(&backend));
        let image = DecodedImage::solid_color(1, 1, [0; 4], "one");
        let id = resources
            .create_image(&mut backend, &image, SamplerPreset::LinearClamp)
            .unwrap();

        resources
            .bind_as_input(&mut backend, &mut bound, id, 2)
            .unwrap();
        assert_eq!(bound.unit(2), Some(id));
        let handle = resources.get(id).unwrap().handle;
        assert_eq!(
            backend.calls().last(),
            Some(&SoftwareCall::BindTexture {
                unit: 2,
                texture: Some(handle)
            })
        );
    }

    fn backend_units(backend: &SoftwareBackend) -> u32 {
        use crate::backend::GraphicsBackend;
        backend.max_texture_units()
    }
}
