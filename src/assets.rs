//! Asset loading
//!
//! Scenes fetch shader sources, images and cubemaps through an
//! [`AssetLoader`]. Loading is asynchronous so hosts can back it with
//! whatever I/O they have; the two loaders here resolve immediately.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::AssetError;
use crate::resources::DecodedImage;

/// Cubemap face file stems, in +X, -X, +Y, -Y, +Z, -Z order.
pub const CUBEMAP_FACES: [&str; 6] = ["px", "nx", "py", "ny", "pz", "nz"];

/// Source of shader text and decoded images.
#[allow(async_fn_in_trait)]
pub trait AssetLoader {
    async fn load_text(&self, path: &str) -> Result<String, AssetError>;

    async fn load_image(&self, path: &str) -> Result<DecodedImage, AssetError>;

    /// Load the six faces `<path>/<face>.<extension>`.
    async fn load_cubemap(
        &self,
        path: &str,
        extension: &str,
    ) -> Result<[DecodedImage; 6], AssetError> {
        let mut faces = Vec::with_capacity(6);
        for face in CUBEMAP_FACES {
            let face_path = format!("{}/{face}.{extension}", path.trim_end_matches('/'));
            faces.push(self.load_image(&face_path).await?);
        }
        faces
            .try_into()
            .map_err(|_| AssetError::NotFound(path.to_string()))
    }
}

/// Reads assets from a directory.
#[derive(Debug, Clone)]
pub struct FileAssetLoader {
    root: PathBuf,
}

impl FileAssetLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, AssetError> {
        let full = self.root.join(path);
        std::fs::read(&full).map_err(|source| AssetError::Io {
            path: full.display().to_string(),
            source,
        })
    }
}

impl AssetLoader for FileAssetLoader {
    async fn load_text(&self, path: &str) -> Result<String, AssetError> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|_| AssetError::InvalidText(path.to_string()))
    }

    async fn load_image(&self, path: &str) -> Result<DecodedImage, AssetError> {
        let bytes = self.read(path)?;
        log::debug!("Decoding '{}' ({} bytes)", path, bytes.len());
        DecodedImage::from_bytes(&bytes, path).map_err(|source| AssetError::Decode {
            path: path.to_string(),
            source,
        })
    }
}

enum MemoryAsset {
    Bytes(Vec<u8>),
    Image(DecodedImage),
}

/// Serves assets registered in memory.
#[derive(Default)]
pub struct MemoryAssetLoader {
    assets: HashMap<String, MemoryAsset>,
}

impl MemoryAssetLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register raw bytes: text, or an encoded image.
    pub fn insert_bytes(&mut self, path: &str, bytes: impl Into<Vec<u8>>) -> &mut Self {
        self.assets
            .insert(path.to_string(), MemoryAsset::Bytes(bytes.into()));
        self
    }

    pub fn insert_text(&mut self, path: &str, text: &str) -> &mut Self {
        self.insert_bytes(path, text.as_bytes())
    }

    /// Register an already decoded image.
    pub fn insert_image(&mut self, path: &str, image: DecodedImage) -> &mut Self {
        self.assets.insert(path.to_string(), MemoryAsset::Image(image));
        self
    }

    fn get(&self, path: &str) -> Result<&MemoryAsset, AssetError> {
        self.assets
            .get(path)
            .ok_or_else(|| AssetError::NotFound(path.to_string()))
    }
}

impl AssetLoader for MemoryAssetLoader {
    async fn load_text(&self, path: &str) -> Result<String, AssetError> {
        match self.get(path)? {
            MemoryAsset::Bytes(bytes) => String::from_utf8(bytes.clone())
                .map_err(|_| AssetError::InvalidText(path.to_string())),
            MemoryAsset::Image(_) => Err(AssetError::InvalidText(path.to_string())),
        }
    }

    async fn load_image(&self, path: &str) -> Result<DecodedImage, AssetError> {
        match self.get(path)? {
            MemoryAsset::Image(image) => Ok(image.clone()),
            MemoryAsset::Bytes(bytes) => {
                DecodedImage::from_bytes(bytes, path).map_err(|source| AssetError::Decode {
                    path: path.to_string(),
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_loader_text_and_images() {
        let mut loader = MemoryAssetLoader::new();
        loader
            .insert_text("shaders/a.glsl", "void main() {}")
            .insert_image("img.png", DecodedImage::solid_color(1, 1, [1, 2, 3, 4], "img"));

        let text = pollster::block_on(loader.load_text("shaders/a.glsl")).unwrap();
        assert_eq!(text, "void main() {}");
        let image = pollster::block_on(loader.load_image("img.png")).unwrap();
        assert_eq!(image.pixel(0, 0), Some([1, 2, 3, 4]));
        assert!(matches!(
            pollster::block_on(loader.load_text("missing")),
            Err(AssetError::NotFound(_))
        ));
    }

    #[test]
    fn test_cubemap_face_order() {
        let mut loader = MemoryAssetLoader::new();
        for (i, face) in CUBEMAP_FACES.iter().enumerate() {
            let image = DecodedImage::solid_color(1, 1, [i as u8, 0, 0, 255], face);
            loader.insert_image(&format!("sky/{face}.png"), image);
        }

        let faces = pollster::block_on(loader.load_cubemap("sky/", "png")).unwrap();
        for (i, face) in faces.iter().enumerate() {
            assert_eq!(face.pixel(0, 0), Some([i as u8, 0, 0, 255]));
        }
    }

    #[test]
    fn test_file_loader_reads_from_root() {
        let root = std::env::temp_dir().join(format!("passgraph-assets-{}", std::process::id()));
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("hello.glsl"), "#version 450\n").unwrap();

        let loader = FileAssetLoader::new(&root);
        let text = pollster::block_on(loader.load_text("hello.glsl")).unwrap();
        assert_eq!(text, "#version 450\n");
        assert!(matches!(
            pollster::block_on(loader.load_image("missing.png")),
            Err(AssetError::Io { .. })
        ));

        std::fs::remove_dir_all(&root).unwrap();
    }
}
