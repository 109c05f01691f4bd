//! Scene: the caller-facing setup API and per-frame entry point.
//!
//! A scene owns the backend, the asset loader and every object created
//! through it. Setup happens first (shaders, images, buffers, data blocks,
//! then passes in execution order); afterwards the host calls
//! [`Scene::render`] once per frame. Dropping the scene releases every
//! backend object it created.

use std::collections::BTreeMap;

use crate::assets::AssetLoader;
use crate::backend::GraphicsBackend;
use crate::error::{ConfigError, EngineError, EngineResult};
use crate::render_graph::{
    DataBlockId, DataBlockRegistry, FrameExecutor, PassGraph, PassId, PassSetupContext,
    UniformSource,
};
use crate::resources::{
    BufferFormat, ComponentType, DecodedImage, ImageId, ImageResource, InternalFormat,
    PixelFormat, ResourceManager, SamplerPreset,
};
use crate::shader::{BuiltinShader, ShaderId, ShaderOptions, ShaderProgram, ShaderUnit};
use crate::SceneConfig;

/// Lifecycle of a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneState {
    /// Accepting resources and passes
    Configuring,
    /// At least one frame has been rendered
    Running,
    /// Every backend object has been released
    Destroyed,
}

pub struct Scene<B: GraphicsBackend, L: AssetLoader> {
    backend: B,
    loader: L,
    config: SceneConfig,
    state: SceneState,

    resources: ResourceManager,
    shader_unit: ShaderUnit,
    shaders: BTreeMap<ShaderId, ShaderProgram>,
    next_shader_id: u64,
    data: DataBlockRegistry,
    graph: PassGraph,
    executor: FrameExecutor,
}

impl<B: GraphicsBackend, L: AssetLoader> Scene<B, L> {
    pub fn new(backend: B, loader: L) -> Self {
        Self::with_config(backend, loader, SceneConfig::default())
    }

    pub fn with_config(backend: B, loader: L, config: SceneConfig) -> Self {
        let units = backend.max_texture_units();
        log::info!(
            "Creating scene on {} backend ({} sampling units)",
            backend.name(),
            units
        );
        Self {
            backend,
            loader,
            config,
            state: SceneState::Configuring,
            resources: ResourceManager::new(),
            shader_unit: ShaderUnit::new(),
            shaders: BTreeMap::new(),
            next_shader_id: 0,
            data: DataBlockRegistry::new(),
            graph: PassGraph::new(),
            executor: FrameExecutor::new(units),
        }
    }

    pub fn state(&self) -> SceneState {
        self.state
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    pub fn image(&self, id: ImageId) -> Option<&ImageResource> {
        self.resources.get(id).ok()
    }

    pub fn shader(&self, id: ShaderId) -> Option<&ShaderProgram> {
        self.shaders.get(&id)
    }

    pub fn graph(&self) -> &PassGraph {
        &self.graph
    }

    pub fn executor(&self) -> &FrameExecutor {
        &self.executor
    }

    pub fn data(&self) -> &DataBlockRegistry {
        &self.data
    }

    fn check_configurable(&self, what: &str) -> EngineResult<()> {
        match self.state {
            SceneState::Destroyed => Err(EngineError::Destroyed),
            SceneState::Running => {
                log::warn!("Adding {what} after the first frame");
                Ok(())
            }
            SceneState::Configuring => Ok(()),
        }
    }

    /// Make an extra source available to `#include`.
    pub fn register_include(&mut self, path: &str, source: &str) {
        self.shader_unit.composer_mut().register_include(path, source);
    }

    /// Fetch a GLSL fragment program through the loader and compile it.
    pub async fn load_shader(
        &mut self,
        path: &str,
        sampler_names: &[&str],
        options: &ShaderOptions,
    ) -> EngineResult<ShaderId> {
        self.check_configurable("a shader")?;
        let source = self.loader.load_text(path).await?;
        self.compile_shader(path, &source, sampler_names, options)
    }

    /// Compile an in-memory GLSL fragment program.
    pub fn compile_shader(
        &mut self,
        label: &str,
        source: &str,
        sampler_names: &[&str],
        options: &ShaderOptions,
    ) -> EngineResult<ShaderId> {
        self.check_configurable("a shader")?;
        let program =
            self.shader_unit
                .compile(&mut self.backend, label, source, sampler_names, options)?;
        self.next_shader_id += 1;
        let id = ShaderId(self.next_shader_id);
        self.shaders.insert(id, program);
        Ok(id)
    }

    /// Compile one of the programs in [`crate::shader::library`].
    pub fn compile_builtin(
        &mut self,
        shader: &BuiltinShader,
        options: &ShaderOptions,
    ) -> EngineResult<ShaderId> {
        self.compile_shader(shader.label, shader.source, shader.samplers, options)
    }

    /// Load an image with the default image preset.
    pub async fn load_image(&mut self, path: &str) -> EngineResult<ImageId> {
        let preset = self.config.default_image_preset;
        self.load_image_with(path, preset).await
    }

    pub async fn load_image_with(
        &mut self,
        path: &str,
        preset: SamplerPreset,
    ) -> EngineResult<ImageId> {
        self.check_configurable("an image")?;
        let image = self.loader.load_image(path).await?;
        self.add_image(&image, preset)
    }

    /// Upload an already decoded image.
    pub fn add_image(&mut self, image: &DecodedImage, preset: SamplerPreset) -> EngineResult<ImageId> {
        self.check_configurable("an image")?;
        self.resources.create_image(&mut self.backend, image, preset)
    }

    /// Load the six faces `<path>/{px,nx,py,ny,pz,nz}.<extension>` with the
    /// default image preset.
    pub async fn load_cubemap(&mut self, path: &str, extension: &str) -> EngineResult<ImageId> {
        let preset = self.config.default_image_preset;
        self.load_cubemap_with(path, extension, preset).await
    }

    pub async fn load_cubemap_with(
        &mut self,
        path: &str,
        extension: &str,
        preset: SamplerPreset,
    ) -> EngineResult<ImageId> {
        self.check_configurable("a cubemap")?;
        let faces = self.loader.load_cubemap(path, extension).await?;
        self.add_cubemap(&faces, preset)
    }

    pub fn add_cubemap(
        &mut self,
        faces: &[DecodedImage; 6],
        preset: SamplerPreset,
    ) -> EngineResult<ImageId> {
        self.check_configurable("a cubemap")?;
        self.resources.create_cubemap(&mut self.backend, faces, preset)
    }

    /// Add a render target with the default buffer format and preset.
    pub fn add_buffer(&mut self, label: &str, width: u32, height: u32) -> EngineResult<ImageId> {
        let format = self.config.default_buffer_format;
        let preset = self.config.default_buffer_preset;
        self.add_buffer_with(label, width, height, format, preset)
    }

    pub fn add_buffer_with(
        &mut self,
        label: &str,
        width: u32,
        height: u32,
        format: BufferFormat,
        preset: SamplerPreset,
    ) -> EngineResult<ImageId> {
        self.check_configurable("a buffer")?;
        self.resources
            .create_buffer(&mut self.backend, label, width, height, format, preset)
    }

    /// Add a render target described by GL-style names, e.g.
    /// `["RGBA", "RGBA16F", "HALF_FLOAT"]` and `"LINEAR_CLAMP"`.
    ///
    /// Every name is checked before anything is allocated.
    pub fn add_buffer_named(
        &mut self,
        label: &str,
        width: u32,
        height: u32,
        format: [&str; 3],
        preset: &str,
    ) -> EngineResult<ImageId> {
        let pixel: PixelFormat = format[0].parse()?;
        let internal: InternalFormat = format[1].parse()?;
        let component: ComponentType = format[2].parse()?;
        let format = BufferFormat::new(pixel, internal, component)?;
        let preset: SamplerPreset = preset.parse()?;
        self.add_buffer_with(label, width, height, format, preset)
    }

    /// Register a data block; shaders declaring a uniform block of the same
    /// name read it.
    pub fn add_data(
        &mut self,
        name: &str,
        arrays: Vec<Box<dyn UniformSource>>,
    ) -> EngineResult<DataBlockId> {
        self.check_configurable("a data block")?;
        self.data.add(&mut self.backend, name, arrays)
    }

    /// Append a pass. Passes run in the order they are added.
    pub fn add_pass(
        &mut self,
        inputs: &[ImageId],
        shader: ShaderId,
        outputs: &[ImageId],
    ) -> EngineResult<PassId> {
        self.check_configurable("a pass")?;
        let program = self
            .shaders
            .get(&shader)
            .ok_or(ConfigError::UnknownShader(shader.0))?;
        let ctx = PassSetupContext {
            resources: &self.resources,
            data: &self.data,
            max_color_targets: self.config.max_color_targets,
            max_inputs: self.backend.max_texture_units() as usize,
        };
        Ok(self.graph.add_pass(&ctx, inputs, shader, program, outputs)?)
    }

    /// Check the pass order. See [`PassGraph::validate`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.graph.validate(&self.resources)
    }

    /// Run every pass once.
    pub fn render(&mut self) -> EngineResult<()> {
        match self.state {
            SceneState::Destroyed => return Err(EngineError::Destroyed),
            SceneState::Configuring => {
                log::info!(
                    "Scene running: {} passes, {} images, {} data blocks",
                    self.graph.len(),
                    self.resources.len(),
                    self.data.len()
                );
                self.state = SceneState::Running;
            }
            SceneState::Running => {}
        }

        self.executor
            .execute(&mut self.backend, &self.graph, &self.resources, &mut self.data)
    }

    /// Read an image back as RGBA floats, first row first.
    pub fn read_image(&mut self, id: ImageId) -> EngineResult<Vec<[f32; 4]>> {
        if self.state == SceneState::Destroyed {
            return Err(EngineError::Destroyed);
        }
        let handle = self.resources.get(id)?.handle;
        Ok(self.backend.read_texture(handle)?)
    }

    /// Read the screen back as RGBA floats, first row first.
    pub fn read_screen(&mut self) -> EngineResult<Vec<[f32; 4]>> {
        if self.state == SceneState::Destroyed {
            return Err(EngineError::Destroyed);
        }
        Ok(self.backend.read_screen()?)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.backend.resize(width, height);
    }

    /// Destroy an image that no pass uses.
    pub fn release_image(&mut self, id: ImageId) -> EngineResult<()> {
        if self.state == SceneState::Destroyed {
            return Err(EngineError::Destroyed);
        }
        if let Some(pass) = self.graph.first_user(id) {
            return Err(ConfigError::ImageInUse {
                image: id.raw(),
                pass: pass.index(),
            }
            .into());
        }
        self.resources.release(&mut self.backend, id)?;
        self.executor.bound_mut().forget(id);
        Ok(())
    }

    /// Release every backend object. Called by `Drop`; later calls do nothing.
    pub fn destroy(&mut self) {
        if self.state == SceneState::Destroyed {
            return;
        }

        self.graph.clear();
        self.data.release_all(&mut self.backend);
        for (_, program) in std::mem::take(&mut self.shaders) {
            self.backend.destroy_program(program.handle());
        }
        self.resources.release_all(&mut self.backend);
        self.executor.bound_mut().clear();

        self.state = SceneState::Destroyed;
        log::info!("Scene destroyed");
    }
}

impl<B: GraphicsBackend, L: AssetLoader> Drop for Scene<B, L> {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryAssetLoader;
    use crate::backend::SoftwareBackend;
    use crate::render_graph::UniformArray;
    use crate::shader::library;

    fn scene() -> Scene<SoftwareBackend, MemoryAssetLoader> {
        Scene::new(SoftwareBackend::with_library_kernels(4, 4), MemoryAssetLoader::new())
    }

    #[test]
    fn test_default_buffer_settings() {
        let mut scene = scene();
        let id = scene.add_buffer("b", 8, 8).unwrap();
        let image = scene.image(id).unwrap();
        assert_eq!(image.preset, SamplerPreset::NearestClamp);
        assert_eq!(image.format, BufferFormat::default().texture_format());
    }

    #[test]
    fn test_unknown_preset_fails_before_allocation() {
        let mut scene = scene();
        let result = scene.add_buffer_named("b", 8, 8, ["RGBA", "RGBA8", "UNSIGNED_BYTE"], "CUBIC");
        assert!(matches!(
            result,
            Err(EngineError::Config(ConfigError::UnknownSamplerPreset(_)))
        ));
        assert_eq!(scene.backend().live_objects(), (0, 0, 0));
    }

    #[test]
    fn test_unknown_shader() {
        let mut scene = scene();
        let result = scene.add_pass(&[], ShaderId(42), &[]);
        assert!(matches!(
            result,
            Err(EngineError::Config(ConfigError::UnknownShader(42)))
        ));
    }

    #[test]
    fn test_load_shader_through_loader() {
        let mut loader = MemoryAssetLoader::new();
        loader.insert_text("blit.glsl", library::BLIT.source);
        let mut backend = SoftwareBackend::new(4, 4);
        backend.register_kernel("blit.glsl", |ctx| ctx.sample(0, ctx.uv));
        let mut scene = Scene::new(backend, loader);

        let id = pollster::block_on(scene.load_shader("blit.glsl", &["image"], &ShaderOptions::default()))
            .unwrap();
        assert_eq!(scene.shader(id).unwrap().label(), "blit.glsl");
    }

    #[test]
    fn test_release_image_in_use() {
        let mut scene = scene();
        let source = scene
            .add_image(&DecodedImage::solid_color(1, 1, [0; 4], "src"), SamplerPreset::LinearClamp)
            .unwrap();
        let spare = scene.add_buffer("spare", 2, 2).unwrap();
        let blit = scene
            .compile_builtin(&library::BLIT, &ShaderOptions::default())
            .unwrap();
        scene.add_pass(&[source], blit, &[]).unwrap();

        assert!(matches!(
            scene.release_image(source),
            Err(EngineError::Config(ConfigError::ImageInUse { pass: 0, .. }))
        ));
        scene.release_image(spare).unwrap();
        assert!(scene.image(spare).is_none());
    }

    #[test]
    fn test_state_machine() {
        let mut scene = scene();
        assert_eq!(scene.state(), SceneState::Configuring);
        scene.render().unwrap();
        assert_eq!(scene.state(), SceneState::Running);

        // Late configuration is allowed with a warning.
        scene
            .add_data("late", vec![Box::new(UniformArray::<f32>::zeroed(4))])
            .unwrap();

        scene.destroy();
        assert_eq!(scene.state(), SceneState::Destroyed);
        assert!(matches!(scene.render(), Err(EngineError::Destroyed)));
        assert!(matches!(scene.add_buffer("b", 1, 1), Err(EngineError::Destroyed)));
    }

    #[test]
    fn test_destroy_releases_everything() {
        let mut scene = scene();
        let image = scene
            .add_image(&DecodedImage::solid_color(1, 1, [0; 4], "src"), SamplerPreset::LinearClamp)
            .unwrap();
        let target = scene.add_buffer("target", 2, 2).unwrap();
        let blit = scene
            .compile_builtin(&library::BLIT, &ShaderOptions::default())
            .unwrap();
        scene
            .add_data("ubo", vec![Box::new(UniformArray::<f32>::zeroed(4))])
            .unwrap();
        scene.add_pass(&[image], blit, &[target]).unwrap();
        scene.render().unwrap();
        assert_eq!(scene.backend().live_objects(), (2, 1, 1));

        scene.destroy();
        assert_eq!(scene.backend().live_objects(), (0, 0, 0));
        scene.destroy();
    }
}
