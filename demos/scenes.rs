//! Pass graphs of the demo scenes.

use glam::Vec3;
use passgraph::shader::library;
use passgraph::{
    AssetLoader, EngineResult, GraphicsBackend, Scene, SamplerPreset, ShaderOptions,
};

use crate::camera::{
    hills_height, in_bound, pink_sea_height, test_collide, Camera, Movement, SlideOrder,
    FACING_NEGATIVE_Z, FACING_POSITIVE_X,
};

const PINK_SEA: &str = include_str!("shaders/pink_sea.glsl");
const DOCKS: &str = include_str!("shaders/docks.glsl");
const SCENE5: &str = include_str!("shaders/scene5.glsl");
const SCENE6: &str = include_str!("shaders/scene6.glsl");
const SCENE7: &str = include_str!("shaders/scene7.glsl");

const WIDTH: u32 = 400;
const HEIGHT: u32 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SceneKind {
    PinkSea,
    Docks,
    Scene5,
    Scene6,
    Scene7,
}

fn aspect(width: u32, height: u32) -> ShaderOptions {
    ShaderOptions::default().define("ASPECT", format!("{:.6}", width as f32 / height as f32))
}

fn walkable_alley(x: f32, z: f32) -> bool {
    !test_collide(x, z)
}

/// Load assets, compile programs and register the passes of `kind`.
/// Returns the camera driving the scene's `ubo` block.
pub async fn build<B: GraphicsBackend, L: AssetLoader>(
    scene: &mut Scene<B, L>,
    kind: SceneKind,
) -> EngineResult<Camera> {
    log::info!("Building scene {kind:?}");
    match kind {
        SceneKind::PinkSea => pink_sea(scene).await,
        SceneKind::Docks => docks(scene).await,
        SceneKind::Scene5 => scene5(scene).await,
        SceneKind::Scene6 => scene6(scene).await,
        SceneKind::Scene7 => scene7(scene).await,
    }
}

async fn pink_sea<B: GraphicsBackend, L: AssetLoader>(
    scene: &mut Scene<B, L>,
) -> EngineResult<Camera> {
    let height = 350;
    let shader = scene.compile_shader("pink_sea.glsl", PINK_SEA, &["sky"], &aspect(WIDTH, height))?;
    let dither = scene.compile_builtin(&library::DITHER, &ShaderOptions::default())?;

    let sky = scene.load_cubemap("stormy", "jpg").await?;
    let buffer = scene.add_buffer("buffer", WIDTH, height)?;

    let camera = Camera::new(
        Vec3::new(10.0, 0.0, 0.0),
        0.2,
        Movement::Terrain {
            height: pink_sea_height,
            eye: 2.0,
        },
        0.0,
    );
    scene.add_data("ubo", camera.uniforms())?;

    scene.add_pass(&[sky], shader, &[buffer])?;
    scene.add_pass(&[buffer], dither, &[])?;
    Ok(camera)
}

async fn docks<B: GraphicsBackend, L: AssetLoader>(
    scene: &mut Scene<B, L>,
) -> EngineResult<Camera> {
    let shader = scene.compile_shader(
        "docks.glsl",
        DOCKS,
        &["wood_albedo", "wood_normal", "wood_ao"],
        &aspect(WIDTH, HEIGHT),
    )?;
    let tonemap = scene.compile_builtin(&library::TONEMAP, &ShaderOptions::default())?;
    let dither = scene.compile_builtin(&library::DITHER, &ShaderOptions::default())?;

    let buffer1 = scene.add_buffer("buffer1", WIDTH, HEIGHT)?;
    let buffer2 = scene.add_buffer("buffer2", WIDTH, HEIGHT)?;

    let albedo = scene.load_image("wood/albedo.jpg").await?;
    let normal = scene.load_image("wood/normal.jpg").await?;
    let ao = scene.load_image("wood/ao.jpg").await?;

    let camera = Camera::new(Vec3::ZERO, 0.05, Movement::FreeFly, 0.0);
    scene.add_data("ubo", camera.uniforms())?;

    scene.add_pass(&[albedo, normal, ao], shader, &[buffer1])?;
    scene.add_pass(&[buffer1], tonemap, &[buffer2])?;
    scene.add_pass(&[buffer2], dither, &[])?;
    Ok(camera)
}

async fn scene5<B: GraphicsBackend, L: AssetLoader>(
    scene: &mut Scene<B, L>,
) -> EngineResult<Camera> {
    let defaults = ShaderOptions::default();
    let shader = scene.compile_shader("scene5.glsl", SCENE5, &["sky"], &aspect(WIDTH, HEIGHT))?;
    let mix = scene.compile_builtin(&library::MIX, &defaults)?;
    let downsample = scene.compile_builtin(&library::DOWNSAMPLE, &defaults)?;
    let upsample = scene.compile_builtin(&library::UPSAMPLE, &defaults)?;
    let tonemap = scene.compile_builtin(&library::TONEMAP, &defaults)?;
    let dither = scene.compile_builtin(&library::DITHER, &defaults)?;

    let sky = scene.load_cubemap("gloomy", "jpg").await?;

    let buffer1 = scene.add_buffer("buffer1", WIDTH, HEIGHT)?;
    let buffer2 = scene.add_buffer("buffer2", WIDTH, HEIGHT)?;
    let format = scene.config().default_buffer_format;
    let clamp = SamplerPreset::LinearClamp;
    let mip0 = scene.add_buffer_with("mip0", 400, 300, format, clamp)?;
    let mip1 = scene.add_buffer_with("mip1", 300, 225, format, clamp)?;
    let mip2 = scene.add_buffer_with("mip2", 200, 150, format, clamp)?;
    let mip3 = scene.add_buffer_with("mip3", 100, 75, format, clamp)?;

    let camera = Camera::new(
        Vec3::new(50.0, 2.0, 12.0),
        0.1,
        Movement::Bounded {
            walkable: in_bound,
            order: SlideOrder::ZFirst,
        },
        FACING_POSITIVE_X,
    )
    .without_time();
    scene.add_data("ubo", camera.uniforms())?;

    scene.add_pass(&[sky], shader, &[buffer1])?;
    scene.add_pass(&[buffer1], downsample, &[mip1])?;
    scene.add_pass(&[mip1], downsample, &[mip2])?;
    scene.add_pass(&[mip2], downsample, &[mip3])?;
    scene.add_pass(&[mip3], upsample, &[mip2])?;
    scene.add_pass(&[mip2], upsample, &[mip1])?;
    scene.add_pass(&[mip1], upsample, &[mip0])?;
    scene.add_pass(&[buffer1, mip0], mix, &[buffer2])?;
    scene.add_pass(&[buffer2], tonemap, &[buffer1])?;
    scene.add_pass(&[buffer1], dither, &[])?;
    Ok(camera)
}

async fn scene6<B: GraphicsBackend, L: AssetLoader>(
    scene: &mut Scene<B, L>,
) -> EngineResult<Camera> {
    let shader = scene.compile_shader("scene6.glsl", SCENE6, &["sky"], &aspect(WIDTH, HEIGHT))?;
    let fxaa = scene.compile_builtin(&library::FXAA, &ShaderOptions::default())?;
    let dither = scene.compile_builtin(&library::DITHER, &ShaderOptions::default())?;

    let sky = scene.load_cubemap("stormy", "jpg").await?;
    let buffer1 = scene.add_buffer("buffer1", WIDTH, HEIGHT)?;
    let buffer2 = scene.add_buffer("buffer2", WIDTH, HEIGHT)?;

    let camera = Camera::new(
        Vec3::new(200.0, 0.0, 0.0),
        0.1,
        Movement::Terrain {
            height: hills_height,
            eye: 1.5,
        },
        FACING_POSITIVE_X,
    );
    scene.add_data("ubo", camera.uniforms())?;

    scene.add_pass(&[sky], shader, &[buffer1])?;
    scene.add_pass(&[buffer1], fxaa, &[buffer2])?;
    scene.add_pass(&[buffer2], dither, &[])?;
    Ok(camera)
}

async fn scene7<B: GraphicsBackend, L: AssetLoader>(
    scene: &mut Scene<B, L>,
) -> EngineResult<Camera> {
    let shader = scene.compile_shader(
        "scene7.glsl",
        SCENE7,
        &["mat_albedo", "mat_normal", "mat_roughness", "graffiti"],
        &aspect(WIDTH, HEIGHT),
    )?;
    let tonemap = scene.compile_builtin(
        &library::TONEMAP,
        &ShaderOptions::default()
            .define("GAMMA", "2.2")
            .define("EXPOSURE", "2.0"),
    )?;
    let dither = scene.compile_builtin(&library::DITHER, &ShaderOptions::default())?;

    let albedo = scene.load_image("asphalt/albedo.jpg").await?;
    let normal = scene.load_image("asphalt/normal.jpg").await?;
    let roughness = scene.load_image("asphalt/roughness.jpg").await?;
    let graffiti = scene.load_image("graffiti.png").await?;

    let buffer1 = scene.add_buffer("buffer1", WIDTH, HEIGHT)?;
    let buffer2 = scene.add_buffer("buffer2", WIDTH, HEIGHT)?;

    let camera = Camera::new(
        Vec3::new(2.0, 1.0, 20.0),
        0.035,
        Movement::Bounded {
            walkable: walkable_alley,
            order: SlideOrder::XFirst,
        },
        FACING_NEGATIVE_Z,
    );
    scene.add_data("ubo", camera.uniforms())?;

    scene.add_pass(&[albedo, normal, roughness, graffiti], shader, &[buffer1])?;
    scene.add_pass(&[buffer1], tonemap, &[buffer2])?;
    scene.add_pass(&[buffer2], dither, &[])?;
    Ok(camera)
}
