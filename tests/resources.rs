//! Image, cubemap and buffer creation through the scene.

mod common;

use common::{assert_uniform, Backend};
use passgraph::{
    BufferFormat, ConfigError, DecodedImage, EngineError, ImageKind, MemoryAssetLoader,
    SamplerPreset, Scene, ShaderOptions, UniformArray,
};
use rstest::rstest;

#[rstest]
#[case::linear_repeat(SamplerPreset::LinearRepeat)]
#[case::linear_clamp(SamplerPreset::LinearClamp)]
#[case::nearest_clamp(SamplerPreset::NearestClamp)]
fn test_buffer_keeps_its_preset(#[case] preset: SamplerPreset) {
    common::init_logging();
    let mut scene = Scene::new(common::software(4, 4), MemoryAssetLoader::new());
    let buffer = scene
        .add_buffer_with("buffer", 8, 4, BufferFormat::RGBA16F, preset)
        .unwrap();

    let image = scene.image(buffer).unwrap();
    assert_eq!(image.kind, ImageKind::RenderTarget);
    assert_eq!(image.size(), (8, 4));
    assert_eq!(image.preset, preset);
    assert_eq!(image.sampler, preset.descriptor());
    assert_eq!(
        scene.backend().texture_sampler(image.handle),
        Some(&preset.descriptor())
    );
}

#[test]
fn test_named_buffer_parses_gl_names() {
    let mut scene = Scene::new(common::software(4, 4), MemoryAssetLoader::new());
    let buffer = scene
        .add_buffer_named("hdr", 4, 4, ["RGBA", "RGBA16F", "HALF_FLOAT"], "LINEAR_CLAMP")
        .unwrap();
    let image = scene.image(buffer).unwrap();
    assert_eq!(image.preset, SamplerPreset::LinearClamp);
    assert_eq!(image.format, BufferFormat::RGBA16F.texture_format());
}

#[test]
fn test_unknown_preset_fails_before_allocation() {
    let mut scene = Scene::new(common::software(4, 4), MemoryAssetLoader::new());
    let before = scene.backend().live_objects();

    let result = scene.add_buffer_named("hdr", 4, 4, ["RGBA", "RGBA16F", "HALF_FLOAT"], "MIPMAP");
    assert!(matches!(
        result,
        Err(EngineError::Config(ConfigError::UnknownSamplerPreset(_)))
    ));

    let result = scene.add_buffer_named("hdr", 4, 4, ["RGBA", "RGBA16F", "BYTE"], "LINEAR_CLAMP");
    assert!(result.is_err());
    assert_eq!(scene.backend().live_objects(), before);
    assert!(scene.resources().is_empty());
}

#[test]
fn test_loaded_image_uses_default_preset() {
    let mut loader = MemoryAssetLoader::new();
    loader.insert_image(
        "textures/red.png",
        DecodedImage::solid_color(2, 2, [255, 0, 0, 255], "red"),
    );
    let mut scene = Scene::new(common::software(4, 4), loader);

    let id = pollster::block_on(scene.load_image("textures/red.png")).unwrap();
    let image = scene.image(id).unwrap();
    assert_eq!(image.kind, ImageKind::Image2d);
    assert_eq!(image.preset, SamplerPreset::LinearRepeat);

    let missing = pollster::block_on(scene.load_image("textures/blue.png"));
    assert!(matches!(missing, Err(EngineError::Asset(_))));
}

#[rstest]
#[case::software(Backend::Software)]
#[case::wgpu(Backend::Wgpu)]
fn test_cubemap_sampled_by_direction(#[case] kind: Backend) {
    let Some(mut scene) = common::scene(kind, 2, 2) else {
        return;
    };
    let colors: [[u8; 4]; 6] = [
        [255, 0, 0, 255],
        [0, 255, 0, 255],
        [0, 0, 255, 255],
        [255, 255, 0, 255],
        [0, 255, 255, 255],
        [255, 0, 255, 255],
    ];
    let faces = colors.map(|c| DecodedImage::solid_color(2, 2, c, "face"));
    let sky = scene.add_cubemap(&faces, SamplerPreset::LinearClamp).unwrap();
    assert_eq!(scene.image(sky).unwrap().kind, ImageKind::Cubemap);

    let probe = scene
        .compile_shader(
            "test/cube_probe",
            common::CUBE_PROBE,
            &["sky"],
            &ShaderOptions::default(),
        )
        .unwrap();
    let direction = UniformArray::new([1.0f32, 0.0, 0.0, 0.0]);
    scene
        .add_data("probe", vec![Box::new(direction.clone())])
        .unwrap();
    let buffer = scene.add_buffer("buffer", 2, 2).unwrap();
    scene.add_pass(&[sky], probe, &[buffer]).unwrap();

    let directions = [
        [1.0, 0.0, 0.0],
        [-1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, -1.0, 0.0],
        [0.0, 0.0, 1.0],
        [0.0, 0.0, -1.0],
    ];
    for (dir, color) in directions.iter().zip(colors.iter()) {
        direction.write(&[dir[0], dir[1], dir[2], 0.0]);
        scene.render().unwrap();
        let expected = color.map(|c| c as f32 / 255.0);
        assert_uniform(&scene.read_image(buffer).unwrap(), expected, 1e-2);
    }
}

#[test]
fn test_cubemap_faces_must_match() {
    let mut scene = Scene::new(common::software(2, 2), MemoryAssetLoader::new());
    let mut faces: [DecodedImage; 6] =
        std::array::from_fn(|_| DecodedImage::solid_color(4, 4, [0, 0, 0, 255], "face"));
    faces[3] = DecodedImage::solid_color(2, 2, [0, 0, 0, 255], "small");

    let result = scene.add_cubemap(&faces, SamplerPreset::LinearClamp);
    assert!(matches!(
        result,
        Err(EngineError::Config(ConfigError::CubemapFaceMismatch(_)))
    ));
    assert_eq!(scene.backend().live_objects(), (0, 0, 0));
}

#[test]
fn test_release_image_in_use_is_rejected() {
    let mut scene = Scene::new(common::software(4, 4), MemoryAssetLoader::new());
    let copy = scene
        .compile_shader("test/copy", common::COPY, &["src"], &ShaderOptions::default())
        .unwrap();
    let image = scene
        .add_image(
            &DecodedImage::solid_color(4, 4, [0, 0, 0, 255], "black"),
            SamplerPreset::NearestClamp,
        )
        .unwrap();
    let unused = scene.add_buffer("unused", 4, 4).unwrap();
    let buffer = scene.add_buffer("buffer", 4, 4).unwrap();
    scene.add_pass(&[image], copy, &[buffer]).unwrap();

    assert!(matches!(
        scene.release_image(image),
        Err(EngineError::Config(ConfigError::ImageInUse { pass: 0, .. }))
    ));
    scene.release_image(unused).unwrap();
    assert!(scene.image(unused).is_none());
    assert!(scene.image(image).is_some());
}
