//! # Demo scenes
//!
//! Multi-pass full-screen scenes rendered with passgraph on wgpu:
//! - `pink-sea`: height-field sea under a cubemap sky, dithered
//! - `docks`: textured wooden dock, tonemapped and dithered
//! - `scene5`: walled maze with a downsample/upsample bloom chain
//! - `scene6`: rolling hills with FXAA
//! - `scene7`: night alley with graffiti, tonemapped at exposure 2
//!
//! Move with WASD, look with the mouse. Escape releases the pointer and a
//! left click grabs it again.

mod camera;
mod input;
mod scenes;

use std::path::PathBuf;

use clap::Parser;
use passgraph::backend::BackendError;
use passgraph::window::{self, HostEvent, Window};
use passgraph::{EngineError, EngineResult, FileAssetLoader, Scene, WgpuBackend, WgpuConfig};
use winit::event_loop::EventLoop;

use crate::input::Input;
use crate::scenes::SceneKind;

#[derive(Parser, Debug)]
#[command(name = "scenes", about = "passgraph demo scenes")]
struct Args {
    /// Scene to run
    #[arg(long, value_enum, default_value_t = SceneKind::PinkSea)]
    scene: SceneKind,

    /// Directory holding the cubemaps and textures
    #[arg(long, default_value = "assets")]
    assets: PathBuf,

    /// Window width
    #[arg(long, default_value_t = 800)]
    width: u32,

    /// Window height
    #[arg(long, default_value_t = 600)]
    height: u32,

    /// Present without waiting for vertical blank
    #[arg(long)]
    no_vsync: bool,
}

fn main() {
    env_logger::init();

    if let Err(error) = run(Args::parse()) {
        log::error!("{error}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> EngineResult<()> {
    let event_loop = EventLoop::new().map_err(|e| EngineError::Window(e.to_string()))?;
    let window = Window::new(
        &event_loop,
        &format!("passgraph - {:?}", args.scene),
        args.width,
        args.height,
    )?;

    let config = WgpuConfig {
        vsync: !args.no_vsync,
        ..Default::default()
    };
    let backend = WgpuBackend::new(window.window_arc(), &config)?;
    let mut scene = Scene::new(backend, FileAssetLoader::new(&args.assets));
    let mut camera = pollster::block_on(scenes::build(&mut scene, args.scene))?;
    scene.validate()?;

    let mut input = Input::new();
    window.set_mouse_lock(true);
    input.set_mouse_locked(true);

    window::run(event_loop, window, move |window: &mut Window, event| {
        match event {
            HostEvent::Frame => {
                if window.was_resized() {
                    let (width, height) = window.dimensions();
                    scene.resize(width, height);
                }
                camera.update(&input);
                log::trace!(
                    "Camera at {:?}, yaw {:.3}",
                    camera.position(),
                    camera.yaw()
                );
                match scene.render() {
                    Err(EngineError::Backend(BackendError::SurfaceLost)) => {
                        log::warn!("Surface lost, reconfiguring");
                        let (width, height) = window.dimensions();
                        scene.resize(width, height);
                        Ok(())
                    }
                    result => result,
                }
            }
            other => {
                if let Some(locked) = input.handle(&other) {
                    window.set_mouse_lock(locked);
                }
                Ok(())
            }
        }
    })
}
