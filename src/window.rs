//! Window management using winit

use std::sync::Arc;
use winit::{
    dpi::PhysicalSize,
    event::{DeviceEvent, Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget},
    window::{CursorGrabMode, Window as WinitWindow, WindowBuilder},
};

use crate::error::{EngineError, EngineResult};

/// What the run loop hands to the host callback.
#[derive(Debug)]
pub enum HostEvent<'a> {
    /// A window event, after the window has updated its own state
    Window(&'a WindowEvent),
    /// Raw pointer motion, reported even while the cursor is locked
    MouseMotion { dx: f64, dy: f64 },
    /// Time to render one frame
    Frame,
}

/// Wrapper around winit window with additional state
pub struct Window {
    window: Arc<WinitWindow>,
    width: u32,
    height: u32,
    resized: bool,
    close_requested: bool,
}

impl Window {
    /// Create a new window with the given title and dimensions
    pub fn new(
        event_loop: &EventLoop<()>,
        title: &str,
        width: u32,
        height: u32,
    ) -> EngineResult<Self> {
        let window = WindowBuilder::new()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .build(event_loop)
            .map_err(|e| EngineError::Window(e.to_string()))?;
        let size = window.inner_size();

        Ok(Self {
            window: Arc::new(window),
            width: size.width,
            height: size.height,
            resized: false,
            close_requested: false,
        })
    }

    /// Get the raw window
    pub fn window(&self) -> &WinitWindow {
        &self.window
    }

    /// Get arc reference to window for backend initialization
    pub fn window_arc(&self) -> Arc<WinitWindow> {
        Arc::clone(&self.window)
    }

    /// Get current window dimensions
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Check if window was resized since last frame
    pub fn was_resized(&self) -> bool {
        self.resized
    }

    /// Clear the resize flag
    pub fn clear_resize_flag(&mut self) {
        self.resized = false;
    }

    /// Check if close was requested
    pub fn should_close(&self) -> bool {
        self.close_requested
    }

    /// Hide the cursor and keep it inside the window.
    pub fn set_mouse_lock(&self, locked: bool) {
        let result = if locked {
            self.window
                .set_cursor_grab(CursorGrabMode::Locked)
                .or_else(|_| self.window.set_cursor_grab(CursorGrabMode::Confined))
        } else {
            self.window.set_cursor_grab(CursorGrabMode::None)
        };
        if let Err(e) = result {
            log::warn!("Cursor grab not available: {e}");
        }
        self.window.set_cursor_visible(!locked);
    }

    /// Handle window events
    pub fn handle_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::Resized(size) => {
                self.width = size.width;
                self.height = size.height;
                self.resized = true;
            }
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            _ => {}
        }
    }

    /// Request a redraw
    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }
}

/// Run the event loop until the window closes or the callback fails.
///
/// A redraw is requested every time the loop goes idle and each
/// `RedrawRequested` becomes one [`HostEvent::Frame`].
pub fn run<F>(event_loop: EventLoop<()>, mut window: Window, mut callback: F) -> EngineResult<()>
where
    F: FnMut(&mut Window, HostEvent<'_>) -> EngineResult<()>,
{
    let mut failure = None;

    event_loop
        .run(|event, elwt: &EventLoopWindowTarget<()>| {
            elwt.set_control_flow(ControlFlow::Poll);

            let result = match event {
                Event::WindowEvent { event, .. } => {
                    window.handle_event(&event);
                    match event {
                        WindowEvent::CloseRequested => {
                            elwt.exit();
                            Ok(())
                        }
                        WindowEvent::RedrawRequested => {
                            let result = callback(&mut window, HostEvent::Frame);
                            window.clear_resize_flag();
                            result
                        }
                        other => callback(&mut window, HostEvent::Window(&other)),
                    }
                }
                Event::DeviceEvent {
                    event: DeviceEvent::MouseMotion { delta: (dx, dy) },
                    ..
                } => callback(&mut window, HostEvent::MouseMotion { dx, dy }),
                Event::AboutToWait => {
                    window.request_redraw();
                    Ok(())
                }
                _ => Ok(()),
            };

            if let Err(error) = result {
                log::error!("Stopping: {error}");
                failure = Some(error);
                elwt.exit();
            }
        })
        .map_err(|e| EngineError::Window(e.to_string()))?;

    match failure {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
