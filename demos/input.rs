//! Keyboard and mouse state for the demo camera.

use std::collections::HashSet;

use passgraph::HostEvent;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Pressed keys and pointer motion accumulated while the mouse is locked.
#[derive(Debug, Default)]
pub struct Input {
    keys: HashSet<KeyCode>,
    mouse_x: f64,
    mouse_y: f64,
    locked: bool,
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update from one host event. Returns the requested mouse lock state
    /// when it changes: Escape releases the pointer, a left click grabs it.
    pub fn handle(&mut self, event: &HostEvent<'_>) -> Option<bool> {
        match event {
            HostEvent::MouseMotion { dx, dy } => {
                if self.locked {
                    self.mouse_x += dx;
                    self.mouse_y += dy;
                }
                None
            }
            HostEvent::Window(WindowEvent::KeyboardInput { event, .. }) => {
                let PhysicalKey::Code(code) = event.physical_key else {
                    return None;
                };
                match event.state {
                    ElementState::Pressed => {
                        self.keys.insert(code);
                    }
                    ElementState::Released => {
                        self.keys.remove(&code);
                    }
                }
                (code == KeyCode::Escape && event.state == ElementState::Pressed)
                    .then(|| self.set_locked(false))
            }
            HostEvent::Window(WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            }) if !self.locked => Some(self.set_locked(true)),
            HostEvent::Window(WindowEvent::Focused(false)) => {
                self.keys.clear();
                None
            }
            _ => None,
        }
    }

    fn set_locked(&mut self, locked: bool) -> bool {
        self.locked = locked;
        locked
    }

    pub fn set_mouse_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    pub fn key(&self, code: KeyCode) -> bool {
        self.keys.contains(&code)
    }

    /// Horizontal pointer travel in pixels since start.
    pub fn mouse_x(&self) -> f32 {
        self.mouse_x as f32
    }

    /// Vertical pointer travel in pixels since start, down is positive.
    pub fn mouse_y(&self) -> f32 {
        self.mouse_y as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motion_only_counts_while_locked() {
        let mut input = Input::new();
        input.handle(&HostEvent::MouseMotion { dx: 5.0, dy: 2.0 });
        assert_eq!(input.mouse_x(), 0.0);

        input.set_mouse_locked(true);
        input.handle(&HostEvent::MouseMotion { dx: 5.0, dy: 2.0 });
        input.handle(&HostEvent::MouseMotion { dx: -1.0, dy: 1.0 });
        assert_eq!(input.mouse_x(), 4.0);
        assert_eq!(input.mouse_y(), 3.0);
    }

    #[test]
    fn test_focus_loss_releases_keys() {
        let mut input = Input::new();
        input.keys.insert(KeyCode::KeyW);
        input.handle(&HostEvent::Window(&WindowEvent::Focused(false)));
        assert!(!input.key(KeyCode::KeyW));
    }
}
