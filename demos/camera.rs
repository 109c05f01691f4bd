//! First-person camera shared by the demo scenes.
//!
//! The camera owns the `ubo` arrays the scene shaders read, so updating it
//! between frames is all that is needed for the next `render()` to see the
//! new view.

use std::f32::consts::PI;

use glam::Vec3;
use passgraph::{UniformArray, UniformSource};
use winit::keyboard::KeyCode;

use crate::input::Input;

/// Mouse travel, in pixels, per radian of rotation.
const MOUSE_SCALE: f32 = 600.0;
const TIME_STEP: f32 = 0.015;

/// Rotation about X, matching `rotate_x` in `passgraph/camera.glsl`.
pub fn rotate_x(v: Vec3, a: f32) -> Vec3 {
    let (s, c) = a.sin_cos();
    Vec3::new(v.x, c * v.y - s * v.z, s * v.y + c * v.z)
}

/// Rotation about Y, matching `rotate_y` in `passgraph/camera.glsl`.
pub fn rotate_y(v: Vec3, a: f32) -> Vec3 {
    let (s, c) = a.sin_cos();
    Vec3::new(c * v.x - s * v.z, v.y, s * v.x + c * v.z)
}

/// Ground height of the pink sea.
pub fn pink_sea_height(x: f32, z: f32) -> f32 {
    let a = 3.0 * (-(0.05 * 0.05 * (x * x + z * z)).powi(2)).exp();
    let b = 0.2 * (0.5 * x + 0.05 * z.sin()).cos();
    a + b
}

/// Ground height of the scene6 hills.
pub fn hills_height(x: f32, z: f32) -> f32 {
    let bump = |cx: f32, cz: f32, scale: f32, amplitude: f32| {
        let (u, v) = (x - cx, z - cz);
        amplitude * (-(scale * scale * (u * u + v * v)).powi(2)).exp()
    };
    let a = bump(0.0, 0.0, 0.03, 3.0);
    let b = bump(60.0, 60.0, 0.1, 2.0);
    let c = 0.2 * (0.5 * x + 0.05 * z.sin()).cos();
    let ridge = (z - (x * 0.3).sin()) / 2.0;
    let d = (-ridge * ridge).exp() * (1.0 / (1.0 + (-(x - 40.0)).exp()));
    let e = bump(80.0, -20.0, 0.1, 2.0);
    a + b + c + d + e
}

/// Walkable floor plan of scene5: a corridor, a ring of courtyards around a
/// solid block, and an exit lane.
pub fn in_bound(x: f32, z: f32) -> bool {
    if x > -2.0 && x < 2.0 {
        return true;
    }
    if x > 20.0 && z > 10.0 && z < 14.0 {
        return true;
    }
    if x > 2.0 && x < 20.0 && z > 2.0 && z < 22.0 {
        return !(x < 16.0 && z > 6.0 && z < 18.0);
    }
    false
}

/// Whether a camera of radius 0.5 at (x, z) hits the scene7 alley walls or
/// the row of blocks, which opens every 16 units.
pub fn test_collide(x: f32, z: f32) -> bool {
    const RADIUS: f32 = 0.5;
    if x - RADIUS < -3.0 || x + RADIUS > 3.0 {
        return true;
    }
    let u = if z > 0.0 { z % 16.0 } else { 16.0 + z % 16.0 };
    x - RADIUS > -2.5 && x + RADIUS < 1.6 && (u + RADIUS < 2.5 || u - RADIUS > 3.3)
}

/// Which axis a blocked move tries first when sliding along a wall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideOrder {
    ZFirst,
    XFirst,
}

/// How WASD input moves the camera.
#[derive(Debug, Clone, Copy)]
pub enum Movement {
    /// Fly along the view direction, pitch included.
    FreeFly,
    /// Walk on a height field, eyes `eye` above the ground.
    Terrain { height: fn(f32, f32) -> f32, eye: f32 },
    /// Walk on the floor, sliding along walls where `walkable` is false.
    Bounded {
        walkable: fn(f32, f32) -> bool,
        order: SlideOrder,
    },
}

pub struct Camera {
    position: Vec3,
    speed: f32,
    movement: Movement,
    yaw_offset: f32,
    view_pos: UniformArray<f32>,
    view_yaw: UniformArray<f32>,
    view_pitch: UniformArray<f32>,
    time: Option<UniformArray<f32>>,
}

impl Camera {
    pub fn new(position: Vec3, speed: f32, movement: Movement, yaw_offset: f32) -> Self {
        Self {
            position,
            speed,
            movement,
            yaw_offset,
            view_pos: UniformArray::new(position.to_array()),
            view_yaw: UniformArray::new([yaw_offset]),
            view_pitch: UniformArray::zeroed(1),
            time: Some(UniformArray::zeroed(1)),
        }
    }

    /// Drop the `time` member, for shaders whose `ubo` has none.
    pub fn without_time(mut self) -> Self {
        self.time = None;
        self
    }

    /// Arrays for the `ubo` data block, in declaration order.
    pub fn uniforms(&self) -> Vec<Box<dyn UniformSource>> {
        let mut arrays: Vec<Box<dyn UniformSource>> = vec![
            Box::new(self.view_pos.clone()),
            Box::new(self.view_yaw.clone()),
            Box::new(self.view_pitch.clone()),
        ];
        if let Some(time) = &self.time {
            arrays.push(Box::new(time.clone()));
        }
        arrays
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn yaw(&self) -> f32 {
        self.view_yaw.get(0).unwrap_or(self.yaw_offset)
    }

    pub fn pitch(&self) -> f32 {
        self.view_pitch.get(0).unwrap_or(0.0)
    }

    /// Advance one frame: time, position from the keys held, then the view
    /// angles from the accumulated mouse travel.
    pub fn update(&mut self, input: &Input) {
        if let Some(time) = &self.time {
            time.set(0, time.get(0).unwrap_or(0.0) + TIME_STEP);
        }

        let step = self.step(input);
        self.apply(step);
        self.view_pos.write(&self.position.to_array());

        self.view_yaw
            .set(0, input.mouse_x() / MOUSE_SCALE + self.yaw_offset);
        self.view_pitch.set(0, -input.mouse_y() / MOUSE_SCALE);
    }

    fn step(&self, input: &Input) -> Vec3 {
        let (yaw, pitch) = (self.yaw(), self.pitch());
        let orient = |v: Vec3| match self.movement {
            Movement::FreeFly => rotate_y(rotate_x(v, -pitch), -yaw),
            _ => rotate_y(v, -yaw),
        };
        let forward = orient(Vec3::new(0.0, 0.0, self.speed));
        let side = orient(Vec3::new(self.speed, 0.0, 0.0));

        let mut step = Vec3::ZERO;
        if input.key(KeyCode::KeyW) {
            step += forward;
        }
        if input.key(KeyCode::KeyA) {
            step -= side;
        }
        if input.key(KeyCode::KeyS) {
            step -= forward;
        }
        if input.key(KeyCode::KeyD) {
            step += side;
        }
        step
    }

    fn apply(&mut self, step: Vec3) {
        let p = &mut self.position;
        match self.movement {
            Movement::FreeFly => *p += step,
            Movement::Terrain { height, eye } => {
                p.x += step.x;
                p.z += step.z;
                p.y = height(p.x, p.z) + eye;
            }
            Movement::Bounded { walkable, order } => {
                let (x, z) = (p.x + step.x, p.z + step.z);
                let candidates = match order {
                    SlideOrder::ZFirst => [(x, z), (p.x, z), (x, p.z)],
                    SlideOrder::XFirst => [(x, z), (x, p.z), (p.x, z)],
                };
                if let Some((x, z)) = candidates.into_iter().find(|(x, z)| walkable(*x, *z)) {
                    p.x = x;
                    p.z = z;
                }
            }
        }
    }
}

/// Yaw offsets that make each scene start facing down its main axis.
pub const FACING_POSITIVE_X: f32 = -PI / 2.0;
pub const FACING_NEGATIVE_Z: f32 = PI;

#[cfg(test)]
mod tests {
    use super::*;

    fn walkable_alley(x: f32, z: f32) -> bool {
        !test_collide(x, z)
    }

    #[test]
    fn test_rotations() {
        let v = rotate_y(Vec3::Z, PI / 2.0);
        assert!((v - Vec3::new(-1.0, 0.0, 0.0)).length() < 1e-6);
        let v = rotate_x(Vec3::Z, PI / 2.0);
        assert!((v - Vec3::new(0.0, -1.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn test_height_reference_values() {
        assert!((pink_sea_height(0.0, 0.0) - 3.2).abs() < 1e-5);
        assert!((hills_height(0.0, 0.0) - 3.2).abs() < 1e-5);
        // Far from every bump only the cosine ripple remains.
        let expected = 0.2 * (0.5f32 * 200.0 + 0.05 * 50.0f32.sin()).cos();
        assert!((hills_height(200.0, 50.0) - expected).abs() < 1e-3);
        assert!(hills_height(60.0, 60.0) > 1.7);
    }

    #[test]
    fn test_in_bound() {
        assert!(in_bound(0.0, 100.0));
        assert!(in_bound(50.0, 12.0));
        assert!(in_bound(18.0, 4.0));
        assert!(!in_bound(10.0, 12.0));
        assert!(!in_bound(50.0, 15.0));
        assert!(!in_bound(-5.0, 0.0));
    }

    #[test]
    fn test_collide() {
        assert!(test_collide(-2.8, 0.0));
        assert!(test_collide(2.8, 0.0));
        assert!(test_collide(0.0, 10.0));
        assert!(!test_collide(0.0, 2.9));
        assert!(!test_collide(0.0, -13.1));
        assert!(!test_collide(2.0, 10.0));
        assert!(!test_collide(-2.2, 10.0));
    }

    #[test]
    fn test_blocked_move_slides_along_wall() {
        let mut camera = Camera::new(
            Vec3::new(2.0, 1.0, 20.0),
            0.035,
            Movement::Bounded {
                walkable: walkable_alley,
                order: SlideOrder::XFirst,
            },
            PI,
        );
        // Diagonal into the block: x is rejected, z still advances.
        camera.apply(Vec3::new(-1.0, 0.0, 0.5));
        assert_eq!(camera.position(), Vec3::new(2.0, 1.0, 20.5));
    }

    #[test]
    fn test_terrain_follows_height() {
        let mut camera = Camera::new(
            Vec3::new(10.0, 0.0, 0.0),
            0.2,
            Movement::Terrain {
                height: pink_sea_height,
                eye: 2.0,
            },
            0.0,
        );
        camera.apply(Vec3::new(0.0, 5.0, 0.2));
        let p = camera.position();
        assert!((p.y - (pink_sea_height(10.0, 0.2) + 2.0)).abs() < 1e-6);
    }

    #[test]
    fn test_update_advances_time_and_angles() {
        let camera = Camera::new(Vec3::ZERO, 0.05, Movement::FreeFly, 0.0);
        let time = camera.time.clone().unwrap();
        let mut camera = camera;
        let input = Input::new();
        camera.update(&input);
        camera.update(&input);
        assert!((time.get(0).unwrap() - 0.03).abs() < 1e-6);
        assert_eq!(camera.uniforms().len(), 4);
        assert_eq!(camera.without_time().uniforms().len(), 3);
    }
}
