//! Free-flight camera driving the scene pass matrices.

use glam::{Mat4, Quat, Vec2, Vec3};

/// Movement speed in units per second.
const TRANSLATION_SPEED: f32 = 2.0;
/// Speed multiplier while shift is held.
const FAST_MULTIPLIER: f32 = 5.0;
/// Roll speed in radians per second.
const ROLL_SPEED: f32 = 1.5;
/// Largest integration step of a single `passive_move`.
const MAX_MOVE_STEP: f32 = 1.0 / 30.0;
/// Wheel step of the orbit distance.
const SCROLL_STEP: f32 = 0.1;
/// Allowed range of the orbit distance.
const ORBIT_RANGE: (f32, f32) = (-5.0, 0.0);

/// Held keys and buttons sampled by the shell.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CameraInput {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub roll_left: bool,
    pub roll_right: bool,
    pub fast: bool,
    /// Smooth-rotation modifier (ctrl)
    pub smooth: bool,
    /// Right mouse button held
    pub rotating: bool,
    /// Cursor offset from the drag origin, in pixels
    pub drag_offset: Vec2,
}

/// Perspective camera with an orbit origin.
///
/// The view matrix is `origin * rotation * translation`: the world is first translated,
/// then rotated, then pushed back by the orbit distance.
#[derive(Clone, Debug)]
pub struct Camera {
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub viewport: Vec2,
    pub rotation: Quat,
    pub translation: Vec3,
    pub orbit_distance: f32,
    pub model: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            fov_y_degrees: 60.0,
            near: 0.1,
            far: 256.0,
            viewport: Vec2::new(1280.0, 720.0),
            rotation: Quat::IDENTITY,
            translation: Vec3::new(0.0, 0.0, -2.5),
            orbit_distance: 0.0,
            model: Mat4::IDENTITY,
        }
    }
}

impl Camera {
    /// Update the viewport after a resize.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = Vec2::new(width.max(1) as f32, height.max(1) as f32);
    }

    /// Width over height.
    pub fn aspect_ratio(&self) -> f32 {
        self.viewport.x / self.viewport.y
    }

    /// Projection matrix with Vulkan clip conventions (y down, depth in `[0, 1]`).
    pub fn projection(&self) -> Mat4 {
        let mut projection = Mat4::perspective_rh(
            self.fov_y_degrees.to_radians(),
            self.aspect_ratio(),
            self.near,
            self.far,
        );
        projection.y_axis.y = -projection.y_axis.y;
        projection
    }

    /// View matrix.
    pub fn view(&self) -> Mat4 {
        Mat4::from_translation(Vec3::new(0.0, 0.0, self.orbit_distance))
            * Mat4::from_quat(self.rotation)
            * Mat4::from_translation(self.translation)
    }

    /// Integrate held keys over `dt` seconds (capped at 1/30 s).
    pub fn passive_move(&mut self, input: &CameraInput, dt: f32) {
        let dt = dt.clamp(0.0, MAX_MOVE_STEP);
        let speed = if input.fast {
            TRANSLATION_SPEED * FAST_MULTIPLIER
        } else {
            TRANSLATION_SPEED
        };
        let step = dt * speed;

        // axes of the view frame expressed in world space
        let inverse = self.rotation.inverse();
        let direction = inverse * Vec3::NEG_Z;
        let horizon = inverse * Vec3::X;
        let vertical = inverse * Vec3::Y;

        let mut delta = Vec3::ZERO;
        if input.forward != input.backward {
            let sign = if input.backward { 1.0 } else { -1.0 };
            delta += direction * sign * step;
        }
        if input.left != input.right {
            let sign = if input.left { 1.0 } else { -1.0 };
            delta += horizon * sign * step;
        }
        if input.up {
            delta += vertical * step;
        }
        self.translation += delta;

        if input.roll_left != input.roll_right {
            let roll = if input.roll_right { -ROLL_SPEED } else { ROLL_SPEED } * dt;
            self.rotation = (Quat::from_rotation_z(roll) * self.rotation).normalize();
        }

        if input.rotating && input.smooth {
            let half_height = self.viewport.y * 0.5;
            let relative = input.drag_offset.length().min(half_height) / half_height;
            self.rotate_towards(input.drag_offset, dt * relative * relative);
        }
    }

    /// Rotate by a mouse drag of `delta` pixels.
    pub fn drag(&mut self, delta: Vec2, sensitivity: f32) {
        let angle = sensitivity * std::f32::consts::PI * delta.length() / self.viewport.y;
        self.rotate_towards(delta, angle);
    }

    /// Move the orbit origin by one wheel notch in the direction of `notches`.
    pub fn scroll(&mut self, notches: f32, scale: f32) {
        let delta = SCROLL_STEP * notches.signum() * scale;
        let next = self.orbit_distance + delta;
        if (ORBIT_RANGE.0..=ORBIT_RANGE.1).contains(&next) {
            self.orbit_distance = next;
        }
    }

    /// Rotate about the view-plane axis perpendicular to `drag`.
    fn rotate_towards(&mut self, drag: Vec2, angle: f32) {
        let Some(axis) = Vec3::new(drag.y, drag.x, 0.0).try_normalize() else {
            return;
        };
        self.rotation = (Quat::from_axis_angle(axis, -angle) * self.rotation).normalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_view_pushes_scene_back() {
        let camera = Camera::default();
        let origin = camera.view().transform_point3(Vec3::ZERO);
        assert_relative_eq!(origin.z, -2.5);
    }

    #[test]
    fn viewport_sets_aspect() {
        let mut camera = Camera::default();
        camera.set_viewport(1920, 1080);
        assert_relative_eq!(camera.aspect_ratio(), 1920.0 / 1080.0);
        camera.set_viewport(0, 0);
        assert_relative_eq!(camera.aspect_ratio(), 1.0);
    }

    #[test]
    fn projection_flips_y() {
        let camera = Camera::default();
        let p = camera.projection();
        assert!(p.y_axis.y < 0.0);
    }

    #[test]
    fn forward_moves_towards_scene() {
        let mut camera = Camera::default();
        let input = CameraInput {
            forward: true,
            ..Default::default()
        };
        camera.passive_move(&input, 0.01);
        // world translation moves away from -z by speed * dt
        assert_relative_eq!(camera.translation.z, -2.5 + 0.02, epsilon = 1e-6);
    }

    #[test]
    fn move_step_is_capped() {
        let mut camera = Camera::default();
        let input = CameraInput {
            up: true,
            fast: true,
            ..Default::default()
        };
        camera.passive_move(&input, 10.0);
        assert_relative_eq!(camera.translation.y, 10.0 / 30.0, epsilon = 1e-5);
    }

    #[test]
    fn opposite_keys_cancel() {
        let mut camera = Camera::default();
        let input = CameraInput {
            left: true,
            right: true,
            roll_left: true,
            roll_right: true,
            ..Default::default()
        };
        camera.passive_move(&input, 0.01);
        assert_eq!(camera.translation, Vec3::new(0.0, 0.0, -2.5));
        assert_eq!(camera.rotation, Quat::IDENTITY);
    }

    #[test]
    fn scroll_is_clamped() {
        let mut camera = Camera::default();
        camera.scroll(1.0, 2.0);
        assert_eq!(camera.orbit_distance, 0.0);
        for _ in 0..100 {
            camera.scroll(-1.0, 5.0);
        }
        assert!(camera.orbit_distance >= -5.0);
        assert!(camera.orbit_distance < -4.0);
    }

    #[test]
    fn drag_rotates() {
        let mut camera = Camera::default();
        camera.drag(Vec2::new(100.0, 0.0), 0.5);
        assert_ne!(camera.rotation, Quat::IDENTITY);
        let mut still = Camera::default();
        still.drag(Vec2::ZERO, 0.5);
        assert_eq!(still.rotation, Quat::IDENTITY);
    }
}
