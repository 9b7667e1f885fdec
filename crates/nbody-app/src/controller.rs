//! Keyboard and mouse handling for the camera.

use glam::Vec2;
use nbody_core::{Camera, CameraInput};
use winit::event::{ElementState, MouseButton, MouseScrollDelta};
use winit::keyboard::KeyCode;

/// Wheel scale while shift is held.
const SCROLL_FAST: f32 = 5.0;
/// Wheel scale while ctrl is held.
const SCROLL_FINE: f32 = 0.2;

/// Translates window input into camera motion.
#[derive(Clone, Debug, Default)]
pub struct CameraController {
    input: CameraInput,
    /// Cursor position of the previous move event
    last_cursor: Option<Vec2>,
    /// Cursor position where the right button went down
    drag_origin: Option<Vec2>,
}

impl CameraController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Held keys and buttons as sampled by the draw tick.
    pub const fn input(&self) -> &CameraInput {
        &self.input
    }

    /// Track a key press or release. Returns `true` if the key is bound.
    pub fn key(&mut self, code: KeyCode, state: ElementState) -> bool {
        let pressed = state.is_pressed();
        let slot = match code {
            KeyCode::KeyW => &mut self.input.forward,
            KeyCode::KeyS => &mut self.input.backward,
            KeyCode::KeyA => &mut self.input.left,
            KeyCode::KeyD => &mut self.input.right,
            KeyCode::Space => &mut self.input.up,
            KeyCode::KeyQ => &mut self.input.roll_left,
            KeyCode::KeyE => &mut self.input.roll_right,
            KeyCode::ShiftLeft | KeyCode::ShiftRight => &mut self.input.fast,
            KeyCode::ControlLeft | KeyCode::ControlRight => &mut self.input.smooth,
            _ => return false,
        };
        *slot = pressed;
        true
    }

    /// Track a mouse button; the right button starts and ends a drag.
    pub fn mouse_button(&mut self, button: MouseButton, state: ElementState) {
        if button != MouseButton::Right {
            return;
        }
        if state.is_pressed() {
            self.input.rotating = true;
            self.drag_origin = self.last_cursor;
        } else {
            self.input.rotating = false;
            self.input.drag_offset = Vec2::ZERO;
            self.drag_origin = None;
        }
    }

    /// Apply a cursor move.
    ///
    /// Without ctrl the camera follows the cursor directly; with ctrl the offset from the
    /// drag origin sets a rotation speed integrated by [`Camera::passive_move`].
    pub fn cursor_moved(&mut self, camera: &mut Camera, position: Vec2, sensitivity: f32) {
        let last = self.last_cursor.replace(position);
        if !self.input.rotating {
            return;
        }

        if self.input.smooth {
            let origin = *self.drag_origin.get_or_insert(position);
            self.input.drag_offset = origin - position;
        } else if let Some(last) = last {
            self.input.drag_offset = Vec2::ZERO;
            camera.drag(last - position, sensitivity);
        }
    }

    /// Apply a wheel event.
    pub fn wheel(&mut self, camera: &mut Camera, delta: MouseScrollDelta) {
        let notches = match delta {
            MouseScrollDelta::LineDelta(_, y) => y,
            MouseScrollDelta::PixelDelta(position) => position.y as f32,
        };
        if notches == 0.0 {
            return;
        }
        camera.scroll(notches, self.scroll_scale());
    }

    fn scroll_scale(&self) -> f32 {
        if self.input.fast {
            SCROLL_FAST
        } else if self.input.smooth {
            SCROLL_FINE
        } else {
            1.0
        }
    }

    /// Release everything, e.g. when the window loses focus.
    pub fn release_all(&mut self) {
        self.input = CameraInput::default();
        self.drag_origin = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn keys_map_to_camera_input() {
        let mut controller = CameraController::new();
        assert!(controller.key(KeyCode::KeyW, ElementState::Pressed));
        assert!(controller.key(KeyCode::ShiftLeft, ElementState::Pressed));
        assert!(!controller.key(KeyCode::KeyZ, ElementState::Pressed));
        assert!(controller.input().forward);
        assert!(controller.input().fast);

        controller.key(KeyCode::KeyW, ElementState::Released);
        assert!(!controller.input().forward);
    }

    #[test]
    fn focus_loss_releases_keys() {
        let mut controller = CameraController::new();
        controller.key(KeyCode::KeyQ, ElementState::Pressed);
        controller.mouse_button(MouseButton::Right, ElementState::Pressed);
        controller.release_all();
        assert_eq!(*controller.input(), CameraInput::default());
    }

    #[test]
    fn drag_rotates_only_with_right_button() {
        let mut controller = CameraController::new();
        let mut camera = Camera::default();
        let initial = camera.rotation;

        controller.cursor_moved(&mut camera, Vec2::new(100.0, 100.0), 0.5);
        controller.cursor_moved(&mut camera, Vec2::new(150.0, 100.0), 0.5);
        assert_eq!(camera.rotation, initial);

        controller.mouse_button(MouseButton::Right, ElementState::Pressed);
        controller.cursor_moved(&mut camera, Vec2::new(200.0, 100.0), 0.5);
        assert_ne!(camera.rotation, initial);
    }

    #[test]
    fn smooth_drag_sets_an_offset() {
        let mut controller = CameraController::new();
        let mut camera = Camera::default();
        controller.key(KeyCode::ControlLeft, ElementState::Pressed);
        controller.cursor_moved(&mut camera, Vec2::new(100.0, 100.0), 0.5);
        controller.mouse_button(MouseButton::Right, ElementState::Pressed);
        controller.cursor_moved(&mut camera, Vec2::new(130.0, 60.0), 0.5);
        assert_eq!(controller.input().drag_offset, Vec2::new(-30.0, 40.0));

        controller.mouse_button(MouseButton::Right, ElementState::Released);
        assert_eq!(controller.input().drag_offset, Vec2::ZERO);
    }

    #[test]
    fn wheel_steps_scale_with_modifiers() {
        let mut controller = CameraController::new();
        let mut camera = Camera::default();

        controller.wheel(&mut camera, MouseScrollDelta::LineDelta(0.0, -1.0));
        assert_relative_eq!(camera.orbit_distance, -0.1);

        controller.key(KeyCode::ShiftLeft, ElementState::Pressed);
        controller.wheel(&mut camera, MouseScrollDelta::LineDelta(0.0, -3.0));
        assert_relative_eq!(camera.orbit_distance, -0.6);

        controller.key(KeyCode::ShiftLeft, ElementState::Released);
        controller.key(KeyCode::ControlLeft, ElementState::Pressed);
        controller.wheel(&mut camera, MouseScrollDelta::LineDelta(0.0, 1.0));
        assert_relative_eq!(camera.orbit_distance, -0.58, epsilon = 1e-6);
    }
}
