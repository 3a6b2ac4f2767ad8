use glam::{Mat4, Vec2, Vec3};
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Camera provider output for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraFrame {
    pub camera_to_world: Mat4,
    pub inverse_projection: Mat4,
    /// The camera moved (or the projection changed) since the previous frame.
    pub changed: bool,
}

impl CameraFrame {
    pub fn look_at(eye: Vec3, target: Vec3, aspect: f32, fov_y_degrees: f32) -> Self {
        let view = Mat4::look_at_rh(eye, target, Vec3::Y);
        Self {
            camera_to_world: view.inverse(),
            inverse_projection: projection(aspect, fov_y_degrees).inverse(),
            changed: true,
        }
    }

    pub fn unchanged(self) -> Self {
        Self {
            changed: false,
            ..self
        }
    }
}

fn projection(aspect: f32, fov_y_degrees: f32) -> Mat4 {
    Mat4::perspective_rh(fov_y_degrees.to_radians(), aspect, 0.1, 1000.0)
}

const MAX_PITCH_DEGREES: f32 = 80.0;

pub struct CameraController {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub fov_y: f32,
    pub speed: f32,
    pub look_sensitivity: f32,

    is_forward_pressed: bool,
    is_backward_pressed: bool,
    is_left_pressed: bool,
    is_right_pressed: bool,
    is_up_pressed: bool,
    is_down_pressed: bool,

    is_left_turn_pressed: bool,
    is_right_turn_pressed: bool,
    is_up_turn_pressed: bool,
    is_down_turn_pressed: bool,

    is_looking: bool,
    mouse_delta: Vec2,
    last_aspect: Option<f32>,
    moved_since_frame: bool,
}

impl Default for CameraController {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 2.0, 10.0))
    }
}

impl CameraController {
    /// Starts at `position` looking down -Z.
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            yaw: -90.0_f32.to_radians(),
            pitch: 0.0,
            fov_y: 60.0,
            speed: 4.0,
            look_sensitivity: 0.003,

            is_forward_pressed: false,
            is_backward_pressed: false,
            is_left_pressed: false,
            is_right_pressed: false,
            is_up_pressed: false,
            is_down_pressed: false,
            is_left_turn_pressed: false,
            is_right_turn_pressed: false,
            is_up_turn_pressed: false,
            is_down_turn_pressed: false,

            is_looking: false,
            mouse_delta: Vec2::ZERO,
            last_aspect: None,
            moved_since_frame: true,
        }
    }

    /// Returns true when the event was consumed.
    pub fn process_events(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput {
                event: key_event, ..
            } => {
                let is_pressed = key_event.state.is_pressed();
                let PhysicalKey::Code(code) = key_event.physical_key else {
                    return false;
                };
                let flag = match code {
                    KeyCode::KeyW => &mut self.is_forward_pressed,
                    KeyCode::KeyS => &mut self.is_backward_pressed,
                    KeyCode::KeyA => &mut self.is_left_pressed,
                    KeyCode::KeyD => &mut self.is_right_pressed,
                    KeyCode::Space => &mut self.is_up_pressed,
                    KeyCode::ShiftLeft => &mut self.is_down_pressed,
                    KeyCode::ArrowLeft => &mut self.is_left_turn_pressed,
                    KeyCode::ArrowRight => &mut self.is_right_turn_pressed,
                    KeyCode::ArrowUp => &mut self.is_up_turn_pressed,
                    KeyCode::ArrowDown => &mut self.is_down_turn_pressed,
                    _ => return false,
                };
                *flag = is_pressed;
                true
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Right,
                ..
            } => {
                self.is_looking = *state == ElementState::Pressed;
                true
            }
            _ => false,
        }
    }

    /// Raw mouse motion; applied as look rotation while the right button is held.
    pub fn process_mouse_motion(&mut self, dx: f64, dy: f64) {
        if self.is_looking {
            self.mouse_delta += Vec2::new(dx as f32, dy as f32);
        }
    }

    fn forward(&self) -> Vec3 {
        let (sin_y, cos_y) = self.yaw.sin_cos();
        let (sin_p, cos_p) = self.pitch.sin_cos();
        Vec3::new(cos_p * cos_y, sin_p, cos_p * sin_y).normalize()
    }

    /// Applies held keys and pending mouse motion. Returns whether the camera moved.
    pub fn update_camera(&mut self, dt: std::time::Duration) -> bool {
        let dt_secs = dt.as_secs_f32();
        let speed = self.speed * dt_secs;
        let rotate_speed = 1.5 * dt_secs;

        let mut moved = false;

        let mut turn = self.mouse_delta * self.look_sensitivity;
        turn.y = -turn.y;
        self.mouse_delta = Vec2::ZERO;
        if self.is_right_turn_pressed {
            turn.x += rotate_speed;
        }
        if self.is_left_turn_pressed {
            turn.x -= rotate_speed;
        }
        if self.is_up_turn_pressed {
            turn.y += rotate_speed;
        }
        if self.is_down_turn_pressed {
            turn.y -= rotate_speed;
        }
        if turn != Vec2::ZERO {
            let max_pitch = MAX_PITCH_DEGREES.to_radians();
            let pitch = (self.pitch + turn.y).clamp(-max_pitch, max_pitch);
            if turn.x != 0.0 || pitch != self.pitch {
                moved = true;
            }
            self.yaw += turn.x;
            self.pitch = pitch;
        }

        let forward = self.forward();
        let right = forward.cross(Vec3::Y).normalize();
        let mut step = Vec3::ZERO;
        if self.is_forward_pressed {
            step += forward;
        }
        if self.is_backward_pressed {
            step -= forward;
        }
        if self.is_right_pressed {
            step += right;
        }
        if self.is_left_pressed {
            step -= right;
        }
        if self.is_up_pressed {
            step += Vec3::Y;
        }
        if self.is_down_pressed {
            step -= Vec3::Y;
        }
        if step != Vec3::ZERO {
            self.position += step * speed;
            moved = true;
        }

        self.moved_since_frame |= moved;
        moved
    }

    /// Matrices for the current pose. `changed` covers movement and aspect changes since the
    /// previous call.
    pub fn frame(&mut self, aspect: f32) -> CameraFrame {
        let aspect_changed = self.last_aspect != Some(aspect);
        self.last_aspect = Some(aspect);
        let view = Mat4::look_at_rh(self.position, self.position + self.forward(), Vec3::Y);
        let frame = CameraFrame {
            camera_to_world: view.inverse(),
            inverse_projection: projection(aspect, self.fov_y).inverse(),
            changed: self.moved_since_frame || aspect_changed,
        };
        self.moved_since_frame = false;
        frame
    }
}
