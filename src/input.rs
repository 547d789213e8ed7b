use std::{
    cell::{Cell, RefCell},
    collections::HashSet,
    rc::Rc,
};

use glam::DVec2;
use winit::{
    event::{ElementState, MouseButton, WindowEvent},
    keyboard::{KeyCode, PhysicalKey},
};

/// Key and mouse button codes visible to scripts. The numbering follows the
/// common GLFW layout so existing scripts keep working.
pub mod codes {
    pub const KEY_SPACE: i32 = 32;
    pub const KEY_A: i32 = 65;
    pub const KEY_D: i32 = 68;
    pub const KEY_E: i32 = 69;
    pub const KEY_Q: i32 = 81;
    pub const KEY_S: i32 = 83;
    pub const KEY_W: i32 = 87;
    pub const KEY_ESCAPE: i32 = 256;
    pub const KEY_RIGHT: i32 = 262;
    pub const KEY_LEFT: i32 = 263;
    pub const KEY_DOWN: i32 = 264;
    pub const KEY_UP: i32 = 265;
    pub const KEY_LEFT_SHIFT: i32 = 340;

    pub const MOUSE_LEFT: i32 = 0;
    pub const MOUSE_RIGHT: i32 = 1;
    pub const MOUSE_MIDDLE: i32 = 2;

    /// Names registered as zero-argument script functions.
    pub const NAMED: &[(&str, i32)] = &[
        ("KEY_UP", KEY_UP),
        ("KEY_DOWN", KEY_DOWN),
        ("KEY_LEFT", KEY_LEFT),
        ("KEY_RIGHT", KEY_RIGHT),
        ("KEY_W", KEY_W),
        ("KEY_A", KEY_A),
        ("KEY_S", KEY_S),
        ("KEY_D", KEY_D),
        ("KEY_Q", KEY_Q),
        ("KEY_E", KEY_E),
        ("KEY_SPACE", KEY_SPACE),
        ("KEY_ESCAPE", KEY_ESCAPE),
        ("KEY_LEFT_SHIFT", KEY_LEFT_SHIFT),
        ("MOUSE_LEFT", MOUSE_LEFT),
        ("MOUSE_RIGHT", MOUSE_RIGHT),
        ("MOUSE_MIDDLE", MOUSE_MIDDLE),
    ];
}

/// Read side of the input state, as seen by scripts.
pub trait InputSurface {
    fn is_key_pressed(&self, code: i32) -> bool;
    fn is_mouse_button_pressed(&self, code: i32) -> bool;
    fn mouse_position(&self) -> DVec2;
    fn mouse_delta(&self) -> DVec2;
}

pub type InputHandle = Rc<dyn InputSurface>;

/// Input state fed from window events. Shared between the window and every
/// script host through an [`InputHandle`].
#[derive(Default)]
pub struct InputState {
    keys: RefCell<HashSet<i32>>,
    buttons: RefCell<HashSet<i32>>,
    cursor: Cell<DVec2>,
    last_cursor: Cell<Option<DVec2>>,
    delta: Cell<DVec2>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_key(&self, code: i32, pressed: bool) {
        let mut keys = self.keys.borrow_mut();
        if pressed {
            keys.insert(code);
        } else {
            keys.remove(&code);
        }
    }

    pub fn set_mouse_button(&self, code: i32, pressed: bool) {
        let mut buttons = self.buttons.borrow_mut();
        if pressed {
            buttons.insert(code);
        } else {
            buttons.remove(&code);
        }
    }

    pub fn set_cursor_position(&self, position: DVec2) {
        self.cursor.set(position);
    }

    /// Computes the mouse delta for the frame about to run. Y grows upwards
    /// in the delta, unlike window coordinates.
    pub fn begin_frame(&self) {
        let current = self.cursor.get();
        let last = self.last_cursor.get().unwrap_or(current);
        self.delta
            .set(DVec2::new(current.x - last.x, last.y - current.y));
        self.last_cursor.set(Some(current));
    }

    pub fn handle_window_event(&self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    if let Some(code) = key_code(key) {
                        self.set_key(code, event.state == ElementState::Pressed);
                    }
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if let Some(code) = mouse_button_code(*button) {
                    self.set_mouse_button(code, *state == ElementState::Pressed);
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.set_cursor_position(DVec2::new(position.x, position.y));
            }
            WindowEvent::Focused(false) => {
                self.keys.borrow_mut().clear();
                self.buttons.borrow_mut().clear();
            }
            _ => (),
        }
    }
}

impl InputSurface for InputState {
    fn is_key_pressed(&self, code: i32) -> bool {
        self.keys.borrow().contains(&code)
    }

    fn is_mouse_button_pressed(&self, code: i32) -> bool {
        self.buttons.borrow().contains(&code)
    }

    fn mouse_position(&self) -> DVec2 {
        self.cursor.get()
    }

    fn mouse_delta(&self) -> DVec2 {
        self.delta.get()
    }
}

fn key_code(key: KeyCode) -> Option<i32> {
    use codes::*;

    let code = match key {
        KeyCode::Space => KEY_SPACE,
        KeyCode::Escape => KEY_ESCAPE,
        KeyCode::ArrowUp => KEY_UP,
        KeyCode::ArrowDown => KEY_DOWN,
        KeyCode::ArrowLeft => KEY_LEFT,
        KeyCode::ArrowRight => KEY_RIGHT,
        KeyCode::ShiftLeft => KEY_LEFT_SHIFT,
        KeyCode::Enter => 257,
        KeyCode::Tab => 258,
        KeyCode::Backspace => 259,
        KeyCode::ControlLeft => 341,
        KeyCode::AltLeft => 342,
        KeyCode::ShiftRight => 344,
        KeyCode::ControlRight => 345,
        KeyCode::Digit0 => 48,
        KeyCode::Digit1 => 49,
        KeyCode::Digit2 => 50,
        KeyCode::Digit3 => 51,
        KeyCode::Digit4 => 52,
        KeyCode::Digit5 => 53,
        KeyCode::Digit6 => 54,
        KeyCode::Digit7 => 55,
        KeyCode::Digit8 => 56,
        KeyCode::Digit9 => 57,
        KeyCode::KeyA => KEY_A,
        KeyCode::KeyB => 66,
        KeyCode::KeyC => 67,
        KeyCode::KeyD => KEY_D,
        KeyCode::KeyE => KEY_E,
        KeyCode::KeyF => 70,
        KeyCode::KeyG => 71,
        KeyCode::KeyH => 72,
        KeyCode::KeyI => 73,
        KeyCode::KeyJ => 74,
        KeyCode::KeyK => 75,
        KeyCode::KeyL => 76,
        KeyCode::KeyM => 77,
        KeyCode::KeyN => 78,
        KeyCode::KeyO => 79,
        KeyCode::KeyP => 80,
        KeyCode::KeyQ => KEY_Q,
        KeyCode::KeyR => 82,
        KeyCode::KeyS => KEY_S,
        KeyCode::KeyT => 84,
        KeyCode::KeyU => 85,
        KeyCode::KeyV => 86,
        KeyCode::KeyW => KEY_W,
        KeyCode::KeyX => 88,
        KeyCode::KeyY => 89,
        KeyCode::KeyZ => 90,
        _ => return None,
    };

    Some(code)
}

fn mouse_button_code(button: MouseButton) -> Option<i32> {
    match button {
        MouseButton::Left => Some(codes::MOUSE_LEFT),
        MouseButton::Right => Some(codes::MOUSE_RIGHT),
        MouseButton::Middle => Some(codes::MOUSE_MIDDLE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mouse_delta_inverts_y() {
        let input = InputState::new();
        input.set_cursor_position(DVec2::new(10.0, 10.0));
        input.begin_frame();
        assert_eq!(input.mouse_delta(), DVec2::ZERO);

        input.set_cursor_position(DVec2::new(15.0, 4.0));
        input.begin_frame();
        assert_eq!(input.mouse_delta(), DVec2::new(5.0, 6.0));

        input.begin_frame();
        assert_eq!(input.mouse_delta(), DVec2::ZERO);
    }

    #[test]
    fn keys_and_buttons_track_state() {
        let input = InputState::new();
        input.set_key(codes::KEY_W, true);
        input.set_mouse_button(codes::MOUSE_RIGHT, true);
        assert!(input.is_key_pressed(codes::KEY_W));
        assert!(!input.is_key_pressed(codes::KEY_S));
        assert!(input.is_mouse_button_pressed(codes::MOUSE_RIGHT));

        input.set_key(codes::KEY_W, false);
        assert!(!input.is_key_pressed(codes::KEY_W));
    }

    #[test]
    fn letter_keys_map_to_ascii() {
        assert_eq!(key_code(KeyCode::KeyW), Some('W' as i32));
        assert_eq!(key_code(KeyCode::KeyZ), Some('Z' as i32));
        assert_eq!(key_code(KeyCode::F24), None);
    }
}
