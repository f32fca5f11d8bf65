// SPDX-License-Identifier: CEPL-1.0
use std::collections::HashSet;

use winit::{
    event::{ElementState, KeyEvent},
    keyboard::{KeyCode, PhysicalKey},
};

/// Keys currently held, by physical position.
#[derive(Debug, Default)]
pub struct InputState {
    pressed: HashSet<KeyCode>,
}

impl InputState {
    pub fn handle_key(&mut self, event: &KeyEvent) {
        if let PhysicalKey::Code(code) = event.physical_key {
            self.set(code, event.state == ElementState::Pressed);
        }
    }

    pub fn set(&mut self, key: KeyCode, pressed: bool) {
        if pressed {
            self.pressed.insert(key);
        } else {
            self.pressed.remove(&key);
        }
    }

    pub fn is_pressed(&self, key: KeyCode) -> bool {
        self.pressed.contains(&key)
    }

    /// Focus loss swallows release events, so forget everything.
    pub fn clear(&mut self) {
        self.pressed.clear();
    }

    pub fn exit_requested(&self) -> bool {
        self.is_pressed(KeyCode::Escape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_and_release() {
        let mut input = InputState::default();
        input.set(KeyCode::KeyW, true);
        assert!(input.is_pressed(KeyCode::KeyW));
        input.set(KeyCode::KeyW, false);
        assert!(!input.is_pressed(KeyCode::KeyW));
    }

    #[test]
    fn escape_requests_exit() {
        let mut input = InputState::default();
        assert!(!input.exit_requested());
        input.set(KeyCode::Escape, true);
        assert!(input.exit_requested());
        input.clear();
        assert!(!input.exit_requested());
    }
}
