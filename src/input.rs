use glam::Vec2;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Identifier for a physical keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
}

/// Friendly names for the non-character keys the runtime routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedKey {
    Space,
    Enter,
    Escape,
}

/// Game-level meaning of a bound key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Forward,
    Back,
    Left,
    Right,
    Jump,
    Punch,
    Interact,
    Dance,
}

/// Fixed key-to-control table (`w a s d space x y n`).
#[derive(Debug, Clone)]
pub struct Bindings {
    entries: Vec<(KeyCode, Control)>,
}

impl Default for Bindings {
    fn default() -> Self {
        Self {
            entries: vec![
                (KeyCode::Character('W'), Control::Forward),
                (KeyCode::Character('S'), Control::Back),
                (KeyCode::Character('A'), Control::Left),
                (KeyCode::Character('D'), Control::Right),
                (KeyCode::Named(NamedKey::Space), Control::Jump),
                (KeyCode::Character('X'), Control::Punch),
                (KeyCode::Character('Y'), Control::Interact),
                (KeyCode::Character('N'), Control::Dance),
            ],
        }
    }
}

impl Bindings {
    pub fn control_for(&self, key: KeyCode) -> Option<Control> {
        self.entries
            .iter()
            .find(|(bound, _)| *bound == key)
            .map(|(_, control)| *control)
    }

    pub fn key_for(&self, control: Control) -> Option<KeyCode> {
        self.entries
            .iter()
            .find(|(_, bound)| *bound == control)
            .map(|(key, _)| *key)
    }
}

/// Thread-safe input snapshot fed by the window event loop and read once per
/// frame by the simulation.
///
/// Held state answers "is this key down right now"; the press queue records
/// the falling edge of each key exactly once (platform auto-repeat is
/// swallowed) and is drained by the frame update to fire one-shot actions.
#[derive(Debug, Default)]
pub struct InputState {
    held: RwLock<HashSet<KeyCode>>,
    pressed: Mutex<Vec<KeyCode>>,
    clicks: Mutex<Vec<Vec2>>,
    cursor: RwLock<Vec2>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_key_down(&self, key: KeyCode) {
        let newly = self.held.write().insert(key);
        if newly {
            self.pressed.lock().push(key);
        }
    }

    pub fn set_key_up(&self, key: KeyCode) {
        self.held.write().remove(&key);
    }

    pub fn set_cursor(&self, position: Vec2) {
        *self.cursor.write() = position;
    }

    pub fn cursor(&self) -> Vec2 {
        *self.cursor.read()
    }

    /// Records a click at the current cursor position.
    pub fn push_click(&self) {
        let at = self.cursor();
        self.clicks.lock().push(at);
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.held.read().contains(&key)
    }

    pub fn is_control_down(&self, bindings: &Bindings, control: Control) -> bool {
        bindings
            .key_for(control)
            .map(|key| self.is_key_down(key))
            .unwrap_or(false)
    }

    /// Takes the presses accumulated since the previous frame.
    pub fn drain_pressed(&self) -> Vec<KeyCode> {
        std::mem::take(&mut *self.pressed.lock())
    }

    /// Takes the clicks accumulated since the previous frame.
    pub fn drain_clicks(&self) -> Vec<Vec2> {
        std::mem::take(&mut *self.clicks.lock())
    }
}
