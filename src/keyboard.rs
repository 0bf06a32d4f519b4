use std::collections::HashSet;

/// Keyboard and joystick matrix as seen through the 9901.
///
/// A key sits at a (column, line) crossing: the column is driven through
/// CRU bits 18-20 and the line is read back on CRU inputs 3-10. Columns 6
/// and 7 are the two joysticks. Alpha lock has its own select (CRU bit 21)
/// and shares input line 7.
#[derive(Debug, Clone)]
pub struct Keyboard {
    pressed: HashSet<String>,
    alpha_lock: bool,
    mappings: Vec<Mapping>,
}

impl Keyboard {
    pub fn new() -> Self {
        Keyboard::default()
    }

    /// `key` is a DOM `KeyboardEvent.code` value such as `"KeyA"`.
    pub fn key_down(&mut self, key: &str) {
        if key == "CapsLock" {
            self.alpha_lock = !self.alpha_lock;
            tracing::trace!("[KBD] Alpha lock {}", if self.alpha_lock { "down" } else { "up" });
            return;
        }
        if self.mappings.iter().any(|m| m.key == key) {
            self.pressed.insert(key.to_string());
        }
    }

    pub fn key_up(&mut self, key: &str) {
        self.pressed.remove(key);
    }

    pub fn release_all(&mut self) {
        self.pressed.clear();
    }

    pub fn is_key_down(&self, column: u8, line: u8) -> bool {
        self.mappings
            .iter()
            .any(|m| m.column == column && m.line == line && self.pressed.contains(&m.key))
    }

    pub fn is_alpha_lock_down(&self) -> bool {
        self.alpha_lock
    }
}

impl Default for Keyboard {
    fn default() -> Self {
        Keyboard {
            pressed: HashSet::new(),
            alpha_lock: false,
            mappings: default_mapping().to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Mapping {
    key: String,
    column: u8,
    line: u8,
}

impl Mapping {
    pub fn new(key: &str, column: u8, line: u8) -> Self {
        Mapping {
            key: key.to_string(),
            column,
            line,
        }
    }
}

fn default_mapping() -> [Mapping; 54] {
    [
        Mapping::new("Equal", 0, 0),
        Mapping::new("Space", 0, 1),
        Mapping::new("Enter", 0, 2),
        Mapping::new("AltLeft", 0, 4),
        Mapping::new("AltRight", 0, 4),
        Mapping::new("ShiftLeft", 0, 5),
        Mapping::new("ShiftRight", 0, 5),
        Mapping::new("ControlLeft", 0, 6),
        Mapping::new("ControlRight", 0, 6),
        Mapping::new("Period", 1, 0),
        Mapping::new("KeyL", 1, 1),
        Mapping::new("KeyO", 1, 2),
        Mapping::new("Digit9", 1, 3),
        Mapping::new("Digit2", 1, 4),
        Mapping::new("KeyS", 1, 5),
        Mapping::new("KeyW", 1, 6),
        Mapping::new("KeyX", 1, 7),
        Mapping::new("Comma", 2, 0),
        Mapping::new("KeyK", 2, 1),
        Mapping::new("KeyI", 2, 2),
        Mapping::new("Digit8", 2, 3),
        Mapping::new("Digit3", 2, 4),
        Mapping::new("KeyD", 2, 5),
        Mapping::new("KeyE", 2, 6),
        Mapping::new("KeyC", 2, 7),
        Mapping::new("KeyM", 3, 0),
        Mapping::new("KeyJ", 3, 1),
        Mapping::new("KeyU", 3, 2),
        Mapping::new("Digit7", 3, 3),
        Mapping::new("Digit4", 3, 4),
        Mapping::new("KeyF", 3, 5),
        Mapping::new("KeyR", 3, 6),
        Mapping::new("KeyV", 3, 7),
        Mapping::new("KeyN", 4, 0),
        Mapping::new("KeyH", 4, 1),
        Mapping::new("KeyY", 4, 2),
        Mapping::new("Digit6", 4, 3),
        Mapping::new("Digit5", 4, 4),
        Mapping::new("KeyG", 4, 5),
        Mapping::new("KeyT", 4, 6),
        Mapping::new("KeyB", 4, 7),
        Mapping::new("Slash", 5, 0),
        Mapping::new("Semicolon", 5, 1),
        Mapping::new("KeyP", 5, 2),
        Mapping::new("Digit0", 5, 3),
        Mapping::new("Digit1", 5, 4),
        Mapping::new("KeyA", 5, 5),
        Mapping::new("KeyQ", 5, 6),
        Mapping::new("KeyZ", 5, 7),
        Mapping::new("Tab", 6, 0),
        Mapping::new("ArrowLeft", 6, 1),
        Mapping::new("ArrowRight", 6, 2),
        Mapping::new("ArrowDown", 6, 3),
        Mapping::new("ArrowUp", 6, 4),
    ]
}
