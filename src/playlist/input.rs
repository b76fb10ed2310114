/// Keys the scheduler reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCode {
    Left,
    Right,
    PageUp,
    PageDown,
    Home,
    Space,
    Other(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    KeyPressed(KeyCode),
}

impl KeyCode {
    /// Map a single-character command from a terminal
    pub fn from_char(c: char) -> Self {
        match c {
            'n' | 'l' => KeyCode::Right,
            'p' | 'h' => KeyCode::Left,
            ' ' => KeyCode::Space,
            '0' => KeyCode::Home,
            other => KeyCode::Other(other),
        }
    }
}
