//! Keyboard events and their canonical string form.
//!
//! Key identity reuses crossterm's [`KeyCode`], [`KeyModifiers`] and
//! [`KeyEventKind`] so that code written against crossterm or ratatui can
//! match on tapioca key events without a translation layer.  What crossterm
//! does not carry is the literal text a key produced, which is what lets an
//! application tell `ctrl+i` from `tab` once the terminal speaks the kitty
//! keyboard protocol; [`KeyEvent::text`] holds it separately from the key.

use crossterm::event::{KeyCode, KeyEventKind, KeyModifiers, MediaKeyCode, ModifierKeyCode};
use std::borrow::Cow;
use std::fmt;

/// A decoded key press, repeat, or release.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyEvent {
    /// The key identity. Letters are always lower case; shift lives in
    /// [`modifiers`](KeyEvent::modifiers).
    pub code: KeyCode,
    /// Modifier bitmask.
    pub modifiers: KeyModifiers,
    /// Press, repeat, or release.
    pub kind: KeyEventKind,
    /// Literal text produced by the key. Empty for chords and non-printing keys.
    pub text: String,
    /// The shifted form of the key, when the terminal reports it.
    pub shifted: Option<char>,
    /// The key in the standard PC-101 layout, when the terminal reports it.
    pub base: Option<char>,
}

impl KeyEvent {
    /// Create a key press. Text is derived from the code for printable keys
    /// that carry no modifier other than shift.
    pub fn new(code: KeyCode, modifiers: KeyModifiers) -> Self {
        let text = match code {
            KeyCode::Char(c) if modifiers.difference(KeyModifiers::SHIFT).is_empty() => {
                if modifiers.contains(KeyModifiers::SHIFT) {
                    c.to_uppercase().collect()
                } else {
                    c.to_string()
                }
            }
            _ => String::new(),
        };
        Self {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            text,
            shifted: None,
            base: None,
        }
    }

    /// Shorthand for a printable character with no modifiers.
    pub fn char(c: char) -> Self {
        Self::new(KeyCode::Char(c), KeyModifiers::NONE)
    }

    /// Replace the literal text.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Replace the event kind.
    pub fn with_kind(mut self, kind: KeyEventKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn is_press(&self) -> bool {
        self.kind == KeyEventKind::Press
    }

    pub fn is_repeat(&self) -> bool {
        self.kind == KeyEventKind::Repeat
    }

    pub fn is_release(&self) -> bool {
        self.kind == KeyEventKind::Release
    }

    /// The canonical keystroke, e.g. `"ctrl+shift+a"`, `"alt+enter"`, `"f5"`.
    ///
    /// Modifiers always appear in the order `ctrl`, `alt`, `shift`, `meta`,
    /// `hyper`, `super`.
    pub fn keystroke(&self) -> String {
        let mut modifiers = self.modifiers;
        if self.code == KeyCode::BackTab {
            modifiers |= KeyModifiers::SHIFT;
        }

        let mut out = String::new();
        for (flag, name) in MODIFIER_NAMES {
            if modifiers.contains(flag) {
                out.push_str(name);
                out.push('+');
            }
        }
        out.push_str(&key_name(self.code));
        out
    }

    /// Whether this key matches a binding written either as a keystroke
    /// (`"shift+a"`) or as the text it produces (`"A"`).
    pub fn matches(&self, binding: &str) -> bool {
        self.keystroke() == binding || self.to_string() == binding
    }
}

impl From<KeyCode> for KeyEvent {
    fn from(code: KeyCode) -> Self {
        KeyEvent::new(code, KeyModifiers::NONE)
    }
}

impl fmt::Display for KeyEvent {
    /// Printable text when the key produced some (other than a space) with at
    /// most shift held; the keystroke otherwise.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plain = self.modifiers.difference(KeyModifiers::SHIFT).is_empty();
        if plain && !self.text.is_empty() && self.text != " " {
            f.write_str(&self.text)
        } else {
            f.write_str(&self.keystroke())
        }
    }
}

pub(crate) const MODIFIER_NAMES: [(KeyModifiers, &str); 6] = [
    (KeyModifiers::CONTROL, "ctrl"),
    (KeyModifiers::ALT, "alt"),
    (KeyModifiers::SHIFT, "shift"),
    (KeyModifiers::META, "meta"),
    (KeyModifiers::HYPER, "hyper"),
    (KeyModifiers::SUPER, "super"),
];

fn key_name(code: KeyCode) -> Cow<'static, str> {
    let name = match code {
        KeyCode::Char(' ') => "space",
        KeyCode::Char(c) => return Cow::Owned(c.to_lowercase().collect()),
        KeyCode::F(n) => return Cow::Owned(format!("f{n}")),
        KeyCode::Enter => "enter",
        KeyCode::Tab | KeyCode::BackTab => "tab",
        KeyCode::Backspace => "backspace",
        KeyCode::Esc => "esc",
        KeyCode::Up => "up",
        KeyCode::Down => "down",
        KeyCode::Left => "left",
        KeyCode::Right => "right",
        KeyCode::Home => "home",
        KeyCode::End => "end",
        KeyCode::PageUp => "pgup",
        KeyCode::PageDown => "pgdown",
        KeyCode::Insert => "insert",
        KeyCode::Delete => "delete",
        KeyCode::Null => "null",
        KeyCode::CapsLock => "capslock",
        KeyCode::ScrollLock => "scrolllock",
        KeyCode::NumLock => "numlock",
        KeyCode::PrintScreen => "printscreen",
        KeyCode::Pause => "pause",
        KeyCode::Menu => "menu",
        KeyCode::KeypadBegin => "begin",
        KeyCode::Media(media) => media_name(media),
        KeyCode::Modifier(modifier) => modifier_name(modifier),
    };
    Cow::Borrowed(name)
}

fn media_name(code: MediaKeyCode) -> &'static str {
    match code {
        MediaKeyCode::Play => "mediaplay",
        MediaKeyCode::Pause => "mediapause",
        MediaKeyCode::PlayPause => "mediaplaypause",
        MediaKeyCode::Reverse => "mediareverse",
        MediaKeyCode::Stop => "mediastop",
        MediaKeyCode::FastForward => "mediafastforward",
        MediaKeyCode::Rewind => "mediarewind",
        MediaKeyCode::TrackNext => "medianext",
        MediaKeyCode::TrackPrevious => "mediaprev",
        MediaKeyCode::Record => "mediarecord",
        MediaKeyCode::LowerVolume => "volumedown",
        MediaKeyCode::RaiseVolume => "volumeup",
        MediaKeyCode::MuteVolume => "mute",
    }
}

fn modifier_name(code: ModifierKeyCode) -> &'static str {
    match code {
        ModifierKeyCode::LeftShift => "leftshift",
        ModifierKeyCode::LeftControl => "leftctrl",
        ModifierKeyCode::LeftAlt => "leftalt",
        ModifierKeyCode::LeftSuper => "leftsuper",
        ModifierKeyCode::LeftHyper => "lefthyper",
        ModifierKeyCode::LeftMeta => "leftmeta",
        ModifierKeyCode::RightShift => "rightshift",
        ModifierKeyCode::RightControl => "rightctrl",
        ModifierKeyCode::RightAlt => "rightalt",
        ModifierKeyCode::RightSuper => "rightsuper",
        ModifierKeyCode::RightHyper => "righthyper",
        ModifierKeyCode::RightMeta => "rightmeta",
        ModifierKeyCode::IsoLevel3Shift => "isolevel3shift",
        ModifierKeyCode::IsoLevel5Shift => "isolevel5shift",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ctrl_c_keystroke() {
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(key.keystroke(), "ctrl+c");
        assert_eq!(key.to_string(), "ctrl+c");
        assert!(key.text.is_empty());
    }

    #[test]
    fn modifier_order_is_fixed() {
        let key = KeyEvent::new(
            KeyCode::Char('a'),
            KeyModifiers::SHIFT | KeyModifiers::CONTROL | KeyModifiers::ALT,
        );
        assert_eq!(key.keystroke(), "ctrl+alt+shift+a");
    }

    #[test]
    fn shifted_letter_displays_text() {
        let key = KeyEvent::new(KeyCode::Char('a'), KeyModifiers::SHIFT);
        assert_eq!(key.text, "A");
        assert_eq!(key.to_string(), "A");
        assert_eq!(key.keystroke(), "shift+a");
        assert!(key.matches("A"));
        assert!(key.matches("shift+a"));
        assert!(!key.matches("a"));
    }

    #[test]
    fn space_displays_name() {
        let key = KeyEvent::char(' ');
        assert_eq!(key.text, " ");
        assert_eq!(key.to_string(), "space");
    }

    #[test]
    fn backtab_is_shift_tab() {
        let key = KeyEvent::from(KeyCode::BackTab);
        assert_eq!(key.keystroke(), "shift+tab");
    }

    #[test]
    fn named_keys() {
        assert_eq!(KeyEvent::from(KeyCode::PageUp).to_string(), "pgup");
        assert_eq!(KeyEvent::from(KeyCode::F(12)).to_string(), "f12");
        assert_eq!(
            KeyEvent::new(KeyCode::Up, KeyModifiers::ALT).to_string(),
            "alt+up"
        );
        assert_eq!(
            KeyEvent::from(KeyCode::Media(MediaKeyCode::PlayPause)).to_string(),
            "mediaplaypause"
        );
    }

    #[test]
    fn release_keeps_identity() {
        let key = KeyEvent::char('x').with_kind(KeyEventKind::Release);
        assert!(key.is_release());
        assert_eq!(key.to_string(), "x");
    }
}
