//! Mouse events and button-byte decoding shared by the X10, urxvt and SGR
//! encodings.

use crate::key::MODIFIER_NAMES;
use crossterm::event::{KeyModifiers, MouseButton, MouseEventKind};
use std::fmt;

/// A decoded mouse action. Coordinates are zero-based cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MouseEvent {
    pub kind: MouseEventKind,
    pub column: u16,
    pub row: u16,
    pub modifiers: KeyModifiers,
}

impl MouseEvent {
    /// The button involved, if the action has one.
    pub fn button(&self) -> Option<MouseButton> {
        match self.kind {
            MouseEventKind::Down(b) | MouseEventKind::Up(b) | MouseEventKind::Drag(b) => Some(b),
            _ => None,
        }
    }

    pub fn is_wheel(&self) -> bool {
        matches!(
            self.kind,
            MouseEventKind::ScrollUp
                | MouseEventKind::ScrollDown
                | MouseEventKind::ScrollLeft
                | MouseEventKind::ScrollRight
        )
    }
}

impl fmt::Display for MouseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (flag, name) in MODIFIER_NAMES {
            if self.modifiers.contains(flag) {
                write!(f, "{name}+")?;
            }
        }
        match self.kind {
            MouseEventKind::Down(b) => f.write_str(button_name(b)),
            MouseEventKind::Up(b) => write!(f, "{} release", button_name(b)),
            MouseEventKind::Drag(b) => write!(f, "{} drag", button_name(b)),
            MouseEventKind::Moved => f.write_str("motion"),
            MouseEventKind::ScrollUp => f.write_str("wheelup"),
            MouseEventKind::ScrollDown => f.write_str("wheeldown"),
            MouseEventKind::ScrollLeft => f.write_str("wheelleft"),
            MouseEventKind::ScrollRight => f.write_str("wheelright"),
        }
    }
}

fn button_name(button: MouseButton) -> &'static str {
    match button {
        MouseButton::Left => "left",
        MouseButton::Right => "right",
        MouseButton::Middle => "middle",
    }
}

const BIT_SHIFT: u32 = 0b0000_0100;
const BIT_ALT: u32 = 0b0000_1000;
const BIT_CTRL: u32 = 0b0001_0000;
const BIT_MOTION: u32 = 0b0010_0000;
const BIT_WHEEL: u32 = 0b0100_0000;
const BIT_EXTRA: u32 = 0b1000_0000;
const BUTTON_MASK: u32 = 0b0000_0011;

/// Decode the button byte common to every mouse encoding.
///
/// `release` is set by encodings that signal release out of band (SGR's
/// lower-case `m`). The legacy encodings report release as button 3 and do
/// not say which button went up; those decode as a left release.
pub(crate) fn decode(code: u32, release: bool, column: u16, row: u16) -> MouseEvent {
    let mut modifiers = KeyModifiers::NONE;
    if code & BIT_SHIFT != 0 {
        modifiers |= KeyModifiers::SHIFT;
    }
    if code & BIT_ALT != 0 {
        modifiers |= KeyModifiers::ALT;
    }
    if code & BIT_CTRL != 0 {
        modifiers |= KeyModifiers::CONTROL;
    }

    let low = code & BUTTON_MASK;
    let motion = code & BIT_MOTION != 0;

    let kind = if code & BIT_EXTRA != 0 {
        // Buttons 8-11 (back/forward) have no crossterm counterpart.
        if release {
            MouseEventKind::Up(MouseButton::Left)
        } else {
            MouseEventKind::Moved
        }
    } else if code & BIT_WHEEL != 0 {
        match low {
            0 => MouseEventKind::ScrollUp,
            1 => MouseEventKind::ScrollDown,
            2 => MouseEventKind::ScrollLeft,
            _ => MouseEventKind::ScrollRight,
        }
    } else {
        let button = match low {
            0 => Some(MouseButton::Left),
            1 => Some(MouseButton::Middle),
            2 => Some(MouseButton::Right),
            _ => None,
        };
        match (button, motion, release) {
            (Some(b), _, true) => MouseEventKind::Up(b),
            (Some(b), true, false) => MouseEventKind::Drag(b),
            (Some(b), false, false) => MouseEventKind::Down(b),
            (None, true, _) => MouseEventKind::Moved,
            (None, false, _) => MouseEventKind::Up(MouseButton::Left),
        }
    };

    MouseEvent {
        kind,
        column,
        row,
        modifiers,
    }
}
