use crate::color::{ColorProfile, Rgb};
use crate::decoder::InputEvent;
use crate::key::KeyEvent;
use crate::mouse::MouseEvent;
use crossterm::event::KeyboardEnhancementFlags;
use std::time::Instant;

/// Everything that can reach [`Model::update`](crate::Model::update).
///
/// Terminal input, timer ticks, command results and runtime notifications all
/// arrive as an `Event`.  Application-defined messages travel in
/// [`Event::App`]; the remaining variants are produced by the runtime itself.
///
/// # Example
///
/// ```rust,ignore
/// fn update(&mut self, event: Event<Msg>) -> Command<Msg> {
///     match event {
///         Event::Key(key) if key.matches("ctrl+c") => Command::quit(),
///         Event::Key(key) if key.matches("up") => { self.count += 1; Command::none() }
///         Event::Resize { columns, rows } => { self.size = (columns, rows); Command::none() }
///         Event::App(Msg::Loaded(data)) => { self.data = data; Command::none() }
///         _ => Command::none(),
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Event<M> {
    /// A key press, repeat, or release (see [`KeyEvent::kind`]).
    Key(KeyEvent),
    /// A mouse click, release, drag, motion, or wheel action.
    Mouse(MouseEvent),
    /// Bracketed-paste content, delivered whole.
    Paste(String),
    /// The terminal was resized.
    Resize { columns: u16, rows: u16 },
    /// The terminal window gained focus.
    Focus,
    /// The terminal window lost focus.
    Blur,
    /// The terminal answered a capability query, or a query went unanswered.
    Capability(CapabilityEvent),
    /// A clock tick from a tick subscription.
    Tick(Instant),
    /// Request to stop the program.  Seen by the filter, never by `update`.
    Quit,
    /// The process was resumed after [`Command::suspend`](crate::Command::suspend).
    Resume,
    /// A command panicked or returned an error.
    CommandFailed(CommandError),
    /// An application-defined message.
    App(M),
}

impl<M> Event<M> {
    /// Transform the application payload, leaving runtime variants untouched.
    pub fn map<N>(self, f: impl FnOnce(M) -> N) -> Event<N> {
        match self {
            Event::Key(k) => Event::Key(k),
            Event::Mouse(m) => Event::Mouse(m),
            Event::Paste(s) => Event::Paste(s),
            Event::Resize { columns, rows } => Event::Resize { columns, rows },
            Event::Focus => Event::Focus,
            Event::Blur => Event::Blur,
            Event::Capability(c) => Event::Capability(c),
            Event::Tick(t) => Event::Tick(t),
            Event::Quit => Event::Quit,
            Event::Resume => Event::Resume,
            Event::CommandFailed(e) => Event::CommandFailed(e),
            Event::App(m) => Event::App(f(m)),
        }
    }

    /// The key event, if this is one.
    pub fn as_key(&self) -> Option<&KeyEvent> {
        match self {
            Event::Key(k) => Some(k),
            _ => None,
        }
    }

    /// Whether this is a key press (or repeat) matching `binding`.
    pub fn is_key(&self, binding: &str) -> bool {
        self.as_key()
            .is_some_and(|k| !k.is_release() && k.matches(binding))
    }

    pub fn is_quit(&self) -> bool {
        matches!(self, Event::Quit)
    }
}

impl<M> From<InputEvent> for Event<M> {
    fn from(input: InputEvent) -> Self {
        match input {
            InputEvent::Key(k) => Event::Key(k),
            InputEvent::Mouse(m) => Event::Mouse(m),
            InputEvent::Paste(s) => Event::Paste(s),
            InputEvent::Focus => Event::Focus,
            InputEvent::Blur => Event::Blur,
            InputEvent::Resize { columns, rows } => Event::Resize { columns, rows },
            InputEvent::Capability(c) => Event::Capability(c),
        }
    }
}

/// Terminal replies to capability queries.
#[derive(Debug, Clone, PartialEq)]
pub enum CapabilityEvent {
    /// Colour profile inferred from the environment at startup.
    ColorProfile(ColorProfile),
    /// OSC 11 reply.
    BackgroundColor(Rgb),
    /// OSC 10 reply.
    ForegroundColor(Rgb),
    /// OSC 12 reply.
    CursorColor(Rgb),
    /// Keyboard enhancements the terminal reports as active (kitty flags, or
    /// disambiguation when modifyOtherKeys is on).
    KeyboardEnhancements(KeyboardEnhancementFlags),
    /// Cursor position report, zero-based.
    CursorPosition { column: u16, row: u16 },
    /// Primary device attributes.
    DeviceAttributes(Vec<u32>),
    /// DECRPM reply: `setting` is 0 (unknown), 1 (set), 2 (reset),
    /// 3 (permanently set) or 4 (permanently reset).
    ModeReport { mode: u32, setting: u32 },
    /// XTVERSION reply.
    TerminalVersion(String),
    /// Window title report.
    WindowTitle(String),
    /// OSC 52 reply: the clipboard contents, decoded.
    Clipboard(String),
    /// The query got no answer in time; treat the feature as unsupported.
    Unsupported(Query),
}

/// Capability queries the runtime can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Query {
    BackgroundColor,
    ForegroundColor,
    KeyboardEnhancements,
    CursorPosition,
    WindowSize,
    TerminalVersion,
    /// DECRQM for synchronized output (mode 2026).
    SynchronizedOutput,
}

impl Query {
    /// The control sequence that asks the terminal.
    pub fn sequence(self) -> &'static str {
        match self {
            Query::BackgroundColor => "\x1b]11;?\x07",
            Query::ForegroundColor => "\x1b]10;?\x07",
            Query::KeyboardEnhancements => "\x1b[?u",
            Query::CursorPosition => "\x1b[6n",
            Query::WindowSize => "\x1b[18t",
            Query::TerminalVersion => "\x1b[>0q",
            Query::SynchronizedOutput => "\x1b[?2026$p",
        }
    }
}

/// A failure inside a scheduled command, recovered at the task boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// The command's future panicked.
    #[error("command panicked: {0}")]
    Panicked(String),
    /// The command returned an error.
    #[error("command failed: {0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyModifiers};

    #[test]
    fn map_only_touches_app() {
        let ev: Event<i32> = Event::App(2);
        assert_eq!(ev.map(|n| n * 10), Event::App(20));

        let ev: Event<i32> = Event::Resize { columns: 80, rows: 24 };
        assert_eq!(
            ev.map(|n| n.to_string()),
            Event::Resize { columns: 80, rows: 24 }
        );
    }

    #[test]
    fn is_key_ignores_release() {
        let press: Event<()> =
            Event::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(press.is_key("ctrl+c"));

        let release: Event<()> = Event::Key(
            KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)
                .with_kind(crossterm::event::KeyEventKind::Release),
        );
        assert!(!release.is_key("ctrl+c"));
    }

    #[test]
    fn command_error_display() {
        let err = CommandError::Failed("timeout".into());
        assert_eq!(err.to_string(), "command failed: timeout");
    }
}
