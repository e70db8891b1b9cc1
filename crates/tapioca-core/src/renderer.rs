//! Frame renderer.
//!
//! [`Renderer`] turns successive [`Frame`]s into the bytes that update the
//! terminal from what the previous frame left on screen.  It never writes
//! anything itself; the caller hands the bytes to the output writer.
//!
//! Two layouts are supported.  In the alternate screen every row is
//! addressed absolutely.  Inline, the frame occupies a block of rows starting
//! wherever the cursor was when the program started, and all movement is
//! relative to the block; rows are added with `\r\n` so that the terminal
//! scrolls when the block reaches the bottom of the screen.
//!
//! Drawing the same frame twice produces no bytes at all.
//!
//! When the terminal supports synchronized output (mode 2026) every
//! non-empty draw is bracketed by set/reset of that mode so the terminal
//! shows it at once.  Otherwise a visible cursor is hidden while lines are
//! rewritten and shown again afterwards.

use crate::command::{CursorStyle, MouseMode};
use crate::frame::{fit_line, Frame};
use crate::terminal::RESET_MODES;
use crossterm::cursor::{Hide, MoveDown, MoveTo, MoveToColumn, MoveUp, SetCursorStyle, Show};
use crossterm::event::{
    DisableBracketedPaste, DisableFocusChange, EnableBracketedPaste, EnableFocusChange,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen, SetTitle};
use crossterm::QueueableCommand;
use tracing::trace;

pub use crate::frame::DisplayModes;

/// Retained-state frame renderer.
#[derive(Debug)]
pub struct Renderer {
    width: u16,
    height: u16,
    /// Modes used when a frame does not carry its own.
    defaults: DisplayModes,
    default_title: Option<String>,

    /// Modes currently in effect on the terminal.
    modes: DisplayModes,
    title: Option<String>,
    cursor_visible: Option<bool>,
    cursor_style: Option<CursorStyle>,

    /// Lines currently on screen, already fitted to the width.
    lines: Vec<String>,
    /// Rows of the screen the renderer owns (inline) or has touched (alt).
    rows: usize,
    /// Cursor row, relative to the top of the frame.
    row: usize,
    /// Cursor column, when known.
    column: Option<u16>,
    repaint: bool,
    /// Bracket draws with synchronized output.
    synchronized: bool,
    last_frame: Frame,
}

const BEGIN_SYNCHRONIZED: &[u8] = b"\x1b[?2026h";
const END_SYNCHRONIZED: &[u8] = b"\x1b[?2026l";

impl Renderer {
    pub fn new(width: u16, height: u16, defaults: DisplayModes, title: Option<String>) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            defaults,
            default_title: title,
            modes: DisplayModes::default(),
            title: None,
            cursor_visible: None,
            cursor_style: None,
            lines: Vec::new(),
            rows: 0,
            row: 0,
            column: None,
            repaint: false,
            synchronized: false,
            last_frame: Frame::default(),
        }
    }

    pub fn size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    /// Modes applied to frames that do not set their own.
    pub fn defaults(&self) -> DisplayModes {
        self.defaults
    }

    pub fn set_defaults(&mut self, modes: DisplayModes) {
        self.defaults = modes;
    }

    pub fn set_default_title(&mut self, title: impl Into<String>) {
        self.default_title = Some(title.into());
    }

    pub fn is_alt_screen(&self) -> bool {
        self.modes.alt_screen
    }

    /// The most recently drawn frame.
    pub fn last_frame(&self) -> &Frame {
        &self.last_frame
    }

    /// Record a new terminal size. The next draw repaints everything.
    pub fn resize(&mut self, width: u16, height: u16) {
        self.width = width.max(1);
        self.height = height.max(1);
        self.repaint = true;
    }

    /// Use synchronized output for subsequent draws.
    pub fn set_synchronized(&mut self, synchronized: bool) {
        self.synchronized = synchronized;
    }

    pub fn is_synchronized(&self) -> bool {
        self.synchronized
    }

    /// Force the next draw to rewrite every line.
    pub fn request_repaint(&mut self) {
        self.repaint = true;
    }

    /// Produce the bytes that bring the terminal from the previous frame to
    /// `frame`.
    pub fn draw(&mut self, frame: &Frame) -> Vec<u8> {
        let mut buf = Vec::new();
        let modes = frame.modes.unwrap_or(self.defaults);
        self.apply_modes(&mut buf, modes);

        let title = frame.title.as_ref().or(self.default_title.as_ref());
        if let Some(title) = title {
            if self.title.as_ref() != Some(title) {
                buf.queue(SetTitle(title)).ok();
                self.title = Some(title.clone());
            }
        }

        let lines = self.layout(&frame.content);
        let mut updates = Vec::new();

        if self.repaint {
            self.clear_block(&mut updates);
            self.repaint = false;
        }

        for (i, line) in lines.iter().enumerate() {
            if self.lines.get(i) == Some(line) {
                continue;
            }
            self.move_to_row(&mut updates, i);
            self.carriage_return(&mut updates);
            updates.queue(Print(line)).ok();
            let width = crate::frame::line_width(line);
            if width < usize::from(self.width) {
                updates.queue(Clear(ClearType::UntilNewLine)).ok();
                self.column = u16::try_from(width).ok();
            } else {
                // Pending-wrap state: position unknown until the next move.
                self.column = None;
            }
        }

        if lines.len() < self.lines.len() {
            self.move_to_row(&mut updates, lines.len());
            self.carriage_return(&mut updates);
            updates.queue(Clear(ClearType::FromCursorDown)).ok();
        }
        self.lines = lines;

        if !updates.is_empty() && !self.synchronized && self.cursor_visible == Some(true) {
            // place_cursor shows it again if the frame wants it.
            buf.queue(Hide).ok();
            self.cursor_visible = Some(false);
        }
        buf.extend(updates);

        self.place_cursor(&mut buf, frame);
        self.last_frame = frame.clone();

        if buf.is_empty() {
            return buf;
        }
        trace!(bytes = buf.len(), synchronized = self.synchronized, "frame rendered");
        if self.synchronized {
            let mut out = Vec::with_capacity(buf.len() + 16);
            out.extend_from_slice(BEGIN_SYNCHRONIZED);
            out.extend(buf);
            out.extend_from_slice(END_SYNCHRONIZED);
            return out;
        }
        buf
    }

    /// Print `text` above the frame (inline only) and redraw the frame
    /// below it. Ignored in the alternate screen.
    pub fn insert_above(&mut self, text: &str) -> Vec<u8> {
        if self.modes.alt_screen {
            trace!("println ignored in alternate screen");
            return Vec::new();
        }
        let mut buf = Vec::new();
        if self.rows > 0 {
            self.move_to_row(&mut buf, 0);
            self.carriage_return(&mut buf);
            buf.queue(Clear(ClearType::FromCursorDown)).ok();
        }
        for line in text.split('\n') {
            buf.queue(Print(line.trim_end_matches('\r'))).ok();
            buf.extend_from_slice(b"\r\n");
        }
        self.reset_block();
        let frame = self.last_frame.clone();
        buf.extend(self.draw(&frame));
        buf
    }

    /// Clear the whole screen and redraw the frame at the top.
    pub fn clear_screen(&mut self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.queue(MoveTo(0, 0)).ok();
        buf.queue(Clear(ClearType::All)).ok();
        self.reset_block();
        self.repaint = false;
        let frame = self.last_frame.clone();
        buf.extend(self.draw(&frame));
        buf
    }

    /// Hand the terminal back: leave the alternate screen (or move below
    /// the inline block), switch every mode off and show the cursor.
    ///
    /// The renderer forgets what is on screen; the next draw starts over.
    pub fn release(&mut self) -> Vec<u8> {
        let mut buf = Vec::new();
        if self.modes.alt_screen {
            buf.queue(LeaveAlternateScreen).ok();
        } else if !self.lines.is_empty() {
            self.move_to_row(&mut buf, self.lines.len() - 1);
            buf.extend_from_slice(b"\r\n");
        }
        buf.extend_from_slice(RESET_MODES.as_bytes());

        self.modes = DisplayModes::default();
        self.cursor_visible = Some(true);
        self.cursor_style = Some(CursorStyle::DefaultUserShape);
        self.reset_block();
        buf
    }

    /// Take the terminal back after [`release`](Self::release): modes are
    /// re-applied and the last frame redrawn in full.
    pub fn restore(&mut self) -> Vec<u8> {
        self.title = None;
        self.repaint = false;
        let frame = self.last_frame.clone();
        self.draw(&frame)
    }

    fn apply_modes(&mut self, buf: &mut Vec<u8>, want: DisplayModes) {
        let have = self.modes;

        if want.alt_screen != have.alt_screen {
            if want.alt_screen {
                // Wipe the inline block; leaving the alternate screen later
                // restores the cursor to where it starts.
                if self.rows > 0 {
                    self.move_to_row(buf, 0);
                    self.carriage_return(buf);
                    buf.queue(Clear(ClearType::FromCursorDown)).ok();
                }
                buf.queue(EnterAlternateScreen).ok();
                buf.queue(MoveTo(0, 0)).ok();
                buf.queue(Clear(ClearType::All)).ok();
            } else {
                buf.queue(LeaveAlternateScreen).ok();
            }
            self.modes.alt_screen = want.alt_screen;
            self.reset_block();
            if !want.alt_screen {
                // Back at the saved cursor; its column is not tracked.
                self.column = None;
            }
            self.repaint = false;
        }

        if want.mouse != have.mouse {
            buf.extend_from_slice(match have.mouse {
                Some(MouseMode::CellMotion) => b"\x1b[?1002l\x1b[?1006l".as_slice(),
                Some(MouseMode::AllMotion) => b"\x1b[?1003l\x1b[?1006l".as_slice(),
                None => b"".as_slice(),
            });
            buf.extend_from_slice(match want.mouse {
                Some(MouseMode::CellMotion) => b"\x1b[?1002h\x1b[?1006h".as_slice(),
                Some(MouseMode::AllMotion) => b"\x1b[?1003h\x1b[?1006h".as_slice(),
                None => b"".as_slice(),
            });
        }

        if want.bracketed_paste != have.bracketed_paste {
            if want.bracketed_paste {
                buf.queue(EnableBracketedPaste).ok();
            } else {
                buf.queue(DisableBracketedPaste).ok();
            }
        }

        if want.focus_reporting != have.focus_reporting {
            if want.focus_reporting {
                buf.queue(EnableFocusChange).ok();
            } else {
                buf.queue(DisableFocusChange).ok();
            }
        }

        if want.keyboard != have.keyboard {
            if !have.keyboard.is_empty() {
                buf.queue(PopKeyboardEnhancementFlags).ok();
                buf.extend_from_slice(b"\x1b[>4;0m");
            }
            if !want.keyboard.is_empty() {
                buf.queue(PushKeyboardEnhancementFlags(want.keyboard)).ok();
                // modifyOtherKeys for terminals without the kitty protocol.
                buf.extend_from_slice(b"\x1b[>4;1m");
            }
        }

        self.modes = want;
    }

    /// Split content into screen lines fitted to the current size.
    fn layout(&self, content: &str) -> Vec<String> {
        let width = usize::from(self.width);
        let mut lines: Vec<String> = content
            .split('\n')
            .map(|line| fit_line(line.trim_end_matches('\r'), width).0)
            .collect();
        let height = usize::from(self.height);
        if lines.len() > height {
            lines.drain(..lines.len() - height);
        }
        lines
    }

    /// Erase everything the frame occupies so the next lines are all new.
    fn clear_block(&mut self, buf: &mut Vec<u8>) {
        if self.modes.alt_screen {
            buf.queue(MoveTo(0, 0)).ok();
            buf.queue(Clear(ClearType::All)).ok();
        } else if self.rows > 0 {
            self.move_to_row(buf, 0);
            self.carriage_return(buf);
            buf.queue(Clear(ClearType::FromCursorDown)).ok();
        }
        self.lines.clear();
        self.rows = self.rows.min(1);
        self.row = 0;
        self.column = Some(0);
    }

    /// Forget the block; the cursor sits at column 0 of its first row.
    fn reset_block(&mut self) {
        self.lines.clear();
        self.rows = 0;
        self.row = 0;
        self.column = Some(0);
    }

    fn carriage_return(&mut self, buf: &mut Vec<u8>) {
        if self.column != Some(0) {
            buf.extend_from_slice(b"\r");
            self.column = Some(0);
        }
    }

    fn move_to_row(&mut self, buf: &mut Vec<u8>, target: usize) {
        if self.modes.alt_screen {
            if self.row != target || self.column.is_none() {
                let row = u16::try_from(target).unwrap_or(u16::MAX);
                buf.queue(MoveTo(0, row)).ok();
                self.column = Some(0);
            }
            self.row = target;
            self.rows = self.rows.max(target + 1);
            return;
        }

        if self.rows == 0 {
            // Fresh block: the cursor is on row 0 already.
            self.rows = 1;
            self.row = 0;
        }

        let last_owned = self.rows - 1;
        let reachable = target.min(last_owned);
        if reachable < self.row {
            buf.queue(MoveUp(count(self.row - reachable))).ok();
        } else if reachable > self.row {
            buf.queue(MoveDown(count(reachable - self.row))).ok();
        }
        self.row = reachable;

        if target > last_owned {
            for _ in last_owned..target {
                buf.extend_from_slice(b"\r\n");
            }
            self.rows = target + 1;
            self.row = target;
            self.column = Some(0);
        }
    }

    fn place_cursor(&mut self, buf: &mut Vec<u8>, frame: &Frame) {
        let last_row = self.lines.len().saturating_sub(1);
        match frame.cursor {
            Some(cursor) => {
                let row = usize::from(cursor.row).min(last_row);
                let column = cursor.column.min(self.width - 1);
                self.move_to_row(buf, row);
                if self.column != Some(column) {
                    buf.queue(MoveToColumn(column)).ok();
                    self.column = Some(column);
                }
                if self.cursor_style != Some(cursor.style) {
                    buf.queue(cursor_style(cursor.style)).ok();
                    self.cursor_style = Some(cursor.style);
                }
                if self.cursor_visible != Some(true) {
                    buf.queue(Show).ok();
                    self.cursor_visible = Some(true);
                }
            }
            None => {
                if self.cursor_visible != Some(false) {
                    buf.queue(Hide).ok();
                    self.cursor_visible = Some(false);
                }
                self.move_to_row(buf, last_row);
                self.carriage_return(buf);
            }
        }
    }
}

fn count(n: usize) -> u16 {
    u16::try_from(n).unwrap_or(u16::MAX)
}

fn cursor_style(style: CursorStyle) -> SetCursorStyle {
    match style {
        CursorStyle::DefaultUserShape => SetCursorStyle::DefaultUserShape,
        CursorStyle::BlinkingBlock => SetCursorStyle::BlinkingBlock,
        CursorStyle::SteadyBlock => SetCursorStyle::SteadyBlock,
        CursorStyle::BlinkingUnderScore => SetCursorStyle::BlinkingUnderScore,
        CursorStyle::SteadyUnderScore => SetCursorStyle::SteadyUnderScore,
        CursorStyle::BlinkingBar => SetCursorStyle::BlinkingBar,
        CursorStyle::SteadyBar => SetCursorStyle::SteadyBar,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyboardEnhancementFlags;

    fn inline(width: u16, height: u16) -> Renderer {
        Renderer::new(width, height, DisplayModes::default(), None)
    }

    fn text(bytes: Vec<u8>) -> String {
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn first_draw_writes_every_line() {
        let mut r = inline(80, 24);
        let out = text(r.draw(&Frame::new("a\nb")));
        assert_eq!(out, "\ra\x1b[K\r\nb\x1b[K\x1b[?25l\r");
    }

    #[test]
    fn same_frame_twice_emits_nothing() {
        let mut r = inline(80, 24);
        let frame = Frame::new("one\ntwo\nthree").with_cursor(1, 1);
        assert!(!r.draw(&frame).is_empty());
        assert!(r.draw(&frame).is_empty());
    }

    #[test]
    fn single_line_change_moves_and_rewrites_one_line() {
        let mut r = inline(80, 24);
        r.draw(&Frame::new("a\nb\nc"));
        let out = text(r.draw(&Frame::new("a\nX\nc")));
        assert_eq!(out, "\x1b[1AX\x1b[K\x1b[1B\r");
    }

    #[test]
    fn growing_frame_adds_rows() {
        let mut r = inline(80, 24);
        r.draw(&Frame::new("a"));
        let out = text(r.draw(&Frame::new("a\nb")));
        assert_eq!(out, "\r\nb\x1b[K\r");
    }

    #[test]
    fn shrinking_frame_erases_below() {
        let mut r = inline(80, 24);
        r.draw(&Frame::new("a\nb\nc"));
        let out = text(r.draw(&Frame::new("a")));
        assert_eq!(out, "\x1b[1A\x1b[J\x1b[1A");
    }

    #[test]
    fn empty_content_is_one_blank_line() {
        let mut r = inline(80, 24);
        let out = text(r.draw(&Frame::new("")));
        assert_eq!(out, "\r\x1b[K\x1b[?25l");
    }

    #[test]
    fn lines_truncated_to_width() {
        let mut r = inline(3, 24);
        let out = text(r.draw(&Frame::new("abcdef")));
        assert_eq!(out, "\rabc\x1b[?25l\r");
    }

    #[test]
    fn tall_content_keeps_last_rows() {
        let mut r = inline(80, 2);
        r.draw(&Frame::new("1\n2\n3"));
        assert_eq!(r.lines, vec!["2".to_string(), "3".to_string()]);
    }

    #[test]
    fn resize_repaints_everything() {
        let mut r = inline(80, 24);
        let frame = Frame::new("a\nb");
        r.draw(&frame);
        r.resize(40, 10);
        let out = text(r.draw(&frame));
        assert_eq!(out, "\x1b[1A\x1b[Ja\x1b[K\r\nb\x1b[K\r");
        assert_eq!(r.size(), (40, 10));
    }

    #[test]
    fn alt_screen_uses_absolute_moves() {
        let modes = DisplayModes {
            alt_screen: true,
            ..DisplayModes::default()
        };
        let mut r = Renderer::new(80, 24, modes, None);
        let out = text(r.draw(&Frame::new("a\nb")));
        assert!(out.starts_with("\x1b[?1049h\x1b[1;1H\x1b[2J"));
        assert!(out.contains("\x1b[2;1H"));

        let out = text(r.draw(&Frame::new("a\nc")));
        assert_eq!(out, "c\x1b[K\r");
    }

    #[test]
    fn mode_changes_are_diffed() {
        let mut r = inline(80, 24);
        let modes = DisplayModes {
            bracketed_paste: true,
            focus_reporting: true,
            mouse: Some(MouseMode::CellMotion),
            ..DisplayModes::default()
        };
        let frame = Frame::new("x").with_modes(modes);
        let out = text(r.draw(&frame));
        assert!(out.starts_with("\x1b[?1002h\x1b[?1006h\x1b[?2004h\x1b[?1004h"));
        assert!(r.draw(&frame).is_empty());

        let out = text(r.draw(&Frame::new("x").with_modes(DisplayModes {
            mouse: Some(MouseMode::AllMotion),
            ..modes
        })));
        assert_eq!(out, "\x1b[?1002l\x1b[?1006l\x1b[?1003h\x1b[?1006h");
    }

    #[test]
    fn keyboard_enhancements_push_and_pop() {
        let mut r = inline(80, 24);
        let modes = DisplayModes {
            keyboard: KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES,
            ..DisplayModes::default()
        };
        let out = text(r.draw(&Frame::new("x").with_modes(modes)));
        assert!(out.starts_with("\x1b[>1u\x1b[>4;1m"));

        let out = text(r.draw(&Frame::new("x")));
        assert_eq!(out, "\x1b[<1u\x1b[>4;0m");
    }

    #[test]
    fn title_only_when_changed() {
        let mut r = inline(80, 24);
        let out = text(r.draw(&Frame::new("x").with_title("hello")));
        assert!(out.starts_with("\x1b]0;hello\x07"));
        assert!(r.draw(&Frame::new("x").with_title("hello")).is_empty());
        assert!(r.draw(&Frame::new("x")).is_empty());
    }

    #[test]
    fn cursor_is_positioned_and_styled() {
        let mut r = inline(80, 24);
        let frame = Frame::new("abc\ndef")
            .with_cursor(2, 0)
            .with_cursor_style(CursorStyle::SteadyBar);
        let out = text(r.draw(&frame));
        assert!(out.ends_with("\x1b[1A\x1b[3G\x1b[6 q\x1b[?25h"));

        let out = text(r.draw(&Frame::new("abc\ndef")));
        assert_eq!(out, "\x1b[?25l\x1b[1B\r");
    }

    #[test]
    fn synchronized_draws_are_bracketed() {
        let mut r = inline(80, 24);
        r.set_synchronized(true);
        let frame = Frame::new("a").with_cursor(1, 0);
        let out = text(r.draw(&frame));
        assert_eq!(out, "\x1b[?2026h\ra\x1b[K\x1b[0 q\x1b[?25h\x1b[?2026l");

        // Nothing changed, nothing written: no empty bracket either.
        assert!(r.draw(&frame).is_empty());

        let out = text(r.draw(&Frame::new("b").with_cursor(1, 0)));
        assert_eq!(out, "\x1b[?2026h\rb\x1b[K\x1b[?2026l");
    }

    #[test]
    fn visible_cursor_is_hidden_while_lines_change() {
        let mut r = inline(80, 24);
        assert!(!r.is_synchronized());
        r.draw(&Frame::new("a").with_cursor(1, 0));

        let out = text(r.draw(&Frame::new("b").with_cursor(1, 0)));
        assert_eq!(out, "\x1b[?25l\rb\x1b[K\x1b[?25h");

        // Hidden cursor stays hidden; nothing to toggle.
        let out = text(r.draw(&Frame::new("c")));
        assert_eq!(out, "\x1b[?25l\rc\x1b[K\r");
        let out = text(r.draw(&Frame::new("d")));
        assert_eq!(out, "d\x1b[K\r");
    }

    #[test]
    fn insert_above_reprints_frame() {
        let mut r = inline(80, 24);
        r.draw(&Frame::new("status"));
        let out = text(r.insert_above("log line"));
        assert_eq!(out, "\x1b[Jlog line\r\nstatus\x1b[K\r");
    }

    #[test]
    fn insert_above_ignored_in_alt_screen() {
        let modes = DisplayModes {
            alt_screen: true,
            ..DisplayModes::default()
        };
        let mut r = Renderer::new(80, 24, modes, None);
        r.draw(&Frame::new("x"));
        assert!(r.insert_above("nope").is_empty());
    }

    #[test]
    fn release_and_restore() {
        let mut r = inline(80, 24);
        let modes = DisplayModes {
            bracketed_paste: true,
            ..DisplayModes::default()
        };
        r.set_defaults(modes);
        r.draw(&Frame::new("a\nb"));

        let out = text(r.release());
        assert!(out.starts_with("\r\n"));
        assert!(out.contains("\x1b[?2004l"));
        assert!(out.ends_with("\x1b[?25h"));

        let out = text(r.restore());
        assert!(out.starts_with("\x1b[?2004h"));
        assert!(out.contains("a\x1b[K\r\nb\x1b[K"));
    }
}
