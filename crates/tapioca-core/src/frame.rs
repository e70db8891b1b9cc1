//! What a model's `view` returns: text content plus the terminal state it
//! wants (cursor, title, display modes).

use crate::command::{CursorStyle, MouseMode};
use crossterm::event::KeyboardEnhancementFlags;
use ratatui::backend::TestBackend;
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier};
use ratatui::widgets::Widget;
use ratatui::Terminal;
use std::fmt::Write as _;
use unicode_width::UnicodeWidthStr;

/// A rendered view.
///
/// `content` is plain text with optional SGR styling, one terminal row per
/// line.  Everything else is optional: unset fields leave the terminal as the
/// program options (or earlier commands) configured it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub content: String,
    /// Where to show the cursor. `None` hides it.
    pub cursor: Option<Cursor>,
    pub title: Option<String>,
    /// Display modes for this frame, overriding the program's.
    pub modes: Option<DisplayModes>,
}

impl Frame {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Show the cursor at a zero-based cell within the frame.
    pub fn with_cursor(mut self, column: u16, row: u16) -> Self {
        self.cursor = Some(Cursor {
            column,
            row,
            style: CursorStyle::default(),
        });
        self
    }

    pub fn with_cursor_style(mut self, style: CursorStyle) -> Self {
        if let Some(cursor) = self.cursor.as_mut() {
            cursor.style = style;
        }
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_modes(mut self, modes: DisplayModes) -> Self {
        self.modes = Some(modes);
        self
    }

    /// Render a ratatui widget into a `columns` x `rows` frame.
    pub fn from_widget(widget: impl Widget, columns: u16, rows: u16) -> Self {
        let area = Rect::new(0, 0, columns, rows);
        let mut buffer = Buffer::empty(area);
        widget.render(area, &mut buffer);
        Self::from_buffer(&buffer)
    }

    /// Draw with ratatui's immediate-mode API into a `columns` x `rows` frame.
    ///
    /// ```rust,ignore
    /// fn view(&self) -> Frame {
    ///     Frame::draw(self.width, self.height, |f| {
    ///         f.render_widget(Paragraph::new(format!("Count: {}", self.count)), f.area());
    ///     })
    /// }
    /// ```
    pub fn draw(columns: u16, rows: u16, render: impl FnOnce(&mut ratatui::Frame)) -> Self {
        let Ok(mut terminal) = Terminal::new(TestBackend::new(columns, rows)) else {
            return Self::default();
        };
        match terminal.draw(render) {
            Ok(completed) => Self::from_buffer(completed.buffer),
            Err(_) => Self::default(),
        }
    }

    /// Convert a ratatui buffer into styled text.
    ///
    /// Styles become SGR sequences emitted only where the style changes;
    /// cells covered by a wide character are skipped and unstyled trailing
    /// blanks are trimmed.
    pub fn from_buffer(buffer: &Buffer) -> Self {
        let area = buffer.area;
        let mut content = String::new();

        for y in area.top()..area.bottom() {
            if y > area.top() {
                content.push('\n');
            }
            let mut line = String::new();
            let mut plain_len = 0;
            let mut current = CellStyle::default();
            let mut skip = 0usize;

            for x in area.left()..area.right() {
                if skip > 0 {
                    skip -= 1;
                    continue;
                }
                let Some(cell) = buffer.cell((x, y)) else {
                    continue;
                };
                if cell.skip {
                    continue;
                }
                let style = CellStyle {
                    fg: cell.fg,
                    bg: cell.bg,
                    modifier: cell.modifier,
                };
                if style != current {
                    line.push_str(&style.sgr());
                    current = style;
                    plain_len = line.len();
                }
                let symbol = cell.symbol();
                line.push_str(symbol);
                skip = symbol.width().saturating_sub(1);
                if !(current.is_plain() && symbol == " ") {
                    plain_len = line.len();
                }
            }

            if current.is_plain() {
                line.truncate(plain_len);
            } else {
                line.push_str("\x1b[0m");
            }
            content.push_str(&line);
        }

        Self::new(content)
    }
}

impl From<String> for Frame {
    fn from(content: String) -> Self {
        Self::new(content)
    }
}

impl From<&str> for Frame {
    fn from(content: &str) -> Self {
        Self::new(content)
    }
}

/// Cursor placement within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub column: u16,
    pub row: u16,
    pub style: CursorStyle,
}

/// Terminal modes a frame can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayModes {
    pub alt_screen: bool,
    pub mouse: Option<MouseMode>,
    pub bracketed_paste: bool,
    pub focus_reporting: bool,
    /// Kitty keyboard flags to push. Empty leaves the keyboard in legacy mode.
    pub keyboard: KeyboardEnhancementFlags,
}

impl Default for DisplayModes {
    fn default() -> Self {
        Self {
            alt_screen: false,
            mouse: None,
            bracketed_paste: false,
            focus_reporting: false,
            keyboard: KeyboardEnhancementFlags::empty(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CellStyle {
    fg: Color,
    bg: Color,
    modifier: Modifier,
}

impl Default for CellStyle {
    fn default() -> Self {
        Self {
            fg: Color::Reset,
            bg: Color::Reset,
            modifier: Modifier::empty(),
        }
    }
}

impl CellStyle {
    fn is_plain(&self) -> bool {
        *self == Self::default()
    }

    /// Full SGR for this style, starting from a reset.
    fn sgr(&self) -> String {
        let mut codes = vec!["0".to_string()];
        for (flag, code) in [
            (Modifier::BOLD, "1"),
            (Modifier::DIM, "2"),
            (Modifier::ITALIC, "3"),
            (Modifier::UNDERLINED, "4"),
            (Modifier::SLOW_BLINK, "5"),
            (Modifier::RAPID_BLINK, "6"),
            (Modifier::REVERSED, "7"),
            (Modifier::HIDDEN, "8"),
            (Modifier::CROSSED_OUT, "9"),
        ] {
            if self.modifier.contains(flag) {
                codes.push(code.to_string());
            }
        }
        if let Some(fg) = color_code(self.fg, false) {
            codes.push(fg);
        }
        if let Some(bg) = color_code(self.bg, true) {
            codes.push(bg);
        }
        let mut out = String::from("\x1b[");
        out.push_str(&codes.join(";"));
        out.push('m');
        out
    }
}

fn color_code(color: Color, background: bool) -> Option<String> {
    let offset = if background { 10 } else { 0 };
    let basic = |n: u8| Some((n + offset).to_string());
    match color {
        Color::Reset => None,
        Color::Black => basic(30),
        Color::Red => basic(31),
        Color::Green => basic(32),
        Color::Yellow => basic(33),
        Color::Blue => basic(34),
        Color::Magenta => basic(35),
        Color::Cyan => basic(36),
        Color::Gray => basic(37),
        Color::DarkGray => basic(90),
        Color::LightRed => basic(91),
        Color::LightGreen => basic(92),
        Color::LightYellow => basic(93),
        Color::LightBlue => basic(94),
        Color::LightMagenta => basic(95),
        Color::LightCyan => basic(96),
        Color::White => basic(97),
        Color::Indexed(i) => Some(format!("{};5;{i}", 38 + offset)),
        Color::Rgb(r, g, b) => {
            let mut s = String::new();
            let _ = write!(s, "{};2;{r};{g};{b}", 38 + offset);
            Some(s)
        }
    }
}

/// Display width of a line, ignoring escape sequences.
pub(crate) fn line_width(line: &str) -> usize {
    fit_line(line, usize::MAX).1
}

/// Truncate a line to `width` columns, keeping escape sequences intact.
/// Returns the fitted line and its display width.
pub(crate) fn fit_line(line: &str, width: usize) -> (String, usize) {
    let mut out = String::with_capacity(line.len());
    let mut used = 0;
    let mut styled = false;
    let mut truncated = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\x1b' {
            styled = true;
            out.push(c);
            match chars.next() {
                Some('[') => {
                    out.push('[');
                    for c in chars.by_ref() {
                        out.push(c);
                        if ('\x40'..='\x7e').contains(&c) {
                            break;
                        }
                    }
                }
                Some(']') => {
                    out.push(']');
                    while let Some(c) = chars.next() {
                        out.push(c);
                        if c == '\x07' {
                            break;
                        }
                        if c == '\x1b' && chars.peek() == Some(&'\\') {
                            chars.next();
                            out.push('\\');
                            break;
                        }
                    }
                }
                Some(other) => out.push(other),
                None => {}
            }
            continue;
        }
        if truncated {
            continue;
        }
        let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w > width {
            truncated = true;
            continue;
        }
        used += w;
        out.push(c);
    }

    if truncated && styled {
        out.push_str("\x1b[0m");
    }
    (out, used)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::style::{Style, Stylize};
    use ratatui::text::Line;
    use ratatui::widgets::Paragraph;

    #[test]
    fn from_str_and_builders() {
        let frame = Frame::from("hello")
            .with_cursor(2, 0)
            .with_cursor_style(CursorStyle::SteadyBar)
            .with_title("t");
        assert_eq!(frame.content, "hello");
        assert_eq!(
            frame.cursor,
            Some(Cursor {
                column: 2,
                row: 0,
                style: CursorStyle::SteadyBar
            })
        );
        assert_eq!(frame.title.as_deref(), Some("t"));
        assert_eq!(frame.modes, None);
    }

    #[test]
    fn plain_widget_is_plain_text() {
        let frame = Frame::from_widget(Paragraph::new("hi\nthere"), 8, 2);
        assert_eq!(frame.content, "hi\nthere");
    }

    #[test]
    fn styled_widget_emits_sgr() {
        let line = Line::from(vec!["a".bold(), "b".into()]);
        let frame = Frame::from_widget(Paragraph::new(line), 4, 1);
        assert_eq!(frame.content, "\x1b[0;1ma\x1b[0mb");
    }

    #[test]
    fn colors_map_to_sgr() {
        let style = Style::new().fg(Color::Rgb(1, 2, 3)).bg(Color::Indexed(200));
        let frame = Frame::from_widget(Paragraph::new("x").style(style), 1, 1);
        assert_eq!(frame.content, "\x1b[0;38;2;1;2;3;48;5;200mx\x1b[0m");
    }

    #[test]
    fn wide_characters_skip_covered_cell() {
        let frame = Frame::from_widget(Paragraph::new("界x"), 4, 1);
        assert_eq!(frame.content, "界x");
    }

    #[test]
    fn draw_with_closure() {
        let frame = Frame::draw(5, 1, |f| {
            f.render_widget(Paragraph::new("ok"), f.area());
        });
        assert_eq!(frame.content, "ok");
    }

    #[test]
    fn fit_line_ignores_escapes() {
        assert_eq!(line_width("\x1b[1mbold\x1b[0m"), 4);
        assert_eq!(line_width("界"), 2);
        assert_eq!(fit_line("abcdef", 3), ("abc".to_string(), 3));
        assert_eq!(fit_line("界界", 3), ("界".to_string(), 2));
        assert_eq!(
            fit_line("\x1b[1mabcdef", 2),
            ("\x1b[1mab\x1b[0m".to_string(), 2)
        );
    }
}
