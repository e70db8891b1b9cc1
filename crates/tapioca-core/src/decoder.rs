//! Input decoder: raw terminal bytes in, structured [`InputEvent`]s out.
//!
//! [`Decoder`] is resumable.  Bytes are pushed in with [`Decoder::feed`] in
//! whatever chunks the terminal delivers them; complete events come back
//! immediately and an incomplete tail (half a UTF-8 character, the start of
//! an escape sequence) stays buffered until more bytes arrive.  Because a lone
//! `ESC` keypress looks exactly like the first byte of an escape sequence,
//! the caller decides when enough time has passed and calls
//! [`Decoder::flush`], which resolves whatever is pending as literally as
//! possible (`ESC` becomes the Escape key, `ESC x` becomes `alt+x`, anything
//! else is dropped).
//!
//! Recognised input:
//!
//! * UTF-8 text, legacy control bytes (`ctrl+a` .. `ctrl+z`, tab, enter, ...),
//!   and `ESC`-prefixed keys as Alt chords.
//! * CSI and SS3 cursor/function keys with xterm modifier parameters, urxvt
//!   `$`/`^`/`@` variants, xterm `modifyOtherKeys`, and the kitty keyboard
//!   protocol (press/repeat/release, associated text, alternate keys).
//! * X10, urxvt and SGR mouse reports.
//! * Bracketed paste, focus in/out.
//! * Replies to capability queries: OSC 10/11/12 colours, OSC `l` title,
//!   OSC 52 clipboard contents, kitty keyboard flags, modifyOtherKeys level, primary device attributes,
//!   DECRPM, cursor position, window size, XTVERSION.
//!
//! Unknown or malformed sequences are dropped and parsing resumes at the
//! byte that broke them, so garbage never swallows the keys that follow it.

use crate::color::Rgb;
use crate::event::CapabilityEvent;
use crate::key::KeyEvent;
use crate::mouse::{self, MouseEvent};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use crossterm::event::{
    KeyCode, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags, MediaKeyCode, ModifierKeyCode,
};
use std::collections::VecDeque;
use std::io::{self, Read};
use tracing::trace;

const ESC: u8 = 0x1b;
const BEL: u8 = 0x07;
const PASTE_END: &[u8] = b"\x1b[201~";

/// A pending sequence longer than this is abandoned.
pub const MAX_SEQUENCE_LEN: usize = 4096;

/// Paste content beyond this many bytes is dropped.
pub const MAX_PASTE_LEN: usize = 1024 * 1024;

/// An event decoded from terminal input.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Key(KeyEvent),
    Mouse(MouseEvent),
    Paste(String),
    Focus,
    Blur,
    Resize { columns: u16, rows: u16 },
    Capability(CapabilityEvent),
}

enum Token {
    Input(InputEvent),
    Inputs(Vec<InputEvent>),
    PasteStart,
    PasteEnd,
}

/// Outcome of parsing at the head of the buffer.
enum Step {
    /// Consumed `n` bytes producing a token.
    Emit(usize, Token),
    /// Consumed `n` bytes of something unrecognised.
    Skip(usize),
    /// Need more bytes to decide.
    Incomplete,
}

impl Step {
    fn key(len: usize, key: KeyEvent) -> Step {
        Step::Emit(len, Token::Input(InputEvent::Key(key)))
    }

    fn input(len: usize, event: InputEvent) -> Step {
        Step::Emit(len, Token::Input(event))
    }

    fn capability(len: usize, event: CapabilityEvent) -> Step {
        Step::input(len, InputEvent::Capability(event))
    }

    /// Resolve an incomplete tail: drop it when forced, wait otherwise.
    fn pending(buf: &[u8], force: bool) -> Step {
        if force {
            Step::Skip(buf.len())
        } else {
            Step::Incomplete
        }
    }
}

/// Resumable terminal input parser.
#[derive(Debug, Default)]
pub struct Decoder {
    pending: Vec<u8>,
    paste: Option<Vec<u8>>,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and return every event they complete.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<InputEvent> {
        self.pending.extend_from_slice(bytes);
        self.drain(false)
    }

    /// Resolve pending bytes without waiting for more input.
    ///
    /// Called once the escape timeout expires.  An open bracketed paste is
    /// left alone: paste content is only complete at its end marker.
    pub fn flush(&mut self) -> Vec<InputEvent> {
        self.drain(true)
    }

    /// Whether bytes are waiting on a continuation that the escape timeout
    /// should eventually resolve.
    pub fn has_pending(&self) -> bool {
        self.paste.is_none() && !self.pending.is_empty()
    }

    /// Whether a bracketed paste is open.
    pub fn in_paste(&self) -> bool {
        self.paste.is_some()
    }

    fn drain(&mut self, force: bool) -> Vec<InputEvent> {
        let mut events = Vec::new();
        let mut pos = 0;

        while pos < self.pending.len() {
            let rest = &self.pending[pos..];

            if let Some(paste) = self.paste.as_mut() {
                match find(rest, PASTE_END) {
                    Some(end) => {
                        append_capped(paste, &rest[..end]);
                        pos += end + PASTE_END.len();
                        let content = self.paste.take().unwrap_or_default();
                        events.push(InputEvent::Paste(
                            String::from_utf8_lossy(&content).into_owned(),
                        ));
                    }
                    None => {
                        let keep = partial_suffix(rest, PASTE_END);
                        append_capped(paste, &rest[..rest.len() - keep]);
                        pos = self.pending.len() - keep;
                        break;
                    }
                }
                continue;
            }

            match parse(rest, force) {
                Step::Emit(n, token) => {
                    pos += n;
                    match token {
                        Token::Input(event) => events.push(event),
                        Token::Inputs(batch) => events.extend(batch),
                        Token::PasteStart => self.paste = Some(Vec::new()),
                        Token::PasteEnd => {}
                    }
                }
                Step::Skip(n) => {
                    trace!(bytes = ?&rest[..n], "dropped unrecognized input");
                    pos += n;
                }
                Step::Incomplete if rest.len() > MAX_SEQUENCE_LEN => {
                    trace!(len = rest.len(), "abandoned oversized sequence");
                    pos = self.pending.len();
                }
                Step::Incomplete => break,
            }
        }

        self.pending.drain(..pos);
        events
    }
}

/// Blocking iterator over the events decoded from a reader.
///
/// Pending bytes are resolved only at end of input; interactive readers
/// should drive a [`Decoder`] directly and apply an escape timeout.
pub struct Events<R> {
    reader: R,
    decoder: Decoder,
    ready: VecDeque<InputEvent>,
    buf: [u8; 1024],
    done: bool,
}

/// Decode every event from `reader`.
pub fn events<R: Read>(reader: R) -> Events<R> {
    Events {
        reader,
        decoder: Decoder::new(),
        ready: VecDeque::new(),
        buf: [0; 1024],
        done: false,
    }
}

impl<R: Read> Iterator for Events<R> {
    type Item = io::Result<InputEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.ready.pop_front() {
                return Some(Ok(event));
            }
            if self.done {
                return None;
            }
            match self.reader.read(&mut self.buf) {
                Ok(0) => {
                    self.done = true;
                    self.ready.extend(self.decoder.flush());
                }
                Ok(n) => {
                    let decoded = self.decoder.feed(&self.buf[..n]);
                    self.ready.extend(decoded);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

fn parse(buf: &[u8], force: bool) -> Step {
    match buf[0] {
        ESC => parse_escape(buf, force),
        b @ (0x00..=0x1f | 0x7f) => Step::key(1, control_key(b)),
        b @ 0x20..=0x7e => Step::key(1, printable_key(char::from(b))),
        _ => parse_utf8(buf, force),
    }
}

fn parse_escape(buf: &[u8], force: bool) -> Step {
    if buf.len() == 1 {
        return if force {
            Step::key(1, KeyEvent::from(KeyCode::Esc))
        } else {
            Step::Incomplete
        };
    }

    match buf[1] {
        b'[' => parse_csi(buf, force),
        b'O' => parse_ss3(buf, force),
        b']' => parse_osc(buf, force),
        b'P' => parse_dcs(buf, force),
        b'_' | b'^' | b'X' => parse_ignored_string(buf, force),
        _ => match parse(&buf[1..], force) {
            Step::Emit(n, Token::Input(InputEvent::Key(key))) => Step::key(n + 1, alt(key)),
            Step::Incomplete => Step::Incomplete,
            _ => Step::key(1, KeyEvent::from(KeyCode::Esc)),
        },
    }
}

fn alt(mut key: KeyEvent) -> KeyEvent {
    key.modifiers |= KeyModifiers::ALT;
    key.text.clear();
    key
}

fn control_key(b: u8) -> KeyEvent {
    let ctrl = |c: char| KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL);
    match b {
        0x00 => ctrl(' '),
        0x08 => ctrl('h'),
        0x09 => KeyEvent::from(KeyCode::Tab),
        0x0d => KeyEvent::from(KeyCode::Enter),
        0x1b => KeyEvent::from(KeyCode::Esc),
        0x7f => KeyEvent::from(KeyCode::Backspace),
        0x01..=0x1a => ctrl(char::from(b + 0x60)),
        _ => ctrl(char::from(b + 0x40)),
    }
}

fn printable_key(c: char) -> KeyEvent {
    if c.is_ascii_uppercase() {
        let mut key = KeyEvent::new(KeyCode::Char(c.to_ascii_lowercase()), KeyModifiers::SHIFT);
        key.shifted = Some(c);
        key
    } else {
        KeyEvent::char(c)
    }
}

fn replacement() -> KeyEvent {
    KeyEvent::char(char::REPLACEMENT_CHARACTER)
}

fn parse_utf8(buf: &[u8], force: bool) -> Step {
    let width = match buf[0] {
        0xc2..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf4 => 4,
        _ => {
            // Stray continuation bytes or invalid leads form one unit.
            let run = buf
                .iter()
                .skip(1)
                .take_while(|&&b| (0x80..=0xbf).contains(&b))
                .count();
            return Step::key(1 + run, replacement());
        }
    };

    if buf.len() < width {
        if buf[1..].iter().any(|&b| b & 0xc0 != 0x80) {
            return Step::key(1, replacement());
        }
        return if force {
            Step::key(buf.len(), replacement())
        } else {
            Step::Incomplete
        };
    }

    match std::str::from_utf8(&buf[..width]) {
        Ok(s) => match s.chars().next() {
            Some(c) => Step::key(width, KeyEvent::char(c)),
            None => Step::Skip(width),
        },
        Err(_) => {
            // Overlong forms and surrogates: the lead and the continuation
            // bytes it claims are one malformed unit.
            let run = buf[1..width]
                .iter()
                .take_while(|&&b| (0x80..=0xbf).contains(&b))
                .count();
            Step::key(1 + run, replacement())
        }
    }
}

/// Parsed CSI parameters. Each parameter is a list of `:`-separated
/// sub-parameters; missing numbers are `None`.
struct Csi {
    marker: Option<u8>,
    params: Vec<Vec<Option<u32>>>,
    intermediate: Option<u8>,
    final_byte: u8,
}

impl Csi {
    fn param(&self, i: usize) -> Option<u32> {
        self.sub(i, 0)
    }

    fn sub(&self, i: usize, j: usize) -> Option<u32> {
        self.params.get(i).and_then(|p| p.get(j).copied().flatten())
    }
}

fn parse_csi(buf: &[u8], force: bool) -> Step {
    let mut i = 2;

    let mut marker = None;
    if let Some(&b) = buf.get(i) {
        if (b'<'..=b'?').contains(&b) {
            marker = Some(b);
            i += 1;
        }
    }

    let mut params = Vec::new();
    let mut current = Vec::new();
    let mut number: Option<u32> = None;
    let mut saw_params = false;
    while let Some(&b) = buf.get(i) {
        match b {
            b'0'..=b'9' => {
                let digit = u32::from(b - b'0');
                number = Some(number.unwrap_or(0).saturating_mul(10).saturating_add(digit));
            }
            b':' => current.push(number.take()),
            b';' => {
                current.push(number.take());
                params.push(std::mem::take(&mut current));
            }
            0x3c..=0x3f => {}
            _ => break,
        }
        saw_params = true;
        i += 1;
    }
    if saw_params {
        current.push(number.take());
        params.push(current);
    }

    let mut intermediate = None;
    while let Some(&b) = buf.get(i) {
        if !(0x20..=0x2f).contains(&b) {
            break;
        }
        intermediate = Some(b);
        i += 1;
    }

    let csi = |final_byte| Csi {
        marker,
        params: params.clone(),
        intermediate,
        final_byte,
    };

    let Some(&final_byte) = buf.get(i) else {
        if !force {
            return Step::Incomplete;
        }
        if buf.len() == 2 {
            return Step::key(2, alt(KeyEvent::char('[')));
        }
        if intermediate == Some(b'$') {
            return urxvt_shifted(buf, i, &csi(b'~'));
        }
        return Step::Skip(buf.len());
    };

    if intermediate == Some(b'$') && final_byte != b'y' {
        return urxvt_shifted(buf, i, &csi(b'~'));
    }
    if !(0x40..=0x7e).contains(&final_byte) {
        return Step::Skip(i);
    }

    dispatch_csi(buf, i + 1, &csi(final_byte), force)
}

/// urxvt reports shifted editing keys as `CSI n $`, which is not a valid
/// CSI sequence on its own.
fn urxvt_shifted(buf: &[u8], len: usize, csi: &Csi) -> Step {
    match dispatch_csi(buf, len, csi, true) {
        Step::Emit(n, Token::Input(InputEvent::Key(mut key))) => {
            key.modifiers |= KeyModifiers::SHIFT;
            Step::key(n, key)
        }
        _ => Step::Skip(len),
    }
}

fn dispatch_csi(buf: &[u8], n: usize, csi: &Csi, force: bool) -> Step {
    match (csi.marker, csi.intermediate, csi.final_byte) {
        (Some(b'?'), None, b'u') => match csi.param(0) {
            Some(flags) => Step::capability(
                n,
                CapabilityEvent::KeyboardEnhancements(KeyboardEnhancementFlags::from_bits_truncate(
                    (flags & 0xff) as u8,
                )),
            ),
            None => Step::Skip(n),
        },
        (Some(b'?'), None, b'c') => {
            let attrs = csi.params.iter().filter_map(|p| p.first().copied().flatten()).collect();
            Step::capability(n, CapabilityEvent::DeviceAttributes(attrs))
        }
        (Some(b'?') | None, Some(b'$'), b'y') => match (csi.param(0), csi.param(1)) {
            (Some(mode), Some(setting)) => {
                Step::capability(n, CapabilityEvent::ModeReport { mode, setting })
            }
            _ => Step::Skip(n),
        },
        (Some(b'?'), None, b'R') => match (csi.param(0), csi.param(1)) {
            (Some(row), Some(col)) => Step::capability(n, cursor_position(row, col)),
            _ => Step::Skip(n),
        },
        (Some(b'<'), None, b'M' | b'm') => match (csi.param(0), csi.param(1), csi.param(2)) {
            (Some(code), Some(x), Some(y)) if csi.params.len() == 3 => Step::input(
                n,
                InputEvent::Mouse(mouse::decode(
                    code,
                    csi.final_byte == b'm',
                    coord(x),
                    coord(y),
                )),
            ),
            _ => Step::Skip(n),
        },
        (Some(b'>'), None, b'm') => match (csi.param(0), csi.param(1)) {
            (Some(4), level) => {
                let flags = if level.unwrap_or(0) > 0 {
                    KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
                } else {
                    KeyboardEnhancementFlags::empty()
                };
                Step::capability(n, CapabilityEvent::KeyboardEnhancements(flags))
            }
            _ => Step::Skip(n),
        },
        (None, None, b'I') if csi.params.is_empty() => Step::input(n, InputEvent::Focus),
        (None, None, b'O') if csi.params.is_empty() => Step::input(n, InputEvent::Blur),
        (None, None, b'M') if csi.params.is_empty() => {
            // X10: three raw bytes follow the final byte.
            let Some(raw) = buf.get(n..n + 3) else {
                return Step::pending(buf, force);
            };
            let code = u32::from(raw[0].saturating_sub(32));
            let x = u32::from(raw[1].saturating_sub(32));
            let y = u32::from(raw[2].saturating_sub(32));
            Step::input(
                n + 3,
                InputEvent::Mouse(mouse::decode(code, false, coord(x), coord(y))),
            )
        }
        (None, None, b'M') => match (csi.param(0), csi.param(1), csi.param(2)) {
            (Some(code), Some(x), Some(y)) if csi.params.len() == 3 => Step::input(
                n,
                InputEvent::Mouse(mouse::decode(
                    code.saturating_sub(32),
                    false,
                    coord(x),
                    coord(y),
                )),
            ),
            _ => Step::Skip(n),
        },
        (None, None, b'R') => cursor_report_or_f3(n, csi),
        (None, None, b't') => match (csi.param(0), csi.param(1), csi.param(2)) {
            (Some(8 | 48), Some(rows), Some(columns)) => Step::input(
                n,
                InputEvent::Resize {
                    columns: clamp_u16(columns),
                    rows: clamp_u16(rows),
                },
            ),
            _ => Step::Skip(n),
        },
        (None, None, b'A'..=b'H' | b'P' | b'Q' | b'S' | b'Z' | b'a'..=b'd') => {
            match letter_key(csi.final_byte) {
                Some(mut key) => {
                    if csi.params.len() > 1 {
                        apply_modifier_param(&mut key, csi.param(1));
                        key.kind = event_kind(csi.sub(1, 1));
                    }
                    Step::key(n, key)
                }
                None => Step::Skip(n),
            }
        }
        (None, None, b'~' | b'^' | b'@') => tilde_key(n, csi),
        (None, None, b'u') => kitty_key(n, csi),
        _ => Step::Skip(n),
    }
}

fn coord(one_based: u32) -> u16 {
    clamp_u16(one_based.saturating_sub(1))
}

fn clamp_u16(v: u32) -> u16 {
    u16::try_from(v).unwrap_or(u16::MAX)
}

fn cursor_position(row: u32, col: u32) -> CapabilityEvent {
    CapabilityEvent::CursorPosition {
        column: coord(col),
        row: coord(row),
    }
}

/// `CSI row ; col R` is a cursor position report, except that `CSI 1 ; m R`
/// is also how xterm encodes a modified F3.  With the cursor on the first
/// row the two cannot be told apart, so both events are reported.
fn cursor_report_or_f3(n: usize, csi: &Csi) -> Step {
    match (csi.param(0), csi.param(1)) {
        (Some(row), Some(col)) if csi.params.len() == 2 => {
            let position = InputEvent::Capability(cursor_position(row, col));
            if row == 1 && (2..=16).contains(&col) {
                let mut key = KeyEvent::from(KeyCode::F(3));
                apply_modifier_param(&mut key, Some(col));
                Step::Emit(n, Token::Inputs(vec![InputEvent::Key(key), position]))
            } else {
                Step::input(n, position)
            }
        }
        _ if csi.params.is_empty() => Step::key(n, KeyEvent::from(KeyCode::F(3))),
        _ => Step::Skip(n),
    }
}

fn letter_key(final_byte: u8) -> Option<KeyEvent> {
    let (code, modifiers) = match final_byte {
        b'A' => (KeyCode::Up, KeyModifiers::NONE),
        b'B' => (KeyCode::Down, KeyModifiers::NONE),
        b'C' => (KeyCode::Right, KeyModifiers::NONE),
        b'D' => (KeyCode::Left, KeyModifiers::NONE),
        b'a' => (KeyCode::Up, KeyModifiers::SHIFT),
        b'b' => (KeyCode::Down, KeyModifiers::SHIFT),
        b'c' => (KeyCode::Right, KeyModifiers::SHIFT),
        b'd' => (KeyCode::Left, KeyModifiers::SHIFT),
        b'E' => (KeyCode::KeypadBegin, KeyModifiers::NONE),
        b'F' => (KeyCode::End, KeyModifiers::NONE),
        b'H' => (KeyCode::Home, KeyModifiers::NONE),
        b'P'..=b'S' => (KeyCode::F(1 + final_byte - b'P'), KeyModifiers::NONE),
        b'Z' => (KeyCode::Tab, KeyModifiers::SHIFT),
        _ => return None,
    };
    Some(KeyEvent::new(code, modifiers))
}

fn tilde_key(n: usize, csi: &Csi) -> Step {
    let Some(p) = csi.param(0) else {
        return Step::Skip(n);
    };

    if csi.final_byte == b'~' {
        match p {
            200 => return Step::Emit(n, Token::PasteStart),
            201 => return Step::Emit(n, Token::PasteEnd),
            27 => return modify_other_keys(n, csi),
            _ => {}
        }
    }

    let code = match p {
        1 | 7 => KeyCode::Home,
        2 => KeyCode::Insert,
        3 => KeyCode::Delete,
        4 | 8 => KeyCode::End,
        5 => KeyCode::PageUp,
        6 => KeyCode::PageDown,
        11..=15 => KeyCode::F((p - 10) as u8),
        17..=21 => KeyCode::F((p - 11) as u8),
        23..=26 => KeyCode::F((p - 12) as u8),
        28 | 29 => KeyCode::F((p - 13) as u8),
        31..=34 => KeyCode::F((p - 14) as u8),
        _ => return Step::Skip(n),
    };

    let mut key = KeyEvent::from(code);
    apply_modifier_param(&mut key, csi.param(1));
    match csi.final_byte {
        b'^' => key.modifiers |= KeyModifiers::CONTROL,
        b'@' => key.modifiers |= KeyModifiers::CONTROL | KeyModifiers::SHIFT,
        _ => key.kind = event_kind(csi.sub(1, 1)),
    }
    Step::key(n, key)
}

/// xterm `modifyOtherKeys`: `CSI 27 ; modifiers ; code ~`.
fn modify_other_keys(n: usize, csi: &Csi) -> Step {
    let (Some(modifier), Some(code)) = (csi.param(1), csi.param(2)) else {
        return Step::Skip(n);
    };
    let mut key = key_for_code(code);
    apply_modifier_param(&mut key, Some(modifier));
    fill_text(&mut key);
    Step::key(n, key)
}

/// Kitty keyboard protocol:
/// `CSI code[:shifted[:base]] ; modifiers[:event] ; text u`.
fn kitty_key(n: usize, csi: &Csi) -> Step {
    let Some(code) = csi.sub(0, 0) else {
        return Step::Skip(n);
    };

    let mut key = key_for_code(code);
    key.shifted = csi.sub(0, 1).and_then(char::from_u32).filter(|c| !c.is_control());
    key.base = csi.sub(0, 2).and_then(char::from_u32).filter(|c| !c.is_control());
    apply_modifier_param(&mut key, csi.sub(1, 0));
    key.kind = event_kind(csi.sub(1, 1));

    if let Some(codepoints) = csi.params.get(2) {
        key.text = codepoints
            .iter()
            .flatten()
            .filter(|&&c| c != 0)
            .filter_map(|&c| char::from_u32(c))
            .collect();
    }
    fill_text(&mut key);
    Step::key(n, key)
}

/// Printable text for a plain or shifted character key that arrived without
/// explicit associated text.
fn fill_text(key: &mut KeyEvent) {
    if !key.text.is_empty() || !key.modifiers.difference(KeyModifiers::SHIFT).is_empty() {
        return;
    }
    if let KeyCode::Char(c) = key.code {
        if c.is_control() {
            return;
        }
        key.text = if key.modifiers.contains(KeyModifiers::SHIFT) {
            key.shifted
                .map(String::from)
                .unwrap_or_else(|| c.to_uppercase().collect())
        } else {
            c.to_string()
        };
    }
}

/// Key identity for a kitty / modifyOtherKeys key code. Text is left empty.
fn key_for_code(code: u32) -> KeyEvent {
    let (code, modifiers) = match code {
        8 | 127 | 57347 => (KeyCode::Backspace, KeyModifiers::NONE),
        9 | 57346 => (KeyCode::Tab, KeyModifiers::NONE),
        13 | 57345 => (KeyCode::Enter, KeyModifiers::NONE),
        27 | 57344 => (KeyCode::Esc, KeyModifiers::NONE),
        0 => (KeyCode::Char(' '), KeyModifiers::CONTROL),
        1..=26 => (KeyCode::Char(char::from(code as u8 + 0x60)), KeyModifiers::CONTROL),
        28..=31 => (KeyCode::Char(char::from(code as u8 + 0x40)), KeyModifiers::CONTROL),
        57348..=57454 => (functional_key(code), KeyModifiers::NONE),
        _ => (
            KeyCode::Char(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER)),
            KeyModifiers::NONE,
        ),
    };
    KeyEvent::new(code, modifiers).with_text("")
}

/// Kitty's private-use functional key codes.
fn functional_key(code: u32) -> KeyCode {
    match code {
        57348 | 57425 => KeyCode::Insert,
        57349 | 57426 => KeyCode::Delete,
        57350 | 57417 => KeyCode::Left,
        57351 | 57418 => KeyCode::Right,
        57352 | 57419 => KeyCode::Up,
        57353 | 57420 => KeyCode::Down,
        57354 | 57421 => KeyCode::PageUp,
        57355 | 57422 => KeyCode::PageDown,
        57356 | 57423 => KeyCode::Home,
        57357 | 57424 => KeyCode::End,
        57358 => KeyCode::CapsLock,
        57359 => KeyCode::ScrollLock,
        57360 => KeyCode::NumLock,
        57361 => KeyCode::PrintScreen,
        57362 => KeyCode::Pause,
        57363 => KeyCode::Menu,
        57364..=57398 => KeyCode::F((code - 57363) as u8),
        57399..=57408 => KeyCode::Char(char::from(b'0' + (code - 57399) as u8)),
        57409 => KeyCode::Char('.'),
        57410 => KeyCode::Char('/'),
        57411 => KeyCode::Char('*'),
        57412 => KeyCode::Char('-'),
        57413 => KeyCode::Char('+'),
        57414 => KeyCode::Enter,
        57415 => KeyCode::Char('='),
        57416 => KeyCode::Char(','),
        57427 => KeyCode::KeypadBegin,
        57428 => KeyCode::Media(MediaKeyCode::Play),
        57429 => KeyCode::Media(MediaKeyCode::Pause),
        57430 => KeyCode::Media(MediaKeyCode::PlayPause),
        57431 => KeyCode::Media(MediaKeyCode::Reverse),
        57432 => KeyCode::Media(MediaKeyCode::Stop),
        57433 => KeyCode::Media(MediaKeyCode::FastForward),
        57434 => KeyCode::Media(MediaKeyCode::Rewind),
        57435 => KeyCode::Media(MediaKeyCode::TrackNext),
        57436 => KeyCode::Media(MediaKeyCode::TrackPrevious),
        57437 => KeyCode::Media(MediaKeyCode::Record),
        57438 => KeyCode::Media(MediaKeyCode::LowerVolume),
        57439 => KeyCode::Media(MediaKeyCode::RaiseVolume),
        57440 => KeyCode::Media(MediaKeyCode::MuteVolume),
        57441 => KeyCode::Modifier(ModifierKeyCode::LeftShift),
        57442 => KeyCode::Modifier(ModifierKeyCode::LeftControl),
        57443 => KeyCode::Modifier(ModifierKeyCode::LeftAlt),
        57444 => KeyCode::Modifier(ModifierKeyCode::LeftSuper),
        57445 => KeyCode::Modifier(ModifierKeyCode::LeftHyper),
        57446 => KeyCode::Modifier(ModifierKeyCode::LeftMeta),
        57447 => KeyCode::Modifier(ModifierKeyCode::RightShift),
        57448 => KeyCode::Modifier(ModifierKeyCode::RightControl),
        57449 => KeyCode::Modifier(ModifierKeyCode::RightAlt),
        57450 => KeyCode::Modifier(ModifierKeyCode::RightSuper),
        57451 => KeyCode::Modifier(ModifierKeyCode::RightHyper),
        57452 => KeyCode::Modifier(ModifierKeyCode::RightMeta),
        57453 => KeyCode::Modifier(ModifierKeyCode::IsoLevel3Shift),
        _ => KeyCode::Modifier(ModifierKeyCode::IsoLevel5Shift),
    }
}

/// Modifier parameter `p` encodes `p - 1` as a bitmask:
/// shift 1, alt 2, ctrl 4, super 8, hyper 16, meta 32 (lock bits ignored).
fn apply_modifier_param(key: &mut KeyEvent, param: Option<u32>) {
    let Some(bits) = param.filter(|&p| p > 1).map(|p| p - 1) else {
        return;
    };
    let mut modifiers = KeyModifiers::NONE;
    if bits & 1 != 0 {
        modifiers |= KeyModifiers::SHIFT;
    }
    if bits & 2 != 0 {
        modifiers |= KeyModifiers::ALT;
    }
    if bits & 4 != 0 {
        modifiers |= KeyModifiers::CONTROL;
    }
    if bits & 8 != 0 {
        modifiers |= KeyModifiers::SUPER;
    }
    if bits & 16 != 0 {
        modifiers |= KeyModifiers::HYPER;
    }
    if bits & 32 != 0 {
        modifiers |= KeyModifiers::META;
    }
    key.modifiers |= modifiers;
    if !key.modifiers.difference(KeyModifiers::SHIFT).is_empty() {
        key.text.clear();
    }
}

fn event_kind(param: Option<u32>) -> KeyEventKind {
    match param {
        Some(2) => KeyEventKind::Repeat,
        Some(3) => KeyEventKind::Release,
        _ => KeyEventKind::Press,
    }
}

fn parse_ss3(buf: &[u8], force: bool) -> Step {
    if buf.len() == 2 {
        return if force {
            Step::key(2, alt(printable_key('O')))
        } else {
            Step::Incomplete
        };
    }

    let mut i = 2;
    let mut modifier = 0u32;
    while let Some(&b) = buf.get(i) {
        if !b.is_ascii_digit() {
            break;
        }
        modifier = modifier.saturating_mul(10).saturating_add(u32::from(b - b'0'));
        i += 1;
    }

    let Some(&gl) = buf.get(i) else {
        return Step::pending(buf, force);
    };
    if !(0x21..=0x7e).contains(&gl) {
        return Step::Skip(i);
    }
    i += 1;

    let mut key = match gl {
        b'A'..=b'D' | b'E' | b'F' | b'H' | b'P'..=b'S' => match letter_key(gl) {
            Some(key) => key,
            None => return Step::Skip(i),
        },
        b'a' => KeyEvent::new(KeyCode::Up, KeyModifiers::CONTROL),
        b'b' => KeyEvent::new(KeyCode::Down, KeyModifiers::CONTROL),
        b'c' => KeyEvent::new(KeyCode::Right, KeyModifiers::CONTROL),
        b'd' => KeyEvent::new(KeyCode::Left, KeyModifiers::CONTROL),
        b'M' => KeyEvent::from(KeyCode::Enter),
        b'X' => KeyEvent::char('='),
        b'j' => KeyEvent::char('*'),
        b'k' => KeyEvent::char('+'),
        b'l' => KeyEvent::char(','),
        b'm' => KeyEvent::char('-'),
        b'n' => KeyEvent::char('.'),
        b'o' => KeyEvent::char('/'),
        b'p'..=b'y' => KeyEvent::char(char::from(b'0' + (gl - b'p'))),
        _ => return Step::Skip(i),
    };
    apply_modifier_param(&mut key, Some(modifier));
    Step::key(i, key)
}

enum StringEnd {
    /// Terminated: payload ends at `end`, sequence length is `next`.
    Found { end: usize, next: usize },
    /// An `ESC` that does not start `ST` interrupted the string.
    Broken(usize),
    Open,
}

fn string_end(buf: &[u8], from: usize, allow_bel: bool) -> StringEnd {
    let mut i = from;
    while let Some(&b) = buf.get(i) {
        if b == BEL && allow_bel {
            return StringEnd::Found { end: i, next: i + 1 };
        }
        if b == ESC {
            return match buf.get(i + 1) {
                Some(b'\\') => StringEnd::Found { end: i, next: i + 2 },
                Some(_) => StringEnd::Broken(i),
                None => StringEnd::Open,
            };
        }
        i += 1;
    }
    StringEnd::Open
}

fn parse_osc(buf: &[u8], force: bool) -> Step {
    if buf.len() == 2 && force {
        return Step::key(2, alt(KeyEvent::char(']')));
    }

    let (end, n) = match string_end(buf, 2, true) {
        StringEnd::Found { end, next } => (end, next),
        StringEnd::Broken(at) => return Step::Skip(at),
        StringEnd::Open => return Step::pending(buf, force),
    };

    let body = String::from_utf8_lossy(&buf[2..end]);
    if let Some(title) = body.strip_prefix('l') {
        return Step::capability(n, CapabilityEvent::WindowTitle(title.to_string()));
    }

    let (command, data) = body.split_once(';').unwrap_or((&body, ""));
    if command == "52" {
        return match clipboard_contents(data) {
            Some(text) => Step::capability(n, CapabilityEvent::Clipboard(text)),
            None => Step::Skip(n),
        };
    }
    let color = Rgb::parse_xcolor(data);
    match (command, color) {
        ("10", Some(c)) => Step::capability(n, CapabilityEvent::ForegroundColor(c)),
        ("11", Some(c)) => Step::capability(n, CapabilityEvent::BackgroundColor(c)),
        ("12", Some(c)) => Step::capability(n, CapabilityEvent::CursorColor(c)),
        _ => Step::Skip(n),
    }
}

/// `<selection>;<base64>` from an OSC 52 reply.
fn clipboard_contents(data: &str) -> Option<String> {
    let (_selection, payload) = data.split_once(';')?;
    if payload == "?" {
        return None;
    }
    let bytes = STANDARD.decode(payload.trim()).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

fn parse_dcs(buf: &[u8], force: bool) -> Step {
    if buf.len() == 2 && force {
        return Step::key(2, alt(printable_key('P')));
    }

    let (end, n) = match string_end(buf, 2, false) {
        StringEnd::Found { end, next } => (end, next),
        StringEnd::Broken(at) => return Step::Skip(at),
        StringEnd::Open => return Step::pending(buf, force),
    };

    match buf[2..end].strip_prefix(b">|") {
        Some(version) => Step::capability(
            n,
            CapabilityEvent::TerminalVersion(String::from_utf8_lossy(version).into_owned()),
        ),
        None => Step::Skip(n),
    }
}

/// APC, PM and SOS strings carry nothing the runtime asks for.
fn parse_ignored_string(buf: &[u8], force: bool) -> Step {
    if buf.len() == 2 && force {
        return match parse(&buf[1..], true) {
            Step::Emit(_, Token::Input(InputEvent::Key(key))) => Step::key(2, alt(key)),
            _ => Step::Skip(2),
        };
    }
    match string_end(buf, 2, false) {
        StringEnd::Found { next, .. } => Step::Skip(next),
        StringEnd::Broken(at) => Step::Skip(at),
        StringEnd::Open => Step::pending(buf, force),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Length of the longest suffix of `buf` that is a proper prefix of `marker`.
fn partial_suffix(buf: &[u8], marker: &[u8]) -> usize {
    (1..marker.len())
        .rev()
        .find(|&len| buf.len() >= len && buf[buf.len() - len..] == marker[..len])
        .unwrap_or(0)
}

fn append_capped(paste: &mut Vec<u8>, bytes: &[u8]) {
    let room = MAX_PASTE_LEN.saturating_sub(paste.len());
    paste.extend_from_slice(&bytes[..bytes.len().min(room)]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{MouseButton, MouseEventKind};

    fn decode(bytes: &[u8]) -> Vec<InputEvent> {
        let mut decoder = Decoder::new();
        let mut events = decoder.feed(bytes);
        events.extend(decoder.flush());
        events
    }

    fn keys(bytes: &[u8]) -> Vec<String> {
        decode(bytes)
            .into_iter()
            .filter_map(|e| match e {
                InputEvent::Key(k) => Some(k.to_string()),
                _ => None,
            })
            .collect()
    }

    fn single_key(bytes: &[u8]) -> KeyEvent {
        match decode(bytes).as_slice() {
            [InputEvent::Key(k)] => k.clone(),
            other => panic!("Expected one key for {bytes:?}, got {other:?}"),
        }
    }

    #[test]
    fn ctrl_c_round_trip() {
        let key = single_key(b"\x03");
        assert_eq!(key.to_string(), "ctrl+c");
        assert!(key.matches("ctrl+c"));
    }

    #[test]
    fn canonical_sequences_round_trip() {
        let cases: &[(&[u8], &str)] = &[
            (b"a", "a"),
            (b"A", "A"),
            (b" ", "space"),
            (b"\t", "tab"),
            (b"\r", "enter"),
            (b"\x7f", "backspace"),
            (b"\x08", "ctrl+h"),
            (b"\x0a", "ctrl+j"),
            (b"\x00", "ctrl+space"),
            (b"\x01", "ctrl+a"),
            (b"\x1c", "ctrl+\\"),
            (b"\x1f", "ctrl+_"),
            (b"\x1b[A", "up"),
            (b"\x1b[B", "down"),
            (b"\x1b[C", "right"),
            (b"\x1b[D", "left"),
            (b"\x1b[H", "home"),
            (b"\x1b[F", "end"),
            (b"\x1b[Z", "shift+tab"),
            (b"\x1b[1;2A", "shift+up"),
            (b"\x1b[1;3B", "alt+down"),
            (b"\x1b[1;5C", "ctrl+right"),
            (b"\x1b[1;6D", "ctrl+shift+left"),
            (b"\x1bOA", "up"),
            (b"\x1bOP", "f1"),
            (b"\x1bOS", "f4"),
            (b"\x1bOa", "ctrl+up"),
            (b"\x1b[2~", "insert"),
            (b"\x1b[3~", "delete"),
            (b"\x1b[3;2~", "shift+delete"),
            (b"\x1b[5~", "pgup"),
            (b"\x1b[6~", "pgdown"),
            (b"\x1b[15~", "f5"),
            (b"\x1b[24~", "f12"),
            (b"\x1b[24;5~", "ctrl+f12"),
            (b"\x1b[7$", "shift+home"),
            (b"\x1b[5^", "ctrl+pgup"),
            (b"\x1b[a", "shift+up"),
            (b"\x1ba", "alt+a"),
            (b"\x1bA", "alt+shift+a"),
            (b"\x1b\x01", "ctrl+alt+a"),
            (b"\x1b\r", "alt+enter"),
            (b"\x1b\x1b[A", "alt+up"),
            (b"\x1b[99;5u", "ctrl+c"),
            (b"\x1b[105;5u", "ctrl+i"),
            (b"\x1b[9;5u", "ctrl+tab"),
            (b"\x1b[13;2u", "shift+enter"),
            (b"\x1b[27u", "esc"),
            (b"\x1b[97;7u", "ctrl+alt+a"),
            (b"\x1b[57399u", "0"),
            (b"\x1b[57441;2u", "shift+leftshift"),
            (b"\x1b[27;5;105~", "ctrl+i"),
            (b"\x1b[27;2;13~", "shift+enter"),
        ];
        for (bytes, expected) in cases {
            assert_eq!(
                single_key(bytes).to_string(),
                *expected,
                "decoding {bytes:?}"
            );
        }
    }

    #[test]
    fn ctrl_i_and_tab_are_distinct_with_kitty() {
        let tab = single_key(b"\t");
        let ctrl_i = single_key(b"\x1b[105;5u");
        assert_eq!(tab.code, KeyCode::Tab);
        assert_eq!(ctrl_i.code, KeyCode::Char('i'));
        assert_ne!(tab.keystroke(), ctrl_i.keystroke());
    }

    #[test]
    fn utf8_text() {
        assert_eq!(keys("é€😀".as_bytes()), vec!["é", "€", "😀"]);
    }

    #[test]
    fn utf8_split_across_feeds() {
        let mut decoder = Decoder::new();
        assert!(decoder.feed(b"\xe2\x82").is_empty());
        assert!(decoder.has_pending());
        let events = decoder.feed(b"\xac");
        assert_eq!(events, vec![InputEvent::Key(KeyEvent::char('€'))]);
        assert!(!decoder.has_pending());
    }

    #[test]
    fn invalid_utf8_becomes_one_replacement() {
        assert_eq!(keys(b"\xffa"), vec!["\u{fffd}", "a"]);
        assert_eq!(keys(b"\x80\x80\x80b"), vec!["\u{fffd}", "b"]);
        assert_eq!(keys(b"\xe2(a"), vec!["\u{fffd}", "(", "a"]);
    }

    #[test]
    fn overlong_and_surrogate_forms_become_one_replacement() {
        assert_eq!(keys(b"\xe0\x80a"), vec!["\u{fffd}", "a"]);
        assert_eq!(keys(b"\xe0\x80\x80b"), vec!["\u{fffd}", "b"]);
        assert_eq!(keys(b"\xf0\x80\x80\x80c"), vec!["\u{fffd}", "c"]);
        assert_eq!(keys(b"\xed\xa0\x80d"), vec!["\u{fffd}", "d"]);
        assert_eq!(keys(b"\xf4\x90\x80\x80"), vec!["\u{fffd}"]);
    }

    #[test]
    fn lone_escape_waits_for_timeout() {
        let mut decoder = Decoder::new();
        assert!(decoder.feed(b"\x1b").is_empty());
        assert!(decoder.has_pending());
        let events = decoder.flush();
        assert_eq!(events, vec![InputEvent::Key(KeyEvent::from(KeyCode::Esc))]);
        assert!(!decoder.has_pending());
    }

    #[test]
    fn escape_then_bracket_resolves_to_alt_on_flush() {
        let mut decoder = Decoder::new();
        assert!(decoder.feed(b"\x1b[").is_empty());
        let events = decoder.flush();
        match events.as_slice() {
            [InputEvent::Key(k)] => assert_eq!(k.to_string(), "alt+["),
            other => panic!("Expected alt+[, got {other:?}"),
        }
    }

    #[test]
    fn sequence_split_across_feeds() {
        let mut decoder = Decoder::new();
        assert!(decoder.feed(b"\x1b[1;").is_empty());
        let events = decoder.feed(b"5A");
        match events.as_slice() {
            [InputEvent::Key(k)] => assert_eq!(k.to_string(), "ctrl+up"),
            other => panic!("Expected ctrl+up, got {other:?}"),
        }
    }

    #[test]
    fn kitty_release_and_repeat() {
        let release = single_key(b"\x1b[97;1:3u");
        assert_eq!(release.code, KeyCode::Char('a'));
        assert!(release.is_release());

        let repeat = single_key(b"\x1b[97;1:2u");
        assert!(repeat.is_repeat());

        let arrow = single_key(b"\x1b[1;1:3A");
        assert_eq!(arrow.code, KeyCode::Up);
        assert!(arrow.is_release());
    }

    #[test]
    fn kitty_text_and_alternates() {
        let key = single_key(b"\x1b[97:65;2;65u");
        assert_eq!(key.keystroke(), "shift+a");
        assert_eq!(key.text, "A");
        assert_eq!(key.shifted, Some('A'));

        let key = single_key(b"\x1b[97;2u");
        assert_eq!(key.text, "A");
    }

    #[test]
    fn sgr_mouse() {
        let events = decode(b"\x1b[<0;10;5M\x1b[<0;10;5m\x1b[<65;1;1M");
        let mice: Vec<MouseEvent> = events
            .into_iter()
            .filter_map(|e| match e {
                InputEvent::Mouse(m) => Some(m),
                _ => None,
            })
            .collect();
        assert_eq!(mice.len(), 3);
        assert_eq!(mice[0].kind, MouseEventKind::Down(MouseButton::Left));
        assert_eq!((mice[0].column, mice[0].row), (9, 4));
        assert_eq!(mice[1].kind, MouseEventKind::Up(MouseButton::Left));
        assert_eq!(mice[2].kind, MouseEventKind::ScrollDown);
    }

    #[test]
    fn x10_mouse() {
        match decode(b"\x1b[M\x20\x21\x22").as_slice() {
            [InputEvent::Mouse(m)] => {
                assert_eq!(m.kind, MouseEventKind::Down(MouseButton::Left));
                assert_eq!((m.column, m.row), (0, 1));
            }
            other => panic!("Expected X10 mouse, got {other:?}"),
        }
    }

    #[test]
    fn x10_mouse_waits_for_payload() {
        let mut decoder = Decoder::new();
        assert!(decoder.feed(b"\x1b[M\x20").is_empty());
        let events = decoder.feed(b"\x21\x21");
        assert!(matches!(events.as_slice(), [InputEvent::Mouse(_)]));
    }

    #[test]
    fn urxvt_mouse() {
        match decode(b"\x1b[34;2;3M").as_slice() {
            [InputEvent::Mouse(m)] => {
                assert_eq!(m.kind, MouseEventKind::Down(MouseButton::Right));
                assert_eq!((m.column, m.row), (1, 2));
            }
            other => panic!("Expected urxvt mouse, got {other:?}"),
        }
    }

    #[test]
    fn bracketed_paste_is_one_event() {
        let events = decode(b"\x1b[200~hello\x1b[Aworld\x1b[201~x");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], InputEvent::Paste("hello\x1b[Aworld".into()));
        assert_eq!(events[1], InputEvent::Key(KeyEvent::char('x')));
    }

    #[test]
    fn bracketed_paste_split_end_marker() {
        let mut decoder = Decoder::new();
        assert!(decoder.feed(b"\x1b[200~he").is_empty());
        assert!(decoder.in_paste());
        assert!(decoder.feed(b"llo\x1b[20").is_empty());
        assert!(decoder.flush().is_empty());
        let events = decoder.feed(b"1~x");
        assert_eq!(
            events,
            vec![
                InputEvent::Paste("hello".into()),
                InputEvent::Key(KeyEvent::char('x'))
            ]
        );
    }

    #[test]
    fn focus_and_blur() {
        assert_eq!(decode(b"\x1b[I\x1b[O"), vec![InputEvent::Focus, InputEvent::Blur]);
    }

    #[test]
    fn osc_background_color() {
        assert_eq!(
            decode(b"\x1b]11;rgb:0000/0000/0000\x07"),
            vec![InputEvent::Capability(CapabilityEvent::BackgroundColor(Rgb::new(0, 0, 0)))]
        );
        assert_eq!(
            decode(b"\x1b]10;rgb:ffff/ffff/ffff\x1b\\"),
            vec![InputEvent::Capability(CapabilityEvent::ForegroundColor(Rgb::new(
                255, 255, 255
            )))]
        );
    }

    #[test]
    fn capability_replies() {
        assert_eq!(
            decode(b"\x1b[?1u"),
            vec![InputEvent::Capability(CapabilityEvent::KeyboardEnhancements(
                KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
            ))]
        );
        assert_eq!(
            decode(b"\x1b[?62;22c"),
            vec![InputEvent::Capability(CapabilityEvent::DeviceAttributes(vec![62, 22]))]
        );
        assert_eq!(
            decode(b"\x1b[?2026;2$y"),
            vec![InputEvent::Capability(CapabilityEvent::ModeReport {
                mode: 2026,
                setting: 2
            })]
        );
        assert_eq!(
            decode(b"\x1b[10;20R"),
            vec![InputEvent::Capability(CapabilityEvent::CursorPosition {
                column: 19,
                row: 9
            })]
        );
        assert_eq!(
            decode(b"\x1b[8;24;80t"),
            vec![InputEvent::Resize {
                columns: 80,
                rows: 24
            }]
        );
        assert_eq!(
            decode(b"\x1bP>|kitty(0.31.0)\x1b\\"),
            vec![InputEvent::Capability(CapabilityEvent::TerminalVersion(
                "kitty(0.31.0)".into()
            ))]
        );
        assert_eq!(
            decode(b"\x1b]lmy title\x1b\\"),
            vec![InputEvent::Capability(CapabilityEvent::WindowTitle("my title".into()))]
        );
    }

    #[test]
    fn osc52_reply_is_decoded() {
        assert_eq!(
            decode(b"\x1b]52;c;aGVsbG8=\x07"),
            vec![InputEvent::Capability(CapabilityEvent::Clipboard("hello".into()))]
        );
        assert_eq!(
            decode(b"\x1b]52;p;\x1b\\"),
            vec![InputEvent::Capability(CapabilityEvent::Clipboard(String::new()))]
        );
        // Undecodable payloads are dropped without eating what follows.
        assert_eq!(keys(b"\x1b]52;c;!!!\x07x"), vec!["x"]);
    }

    #[test]
    fn ambiguous_f3_reports_both() {
        let events = decode(b"\x1b[1;5R");
        assert_eq!(events.len(), 2);
        match &events[0] {
            InputEvent::Key(k) => assert_eq!(k.to_string(), "ctrl+f3"),
            other => panic!("Expected ctrl+f3, got {other:?}"),
        }
        assert_eq!(
            events[1],
            InputEvent::Capability(CapabilityEvent::CursorPosition { column: 4, row: 0 })
        );
    }

    #[test]
    fn unknown_sequence_then_printable() {
        assert_eq!(keys(b"\x1b[999zq"), vec!["q"]);
        assert_eq!(decode(b"\x1b[999zq").len(), 1);
    }

    #[test]
    fn malformed_sequence_resyncs_on_escape() {
        assert_eq!(keys(b"\x1b[1;5\x1b[A"), vec!["up"]);
    }

    #[test]
    fn malformed_sequence_resyncs_on_control() {
        assert_eq!(keys(b"\x1b[12\x03x"), vec!["ctrl+c", "x"]);
    }

    #[test]
    fn broken_osc_resyncs() {
        assert_eq!(keys(b"\x1b]11;rgb:00\x1bOA"), vec!["up"]);
    }

    #[test]
    fn oversized_sequence_is_abandoned() {
        let mut decoder = Decoder::new();
        let mut garbage = b"\x1b[".to_vec();
        garbage.extend(std::iter::repeat(b'1').take(MAX_SEQUENCE_LEN + 10));
        assert!(decoder.feed(&garbage).is_empty());
        assert!(!decoder.has_pending());
        let events = decoder.feed(b"x");
        assert_eq!(events, vec![InputEvent::Key(KeyEvent::char('x'))]);
    }

    #[test]
    fn paste_is_capped() {
        let mut decoder = Decoder::new();
        decoder.feed(b"\x1b[200~");
        let chunk = vec![b'a'; 64 * 1024];
        for _ in 0..20 {
            decoder.feed(&chunk);
        }
        let events = decoder.feed(b"\x1b[201~");
        match events.as_slice() {
            [InputEvent::Paste(text)] => assert_eq!(text.len(), MAX_PASTE_LEN),
            other => panic!("Expected capped paste, got {} events", other.len()),
        }
    }

    #[test]
    fn events_iterator_flushes_at_eof() {
        let input: &[u8] = b"\x1b[Ax\x1b";
        let decoded: Vec<String> = events(input)
            .map(|e| match e {
                Ok(InputEvent::Key(k)) => k.to_string(),
                other => panic!("Expected key, got {other:?}"),
            })
            .collect();
        assert_eq!(decoded, vec!["up", "x", "esc"]);
    }
}
