//! Terminal controller: raw mode, environment, capability cache, and size.
//!
//! Everything here is about the terminal *as a device*: whether raw mode is
//! on, what the environment says about it, what it answered when asked, and
//! how to put it back the way it was if the process panics.

use crate::color::{ColorProfile, Rgb};
use crate::event::{CapabilityEvent, Query};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use crossterm::event::KeyboardEnhancementFlags;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::collections::{HashMap, VecDeque};
use std::io::{self, Write};
use std::sync::{Arc, Mutex, Once, RwLock};
use tracing::{debug, warn};

/// Snapshot of environment variables.
///
/// The runtime reads `TERM`, `COLORTERM`, `NO_COLOR`, `COLUMNS` and friends
/// through this instead of the process environment so that tests and
/// embedders can supply their own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    /// Capture the current process environment. Non-UTF-8 entries are skipped.
    pub fn from_process() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        Self { vars }
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let vars = pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self { vars }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// `COLUMNS` x `LINES`, when both are set to positive numbers.
    pub fn size_hint(&self) -> Option<(u16, u16)> {
        let columns = self.get("COLUMNS")?.trim().parse::<u16>().ok()?;
        let rows = self.get("LINES")?.trim().parse::<u16>().ok()?;
        (columns > 0 && rows > 0).then_some((columns, rows))
    }
}

/// What the runtime knows about the attached terminal.
///
/// Shared between the event loop (which fills it in as replies arrive) and
/// [`ProgramHandle::capabilities`](crate::ProgramHandle::capabilities).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Capabilities {
    pub color_profile: ColorProfile,
    pub background: Option<Rgb>,
    pub foreground: Option<Rgb>,
    /// Keyboard enhancements the terminal confirmed. `None` until it answers.
    pub keyboard: Option<KeyboardEnhancementFlags>,
    pub terminal_version: Option<String>,
    /// Whether the terminal recognises synchronized output (mode 2026).
    /// `None` until it answers.
    pub synchronized_output: Option<bool>,
    /// Columns x rows.
    pub size: (u16, u16),
}

impl Capabilities {
    /// Whether the background is dark. Assumed dark until the terminal says
    /// otherwise.
    pub fn has_dark_background(&self) -> bool {
        self.background.is_none_or(|c| c.is_dark())
    }

    pub fn supports_keyboard_enhancements(&self) -> bool {
        self.keyboard.is_some_and(|flags| !flags.is_empty())
    }

    pub(crate) fn apply(&mut self, event: &CapabilityEvent) {
        match event {
            CapabilityEvent::ColorProfile(profile) => self.color_profile = *profile,
            CapabilityEvent::BackgroundColor(c) => self.background = Some(*c),
            CapabilityEvent::ForegroundColor(c) => self.foreground = Some(*c),
            CapabilityEvent::KeyboardEnhancements(flags) => self.keyboard = Some(*flags),
            CapabilityEvent::TerminalVersion(v) => self.terminal_version = Some(v.clone()),
            CapabilityEvent::ModeReport {
                mode: SYNCHRONIZED_OUTPUT_MODE,
                setting,
            } => self.synchronized_output = Some(matches!(*setting, 1..=3)),
            CapabilityEvent::Unsupported(Query::SynchronizedOutput) => {
                self.synchronized_output = Some(false)
            }
            _ => {}
        }
    }
}

/// DEC private mode that batches screen updates between set and reset.
pub(crate) const SYNCHRONIZED_OUTPUT_MODE: u32 = 2026;

pub(crate) type SharedCapabilities = Arc<RwLock<Capabilities>>;

/// Primary device attributes request. Every terminal answers it, and answers
/// in order, so its reply marks the end of the replies to earlier queries.
const DEVICE_ATTRIBUTES: &str = "\x1b[c";

/// Device attributes requests a terminal may leave unanswered before the
/// oldest markers that have already timed out are forgotten.
const MAX_OUTSTANDING: usize = 16;

/// Queries sent together, closed by one device attributes request.
#[derive(Debug)]
struct Batch {
    generation: u64,
    queries: Vec<Query>,
}

/// Outstanding capability queries, oldest batch first.
#[derive(Debug, Default)]
pub(crate) struct Probe {
    batches: VecDeque<Batch>,
    next_generation: u64,
}

impl Probe {
    /// Queries sent when the program attaches to a terminal.
    pub(crate) const STARTUP: [Query; 3] = [
        Query::BackgroundColor,
        Query::KeyboardEnhancements,
        Query::SynchronizedOutput,
    ];

    /// Register `queries` as a new batch. Returns the batch's generation and
    /// the bytes that ask them.
    pub(crate) fn ask(&mut self, queries: &[Query]) -> (u64, String) {
        let generation = self.next_generation;
        self.next_generation += 1;

        let mut pending = Vec::with_capacity(queries.len());
        let mut out = String::new();
        for &query in queries {
            if !pending.contains(&query) {
                pending.push(query);
            }
            out.push_str(query.sequence());
        }
        out.push_str(DEVICE_ATTRIBUTES);

        while self.batches.len() >= MAX_OUTSTANDING
            && self.batches.front().is_some_and(|b| b.queries.is_empty())
        {
            self.batches.pop_front();
        }
        self.batches.push_back(Batch {
            generation,
            queries: pending,
        });
        (generation, out)
    }

    pub(crate) fn is_waiting(&self) -> bool {
        self.batches.iter().any(|b| !b.queries.is_empty())
    }

    /// Note a reply. Returns the queries given up on: a device attributes
    /// reply closes the oldest batch, so whatever it still holds was not
    /// understood.
    pub(crate) fn observe(&mut self, event: &CapabilityEvent) -> Vec<Query> {
        let answered = match event {
            CapabilityEvent::BackgroundColor(_) => Query::BackgroundColor,
            CapabilityEvent::ForegroundColor(_) => Query::ForegroundColor,
            CapabilityEvent::KeyboardEnhancements(_) => Query::KeyboardEnhancements,
            CapabilityEvent::CursorPosition { .. } => Query::CursorPosition,
            CapabilityEvent::TerminalVersion(_) => Query::TerminalVersion,
            CapabilityEvent::ModeReport {
                mode: SYNCHRONIZED_OUTPUT_MODE,
                ..
            } => Query::SynchronizedOutput,
            CapabilityEvent::DeviceAttributes(_) => {
                return self
                    .batches
                    .pop_front()
                    .map(|b| b.queries)
                    .unwrap_or_default();
            }
            _ => return Vec::new(),
        };
        self.resolve(answered);
        Vec::new()
    }

    /// Mark the oldest pending `query` answered.
    pub(crate) fn resolve(&mut self, query: Query) {
        if let Some(batch) = self.batches.iter_mut().find(|b| b.queries.contains(&query)) {
            batch.queries.retain(|q| *q != query);
        }
    }

    /// Give up on what is left of batch `generation`. Its marker stays so
    /// that a late device attributes reply still closes the right batch.
    pub(crate) fn expire(&mut self, generation: u64) -> Vec<Query> {
        self.batches
            .iter_mut()
            .find(|b| b.generation == generation)
            .map(|b| std::mem::take(&mut b.queries))
            .unwrap_or_default()
    }
}

/// Raw mode, restored on drop.
#[derive(Debug)]
pub struct RawModeGuard {
    active: bool,
}

impl RawModeGuard {
    pub fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        debug!("raw mode enabled");
        Ok(Self { active: true })
    }

    /// A guard that never touches the terminal, for headless runs.
    pub fn inactive() -> Self {
        Self { active: false }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Leave raw mode temporarily (exclusive access, suspend).
    pub fn suspend(&mut self) -> io::Result<()> {
        if self.active {
            disable_raw_mode()?;
        }
        Ok(())
    }

    /// Re-enter raw mode after [`suspend`](Self::suspend).
    pub fn resume(&mut self) -> io::Result<()> {
        if self.active {
            enable_raw_mode()?;
        }
        Ok(())
    }

    /// Leave raw mode for good.
    pub fn restore(&mut self) -> io::Result<()> {
        if std::mem::take(&mut self.active) {
            disable_raw_mode()?;
            debug!("raw mode disabled");
        }
        Ok(())
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            warn!(error = %e, "failed to leave raw mode");
        }
    }
}

/// A standard stream the panic hook can still reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StdStream {
    Stdout,
    Stderr,
}

impl StdStream {
    fn write_all(self, bytes: &[u8]) -> io::Result<()> {
        match self {
            StdStream::Stdout => {
                let mut out = io::stdout();
                out.write_all(bytes)?;
                out.flush()
            }
            StdStream::Stderr => {
                let mut out = io::stderr();
                out.write_all(bytes)?;
                out.flush()
            }
        }
    }
}

/// Everything the runtime may have switched on, switched back off.
pub(crate) const RESET_MODES: &str =
    "\x1b[?2004l\x1b[?1002l\x1b[?1003l\x1b[?1006l\x1b[?1004l\x1b[<u\x1b[>4;0m\x1b[0 q\x1b[?25h";

const LEAVE_ALT_SCREEN: &str = "\x1b[?1049l";

/// OSC 52 request for the clipboard contents.
pub(crate) const REQUEST_CLIPBOARD: &str = "\x1b]52;c;?\x07";

/// OSC 52 sequence that puts `text` on the clipboard.
pub(crate) fn set_clipboard(text: &str) -> String {
    format!("\x1b]52;c;{}\x07", STANDARD.encode(text.as_bytes()))
}

/// Best-effort terminal restore from a panicking thread.
fn emergency_restore(alt_screen: bool, stream: Option<StdStream>) {
    let _ = disable_raw_mode();
    if let Some(stream) = stream {
        let mut bytes = String::from(RESET_MODES);
        if alt_screen {
            bytes.push_str(LEAVE_ALT_SCREEN);
        }
        let _ = stream.write_all(bytes.as_bytes());
    }
}

/// Restore settings of the most recently started program, read by the
/// panic hook when it fires.
static RESTORE: Mutex<Option<RestoreSettings>> = Mutex::new(None);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RestoreSettings {
    alt_screen: bool,
    stream: Option<StdStream>,
}

fn restore_settings() -> Option<RestoreSettings> {
    match RESTORE.lock() {
        Ok(settings) => *settings,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

/// Install a panic hook that restores the terminal before the default hook
/// prints the message. The hook is installed once per process; later calls
/// only replace the settings it restores with.
///
/// Panics inside commands are recovered by the scheduler; those are logged
/// and leave the terminal untouched.
pub(crate) fn install_panic_hook(alt_screen: bool, stream: Option<StdStream>) {
    let settings = RestoreSettings { alt_screen, stream };
    match RESTORE.lock() {
        Ok(mut current) => *current = Some(settings),
        Err(poisoned) => *poisoned.into_inner() = Some(settings),
    }

    static HOOK_INSTALLED: Once = Once::new();
    HOOK_INSTALLED.call_once(|| {
        let original_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if crate::scheduler::is_recovering() {
                warn!(panic = %info, "recovered panic in command");
                return;
            }
            if let Some(RestoreSettings { alt_screen, stream }) = restore_settings() {
                emergency_restore(alt_screen, stream);
            }
            original_hook(info);
        }));
    });
}

/// Current terminal size as columns x rows.
///
/// Asks the terminal only when `attached`; otherwise falls back to
/// `initial`, then `COLUMNS`/`LINES`, then 80x24.
pub fn detect_size(attached: bool, initial: Option<(u16, u16)>, env: &Environment) -> (u16, u16) {
    let queried = if attached {
        crossterm::terminal::size()
            .ok()
            .filter(|&(w, h)| w > 0 && h > 0)
    } else {
        None
    };
    queried
        .or(initial)
        .or_else(|| env.size_hint())
        .unwrap_or((80, 24))
}
