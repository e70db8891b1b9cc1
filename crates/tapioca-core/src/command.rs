use crate::event::{CommandError, Event, Query};
use crossterm::event::KeyboardEnhancementFlags;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use std::fmt::Display;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A side effect returned from [`Model::update`](crate::Model::update) or [`Model::init`](crate::Model::init).
///
/// Commands are descriptions: nothing happens until the runtime's scheduler
/// executes them.  Asynchronous work runs on its own task and its result
/// comes back through the event queue, so `update` never waits.
///
/// # Examples
///
/// ```rust,ignore
/// // Do nothing:
/// let cmd = Command::none();
///
/// // Run an async task and map the result to a message:
/// let cmd = Command::perform(
///     async { fetch_data().await },
///     |data| Msg::DataLoaded(data),
/// );
///
/// // Load, then quit once the result has been delivered:
/// let cmd = Command::sequence([Command::perform(save(), Msg::Saved), Command::quit()]);
/// ```
pub struct Command<M: Send + 'static> {
    pub(crate) inner: CommandInner<M>,
}

pub(crate) enum CommandInner<M: Send + 'static> {
    None,
    Action(Action<M>),
    /// Resolves to at most one event.
    Future(BoxFuture<'static, Option<Event<M>>>),
    Stream(BoxStream<'static, Event<M>>),
    Batch(Vec<Command<M>>),
    Sequence(Vec<Command<M>>),
    Terminal(TerminalCommand),
    /// Work that needs the terminal to itself.
    Exclusive(Exclusive<M>),
}

/// Results the runtime can enqueue without spawning a task.
pub(crate) enum Action<M> {
    Event(Event<M>),
    Quit,
}

pub(crate) enum Exclusive<M> {
    Process {
        cmd: ExecCommand,
        on_exit: Box<dyn FnOnce(std::io::Result<std::process::ExitStatus>) -> M + Send>,
    },
    Task(Box<dyn FnOnce() -> Option<M> + Send>),
}

/// Terminal management commands executed by the runtime.
///
/// Sent via [`Command::terminal`] or convenience methods such as
/// [`Command::enter_alt_screen`] and [`Command::println`].  Mode changes
/// update the program's default display modes; a frame that carries its own
/// [`DisplayModes`](crate::DisplayModes) still wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalCommand {
    /// Switch to the alternate screen buffer.
    EnterAltScreen,
    /// Return to the primary screen buffer.
    ExitAltScreen,
    /// Enable mouse event reporting with the specified mode.
    EnableMouse(MouseMode),
    DisableMouse,
    EnableBracketedPaste,
    DisableBracketedPaste,
    /// Enable focus-in/focus-out event reporting.
    EnableFocusReporting,
    DisableFocusReporting,
    /// Ask for kitty keyboard protocol enhancements.
    PushKeyboardEnhancements(KeyboardEnhancementFlags),
    PopKeyboardEnhancements,
    /// Set the terminal window title.
    SetTitle(String),
    /// Clear the screen and redraw.
    ClearScreen,
    /// Redraw every line of the current frame.
    Repaint,
    /// Print a line above the frame (inline mode only).
    Println(String),
    /// Print pre-formatted text above the frame (inline mode only).
    Printf(String),
    /// Suspend the process (SIGTSTP on Unix). [`Event::Resume`] follows.
    Suspend,
    /// Ask the terminal something; the answer arrives as an event.
    Query(Query),
    /// Write bytes to the terminal verbatim, outside the renderer.
    Raw(String),
    /// Put text on the system clipboard (OSC 52).
    SetClipboard(String),
    /// Ask for the clipboard contents (OSC 52). Terminals that allow it
    /// answer with [`CapabilityEvent::Clipboard`](crate::CapabilityEvent::Clipboard).
    RequestClipboard,
}

/// Configuration for executing an external process via [`Command::exec`].
///
/// Build an `ExecCommand` using the builder pattern: call [`ExecCommand::new`],
/// then chain [`arg`](ExecCommand::arg), [`args`](ExecCommand::args), and
/// [`working_dir`](ExecCommand::working_dir) as needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCommand {
    /// The command to execute.
    pub program: String,
    /// Arguments to the command.
    pub args: Vec<String>,
    /// Working directory (None = inherit).
    pub working_dir: Option<PathBuf>,
}

impl ExecCommand {
    /// Create a new `ExecCommand` for the given program name or path.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    /// Append a single argument to the command.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append multiple arguments to the command.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory for the child process.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub(crate) fn to_process(&self) -> std::process::Command {
        let mut process = std::process::Command::new(&self.program);
        process.args(&self.args);
        if let Some(dir) = &self.working_dir {
            process.current_dir(dir);
        }
        process
            .stdin(std::process::Stdio::inherit())
            .stdout(std::process::Stdio::inherit())
            .stderr(std::process::Stdio::inherit());
        process
    }
}

/// Mouse reporting modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseMode {
    /// Click, release, wheel, drag.
    CellMotion,
    /// All of above + hover.
    AllMotion,
}

/// Terminal cursor shape styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CursorStyle {
    /// The user's default cursor shape as configured in the terminal.
    DefaultUserShape,
    /// A blinking block cursor.
    #[default]
    BlinkingBlock,
    /// A non-blinking (steady) block cursor.
    SteadyBlock,
    /// A blinking underscore cursor.
    BlinkingUnderScore,
    /// A non-blinking (steady) underscore cursor.
    SteadyUnderScore,
    /// A blinking vertical bar cursor.
    BlinkingBar,
    /// A non-blinking (steady) vertical bar cursor.
    SteadyBar,
}

impl<M: Send + 'static> Command<M> {
    /// No-op command.
    pub fn none() -> Self {
        Command {
            inner: CommandInner::None,
        }
    }

    /// Deliver a message on the next loop iteration.
    pub fn message(msg: M) -> Self {
        Self::event(Event::App(msg))
    }

    /// Deliver any event on the next loop iteration.
    pub fn event(event: Event<M>) -> Self {
        Command {
            inner: CommandInner::Action(Action::Event(event)),
        }
    }

    /// Stop the program once the events already queued ahead of it have
    /// been processed.
    pub fn quit() -> Self {
        Command {
            inner: CommandInner::Action(Action::Quit),
        }
    }

    /// Run an async future, map the result to a message.
    pub fn perform<F, T>(future: F, map: impl FnOnce(T) -> M + Send + 'static) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Command {
            inner: CommandInner::Future(Box::pin(async move { Some(Event::App(map(future.await))) })),
        }
    }

    /// Like [`perform`](Self::perform), for fallible work. An error arrives
    /// as [`Event::CommandFailed`].
    pub fn try_perform<F, T, E>(future: F, map: impl FnOnce(T) -> M + Send + 'static) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        E: Display,
    {
        Command {
            inner: CommandInner::Future(Box::pin(async move {
                Some(match future.await {
                    Ok(value) => Event::App(map(value)),
                    Err(e) => Event::CommandFailed(CommandError::Failed(e.to_string())),
                })
            })),
        }
    }

    /// Run a future for its side effect only.
    pub fn detach(future: impl Future<Output = ()> + Send + 'static) -> Self {
        Command {
            inner: CommandInner::Future(Box::pin(async move {
                future.await;
                None
            })),
        }
    }

    /// Deliver every item of a stream as a message.
    pub fn stream(stream: impl Stream<Item = M> + Send + 'static) -> Self {
        Command {
            inner: CommandInner::Stream(stream.map(Event::App).boxed()),
        }
    }

    /// Run multiple commands concurrently. Results arrive in completion order.
    pub fn batch(cmds: impl IntoIterator<Item = Command<M>>) -> Self {
        let mut cmds: Vec<_> = cmds.into_iter().filter(|c| !c.is_none()).collect();
        match cmds.len() {
            0 => Command::none(),
            1 => cmds.pop().unwrap_or_else(Command::none),
            _ => Command {
                inner: CommandInner::Batch(cmds),
            },
        }
    }

    /// Run commands one after another: each command's result is enqueued
    /// before the next command starts.
    pub fn sequence(cmds: impl IntoIterator<Item = Command<M>>) -> Self {
        let mut cmds: Vec<_> = cmds.into_iter().filter(|c| !c.is_none()).collect();
        match cmds.len() {
            0 => Command::none(),
            1 => cmds.pop().unwrap_or_else(Command::none),
            _ => Command {
                inner: CommandInner::Sequence(cmds),
            },
        }
    }

    /// Terminal management command.
    pub fn terminal(cmd: TerminalCommand) -> Self {
        Command {
            inner: CommandInner::Terminal(cmd),
        }
    }

    /// Transform the message type (for component composition).
    pub fn map<N: Send + 'static>(self, f: impl Fn(M) -> N + Send + Sync + 'static) -> Command<N> {
        self.map_with(Arc::new(f))
    }

    fn map_with<N: Send + 'static>(self, f: Arc<dyn Fn(M) -> N + Send + Sync>) -> Command<N> {
        let inner = match self.inner {
            CommandInner::None => CommandInner::None,
            CommandInner::Action(Action::Event(event)) => {
                CommandInner::Action(Action::Event(event.map(|m| f(m))))
            }
            CommandInner::Action(Action::Quit) => CommandInner::Action(Action::Quit),
            CommandInner::Future(fut) => CommandInner::Future(Box::pin(async move {
                fut.await.map(|event| event.map(|m| f(m)))
            })),
            CommandInner::Stream(stream) => {
                CommandInner::Stream(stream.map(move |event| event.map(|m| f(m))).boxed())
            }
            CommandInner::Batch(cmds) => CommandInner::Batch(
                cmds.into_iter().map(|cmd| cmd.map_with(f.clone())).collect(),
            ),
            CommandInner::Sequence(cmds) => CommandInner::Sequence(
                cmds.into_iter().map(|cmd| cmd.map_with(f.clone())).collect(),
            ),
            CommandInner::Terminal(tcmd) => CommandInner::Terminal(tcmd),
            CommandInner::Exclusive(Exclusive::Process { cmd, on_exit }) => {
                CommandInner::Exclusive(Exclusive::Process {
                    cmd,
                    on_exit: Box::new(move |result| f(on_exit(result))),
                })
            }
            CommandInner::Exclusive(Exclusive::Task(task)) => {
                CommandInner::Exclusive(Exclusive::Task(Box::new(move || task().map(|m| f(m)))))
            }
        };
        Command { inner }
    }

    /// Execute an external process (e.g., `$EDITOR`) with the terminal
    /// released. The callback receives the process exit status.
    pub fn exec(
        cmd: ExecCommand,
        on_exit: impl FnOnce(std::io::Result<std::process::ExitStatus>) -> M + Send + 'static,
    ) -> Self {
        Command {
            inner: CommandInner::Exclusive(Exclusive::Process {
                cmd,
                on_exit: Box::new(on_exit),
            }),
        }
    }

    /// Run a blocking closure with the terminal released (input paused,
    /// raw mode off, screen restored) and take it back afterwards.
    pub fn exclusive(task: impl FnOnce() -> Option<M> + Send + 'static) -> Self {
        Command {
            inner: CommandInner::Exclusive(Exclusive::Task(Box::new(task))),
        }
    }

    /// One-shot timer: fires once after `duration`, mapping the instant to a message.
    pub fn tick(duration: Duration, map: impl FnOnce(Instant) -> M + Send + 'static) -> Self {
        Command {
            inner: CommandInner::Future(Box::pin(async move {
                tokio::time::sleep(duration).await;
                Some(Event::App(map(Instant::now())))
            })),
        }
    }

    /// One-shot timer aligned to the wall clock: fires at the next multiple
    /// of `interval` since the Unix epoch. Return another `every` from
    /// `update` to keep ticking.
    pub fn every(interval: Duration, map: impl FnOnce(Instant) -> M + Send + 'static) -> Self {
        let delay = until_next_boundary(SystemTime::now(), interval);
        Self::tick(delay, map)
    }

    /// Re-read the terminal size; an [`Event::Resize`] follows.
    pub fn window_size() -> Self {
        Self::query(Query::WindowSize)
    }

    /// Ask the terminal a capability query.
    pub fn query(query: Query) -> Self {
        Command::terminal(TerminalCommand::Query(query))
    }

    pub fn request_background_color() -> Self {
        Self::query(Query::BackgroundColor)
    }

    pub fn request_foreground_color() -> Self {
        Self::query(Query::ForegroundColor)
    }

    pub fn request_keyboard_enhancements() -> Self {
        Self::query(Query::KeyboardEnhancements)
    }

    pub fn request_cursor_position() -> Self {
        Self::query(Query::CursorPosition)
    }

    pub fn request_window_size() -> Self {
        Self::window_size()
    }

    pub fn request_terminal_version() -> Self {
        Self::query(Query::TerminalVersion)
    }

    /// Write `sequence` to the terminal as-is. The renderer does not know
    /// about it, so anything it changes on screen may be overwritten.
    pub fn raw(sequence: impl Into<String>) -> Self {
        Command::terminal(TerminalCommand::Raw(sequence.into()))
    }

    pub fn set_clipboard(text: impl Into<String>) -> Self {
        Command::terminal(TerminalCommand::SetClipboard(text.into()))
    }

    pub fn request_clipboard() -> Self {
        Command::terminal(TerminalCommand::RequestClipboard)
    }

    /// Print a line above the TUI area (for inline mode).
    pub fn println(text: impl Into<String>) -> Self {
        Command::terminal(TerminalCommand::Println(text.into()))
    }

    /// Print formatted text above the TUI area (for inline mode).
    pub fn printf(text: impl Into<String>) -> Self {
        Command::terminal(TerminalCommand::Printf(text.into()))
    }

    // Convenience terminal command constructors

    pub fn enter_alt_screen() -> Self {
        Command::terminal(TerminalCommand::EnterAltScreen)
    }

    pub fn exit_alt_screen() -> Self {
        Command::terminal(TerminalCommand::ExitAltScreen)
    }

    /// Mouse reporting for click, release, wheel and drag.
    pub fn enable_mouse_cell_motion() -> Self {
        Command::terminal(TerminalCommand::EnableMouse(MouseMode::CellMotion))
    }

    /// Mouse reporting including hover.
    pub fn enable_mouse_all_motion() -> Self {
        Command::terminal(TerminalCommand::EnableMouse(MouseMode::AllMotion))
    }

    pub fn disable_mouse() -> Self {
        Command::terminal(TerminalCommand::DisableMouse)
    }

    pub fn enable_bracketed_paste() -> Self {
        Command::terminal(TerminalCommand::EnableBracketedPaste)
    }

    pub fn disable_bracketed_paste() -> Self {
        Command::terminal(TerminalCommand::DisableBracketedPaste)
    }

    pub fn enable_focus_reporting() -> Self {
        Command::terminal(TerminalCommand::EnableFocusReporting)
    }

    pub fn disable_focus_reporting() -> Self {
        Command::terminal(TerminalCommand::DisableFocusReporting)
    }

    pub fn push_keyboard_enhancements(flags: KeyboardEnhancementFlags) -> Self {
        Command::terminal(TerminalCommand::PushKeyboardEnhancements(flags))
    }

    pub fn pop_keyboard_enhancements() -> Self {
        Command::terminal(TerminalCommand::PopKeyboardEnhancements)
    }

    pub fn set_title(title: impl Into<String>) -> Self {
        Command::terminal(TerminalCommand::SetTitle(title.into()))
    }

    pub fn clear_screen() -> Self {
        Command::terminal(TerminalCommand::ClearScreen)
    }

    pub fn repaint() -> Self {
        Command::terminal(TerminalCommand::Repaint)
    }

    /// Suspend the process (send SIGTSTP on Unix).
    pub fn suspend() -> Self {
        Command::terminal(TerminalCommand::Suspend)
    }

    // --- Inspection methods (useful for testing) ---

    /// Returns `true` if this is a no-op command.
    pub fn is_none(&self) -> bool {
        matches!(self.inner, CommandInner::None)
    }

    pub fn is_quit(&self) -> bool {
        matches!(self.inner, CommandInner::Action(Action::Quit))
    }

    /// If this command is an immediate message action, return it.
    pub fn into_message(self) -> Option<M> {
        match self.inner {
            CommandInner::Action(Action::Event(Event::App(msg))) => Some(msg),
            _ => None,
        }
    }

    /// If this command is a batch, return the inner commands.
    pub fn into_batch(self) -> Option<Vec<Command<M>>> {
        match self.inner {
            CommandInner::Batch(cmds) => Some(cmds),
            _ => None,
        }
    }

    /// If this command is a terminal command, return it.
    pub fn as_terminal(&self) -> Option<&TerminalCommand> {
        match &self.inner {
            CommandInner::Terminal(tcmd) => Some(tcmd),
            _ => None,
        }
    }
}

fn until_next_boundary(now: SystemTime, interval: Duration) -> Duration {
    let interval_nanos = interval.as_nanos();
    if interval_nanos == 0 {
        return Duration::ZERO;
    }
    let since_epoch = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
    let remaining = interval_nanos - since_epoch % interval_nanos;
    Duration::from_nanos(u64::try_from(remaining).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_none_is_none() {
        let cmd: Command<()> = Command::none();
        assert!(cmd.is_none());
    }

    #[test]
    fn command_message_creates_app_event() {
        let cmd: Command<i32> = Command::message(42);
        match cmd.inner {
            CommandInner::Action(Action::Event(Event::App(msg))) => assert_eq!(msg, 42),
            _ => panic!("Expected Action::Event"),
        }
    }

    #[test]
    fn command_quit_creates_quit() {
        let cmd: Command<()> = Command::quit();
        assert!(cmd.is_quit());
    }

    #[test]
    fn command_batch_empty_returns_none() {
        let cmd: Command<()> = Command::batch(vec![]);
        assert!(cmd.is_none());
    }

    #[test]
    fn command_batch_drops_none_members() {
        let cmd: Command<i32> = Command::batch(vec![Command::none(), Command::message(1)]);
        assert_eq!(cmd.into_message(), Some(1));
    }

    #[test]
    fn command_batch_single_unwraps() {
        let cmd: Command<i32> = Command::batch(vec![Command::message(1)]);
        assert_eq!(cmd.into_message(), Some(1));
    }

    #[test]
    fn command_batch_multiple() {
        let cmd: Command<i32> = Command::batch(vec![Command::message(1), Command::message(2)]);
        assert_eq!(cmd.into_batch().map(|c| c.len()), Some(2));
    }

    #[test]
    fn command_sequence_empty_returns_none() {
        let cmd: Command<()> = Command::sequence(vec![]);
        assert!(cmd.is_none());
    }

    #[test]
    fn command_sequence_keeps_order() {
        let cmd: Command<i32> = Command::sequence(vec![Command::message(1), Command::message(2)]);
        match cmd.inner {
            CommandInner::Sequence(cmds) => {
                let msgs: Vec<_> = cmds.into_iter().filter_map(Command::into_message).collect();
                assert_eq!(msgs, vec![1, 2]);
            }
            _ => panic!("Expected Sequence"),
        }
    }

    #[test]
    fn command_map_message() {
        let cmd: Command<i32> = Command::message(42);
        let mapped: Command<String> = cmd.map(|n| n.to_string());
        assert_eq!(mapped.into_message(), Some("42".to_string()));
    }

    #[test]
    fn command_map_quit_stays_quit() {
        let cmd: Command<i32> = Command::quit();
        let mapped: Command<String> = cmd.map(|n| n.to_string());
        assert!(mapped.is_quit());
    }

    #[test]
    fn command_map_terminal_preserves_command() {
        let cmd: Command<i32> = Command::enter_alt_screen();
        let mapped: Command<String> = cmd.map(|n| n.to_string());
        assert_eq!(mapped.as_terminal(), Some(&TerminalCommand::EnterAltScreen));
    }

    #[tokio::test]
    async fn command_map_future() {
        let cmd: Command<i32> = Command::perform(async { 20 }, |n| n + 1);
        let mapped: Command<String> = cmd.map(|n| n.to_string());
        match mapped.inner {
            CommandInner::Future(fut) => assert_eq!(fut.await, Some(Event::App("21".into()))),
            _ => panic!("Expected Future"),
        }
    }

    #[tokio::test]
    async fn try_perform_error_becomes_command_failed() {
        let cmd: Command<i32> = Command::try_perform(async { Err::<i32, _>("disk full") }, |n| n);
        match cmd.inner {
            CommandInner::Future(fut) => assert_eq!(
                fut.await,
                Some(Event::CommandFailed(CommandError::Failed("disk full".into())))
            ),
            _ => panic!("Expected Future"),
        }
    }

    #[test]
    fn terminal_command_constructors() {
        let cmd: Command<()> = Command::set_title("test");
        assert_eq!(
            cmd.as_terminal(),
            Some(&TerminalCommand::SetTitle("test".into()))
        );

        let cmd: Command<()> = Command::window_size();
        assert_eq!(
            cmd.as_terminal(),
            Some(&TerminalCommand::Query(Query::WindowSize))
        );

        let cmd: Command<()> = Command::enable_mouse_all_motion();
        assert_eq!(
            cmd.as_terminal(),
            Some(&TerminalCommand::EnableMouse(MouseMode::AllMotion))
        );

        let cmd: Command<()> = Command::raw("\x1b[5n");
        assert_eq!(
            cmd.as_terminal(),
            Some(&TerminalCommand::Raw("\x1b[5n".into()))
        );

        let cmd: Command<()> = Command::set_clipboard("copied");
        assert_eq!(
            cmd.as_terminal(),
            Some(&TerminalCommand::SetClipboard("copied".into()))
        );
    }

    #[test]
    fn every_waits_for_wall_clock_boundary() {
        let now = UNIX_EPOCH + Duration::from_millis(10_250);
        assert_eq!(
            until_next_boundary(now, Duration::from_secs(1)),
            Duration::from_millis(750)
        );
        let on_boundary = UNIX_EPOCH + Duration::from_secs(10);
        assert_eq!(
            until_next_boundary(on_boundary, Duration::from_secs(1)),
            Duration::from_secs(1)
        );
    }
}
