//! The event loop.
//!
//! [`Program`] owns the model and is the only code that calls `update` and
//! `view`.  Everything else (input reader, scheduled commands, subscriptions,
//! signal watcher, [`ProgramHandle`]s) talks to it by enqueuing onto one
//! unbounded queue, which the loop drains one item at a time.

use crate::color::ColorProfile;
use crate::command::{Command, Exclusive, MouseMode, TerminalCommand};
use crate::event::{CapabilityEvent, CommandError, Event, Query};
use crate::frame::DisplayModes;
use crate::input::{InputReader, InputSource};
use crate::logging;
use crate::model::Model;
use crate::output::{OutputTarget, OutputWriter};
use crate::queue::{self, Envelope, Receiver};
use crate::renderer::Renderer;
use crate::scheduler::{self, Scheduler};
use crate::signals::{Signals, SizeProbe};
use crate::subscription::SubscriptionManager;
use crate::terminal::{
    self, Capabilities, Environment, Probe, RawModeGuard, SharedCapabilities,
};
use crossterm::event::KeyboardEnhancementFlags;
use futures::FutureExt;
use std::io;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};

/// How long to wait for the reader or writer to acknowledge a handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(500);

/// Errors that can occur while initializing or running a [`Program`].
#[derive(Debug, thiserror::Error)]
pub enum ProgramError {
    /// An I/O error from terminal setup, input, output, or teardown.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// The program was stopped with [`ProgramHandle::kill`].
    #[error("program was killed")]
    Killed,
    /// `update` or `view` panicked. The terminal was restored first.
    #[error("program panicked: {0}")]
    Panicked(String),
    /// The log file could not be opened.
    #[error("cannot set up logging: {0}")]
    Logging(#[source] io::Error),
}

/// Configuration options for a [`Program`].
///
/// All fields have sensible defaults (see [`Default`] impl).  Use struct
/// update syntax to override only the options you need:
///
/// # Example
///
/// ```rust,ignore
/// use tapioca_core::{MouseMode, OutputTarget, ProgramOptions};
///
/// let opts = ProgramOptions {
///     mouse_mode: Some(MouseMode::CellMotion),
///     title: Some("My App".into()),
///     output: OutputTarget::Stderr,
///     ..ProgramOptions::default()
/// };
/// ```
#[derive(Debug)]
pub struct ProgramOptions {
    /// Start in alternate screen (default: true).
    pub alt_screen: bool,
    /// Enable mouse capture mode.
    pub mouse_mode: Option<MouseMode>,
    /// Enable bracketed paste (default: true).
    pub bracketed_paste: bool,
    /// Enable focus reporting.
    pub focus_reporting: bool,
    /// Kitty keyboard flags to request (default: disambiguate escape codes).
    pub keyboard_enhancements: KeyboardEnhancementFlags,
    /// Set terminal title.
    pub title: Option<String>,
    /// Whether to catch panics and restore terminal (default: true).
    pub catch_panics: bool,
    /// Turn SIGINT, SIGTERM and SIGHUP into [`Event::Quit`] (default: true).
    pub handle_signals: bool,
    /// Send `tracing` output to this file.
    pub log_file: Option<PathBuf>,
    /// Where input comes from (default: stdin).
    pub input: InputSource,
    /// Output target: stdout (default), stderr, or any writer.
    pub output: OutputTarget,
    /// How long a lone `Esc` waits for the rest of a sequence (default: 50ms).
    pub escape_timeout: Duration,
    /// How long in-flight commands may run after quit (default: 1s).
    pub shutdown_grace: Duration,
    /// Draw the model's view (default: true). Without it the program runs
    /// as a plain command-line tool: nothing is drawn, no modes are set and
    /// printed lines go straight to the output.
    pub render: bool,
    /// Query the terminal's colours and keyboard support at startup (default: true).
    pub probe_capabilities: bool,
    /// How long to wait for capability replies (default: 200ms).
    pub probe_timeout: Duration,
    /// Size to assume when the terminal cannot be asked.
    pub initial_size: Option<(u16, u16)>,
    /// Environment to read `TERM`, `COLORTERM` and friends from (default: the process's).
    pub environment: Option<Environment>,
}

impl Default for ProgramOptions {
    fn default() -> Self {
        Self {
            alt_screen: true,
            mouse_mode: None,
            bracketed_paste: true,
            focus_reporting: false,
            keyboard_enhancements: KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES,
            title: None,
            catch_panics: true,
            handle_signals: true,
            log_file: None,
            input: InputSource::default(),
            output: OutputTarget::default(),
            escape_timeout: Duration::from_millis(50),
            shutdown_grace: Duration::from_secs(1),
            render: true,
            probe_capabilities: true,
            probe_timeout: Duration::from_millis(200),
            initial_size: None,
            environment: None,
        }
    }
}

impl ProgramOptions {
    /// Defaults, overridden by `TAPIOCA_LOG_FILE` and
    /// `TAPIOCA_ESCAPE_TIMEOUT_MS` from the process environment.
    pub fn from_env() -> Self {
        Self::from_environment(&Environment::from_process())
    }

    /// Like [`from_env`](Self::from_env), reading from `env`.
    pub fn from_environment(env: &Environment) -> Self {
        let mut options = Self::default();
        if let Some(path) = env.get("TAPIOCA_LOG_FILE").filter(|p| !p.is_empty()) {
            options.log_file = Some(PathBuf::from(path));
        }
        if let Some(ms) = env
            .get("TAPIOCA_ESCAPE_TIMEOUT_MS")
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            options.escape_timeout = Duration::from_millis(ms);
        }
        options
    }

    fn display_modes(&self) -> DisplayModes {
        DisplayModes {
            alt_screen: self.alt_screen,
            mouse: self.mouse_mode,
            bracketed_paste: self.bracketed_paste,
            focus_reporting: self.focus_reporting,
            keyboard: self.keyboard_enhancements,
        }
    }
}

/// A cloneable handle to a running [`Program`] for external control.
///
/// `ProgramHandle` can safely be sent across threads or into async tasks.
/// Everything it does goes through the program's event queue, in order with
/// every other event.  Calls made after the program has exited are ignored.
///
/// Obtain a handle by calling [`Program::handle`] before entering the run
/// loop.
pub struct ProgramHandle<Msg: Send + 'static> {
    queue: queue::Sender<Msg>,
    killed: Arc<AtomicBool>,
    capabilities: SharedCapabilities,
}

impl<Msg: Send + 'static> Clone for ProgramHandle<Msg> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            killed: self.killed.clone(),
            capabilities: self.capabilities.clone(),
        }
    }
}

impl<Msg: Send + 'static> ProgramHandle<Msg> {
    /// Send a message to the running program.
    pub fn send(&self, msg: Msg) {
        self.queue.event(Event::App(msg));
    }

    /// Inject any event, e.g. a synthetic key press.
    pub fn send_event(&self, event: Event<Msg>) {
        self.queue.event(event);
    }

    /// Ask the program to stop once the events queued so far are handled.
    /// The request passes through the program's filter like any quit.
    pub fn quit(&self) {
        self.queue.event(Event::Quit);
    }

    /// Stop the program without handling anything still queued. The
    /// terminal is restored and `run` returns [`ProgramError::Killed`].
    pub fn kill(&self) {
        self.killed.store(true, Ordering::SeqCst);
        self.queue.send(Envelope::Kill);
    }

    /// What is known about the terminal so far.
    pub fn capabilities(&self) -> Capabilities {
        match self.capabilities.read() {
            Ok(caps) => caps.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

type Filter<M> =
    Box<dyn Fn(&M, Event<<M as Model>::Message>) -> Option<Event<<M as Model>::Message>> + Send>;

/// The program runtime.  Manages terminal setup, the event loop, and the
/// full [`Model`] lifecycle.
///
/// `Program` wires a [`Model`] to a terminal and drives the init/update/view
/// loop until an [`Event::Quit`] gets through the filter, a fatal I/O error
/// occurs, or the program is killed.
///
/// # Example
///
/// ```rust,ignore
/// use tapioca_core::{Program, ProgramError};
///
/// #[tokio::main]
/// async fn main() -> Result<(), ProgramError> {
///     let model = Program::<MyApp>::new(())?.run().await?;
///     // `model` is the final state after quit
///     Ok(())
/// }
/// ```
pub struct Program<M: Model> {
    model: M,
    init_cmd: Command<M::Message>,
    options: ProgramOptions,
    queue: queue::Sender<M::Message>,
    rx: Receiver<M::Message>,
    filter: Option<Filter<M>>,
    killed: Arc<AtomicBool>,
    capabilities: SharedCapabilities,
}

impl<M: Model> Program<M> {
    /// Create a new program with default options.
    pub fn new(flags: M::Flags) -> Result<Self, ProgramError> {
        Self::with_options(flags, ProgramOptions::default())
    }

    /// Create a new program with custom options.
    ///
    /// Calls [`Model::init`]; its command runs once the program starts.
    /// Returns an error if the log file cannot be opened.
    pub fn with_options(flags: M::Flags, options: ProgramOptions) -> Result<Self, ProgramError> {
        if let Some(path) = &options.log_file {
            logging::log_to_file(path).map_err(ProgramError::Logging)?;
        }
        let (queue, rx) = queue::channel();
        let (model, init_cmd) = M::init(flags);
        debug!("program initialized");

        Ok(Self {
            model,
            init_cmd,
            options,
            queue,
            rx,
            filter: None,
            killed: Arc::new(AtomicBool::new(false)),
            capabilities: Arc::new(RwLock::new(Capabilities::default())),
        })
    }

    /// Set an event filter. Every event passes through it before reaching
    /// `update`: return `Some` to pass it on (possibly rewritten), `None` to
    /// drop it.  Quit requests go through the filter too, which is how a
    /// program asks for confirmation before exiting.
    pub fn with_filter(
        mut self,
        filter: impl Fn(&M, Event<M::Message>) -> Option<Event<M::Message>> + Send + 'static,
    ) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Get a handle for external control (send messages, quit, kill).
    pub fn handle(&self) -> ProgramHandle<M::Message> {
        ProgramHandle {
            queue: self.queue.clone(),
            killed: self.killed.clone(),
            capabilities: self.capabilities.clone(),
        }
    }

    /// Run the program until it quits, returning the final model.
    ///
    /// The terminal is restored on every exit path.
    pub async fn run(self) -> Result<M, ProgramError> {
        let catch_panics = self.options.catch_panics;
        let mut runtime = Runtime::start(self)?;

        let exit = if catch_panics {
            match AssertUnwindSafe(runtime.event_loop()).catch_unwind().await {
                Ok(exit) => exit,
                Err(payload) => Exit::Panicked(scheduler::panic_message(payload.as_ref())),
            }
        } else {
            runtime.event_loop().await
        };

        runtime.shutdown(&exit).await;
        match exit {
            Exit::Quit => Ok(runtime.model),
            Exit::Killed => Err(ProgramError::Killed),
            Exit::Fatal(e) => Err(ProgramError::Io(e)),
            Exit::Panicked(message) => Err(ProgramError::Panicked(message)),
        }
    }
}

enum Exit {
    Quit,
    Killed,
    Fatal(io::Error),
    Panicked(String),
}

struct Settings {
    shutdown_grace: Duration,
    render: bool,
    probe_timeout: Duration,
    initial_size: Option<(u16, u16)>,
    /// Output goes to a terminal whose size can be asked.
    output_tty: bool,
    /// Input and output are both a terminal, so queries can be answered.
    can_probe: bool,
}

/// A started program: the model plus every resource the loop drives.
struct Runtime<M: Model> {
    model: M,
    filter: Option<Filter<M>>,
    queue: queue::Sender<M::Message>,
    rx: Receiver<M::Message>,
    killed: Arc<AtomicBool>,
    capabilities: SharedCapabilities,
    env: Environment,
    settings: Settings,
    renderer: Renderer,
    scheduler: Scheduler<M::Message>,
    subscriptions: SubscriptionManager<M::Message>,
    probe: Probe,
    writer: OutputWriter,
    reader: Option<InputReader>,
    raw: RawModeGuard,
    signals: Option<Signals>,
}

impl<M: Model> Runtime<M> {
    fn start(program: Program<M>) -> Result<Self, ProgramError> {
        let Program {
            model,
            init_cmd,
            mut options,
            queue,
            rx,
            filter,
            killed,
            capabilities,
        } = program;

        let env = options
            .environment
            .take()
            .unwrap_or_else(Environment::from_process);
        let input = std::mem::take(&mut options.input);
        let output = std::mem::take(&mut options.output);
        let input_tty = input.is_terminal();
        let output_tty = output.is_terminal();

        if options.catch_panics && (input_tty || output_tty) {
            terminal::install_panic_hook(options.alt_screen, output.std_stream());
        }
        let raw = if input_tty {
            RawModeGuard::enable()?
        } else {
            RawModeGuard::inactive()
        };
        let writer = OutputWriter::spawn(output, queue.clone())?;
        let reader = InputReader::spawn(input, queue.clone(), options.escape_timeout)?;

        let watch_size: Option<SizeProbe> = output_tty.then(|| Box::new(current_size) as SizeProbe);
        let handle_quit = options.handle_signals && (input_tty || output_tty);
        let signals = if watch_size.is_some() || handle_quit {
            Some(Signals::spawn(queue.clone(), watch_size, handle_quit)?)
        } else {
            None
        };

        let size = terminal::detect_size(output_tty, options.initial_size, &env);
        let profile = ColorProfile::detect(&env, output_tty);
        if let Ok(mut caps) = capabilities.write() {
            caps.color_profile = profile;
            caps.size = size;
        }

        let settings = Settings {
            shutdown_grace: options.shutdown_grace,
            render: options.render,
            probe_timeout: options.probe_timeout,
            initial_size: options.initial_size,
            output_tty,
            can_probe: input_tty && output_tty,
        };
        info!(
            columns = size.0,
            rows = size.1,
            ?profile,
            input_tty,
            output_tty,
            "program starting"
        );

        let mut runtime = Self {
            model,
            filter,
            scheduler: Scheduler::new(queue.clone()),
            subscriptions: SubscriptionManager::new(queue.clone()),
            queue,
            rx,
            killed,
            capabilities,
            env,
            renderer: Renderer::new(size.0, size.1, options.display_modes(), options.title.clone()),
            probe: Probe::default(),
            settings,
            writer,
            reader,
            raw,
            signals,
        };

        if output_tty {
            runtime
                .queue
                .event(Event::Capability(CapabilityEvent::ColorProfile(profile)));
            runtime.queue.event(Event::Resize {
                columns: size.0,
                rows: size.1,
            });
        }
        if options.probe_capabilities && runtime.settings.can_probe {
            runtime.ask(&Probe::STARTUP);
        }

        runtime.scheduler.execute(init_cmd);
        let subs = runtime.model.subscriptions();
        runtime.subscriptions.reconcile(subs);
        runtime.render();
        Ok(runtime)
    }

    async fn event_loop(&mut self) -> Exit {
        loop {
            if self.killed.load(Ordering::SeqCst) {
                return Exit::Killed;
            }
            let Some(envelope) = self.rx.recv().await else {
                return Exit::Quit;
            };
            if self.killed.load(Ordering::SeqCst) {
                return Exit::Killed;
            }

            let handled = match envelope {
                Envelope::Event(event) => {
                    if self.dispatch(event) {
                        return Exit::Quit;
                    }
                    Ok(())
                }
                Envelope::Terminal(cmd) => self.terminal_command(cmd).await,
                Envelope::Exclusive(work, done) => self.exclusive(work, done).await,
                Envelope::ProbeTimeout(generation) => {
                    self.probe_timeout(generation);
                    Ok(())
                }
                Envelope::Fatal(e) => Err(e),
                Envelope::Kill => return Exit::Killed,
            };
            if let Err(e) = handled {
                warn!(error = %e, "fatal I/O error");
                return Exit::Fatal(e);
            }
        }
    }

    /// One transition. Returns `true` when the program should stop.
    fn dispatch(&mut self, event: Event<M::Message>) -> bool {
        self.observe(&event);

        let event = match &self.filter {
            Some(filter) => match filter(&self.model, event) {
                Some(event) => event,
                None => {
                    trace!("event dropped by filter");
                    return false;
                }
            },
            None => event,
        };
        if event.is_quit() {
            debug!("quit requested");
            return true;
        }

        let cmd = self.model.update(event);
        self.scheduler.execute(cmd);
        let subs = self.model.subscriptions();
        self.subscriptions.reconcile(subs);
        self.render();
        false
    }

    /// Keep the renderer and capability cache current, whether or not the
    /// event reaches `update`.
    fn observe(&mut self, event: &Event<M::Message>) {
        match event {
            Event::Resize { columns, rows } => {
                // A same-size resize still forces a full repaint.
                self.renderer.resize(*columns, *rows);
                if let Ok(mut caps) = self.capabilities.write() {
                    caps.size = (*columns, *rows);
                }
            }
            Event::Capability(reply) => {
                if let Ok(mut caps) = self.capabilities.write() {
                    caps.apply(reply);
                }
                if let CapabilityEvent::ModeReport {
                    mode: terminal::SYNCHRONIZED_OUTPUT_MODE,
                    setting,
                } = reply
                {
                    self.renderer.set_synchronized(matches!(*setting, 1..=3));
                }
                for query in self.probe.observe(reply) {
                    debug!(?query, "terminal did not answer query");
                    self.queue
                        .event(Event::Capability(CapabilityEvent::Unsupported(query)));
                }
            }
            _ => {}
        }
    }

    fn render(&mut self) {
        if !self.settings.render {
            return;
        }
        let frame = self.model.view();
        let bytes = self.renderer.draw(&frame);
        self.writer.write(bytes);
    }

    /// Redraw the retained frame after a terminal-state change.
    fn redraw(&mut self) {
        if !self.settings.render {
            return;
        }
        let frame = self.renderer.last_frame().clone();
        let bytes = self.renderer.draw(&frame);
        self.writer.write(bytes);
    }

    fn set_modes(&mut self, change: impl FnOnce(&mut DisplayModes)) {
        let mut modes = self.renderer.defaults();
        change(&mut modes);
        self.renderer.set_defaults(modes);
        self.redraw();
    }

    async fn terminal_command(&mut self, cmd: TerminalCommand) -> io::Result<()> {
        trace!(?cmd, "terminal command");
        match cmd {
            TerminalCommand::EnterAltScreen => self.set_modes(|m| m.alt_screen = true),
            TerminalCommand::ExitAltScreen => self.set_modes(|m| m.alt_screen = false),
            TerminalCommand::EnableMouse(mode) => self.set_modes(|m| m.mouse = Some(mode)),
            TerminalCommand::DisableMouse => self.set_modes(|m| m.mouse = None),
            TerminalCommand::EnableBracketedPaste => self.set_modes(|m| m.bracketed_paste = true),
            TerminalCommand::DisableBracketedPaste => {
                self.set_modes(|m| m.bracketed_paste = false)
            }
            TerminalCommand::EnableFocusReporting => self.set_modes(|m| m.focus_reporting = true),
            TerminalCommand::DisableFocusReporting => {
                self.set_modes(|m| m.focus_reporting = false)
            }
            TerminalCommand::PushKeyboardEnhancements(flags) => {
                self.set_modes(|m| m.keyboard = flags)
            }
            TerminalCommand::PopKeyboardEnhancements => {
                self.set_modes(|m| m.keyboard = KeyboardEnhancementFlags::empty())
            }
            TerminalCommand::SetTitle(title) => {
                self.renderer.set_default_title(title);
                self.redraw();
            }
            TerminalCommand::ClearScreen if self.settings.render => {
                let bytes = self.renderer.clear_screen();
                self.writer.write(bytes);
            }
            TerminalCommand::ClearScreen => {}
            TerminalCommand::Repaint => {
                self.renderer.request_repaint();
                self.redraw();
            }
            TerminalCommand::Println(text) if !self.settings.render => {
                self.writer.write(format!("{text}\n"))
            }
            TerminalCommand::Printf(text) if !self.settings.render => self.writer.write(text),
            TerminalCommand::Println(text) => {
                let bytes = self.renderer.insert_above(&text);
                self.writer.write(bytes);
            }
            TerminalCommand::Printf(text) => {
                let bytes = self
                    .renderer
                    .insert_above(text.strip_suffix('\n').unwrap_or(&text));
                self.writer.write(bytes);
            }
            TerminalCommand::Suspend => return self.suspend().await,
            TerminalCommand::Query(Query::WindowSize) => {
                let (columns, rows) = self.current_size();
                self.queue.event(Event::Resize { columns, rows });
            }
            TerminalCommand::Query(query) => self.ask(&[query]),
            TerminalCommand::Raw(sequence) => self.writer.write(sequence),
            TerminalCommand::SetClipboard(text) => {
                self.writer.write(terminal::set_clipboard(&text))
            }
            TerminalCommand::RequestClipboard => self.writer.write(terminal::REQUEST_CLIPBOARD),
        }
        Ok(())
    }

    fn current_size(&self) -> (u16, u16) {
        terminal::detect_size(
            self.settings.output_tty,
            self.settings.initial_size,
            &self.env,
        )
    }

    /// Send capability queries. Without a terminal to answer, each one is
    /// reported unsupported straight away.
    fn ask(&mut self, queries: &[Query]) {
        if !self.settings.can_probe {
            for &query in queries {
                self.queue
                    .event(Event::Capability(CapabilityEvent::Unsupported(query)));
            }
            return;
        }
        let (generation, bytes) = self.probe.ask(queries);
        self.writer.write(bytes);

        let timeout = self.settings.probe_timeout;
        let queue = self.queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            queue.send(Envelope::ProbeTimeout(generation));
        });
    }

    fn probe_timeout(&mut self, generation: u64) {
        for query in self.probe.expire(generation) {
            debug!(?query, "capability query timed out");
            self.queue
                .event(Event::Capability(CapabilityEvent::Unsupported(query)));
        }
    }

    /// Hand the terminal over: pause input, restore the screen and modes,
    /// leave raw mode.
    async fn release(&mut self) {
        if let Some(reader) = &self.reader {
            if !reader.pause(HANDSHAKE_TIMEOUT).await {
                warn!("input reader did not acknowledge pause");
            }
        }
        let bytes = self.renderer.release();
        if self.settings.render {
            self.writer.write(bytes);
        }
        if !self.writer.sync(HANDSHAKE_TIMEOUT).await {
            warn!("output not drained before releasing the terminal");
        }
        if let Err(e) = self.raw.suspend() {
            warn!(error = %e, "failed to leave raw mode");
        }
    }

    /// Take the terminal back after [`release`](Self::release).
    fn reacquire(&mut self) -> io::Result<()> {
        self.raw.resume()?;
        let bytes = self.renderer.restore();
        if self.settings.render {
            self.writer.write(bytes);
        }
        if let Some(reader) = &self.reader {
            reader.resume();
        }
        Ok(())
    }

    async fn exclusive(
        &mut self,
        work: Exclusive<M::Message>,
        done: Option<oneshot::Sender<()>>,
    ) -> io::Result<()> {
        debug!("releasing the terminal for exclusive work");
        self.release().await;

        let event = match work {
            Exclusive::Process { cmd, on_exit } => {
                let mut process = cmd.to_process();
                let status = tokio::task::spawn_blocking(move || process.status())
                    .await
                    .unwrap_or_else(|e| Err(io::Error::other(e)));
                debug!(program = %cmd.program, ?status, "process finished");
                Some(Event::App(on_exit(status)))
            }
            Exclusive::Task(task) => {
                match tokio::task::spawn_blocking(move || scheduler::run_recovering(task)).await {
                    Ok(Ok(msg)) => msg.map(Event::App),
                    Ok(Err(payload)) => Some(scheduler::panicked(payload)),
                    Err(e) => Some(Event::CommandFailed(CommandError::Failed(e.to_string()))),
                }
            }
        };

        let restored = self.reacquire();
        debug!("terminal reacquired");
        if let Some(event) = event {
            self.queue.event(event);
        }
        if let Some(done) = done {
            let _ = done.send(());
        }
        restored
    }

    #[cfg(unix)]
    async fn suspend(&mut self) -> io::Result<()> {
        self.release().await;
        debug!("suspending");
        // SAFETY: raising a signal on the calling process has no memory-safety
        // preconditions; SIGTSTP stops the process until SIGCONT.
        unsafe {
            libc::raise(libc::SIGTSTP);
        }
        debug!("resumed after suspend");
        self.reacquire()?;

        let (columns, rows) = self.current_size();
        if self.renderer.size() != (columns, rows) {
            self.queue.event(Event::Resize { columns, rows });
        }
        self.queue.event(Event::Resume);
        Ok(())
    }

    #[cfg(not(unix))]
    async fn suspend(&mut self) -> io::Result<()> {
        debug!("suspend is not supported on this platform");
        Ok(())
    }

    /// Stop everything and restore the terminal. Runs on every exit path.
    async fn shutdown(&mut self, exit: &Exit) {
        debug!("shutting down");
        self.subscriptions.shutdown();
        // Nothing is handled after exit. Dropping queued exclusive work
        // releases the sequences waiting on it.
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
        if self.probe.is_waiting() {
            debug!("exiting with capability queries unanswered");
        }
        match exit {
            Exit::Killed => self.scheduler.abort(),
            _ => self.scheduler.shutdown(self.settings.shutdown_grace).await,
        }
        self.signals = None;
        if let Some(reader) = self.reader.as_mut() {
            reader.stop().await;
        }

        let bytes = self.renderer.release();
        if self.settings.render {
            self.writer.write(bytes);
        }
        self.writer.close(HANDSHAKE_TIMEOUT).await;
        if let Err(e) = self.raw.restore() {
            warn!(error = %e, "failed to restore the terminal");
        }
        info!("program stopped");
    }
}

fn current_size() -> Option<(u16, u16)> {
    crossterm::terminal::size()
        .ok()
        .filter(|&(w, h)| w > 0 && h > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::key::KeyEvent;
    use crate::testing::{headless, SharedBuffer};
    use crossterm::event::{KeyCode, KeyModifiers};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Msg {
        Add(i32),
    }

    struct Setup {
        views: Arc<Mutex<Vec<String>>>,
        init: Command<Msg>,
    }

    impl Setup {
        fn new(init: Command<Msg>) -> (Self, Arc<Mutex<Vec<String>>>) {
            let views = Arc::new(Mutex::new(Vec::new()));
            (
                Setup {
                    views: views.clone(),
                    init,
                },
                views,
            )
        }
    }

    struct Counter {
        count: i32,
        size: Option<(u16, u16)>,
        capabilities: Vec<CapabilityEvent>,
        failures: Vec<CommandError>,
        views: Arc<Mutex<Vec<String>>>,
    }

    impl Model for Counter {
        type Message = Msg;
        type Flags = Setup;

        fn init(setup: Setup) -> (Self, Command<Msg>) {
            let model = Counter {
                count: 0,
                size: None,
                capabilities: Vec::new(),
                failures: Vec::new(),
                views: setup.views,
            };
            (model, setup.init)
        }

        fn update(&mut self, event: Event<Msg>) -> Command<Msg> {
            match event {
                Event::Key(key) if key.matches("up") => self.count += 1,
                Event::Key(key) if key.matches("down") => self.count -= 1,
                Event::Key(key) if key.matches("q") => return Command::quit(),
                Event::Key(key) if key.matches("p") => panic!("update exploded"),
                Event::App(Msg::Add(n)) => self.count += n,
                Event::Resize { columns, rows } => self.size = Some((columns, rows)),
                Event::Capability(reply) => {
                    let unsupported = matches!(reply, CapabilityEvent::Unsupported(_));
                    self.capabilities.push(reply);
                    if unsupported {
                        return Command::quit();
                    }
                }
                Event::CommandFailed(e) => {
                    self.failures.push(e);
                    return Command::quit();
                }
                _ => {}
            }
            Command::none()
        }

        fn view(&self) -> Frame {
            let text = format!("count: {}", self.count);
            if let Ok(mut views) = self.views.lock() {
                views.push(text.clone());
            }
            Frame::new(text)
        }
    }

    fn key(code: KeyCode) -> Event<Msg> {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    async fn run_bounded(program: Program<Counter>) -> Result<Counter, ProgramError> {
        tokio::time::timeout(Duration::from_secs(5), program.run())
            .await
            .expect("program did not stop")
    }

    #[tokio::test]
    async fn three_events_give_three_renders_in_order() {
        let buffer = SharedBuffer::new();
        let (setup, views) = Setup::new(Command::none());
        let program = Program::<Counter>::with_options(setup, headless(&buffer)).unwrap();
        let handle = program.handle();

        handle.send_event(key(KeyCode::Up));
        handle.send_event(key(KeyCode::Up));
        handle.send_event(key(KeyCode::Down));
        handle.quit();

        let model = run_bounded(program).await.unwrap();
        assert_eq!(model.count, 1);
        assert_eq!(
            *views.lock().unwrap(),
            vec!["count: 0", "count: 1", "count: 2", "count: 1"]
        );
        assert!(buffer.contents().contains("count: 1"));
    }

    #[tokio::test]
    async fn keys_are_decoded_from_input() {
        let buffer = SharedBuffer::new();
        let (setup, _views) = Setup::new(Command::none());
        let options = ProgramOptions {
            input: InputSource::Reader(Box::new(io::Cursor::new(b"\x1b[A\x1b[A\x1b[Bq".to_vec()))),
            ..headless(&buffer)
        };
        let model = run_bounded(Program::<Counter>::with_options(setup, options).unwrap())
            .await
            .unwrap();
        assert_eq!(model.count, 1);
    }

    #[tokio::test]
    async fn nothing_is_delivered_after_quit() {
        let buffer = SharedBuffer::new();
        let (setup, _views) = Setup::new(Command::none());
        let program = Program::<Counter>::with_options(setup, headless(&buffer)).unwrap();
        let handle = program.handle();

        handle.send(Msg::Add(1));
        handle.quit();
        handle.send(Msg::Add(100));

        let model = run_bounded(program).await.unwrap();
        assert_eq!(model.count, 1);

        // Sends after exit are ignored.
        handle.send(Msg::Add(5));
    }

    #[tokio::test]
    async fn pending_command_does_not_block_shutdown() {
        let buffer = SharedBuffer::new();
        let (setup, _views) = Setup::new(Command::detach(futures::future::pending()));
        let options = ProgramOptions {
            shutdown_grace: Duration::from_millis(50),
            ..headless(&buffer)
        };
        let program = Program::<Counter>::with_options(setup, options).unwrap();
        program.handle().quit();

        let started = std::time::Instant::now();
        run_bounded(program).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn filter_can_suppress_quit() {
        let buffer = SharedBuffer::new();
        let (setup, _views) = Setup::new(Command::none());
        let program = Program::<Counter>::with_options(setup, headless(&buffer))
            .unwrap()
            .with_filter(|model: &Counter, event| {
                if event.is_quit() && model.count < 1 {
                    None
                } else {
                    Some(event)
                }
            });
        let handle = program.handle();

        handle.quit();
        handle.send(Msg::Add(1));
        handle.quit();

        let model = run_bounded(program).await.unwrap();
        assert_eq!(model.count, 1);
    }

    #[tokio::test]
    async fn kill_skips_queued_events() {
        let buffer = SharedBuffer::new();
        let (setup, _views) = Setup::new(Command::none());
        let program = Program::<Counter>::with_options(setup, headless(&buffer)).unwrap();
        let handle = program.handle();

        handle.send(Msg::Add(1));
        handle.kill();

        assert!(matches!(run_bounded(program).await, Err(ProgramError::Killed)));
    }

    #[tokio::test]
    async fn sequenced_command_results_arrive_before_quit() {
        let buffer = SharedBuffer::new();
        let init = Command::sequence([
            Command::perform(
                async {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    2
                },
                Msg::Add,
            ),
            Command::perform(async { 3 }, Msg::Add),
            Command::quit(),
        ]);
        let (setup, _views) = Setup::new(init);
        let model = run_bounded(Program::<Counter>::with_options(setup, headless(&buffer)).unwrap())
            .await
            .unwrap();
        assert_eq!(model.count, 5);
    }

    #[tokio::test]
    async fn panicking_command_is_reported() {
        let buffer = SharedBuffer::new();
        let init = Command::perform(
            async {
                if true {
                    panic!("worker exploded");
                }
                0
            },
            Msg::Add,
        );
        let (setup, _views) = Setup::new(init);
        let model = run_bounded(Program::<Counter>::with_options(setup, headless(&buffer)).unwrap())
            .await
            .unwrap();
        assert_eq!(
            model.failures,
            vec![CommandError::Panicked("worker exploded".into())]
        );
    }

    #[tokio::test]
    async fn exclusive_work_result_precedes_next_sequence_step() {
        let buffer = SharedBuffer::new();
        let init = Command::sequence([
            Command::exclusive(|| Some(Msg::Add(3))),
            Command::quit(),
        ]);
        let (setup, _views) = Setup::new(init);
        let model = run_bounded(Program::<Counter>::with_options(setup, headless(&buffer)).unwrap())
            .await
            .unwrap();
        assert_eq!(model.count, 3);
    }

    #[tokio::test]
    async fn queries_without_terminal() {
        let buffer = SharedBuffer::new();
        let init = Command::batch([
            Command::window_size(),
            Command::request_background_color(),
        ]);
        let (setup, _views) = Setup::new(init);
        let options = ProgramOptions {
            initial_size: Some((100, 40)),
            ..headless(&buffer)
        };
        let program = Program::<Counter>::with_options(setup, options).unwrap();
        let handle = program.handle();
        let model = run_bounded(program).await.unwrap();

        assert_eq!(model.size, Some((100, 40)));
        assert_eq!(
            model.capabilities,
            vec![CapabilityEvent::Unsupported(Query::BackgroundColor)]
        );
        assert_eq!(handle.capabilities().size, (100, 40));
    }

    #[tokio::test]
    async fn mode_commands_reach_the_output() {
        let buffer = SharedBuffer::new();
        let init = Command::sequence([
            Command::set_title("tapioca test"),
            Command::enable_mouse_cell_motion(),
            Command::quit(),
        ]);
        let (setup, _views) = Setup::new(init);
        run_bounded(Program::<Counter>::with_options(setup, headless(&buffer)).unwrap())
            .await
            .unwrap();

        let out = buffer.contents();
        assert!(out.contains("\x1b]0;tapioca test\x07"));
        assert!(out.contains("\x1b[?1002h"));
        assert!(out.ends_with(terminal::RESET_MODES));
    }

    #[tokio::test]
    async fn same_size_resize_repaints() {
        let buffer = SharedBuffer::new();
        let (setup, _views) = Setup::new(Command::none());
        let options = ProgramOptions {
            initial_size: Some((100, 40)),
            ..headless(&buffer)
        };
        let program = Program::<Counter>::with_options(setup, options).unwrap();
        let handle = program.handle();
        handle.send_event(Event::Resize {
            columns: 100,
            rows: 40,
        });
        handle.quit();

        let model = run_bounded(program).await.unwrap();
        assert_eq!(model.size, Some((100, 40)));
        assert_eq!(buffer.contents().matches("count: 0").count(), 2);
    }

    #[tokio::test]
    async fn panic_in_update_restores_the_terminal() {
        let buffer = SharedBuffer::new();
        let (setup, _views) = Setup::new(Command::none());
        let program = Program::<Counter>::with_options(setup, headless(&buffer)).unwrap();
        program.handle().send_event(key(KeyCode::Char('p')));

        match run_bounded(program).await {
            Err(ProgramError::Panicked(message)) => assert_eq!(message, "update exploded"),
            Err(e) => panic!("Expected a panic, got {e}"),
            Ok(_) => panic!("Expected a panic"),
        }
        assert!(buffer.contents().ends_with(terminal::RESET_MODES));
    }

    #[tokio::test]
    async fn exclusive_work_queued_at_quit_does_not_hold_shutdown() {
        let buffer = SharedBuffer::new();
        let init = Command::sequence([
            Command::quit(),
            Command::exclusive(|| Some(Msg::Add(1))),
            Command::message(Msg::Add(10)),
        ]);
        let (setup, _views) = Setup::new(init);
        let options = ProgramOptions {
            shutdown_grace: Duration::from_secs(10),
            ..headless(&buffer)
        };

        let started = std::time::Instant::now();
        let model = run_bounded(Program::<Counter>::with_options(setup, options).unwrap())
            .await
            .unwrap();
        assert_eq!(model.count, 0);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn mode_report_turns_on_synchronized_output() {
        let buffer = SharedBuffer::new();
        let (setup, _views) = Setup::new(Command::none());
        let program = Program::<Counter>::with_options(setup, headless(&buffer)).unwrap();
        let handle = program.handle();
        handle.send_event(Event::Capability(CapabilityEvent::ModeReport {
            mode: 2026,
            setting: 2,
        }));
        handle.send(Msg::Add(1));
        handle.quit();

        run_bounded(program).await.unwrap();
        let out = buffer.contents();
        assert!(!out.contains("\x1b[?2026hcount: 0"));
        assert!(out.contains("\x1b[?2026hcount: 1"));
        assert!(out.contains("\x1b[?2026l"));
        assert_eq!(handle.capabilities().synchronized_output, Some(true));
    }

    #[tokio::test]
    async fn raw_and_clipboard_commands_are_written() {
        let buffer = SharedBuffer::new();
        let init = Command::sequence([
            Command::raw("\x1b[5n"),
            Command::set_clipboard("hi"),
            Command::request_clipboard(),
            Command::quit(),
        ]);
        let (setup, _views) = Setup::new(init);
        run_bounded(Program::<Counter>::with_options(setup, headless(&buffer)).unwrap())
            .await
            .unwrap();

        let out = buffer.contents();
        let raw = out.find("\x1b[5n").expect("raw sequence");
        let set = out.find("\x1b]52;c;aGk=\x07").expect("clipboard write");
        let read = out.find("\x1b]52;c;?\x07").expect("clipboard read");
        assert!(raw < set && set < read);
    }

    #[tokio::test]
    async fn without_rendering_only_printed_output_is_written() {
        let buffer = SharedBuffer::new();
        let init = Command::sequence([
            Command::println("hello"),
            Command::enable_mouse_cell_motion(),
            Command::raw("\x1b[5n"),
            Command::quit(),
        ]);
        let (setup, views) = Setup::new(init);
        let options = ProgramOptions {
            render: false,
            ..headless(&buffer)
        };
        run_bounded(Program::<Counter>::with_options(setup, options).unwrap())
            .await
            .unwrap();

        assert_eq!(buffer.contents(), "hello\n\x1b[5n");
        assert!(views.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn write_failure_ends_the_program() {
        struct Broken;
        impl io::Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let (setup, _views) = Setup::new(Command::none());
        let options = ProgramOptions {
            input: InputSource::Disabled,
            output: OutputTarget::Writer(Box::new(Broken)),
            ..ProgramOptions::default()
        };
        let result = run_bounded(Program::<Counter>::with_options(setup, options).unwrap()).await;
        match result {
            Err(ProgramError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            _ => panic!("Expected the write error"),
        }
    }

    #[test]
    fn options_from_environment() {
        let env = Environment::from_pairs([
            ("TAPIOCA_ESCAPE_TIMEOUT_MS", "25"),
            ("TAPIOCA_LOG_FILE", "/tmp/tapioca.log"),
        ]);
        let options = ProgramOptions::from_environment(&env);
        assert_eq!(options.escape_timeout, Duration::from_millis(25));
        assert_eq!(options.log_file, Some(PathBuf::from("/tmp/tapioca.log")));

        let options = ProgramOptions::from_environment(&Environment::from_pairs([(
            "TAPIOCA_ESCAPE_TIMEOUT_MS",
            "soon",
        )]));
        assert_eq!(options.escape_timeout, Duration::from_millis(50));
        assert!(options.alt_screen);
    }
}
