use crate::command::{Action, Command, CommandInner, TerminalCommand};
use crate::event::Event;
use crate::frame::Frame;
use crate::input::InputSource;
use crate::model::Model;
use crate::output::OutputTarget;
use crate::runtime::ProgramOptions;
use crate::terminal::Environment;
use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// A headless test harness that drives a [`Model`] without a real terminal.
///
/// `TestProgram` lets you exercise every part of the init/update/view cycle in
/// a plain `#[test]` function -- no tokio runtime or TTY required.  Immediate
/// commands ([`Command::message`], [`Command::event`]) are collected and can be
/// flushed with [`drain_messages`](TestProgram::drain_messages); terminal
/// commands are recorded; async and exclusive work is ignored.
///
/// # Example
///
/// ```rust,ignore
/// use tapioca_core::testing::TestProgram;
///
/// let mut prog = TestProgram::<Counter>::new(0);  // calls Counter::init(0)
/// prog.send(CounterMsg::Increment);               // triggers update
/// prog.send(CounterMsg::Increment);
/// assert_eq!(prog.model().count, 2);              // inspect state
///
/// assert!(prog.render_string().contains("Count: 2"));
/// ```
pub struct TestProgram<M: Model> {
    model: M,
    pending: VecDeque<Event<M::Message>>,
    terminal_commands: Vec<TerminalCommand>,
    quit_requested: bool,
}

impl<M: Model> TestProgram<M> {
    /// Create a test program by calling [`Model::init`] with the given flags.
    pub fn new(flags: M::Flags) -> Self {
        let (model, init_cmd) = M::init(flags);
        let mut program = Self {
            model,
            pending: VecDeque::new(),
            terminal_commands: Vec::new(),
            quit_requested: false,
        };
        program.collect(init_cmd);
        program
    }

    /// Send an application message, triggering a single update.
    pub fn send(&mut self, msg: M::Message) {
        self.send_event(Event::App(msg));
    }

    /// Send any event. [`Event::Quit`] is recorded instead of reaching
    /// `update`, as in a running program.
    pub fn send_event(&mut self, event: Event<M::Message>) {
        if event.is_quit() {
            self.quit_requested = true;
            return;
        }
        let cmd = self.model.update(event);
        self.collect(cmd);
    }

    /// Process queued immediate events until commands stop producing new ones.
    pub fn drain_messages(&mut self) {
        while let Some(event) = self.pending.pop_front() {
            self.send_event(event);
        }
    }

    /// Get a shared reference to the model for assertions.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Get a mutable reference to the model for direct test setup.
    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    pub fn render(&self) -> Frame {
        self.model.view()
    }

    /// The current view with escape sequences removed.
    pub fn render_string(&self) -> String {
        strip_escapes(&self.render().content)
    }

    /// Whether a command asked the program to quit.
    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }

    /// Terminal commands issued so far, oldest first.
    pub fn terminal_commands(&self) -> &[TerminalCommand] {
        &self.terminal_commands
    }

    fn collect(&mut self, cmd: Command<M::Message>) {
        match cmd.inner {
            CommandInner::None => {}
            CommandInner::Action(Action::Event(event)) => self.pending.push_back(event),
            CommandInner::Action(Action::Quit) => self.quit_requested = true,
            CommandInner::Batch(cmds) | CommandInner::Sequence(cmds) => {
                for cmd in cmds {
                    self.collect(cmd);
                }
            }
            CommandInner::Terminal(tcmd) => self.terminal_commands.push(tcmd),
            // Needs a runtime
            CommandInner::Future(_) | CommandInner::Stream(_) | CommandInner::Exclusive(_) => {}
        }
    }
}

fn strip_escapes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\x1b' {
            out.push(c);
            continue;
        }
        if chars.next() == Some('[') {
            for c in chars.by_ref() {
                if ('\x40'..='\x7e').contains(&c) {
                    break;
                }
            }
        }
    }
    out
}

/// An in-memory output target that can be inspected while a program writes
/// to it.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes(&self) -> Vec<u8> {
        match self.0.lock() {
            Ok(buf) => buf.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes()).into_owned()
    }

    pub fn clear(&self) {
        if let Ok(mut buf) = self.0.lock() {
            buf.clear();
        }
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut buf = self
            .0
            .lock()
            .map_err(|_| io::Error::other("buffer lock poisoned"))?;
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Options for running a real [`Program`](crate::Program) in tests: no
/// input, output captured in `buffer`, no signal handlers and no terminal
/// queries.
pub fn headless(buffer: &SharedBuffer) -> ProgramOptions {
    ProgramOptions {
        input: InputSource::Disabled,
        output: OutputTarget::Writer(Box::new(buffer.clone())),
        handle_signals: false,
        probe_capabilities: false,
        environment: Some(Environment::default()),
        ..ProgramOptions::default()
    }
}
