//! Core runtime for the **tapioca** TUI framework.
//!
//! `tapioca-core` provides the traits, types, and runtime that power every
//! tapioca application.  The design follows the [Elm Architecture]: your
//! program is expressed as a pure **init -> update -> view** cycle, with side
//! effects pushed to the edges through [`Command`]s and [`Subscription`]s.
//!
//! # Key types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Model`] | Top-level application trait (init / update / view / subscriptions) |
//! | [`Event`] | Everything `update` receives: keys, mouse, paste, resize, replies, app messages |
//! | [`Command`] | Describes a side effect to be executed by the runtime |
//! | [`Subscription`] | Long-lived event source (timers, streams) |
//! | [`Frame`] | What `view` returns: styled text plus cursor, title and modes |
//! | [`Program`] | Wires a [`Model`] to a real terminal and drives the event loop |
//! | [`Decoder`] | Turns raw terminal bytes into key, mouse and reply events |
//! | [`Renderer`] | Diffs frames and produces the bytes that update the screen |
//! | [`TestProgram`](testing::TestProgram) | Headless harness for unit-testing a [`Model`] without a terminal |
//!
//! # Architecture
//!
//! 1. **init** -- [`Model::init`] creates the initial state and may return a
//!    [`Command`] to kick off early work.
//! 2. **view** -- The runtime calls [`Model::view`] and hands the [`Frame`]
//!    to the renderer, which writes only what changed.
//! 3. **event** -- Terminal input is decoded on a reader thread; command
//!    results, subscription output and signals join it on a single queue.
//! 4. **update** -- [`Model::update`] receives one event at a time, mutates
//!    state, and optionally returns a [`Command`].
//! 5. **repeat** -- Steps 2-4 repeat until an [`Event::Quit`] gets through.
//!
//! # Quick example
//!
//! ```ignore
//! use tapioca_core::{Command, Event, Frame, Model};
//!
//! struct Counter { count: i32 }
//!
//! impl Model for Counter {
//!     type Message = ();
//!     type Flags = ();
//!
//!     fn init(_flags: ()) -> (Self, Command<()>) {
//!         (Counter { count: 0 }, Command::none())
//!     }
//!
//!     fn update(&mut self, event: Event<()>) -> Command<()> {
//!         match event {
//!             Event::Key(key) if key.matches("+") => self.count += 1,
//!             Event::Key(key) if key.matches("-") => self.count -= 1,
//!             Event::Key(key) if key.matches("q") => return Command::quit(),
//!             _ => {}
//!         }
//!         Command::none()
//!     }
//!
//!     fn view(&self) -> Frame {
//!         Frame::new(format!("Count: {}", self.count))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tapioca_core::ProgramError> {
//!     tapioca_core::run::<Counter>(()).await?;
//!     Ok(())
//! }
//! ```
//!
//! [Elm Architecture]: https://guide.elm-lang.org/architecture/

pub mod color;
pub mod command;
pub mod decoder;
pub mod event;
pub mod frame;
pub mod input;
pub mod key;
pub mod logging;
pub mod model;
pub mod mouse;
pub mod output;
mod queue;
pub mod quit;
pub mod renderer;
pub mod runtime;
mod scheduler;
mod signals;
pub mod subscription;
pub mod subscriptions;
pub mod terminal;
pub mod testing;

pub use color::{ColorProfile, Rgb};
pub use command::{Command, CursorStyle, ExecCommand, MouseMode, TerminalCommand};
pub use decoder::{Decoder, InputEvent};
pub use event::{CapabilityEvent, CommandError, Event, Query};
pub use frame::{Cursor, DisplayModes, Frame};
pub use input::InputSource;
pub use key::KeyEvent;
pub use logging::log_to_file;
pub use model::Model;
pub use mouse::MouseEvent;
pub use output::OutputTarget;
pub use quit::{confirm_quit, QuitConfirmation};
pub use renderer::Renderer;
pub use runtime::{Program, ProgramError, ProgramHandle, ProgramOptions};
pub use subscription::{subscribe, Subscription, SubscriptionId, SubscriptionSource};
pub use subscriptions::{ticks, After, Every};
pub use terminal::{Capabilities, Environment};

/// Run a tapioca application with default options.
pub async fn run<M: Model>(flags: M::Flags) -> Result<M, ProgramError> {
    Program::<M>::new(flags)?.run().await
}

/// Run with custom options.
pub async fn run_with<M: Model>(
    flags: M::Flags,
    options: ProgramOptions,
) -> Result<M, ProgramError> {
    Program::<M>::with_options(flags, options)?.run().await
}
