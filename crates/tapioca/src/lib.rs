//! **tapioca** -- An Elm-architecture terminal UI runtime.
//!
//! This is the umbrella crate that re-exports everything you need to build a
//! tapioca application from a single dependency:
//!
//! ```toml
//! [dependencies]
//! tapioca = "0.1"
//! ```
//!
//! # Re-exports
//!
//! * All public items from [`tapioca_core`] are available at the crate root
//!   ([`Model`], [`Event`], [`Command`], [`Subscription`], [`Frame`],
//!   [`Program`], [`run`], [`run_with`], etc.).
//! * [`ratatui`], [`crossterm`], and [`tokio`] are re-exported so downstream
//!   crates do not need to depend on them directly.  Views can be drawn with
//!   ratatui widgets through [`Frame::draw`].
//!
//! # Quick start
//!
//! ```ignore
//! use tapioca::{Command, Event, Frame, Model};
//!
//! struct Hello;
//!
//! impl Model for Hello {
//!     type Message = ();
//!     type Flags = ();
//!
//!     fn init(_: ()) -> (Self, Command<()>) {
//!         (Hello, Command::none())
//!     }
//!     fn update(&mut self, event: Event<()>) -> Command<()> {
//!         if event.is_key("q") {
//!             return Command::quit();
//!         }
//!         Command::none()
//!     }
//!     fn view(&self) -> Frame {
//!         Frame::new("Hello, tapioca! Press q to quit.")
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tapioca::ProgramError> {
//!     tapioca::run::<Hello>(()).await?;
//!     Ok(())
//! }
//! ```

pub use tapioca_core::*;

// Re-export dependencies for use in demos and downstream crates
pub use crossterm;
pub use ratatui;
pub use tokio;
