//! Built-in subscription sources.
//!
//! - **Timers** ([`Every`], [`After`]) -- repeating and one-shot timers whose
//!   instants arrive as application messages.
//! - **Clock ticks** ([`ticks`]) -- a repeating timer delivered as
//!   [`Event::Tick`](crate::Event::Tick).
//!
//! Terminal input needs no subscription: the runtime's input reader feeds
//! key, mouse, paste and focus events straight into `update`.

mod timer;

pub use timer::*;
