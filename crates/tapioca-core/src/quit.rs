//! "Press Ctrl+C again to quit".
//!
//! In raw mode Ctrl+C arrives as a key event rather than SIGINT, and a
//! SIGINT or SIGTERM from elsewhere arrives as [`Event::Quit`].  Both can be
//! routed through [`confirm_quit`], a program filter that lets the first
//! request through as an application message and only quits on the second.

use crate::event::Event;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Tracks double-press quit confirmation.
///
/// # Example
///
/// ```
/// use tapioca_core::quit::QuitConfirmation;
/// use std::time::Duration;
///
/// let mut quit = QuitConfirmation::new(Duration::from_secs(2));
///
/// // First press: not yet confirmed
/// assert!(!quit.request_quit());
///
/// // Second press immediately: confirmed
/// assert!(quit.request_quit());
/// ```
#[derive(Debug, Clone)]
pub struct QuitConfirmation {
    last_request: Option<Instant>,
    timeout: Duration,
}

impl QuitConfirmation {
    /// Typical timeouts are 1 to 3 seconds.
    pub fn new(timeout: Duration) -> Self {
        Self {
            last_request: None,
            timeout,
        }
    }

    /// Record a quit request. Returns `true` on the second request within
    /// the timeout, meaning the application should actually quit.
    pub fn request_quit(&mut self) -> bool {
        if self.is_pending() {
            return true;
        }
        self.last_request = Some(Instant::now());
        false
    }

    /// Forget an earlier request, so a stale first press does not count
    /// toward a future double press.
    pub fn reset(&mut self) {
        self.last_request = None;
    }

    /// Whether a first request is waiting for confirmation.
    pub fn is_pending(&self) -> bool {
        self.last_request
            .is_some_and(|t| t.elapsed() < self.timeout)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// A program filter that asks for confirmation before quitting.
///
/// `ctrl+c` and [`Event::Quit`] count as quit requests.  The first one is
/// replaced by `on_first()` (so the view can show a hint); a second within
/// `timeout` becomes [`Event::Quit`].  Any other key press cancels a pending
/// request.
///
/// ```rust,ignore
/// let program = Program::<App>::new(())?
///     .with_filter(confirm_quit(Duration::from_secs(2), || Msg::ConfirmQuit));
/// ```
pub fn confirm_quit<S, M>(
    timeout: Duration,
    on_first: impl Fn() -> M + Send + Sync + 'static,
) -> impl Fn(&S, Event<M>) -> Option<Event<M>> + Send + Sync + 'static {
    let state = Mutex::new(QuitConfirmation::new(timeout));
    move |_model: &S, event: Event<M>| {
        let is_request = event.is_quit() || event.is_key("ctrl+c");
        let Ok(mut quit) = state.lock() else {
            return Some(event);
        };
        if is_request {
            if quit.request_quit() {
                quit.reset();
                return Some(Event::Quit);
            }
            return Some(Event::App(on_first()));
        }
        if event.as_key().is_some_and(|k| !k.is_release()) {
            quit.reset();
        }
        Some(event)
    }
}
