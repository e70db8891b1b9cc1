//! OS signals.
//!
//! Window size changes become [`Event::Resize`]; interrupt, terminate and
//! hangup become [`Event::Quit`], which the program filter can still veto.

use crate::event::Event;
use crate::queue::Sender;
use std::io;
use tokio::task::JoinHandle;
use tracing::debug;

/// Reads the terminal size after a change.
pub(crate) type SizeProbe = Box<dyn Fn() -> Option<(u16, u16)> + Send + Sync>;

pub(crate) struct Signals {
    task: JoinHandle<()>,
}

impl Signals {
    /// Start listening. Handlers are registered before this returns.
    #[cfg(unix)]
    pub(crate) fn spawn<M: Send + 'static>(
        queue: Sender<M>,
        size: Option<SizeProbe>,
        quit: bool,
    ) -> io::Result<Self> {
        use tokio::signal::unix::{signal, Signal, SignalKind};

        let listen = |enabled: bool, kind: SignalKind| -> io::Result<Option<Signal>> {
            enabled.then(|| signal(kind)).transpose()
        };
        let mut winch = listen(size.is_some(), SignalKind::window_change())?;
        let mut interrupt = listen(quit, SignalKind::interrupt())?;
        let mut terminate = listen(quit, SignalKind::terminate())?;
        let mut hangup = listen(quit, SignalKind::hangup())?;

        let task = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    Some(()) = next(&mut winch) => {
                        match size.as_ref().and_then(|probe| probe()) {
                            Some((columns, rows)) => Event::Resize { columns, rows },
                            None => continue,
                        }
                    }
                    Some(()) = next(&mut interrupt) => {
                        debug!("received SIGINT");
                        Event::Quit
                    }
                    Some(()) = next(&mut terminate) => {
                        debug!("received SIGTERM");
                        Event::Quit
                    }
                    Some(()) = next(&mut hangup) => {
                        debug!("received SIGHUP");
                        Event::Quit
                    }
                    else => break,
                };
                if !queue.event(event) {
                    break;
                }
            }
        });
        Ok(Self { task })
    }

    /// Start listening. Without `SIGWINCH` the size is polled instead.
    #[cfg(not(unix))]
    pub(crate) fn spawn<M: Send + 'static>(
        queue: Sender<M>,
        size: Option<SizeProbe>,
        quit: bool,
    ) -> io::Result<Self> {
        use std::time::Duration;

        let task = tokio::spawn(async move {
            let mut last = size.as_ref().and_then(|probe| probe());
            let mut poll = tokio::time::interval(Duration::from_millis(250));
            loop {
                let event = tokio::select! {
                    _ = poll.tick(), if size.is_some() => {
                        let now = size.as_ref().and_then(|probe| probe());
                        match now {
                            Some((columns, rows)) if now != last => {
                                last = now;
                                Event::Resize { columns, rows }
                            }
                            _ => continue,
                        }
                    }
                    Ok(()) = tokio::signal::ctrl_c(), if quit => {
                        debug!("received ctrl+c");
                        Event::Quit
                    }
                    else => break,
                };
                if !queue.event(event) {
                    break;
                }
            }
        });
        Ok(Self { task })
    }
}

impl Drop for Signals {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(unix)]
async fn next(signal: &mut Option<tokio::signal::unix::Signal>) -> Option<()> {
    match signal {
        Some(signal) => signal.recv().await,
        None => std::future::pending().await,
    }
}
