//! Command scheduler.
//!
//! Every command returned from `init` or `update` lands here.  Immediate
//! results are enqueued straight away; futures and streams run as tasks on a
//! [`JoinSet`] and enqueue their result when they finish.  A batch starts all
//! of its members at once.  A sequence runs in a single task that awaits each
//! member (and every member of a nested batch) before starting the next.
//!
//! Tasks are isolated from each other: a panic inside a command is caught at
//! the task boundary and delivered as [`Event::CommandFailed`].

use crate::command::{Action, Command, CommandInner};
use crate::event::{CommandError, Event};
use crate::queue::{Envelope, Sender};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::any::Any;
use std::cell::Cell;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::{debug, warn};

pub(crate) struct Scheduler<M: Send + 'static> {
    tasks: JoinSet<()>,
    queue: Sender<M>,
}

impl<M: Send + 'static> Scheduler<M> {
    pub(crate) fn new(queue: Sender<M>) -> Self {
        Self {
            tasks: JoinSet::new(),
            queue,
        }
    }

    pub(crate) fn execute(&mut self, cmd: Command<M>) {
        self.reap();
        match cmd.inner {
            CommandInner::None => {}
            CommandInner::Action(Action::Event(event)) => {
                self.queue.event(event);
            }
            CommandInner::Action(Action::Quit) => {
                self.queue.event(Event::Quit);
            }
            CommandInner::Future(fut) => {
                let queue = self.queue.clone();
                self.tasks.spawn(async move {
                    if let Some(event) = guarded(fut).await {
                        queue.event(event);
                    }
                });
            }
            CommandInner::Stream(stream) => {
                let queue = self.queue.clone();
                self.tasks.spawn(forward(stream, queue));
            }
            CommandInner::Batch(cmds) => {
                for cmd in cmds {
                    self.execute(cmd);
                }
            }
            CommandInner::Sequence(cmds) => {
                let queue = self.queue.clone();
                self.tasks.spawn(async move {
                    for cmd in cmds {
                        if !run_sequential(cmd, &queue).await {
                            break;
                        }
                    }
                });
            }
            CommandInner::Terminal(tcmd) => {
                self.queue.send(Envelope::Terminal(tcmd));
            }
            CommandInner::Exclusive(work) => {
                self.queue.send(Envelope::Exclusive(work, None));
            }
        }
    }

    /// Number of commands still running.
    pub(crate) fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Collect finished tasks.
    fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            if let Err(e) = result {
                if e.is_panic() {
                    warn!("command task panicked outside its guard");
                }
            }
        }
    }

    /// Give in-flight commands up to `grace` to finish, then abort the rest.
    pub(crate) async fn shutdown(&mut self, grace: Duration) {
        if self.tasks.is_empty() {
            return;
        }
        debug!(tasks = self.tasks.len(), "waiting for in-flight commands");
        let drained = tokio::time::timeout(grace, async {
            while self.tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                tasks = self.tasks.len(),
                ?grace,
                "abandoning commands still running after grace period"
            );
            self.abort();
        }
    }

    /// Abort every in-flight command without waiting for it.
    pub(crate) fn abort(&mut self) {
        self.tasks.abort_all();
    }
}

/// Run one command to completion inside a sequence. Returns `false` once the
/// event loop has stopped listening.
fn run_sequential<M: Send + 'static>(cmd: Command<M>, queue: &Sender<M>) -> BoxFuture<'_, bool> {
    Box::pin(async move {
        match cmd.inner {
            CommandInner::None => true,
            CommandInner::Action(Action::Event(event)) => queue.event(event),
            CommandInner::Action(Action::Quit) => queue.event(Event::Quit),
            CommandInner::Future(fut) => match guarded(fut).await {
                Some(event) => queue.event(event),
                None => !queue.is_closed(),
            },
            CommandInner::Stream(stream) => {
                forward(stream, queue.clone()).await;
                !queue.is_closed()
            }
            CommandInner::Batch(cmds) => {
                // Members run concurrently; the sequence moves on once all are done.
                let mut members = JoinSet::new();
                for cmd in cmds {
                    let queue = queue.clone();
                    members.spawn(async move {
                        run_sequential(cmd, &queue).await;
                    });
                }
                while members.join_next().await.is_some() {}
                !queue.is_closed()
            }
            CommandInner::Sequence(cmds) => {
                for cmd in cmds {
                    if !run_sequential(cmd, queue).await {
                        return false;
                    }
                }
                true
            }
            CommandInner::Terminal(tcmd) => queue.send(Envelope::Terminal(tcmd)),
            CommandInner::Exclusive(work) => {
                let (done_tx, done_rx) = oneshot::channel();
                if !queue.send(Envelope::Exclusive(work, Some(done_tx))) {
                    return false;
                }
                done_rx.await.is_ok()
            }
        }
    })
}

async fn guarded<M>(fut: BoxFuture<'static, Option<Event<M>>>) -> Option<Event<M>> {
    match AssertUnwindSafe(Recoverable(fut)).catch_unwind().await {
        Ok(event) => event,
        Err(payload) => Some(panicked(payload)),
    }
}

async fn forward<M: Send + 'static>(stream: BoxStream<'static, Event<M>>, queue: Sender<M>) {
    let pump = Box::pin(async {
        let mut stream = stream;
        while let Some(event) = stream.next().await {
            if !queue.event(event) {
                break;
            }
        }
    });
    if let Err(payload) = AssertUnwindSafe(Recoverable(pump)).catch_unwind().await {
        queue.event(panicked(payload));
    }
}

pub(crate) fn panicked<M>(payload: Box<dyn Any + Send>) -> Event<M> {
    let message = panic_message(payload.as_ref());
    warn!(%message, "command panicked");
    Event::CommandFailed(CommandError::Panicked(message))
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

/// Run blocking work on the current thread, recovering a panic.
pub(crate) fn run_recovering<T>(work: impl FnOnce() -> T) -> std::thread::Result<T> {
    let _scope = RecoveringScope::enter();
    std::panic::catch_unwind(AssertUnwindSafe(work))
}

thread_local! {
    static RECOVERING: Cell<usize> = const { Cell::new(0) };
}

/// Whether the current thread is polling a command whose panics are
/// recovered. The panic hook leaves the terminal alone in that case.
pub(crate) fn is_recovering() -> bool {
    RECOVERING.with(|depth| depth.get() > 0)
}

/// Marks the current thread as recovering while the inner future is polled.
struct Recoverable<F>(F);

struct RecoveringScope;

impl RecoveringScope {
    fn enter() -> Self {
        RECOVERING.with(|depth| depth.set(depth.get() + 1));
        RecoveringScope
    }
}

impl Drop for RecoveringScope {
    fn drop(&mut self) {
        RECOVERING.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

impl<F: Future + Unpin> Future for Recoverable<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let _scope = RecoveringScope::enter();
        Pin::new(&mut self.0).poll(cx)
    }
}
