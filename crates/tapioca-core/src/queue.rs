//! The single queue every producer feeds and only the event loop drains.

use crate::command::{Exclusive, TerminalCommand};
use crate::event::Event;
use std::io;
use tokio::sync::{mpsc, oneshot};

/// Work items for the event loop.
pub(crate) enum Envelope<M> {
    Event(Event<M>),
    /// A terminal command issued from inside a running sequence.
    Terminal(TerminalCommand),
    /// Exclusive terminal work; the sender is signalled once it has finished.
    Exclusive(Exclusive<M>, Option<oneshot::Sender<()>>),
    /// The reply window for the query batch with this generation has closed.
    ProbeTimeout(u64),
    /// Unrecoverable I/O failure from the reader or writer.
    Fatal(io::Error),
    Kill,
}

pub(crate) struct Sender<M> {
    tx: mpsc::UnboundedSender<Envelope<M>>,
}

impl<M> Clone for Sender<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<M> Sender<M> {
    /// Enqueue an event. Returns `false` once the loop has stopped.
    pub(crate) fn event(&self, event: Event<M>) -> bool {
        self.send(Envelope::Event(event))
    }

    pub(crate) fn send(&self, envelope: Envelope<M>) -> bool {
        self.tx.send(envelope).is_ok()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub(crate) type Receiver<M> = mpsc::UnboundedReceiver<Envelope<M>>;

pub(crate) fn channel<M>() -> (Sender<M>, Receiver<M>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Sender { tx }, rx)
}
