//! Output side of the terminal.
//!
//! A dedicated thread owns the output handle and performs every write, so a
//! slow terminal stalls that thread rather than the event loop.  A write
//! failure is reported once as a fatal error; later writes are dropped.

use crate::queue::{Envelope, Sender};
use crate::terminal::StdStream;
use std::fmt;
use std::io::{self, IsTerminal, Stderr, Stdout, Write};
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error};

/// Output target for the terminal UI.
///
/// By default the TUI renders to **stdout**.  When your program's stdout is
/// piped (e.g. to capture structured output), switch to [`Stderr`](OutputTarget::Stderr)
/// so the UI goes to the terminal while data flows through the pipe.
/// [`Writer`](OutputTarget::Writer) sends everything to an arbitrary sink and
/// never counts as a terminal.
#[derive(Default)]
pub enum OutputTarget {
    /// Write to stdout (default).
    #[default]
    Stdout,
    /// Write to stderr (useful when stdout is piped).
    Stderr,
    /// Write to any sink, e.g. a buffer in tests.
    Writer(Box<dyn Write + Send>),
}

impl fmt::Debug for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputTarget::Stdout => f.write_str("Stdout"),
            OutputTarget::Stderr => f.write_str("Stderr"),
            OutputTarget::Writer(_) => f.write_str("Writer(..)"),
        }
    }
}

impl OutputTarget {
    /// Whether output goes to an interactive terminal.
    pub fn is_terminal(&self) -> bool {
        match self {
            OutputTarget::Stdout => io::stdout().is_terminal(),
            OutputTarget::Stderr => io::stderr().is_terminal(),
            OutputTarget::Writer(_) => false,
        }
    }

    pub(crate) fn std_stream(&self) -> Option<StdStream> {
        match self {
            OutputTarget::Stdout => Some(StdStream::Stdout),
            OutputTarget::Stderr => Some(StdStream::Stderr),
            OutputTarget::Writer(_) => None,
        }
    }
}

/// Writer that wraps stdout, stderr or a custom sink.
enum Output {
    Stdout(Stdout),
    Stderr(Stderr),
    Writer(Box<dyn Write + Send>),
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::Stdout(w) => w.write(buf),
            Output::Stderr(w) => w.write(buf),
            Output::Writer(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Stdout(w) => w.flush(),
            Output::Stderr(w) => w.flush(),
            Output::Writer(w) => w.flush(),
        }
    }
}

impl From<OutputTarget> for Output {
    fn from(target: OutputTarget) -> Self {
        match target {
            OutputTarget::Stdout => Output::Stdout(io::stdout()),
            OutputTarget::Stderr => Output::Stderr(io::stderr()),
            OutputTarget::Writer(w) => Output::Writer(w),
        }
    }
}

enum WriteOp {
    Bytes(Vec<u8>),
    /// Acknowledged once everything before it has been written.
    Sync(oneshot::Sender<()>),
}

pub(crate) struct OutputWriter {
    tx: Option<std_mpsc::Sender<WriteOp>>,
    thread: Option<JoinHandle<()>>,
}

impl OutputWriter {
    pub(crate) fn spawn<M: Send + 'static>(
        target: OutputTarget,
        queue: Sender<M>,
    ) -> io::Result<Self> {
        let (tx, rx) = std_mpsc::channel();
        let mut output = Output::from(target);
        let thread = std::thread::Builder::new()
            .name("tapioca-output".into())
            .spawn(move || {
                let mut failed = false;
                for op in rx {
                    match op {
                        WriteOp::Bytes(bytes) if !failed => {
                            if let Err(e) = output.write_all(&bytes).and_then(|()| output.flush())
                            {
                                error!(error = %e, "terminal write failed");
                                failed = true;
                                queue.send(Envelope::Fatal(e));
                            }
                        }
                        WriteOp::Bytes(_) => {}
                        WriteOp::Sync(done) => {
                            let _ = done.send(());
                        }
                    }
                }
                debug!("output writer stopped");
            })?;
        Ok(Self {
            tx: Some(tx),
            thread: Some(thread),
        })
    }

    pub(crate) fn write(&self, bytes: impl Into<Vec<u8>>) {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return;
        }
        if let Some(tx) = &self.tx {
            let _ = tx.send(WriteOp::Bytes(bytes));
        }
    }

    /// Wait until everything written so far has reached the output.
    /// Returns `false` on timeout or if the writer has stopped.
    pub(crate) async fn sync(&self, timeout: Duration) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        let (done_tx, done_rx) = oneshot::channel();
        if tx.send(WriteOp::Sync(done_tx)).is_err() {
            return false;
        }
        matches!(tokio::time::timeout(timeout, done_rx).await, Ok(Ok(())))
    }

    /// Flush pending writes and stop the thread. A writer stuck for longer
    /// than `timeout` is left behind.
    pub(crate) async fn close(&mut self, timeout: Duration) {
        let flushed = self.sync(timeout).await;
        self.tx = None;
        if let Some(thread) = self.thread.take() {
            if flushed {
                let _ = tokio::task::spawn_blocking(move || thread.join()).await;
            } else {
                error!(?timeout, "output writer did not drain in time");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::channel;
    use crate::testing::SharedBuffer;

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn writes_arrive_in_order_after_sync() {
        let buffer = SharedBuffer::new();
        let (tx, _rx) = channel::<()>();
        let mut writer =
            OutputWriter::spawn(OutputTarget::Writer(Box::new(buffer.clone())), tx).unwrap();

        writer.write("one ");
        writer.write(Vec::new());
        writer.write(b"two".to_vec());
        assert!(writer.sync(Duration::from_secs(1)).await);
        assert_eq!(buffer.contents(), "one two");

        writer.close(Duration::from_secs(1)).await;
        assert!(!writer.sync(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn write_failure_is_fatal_once() {
        let (tx, mut rx) = channel::<()>();
        let writer = OutputWriter::spawn(OutputTarget::Writer(Box::new(Broken)), tx).unwrap();

        writer.write("a");
        writer.write("b");
        assert!(writer.sync(Duration::from_secs(1)).await);

        match rx.recv().await {
            Some(Envelope::Fatal(e)) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            _ => panic!("Expected a fatal write error"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn custom_writer_is_not_a_terminal() {
        let target = OutputTarget::Writer(Box::new(SharedBuffer::new()));
        assert!(!target.is_terminal());
        assert_eq!(target.std_stream(), None);
        assert_eq!(format!("{target:?}"), "Writer(..)");
    }
}
