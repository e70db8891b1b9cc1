//! Input reader.
//!
//! A dedicated thread reads raw bytes, runs them through the [`Decoder`] and
//! enqueues the decoded events.  Bytes still pending after the escape timeout
//! are flushed, which is how a lone `Esc` key press is told apart from the
//! start of an escape sequence.
//!
//! On Unix the terminal file descriptor is polled with a short timeout, so
//! the thread can be paused without leaving a read in flight.  That matters
//! during exclusive access: a child process must get every keystroke.

use crate::decoder::Decoder;
use crate::event::Event;
use crate::queue::{Envelope, Sender};
use std::fmt;
use std::io::{self, IsTerminal, Read};
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, error, trace};

/// How long one wait for input may block before controls are checked again.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

const READ_BUFFER: usize = 4096;

/// Where keyboard and mouse input comes from.
#[derive(Default)]
pub enum InputSource {
    /// Standard input (default).
    #[default]
    Stdin,
    /// The controlling terminal (`/dev/tty`), for when stdin is piped.
    Tty,
    /// Any byte source, e.g. canned input in tests. Never a terminal.
    Reader(Box<dyn Read + Send>),
    /// No input at all.
    Disabled,
}

impl fmt::Debug for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::Stdin => f.write_str("Stdin"),
            InputSource::Tty => f.write_str("Tty"),
            InputSource::Reader(_) => f.write_str("Reader(..)"),
            InputSource::Disabled => f.write_str("Disabled"),
        }
    }
}

impl InputSource {
    /// Whether input comes from an interactive terminal.
    pub fn is_terminal(&self) -> bool {
        match self {
            InputSource::Stdin => io::stdin().is_terminal(),
            InputSource::Tty => true,
            InputSource::Reader(_) | InputSource::Disabled => false,
        }
    }
}

enum Control {
    Pause(oneshot::Sender<()>),
    Resume,
    Stop,
}

/// Handle to the reader thread.
pub(crate) struct InputReader {
    control: std_mpsc::Sender<Control>,
    thread: Option<JoinHandle<()>>,
}

impl InputReader {
    /// Start reading. Returns `None` for [`InputSource::Disabled`].
    pub(crate) fn spawn<M: Send + 'static>(
        source: InputSource,
        queue: Sender<M>,
        escape_timeout: Duration,
    ) -> io::Result<Option<Self>> {
        let Some(source) = Source::open(source)? else {
            return Ok(None);
        };
        let (control, control_rx) = std_mpsc::channel();
        let thread = std::thread::Builder::new()
            .name("tapioca-input".into())
            .spawn(move || read_loop(source, control_rx, queue, escape_timeout))?;
        Ok(Some(Self {
            control,
            thread: Some(thread),
        }))
    }

    /// Stop reading until [`resume`](Self::resume). Resolves once the thread
    /// has acknowledged, or after `timeout`.
    pub(crate) async fn pause(&self, timeout: Duration) -> bool {
        let (ack, acked) = oneshot::channel();
        if self.control.send(Control::Pause(ack)).is_err() {
            return false;
        }
        matches!(tokio::time::timeout(timeout, acked).await, Ok(Ok(())))
    }

    pub(crate) fn resume(&self) {
        let _ = self.control.send(Control::Resume);
    }

    /// Stop the thread and wait for it to let go of the input.
    pub(crate) async fn stop(&mut self) {
        let _ = self.control.send(Control::Stop);
        if let Some(thread) = self.thread.take() {
            let joined = tokio::time::timeout(
                Duration::from_millis(500),
                tokio::task::spawn_blocking(move || thread.join()),
            )
            .await;
            if joined.is_err() {
                debug!("input thread still blocked in a read; detaching");
            }
        }
    }
}

impl Drop for InputReader {
    fn drop(&mut self) {
        let _ = self.control.send(Control::Stop);
    }
}

enum Wait {
    Data(Vec<u8>),
    Idle,
    Eof,
    Failed(io::Error),
}

/// A byte source the reader thread can wait on with a timeout.
enum Source {
    #[cfg(unix)]
    Fd {
        fd: std::os::fd::RawFd,
        // Keeps `/dev/tty` open for as long as `fd` is used.
        _file: Option<std::fs::File>,
    },
    /// A blocking reader drained by a helper thread.
    Pump(std_mpsc::Receiver<io::Result<Vec<u8>>>),
}

impl Source {
    fn open(source: InputSource) -> io::Result<Option<Self>> {
        match source {
            InputSource::Disabled => Ok(None),
            InputSource::Reader(reader) => Self::pump(reader).map(Some),
            #[cfg(unix)]
            InputSource::Stdin => Ok(Some(Source::Fd {
                fd: libc::STDIN_FILENO,
                _file: None,
            })),
            #[cfg(unix)]
            InputSource::Tty => {
                use std::os::fd::AsRawFd;
                let file = std::fs::OpenOptions::new().read(true).open("/dev/tty")?;
                Ok(Some(Source::Fd {
                    fd: file.as_raw_fd(),
                    _file: Some(file),
                }))
            }
            #[cfg(not(unix))]
            InputSource::Stdin | InputSource::Tty => Self::pump(Box::new(io::stdin())).map(Some),
        }
    }

    fn pump(mut reader: Box<dyn Read + Send>) -> io::Result<Self> {
        let (tx, rx) = std_mpsc::channel();
        std::thread::Builder::new()
            .name("tapioca-input-pump".into())
            .spawn(move || {
                let mut buf = [0u8; READ_BUFFER];
                loop {
                    let chunk = match reader.read(&mut buf) {
                        Ok(n) => Ok(buf[..n].to_vec()),
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => Err(e),
                    };
                    let last = !matches!(&chunk, Ok(bytes) if !bytes.is_empty());
                    if tx.send(chunk).is_err() || last {
                        break;
                    }
                }
            })?;
        Ok(Source::Pump(rx))
    }

    fn wait(&mut self, timeout: Duration) -> Wait {
        match self {
            #[cfg(unix)]
            Source::Fd { fd, .. } => wait_fd(*fd, timeout),
            Source::Pump(rx) => match rx.recv_timeout(timeout) {
                Ok(Ok(bytes)) if bytes.is_empty() => Wait::Eof,
                Ok(Ok(bytes)) => Wait::Data(bytes),
                Ok(Err(e)) => Wait::Failed(e),
                Err(std_mpsc::RecvTimeoutError::Timeout) => Wait::Idle,
                Err(std_mpsc::RecvTimeoutError::Disconnected) => Wait::Eof,
            },
        }
    }
}

#[cfg(unix)]
fn wait_fd(fd: std::os::fd::RawFd, timeout: Duration) -> Wait {
    let mut fds = [libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    }];
    let timeout_ms = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);
    // SAFETY: `fds` is a valid array of one pollfd for the duration of the call.
    let ready = unsafe { libc::poll(fds.as_mut_ptr(), 1, timeout_ms) };
    if ready < 0 {
        let e = io::Error::last_os_error();
        return if e.kind() == io::ErrorKind::Interrupted {
            Wait::Idle
        } else {
            Wait::Failed(e)
        };
    }
    if ready == 0 {
        return Wait::Idle;
    }
    if fds[0].revents & libc::POLLNVAL != 0 {
        return Wait::Failed(io::Error::new(
            io::ErrorKind::InvalidInput,
            "input descriptor is not open",
        ));
    }

    let mut buf = [0u8; READ_BUFFER];
    // SAFETY: `buf` is valid for writes of `buf.len()` bytes.
    let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
    match n {
        0 => Wait::Eof,
        n if n > 0 => Wait::Data(buf[..n as usize].to_vec()),
        _ => {
            let e = io::Error::last_os_error();
            match e.kind() {
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => Wait::Idle,
                _ => Wait::Failed(e),
            }
        }
    }
}

fn read_loop<M: Send + 'static>(
    mut source: Source,
    control: std_mpsc::Receiver<Control>,
    queue: Sender<M>,
    escape_timeout: Duration,
) {
    let mut decoder = Decoder::new();
    let mut last_input = Instant::now();

    let emit = |events: Vec<_>| events.into_iter().all(|ev| queue.event(Event::from(ev)));

    loop {
        match control.try_recv() {
            Ok(Control::Pause(ack)) => {
                let _ = ack.send(());
                trace!("input paused");
                if !wait_for_resume(&control) {
                    break;
                }
                trace!("input resumed");
                last_input = Instant::now();
            }
            Ok(Control::Resume) | Err(std_mpsc::TryRecvError::Empty) => {}
            Ok(Control::Stop) | Err(std_mpsc::TryRecvError::Disconnected) => break,
        }

        let open = match source.wait(POLL_INTERVAL) {
            Wait::Data(bytes) => {
                last_input = Instant::now();
                emit(decoder.feed(&bytes))
            }
            Wait::Idle => {
                if decoder.has_pending() && last_input.elapsed() >= escape_timeout {
                    emit(decoder.flush())
                } else {
                    true
                }
            }
            Wait::Eof => {
                emit(decoder.flush());
                debug!("input closed");
                break;
            }
            Wait::Failed(e) => {
                error!(error = %e, "reading input failed");
                queue.send(Envelope::Fatal(e));
                break;
            }
        };
        if !open {
            break;
        }
    }
    debug!("input reader stopped");
}

/// Block until resumed. Returns `false` if told to stop instead.
fn wait_for_resume(control: &std_mpsc::Receiver<Control>) -> bool {
    loop {
        match control.recv() {
            Ok(Control::Resume) => return true,
            Ok(Control::Pause(ack)) => {
                let _ = ack.send(());
            }
            Ok(Control::Stop) | Err(_) => return false,
        }
    }
}
