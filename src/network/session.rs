//! Capture session of one open socket file.
//!
//! A session is created when the file is opened and lives until release.
//! The first read starts a producer thread that moves frames from the
//! capture handle into a bounded queue; reads take frames from that queue,
//! oldest first. A full queue blocks the producer, so no frame is dropped
//! on our side.

use crate::error::{FsError, Result};
use crate::network::capture::{Capturer, PacketSource, SourceError, capture_target};
use crate::network::types::ProcessSocket;
use crossbeam::channel::{self, Receiver, SendTimeoutError, Sender, TryRecvError, select};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Tuning of a capture session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Frames buffered between the producer and readers
    pub queue_capacity: usize,
    /// Pause after a transient capture error
    pub retry_delay: Duration,
    /// How often a producer blocked on a full queue checks for release
    pub enqueue_poll: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            retry_delay: Duration::from_millis(5),
            enqueue_poll: Duration::from_millis(100),
        }
    }
}

/// Observable lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Capture handle open, nothing read yet
    Idle,
    /// Producer running
    Streaming,
    /// Released, or the capture reached end of stream
    Closed,
}

enum Stage {
    Idle {
        source: Box<dyn PacketSource>,
        frames_tx: Sender<Vec<u8>>,
    },
    Streaming(JoinHandle<()>),
    Closed,
}

/// Cancels one pending read when triggered or dropped
pub struct CancelHandle {
    _tx: Sender<()>,
}

impl CancelHandle {
    pub fn cancel(self) {}
}

/// Cancellation signal observed by a single read
#[derive(Clone)]
pub struct Cancellation {
    rx: Receiver<()>,
}

impl Cancellation {
    pub fn pair() -> (CancelHandle, Cancellation) {
        let (tx, rx) = channel::bounded(0);
        (CancelHandle { _tx: tx }, Cancellation { rx })
    }

    /// A read that can only be interrupted by releasing the session
    pub fn never() -> Cancellation {
        Cancellation {
            rx: channel::never(),
        }
    }
}

pub struct CaptureSession {
    interface: String,
    filter: String,
    stage: Mutex<Stage>,
    frames: Receiver<Vec<u8>>,
    released: Arc<AtomicBool>,
    release_tx: Mutex<Option<Sender<()>>>,
    release_rx: Receiver<()>,
    config: SessionConfig,
}

impl CaptureSession {
    /// Open a capture for the socket's resolved tuple.
    ///
    /// Fails with UnsupportedTransport for sockets without a correlated tuple
    /// and with Capture when the interface or the filter is rejected.
    pub fn open(
        socket: &ProcessSocket,
        capturer: &dyn Capturer,
        config: SessionConfig,
    ) -> Result<Self> {
        let (interface, filter) = capture_target(socket)?;
        let source = capturer.open(&interface, &filter)?;

        let (frames_tx, frames) = channel::bounded(config.queue_capacity.max(1));
        let (release_tx, release_rx) = channel::bounded(0);

        info!(
            "Capture session for fd {} of process {} opened on {}",
            socket.id, socket.process_id, interface
        );

        Ok(Self {
            interface,
            filter,
            stage: Mutex::new(Stage::Idle { source, frames_tx }),
            frames,
            released: Arc::new(AtomicBool::new(false)),
            release_tx: Mutex::new(Some(release_tx)),
            release_rx,
            config,
        })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Frames waiting to be read
    pub fn queued(&self) -> usize {
        self.frames.len()
    }

    pub fn state(&self) -> SessionState {
        if self.released.load(Ordering::Acquire) {
            return SessionState::Closed;
        }
        match &*self.stage() {
            Stage::Idle { .. } => SessionState::Idle,
            Stage::Streaming(handle) if !handle.is_finished() => SessionState::Streaming,
            _ => SessionState::Closed,
        }
    }

    fn stage(&self) -> MutexGuard<'_, Stage> {
        self.stage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the producer unless it is already running
    fn start_streaming(&self) -> Result<()> {
        let mut stage = self.stage();
        match std::mem::replace(&mut *stage, Stage::Closed) {
            Stage::Idle { source, frames_tx } => {
                let released = Arc::clone(&self.released);
                let config = self.config.clone();
                let label = format!("{} [{}]", self.interface, self.filter);

                let handle = thread::Builder::new()
                    .name(format!("capture-{}", self.interface))
                    .spawn(move || produce(source, frames_tx, released, config, label))?;
                *stage = Stage::Streaming(handle);
            }
            other => *stage = other,
        }
        Ok(())
    }

    /// Next captured frame, oldest first.
    ///
    /// Blocks until a frame is available, the read is cancelled or the
    /// session is released; the latter two fail with Interrupted. A frame
    /// already queued is returned even if cancellation has fired. After the
    /// capture reached end of stream and the queue is drained an empty
    /// buffer is returned. `size` does not truncate frames.
    pub fn read(&self, size: u32, cancel: &Cancellation) -> Result<Vec<u8>> {
        if self.released.load(Ordering::Acquire) {
            return Err(FsError::Interrupted);
        }
        self.start_streaming()?;

        match self.frames.try_recv() {
            Ok(frame) => return Ok(frame),
            Err(TryRecvError::Disconnected) => return self.drained(),
            Err(TryRecvError::Empty) => {}
        }

        debug!("Waiting for a frame on {} (requested {} bytes)", self.interface, size);

        select! {
            recv(self.frames) -> frame => match frame {
                Ok(frame) => Ok(frame),
                Err(_) => self.drained(),
            },
            recv(self.release_rx) -> _ => Err(FsError::Interrupted),
            recv(cancel.rx) -> _ => Err(FsError::Interrupted),
        }
    }

    /// Outcome of a read on an empty, disconnected queue: end of file when
    /// the capture ended on its own, Interrupted when a release raced the read
    fn drained(&self) -> Result<Vec<u8>> {
        if self.released.load(Ordering::Acquire) {
            Err(FsError::Interrupted)
        } else {
            Ok(Vec::new())
        }
    }

    /// Close the capture handle and wake every pending read.
    ///
    /// A running producer notices the release on its next interaction with
    /// the handle and exits on its own.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.release_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        // dropping an idle source closes the handle right away
        *self.stage() = Stage::Closed;

        info!("Capture session on {} released", self.interface);
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.release();
    }
}

fn produce(
    mut source: Box<dyn PacketSource>,
    frames_tx: Sender<Vec<u8>>,
    released: Arc<AtomicBool>,
    config: SessionConfig,
    label: String,
) {
    debug!("Capture producer started: {}", label);

    while !released.load(Ordering::Acquire) {
        match source.next_frame() {
            Ok(Some(frame)) => {
                if !enqueue(&frames_tx, frame, &released, config.enqueue_poll) {
                    break;
                }
            }
            Ok(None) => continue,
            Err(SourceError::Transient(e)) => {
                debug!("Transient capture error on {}: {}", label, e);
                thread::sleep(config.retry_delay);
            }
            Err(SourceError::Closed) => {
                warn!("Capture reached end of stream: {}", label);
                break;
            }
        }
    }

    drop(source);
    debug!("Capture producer stopped: {}", label);
}

/// Blocking enqueue that gives up once the session is released.
/// Returns false when the frame could not be delivered.
fn enqueue(
    frames_tx: &Sender<Vec<u8>>,
    mut frame: Vec<u8>,
    released: &AtomicBool,
    poll: Duration,
) -> bool {
    loop {
        match frames_tx.send_timeout(frame, poll) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(back)) => {
                if released.load(Ordering::Acquire) {
                    return false;
                }
                frame = back;
            }
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}
