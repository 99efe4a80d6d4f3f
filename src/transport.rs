//! Serial port transport and MockPort for testing.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Anything the IO task can own as a serial port.
pub trait SerialIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> SerialIo for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// A type-erased serial port, so a reopened port can replace the original.
pub type BoxedPort = Box<dyn SerialIo>;

/// Opens a fresh port handle. Used by the IO task to reconnect.
pub type PortOpener = Arc<dyn Fn() -> crate::Result<BoxedPort> + Send + Sync>;

/// Open a serial port at `baud`, 8N1, no flow control.
pub fn open_serial(path: &str, baud: u32) -> crate::Result<tokio_serial::SerialStream> {
    let builder = tokio_serial::new(path, baud)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None);

    let port = tokio_serial::SerialStream::open(&builder)
        .map_err(|e| crate::Error::Transport(format!("failed to open {path}: {e}")))?;

    Ok(port)
}

/// A [`PortOpener`] that reopens `path` at `baud`.
pub fn serial_opener(path: &str, baud: u32) -> PortOpener {
    let path = path.to_string();
    Arc::new(move || open_serial(&path, baud).map(|p| Box::new(p) as BoxedPort))
}

// ---------------------------------------------------------------------------
// MockPort for testing
// ---------------------------------------------------------------------------

struct MockState {
    /// Bytes available for the reader (device → host).
    read_buf: Vec<u8>,
    /// All bytes written by the host (host → device).
    write_log: Vec<u8>,
    /// Reads and writes fail.
    closed: bool,
    /// Reads return EOF once the queue is drained (device unplugged).
    hung_up: bool,
    /// Waker to notify when new data is queued.
    read_waker: Option<Waker>,
}

/// A mock serial port implementing `AsyncRead + AsyncWrite` for testing.
///
/// Feed device output with [`queue_read()`](MockPort::queue_read), then
/// inspect what the forwarder sent with [`written_data()`](MockPort::written_data).
#[derive(Clone)]
pub struct MockPort {
    state: Arc<Mutex<MockState>>,
}

impl MockPort {
    /// Create a new MockPort with no queued data.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                read_buf: Vec::new(),
                write_log: Vec::new(),
                closed: false,
                hung_up: false,
                read_waker: None,
            })),
        }
    }

    /// Queue bytes that will be returned by reads (simulating device → host).
    /// Wakes any pending readers.
    pub fn queue_read(&self, data: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.read_buf.extend_from_slice(data);
        if let Some(waker) = state.read_waker.take() {
            waker.wake();
        }
    }

    /// Get all bytes written to the port (host → device).
    pub fn written_data(&self) -> Vec<u8> {
        self.state.lock().unwrap().write_log.clone()
    }

    /// Mark the port as closed (subsequent reads/writes return error).
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        if let Some(waker) = state.read_waker.take() {
            waker.wake();
        }
    }

    /// Simulate the device going away: reads return EOF after draining.
    pub fn hang_up(&self) {
        let mut state = self.state.lock().unwrap();
        state.hung_up = true;
        if let Some(waker) = state.read_waker.take() {
            waker.wake();
        }
    }
}

impl Default for MockPort {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncRead for MockPort {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock port closed",
            )));
        }

        if state.read_buf.is_empty() {
            if state.hung_up {
                return Poll::Ready(Ok(()));
            }
            state.read_waker = Some(cx.waker().clone());
            return Poll::Pending;
        }

        let n = buf.remaining().min(state.read_buf.len());
        buf.put_slice(&state.read_buf[..n]);
        state.read_buf.drain(..n);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockPort {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock port closed",
            )));
        }

        state.write_log.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let state = self.state.lock().unwrap();
        if state.closed {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock port closed",
            )));
        }
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        if let Some(waker) = state.read_waker.take() {
            waker.wake();
        }
        Poll::Ready(Ok(()))
    }
}
