//! Shared buffer and last-heard state.

use std::sync::{Mutex, MutexGuard};

use crate::buffer::RollingBuffer;
use crate::protocol;

struct SessionState {
    buffer: RollingBuffer,
    /// Milliseconds since the epoch; 0 until data arrives.
    last_heard_ms: u64,
}

/// Rolling buffer plus last-heard timestamp behind one lock.
///
/// The IO task is the only writer; HTTP and WebSocket handlers read.
pub struct Session {
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(SessionState {
                buffer: RollingBuffer::new(capacity),
                last_heard_ms: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // Every mutation is a single append/assign, so a poisoned state is still consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a stamped chunk and mark it as heard at `millis`.
    pub fn record(&self, stamped: &str, millis: u64) {
        let mut state = self.lock();
        state.buffer.append(stamped);
        state.last_heard_ms = millis;
    }

    /// Snapshot of the rolling buffer.
    pub fn snapshot(&self) -> String {
        self.lock().buffer.read()
    }

    pub fn last_heard_millis(&self) -> u64 {
        self.lock().last_heard_ms
    }

    /// Last-heard time as fractional seconds, `"0"` if nothing arrived yet.
    pub fn last_heard(&self) -> String {
        protocol::format_timestamp(self.last_heard_millis())
    }

    pub fn capacity(&self) -> usize {
        self.lock().buffer.capacity()
    }
}
