//! Simulated forwarder for running without hardware.
//!
//! `/read/` returns a fresh line of synthetic readings on every call and
//! writes are accepted but go nowhere.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::Result;
use crate::event::BridgeEvent;
use crate::forwarder::{Forwarder, ForwarderInfo};
use crate::protocol;
use crate::types::Mode;

/// Values per synthetic reading.
pub const SIMULATED_FIELDS: usize = 6;

/// Exclusive upper bound of each synthetic value.
pub const SIMULATED_MAX: u32 = 12_300;

/// Forwarder that fabricates readings instead of opening a port.
pub struct SimulatedForwarder {
    info: ForwarderInfo,
    /// Milliseconds since the epoch of the last read, 0 before any.
    last_heard_ms: AtomicU64,
    event_tx: broadcast::Sender<BridgeEvent>,
}

impl SimulatedForwarder {
    pub fn new(port: &str, baud: u32, capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        info!(port, "simulated forwarder ready, serial port not opened");
        Self {
            info: ForwarderInfo {
                port: port.to_string(),
                baud,
                capacity,
                mode: Mode::Simulated,
            },
            last_heard_ms: AtomicU64::new(0),
            event_tx,
        }
    }

    /// Create the forwarder after the same settle pause a live port gets.
    pub async fn start(port: &str, baud: u32, capacity: usize, settle: Duration) -> Self {
        if !settle.is_zero() {
            info!("waiting {settle:?} before serving simulated readings");
            tokio::time::sleep(settle).await;
        }
        Self::new(port, baud, capacity)
    }
}

/// One line of synthetic readings, e.g. `"512,12001,7,300,9000,42"`.
pub fn simulated_reading() -> String {
    let mut rng = rand::thread_rng();
    (0..SIMULATED_FIELDS)
        .map(|_| rng.gen_range(0..SIMULATED_MAX).to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl Forwarder for SimulatedForwarder {
    fn info(&self) -> &ForwarderInfo {
        &self.info
    }

    async fn read(&self) -> String {
        self.last_heard_ms
            .store(protocol::now_millis(), Ordering::Relaxed);
        simulated_reading()
    }

    fn last_heard(&self) -> String {
        protocol::format_timestamp(self.last_heard_ms.load(Ordering::Relaxed))
    }

    async fn write(&self, data: &[u8]) -> Result<()> {
        debug!("simulated write of {} bytes: {:?}", data.len(), String::from_utf8_lossy(data));
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.event_tx.subscribe()
    }

    async fn close(&self) -> Result<()> {
        let _ = self.event_tx.send(BridgeEvent::Disconnected);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_shape() {
        for _ in 0..50 {
            let line = simulated_reading();
            let values: Vec<u32> = line.split(',').map(|v| v.parse().unwrap()).collect();
            assert_eq!(values.len(), SIMULATED_FIELDS);
            assert!(values.iter().all(|&v| v < SIMULATED_MAX));
        }
    }

    #[tokio::test]
    async fn test_read_touches_last_heard() {
        let sim = SimulatedForwarder::new("/dev/null", 9600, 100);
        assert_eq!(sim.last_heard(), "0");
        let _ = sim.read().await;
        assert_ne!(sim.last_heard(), "0");
    }

    #[tokio::test]
    async fn test_start_waits_for_settle() {
        let started = tokio::time::Instant::now();
        let sim = SimulatedForwarder::start("/dev/null", 9600, 100, Duration::from_millis(50)).await;
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(sim.info().capacity, 100);
    }

    #[tokio::test]
    async fn test_write_is_accepted() {
        let sim = SimulatedForwarder::new("/dev/null", 9600, 100);
        sim.write(b"hello").await.unwrap();
        assert_eq!(sim.info().mode, Mode::Simulated);
    }
}
