use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::event::BridgeEvent;
use crate::types::Mode;

/// Information about a running forwarder.
#[derive(Debug, Clone)]
pub struct ForwarderInfo {
    /// Serial port path (informational in simulated mode).
    pub port: String,
    pub baud: u32,
    /// Rolling buffer capacity in characters.
    pub capacity: usize,
    pub mode: Mode,
}

/// Backend-agnostic seam between the HTTP/WebSocket layer and the device.
///
/// Implemented by [`SerialForwarder`](crate::SerialForwarder) for a real port
/// and by [`SimulatedForwarder`](crate::SimulatedForwarder) for bench testing
/// without hardware.
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Get forwarder info.
    fn info(&self) -> &ForwarderInfo;

    /// Current contents served by `/read/`.
    async fn read(&self) -> String;

    /// Last-heard timestamp in fractional seconds, `"0"` before any data.
    fn last_heard(&self) -> String;

    /// Forward raw bytes to the device.
    async fn write(&self, data: &[u8]) -> Result<()>;

    /// Subscribe to data and connection events.
    fn subscribe(&self) -> broadcast::Receiver<BridgeEvent>;

    /// Close the connection.
    async fn close(&self) -> Result<()>;
}
