use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::event::BridgeEvent;
use crate::forwarder::{Forwarder, ForwarderInfo};
use crate::io::IoHandle;
use crate::session::Session;

/// A forwarder bridging a real (or mock) serial port.
///
/// Implements [`Forwarder`]. Created via [`ForwarderBuilder`](crate::ForwarderBuilder).
pub struct SerialForwarder {
    pub(crate) io: IoHandle,
    pub(crate) info: ForwarderInfo,
    pub(crate) session: Arc<Session>,
    pub(crate) event_tx: broadcast::Sender<BridgeEvent>,
}

#[async_trait]
impl Forwarder for SerialForwarder {
    fn info(&self) -> &ForwarderInfo {
        &self.info
    }

    async fn read(&self) -> String {
        self.session.snapshot()
    }

    fn last_heard(&self) -> String {
        self.session.last_heard()
    }

    async fn write(&self, data: &[u8]) -> Result<()> {
        self.io.write(data.to_vec()).await
    }

    fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.event_tx.subscribe()
    }

    async fn close(&self) -> Result<()> {
        self.io.shutdown().await
    }
}

impl SerialForwarder {
    /// Get a reference to the forwarder info.
    pub fn info(&self) -> &ForwarderInfo {
        &self.info
    }

    /// Snapshot of the rolling buffer.
    pub fn buffer(&self) -> String {
        self.session.snapshot()
    }
}
