//! ForwarderBuilder: configure and open a serial forwarder.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::csv_log::CsvLog;
use crate::device::SerialForwarder;
use crate::error::{Error, Result};
use crate::event::BridgeEvent;
use crate::forwarder::ForwarderInfo;
use crate::io::{IoContext, Reconnect, spawn_io_task};
use crate::protocol;
use crate::session::Session;
use crate::transport::{self, BoxedPort, PortOpener, SerialIo};
use crate::types::Mode;

/// Default baud rate.
pub const DEFAULT_BAUD: u32 = 9600;

/// Default rolling buffer capacity in characters.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Builder for creating a serial forwarder.
///
/// # Example
///
/// ```no_run
/// # use std::time::Duration;
/// # use serial_forwarder::ForwarderBuilder;
/// # async fn example() -> serial_forwarder::Result<()> {
/// let forwarder = ForwarderBuilder::new("/dev/ttyUSB0")
///     .baud(115_200)
///     .capacity(4096)
///     .settle(Duration::from_secs(3))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct ForwarderBuilder {
    port_path: String,
    baud: u32,
    capacity: usize,
    settle: Duration,
    log_dir: Option<PathBuf>,
    reconnect_delay: Option<Duration>,
    opener: Option<PortOpener>,
}

impl ForwarderBuilder {
    /// Create a new builder for the given serial port path.
    pub fn new(port: &str) -> Self {
        Self {
            port_path: port.to_string(),
            baud: DEFAULT_BAUD,
            capacity: DEFAULT_CAPACITY,
            settle: Duration::ZERO,
            log_dir: None,
            reconnect_delay: None,
            opener: None,
        }
    }

    /// Serial baud rate (default: 9600).
    pub fn baud(mut self, baud: u32) -> Self {
        self.baud = baud;
        self
    }

    /// Rolling buffer capacity in characters (default: 10000).
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Pause after opening the port so the device can boot (default: none).
    ///
    /// Many boards reset when the port opens.
    pub fn settle(mut self, delay: Duration) -> Self {
        self.settle = delay;
        self
    }

    /// Log every received chunk to a new CSV file in `dir`.
    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Reopen the port `delay` after it is lost (default: stay closed).
    pub fn reconnect(mut self, delay: Duration) -> Self {
        self.reconnect_delay = Some(delay);
        self
    }

    /// Override how the port is reopened (for testing with MockPort).
    pub fn opener(mut self, opener: PortOpener) -> Self {
        self.opener = Some(opener);
        self
    }

    /// Build the forwarder using a real serial port.
    pub async fn build(self) -> Result<SerialForwarder> {
        let port = transport::open_serial(&self.port_path, self.baud)?;
        self.build_with_port(port).await
    }

    /// Build using a pre-opened port (for testing with MockPort).
    pub async fn build_with_port<P>(self, port: P) -> Result<SerialForwarder>
    where
        P: SerialIo + 'static,
    {
        if self.capacity == 0 {
            return Err(Error::InvalidConfig(
                "buffer capacity must be positive".into(),
            ));
        }
        info!(port = %self.port_path, baud = self.baud, "serial port open");

        let log = match &self.log_dir {
            Some(dir) => Some(CsvLog::create_in(dir, protocol::now_millis() / 1000).await?),
            None => None,
        };

        if !self.settle.is_zero() {
            info!("waiting {:?} for device to settle", self.settle);
            tokio::time::sleep(self.settle).await;
        }

        let reconnect = self.reconnect_delay.map(|delay| Reconnect {
            opener: self
                .opener
                .clone()
                .unwrap_or_else(|| transport::serial_opener(&self.port_path, self.baud)),
            delay,
        });
        debug!(reconnect = reconnect.is_some(), "starting IO task");

        let (event_tx, _) = broadcast::channel::<BridgeEvent>(256);
        let _ = event_tx.send(BridgeEvent::Connected);

        let session = Arc::new(Session::new(self.capacity));
        let io = spawn_io_task(
            Box::new(port) as BoxedPort,
            IoContext {
                session: session.clone(),
                event_tx: event_tx.clone(),
                log,
                reconnect,
            },
        );

        Ok(SerialForwarder {
            io,
            info: ForwarderInfo {
                port: self.port_path,
                baud: self.baud,
                capacity: self.capacity,
                mode: Mode::Live,
            },
            session,
            event_tx,
        })
    }
}
