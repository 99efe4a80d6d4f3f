//! IO task: single tokio task owns the serial port.
//!
//! Writes arrive over an mpsc channel with a oneshot ack. Device output is
//! read in the same select loop, so the port never needs a lock. When the
//! port is lost and a reopen policy is set, the task swaps in a new handle.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::csv_log::CsvLog;
use crate::error::{Error, Result};
use crate::event::BridgeEvent;
use crate::protocol;
use crate::session::Session;
use crate::transport::{BoxedPort, PortOpener};

/// Bytes requested per serial read.
const READ_CHUNK: usize = 1024;

/// How long a caller waits for the IO task to ack a write.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// A request sent to the IO task.
#[derive(Debug)]
pub(crate) enum Request {
    /// Write bytes to the serial port and ack once the driver accepted them.
    Write {
        data: Vec<u8>,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Shut down the IO task.
    Shutdown { reply: oneshot::Sender<Result<()>> },
}

/// Reopen policy for a lost serial port.
#[derive(Clone)]
pub(crate) struct Reconnect {
    pub opener: PortOpener,
    pub delay: Duration,
}

/// Everything the IO task needs besides the port itself.
pub(crate) struct IoContext {
    pub session: Arc<Session>,
    pub event_tx: broadcast::Sender<BridgeEvent>,
    pub log: Option<CsvLog>,
    pub reconnect: Option<Reconnect>,
}

/// Handle for communicating with the IO task.
pub(crate) struct IoHandle {
    pub tx: mpsc::Sender<Request>,
    pub cancel: CancellationToken,
    pub _task: JoinHandle<()>,
}

impl IoHandle {
    /// Send bytes to the port and wait for acknowledgment.
    pub async fn write(&self, data: Vec<u8>) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Request::Write {
                data,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::NotConnected)?;

        match tokio::time::timeout(WRITE_TIMEOUT, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::NotConnected),
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Request graceful shutdown of the IO task.
    pub async fn shutdown(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .tx
            .send(Request::Shutdown { reply: reply_tx })
            .await
            .is_err()
        {
            self.cancel.cancel();
            return Ok(());
        }

        match tokio::time::timeout(Duration::from_secs(2), reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) | Err(_) => {
                self.cancel.cancel();
                Ok(())
            }
        }
    }
}

/// Spawn the IO task that owns the serial port.
pub(crate) fn spawn_io_task(port: BoxedPort, ctx: IoContext) -> IoHandle {
    let (tx, rx) = mpsc::channel::<Request>(32);
    let cancel = CancellationToken::new();

    let task = tokio::spawn(io_loop(port, rx, cancel.clone(), ctx));

    IoHandle {
        tx,
        cancel,
        _task: task,
    }
}

/// The main IO loop.
async fn io_loop(
    port: BoxedPort,
    mut rx: mpsc::Receiver<Request>,
    cancel: CancellationToken,
    mut ctx: IoContext,
) {
    debug!("IO task started");

    let mut port = Some(port);
    let mut chunk = vec![0u8; READ_CHUNK];
    let retry_delay = ctx
        .reconnect
        .as_ref()
        .map(|r| r.delay)
        .unwrap_or(Duration::from_secs(1));

    // Armed once per outage and re-armed only after a failed reopen.
    let reopen = tokio::time::sleep(retry_delay);
    tokio::pin!(reopen);
    let mut reopen_armed = false;

    loop {
        if port.is_none() && ctx.reconnect.is_some() && !reopen_armed {
            reopen.as_mut().reset(Instant::now() + retry_delay);
            reopen_armed = true;
        }

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("IO task cancelled");
                break;
            }

            req = rx.recv() => {
                match req {
                    Some(Request::Write { data, reply }) => {
                        let result = write_port(&mut port, &data, &ctx.event_tx).await;
                        let _ = reply.send(result);
                    }
                    Some(Request::Shutdown { reply }) => {
                        debug!("IO task shutdown requested");
                        let _ = reply.send(Ok(()));
                        break;
                    }
                    None => {
                        debug!("channel closed");
                        break;
                    }
                }
            }

            res = read_port(&mut port, &mut chunk), if port.is_some() => {
                match res {
                    Ok(0) => {
                        warn!("serial port closed");
                        drop_port(&mut port, &ctx.event_tx);
                    }
                    Ok(n) => ctx.handle_data(&chunk[..n]).await,
                    Err(e) => {
                        error!("serial read error: {e}");
                        drop_port(&mut port, &ctx.event_tx);
                    }
                }
            }

            _ = &mut reopen, if reopen_armed => {
                reopen_armed = false;
                if let Some(reconnect) = &ctx.reconnect {
                    match (reconnect.opener)() {
                        Ok(new_port) => {
                            info!("serial port reopened");
                            port = Some(new_port);
                            let _ = ctx.event_tx.send(BridgeEvent::Connected);
                        }
                        Err(e) => warn!("reopen failed, retrying in {retry_delay:?}: {e}"),
                    }
                }
            }
        }
    }

    if port.is_some() {
        let _ = ctx.event_tx.send(BridgeEvent::Disconnected);
    }
    debug!("IO task exiting");
}

impl IoContext {
    /// Stamp a chunk, log it, append it to the buffer and broadcast it.
    async fn handle_data(&mut self, bytes: &[u8]) {
        let millis = protocol::now_millis();
        let stamped = protocol::stamp_chunk(millis, &protocol::decode_chunk(bytes));

        if let Some(log) = self.log.as_mut() {
            let record = protocol::split_record(&stamped);
            if let Err(e) = log.append(&record).await {
                warn!("dropping log record: {e}");
            }
        }

        self.session.record(&stamped, millis);
        trace!("received {} bytes: {stamped:?}", bytes.len());
        let _ = self.event_tx.send(BridgeEvent::Data(stamped));
    }
}

async fn read_port(port: &mut Option<BoxedPort>, buf: &mut [u8]) -> std::io::Result<usize> {
    match port.as_mut() {
        Some(p) => p.read(buf).await,
        None => std::future::pending().await,
    }
}

async fn write_port(
    port: &mut Option<BoxedPort>,
    data: &[u8],
    event_tx: &broadcast::Sender<BridgeEvent>,
) -> Result<()> {
    let Some(p) = port.as_mut() else {
        return Err(Error::NotConnected);
    };

    trace!("writing {} bytes: {:02X?}", data.len(), data);
    let result = match p.write_all(data).await {
        Ok(()) => p.flush().await,
        Err(e) => Err(e),
    };

    result.map_err(|e| {
        error!("write error: {e}");
        drop_port(port, event_tx);
        Error::Io(e)
    })
}

fn drop_port(port: &mut Option<BoxedPort>, event_tx: &broadcast::Sender<BridgeEvent>) {
    if port.take().is_some() {
        let _ = event_tx.send(BridgeEvent::Disconnected);
    }
}
