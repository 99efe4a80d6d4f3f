//! Serving with a staged graceful shutdown.
//!
//! Once the token is cancelled the listener stops accepting and open
//! connections are asked to finish. Connections still open after the drain
//! period are severed: their sockets fail every read and write, which ends
//! the connection task and closes the socket. The binary additionally arms a
//! hard process deadline.

use std::future::{Future, IntoFuture};
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::Router;
use axum::serve::Listener;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{info, warn};

use crate::error::Result;

/// Printed on stdout once the listener is bound.
pub const READY_LINE: &str = "open";

/// How long severed connections get to unwind before `serve` returns anyway.
const SEVER_GRACE: Duration = Duration::from_secs(1);

/// Timings for the shutdown sequence.
#[derive(Debug, Clone, Copy)]
pub struct ShutdownPlan {
    /// How long open connections may take to finish before being dropped.
    pub drain: Duration,
    /// Hard limit after which the process exits with status 1.
    pub deadline: Duration,
}

impl Default for ShutdownPlan {
    fn default() -> Self {
        Self {
            drain: Duration::from_secs(5),
            deadline: Duration::from_secs(10),
        }
    }
}

/// How the server stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// All connections closed within the drain period.
    Graceful,
    /// Connections were still open and got dropped.
    Forced,
}

/// Bind `addr`, then announce readiness on `out`.
///
/// Nothing is written if the bind fails.
pub async fn bind_and_announce<W: io::Write>(
    addr: SocketAddr,
    out: &mut W,
) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    writeln!(out, "{READY_LINE}")?;
    out.flush()?;
    Ok(listener)
}

/// Serve `router` on `listener` until `token` is cancelled and the drain finishes.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    token: CancellationToken,
    plan: ShutdownPlan,
) -> Result<ShutdownOutcome> {
    let sever = CancellationToken::new();
    let listener = SeveringListener {
        inner: listener,
        sever: sever.clone(),
    };

    let signal = token.clone();
    let server = axum::serve(listener, router)
        .with_graceful_shutdown(async move { signal.cancelled().await })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        res = &mut server => {
            res?;
            return Ok(ShutdownOutcome::Graceful);
        }
        _ = token.cancelled() => {}
    }

    info!("shutting down gracefully");
    match tokio::time::timeout(plan.drain, &mut server).await {
        Ok(res) => {
            res?;
            info!("closed out remaining connections");
            Ok(ShutdownOutcome::Graceful)
        }
        Err(_) => {
            warn!(
                "connections still open after {:?}, dropping them",
                plan.drain
            );
            sever.cancel();
            if tokio::time::timeout(SEVER_GRACE, &mut server).await.is_err() {
                warn!("severed connections did not unwind in {SEVER_GRACE:?}");
            }
            Ok(ShutdownOutcome::Forced)
        }
    }
}

/// Exit the process with status 1 if it is still running after `deadline`.
///
/// Runs on a plain thread so a wedged runtime cannot hold it up.
pub fn arm_deadline(deadline: Duration) {
    std::thread::spawn(move || {
        std::thread::sleep(deadline);
        tracing::error!("could not close connections in time, forcefully shutting down");
        std::process::exit(1);
    });
}

/// TCP listener whose connections can all be cut at once.
struct SeveringListener {
    inner: TcpListener,
    sever: CancellationToken,
}

impl Listener for SeveringListener {
    type Io = Severable<TcpStream>;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        let (stream, addr) = Listener::accept(&mut self.inner).await;
        (Severable::new(stream, &self.sever), addr)
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        self.inner.local_addr()
    }
}

/// Stream wrapper that fails all IO once its token is cancelled.
struct Severable<T> {
    inner: T,
    token: CancellationToken,
    severed: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl<T> Severable<T> {
    fn new(inner: T, token: &CancellationToken) -> Self {
        Self {
            inner,
            token: token.clone(),
            severed: Box::pin(token.clone().cancelled_owned()),
        }
    }

    /// Ready with an error once severed; otherwise registers for the wakeup.
    fn poll_severed(&mut self, cx: &mut Context<'_>) -> Poll<io::Error> {
        if self.token.is_cancelled() || self.severed.as_mut().poll(cx).is_ready() {
            Poll::Ready(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "connection dropped at shutdown",
            ))
        } else {
            Poll::Pending
        }
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for Severable<T> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if let Poll::Ready(e) = self.poll_severed(cx) {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for Severable<T> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if let Poll::Ready(e) = self.poll_severed(cx) {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if let Poll::Ready(e) = self.poll_severed(cx) {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
