//! Command-line configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::error::{Error, Result};
use crate::types::Mode;

/// Bridge a serial device to HTTP and WebSocket clients.
#[derive(Parser, Debug, Clone)]
#[command(name = "serial-forwarder", version, about)]
pub struct Cli {
    /// HTTP port to listen on.
    pub http_port: u16,

    /// Serial port path (e.g. `/dev/ttyUSB0` or `COM3`).
    pub serial_port: String,

    /// Serial baud rate.
    pub baud: u32,

    /// Rolling buffer length in characters.
    pub buffer_len: usize,

    /// Any value (e.g. `LOG=YES`) enables CSV logging of received lines.
    pub log: Option<String>,

    /// Address to bind the HTTP listener to.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// `live` forwards to the serial port, `simulated` serves synthetic readings.
    #[arg(long, default_value_t = Mode::Live)]
    pub mode: Mode,

    /// Directory for CSV logs.
    #[arg(long, default_value = ".")]
    pub log_dir: PathBuf,

    /// Milliseconds to wait after opening the port before serving requests.
    #[arg(long, default_value_t = 3000)]
    pub settle_ms: u64,

    /// Reopen a lost serial port after this many milliseconds (default: never).
    #[arg(long)]
    pub reconnect_ms: Option<u64>,
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub serial_port: String,
    pub baud: u32,
    pub capacity: usize,
    pub mode: Mode,
    /// Set when CSV logging is enabled.
    pub log_dir: Option<PathBuf>,
    pub settle: Duration,
    pub reconnect: Option<Duration>,
}

impl TryFrom<Cli> for Config {
    type Error = Error;

    fn try_from(cli: Cli) -> Result<Self> {
        if cli.buffer_len == 0 {
            return Err(Error::InvalidConfig(
                "buffer length must be positive".into(),
            ));
        }
        if cli.baud == 0 {
            return Err(Error::InvalidConfig("baud rate must be positive".into()));
        }

        Ok(Self {
            addr: SocketAddr::new(cli.bind, cli.http_port),
            serial_port: cli.serial_port,
            baud: cli.baud,
            capacity: cli.buffer_len,
            mode: cli.mode,
            log_dir: cli.log.map(|_| cli.log_dir),
            settle: Duration::from_millis(cli.settle_ms),
            reconnect: cli.reconnect_ms.map(Duration::from_millis),
        })
    }
}
