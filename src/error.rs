/// Errors produced by the forwarder.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Underlying I/O failure on the serial port or log file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The serial port could not be opened or configured.
    #[error("transport error: {0}")]
    Transport(String),

    /// The IO task is gone or the serial port is closed.
    #[error("serial port not connected")]
    NotConnected,

    /// The IO task did not answer in time.
    #[error("timed out waiting for the serial port")]
    Timeout,

    /// Startup configuration was rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The CSV log could not be created or written.
    #[error("log error: {0}")]
    Log(String),
}

pub type Result<T> = std::result::Result<T, Error>;
