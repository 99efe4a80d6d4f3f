/// Events broadcast to real-time subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// A stamped chunk of serial data (`"<seconds>,<chunk>"`).
    Data(String),
    /// The serial port was opened or reopened.
    Connected,
    /// The serial port was lost or the IO task stopped.
    Disconnected,
}
