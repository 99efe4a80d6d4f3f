pub mod buffer;
pub mod builder;
pub mod config;
pub mod csv_log;
pub mod device;
pub mod error;
pub mod event;
pub mod forwarder;
pub(crate) mod io;
pub mod protocol;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod simulated;
pub mod transport;
pub mod types;
pub mod ws;

pub use buffer::RollingBuffer;
pub use builder::ForwarderBuilder;
pub use config::{Cli, Config};
pub use device::SerialForwarder;
pub use error::{Error, Result};
pub use event::BridgeEvent;
pub use forwarder::{Forwarder, ForwarderInfo};
pub use server::{AppState, build_router};
pub use shutdown::{ShutdownOutcome, ShutdownPlan};
pub use simulated::SimulatedForwarder;
pub use transport::MockPort;
pub use types::Mode;
