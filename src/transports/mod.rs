//! Transport implementations
//!
//! - [`IoTransport`]: any tokio `AsyncRead + AsyncWrite` object
//! - [`SerialTransport`]: a serial port (requires the `serial` feature)
//! - [`SimulatedBoard`]: an in-memory board for tests and demos

pub mod io;
pub mod serial;
pub mod simulated;

pub use io::IoTransport;
pub use serial::SerialTransport;
pub use simulated::{BoardProbe, SimulatedBoard};
