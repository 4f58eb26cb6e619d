// Cellular modem access over AT commands

pub mod at;
pub mod bringup;
pub mod transport;

pub use at::{AtClient, SerialPort};
pub use transport::{ModemTimeouts, ModemTransport};
