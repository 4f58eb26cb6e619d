//! Boot-time firmware update over a cellular modem.
//!
//! The `ota` core and the `modem` AT layer are hardware independent and are
//! tested on the host. `platform` binds them to ESP-IDF on the device.

pub mod config;
pub mod logging;
pub mod modem;
pub mod ota;
#[cfg(target_os = "espidf")]
pub mod platform;
pub mod version;

#[cfg(test)]
mod tests;
