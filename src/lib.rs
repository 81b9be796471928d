//! Prism WiFi bring-up library.
//!
//! Connects the ESP32 station interface with a bounded retry policy and
//! blocks the caller until the link is up or the attempt has failed. The
//! connection logic is platform-independent and tested on the host; the
//! ESP-IDF driver and NVS storage are behind the `esp32` feature.

pub mod config;
pub mod wifi;

// Re-export commonly used items
pub use config::{ConfigError, ConnectionPolicy, Credentials};
pub use wifi::{ConnectionManager, ConnectionState, LinkDriver, Outcome, WifiError};
