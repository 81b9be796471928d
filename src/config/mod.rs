//! Connection configuration.
//!
//! - [`Credentials`] - validated network name and passphrase
//! - [`ConnectionPolicy`] - retry bound for a connection attempt
//!
//! Both are host-testable; persistence lives in [`crate::wifi`] behind the
//! `esp32` feature.

mod credentials;

pub use credentials::{
    ConfigError, ConnectionPolicy, Credentials, DEFAULT_MAX_RETRIES, MAX_PASSWORD_LEN,
    MAX_SSID_LEN, MIN_PASSWORD_LEN,
};
