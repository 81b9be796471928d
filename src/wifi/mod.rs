//! WiFi station bring-up.
//!
//! # Components
//!
//! - [`machine`] - retry state machine (host-testable)
//! - [`signal`] - set-once outcome latch
//! - [`manager`] - [`ConnectionManager`] and the [`LinkDriver`] trait
//! - [`simulated`] - scripted driver for host runs
//! - `esp` - ESP-IDF driver (ESP32 only)
//! - `storage` - NVS bring-up and credential persistence (ESP32 only)

pub mod machine;
pub mod manager;
pub mod signal;
pub mod simulated;

#[cfg(feature = "esp32")]
mod esp;
#[cfg(feature = "esp32")]
mod storage;

pub use machine::{ConnectionState, LinkEvent, Outcome};
pub use manager::{ConnectionManager, EventHandler, LinkDriver, WifiError};
pub use simulated::{Reply, SimulatedDriver};

#[cfg(feature = "esp32")]
pub use esp::{EspLinkDriver, EspSubscriptions};
#[cfg(feature = "esp32")]
pub use storage::{
    clear_credentials, load_credentials, open_namespace, save_credentials, take_nvs_partition,
};
