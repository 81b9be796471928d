//! Prism firmware entrypoint.
//!
//! Brings up NVS, connects WiFi and keeps the link alive. Credentials come
//! from NVS (see `configure-wifi`) or, failing that, from `WIFI_SSID` /
//! `WIFI_PASSWORD` at compile time.

#[cfg(feature = "esp32")]
fn main() {
    // Link ESP-IDF patches (must be first!)
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    log::info!("=== Prism starting ===");

    if let Err(e) = firmware::run() {
        log::error!("WiFi bring-up failed: {}", e);
    }
}

#[cfg(feature = "esp32")]
mod firmware {
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use log::{debug, error, info, warn};
    use prism_wifi::config::{ConnectionPolicy, Credentials};
    use prism_wifi::wifi::{self, ConnectionManager, EspLinkDriver, Outcome, WifiError};
    use std::sync::Arc;
    use std::time::Duration;

    const WIFI_SSID: Option<&str> = option_env!("WIFI_SSID");
    const WIFI_PASSWORD: Option<&str> = option_env!("WIFI_PASSWORD");

    pub fn run() -> Result<(), WifiError> {
        let peripherals = Peripherals::take()?;
        let sysloop = EspSystemEventLoop::take()?;

        // Settings store must be ready before the radio starts
        let partition = wifi::take_nvs_partition()?;
        let credentials = resolve_credentials(partition.clone())?;

        let driver = Arc::new(EspLinkDriver::new(peripherals.modem, sysloop, partition)?);
        let manager =
            ConnectionManager::start(Arc::clone(&driver), &credentials, ConnectionPolicy::default())?;

        match manager.wait_for_outcome()? {
            Outcome::Connected(ip) => {
                info!("Network ready, IP: {}", ip);
                // The driver owns the station; keep it alive
                loop {
                    std::thread::sleep(Duration::from_secs(10));
                    debug!("Heartbeat...");
                }
            }
            Outcome::Failed { attempts } => {
                error!("No network after {} retries, continuing offline", attempts);
                Ok(())
            }
        }
    }

    fn resolve_credentials(partition: EspDefaultNvsPartition) -> Result<Credentials, WifiError> {
        let nvs = wifi::open_namespace(partition)?;
        if let Some(credentials) = wifi::load_credentials(&nvs) {
            info!("Using WiFi credentials from NVS");
            return Ok(credentials);
        }

        match WIFI_SSID {
            Some(ssid) if !ssid.is_empty() => {
                warn!("No credentials in NVS, using build-time WIFI_SSID");
                Ok(Credentials::new(ssid, WIFI_PASSWORD.unwrap_or(""))?)
            }
            _ => {
                error!("No WiFi credentials in NVS or WIFI_SSID; run configure-wifi first");
                Err(WifiError::NotConfigured)
            }
        }
    }
}

#[cfg(not(feature = "esp32"))]
fn main() {
    println!("This binary requires the 'esp32' feature.");
    println!("Use 'cargo run --bin simulate' to exercise the connection manager on the host.");
}
