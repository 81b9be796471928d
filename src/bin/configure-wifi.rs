//! Stores WiFi credentials in NVS for the firmware to pick up.
//!
//! Usage:
//!   WIFI_SSID="MyNetwork" WIFI_PASSWORD="secret" cargo configure-wifi
//!
//! For open networks:
//!   WIFI_SSID="OpenNetwork" WIFI_PASSWORD="" cargo configure-wifi
//!
//! Pass `WIFI_CLEAR=1` instead to erase stored credentials.

#[cfg(feature = "esp32")]
const WIFI_SSID: Option<&str> = option_env!("WIFI_SSID");

#[cfg(feature = "esp32")]
const WIFI_PASSWORD: Option<&str> = option_env!("WIFI_PASSWORD");

#[cfg(feature = "esp32")]
const WIFI_CLEAR: Option<&str> = option_env!("WIFI_CLEAR");

/// Print the error and exit after giving the serial monitor time to flush.
#[cfg(feature = "esp32")]
fn halt_with_error(msg: &str) -> ! {
    log::error!("{}", msg);
    eprintln!("\n=== Configuration failed ===\n");
    std::thread::sleep(std::time::Duration::from_secs(2));
    std::process::exit(1);
}

#[cfg(feature = "esp32")]
fn main() {
    use prism_wifi::config::Credentials;
    use prism_wifi::wifi::{clear_credentials, open_namespace, save_credentials, take_nvs_partition};

    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    println!("\n=== WiFi Configuration Utility ===\n");

    let mut nvs = match take_nvs_partition().and_then(open_namespace) {
        Ok(nvs) => nvs,
        Err(e) => halt_with_error(&format!("Error initializing NVS: {:?}", e)),
    };

    if WIFI_CLEAR.is_some_and(|v| v == "1") {
        if let Err(e) = clear_credentials(&mut nvs) {
            halt_with_error(&format!("Error clearing NVS: {:?}", e));
        }
        println!("=== Stored WiFi credentials cleared ===");
        std::thread::sleep(std::time::Duration::from_secs(2));
        return;
    }

    let ssid = match WIFI_SSID {
        Some(s) if !s.is_empty() => s,
        _ => halt_with_error(
            "WIFI_SSID was not set at compile time.\n\n\
             Usage:\n  WIFI_SSID=\"MyNetwork\" WIFI_PASSWORD=\"secret\" cargo configure-wifi",
        ),
    };
    let password = WIFI_PASSWORD.unwrap_or("");

    println!("SSID: {}", ssid);
    println!(
        "Password: {} ({} chars)",
        if password.is_empty() { "(none)" } else { "****" },
        password.len()
    );

    let credentials = match Credentials::new(ssid, password) {
        Ok(credentials) => credentials,
        Err(e) => halt_with_error(&format!("Invalid credentials: {}", e)),
    };

    if let Err(e) = save_credentials(&mut nvs, &credentials) {
        halt_with_error(&format!("Error saving to NVS: {:?}", e));
    }

    println!("\n=== WiFi configuration saved to NVS ===\n");
    std::thread::sleep(std::time::Duration::from_secs(2));
}

#[cfg(not(feature = "esp32"))]
fn main() {
    eprintln!("This binary must be built for ESP32.");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  WIFI_SSID=\"MyNetwork\" WIFI_PASSWORD=\"secret\" cargo configure-wifi");
    std::process::exit(1);
}
