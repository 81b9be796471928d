//! NVS bring-up and credential persistence.
//!
//! The default NVS partition must be initialized before WiFi starts.
//! [`take_nvs_partition`] does that; ESP-IDF erases and re-initializes the
//! partition when it has no free pages or was written by a newer version.

use crate::config::{Credentials, MAX_PASSWORD_LEN, MAX_SSID_LEN};
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use esp_idf_sys::EspError;
use log::{debug, warn};
use std::sync::Mutex;
use zeroize::Zeroizing;

/// NVS namespace for WiFi configuration.
const NVS_NAMESPACE: &str = "wifi_config";

/// NVS key for stored credentials.
const NVS_KEY: &str = "credentials";

/// `[ssid_len:1][ssid:32][password_len:1][password:64]`
const MAX_CREDENTIALS_SIZE: usize = 1 + MAX_SSID_LEN + 1 + MAX_PASSWORD_LEN;

/// Partition handle shared by every caller; ESP-IDF allows a single `take()`.
static NVS_PARTITION: Mutex<Option<EspDefaultNvsPartition>> = Mutex::new(None);

/// Initialize the default NVS partition and return a handle to it.
///
/// The first call initializes the partition; later calls return a clone of
/// the same handle, so this is safe to call more than once.
pub fn take_nvs_partition() -> Result<EspDefaultNvsPartition, EspError> {
    let mut slot = NVS_PARTITION.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(partition) = slot.as_ref() {
        return Ok(partition.clone());
    }
    let partition = EspDefaultNvsPartition::take()?;
    *slot = Some(partition.clone());
    Ok(partition)
}

/// Open the WiFi configuration namespace read-write.
pub fn open_namespace(partition: EspDefaultNvsPartition) -> Result<EspNvs<NvsDefault>, EspError> {
    EspNvs::new(partition, NVS_NAMESPACE, true)
}

/// Load credentials from NVS.
///
/// Returns `None` if nothing is stored or the stored data is unusable.
pub fn load_credentials(nvs: &EspNvs<NvsDefault>) -> Option<Credentials> {
    let mut buf = Zeroizing::new([0u8; MAX_CREDENTIALS_SIZE]);
    let bytes = match nvs.get_raw(NVS_KEY, buf.as_mut_slice()) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            debug!("No WiFi credentials in NVS");
            return None;
        }
        Err(e) => {
            warn!("Failed to read WiFi credentials from NVS: {:?}", e);
            return None;
        }
    };

    match Credentials::from_bytes(bytes) {
        Ok(credentials) => Some(credentials),
        Err(e) => {
            warn!("Stored WiFi credentials are invalid: {}", e);
            None
        }
    }
}

/// Save credentials to NVS.
pub fn save_credentials(
    nvs: &mut EspNvs<NvsDefault>,
    credentials: &Credentials,
) -> Result<(), EspError> {
    let bytes = Zeroizing::new(credentials.to_bytes());
    nvs.set_raw(NVS_KEY, &bytes)?;
    Ok(())
}

/// Remove stored credentials.
pub fn clear_credentials(nvs: &mut EspNvs<NvsDefault>) -> Result<(), EspError> {
    nvs.remove(NVS_KEY)?;
    Ok(())
}
