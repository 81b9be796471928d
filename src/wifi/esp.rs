//! ESP-IDF station driver.
//!
//! Wraps [`EspWifi`] and forwards `WIFI_EVENT_STA_START`,
//! `WIFI_EVENT_STA_DISCONNECTED` and `IP_EVENT_STA_GOT_IP` from the system
//! event loop to the connection manager.

use super::machine::LinkEvent;
use super::manager::{EventHandler, LinkDriver};
use crate::config::Credentials;
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::{EspSubscription, EspSystemEventLoop, System};
use esp_idf_svc::netif::IpEvent;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi, WifiEvent};
use esp_idf_sys::{EspError, ESP_ERR_INVALID_ARG};
use log::info;
use std::net::Ipv4Addr;
use std::sync::{Mutex, MutexGuard};

/// Station-mode WiFi driver backed by ESP-IDF.
pub struct EspLinkDriver {
    wifi: Mutex<EspWifi<'static>>,
    sysloop: EspSystemEventLoop,
}

impl EspLinkDriver {
    /// Create the driver.
    ///
    /// Taking the NVS partition guarantees the settings store is initialized
    /// before the radio is, as the WiFi stack keeps calibration data there.
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
    ) -> Result<Self, EspError> {
        let wifi = EspWifi::new(modem, sysloop.clone(), Some(nvs))?;
        Ok(Self {
            wifi: Mutex::new(wifi),
            sysloop,
        })
    }

    fn wifi(&self) -> MutexGuard<'_, EspWifi<'static>> {
        self.wifi.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Map a DHCP lease to a link event if it was handed to the station netif.
fn station_lease(station: usize, netif: usize, ip: Ipv4Addr) -> Option<LinkEvent> {
    (netif == station).then_some(LinkEvent::AddressAssigned(ip))
}

/// Event loop registrations; dropping them unsubscribes.
pub struct EspSubscriptions {
    _wifi: EspSubscription<'static, System>,
    _ip: EspSubscription<'static, System>,
}

impl LinkDriver for EspLinkDriver {
    type Error = EspError;
    type Subscription = EspSubscriptions;

    fn subscribe(&self, handler: EventHandler) -> Result<EspSubscriptions, EspError> {
        let on_wifi = handler.clone();
        let wifi = self
            .sysloop
            .subscribe::<WifiEvent, _>(move |event| match event {
                WifiEvent::StaStarted => on_wifi(LinkEvent::SessionStarted),
                WifiEvent::StaDisconnected { .. } => on_wifi(LinkEvent::Disconnected),
                _ => {}
            })?;

        // Ethernet and PPP leases arrive as the same event; keep the station's only
        let station = self.wifi().sta_netif().handle() as usize;
        let ip = self.sysloop.subscribe::<IpEvent, _>(move |event| {
            if let IpEvent::DhcpIpAssigned(assignment) = event {
                let netif = assignment.netif_handle() as usize;
                if let Some(event) = station_lease(station, netif, assignment.ip()) {
                    handler(event);
                }
            }
        })?;

        Ok(EspSubscriptions {
            _wifi: wifi,
            _ip: ip,
        })
    }

    fn begin(&self, credentials: &Credentials) -> Result<(), EspError> {
        let auth_method = if credentials.is_open() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };

        // Lengths are already bounded by `Credentials`
        let configuration = Configuration::Client(ClientConfiguration {
            ssid: credentials
                .ssid()
                .try_into()
                .map_err(|_| EspError::from_infallible::<ESP_ERR_INVALID_ARG>())?,
            password: credentials
                .password()
                .try_into()
                .map_err(|_| EspError::from_infallible::<ESP_ERR_INVALID_ARG>())?,
            auth_method,
            ..Default::default()
        });

        let mut wifi = self.wifi();
        wifi.set_configuration(&configuration)?;
        wifi.start()?;
        info!("Initialized WiFi station");
        Ok(())
    }

    fn connect(&self) -> Result<(), EspError> {
        self.wifi().connect()
    }
}
