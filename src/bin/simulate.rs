//! Runs the connection manager against a simulated access point.
//!
//! # Usage
//!
//! ```bash
//! # Refuse 10 times, then hand out a lease
//! SIM_REFUSALS=10 cargo run --bin simulate
//!
//! # Never accept; exhaust a small retry bound
//! SIM_OUTCOME=fail SIM_MAX_RETRIES=5 cargo run --bin simulate
//! ```
//!
//! `SIM_LATENCY_MS` delays every simulated event.

use log::{error, info};
use prism_wifi::config::{ConnectionPolicy, Credentials, DEFAULT_MAX_RETRIES};
use prism_wifi::wifi::{ConnectionManager, Outcome, SimulatedDriver};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

const SIMULATED_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 2);

fn env_number<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(value) => value.parse().unwrap_or_else(|_| {
            error!("Ignoring invalid {}={:?}", name, value);
            default
        }),
        Err(_) => default,
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let refusals: usize = env_number("SIM_REFUSALS", 3);
    let max_retries: u32 = env_number("SIM_MAX_RETRIES", DEFAULT_MAX_RETRIES);
    let latency = Duration::from_millis(env_number("SIM_LATENCY_MS", 50));
    let fail = std::env::var("SIM_OUTCOME").is_ok_and(|v| v.eq_ignore_ascii_case("fail"));

    info!("=== Prism WiFi simulation ===");

    let credentials = match Credentials::new("simulated-ap", "simulated") {
        Ok(credentials) => credentials,
        Err(e) => {
            error!("Invalid credentials: {}", e);
            std::process::exit(1);
        }
    };

    let driver = Arc::new(if fail {
        SimulatedDriver::unreachable_with_latency(latency)
    } else {
        SimulatedDriver::connecting_after_with_latency(refusals, SIMULATED_IP, latency)
    });
    let policy = ConnectionPolicy::with_max_retries(max_retries);

    let outcome = ConnectionManager::start(Arc::clone(&driver), &credentials, policy)
        .and_then(|manager| manager.wait_for_outcome());

    match outcome {
        Ok(Outcome::Connected(ip)) => {
            info!(
                "Connected with {} after {} connect commands",
                ip,
                driver.connect_count()
            );
        }
        Ok(Outcome::Failed { attempts }) => {
            error!(
                "Failed after {} retries ({} connect commands)",
                attempts,
                driver.connect_count()
            );
            std::process::exit(2);
        }
        Err(e) => {
            error!("Connection manager error: {}", e);
            std::process::exit(1);
        }
    }
}
