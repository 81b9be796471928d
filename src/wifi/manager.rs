//! Event-driven connection manager.
//!
//! [`ConnectionManager::start`] subscribes to driver notifications and
//! brings the station interface up. From then on the driver's event context
//! feeds [`LinkEvent`]s into a [`ConnectionMachine`]; the caller blocks in
//! [`ConnectionManager::wait_for_outcome`] until the machine reaches
//! `Connected` or `Failed`.
//!
//! # Example
//!
//! ```
//! use std::net::Ipv4Addr;
//! use std::sync::Arc;
//! use prism_wifi::config::{ConnectionPolicy, Credentials};
//! use prism_wifi::wifi::{ConnectionManager, Outcome, SimulatedDriver};
//!
//! let ip = Ipv4Addr::new(192, 168, 1, 20);
//! let driver = Arc::new(SimulatedDriver::connecting_after(3, ip));
//! let credentials = Credentials::new("MyNetwork", "MyPassword").unwrap();
//!
//! let manager = ConnectionManager::start(driver, &credentials, ConnectionPolicy::default()).unwrap();
//! assert_eq!(manager.wait_for_outcome().unwrap(), Outcome::Connected(ip));
//! ```

use super::machine::{Action, ConnectionMachine, ConnectionState, LinkEvent, Outcome};
use super::signal::{outcome_signal, OutcomeReceiver, OutcomeSender};
use crate::config::{ConnectionPolicy, Credentials};
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Callback invoked by the driver for every link notification.
pub type EventHandler = Arc<dyn Fn(LinkEvent) + Send + Sync>;

/// Boxed driver error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Link-layer driver consumed by [`ConnectionManager`].
///
/// Notifications are delivered on the driver's own thread, in the order the
/// driver produces them.
pub trait LinkDriver: Send + Sync + 'static {
    /// Driver error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Registration token. Dropping it unsubscribes the handler.
    type Subscription: Send;

    /// Register `handler` for link and address notifications.
    fn subscribe(&self, handler: EventHandler) -> Result<Self::Subscription, Self::Error>;

    /// Apply credentials and bring the interface up.
    ///
    /// The driver answers with [`LinkEvent::SessionStarted`].
    fn begin(&self, credentials: &Credentials) -> Result<(), Self::Error>;

    /// Ask the driver to associate with the configured network.
    fn connect(&self) -> Result<(), Self::Error>;
}

/// State shared with the event handler.
struct Shared<D> {
    driver: Arc<D>,
    inner: Mutex<Inner>,
}

struct Inner {
    machine: ConnectionMachine,
    signal: OutcomeSender,
}

impl<D: LinkDriver> Shared<D> {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn handle_event(&self, event: LinkEvent) {
        let action = {
            let mut inner = self.lock();
            let action = inner.machine.on_event(event);
            debug!(
                "{:?} -> {} (retries {})",
                event,
                inner.machine.state(),
                inner.machine.retries()
            );
            if let Action::Report(outcome) = action {
                if !inner.signal.set(outcome) {
                    warn!("Outcome {:?} had no waiter", outcome);
                }
            }
            if event == LinkEvent::Disconnected && action == Action::Connect {
                info!(
                    "Failed to connect to WiFi, retrying ({}/{})",
                    inner.machine.retries(),
                    inner.machine.max_retries()
                );
            }
            action
        };

        match action {
            Action::Connect => {
                // A rejected connect is recovered by the next disconnect event
                if let Err(e) = self.driver.connect() {
                    warn!("WiFi connect request failed: {}", e);
                }
            }
            Action::Report(Outcome::Connected(ip)) => {
                info!("Connected to WiFi with IP: {}", ip);
            }
            Action::Report(Outcome::Failed { attempts }) => {
                warn!("Giving up on WiFi after {} retries", attempts);
            }
            Action::Ignore => {}
        }
    }
}

/// Handle to a running connection attempt.
///
/// Created by [`ConnectionManager::start`] and consumed by
/// [`ConnectionManager::wait_for_outcome`]. A manager runs one attempt; a new
/// attempt needs a new manager.
pub struct ConnectionManager<D: LinkDriver> {
    shared: Arc<Shared<D>>,
    ssid: String,
    subscription: Option<D::Subscription>,
    outcome: Option<OutcomeReceiver>,
}

impl<D: LinkDriver> ConnectionManager<D> {
    /// Subscribe to `driver` notifications and start the first attempt.
    ///
    /// # Errors
    ///
    /// [`WifiError::Subscribe`] if the handler cannot be registered and
    /// [`WifiError::Driver`] if the interface cannot be brought up. Neither
    /// is retried.
    pub fn start(
        driver: Arc<D>,
        credentials: &Credentials,
        policy: ConnectionPolicy,
    ) -> Result<Self, WifiError> {
        let (signal, outcome) = outcome_signal();
        let mut machine = ConnectionMachine::new(policy);
        let started = machine.start();
        debug_assert!(started, "fresh machine must start from Idle");

        let shared = Arc::new(Shared {
            driver: Arc::clone(&driver),
            inner: Mutex::new(Inner { machine, signal }),
        });

        let weak: Weak<Shared<D>> = Arc::downgrade(&shared);
        let handler: EventHandler = Arc::new(move |event| {
            if let Some(shared) = weak.upgrade() {
                shared.handle_event(event);
            }
        });

        let subscription = driver
            .subscribe(handler)
            .map_err(|e| WifiError::Subscribe(Box::new(e)))?;

        info!(
            "Connecting to WiFi: {} (max {} retries)",
            credentials.ssid(),
            policy.max_retries()
        );

        // On error the subscription is dropped here, which unsubscribes
        driver
            .begin(credentials)
            .map_err(|e| WifiError::Driver(Box::new(e)))?;

        Ok(Self {
            shared,
            ssid: credentials.ssid().to_string(),
            subscription: Some(subscription),
            outcome: Some(outcome),
        })
    }

    /// Current state of the attempt.
    pub fn state(&self) -> ConnectionState {
        self.shared.lock().machine.state()
    }

    /// Consecutive reconnects since start or the last address assignment.
    pub fn retries(&self) -> u32 {
        self.shared.lock().machine.retries()
    }

    /// Block until the attempt is connected or has failed.
    ///
    /// Unsubscribes from the driver before returning, whatever the outcome.
    /// Must not be called from inside an async runtime.
    ///
    /// # Errors
    ///
    /// [`WifiError::SignalLost`] if the outcome signal was released without
    /// a value. That is a defect in the manager, not a link failure.
    pub fn wait_for_outcome(mut self) -> Result<Outcome, WifiError> {
        let result = match self.outcome.take() {
            Some(outcome) => outcome.wait().map_err(|_| WifiError::SignalLost),
            None => Err(WifiError::SignalLost),
        };
        self.teardown();

        match &result {
            Ok(Outcome::Connected(_)) => info!("Connected to WiFi: {}", self.ssid),
            Ok(Outcome::Failed { .. }) => warn!("Failed to connect to WiFi: {}", self.ssid),
            Err(e) => error!("Unexpected WiFi signal state: {}", e),
        }
        debug_assert!(result.is_ok(), "outcome signal released without a value");
        result
    }

    fn teardown(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            drop(subscription);
            self.outcome = None;
            debug!("Unsubscribed from WiFi events");
        }
    }
}

impl<D: LinkDriver> Drop for ConnectionManager<D> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Errors that can occur while managing a connection attempt.
#[derive(Debug)]
pub enum WifiError {
    /// Could not register for driver notifications.
    Subscribe(BoxError),
    /// The driver rejected a command.
    Driver(BoxError),
    /// The outcome signal was released without a value.
    SignalLost,
    /// Stored or supplied credentials are unusable.
    Config(crate::config::ConfigError),
    /// No credentials in storage and none supplied at build time.
    NotConfigured,
}

impl std::fmt::Display for WifiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Subscribe(e) => write!(f, "event subscription failed: {}", e),
            Self::Driver(e) => write!(f, "driver error: {}", e),
            Self::SignalLost => write!(f, "outcome signal released without a value"),
            Self::Config(e) => write!(f, "configuration error: {}", e),
            Self::NotConfigured => {
                write!(f, "no WiFi credentials configured; run configure-wifi")
            }
        }
    }
}

impl std::error::Error for WifiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Subscribe(e) | Self::Driver(e) => Some(e.as_ref()),
            Self::Config(e) => Some(e),
            Self::SignalLost | Self::NotConfigured => None,
        }
    }
}

impl From<crate::config::ConfigError> for WifiError {
    fn from(e: crate::config::ConfigError) -> Self {
        Self::Config(e)
    }
}

#[cfg(feature = "esp32")]
impl From<esp_idf_sys::EspError> for WifiError {
    fn from(e: esp_idf_sys::EspError) -> Self {
        Self::Driver(Box::new(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    const IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 42);

    type HandlerSlot = Arc<Mutex<Option<EventHandler>>>;

    /// Driver whose events are injected by the test.
    #[derive(Default)]
    struct MockDriver {
        handler: HandlerSlot,
        connects: AtomicUsize,
        begins: AtomicUsize,
        teardowns: Arc<AtomicUsize>,
        fail_subscribe: bool,
        fail_begin: bool,
        fail_connect: bool,
    }

    struct MockSubscription {
        handler: HandlerSlot,
        teardowns: Arc<AtomicUsize>,
    }

    impl Drop for MockSubscription {
        fn drop(&mut self) {
            self.handler.lock().unwrap().take();
            self.teardowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl MockDriver {
        fn emit(&self, event: LinkEvent) {
            let handler = self.handler.lock().unwrap().clone();
            if let Some(handler) = handler {
                handler(event);
            }
        }

        fn connects(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }

        fn teardowns(&self) -> usize {
            self.teardowns.load(Ordering::SeqCst)
        }

        fn is_subscribed(&self) -> bool {
            self.handler.lock().unwrap().is_some()
        }
    }

    impl LinkDriver for MockDriver {
        type Error = io::Error;
        type Subscription = MockSubscription;

        fn subscribe(&self, handler: EventHandler) -> Result<MockSubscription, io::Error> {
            if self.fail_subscribe {
                return Err(io::Error::new(io::ErrorKind::Other, "no event loop"));
            }
            *self.handler.lock().unwrap() = Some(handler);
            Ok(MockSubscription {
                handler: Arc::clone(&self.handler),
                teardowns: Arc::clone(&self.teardowns),
            })
        }

        fn begin(&self, _credentials: &Credentials) -> Result<(), io::Error> {
            if self.fail_begin {
                return Err(io::Error::new(io::ErrorKind::Other, "radio off"));
            }
            self.begins.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn connect(&self) -> Result<(), io::Error> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.fail_connect {
                return Err(io::Error::new(io::ErrorKind::Other, "busy"));
            }
            Ok(())
        }
    }

    fn credentials() -> Credentials {
        Credentials::new("chateau rose", "pinkcastle").unwrap()
    }

    fn start(driver: &Arc<MockDriver>, max_retries: u32) -> ConnectionManager<MockDriver> {
        ConnectionManager::start(
            Arc::clone(driver),
            &credentials(),
            ConnectionPolicy::with_max_retries(max_retries),
        )
        .unwrap()
    }

    #[test]
    fn test_start_subscribes_and_begins() {
        let driver = Arc::new(MockDriver::default());
        let manager = start(&driver, 50);

        assert!(driver.is_subscribed());
        assert_eq!(driver.begins.load(Ordering::SeqCst), 1);
        assert_eq!(driver.connects(), 0);
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert_eq!(manager.retries(), 0);
    }

    #[test]
    fn test_subscribe_failure_is_reported() {
        let driver = Arc::new(MockDriver {
            fail_subscribe: true,
            ..Default::default()
        });
        let result = ConnectionManager::start(driver.clone(), &credentials(), Default::default());

        assert!(matches!(result, Err(WifiError::Subscribe(_))));
        assert_eq!(driver.begins.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_begin_failure_unsubscribes() {
        let driver = Arc::new(MockDriver {
            fail_begin: true,
            ..Default::default()
        });
        let result = ConnectionManager::start(driver.clone(), &credentials(), Default::default());

        assert!(matches!(result, Err(WifiError::Driver(_))));
        assert!(!driver.is_subscribed());
        assert_eq!(driver.teardowns(), 1);
    }

    #[test]
    fn test_connects_on_first_address() {
        let driver = Arc::new(MockDriver::default());
        let manager = start(&driver, 50);

        driver.emit(LinkEvent::SessionStarted);
        assert_eq!(driver.connects(), 1);
        driver.emit(LinkEvent::AddressAssigned(IP));
        assert_eq!(manager.retries(), 0);

        assert_eq!(manager.wait_for_outcome().unwrap(), Outcome::Connected(IP));
        assert_eq!(driver.teardowns(), 1);
        assert!(!driver.is_subscribed());
    }

    #[test]
    fn test_fails_after_max_retries() {
        let driver = Arc::new(MockDriver::default());
        let manager = start(&driver, 50);

        driver.emit(LinkEvent::SessionStarted);
        for _ in 0..50 {
            driver.emit(LinkEvent::Disconnected);
        }
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert_eq!(driver.connects(), 51);

        // The 51st disconnect exhausts the bound without reconnecting
        driver.emit(LinkEvent::Disconnected);
        assert_eq!(manager.state(), ConnectionState::Failed);
        assert_eq!(driver.connects(), 51);

        assert_eq!(
            manager.wait_for_outcome().unwrap(),
            Outcome::Failed { attempts: 50 }
        );
        assert_eq!(driver.teardowns(), 1);
    }

    #[test]
    fn test_address_after_retries_resets_counter() {
        let driver = Arc::new(MockDriver::default());
        let manager = start(&driver, 50);

        driver.emit(LinkEvent::SessionStarted);
        for _ in 0..10 {
            driver.emit(LinkEvent::Disconnected);
        }
        assert_eq!(manager.retries(), 10);
        driver.emit(LinkEvent::AddressAssigned(IP));
        assert_eq!(manager.retries(), 0);
        assert_eq!(manager.state(), ConnectionState::Connected);

        assert_eq!(manager.wait_for_outcome().unwrap(), Outcome::Connected(IP));
    }

    #[test]
    fn test_disconnect_after_failure_is_ignored() {
        let driver = Arc::new(MockDriver::default());
        let manager = start(&driver, 2);

        for _ in 0..3 {
            driver.emit(LinkEvent::Disconnected);
        }
        assert_eq!(manager.state(), ConnectionState::Failed);
        let connects = driver.connects();

        driver.emit(LinkEvent::Disconnected);
        driver.emit(LinkEvent::AddressAssigned(IP));
        assert_eq!(driver.connects(), connects);
        assert_eq!(manager.retries(), 2);
        assert_eq!(manager.state(), ConnectionState::Failed);

        assert_eq!(
            manager.wait_for_outcome().unwrap(),
            Outcome::Failed { attempts: 2 }
        );
    }

    #[test]
    fn test_rejected_connect_does_not_consume_retry() {
        let driver = Arc::new(MockDriver {
            fail_connect: true,
            ..Default::default()
        });
        let manager = start(&driver, 5);

        driver.emit(LinkEvent::SessionStarted);
        driver.emit(LinkEvent::Disconnected);
        assert_eq!(driver.connects(), 2);
        assert_eq!(manager.retries(), 1);
        assert_eq!(manager.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_wait_blocks_for_events_from_other_thread() {
        let driver = Arc::new(MockDriver::default());
        let manager = start(&driver, 50);

        let events = Arc::clone(&driver);
        let emitter = thread::spawn(move || {
            events.emit(LinkEvent::SessionStarted);
            for _ in 0..5 {
                events.emit(LinkEvent::Disconnected);
            }
            events.emit(LinkEvent::AddressAssigned(IP));
        });

        assert_eq!(manager.wait_for_outcome().unwrap(), Outcome::Connected(IP));
        emitter.join().unwrap();
        assert_eq!(driver.connects(), 6);
        assert_eq!(driver.teardowns(), 1);
    }

    #[test]
    fn test_events_after_teardown_are_dropped() {
        let driver = Arc::new(MockDriver::default());
        let manager = start(&driver, 50);
        driver.emit(LinkEvent::AddressAssigned(IP));
        manager.wait_for_outcome().unwrap();

        driver.emit(LinkEvent::SessionStarted);
        driver.emit(LinkEvent::Disconnected);
        assert_eq!(driver.connects(), 0);
        assert_eq!(driver.teardowns(), 1);
    }

    #[test]
    fn test_drop_without_wait_unsubscribes_once() {
        let driver = Arc::new(MockDriver::default());
        let manager = start(&driver, 50);
        drop(manager);

        assert!(!driver.is_subscribed());
        assert_eq!(driver.teardowns(), 1);
    }

    #[test]
    fn test_error_display() {
        let err = WifiError::Subscribe(Box::new(io::Error::new(io::ErrorKind::Other, "x")));
        assert_eq!(err.to_string(), "event subscription failed: x");
        assert!(std::error::Error::source(&err).is_some());
        assert!(std::error::Error::source(&WifiError::SignalLost).is_none());
    }

    #[test]
    fn test_not_configured_error() {
        let err = WifiError::NotConfigured;
        assert_eq!(
            err.to_string(),
            "no WiFi credentials configured; run configure-wifi"
        );
        assert!(std::error::Error::source(&err).is_none());
        // Distinct from a credential that failed validation
        let invalid = WifiError::from(crate::config::ConfigError::SsidEmpty);
        assert!(matches!(invalid, WifiError::Config(_)));
    }
}
