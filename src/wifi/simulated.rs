//! Host-side link driver that replays a scripted radio.
//!
//! Events are delivered from a dedicated worker thread, so the manager runs
//! in the same parallel-thread model as on the ESP32 event loop. Every
//! connect command consumes one scripted [`Reply`]; once the script runs
//! out the simulated access point keeps refusing.

use super::machine::LinkEvent;
use super::manager::{EventHandler, LinkDriver};
use crate::config::Credentials;
use log::{debug, trace};
use std::collections::VecDeque;
use std::io;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;

/// How the simulated access point answers a connect command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Association fails.
    Refuse,
    /// Association succeeds and DHCP hands out this address.
    Lease(Ipv4Addr),
}

enum Command {
    Begin,
    Connect,
}

type HandlerSlot = Arc<Mutex<Option<EventHandler>>>;

/// Scripted [`LinkDriver`] for host runs and tests.
pub struct SimulatedDriver {
    commands: mpsc::UnboundedSender<Command>,
    handler: HandlerSlot,
    connects: Arc<AtomicUsize>,
    teardowns: Arc<AtomicUsize>,
}

impl SimulatedDriver {
    /// Driver answering connect commands with `script`, in order.
    pub fn new(script: impl IntoIterator<Item = Reply>) -> Self {
        Self::with_latency(script, Duration::ZERO)
    }

    /// Like [`SimulatedDriver::new`], pausing `latency` before each event.
    pub fn with_latency(script: impl IntoIterator<Item = Reply>, latency: Duration) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let handler: HandlerSlot = Arc::new(Mutex::new(None));
        let connects = Arc::new(AtomicUsize::new(0));

        let worker = Worker {
            rx,
            handler: Arc::clone(&handler),
            connects: Arc::clone(&connects),
            script: script.into_iter().collect(),
            latency,
        };
        thread::spawn(move || worker.run());

        Self {
            commands,
            handler,
            connects,
            teardowns: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Access point that refuses `refusals` times, then leases `ip`.
    pub fn connecting_after(refusals: usize, ip: Ipv4Addr) -> Self {
        Self::connecting_after_with_latency(refusals, ip, Duration::ZERO)
    }

    /// Like [`SimulatedDriver::connecting_after`], pausing `latency` before each event.
    pub fn connecting_after_with_latency(refusals: usize, ip: Ipv4Addr, latency: Duration) -> Self {
        let script = std::iter::repeat(Reply::Refuse)
            .take(refusals)
            .chain(std::iter::once(Reply::Lease(ip)));
        Self::with_latency(script, latency)
    }

    /// Access point that never accepts.
    pub fn unreachable() -> Self {
        Self::unreachable_with_latency(Duration::ZERO)
    }

    /// Like [`SimulatedDriver::unreachable`], pausing `latency` before each event.
    pub fn unreachable_with_latency(latency: Duration) -> Self {
        Self::with_latency(std::iter::empty(), latency)
    }

    /// Connect commands processed so far.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// How often a subscription was released.
    pub fn teardown_count(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }

    /// Whether a handler is currently registered.
    pub fn is_subscribed(&self) -> bool {
        lock(&self.handler).is_some()
    }

    fn send(&self, command: Command) -> io::Result<()> {
        self.commands
            .send(command)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "simulated radio stopped"))
    }
}

impl LinkDriver for SimulatedDriver {
    type Error = io::Error;
    type Subscription = SimulatedSubscription;

    fn subscribe(&self, handler: EventHandler) -> io::Result<SimulatedSubscription> {
        let mut slot = lock(&self.handler);
        if slot.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "handler already registered",
            ));
        }
        *slot = Some(handler);
        Ok(SimulatedSubscription {
            handler: Arc::clone(&self.handler),
            teardowns: Arc::clone(&self.teardowns),
        })
    }

    fn begin(&self, credentials: &Credentials) -> io::Result<()> {
        debug!("Simulated station configured for {}", credentials.ssid());
        self.send(Command::Begin)
    }

    fn connect(&self) -> io::Result<()> {
        self.send(Command::Connect)
    }
}

/// Registration returned by [`SimulatedDriver::subscribe`].
pub struct SimulatedSubscription {
    handler: HandlerSlot,
    teardowns: Arc<AtomicUsize>,
}

impl Drop for SimulatedSubscription {
    fn drop(&mut self) {
        lock(&self.handler).take();
        self.teardowns.fetch_add(1, Ordering::SeqCst);
    }
}

struct Worker {
    rx: mpsc::UnboundedReceiver<Command>,
    handler: HandlerSlot,
    connects: Arc<AtomicUsize>,
    script: VecDeque<Reply>,
    latency: Duration,
}

impl Worker {
    fn run(mut self) {
        while let Some(command) = self.rx.blocking_recv() {
            let event = match command {
                Command::Begin => LinkEvent::SessionStarted,
                Command::Connect => {
                    self.connects.fetch_add(1, Ordering::SeqCst);
                    match self.script.pop_front() {
                        Some(Reply::Lease(ip)) => LinkEvent::AddressAssigned(ip),
                        Some(Reply::Refuse) | None => LinkEvent::Disconnected,
                    }
                }
            };

            if !self.latency.is_zero() {
                thread::sleep(self.latency);
            }
            self.emit(event);
        }
        trace!("Simulated radio stopped");
    }

    fn emit(&self, event: LinkEvent) {
        // Clone out so the handler can re-enter the driver
        let handler = lock(&self.handler).clone();
        match handler {
            Some(handler) => handler(event),
            None => trace!("Dropping {:?}, nobody subscribed", event),
        }
    }
}

fn lock(slot: &HandlerSlot) -> std::sync::MutexGuard<'_, Option<EventHandler>> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}
