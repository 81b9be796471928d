//! Retry state machine for a single connection attempt.
//!
//! [`ConnectionMachine`] is the pure transition function behind
//! [`ConnectionManager`](super::ConnectionManager). It never talks to the
//! driver itself; each event yields an [`Action`] for the caller to carry
//! out, which keeps the retry policy testable without threads.
//!
//! ```text
//! Idle ──start──> Connecting ──address──> Connected
//!                  │    ^
//!       disconnect │    │ retries < max
//!                  └────┘
//!                  │
//!                  └──disconnect, retries == max──> Failed
//! ```

use crate::config::ConnectionPolicy;
use std::fmt;
use std::net::Ipv4Addr;

/// Notifications delivered by the link driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// Station interface came up and can associate.
    SessionStarted,
    /// Association was lost or could not be established.
    Disconnected,
    /// The IP stack acquired a lease.
    AddressAssigned(Ipv4Addr),
}

/// Lifecycle of one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Failed,
}

impl ConnectionState {
    /// `Connected` and `Failed` end the attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Connected | Self::Failed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Terminal result of a connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Link is up and the given address was assigned.
    Connected(Ipv4Addr),
    /// The retry bound was exhausted.
    Failed {
        /// Reconnects issued before giving up.
        attempts: u32,
    },
}

/// What the manager must do in response to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Issue a connect command to the driver.
    Connect,
    /// Publish the terminal outcome.
    Report(Outcome),
    /// Nothing to do.
    Ignore,
}

/// Retry counter and state for one attempt.
#[derive(Debug)]
pub struct ConnectionMachine {
    state: ConnectionState,
    retries: u32,
    max_retries: u32,
}

impl ConnectionMachine {
    /// Create an idle machine.
    pub fn new(policy: ConnectionPolicy) -> Self {
        Self {
            state: ConnectionState::Idle,
            retries: 0,
            max_retries: policy.max_retries(),
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive reconnects since start or the last address assignment.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Retry bound from the policy.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Enter `Connecting`. Only valid from `Idle`; returns `false` otherwise.
    pub fn start(&mut self) -> bool {
        if self.state != ConnectionState::Idle {
            return false;
        }
        self.state = ConnectionState::Connecting;
        self.retries = 0;
        true
    }

    /// Apply one event and return the action to perform.
    ///
    /// Events outside `Connecting` are ignored, so a stray disconnect after
    /// `Failed` neither reconnects nor touches the counter.
    pub fn on_event(&mut self, event: LinkEvent) -> Action {
        if self.state != ConnectionState::Connecting {
            return Action::Ignore;
        }

        match event {
            LinkEvent::SessionStarted => Action::Connect,
            LinkEvent::Disconnected if self.retries < self.max_retries => {
                self.retries += 1;
                Action::Connect
            }
            LinkEvent::Disconnected => {
                self.state = ConnectionState::Failed;
                Action::Report(Outcome::Failed {
                    attempts: self.retries,
                })
            }
            LinkEvent::AddressAssigned(ip) => {
                self.retries = 0;
                self.state = ConnectionState::Connected;
                Action::Report(Outcome::Connected(ip))
            }
        }
    }
}
