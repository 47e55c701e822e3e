//! Connection state machine.

use crate::error::{ClientError, Result};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::debug;

/// Lifecycle state of the logical connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and no attempt in progress.
    Disconnected,
    /// Transport opening or identity registration in flight.
    Connecting,
    /// Transport open and identity accepted by the server.
    Connected,
    /// The last connection attempt failed.
    Error(String),
}

impl ConnectionState {
    /// Whether commands may be issued.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Error(message) => write!(f, "error: {message}"),
        }
    }
}

/// Owns the [`ConnectionState`] and its transitions.
///
/// Edges:
///
/// ```text
/// Disconnected --begin_connect--> Connecting
/// Error        --begin_connect--> Connecting
/// Connecting   --finish_connect-> Connected   (only while the transport is open)
/// Connecting   --fail-----------> Error
/// Connected    --transport_closed-> Disconnected
/// any          --reset----------> Disconnected
/// ```
///
/// Every `begin_connect` and `reset` starts a new epoch. `finish_connect` and
/// `fail` only apply to the epoch they were issued for, so a superseded
/// attempt cannot move the state of the one that replaced it.
#[derive(Debug)]
pub struct StateMachine {
    state: watch::Sender<ConnectionState>,
    epoch: AtomicU64,
    last_error: RwLock<Option<String>>,
}

impl StateMachine {
    /// Create a state machine in [`ConnectionState::Disconnected`].
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            state,
            epoch: AtomicU64::new(0),
            last_error: RwLock::new(None),
        }
    }

    /// Current state.
    pub fn current(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Most recent connection-level error, kept across reconnects.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Whether `epoch` is still the latest connect attempt.
    pub(crate) fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::Acquire) == epoch
    }

    /// `Disconnected | Error -> Connecting`; any other state is a caller error.
    ///
    /// Returns the epoch of the new attempt.
    pub(crate) fn begin_connect(&self) -> Result<u64> {
        let mut outcome = Ok(0);
        self.state.send_if_modified(|state| match state {
            ConnectionState::Disconnected | ConnectionState::Error(_) => {
                *state = ConnectionState::Connecting;
                outcome = Ok(self.epoch.fetch_add(1, Ordering::AcqRel) + 1);
                true
            }
            other => {
                outcome = Err(ClientError::InvalidState {
                    operation: "connect",
                    state: other.clone(),
                });
                false
            }
        });

        if let Ok(epoch) = outcome {
            debug!(epoch, "state: connecting");
        }
        outcome
    }

    /// `Connecting -> Connected` for attempt `epoch`, evaluated atomically
    /// with `transport_open`.
    ///
    /// Returns `false` (and leaves the state alone) if the attempt was
    /// superseded or torn down meanwhile, or the transport is no longer open.
    pub(crate) fn finish_connect(
        &self,
        epoch: u64,
        transport_open: impl FnOnce() -> bool,
    ) -> bool {
        let connected = self.state.send_if_modified(|state| {
            if *state == ConnectionState::Connecting
                && self.is_current(epoch)
                && transport_open()
            {
                *state = ConnectionState::Connected;
                true
            } else {
                false
            }
        });
        if connected {
            debug!("state: connected");
        }
        connected
    }

    /// `Connecting -> Error(message)` for attempt `epoch`.
    pub(crate) fn fail(&self, epoch: u64, message: impl Into<String>) -> bool {
        let message = message.into();
        let failed = self.state.send_if_modified(|state| {
            if *state == ConnectionState::Connecting && self.is_current(epoch) {
                *self.last_error.write() = Some(message.clone());
                *state = ConnectionState::Error(message);
                true
            } else {
                false
            }
        });
        if failed {
            debug!("state: error");
        }
        failed
    }

    /// `Connected -> Disconnected` after the transport went away.
    pub(crate) fn transport_closed(&self, reason: Option<&str>) -> bool {
        if let Some(reason) = reason {
            *self.last_error.write() = Some(reason.to_string());
        }
        let closed = self.state.send_if_modified(|state| {
            if *state == ConnectionState::Connected {
                *state = ConnectionState::Disconnected;
                true
            } else {
                false
            }
        });
        if closed {
            debug!("state: disconnected (transport closed)");
        }
        closed
    }

    /// Any state `-> Disconnected`, used by caller teardown. Supersedes any
    /// attempt in flight.
    pub(crate) fn reset(&self) {
        let changed = self.state.send_if_modified(|state| {
            self.epoch.fetch_add(1, Ordering::AcqRel);
            if *state == ConnectionState::Disconnected {
                false
            } else {
                *state = ConnectionState::Disconnected;
                true
            }
        });
        if changed {
            debug!("state: disconnected (reset)");
        }
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
