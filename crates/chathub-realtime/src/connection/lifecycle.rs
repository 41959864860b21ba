//! Per-connection state machine.
//!
//! `Connecting → Authenticated → Active → Closing → Closed`. Any state
//! before `Closing` may move to `Closing`; `Closed` is terminal.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

use chathub_core::error::AppError;
use chathub_core::result::AppResult;

/// Lifecycle state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ConnectionState {
    /// Socket accepted, token not yet validated.
    Connecting = 0,
    /// Token validated, user bound.
    Authenticated = 1,
    /// Registered locally and in presence; may send and receive.
    Active = 2,
    /// Disconnect detected; entries being removed.
    Closing = 3,
    /// All resources released.
    Closed = 4,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Connecting,
            1 => Self::Authenticated,
            2 => Self::Active,
            3 => Self::Closing,
            _ => Self::Closed,
        }
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Connecting, Self::Authenticated)
                | (Self::Authenticated, Self::Active)
                | (Self::Connecting | Self::Authenticated | Self::Active, Self::Closing)
                | (Self::Closing, Self::Closed)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Authenticated => "authenticated",
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Atomic holder of a [`ConnectionState`].
#[derive(Debug)]
pub struct ConnectionLifecycle {
    state: AtomicU8,
}

impl ConnectionLifecycle {
    /// Start in `Connecting`.
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Connecting as u8),
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the connection may send and receive.
    pub fn is_active(&self) -> bool {
        self.state() == ConnectionState::Active
    }

    /// Move from `from` to `to`.
    ///
    /// Fails with `ConnectionRace` when the transition is illegal or the
    /// state changed underneath the caller.
    pub fn transition(&self, from: ConnectionState, to: ConnectionState) -> AppResult<()> {
        if !from.can_transition_to(to) {
            return Err(AppError::connection_race(format!(
                "Illegal connection transition {from} → {to}"
            )));
        }
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| {
                AppError::connection_race(format!(
                    "Connection is {}, expected {from}",
                    ConnectionState::from_u8(actual)
                ))
            })
    }

    /// Move to `Closing` from whatever live state the connection is in.
    ///
    /// Returns `true` for exactly one caller; later callers see the
    /// connection already closing and get `false`.
    pub fn begin_closing(&self) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                ConnectionState::from_u8(current)
                    .can_transition_to(ConnectionState::Closing)
                    .then_some(ConnectionState::Closing as u8)
            })
            .is_ok()
    }

    /// Finish closing. Only legal from `Closing`.
    pub fn finish_closing(&self) -> AppResult<()> {
        self.transition(ConnectionState::Closing, ConnectionState::Closed)
    }
}

impl Default for ConnectionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
