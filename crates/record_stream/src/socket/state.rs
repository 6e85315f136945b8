use std::fmt;

use thiserror::Error;

/// Lifecycle of a socket stream connection.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }

    /// `Connecting` or `Connected`.
    pub fn is_active(self) -> bool {
        !matches!(self, ConnectionState::Disconnected)
    }

    /// Computes the state after `transition`.
    ///
    /// `Closed` is accepted from every state (a connection can drop at any point);
    /// the other transitions are only legal from their single source state.
    pub fn apply(self, transition: Transition) -> Result<ConnectionState, IllegalTransition> {
        match (self, transition) {
            (ConnectionState::Disconnected, Transition::ConnectRequested) => {
                Ok(ConnectionState::Connecting)
            }
            (ConnectionState::Connecting, Transition::Opened) => Ok(ConnectionState::Connected),
            (_, Transition::Closed) => Ok(ConnectionState::Disconnected),
            (from, transition) => Err(IllegalTransition { from, transition }),
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Transition {
    ConnectRequested,
    Opened,
    Closed,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Error)]
#[error("transition {transition:?} is not allowed from `{from}`")]
pub struct IllegalTransition {
    pub from: ConnectionState,
    pub transition: Transition,
}
