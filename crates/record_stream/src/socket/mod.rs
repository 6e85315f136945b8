//! Socket stream pipeline.
//!
//! [`SocketSession`] holds the pipeline logic and performs no I/O; [`SocketStreamClient`]
//! drives a session from a [`SocketConnector`] on a spawned task.

mod driver;
mod session;
mod state;
mod transport;

pub use driver::SocketStreamClient;
pub use session::{
    ConnectDecision, SocketCommand, SocketEvent, SocketSession, CLOSE_ABNORMAL, CLOSE_NORMAL,
};
pub use state::{ConnectionState, IllegalTransition, Transition};
pub use transport::{SocketConnector, SocketTransport, WsConnector, WsTransport};
