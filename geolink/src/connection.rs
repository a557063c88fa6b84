//! Connection lifecycle to the background location service.
//!
//! The [`ConnectionController`] owns the bind/unbind state machine and the
//! subscribe/unsubscribe sub-state, and funnels every outbound message
//! through one place. The transport itself is abstracted behind
//! [`LocationTransport`] so the controller works over any channel (local
//! socket, in-process queue, real IPC) without knowing which.
//!
//! State machine:
//!
//! ```text
//! Unbound ──bind ok──► Binding ──CONNECTED──► Bound { subscribed: false }
//!    ▲                    │                        │            ▲
//!    │                    │                   subscribe    unsubscribe
//!    │                    │                        ▼            │
//!    └──unbind / DISCONNECTED─────────────── Bound { subscribed: true }
//! ```
//!
//! Every transition is idempotent; `ensure_*` methods are safe to call from
//! every policy evaluation. Failures are transient infrastructure problems:
//! they are logged and skipped, and the next evaluation retries from
//! scratch.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::protocol::ControlMessage;

/// Errors reported by a [`LocationTransport`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The bind request could not be issued.
    #[error("failed to bind to the location service: {0}")]
    BindFailed(String),

    /// The channel to the service is not ready for this message.
    #[error("location service channel is not ready")]
    ChannelNotReady,

    /// The message could not be delivered.
    #[error("failed to send message to the location service: {0}")]
    SendFailed(String),
}

/// Abstract transport to the background location service.
///
/// `bind` only issues the request; the service confirms asynchronously with
/// a `CONNECTED` event on the coordinator's dispatch channel. All operations
/// fail softly: implementations must never block waiting on the service.
pub trait LocationTransport: Send + Sync {
    /// Issues a bind request to the service.
    fn bind(&self) -> Result<(), TransportError>;

    /// Releases the connection. Best effort, never blocks, no
    /// acknowledgment is awaited.
    fn unbind(&self);

    /// Sends a control message. Fire-and-forget.
    fn send(&self, message: &ControlMessage) -> Result<(), TransportError>;
}

/// Connection state to the location service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none requested.
    Unbound,

    /// Bind issued, waiting for the service to confirm.
    Binding,

    /// Channel established; `subscribed` tracks continuous-update delivery.
    Bound { subscribed: bool },
}

impl ConnectionState {
    /// True once the channel is established.
    pub fn is_bound(&self) -> bool {
        matches!(self, ConnectionState::Bound { .. })
    }
}

/// Owns the bind/unbind and subscribe/unsubscribe state machine.
pub struct ConnectionController {
    transport: Arc<dyn LocationTransport>,
    state: Mutex<ConnectionState>,
}

impl ConnectionController {
    /// Creates a controller over the given transport, starting unbound.
    pub fn new(transport: Arc<dyn LocationTransport>) -> Self {
        Self {
            transport,
            state: Mutex::new(ConnectionState::Unbound),
        }
    }

    /// Returns the current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// True once the channel is established.
    pub fn is_bound(&self) -> bool {
        self.state().is_bound()
    }

    /// Issues a bind request unless one is in flight or established.
    ///
    /// A bind failure is logged, not fatal: the state stays unbound and the
    /// next policy evaluation retries.
    pub fn ensure_bound(&self) {
        let mut state = self.state.lock();
        if !matches!(*state, ConnectionState::Unbound) {
            return;
        }
        match self.transport.bind() {
            Ok(()) => {
                info!("binding to location service");
                *state = ConnectionState::Binding;
            }
            Err(error) => {
                error!(%error, "unable to bind to location service");
            }
        }
    }

    /// Releases the connection if one is established or in flight.
    ///
    /// Unbind is synchronous and best effort; the service is not asked to
    /// stop and may keep running briefly on its own.
    pub fn ensure_unbound(&self) {
        let mut state = self.state.lock();
        if matches!(*state, ConnectionState::Unbound) {
            return;
        }
        info!("unbinding from location service");
        self.transport.unbind();
        *state = ConnectionState::Unbound;
    }

    /// Subscribes to continuous updates if bound and not yet subscribed.
    ///
    /// The subscribed flag only flips when the message went out, so a failed
    /// send is retried by the next evaluation. Calling while not bound is a
    /// contract violation, tolerated as a logged no-op.
    pub fn ensure_subscribed(&self) {
        let mut state = self.state.lock();
        match *state {
            ConnectionState::Bound { subscribed: false } => {
                if self.send_locked(&ControlMessage::SubscribeUpdates) {
                    info!("subscribed to continuous location updates");
                    *state = ConnectionState::Bound { subscribed: true };
                }
            }
            ConnectionState::Bound { subscribed: true } => {}
            _ => warn!("subscribe requested while not bound to location service"),
        }
    }

    /// Unsubscribes from continuous updates if currently subscribed.
    ///
    /// The flag clears even when the send fails: the local side must not
    /// believe it is subscribed once it decided not to be; service-side
    /// cleanup is best effort.
    pub fn ensure_unsubscribed(&self) {
        let mut state = self.state.lock();
        if let ConnectionState::Bound { subscribed: true } = *state {
            info!("unsubscribed from continuous location updates");
            self.send_locked(&ControlMessage::UnsubscribeUpdates);
            *state = ConnectionState::Bound { subscribed: false };
        }
    }

    /// Applies the service's `CONNECTED` event: the channel is established
    /// and not yet subscribed.
    pub fn on_connected(&self) {
        info!("location service connected");
        *self.state.lock() = ConnectionState::Bound { subscribed: false };
    }

    /// Applies the service's `DISCONNECTED` event: back to unbound with the
    /// subscribed flag cleared.
    pub fn on_disconnected(&self) {
        info!("location service disconnected");
        *self.state.lock() = ConnectionState::Unbound;
    }

    /// Sends a start/stop signal. These do not require an established
    /// channel; the transport routes them to the service directly.
    pub fn send_control_signal(&self, message: &ControlMessage) {
        if let Err(error) = self.transport.send(message) {
            warn!(%error, ?message, "unable to send control signal to location service");
        }
    }

    /// Sends a message over the established channel.
    ///
    /// Returns false (with a log) when unbound or when the send fails; the
    /// caller retries via replay or the next policy evaluation.
    pub fn send_message(&self, message: &ControlMessage) -> bool {
        let state = self.state.lock();
        if !state.is_bound() {
            debug!(?message, "dropping message, not bound to location service");
            return false;
        }
        self.send_locked(message)
    }

    fn send_locked(&self, message: &ControlMessage) -> bool {
        match self.transport.send(message) {
            Ok(()) => true,
            Err(error) => {
                warn!(%error, ?message, "failed to send message to location service");
                false
            }
        }
    }
}
