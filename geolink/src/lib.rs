//! Geolink - client-side coordination for a background location service
//!
//! This library manages a long-lived connection to a background
//! location-providing service and multiplexes two request shapes over it:
//! continuous location updates delivered to registered listeners, and
//! one-shot, individually-cancellable single-location requests represented
//! by [`PendingResult`] handles.
//!
//! The coordinator tracks the bind/unbind lifecycle of the external service,
//! subscribes and unsubscribes based on derived policy (preferences plus
//! application foreground state), queues and replays in-flight requests
//! across reconnects, and guarantees exactly-once delivery of results.
//!
//! Location acquisition itself is out of scope: the service boundary is the
//! [`LocationTransport`] trait and the [`protocol`] message types, and any
//! transport that can carry them will do.

pub mod connection;
pub mod coordinator;
pub mod fix;
pub mod logging;
pub mod options;
pub mod pending;
pub mod preferences;
pub mod protocol;

pub use connection::{ConnectionController, ConnectionState, LocationTransport, TransportError};
pub use coordinator::{
    event_channel, AppState, ForegroundSignal, LocationCoordinator, LocationListener,
    PendingLocation, DEFAULT_EVENT_CHANNEL_CAPACITY,
};
pub use fix::Fix;
pub use logging::{init_logging, LoggingGuard};
pub use options::{AccuracyClass, OptionsError, PowerPriority, RequestOptions};
pub use pending::PendingResult;
pub use preferences::{
    IniPreferenceStore, MemoryPreferenceStore, PreferenceStore, Preferences,
    KEY_BACKGROUND_ALLOWED, KEY_REQUEST_OPTIONS, KEY_UPDATES_ENABLED,
};
pub use protocol::{ControlMessage, ProtocolError, ServiceEvent};
