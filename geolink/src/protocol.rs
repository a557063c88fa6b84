//! Wire protocol for the background location service.
//!
//! The service boundary is an asynchronous message channel, not a
//! request/response API. Outbound [`ControlMessage`]s are fire-and-forget;
//! inbound [`ServiceEvent`]s arrive later on the coordinator's dispatch
//! channel.
//!
//! Messages serialize as flat key/value maps tagged by a `type` field, e.g.
//!
//! ```json
//! {"type":"REQUEST_SINGLE_LOCATION","request_id":3,"accuracy":"balanced",
//!  "min_interval_ms":300000,"min_displacement_m":800.0,
//!  "priority":"balanced_power_accuracy"}
//! ```
//!
//! This shape is the wire-compatibility boundary: decoding ignores unknown
//! keys and tolerates missing optional ones, so either side can add fields
//! without breaking the other.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fix::Fix;
use crate::options::RequestOptions;

/// Errors for malformed wire payloads.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The payload is not a valid message of the expected kind.
    #[error("malformed message payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Control messages sent to the location service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Ask the service to start producing updates. Idempotent.
    StartUpdates,

    /// Ask the service to stop producing updates. Idempotent; the service
    /// may keep running briefly on its own.
    StopUpdates,

    /// Subscribe this client to continuous updates. Requires an established
    /// channel.
    SubscribeUpdates,

    /// Unsubscribe this client from continuous updates. Requires an
    /// established channel.
    UnsubscribeUpdates,

    /// Request a single location fix for the given request id.
    RequestSingleLocation {
        request_id: u64,
        #[serde(flatten)]
        options: RequestOptions,
    },

    /// Abandon an outstanding single-location request.
    CancelSingleLocation { request_id: u64 },
}

/// Events received from the location service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceEvent {
    /// The service channel is established.
    Connected,

    /// The service channel dropped.
    Disconnected,

    /// A continuous update. The fix may be absent if the service produced
    /// an empty update.
    NewLocation {
        #[serde(default)]
        fix: Option<Fix>,
    },

    /// The result of a single-location request. An absent fix means the
    /// service could not obtain a location.
    SingleResult {
        request_id: u64,
        #[serde(default)]
        fix: Option<Fix>,
    },
}

impl ControlMessage {
    /// Encodes the message for the wire.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes a message from the wire.
    pub fn decode(payload: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(payload)?)
    }
}

impl ServiceEvent {
    /// Encodes the event for the wire.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes an event from the wire.
    pub fn decode(payload: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(payload)?)
    }
}
