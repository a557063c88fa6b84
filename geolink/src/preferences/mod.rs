//! Location preferences and their storage boundary.
//!
//! [`Preferences`] holds the process-wide location settings: whether
//! continuous updates are enabled, whether they may continue in the
//! background, and the last-used [`RequestOptions`]. Values live in a
//! [`PreferenceStore`] so they survive process restarts; the store is a
//! trait so callers can plug in whatever persistence they have.
//!
//! Change notification is push-model and coalesced: a registered listener is
//! told the key that changed, at most once per logical change. Setter calls
//! that do not change the stored value emit nothing. External store changes
//! can be fed through [`Preferences::notify_external_change`] so they take
//! the exact same path as local setter calls; the coordinator deals with
//! every change once, in the listener.

mod ini;

pub use ini::IniPreferenceStore;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::options::RequestOptions;

/// Preference key for the continuous-updates-enabled flag.
pub const KEY_UPDATES_ENABLED: &str = "location.updates_enabled";

/// Preference key for the background-updates-allowed flag.
pub const KEY_BACKGROUND_ALLOWED: &str = "location.background_allowed";

/// Preference key for the last-used request options (JSON blob).
pub const KEY_REQUEST_OPTIONS: &str = "location.request_options";

/// Storage boundary for preferences.
///
/// Implementations must be safe to call from any thread. `put` with `None`
/// removes the key.
pub trait PreferenceStore: Send + Sync {
    /// Returns the stored value for a key, if any.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores or removes the value for a key.
    fn put(&self, key: &str, value: Option<&str>);
}

/// In-memory preference store, mainly for tests and short-lived processes.
#[derive(Default)]
pub struct MemoryPreferenceStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryPreferenceStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn put(&self, key: &str, value: Option<&str>) {
        let mut values = self.values.lock();
        match value {
            Some(value) => values.insert(key.to_string(), value.to_string()),
            None => values.remove(key),
        };
    }
}

type ChangeListener = Arc<dyn Fn(&str) + Send + Sync>;

/// Typed facade over a [`PreferenceStore`] with change notification.
pub struct Preferences {
    store: Arc<dyn PreferenceStore>,
    listener: Mutex<Option<ChangeListener>>,
}

impl Preferences {
    /// Creates preferences backed by the given store.
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self {
            store,
            listener: Mutex::new(None),
        }
    }

    /// Creates preferences backed by a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryPreferenceStore::new()))
    }

    /// Registers the change listener, replacing any previous one.
    ///
    /// The listener receives the key that changed and is invoked on the
    /// thread performing the mutation.
    pub fn set_listener(&self, listener: impl Fn(&str) + Send + Sync + 'static) {
        *self.listener.lock() = Some(Arc::new(listener));
    }

    /// Whether continuous location updates are enabled. Defaults to false.
    pub fn updates_enabled(&self) -> bool {
        self.get_bool(KEY_UPDATES_ENABLED)
    }

    /// Enables or disables continuous location updates.
    pub fn set_updates_enabled(&self, enabled: bool) {
        self.put_changed(KEY_UPDATES_ENABLED, Some(bool_str(enabled)));
    }

    /// Whether updates may continue in the background. Defaults to false.
    pub fn background_allowed(&self) -> bool {
        self.get_bool(KEY_BACKGROUND_ALLOWED)
    }

    /// Allows or disallows continuous updates in the background.
    pub fn set_background_allowed(&self, allowed: bool) {
        self.put_changed(KEY_BACKGROUND_ALLOWED, Some(bool_str(allowed)));
    }

    /// Returns the stored request options, if any.
    ///
    /// A stored blob that fails to parse is treated as absent (and logged),
    /// so a corrupt store never breaks the defaults path.
    pub fn request_options(&self) -> Option<RequestOptions> {
        let raw = self.store.get(KEY_REQUEST_OPTIONS)?;
        match serde_json::from_str(&raw) {
            Ok(options) => Some(options),
            Err(error) => {
                warn!(%error, "stored request options are unreadable, using defaults");
                None
            }
        }
    }

    /// Returns the stored request options or the defaults.
    pub fn effective_request_options(&self) -> RequestOptions {
        self.request_options().unwrap_or_default()
    }

    /// Stores new request options, or clears them to fall back to defaults.
    pub fn set_request_options(&self, options: Option<&RequestOptions>) {
        let encoded = options.map(|options| {
            // RequestOptions serialization is infallible (plain fields only).
            serde_json::to_string(options).expect("request options serialize")
        });
        self.put_changed(KEY_REQUEST_OPTIONS, encoded);
    }

    /// Fires the change listener for a key mutated outside this process.
    pub fn notify_external_change(&self, key: &str) {
        self.notify(key);
    }

    fn get_bool(&self, key: &str) -> bool {
        self.store
            .get(key)
            .map(|value| value == "true")
            .unwrap_or(false)
    }

    /// Writes a value and notifies the listener only on a logical change.
    fn put_changed(&self, key: &str, value: Option<String>) {
        if self.store.get(key) == value {
            return;
        }
        self.store.put(key, value.as_deref());
        self.notify(key);
    }

    fn notify(&self, key: &str) {
        let listener = self.listener.lock().clone();
        if let Some(listener) = listener {
            listener(key);
        }
    }
}

fn bool_str(value: bool) -> String {
    if value { "true" } else { "false" }.to_string()
}
