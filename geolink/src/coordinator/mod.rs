//! Location coordinator - the client-side manager for the background
//! location service.
//!
//! The [`LocationCoordinator`] composes [`Preferences`], a
//! [`ConnectionController`], a registry of continuous-update listeners and a
//! registry of in-flight single-location requests. It derives a single
//! policy decision ("should continuous updates be running") and drives the
//! connection accordingly, and it routes every inbound [`ServiceEvent`] to
//! the right consumer.
//!
//! # Architecture
//!
//! ```text
//!  external triggers                     inbound events (one consumer)
//!  ─────────────────                     ──────────────────────────────
//!  add/remove listener ─┐                CONNECTED ──► replay requests
//!  preference change  ──┼─► evaluate     DISCONNECTED ─► clear channel
//!  app fg/bg change   ──┤    policy      NEW_LOCATION ─► listeners
//!  single request     ──┘      │         SINGLE_RESULT ─► settle handle
//!                              ▼
//!                   ConnectionController
//!              (bind / unbind / subscribe / unsubscribe)
//! ```
//!
//! Policy: `updates_enabled && (background_allowed || foregrounded)`. With
//! listeners registered this drives bind + subscribe; without, unsubscribe
//! and, once no single-location request is outstanding, unbind. Every
//! transition is idempotent, so re-evaluating from scratch on each trigger
//! is always safe.
//!
//! Single-location requests registered while unbound are queued and replayed
//! in registration order when the service connects. Each request settles its
//! [`PendingLocation`] handle exactly once; duplicate or late results for
//! ids no longer in the registry are dropped silently.
//!
//! # Usage
//!
//! ```ignore
//! let coordinator = LocationCoordinator::new(preferences, transport, app_state);
//!
//! // Continuous updates
//! coordinator.set_updates_enabled(true);
//! coordinator.add_listener(listener);
//!
//! // One-shot request
//! let handle = coordinator.request_single_location();
//! handle.on_complete(|fix| println!("{fix:?}"));
//!
//! // Inbound events, one consuming task
//! let (tx, rx) = event_channel();
//! let shutdown = CancellationToken::new();
//! coordinator.spawn_dispatch(rx, shutdown.clone());
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::connection::{ConnectionController, ConnectionState, LocationTransport};
use crate::fix::Fix;
use crate::options::{OptionsError, RequestOptions};
use crate::pending::PendingResult;
use crate::preferences::Preferences;
use crate::protocol::{ControlMessage, ServiceEvent};

/// Default capacity for the inbound event channel.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 64;

/// Result handle for a single-location request. Settles with `Some(fix)` or
/// `None` ("no location obtained").
pub type PendingLocation = PendingResult<Option<Fix>>;

/// Listener for continuous location updates.
///
/// Listeners only see continuous updates, never single-request results.
/// Registering the same listener twice is tolerated: each registration
/// receives its own delivery and needs its own removal (reference-counted
/// add/remove semantics).
pub trait LocationListener: Send + Sync {
    /// Called with each continuous update, on the dispatch context.
    fn on_location_changed(&self, fix: &Fix);
}

/// Boundary to the application foreground signal.
///
/// Queried synchronously during policy evaluation. Pair it with
/// [`LocationCoordinator::notify_app_state_changed`] so transitions trigger
/// re-evaluation.
pub trait ForegroundSignal: Send + Sync {
    /// True while the application is in the foreground.
    fn is_foregrounded(&self) -> bool;
}

/// Simple atomic foreground flag, usable as a [`ForegroundSignal`].
pub struct AppState {
    foregrounded: AtomicBool,
}

impl AppState {
    /// Creates the flag with an initial state.
    pub fn new(foregrounded: bool) -> Self {
        Self {
            foregrounded: AtomicBool::new(foregrounded),
        }
    }

    /// Records a foreground/background transition. Remember to call
    /// [`LocationCoordinator::notify_app_state_changed`] afterwards.
    pub fn set_foregrounded(&self, foregrounded: bool) {
        self.foregrounded.store(foregrounded, Ordering::SeqCst);
    }
}

impl ForegroundSignal for AppState {
    fn is_foregrounded(&self) -> bool {
        self.foregrounded.load(Ordering::SeqCst)
    }
}

/// One outstanding single-location request.
struct SingleLocationRequest {
    options: RequestOptions,
    result: PendingLocation,
}

/// Registry of in-flight single-location requests.
///
/// A BTreeMap keyed by the monotonically increasing id gives replay in
/// registration order. Ids are never reused; a removed id is never
/// reinserted.
struct RequestRegistry {
    next_id: u64,
    entries: BTreeMap<u64, SingleLocationRequest>,
}

impl RequestRegistry {
    fn new() -> Self {
        Self {
            next_id: 1,
            entries: BTreeMap::new(),
        }
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// High level interface for interacting with the background location
/// service.
///
/// Construct one instance per process and pass the `Arc` wherever needed; no
/// ambient global is required. All public operations are safe to call from
/// any thread.
pub struct LocationCoordinator {
    preferences: Preferences,
    connection: ConnectionController,
    foreground: Arc<dyn ForegroundSignal>,
    listeners: Mutex<Vec<Arc<dyn LocationListener>>>,
    requests: Mutex<RequestRegistry>,
    /// Coordinator-wide critical section for policy-driven transitions, so
    /// concurrent triggers cannot interleave bind/subscribe decisions.
    policy: Mutex<()>,
}

impl LocationCoordinator {
    /// Creates a coordinator and wires it to the preference change
    /// notifications.
    ///
    /// Preference mutations, whether from the setters here or from external
    /// store changes, all funnel through the change listener, so each logical
    /// change triggers exactly one policy re-evaluation.
    pub fn new(
        preferences: Preferences,
        transport: Arc<dyn LocationTransport>,
        foreground: Arc<dyn ForegroundSignal>,
    ) -> Arc<Self> {
        let coordinator = Arc::new(Self {
            preferences,
            connection: ConnectionController::new(transport),
            foreground,
            listeners: Mutex::new(Vec::new()),
            requests: Mutex::new(RequestRegistry::new()),
            policy: Mutex::new(()),
        });

        let weak = Arc::downgrade(&coordinator);
        coordinator.preferences.set_listener(move |_key| {
            if let Some(coordinator) = weak.upgrade() {
                coordinator.evaluate_policy();
            }
        });

        coordinator
    }

    // -------------------------------------------------------------------
    // Preferences
    // -------------------------------------------------------------------

    /// Whether continuous location updates are enabled.
    pub fn is_updates_enabled(&self) -> bool {
        self.preferences.updates_enabled()
    }

    /// Enables or disables continuous location updates.
    pub fn set_updates_enabled(&self, enabled: bool) {
        self.preferences.set_updates_enabled(enabled);
    }

    /// Whether continuous updates may continue in the background.
    pub fn is_background_allowed(&self) -> bool {
        self.preferences.background_allowed()
    }

    /// Allows or disallows continuous updates in the background.
    pub fn set_background_allowed(&self, allowed: bool) {
        self.preferences.set_background_allowed(allowed);
    }

    /// Returns the current effective request options (stored or default).
    pub fn request_options(&self) -> RequestOptions {
        self.preferences.effective_request_options()
    }

    /// Sets the request options for continuous updates, or `None` to reset
    /// to the defaults.
    pub fn set_request_options(&self, options: Option<RequestOptions>) {
        self.preferences.set_request_options(options.as_ref());
    }

    /// Returns the preferences facade, e.g. to forward external store
    /// change notifications.
    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    // -------------------------------------------------------------------
    // Continuous updates
    // -------------------------------------------------------------------

    /// Registers a listener for continuous location updates.
    pub fn add_listener(&self, listener: Arc<dyn LocationListener>) {
        self.listeners.lock().push(listener);
        self.evaluate_policy();
    }

    /// Removes one registration of a listener (compared by identity).
    /// Removing a listener that is not registered is a no-op.
    pub fn remove_listener(&self, listener: &Arc<dyn LocationListener>) {
        {
            let mut listeners = self.listeners.lock();
            if let Some(index) = listeners
                .iter()
                .position(|registered| Arc::ptr_eq(registered, listener))
            {
                listeners.remove(index);
            }
        }
        self.evaluate_policy();
    }

    /// Number of registered listener slots (duplicates count separately).
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    // -------------------------------------------------------------------
    // Single-location requests
    // -------------------------------------------------------------------

    /// Requests a single location using the current effective options.
    ///
    /// Returns immediately with a pending handle; the default path never
    /// fails. If no connection exists yet the request is queued and replayed
    /// once the service connects.
    pub fn request_single_location(self: &Arc<Self>) -> PendingLocation {
        self.register_request(self.request_options())
    }

    /// Requests a single location with explicit options.
    ///
    /// Rejects structurally invalid options synchronously, without
    /// registering anything.
    pub fn request_single_location_with(
        self: &Arc<Self>,
        options: RequestOptions,
    ) -> Result<PendingLocation, OptionsError> {
        options.validate()?;
        Ok(self.register_request(options))
    }

    /// Number of outstanding single-location requests.
    pub fn pending_request_count(&self) -> usize {
        self.requests.lock().entries.len()
    }

    fn register_request(self: &Arc<Self>, options: RequestOptions) -> PendingLocation {
        let (id, result) = {
            let mut registry = self.requests.lock();
            let id = registry.allocate_id();

            let weak = Arc::downgrade(self);
            let result = PendingLocation::with_cancel_hook(move || {
                if let Some(coordinator) = weak.upgrade() {
                    coordinator.abandon_request(id);
                }
            });

            registry.entries.insert(
                id,
                SingleLocationRequest {
                    options: options.clone(),
                    result: result.clone(),
                },
            );
            (id, result)
        };

        debug!(request_id = id, "registered single location request");

        let _guard = self.policy.lock();
        if self.connection.is_bound() {
            self.send_single_request(id, &options, &result);
        } else {
            // Queued for replay; the CONNECTED event dispatches it.
            self.connection.ensure_bound();
        }

        result
    }

    /// Cancellation path: drop the registry entry and tell the service to
    /// abandon the id. Called from the handle's cancel hook, any thread.
    fn abandon_request(&self, id: u64) {
        let removed = self.requests.lock().entries.remove(&id);
        if removed.is_some() {
            debug!(request_id = id, "cancelled single location request");
            self.connection
                .send_message(&ControlMessage::CancelSingleLocation { request_id: id });
        }
    }

    fn send_single_request(&self, id: u64, options: &RequestOptions, result: &PendingLocation) {
        if result.is_done() {
            return;
        }
        self.connection
            .send_message(&ControlMessage::RequestSingleLocation {
                request_id: id,
                options: options.clone(),
            });
    }

    // -------------------------------------------------------------------
    // Policy
    // -------------------------------------------------------------------

    /// Tells the coordinator the application moved between foreground and
    /// background.
    pub fn notify_app_state_changed(&self) {
        info!("app state changed");
        self.evaluate_policy();
    }

    /// Whether continuous updates should currently be running.
    fn updates_needed(&self) -> bool {
        if !self.preferences.updates_enabled() {
            return false;
        }
        self.preferences.background_allowed() || self.foreground.is_foregrounded()
    }

    /// Recomputes policy and drives the connection accordingly.
    ///
    /// Runs under the coordinator-wide critical section and is idempotent:
    /// repeated evaluation with unchanged state sends no duplicate
    /// subscribe/unsubscribe traffic.
    fn evaluate_policy(&self) {
        let _guard = self.policy.lock();

        let needed = self.updates_needed();

        // Start/stop are fire-and-forget idempotent signals to the service
        // itself; the service is allowed to wind down on its own.
        if needed {
            self.connection
                .send_control_signal(&ControlMessage::StartUpdates);
        } else {
            self.connection
                .send_control_signal(&ControlMessage::StopUpdates);
        }

        let has_listeners = !self.listeners.lock().is_empty();

        if needed && has_listeners {
            if self.connection.is_bound() {
                self.connection.ensure_subscribed();
            } else {
                // Once connected, the CONNECTED event re-evaluates and the
                // subscribe goes out then.
                self.connection.ensure_bound();
            }
        } else {
            self.connection.ensure_unsubscribed();
            if self.requests.lock().entries.is_empty() {
                self.connection.ensure_unbound();
            }
        }
    }

    /// Current connection state, for diagnostics and tests.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    // -------------------------------------------------------------------
    // Inbound event dispatch
    // -------------------------------------------------------------------

    /// Dispatches one inbound service event.
    ///
    /// This is the single dispatch point; callers must deliver events from
    /// one context at a time (see [`spawn_dispatch`](Self::spawn_dispatch)).
    pub fn handle_event(&self, event: ServiceEvent) {
        match event {
            ServiceEvent::Connected => self.on_connected(),
            ServiceEvent::Disconnected => self.connection.on_disconnected(),
            ServiceEvent::NewLocation { fix } => self.on_new_location(fix),
            ServiceEvent::SingleResult { request_id, fix } => {
                self.on_single_result(request_id, fix)
            }
        }
    }

    /// Spawns the single consuming task for inbound events.
    ///
    /// Events are processed strictly in order until the channel closes or
    /// the token is cancelled.
    pub fn spawn_dispatch(
        self: &Arc<Self>,
        mut events: mpsc::Receiver<ServiceEvent>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("location event dispatch shutting down");
                        break;
                    }
                    event = events.recv() => match event {
                        Some(event) => coordinator.handle_event(event),
                        None => {
                            debug!("location event channel closed");
                            break;
                        }
                    },
                }
            }
        })
    }

    fn on_connected(&self) {
        self.connection.on_connected();

        // Replay every in-flight request, in registration order.
        let pending: Vec<(u64, RequestOptions, PendingLocation)> = {
            let registry = self.requests.lock();
            registry
                .entries
                .iter()
                .map(|(id, request)| (*id, request.options.clone(), request.result.clone()))
                .collect()
        };
        for (id, options, result) in pending {
            debug!(request_id = id, "replaying single location request");
            self.send_single_request(id, &options, &result);
        }

        self.evaluate_policy();
    }

    fn on_new_location(&self, fix: Option<Fix>) {
        let Some(fix) = fix else {
            return;
        };

        // Snapshot so listeners may add/remove during delivery.
        let listeners: Vec<Arc<dyn LocationListener>> = self.listeners.lock().clone();
        for listener in listeners {
            listener.on_location_changed(&fix);
        }
    }

    fn on_single_result(&self, request_id: u64, fix: Option<Fix>) {
        let entry = self.requests.lock().entries.remove(&request_id);
        match entry {
            Some(request) => {
                debug!(request_id, has_fix = fix.is_some(), "single location result");
                request.result.settle(fix);
                // Registry emptiness feeds the unbind decision.
                self.evaluate_policy();
            }
            None => {
                debug!(request_id, "dropping result for unknown request");
            }
        }
    }
}

/// Creates the inbound event channel with the default capacity.
///
/// The sender side goes to the transport; the receiver feeds
/// [`LocationCoordinator::spawn_dispatch`].
pub fn event_channel() -> (mpsc::Sender<ServiceEvent>, mpsc::Receiver<ServiceEvent>) {
    mpsc::channel(DEFAULT_EVENT_CHANNEL_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::TransportError;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct RecordingTransport {
        binds: AtomicUsize,
        unbinds: AtomicUsize,
        sent: Mutex<Vec<ControlMessage>>,
    }

    impl RecordingTransport {
        fn sent(&self) -> Vec<ControlMessage> {
            self.sent.lock().clone()
        }

        fn sent_subscribes(&self) -> usize {
            self.sent
                .lock()
                .iter()
                .filter(|message| matches!(message, ControlMessage::SubscribeUpdates))
                .count()
        }
    }

    impl LocationTransport for RecordingTransport {
        fn bind(&self) -> Result<(), TransportError> {
            self.binds.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn unbind(&self) {
            self.unbinds.fetch_add(1, Ordering::SeqCst);
        }

        fn send(&self, message: &ControlMessage) -> Result<(), TransportError> {
            self.sent.lock().push(message.clone());
            Ok(())
        }
    }

    struct CountingListener {
        deliveries: AtomicUsize,
    }

    impl CountingListener {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                deliveries: AtomicUsize::new(0),
            })
        }
    }

    impl LocationListener for CountingListener {
        fn on_location_changed(&self, _fix: &Fix) {
            self.deliveries.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        coordinator: Arc<LocationCoordinator>,
        transport: Arc<RecordingTransport>,
        app_state: Arc<AppState>,
    }

    fn harness(foregrounded: bool) -> Harness {
        let transport = Arc::new(RecordingTransport::default());
        let app_state = Arc::new(AppState::new(foregrounded));
        let coordinator = LocationCoordinator::new(
            Preferences::in_memory(),
            Arc::clone(&transport) as Arc<dyn LocationTransport>,
            Arc::clone(&app_state) as Arc<dyn ForegroundSignal>,
        );
        Harness {
            coordinator,
            transport,
            app_state,
        }
    }

    fn fix() -> Fix {
        Fix::new(53.5, 10.0, 12.0, 1_700_000_000_000)
    }

    #[test]
    fn test_preference_change_triggers_evaluation() {
        let h = harness(true);

        h.coordinator.set_updates_enabled(true);

        // Evaluation ran and issued the start signal.
        assert!(h
            .transport
            .sent()
            .contains(&ControlMessage::StartUpdates));
    }

    #[test]
    fn test_no_bind_without_listeners() {
        let h = harness(true);
        h.coordinator.set_updates_enabled(true);
        assert_eq!(h.transport.binds.load(Ordering::SeqCst), 0);
        assert_eq!(h.coordinator.connection_state(), ConnectionState::Unbound);
    }

    #[test]
    fn test_listener_drives_bind_then_subscribe_on_connect() {
        let h = harness(true);
        h.coordinator.set_updates_enabled(true);
        h.coordinator.add_listener(CountingListener::new());

        assert_eq!(h.transport.binds.load(Ordering::SeqCst), 1);
        assert_eq!(h.transport.sent_subscribes(), 0);

        h.coordinator.handle_event(ServiceEvent::Connected);
        assert_eq!(h.transport.sent_subscribes(), 1);
        assert_eq!(
            h.coordinator.connection_state(),
            ConnectionState::Bound { subscribed: true }
        );
    }

    #[test]
    fn test_repeated_evaluation_sends_one_subscribe() {
        let h = harness(true);
        h.coordinator.set_updates_enabled(true);
        h.coordinator.add_listener(CountingListener::new());
        h.coordinator.handle_event(ServiceEvent::Connected);

        // Triggers with no state change must not duplicate traffic.
        h.coordinator.notify_app_state_changed();
        h.coordinator.add_listener(CountingListener::new());
        assert_eq!(h.transport.sent_subscribes(), 1);
    }

    #[test]
    fn test_remove_missing_listener_is_noop() {
        let h = harness(true);
        let listener = CountingListener::new();
        h.coordinator
            .remove_listener(&(listener as Arc<dyn LocationListener>));
        assert_eq!(h.coordinator.listener_count(), 0);
    }

    #[test]
    fn test_duplicate_listener_gets_two_deliveries() {
        let h = harness(true);
        let listener = CountingListener::new();
        let handle: Arc<dyn LocationListener> = listener.clone();

        h.coordinator.add_listener(Arc::clone(&handle));
        h.coordinator.add_listener(Arc::clone(&handle));

        h.coordinator.handle_event(ServiceEvent::NewLocation {
            fix: Some(fix()),
        });
        assert_eq!(listener.deliveries.load(Ordering::SeqCst), 2);

        // One remove drops one registration.
        h.coordinator.remove_listener(&handle);
        h.coordinator.handle_event(ServiceEvent::NewLocation {
            fix: Some(fix()),
        });
        assert_eq!(listener.deliveries.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_empty_update_not_delivered() {
        let h = harness(true);
        let listener = CountingListener::new();
        h.coordinator.add_listener(listener.clone());

        h.coordinator
            .handle_event(ServiceEvent::NewLocation { fix: None });
        assert_eq!(listener.deliveries.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_request_ids_are_monotonic_and_never_reused() {
        let h = harness(true);
        h.coordinator.handle_event(ServiceEvent::Connected);

        let _first = h.coordinator.request_single_location();
        h.coordinator.handle_event(ServiceEvent::SingleResult {
            request_id: 1,
            fix: Some(fix()),
        });

        // The idle coordinator released the connection; the next request
        // rebinds and replays with a fresh id.
        let _second = h.coordinator.request_single_location();
        h.coordinator.handle_event(ServiceEvent::Connected);

        let ids: Vec<u64> = h
            .transport
            .sent()
            .iter()
            .filter_map(|message| match message {
                ControlMessage::RequestSingleLocation { request_id, .. } => Some(*request_id),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_invalid_options_rejected_without_registration() {
        let h = harness(true);
        let options = RequestOptions {
            min_displacement_m: -5.0,
            ..Default::default()
        };

        let result = h.coordinator.request_single_location_with(options);
        assert!(result.is_err());
        assert_eq!(h.coordinator.pending_request_count(), 0);
        assert_eq!(h.transport.binds.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_request_while_unbound_kicks_bind() {
        let h = harness(true);
        let handle = h.coordinator.request_single_location();

        assert!(!handle.is_done());
        assert_eq!(h.transport.binds.load(Ordering::SeqCst), 1);
        // Not dispatched yet; waiting for CONNECTED.
        assert!(h
            .transport
            .sent()
            .iter()
            .all(|m| !matches!(m, ControlMessage::RequestSingleLocation { .. })));
    }

    #[test]
    fn test_cancel_removes_entry_and_sends_cancel() {
        let h = harness(true);
        h.coordinator.handle_event(ServiceEvent::Connected);

        let handle = h.coordinator.request_single_location();
        assert!(handle.cancel());

        assert_eq!(h.coordinator.pending_request_count(), 0);
        assert!(h
            .transport
            .sent()
            .contains(&ControlMessage::CancelSingleLocation { request_id: 1 }));

        // A late result for the cancelled id is dropped, not revived.
        h.coordinator.handle_event(ServiceEvent::SingleResult {
            request_id: 1,
            fix: Some(fix()),
        });
        assert!(handle.is_cancelled());
        assert_eq!(handle.result(), None);
    }

    #[test]
    fn test_single_result_settles_and_unbinds_when_idle() {
        let h = harness(true);
        let handle = h.coordinator.request_single_location();
        h.coordinator.handle_event(ServiceEvent::Connected);

        h.coordinator.handle_event(ServiceEvent::SingleResult {
            request_id: 1,
            fix: Some(fix()),
        });

        assert_eq!(handle.result(), Some(Some(fix())));
        assert_eq!(h.coordinator.pending_request_count(), 0);
        // Updates are not needed, registry empty: connection released.
        assert_eq!(h.coordinator.connection_state(), ConnectionState::Unbound);
        assert_eq!(h.transport.unbinds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_no_fix_result_settles_with_none() {
        let h = harness(true);
        let handle = h.coordinator.request_single_location();
        h.coordinator.handle_event(ServiceEvent::Connected);

        h.coordinator.handle_event(ServiceEvent::SingleResult {
            request_id: 1,
            fix: None,
        });

        assert!(handle.is_done());
        assert_eq!(handle.result(), Some(None));
    }

    #[test]
    fn test_disconnect_keeps_requests_queued() {
        let h = harness(true);
        let handle = h.coordinator.request_single_location();
        h.coordinator.handle_event(ServiceEvent::Connected);
        h.coordinator.handle_event(ServiceEvent::Disconnected);

        assert!(!handle.is_done());
        assert_eq!(h.coordinator.pending_request_count(), 1);
        assert_eq!(h.coordinator.connection_state(), ConnectionState::Unbound);
    }

    #[test]
    fn test_background_transition_stops_updates() {
        let h = harness(true);
        h.coordinator.set_updates_enabled(true);
        h.coordinator.add_listener(CountingListener::new());
        h.coordinator.handle_event(ServiceEvent::Connected);
        assert_eq!(
            h.coordinator.connection_state(),
            ConnectionState::Bound { subscribed: true }
        );

        h.app_state.set_foregrounded(false);
        h.coordinator.notify_app_state_changed();

        assert!(h
            .transport
            .sent()
            .contains(&ControlMessage::UnsubscribeUpdates));
        assert_eq!(h.coordinator.connection_state(), ConnectionState::Unbound);
    }

    #[tokio::test]
    async fn test_spawn_dispatch_processes_events_in_order() {
        let h = harness(true);
        let handle = h.coordinator.request_single_location();

        let (tx, rx) = event_channel();
        let shutdown = CancellationToken::new();
        let task = h.coordinator.spawn_dispatch(rx, shutdown.clone());

        tx.send(ServiceEvent::Connected).await.unwrap();
        tx.send(ServiceEvent::SingleResult {
            request_id: 1,
            fix: Some(fix()),
        })
        .await
        .unwrap();

        // Close the channel so the dispatch task drains and exits.
        drop(tx);
        task.await.unwrap();

        assert_eq!(handle.result(), Some(Some(fix())));
    }

    #[tokio::test]
    async fn test_spawn_dispatch_stops_on_shutdown() {
        let h = harness(true);
        let (_tx, rx) = event_channel();
        let shutdown = CancellationToken::new();
        let task = h.coordinator.spawn_dispatch(rx, shutdown.clone());

        shutdown.cancel();
        task.await.unwrap();
    }
}
