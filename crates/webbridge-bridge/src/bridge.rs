use std::fmt;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::{ReentrantMutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, trace, warn};
use webbridge_core::{InboundEnvelope, ModuleId, NarrowingOrder, OutboundEnvelope, Shape};
use webbridge_events::{ChannelDelivery, RaiseReport};
use webbridge_settings::BridgeSettings;

use crate::api::ApiLink;
use crate::error::BridgeError;
use crate::module::ModuleHandle;
use crate::stats::{DispatchStats, StatsSnapshot};
use crate::transport::{DeliveryTemplate, ScriptSink};

/// What became of one inbound message. Only `Delivered` reached subscribers;
/// every other variant is a routine drop, not an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered(RaiseReport),
    /// Not an object, or `module`/`event` missing or not strings.
    Malformed,
    UnknownModule,
    UnknownChannel,
    ShapeMismatch { expected: Shape, actual: Shape },
}

impl DispatchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered(_))
    }
}

/// Router construction parameters.
#[derive(Clone, Debug, Default)]
pub struct BridgeConfig {
    pub template: DeliveryTemplate,
    pub message_handler_name: String,
    pub pretty_json: bool,
    pub narrowing: NarrowingOrder,
}

impl BridgeConfig {
    pub fn from_settings(settings: &BridgeSettings) -> Result<Self, BridgeError> {
        Ok(Self {
            template: DeliveryTemplate::new(settings.transport.custom_event_name.clone()),
            message_handler_name: settings.transport.message_handler_name.clone(),
            pretty_json: settings.transport.pretty_json,
            narrowing: settings.narrowing.order()?,
        })
    }
}

struct BridgeShared {
    modules: DashMap<ModuleId, Arc<dyn ModuleHandle>>,
    /// One lock for every inbound dispatch on this bridge. Reentrant so a
    /// subscriber may dispatch into any module, its own included, on the
    /// same thread.
    dispatch_lock: ReentrantMutex<()>,
    sink: RwLock<Option<Arc<dyn ScriptSink>>>,
    config: BridgeConfig,
    stats: DispatchStats,
}

impl Drop for BridgeShared {
    fn drop(&mut self) {
        debug!(modules = self.modules.len(), "bridge torn down");
    }
}

/// The message router between host modules and the content process.
///
/// Cloning yields another handle to the same registry. The registry lives
/// as long as some handle does; modules only keep a weak reference back.
#[derive(Clone)]
pub struct Bridge {
    shared: Arc<BridgeShared>,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            shared: Arc::new(BridgeShared {
                modules: DashMap::new(),
                dispatch_lock: ReentrantMutex::new(()),
                sink: RwLock::new(None),
                config,
                stats: DispatchStats::default(),
            }),
        }
    }

    pub fn from_settings(settings: &BridgeSettings) -> Result<Self, BridgeError> {
        Ok(Self::new(BridgeConfig::from_settings(settings)?))
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.shared.config
    }

    /// Name the host's inbound listener should be registered under.
    pub fn message_handler_name(&self) -> &str {
        &self.shared.config.message_handler_name
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.shared.stats
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub(crate) fn downgrade(&self) -> WeakBridge {
        WeakBridge(Arc::downgrade(&self.shared))
    }

    // ── Transport ───────────────────────────────────────────────────

    /// Attach the outbound transport, returning the previous one.
    pub fn attach_sink(&self, sink: Arc<dyn ScriptSink>) -> Option<Arc<dyn ScriptSink>> {
        self.shared.sink.write().replace(sink)
    }

    pub fn detach_sink(&self) -> Option<Arc<dyn ScriptSink>> {
        self.shared.sink.write().take()
    }

    // ── Registry ────────────────────────────────────────────────────

    /// Register a module under its id and bind its API to this bridge.
    ///
    /// Last writer wins: an existing registration for the same id is
    /// replaced and returned.
    pub fn register<M: ModuleHandle>(
        &self,
        module: Arc<M>,
    ) -> Result<Option<Arc<dyn ModuleHandle>>, BridgeError> {
        let id = module.id().clone();
        if id.is_unset() {
            return Err(BridgeError::UnsetModuleId);
        }
        module.link().bind(self)?;

        let previous = self.shared.modules.insert(id.clone(), module);

        if previous.is_some() {
            debug!(module = %id, "replaced existing module registration");
        } else {
            info!(module = %id, "module registered");
        }
        Ok(previous)
    }

    pub fn unregister(&self, id: &ModuleId) -> Option<Arc<dyn ModuleHandle>> {
        let removed = self.shared.modules.remove(id).map(|(_, handle)| handle);
        if removed.is_some() {
            info!(module = %id, "module unregistered");
        }
        removed
    }

    /// Drop every registration. API calls from those modules fail from now on.
    pub fn clear(&self) {
        let count = self.shared.modules.len();
        self.shared.modules.clear();
        info!(modules = count, "bridge registry cleared");
    }

    pub fn is_registered(&self, id: &ModuleId) -> bool {
        self.shared.modules.contains_key(id)
    }

    /// Whether the module registered under `link`'s id is the one that owns
    /// `link`, not a later registration that replaced it.
    pub(crate) fn holds_link(&self, link: &ApiLink) -> bool {
        self.shared
            .modules
            .get(link.module_id())
            .is_some_and(|handle| handle.link().same_link(link))
    }

    pub fn module(&self, id: &ModuleId) -> Option<Arc<dyn ModuleHandle>> {
        self.shared.modules.get(id).map(|handle| Arc::clone(&*handle))
    }

    /// Registered ids, sorted.
    pub fn module_ids(&self) -> Vec<ModuleId> {
        let mut ids: Vec<ModuleId> = self.shared.modules.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn module_count(&self) -> usize {
        self.shared.modules.len()
    }

    // ── Inbound ─────────────────────────────────────────────────────

    /// Route one decoded inbound envelope to its module's channel.
    pub fn dispatch(&self, raw: &Value) -> DispatchOutcome {
        let stats = &self.shared.stats;

        let envelope = match InboundEnvelope::from_value(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                trace!(reason = e.error_kind(), "dropping malformed envelope");
                stats.record_malformed();
                return DispatchOutcome::Malformed;
            }
        };

        // Held across lookup and raise, so a replacement registered mid-way
        // never runs concurrently with the handle it replaced.
        let _serial = self.shared.dispatch_lock.lock();

        // Clone the handle out so no registry guard is held while
        // subscribers run.
        let handle = if envelope.module.is_unset() {
            None
        } else {
            self.shared
                .modules
                .get(&envelope.module)
                .map(|handle| Arc::clone(&*handle))
        };
        let Some(handle) = handle else {
            trace!(module = %envelope.module, "dropping envelope for unknown module");
            stats.record_unknown_module();
            return DispatchOutcome::UnknownModule;
        };

        let payload = self.shared.config.narrowing.narrow(envelope.data.as_ref());
        match handle.raise_channel(&envelope.event, payload) {
            ChannelDelivery::Delivered(report) => {
                trace!(
                    module = %envelope.module,
                    channel = %envelope.event,
                    delivered = report.delivered,
                    failed = report.failed,
                    "dispatched"
                );
                stats.record_delivered(report.failed);
                DispatchOutcome::Delivered(report)
            }
            ChannelDelivery::UnknownChannel => {
                trace!(
                    module = %envelope.module,
                    channel = %envelope.event,
                    "dropping envelope for unknown channel"
                );
                stats.record_unknown_channel();
                DispatchOutcome::UnknownChannel
            }
            ChannelDelivery::ShapeMismatch { expected, actual } => {
                debug!(
                    module = %envelope.module,
                    channel = %envelope.event,
                    %expected,
                    %actual,
                    "dropping envelope with mismatched payload shape"
                );
                stats.record_shape_mismatch();
                DispatchOutcome::ShapeMismatch { expected, actual }
            }
        }
    }

    /// Parse a raw JSON string, then [`dispatch`](Self::dispatch) it.
    /// Unparseable input is `Malformed`.
    pub fn dispatch_str(&self, raw: &str) -> DispatchOutcome {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => self.dispatch(&value),
            Err(e) => {
                trace!(error = %e, "dropping unparseable inbound message");
                self.shared.stats.record_malformed();
                DispatchOutcome::Malformed
            }
        }
    }

    // ── Outbound ────────────────────────────────────────────────────

    /// Serialize `{module, method, data}`, wrap it in the delivery template
    /// and hand it to the sink. On error nothing is delivered.
    pub fn send<D: Serialize>(
        &self,
        module: &ModuleId,
        method: &str,
        data: D,
    ) -> Result<(), BridgeError> {
        let result = self.try_send(module, method, data);
        match &result {
            Ok(()) => self.shared.stats.record_sent(),
            Err(e) => {
                warn!(module = %module, method, error = %e, "outbound call abandoned");
                self.shared.stats.record_send_failure();
            }
        }
        result
    }

    fn try_send<D: Serialize>(
        &self,
        module: &ModuleId,
        method: &str,
        data: D,
    ) -> Result<(), BridgeError> {
        if module.is_unset() {
            return Err(BridgeError::UnsetModuleId);
        }
        let data = serde_json::to_value(data)?;
        let json = OutboundEnvelope::new(module.clone(), method, data)
            .encode(self.shared.config.pretty_json)?;
        let script = self.shared.config.template.render(&json);

        let sink = self.shared.sink.read().clone();
        let sink = sink.ok_or(BridgeError::TransportDetached)?;
        trace!(module = %module, method, bytes = script.len(), "delivering outbound call");
        sink.evaluate(&script);
        Ok(())
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("modules", &self.module_ids())
            .field("sink_attached", &self.shared.sink.read().is_some())
            .finish()
    }
}

/// Non-owning reference to a [`Bridge`], held by module links.
#[derive(Clone)]
pub struct WeakBridge(Weak<BridgeShared>);

impl WeakBridge {
    pub fn upgrade(&self) -> Option<Bridge> {
        self.0.upgrade().map(|shared| Bridge { shared })
    }

    pub(crate) fn points_to(&self, bridge: &Bridge) -> bool {
        std::ptr::eq(self.0.as_ptr(), Arc::as_ptr(&bridge.shared))
    }
}

impl fmt::Debug for WeakBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakBridge")
            .field("alive", &(self.0.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiLink, ModuleApi};
    use crate::module::Module;
    use crate::transport::BufferSink;
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::collections::HashMap;
    use webbridge_events::{ChannelTable, Event, ModuleEvents};

    // Test-only: lets `assert_matches!` print `Result<Option<Arc<dyn ModuleHandle>>, _>`.
    impl std::fmt::Debug for dyn crate::module::ModuleHandle {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_tuple("ModuleHandle").field(self.id()).finish()
        }
    }

    #[derive(Default)]
    struct CounterEvents {
        count: Event<i64>,
        label: Event<String>,
    }

    impl ModuleEvents for CounterEvents {
        fn channels(&self) -> ChannelTable {
            ChannelTable::new()
                .with("count", &self.count)
                .with("label", &self.label)
        }
    }

    struct CounterApi {
        link: ApiLink,
    }

    impl ModuleApi for CounterApi {
        fn new(link: ApiLink) -> Self {
            Self { link }
        }
    }

    impl CounterApi {
        fn reset(&self, to: i64) -> Result<(), BridgeError> {
            self.link.call("reset", (to,))
        }
    }

    fn bridge_with_sink() -> (Bridge, Arc<BufferSink>) {
        let bridge = Bridge::new(BridgeConfig::default());
        let sink = Arc::new(BufferSink::new());
        bridge.attach_sink(sink.clone());
        (bridge, sink)
    }

    #[test]
    fn register_binds_the_api() {
        let (bridge, sink) = bridge_with_sink();
        let module = Module::<CounterEvents, CounterApi>::new("counter");
        assert!(bridge.register(module.clone()).unwrap().is_none());
        assert!(module.is_connected());

        module.api().reset(3).unwrap();
        let scripts = sink.drain();
        assert_eq!(scripts.len(), 1);
        assert!(scripts[0].contains(r#""method":"reset""#));
        assert!(scripts[0].contains(r#""data":[3]"#));
    }

    #[test]
    fn unset_id_cannot_register() {
        let bridge = Bridge::new(BridgeConfig::default());
        let module = Module::<CounterEvents, CounterApi>::new(ModuleId::unset());
        assert_matches!(bridge.register(module), Err(BridgeError::UnsetModuleId));
        assert_eq!(bridge.module_count(), 0);
    }

    #[test]
    fn unset_id_never_routes() {
        let bridge = Bridge::new(BridgeConfig::default());
        let outcome = bridge.dispatch(&json!({"module": "", "event": "count", "data": 1}));
        assert_eq!(outcome, DispatchOutcome::UnknownModule);
        assert_matches!(
            bridge.send(&ModuleId::unset(), "x", ()),
            Err(BridgeError::UnsetModuleId)
        );
    }

    #[test]
    fn last_registration_wins() {
        let bridge = Bridge::new(BridgeConfig::default());
        let first = Module::<CounterEvents, CounterApi>::new("counter");
        let second = Module::<CounterEvents, CounterApi>::new("counter");
        let hits = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let h = Arc::clone(&hits);
        first.events().count.subscribe_fn(move |_| h.lock().push("first"));
        let h = Arc::clone(&hits);
        second.events().count.subscribe_fn(move |_| h.lock().push("second"));

        bridge.register(first).unwrap();
        let replaced = bridge.register(second).unwrap();
        assert!(replaced.is_some());
        assert_eq!(bridge.module_count(), 1);

        bridge.dispatch(&json!({"module": "counter", "event": "count", "data": 1}));
        assert_eq!(*hits.lock(), vec!["second"]);
    }

    #[test]
    fn replaced_module_loses_its_connection() {
        let (bridge, sink) = bridge_with_sink();
        let first = Module::<CounterEvents, CounterApi>::new("counter");
        let second = Module::<CounterEvents, CounterApi>::new("counter");

        bridge.register(first.clone()).unwrap();
        bridge.register(second.clone()).unwrap();
        assert!(!first.is_connected());
        assert!(second.is_connected());
        assert_matches!(first.api().reset(1), Err(BridgeError::NotConnected(_)));
        assert!(sink.is_empty());
        second.api().reset(2).unwrap();
        assert_eq!(sink.drain().len(), 1);

        // Registering the first one again flips it back.
        bridge.register(first.clone()).unwrap();
        assert!(first.is_connected());
        assert_matches!(second.api().reset(3), Err(BridgeError::NotConnected(_)));
    }

    #[test]
    fn second_bridge_is_rejected() {
        let a = Bridge::new(BridgeConfig::default());
        let b = Bridge::new(BridgeConfig::default());
        let module = Module::<CounterEvents, CounterApi>::new("counter");
        a.register(module.clone()).unwrap();
        assert_matches!(b.register(module.clone()), Err(BridgeError::BoundElsewhere(_)));
        // Re-registering on the same bridge is fine.
        assert!(a.register(module).is_ok());
    }

    #[test]
    fn dispatch_outcomes() {
        let bridge = Bridge::new(BridgeConfig::default());
        bridge
            .register(Module::<CounterEvents, CounterApi>::new("counter"))
            .unwrap();

        assert_eq!(bridge.dispatch(&json!("nope")), DispatchOutcome::Malformed);
        assert_eq!(
            bridge.dispatch(&json!({"module": "counter"})),
            DispatchOutcome::Malformed
        );
        assert_eq!(
            bridge.dispatch(&json!({"module": "other", "event": "count", "data": 1})),
            DispatchOutcome::UnknownModule
        );
        assert_eq!(
            bridge.dispatch(&json!({"module": "counter", "event": "nope", "data": 1})),
            DispatchOutcome::UnknownChannel
        );
        assert_eq!(
            bridge.dispatch(&json!({"module": "counter", "event": "count", "data": "1"})),
            DispatchOutcome::ShapeMismatch {
                expected: Shape::Integer,
                actual: Shape::String
            }
        );
        assert!(bridge
            .dispatch(&json!({"module": "counter", "event": "label", "data": "1"}))
            .is_delivered());

        let snap = bridge.stats_snapshot();
        assert_eq!(snap.malformed, 2);
        assert_eq!(snap.unknown_module, 1);
        assert_eq!(snap.unknown_channel, 1);
        assert_eq!(snap.shape_mismatch, 1);
        assert_eq!(snap.delivered, 1);
    }

    #[test]
    fn dispatch_str_parses_first() {
        let bridge = Bridge::new(BridgeConfig::default());
        let module = Module::<CounterEvents, CounterApi>::new("counter");
        bridge.register(module).unwrap();
        assert_eq!(bridge.dispatch_str("{oops"), DispatchOutcome::Malformed);
        assert!(bridge
            .dispatch_str(r#"{"module":"counter","event":"count","data":4}"#)
            .is_delivered());
    }

    #[test]
    fn send_without_sink_is_reported() {
        let bridge = Bridge::new(BridgeConfig::default());
        assert_matches!(
            bridge.send(&ModuleId::new("counter"), "reset", [1]),
            Err(BridgeError::TransportDetached)
        );
        assert_eq!(bridge.stats_snapshot().send_failures, 1);
    }

    #[test]
    fn unrepresentable_data_sends_nothing() {
        let (bridge, sink) = bridge_with_sink();
        let mut bad: HashMap<Vec<u8>, i32> = HashMap::new();
        bad.insert(vec![1], 1);
        assert_matches!(
            bridge.send(&ModuleId::new("counter"), "reset", bad),
            Err(BridgeError::Serialize(_))
        );
        assert!(sink.is_empty());
    }

    #[test]
    fn unregister_disconnects_the_api() {
        let (bridge, sink) = bridge_with_sink();
        let module = Module::<CounterEvents, CounterApi>::new("counter");
        bridge.register(module.clone()).unwrap();

        assert!(bridge.unregister(module.id()).is_some());
        assert!(bridge.unregister(module.id()).is_none());
        assert_matches!(module.api().reset(1), Err(BridgeError::NotConnected(_)));
        assert!(sink.is_empty());

        // Same bridge may take it back.
        bridge.register(module.clone()).unwrap();
        assert!(module.api().reset(1).is_ok());
    }

    #[test]
    fn dropping_the_bridge_disconnects() {
        let module = Module::<CounterEvents, CounterApi>::new("counter");
        {
            let bridge = Bridge::new(BridgeConfig::default());
            bridge.register(module.clone()).unwrap();
            assert!(module.is_connected());
        }
        assert!(!module.is_connected());
        assert_matches!(module.api().reset(0), Err(BridgeError::NotConnected(_)));
    }

    #[test]
    fn clear_empties_the_registry() {
        let bridge = Bridge::new(BridgeConfig::default());
        bridge
            .register(Module::<CounterEvents, CounterApi>::new("a"))
            .unwrap();
        bridge
            .register(Module::<CounterEvents, CounterApi>::new("b"))
            .unwrap();
        assert_eq!(
            bridge.module_ids(),
            vec![ModuleId::new("a"), ModuleId::new("b")]
        );
        bridge.clear();
        assert_eq!(bridge.module_count(), 0);
    }

    #[test]
    fn config_from_settings() {
        let mut settings = BridgeSettings::default();
        settings.transport.custom_event_name = "hostbridge".into();
        settings.transport.pretty_json = true;
        let bridge = Bridge::from_settings(&settings).unwrap();
        assert_eq!(bridge.config().template.event_name(), "hostbridge");
        assert!(bridge.config().pretty_json);
        assert_eq!(bridge.message_handler_name(), "bridge");

        settings.narrowing.order = vec!["bogus".into()];
        assert_matches!(Bridge::from_settings(&settings), Err(BridgeError::Config(_)));
    }

    #[test]
    fn subscriber_may_dispatch_into_its_own_module() {
        let bridge = Bridge::new(BridgeConfig::default());
        let module = Module::<CounterEvents, CounterApi>::new("counter");
        bridge.register(module.clone()).unwrap();
        let labels = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let b = bridge.clone();
        module.events().count.subscribe_fn(move |n| {
            b.dispatch(&json!({"module": "counter", "event": "label", "data": n.to_string()}));
        });
        let l = Arc::clone(&labels);
        module
            .events()
            .label
            .subscribe_fn(move |s| l.lock().push(s.clone()));

        assert!(bridge
            .dispatch(&json!({"module": "counter", "event": "count", "data": 8}))
            .is_delivered());
        assert_eq!(*labels.lock(), vec!["8".to_string()]);
    }

    #[test]
    fn cross_module_dispatch_from_two_threads_completes() {
        use std::sync::{mpsc, Barrier};
        use std::time::Duration;

        let bridge = Bridge::new(BridgeConfig::default());
        let a = Module::<CounterEvents, CounterApi>::new("a");
        let b = Module::<CounterEvents, CounterApi>::new("b");
        bridge.register(a.clone()).unwrap();
        bridge.register(b.clone()).unwrap();

        // Each module's `count` subscriber dispatches into the other one.
        for (module, other) in [(&a, "b"), (&b, "a")] {
            let bridge = bridge.clone();
            module.events().count.subscribe_fn(move |n| {
                bridge.dispatch(&json!({"module": other, "event": "label", "data": n.to_string()}));
            });
        }
        let labels = Arc::new(parking_lot::Mutex::new(0usize));
        for module in [&a, &b] {
            let l = Arc::clone(&labels);
            module.events().label.subscribe_fn(move |_| *l.lock() += 1);
        }

        let start = Arc::new(Barrier::new(2));
        let (done_tx, done_rx) = mpsc::channel();
        for target in ["a", "b"] {
            let bridge = bridge.clone();
            let start = Arc::clone(&start);
            let done_tx = done_tx.clone();
            std::thread::spawn(move || {
                start.wait();
                for i in 0..200 {
                    bridge.dispatch(&json!({"module": target, "event": "count", "data": i}));
                }
                let _ = done_tx.send(());
            });
        }

        for _ in 0..2 {
            done_rx
                .recv_timeout(Duration::from_secs(10))
                .expect("cross-module dispatch deadlocked");
        }
        assert_eq!(*labels.lock(), 400);
    }
}
