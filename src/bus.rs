//! EventBus - named-channel publish/subscribe
//!
//! Every interaction in the runtime flows through here: routed raw messages
//! (`<control>.value`), derived control events (`<control>.pressed`), host
//! state changes (`transport.isPlaying`) and the `idle` heartbeat.
//!
//! Delivery is synchronous and depth-first. `publish` snapshots the
//! subscriber list before calling anyone, so handlers may subscribe,
//! unsubscribe or publish again without disturbing the iteration in
//! progress. A panicking handler aborts the publish that called it.

use crate::controls::{KnobEvent, PadEvent};
use crate::midi::MidiMsg;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Event payload carried by a publish
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// No payload (e.g. the idle heartbeat)
    Empty,
    /// Raw routed message
    Midi(MidiMsg),
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Full knob state
    Knob(KnobEvent),
    /// Per-pad event from a pad bank
    Pad(PadEvent),
    /// Held flag per pad number
    PadHolds(BTreeMap<u8, bool>),
    /// Host value observed by polling
    Value(Value),
}

impl Payload {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Payload::Bool(b) => Some(*b),
            Payload::Value(Value::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Payload::Int(n) => Some(*n),
            Payload::Value(v) => v.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Payload::Float(f) => Some(*f),
            Payload::Int(n) => Some(*n as f64),
            Payload::Value(v) => v.as_f64(),
            _ => None,
        }
    }

    pub fn as_midi(&self) -> Option<&MidiMsg> {
        match self {
            Payload::Midi(msg) => Some(msg),
            Payload::Pad(PadEvent { msg: Some(msg), .. }) => Some(msg),
            _ => None,
        }
    }

    /// JSON view used by bindings and indicators
    pub fn to_value(&self) -> Value {
        match self {
            Payload::Empty => Value::Null,
            Payload::Midi(msg) => serde_json::json!([msg.status, msg.data1, msg.data2]),
            Payload::Bool(b) => Value::Bool(*b),
            Payload::Int(n) => Value::from(*n),
            Payload::Float(f) => Value::from(*f),
            Payload::Knob(k) => Value::from(k.value),
            Payload::Pad(p) => serde_json::json!({ "pad": p.number, "state": p.state }),
            Payload::PadHolds(holds) => Value::Object(
                holds
                    .iter()
                    .map(|(n, held)| (n.to_string(), Value::Bool(*held)))
                    .collect(),
            ),
            Payload::Value(v) => v.clone(),
        }
    }
}

impl From<bool> for Payload {
    fn from(b: bool) -> Self {
        Payload::Bool(b)
    }
}

impl From<Value> for Payload {
    fn from(v: Value) -> Self {
        Payload::Value(v)
    }
}

type HandlerFn = dyn Fn(&Payload) + Send + Sync;

/// A subscriber callback with identity.
///
/// Clones share identity; two handlers built from equal closures do not.
#[derive(Clone)]
pub struct Handler(Arc<HandlerFn>);

impl Handler {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, payload: &Payload) {
        (self.0)(payload)
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for Handler {}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler({:p})", self.addr())
    }
}

/// Named-channel publish/subscribe bus.
///
/// Cheap to clone; clones share the same subscription table.
#[derive(Clone, Default)]
pub struct EventBus {
    observers: Arc<RwLock<HashMap<String, Vec<Handler>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler to a channel. Returns false if it was already subscribed.
    pub fn subscribe(&self, channel: &str, handler: &Handler) -> bool {
        let mut observers = self.observers.write();
        let handlers = observers.entry(channel.to_string()).or_default();
        if handlers.contains(handler) {
            return false;
        }
        handlers.push(handler.clone());
        true
    }

    /// Subscribe a closure and hand back its handler (needed to unsubscribe later)
    pub fn on<F>(&self, channel: &str, f: F) -> Handler
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        let handler = Handler::new(f);
        self.subscribe(channel, &handler);
        handler
    }

    /// Remove a handler. Returns false if the channel or handler was absent.
    pub fn unsubscribe(&self, channel: &str, handler: &Handler) -> bool {
        let mut observers = self.observers.write();
        let Some(handlers) = observers.get_mut(channel) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|h| h != handler);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            observers.remove(channel);
        }
        removed
    }

    /// Call every handler subscribed to `channel`, in subscription order.
    ///
    /// Events published to a channel nobody listens on are dropped.
    pub fn publish(&self, channel: &str, payload: &Payload) {
        let snapshot: Vec<Handler> = match self.observers.read().get(channel) {
            Some(handlers) => handlers.clone(),
            None => return,
        };

        trace!("publish {} -> {} handler(s)", channel, snapshot.len());
        for handler in &snapshot {
            handler.call(payload);
        }
    }

    /// Names of all channels with at least one subscriber
    pub fn channels(&self) -> Vec<String> {
        self.observers
            .read()
            .iter()
            .filter(|(_, handlers)| !handlers.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.observers.read().get(channel).map_or(0, Vec::len)
    }

    pub fn is_subscribed(&self, channel: &str, handler: &Handler) -> bool {
        self.observers
            .read()
            .get(channel)
            .is_some_and(|handlers| handlers.contains(handler))
    }
}

/// Build `<name>.<event>` channel names
pub fn event_id(name: &str, event: &str) -> String {
    format!("{}.{}", name, event)
}

/// A set of `(channel, handler)` pairs declared while building a control
/// or component, attached and detached as a unit.
#[derive(Debug, Clone, Default)]
pub struct Subscriptions {
    entries: Vec<(String, Handler)>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a handler for a channel
    pub fn on<F>(mut self, channel: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        self.entries.push((channel.into(), Handler::new(f)));
        self
    }

    /// Declare an existing handler for a channel
    pub fn with(mut self, channel: impl Into<String>, handler: Handler) -> Self {
        self.entries.push((channel.into(), handler));
        self
    }

    pub fn attach(&self, bus: &EventBus) {
        for (channel, handler) in &self.entries {
            bus.subscribe(channel, handler);
        }
    }

    pub fn detach(&self, bus: &EventBus) {
        for (channel, handler) in &self.entries {
            bus.unsubscribe(channel, handler);
        }
    }

    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(c, _)| c.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use proptest::prelude::*;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Handler) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log2 = log.clone();
        let make = move |tag: &str| {
            let log = log2.clone();
            let tag = tag.to_string();
            Handler::new(move |_| log.lock().push(tag.clone()))
        };
        (log, make)
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.publish("nobody.listens", &Payload::Empty);
        assert!(bus.channels().is_empty());
    }

    #[test]
    fn test_subscription_order_and_idempotence() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let a = make("a");
        let b = make("b");

        assert!(bus.subscribe("ch", &a));
        assert!(bus.subscribe("ch", &b));
        assert!(!bus.subscribe("ch", &a));
        assert!(!bus.subscribe("ch", &a.clone()));

        bus.publish("ch", &Payload::Empty);
        assert_eq!(*log.lock(), vec!["a", "b"]);
    }

    #[test]
    fn test_unsubscribe_absent_is_noop() {
        let bus = EventBus::new();
        let (_, make) = recorder();
        let a = make("a");
        assert!(!bus.unsubscribe("missing", &a));

        bus.subscribe("ch", &a);
        assert!(!bus.unsubscribe("ch", &make("other")));
        assert!(bus.unsubscribe("ch", &a));
        assert_eq!(bus.subscriber_count("ch"), 0);
        assert!(bus.channels().is_empty());
    }

    #[test]
    fn test_unsubscribe_during_publish_uses_snapshot() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let second = {
            let log = log.clone();
            Handler::new(move |_| log.lock().push("second"))
        };
        let first = {
            let log = log.clone();
            let bus = bus.clone();
            let second = second.clone();
            Handler::new(move |_| {
                log.lock().push("first");
                bus.unsubscribe("ch", &second);
            })
        };

        bus.subscribe("ch", &first);
        bus.subscribe("ch", &second);

        bus.publish("ch", &Payload::Empty);
        assert_eq!(*log.lock(), vec!["first", "second"]);

        bus.publish("ch", &Payload::Empty);
        assert_eq!(*log.lock(), vec!["first", "second", "first"]);
    }

    #[test]
    fn test_nested_publish_is_depth_first() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        {
            let log = log.clone();
            let inner_bus = bus.clone();
            bus.on("outer", move |_| {
                log.lock().push("outer-1");
                inner_bus.publish("inner", &Payload::Empty);
            });
        }
        {
            let log = log.clone();
            bus.on("outer", move |_| log.lock().push("outer-2"));
        }
        {
            let log = log.clone();
            bus.on("inner", move |_| log.lock().push("inner"));
        }

        bus.publish("outer", &Payload::Empty);
        assert_eq!(*log.lock(), vec!["outer-1", "inner", "outer-2"]);
    }

    #[test]
    #[should_panic(expected = "handler bug")]
    fn test_handler_panic_propagates() {
        let bus = EventBus::new();
        bus.on("boom", |_| panic!("handler bug"));
        bus.publish("boom", &Payload::Empty);
    }

    #[test]
    fn test_subscriptions_attach_detach() {
        let bus = EventBus::new();
        let subs = Subscriptions::new()
            .on("a.value", |_| {})
            .on("b.value", |_| {});

        subs.attach(&bus);
        subs.attach(&bus);
        assert_eq!(bus.subscriber_count("a.value"), 1);
        assert_eq!(bus.subscriber_count("b.value"), 1);

        subs.detach(&bus);
        assert!(bus.channels().is_empty());
    }

    #[test]
    fn test_payload_views() {
        assert_eq!(Payload::Bool(true).as_bool(), Some(true));
        assert_eq!(Payload::Value(Value::from(3)).as_i64(), Some(3));
        assert_eq!(Payload::Int(2).as_f64(), Some(2.0));
        assert_eq!(Payload::Empty.to_value(), Value::Null);
    }

    proptest! {
        #[test]
        fn prop_publish_matches_subscription_model(
            ops in prop::collection::vec((0usize..4, 0u8..3), 0..60)
        ) {
            let bus = EventBus::new();
            let log = Arc::new(Mutex::new(Vec::new()));
            let handlers: Vec<Handler> = (0..4)
                .map(|i| {
                    let log = log.clone();
                    Handler::new(move |_| log.lock().push(i))
                })
                .collect();
            let mut model: Vec<usize> = Vec::new();

            for (index, op) in ops {
                match op {
                    0 => {
                        let added = bus.subscribe("ch", &handlers[index]);
                        prop_assert_eq!(added, !model.contains(&index));
                        if added {
                            model.push(index);
                        }
                    },
                    1 => {
                        let removed = bus.unsubscribe("ch", &handlers[index]);
                        prop_assert_eq!(removed, model.contains(&index));
                        model.retain(|i| *i != index);
                    },
                    _ => {
                        log.lock().clear();
                        bus.publish("ch", &Payload::Empty);
                        prop_assert_eq!(&*log.lock(), &model);
                    },
                }
                prop_assert_eq!(bus.subscriber_count("ch"), model.len());
            }
        }
    }
}
