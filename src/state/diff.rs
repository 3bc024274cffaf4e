//! StateDiffEngine - baseline per polled path, publish on change

use super::IDLE_EVENT;
use crate::bus::{EventBus, Payload};
use crate::host::{DottedPath, HostAccessor};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// What one tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Paths read from the host
    pub polled: usize,
    /// Paths published because their value changed (or was first seen)
    pub changed: usize,
    /// Subscribed channels that are not host paths
    pub skipped: usize,
}

/// Polls subscribed host paths and publishes changes.
///
/// Cheap to clone; clones share the baseline.
#[derive(Clone)]
pub struct StateDiffEngine {
    bus: EventBus,
    host: Arc<dyn HostAccessor>,
    baseline: Arc<Mutex<HashMap<String, Value>>>,
}

impl StateDiffEngine {
    pub fn new(bus: EventBus, host: Arc<dyn HostAccessor>) -> Self {
        Self {
            bus,
            host,
            baseline: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// One idle tick: heartbeat, then poll every subscribed dotted path once.
    ///
    /// The channel list is taken after the heartbeat, so anything subscribed
    /// by an `idle` handler is polled in the same tick. Channels subscribed
    /// while this tick publishes are picked up on the next one.
    pub fn tick(&self) -> TickReport {
        self.bus.publish(IDLE_EVENT, &Payload::Empty);

        let mut channels = self.bus.channels();
        channels.sort();

        let mut report = TickReport::default();
        for channel in channels {
            let Some(accessor) = DottedPath::parse(&channel)
                .and_then(|path| self.host.resolve(&path.module, &path.member))
            else {
                report.skipped += 1;
                continue;
            };

            let value = accessor();
            report.polled += 1;

            let changed = {
                let mut baseline = self.baseline.lock();
                let changed = baseline.get(&channel) != Some(&value);
                baseline.insert(channel.clone(), value.clone());
                changed
            };

            if changed {
                trace!("{} changed to {}", channel, value);
                report.changed += 1;
                self.bus.publish(&channel, &Payload::Value(value));
            }
        }
        report
    }

    /// Last value observed for a path
    pub fn last_value(&self, path: &str) -> Option<Value> {
        self.baseline.lock().get(path).cloned()
    }

    /// Number of paths with a baseline
    pub fn tracked(&self) -> usize {
        self.baseline.lock().len()
    }

    /// Drop every baseline so the next tick republishes all subscribed paths
    pub fn reset(&self) {
        self.baseline.lock().clear();
    }
}
