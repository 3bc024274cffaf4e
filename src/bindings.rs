//! Bindings and indicators - the configurable glue between bus and host
//!
//! A binding listens on a bus channel and executes a host action. An
//! indicator listens on a polled host path (which is what makes the diff
//! engine poll it) and lights a control through `device.setLed`.

use crate::bus::{EventBus, Subscriptions};
use crate::config::{BindingConfig, IndicatorConfig};
use crate::host::HostActions;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Host action that drives control lights
pub const LED_ACTION: &str = "device.setLed";

/// Placeholder replaced by the event payload inside binding params
pub const VALUE_PLACEHOLDER: &str = "$value";

/// Attached bindings and indicators; detached on drop
pub struct Bindings {
    bus: EventBus,
    subs: Subscriptions,
    lit: Arc<RwLock<BTreeMap<String, bool>>>,
    fired: Arc<AtomicU64>,
}

impl Bindings {
    pub fn build(
        bus: &EventBus,
        host: Arc<dyn HostActions>,
        bindings: &[BindingConfig],
        indicators: &[IndicatorConfig],
    ) -> Self {
        let lit = Arc::new(RwLock::new(BTreeMap::new()));
        let fired = Arc::new(AtomicU64::new(0));
        let mut subs = Subscriptions::new();

        for binding in bindings.iter().cloned() {
            let host = host.clone();
            let fired = fired.clone();
            subs = subs.on(binding.event.clone(), move |payload| {
                let value = payload.to_value();
                if binding.when.as_ref().is_some_and(|when| *when != value) {
                    return;
                }
                let params = resolve_params(&binding.params, &value);
                fired.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = host.execute(&binding.action, &params) {
                    warn!("Binding {} → {} failed: {}", binding.event, binding.action, e);
                }
            });
        }

        for indicator in indicators.iter().cloned() {
            let host = host.clone();
            let lit = lit.clone();
            subs = subs.on(indicator.signal.clone(), move |payload| {
                let on = indicator_lit(&indicator, &payload.to_value());
                let previous = lit.write().insert(indicator.control.clone(), on);
                if previous == Some(on) {
                    return;
                }
                debug!("Indicator {} → {} = {}", indicator.signal, indicator.control, on);
                if let Err(e) = host.execute(LED_ACTION, &json!([indicator.control, on])) {
                    warn!("Indicator for '{}' failed: {}", indicator.control, e);
                }
            });
        }

        subs.attach(bus);
        debug!("Attached {} bindings and {} indicators", bindings.len(), indicators.len());

        Self {
            bus: bus.clone(),
            subs,
            lit,
            fired,
        }
    }

    /// Last lit state computed for a control
    pub fn lit(&self, control: &str) -> Option<bool> {
        self.lit.read().get(control).copied()
    }

    /// Controls currently lit
    pub fn lit_controls(&self) -> Vec<String> {
        self.lit
            .read()
            .iter()
            .filter(|(_, on)| **on)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Binding executions so far
    pub fn fired(&self) -> u64 {
        self.fired.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.subs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subs.is_empty()
    }

    /// Turn every lit indicator off
    pub fn blackout(&self, host: &dyn HostActions) {
        let mut lit = self.lit.write();
        for (control, on) in lit.iter_mut().filter(|(_, on)| **on) {
            *on = false;
            if let Err(e) = host.execute(LED_ACTION, &json!([control, false])) {
                warn!("Blackout of '{}' failed: {}", control, e);
            }
        }
    }
}

impl Drop for Bindings {
    fn drop(&mut self) {
        self.subs.detach(&self.bus);
    }
}

/// Binding params for one firing.
///
/// `null` params pass the payload itself; `"$value"` anywhere in the params
/// is replaced by the payload.
pub fn resolve_params(params: &Value, payload: &Value) -> Value {
    match params {
        Value::Null => payload.clone(),
        Value::String(s) if s == VALUE_PLACEHOLDER => payload.clone(),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_params_inner(v, payload)).collect()),
        other => other.clone(),
    }
}

fn resolve_params_inner(param: &Value, payload: &Value) -> Value {
    match param {
        Value::String(s) if s == VALUE_PLACEHOLDER => payload.clone(),
        other => other.clone(),
    }
}

/// Evaluate an indicator condition against a host value.
///
/// `truthy` wins over `in`, which wins over `equals`. No condition means off.
/// String comparisons ignore surrounding whitespace.
pub fn indicator_lit(indicator: &IndicatorConfig, value: &Value) -> bool {
    if let Some(truthy) = indicator.truthy {
        truthy && is_truthy(value)
    } else if let Some(in_array) = &indicator.in_array {
        in_array.iter().any(|v| loosely_equal(v, value))
    } else if let Some(equals) = &indicator.equals {
        loosely_equal(equals, value)
    } else {
        false
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn loosely_equal(expected: &Value, value: &Value) -> bool {
    match (expected, value) {
        (Value::String(a), Value::String(b)) => a.trim() == b.trim(),
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => expected == value,
    }
}
