//! Host collaborator boundary
//!
//! The dispatch core only ever talks to the host through two-part dotted
//! paths: `<module>.<accessor>` resolves to a zero-argument query polled by
//! the state diff engine, `<module>.<action>` to a mutator called by
//! bindings and indicators.

mod console;

pub use console::{ConsoleHost, ConsoleState};

use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Zero-argument host query
pub type Accessor = Arc<dyn Fn() -> Value + Send + Sync>;
/// Host mutator taking JSON parameters
pub type Action = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;

/// A `<module>.<member>` path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DottedPath {
    pub module: String,
    pub member: String,
}

impl DottedPath {
    /// Split `text` into exactly two non-empty parts
    pub fn parse(text: &str) -> Option<Self> {
        let (module, member) = text.split_once('.')?;
        if module.is_empty() || member.is_empty() || member.contains('.') {
            return None;
        }
        Some(Self {
            module: module.to_string(),
            member: member.to_string(),
        })
    }
}

impl FromStr for DottedPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| Error::InvalidPath(s.to_string()))
    }
}

impl fmt::Display for DottedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.member)
    }
}

/// Pollable host state
pub trait HostAccessor: Send + Sync {
    /// Look up a query; `None` if the module or accessor does not exist
    fn resolve(&self, module: &str, accessor: &str) -> Option<Accessor>;

    /// Resolve and call in one step
    fn read(&self, path: &DottedPath) -> Option<Value> {
        self.resolve(&path.module, &path.member).map(|accessor| accessor())
    }
}

/// Host mutators
pub trait HostActions: Send + Sync {
    fn execute(&self, action: &str, params: &Value) -> Result<Value>;
}

#[derive(Clone, Default)]
struct HostModule {
    accessors: BTreeMap<String, Accessor>,
    actions: BTreeMap<String, Action>,
}

/// Table of host modules built from closures
#[derive(Clone, Default)]
pub struct HostApi {
    modules: BTreeMap<String, HostModule>,
}

impl HostApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accessor<F>(mut self, module: &str, name: &str, f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.modules
            .entry(module.to_string())
            .or_default()
            .accessors
            .insert(name.to_string(), Arc::new(f));
        self
    }

    pub fn action<F>(mut self, module: &str, name: &str, f: F) -> Self
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.modules
            .entry(module.to_string())
            .or_default()
            .actions
            .insert(name.to_string(), Arc::new(f));
        self
    }

    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// Every accessor path, sorted
    pub fn accessor_paths(&self) -> Vec<String> {
        self.modules
            .iter()
            .flat_map(|(module, m)| m.accessors.keys().map(move |a| format!("{}.{}", module, a)))
            .collect()
    }

    /// Every action path, sorted
    pub fn action_paths(&self) -> Vec<String> {
        self.modules
            .iter()
            .flat_map(|(module, m)| m.actions.keys().map(move |a| format!("{}.{}", module, a)))
            .collect()
    }

    pub fn has_action(&self, path: &str) -> bool {
        DottedPath::parse(path).is_some_and(|p| {
            self.modules
                .get(&p.module)
                .is_some_and(|m| m.actions.contains_key(&p.member))
        })
    }
}

impl HostAccessor for HostApi {
    fn resolve(&self, module: &str, accessor: &str) -> Option<Accessor> {
        self.modules.get(module)?.accessors.get(accessor).cloned()
    }
}

impl HostActions for HostApi {
    fn execute(&self, action: &str, params: &Value) -> Result<Value> {
        let path: DottedPath = action.parse()?;
        let f = self
            .modules
            .get(&path.module)
            .and_then(|m| m.actions.get(&path.member))
            .cloned()
            .ok_or_else(|| Error::UnknownAction(action.to_string()))?;
        f(params)
    }
}

/// Positional parameter: `params[index]`, or `params` itself for index 0 when it is a scalar
pub fn param<'a>(params: &'a Value, index: usize) -> Option<&'a Value> {
    match params {
        Value::Array(items) => items.get(index),
        Value::Null => None,
        other if index == 0 => Some(other),
        _ => None,
    }
}

pub fn param_i64(action: &str, params: &Value, index: usize) -> Result<i64> {
    param(params, index)
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .ok_or_else(|| Error::InvalidParams {
            action: action.to_string(),
            reason: format!("expected integer at position {}", index),
        })
}

pub fn param_f64(action: &str, params: &Value, index: usize) -> Result<f64> {
    param(params, index)
        .and_then(Value::as_f64)
        .ok_or_else(|| Error::InvalidParams {
            action: action.to_string(),
            reason: format!("expected number at position {}", index),
        })
}

pub fn param_bool(action: &str, params: &Value, index: usize) -> Result<bool> {
    param(params, index)
        .and_then(|v| v.as_bool().or_else(|| v.as_i64().map(|n| n != 0)))
        .ok_or_else(|| Error::InvalidParams {
            action: action.to_string(),
            reason: format!("expected boolean at position {}", index),
        })
}

pub fn param_str<'a>(action: &str, params: &'a Value, index: usize) -> Result<&'a str> {
    param(params, index)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::InvalidParams {
            action: action.to_string(),
            reason: format!("expected string at position {}", index),
        })
}
