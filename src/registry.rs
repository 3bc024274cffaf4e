//! Control registry - raw message routing with modifier overlays
//!
//! Maps a message identity `(channel, identifier, status class)` to a stack of
//! registered controls. The front of each stack wins: the most recently
//! registered control shadows older ones sharing the same hardware key, and
//! unregistering it hands the key back to the previous owner.
//!
//! A modifier (combo) control can be installed over a target control; while
//! installed, messages for the target are published on the modifier's
//! `value` channel instead of the target's.
//!
//! Every miss here (unknown identity, absent control, stale modifier removal)
//! is a silent no-op: teardown can race in-flight hardware messages.

#[cfg(test)]
mod tests;

use crate::bus::{event_id, EventBus, Payload};
use crate::midi::{status, MidiMsg};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Registry lookup key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControlIdentity {
    pub channel: u8,
    pub identifier: u8,
    /// Status kind folded with the channel (e.g. 0x92 for note-on on channel 2)
    pub status_class: u8,
}

impl ControlIdentity {
    pub fn for_status(channel: u8, identifier: u8, status: u8) -> Self {
        Self {
            channel: channel & 0x0F,
            identifier,
            status_class: (status & 0xF0) | (channel & 0x0F),
        }
    }
}

impl fmt::Display for ControlIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{}:{}",
            self.status_class, self.channel, self.identifier
        )
    }
}

/// Called after a message was routed to a control, e.g. to light its LED
pub type FeedbackHook = Arc<dyn Fn(&MidiMsg, &ControlDescriptor) + Send + Sync>;
/// Called after a message was routed, to translate it into host actions
pub type TranslationHook = Arc<dyn Fn(&MidiMsg) + Send + Sync>;

/// What the registry knows about a control
pub struct ControlDescriptor {
    pub name: String,
    pub channel: u8,
    pub identifier: u8,
    /// Status kind the control listens on (NOTE_ON, CONTROL_CHANGE, ...)
    pub status: u8,
    playable: AtomicBool,
    feedback: RwLock<Option<FeedbackHook>>,
    translation: RwLock<Option<TranslationHook>>,
}

/// Shared handle to a control descriptor
pub type ControlRef = Arc<ControlDescriptor>;

impl ControlDescriptor {
    pub fn new(name: impl Into<String>, channel: u8, identifier: u8, status: u8) -> Self {
        Self {
            name: name.into(),
            channel: channel & 0x0F,
            identifier,
            status: status & 0xF0,
            playable: AtomicBool::new(false),
            feedback: RwLock::new(None),
            translation: RwLock::new(None),
        }
    }

    pub fn playable(self, playable: bool) -> Self {
        self.playable.store(playable, Ordering::Relaxed);
        self
    }

    pub fn into_ref(self) -> ControlRef {
        Arc::new(self)
    }

    /// Playable controls pass routed messages through to the host's note handling
    pub fn is_playable(&self) -> bool {
        self.playable.load(Ordering::Relaxed)
    }

    pub fn set_playable(&self, playable: bool) {
        self.playable.store(playable, Ordering::Relaxed);
    }

    pub fn set_feedback(&self, hook: Option<FeedbackHook>) {
        *self.feedback.write() = hook;
    }

    pub fn set_translation(&self, hook: Option<TranslationHook>) {
        *self.translation.write() = hook;
    }

    pub fn feedback(&self) -> Option<FeedbackHook> {
        self.feedback.read().clone()
    }

    pub fn translation(&self) -> Option<TranslationHook> {
        self.translation.read().clone()
    }

    /// Identities claimed by this control: its own, plus the paired
    /// note-off identity for note-on controls.
    pub fn identities(&self) -> Vec<ControlIdentity> {
        let mut ids = vec![ControlIdentity::for_status(
            self.channel,
            self.identifier,
            self.status,
        )];
        if self.status == status::NOTE_ON {
            ids.push(ControlIdentity::for_status(
                self.channel,
                self.identifier,
                status::NOTE_OFF,
            ));
        }
        ids
    }

    /// `<name>.value` - channel carrying raw routed messages
    pub fn value_event(&self) -> String {
        event_id(&self.name, "value")
    }
}

impl fmt::Debug for ControlDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlDescriptor")
            .field("name", &self.name)
            .field("channel", &self.channel)
            .field("identifier", &self.identifier)
            .field("status", &format_args!("{:02X}", self.status))
            .field("playable", &self.is_playable())
            .finish()
    }
}

/// One control claiming an identity
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub id: ControlIdentity,
    pub control: ControlRef,
    pub active: bool,
}

/// Result of routing one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// No control claims the identity
    Unrouted,
    /// The front control is inactive; nothing was published
    Inactive { control: String },
    /// Published on the installed modifier's value channel
    Redirected { control: String, modifier: String },
    /// Published on the control's own value channel
    Delivered { control: String },
}

/// Identity → control stack map plus modifier overlay.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ControlRegistry {
    bus: EventBus,
    map: Arc<RwLock<HashMap<ControlIdentity, Vec<RegistryEntry>>>>,
    modifiers: Arc<RwLock<HashMap<String, ControlRef>>>,
    strict: bool,
}

impl ControlRegistry {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            map: Arc::new(RwLock::new(HashMap::new())),
            modifiers: Arc::new(RwLock::new(HashMap::new())),
            strict: false,
        }
    }

    /// Log duplicate registrations and stale removals (semantics are unchanged)
    pub fn with_diagnostics(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Push the control on the front of each identity it claims, inactive
    pub fn register(&self, control: &ControlRef) {
        let mut map = self.map.write();
        for id in control.identities() {
            let bucket = map.entry(id).or_default();
            if bucket.iter().any(|e| e.control.name == control.name) {
                if self.strict {
                    warn!("Control '{}' already registered on {}", control.name, id);
                }
                continue;
            }
            bucket.insert(
                0,
                RegistryEntry {
                    id,
                    control: control.clone(),
                    active: false,
                },
            );
        }
    }

    /// Remove the control from every identity it claims
    pub fn unregister(&self, control: &ControlRef) {
        let mut map = self.map.write();
        for id in control.identities() {
            let Some(bucket) = map.get_mut(&id) else {
                if self.strict {
                    warn!("Unregister of '{}': nothing registered on {}", control.name, id);
                }
                continue;
            };
            bucket.retain(|e| e.control.name != control.name);
            if bucket.is_empty() {
                map.remove(&id);
            }
        }
    }

    /// Flip the active flag of every entry for this control
    pub fn set_active(&self, control: &ControlRef, active: bool) {
        let mut map = self.map.write();
        for id in control.identities() {
            if let Some(bucket) = map.get_mut(&id) {
                for entry in bucket.iter_mut().filter(|e| e.control.name == control.name) {
                    entry.active = active;
                }
            }
        }
    }

    pub fn activate(&self, control: &ControlRef) {
        self.set_active(control, true);
    }

    pub fn deactivate(&self, control: &ControlRef) {
        self.set_active(control, false);
    }

    /// Install `modifier` as the current modifier of `target`, replacing any other
    pub fn add_modifier(&self, target: &ControlRef, modifier: &ControlRef) {
        debug!("Modifier '{}' installed on '{}'", modifier.name, target.name);
        self.modifiers
            .write()
            .insert(target.name.clone(), modifier.clone());
    }

    /// Remove `modifier` from `target`, only if it is the one currently installed
    pub fn remove_modifier(&self, target: &ControlRef, modifier: &ControlRef) {
        let mut modifiers = self.modifiers.write();
        match modifiers.get(&target.name) {
            Some(current) if current.name == modifier.name => {
                modifiers.remove(&target.name);
                debug!("Modifier '{}' removed from '{}'", modifier.name, target.name);
            },
            _ => {
                if self.strict {
                    warn!(
                        "Stale modifier removal: '{}' is not installed on '{}'",
                        modifier.name, target.name
                    );
                }
            },
        }
    }

    pub fn modifier_for(&self, target_name: &str) -> Option<ControlRef> {
        self.modifiers.read().get(target_name).cloned()
    }

    /// Route a message by its own identity
    pub fn route(&self, msg: &mut MidiMsg) -> RouteOutcome {
        let id = msg.identity();
        self.route_identity(id, msg)
    }

    /// Route a message to the front control registered for `id`.
    ///
    /// Sets `msg.handled`, publishes the raw message on the resolved value
    /// channel and then runs the control's feedback and translation hooks.
    pub fn route_identity(&self, id: ControlIdentity, msg: &mut MidiMsg) -> RouteOutcome {
        let (control, active) = match self.front(&id) {
            Some(entry) => (entry.control, entry.active),
            None => return RouteOutcome::Unrouted,
        };

        if !active {
            msg.handled = !control.is_playable();
            debug!("Control '{}' is not active", control.name);
            return RouteOutcome::Inactive {
                control: control.name.clone(),
            };
        }

        if let Some(modifier) = self.modifier_for(&control.name) {
            msg.handled = !modifier.is_playable();
            debug!("{} -> {} (via modifier '{}')", id, control.name, modifier.name);
            self.bus
                .publish(&modifier.value_event(), &Payload::Midi(*msg));
            return RouteOutcome::Redirected {
                control: control.name.clone(),
                modifier: modifier.name.clone(),
            };
        }

        msg.handled = !control.is_playable();
        debug!("{} -> {}", id, control.name);
        self.bus.publish(&control.value_event(), &Payload::Midi(*msg));

        if let Some(feedback) = control.feedback() {
            feedback(&*msg, control.as_ref());
        }
        if let Some(translation) = control.translation() {
            translation(&*msg);
        }

        RouteOutcome::Delivered {
            control: control.name.clone(),
        }
    }

    /// Highest-priority entry for an identity
    pub fn front(&self, id: &ControlIdentity) -> Option<RegistryEntry> {
        self.map.read().get(id).and_then(|bucket| bucket.first().cloned())
    }

    /// Control names claiming an identity, front first
    pub fn controls_for(&self, id: &ControlIdentity) -> Vec<String> {
        self.map
            .read()
            .get(id)
            .map(|bucket| bucket.iter().map(|e| e.control.name.clone()).collect())
            .unwrap_or_default()
    }

    /// True if the control claims at least one identity
    pub fn is_registered(&self, control: &ControlRef) -> bool {
        let map = self.map.read();
        control.identities().iter().any(|id| {
            map.get(id)
                .is_some_and(|bucket| bucket.iter().any(|e| e.control.name == control.name))
        })
    }

    pub fn is_active(&self, control: &ControlRef) -> bool {
        let map = self.map.read();
        control.identities().iter().any(|id| {
            map.get(id).is_some_and(|bucket| {
                bucket
                    .iter()
                    .any(|e| e.control.name == control.name && e.active)
            })
        })
    }

    /// Number of identities with at least one claimant
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// Snapshot of all buckets, sorted by identity
    pub fn entries(&self) -> Vec<RegistryEntry> {
        let map = self.map.read();
        let mut ids: Vec<_> = map.keys().copied().collect();
        ids.sort();
        ids.iter()
            .flat_map(|id| map[id].iter().cloned())
            .collect()
    }
}
