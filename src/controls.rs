//! Control façades - semantic events derived from routed raw messages
//!
//! Each façade registers its descriptor with the [`ControlRegistry`] when
//! built, listens on its own `<name>.value` channel once activated, and
//! republishes what it derives (`<name>.pressed`, `<name>.unit_value`, ...).
//! Dropping a façade detaches its handlers and unregisters it.

mod button;
mod combo;
mod fader;
mod hold;
mod jog;
mod knob;
mod pads;

pub use button::{Button, ButtonOptions, ButtonShape, Edge};
pub use combo::Combo;
pub use fader::{Fader, ScalarViews};
pub use hold::{HoldTracker, PressState, Release};
pub use jog::{Jog, JogShape};
pub use knob::{Knob, KnobEvent};
pub use pads::{PadBank, PadEvent, PadOptions};

use crate::bus::{event_id, EventBus, Payload, Subscriptions};
use crate::midi::MidiMsg;
use crate::registry::{ControlRef, ControlRegistry};
use std::sync::atomic::{AtomicBool, Ordering};

/// Derived events, in publish order
pub type EventList = Vec<(&'static str, Payload)>;

/// Process-wide dispatch services handed to every control at construction
#[derive(Clone)]
pub struct SurfaceContext {
    pub bus: EventBus,
    pub registry: ControlRegistry,
}

impl SurfaceContext {
    pub fn new() -> Self {
        Self::with_diagnostics(false)
    }

    pub fn with_diagnostics(strict: bool) -> Self {
        let bus = EventBus::new();
        let registry = ControlRegistry::new(bus.clone()).with_diagnostics(strict);
        Self { bus, registry }
    }

    /// Publish derived events under `<name>.<event>`
    pub fn emit(&self, name: &str, events: EventList) {
        for (event, payload) in events {
            self.bus.publish(&event_id(name, event), &payload);
        }
    }
}

impl Default for SurfaceContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Common surface of every façade
pub trait Control: Send + Sync {
    fn name(&self) -> &str;

    /// Descriptors this control registered (one per physical key)
    fn descriptors(&self) -> Vec<ControlRef>;

    /// Derivation used when this control is the primary of a combo;
    /// `None` for controls that cannot be wrapped (pad banks)
    fn kind(&self) -> Option<ControlKind>;

    fn activate(&self);

    fn deactivate(&self);

    fn is_active(&self) -> bool;
}

/// Closed set of derivations a combo can delegate to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Button(ButtonShape),
    Jog(JogShape),
    Fader,
    Knob,
}

/// State a derivation may carry between messages
#[derive(Debug, Clone, Default)]
pub struct DeriveMemory {
    pub toggled: bool,
    pub prev_value: u8,
}

impl ControlKind {
    /// Derive semantic events from one raw message
    pub fn derive(&self, msg: &MidiMsg, memory: &mut DeriveMemory) -> EventList {
        match self {
            ControlKind::Button(shape) => button::derive(shape, msg, &mut memory.toggled).1,
            ControlKind::Jog(shape) => jog::derive(shape, msg),
            ControlKind::Fader => fader::derive(msg),
            ControlKind::Knob => knob::derive(msg, &mut memory.prev_value).1,
        }
    }
}

/// Registration and subscription bookkeeping shared by single-key façades
pub(crate) struct ControlCore {
    ctx: SurfaceContext,
    control: ControlRef,
    subs: Subscriptions,
    active: AtomicBool,
}

impl ControlCore {
    pub(crate) fn new(ctx: SurfaceContext, control: ControlRef, subs: Subscriptions) -> Self {
        ctx.registry.register(&control);
        Self {
            ctx,
            control,
            subs,
            active: AtomicBool::new(false),
        }
    }

    pub(crate) fn control(&self) -> &ControlRef {
        &self.control
    }

    pub(crate) fn activate(&self) {
        self.subs.attach(&self.ctx.bus);
        self.ctx.registry.activate(&self.control);
        self.active.store(true, Ordering::Relaxed);
    }

    pub(crate) fn deactivate(&self) {
        self.subs.detach(&self.ctx.bus);
        self.ctx.registry.deactivate(&self.control);
        self.active.store(false, Ordering::Relaxed);
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }
}

impl Drop for ControlCore {
    fn drop(&mut self) {
        self.subs.detach(&self.ctx.bus);
        self.ctx.registry.unregister(&self.control);
    }
}
