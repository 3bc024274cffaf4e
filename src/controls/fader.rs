//! Fader façade and the scalar views shared with knobs
//!
//! Events: `unit_value`, `inverse_value`, `inverse_unit_value`,
//! `symmetry_value`, `symmetry_unit_value`.

use super::{Control, ControlCore, ControlKind, EventList, SurfaceContext};
use crate::bus::{Payload, Subscriptions};
use crate::midi::{status, MidiMsg};
use crate::registry::{ControlDescriptor, ControlRef};

const MAX: u8 = 127;
const CENTER: i64 = 64;

/// Five views of a 7-bit data byte
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalarViews {
    /// value / 127
    pub unit: f64,
    /// 127 - value
    pub inverse: i64,
    pub inverse_unit: f64,
    /// value - 64
    pub symmetry: i64,
    /// (value - 64) / 64, in [-1, 0.984]
    pub symmetry_unit: f64,
}

impl ScalarViews {
    pub fn of(value: u8) -> Self {
        let value = value.min(MAX);
        let inverse = i64::from(MAX - value);
        let symmetry = i64::from(value) - CENTER;
        Self {
            unit: f64::from(value) / f64::from(MAX),
            inverse,
            inverse_unit: inverse as f64 / f64::from(MAX),
            symmetry,
            symmetry_unit: symmetry as f64 / CENTER as f64,
        }
    }

    pub(crate) fn events(&self) -> EventList {
        vec![
            ("unit_value", Payload::Float(self.unit)),
            ("inverse_value", Payload::Int(self.inverse)),
            ("inverse_unit_value", Payload::Float(self.inverse_unit)),
            ("symmetry_value", Payload::Int(self.symmetry)),
            ("symmetry_unit_value", Payload::Float(self.symmetry_unit)),
        ]
    }
}

pub(crate) fn derive(msg: &MidiMsg) -> EventList {
    ScalarViews::of(msg.data2).events()
}

pub struct Fader {
    core: ControlCore,
}

impl Fader {
    /// Absolute CC fader
    pub fn new(ctx: &SurfaceContext, name: &str, channel: u8, identifier: u8) -> Self {
        Self::with_status(ctx, name, channel, identifier, status::CONTROL_CHANGE)
    }

    pub fn with_status(ctx: &SurfaceContext, name: &str, channel: u8, identifier: u8, status: u8) -> Self {
        let control = ControlDescriptor::new(name, channel, identifier, status).into_ref();
        let on_value = {
            let ctx = ctx.clone();
            let name = name.to_string();
            move |payload: &Payload| {
                if let Some(msg) = payload.as_midi() {
                    ctx.emit(&name, derive(msg));
                }
            }
        };
        let subs = Subscriptions::new().on(control.value_event(), on_value);

        Self {
            core: ControlCore::new(ctx.clone(), control, subs),
        }
    }

    pub fn descriptor(&self) -> &ControlRef {
        self.core.control()
    }
}

impl Control for Fader {
    fn name(&self) -> &str {
        &self.core.control().name
    }

    fn descriptors(&self) -> Vec<ControlRef> {
        vec![self.core.control().clone()]
    }

    fn kind(&self) -> Option<ControlKind> {
        Some(ControlKind::Fader)
    }

    fn activate(&self) {
        self.core.activate();
    }

    fn deactivate(&self) {
        self.core.deactivate();
    }

    fn is_active(&self) -> bool {
        self.core.is_active()
    }
}
