//! Knob façade: absolute value, scalar views and turn direction
//!
//! Events: `value`, the five fader views, `direction`, `all`.
//! `value` is the routed raw message itself (data2 is the position);
//! `all` carries the whole [`KnobEvent`].

use super::fader::ScalarViews;
use super::{Control, ControlCore, ControlKind, EventList, SurfaceContext};
use crate::bus::{event_id, Payload, Subscriptions};
use crate::midi::{status, MidiMsg};
use crate::registry::{ControlDescriptor, ControlRef};
use parking_lot::Mutex;
use std::sync::Arc;

/// Complete knob state after one message
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KnobEvent {
    pub value: u8,
    pub unit_value: f64,
    pub inverse_value: i64,
    pub inverse_unit_value: f64,
    pub symmetry_value: i64,
    pub symmetry_unit_value: f64,
    /// -1 turned down, 0 unchanged, +1 turned up
    pub direction: i8,
}

impl KnobEvent {
    pub fn new(value: u8, previous: u8) -> Self {
        let views = ScalarViews::of(value);
        Self {
            value,
            unit_value: views.unit,
            inverse_value: views.inverse,
            inverse_unit_value: views.inverse_unit,
            symmetry_value: views.symmetry,
            symmetry_unit_value: views.symmetry_unit,
            direction: match value.cmp(&previous) {
                std::cmp::Ordering::Greater => 1,
                std::cmp::Ordering::Less => -1,
                std::cmp::Ordering::Equal => 0,
            },
        }
    }
}

pub(crate) fn derive(msg: &MidiMsg, previous: &mut u8) -> (KnobEvent, EventList) {
    let event = KnobEvent::new(msg.data2, *previous);
    *previous = msg.data2;

    let mut events = ScalarViews::of(msg.data2).events();
    events.push(("direction", Payload::Int(i64::from(event.direction))));
    events.push(("all", Payload::Knob(event)));
    (event, events)
}

pub struct Knob {
    core: ControlCore,
    previous: Arc<Mutex<u8>>,
}

impl Knob {
    pub fn new(ctx: &SurfaceContext, name: &str, channel: u8, identifier: u8) -> Self {
        let control = ControlDescriptor::new(name, channel, identifier, status::CONTROL_CHANGE).into_ref();
        let previous = Arc::new(Mutex::new(0u8));

        let on_value = {
            let ctx = ctx.clone();
            let previous = previous.clone();
            let name = name.to_string();
            move |payload: &Payload| {
                let Some(msg) = payload.as_midi() else {
                    return;
                };
                let (_, events) = derive(msg, &mut previous.lock());
                ctx.emit(&name, events);
            }
        };
        let subs = Subscriptions::new().on(control.value_event(), on_value);

        Self {
            core: ControlCore::new(ctx.clone(), control, subs),
            previous,
        }
    }

    pub fn descriptor(&self) -> &ControlRef {
        self.core.control()
    }

    /// Last value seen
    pub fn value(&self) -> u8 {
        *self.previous.lock()
    }

    /// Channel carrying the full `KnobEvent`
    pub fn all_event(&self) -> String {
        event_id(self.name(), "all")
    }
}

impl Control for Knob {
    fn name(&self) -> &str {
        &self.core.control().name
    }

    fn descriptors(&self) -> Vec<ControlRef> {
        vec![self.core.control().clone()]
    }

    fn kind(&self) -> Option<ControlKind> {
        Some(ControlKind::Knob)
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

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(ctx: &SurfaceContext, value: u8) {
        ctx.registry
            .route(&mut MidiMsg::on_channel(status::CONTROL_CHANGE, 1, 16, value));
    }

    #[test]
    fn test_direction_tracks_previous_value() {
        let mut previous = 0;
        let msg = |v| MidiMsg::on_channel(status::CONTROL_CHANGE, 0, 16, v);

        assert_eq!(derive(&msg(10), &mut previous).0.direction, 1);
        assert_eq!(derive(&msg(10), &mut previous).0.direction, 0);
        assert_eq!(derive(&msg(3), &mut previous).0.direction, -1);
        assert_eq!(previous, 3);
    }

    #[test]
    fn test_all_event_carries_full_state() {
        let ctx = SurfaceContext::new();
        let knob = Knob::new(&ctx, "pan", 1, 16);
        knob.activate();

        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            ctx.bus.on(&knob.all_event(), move |p| {
                if let Payload::Knob(k) = p {
                    seen.lock().push(*k);
                }
            });
        }

        turn(&ctx, 96);
        turn(&ctx, 80);

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].value, 96);
        assert_eq!(seen[0].symmetry_value, 32);
        assert_eq!(seen[0].direction, 1);
        assert_eq!(seen[1].direction, -1);
        assert_eq!(knob.value(), 80);
    }
}
