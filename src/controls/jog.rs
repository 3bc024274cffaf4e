//! Jog wheel / relative encoder façade
//!
//! Events: `inc`, `dec`, `jogged` (true when turned up, false when down).

use super::{Control, ControlCore, ControlKind, EventList, SurfaceContext};
use crate::bus::{Payload, Subscriptions};
use crate::midi::{status, MidiMsg};
use crate::registry::{ControlDescriptor, ControlRef};

/// Wire values of a relative encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JogShape {
    pub status: u8,
    pub inc_value: u8,
    pub dec_value: u8,
}

impl Default for JogShape {
    fn default() -> Self {
        Self {
            status: status::CONTROL_CHANGE,
            inc_value: 1,
            dec_value: 127,
        }
    }
}

pub(crate) fn derive(shape: &JogShape, msg: &MidiMsg) -> EventList {
    if msg.kind() != shape.status {
        return Vec::new();
    }
    if msg.data2 == shape.inc_value {
        vec![("inc", Payload::Bool(true)), ("jogged", Payload::Bool(true))]
    } else if msg.data2 == shape.dec_value {
        vec![("dec", Payload::Bool(true)), ("jogged", Payload::Bool(false))]
    } else {
        Vec::new()
    }
}

pub struct Jog {
    core: ControlCore,
    shape: JogShape,
}

impl Jog {
    pub fn new(ctx: &SurfaceContext, name: &str, channel: u8, identifier: u8, shape: JogShape) -> Self {
        let control = ControlDescriptor::new(name, channel, identifier, shape.status).into_ref();

        let on_value = {
            let ctx = ctx.clone();
            let name = name.to_string();
            move |payload: &Payload| {
                if let Some(msg) = payload.as_midi() {
                    ctx.emit(&name, derive(&shape, msg));
                }
            }
        };
        let subs = Subscriptions::new().on(control.value_event(), on_value);

        Self {
            core: ControlCore::new(ctx.clone(), control, subs),
            shape,
        }
    }

    pub fn descriptor(&self) -> &ControlRef {
        self.core.control()
    }
}

impl Control for Jog {
    fn name(&self) -> &str {
        &self.core.control().name
    }

    fn descriptors(&self) -> Vec<ControlRef> {
        vec![self.core.control().clone()]
    }

    fn kind(&self) -> Option<ControlKind> {
        Some(ControlKind::Jog(self.shape))
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
