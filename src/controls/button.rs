//! Button façade
//!
//! Events: `toggled`, `pressed`, `released`, `short_press`, `hold`.

use super::hold::HoldTracker;
use super::{Control, ControlCore, ControlKind, EventList, SurfaceContext};
use crate::bus::{event_id, Payload, Subscriptions};
use crate::midi::{status, MidiMsg};
use crate::registry::{ControlDescriptor, ControlRef};
use crate::state::IDLE_EVENT;
use parking_lot::Mutex;
use std::sync::Arc;

/// Direction of a button message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Press,
    Release,
}

/// How a button's on and off messages look on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonShape {
    pub on_status: u8,
    pub off_status: u8,
    /// data2 value meaning "released" when sent with the on status
    pub off_value: u8,
}

impl Default for ButtonShape {
    fn default() -> Self {
        Self {
            on_status: status::NOTE_ON,
            off_status: status::NOTE_OFF,
            off_value: 0,
        }
    }
}

impl ButtonShape {
    /// Button sending CC 127 / CC 0
    pub fn cc() -> Self {
        Self {
            on_status: status::CONTROL_CHANGE,
            off_status: status::CONTROL_CHANGE,
            off_value: 0,
        }
    }

    pub fn edge(&self, msg: &MidiMsg) -> Option<Edge> {
        let kind = msg.kind();
        if kind == self.on_status {
            if msg.data2 == self.off_value {
                Some(Edge::Release)
            } else {
                Some(Edge::Press)
            }
        } else if kind == self.off_status {
            Some(Edge::Release)
        } else {
            None
        }
    }
}

/// Stateless part of the button derivation (toggle memory aside)
pub(crate) fn derive(shape: &ButtonShape, msg: &MidiMsg, toggled: &mut bool) -> (Option<Edge>, EventList) {
    match shape.edge(msg) {
        Some(Edge::Press) => {
            *toggled = !*toggled;
            (
                Some(Edge::Press),
                vec![
                    ("toggled", Payload::Bool(*toggled)),
                    ("pressed", Payload::Bool(true)),
                ],
            )
        },
        Some(Edge::Release) => (
            Some(Edge::Release),
            vec![
                ("pressed", Payload::Bool(false)),
                ("released", Payload::Bool(true)),
            ],
        ),
        None => (None, Vec::new()),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ButtonOptions {
    pub shape: ButtonShape,
    /// Idle ticks before a press becomes a hold
    pub hold_ticks: u32,
    /// Releases before this many ticks also fire `short_press`
    pub short_press_ticks: u32,
    pub playable: bool,
}

impl Default for ButtonOptions {
    fn default() -> Self {
        Self {
            shape: ButtonShape::default(),
            hold_ticks: 10,
            short_press_ticks: 2,
            playable: false,
        }
    }
}

#[derive(Debug, Default)]
struct ButtonState {
    toggled: bool,
    hold: HoldTracker,
}

pub struct Button {
    core: ControlCore,
    options: ButtonOptions,
    state: Arc<Mutex<ButtonState>>,
}

impl Button {
    pub fn new(ctx: &SurfaceContext, name: &str, channel: u8, identifier: u8, options: ButtonOptions) -> Self {
        let control = ControlDescriptor::new(name, channel, identifier, options.shape.on_status)
            .playable(options.playable)
            .into_ref();
        let state = Arc::new(Mutex::new(ButtonState::default()));

        let on_value = {
            let ctx = ctx.clone();
            let state = state.clone();
            let name = name.to_string();
            move |payload: &Payload| {
                let Some(msg) = payload.as_midi() else {
                    return;
                };
                let events = {
                    let mut st = state.lock();
                    let (edge, mut events) = derive(&options.shape, msg, &mut st.toggled);
                    match edge {
                        Some(Edge::Press) => st.hold.press(),
                        Some(Edge::Release) => {
                            let release = st.hold.release(options.short_press_ticks);
                            if release.short_press {
                                events.push(("short_press", Payload::Bool(true)));
                            }
                            if release.was_held {
                                events.push(("hold", Payload::Bool(false)));
                            }
                        },
                        None => {},
                    }
                    events
                };
                ctx.emit(&name, events);
            }
        };

        let on_idle = {
            let bus = ctx.bus.clone();
            let state = state.clone();
            let hold_event = event_id(name, "hold");
            move |_: &Payload| {
                let fired = state.lock().hold.tick(options.hold_ticks);
                if fired {
                    bus.publish(&hold_event, &Payload::Bool(true));
                }
            }
        };

        let subs = Subscriptions::new()
            .on(control.value_event(), on_value)
            .on(IDLE_EVENT, on_idle);

        Self {
            core: ControlCore::new(ctx.clone(), control, subs),
            options,
            state,
        }
    }

    pub fn descriptor(&self) -> &ControlRef {
        self.core.control()
    }

    pub fn options(&self) -> &ButtonOptions {
        &self.options
    }

    pub fn is_toggled(&self) -> bool {
        self.state.lock().toggled
    }

    pub fn is_pressed(&self) -> bool {
        self.state.lock().hold.is_pressed()
    }

    pub fn is_held(&self) -> bool {
        self.state.lock().hold.is_held()
    }
}

impl Control for Button {
    fn name(&self) -> &str {
        &self.core.control().name
    }

    fn descriptors(&self) -> Vec<ControlRef> {
        vec![self.core.control().clone()]
    }

    fn kind(&self) -> Option<ControlKind> {
        Some(ControlKind::Button(self.options.shape))
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
