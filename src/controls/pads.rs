//! Pad bank façade
//!
//! N pads share one bank: each pad gets its own descriptor named
//! `<bank>_<number>_<id>`, but every routed message is republished under the
//! bank name with the pad number attached.
//!
//! Events: `value`, `pad`, `toggled`, `pressed`, `released`, `short_press`,
//! `hold`, `multi_hold`.

use super::hold::HoldTracker;
use super::{Control, ControlKind, SurfaceContext};
use crate::bus::{event_id, Handler, Payload, Subscriptions};
use crate::midi::{status, MidiMsg};
use crate::registry::{ControlDescriptor, ControlRef, FeedbackHook, TranslationHook};
use crate::state::IDLE_EVENT;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One pad's share of a bank event
#[derive(Debug, Clone, PartialEq)]
pub struct PadEvent {
    pub number: u8,
    pub state: bool,
    /// Message that caused the event (absent for tick-driven holds)
    pub msg: Option<MidiMsg>,
}

#[derive(Debug, Clone, Copy)]
pub struct PadOptions {
    pub on_status: u8,
    pub off_status: u8,
    pub hold_ticks: u32,
    pub short_press_ticks: u32,
    pub playable: bool,
}

impl Default for PadOptions {
    fn default() -> Self {
        Self {
            on_status: status::NOTE_ON,
            off_status: status::NOTE_OFF,
            hold_ticks: 10,
            short_press_ticks: 2,
            playable: true,
        }
    }
}

#[derive(Debug, Default)]
struct BankState {
    pads: BTreeMap<u8, HoldTracker>,
    multi_hold: BTreeMap<u8, bool>,
}

pub struct PadBank {
    ctx: SurfaceContext,
    name: String,
    channel: u8,
    /// Note/identifier → pad number
    mapping: BTreeMap<u8, u8>,
    pads: Vec<ControlRef>,
    state: Arc<Mutex<BankState>>,
    subs: Subscriptions,
    active: AtomicBool,
}

impl PadBank {
    pub fn new(ctx: &SurfaceContext, name: &str, channel: u8, mapping: BTreeMap<u8, u8>, options: PadOptions) -> Self {
        let channel = channel & 0x0F;
        let pads: Vec<ControlRef> = mapping
            .iter()
            .map(|(id, number)| {
                ControlDescriptor::new(format!("{}_{}_{}", name, number, id), channel, *id, options.on_status)
                    .playable(options.playable)
                    .into_ref()
            })
            .collect();
        let state = Arc::new(Mutex::new(BankState {
            pads: mapping.values().map(|n| (*n, HoldTracker::new())).collect(),
            multi_hold: BTreeMap::new(),
        }));

        let on_value = {
            let ctx = ctx.clone();
            let state = state.clone();
            let mapping = mapping.clone();
            let name = name.to_string();
            Handler::new(move |payload| {
                let Some(msg) = payload.as_midi().copied() else {
                    return;
                };
                let Some(&number) = mapping.get(&msg.data1) else {
                    return;
                };
                let pad = |state: bool| {
                    Payload::Pad(PadEvent {
                        number,
                        state,
                        msg: Some(msg),
                    })
                };

                let on = msg.status == (options.on_status | channel) && !msg.is_note_off();
                let off = msg.status == (options.off_status | channel) || msg.is_note_off();

                let mut events = vec![("value", Payload::Midi(msg)), ("pad", pad(on))];
                {
                    let mut st = state.lock();
                    if on {
                        if let Some(tracker) = st.pads.get_mut(&number) {
                            tracker.press();
                        }
                        events.push(("toggled", pad(true)));
                        events.push(("pressed", pad(true)));
                    } else if off {
                        let release = st
                            .pads
                            .get_mut(&number)
                            .map(|tracker| tracker.release(options.short_press_ticks));
                        events.push(("pressed", pad(false)));
                        if release.is_some_and(|r| r.short_press) {
                            events.push(("short_press", pad(true)));
                        }
                        events.push(("released", pad(true)));
                        if release.is_some_and(|r| r.was_held) {
                            st.multi_hold.insert(number, false);
                            events.push(("hold", pad(false)));
                            events.push(("multi_hold", Payload::PadHolds(st.multi_hold.clone())));
                        }
                    }
                }
                ctx.emit(&name, events);
            })
        };

        let on_idle = {
            let ctx = ctx.clone();
            let state = state.clone();
            let name = name.to_string();
            move |_: &Payload| {
                let events = {
                    let mut st = state.lock();
                    let fired: Vec<u8> = st
                        .pads
                        .iter_mut()
                        .filter_map(|(number, tracker)| tracker.tick(options.hold_ticks).then_some(*number))
                        .collect();
                    let mut events = Vec::new();
                    for number in fired {
                        st.multi_hold.insert(number, true);
                        events.push((
                            "hold",
                            Payload::Pad(PadEvent {
                                number,
                                state: true,
                                msg: None,
                            }),
                        ));
                        events.push(("multi_hold", Payload::PadHolds(st.multi_hold.clone())));
                    }
                    events
                };
                ctx.emit(&name, events);
            }
        };

        let mut subs = Subscriptions::new().on(IDLE_EVENT, on_idle);
        for pad in &pads {
            subs = subs.with(pad.value_event(), on_value.clone());
        }
        for pad in &pads {
            ctx.registry.register(pad);
        }

        Self {
            ctx: ctx.clone(),
            name: name.to_string(),
            channel,
            mapping,
            pads,
            state,
            subs,
            active: AtomicBool::new(false),
        }
    }

    /// Number of pads in the bank
    pub fn size(&self) -> usize {
        self.pads.len()
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn pad_number(&self, identifier: u8) -> Option<u8> {
        self.mapping.get(&identifier).copied()
    }

    pub fn pads(&self) -> &[ControlRef] {
        &self.pads
    }

    pub fn is_pad_pressed(&self, number: u8) -> bool {
        self.state
            .lock()
            .pads
            .get(&number)
            .is_some_and(HoldTracker::is_pressed)
    }

    pub fn set_feedback(&self, hook: Option<FeedbackHook>) {
        for pad in &self.pads {
            pad.set_feedback(hook.clone());
        }
    }

    pub fn set_translation(&self, hook: Option<TranslationHook>) {
        for pad in &self.pads {
            pad.set_translation(hook.clone());
        }
    }

    pub fn set_playable(&self, playable: bool) {
        for pad in &self.pads {
            pad.set_playable(playable);
        }
    }

    pub fn event(&self, event: &str) -> String {
        event_id(&self.name, event)
    }
}

impl Control for PadBank {
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptors(&self) -> Vec<ControlRef> {
        self.pads.clone()
    }

    fn kind(&self) -> Option<ControlKind> {
        None
    }

    fn activate(&self) {
        self.subs.attach(&self.ctx.bus);
        for pad in &self.pads {
            self.ctx.registry.activate(pad);
        }
        self.active.store(true, Ordering::Relaxed);
    }

    fn deactivate(&self) {
        self.subs.detach(&self.ctx.bus);
        for pad in &self.pads {
            self.ctx.registry.deactivate(pad);
        }
        self.active.store(false, Ordering::Relaxed);
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }
}

impl Drop for PadBank {
    fn drop(&mut self) {
        self.subs.detach(&self.ctx.bus);
        for pad in &self.pads {
            self.ctx.registry.unregister(pad);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank(ctx: &SurfaceContext) -> PadBank {
        let mapping = BTreeMap::from([(36, 1), (37, 2), (38, 3), (39, 4)]);
        let options = PadOptions {
            hold_ticks: 3,
            ..Default::default()
        };
        PadBank::new(ctx, "pads", 9, mapping, options)
    }

    fn hit(ctx: &SurfaceContext, id: u8, velocity: u8) -> MidiMsg {
        let mut msg = MidiMsg::on_channel(status::NOTE_ON, 9, id, velocity);
        ctx.registry.route(&mut msg);
        msg
    }

    fn lift(ctx: &SurfaceContext, id: u8) {
        ctx.registry
            .route(&mut MidiMsg::on_channel(status::NOTE_OFF, 9, id, 0));
    }

    fn record(ctx: &SurfaceContext, events: &[&str]) -> Arc<Mutex<Vec<(String, Payload)>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        for event in events {
            let log = log.clone();
            let tag = event.to_string();
            ctx.bus
                .on(&event_id("pads", event), move |p| log.lock().push((tag.clone(), p.clone())));
        }
        log
    }

    #[test]
    fn test_pad_names_and_size() {
        let ctx = SurfaceContext::new();
        let pads = bank(&ctx);
        assert_eq!(pads.size(), 4);
        assert_eq!(pads.pads()[0].name, "pads_1_36");
        assert_eq!(pads.pad_number(39), Some(4));
        assert!(pads.pads().iter().all(|p| p.is_playable()));
    }

    #[test]
    fn test_press_and_release_carry_pad_number() {
        let ctx = SurfaceContext::new();
        let pads = bank(&ctx);
        pads.activate();
        let log = record(&ctx, &["pressed", "released", "short_press"]);

        let msg = hit(&ctx, 37, 100);
        assert!(!msg.handled);
        assert!(pads.is_pad_pressed(2));
        lift(&ctx, 37);

        let log = log.lock();
        assert_eq!(log.len(), 4);
        assert!(matches!(&log[0], (e, Payload::Pad(PadEvent { number: 2, state: true, .. })) if e == "pressed"));
        assert!(matches!(&log[1], (e, Payload::Pad(PadEvent { number: 2, state: false, .. })) if e == "pressed"));
        assert_eq!(log[2].0, "short_press");
        assert_eq!(log[3].0, "released");
    }

    #[test]
    fn test_multi_hold_tracks_each_pad() {
        let ctx = SurfaceContext::new();
        let pads = bank(&ctx);
        pads.activate();
        let holds = Arc::new(Mutex::new(Vec::new()));
        {
            let holds = holds.clone();
            ctx.bus.on("pads.multi_hold", move |p| {
                if let Payload::PadHolds(map) = p {
                    holds.lock().push(map.clone());
                }
            });
        }

        hit(&ctx, 36, 100);
        hit(&ctx, 38, 100);
        for _ in 0..4 {
            ctx.bus.publish(IDLE_EVENT, &Payload::Empty);
        }
        lift(&ctx, 36);

        let holds = holds.lock();
        assert_eq!(holds.len(), 3);
        assert_eq!(holds[1], BTreeMap::from([(1, true), (3, true)]));
        assert_eq!(holds[2], BTreeMap::from([(1, false), (3, true)]));
    }

    #[test]
    fn test_held_pad_release_can_still_short_press() {
        let ctx = SurfaceContext::new();
        let options = PadOptions {
            hold_ticks: 2,
            short_press_ticks: 10,
            ..Default::default()
        };
        let pads = PadBank::new(&ctx, "pads", 9, BTreeMap::from([(36, 1)]), options);
        pads.activate();
        let log = record(&ctx, &["short_press", "hold"]);

        hit(&ctx, 36, 100);
        for _ in 0..5 {
            ctx.bus.publish(IDLE_EVENT, &Payload::Empty);
        }
        lift(&ctx, 36);

        let events: Vec<(String, bool)> = log
            .lock()
            .iter()
            .filter_map(|(e, p)| match p {
                Payload::Pad(PadEvent { number: 1, state, .. }) => Some((e.clone(), *state)),
                _ => None,
            })
            .collect();
        assert_eq!(
            events,
            vec![
                ("hold".to_string(), true),
                ("short_press".to_string(), true),
                ("hold".to_string(), false),
            ]
        );
    }

    #[test]
    fn test_set_playable_and_hooks_apply_to_all_pads() {
        let ctx = SurfaceContext::new();
        let pads = bank(&ctx);
        pads.activate();
        pads.set_playable(false);

        let lit = Arc::new(Mutex::new(Vec::new()));
        {
            let lit = lit.clone();
            pads.set_feedback(Some(Arc::new(move |_: &MidiMsg, control: &ControlDescriptor| {
                lit.lock().push(control.name.clone());
            })));
        }

        assert!(hit(&ctx, 39, 90).handled);
        hit(&ctx, 36, 90);
        assert_eq!(*lit.lock(), vec!["pads_4_39", "pads_1_36"]);
    }

    #[test]
    fn test_unmapped_identifier_is_ignored() {
        let ctx = SurfaceContext::new();
        let pads = bank(&ctx);
        pads.activate();
        let log = record(&ctx, &["value"]);

        hit(&ctx, 50, 100);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_drop_releases_identities() {
        let ctx = SurfaceContext::new();
        let pads = bank(&ctx);
        pads.activate();
        drop(pads);
        assert!(ctx.registry.is_empty());
        assert!(ctx.bus.channels().is_empty());
    }
}
