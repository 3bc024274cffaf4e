//! Combo (modifier) control
//!
//! While the modifier button's condition holds (its `pressed` event by
//! default), the combo is installed as the registry modifier of the primary
//! control. Messages for the primary then land on `<combo>.value` and the
//! combo re-derives the primary's events under its own name.

use super::{Control, ControlKind, DeriveMemory, SurfaceContext};
use crate::bus::{event_id, Payload, Subscriptions};
use crate::error::{Error, Result};
use crate::registry::{ControlDescriptor, ControlRef};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

pub struct Combo {
    ctx: SurfaceContext,
    control: ControlRef,
    target: ControlRef,
    kind: ControlKind,
    modifier_event: String,
    subs: Subscriptions,
    active: AtomicBool,
}

impl Combo {
    /// Wrap `primary`, switching on `<modifier>.<event>`
    pub fn new(ctx: &SurfaceContext, name: &str, primary: &dyn Control, modifier: &str, event: &str) -> Result<Self> {
        let combo_err = |reason: &str| Error::Combo {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        let kind = primary
            .kind()
            .ok_or_else(|| combo_err(&format!("'{}' cannot be a combo primary", primary.name())))?;
        let target = primary
            .descriptors()
            .into_iter()
            .next()
            .ok_or_else(|| combo_err("primary has no descriptor"))?;

        let control = ControlDescriptor::new(name, target.channel, target.identifier, target.status).into_ref();
        let memory = Arc::new(Mutex::new(DeriveMemory::default()));

        let on_value = {
            let ctx = ctx.clone();
            let name = name.to_string();
            move |payload: &Payload| {
                let Some(msg) = payload.as_midi() else {
                    return;
                };
                let events = kind.derive(msg, &mut memory.lock());
                ctx.emit(&name, events);
            }
        };

        let on_modifier = {
            let registry = ctx.registry.clone();
            let target = target.clone();
            let control = control.clone();
            move |payload: &Payload| {
                if payload.as_bool().unwrap_or(false) {
                    registry.add_modifier(&target, &control);
                } else {
                    registry.remove_modifier(&target, &control);
                }
            }
        };

        let modifier_event = event_id(modifier, event);
        let subs = Subscriptions::new()
            .on(control.value_event(), on_value)
            .on(modifier_event.clone(), on_modifier);

        debug!("Combo '{}' wraps '{}' under {}", name, target.name, modifier_event);

        Ok(Self {
            ctx: ctx.clone(),
            control,
            target,
            kind,
            modifier_event,
            subs,
            active: AtomicBool::new(false),
        })
    }

    pub fn descriptor(&self) -> &ControlRef {
        &self.control
    }

    /// Name of the wrapped control
    pub fn target(&self) -> &str {
        &self.target.name
    }

    /// Channel whose payload installs/removes the combo
    pub fn modifier_event(&self) -> &str {
        &self.modifier_event
    }

    /// True while the combo is the installed modifier of its target
    pub fn is_engaged(&self) -> bool {
        self.ctx
            .registry
            .modifier_for(&self.target.name)
            .is_some_and(|m| Arc::ptr_eq(&m, &self.control))
    }

    fn disengage(&self) {
        self.ctx.registry.remove_modifier(&self.target, &self.control);
    }
}

impl Control for Combo {
    fn name(&self) -> &str {
        &self.control.name
    }

    fn descriptors(&self) -> Vec<ControlRef> {
        vec![self.control.clone()]
    }

    fn kind(&self) -> Option<ControlKind> {
        Some(self.kind)
    }

    fn activate(&self) {
        self.subs.attach(&self.ctx.bus);
        self.active.store(true, Ordering::Relaxed);
    }

    fn deactivate(&self) {
        self.subs.detach(&self.ctx.bus);
        self.disengage();
        self.active.store(false, Ordering::Relaxed);
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }
}

impl Drop for Combo {
    fn drop(&mut self) {
        self.subs.detach(&self.ctx.bus);
        self.disengage();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::{Button, ButtonOptions, ButtonShape, Fader, Jog, JogShape, PadBank, PadOptions};
    use crate::midi::{status, MidiMsg};
    use std::collections::BTreeMap;

    fn shift(ctx: &SurfaceContext, down: bool) {
        let kind = if down { status::NOTE_ON } else { status::NOTE_OFF };
        ctx.registry
            .route(&mut MidiMsg::on_channel(kind, 0, 70, if down { 127 } else { 0 }));
    }

    fn jog_turn(ctx: &SurfaceContext, value: u8) {
        ctx.registry
            .route(&mut MidiMsg::on_channel(status::CONTROL_CHANGE, 0, 60, value));
    }

    fn counter(ctx: &SurfaceContext, channel: &str) -> Arc<Mutex<usize>> {
        let hits = Arc::new(Mutex::new(0));
        let h = hits.clone();
        ctx.bus.on(channel, move |_| *h.lock() += 1);
        hits
    }

    #[test]
    fn test_combo_redirects_while_modifier_pressed() {
        let ctx = SurfaceContext::new();
        let jog = Jog::new(&ctx, "jog", 0, 60, JogShape::default());
        let modifier = Button::new(&ctx, "shift", 0, 70, ButtonOptions::default());
        let combo = Combo::new(&ctx, "shift_jog", &jog, "shift", "pressed").unwrap();
        jog.activate();
        modifier.activate();
        combo.activate();

        let plain = counter(&ctx, "jog.inc");
        let shifted = counter(&ctx, "shift_jog.inc");

        jog_turn(&ctx, 1);
        shift(&ctx, true);
        assert!(combo.is_engaged());
        jog_turn(&ctx, 1);
        jog_turn(&ctx, 1);
        shift(&ctx, false);
        assert!(!combo.is_engaged());
        jog_turn(&ctx, 1);

        assert_eq!(*plain.lock(), 2);
        assert_eq!(*shifted.lock(), 2);
    }

    #[test]
    fn test_combo_over_button_keeps_own_toggle() {
        let ctx = SurfaceContext::new();
        let record = Button::new(&ctx, "record", 0, 95, ButtonOptions::default());
        let modifier = Button::new(&ctx, "shift", 0, 70, ButtonOptions::default());
        let combo = Combo::new(&ctx, "shift_record", &record, "shift", "pressed").unwrap();
        record.activate();
        modifier.activate();
        combo.activate();

        let toggles = Arc::new(Mutex::new(Vec::new()));
        {
            let toggles = toggles.clone();
            ctx.bus
                .on("shift_record.toggled", move |p| toggles.lock().push(p.as_bool()));
        }

        shift(&ctx, true);
        ctx.registry
            .route(&mut MidiMsg::on_channel(status::NOTE_ON, 0, 95, 127));
        ctx.registry
            .route(&mut MidiMsg::on_channel(status::NOTE_OFF, 0, 95, 0));
        ctx.registry
            .route(&mut MidiMsg::on_channel(status::NOTE_ON, 0, 95, 127));

        assert_eq!(*toggles.lock(), vec![Some(true), Some(false)]);
        assert!(!record.is_toggled());
        assert_eq!(combo.kind(), Some(ControlKind::Button(ButtonShape::default())));
    }

    #[test]
    fn test_combo_over_fader() {
        let ctx = SurfaceContext::new();
        let fader = Fader::new(&ctx, "volume", 0, 7);
        let modifier = Button::new(&ctx, "fine", 0, 71, ButtonOptions::default());
        let combo = Combo::new(&ctx, "fine_volume", &fader, "fine", "pressed").unwrap();
        fader.activate();
        modifier.activate();
        combo.activate();

        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            ctx.bus
                .on("fine_volume.symmetry_value", move |p| seen.lock().push(p.as_i64()));
        }

        ctx.registry
            .route(&mut MidiMsg::on_channel(status::NOTE_ON, 0, 71, 127));
        ctx.registry
            .route(&mut MidiMsg::on_channel(status::CONTROL_CHANGE, 0, 7, 127));

        assert_eq!(*seen.lock(), vec![Some(63)]);
    }

    #[test]
    fn test_pad_bank_cannot_be_primary() {
        let ctx = SurfaceContext::new();
        let pads = PadBank::new(&ctx, "pads", 9, BTreeMap::from([(36, 1)]), PadOptions::default());
        let err = Combo::new(&ctx, "shift_pads", &pads, "shift", "pressed").err().unwrap();
        assert!(matches!(err, Error::Combo { .. }));
    }

    #[test]
    fn test_deactivate_removes_installed_modifier() {
        let ctx = SurfaceContext::new();
        let jog = Jog::new(&ctx, "jog", 0, 60, JogShape::default());
        let modifier = Button::new(&ctx, "shift", 0, 70, ButtonOptions::default());
        let combo = Combo::new(&ctx, "shift_jog", &jog, "shift", "pressed").unwrap();
        jog.activate();
        modifier.activate();
        combo.activate();

        shift(&ctx, true);
        combo.deactivate();

        assert!(ctx.registry.modifier_for("jog").is_none());
        let plain = counter(&ctx, "jog.dec");
        jog_turn(&ctx, 127);
        assert_eq!(*plain.lock(), 1);
    }
}
