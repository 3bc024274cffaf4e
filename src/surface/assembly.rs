//! Build controls, combos and bindings from config + layout

use crate::bindings::Bindings;
use crate::config::AppConfig;
use crate::controls::{
    Button, ButtonOptions, ButtonShape, Combo, Control, Fader, Jog, JogShape, Knob, PadBank,
    PadOptions, SurfaceContext,
};
use crate::error::{Error, Result};
use crate::host::HostActions;
use crate::layout::{LayoutEntry, LayoutKind, SurfaceLayout};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Named controls in build order (layout, pads, combos)
#[derive(Default)]
pub(crate) struct ControlSet {
    controls: Vec<Box<dyn Control>>,
    index: HashMap<String, usize>,
}

impl ControlSet {
    fn push(&mut self, control: Box<dyn Control>) -> Result<()> {
        let name = control.name().to_string();
        if self.index.contains_key(&name) {
            return Err(Error::DuplicateControl(name));
        }
        self.index.insert(name, self.controls.len());
        self.controls.push(control);
        Ok(())
    }

    fn require(&self, name: &str) -> Result<&dyn Control> {
        self.get(name)
            .ok_or_else(|| Error::UnknownControl(name.to_string()))
    }

    pub(crate) fn get(&self, name: &str) -> Option<&dyn Control> {
        self.index.get(name).map(|i| self.controls[*i].as_ref())
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &dyn Control> {
        self.controls.iter().map(|c| c.as_ref())
    }

    pub(crate) fn len(&self) -> usize {
        self.controls.len()
    }
}

/// Everything built for one configuration. Dropping it detaches bindings,
/// then unregisters controls.
pub(crate) struct Assembly {
    pub(crate) bindings: Bindings,
    pub(crate) controls: ControlSet,
}

impl Assembly {
    pub(crate) fn build(
        ctx: &SurfaceContext,
        config: &AppConfig,
        layout: &SurfaceLayout,
        host: Arc<dyn HostActions>,
    ) -> Result<Self> {
        let mut controls = ControlSet::default();

        for entry in layout.entries() {
            controls.push(build_entry(ctx, config, entry))?;
        }

        for bank in &config.pads {
            let options = PadOptions {
                hold_ticks: bank.hold_ticks,
                short_press_ticks: bank.short_press_ticks,
                playable: bank.playable,
                ..PadOptions::default()
            };
            let pads = PadBank::new(ctx, &bank.name, bank.channel, bank.mapping.clone(), options);
            controls.push(Box::new(pads))?;
        }

        for combo in &config.combos {
            let primary = controls.require(&combo.primary)?;
            controls.require(&combo.modifier)?;
            let built = Combo::new(ctx, &combo.name, primary, &combo.modifier, &combo.event)?;
            controls.push(Box::new(built))?;
        }

        for indicator in &config.indicators {
            controls.require(&indicator.control)?;
        }

        let bindings = Bindings::build(&ctx.bus, host, &config.bindings, &config.indicators);

        for control in controls.iter() {
            control.activate();
        }

        debug!(
            "Assembled {} controls, {} bindings/indicators",
            controls.len(),
            bindings.len()
        );
        Ok(Self { bindings, controls })
    }

    pub(crate) fn deactivate(&self) {
        for control in self.controls.controls.iter().rev() {
            control.deactivate();
        }
    }
}

fn build_entry(ctx: &SurfaceContext, config: &AppConfig, entry: &LayoutEntry) -> Box<dyn Control> {
    let identifier = entry.spec.identifier();
    let button_options = |shape: ButtonShape| ButtonOptions {
        shape,
        hold_ticks: config.runtime.hold_ticks,
        short_press_ticks: config.runtime.short_press_ticks,
        playable: entry.playable,
    };

    let control: Box<dyn Control> = match entry.kind {
        LayoutKind::Button => Box::new(Button::new(
            ctx,
            &entry.name,
            entry.channel,
            identifier,
            button_options(ButtonShape::default()),
        )),
        LayoutKind::CcButton => Box::new(Button::new(
            ctx,
            &entry.name,
            entry.channel,
            identifier,
            button_options(ButtonShape::cc()),
        )),
        LayoutKind::Jog => Box::new(Jog::new(ctx, &entry.name, entry.channel, identifier, JogShape::default())),
        LayoutKind::Fader => Box::new(Fader::new(ctx, &entry.name, entry.channel, identifier)),
        LayoutKind::Knob => Box::new(Knob::new(ctx, &entry.name, entry.channel, identifier)),
    };

    if entry.playable {
        for descriptor in control.descriptors() {
            descriptor.set_playable(true);
        }
    }
    control
}
