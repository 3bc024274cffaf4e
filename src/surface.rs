//! Surface runtime - the host-facing entry points
//!
//! A [`Surface`] owns one dispatch context (bus + registry), the state diff
//! engine and everything assembled from the configuration. The host calls
//! it serially: `on_midi_msg` per incoming message, `on_idle` at a roughly
//! constant rate, and the notification callbacks as they happen.

mod assembly;


use crate::bindings::Bindings;
use crate::bus::{EventBus, Payload};
use crate::config::AppConfig;
use crate::controls::{Control, SurfaceContext};
use crate::error::Result;
use crate::host::{HostAccessor, HostActions};
use crate::layout::SurfaceLayout;
use crate::midi::MidiMsg;
use crate::registry::{ControlRegistry, RouteOutcome};
use crate::state::{StateDiffEngine, TickReport};
use assembly::Assembly;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Host notification channels published on the bus
pub mod events {
    pub const ON_INIT: &str = "OnInit";
    pub const ON_REFRESH: &str = "OnRefresh";
    pub const ON_DO_FULL_REFRESH: &str = "OnDoFullRefresh";
    pub const ON_DEINIT: &str = "OnDeInit";
    pub const ON_UPDATE_BEAT_INDICATOR: &str = "OnUpdateBeatIndicator";
    pub const ON_PROJECT_LOAD: &str = "OnProjectLoad";
    pub const ON_UPDATE_METERS: &str = "OnUpdateMeters";
    pub const ON_DIRTY_MIXER_TRACK: &str = "OnDirtyMixerTrack";
    pub const ON_DIRTY_CHANNEL: &str = "OnDirtyChannel";
    pub const BEAT: &str = "beat";
}

/// Dirty flags of a refresh notification, in bit order
pub const REFRESH_FLAGS: &[(u32, &str)] = &[
    (1, "HW_Dirty_Mixer_Sel"),
    (2, "HW_Dirty_Mixer_Display"),
    (4, "HW_Dirty_Mixer_Controls"),
    (16, "HW_Dirty_RemoteLinks"),
    (32, "HW_Dirty_FocusedWindow"),
    (64, "HW_Dirty_Performance"),
    (256, "HW_Dirty_LEDs"),
    (512, "HW_Dirty_RemoteLinkValues"),
    (1024, "HW_Dirty_Patterns"),
    (2048, "HW_Dirty_Tracks"),
    (4096, "HW_Dirty_ControlValues"),
    (8192, "HW_Dirty_Colors"),
    (16384, "HW_Dirty_Names"),
    (32768, "HW_Dirty_ChannelRackGroup"),
    (65536, "HW_ChannelEvent"),
];

/// Names of the dirty flags set in `flags`; unknown bits are ignored
pub fn refresh_flag_names(flags: u32) -> Vec<&'static str> {
    REFRESH_FLAGS
        .iter()
        .filter(|(bit, _)| flags & bit != 0)
        .map(|(_, name)| *name)
        .collect()
}

pub struct Surface {
    ctx: SurfaceContext,
    engine: StateDiffEngine,
    actions: Arc<dyn HostActions>,
    config: AppConfig,
    layout: SurfaceLayout,
    assembly: Option<Assembly>,
}

impl Surface {
    /// Build and activate a surface over `host`
    pub fn new<H>(host: Arc<H>, config: AppConfig, layout: SurfaceLayout) -> Result<Self>
    where
        H: HostAccessor + HostActions + 'static,
    {
        let ctx = SurfaceContext::with_diagnostics(config.runtime.strict_registry);
        let accessor: Arc<dyn HostAccessor> = host.clone();
        let actions: Arc<dyn HostActions> = host;
        let engine = StateDiffEngine::new(ctx.bus.clone(), accessor);

        let assembly = Assembly::build(&ctx, &config, &layout, actions.clone())?;
        info!(
            "🎛️ Surface ready: {} controls, {} identities routed",
            assembly.controls.len(),
            ctx.registry.len()
        );

        let surface = Self {
            ctx,
            engine,
            actions,
            config,
            layout,
            assembly: Some(assembly),
        };
        surface.publish(events::ON_INIT, Payload::Empty);
        Ok(surface)
    }

    pub fn context(&self) -> &SurfaceContext {
        &self.ctx
    }

    pub fn bus(&self) -> &EventBus {
        &self.ctx.bus
    }

    pub fn registry(&self) -> &ControlRegistry {
        &self.ctx.registry
    }

    pub fn engine(&self) -> &StateDiffEngine {
        &self.engine
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn layout(&self) -> &SurfaceLayout {
        &self.layout
    }

    pub fn control(&self, name: &str) -> Option<&dyn Control> {
        self.assembly.as_ref()?.controls.get(name)
    }

    /// Control names in build order
    pub fn control_names(&self) -> Vec<String> {
        self.assembly
            .as_ref()
            .map(|a| a.controls.iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default()
    }

    pub fn bindings(&self) -> Option<&Bindings> {
        self.assembly.as_ref().map(|a| &a.bindings)
    }

    /// True until `on_deinit`
    pub fn is_running(&self) -> bool {
        self.assembly.is_some()
    }

    /// Tear everything down and build again from a new configuration.
    ///
    /// If the new configuration cannot be assembled, the previous one is
    /// rebuilt and the error returned.
    pub fn rebuild(&mut self, config: AppConfig, layout: SurfaceLayout) -> Result<()> {
        self.assembly = None;

        match Assembly::build(&self.ctx, &config, &layout, self.actions.clone()) {
            Ok(assembly) => {
                info!("🔄 Surface rebuilt: {} controls", assembly.controls.len());
                self.assembly = Some(assembly);
                self.config = config;
                self.layout = layout;
                self.engine.reset();
                Ok(())
            },
            Err(e) => {
                warn!("Rebuild failed, restoring previous surface: {}", e);
                let previous = Assembly::build(&self.ctx, &self.config, &self.layout, self.actions.clone())?;
                self.assembly = Some(previous);
                self.engine.reset();
                Err(e)
            },
        }
    }

    /// Route one incoming message
    pub fn on_midi_msg(&self, msg: &mut MidiMsg) -> RouteOutcome {
        let outcome = self.ctx.registry.route(msg);
        match &outcome {
            RouteOutcome::Unrouted => trace!("Unrouted: {}", msg),
            _ => trace!("{} → {:?} (handled: {})", msg, outcome, msg.handled),
        }
        outcome
    }

    /// Idle tick: heartbeat, hold counters, host state polling
    pub fn on_idle(&self) -> TickReport {
        self.engine.tick()
    }

    /// Publish each dirty flag set in `flags`, then the refresh itself
    pub fn on_refresh(&self, flags: u32) {
        let names = refresh_flag_names(flags);
        debug!("Refresh {}: {:?}", flags, names);
        for name in names {
            self.publish(name, Payload::Int(flags as i64));
        }
        self.publish(events::ON_REFRESH, Payload::Int(flags as i64));
    }

    /// Forget every polled value so the next tick republishes all of them
    pub fn on_do_full_refresh(&self) {
        self.engine.reset();
        self.publish(events::ON_DO_FULL_REFRESH, Payload::Empty);
    }

    /// Beat indicator: 0 off, 1 bar, 2 beat
    pub fn on_beat(&self, value: i64) {
        self.publish(events::BEAT, Payload::Int(value));
        self.publish(events::ON_UPDATE_BEAT_INDICATOR, Payload::Int(value));
    }

    pub fn on_project_load(&self, status: i64) {
        self.publish(events::ON_PROJECT_LOAD, Payload::Int(status));
    }

    pub fn on_update_meters(&self) {
        self.publish(events::ON_UPDATE_METERS, Payload::Empty);
    }

    pub fn on_dirty_mixer_track(&self, index: i64) {
        self.publish(events::ON_DIRTY_MIXER_TRACK, Payload::Int(index));
    }

    pub fn on_dirty_channel(&self, index: i64, flag: i64) {
        self.publish(
            events::ON_DIRTY_CHANNEL,
            Payload::Value(json!({ "index": index, "flag": flag })),
        );
    }

    /// Deactivate everything, turn lit indicators off and drop the assembly
    pub fn on_deinit(&mut self) {
        self.publish(events::ON_DEINIT, Payload::Empty);
        if let Some(assembly) = self.assembly.take() {
            assembly.deactivate();
            assembly.bindings.blackout(self.actions.as_ref());
            info!("Surface shut down ({} controls released)", assembly.controls.len());
        }
    }

    fn publish(&self, channel: &str, payload: Payload) {
        self.ctx.bus.publish(channel, &payload);
    }
}
