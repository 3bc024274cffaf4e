//! Console host - an in-memory DAW that logs every mutation
//!
//! Stands in for the real host when running from the command line or in
//! tests: queries read a shared [`ConsoleState`], actions change it and log
//! what they did.

use super::{param_bool, param_f64, param_i64, param_str, HostAccessor, HostActions, HostApi, Accessor};
use crate::error::{Error, Result};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

const STEPS: usize = 16;

/// Everything the console host knows
#[derive(Debug, Clone, Serialize)]
pub struct ConsoleState {
    pub playing: bool,
    pub recording: bool,
    /// 0 = pattern, 1 = song
    pub loop_mode: i64,
    pub song_pos: f64,
    pub tempo: f64,
    pub loop_rec: bool,
    pub metronome: bool,
    pub selected_channel: i64,
    pub channel_names: Vec<String>,
    /// Step grid per (pattern, channel)
    pub grid: BTreeMap<String, Vec<bool>>,
    pub selected_track: i64,
    pub track_volumes: Vec<f64>,
    pub pattern_number: i64,
    pub pattern_count: i64,
    pub pattern_length: i64,
    pub focused_window: i64,
    /// Feedback lights set through `device.setLed`
    pub leds: BTreeMap<String, bool>,
}

impl Default for ConsoleState {
    fn default() -> Self {
        Self {
            playing: false,
            recording: false,
            loop_mode: 0,
            song_pos: 0.0,
            tempo: 120.0,
            loop_rec: false,
            metronome: false,
            selected_channel: 0,
            channel_names: ["Kick", "Clap", "Hat", "Snare"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            grid: BTreeMap::new(),
            selected_track: 0,
            track_volumes: vec![0.8; 9],
            pattern_number: 1,
            pattern_count: 1,
            pattern_length: STEPS as i64,
            focused_window: 0,
            leds: BTreeMap::new(),
        }
    }
}

impl ConsoleState {
    fn grid_key(pattern: i64, channel: i64) -> String {
        format!("{}:{}", pattern, channel)
    }
}

/// Simulated DAW exposed as a [`HostApi`]
#[derive(Clone)]
pub struct ConsoleHost {
    state: Arc<RwLock<ConsoleState>>,
    executions: Arc<AtomicU64>,
    api: HostApi,
}

impl ConsoleHost {
    pub fn new() -> Self {
        let state = Arc::new(RwLock::new(ConsoleState::default()));
        let executions = Arc::new(AtomicU64::new(0));
        let api = build_api(&state);
        info!("🔌 Console host ready ({} accessors)", api.accessor_paths().len());
        Self {
            state,
            executions,
            api,
        }
    }

    pub fn api(&self) -> &HostApi {
        &self.api
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> ConsoleState {
        self.state.read().clone()
    }

    /// Mutate state directly (simulates changes made in the host's own UI)
    pub fn update<F: FnOnce(&mut ConsoleState)>(&self, f: F) {
        f(&mut self.state.write());
    }

    pub fn execution_count(&self) -> u64 {
        self.executions.load(Ordering::Relaxed)
    }

    pub fn led(&self, control: &str) -> Option<bool> {
        self.state.read().leds.get(control).copied()
    }
}

impl Default for ConsoleHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostAccessor for ConsoleHost {
    fn resolve(&self, module: &str, accessor: &str) -> Option<Accessor> {
        self.api.resolve(module, accessor)
    }
}

impl HostActions for ConsoleHost {
    fn execute(&self, action: &str, params: &Value) -> Result<Value> {
        let exec_num = self.executions.fetch_add(1, Ordering::Relaxed) + 1;
        let result = self.api.execute(action, params)?;
        info!("🎮 host → {} ({}) [exec #{}]", action, params, exec_num);
        debug!(action = action, params = ?params, result = ?result, "ConsoleHost execution");
        Ok(result)
    }
}

fn build_api(state: &Arc<RwLock<ConsoleState>>) -> HostApi {
    // Accessors are zero-argument reads of one field
    macro_rules! query {
        ($api:expr, $module:literal, $name:literal, |$s:ident| $body:expr) => {{
            let state = state.clone();
            $api.accessor($module, $name, move || {
                let $s = state.read();
                json!($body)
            })
        }};
    }
    macro_rules! act {
        ($api:expr, $module:literal, $name:literal, |$s:ident, $p:ident| $body:expr) => {{
            let state = state.clone();
            $api.action($module, $name, move |$p: &Value| {
                let mut $s = state.write();
                $body
            })
        }};
    }

    let api = HostApi::new();

    // transport
    let api = query!(api, "transport", "isPlaying", |s| s.playing);
    let api = query!(api, "transport", "isRecording", |s| s.recording);
    let api = query!(api, "transport", "getLoopMode", |s| s.loop_mode);
    let api = query!(api, "transport", "getSongPos", |s| s.song_pos);
    let api = query!(api, "transport", "getTempo", |s| s.tempo);
    let api = act!(api, "transport", "start", |s, _p| {
        s.playing = !s.playing;
        Ok(json!(s.playing))
    });
    let api = act!(api, "transport", "stop", |s, _p| {
        s.playing = false;
        s.song_pos = 0.0;
        Ok(Value::Null)
    });
    let api = act!(api, "transport", "record", |s, _p| {
        s.recording = !s.recording;
        Ok(json!(s.recording))
    });
    let api = act!(api, "transport", "setLoopMode", |s, _p| {
        s.loop_mode = 1 - s.loop_mode;
        Ok(json!(s.loop_mode))
    });
    let api = act!(api, "transport", "setSongPos", |s, p| {
        s.song_pos = param_f64("transport.setSongPos", p, 0)?.clamp(0.0, 1.0);
        Ok(json!(s.song_pos))
    });

    // channels
    let api = query!(api, "channels", "selectedChannel", |s| s.selected_channel);
    let api = query!(api, "channels", "channelCount", |s| s.channel_names.len());
    let api = query!(api, "channels", "selectedChannelName", |s| s
        .channel_names
        .get(s.selected_channel as usize)
        .cloned()
        .unwrap_or_default());
    let api = act!(api, "channels", "selectOneChannel", |s, p| {
        let index = param_i64("channels.selectOneChannel", p, 0)?;
        if index < 0 || index as usize >= s.channel_names.len() {
            return Err(Error::InvalidParams {
                action: "channels.selectOneChannel".into(),
                reason: format!("channel {} out of range", index),
            });
        }
        s.selected_channel = index;
        Ok(json!(index))
    });
    let api = act!(api, "channels", "selectNext", |s, _p| {
        let count = s.channel_names.len() as i64;
        s.selected_channel = (s.selected_channel + 1).rem_euclid(count.max(1));
        Ok(json!(s.selected_channel))
    });
    let api = act!(api, "channels", "selectPrevious", |s, _p| {
        let count = s.channel_names.len() as i64;
        s.selected_channel = (s.selected_channel - 1).rem_euclid(count.max(1));
        Ok(json!(s.selected_channel))
    });
    let api = act!(api, "channels", "setGridBit", |s, p| {
        let action = "channels.setGridBit";
        let step = param_i64(action, p, 0)?;
        let on = param_bool(action, p, 1)?;
        if !(0..STEPS as i64).contains(&step) {
            return Err(Error::InvalidParams {
                action: action.into(),
                reason: format!("step {} out of range", step),
            });
        }
        let key = ConsoleState::grid_key(s.pattern_number, s.selected_channel);
        let row = s.grid.entry(key).or_insert_with(|| vec![false; STEPS]);
        row[step as usize] = on;
        Ok(json!(on))
    });

    // mixer
    let api = query!(api, "mixer", "trackNumber", |s| s.selected_track);
    let api = query!(api, "mixer", "trackCount", |s| s.track_volumes.len());
    let api = query!(api, "mixer", "getTrackVolume", |s| s
        .track_volumes
        .get(s.selected_track as usize)
        .copied()
        .unwrap_or_default());
    let api = act!(api, "mixer", "setTrackNumber", |s, p| {
        let track = param_i64("mixer.setTrackNumber", p, 0)?;
        s.selected_track = track.clamp(0, s.track_volumes.len() as i64 - 1);
        Ok(json!(s.selected_track))
    });
    let api = act!(api, "mixer", "setTrackVolume", |s, p| {
        let volume = param_f64("mixer.setTrackVolume", p, 0)?.clamp(0.0, 1.0);
        let track = s.selected_track as usize;
        if let Some(slot) = s.track_volumes.get_mut(track) {
            *slot = volume;
        }
        Ok(json!(volume))
    });

    // patterns
    let api = query!(api, "patterns", "patternNumber", |s| s.pattern_number);
    let api = query!(api, "patterns", "patternCount", |s| s.pattern_count);
    let api = query!(api, "patterns", "getPatternLength", |s| s.pattern_length);
    let api = act!(api, "patterns", "jumpToPattern", |s, p| {
        let pattern = param_i64("patterns.jumpToPattern", p, 0)?.max(1);
        s.pattern_number = pattern;
        s.pattern_count = s.pattern_count.max(pattern);
        Ok(json!(pattern))
    });

    // ui
    let api = query!(api, "ui", "getFocusedFormID", |s| s.focused_window);
    let api = query!(api, "ui", "isLoopRecEnabled", |s| s.loop_rec);
    let api = query!(api, "ui", "isMetronomeEnabled", |s| s.metronome);
    let api = act!(api, "ui", "setFocused", |s, p| {
        s.focused_window = param_i64("ui.setFocused", p, 0)?;
        Ok(json!(s.focused_window))
    });
    let api = act!(api, "ui", "toggleLoopRec", |s, _p| {
        s.loop_rec = !s.loop_rec;
        Ok(json!(s.loop_rec))
    });
    let api = act!(api, "ui", "toggleMetronome", |s, _p| {
        s.metronome = !s.metronome;
        Ok(json!(s.metronome))
    });

    // device
    act!(api, "device", "setLed", |s, p| {
        let control = param_str("device.setLed", p, 0)?.to_string();
        let on = param_bool("device.setLed", p, 1)?;
        s.leds.insert(control, on);
        Ok(json!(on))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_roundtrip() {
        let host = ConsoleHost::new();
        let is_playing = host.resolve("transport", "isPlaying").unwrap();
        assert_eq!(is_playing(), json!(false));

        host.execute("transport.start", &Value::Null).unwrap();
        assert_eq!(is_playing(), json!(true));

        host.execute("transport.stop", &Value::Null).unwrap();
        assert_eq!(is_playing(), json!(false));
        assert_eq!(host.execution_count(), 2);
    }

    #[test]
    fn test_channel_selection_wraps() {
        let host = ConsoleHost::new();
        host.execute("channels.selectPrevious", &Value::Null).unwrap();
        assert_eq!(host.snapshot().selected_channel, 3);
        host.execute("channels.selectNext", &Value::Null).unwrap();
        assert_eq!(host.snapshot().selected_channel, 0);

        assert!(host.execute("channels.selectOneChannel", &json!([9])).is_err());
        host.execute("channels.selectOneChannel", &json!(2)).unwrap();
        let name = host.resolve("channels", "selectedChannelName").unwrap();
        assert_eq!(name(), json!("Hat"));
    }

    #[test]
    fn test_grid_and_leds() {
        let host = ConsoleHost::new();
        host.execute("channels.setGridBit", &json!([4, true])).unwrap();
        assert_eq!(host.snapshot().grid["1:0"][4], true);
        assert!(host.execute("channels.setGridBit", &json!([16, true])).is_err());

        host.execute("device.setLed", &json!(["play", true])).unwrap();
        assert_eq!(host.led("play"), Some(true));
        assert_eq!(host.led("stop"), None);
    }

    #[test]
    fn test_update_is_visible_to_accessors() {
        let host = ConsoleHost::new();
        host.update(|s| s.tempo = 98.5);
        assert_eq!(host.read(&"transport.getTempo".parse().unwrap()), Some(json!(98.5)));
    }
}
