//! Configuration management for the surface runtime
//!
//! Handles loading, parsing, and hot-reloading of the YAML configuration file.

pub mod watcher;

use crate::host::DottedPath;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tokio::fs;

pub use watcher::ConfigWatcher;

/// Default configuration file name
pub const DEFAULT_CONFIG_PATH: &str = "surface.yaml";

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub midi: MidiConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// CSV layout path; the embedded layout is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<String>,
    #[serde(default)]
    pub pads: Vec<PadBankConfig>,
    #[serde(default)]
    pub combos: Vec<ComboConfig>,
    #[serde(default)]
    pub bindings: Vec<BindingConfig>,
    #[serde(default)]
    pub indicators: Vec<IndicatorConfig>,
}

/// MIDI port configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MidiConfig {
    /// Port index or case-insensitive name fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_port: Option<String>,
    #[serde(default = "default_client_name")]
    pub client_name: String,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            input_port: None,
            client_name: default_client_name(),
        }
    }
}

/// Dispatch loop settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_idle_interval")]
    pub idle_interval_ms: u64,
    /// Log suspicious registry usage (duplicate registration, stale removal)
    #[serde(default)]
    pub strict_registry: bool,
    /// Idle ticks before a held button fires `hold`
    #[serde(default = "default_hold_ticks")]
    pub hold_ticks: u32,
    #[serde(default = "default_short_press_ticks")]
    pub short_press_ticks: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            idle_interval_ms: default_idle_interval(),
            strict_registry: false,
            hold_ticks: default_hold_ticks(),
            short_press_ticks: default_short_press_ticks(),
        }
    }
}

/// Pad bank
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PadBankConfig {
    pub name: String,
    pub channel: u8,
    /// Note number → pad number
    pub mapping: BTreeMap<u8, u8>,
    #[serde(default = "default_hold_ticks")]
    pub hold_ticks: u32,
    #[serde(default = "default_short_press_ticks")]
    pub short_press_ticks: u32,
    #[serde(default = "default_true")]
    pub playable: bool,
}

/// Combo (modifier) control
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ComboConfig {
    pub name: String,
    /// Wrapped control
    pub primary: String,
    /// Button whose event engages the combo
    pub modifier: String,
    #[serde(default = "default_modifier_event")]
    pub event: String,
}

/// Bus channel → host action
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BindingConfig {
    pub event: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
    /// Only fire when the payload equals this value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Value>,
}

/// Control light driven by polled host state
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndicatorConfig {
    pub signal: String,
    pub control: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equals: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truthy: Option<bool>,
    #[serde(rename = "in")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_array: Option<Vec<Value>>,
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config = Self::from_yaml(&contents)
            .with_context(|| format!("Invalid config file: {}", path))?;

        Ok(config)
    }

    /// Parse and validate YAML text
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: &str) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency.
    ///
    /// Control names referenced by combos and indicators are checked later,
    /// against the layout, when the surface is assembled.
    pub fn validate(&self) -> Result<()> {
        if self.runtime.idle_interval_ms == 0 {
            anyhow::bail!("runtime.idle_interval_ms must be greater than 0");
        }
        if self.midi.client_name.is_empty() {
            anyhow::bail!("midi.client_name cannot be empty");
        }

        let mut names = HashSet::new();
        for (idx, bank) in self.pads.iter().enumerate() {
            validate_name(&bank.name).with_context(|| format!("Invalid pad bank {}", idx))?;
            if bank.channel > 15 {
                anyhow::bail!(
                    "Pad bank '{}' has invalid channel {} (must be 0-15)",
                    bank.name,
                    bank.channel
                );
            }
            if bank.mapping.is_empty() {
                anyhow::bail!("Pad bank '{}' has an empty mapping", bank.name);
            }
            if let Some(note) = bank.mapping.keys().find(|n| **n > 127) {
                anyhow::bail!("Pad bank '{}' maps invalid note {}", bank.name, note);
            }
            if !names.insert(bank.name.as_str()) {
                anyhow::bail!("Duplicate control name '{}'", bank.name);
            }
        }

        for (idx, combo) in self.combos.iter().enumerate() {
            validate_name(&combo.name).with_context(|| format!("Invalid combo {}", idx))?;
            if combo.primary.is_empty() || combo.modifier.is_empty() {
                anyhow::bail!("Combo '{}' needs both 'primary' and 'modifier'", combo.name);
            }
            if combo.primary == combo.modifier {
                anyhow::bail!("Combo '{}' cannot use '{}' as its own modifier", combo.name, combo.primary);
            }
            if !names.insert(combo.name.as_str()) {
                anyhow::bail!("Duplicate control name '{}'", combo.name);
            }
        }

        for (idx, binding) in self.bindings.iter().enumerate() {
            if binding.event.is_empty() {
                anyhow::bail!("Binding {} event cannot be empty", idx);
            }
            DottedPath::parse(&binding.action).with_context(|| {
                format!(
                    "Binding {} action '{}' must be <module>.<action>",
                    idx, binding.action
                )
            })?;
        }

        for (idx, indicator) in self.indicators.iter().enumerate() {
            DottedPath::parse(&indicator.signal).with_context(|| {
                format!(
                    "Indicator {} signal '{}' must be <module>.<accessor>",
                    idx, indicator.signal
                )
            })?;
            if indicator.control.is_empty() {
                anyhow::bail!("Indicator {} control cannot be empty", idx);
            }
        }

        Ok(())
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        anyhow::bail!("name cannot be empty");
    }
    if name.contains('.') {
        anyhow::bail!("name '{}' cannot contain '.'", name);
    }
    Ok(())
}

// Default value functions
fn default_client_name() -> String { "surface-dispatch".to_string() }
fn default_idle_interval() -> u64 { 20 }
fn default_hold_ticks() -> u32 { 10 }
fn default_short_press_ticks() -> u32 { 2 }
fn default_true() -> bool { true }
fn default_modifier_event() -> String { "pressed".to_string() }
