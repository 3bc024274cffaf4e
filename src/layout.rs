//! Surface layout parser
//!
//! Parses the surface-layout CSV describing every physical control: its
//! façade kind, MIDI channel and message (`note=45`, `cc=60`).

use crate::error::{Error, Result};
use crate::midi::status;
use crate::registry::ControlIdentity;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::OnceLock;
use tracing::info;

/// Which façade a layout row builds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutKind {
    /// Note on/off button
    Button,
    /// Button sending CC 127 / CC 0
    CcButton,
    Jog,
    Fader,
    Knob,
}

/// Raw CSV row
#[derive(Debug, Clone, Deserialize)]
pub struct LayoutRow {
    pub name: String,
    pub kind: LayoutKind,
    pub channel: u8,
    pub message: String,
    #[serde(default)]
    pub playable: bool,
    #[serde(default)]
    pub group: String,
}

/// Parsed MIDI message specification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSpec {
    /// note=number
    Note { note: u8 },
    /// cc=number
    ControlChange { cc: u8 },
}

impl MessageSpec {
    /// Parse a spec string like "cc=70" or "note=110"
    pub fn parse(spec: &str) -> Option<Self> {
        let spec = spec.trim();
        if let Some(cc) = spec.strip_prefix("cc=") {
            cc.parse::<u8>()
                .ok()
                .filter(|cc| *cc < 128)
                .map(|cc| MessageSpec::ControlChange { cc })
        } else if let Some(note) = spec.strip_prefix("note=") {
            note.parse::<u8>()
                .ok()
                .filter(|note| *note < 128)
                .map(|note| MessageSpec::Note { note })
        } else {
            None
        }
    }

    pub fn identifier(&self) -> u8 {
        match self {
            MessageSpec::Note { note } => *note,
            MessageSpec::ControlChange { cc } => *cc,
        }
    }

    /// Status kind of the "on" message
    pub fn status(&self) -> u8 {
        match self {
            MessageSpec::Note { .. } => status::NOTE_ON,
            MessageSpec::ControlChange { .. } => status::CONTROL_CHANGE,
        }
    }
}

/// One validated control
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutEntry {
    pub name: String,
    pub kind: LayoutKind,
    /// 0-15
    pub channel: u8,
    pub spec: MessageSpec,
    pub playable: bool,
    pub group: String,
}

impl LayoutEntry {
    pub fn identity(&self) -> ControlIdentity {
        ControlIdentity::for_status(self.channel, self.spec.identifier(), self.spec.status())
    }
}

/// Control layout database
#[derive(Debug, Clone, Default)]
pub struct SurfaceLayout {
    entries: Vec<LayoutEntry>,
    by_name: HashMap<String, usize>,
    groups: BTreeMap<String, Vec<String>>,
}

impl SurfaceLayout {
    /// Load a layout from a CSV file
    pub async fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let csv_content = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::parse_csv(&csv_content)
    }

    /// Parse CSV content
    pub fn parse_csv(csv_content: &str) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(csv_content.as_bytes());
        let mut layout = Self::default();

        for (index, result) in reader.deserialize().enumerate() {
            // Header is line 1
            let row_number = index + 2;
            let row: LayoutRow = result?;
            let entry = Self::validate_row(row_number, row)?;
            layout.push(entry)?;
        }

        info!(
            "Loaded {} layout controls in {} groups",
            layout.entries.len(),
            layout.groups.len()
        );
        Ok(layout)
    }

    fn validate_row(row_number: usize, row: LayoutRow) -> Result<LayoutEntry> {
        let invalid = |reason: String| Error::Layout {
            row: row_number,
            reason,
        };

        let name = row.name.trim().to_string();
        if name.is_empty() {
            return Err(invalid("control name cannot be empty".into()));
        }
        if name.contains('.') {
            return Err(invalid(format!("control name '{}' cannot contain '.'", name)));
        }
        if row.channel > 15 {
            return Err(invalid(format!(
                "control '{}' has invalid channel {} (must be 0-15)",
                name, row.channel
            )));
        }
        let spec = MessageSpec::parse(&row.message)
            .ok_or_else(|| invalid(format!("invalid message '{}' for '{}'", row.message, name)))?;

        let expects_note = matches!(row.kind, LayoutKind::Button);
        let is_note = matches!(spec, MessageSpec::Note { .. });
        if expects_note != is_note {
            return Err(invalid(format!(
                "control '{}' of kind {:?} cannot use '{}'",
                name, row.kind, row.message
            )));
        }

        Ok(LayoutEntry {
            name,
            kind: row.kind,
            channel: row.channel,
            spec,
            playable: row.playable,
            group: row.group.trim().to_string(),
        })
    }

    fn push(&mut self, entry: LayoutEntry) -> Result<()> {
        if self.by_name.contains_key(&entry.name) {
            return Err(Error::DuplicateControl(entry.name));
        }
        if !entry.group.is_empty() {
            self.groups
                .entry(entry.group.clone())
                .or_default()
                .push(entry.name.clone());
        }
        self.by_name.insert(entry.name.clone(), self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&LayoutEntry> {
        self.by_name.get(name).map(|i| &self.entries[*i])
    }

    /// Entries in file order
    pub fn entries(&self) -> &[LayoutEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn group(&self, group: &str) -> Option<&Vec<String>> {
        self.groups.get(group)
    }

    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(|s| s.as_str())
    }

    /// Find a control by the identity of its on-message (reverse lookup)
    pub fn find_by_identity(&self, id: &ControlIdentity) -> Option<&LayoutEntry> {
        self.entries.iter().find(|e| e.identity() == *id)
    }
}

/// Default embedded layout (used when no `layout` path is configured)
pub const DEFAULT_LAYOUT: &str = include_str!("../docs/surface-layout.csv");

static DEFAULT_DB: OnceLock<SurfaceLayout> = OnceLock::new();

/// The embedded layout, parsed once
pub fn default_layout() -> Result<SurfaceLayout> {
    if let Some(layout) = DEFAULT_DB.get() {
        return Ok(layout.clone());
    }
    let layout = SurfaceLayout::parse_csv(DEFAULT_LAYOUT)?;
    let _ = DEFAULT_DB.set(layout.clone());
    Ok(layout)
}
