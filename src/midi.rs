//! Raw MIDI message model
//!
//! Hardware ingress delivers short channel messages; the registry only needs
//! the status byte, both data bytes, the channel nibble and a writable
//! "handled" flag telling the host whether the message was consumed.

use crate::registry::ControlIdentity;
use std::fmt;

/// Status byte kinds (high nibble, channel 0)
pub mod status {
    pub const NOTE_OFF: u8 = 0x80;
    pub const NOTE_ON: u8 = 0x90;
    pub const POLY_PRESSURE: u8 = 0xA0;
    pub const CONTROL_CHANGE: u8 = 0xB0;
    pub const PROGRAM_CHANGE: u8 = 0xC0;
    pub const CHANNEL_PRESSURE: u8 = 0xD0;
    pub const PITCH_BEND: u8 = 0xE0;
}

/// A short channel message as seen by the dispatch core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiMsg {
    /// Full status byte (kind | channel)
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
    /// Channel nibble (0-15)
    pub channel: u8,
    /// Set by the registry: true when the message must not reach the host's own note handling
    pub handled: bool,
}

impl MidiMsg {
    /// Build a message from a full status byte; the channel is taken from its low nibble
    pub fn new(status: u8, data1: u8, data2: u8) -> Self {
        Self {
            status,
            data1: data1 & 0x7F,
            data2: data2 & 0x7F,
            channel: status & 0x0F,
            handled: false,
        }
    }

    /// Build a message from a status kind and an explicit channel
    pub fn on_channel(kind: u8, channel: u8, data1: u8, data2: u8) -> Self {
        Self::new((kind & 0xF0) | (channel & 0x0F), data1, data2)
    }

    /// Parse raw bytes from a MIDI port.
    ///
    /// System messages and running status are rejected. A note-on with
    /// velocity 0 is rewritten as a note-off so it routes to the paired
    /// release identity.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let status = *data.first()?;
        if !(0x80..0xF0).contains(&status) {
            return None;
        }

        let kind = status & 0xF0;
        let channel = status & 0x0F;
        let needs = match kind {
            status::PROGRAM_CHANGE | status::CHANNEL_PRESSURE => 2,
            _ => 3,
        };
        if data.len() < needs {
            return None;
        }

        let data1 = data[1];
        let data2 = if needs == 3 { data[2] } else { 0 };

        if kind == status::NOTE_ON && data2 == 0 {
            return Some(Self::on_channel(status::NOTE_OFF, channel, data1, 0));
        }
        Some(Self::new(status, data1, data2))
    }

    /// Status kind (high nibble)
    pub fn kind(&self) -> u8 {
        self.status & 0xF0
    }

    pub fn is_note_on(&self) -> bool {
        self.kind() == status::NOTE_ON && self.data2 > 0
    }

    pub fn is_note_off(&self) -> bool {
        self.kind() == status::NOTE_OFF || (self.kind() == status::NOTE_ON && self.data2 == 0)
    }

    /// Registry lookup key for this message
    pub fn identity(&self) -> ControlIdentity {
        ControlIdentity {
            channel: self.channel,
            identifier: self.data1,
            status_class: self.status,
        }
    }

    /// Encode back to wire bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        match self.kind() {
            status::PROGRAM_CHANGE | status::CHANNEL_PRESSURE => vec![self.status, self.data1],
            _ => vec![self.status, self.data1, self.data2],
        }
    }
}

impl fmt::Display for MidiMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind() {
            status::NOTE_OFF => "NoteOff",
            status::NOTE_ON => "NoteOn",
            status::POLY_PRESSURE => "PolyPressure",
            status::CONTROL_CHANGE => "CC",
            status::PROGRAM_CHANGE => "ProgramChange",
            status::CHANNEL_PRESSURE => "ChannelPressure",
            status::PITCH_BEND => "PitchBend",
            _ => "Unknown",
        };
        write!(
            f,
            "{} ch:{} d1:{} d2:{}",
            kind,
            self.channel + 1,
            self.data1,
            self.data2
        )
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a whitespace separated hex string ("90 2D 7F") into bytes
pub fn parse_hex(text: &str) -> Option<Vec<u8>> {
    text.split_whitespace()
        .map(|tok| u8::from_str_radix(tok.trim_start_matches("0x"), 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_on_parsing() {
        let msg = MidiMsg::from_bytes(&[0x92, 45, 100]).unwrap();
        assert_eq!(msg.status, 0x92);
        assert_eq!(msg.channel, 2);
        assert_eq!(msg.data1, 45);
        assert!(msg.is_note_on());
        assert!(!msg.handled);
    }

    #[test]
    fn test_note_on_velocity_zero_becomes_note_off() {
        let msg = MidiMsg::from_bytes(&[0x90, 60, 0]).unwrap();
        assert_eq!(msg.status, 0x80);
        assert!(msg.is_note_off());
    }

    #[test]
    fn test_two_byte_messages() {
        let msg = MidiMsg::from_bytes(&[0xC3, 12]).unwrap();
        assert_eq!(msg.kind(), status::PROGRAM_CHANGE);
        assert_eq!(msg.channel, 3);
        assert_eq!(msg.to_bytes(), vec![0xC3, 12]);
    }

    #[test]
    fn test_rejects_system_and_truncated() {
        assert!(MidiMsg::from_bytes(&[]).is_none());
        assert!(MidiMsg::from_bytes(&[0xF8]).is_none());
        assert!(MidiMsg::from_bytes(&[0x40, 1, 2]).is_none());
        assert!(MidiMsg::from_bytes(&[0xB0, 7]).is_none());
    }

    #[test]
    fn test_identity_folds_channel_into_status() {
        let msg = MidiMsg::on_channel(status::NOTE_ON, 9, 36, 127);
        let id = msg.identity();
        assert_eq!(id.channel, 9);
        assert_eq!(id.identifier, 36);
        assert_eq!(id.status_class, 0x99);
    }

    #[test]
    fn test_hex_helpers() {
        assert_eq!(format_hex(&[0x90, 0x2D, 0x7F]), "90 2D 7F");
        assert_eq!(parse_hex("90 2d 0x7F"), Some(vec![0x90, 0x2D, 0x7F]));
        assert_eq!(parse_hex("zz"), None);
    }
}
