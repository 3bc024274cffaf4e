//! MIDI input ingress
//!
//! Port discovery and a midir input connection that parses each incoming
//! message and hands it to the dispatch loop. midir calls back on its own
//! thread, so messages cross into the runtime through an mpsc channel.

use crate::error::{Error, Result};
use crate::midi::{format_hex, MidiMsg};
use colored::*;
use midir::{MidiInput, MidiInputConnection};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Capacity of the ingress → dispatch channel
pub const INGRESS_QUEUE: usize = 1000;

/// An available input port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub index: usize,
    pub name: String,
}

/// Enumerate MIDI input ports
pub fn list_input_ports(client_name: &str) -> Result<Vec<PortInfo>> {
    let midi_in = MidiInput::new(client_name).map_err(|e| Error::Port(e.to_string()))?;
    Ok(midi_in
        .ports()
        .iter()
        .enumerate()
        .filter_map(|(index, port)| {
            midi_in
                .port_name(port)
                .ok()
                .map(|name| PortInfo { index, name })
        })
        .collect())
}

/// Pick a port by numeric index or case-insensitive name fragment
pub fn find_port<'a>(ports: &'a [PortInfo], pattern: &str) -> Option<&'a PortInfo> {
    let pattern = pattern.trim();
    if let Ok(index) = pattern.parse::<usize>() {
        return ports.iter().find(|p| p.index == index);
    }
    let needle = pattern.to_lowercase();
    ports.iter().find(|p| p.name.to_lowercase().contains(&needle))
}

/// Print the input ports, marking the one `pattern` selects
pub fn print_ports(client_name: &str, pattern: Option<&str>) {
    println!("\n{}", "=== Available MIDI Input Ports ===".bold().cyan());

    let ports = match list_input_ports(client_name) {
        Ok(ports) => ports,
        Err(e) => {
            println!("  {} {}", "✗".red(), e);
            return;
        },
    };

    if ports.is_empty() {
        println!("  {}", "No input ports found".dimmed());
    }

    let selected = pattern.and_then(|p| find_port(&ports, p)).map(|p| p.index);
    for port in &ports {
        let marker = if Some(port.index) == selected {
            "→".bright_green()
        } else {
            " ".normal()
        };
        println!("  {} [{}] {}", marker, port.index, port.name);
    }
    println!();
}

/// Live input connection; dropping it closes the port
pub struct MidiIngress {
    _connection: MidiInputConnection<()>,
    port: PortInfo,
}

impl MidiIngress {
    /// Connect to the port matching `pattern` and forward parsed messages to `tx`
    pub fn connect(client_name: &str, pattern: &str, tx: mpsc::Sender<MidiMsg>) -> Result<Self> {
        let ports = list_input_ports(client_name)?;
        let port = find_port(&ports, pattern)
            .cloned()
            .ok_or_else(|| Error::Port(format!("no input port matching '{}'", pattern)))?;

        let midi_in = MidiInput::new(client_name).map_err(|e| Error::Port(e.to_string()))?;
        let midi_port = midi_in
            .ports()
            .into_iter()
            .nth(port.index)
            .ok_or_else(|| Error::Port(format!("port {} disappeared", port.index)))?;

        info!("Connecting to MIDI input: {}", port.name);

        let connection = midi_in
            .connect(
                &midi_port,
                "surface-in",
                move |_timestamp, data, _| {
                    let Some(msg) = MidiMsg::from_bytes(data) else {
                        trace!("Ignored {}", format_hex(data));
                        return;
                    };
                    debug!("MIDI IN {} ({})", format_hex(data), msg);
                    if let Err(e) = tx.try_send(msg) {
                        warn!("Dropping MIDI message: {}", e);
                    }
                },
                (),
            )
            .map_err(|e| Error::Port(e.to_string()))?;

        Ok(Self {
            _connection: connection,
            port,
        })
    }

    pub fn port(&self) -> &PortInfo {
        &self.port
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ports() -> Vec<PortInfo> {
        vec![
            PortInfo { index: 0, name: "Midi Through Port-0".into() },
            PortInfo { index: 1, name: "Akai MPK mini 3".into() },
            PortInfo { index: 2, name: "X-Touch INT".into() },
        ]
    }

    #[test]
    fn test_find_port_by_index() {
        let ports = ports();
        assert_eq!(find_port(&ports, "2").unwrap().name, "X-Touch INT");
        assert!(find_port(&ports, "7").is_none());
    }

    #[test]
    fn test_find_port_by_name_fragment() {
        let ports = ports();
        assert_eq!(find_port(&ports, "mpk").unwrap().index, 1);
        assert_eq!(find_port(&ports, " x-touch ").unwrap().index, 2);
        assert!(find_port(&ports, "launchpad").is_none());
    }
}
