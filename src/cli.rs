//! Interactive console
//!
//! The REPL runs on its own thread and sends [`Command`]s to the dispatch
//! loop, which applies them to the surface between MIDI messages and ticks.

use crate::host::ConsoleHost;
use crate::layout::MessageSpec;
use crate::midi::{parse_hex, status, MidiMsg};
use crate::surface::Surface;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::thread;
use tokio::sync::mpsc;
use tracing::debug;

/// Console command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Inject raw bytes as if they came from the port
    Send(Vec<u8>),
    Press(String),
    Release(String),
    Tick(u32),
    Refresh(u32),
    Beat(i64),
    State,
    Registry,
    Controls,
    Help,
    Quit,
}

/// Parse one console line
pub fn parse_command(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err("empty command".into());
    };
    let rest: Vec<&str> = words.collect();

    let number = |default: Option<i64>| -> Result<i64, String> {
        match rest.first() {
            Some(text) => parse_number(text).ok_or_else(|| format!("not a number: {}", text)),
            None => default.ok_or_else(|| format!("usage: {} <number>", verb)),
        }
    };
    let name = || -> Result<String, String> {
        rest.first()
            .map(|s| s.to_string())
            .ok_or_else(|| format!("usage: {} <control>", verb))
    };

    match verb.to_lowercase().as_str() {
        "send" => parse_hex(&rest.join(" "))
            .filter(|bytes| !bytes.is_empty())
            .map(Command::Send)
            .ok_or_else(|| "usage: send <hex bytes>, e.g. send 90 2D 7F".to_string()),
        "press" => name().map(Command::Press),
        "release" => name().map(Command::Release),
        "tick" => number(Some(1)).and_then(|n| to_u32(n, "tick [n]")).map(Command::Tick),
        "refresh" => number(None).and_then(|n| to_u32(n, "refresh <flags>")).map(Command::Refresh),
        "beat" => number(Some(1)).map(Command::Beat),
        "state" => Ok(Command::State),
        "registry" => Ok(Command::Registry),
        "controls" => Ok(Command::Controls),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(format!("unknown command '{}' (try help)", other)),
    }
}

fn to_u32(n: i64, usage: &str) -> Result<u32, String> {
    u32::try_from(n).map_err(|_| format!("{} out of range, usage: {}", n, usage))
}

/// Decimal or 0x-prefixed hex
fn parse_number(text: &str) -> Option<i64> {
    match text.strip_prefix("0x") {
        Some(hex) => i64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

/// Start the readline loop on a dedicated thread
pub fn spawn_repl(tx: mpsc::Sender<Command>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                eprintln!("{} {}", "Console unavailable:".red(), e);
                return;
            },
        };

        println!("{}", "Type 'help' for commands".dimmed());
        loop {
            match rl.readline("surface> ") {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => {
                    let _ = rl.add_history_entry(line.as_str());
                    match parse_command(&line) {
                        Ok(command) => {
                            let quit = command == Command::Quit;
                            if tx.blocking_send(command).is_err() || quit {
                                break;
                            }
                        },
                        Err(e) => println!("{}", e.yellow()),
                    }
                },
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                    let _ = tx.blocking_send(Command::Quit);
                    break;
                },
                Err(e) => {
                    eprintln!("{} {}", "Console error:".red(), e);
                    break;
                },
            }
        }
    })
}

/// Apply a command to the surface. Returns false when the console asked to quit.
pub fn apply(surface: &Surface, host: &ConsoleHost, command: Command) -> bool {
    debug!("Console command: {:?}", command);
    match command {
        Command::Send(bytes) => match MidiMsg::from_bytes(&bytes) {
            Some(mut msg) => {
                let outcome = surface.on_midi_msg(&mut msg);
                println!("{} → {:?} (handled: {})", msg, outcome, msg.handled);
            },
            None => println!("{}", "not a channel message".yellow()),
        },
        Command::Press(name) | Command::Release(name) if surface.layout().get(&name).is_none() => {
            println!("{}", format!("no layout control '{}'", name).yellow());
        },
        Command::Press(name) => send_synthetic(surface, &name, true),
        Command::Release(name) => send_synthetic(surface, &name, false),
        Command::Tick(n) => {
            let mut changed = 0;
            for _ in 0..n {
                changed += surface.on_idle().changed;
            }
            println!("{} ticks, {} state changes", n, changed);
        },
        Command::Refresh(flags) => surface.on_refresh(flags),
        Command::Beat(value) => surface.on_beat(value),
        Command::State => match serde_yaml::to_string(&host.snapshot()) {
            Ok(yaml) => print!("{}", yaml),
            Err(e) => println!("{}", e.to_string().red()),
        },
        Command::Registry => print_registry(surface),
        Command::Controls => {
            for name in surface.control_names() {
                let active = surface.control(&name).is_some_and(|c| c.is_active());
                let marker = if active { "●".green() } else { "○".dimmed() };
                println!("  {} {}", marker, name);
            }
        },
        Command::Help => print_help(),
        Command::Quit => return false,
    }
    true
}

fn send_synthetic(surface: &Surface, name: &str, down: bool) {
    let Some(entry) = surface.layout().get(name) else {
        return;
    };
    let mut msg = match (entry.spec, down) {
        (MessageSpec::Note { note }, true) => MidiMsg::on_channel(status::NOTE_ON, entry.channel, note, 127),
        (MessageSpec::Note { note }, false) => MidiMsg::on_channel(status::NOTE_OFF, entry.channel, note, 0),
        (MessageSpec::ControlChange { cc }, true) => MidiMsg::on_channel(status::CONTROL_CHANGE, entry.channel, cc, 127),
        (MessageSpec::ControlChange { cc }, false) => MidiMsg::on_channel(status::CONTROL_CHANGE, entry.channel, cc, 0),
    };
    let outcome = surface.on_midi_msg(&mut msg);
    println!("{} → {:?}", msg, outcome);
}

fn print_registry(surface: &Surface) {
    println!("{}", "=== Registry ===".bold().cyan());
    for entry in surface.registry().entries() {
        let state = if entry.active { "active".green() } else { "inactive".dimmed() };
        let modifier = surface
            .registry()
            .modifier_for(&entry.control.name)
            .map(|m| format!(" (modifier: {})", m.name).yellow().to_string())
            .unwrap_or_default();
        println!("  {} {:<20} {}{}", entry.id, entry.control.name, state, modifier);
    }
}

fn print_help() {
    println!("{}", "Commands:".bold());
    println!("  send <hex>        inject raw bytes (send 90 2D 7F)");
    println!("  press <control>   press a layout control");
    println!("  release <control> release a layout control");
    println!("  tick [n]          run n idle ticks");
    println!("  refresh <flags>   host refresh with dirty flags (decimal or 0x..)");
    println!("  beat [value]      beat indicator (0 off, 1 bar, 2 beat)");
    println!("  state             show simulated host state");
    println!("  registry          show routing table");
    println!("  controls          list controls");
    println!("  quit              exit");
}
