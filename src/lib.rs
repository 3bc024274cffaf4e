//! Surface Dispatch - reactive dispatch runtime for MIDI control surfaces
//!
//! Bridges a polling, stateful DAW host API into an event-driven control
//! surface model: hardware messages are routed through a [`registry`] onto
//! the [`bus`], [`controls`] turn them into semantic events, and the
//! [`state`] diff engine republishes host state changes found by polling.

pub mod bindings;
pub mod bus;
pub mod cli;
pub mod config;
pub mod controls;
pub mod error;
pub mod host;
pub mod ingress;
pub mod layout;
pub mod midi;
pub mod registry;
pub mod state;
pub mod surface;

pub use error::{Error, Result};
