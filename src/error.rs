//! Error types for surface construction, configuration and host actions
//!
//! The dispatch hot path (bus publish, registry routing, state polling) never
//! returns these: misses there are silent no-ops. Errors only surface while
//! building a surface or executing a host action.

use thiserror::Error;

/// Errors raised outside the dispatch hot path
#[derive(Debug, Error)]
pub enum Error {
    /// A string that should be `<module>.<accessor>` is not
    #[error("invalid dotted path '{0}' (expected <module>.<accessor>)")]
    InvalidPath(String),

    /// The host has no action registered under this path
    #[error("unknown host action '{0}'")]
    UnknownAction(String),

    /// A host action was called with parameters it cannot use
    #[error("invalid parameters for '{action}': {reason}")]
    InvalidParams { action: String, reason: String },

    /// A layout row could not be turned into a control
    #[error("layout row {row}: {reason}")]
    Layout { row: usize, reason: String },

    /// Configuration refers to a control that does not exist
    #[error("unknown control '{0}'")]
    UnknownControl(String),

    /// Two controls were declared with the same name
    #[error("duplicate control name '{0}'")]
    DuplicateControl(String),

    /// A combo was built over a control it cannot wrap
    #[error("combo '{name}': {reason}")]
    Combo { name: String, reason: String },

    /// MIDI port discovery or connection failure
    #[error("MIDI port error: {0}")]
    Port(String),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
