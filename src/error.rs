// Error taxonomy for discovery and shaping.

use std::fmt;

/// Which end of a veth pair a `tc` sequence was targeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Host end, default network namespace.
    Host,
    /// Container end, entered through `ip netns exec <name>`.
    Container,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Host => "host",
            Side::Container => "container",
        })
    }
}

/// One step of the five-step shaping sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcStep {
    Clear,
    CreateRoot,
    CreateClass,
    CreateFairQueue,
    CreateFilter,
}

impl fmt::Display for TcStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TcStep::Clear => "clear",
            TcStep::CreateRoot => "create-root",
            TcStep::CreateClass => "create-class",
            TcStep::CreateFairQueue => "create-fair-queue",
            TcStep::CreateFilter => "create-filter",
        })
    }
}

/// Which runtime lookup produced a `Lookup` error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupStep {
    Name,
    Namespace,
}

impl fmt::Display for LookupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LookupStep::Name => "name",
            LookupStep::Namespace => "namespace",
        })
    }
}

/// Failures reported by a container runtime implementation.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("no such container: {0}")]
    NotFound(String),
    #[error("runtime response is missing {0}")]
    MissingField(&'static str),
    #[error(transparent)]
    Docker(#[from] bollard::errors::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ShapingError {
    #[error("{step} lookup failed for container {id}: {source}")]
    Lookup {
        id: String,
        step: LookupStep,
        #[source]
        source: RuntimeError,
    },

    #[error("interface resolution failed for {name}: {reason}")]
    Resolution { name: String, reason: String },

    #[error("invalid {label} value {value:?}: {reason}")]
    InvalidPolicy {
        label: &'static str,
        value: String,
        reason: String,
    },

    #[error(
        "{side} side {step} failed on {interface}: `{command}` exited with {}: {output}",
        status.map_or_else(|| "no status".to_string(), |s| s.to_string())
    )]
    Command {
        side: Side,
        step: TcStep,
        interface: String,
        command: String,
        status: Option<i32>,
        output: String,
    },

    #[error("{side} side {step} failed to execute `{command}`: {source}")]
    Exec {
        side: Side,
        step: TcStep,
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("listing running containers failed: {0}")]
    List(#[source] RuntimeError),
}

impl ShapingError {
    /// Side of the pair a shaping failure happened on, if it is a shaping failure.
    pub fn side(&self) -> Option<Side> {
        match self {
            ShapingError::Command { side, .. } | ShapingError::Exec { side, .. } => Some(*side),
            _ => None,
        }
    }
}
