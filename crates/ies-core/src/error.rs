//! Error types shared across the IES workspace.
//!
//! [`IesError`] is the catch-all used at API boundaries. [`NetworkError`]
//! describes problems found while assembling or mutating a [`crate::Network`];
//! it converts into `IesError` so callers can use `?` uniformly.
//!
//! # Example
//!
//! ```ignore
//! use ies_core::{IesResult, io::load_network};
//!
//! fn check(path: &str) -> IesResult<()> {
//!     let network = load_network(path)?;
//!     println!("{}", network.stats());
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Unified error type for all IES operations.
#[derive(Error, Debug)]
pub enum IesError {
    /// I/O errors (file access, export directories, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Solver/orchestration errors
    #[error("Solver error: {0}")]
    Solver(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network structure errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using IesError.
pub type IesResult<T> = Result<T, IesError>;

/// Problems detected while building or updating a network.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    #[error("{kind} '{name}' is defined more than once")]
    DuplicateName { kind: &'static str, name: String },

    #[error("{component} references unknown bus '{bus}'")]
    UnknownBus { component: String, bus: String },

    #[error("CHP unit '{unit}' references unknown link '{link}'")]
    UnknownLink { unit: String, link: String },

    /// An electric CHP link that no CHP unit pairs with a heat link.
    #[error("CHP electric link '{link}' has no matched heat link")]
    MissingCoupledLink { link: String },

    #[error("link '{link}' is used by CHP units '{first}' and '{second}'")]
    LinkInMultipleUnits {
        link: String,
        first: String,
        second: String,
    },

    #[error("CHP unit '{unit}': link '{link}' is not marked as a {expected} link")]
    ChpRoleMismatch {
        unit: String,
        link: String,
        expected: &'static str,
    },

    #[error("CHP unit '{unit}': electric link draws from '{electric_bus}' but heat link from '{heat_bus}'")]
    ChpFuelMismatch {
        unit: String,
        electric_bus: String,
        heat_bus: String,
    },

    #[error("invalid snapshots: {0}")]
    InvalidSnapshots(String),

    #[error("snapshot window [{start}, {end}) is invalid for a horizon of {len} snapshots")]
    InvalidWindow { start: usize, end: usize, len: usize },

    #[error("{component}: profile has {actual} values but the horizon has {expected} snapshots")]
    ProfileLength {
        component: String,
        expected: usize,
        actual: usize,
    },

    #[error("line id {0} does not exist")]
    UnknownLine(usize),
}

impl From<anyhow::Error> for IesError {
    fn from(err: anyhow::Error) -> Self {
        IesError::Other(format!("{err:#}"))
    }
}

impl From<String> for IesError {
    fn from(s: String) -> Self {
        IesError::Other(s)
    }
}

impl From<&str> for IesError {
    fn from(s: &str) -> Self {
        IesError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for IesError {
    fn from(err: serde_json::Error) -> Self {
        IesError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IesError::Solver("objective is NaN".into());
        assert!(err.to_string().contains("Solver error"));
        assert!(err.to_string().contains("objective is NaN"));
    }

    #[test]
    fn test_network_error_conversion() {
        let err: IesError = NetworkError::MissingCoupledLink {
            link: "chp_el".into(),
        }
        .into();
        assert!(matches!(err, IesError::Network(_)));
        assert!(err.to_string().contains("chp_el"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: IesError = io_err.into();
        assert!(matches!(err, IesError::Io(_)));
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> IesResult<()> {
            Err(IesError::Validation("empty horizon".into()))
        }

        fn outer() -> IesResult<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }
}
