//! Error types of the orchestration layer.
//!
//! Every variant is a hard stop. Nothing here is retried or downgraded to a
//! warning.

use ies_core::{IesError, NetworkError};
use thiserror::Error;

/// Problems while building extra constraints.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConstraintError {
    #[error("CHP electric link '{link}' has no matched heat link")]
    MissingCoupledLink { link: String },

    #[error("storage boundary store '{store}' does not exist in the network")]
    MissingBoundaryStore { store: String },

    #[error("CHP constraints are configured but the network has no CHP units")]
    NoChpUnits,

    #[error("coefficient {name} must be finite and positive, got {value}")]
    InvalidCoefficient { name: &'static str, value: f64 },

    #[error("constraint name '{0}' is emitted twice")]
    DuplicateName(String),

    #[error("row '{0}' references time-indexed variables but has no snapshot")]
    MissingSnapshot(String),

    #[error("invalid CHP setup: {0}")]
    Network(#[from] NetworkError),
}

/// Failures of a single LOPF solve.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    #[error("model is infeasible")]
    Infeasible,

    #[error("model is unbounded")]
    Unbounded,

    #[error("solver backend failed: {0}")]
    Backend(String),

    #[error("invalid model: {0}")]
    InvalidModel(String),

    #[error("solver option '{key}' rejected: {reason}")]
    InvalidOption { key: String, reason: String },

    #[error("constraint '{constraint}' references {variable}, which is not part of the model")]
    UnknownVariable { constraint: String, variable: String },
}

/// Invalid run configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("n_iter must be at least 1")]
    ZeroIterations,

    #[error("{name} must be finite and positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },

    #[error("storage boundary target must be finite, got {0}")]
    NonFiniteTarget(f64),

    #[error("solver '{requested}' is not registered (available: {available})")]
    UnknownSolver { requested: String, available: String },

    #[error("{0}")]
    Window(#[from] NetworkError),

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// Failures of the single-period solve runner.
#[derive(Error, Debug)]
pub enum RunError {
    /// The backend failed or returned an undefined objective.
    #[error("solve did not converge: {reason}")]
    NonConvergence { reason: String },

    #[error("export to {path} failed: {message}")]
    Export { path: String, message: String },

    #[error("time budget of {budget_secs} s exhausted")]
    BudgetExhausted { budget_secs: u64 },

    #[error("run cancelled")]
    Cancelled,
}

/// Failures of the iterative expansion loop.
#[derive(Error, Debug)]
pub enum ExpansionError {
    #[error("iteration {iteration}: solve did not converge: {reason}")]
    SolveNonConvergence { iteration: usize, reason: String },

    /// Rescaling a line's impedance would divide by a zero or undefined capacity.
    #[error(
        "iteration {iteration}: cannot rescale line '{line}' (s_nom_pre = {s_nom_pre}, s_nom_opt = {s_nom_opt})"
    )]
    DegenerateRescale {
        iteration: usize,
        line: String,
        s_nom_pre: f64,
        s_nom_opt: f64,
    },

    #[error("iteration {iteration}: solve result has no capacity for extendable line '{line}'")]
    MissingCapacity { iteration: usize, line: String },

    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("configuration error: {0}")]
    Constraint(#[from] ConstraintError),

    #[error("iteration {iteration}: export failed: {message}")]
    Export { iteration: usize, message: String },

    #[error("iteration {iteration}: time budget of {budget_secs} s exhausted")]
    BudgetExhausted { iteration: usize, budget_secs: u64 },

    #[error("iteration {iteration}: run cancelled")]
    Cancelled { iteration: usize },

    #[error(transparent)]
    Network(#[from] NetworkError),
}

impl ExpansionError {
    /// Attach the iteration number to a runner failure.
    pub fn from_run(iteration: usize, err: RunError) -> Self {
        match err {
            RunError::NonConvergence { reason } => {
                ExpansionError::SolveNonConvergence { iteration, reason }
            }
            RunError::Export { path, message } => ExpansionError::Export {
                iteration,
                message: format!("{path}: {message}"),
            },
            RunError::BudgetExhausted { budget_secs } => ExpansionError::BudgetExhausted {
                iteration,
                budget_secs,
            },
            RunError::Cancelled => ExpansionError::Cancelled { iteration },
        }
    }
}

impl From<ConstraintError> for IesError {
    fn from(err: ConstraintError) -> Self {
        IesError::Config(err.to_string())
    }
}

impl From<ConfigError> for IesError {
    fn from(err: ConfigError) -> Self {
        IesError::Config(err.to_string())
    }
}

impl From<SolveError> for IesError {
    fn from(err: SolveError) -> Self {
        IesError::Solver(err.to_string())
    }
}

impl From<RunError> for IesError {
    fn from(err: RunError) -> Self {
        IesError::Solver(err.to_string())
    }
}

impl From<ExpansionError> for IesError {
    fn from(err: ExpansionError) -> Self {
        match err {
            ExpansionError::Configuration(e) => e.into(),
            ExpansionError::Constraint(e) => e.into(),
            ExpansionError::Network(e) => IesError::Network(e),
            other => IesError::Solver(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_error_gets_iteration() {
        let err = ExpansionError::from_run(
            2,
            RunError::NonConvergence {
                reason: "objective is NaN".into(),
            },
        );
        assert!(matches!(
            err,
            ExpansionError::SolveNonConvergence { iteration: 2, .. }
        ));
        assert!(err.to_string().contains("iteration 2"));
    }

    #[test]
    fn test_degenerate_rescale_names_line() {
        let err = ExpansionError::DegenerateRescale {
            iteration: 1,
            line: "l_north".into(),
            s_nom_pre: 100.0,
            s_nom_opt: 0.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("l_north"));
        assert!(msg.contains("iteration 1"));
    }

    #[test]
    fn test_constraint_error_is_config_error() {
        let err: IesError = ExpansionError::from(ConstraintError::MissingBoundaryStore {
            store: "TA".into(),
        })
        .into();
        assert!(matches!(err, IesError::Config(_)));
    }
}
