//! # ies-algo: LOPF orchestration for integrated energy systems
//!
//! Drives linear optimal power flow over multi-carrier networks built with
//! [`ies_core`]. The crate adds what a plain LOPF lacks for coupled
//! electricity/heat/gas systems:
//!
//! - **Extra constraints** ([`extensions`]): CHP back-pressure and top iso-fuel
//!   line, CHP capacity coupling, storage end-of-window boundary. Rows are
//!   emitted through a swappable [`builder::ConstraintBuilder`].
//! - **Single solves** ([`runner::SolveRunner`]): one backend call over a
//!   snapshot window, timing, divergence detection and CSV/JSON export.
//! - **Iterative line expansion** ([`expansion::ExpansionSolver`]): repeated
//!   solves with line impedances rescaled to the previous optimum.
//! - **Result metrics** ([`summary::calc_results`]).
//!
//! ## Backends
//!
//! | Id | Feature | Solver |
//! |----|---------|--------|
//! | `clarabel` | `solver-clarabel` (default) | Clarabel interior point |
//! | `highs` | `solver-highs` | HiGHS simplex |
//!
//! ## Example
//!
//! ```ignore
//! use ies_algo::{BackendRegistry, ExpansionSolver, RunConfig};
//! use std::sync::Arc;
//!
//! let config = Arc::new(RunConfig::from_toml_str(&text)?);
//! let backend = BackendRegistry::with_defaults().resolve(&config.solver)?;
//! let outcome = ExpansionSolver::new(config, backend).run(&mut network)?;
//! println!("objective {:.2}", outcome.result.objective);
//! ```

pub mod builder;
pub mod config;
pub mod constraints;
pub mod error;
pub mod expansion;
pub mod export;
pub mod extensions;
pub mod lopf;
pub mod runner;
pub mod summary;

pub use builder::{builder_for, ConstraintBuilder, LinearExpressionBuilder, RuleBuilder};
pub use config::{
    BuilderKind, ChpConfig, ChpGrouping, RunConfig, SolverOption, SolverSettings, StorageBoundary,
};
pub use constraints::{ConstraintSet, ExtraConstraint, Sense, VarRef};
pub use error::{ConfigError, ConstraintError, ExpansionError, RunError, SolveError};
pub use expansion::{
    write_back, ExpansionOutcome, ExpansionPhase, ExpansionSolver, IterationRecord,
    IterationState,
};
pub use export::export_solution;
pub use extensions::{ConstraintExtension, ConstraintRegistry, ExtensionContext};
pub use lopf::{
    BackendRegistry, Capacities, Dispatch, LopfBackend, SolveOutcome, UNBOUNDED_CAPACITY,
};
pub use runner::{RunBudget, SolveResult, SolveRunner};
pub use summary::{calc_results, SummaryRow, SummaryTable};
