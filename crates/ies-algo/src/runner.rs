//! Single-period solve runner.
//!
//! Drives exactly one backend solve over a snapshot window, times it, rejects
//! an undefined objective, and exports the solution. Exports go to
//! `export_dir/lopf_iteration_<i>` when the solve is part of an iteration
//! sequence, and `export_dir` itself always holds the latest solution.

use crate::config::RunConfig;
use crate::constraints::ConstraintSet;
use crate::error::RunError;
use crate::export::export_solution;
use crate::lopf::{Capacities, Dispatch, LopfBackend};
use ies_core::{Network, SnapshotWindow};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, info_span, warn};

/// External limit on a run, checked at the solve boundary.
///
/// A solve in flight is never interrupted; the budget is checked before a
/// solve starts and after it returns.
#[derive(Debug, Clone, Default)]
pub struct RunBudget {
    deadline: Option<Instant>,
    budget_secs: u64,
    cancel: Arc<AtomicBool>,
}

impl RunBudget {
    /// No deadline; only an explicit [`RunBudget::cancel`] stops the run.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Deadline `budget` from now.
    pub fn with_deadline(budget: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + budget),
            budget_secs: budget.as_secs(),
            cancel: Arc::default(),
        }
    }

    /// Deadline from `time_budget_secs`, unlimited when unset.
    pub fn from_config(config: &RunConfig) -> Self {
        config
            .time_budget()
            .map(Self::with_deadline)
            .unwrap_or_default()
    }

    /// Stop the run at the next solve boundary. Clones share the flag.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Fail with `Cancelled` or `BudgetExhausted` once the run must stop.
    pub fn check(&self) -> Result<(), RunError> {
        if self.cancel.load(Ordering::SeqCst) {
            return Err(RunError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(RunError::BudgetExhausted {
                budget_secs: self.budget_secs,
            }),
            _ => Ok(()),
        }
    }
}

/// Outcome of one successful solve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolveResult {
    /// Position in an iteration sequence, `None` for a stand-alone solve
    pub iteration: Option<usize>,
    pub window: SnapshotWindow,
    pub objective: f64,
    pub converged: bool,
    pub solve_seconds: f64,
    pub capacities: Capacities,
    pub dispatch: Dispatch,
}

/// Runs single solves against one backend under a shared budget.
pub struct SolveRunner {
    config: Arc<RunConfig>,
    backend: Arc<dyn LopfBackend>,
    budget: RunBudget,
}

impl SolveRunner {
    /// Runner with the budget taken from `config`.
    pub fn new(config: Arc<RunConfig>, backend: Arc<dyn LopfBackend>) -> Self {
        let budget = RunBudget::from_config(&config);
        Self {
            config,
            backend,
            budget,
        }
    }

    /// Replace the budget, e.g. with one the caller can cancel.
    pub fn with_budget(mut self, budget: RunBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Budget checked around every solve.
    pub fn budget(&self) -> &RunBudget {
        &self.budget
    }

    /// Configuration shared with the expansion loop.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Directory for the export of `iteration`.
    pub fn iteration_dir(&self, iteration: usize) -> PathBuf {
        self.config
            .export_dir
            .join(format!("lopf_iteration_{}", iteration))
    }

    /// Solve once over `window` with the given extra constraints.
    pub fn run(
        &self,
        network: &Network,
        window: SnapshotWindow,
        constraints: &ConstraintSet,
        iteration: Option<usize>,
    ) -> Result<SolveResult, RunError> {
        let span = info_span!("lopf", iteration = ?iteration, window = %window);
        let _enter = span.enter();

        self.budget.check()?;
        info!(
            "Solving {} snapshots with '{}' and {} extra constraints",
            window.len(),
            self.backend.id(),
            constraints.len()
        );

        let start = Instant::now();
        let solved = self
            .backend
            .solve(network, window, constraints, &self.config.solver);
        let elapsed = start.elapsed().as_secs_f64();
        info!(
            "Solve finished in {:.2} min ({:.1} s)",
            elapsed / 60.0,
            elapsed
        );

        let outcome = solved.map_err(|err| {
            warn!("Solve failed: {}", err);
            RunError::NonConvergence {
                reason: err.to_string(),
            }
        })?;
        if !outcome.objective.is_finite() {
            warn!("Solver returned objective {}", outcome.objective);
            return Err(RunError::NonConvergence {
                reason: format!("objective is {}", outcome.objective),
            });
        }
        self.budget.check()?;

        let mut targets = Vec::new();
        if let Some(i) = iteration {
            targets.push(self.iteration_dir(i));
        }
        targets.push(self.config.export_dir.clone());
        for dir in &targets {
            export_solution(dir, network, &outcome).map_err(|err| RunError::Export {
                path: dir.display().to_string(),
                message: format!("{:#}", err),
            })?;
        }
        info!("Objective {:.4}, exported to {}", outcome.objective, targets[0].display());

        Ok(SolveResult {
            iteration,
            window,
            objective: outcome.objective,
            converged: true,
            solve_seconds: elapsed,
            capacities: outcome.capacities,
            dispatch: outcome.dispatch,
        })
    }
}
