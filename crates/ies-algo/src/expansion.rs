//! Iterative capacity expansion with line re-linearization.
//!
//! The DC power-flow model treats line impedance as a constant, so expanding a
//! line cannot change its electrical parameters within one solve. The loop
//! alternates solving and rescaling instead:
//!
//! ```text
//! Init ─┬─> Solving(1) ─> Rescaling(1) ─> Solving(2) ─> ... ─> Solving(n) ─> Done
//!       └─> SingleSolve ─> Done            (no extendable line)
//! ```
//!
//! After solve `i < n_iter` every extendable line is rescaled with
//! `ratio = s_nom_pre / s_nom_opt`: `x` and `r` are multiplied by the ratio,
//! `g` and `b` divided by it, and `s_nom_opt` becomes the next `s_nom_pre`.
//! The last solve is not followed by a rescale; its result is the answer.

use crate::config::RunConfig;
use crate::error::{ConfigError, ExpansionError};
use crate::extensions::{derive_heat_efficiency, ConstraintRegistry, ExtensionContext, HeatEfficiency};
use crate::lopf::LopfBackend;
use crate::runner::{RunBudget, SolveResult, SolveRunner};
use ies_core::{LineId, LineParameters, MegavoltAmperes, MegawattHours, Megawatts, Network};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, info_span};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExpansionPhase {
    Init,
    Solving(usize),
    Rescaling(usize),
    SingleSolve,
    Done,
}

/// Electrical parameters of an extendable line together with the capacity
/// they are consistent with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtendableLine {
    pub name: String,
    pub params: LineParameters,
    pub s_nom_pre: f64,
}

/// Line parameters used by one iteration. Rescaling produces a new state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationState {
    pub iteration: usize,
    pub lines: BTreeMap<LineId, ExtendableLine>,
}

/// Rescale applied to one line after an iteration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineRescale {
    pub line: String,
    pub s_nom_pre: f64,
    pub s_nom_opt: f64,
    /// `s_nom_pre / s_nom_opt`, the factor applied to `x` and `r`
    pub ratio: f64,
}

impl IterationState {
    /// State of iteration 1: current parameters and `s_nom` of every extendable line.
    pub fn initial(network: &Network) -> Self {
        let params = network.line_parameters();
        let lines = network
            .extendable_lines()
            .filter_map(|line| {
                let params = *params.get(&line.id)?;
                Some((
                    line.id,
                    ExtendableLine {
                        name: line.name.clone(),
                        params,
                        s_nom_pre: line.s_nom.value(),
                    },
                ))
            })
            .collect();
        Self {
            iteration: 1,
            lines,
        }
    }

    pub fn parameters(&self) -> BTreeMap<LineId, LineParameters> {
        self.lines.iter().map(|(id, l)| (*id, l.params)).collect()
    }

    /// Rescales planned from this state and the solved capacities.
    pub fn rescales(&self, s_nom_opt: &BTreeMap<LineId, f64>) -> Result<Vec<LineRescale>, ExpansionError> {
        self.lines
            .iter()
            .map(|(id, line)| {
                let opt = s_nom_opt
                    .get(id)
                    .copied()
                    .ok_or_else(|| ExpansionError::MissingCapacity {
                        iteration: self.iteration,
                        line: line.name.clone(),
                    })?;
                let pre = line.s_nom_pre;
                if !(opt.is_finite() && opt > 0.0 && pre.is_finite() && pre > 0.0) {
                    return Err(ExpansionError::DegenerateRescale {
                        iteration: self.iteration,
                        line: line.name.clone(),
                        s_nom_pre: pre,
                        s_nom_opt: opt,
                    });
                }
                Ok(LineRescale {
                    line: line.name.clone(),
                    s_nom_pre: pre,
                    s_nom_opt: opt,
                    ratio: pre / opt,
                })
            })
            .collect()
    }

    /// Next iteration's state after the capacities `s_nom_opt` were solved.
    pub fn rescale(&self, s_nom_opt: &BTreeMap<LineId, f64>) -> Result<IterationState, ExpansionError> {
        let rescales = self.rescales(s_nom_opt)?;
        let lines = self
            .lines
            .iter()
            .zip(rescales)
            .map(|((id, line), rs)| {
                let p = line.params;
                let params = LineParameters {
                    x: p.x * rs.s_nom_pre / rs.s_nom_opt,
                    r: p.r * rs.s_nom_pre / rs.s_nom_opt,
                    g: p.g * rs.s_nom_opt / rs.s_nom_pre,
                    b: p.b * rs.s_nom_opt / rs.s_nom_pre,
                };
                (
                    *id,
                    ExtendableLine {
                        name: line.name.clone(),
                        params,
                        s_nom_pre: rs.s_nom_opt,
                    },
                )
            })
            .collect();
        Ok(IterationState {
            iteration: self.iteration + 1,
            lines,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationRecord {
    /// 1-based; a single solve is recorded as iteration 1
    pub iteration: usize,
    pub objective: f64,
    pub solve_seconds: f64,
    /// Empty after the last solve
    pub rescaled: Vec<LineRescale>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpansionOutcome {
    /// Last solve; authoritative
    pub result: SolveResult,
    pub iterations: Vec<IterationRecord>,
    pub heat_efficiencies: Vec<HeatEfficiency>,
}

/// Drives the solve/rescale loop.
pub struct ExpansionSolver {
    config: Arc<RunConfig>,
    runner: SolveRunner,
    phase: ExpansionPhase,
}

impl ExpansionSolver {
    pub fn new(config: Arc<RunConfig>, backend: Arc<dyn LopfBackend>) -> Self {
        Self {
            runner: SolveRunner::new(Arc::clone(&config), backend),
            config,
            phase: ExpansionPhase::Init,
        }
    }

    pub fn with_budget(mut self, budget: RunBudget) -> Self {
        self.runner = self.runner.with_budget(budget);
        self
    }

    pub fn budget(&self) -> &RunBudget {
        self.runner.budget()
    }

    pub fn phase(&self) -> ExpansionPhase {
        self.phase
    }

    /// Run the loop on `network`.
    ///
    /// Line parameters of the network are replaced by each iteration's state
    /// before its solve, and the solved capacities are written back into the
    /// `*_opt` fields at the end.
    pub fn run(&mut self, network: &mut Network) -> Result<ExpansionOutcome, ExpansionError> {
        let span = info_span!("expansion", network = %network.name, n_iter = self.config.n_iter);
        let _enter = span.enter();

        self.phase = ExpansionPhase::Init;
        let window = self.config.validate_for(network)?;

        let heat_efficiencies = match &self.config.chp {
            Some(chp) => derive_heat_efficiency(network, chp.c_v)?,
            None => Vec::new(),
        };
        let registry = ConstraintRegistry::from_config(&self.config);
        let constraints = registry.build_all(&ExtensionContext::new(network, window))?;
        info!(
            "Built {} extra constraints from [{}] with the {:?} builder",
            constraints.len(),
            registry.ids().join(", "),
            registry.builder().kind()
        );

        if !network.has_extendable_lines() {
            self.phase = ExpansionPhase::SingleSolve;
            info!("No extendable lines, running a single LOPF");
            let result = self
                .runner
                .run(network, window, &constraints, None)
                .map_err(|e| ExpansionError::from_run(1, e))?;
            write_back(network, &result);
            self.phase = ExpansionPhase::Done;
            return Ok(ExpansionOutcome {
                iterations: vec![IterationRecord {
                    iteration: 1,
                    objective: result.objective,
                    solve_seconds: result.solve_seconds,
                    rescaled: Vec::new(),
                }],
                result,
                heat_efficiencies,
            });
        }

        let n_iter = self.config.n_iter;
        let mut state = IterationState::initial(network);
        let mut iterations = Vec::with_capacity(n_iter);
        let mut last = None;

        for i in 1..=n_iter {
            self.phase = ExpansionPhase::Solving(i);
            info!("Iteration {}/{}", i, n_iter);
            network.apply_line_parameters(&state.parameters())?;
            let result = self
                .runner
                .run(network, window, &constraints, Some(i))
                .map_err(|e| ExpansionError::from_run(i, e))?;

            let mut rescaled = Vec::new();
            if i < n_iter {
                self.phase = ExpansionPhase::Rescaling(i);
                rescaled = state.rescales(&result.capacities.lines)?;
                for rs in &rescaled {
                    debug!(
                        "Line '{}': s_nom {:.3} -> {:.3}, x and r scaled by {:.6}",
                        rs.line, rs.s_nom_pre, rs.s_nom_opt, rs.ratio
                    );
                }
                state = state.rescale(&result.capacities.lines)?;
            }

            iterations.push(IterationRecord {
                iteration: i,
                objective: result.objective,
                solve_seconds: result.solve_seconds,
                rescaled,
            });
            last = Some(result);
        }

        let result = last.ok_or(ExpansionError::Configuration(ConfigError::ZeroIterations))?;
        write_back(network, &result);
        self.phase = ExpansionPhase::Done;
        info!(
            "Expansion finished after {} iterations, objective {:.4}",
            iterations.len(),
            result.objective
        );
        Ok(ExpansionOutcome {
            result,
            iterations,
            heat_efficiencies,
        })
    }
}

/// Store the solved capacities in the network's `*_opt` fields.
pub fn write_back(network: &mut Network, result: &SolveResult) {
    let caps = &result.capacities;
    for line in &mut network.lines {
        line.s_nom_opt = caps.lines.get(&line.id).map(|v| MegavoltAmperes::new(*v));
    }
    for link in &mut network.links {
        link.p_nom_opt = caps.links.get(&link.id).map(|v| Megawatts::new(*v));
    }
    for generator in &mut network.generators {
        generator.p_nom_opt = caps
            .generators
            .get(&generator.id)
            .map(|v| Megawatts::new(*v));
    }
    for store in &mut network.stores {
        store.e_nom_opt = caps.stores.get(&store.id).map(|v| MegawattHours::new(*v));
    }
    for su in &mut network.storage_units {
        su.p_nom_opt = caps
            .storage_units
            .get(&su.id)
            .map(|v| Megawatts::new(*v));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ies_core::{BusInput, Carrier, LineInput, NetworkBuilder, Snapshots};

    fn network() -> Network {
        let start = NaiveDate::from_ymd_opt(2030, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        NetworkBuilder::new("lines", Snapshots::hourly(start, 1))
            .bus(BusInput::new("a", Carrier::Ac))
            .bus(BusInput::new("b", Carrier::Ac))
            .line(
                LineInput::new("ext", "a", "b", 2.0)
                    .with_impedance(0.5, 0.01, 0.02)
                    .with_s_nom(100.0)
                    .extendable(),
            )
            .line(LineInput::new("fixed", "a", "b", 1.0).with_s_nom(50.0))
            .build()
            .unwrap()
    }

    #[test]
    fn test_initial_state_only_extendable() {
        let state = IterationState::initial(&network());
        assert_eq!(state.iteration, 1);
        assert_eq!(state.lines.len(), 1);
        assert_eq!(state.lines[&LineId::new(0)].s_nom_pre, 100.0);
    }

    #[test]
    fn test_rescale_formulas() {
        let state = IterationState::initial(&network());
        let opt = BTreeMap::from([(LineId::new(0), 150.0), (LineId::new(1), 50.0)]);
        let next = state.rescale(&opt).unwrap();
        let line = &next.lines[&LineId::new(0)];
        assert_eq!(next.iteration, 2);
        assert_eq!(line.s_nom_pre, 150.0);
        assert!((line.params.x - 2.0 * 100.0 / 150.0).abs() < 1e-12);
        assert!((line.params.r - 0.5 * 100.0 / 150.0).abs() < 1e-12);
        assert!((line.params.g - 0.01 * 150.0 / 100.0).abs() < 1e-12);
        assert!((line.params.b - 0.02 * 150.0 / 100.0).abs() < 1e-12);
        // the previous state is untouched
        assert_eq!(state.lines[&LineId::new(0)].params.x, 2.0);
    }

    #[test]
    fn test_zero_capacity_is_degenerate() {
        let state = IterationState::initial(&network());
        let opt = BTreeMap::from([(LineId::new(0), 0.0)]);
        assert!(matches!(
            state.rescale(&opt),
            Err(ExpansionError::DegenerateRescale { iteration: 1, s_nom_opt, .. }) if s_nom_opt == 0.0
        ));
    }

    #[test]
    fn test_missing_capacity() {
        let state = IterationState::initial(&network());
        assert!(matches!(
            state.rescale(&BTreeMap::new()),
            Err(ExpansionError::MissingCapacity { .. })
        ));
    }
}
