//! Linear program assembly.
//!
//! Variables per snapshot `t` of the window:
//!
//! - generator output `p`, link inflow `p0`, line flow `f`
//! - AC bus angle `θ` (slack buses of each AC island are fixed to 0)
//! - store energy `e` and store power `p`
//! - storage unit `p_dispatch`, `p_store` and state of charge
//!
//! plus one capacity variable per extendable component. Constraints:
//!
//! ```text
//! Σ gen + Σ store p + Σ (dispatch − store) − Σ p0(bus0) + Σ eff·p0(bus1) − Σ f(out) + Σ f(in) = load
//! x_pu · f = θ0 − θ1                            (lines between AC buses)
//! p_min_pu · p_nom <= p <= p_max_pu · p_nom
//! e(t) = (1 − loss)^w · e(t−1) − w · p(t)
//! soc(t) = (1 − loss)^w · soc(t−1) + w · (η_store · p_store − p_dispatch / η_dispatch)
//! ```
//!
//! Objective: `Σ w · marginal_cost · dispatch + Σ capital_cost · capacity`.

use super::{window_offset, Capacities, Dispatch, LopfBackend, SolveOutcome, UNBOUNDED_CAPACITY};
use crate::config::{SolverOption, SolverSettings};
use crate::constraints::{ConstraintSet, ExtraConstraint, Sense, VarRef};
use crate::error::SolveError;
use good_lp::{
    constraint, variable, Constraint, Expression, ProblemVariables, ResolutionError, Solution,
    Solver, SolverModel, Variable,
};
use ies_core::{
    sub_networks, BusId, Carrier, GeneratorId, LineId, LinkId, Network, SnapshotWindow,
    StorageUnitId, StoreId,
};
use std::collections::BTreeSet;
use tracing::debug;

/// A model quantity: a decision variable or a fixed value.
#[derive(Debug, Clone, Copy)]
enum Quantity {
    Fixed(f64),
    Var(Variable),
}

impl Quantity {
    fn value(&self, solution: &impl Solution) -> f64 {
        match *self {
            Quantity::Fixed(v) => v,
            Quantity::Var(var) => solution.value(var),
        }
    }
}

/// Decision variables, indexed by component position then window offset.
#[derive(Default)]
struct Columns {
    snapshots: Vec<usize>,
    gen_p: Vec<Vec<Variable>>,
    gen_nom: Vec<Quantity>,
    link_p0: Vec<Vec<Variable>>,
    link_nom: Vec<Quantity>,
    link_eff: Vec<f64>,
    line_f: Vec<Vec<Variable>>,
    line_nom: Vec<Quantity>,
    store_e: Vec<Vec<Variable>>,
    store_p: Vec<Vec<Variable>>,
    store_nom: Vec<Quantity>,
    su_dispatch: Vec<Vec<Variable>>,
    su_store: Vec<Vec<Variable>>,
    su_soc: Vec<Vec<Variable>>,
    su_nom: Vec<Quantity>,
}

impl Columns {
    fn lookup(&self, var: &VarRef) -> Option<Quantity> {
        let offset = |t: usize| window_offset(&self.snapshots, t);
        match *var {
            VarRef::LinkP { link, snapshot } => self
                .link_p0
                .get(link.value())?
                .get(offset(snapshot)?)
                .map(|v| Quantity::Var(*v)),
            VarRef::LinkPNom(link) => self.link_nom.get(link.value()).copied(),
            VarRef::StoreE { store, snapshot } => self
                .store_e
                .get(store.value())?
                .get(offset(snapshot)?)
                .map(|v| Quantity::Var(*v)),
        }
    }

    fn extract(&self, solution: &impl Solution, objective: f64) -> SolveOutcome {
        let series = |vars: &[Variable]| -> Vec<f64> {
            vars.iter().map(|v| solution.value(*v)).collect()
        };

        let mut capacities = Capacities::default();
        let mut dispatch = Dispatch {
            snapshots: self.snapshots.clone(),
            ..Dispatch::default()
        };

        for (i, (p, nom)) in self.gen_p.iter().zip(&self.gen_nom).enumerate() {
            let id = GeneratorId::new(i);
            capacities.generators.insert(id, nom.value(solution));
            dispatch.generators_p.insert(id, series(p));
        }
        for (i, (p0, nom)) in self.link_p0.iter().zip(&self.link_nom).enumerate() {
            let id = LinkId::new(i);
            let p0 = series(p0);
            let eff = self.link_eff[i];
            capacities.links.insert(id, nom.value(solution));
            dispatch
                .links_p1
                .insert(id, p0.iter().map(|p| -eff * p).collect());
            dispatch.links_p0.insert(id, p0);
        }
        for (i, (f, nom)) in self.line_f.iter().zip(&self.line_nom).enumerate() {
            let id = LineId::new(i);
            capacities.lines.insert(id, nom.value(solution));
            dispatch.lines_p0.insert(id, series(f));
        }
        for (i, nom) in self.store_nom.iter().enumerate() {
            let id = StoreId::new(i);
            capacities.stores.insert(id, nom.value(solution));
            dispatch.stores_e.insert(id, series(&self.store_e[i]));
            dispatch.stores_p.insert(id, series(&self.store_p[i]));
        }
        for (i, nom) in self.su_nom.iter().enumerate() {
            let id = StorageUnitId::new(i);
            capacities.storage_units.insert(id, nom.value(solution));
            let net: Vec<f64> = self.su_dispatch[i]
                .iter()
                .zip(&self.su_store[i])
                .map(|(d, s)| solution.value(*d) - solution.value(*s))
                .collect();
            dispatch.storage_units_p.insert(id, net);
            dispatch.storage_units_soc.insert(id, series(&self.su_soc[i]));
        }

        SolveOutcome {
            objective,
            capacities,
            dispatch,
        }
    }
}

/// Assembled linear program, ready to be handed to a solver.
pub struct LpModel {
    vars: ProblemVariables,
    cost_terms: Vec<(f64, Variable)>,
    constraints: Vec<Constraint>,
    columns: Columns,
}

fn bounded(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        UNBOUNDED_CAPACITY
    }
}

impl LpModel {
    /// Base dispatch/expansion model plus the extra constraints.
    pub fn build(
        network: &Network,
        window: SnapshotWindow,
        extra: &ConstraintSet,
    ) -> Result<Self, SolveError> {
        window
            .validate(&network.snapshots)
            .map_err(|e| SolveError::InvalidModel(e.to_string()))?;

        let mut model = LpModel {
            vars: ProblemVariables::new(),
            cost_terms: Vec::new(),
            constraints: Vec::new(),
            columns: Columns {
                snapshots: window.iter().collect(),
                ..Columns::default()
            },
        };
        let n_bus = network.buses.len();
        let n = window.len();
        let mut balance: Vec<Vec<Expression>> = vec![vec![Expression::from(0.0); n]; n_bus];
        let mut demand: Vec<Vec<f64>> = vec![vec![0.0; n]; n_bus];
        let mut touched = vec![false; n_bus];
        let bus_index = |bus: BusId, component: &str| -> Result<usize, SolveError> {
            let i = bus.value();
            if i < n_bus {
                Ok(i)
            } else {
                Err(SolveError::InvalidModel(format!(
                    "'{}' is attached to unknown bus #{}",
                    component, i
                )))
            }
        };
        let snapshots = model.columns.snapshots.clone();
        let weight = |t: usize| network.snapshots.weighting(t);

        for generator in &network.generators {
            let b = bus_index(generator.bus, &generator.name)?;
            touched[b] = true;
            let nom = model.nominal(
                generator.p_nom_extendable,
                generator.p_nom.value(),
                generator.p_nom_min.value(),
                generator.p_nom_max.value(),
                generator.capital_cost,
            );
            let mut p_series = Vec::with_capacity(n);
            for (k, &t) in snapshots.iter().enumerate() {
                let p = model.dispatch_var(nom, generator.p_min_pu, generator.p_max_pu.at(t));
                model.cost(weight(t) * generator.marginal_cost, p);
                balance[b][k] += p;
                p_series.push(p);
            }
            model.columns.gen_p.push(p_series);
            model.columns.gen_nom.push(nom);
        }

        for load in &network.loads {
            let b = bus_index(load.bus, &load.name)?;
            for (k, &t) in snapshots.iter().enumerate() {
                demand[b][k] += load.p_set.at(t);
            }
        }

        for link in &network.links {
            let b0 = bus_index(link.bus0, &link.name)?;
            let b1 = bus_index(link.bus1, &link.name)?;
            touched[b0] = true;
            touched[b1] = true;
            let nom = model.nominal(
                link.p_nom_extendable,
                link.p_nom.value(),
                link.p_nom_min.value(),
                link.p_nom_max.value(),
                link.capital_cost,
            );
            let mut p0_series = Vec::with_capacity(n);
            for (k, &t) in snapshots.iter().enumerate() {
                let p0 = model.dispatch_var(nom, link.p_min_pu, link.p_max_pu);
                model.cost(weight(t) * link.marginal_cost, p0);
                balance[b0][k] -= p0;
                balance[b1][k] += link.efficiency * p0;
                p0_series.push(p0);
            }
            model.columns.link_p0.push(p0_series);
            model.columns.link_nom.push(nom);
            model.columns.link_eff.push(link.efficiency);
        }

        let slack: BTreeSet<BusId> = sub_networks(network).iter().map(|s| s.slack).collect();
        let is_ac = |bus: BusId| {
            network
                .bus(bus)
                .map(|b| b.carrier == Carrier::Ac)
                .unwrap_or(false)
        };
        let mut theta: Vec<Option<Vec<Variable>>> = Vec::with_capacity(n_bus);
        for bus in &network.buses {
            theta.push(if bus.carrier == Carrier::Ac && !slack.contains(&bus.id) {
                Some((0..n).map(|_| model.vars.add(variable())).collect())
            } else {
                None
            });
        }

        for line in &network.lines {
            let b0 = bus_index(line.bus0, &line.name)?;
            let b1 = bus_index(line.bus1, &line.name)?;
            touched[b0] = true;
            touched[b1] = true;
            let nom = model.nominal(
                line.s_nom_extendable,
                line.s_nom.value(),
                line.s_nom_min.value(),
                line.s_nom_max.value(),
                line.capital_cost,
            );
            let kvl = is_ac(line.bus0) && is_ac(line.bus1);
            let x_pu = if kvl {
                if !(line.x.is_finite() && line.x > 0.0) {
                    return Err(SolveError::InvalidModel(format!(
                        "line '{}' has non-positive reactance {}",
                        line.name, line.x
                    )));
                }
                let v_nom = network.buses[b0].v_nom;
                let v_nom = if v_nom > 0.0 { v_nom } else { 1.0 };
                line.x / (v_nom * v_nom)
            } else {
                0.0
            };

            let mut f_series = Vec::with_capacity(n);
            for k in 0..n {
                let f = model.dispatch_var(nom, -1.0, 1.0);
                balance[b0][k] -= f;
                balance[b1][k] += f;
                if kvl {
                    let mut angle = x_pu * f;
                    if let Some(th) = &theta[b0] {
                        angle -= th[k];
                    }
                    if let Some(th) = &theta[b1] {
                        angle += th[k];
                    }
                    model.constraints.push(constraint!(angle == 0.0));
                }
                f_series.push(f);
            }
            model.columns.line_f.push(f_series);
            model.columns.line_nom.push(nom);
        }

        for store in &network.stores {
            let b = bus_index(store.bus, &store.name)?;
            touched[b] = true;
            let nom = model.nominal(
                store.e_nom_extendable,
                store.e_nom.value(),
                store.e_nom_min.value(),
                store.e_nom_max.value(),
                store.capital_cost,
            );
            let e: Vec<Variable> = (0..n).map(|_| model.dispatch_var(nom, 0.0, 1.0)).collect();
            let p: Vec<Variable> = (0..n).map(|_| model.vars.add(variable())).collect();
            for (k, &t) in snapshots.iter().enumerate() {
                let w = weight(t);
                let keep = (1.0 - store.standing_loss).powf(w);
                model.cost(w * store.marginal_cost, p[k]);
                balance[b][k] += p[k];
                let level = e[k] + w * p[k];
                let row = if k > 0 {
                    constraint!(level - keep * e[k - 1] == 0.0)
                } else if store.e_cyclic {
                    constraint!(level - keep * e[n - 1] == 0.0)
                } else {
                    constraint!(level == keep * store.e_initial)
                };
                model.constraints.push(row);
            }
            model.columns.store_e.push(e);
            model.columns.store_p.push(p);
            model.columns.store_nom.push(nom);
        }

        for su in &network.storage_units {
            let b = bus_index(su.bus, &su.name)?;
            touched[b] = true;
            if !(su.efficiency_dispatch > 0.0) {
                return Err(SolveError::InvalidModel(format!(
                    "storage unit '{}' has non-positive dispatch efficiency",
                    su.name
                )));
            }
            let nom = model.nominal(
                su.p_nom_extendable,
                su.p_nom.value(),
                su.p_nom_min.value(),
                su.p_nom_max.value(),
                su.capital_cost,
            );
            let dispatch: Vec<Variable> =
                (0..n).map(|_| model.dispatch_var(nom, 0.0, 1.0)).collect();
            let store: Vec<Variable> = (0..n).map(|_| model.dispatch_var(nom, 0.0, 1.0)).collect();
            let soc: Vec<Variable> = (0..n)
                .map(|_| model.dispatch_var(nom, 0.0, su.max_hours))
                .collect();
            for (k, &t) in snapshots.iter().enumerate() {
                let w = weight(t);
                let keep = (1.0 - su.standing_loss).powf(w);
                model.cost(w * su.marginal_cost, dispatch[k]);
                balance[b][k] += dispatch[k];
                balance[b][k] -= store[k];
                let level = soc[k] - w * su.efficiency_store * store[k]
                    + (w / su.efficiency_dispatch) * dispatch[k];
                let row = if k > 0 {
                    constraint!(level - keep * soc[k - 1] == 0.0)
                } else if su.cyclic_state_of_charge {
                    constraint!(level - keep * soc[n - 1] == 0.0)
                } else {
                    constraint!(level == keep * su.state_of_charge_initial)
                };
                model.constraints.push(row);
            }
            model.columns.su_dispatch.push(dispatch);
            model.columns.su_store.push(store);
            model.columns.su_soc.push(soc);
            model.columns.su_nom.push(nom);
        }

        for (b, (rows, loads)) in balance.into_iter().zip(demand).enumerate() {
            for (expr, load) in rows.into_iter().zip(loads) {
                if !touched[b] && load == 0.0 {
                    continue;
                }
                model.constraints.push(constraint!(expr == load));
            }
        }

        for row in extra.iter() {
            let c = model.resolve(row)?;
            model.constraints.push(c);
        }

        debug!(
            "Assembled LOPF over {}: {} variables, {} constraints ({} extra)",
            window,
            model.vars.len(),
            model.constraints.len(),
            extra.len()
        );
        Ok(model)
    }

    /// Capacity of a component: a bounded variable when extendable.
    fn nominal(&mut self, extendable: bool, fixed: f64, min: f64, max: f64, capital_cost: f64) -> Quantity {
        if extendable {
            let cap = self
                .vars
                .add(variable().min(min.max(0.0)).max(bounded(max)));
            self.cost(capital_cost, cap);
            Quantity::Var(cap)
        } else {
            Quantity::Fixed(bounded(fixed))
        }
    }

    /// `lo · nom <= v <= hi · nom`, as bounds for fixed capacities and as rows otherwise.
    fn dispatch_var(&mut self, nom: Quantity, lo: f64, hi: f64) -> Variable {
        match nom {
            Quantity::Fixed(cap) => self.vars.add(variable().min(lo * cap).max(hi * cap)),
            Quantity::Var(cap) => {
                let v = self.vars.add(variable());
                self.constraints.push(constraint!(v - hi * cap <= 0.0));
                self.constraints.push(constraint!(v - lo * cap >= 0.0));
                v
            }
        }
    }

    fn cost(&mut self, coef: f64, var: Variable) {
        if coef != 0.0 {
            self.cost_terms.push((coef, var));
        }
    }

    /// Bind an extra constraint to model variables. Fixed capacities move to the rhs.
    fn resolve(&self, row: &ExtraConstraint) -> Result<Constraint, SolveError> {
        let mut lhs = Expression::from(0.0);
        let mut constant = 0.0;
        for (coef, var) in &row.terms {
            match self.columns.lookup(var) {
                Some(Quantity::Var(v)) => lhs += *coef * v,
                Some(Quantity::Fixed(value)) => constant += coef * value,
                None => {
                    return Err(SolveError::UnknownVariable {
                        constraint: row.name.clone(),
                        variable: var.to_string(),
                    })
                }
            }
        }
        let rhs = row.rhs - constant;
        Ok(match row.sense {
            Sense::Le => constraint!(lhs <= rhs),
            Sense::Eq => constraint!(lhs == rhs),
            Sense::Ge => constraint!(lhs >= rhs),
        })
    }

    /// Hand the model to `solver`, let `configure` apply solver options, and
    /// read back the solution.
    pub fn solve_using<S, F>(self, solver: S, configure: F) -> Result<SolveOutcome, SolveError>
    where
        S: Solver,
        S::Model: SolverModel<Error = ResolutionError>,
        F: FnOnce(S::Model) -> Result<S::Model, SolveError>,
    {
        let LpModel {
            vars,
            cost_terms,
            constraints,
            columns,
        } = self;

        let mut objective = Expression::from(0.0);
        for (coef, var) in &cost_terms {
            objective += *coef * *var;
        }
        let mut problem = vars.minimise(objective).using(solver);
        for c in constraints {
            problem = problem.with(c);
        }
        let solution = configure(problem)?
            .solve()
            .map_err(map_resolution_error)?;

        let objective: f64 = cost_terms
            .iter()
            .map(|(coef, var)| coef * solution.value(*var))
            .sum();
        Ok(columns.extract(&solution, objective))
    }
}

fn map_resolution_error(err: ResolutionError) -> SolveError {
    match err {
        ResolutionError::Infeasible => SolveError::Infeasible,
        ResolutionError::Unbounded => SolveError::Unbounded,
        other => SolveError::Backend(other.to_string()),
    }
}

fn rejected(key: &str, reason: impl Into<String>) -> SolveError {
    SolveError::InvalidOption {
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn as_f64(key: &str, value: &SolverOption) -> Result<f64, SolveError> {
    match *value {
        SolverOption::Float(v) => Ok(v),
        SolverOption::Int(v) => Ok(v as f64),
        _ => Err(rejected(key, format!("expected a number, got '{value}'"))),
    }
}

fn as_u32(key: &str, value: &SolverOption) -> Result<u32, SolveError> {
    match *value {
        SolverOption::Int(v) => u32::try_from(v)
            .map_err(|_| rejected(key, format!("expected a non-negative integer, got {v}"))),
        _ => Err(rejected(key, format!("expected an integer, got '{value}'"))),
    }
}

fn as_bool(key: &str, value: &SolverOption) -> Result<bool, SolveError> {
    match *value {
        SolverOption::Bool(v) => Ok(v),
        _ => Err(rejected(key, format!("expected true or false, got '{value}'"))),
    }
}

/// Pure-Rust interior-point backend.
///
/// Recognised options: `max_iter`, `max_threads` (alias `threads`),
/// `time_limit`, the `tol_*` tolerances, `verbose`, `equilibrate_enable`,
/// `presolve_enable` and `direct_solve_method`. Any other key is an error.
#[cfg(feature = "solver-clarabel")]
#[derive(Debug, Default, Clone, Copy)]
pub struct ClarabelLopf;

#[cfg(feature = "solver-clarabel")]
impl ClarabelLopf {
    fn configure(
        mut problem: good_lp::solvers::clarabel::ClarabelProblem,
        settings: &SolverSettings,
    ) -> Result<good_lp::solvers::clarabel::ClarabelProblem, SolveError> {
        for (key, value) in &settings.options {
            debug!("clarabel: setting {} = {}", key, value);
            let builder = problem.settings();
            match key.as_str() {
                "max_iter" => {
                    builder.max_iter(as_u32(key, value)?);
                }
                "max_threads" | "threads" => {
                    builder.max_threads(as_u32(key, value)?);
                }
                "time_limit" => {
                    builder.time_limit(as_f64(key, value)?);
                }
                "tol_gap_abs" => {
                    builder.tol_gap_abs(as_f64(key, value)?);
                }
                "tol_gap_rel" => {
                    builder.tol_gap_rel(as_f64(key, value)?);
                }
                "tol_feas" => {
                    builder.tol_feas(as_f64(key, value)?);
                }
                "tol_infeas_abs" => {
                    builder.tol_infeas_abs(as_f64(key, value)?);
                }
                "tol_infeas_rel" => {
                    builder.tol_infeas_rel(as_f64(key, value)?);
                }
                "tol_ktratio" => {
                    builder.tol_ktratio(as_f64(key, value)?);
                }
                "verbose" => {
                    builder.verbose(as_bool(key, value)?);
                }
                "equilibrate_enable" => {
                    builder.equilibrate_enable(as_bool(key, value)?);
                }
                "presolve_enable" => {
                    builder.presolve_enable(as_bool(key, value)?);
                }
                "direct_solve_method" => match value {
                    SolverOption::Text(method) => {
                        builder.direct_solve_method(method.clone());
                    }
                    other => return Err(rejected(key, format!("expected a string, got '{other}'"))),
                },
                _ => return Err(rejected(key, "not a clarabel setting")),
            }
        }
        Ok(problem)
    }
}

#[cfg(feature = "solver-clarabel")]
impl LopfBackend for ClarabelLopf {
    fn id(&self) -> &str {
        "clarabel"
    }

    fn solve(
        &self,
        network: &Network,
        window: SnapshotWindow,
        constraints: &ConstraintSet,
        settings: &SolverSettings,
    ) -> Result<SolveOutcome, SolveError> {
        LpModel::build(network, window, constraints)?.solve_using(
            good_lp::solvers::clarabel::clarabel,
            |problem| Self::configure(problem, settings),
        )
    }
}

/// HiGHS backend. Options are handed to HiGHS under their own names; HiGHS
/// itself rejects keys it does not know.
#[cfg(feature = "solver-highs")]
#[derive(Debug, Default, Clone, Copy)]
pub struct HighsLopf;

#[cfg(feature = "solver-highs")]
impl HighsLopf {
    fn configure(
        mut problem: good_lp::solvers::highs::HighsProblem,
        settings: &SolverSettings,
    ) -> Result<good_lp::solvers::highs::HighsProblem, SolveError> {
        for (key, value) in &settings.options {
            debug!("highs: setting {} = {}", key, value);
            problem = match value {
                SolverOption::Bool(v) => problem.set_option(key.as_str(), *v),
                SolverOption::Int(v) => {
                    let v = i32::try_from(*v)
                        .map_err(|_| rejected(key, format!("{v} does not fit in 32 bits")))?;
                    problem.set_option(key.as_str(), v)
                }
                SolverOption::Float(v) => problem.set_option(key.as_str(), *v),
                SolverOption::Text(v) => problem.set_option(key.as_str(), v.as_str()),
            };
        }
        Ok(problem)
    }
}

#[cfg(feature = "solver-highs")]
impl LopfBackend for HighsLopf {
    fn id(&self) -> &str {
        "highs"
    }

    fn solve(
        &self,
        network: &Network,
        window: SnapshotWindow,
        constraints: &ConstraintSet,
        settings: &SolverSettings,
    ) -> Result<SolveOutcome, SolveError> {
        LpModel::build(network, window, constraints)?.solve_using(
            good_lp::solvers::highs::highs,
            |problem| Self::configure(problem, settings),
        )
    }
}
