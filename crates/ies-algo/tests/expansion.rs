//! Expansion loop tests against a scripted backend

use chrono::NaiveDate;
use ies_algo::{
    ChpConfig, ConstraintError, ConstraintSet, ExpansionError, ExpansionPhase, ExpansionSolver,
    IterationState, LopfBackend, RunConfig, SolveError, SolveOutcome, SolverSettings,
};
use ies_core::{
    BusInput, Carrier, ChpRole, ChpUnitInput, GeneratorInput, LineId, LineInput, LinkInput,
    LoadInput, Network, NetworkBuilder, Profile, SnapshotWindow, Snapshots,
};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Returns scripted `(objective, s_nom_opt)` pairs, one per call, and records
/// the reactance of line "ext" it was called with.
struct Scripted {
    script: Vec<(f64, f64)>,
    seen_x: Mutex<Vec<f64>>,
}

impl Scripted {
    fn new(script: Vec<(f64, f64)>) -> Arc<Self> {
        Arc::new(Self {
            script,
            seen_x: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<f64> {
        self.seen_x.lock().unwrap().clone()
    }
}

impl LopfBackend for Scripted {
    fn id(&self) -> &str {
        "scripted"
    }

    fn solve(
        &self,
        network: &Network,
        window: SnapshotWindow,
        _constraints: &ConstraintSet,
        _settings: &SolverSettings,
    ) -> Result<SolveOutcome, SolveError> {
        let mut seen = self.seen_x.lock().unwrap();
        seen.push(network.line_by_name("ext").map(|l| l.x).unwrap_or(f64::NAN));
        let (objective, s_nom_opt) = self.script[seen.len() - 1];

        let mut outcome = SolveOutcome {
            objective,
            ..SolveOutcome::default()
        };
        outcome.dispatch.snapshots = window.iter().collect();
        for line in &network.lines {
            let cap = if line.s_nom_extendable {
                s_nom_opt
            } else {
                line.s_nom.value()
            };
            outcome.capacities.lines.insert(line.id, cap);
        }
        Ok(outcome)
    }
}

fn network(extendable: bool) -> Network {
    let start = NaiveDate::from_ymd_opt(2030, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let mut ext = LineInput::new("ext", "a", "b", 0.1)
        .with_impedance(0.02, 0.0, 0.004)
        .with_s_nom(100.0);
    if extendable {
        ext = ext.extendable().with_capital_cost(10.0);
    }
    NetworkBuilder::new("two-bus", Snapshots::hourly(start, 3))
        .bus(BusInput::new("a", Carrier::Ac))
        .bus(BusInput::new("b", Carrier::Ac))
        .line(ext)
        .generator(GeneratorInput::new("g", "a", 500.0).with_marginal_cost(20.0))
        .load(LoadInput::new("l", "b", Profile::Static(80.0)))
        .build()
        .unwrap()
}

fn chp_network() -> Network {
    let start = NaiveDate::from_ymd_opt(2030, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    NetworkBuilder::new("chp", Snapshots::hourly(start, 2))
        .bus(BusInput::new("gas", Carrier::Gas))
        .bus(BusInput::new("el", Carrier::Ac))
        .bus(BusInput::new("heat", Carrier::Heat))
        .link(LinkInput::new("chp_el", "gas", "el", 0.4).with_p_nom(50.0).chp(ChpRole::Electric))
        .link(LinkInput::new("chp_ht", "gas", "heat", 0.5).with_p_nom(80.0).chp(ChpRole::Heat))
        .chp_unit(ChpUnitInput::new("chp", "chp_el", "chp_ht"))
        .build()
        .unwrap()
}

fn solver(dir: &Path, n_iter: usize, backend: &Arc<Scripted>) -> ExpansionSolver {
    let config = Arc::new(RunConfig::new(dir).with_n_iter(n_iter));
    ExpansionSolver::new(config, Arc::clone(backend) as Arc<dyn LopfBackend>)
}

#[test]
fn no_extendable_line_runs_once() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Scripted::new(vec![(42.0, 0.0)]);
    let mut network = network(false);

    let mut solver = solver(dir.path(), 3, &backend);
    let outcome = solver.run(&mut network).unwrap();

    assert_eq!(backend.calls(), vec![0.1]);
    assert_eq!(outcome.result.iteration, None);
    assert_eq!(outcome.result.objective, 42.0);
    assert_eq!(outcome.iterations.len(), 1);
    assert!(outcome.iterations[0].rescaled.is_empty());
    assert_eq!(solver.phase(), ExpansionPhase::Done);
    assert!(dir.path().join("solution.json").exists());
    assert!(!dir.path().join("lopf_iteration_1").exists());
    // line parameters untouched
    assert_eq!(network.lines[0].x, 0.1);
}

#[test]
fn three_iterations_chain_rescales() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Scripted::new(vec![(10.0, 150.0), (9.0, 180.0), (8.0, 200.0)]);
    let mut network = network(true);

    let outcome = solver(dir.path(), 3, &backend).run(&mut network).unwrap();

    let seen = backend.calls();
    assert_eq!(seen.len(), 3);
    assert!((seen[0] - 0.1).abs() < 1e-12);
    assert!((seen[1] - 0.1 * 100.0 / 150.0).abs() < 1e-12);
    assert!((seen[2] - 0.1 * 100.0 / 180.0).abs() < 1e-12);

    assert_eq!(outcome.result.iteration, Some(3));
    assert_eq!(outcome.result.objective, 8.0);
    let objectives: Vec<f64> = outcome.iterations.iter().map(|r| r.objective).collect();
    assert_eq!(objectives, vec![10.0, 9.0, 8.0]);
    assert!((outcome.iterations[0].rescaled[0].ratio - 100.0 / 150.0).abs() < 1e-12);
    assert!((outcome.iterations[1].rescaled[0].ratio - 150.0 / 180.0).abs() < 1e-12);
    assert!(outcome.iterations[2].rescaled.is_empty());

    // the last solve is not followed by a rescale
    assert!((network.lines[0].x - 0.1 * 100.0 / 180.0).abs() < 1e-12);
    assert!((network.lines[0].b - 0.004 * 180.0 / 100.0).abs() < 1e-12);
    assert_eq!(network.lines[0].s_nom_opt.map(|v| v.value()), Some(200.0));

    for i in 1..=3 {
        assert!(dir
            .path()
            .join(format!("lopf_iteration_{i}/solution.json"))
            .exists());
    }
    assert!(dir.path().join("solution.json").exists());
}

#[test]
fn nan_objective_stops_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Scripted::new(vec![(10.0, 150.0), (f64::NAN, 150.0), (8.0, 150.0)]);
    let mut network = network(true);

    let mut solver = solver(dir.path(), 3, &backend);
    let err = solver.run(&mut network).unwrap_err();

    assert!(matches!(
        err,
        ExpansionError::SolveNonConvergence { iteration: 2, .. }
    ));
    assert_eq!(backend.calls().len(), 2);
    assert_eq!(solver.phase(), ExpansionPhase::Solving(2));
    assert!(dir.path().join("lopf_iteration_1").exists());
    assert!(!dir.path().join("lopf_iteration_2").exists());
    assert!(!dir.path().join("lopf_iteration_3").exists());
}

#[test]
fn zero_capacity_is_a_degenerate_rescale() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Scripted::new(vec![(10.0, 0.0), (9.0, 100.0)]);
    let mut network = network(true);

    let err = solver(dir.path(), 2, &backend).run(&mut network).unwrap_err();

    match err {
        ExpansionError::DegenerateRescale {
            iteration,
            line,
            s_nom_pre,
            s_nom_opt,
        } => {
            assert_eq!(iteration, 1);
            assert_eq!(line, "ext");
            assert_eq!(s_nom_pre, 100.0);
            assert_eq!(s_nom_opt, 0.0);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(backend.calls().len(), 1);
}

#[test]
fn single_iteration_never_rescales() {
    let dir = tempfile::tempdir().unwrap();
    // a zero capacity after the last solve is fine
    let backend = Scripted::new(vec![(5.0, 0.0)]);
    let mut network = network(true);

    let outcome = solver(dir.path(), 1, &backend).run(&mut network).unwrap();

    assert_eq!(outcome.result.iteration, Some(1));
    assert_eq!(network.lines[0].x, 0.1);
    assert_eq!(network.lines[0].s_nom_opt.map(|v| v.value()), Some(0.0));
}

#[test]
fn missing_boundary_store_fails_before_solving() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Scripted::new(vec![(1.0, 100.0)]);
    let mut network = network(true);
    let config = Arc::new(RunConfig::new(dir.path()).with_storage_boundary("TA", 10.0));

    let err = ExpansionSolver::new(config, Arc::clone(&backend) as Arc<dyn LopfBackend>)
        .run(&mut network)
        .unwrap_err();

    assert!(matches!(
        err,
        ExpansionError::Constraint(ConstraintError::MissingBoundaryStore { ref store }) if store == "TA"
    ));
    assert!(backend.calls().is_empty());
}

#[test]
fn unmatched_chp_link_fails_before_solving() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Scripted::new(vec![(1.0, 100.0)]);
    let mut network = chp_network();
    network.chp_units.clear();
    let config = Arc::new(RunConfig::new(dir.path()).with_chp(ChpConfig::default()));

    let err = ExpansionSolver::new(config, Arc::clone(&backend) as Arc<dyn LopfBackend>)
        .run(&mut network)
        .unwrap_err();

    assert!(matches!(
        err,
        ExpansionError::Constraint(ConstraintError::MissingCoupledLink { ref link }) if link == "chp_el"
    ));
    assert!(backend.calls().is_empty());
}

#[test]
fn heat_efficiency_is_derived_once() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Scripted::new(vec![(1.0, 0.0)]);
    let mut network = chp_network();
    let config = Arc::new(RunConfig::new(dir.path()).with_chp(ChpConfig::default()));

    let outcome = ExpansionSolver::new(config, Arc::clone(&backend) as Arc<dyn LopfBackend>)
        .run(&mut network)
        .unwrap();

    assert_eq!(outcome.heat_efficiencies.len(), 1);
    let expected = 0.4 / 0.15;
    assert!((outcome.heat_efficiencies[0].efficiency - expected).abs() < 1e-12);
    assert!((network.link_by_name("chp_ht").unwrap().efficiency - expected).abs() < 1e-12);
}

proptest! {
    #[test]
    fn chained_rescale_matches_closed_form(
        x0 in 0.01f64..1.0,
        b0 in 0.001f64..0.1,
        caps in prop::collection::vec(1.0f64..1000.0, 1..6),
    ) {
        let mut network = network(true);
        network.lines[0].x = x0;
        network.lines[0].b = b0;

        let mut state = IterationState::initial(&network);
        for cap in &caps {
            state = state.rescale(&BTreeMap::from([(LineId::new(0), *cap)])).unwrap();
        }

        let last = *caps.last().unwrap();
        let line = &state.lines[&LineId::new(0)];
        let x_expected = x0 * 100.0 / last;
        let b_expected = b0 * last / 100.0;
        prop_assert!((line.params.x - x_expected).abs() <= 1e-9 * x_expected);
        prop_assert!((line.params.b - b_expected).abs() <= 1e-9 * b_expected);
        prop_assert_eq!(line.s_nom_pre, last);
        prop_assert_eq!(state.iteration, caps.len() + 1);
    }
}
