//! Linear optimal power flow.
//!
//! A [`LopfBackend`] is the `solve(window, extra_constraints)` primitive of the
//! network model. The built-in backends assemble the same linear program
//! ([`model::LpModel`]) and differ only in the solver they hand it to.
//!
//! Backends are looked up by id through a [`BackendRegistry`]; the configured
//! `solver.name` selects one.

pub mod model;

use crate::config::SolverSettings;
use crate::constraints::{ConstraintSet, VarRef};
use crate::error::{ConfigError, SolveError};
use ies_core::{
    GeneratorId, LineId, LinkId, Network, SnapshotWindow, StorageUnitId, StoreId,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[cfg(feature = "solver-clarabel")]
pub use model::ClarabelLopf;
#[cfg(feature = "solver-highs")]
pub use model::HighsLopf;
pub use model::LpModel;

/// Stand-in bound for capacities given as unbounded.
pub const UNBOUNDED_CAPACITY: f64 = 1e6;

/// Solver backend for the linearized dispatch/expansion problem.
pub trait LopfBackend: Send + Sync {
    /// Registry key, matched against `solver.name`.
    fn id(&self) -> &str;

    /// Runtime availability (a native library may be missing).
    fn is_available(&self) -> bool {
        true
    }

    /// Solve the base model plus `constraints` over `window`.
    ///
    /// A NaN objective is returned as is; classifying it is up to the caller.
    fn solve(
        &self,
        network: &Network,
        window: SnapshotWindow,
        constraints: &ConstraintSet,
        settings: &SolverSettings,
    ) -> Result<SolveOutcome, SolveError>;
}

/// Solved nominal capacities of every component, fixed ones included.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Capacities {
    pub lines: BTreeMap<LineId, f64>,
    pub links: BTreeMap<LinkId, f64>,
    pub generators: BTreeMap<GeneratorId, f64>,
    pub stores: BTreeMap<StoreId, f64>,
    pub storage_units: BTreeMap<StorageUnitId, f64>,
}

/// Time-indexed solution. Every series is aligned with `snapshots`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Dispatch {
    /// Absolute snapshot positions of the solved window
    pub snapshots: Vec<usize>,
    pub generators_p: BTreeMap<GeneratorId, Vec<f64>>,
    pub links_p0: BTreeMap<LinkId, Vec<f64>>,
    /// `−efficiency · p0`
    pub links_p1: BTreeMap<LinkId, Vec<f64>>,
    pub lines_p0: BTreeMap<LineId, Vec<f64>>,
    pub stores_e: BTreeMap<StoreId, Vec<f64>>,
    pub stores_p: BTreeMap<StoreId, Vec<f64>>,
    /// Dispatch minus store power
    pub storage_units_p: BTreeMap<StorageUnitId, Vec<f64>>,
    pub storage_units_soc: BTreeMap<StorageUnitId, Vec<f64>>,
}

impl Dispatch {
    /// Position of `snapshot` within the solved window.
    pub fn offset(&self, snapshot: usize) -> Option<usize> {
        window_offset(&self.snapshots, snapshot)
    }
}

/// Offset of `snapshot` in a contiguous, ascending run of snapshot positions.
pub(crate) fn window_offset(snapshots: &[usize], snapshot: usize) -> Option<usize> {
    let k = snapshot.checked_sub(*snapshots.first()?)?;
    (k < snapshots.len()).then_some(k)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SolveOutcome {
    pub objective: f64,
    pub capacities: Capacities,
    pub dispatch: Dispatch,
}

impl SolveOutcome {
    /// Solved value of a symbolic variable, if it is part of the solution.
    pub fn value(&self, var: &VarRef) -> Option<f64> {
        match *var {
            VarRef::LinkP { link, snapshot } => {
                let k = self.dispatch.offset(snapshot)?;
                self.dispatch.links_p0.get(&link)?.get(k).copied()
            }
            VarRef::LinkPNom(link) => self.capacities.links.get(&link).copied(),
            VarRef::StoreE { store, snapshot } => {
                let k = self.dispatch.offset(snapshot)?;
                self.dispatch.stores_e.get(&store)?.get(k).copied()
            }
        }
    }
}

/// Backends by id.
///
/// Create with `BackendRegistry::new()` for an empty registry or
/// `BackendRegistry::with_defaults()` for the backends compiled in.
#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn LopfBackend>>,
}

impl BackendRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `clarabel` and, with the `solver-highs` feature, `highs`.
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();
        #[cfg(feature = "solver-clarabel")]
        registry.register(Arc::new(ClarabelLopf));
        #[cfg(feature = "solver-highs")]
        registry.register(Arc::new(HighsLopf));
        registry
    }

    /// Add a backend, replacing any with the same id.
    pub fn register(&mut self, backend: Arc<dyn LopfBackend>) {
        self.backends.insert(backend.id().to_string(), backend);
    }

    /// Backend registered under `id`, available or not.
    pub fn get(&self, id: &str) -> Option<Arc<dyn LopfBackend>> {
        self.backends.get(id).cloned()
    }

    /// Sorted ids of the available backends.
    pub fn list(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .backends
            .iter()
            .filter(|(_, b)| b.is_available())
            .map(|(id, _)| id.as_str())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Backend named by the solver settings.
    pub fn resolve(&self, settings: &SolverSettings) -> Result<Arc<dyn LopfBackend>, ConfigError> {
        self.get(&settings.name)
            .filter(|b| b.is_available())
            .ok_or_else(|| ConfigError::UnknownSolver {
                requested: settings.name.clone(),
                available: self.list().join(", "),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unavailable;

    impl LopfBackend for Unavailable {
        fn id(&self) -> &str {
            "gurobi"
        }

        fn is_available(&self) -> bool {
            false
        }

        fn solve(
            &self,
            _network: &Network,
            _window: SnapshotWindow,
            _constraints: &ConstraintSet,
            _settings: &SolverSettings,
        ) -> Result<SolveOutcome, SolveError> {
            Err(SolveError::Backend("not installed".into()))
        }
    }

    #[test]
    fn test_default_registry() {
        let registry = BackendRegistry::with_defaults();
        assert!(registry.list().contains(&"clarabel"));
        assert!(registry.resolve(&SolverSettings::default()).is_ok());
    }

    #[test]
    fn test_unavailable_backend_is_unknown() {
        let mut registry = BackendRegistry::new();
        registry.register(Arc::new(Unavailable));
        let settings = SolverSettings {
            name: "gurobi".into(),
            ..SolverSettings::default()
        };
        assert!(matches!(
            registry.resolve(&settings),
            Err(ConfigError::UnknownSolver { .. })
        ));
    }

    #[test]
    fn test_window_offset() {
        let window = [2, 3, 4];
        assert_eq!(window_offset(&window, 2), Some(0));
        assert_eq!(window_offset(&window, 4), Some(2));
        assert_eq!(window_offset(&window, 1), None);
        assert_eq!(window_offset(&window, 5), None);
        assert_eq!(window_offset(&[], 0), None);
    }

    #[test]
    fn test_outcome_value_lookup() {
        let mut outcome = SolveOutcome::default();
        outcome.dispatch.snapshots = vec![4, 5];
        outcome.dispatch.links_p0.insert(LinkId::new(0), vec![1.0, 2.0]);
        outcome.capacities.links.insert(LinkId::new(0), 50.0);
        assert_eq!(
            outcome.value(&VarRef::LinkP {
                link: LinkId::new(0),
                snapshot: 5
            }),
            Some(2.0)
        );
        assert_eq!(outcome.value(&VarRef::LinkPNom(LinkId::new(0))), Some(50.0));
        assert_eq!(
            outcome.value(&VarRef::LinkP {
                link: LinkId::new(0),
                snapshot: 6
            }),
            None
        );
        assert_eq!(
            outcome.value(&VarRef::LinkP {
                link: LinkId::new(0),
                snapshot: 3
            }),
            None
        );
    }
}
