//! Run configuration.
//!
//! A [`RunConfig`] is parsed once (usually from TOML), validated once and then
//! handed to every component behind an `Arc`. Nothing mutates it afterwards.
//!
//! ```toml
//! n_iter = 4
//! export_dir = "results"
//! builder = "linear"
//!
//! [window]
//! start = 0
//! end = 8760
//!
//! [solver]
//! name = "clarabel"
//! options = { threads = 4, crossover = false, tolerance = 1e-8 }
//!
//! [chp]
//! c_m = 0.75
//! c_v = 0.15
//!
//! [storage_boundary]
//! store = "TA"
//! target = 2976.0
//! ```

use crate::error::ConfigError;
use ies_core::{Network, SnapshotWindow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Opaque solver option value. Passed through to backends uninterpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SolverOption {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl std::fmt::Display for SolverOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolverOption::Bool(v) => write!(f, "{v}"),
            SolverOption::Int(v) => write!(f, "{v}"),
            SolverOption::Float(v) => write!(f, "{v}"),
            SolverOption::Text(v) => f.write_str(v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SolverSettings {
    #[serde(default = "default_solver")]
    pub name: String,
    #[serde(default)]
    pub options: BTreeMap<String, SolverOption>,
}

fn default_solver() -> String {
    "clarabel".to_string()
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            name: default_solver(),
            options: BTreeMap::new(),
        }
    }
}

/// Constraint-builder strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuilderKind {
    /// Column-wise linear expressions broadcast over the snapshot axis
    #[default]
    Linear,
    /// Row-wise rules evaluated per snapshot
    Rule,
}

/// How CHP flow constraints are grouped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChpGrouping {
    /// One row per CHP unit and snapshot
    #[default]
    Unit,
    /// One row per fuel bus and snapshot, summing all units drawing from it
    FuelNode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChpConfig {
    /// Backpressure limit
    #[serde(default = "default_c_m")]
    pub c_m: f64,
    /// Marginal heat-loss coefficient
    #[serde(default = "default_c_v")]
    pub c_v: f64,
    /// Electric-to-heat nominal capacity ratio used for capacity coupling
    #[serde(default = "default_nom_r")]
    pub nom_r: f64,
    #[serde(default)]
    pub grouping: ChpGrouping,
}

fn default_c_m() -> f64 {
    0.75
}

fn default_c_v() -> f64 {
    0.15
}

fn default_nom_r() -> f64 {
    1.0
}

impl Default for ChpConfig {
    fn default() -> Self {
        Self {
            c_m: default_c_m(),
            c_v: default_c_v(),
            nom_r: default_nom_r(),
            grouping: ChpGrouping::default(),
        }
    }
}

/// Terminal energy requirement for one store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageBoundary {
    pub store: String,
    /// Energy content in MWh at the last snapshot of the window
    pub target: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default = "default_n_iter")]
    pub n_iter: usize,
    /// Defaults to the whole horizon
    #[serde(default)]
    pub window: Option<SnapshotWindow>,
    #[serde(default)]
    pub solver: SolverSettings,
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
    #[serde(default)]
    pub builder: BuilderKind,
    #[serde(default)]
    pub chp: Option<ChpConfig>,
    #[serde(default)]
    pub storage_boundary: Option<StorageBoundary>,
    /// Wall-clock budget for the whole run, checked around each solve
    #[serde(default)]
    pub time_budget_secs: Option<u64>,
}

fn default_n_iter() -> usize {
    1
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("results")
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            n_iter: default_n_iter(),
            window: None,
            solver: SolverSettings::default(),
            export_dir: default_export_dir(),
            builder: BuilderKind::default(),
            chp: None,
            storage_boundary: None,
            time_budget_secs: None,
        }
    }
}

impl RunConfig {
    pub fn new(export_dir: impl Into<PathBuf>) -> Self {
        Self {
            export_dir: export_dir.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn with_n_iter(mut self, n_iter: usize) -> Self {
        self.n_iter = n_iter;
        self
    }

    pub fn with_window(mut self, window: SnapshotWindow) -> Self {
        self.window = Some(window);
        self
    }

    pub fn with_builder(mut self, builder: BuilderKind) -> Self {
        self.builder = builder;
        self
    }

    pub fn with_chp(mut self, chp: ChpConfig) -> Self {
        self.chp = Some(chp);
        self
    }

    pub fn with_storage_boundary(mut self, store: impl Into<String>, target: f64) -> Self {
        self.storage_boundary = Some(StorageBoundary {
            store: store.into(),
            target,
        });
        self
    }

    pub fn with_solver_option(mut self, key: impl Into<String>, value: SolverOption) -> Self {
        self.solver.options.insert(key.into(), value);
        self
    }

    pub fn with_time_budget(mut self, secs: u64) -> Self {
        self.time_budget_secs = Some(secs);
        self
    }

    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget_secs.map(Duration::from_secs)
    }

    /// Window to solve over, falling back to the full horizon.
    pub fn window_for(&self, network: &Network) -> SnapshotWindow {
        self.window.unwrap_or_else(|| network.snapshots.full_window())
    }

    /// Network-independent checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_iter == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        if let Some(chp) = &self.chp {
            for (name, value) in [("c_m", chp.c_m), ("c_v", chp.c_v), ("nom_r", chp.nom_r)] {
                if !(value.is_finite() && value > 0.0) {
                    return Err(ConfigError::NonPositive { name, value });
                }
            }
        }
        if let Some(boundary) = &self.storage_boundary {
            if !boundary.target.is_finite() {
                return Err(ConfigError::NonFiniteTarget(boundary.target));
            }
        }
        Ok(())
    }

    /// Checks that need the network (currently the snapshot window).
    pub fn validate_for(&self, network: &Network) -> Result<SnapshotWindow, ConfigError> {
        self.validate()?;
        let window = self.window_for(network);
        window.validate(&network.snapshots)?;
        Ok(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunConfig::from_toml_str("").unwrap();
        assert_eq!(config.n_iter, 1);
        assert_eq!(config.solver.name, "clarabel");
        assert_eq!(config.builder, BuilderKind::Linear);
        assert!(config.chp.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_full_toml() {
        let text = r#"
            n_iter = 4
            export_dir = "out"
            builder = "rule"
            time_budget_secs = 3600

            [window]
            start = 0
            end = 24

            [solver]
            name = "clarabel"
            options = { threads = 4, crossover = false, tolerance = 1e-8, method = "barrier" }

            [chp]
            c_v = 0.2
            grouping = "fuel_node"

            [storage_boundary]
            store = "TA"
            target = 2976.0
        "#;
        let config = RunConfig::from_toml_str(text).unwrap();
        assert_eq!(config.n_iter, 4);
        assert_eq!(config.builder, BuilderKind::Rule);
        assert_eq!(config.window, Some(SnapshotWindow { start: 0, end: 24 }));
        assert_eq!(config.solver.options["threads"], SolverOption::Int(4));
        assert_eq!(config.solver.options["crossover"], SolverOption::Bool(false));
        assert_eq!(config.solver.options["tolerance"], SolverOption::Float(1e-8));
        assert_eq!(
            config.solver.options["method"],
            SolverOption::Text("barrier".into())
        );
        let chp = config.chp.as_ref().unwrap();
        assert_eq!(chp.c_m, 0.75);
        assert_eq!(chp.c_v, 0.2);
        assert_eq!(chp.grouping, ChpGrouping::FuelNode);
        assert_eq!(config.storage_boundary.as_ref().unwrap().target, 2976.0);
        assert_eq!(config.time_budget(), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(matches!(
            RunConfig::from_toml_str("n_iterations = 3"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let config = RunConfig::new("out").with_n_iter(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroIterations));
    }

    #[test]
    fn test_bad_coefficient_rejected() {
        let config = RunConfig::new("out").with_chp(ChpConfig {
            c_v: 0.0,
            ..ChpConfig::default()
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositive { name: "c_v", .. })
        ));
    }
}
