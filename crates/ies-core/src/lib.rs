//! # ies-core: Multi-Carrier Energy System Model
//!
//! Data structures for an integrated energy system (electricity, heat, gas)
//! over an hourly dispatch horizon.
//!
//! ## Design
//!
//! Components live in flat vectors owned by [`Network`]. Every component is
//! addressed by a typed index ([`BusId`], [`LineId`], [`LinkId`], ...) that is
//! its position in the owning vector, so lookups are O(1) and a line id can
//! never be confused with a link id.
//!
//! - **Buses** carry one energy carrier each.
//! - **Lines** are AC branches with electrical parameters `x, r, g, b`.
//! - **Links** convert energy from `bus0` to `bus1` with an efficiency
//!   (boilers, heat pumps, CHP halves, DC interconnectors).
//! - **Generators**, **Loads**, **Stores** and **StorageUnits** attach to a bus.
//! - **CHP units** pair one electric link with one heat link drawing from the
//!   same fuel bus. Pairings are explicit and validated by [`NetworkBuilder`].
//!
//! Networks are normally assembled with [`NetworkBuilder`] (or loaded from a
//! JSON file via [`io::load_network`]) so that every name reference is
//! resolved exactly once.
//!
//! ## Modules
//!
//! - [`builder`] - name-based network assembly and validation
//! - [`diagnostics`] - warnings/errors collected during validation
//! - [`graph_utils`] - AC sub-network detection and topology statistics
//! - [`io`] - JSON network files
//! - [`snapshots`] - dispatch horizon and windows
//! - [`units`] - capacity newtypes

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod builder;
pub mod diagnostics;
pub mod error;
pub mod graph_utils;
pub mod io;
pub mod snapshots;
pub mod units;

pub use builder::{
    BusInput, ChpUnitInput, GeneratorInput, LineInput, LinkInput, LoadInput, NetworkBuilder,
    NetworkFile, SnapshotsInput, StorageUnitInput, StoreInput,
};
pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{IesError, IesResult, NetworkError};
pub use graph_utils::{sub_networks, topology_stats, SubNetwork, TopologyStats};
pub use snapshots::{SnapshotWindow, Snapshots};
pub use units::{MegavoltAmperes, MegawattHours, Megawatts};

macro_rules! define_id {
    ($($name:ident),* $(,)?) => {
        $(
            #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(usize);

            impl $name {
                /// Create an id from a position in the owning collection.
                #[inline]
                pub fn new(value: usize) -> Self {
                    $name(value)
                }

                /// Position in the owning collection.
                #[inline]
                pub fn value(&self) -> usize {
                    self.0
                }
            }
        )*
    };
}

define_id!(BusId, LineId, LinkId, GeneratorId, LoadId, StoreId, StorageUnitId, ChpUnitId);

/// Energy carrier of a bus or component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Carrier {
    #[default]
    Ac,
    Dc,
    Heat,
    Gas,
    #[serde(other)]
    Other,
}

impl Carrier {
    /// Name used in exports and summary metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Carrier::Ac => "AC",
            Carrier::Dc => "DC",
            Carrier::Heat => "heat",
            Carrier::Gas => "gas",
            Carrier::Other => "other",
        }
    }
}

impl std::fmt::Display for Carrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A static value or one value per snapshot of the horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Profile {
    Static(f64),
    Series(Vec<f64>),
}

impl Profile {
    /// Value at snapshot `t`. Series shorter than the horizon read as zero past their end.
    pub fn at(&self, t: usize) -> f64 {
        match self {
            Profile::Static(v) => *v,
            Profile::Series(values) => values.get(t).copied().unwrap_or(0.0),
        }
    }

    /// Length of the series, `None` for static values.
    pub fn series_len(&self) -> Option<usize> {
        match self {
            Profile::Static(_) => None,
            Profile::Series(values) => Some(values.len()),
        }
    }

    /// Smallest value over the series.
    pub fn min(&self) -> f64 {
        match self {
            Profile::Static(v) => *v,
            Profile::Series(values) => values.iter().copied().fold(f64::INFINITY, f64::min),
        }
    }
}

impl Default for Profile {
    fn default() -> Self {
        Profile::Static(0.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bus {
    pub id: BusId,
    pub name: String,
    pub carrier: Carrier,
    /// Nominal voltage in kV, used to convert line reactance to per-unit
    pub v_nom: f64,
}

/// AC branch.
///
/// `x` and `r` are in Ω, `g` and `b` in S. They are consistent with the current
/// `s_nom` only; after an expansion step they must be rescaled before the next
/// solve (see [`LineParameters`]).
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub id: LineId,
    pub name: String,
    pub bus0: BusId,
    pub bus1: BusId,
    pub x: f64,
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub s_nom: MegavoltAmperes,
    pub s_nom_min: MegavoltAmperes,
    pub s_nom_max: MegavoltAmperes,
    pub s_nom_extendable: bool,
    /// Annualized cost per MVA of capacity
    pub capital_cost: f64,
    pub length: f64,
    /// Optimized capacity, populated after a solve
    pub s_nom_opt: Option<MegavoltAmperes>,
}

impl Line {
    /// Current electrical parameters.
    pub fn parameters(&self) -> LineParameters {
        LineParameters {
            x: self.x,
            r: self.r,
            g: self.g,
            b: self.b,
        }
    }
}

/// Electrical parameters of one line, exchanged between expansion iterations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineParameters {
    pub x: f64,
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

/// Role of a link inside a CHP unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChpRole {
    Electric,
    Heat,
}

impl ChpRole {
    /// Name as written in network files.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChpRole::Electric => "electric",
            ChpRole::Heat => "heat",
        }
    }
}

/// Directed conversion from `bus0` to `bus1`.
///
/// `p0` is the power drawn at `bus0`; `p1 = -efficiency * p0` arrives at `bus1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub id: LinkId,
    pub name: String,
    pub carrier: Carrier,
    pub bus0: BusId,
    pub bus1: BusId,
    pub efficiency: f64,
    pub p_nom: Megawatts,
    pub p_nom_min: Megawatts,
    pub p_nom_max: Megawatts,
    pub p_nom_extendable: bool,
    pub p_min_pu: f64,
    pub p_max_pu: f64,
    pub marginal_cost: f64,
    pub capital_cost: f64,
    pub chp_role: Option<ChpRole>,
    pub p_nom_opt: Option<Megawatts>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Generator {
    pub id: GeneratorId,
    pub name: String,
    pub carrier: Carrier,
    pub bus: BusId,
    pub p_nom: Megawatts,
    pub p_nom_min: Megawatts,
    pub p_nom_max: Megawatts,
    pub p_nom_extendable: bool,
    pub p_min_pu: f64,
    /// Availability per snapshot (e.g. PV capacity factors)
    pub p_max_pu: Profile,
    pub marginal_cost: f64,
    pub capital_cost: f64,
    pub p_nom_opt: Option<Megawatts>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Load {
    pub id: LoadId,
    pub name: String,
    pub carrier: Carrier,
    pub bus: BusId,
    /// Demand in MW per snapshot
    pub p_set: Profile,
}

/// Energy store with a free dispatch variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Store {
    pub id: StoreId,
    pub name: String,
    pub carrier: Carrier,
    pub bus: BusId,
    pub e_nom: MegawattHours,
    pub e_nom_min: MegawattHours,
    pub e_nom_max: MegawattHours,
    pub e_nom_extendable: bool,
    pub e_initial: f64,
    pub e_cyclic: bool,
    /// Fraction of content lost per hour
    pub standing_loss: f64,
    pub marginal_cost: f64,
    pub capital_cost: f64,
    pub e_nom_opt: Option<MegawattHours>,
}

/// Storage with separate charge/discharge efficiencies and a power rating.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageUnit {
    pub id: StorageUnitId,
    pub name: String,
    pub carrier: Carrier,
    pub bus: BusId,
    pub p_nom: Megawatts,
    pub p_nom_min: Megawatts,
    pub p_nom_max: Megawatts,
    pub p_nom_extendable: bool,
    /// Energy-to-power ratio
    pub max_hours: f64,
    pub efficiency_store: f64,
    pub efficiency_dispatch: f64,
    pub standing_loss: f64,
    pub state_of_charge_initial: f64,
    pub cyclic_state_of_charge: bool,
    pub marginal_cost: f64,
    pub capital_cost: f64,
    pub p_nom_opt: Option<Megawatts>,
}

/// One electric link and one heat link sharing a fuel bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChpUnit {
    pub id: ChpUnitId,
    pub name: String,
    pub electric: LinkId,
    pub heat: LinkId,
}

/// The integrated energy system.
#[derive(Debug, Clone, Default)]
pub struct Network {
    pub name: String,
    pub snapshots: Snapshots,
    pub buses: Vec<Bus>,
    pub lines: Vec<Line>,
    pub links: Vec<Link>,
    pub generators: Vec<Generator>,
    pub loads: Vec<Load>,
    pub stores: Vec<Store>,
    pub storage_units: Vec<StorageUnit>,
    pub chp_units: Vec<ChpUnit>,
}

impl Network {
    /// Create an empty network over `snapshots`.
    pub fn new(name: impl Into<String>, snapshots: Snapshots) -> Self {
        Self {
            name: name.into(),
            snapshots,
            ..Self::default()
        }
    }

    /// Get a bus by id
    pub fn bus(&self, id: BusId) -> Option<&Bus> {
        self.buses.get(id.value())
    }

    /// Get a line by id
    pub fn line(&self, id: LineId) -> Option<&Line> {
        self.lines.get(id.value())
    }

    /// Get a mutable line by id
    pub fn line_mut(&mut self, id: LineId) -> Option<&mut Line> {
        self.lines.get_mut(id.value())
    }

    /// Get a link by id
    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id.value())
    }

    /// Get a mutable link by id
    pub fn link_mut(&mut self, id: LinkId) -> Option<&mut Link> {
        self.links.get_mut(id.value())
    }

    /// Get a store by id
    pub fn store(&self, id: StoreId) -> Option<&Store> {
        self.stores.get(id.value())
    }

    /// Name of a bus, `"?"` for an unknown id.
    pub fn bus_name(&self, id: BusId) -> &str {
        self.bus(id).map(|b| b.name.as_str()).unwrap_or("?")
    }

    /// Find a bus by name
    pub fn bus_by_name(&self, name: &str) -> Option<&Bus> {
        self.buses.iter().find(|b| b.name == name)
    }

    /// Find a line by name
    pub fn line_by_name(&self, name: &str) -> Option<&Line> {
        self.lines.iter().find(|l| l.name == name)
    }

    /// Find a link by name
    pub fn link_by_name(&self, name: &str) -> Option<&Link> {
        self.links.iter().find(|l| l.name == name)
    }

    /// Find a store by name
    pub fn store_by_name(&self, name: &str) -> Option<&Store> {
        self.stores.iter().find(|s| s.name == name)
    }

    /// Find a generator by name
    pub fn generator_by_name(&self, name: &str) -> Option<&Generator> {
        self.generators.iter().find(|g| g.name == name)
    }

    /// Lines whose capacity is a decision variable.
    pub fn extendable_lines(&self) -> impl Iterator<Item = &Line> {
        self.lines.iter().filter(|l| l.s_nom_extendable)
    }

    /// Whether any line can be expanded.
    pub fn has_extendable_lines(&self) -> bool {
        self.lines.iter().any(|l| l.s_nom_extendable)
    }

    /// Snapshot of the electrical parameters of every line.
    pub fn line_parameters(&self) -> BTreeMap<LineId, LineParameters> {
        self.lines.iter().map(|l| (l.id, l.parameters())).collect()
    }

    /// Overwrite line parameters. Lines missing from `params` keep their values.
    pub fn apply_line_parameters(
        &mut self,
        params: &BTreeMap<LineId, LineParameters>,
    ) -> Result<(), NetworkError> {
        for (id, p) in params {
            let line = self
                .lines
                .get_mut(id.value())
                .ok_or(NetworkError::UnknownLine(id.value()))?;
            line.x = p.x;
            line.r = p.r;
            line.g = p.g;
            line.b = p.b;
        }
        Ok(())
    }

    /// Check CHP pairings: typed roles, a shared fuel bus, each link in at most
    /// one unit, and every electric CHP link matched with a heat link.
    pub fn check_chp_units(&self) -> Result<(), NetworkError> {
        let mut owner: BTreeMap<LinkId, &str> = BTreeMap::new();
        for unit in &self.chp_units {
            let electric = self.link(unit.electric).ok_or_else(|| NetworkError::UnknownLink {
                unit: unit.name.clone(),
                link: format!("#{}", unit.electric.value()),
            })?;
            let heat = self.link(unit.heat).ok_or_else(|| NetworkError::UnknownLink {
                unit: unit.name.clone(),
                link: format!("#{}", unit.heat.value()),
            })?;
            if electric.chp_role != Some(ChpRole::Electric) {
                return Err(NetworkError::ChpRoleMismatch {
                    unit: unit.name.clone(),
                    link: electric.name.clone(),
                    expected: ChpRole::Electric.as_str(),
                });
            }
            if heat.chp_role != Some(ChpRole::Heat) {
                return Err(NetworkError::ChpRoleMismatch {
                    unit: unit.name.clone(),
                    link: heat.name.clone(),
                    expected: ChpRole::Heat.as_str(),
                });
            }
            if electric.bus0 != heat.bus0 {
                return Err(NetworkError::ChpFuelMismatch {
                    unit: unit.name.clone(),
                    electric_bus: self.bus_name(electric.bus0).to_string(),
                    heat_bus: self.bus_name(heat.bus0).to_string(),
                });
            }
            for link in [electric, heat] {
                if let Some(first) = owner.insert(link.id, &unit.name) {
                    return Err(NetworkError::LinkInMultipleUnits {
                        link: link.name.clone(),
                        first: first.to_string(),
                        second: unit.name.clone(),
                    });
                }
            }
        }

        if let Some(orphan) = self
            .links
            .iter()
            .find(|l| l.chp_role == Some(ChpRole::Electric) && !owner.contains_key(&l.id))
        {
            return Err(NetworkError::MissingCoupledLink {
                link: orphan.name.clone(),
            });
        }
        Ok(())
    }

    /// Compute basic statistics about the network
    pub fn stats(&self) -> NetworkStats {
        let horizon = self.snapshots.len();
        let total_load_mwh: f64 = self
            .loads
            .iter()
            .map(|l| {
                (0..horizon)
                    .map(|t| l.p_set.at(t) * self.snapshots.weighting(t))
                    .sum::<f64>()
            })
            .sum();
        NetworkStats {
            num_snapshots: horizon,
            num_buses: self.buses.len(),
            num_lines: self.lines.len(),
            num_links: self.links.len(),
            num_generators: self.generators.len(),
            num_loads: self.loads.len(),
            num_stores: self.stores.len(),
            num_storage_units: self.storage_units.len(),
            num_chp_units: self.chp_units.len(),
            num_extendable_lines: self.extendable_lines().count(),
            total_load_mwh,
        }
    }

    /// Validate network data for issues that make the LOPF ill-posed.
    pub fn validate_into(&self, diag: &mut Diagnostics) {
        if self.buses.is_empty() {
            diag.add_error("structure", "Network has no buses");
            return;
        }
        if self.snapshots.is_empty() {
            diag.add_error("structure", "Network has no snapshots");
            return;
        }
        let horizon = self.snapshots.len();

        for line in &self.lines {
            if !(line.x.is_finite() && line.x > 0.0) {
                diag.add_error_with_entity(
                    "physical",
                    &format!("reactance must be positive, got {}", line.x),
                    &line.name,
                );
            }
            if line.s_nom.value() < 0.0 {
                diag.add_error_with_entity("capacity", "negative s_nom", &line.name);
            }
            if line.s_nom_extendable && line.s_nom_min > line.s_nom_max {
                diag.add_error_with_entity(
                    "capacity",
                    &format!("s_nom_min {} exceeds s_nom_max {}", line.s_nom_min, line.s_nom_max),
                    &line.name,
                );
            }
            if line.s_nom_extendable && line.s_nom.value() <= 0.0 {
                diag.add_warning_with_entity(
                    "capacity",
                    "extendable line starts at zero capacity; impedance rescaling needs a positive s_nom",
                    &line.name,
                );
            }
        }

        for link in &self.links {
            if !(link.efficiency.is_finite() && link.efficiency > 0.0) {
                diag.add_error_with_entity(
                    "physical",
                    &format!("efficiency must be positive, got {}", link.efficiency),
                    &link.name,
                );
            }
            if link.p_min_pu > link.p_max_pu {
                diag.add_error_with_entity("capacity", "p_min_pu exceeds p_max_pu", &link.name);
            }
            if link.p_nom_extendable && link.p_nom_min > link.p_nom_max {
                diag.add_error_with_entity("capacity", "p_nom_min exceeds p_nom_max", &link.name);
            }
        }

        for generator in &self.generators {
            check_profile(diag, &generator.name, &generator.p_max_pu, horizon);
            if generator.p_max_pu.min() < generator.p_min_pu {
                diag.add_warning_with_entity(
                    "capacity",
                    "p_max_pu drops below p_min_pu in some snapshots",
                    &generator.name,
                );
            }
        }

        for load in &self.loads {
            check_profile(diag, &load.name, &load.p_set, horizon);
        }
        if self.stats().total_load_mwh.abs() < 1e-9 {
            diag.add_warning("structure", "Network has no load over the horizon");
        }

        for store in &self.stores {
            if !(0.0..=1.0).contains(&store.standing_loss) {
                diag.add_error_with_entity("physical", "standing_loss must lie in [0, 1]", &store.name);
            }
            if !store.e_nom_extendable && store.e_initial > store.e_nom.value() {
                diag.add_warning_with_entity("capacity", "e_initial exceeds e_nom", &store.name);
            }
        }

        for su in &self.storage_units {
            for (label, eff) in [
                ("efficiency_store", su.efficiency_store),
                ("efficiency_dispatch", su.efficiency_dispatch),
            ] {
                if !(eff.is_finite() && eff > 0.0) {
                    diag.add_error_with_entity(
                        "physical",
                        &format!("{label} must be positive"),
                        &su.name,
                    );
                }
            }
            if su.max_hours < 0.0 {
                diag.add_error_with_entity("capacity", "negative max_hours", &su.name);
            }
        }

        if let Err(err) = self.check_chp_units() {
            diag.add_error("chp", &err.to_string());
        }

        let islands = sub_networks(self);
        if islands.len() > 1 {
            diag.add_warning(
                "topology",
                &format!("AC grid splits into {} sub-networks", islands.len()),
            );
        }
    }
}

fn check_profile(diag: &mut Diagnostics, entity: &str, profile: &Profile, horizon: usize) {
    if let Some(len) = profile.series_len() {
        if len != horizon {
            diag.add_error_with_entity(
                "profile",
                &format!("series has {len} values but the horizon has {horizon} snapshots"),
                entity,
            );
        }
    }
}

/// Statistics about a network's size
#[derive(Debug, Clone, Default, Serialize)]
pub struct NetworkStats {
    pub num_snapshots: usize,
    pub num_buses: usize,
    pub num_lines: usize,
    pub num_links: usize,
    pub num_generators: usize,
    pub num_loads: usize,
    pub num_stores: usize,
    pub num_storage_units: usize,
    pub num_chp_units: usize,
    pub num_extendable_lines: usize,
    pub total_load_mwh: f64,
}

impl std::fmt::Display for NetworkStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} snapshots, {} buses, {} lines ({} extendable), {} links, {} generators, {} loads ({:.0} MWh), {} stores, {} storage units, {} CHP units",
            self.num_snapshots,
            self.num_buses,
            self.num_lines,
            self.num_extendable_lines,
            self.num_links,
            self.num_generators,
            self.num_loads,
            self.total_load_mwh,
            self.num_stores,
            self.num_storage_units,
            self.num_chp_units
        )
    }
}
