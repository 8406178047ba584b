//! Name-based network assembly.
//!
//! The `*Input` records reference buses and links by name, exactly as they
//! appear in a network file. [`NetworkBuilder::build`] resolves every name to
//! a typed id once, fills carrier defaults from the connected bus and checks
//! CHP pairings, so nothing downstream ever matches components by name.

use crate::error::NetworkError;
use crate::snapshots::Snapshots;
use crate::{
    Bus, BusId, Carrier, ChpRole, ChpUnit, ChpUnitId, Generator, GeneratorId, Line, LineId, Link,
    LinkId, Load, LoadId, MegavoltAmperes, MegawattHours, Megawatts, Network, Profile,
    StorageUnit, StorageUnitId, Store, StoreId,
};
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

fn one() -> f64 {
    1.0
}

fn unbounded() -> f64 {
    f64::INFINITY
}

fn full_availability() -> Profile {
    Profile::Static(1.0)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BusInput {
    pub name: String,
    #[serde(default)]
    pub carrier: Carrier,
    #[serde(default = "one")]
    pub v_nom: f64,
}

impl BusInput {
    pub fn new(name: impl Into<String>, carrier: Carrier) -> Self {
        Self {
            name: name.into(),
            carrier,
            v_nom: 1.0,
        }
    }

    pub fn with_v_nom(mut self, v_nom: f64) -> Self {
        self.v_nom = v_nom;
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LineInput {
    pub name: String,
    pub bus0: String,
    pub bus1: String,
    pub x: f64,
    #[serde(default)]
    pub r: f64,
    #[serde(default)]
    pub g: f64,
    #[serde(default)]
    pub b: f64,
    #[serde(default)]
    pub s_nom: f64,
    #[serde(default)]
    pub s_nom_min: f64,
    #[serde(default = "unbounded")]
    pub s_nom_max: f64,
    #[serde(default)]
    pub s_nom_extendable: bool,
    #[serde(default)]
    pub capital_cost: f64,
    #[serde(default)]
    pub length: f64,
}

impl LineInput {
    pub fn new(
        name: impl Into<String>,
        bus0: impl Into<String>,
        bus1: impl Into<String>,
        x: f64,
    ) -> Self {
        Self {
            name: name.into(),
            bus0: bus0.into(),
            bus1: bus1.into(),
            x,
            r: 0.0,
            g: 0.0,
            b: 0.0,
            s_nom: 0.0,
            s_nom_min: 0.0,
            s_nom_max: f64::INFINITY,
            s_nom_extendable: false,
            capital_cost: 0.0,
            length: 0.0,
        }
    }

    /// Set `s_nom`. On an extendable line this also raises the lower bound.
    pub fn with_s_nom(mut self, s_nom: f64) -> Self {
        self.s_nom = s_nom;
        if self.s_nom_extendable {
            self.s_nom_min = self.s_nom_min.max(s_nom);
        }
        self
    }

    pub fn with_impedance(mut self, r: f64, g: f64, b: f64) -> Self {
        self.r = r;
        self.g = g;
        self.b = b;
        self
    }

    /// Make capacity a decision variable bounded below by `s_nom`, whether
    /// `s_nom` is set before or after this call.
    pub fn extendable(mut self) -> Self {
        self.s_nom_extendable = true;
        self.s_nom_min = self.s_nom_min.max(self.s_nom);
        self
    }

    pub fn with_s_nom_max(mut self, s_nom_max: f64) -> Self {
        self.s_nom_max = s_nom_max;
        self
    }

    pub fn with_capital_cost(mut self, cost: f64) -> Self {
        self.capital_cost = cost;
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkInput {
    pub name: String,
    pub bus0: String,
    pub bus1: String,
    #[serde(default = "one")]
    pub efficiency: f64,
    #[serde(default)]
    pub carrier: Option<Carrier>,
    #[serde(default)]
    pub p_nom: f64,
    #[serde(default)]
    pub p_nom_min: f64,
    #[serde(default = "unbounded")]
    pub p_nom_max: f64,
    #[serde(default)]
    pub p_nom_extendable: bool,
    #[serde(default)]
    pub p_min_pu: f64,
    #[serde(default = "one")]
    pub p_max_pu: f64,
    #[serde(default)]
    pub marginal_cost: f64,
    #[serde(default)]
    pub capital_cost: f64,
    #[serde(default)]
    pub chp_role: Option<ChpRole>,
}

impl LinkInput {
    pub fn new(
        name: impl Into<String>,
        bus0: impl Into<String>,
        bus1: impl Into<String>,
        efficiency: f64,
    ) -> Self {
        Self {
            name: name.into(),
            bus0: bus0.into(),
            bus1: bus1.into(),
            efficiency,
            carrier: None,
            p_nom: 0.0,
            p_nom_min: 0.0,
            p_nom_max: f64::INFINITY,
            p_nom_extendable: false,
            p_min_pu: 0.0,
            p_max_pu: 1.0,
            marginal_cost: 0.0,
            capital_cost: 0.0,
            chp_role: None,
        }
    }

    pub fn with_p_nom(mut self, p_nom: f64) -> Self {
        self.p_nom = p_nom;
        if self.p_nom_extendable {
            self.p_nom_min = self.p_nom_min.max(p_nom);
        }
        self
    }

    /// Make capacity a decision variable bounded below by `p_nom`.
    pub fn extendable(mut self) -> Self {
        self.p_nom_extendable = true;
        self.p_nom_min = self.p_nom_min.max(self.p_nom);
        self
    }

    pub fn with_costs(mut self, marginal_cost: f64, capital_cost: f64) -> Self {
        self.marginal_cost = marginal_cost;
        self.capital_cost = capital_cost;
        self
    }

    /// Allow flow in both directions (`p_min_pu = -1`).
    pub fn bidirectional(mut self) -> Self {
        self.p_min_pu = -1.0;
        self
    }

    pub fn with_carrier(mut self, carrier: Carrier) -> Self {
        self.carrier = Some(carrier);
        self
    }

    pub fn chp(mut self, role: ChpRole) -> Self {
        self.chp_role = Some(role);
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneratorInput {
    pub name: String,
    pub bus: String,
    #[serde(default)]
    pub carrier: Option<Carrier>,
    #[serde(default)]
    pub p_nom: f64,
    #[serde(default)]
    pub p_nom_min: f64,
    #[serde(default = "unbounded")]
    pub p_nom_max: f64,
    #[serde(default)]
    pub p_nom_extendable: bool,
    #[serde(default)]
    pub p_min_pu: f64,
    #[serde(default = "full_availability")]
    pub p_max_pu: Profile,
    #[serde(default)]
    pub marginal_cost: f64,
    #[serde(default)]
    pub capital_cost: f64,
}

impl GeneratorInput {
    pub fn new(name: impl Into<String>, bus: impl Into<String>, p_nom: f64) -> Self {
        Self {
            name: name.into(),
            bus: bus.into(),
            carrier: None,
            p_nom,
            p_nom_min: 0.0,
            p_nom_max: f64::INFINITY,
            p_nom_extendable: false,
            p_min_pu: 0.0,
            p_max_pu: Profile::Static(1.0),
            marginal_cost: 0.0,
            capital_cost: 0.0,
        }
    }

    pub fn with_marginal_cost(mut self, cost: f64) -> Self {
        self.marginal_cost = cost;
        self
    }

    pub fn with_p_max_pu(mut self, profile: Profile) -> Self {
        self.p_max_pu = profile;
        self
    }

    pub fn with_carrier(mut self, carrier: Carrier) -> Self {
        self.carrier = Some(carrier);
        self
    }

    pub fn extendable(mut self, capital_cost: f64) -> Self {
        self.p_nom_extendable = true;
        self.p_nom_min = self.p_nom;
        self.capital_cost = capital_cost;
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadInput {
    pub name: String,
    pub bus: String,
    #[serde(default)]
    pub carrier: Option<Carrier>,
    #[serde(default)]
    pub p_set: Profile,
}

impl LoadInput {
    pub fn new(name: impl Into<String>, bus: impl Into<String>, p_set: Profile) -> Self {
        Self {
            name: name.into(),
            bus: bus.into(),
            carrier: None,
            p_set,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreInput {
    pub name: String,
    pub bus: String,
    #[serde(default)]
    pub carrier: Option<Carrier>,
    #[serde(default)]
    pub e_nom: f64,
    #[serde(default)]
    pub e_nom_min: f64,
    #[serde(default = "unbounded")]
    pub e_nom_max: f64,
    #[serde(default)]
    pub e_nom_extendable: bool,
    #[serde(default)]
    pub e_initial: f64,
    #[serde(default)]
    pub e_cyclic: bool,
    #[serde(default)]
    pub standing_loss: f64,
    #[serde(default)]
    pub marginal_cost: f64,
    #[serde(default)]
    pub capital_cost: f64,
}

impl StoreInput {
    pub fn new(name: impl Into<String>, bus: impl Into<String>, e_nom: f64) -> Self {
        Self {
            name: name.into(),
            bus: bus.into(),
            carrier: None,
            e_nom,
            e_nom_min: 0.0,
            e_nom_max: f64::INFINITY,
            e_nom_extendable: false,
            e_initial: 0.0,
            e_cyclic: false,
            standing_loss: 0.0,
            marginal_cost: 0.0,
            capital_cost: 0.0,
        }
    }

    pub fn with_e_initial(mut self, e_initial: f64) -> Self {
        self.e_initial = e_initial;
        self
    }

    pub fn cyclic(mut self) -> Self {
        self.e_cyclic = true;
        self
    }

    pub fn with_standing_loss(mut self, loss: f64) -> Self {
        self.standing_loss = loss;
        self
    }

    pub fn extendable(mut self, capital_cost: f64) -> Self {
        self.e_nom_extendable = true;
        self.e_nom_min = self.e_nom;
        self.capital_cost = capital_cost;
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageUnitInput {
    pub name: String,
    pub bus: String,
    #[serde(default)]
    pub carrier: Option<Carrier>,
    #[serde(default)]
    pub p_nom: f64,
    #[serde(default)]
    pub p_nom_min: f64,
    #[serde(default = "unbounded")]
    pub p_nom_max: f64,
    #[serde(default)]
    pub p_nom_extendable: bool,
    #[serde(default = "one")]
    pub max_hours: f64,
    #[serde(default = "one")]
    pub efficiency_store: f64,
    #[serde(default = "one")]
    pub efficiency_dispatch: f64,
    #[serde(default)]
    pub standing_loss: f64,
    #[serde(default)]
    pub state_of_charge_initial: f64,
    #[serde(default)]
    pub cyclic_state_of_charge: bool,
    #[serde(default)]
    pub marginal_cost: f64,
    #[serde(default)]
    pub capital_cost: f64,
}

impl StorageUnitInput {
    pub fn new(
        name: impl Into<String>,
        bus: impl Into<String>,
        p_nom: f64,
        max_hours: f64,
    ) -> Self {
        Self {
            name: name.into(),
            bus: bus.into(),
            carrier: None,
            p_nom,
            p_nom_min: 0.0,
            p_nom_max: f64::INFINITY,
            p_nom_extendable: false,
            max_hours,
            efficiency_store: 1.0,
            efficiency_dispatch: 1.0,
            standing_loss: 0.0,
            state_of_charge_initial: 0.0,
            cyclic_state_of_charge: false,
            marginal_cost: 0.0,
            capital_cost: 0.0,
        }
    }

    pub fn with_efficiencies(mut self, store: f64, dispatch: f64) -> Self {
        self.efficiency_store = store;
        self.efficiency_dispatch = dispatch;
        self
    }

    pub fn cyclic(mut self) -> Self {
        self.cyclic_state_of_charge = true;
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChpUnitInput {
    pub name: String,
    pub electric: String,
    pub heat: String,
}

impl ChpUnitInput {
    pub fn new(
        name: impl Into<String>,
        electric: impl Into<String>,
        heat: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            electric: electric.into(),
            heat: heat.into(),
        }
    }
}

/// Hourly horizon description used in network files.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotsInput {
    pub start: NaiveDateTime,
    pub count: usize,
    #[serde(default)]
    pub weightings: Option<Vec<f64>>,
}

impl SnapshotsInput {
    pub fn to_snapshots(&self) -> Result<Snapshots, NetworkError> {
        if self.count == 0 {
            return Err(NetworkError::InvalidSnapshots("horizon is empty".into()));
        }
        let snapshots = Snapshots::hourly(self.start, self.count);
        match &self.weightings {
            Some(w) => snapshots.with_weightings(w.clone()),
            None => Ok(snapshots),
        }
    }
}

/// On-disk layout of a network (see [`crate::io::load_network`]).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkFile {
    #[serde(default)]
    pub name: String,
    pub snapshots: SnapshotsInput,
    pub buses: Vec<BusInput>,
    #[serde(default)]
    pub lines: Vec<LineInput>,
    #[serde(default)]
    pub links: Vec<LinkInput>,
    #[serde(default)]
    pub generators: Vec<GeneratorInput>,
    #[serde(default)]
    pub loads: Vec<LoadInput>,
    #[serde(default)]
    pub stores: Vec<StoreInput>,
    #[serde(default)]
    pub storage_units: Vec<StorageUnitInput>,
    #[serde(default)]
    pub chp_units: Vec<ChpUnitInput>,
}

/// Collects component inputs and resolves them into a [`Network`].
#[derive(Debug, Clone, Default)]
pub struct NetworkBuilder {
    name: String,
    snapshots: Snapshots,
    buses: Vec<BusInput>,
    lines: Vec<LineInput>,
    links: Vec<LinkInput>,
    generators: Vec<GeneratorInput>,
    loads: Vec<LoadInput>,
    stores: Vec<StoreInput>,
    storage_units: Vec<StorageUnitInput>,
    chp_units: Vec<ChpUnitInput>,
}

impl NetworkBuilder {
    pub fn new(name: impl Into<String>, snapshots: Snapshots) -> Self {
        Self {
            name: name.into(),
            snapshots,
            ..Self::default()
        }
    }

    /// Start from a parsed network file.
    pub fn from_file(file: NetworkFile) -> Result<Self, NetworkError> {
        let snapshots = file.snapshots.to_snapshots()?;
        Ok(Self {
            name: file.name,
            snapshots,
            buses: file.buses,
            lines: file.lines,
            links: file.links,
            generators: file.generators,
            loads: file.loads,
            stores: file.stores,
            storage_units: file.storage_units,
            chp_units: file.chp_units,
        })
    }

    pub fn bus(mut self, input: BusInput) -> Self {
        self.buses.push(input);
        self
    }

    pub fn line(mut self, input: LineInput) -> Self {
        self.lines.push(input);
        self
    }

    pub fn link(mut self, input: LinkInput) -> Self {
        self.links.push(input);
        self
    }

    pub fn generator(mut self, input: GeneratorInput) -> Self {
        self.generators.push(input);
        self
    }

    pub fn load(mut self, input: LoadInput) -> Self {
        self.loads.push(input);
        self
    }

    pub fn store(mut self, input: StoreInput) -> Self {
        self.stores.push(input);
        self
    }

    pub fn storage_unit(mut self, input: StorageUnitInput) -> Self {
        self.storage_units.push(input);
        self
    }

    pub fn chp_unit(mut self, input: ChpUnitInput) -> Self {
        self.chp_units.push(input);
        self
    }

    pub fn build(self) -> Result<Network, NetworkError> {
        let mut network = Network::new(self.name, self.snapshots);
        let horizon = network.snapshots.len();

        let mut bus_index: HashMap<String, (BusId, Carrier)> = HashMap::new();
        for (i, input) in self.buses.into_iter().enumerate() {
            let id = BusId::new(i);
            if bus_index
                .insert(input.name.clone(), (id, input.carrier))
                .is_some()
            {
                return Err(NetworkError::DuplicateName {
                    kind: "bus",
                    name: input.name,
                });
            }
            network.buses.push(Bus {
                id,
                name: input.name,
                carrier: input.carrier,
                v_nom: input.v_nom,
            });
        }
        let resolve = |component: &str, bus: &str| {
            bus_index
                .get(bus)
                .copied()
                .ok_or_else(|| NetworkError::UnknownBus {
                    component: component.to_string(),
                    bus: bus.to_string(),
                })
        };

        let mut seen = HashSet::new();
        for (i, input) in self.lines.into_iter().enumerate() {
            unique(&mut seen, "line", &input.name)?;
            let (bus0, _) = resolve(&input.name, &input.bus0)?;
            let (bus1, _) = resolve(&input.name, &input.bus1)?;
            network.lines.push(Line {
                id: LineId::new(i),
                name: input.name,
                bus0,
                bus1,
                x: input.x,
                r: input.r,
                g: input.g,
                b: input.b,
                s_nom: MegavoltAmperes(input.s_nom),
                s_nom_min: MegavoltAmperes(input.s_nom_min),
                s_nom_max: MegavoltAmperes(input.s_nom_max),
                s_nom_extendable: input.s_nom_extendable,
                capital_cost: input.capital_cost,
                length: input.length,
                s_nom_opt: None,
            });
        }

        let mut link_index: HashMap<String, LinkId> = HashMap::new();
        for (i, input) in self.links.into_iter().enumerate() {
            let id = LinkId::new(i);
            if link_index.insert(input.name.clone(), id).is_some() {
                return Err(NetworkError::DuplicateName {
                    kind: "link",
                    name: input.name,
                });
            }
            let (bus0, _) = resolve(&input.name, &input.bus0)?;
            let (bus1, bus1_carrier) = resolve(&input.name, &input.bus1)?;
            network.links.push(Link {
                id,
                name: input.name,
                carrier: input.carrier.unwrap_or(bus1_carrier),
                bus0,
                bus1,
                efficiency: input.efficiency,
                p_nom: Megawatts(input.p_nom),
                p_nom_min: Megawatts(input.p_nom_min),
                p_nom_max: Megawatts(input.p_nom_max),
                p_nom_extendable: input.p_nom_extendable,
                p_min_pu: input.p_min_pu,
                p_max_pu: input.p_max_pu,
                marginal_cost: input.marginal_cost,
                capital_cost: input.capital_cost,
                chp_role: input.chp_role,
                p_nom_opt: None,
            });
        }

        seen.clear();
        for (i, input) in self.generators.into_iter().enumerate() {
            unique(&mut seen, "generator", &input.name)?;
            let (bus, carrier) = resolve(&input.name, &input.bus)?;
            check_len(&input.name, &input.p_max_pu, horizon)?;
            network.generators.push(Generator {
                id: GeneratorId::new(i),
                name: input.name,
                carrier: input.carrier.unwrap_or(carrier),
                bus,
                p_nom: Megawatts(input.p_nom),
                p_nom_min: Megawatts(input.p_nom_min),
                p_nom_max: Megawatts(input.p_nom_max),
                p_nom_extendable: input.p_nom_extendable,
                p_min_pu: input.p_min_pu,
                p_max_pu: input.p_max_pu,
                marginal_cost: input.marginal_cost,
                capital_cost: input.capital_cost,
                p_nom_opt: None,
            });
        }

        seen.clear();
        for (i, input) in self.loads.into_iter().enumerate() {
            unique(&mut seen, "load", &input.name)?;
            let (bus, carrier) = resolve(&input.name, &input.bus)?;
            check_len(&input.name, &input.p_set, horizon)?;
            network.loads.push(Load {
                id: LoadId::new(i),
                name: input.name,
                carrier: input.carrier.unwrap_or(carrier),
                bus,
                p_set: input.p_set,
            });
        }

        seen.clear();
        for (i, input) in self.stores.into_iter().enumerate() {
            unique(&mut seen, "store", &input.name)?;
            let (bus, carrier) = resolve(&input.name, &input.bus)?;
            network.stores.push(Store {
                id: StoreId::new(i),
                name: input.name,
                carrier: input.carrier.unwrap_or(carrier),
                bus,
                e_nom: MegawattHours(input.e_nom),
                e_nom_min: MegawattHours(input.e_nom_min),
                e_nom_max: MegawattHours(input.e_nom_max),
                e_nom_extendable: input.e_nom_extendable,
                e_initial: input.e_initial,
                e_cyclic: input.e_cyclic,
                standing_loss: input.standing_loss,
                marginal_cost: input.marginal_cost,
                capital_cost: input.capital_cost,
                e_nom_opt: None,
            });
        }

        seen.clear();
        for (i, input) in self.storage_units.into_iter().enumerate() {
            unique(&mut seen, "storage unit", &input.name)?;
            let (bus, carrier) = resolve(&input.name, &input.bus)?;
            network.storage_units.push(StorageUnit {
                id: StorageUnitId::new(i),
                name: input.name,
                carrier: input.carrier.unwrap_or(carrier),
                bus,
                p_nom: Megawatts(input.p_nom),
                p_nom_min: Megawatts(input.p_nom_min),
                p_nom_max: Megawatts(input.p_nom_max),
                p_nom_extendable: input.p_nom_extendable,
                max_hours: input.max_hours,
                efficiency_store: input.efficiency_store,
                efficiency_dispatch: input.efficiency_dispatch,
                standing_loss: input.standing_loss,
                state_of_charge_initial: input.state_of_charge_initial,
                cyclic_state_of_charge: input.cyclic_state_of_charge,
                marginal_cost: input.marginal_cost,
                capital_cost: input.capital_cost,
                p_nom_opt: None,
            });
        }

        seen.clear();
        for (i, input) in self.chp_units.into_iter().enumerate() {
            unique(&mut seen, "CHP unit", &input.name)?;
            let lookup = |link: &str| {
                link_index
                    .get(link)
                    .copied()
                    .ok_or_else(|| NetworkError::UnknownLink {
                        unit: input.name.clone(),
                        link: link.to_string(),
                    })
            };
            let electric = lookup(&input.electric)?;
            let heat = lookup(&input.heat)?;
            network.chp_units.push(ChpUnit {
                id: ChpUnitId::new(i),
                name: input.name,
                electric,
                heat,
            });
        }

        network.check_chp_units()?;
        Ok(network)
    }
}

fn unique(
    seen: &mut HashSet<String>,
    kind: &'static str,
    name: &str,
) -> Result<(), NetworkError> {
    if seen.insert(name.to_string()) {
        Ok(())
    } else {
        Err(NetworkError::DuplicateName {
            kind,
            name: name.to_string(),
        })
    }
}

fn check_len(component: &str, profile: &Profile, horizon: usize) -> Result<(), NetworkError> {
    match profile.series_len() {
        Some(len) if len != horizon => Err(NetworkError::ProfileLength {
            component: component.to_string(),
            expected: horizon,
            actual: len,
        }),
        _ => Ok(()),
    }
}
