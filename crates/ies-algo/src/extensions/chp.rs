//! Combined heat and power coupling.
//!
//! A CHP unit is an electric link and a heat link drawing from the same fuel
//! bus. The flows of the two halves are tied by
//!
//! - the backpressure limit: `c_m · eff_h · p_h(t) <= eff_e · p_e(t)`
//! - the top-iso-fuel-line: `p_h(t) + p_e(t) <= p_nom_e`
//!
//! and, when the electric capacity is a decision variable, the capacities by
//! `eff_e · nom_r · P_e = eff_h · P_h`.
//!
//! Flow rows are emitted per unit or summed per fuel bus ([`ChpGrouping`]).

use super::{ConstraintExtension, ExtensionContext};
use crate::builder::{ConstraintBuilder, Operand, RowTemplate};
use crate::config::ChpGrouping;
use crate::constraints::{ExtraConstraint, Sense};
use crate::error::ConstraintError;
use crate::lopf::UNBOUNDED_CAPACITY;
use ies_core::{BusId, ChpUnit, Link, LinkId, Network, NetworkError, SnapshotWindow};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Heat-link efficiency assigned by [`derive_heat_efficiency`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatEfficiency {
    pub link: String,
    pub fuel_bus: String,
    pub efficiency: f64,
}

struct ChpPair<'a> {
    unit: &'a ChpUnit,
    electric: &'a Link,
    heat: &'a Link,
}

fn check_units(network: &Network) -> Result<(), ConstraintError> {
    network.check_chp_units().map_err(|err| match err {
        NetworkError::MissingCoupledLink { link } => ConstraintError::MissingCoupledLink { link },
        other => ConstraintError::Network(other),
    })
}

fn check_coefficient(name: &'static str, value: f64) -> Result<(), ConstraintError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConstraintError::InvalidCoefficient { name, value })
    }
}

fn resolve<'a>(network: &'a Network, unit: &ChpUnit, id: LinkId) -> Result<&'a Link, ConstraintError> {
    network.link(id).ok_or_else(|| {
        ConstraintError::Network(NetworkError::UnknownLink {
            unit: unit.name.clone(),
            link: format!("#{}", id.value()),
        })
    })
}

fn pairs(network: &Network) -> Result<Vec<ChpPair<'_>>, ConstraintError> {
    check_units(network)?;
    if network.chp_units.is_empty() {
        return Err(ConstraintError::NoChpUnits);
    }
    network
        .chp_units
        .iter()
        .map(|unit| {
            Ok(ChpPair {
                unit,
                electric: resolve(network, unit, unit.electric)?,
                heat: resolve(network, unit, unit.heat)?,
            })
        })
        .collect()
}

/// Units grouped for flow rows, labelled by unit name or fuel bus name.
fn groups(
    network: &Network,
    grouping: ChpGrouping,
) -> Result<Vec<(String, Vec<ChpPair<'_>>)>, ConstraintError> {
    let pairs = pairs(network)?;
    Ok(match grouping {
        ChpGrouping::Unit => pairs
            .into_iter()
            .map(|p| (p.unit.name.clone(), vec![p]))
            .collect(),
        ChpGrouping::FuelNode => {
            let mut by_bus: BTreeMap<BusId, Vec<ChpPair<'_>>> = BTreeMap::new();
            for pair in pairs {
                by_bus.entry(pair.electric.bus0).or_default().push(pair);
            }
            by_bus
                .into_iter()
                .map(|(bus, members)| (network.bus_name(bus).to_string(), members))
                .collect()
        }
    })
}

/// Set every CHP heat-link efficiency to the mean electric efficiency of its
/// fuel bus divided by `c_v`.
///
/// Only static efficiencies are involved, so this runs once per model, not
/// once per iteration.
pub fn derive_heat_efficiency(
    network: &mut Network,
    c_v: f64,
) -> Result<Vec<HeatEfficiency>, ConstraintError> {
    check_coefficient("c_v", c_v)?;

    let mut by_bus: BTreeMap<BusId, (Vec<f64>, Vec<LinkId>)> = BTreeMap::new();
    for pair in pairs(network)? {
        let entry = by_bus.entry(pair.electric.bus0).or_default();
        entry.0.push(pair.electric.efficiency);
        entry.1.push(pair.heat.id);
    }

    let mut assigned = Vec::new();
    for (bus, (electric, heat_links)) in by_bus {
        let mean = electric.iter().sum::<f64>() / electric.len() as f64;
        let efficiency = mean / c_v;
        let fuel_bus = network.bus_name(bus).to_string();
        for id in heat_links {
            if let Some(link) = network.link_mut(id) {
                debug!(
                    "Heat link '{}': efficiency {:.4} -> {:.4}",
                    link.name, link.efficiency, efficiency
                );
                link.efficiency = efficiency;
                assigned.push(HeatEfficiency {
                    link: link.name.clone(),
                    fuel_bus: fuel_bus.clone(),
                    efficiency,
                });
            }
        }
    }
    info!("Derived efficiency of {} CHP heat links (c_v = {})", assigned.len(), c_v);
    Ok(assigned)
}

/// `Σ c_m · eff_h · p_h(t) − eff_e · p_e(t) <= 0` per group and snapshot.
pub fn build_backpressure(
    network: &Network,
    window: SnapshotWindow,
    c_m: f64,
    grouping: ChpGrouping,
    builder: &dyn ConstraintBuilder,
) -> Result<Vec<ExtraConstraint>, ConstraintError> {
    check_coefficient("c_m", c_m)?;
    let snapshots: Vec<usize> = window.iter().collect();
    let mut rows = Vec::new();
    for (label, members) in groups(network, grouping)? {
        let mut template = RowTemplate::new("backpressure", label, Sense::Le, 0.0);
        for pair in &members {
            template = template
                .term(c_m * pair.heat.efficiency, Operand::LinkFlow(pair.heat.id))
                .term(-pair.electric.efficiency, Operand::LinkFlow(pair.electric.id));
        }
        rows.extend(builder.per_snapshot(&template, &snapshots));
    }
    Ok(rows)
}

/// `Σ p_h(t) + p_e(t) <= Σ p_nom_e` per group and snapshot.
///
/// Extendable electric capacities enter the left-hand side as variables.
pub fn build_top_iso_fuel_line(
    network: &Network,
    window: SnapshotWindow,
    grouping: ChpGrouping,
    builder: &dyn ConstraintBuilder,
) -> Result<Vec<ExtraConstraint>, ConstraintError> {
    let snapshots: Vec<usize> = window.iter().collect();
    let mut rows = Vec::new();
    for (label, members) in groups(network, grouping)? {
        let mut template = RowTemplate::new("top_iso_fuel_line", label, Sense::Le, 0.0);
        for pair in &members {
            template = template
                .term(1.0, Operand::LinkFlow(pair.heat.id))
                .term(1.0, Operand::LinkFlow(pair.electric.id));
            if pair.electric.p_nom_extendable {
                template = template.term(-1.0, Operand::LinkCapacity(pair.electric.id));
            } else {
                template.rhs += pair.electric.p_nom.finite_or(UNBOUNDED_CAPACITY);
            }
        }
        rows.extend(builder.per_snapshot(&template, &snapshots));
    }
    Ok(rows)
}

/// `eff_e · nom_r · P_e − eff_h · P_h = 0` for units with an extendable
/// electric link. A fixed heat capacity moves to the right-hand side.
pub fn build_capacity_coupling(
    network: &Network,
    nom_r: f64,
    builder: &dyn ConstraintBuilder,
) -> Result<Vec<ExtraConstraint>, ConstraintError> {
    check_coefficient("nom_r", nom_r)?;
    let mut rows = Vec::new();
    for pair in pairs(network)? {
        if !pair.electric.p_nom_extendable {
            continue;
        }
        let mut template = RowTemplate::new("chp_capacity", pair.unit.name.clone(), Sense::Eq, 0.0)
            .term(
                pair.electric.efficiency * nom_r,
                Operand::LinkCapacity(pair.electric.id),
            );
        if pair.heat.p_nom_extendable {
            template = template.term(-pair.heat.efficiency, Operand::LinkCapacity(pair.heat.id));
        } else {
            template.rhs = pair.heat.efficiency * pair.heat.p_nom.finite_or(UNBOUNDED_CAPACITY);
        }
        rows.push(builder.single(&template)?);
    }
    Ok(rows)
}

#[derive(Debug, Clone)]
pub struct ChpBackpressure {
    pub c_m: f64,
    pub grouping: ChpGrouping,
}

impl ConstraintExtension for ChpBackpressure {
    fn id(&self) -> &str {
        "backpressure"
    }

    fn build(
        &self,
        ctx: &ExtensionContext<'_>,
        builder: &dyn ConstraintBuilder,
    ) -> Result<Vec<ExtraConstraint>, ConstraintError> {
        build_backpressure(ctx.network, ctx.window, self.c_m, self.grouping, builder)
    }
}

#[derive(Debug, Clone)]
pub struct ChpTopIsoFuelLine {
    pub grouping: ChpGrouping,
}

impl ConstraintExtension for ChpTopIsoFuelLine {
    fn id(&self) -> &str {
        "top_iso_fuel_line"
    }

    fn build(
        &self,
        ctx: &ExtensionContext<'_>,
        builder: &dyn ConstraintBuilder,
    ) -> Result<Vec<ExtraConstraint>, ConstraintError> {
        build_top_iso_fuel_line(ctx.network, ctx.window, self.grouping, builder)
    }
}

#[derive(Debug, Clone)]
pub struct ChpCapacityCoupling {
    pub nom_r: f64,
}

impl ConstraintExtension for ChpCapacityCoupling {
    fn id(&self) -> &str {
        "chp_capacity"
    }

    fn build(
        &self,
        ctx: &ExtensionContext<'_>,
        builder: &dyn ConstraintBuilder,
    ) -> Result<Vec<ExtraConstraint>, ConstraintError> {
        build_capacity_coupling(ctx.network, self.nom_r, builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{LinearExpressionBuilder, RuleBuilder};
    use crate::constraints::VarRef;
    use chrono::NaiveDate;
    use ies_core::{BusInput, Carrier, ChpRole, ChpUnitInput, LinkInput, NetworkBuilder, Snapshots};

    /// Two units on one gas bus, one on another.
    fn two_fuel_nodes(extendable: bool) -> Network {
        let start = NaiveDate::from_ymd_opt(2030, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let electric = |name: &str, fuel: &str, eff: f64| {
            let link = LinkInput::new(name, fuel, "el", eff)
                .with_p_nom(50.0)
                .chp(ChpRole::Electric);
            if extendable {
                link.extendable()
            } else {
                link
            }
        };
        NetworkBuilder::new("chp", Snapshots::hourly(start, 3))
            .bus(BusInput::new("gas_a", Carrier::Gas))
            .bus(BusInput::new("gas_b", Carrier::Gas))
            .bus(BusInput::new("el", Carrier::Ac))
            .bus(BusInput::new("heat", Carrier::Heat))
            .link(electric("a1_el", "gas_a", 0.4))
            .link(LinkInput::new("a1_ht", "gas_a", "heat", 0.5).with_p_nom(60.0).chp(ChpRole::Heat))
            .link(electric("a2_el", "gas_a", 0.3))
            .link(LinkInput::new("a2_ht", "gas_a", "heat", 0.5).with_p_nom(60.0).chp(ChpRole::Heat))
            .link(electric("b1_el", "gas_b", 0.45))
            .link(LinkInput::new("b1_ht", "gas_b", "heat", 0.5).with_p_nom(60.0).chp(ChpRole::Heat))
            .chp_unit(ChpUnitInput::new("a1", "a1_el", "a1_ht"))
            .chp_unit(ChpUnitInput::new("a2", "a2_el", "a2_ht"))
            .chp_unit(ChpUnitInput::new("b1", "b1_el", "b1_ht"))
            .build()
            .unwrap()
    }

    fn efficiency(network: &Network, name: &str) -> f64 {
        network.link_by_name(name).unwrap().efficiency
    }

    #[test]
    fn test_heat_efficiency_averages_per_fuel_bus() {
        let mut network = two_fuel_nodes(false);
        let assigned = derive_heat_efficiency(&mut network, 0.15).unwrap();
        assert_eq!(assigned.len(), 3);
        assert!((efficiency(&network, "a1_ht") - 0.35 / 0.15).abs() < 1e-12);
        assert!((efficiency(&network, "a2_ht") - 0.35 / 0.15).abs() < 1e-12);
        assert!((efficiency(&network, "b1_ht") - 0.45 / 0.15).abs() < 1e-12);
        // electric side untouched
        assert_eq!(efficiency(&network, "a1_el"), 0.4);
    }

    #[test]
    fn test_heat_efficiency_needs_units() {
        let mut network = two_fuel_nodes(false);
        network.chp_units.clear();
        for link in &mut network.links {
            link.chp_role = None;
        }
        assert_eq!(
            derive_heat_efficiency(&mut network, 0.15),
            Err(ConstraintError::NoChpUnits)
        );
    }

    #[test]
    fn test_unmatched_electric_link() {
        let mut network = two_fuel_nodes(false);
        network.chp_units.pop();
        assert_eq!(
            build_backpressure(
                &network,
                network.snapshots.full_window(),
                0.75,
                ChpGrouping::Unit,
                &LinearExpressionBuilder
            ),
            Err(ConstraintError::MissingCoupledLink {
                link: "b1_el".into()
            })
        );
    }

    #[test]
    fn test_invalid_c_v() {
        let mut network = two_fuel_nodes(false);
        assert!(matches!(
            derive_heat_efficiency(&mut network, 0.0),
            Err(ConstraintError::InvalidCoefficient { name: "c_v", .. })
        ));
    }

    #[test]
    fn test_backpressure_per_unit() {
        let network = two_fuel_nodes(false);
        let window = SnapshotWindow::new(1, 3).unwrap();
        let rows =
            build_backpressure(&network, window, 0.75, ChpGrouping::Unit, &RuleBuilder).unwrap();
        assert_eq!(rows.len(), 3 * 2);
        let row = &rows[0];
        assert_eq!(row.name, "backpressure:a1[1]");
        assert_eq!(row.sense, Sense::Le);
        assert_eq!(row.rhs, 0.0);
        let heat = network.link_by_name("a1_ht").unwrap().id;
        let elec = network.link_by_name("a1_el").unwrap().id;
        assert_eq!(
            row.terms,
            vec![
                (0.75 * 0.5, VarRef::LinkP { link: heat, snapshot: 1 }),
                (-0.4, VarRef::LinkP { link: elec, snapshot: 1 }),
            ]
        );
    }

    #[test]
    fn test_backpressure_per_fuel_node() {
        let network = two_fuel_nodes(false);
        let rows = build_backpressure(
            &network,
            network.snapshots.full_window(),
            0.75,
            ChpGrouping::FuelNode,
            &LinearExpressionBuilder,
        )
        .unwrap();
        assert_eq!(rows.len(), 2 * 3);
        assert_eq!(rows[0].name, "backpressure:gas_a[0]");
        assert_eq!(rows[0].terms.len(), 4);
        assert_eq!(rows[3].name, "backpressure:gas_b[0]");
    }

    #[test]
    fn test_fuel_line_fixed_capacity() {
        let network = two_fuel_nodes(false);
        let rows = build_top_iso_fuel_line(
            &network,
            network.snapshots.full_window(),
            ChpGrouping::FuelNode,
            &LinearExpressionBuilder,
        )
        .unwrap();
        assert_eq!(rows[0].rhs, 100.0);
        assert!(rows[0].terms.iter().all(|(c, _)| *c == 1.0));
        assert_eq!(rows[3].rhs, 50.0);
    }

    #[test]
    fn test_fuel_line_extendable_capacity() {
        let network = two_fuel_nodes(true);
        let rows = build_top_iso_fuel_line(
            &network,
            network.snapshots.full_window(),
            ChpGrouping::Unit,
            &RuleBuilder,
        )
        .unwrap();
        let elec = network.link_by_name("a1_el").unwrap().id;
        assert_eq!(rows[0].rhs, 0.0);
        assert!(rows[0].terms.contains(&(-1.0, VarRef::LinkPNom(elec))));
    }

    #[test]
    fn test_capacity_coupling() {
        let network = two_fuel_nodes(false);
        assert!(build_capacity_coupling(&network, 1.0, &LinearExpressionBuilder)
            .unwrap()
            .is_empty());

        let network = two_fuel_nodes(true);
        let rows = build_capacity_coupling(&network, 2.0, &LinearExpressionBuilder).unwrap();
        assert_eq!(rows.len(), 3);
        let row = &rows[0];
        assert_eq!(row.name, "chp_capacity:a1");
        assert_eq!(row.sense, Sense::Eq);
        let elec = network.link_by_name("a1_el").unwrap().id;
        assert_eq!(row.terms, vec![(0.8, VarRef::LinkPNom(elec))]);
        // fixed heat capacity of 60 at efficiency 0.5
        assert!((row.rhs - 30.0).abs() < 1e-12);
    }
}
