//! Named result metrics computed from the last solve.

use crate::runner::SolveResult;
use anyhow::{Context, Result};
use ies_core::{Carrier, ChpRole, Network};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub metric: String,
    pub unit: String,
    pub value: f64,
}

/// Ordered metric table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SummaryTable {
    pub rows: Vec<SummaryRow>,
}

impl SummaryTable {
    pub fn push(&mut self, metric: impl Into<String>, unit: &str, value: f64) {
        self.rows.push(SummaryRow {
            metric: metric.into(),
            unit: unit.to_string(),
            value,
        });
    }

    pub fn get(&self, metric: &str) -> Option<f64> {
        self.rows.iter().find(|r| r.metric == metric).map(|r| r.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SummaryRow> {
        self.rows.iter()
    }

    pub fn write_csv<W: Write>(&self, out: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(out);
        wtr.write_record(["metric", "unit", "value"])
            .context("writing CSV header")?;
        for row in &self.rows {
            wtr.write_record([row.metric.as_str(), row.unit.as_str(), &row.value.to_string()])
                .context("writing CSV record")?;
        }
        wtr.flush().context("flushing CSV writer")?;
        Ok(())
    }

    pub fn to_csv(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .with_context(|| format!("creating {}", path.display()))?;
        self.write_csv(file)
    }
}

fn weighted_sum(network: &Network, snapshots: &[usize], values: &[f64], f: impl Fn(f64) -> f64) -> f64 {
    snapshots
        .iter()
        .zip(values)
        .map(|(&t, &v)| network.snapshots.weighting(t) * f(v))
        .sum()
}

/// Economic and energy metrics of a solved network.
pub fn calc_results(network: &Network, result: &SolveResult) -> SummaryTable {
    let caps = &result.capacities;
    let d = &result.dispatch;
    let snapshots = &d.snapshots;
    let mut table = SummaryTable::default();

    // investment, extendable components only
    let line_inv: f64 = network
        .extendable_lines()
        .map(|l| l.capital_cost * caps.lines.get(&l.id).copied().unwrap_or(0.0))
        .sum();
    let mut dc_link_inv = 0.0;
    let mut other_link_inv = 0.0;
    for link in network.links.iter().filter(|l| l.p_nom_extendable) {
        let cost = link.capital_cost * caps.links.get(&link.id).copied().unwrap_or(0.0);
        if link.carrier == Carrier::Dc {
            dc_link_inv += cost;
        } else {
            other_link_inv += cost;
        }
    }
    let generator_inv: f64 = network
        .generators
        .iter()
        .filter(|g| g.p_nom_extendable)
        .map(|g| g.capital_cost * caps.generators.get(&g.id).copied().unwrap_or(0.0))
        .sum();
    let storage_unit_inv: f64 = network
        .storage_units
        .iter()
        .filter(|s| s.p_nom_extendable)
        .map(|s| s.capital_cost * caps.storage_units.get(&s.id).copied().unwrap_or(0.0))
        .sum();
    let store_inv: f64 = network
        .stores
        .iter()
        .filter(|s| s.e_nom_extendable)
        .map(|s| s.capital_cost * caps.stores.get(&s.id).copied().unwrap_or(0.0))
        .sum();
    let investment =
        line_inv + dc_link_inv + other_link_inv + generator_inv + storage_unit_inv + store_inv;

    // marginal cost
    let gen_mc: f64 = network
        .generators
        .iter()
        .filter_map(|g| {
            d.generators_p
                .get(&g.id)
                .map(|p| g.marginal_cost * weighted_sum(network, snapshots, p, |v| v))
        })
        .sum();
    let link_mc: f64 = network
        .links
        .iter()
        .filter_map(|l| {
            d.links_p0
                .get(&l.id)
                .map(|p| l.marginal_cost * weighted_sum(network, snapshots, p, f64::abs))
        })
        .sum();
    let su_mc: f64 = network
        .storage_units
        .iter()
        .filter_map(|s| {
            d.storage_units_p
                .get(&s.id)
                .map(|p| s.marginal_cost * weighted_sum(network, snapshots, p, |v| v.max(0.0)))
        })
        .sum();
    let store_mc: f64 = network
        .stores
        .iter()
        .filter_map(|s| {
            d.stores_p
                .get(&s.id)
                .map(|p| s.marginal_cost * weighted_sum(network, snapshots, p, |v| v))
        })
        .sum();

    table.push("annual system cost", "EUR/a", result.objective);
    table.push("annual investment cost", "EUR/a", investment);
    table.push("investment electric network", "EUR/a", line_inv + dc_link_inv);
    table.push("investment other links", "EUR/a", other_link_inv);
    table.push("investment generators", "EUR/a", generator_inv);
    table.push("investment storage units", "EUR/a", storage_unit_inv);
    table.push("investment stores", "EUR/a", store_inv);
    table.push("annual marginal cost", "EUR/a", gen_mc + link_mc + su_mc + store_mc);

    // expansion
    let (expanded, base) = network.extendable_lines().fold((0.0, 0.0), |(e, b), l| {
        let opt = caps.lines.get(&l.id).copied().unwrap_or(l.s_nom.value());
        (e + (opt - l.s_nom_min.value()), b + l.s_nom.value())
    });
    table.push("line expansion", "MVA", expanded);
    table.push(
        "line expansion relative",
        "%",
        if base > 0.0 { 100.0 * expanded / base } else { 0.0 },
    );
    let su_expansion: f64 = network
        .storage_units
        .iter()
        .filter(|s| s.p_nom_extendable)
        .map(|s| caps.storage_units.get(&s.id).copied().unwrap_or(0.0) - s.p_nom_min.value())
        .sum();
    table.push("storage unit expansion", "MW", su_expansion);
    let store_expansion: f64 = network
        .stores
        .iter()
        .filter(|s| s.e_nom_extendable)
        .map(|s| caps.stores.get(&s.id).copied().unwrap_or(0.0) - s.e_nom_min.value())
        .sum();
    table.push("store expansion", "MWh", store_expansion);

    // energy
    let mut load: BTreeMap<&str, f64> = BTreeMap::new();
    for l in &network.loads {
        let energy: f64 = snapshots
            .iter()
            .map(|&t| network.snapshots.weighting(t) * l.p_set.at(t))
            .sum();
        *load.entry(l.carrier.as_str()).or_default() += energy;
    }
    for (carrier, energy) in load {
        table.push(format!("load {}", carrier), "MWh", energy);
    }

    let mut generation: BTreeMap<&str, f64> = BTreeMap::new();
    for g in &network.generators {
        if let Some(p) = d.generators_p.get(&g.id) {
            *generation.entry(g.carrier.as_str()).or_default() +=
                weighted_sum(network, snapshots, p, |v| v);
        }
    }
    for (carrier, energy) in generation {
        table.push(format!("generation {}", carrier), "MWh", energy);
    }

    let chp_output = |role: ChpRole| -> f64 {
        network
            .links
            .iter()
            .filter(|l| l.chp_role == Some(role))
            .filter_map(|l| d.links_p1.get(&l.id))
            .map(|p1| weighted_sum(network, snapshots, p1, f64::abs))
            .sum()
    };
    table.push("CHP electric output", "MWh", chp_output(ChpRole::Electric));
    table.push("CHP heat output", "MWh", chp_output(ChpRole::Heat));

    let store_throughput: f64 = d
        .stores_p
        .values()
        .map(|p| weighted_sum(network, snapshots, p, f64::abs))
        .sum();
    table.push("store throughput", "MWh", store_throughput);
    let su_throughput: f64 = d
        .storage_units_p
        .values()
        .map(|p| weighted_sum(network, snapshots, p, f64::abs))
        .sum();
    table.push("storage unit throughput", "MWh", su_throughput);

    table
}
