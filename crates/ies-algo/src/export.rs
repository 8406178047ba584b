//! Tabular export of a solved network.
//!
//! One directory per solve:
//!
//! - static tables: `generators.csv`, `lines.csv`, `links.csv`, `stores.csv`,
//!   `storage_units.csv` (input attributes plus the solved `*_opt` capacity)
//! - time series: `<component>-<attribute>.csv` with one column per component
//!   and one row per snapshot of the solved window
//! - `solution.json` with the objective and solved capacities by name

use crate::lopf::SolveOutcome;
use anyhow::{Context, Result};
use ies_core::{Network, SnapshotWindow};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Serialize)]
struct SolutionFile<'a> {
    network: &'a str,
    window: SnapshotWindow,
    objective: f64,
    lines_s_nom_opt: BTreeMap<&'a str, f64>,
    links_p_nom_opt: BTreeMap<&'a str, f64>,
    generators_p_nom_opt: BTreeMap<&'a str, f64>,
    stores_e_nom_opt: BTreeMap<&'a str, f64>,
    storage_units_p_nom_opt: BTreeMap<&'a str, f64>,
}

/// Write the full export of `outcome` into `dir`, creating it if needed.
pub fn export_solution(dir: &Path, network: &Network, outcome: &SolveOutcome) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("creating output directory '{}'", dir.display()))?;

    write_static_tables(dir, network, outcome)?;
    write_time_series(dir, network, outcome)?;
    write_solution_json(dir, network, outcome)?;

    debug!("Exported solution to {}", dir.display());
    Ok(())
}

fn writer(path: &Path) -> Result<csv::Writer<fs::File>> {
    csv::Writer::from_path(path)
        .with_context(|| format!("creating CSV writer for {}", path.display()))
}

fn write_static_tables(dir: &Path, network: &Network, outcome: &SolveOutcome) -> Result<()> {
    let caps = &outcome.capacities;

    let path = dir.join("generators.csv");
    let mut wtr = writer(&path)?;
    wtr.write_record([
        "name", "bus", "carrier", "p_nom", "p_nom_opt", "p_nom_extendable", "marginal_cost",
        "capital_cost",
    ])
    .context("writing CSV header")?;
    for g in &network.generators {
        let opt = caps.generators.get(&g.id).copied().unwrap_or(g.p_nom.value());
        wtr.write_record([
            g.name.clone(),
            network.bus_name(g.bus).to_string(),
            g.carrier.to_string(),
            g.p_nom.value().to_string(),
            opt.to_string(),
            g.p_nom_extendable.to_string(),
            g.marginal_cost.to_string(),
            g.capital_cost.to_string(),
        ])
        .context("writing CSV record")?;
    }
    wtr.flush().context("flushing CSV writer")?;

    let path = dir.join("lines.csv");
    let mut wtr = writer(&path)?;
    wtr.write_record([
        "name", "bus0", "bus1", "x", "r", "g", "b", "s_nom", "s_nom_opt", "s_nom_extendable",
        "capital_cost",
    ])
    .context("writing CSV header")?;
    for l in &network.lines {
        let opt = caps.lines.get(&l.id).copied().unwrap_or(l.s_nom.value());
        wtr.write_record([
            l.name.clone(),
            network.bus_name(l.bus0).to_string(),
            network.bus_name(l.bus1).to_string(),
            l.x.to_string(),
            l.r.to_string(),
            l.g.to_string(),
            l.b.to_string(),
            l.s_nom.value().to_string(),
            opt.to_string(),
            l.s_nom_extendable.to_string(),
            l.capital_cost.to_string(),
        ])
        .context("writing CSV record")?;
    }
    wtr.flush().context("flushing CSV writer")?;

    let path = dir.join("links.csv");
    let mut wtr = writer(&path)?;
    wtr.write_record([
        "name", "bus0", "bus1", "carrier", "efficiency", "p_nom", "p_nom_opt",
        "p_nom_extendable", "chp_role",
    ])
    .context("writing CSV header")?;
    for l in &network.links {
        let opt = caps.links.get(&l.id).copied().unwrap_or(l.p_nom.value());
        wtr.write_record([
            l.name.clone(),
            network.bus_name(l.bus0).to_string(),
            network.bus_name(l.bus1).to_string(),
            l.carrier.to_string(),
            l.efficiency.to_string(),
            l.p_nom.value().to_string(),
            opt.to_string(),
            l.p_nom_extendable.to_string(),
            l.chp_role.map(|r| r.as_str()).unwrap_or("").to_string(),
        ])
        .context("writing CSV record")?;
    }
    wtr.flush().context("flushing CSV writer")?;

    let path = dir.join("stores.csv");
    let mut wtr = writer(&path)?;
    wtr.write_record(["name", "bus", "e_nom", "e_nom_opt", "e_nom_extendable", "e_cyclic"])
        .context("writing CSV header")?;
    for s in &network.stores {
        let opt = caps.stores.get(&s.id).copied().unwrap_or(s.e_nom.value());
        wtr.write_record([
            s.name.clone(),
            network.bus_name(s.bus).to_string(),
            s.e_nom.value().to_string(),
            opt.to_string(),
            s.e_nom_extendable.to_string(),
            s.e_cyclic.to_string(),
        ])
        .context("writing CSV record")?;
    }
    wtr.flush().context("flushing CSV writer")?;

    let path = dir.join("storage_units.csv");
    let mut wtr = writer(&path)?;
    wtr.write_record(["name", "bus", "p_nom", "p_nom_opt", "p_nom_extendable", "max_hours"])
        .context("writing CSV header")?;
    for s in &network.storage_units {
        let opt = caps.storage_units.get(&s.id).copied().unwrap_or(s.p_nom.value());
        wtr.write_record([
            s.name.clone(),
            network.bus_name(s.bus).to_string(),
            s.p_nom.value().to_string(),
            opt.to_string(),
            s.p_nom_extendable.to_string(),
            s.max_hours.to_string(),
        ])
        .context("writing CSV record")?;
    }
    wtr.flush().context("flushing CSV writer")?;
    Ok(())
}

/// One `snapshot` column followed by one column per component.
fn write_series<'a>(
    path: &Path,
    network: &Network,
    snapshots: &[usize],
    columns: impl IntoIterator<Item = (&'a str, &'a [f64])>,
) -> Result<()> {
    let columns: Vec<(&str, &[f64])> = columns.into_iter().collect();
    let mut wtr = writer(path)?;
    let mut header = vec!["snapshot"];
    header.extend(columns.iter().map(|(name, _)| *name));
    wtr.write_record(&header).context("writing CSV header")?;

    for (k, &t) in snapshots.iter().enumerate() {
        let stamp = network
            .snapshots
            .timestamp(t)
            .map(|ts| ts.format(TIMESTAMP_FORMAT).to_string())
            .unwrap_or_else(|| t.to_string());
        let mut record = vec![stamp];
        record.extend(
            columns
                .iter()
                .map(|(_, values)| values.get(k).map(|v| v.to_string()).unwrap_or_default()),
        );
        wtr.write_record(&record)
            .with_context(|| format!("writing snapshot {} to {}", t, path.display()))?;
    }
    wtr.flush().context("flushing CSV writer")?;
    Ok(())
}

fn write_time_series(dir: &Path, network: &Network, outcome: &SolveOutcome) -> Result<()> {
    let d = &outcome.dispatch;
    let snapshots = &d.snapshots;

    write_series(
        &dir.join("generators-p.csv"),
        network,
        snapshots,
        network.generators.iter().filter_map(|g| {
            d.generators_p.get(&g.id).map(|v| (g.name.as_str(), v.as_slice()))
        }),
    )?;
    write_series(
        &dir.join("links-p0.csv"),
        network,
        snapshots,
        network
            .links
            .iter()
            .filter_map(|l| d.links_p0.get(&l.id).map(|v| (l.name.as_str(), v.as_slice()))),
    )?;
    write_series(
        &dir.join("links-p1.csv"),
        network,
        snapshots,
        network
            .links
            .iter()
            .filter_map(|l| d.links_p1.get(&l.id).map(|v| (l.name.as_str(), v.as_slice()))),
    )?;
    write_series(
        &dir.join("lines-p0.csv"),
        network,
        snapshots,
        network
            .lines
            .iter()
            .filter_map(|l| d.lines_p0.get(&l.id).map(|v| (l.name.as_str(), v.as_slice()))),
    )?;
    write_series(
        &dir.join("stores-e.csv"),
        network,
        snapshots,
        network
            .stores
            .iter()
            .filter_map(|s| d.stores_e.get(&s.id).map(|v| (s.name.as_str(), v.as_slice()))),
    )?;
    write_series(
        &dir.join("stores-p.csv"),
        network,
        snapshots,
        network
            .stores
            .iter()
            .filter_map(|s| d.stores_p.get(&s.id).map(|v| (s.name.as_str(), v.as_slice()))),
    )?;
    write_series(
        &dir.join("storage_units-p.csv"),
        network,
        snapshots,
        network.storage_units.iter().filter_map(|s| {
            d.storage_units_p.get(&s.id).map(|v| (s.name.as_str(), v.as_slice()))
        }),
    )?;
    write_series(
        &dir.join("storage_units-state_of_charge.csv"),
        network,
        snapshots,
        network.storage_units.iter().filter_map(|s| {
            d.storage_units_soc.get(&s.id).map(|v| (s.name.as_str(), v.as_slice()))
        }),
    )?;
    Ok(())
}

fn write_solution_json(dir: &Path, network: &Network, outcome: &SolveOutcome) -> Result<()> {
    let caps = &outcome.capacities;
    let window = match (outcome.dispatch.snapshots.first(), outcome.dispatch.snapshots.last()) {
        (Some(&first), Some(&last)) => SnapshotWindow {
            start: first,
            end: last + 1,
        },
        _ => SnapshotWindow { start: 0, end: 0 },
    };
    let file = SolutionFile {
        network: &network.name,
        window,
        objective: outcome.objective,
        lines_s_nom_opt: network
            .lines
            .iter()
            .filter_map(|l| caps.lines.get(&l.id).map(|v| (l.name.as_str(), *v)))
            .collect(),
        links_p_nom_opt: network
            .links
            .iter()
            .filter_map(|l| caps.links.get(&l.id).map(|v| (l.name.as_str(), *v)))
            .collect(),
        generators_p_nom_opt: network
            .generators
            .iter()
            .filter_map(|g| caps.generators.get(&g.id).map(|v| (g.name.as_str(), *v)))
            .collect(),
        stores_e_nom_opt: network
            .stores
            .iter()
            .filter_map(|s| caps.stores.get(&s.id).map(|v| (s.name.as_str(), *v)))
            .collect(),
        storage_units_p_nom_opt: network
            .storage_units
            .iter()
            .filter_map(|s| caps.storage_units.get(&s.id).map(|v| (s.name.as_str(), *v)))
            .collect(),
    };

    let path = dir.join("solution.json");
    let json = serde_json::to_string_pretty(&file).context("serializing solution to JSON")?;
    fs::write(&path, json).with_context(|| format!("writing JSON to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ies_core::{BusInput, Carrier, GeneratorId, GeneratorInput, LineId, LineInput, NetworkBuilder, Snapshots};

    fn solved() -> (Network, SolveOutcome) {
        let start = NaiveDate::from_ymd_opt(2030, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let network = NetworkBuilder::new("export", Snapshots::hourly(start, 4))
            .bus(BusInput::new("a", Carrier::Ac))
            .bus(BusInput::new("b", Carrier::Ac))
            .line(LineInput::new("ab", "a", "b", 0.1).with_s_nom(100.0).extendable())
            .generator(GeneratorInput::new("gen", "a", 50.0))
            .build()
            .unwrap();
        let mut outcome = SolveOutcome {
            objective: 42.0,
            ..SolveOutcome::default()
        };
        outcome.dispatch.snapshots = vec![1, 2];
        outcome.capacities.lines.insert(LineId::new(0), 150.0);
        outcome.capacities.generators.insert(GeneratorId::new(0), 50.0);
        outcome.dispatch.lines_p0.insert(LineId::new(0), vec![10.0, -5.0]);
        outcome.dispatch.generators_p.insert(GeneratorId::new(0), vec![10.0, 0.0]);
        (network, outcome)
    }

    #[test]
    fn test_export_writes_tables() {
        let (network, outcome) = solved();
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("lopf_iteration_1");
        export_solution(&target, &network, &outcome).unwrap();

        for file in [
            "generators.csv",
            "lines.csv",
            "links.csv",
            "stores.csv",
            "storage_units.csv",
            "generators-p.csv",
            "lines-p0.csv",
            "storage_units-state_of_charge.csv",
            "solution.json",
        ] {
            assert!(target.join(file).exists(), "missing {file}");
        }

        let lines = fs::read_to_string(target.join("lines.csv")).unwrap();
        assert!(lines.lines().nth(1).unwrap().contains(",150,"));

        let series = fs::read_to_string(target.join("lines-p0.csv")).unwrap();
        let rows: Vec<&str> = series.lines().collect();
        assert_eq!(rows[0], "snapshot,ab");
        assert_eq!(rows[1], "2030-01-01 01:00:00,10");
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_solution_json() {
        let (network, outcome) = solved();
        let dir = tempfile::tempdir().unwrap();
        export_solution(dir.path(), &network, &outcome).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("solution.json")).unwrap())
                .unwrap();
        assert_eq!(json["objective"], 42.0);
        assert_eq!(json["lines_s_nom_opt"]["ab"], 150.0);
        assert_eq!(json["window"]["start"], 1);
        assert_eq!(json["window"]["end"], 3);
    }
}
