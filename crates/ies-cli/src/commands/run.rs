use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use ies_algo::{
    calc_results, BackendRegistry, ExpansionOutcome, ExpansionSolver, SummaryTable,
};
use ies_cli::RunArgs;
use ies_core::Network;
use tabwriter::TabWriter;
use tracing::{error, info};

use crate::commands::{diagnose, read_config, read_network};

/// Solved network with the outcome and its metrics.
pub struct Solved {
    pub network: Network,
    pub outcome: ExpansionOutcome,
    pub summary: SummaryTable,
}

/// Load, validate, solve and write `summary.csv` next to the exports.
pub fn execute(args: &RunArgs) -> Result<Solved> {
    let mut network = read_network(&args.network)?;
    let config = read_config(args.config.as_deref())?;
    let config = args.apply_overrides(config, network.snapshots.len())?;
    config.validate_for(&network)?;

    let diag = diagnose(&network);
    if diag.has_errors() {
        for issue in diag.errors() {
            error!("{}", issue);
        }
        bail!("network '{}' is not solvable: {}", network.name, diag.summary());
    }

    let registry = BackendRegistry::with_defaults();
    let backend = registry.resolve(&config.solver)?;
    info!("Using solver '{}'", backend.id());

    let config = Arc::new(config);
    let outcome = ExpansionSolver::new(Arc::clone(&config), backend)
        .run(&mut network)
        .context("solving network")?;

    let summary = calc_results(&network, &outcome.result);
    let path = config.export_dir.join("summary.csv");
    summary.to_csv(&path)?;
    info!("Wrote {}", path.display());

    Ok(Solved {
        network,
        outcome,
        summary,
    })
}

pub fn handle(args: &RunArgs) -> Result<()> {
    let solved = execute(args)?;
    print_report(&solved)
}

fn print_report(solved: &Solved) -> Result<()> {
    let outcome = &solved.outcome;
    println!("Network '{}': {}", solved.network.name, solved.network.stats());

    let mut writer = TabWriter::new(io::stdout());
    writeln!(writer, "ITERATION\tOBJECTIVE\tSOLVE [s]\tRESCALED LINES")?;
    for record in &outcome.iterations {
        writeln!(
            writer,
            "{}\t{:.4}\t{:.2}\t{}",
            record.iteration,
            record.objective,
            record.solve_seconds,
            record.rescaled.len()
        )?;
    }
    writer.flush()?;

    for h in &outcome.heat_efficiencies {
        println!(
            "Heat link '{}' on '{}': efficiency {:.4}",
            h.link, h.fuel_bus, h.efficiency
        );
    }
    println!("Objective: {:.4}", outcome.result.objective);
    Ok(())
}
