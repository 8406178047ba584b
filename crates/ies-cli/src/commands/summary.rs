use std::io::{self, Write};

use anyhow::Result;
use ies_algo::SummaryTable;
use ies_cli::RunArgs;
use tabwriter::TabWriter;

use crate::commands::run::execute;

pub fn handle(args: &RunArgs) -> Result<()> {
    let solved = execute(args)?;
    print_table(&solved.summary)
}

fn print_table(table: &SummaryTable) -> Result<()> {
    let mut writer = TabWriter::new(io::stdout());
    writeln!(writer, "METRIC\tUNIT\tVALUE")?;
    for row in table.iter() {
        writeln!(writer, "{}\t{}\t{:.3}", row.metric, row.unit, row.value)?;
    }
    writer.flush()?;
    Ok(())
}
