use clap::{Args, Parser, Subcommand, ValueHint};
use ies_algo::{ConfigError, RunConfig};
use ies_core::SnapshotWindow;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "LOPF orchestration for integrated energy systems", long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info", global = true)]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Solve the network, iterating line expansion when lines are extendable
    Run(RunArgs),
    /// Check a network (and optionally a configuration) without solving
    Validate {
        /// Network description (JSON)
        #[arg(long, value_hint = ValueHint::FilePath)]
        network: PathBuf,
        /// Run configuration (TOML)
        #[arg(long, value_hint = ValueHint::FilePath)]
        config: Option<PathBuf>,
    },
    /// Like `run`, then print the result metrics as a table
    Summary(RunArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Network description (JSON)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub network: PathBuf,

    /// Run configuration (TOML); defaults apply when omitted
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Number of solve/rescale iterations
    #[arg(long)]
    pub n_iter: Option<usize>,

    /// First snapshot of the window (0-based)
    #[arg(long)]
    pub start: Option<usize>,

    /// End of the window (exclusive)
    #[arg(long)]
    pub end: Option<usize>,

    /// Output directory for exports and summary.csv
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub export_dir: Option<PathBuf>,
}

impl RunArgs {
    /// Apply command-line overrides to a parsed configuration.
    ///
    /// A window bound given alone keeps the other bound from the
    /// configuration, or from the full horizon of `horizon` snapshots.
    pub fn apply_overrides(
        &self,
        mut config: RunConfig,
        horizon: usize,
    ) -> Result<RunConfig, ConfigError> {
        if let Some(n_iter) = self.n_iter {
            config.n_iter = n_iter;
        }
        if let Some(dir) = &self.export_dir {
            config.export_dir = dir.clone();
        }
        if self.start.is_some() || self.end.is_some() {
            let current = config.window.unwrap_or(SnapshotWindow {
                start: 0,
                end: horizon,
            });
            let window = SnapshotWindow::new(
                self.start.unwrap_or(current.start),
                self.end.unwrap_or(current.end),
            )?;
            config.window = Some(window);
        }
        Ok(config)
    }
}
