use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::error;

use alloy_plots::config::Config;
use alloy_plots::pipeline::run_all;
use alloy_plots::regime::RegimeTable;

#[derive(Parser, Debug)]
#[command(name = "alloy-plots", version, about = "Render charts for SLM alloy test data")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the jobs in a job file.
    Run {
        job_file: PathBuf,
        /// Run only the named job; may be repeated.
        #[arg(long = "only", value_name = "NAME")]
        only: Vec<String>,
        /// Override the job file's output directory.
        #[arg(long, value_name = "DIR")]
        out_dir: Option<PathBuf>,
    },
    /// Print the regime table, built-in or merged with a job file's.
    Regimes { job_file: Option<PathBuf> },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Cli::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every job succeeded.
fn run(cli: Cli) -> Result<bool> {
    match cli.command {
        Command::Run {
            job_file,
            only,
            out_dir,
        } => {
            let mut config = Config::load(&job_file)?;
            if let Some(dir) = out_dir {
                config.output_dir = dir;
            }
            let results = run_all(&config, &only);
            let failed = results.iter().filter(|(_, r)| r.is_err()).count();
            for (name, result) in &results {
                if let Ok(outcome) = result {
                    for path in outcome.outputs.iter().chain(&outcome.summary) {
                        println!("{name}: {}", path.display());
                    }
                }
            }
            if failed > 0 {
                error!("{failed} of {} job(s) failed", results.len());
            }
            Ok(failed == 0)
        }
        Command::Regimes { job_file } => {
            let regimes = match job_file {
                Some(path) => Config::load(&path)?.regimes,
                None => RegimeTable::builtin(),
            };
            print_regimes(&regimes);
            Ok(true)
        }
    }
}

fn print_regimes(regimes: &RegimeTable) {
    println!(
        "{:<8}{:>8}{:>10}{:>8}{:>8}{:>10}  {:<8}note",
        "regime", "P, W", "v, mm/s", "h, µm", "t, µm", "E, J/mm³", "scan"
    );
    for (label, r) in regimes.iter() {
        let layer = r.layer_um.map(|t| format!("{t}")).unwrap_or_else(|| "-".into());
        println!(
            "{:<8}{:>8}{:>10}{:>8}{:>8}{:>10.1}  {:<8}{}",
            label,
            r.power_w,
            r.speed_mm_s,
            r.hatch_um,
            layer,
            r.energy_density(),
            r.strategy.to_string(),
            r.note.as_deref().unwrap_or("")
        );
    }
}
