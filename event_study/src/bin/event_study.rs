use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use event_study::config::load_config_path;
use event_study::models::bar::PriceSeries;
use event_study::study::EventStudy;

#[derive(Parser)]
#[command(version, about = "Event study CLI")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run a study and print the summary.
    Run {
        #[arg(long, value_name = "FILE")]
        config: PathBuf,
        /// JSON array of bars.
        #[arg(long, value_name = "FILE")]
        bars: PathBuf,
        /// JSON array of classified events.
        #[arg(long, value_name = "FILE")]
        events: PathBuf,
        /// Write the full report as JSON.
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Parse and validate a configuration file.
    CheckConfig {
        #[arg(long, value_name = "FILE")]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Cmd::Run {
            config,
            bars,
            events,
            out,
        } => {
            let cfg = load_config_path(&config)
                .with_context(|| format!("load config {}", config.display()))?;
            let calendar = cfg.session_calendar()?;

            let bars = event_study::io::read_bars_path(&bars)
                .with_context(|| format!("read bars {}", bars.display()))?;
            let series = PriceSeries::new(bars, calendar).context("validate price series")?;
            let events = event_study::io::read_events_path(&events)
                .with_context(|| format!("read events {}", events.display()))?;

            let report = EventStudy::new(&series, &cfg).run(&events)?;
            print!("{report}");

            if let Some(path) = out {
                event_study::io::write_report_path(&path, &report)
                    .with_context(|| format!("write report {}", path.display()))?;
                tracing::info!(path = %path.display(), "report written");
            }
        }
        Cmd::CheckConfig { config } => {
            let cfg = load_config_path(&config)
                .with_context(|| format!("load config {}", config.display()))?;
            let names: Vec<&str> = cfg.windows.keys().map(String::as_str).collect();
            println!(
                "ok: {} window(s) [{}], baselines {:?}",
                names.len(),
                names.join(", "),
                cfg.baseline.modes
            );
        }
    }

    Ok(())
}
