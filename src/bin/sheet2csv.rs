//! CLI binary for sheet2csv.
//!
//! A thin shim over the library crate that maps CLI flags to `FlowConfig`,
//! drives one full flow cycle, and renders the events.

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use sheet2csv::{
    ConvertOutcome, DownloadOutcome, FlowConfig, FlowEvent, FlowObserver, FlowObserverHandle,
    Selection, UploadFlowController,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── Terminal flow observer using indicatif ───────────────────────────────────

/// Renders the cosmetic upload progress as a live bar and the rest of the
/// flow as log lines. The bar tracks the decorative percentage the
/// controller ticks, not the real transfer.
struct CliFlowObserver {
    bar: ProgressBar,
}

impl CliFlowObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(100);

        // Spinner-only until the upload starts.
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }

    /// Switch to the percentage-bar style once the upload is in flight.
    fn activate_bar(&self) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_style(progress_style);
        self.bar.set_prefix("Uploading");
        self.bar.set_position(0);
    }
}

impl FlowObserver for CliFlowObserver {
    fn on_file_selected(&self, name: &str) {
        self.bar
            .println(format!("{} {}", cyan("◆"), bold(name)));
    }

    fn on_convert_started(&self, name: &str) {
        self.activate_bar();
        self.bar.set_message(name.to_owned());
    }

    fn on_progress(&self, percent: u8) {
        self.bar.set_position(percent as u64);
    }

    fn on_converted(&self, _output: &str) {
        self.bar.finish_and_clear();
        eprintln!("{} conversion ready", green("✔"));
    }

    fn on_upload_failed(&self, message: &str) {
        self.bar.finish_and_clear();
        eprintln!("{} {}", red("✘"), red(message));
    }

    fn on_download_started(&self, file_name: &str) {
        eprintln!("{} downloading {}", cyan("◆"), bold(file_name));
    }

    fn on_saved(&self, path: &Path) {
        eprintln!("{} saved {}", green("✔"), bold(&path.display().to_string()));
    }

    fn on_countdown_tick(&self, seconds_left: u64) {
        eprint!("\r{}", dim(&format!("Cache clear in {seconds_left} sec…  ")));
        if seconds_left == 0 {
            eprintln!();
        }
    }

    fn on_cleanup_triggered(&self) {
        eprintln!("\r{}", dim("server cleanup triggered      "));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a workbook, CSV saved next to the shell's cwd
  sheet2csv report.xlsx --endpoint http://localhost:8000

  # Save into a specific directory
  sheet2csv "Sales Q1.xlsx" -e http://localhost:8000 -o downloads/

  # Endpoint from the environment, machine-readable summary
  export SHEET2CSV_ENDPOINT=http://localhost:8000
  sheet2csv report.xlsx --json

FLOW:
  1. The workbook's extension is validated (.xlsx or .xls).
  2. The file is uploaded; a decorative progress bar fills over 2 seconds.
  3. The converted CSV is fetched and saved as <basename>.csv.
  4. A 10-second countdown runs; the service's temp files are cleared
     1 second in, and the flow resets when the countdown ends.

ENVIRONMENT VARIABLES:
  SHEET2CSV_ENDPOINT        Base URL of the conversion service
  SHEET2CSV_OUTPUT_DIR      Directory the CSV is saved into
  SHEET2CSV_UPLOAD_TIMEOUT  Upload timeout in seconds
"#;

/// Upload an Excel workbook to a conversion service and download the CSV.
#[derive(Parser, Debug)]
#[command(
    name = "sheet2csv",
    version,
    about = "Upload an Excel workbook to a conversion service and download the CSV",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Path to the workbook (.xlsx or .xls).
    input: PathBuf,

    /// Base URL of the conversion service.
    #[arg(short, long, env = "SHEET2CSV_ENDPOINT")]
    endpoint: String,

    /// Directory the converted CSV is saved into.
    #[arg(short, long, env = "SHEET2CSV_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Upload timeout in seconds.
    #[arg(long, env = "SHEET2CSV_UPLOAD_TIMEOUT", default_value_t = 120)]
    upload_timeout: u64,

    /// Output a JSON run summary instead of log lines.
    #[arg(long, env = "SHEET2CSV_JSON")]
    json: bool,

    /// Disable the progress bar and event log lines.
    #[arg(long, env = "SHEET2CSV_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SHEET2CSV_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SHEET2CSV_QUIET")]
    quiet: bool,
}

#[derive(serde::Serialize)]
struct RunSummary {
    input: String,
    output: String,
    saved_to: String,
    duration_ms: u128,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the observer is active; the
    // bar and event lines provide all the feedback that matters.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config and controller ──────────────────────────────────────
    let observer: Option<FlowObserverHandle> = if show_progress {
        Some(CliFlowObserver::new() as FlowObserverHandle)
    } else {
        None
    };

    let mut builder = FlowConfig::builder()
        .endpoint(cli.endpoint.as_str())
        .output_dir(&cli.output_dir)
        .upload_timeout_secs(cli.upload_timeout);
    if let Some(obs) = observer {
        builder = builder.observer(obs);
    }
    let config = builder.build().context("Invalid configuration")?;

    let flow = UploadFlowController::new(config).context("Failed to start the upload flow")?;
    let mut events = flow.subscribe();
    let started = Instant::now();

    // ── Drive the cycle ──────────────────────────────────────────────────
    match flow.select(Some(&cli.input)) {
        Selection::Accepted { .. } => {}
        Selection::Rejected { message, .. } => anyhow::bail!("{message}"),
        Selection::Cleared | Selection::Ignored => {
            anyhow::bail!("no file selected")
        }
    }

    let output = match flow.convert().await.context("Conversion failed")? {
        ConvertOutcome::Converted { output } => output,
        ConvertOutcome::Failed { error } => anyhow::bail!("{error}"),
        ConvertOutcome::Ignored => anyhow::bail!("no file selected"),
    };

    let saved_to = match flow.download().await.context("Download failed")? {
        DownloadOutcome::Saved { path } => path,
        DownloadOutcome::Ignored => anyhow::bail!("nothing to download"),
    };

    // The countdown owns teardown; the cycle is over once the flow resets.
    while let Some(event) = events.next().await {
        if event == FlowEvent::Reset {
            break;
        }
    }

    // ── Summary ──────────────────────────────────────────────────────────
    if cli.json {
        let summary = RunSummary {
            input: cli.input.display().to_string(),
            output,
            saved_to: saved_to.display().to_string(),
            duration_ms: started.elapsed().as_millis(),
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !cli.quiet {
        eprintln!(
            "{}  {}  →  {}  {}",
            green("✔"),
            cli.input.display(),
            bold(&saved_to.display().to_string()),
            dim(&format!("{}ms", started.elapsed().as_millis())),
        );
    }

    Ok(())
}
