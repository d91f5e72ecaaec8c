use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use spanline::error::Error;
use spanline::layout::{Layout, LayoutConfig, Viewport};
use spanline::loader::{LoadOptions, MalformedPolicy, load_trace};
use spanline::render::{RenderOptions, format_issues, format_layout, format_report};

#[derive(Parser)]
#[command(
    name = "spanline",
    about = "Inspect traces recorded with spanline-runtime",
    version,
    after_help = "Set RUST_LOG=debug for loader diagnostics."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the call tree of every thread.
    Report {
        /// Trace file written by spanline-runtime.
        trace: PathBuf,

        /// How to treat threads whose events do not nest.
        #[arg(long, value_enum, default_value_t = Policy::Truncate)]
        policy: Policy,

        /// Include instant events in the tree.
        #[arg(long)]
        instants: bool,
    },
    /// Validate trace structure. Exits 1 if any thread is malformed.
    Check {
        /// Trace file written by spanline-runtime.
        trace: PathBuf,
    },
    /// Print timeline geometry for one viewport.
    Layout {
        /// Trace file written by spanline-runtime.
        trace: PathBuf,

        /// Zoom factor; 1000 is 128 pixels per second.
        #[arg(long)]
        zoom: Option<f64>,

        /// Viewport width in pixels.
        #[arg(long, default_value_t = 1024.0)]
        width: f64,

        /// Viewport height in pixels.
        #[arg(long, default_value_t = 768.0)]
        height: f64,

        /// Horizontal scroll offset in pixels.
        #[arg(long, default_value_t = 0.0)]
        offset_x: f64,

        /// Vertical scroll offset in pixels.
        #[arg(long, default_value_t = 0.0)]
        offset_y: f64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Policy {
    Truncate,
    DropThread,
    Fail,
}

impl From<Policy> for MalformedPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Truncate => MalformedPolicy::Truncate,
            Policy::DropThread => MalformedPolicy::DropThread,
            Policy::Fail => MalformedPolicy::Fail,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    match cli.command {
        Commands::Report {
            trace,
            policy,
            instants,
        } => cmd_report(&trace, policy.into(), instants),
        Commands::Check { trace } => cmd_check(&trace),
        Commands::Layout {
            trace,
            zoom,
            width,
            height,
            offset_x,
            offset_y,
        } => cmd_layout(&trace, zoom, width, height, offset_x, offset_y),
    }
}

fn cmd_report(trace: &Path, malformed: MalformedPolicy, instants: bool) -> Result<(), Error> {
    let loaded = load_trace(trace, &LoadOptions { malformed })?;
    if !loaded.issues.is_empty() {
        eprint!("{}", format_issues(&loaded.issues));
    }
    anstream::print!("{}", format_report(&loaded.report, &RenderOptions { instants }));
    Ok(())
}

fn cmd_check(trace: &Path) -> Result<(), Error> {
    let loaded = load_trace(trace, &LoadOptions::default())?;
    if loaded.issues.is_empty() {
        anstream::println!(
            "ok: {} threads, {} records",
            loaded.report.threads().len(),
            loaded.report.record_count()
        );
        return Ok(());
    }
    anstream::print!("{}", format_issues(&loaded.issues));
    Err(Error::StructuralIssues {
        path: trace.to_path_buf(),
        count: loaded.issues.len(),
    })
}

fn cmd_layout(
    trace: &Path,
    zoom: Option<f64>,
    width: f64,
    height: f64,
    offset_x: f64,
    offset_y: f64,
) -> Result<(), Error> {
    let loaded = load_trace(trace, &LoadOptions::default())?;
    let layout = Layout::new(Arc::new(loaded.report), LayoutConfig::default());

    let mut viewport = Viewport::new(width, height, layout.config());
    if let Some(zoom) = zoom {
        viewport.zoom = zoom;
    }
    viewport.offset_x = offset_x;
    viewport.offset_y = offset_y;
    viewport.check().map_err(Error::InvalidViewport)?;
    layout.clamp(&mut viewport);

    anstream::print!("{}", format_layout(&layout, &viewport));
    Ok(())
}
