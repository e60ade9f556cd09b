//! drainflow CLI - hydrological conditioning and flow routing for DEMs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use drainflow_algorithms::hydrology::{
    breach_depressions, breach_depressions_fast, d8_pointer, dinf_pointer, fill_depressions,
    fill_depressions_pandd, find_no_flow_cells, flow_accumulation_d8, flow_accumulation_dinf,
    flow_accumulation_fd8, num_inflowing_neighbours, AccumOutput, AccumParams, BreachFastParams,
    BreachParams, Fd8Params, FillParams, DEFAULT_SMALL_NUM,
};
use drainflow_algorithms::tools::{run_tool, TOOLS};
use drainflow_core::io::{read_geotiff, write_geotiff};
use drainflow_core::{Progress, Raster};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "drainflow")]
#[command(author, version, about = "Hydrological conditioning and flow routing for DEMs", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// List the registered tools and their arguments
    Tools,
    /// Run a registered tool with an ordered argument list
    Run {
        /// Tool name (case-insensitive)
        tool: String,
        /// Tool arguments; use "not specified" to skip an optional one
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Hydrology algorithms
    Hydrology {
        #[command(subcommand)]
        algorithm: HydrologyCommands,
    },
}

// ─── Hydrology subcommands ──────────────────────────────────────────────

#[derive(Subcommand)]
enum HydrologyCommands {
    /// Breach depressions along least-cost paths
    Breach {
        /// Input DEM file
        input: PathBuf,
        /// Output file
        output: PathBuf,
        /// Search window radius in cells
        #[arg(short, long, default_value = "5")]
        radius: usize,
        /// Largest search radius tried before giving up on a pit
        #[arg(long)]
        max_radius: Option<usize>,
        /// Maximum elevation decrement of a single cell
        #[arg(long)]
        max_cost: Option<f64>,
        /// Elevation step along breach paths (derived from the DEM if omitted)
        #[arg(long)]
        small_value: Option<f64>,
    },
    /// Breach depressions in one Priority-Flood pass
    BreachFast {
        /// Input DEM file
        input: PathBuf,
        /// Output file
        output: PathBuf,
        /// Deepest allowed cut; pits needing more are filled
        #[arg(long)]
        max_depth: Option<f64>,
        /// Longest allowed trench in cells; pits needing more are filled
        #[arg(long)]
        max_length: Option<usize>,
        /// Request constrained breaching (falls back to filling)
        #[arg(long)]
        constrained: bool,
        /// Also write the D8 pointer of the breach paths here
        #[arg(long)]
        pointer: Option<PathBuf>,
        /// Also write D8 flow accumulation of that pointer here
        #[arg(long)]
        accumulation: Option<PathBuf>,
    },
    /// Fill depressions (Priority-Flood)
    Fill {
        /// Input DEM file
        input: PathBuf,
        /// Output file
        output: PathBuf,
        /// Elevation increment enforced across filled cells
        #[arg(short, long, default_value_t = DEFAULT_SMALL_NUM)]
        small_num: f64,
    },
    /// Fill depressions (Planchon-Darboux)
    FillPandd {
        /// Input DEM file
        input: PathBuf,
        /// Output file
        output: PathBuf,
        /// Elevation increment enforced across filled cells
        #[arg(short, long, default_value_t = DEFAULT_SMALL_NUM)]
        small_num: f64,
    },
    /// D8 flow pointer
    D8Pointer {
        /// Input DEM file
        input: PathBuf,
        /// Output file
        output: PathBuf,
    },
    /// D-infinity flow direction
    DinfPointer {
        /// Input DEM file
        input: PathBuf,
        /// Output file
        output: PathBuf,
    },
    /// D8 flow accumulation from a D8 pointer
    AccumD8 {
        /// Input D8 pointer file
        input: PathBuf,
        /// Output file
        output: PathBuf,
        /// Output unit: cells, sca, tca
        #[arg(short = 't', long, default_value = "cells")]
        output_type: AccumOutput,
        /// Natural-log transform the output
        #[arg(long)]
        log: bool,
    },
    /// D-infinity flow accumulation from a D-infinity pointer
    AccumDinf {
        /// Input D-infinity pointer file
        input: PathBuf,
        /// Output file
        output: PathBuf,
        /// Output unit: cells, sca, tca
        #[arg(short = 't', long, default_value = "cells")]
        output_type: AccumOutput,
        /// Natural-log transform the output
        #[arg(long)]
        log: bool,
    },
    /// FD8 flow accumulation from a DEM
    AccumFd8 {
        /// Input DEM file
        input: PathBuf,
        /// Output file
        output: PathBuf,
        /// Exponent on elevation drops
        #[arg(short, long, default_value = "1.0")]
        power: f64,
        /// Accumulation above which flow follows the steepest neighbour only
        #[arg(long)]
        threshold: Option<f64>,
        /// Output unit: cells, sca, tca
        #[arg(short = 't', long, default_value = "cells")]
        output_type: AccumOutput,
        /// Natural-log transform the output
        #[arg(long)]
        log: bool,
    },
    /// Flag cells with no lower neighbour
    NoFlow {
        /// Input DEM file
        input: PathBuf,
        /// Output file
        output: PathBuf,
    },
    /// Count D8 neighbours draining into each cell
    Inflowing {
        /// Input D8 pointer file
        input: PathBuf,
        /// Output file
        output: PathBuf,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")
}

fn spinner(msg: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

/// Progress sink drawing a percentage bar per phase.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new() -> Result<Self> {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg:>32} [{bar:40.cyan/blue}] {pos:>3}%")?
                .progress_chars("=>-"),
        );
        Ok(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Progress for BarProgress {
    fn update(&self, label: &str, percent: i32) {
        self.bar.set_message(label.to_string());
        self.bar.set_position(percent.clamp(0, 100) as u64);
    }

    fn feedback(&self, message: &str) {
        self.bar.println(message);
    }
}

fn read_dem(path: &Path) -> Result<Raster<f64>> {
    let pb = spinner("Reading raster...")?;
    let raster: Raster<f64> = read_geotiff(path)
        .with_context(|| format!("Failed to read raster {}", path.display()))?;
    pb.finish_and_clear();
    info!("Input: {} x {}", raster.cols(), raster.rows());
    Ok(raster)
}

fn write_result(raster: &Raster<f64>, path: &Path) -> Result<()> {
    let pb = spinner("Writing output...")?;
    write_geotiff(raster, path)
        .with_context(|| format!("Failed to write output {}", path.display()))?;
    pb.finish_and_clear();
    Ok(())
}

fn done(name: &str, path: &Path, elapsed: Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

/// Read `input`, run `algorithm` under a progress bar, write `output`.
fn run_raster<F>(name: &str, input: &Path, output: &Path, algorithm: F) -> Result<()>
where
    F: FnOnce(&Raster<f64>, &dyn Progress) -> drainflow_core::Result<Raster<f64>>,
{
    let raster = read_dem(input)?;
    let progress = BarProgress::new()?;
    let start = Instant::now();
    let result = algorithm(&raster, &progress);
    progress.finish();
    let result = result.with_context(|| format!("{} failed", name))?;
    let elapsed = start.elapsed();
    write_result(&result, output)?;
    done(name, output, elapsed);
    Ok(())
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        // ── Info ─────────────────────────────────────────────────────
        Commands::Info { input } => {
            let raster = read_dem(&input)?;
            let (rows, cols) = raster.shape();
            let bounds = raster.bounds();
            let stats = raster.statistics();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!("Cell size: {} x {}", raster.cell_size_x(), raster.cell_size_y());
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            if let Some(nodata) = raster.nodata() {
                println!("NoData: {}", nodata);
            }
            println!("\nStatistics:");
            if let Some(min) = stats.min {
                println!("  Min: {:.4}", min);
            }
            if let Some(max) = stats.max {
                println!("  Max: {:.4}", max);
            }
            if let Some(mean) = stats.mean {
                println!("  Mean: {:.4}", mean);
            }
            println!(
                "  Valid cells: {} ({:.1}%)",
                stats.valid_count,
                100.0 * stats.valid_count as f64 / raster.len().max(1) as f64
            );
        }

        // ── Registry ─────────────────────────────────────────────────
        Commands::Tools => {
            for tool in TOOLS {
                println!("{:<24} {}", tool.name, tool.description);
                println!("{:<24} {}", "", tool.synopsis);
            }
        }

        Commands::Run { tool, args } => {
            let progress = BarProgress::new()?;
            let start = Instant::now();
            let report = run_tool(&tool, &args, &progress);
            progress.finish();
            let report = report.with_context(|| format!("{} failed", tool))?;
            let elapsed = start.elapsed();
            for path in &report.outputs {
                println!("{} saved to: {}", tool, path.display());
            }
            println!("  Processing time: {:.2?}", elapsed);
        }

        // ── Hydrology ────────────────────────────────────────────────
        Commands::Hydrology { algorithm } => match algorithm {
            HydrologyCommands::Breach {
                input,
                output,
                radius,
                max_radius,
                max_cost,
                small_value,
            } => {
                let params = BreachParams {
                    radius,
                    max_radius,
                    max_cost,
                    a_small_value: small_value,
                };
                params.validate().context("Invalid breach parameters")?;
                let dem = read_dem(&input)?;
                let progress = BarProgress::new()?;
                let start = Instant::now();
                let result = breach_depressions(&dem, &params, &progress);
                progress.finish();
                let result = result.context("Failed to breach depressions")?;
                let elapsed = start.elapsed();
                write_result(&result.dem, &output)?;
                println!(
                    "{} pits: {} solved, {} unsolved",
                    result.pits, result.solved, result.unsolved
                );
                done("Breached DEM", &output, elapsed);
            }

            HydrologyCommands::BreachFast {
                input,
                output,
                max_depth,
                max_length,
                constrained,
                pointer,
                accumulation,
            } => {
                let params = BreachFastParams {
                    max_depth,
                    max_length,
                    constrained,
                    output_pointer: pointer.is_some() || accumulation.is_some(),
                    flow_accumulation: accumulation.is_some(),
                };
                params.validate().context("Invalid breach parameters")?;
                let dem = read_dem(&input)?;
                let progress = BarProgress::new()?;
                let start = Instant::now();
                let result = breach_depressions_fast(&dem, &params, &progress);
                progress.finish();
                let result = result.context("Failed to breach depressions")?;
                let elapsed = start.elapsed();

                write_result(&result.dem, &output)?;
                if let (Some(path), Some(raster)) = (&pointer, &result.pointer) {
                    write_result(raster, path)?;
                    println!("D8 pointer saved to: {}", path.display());
                }
                if let (Some(path), Some(raster)) = (&accumulation, &result.accumulation) {
                    write_result(raster, path)?;
                    println!("Flow accumulation saved to: {}", path.display());
                }
                println!(
                    "{} pits: {} breached, {} filled",
                    result.pits, result.breached, result.deferred
                );
                done("Breached DEM", &output, elapsed);
            }

            HydrologyCommands::Fill {
                input,
                output,
                small_num,
            } => {
                let params = FillParams { small_num };
                params.validate().context("Invalid fill parameters")?;
                run_raster("Filled DEM", &input, &output, |dem, p| fill_depressions(dem, &params, p))?;
            }

            HydrologyCommands::FillPandd {
                input,
                output,
                small_num,
            } => {
                let params = FillParams { small_num };
                params.validate().context("Invalid fill parameters")?;
                run_raster("Filled DEM", &input, &output, |dem, p| {
                    fill_depressions_pandd(dem, &params, p)
                })?;
            }

            HydrologyCommands::D8Pointer { input, output } => {
                run_raster("D8 pointer", &input, &output, d8_pointer)?;
            }

            HydrologyCommands::DinfPointer { input, output } => {
                run_raster("D-infinity pointer", &input, &output, dinf_pointer)?;
            }

            HydrologyCommands::AccumD8 {
                input,
                output,
                output_type,
                log,
            } => {
                let params = AccumParams {
                    output_type,
                    log_transform: log,
                };
                run_raster("Flow accumulation", &input, &output, |ptr, p| {
                    flow_accumulation_d8(ptr, &params, p)
                })?;
            }

            HydrologyCommands::AccumDinf {
                input,
                output,
                output_type,
                log,
            } => {
                let params = AccumParams {
                    output_type,
                    log_transform: log,
                };
                run_raster("Flow accumulation", &input, &output, |ptr, p| {
                    flow_accumulation_dinf(ptr, &params, p)
                })?;
            }

            HydrologyCommands::AccumFd8 {
                input,
                output,
                power,
                threshold,
                output_type,
                log,
            } => {
                let params = Fd8Params {
                    power,
                    threshold,
                    output_type,
                    log_transform: log,
                };
                params.validate().context("Invalid FD8 parameters")?;
                run_raster("Flow accumulation", &input, &output, |dem, p| {
                    flow_accumulation_fd8(dem, &params, p)
                })?;
            }

            HydrologyCommands::NoFlow { input, output } => {
                run_raster("No-flow cells", &input, &output, find_no_flow_cells)?;
            }

            HydrologyCommands::Inflowing { input, output } => {
                run_raster("Inflowing neighbours", &input, &output, num_inflowing_neighbours)?;
            }
        },
    }

    Ok(())
}
