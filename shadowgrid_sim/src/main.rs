//! ShadowGrid Simulator CLI
//!
//! Run drone traffic scenarios through the probabilistic collision grid and
//! optionally export frames and metrics as JSON and CSV.

use anyhow::{bail, Context, Result};
use clap::Parser;
use shadowgrid_core::GridConfig;
use shadowgrid_sim::{ScenarioId, ScenarioResult, ScenarioRunner};
use std::path::{Path, PathBuf};
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// ShadowGrid drone swarm simulator
#[derive(Parser, Debug)]
#[command(name = "shadowgrid-sim")]
#[command(about = "Simulate drone swarms with probabilistic collision shadows", long_about = None)]
struct Args {
    /// Scenario to run (head_on, crossing, single, boundary, all)
    #[arg(short = 'S', long, default_value = "crossing")]
    scenario: String,

    /// Volume extent along x
    #[arg(long)]
    space_x: Option<f64>,

    /// Volume extent along y
    #[arg(long)]
    space_y: Option<f64>,

    /// Volume extent along z
    #[arg(long)]
    space_z: Option<f64>,

    /// Maximum number of ticks
    #[arg(short, long, default_value = "1000")]
    frames: u64,

    /// Tick length in seconds
    #[arg(long, default_value = "0.1")]
    dt: f64,

    /// Master seed for determinism
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Drones per flow in the crossing scenario
    #[arg(long, default_value = "3")]
    drones_per_flow: usize,

    /// Risk above which an agent starts rerouting
    #[arg(long)]
    collision_threshold: Option<f64>,

    /// Number of prediction steps per shadow
    #[arg(long)]
    prediction_steps: Option<usize>,

    /// Linear covariance growth rate per second
    #[arg(long)]
    growth_rate: Option<f64>,

    /// JSON file with grid configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for frame, metrics and summary export files
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Frame capture interval in ticks when exporting
    #[arg(long, default_value = "10")]
    export_interval: u64,

    /// Include shadow points in exported frames
    #[arg(long)]
    export_shadows: bool,

    /// Include path history in exported frames
    #[arg(long)]
    export_paths: bool,

    /// Stop once every agent has arrived
    #[arg(long)]
    until_arrived: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// List available scenarios and exit
    #[arg(long)]
    list: bool,
}

impl Args {
    /// Loads the config file (if any) and applies command-line overrides.
    fn grid_config(&self) -> Result<GridConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                GridConfig::from_json_str(&text).with_context(|| format!("parsing config {}", path.display()))?
            }
            None => GridConfig::default(),
        };

        if let Some(x) = self.space_x {
            config.space_size.x = x;
        }
        if let Some(y) = self.space_y {
            config.space_size.y = y;
        }
        if let Some(z) = self.space_z {
            config.space_size.z = z;
        }
        if let Some(threshold) = self.collision_threshold {
            config = config.with_collision_threshold(threshold);
        }
        if let Some(steps) = self.prediction_steps {
            config = config.with_prediction_steps(steps);
        }
        if let Some(rate) = self.growth_rate {
            config = config.with_growth_rate(rate);
        }

        config = config.with_seed(self.seed);
        config.validate().context("invalid grid configuration")?;
        Ok(config)
    }
}

fn init_logging(args: &Args) -> Result<()> {
    let level = if args.verbose {
        Level::DEBUG
    } else if args.json {
        Level::WARN
    } else {
        Level::INFO
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to set tracing subscriber")
}

fn export_dir(root: &Path, scenario: ScenarioId, many: bool) -> PathBuf {
    if many {
        root.join(scenario.name())
    } else {
        root.to_path_buf()
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.list {
        for scenario in ScenarioId::all() {
            println!("{:<10} {}", scenario.name(), scenario.description());
        }
        return Ok(());
    }

    init_logging(&args)?;

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(id) => vec![id],
            Err(e) => bail!("{} (use --list to see scenarios)", e),
        }
    };

    let config = args.grid_config()?;
    if args.dt <= 0.0 || !args.dt.is_finite() {
        bail!("--dt must be a positive number, got {}", args.dt);
    }

    if !args.json {
        info!("ShadowGrid Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!(
            "space={:?} threshold={} steps={} growth={} seed={}",
            config.space_size.as_slice(),
            config.collision_threshold,
            config.prediction_steps,
            config.uncertainty_growth_rate,
            config.seed
        );
    }

    let runner = ScenarioRunner::new(args.seed)
        .with_frames(args.frames)
        .with_dt(args.dt)
        .with_config(config)
        .with_drones_per_flow(args.drones_per_flow)
        .until_arrived(args.until_arrived)
        .with_export_interval(args.export_interval, args.export_shadows)
        .with_path_history(args.export_paths);

    let mut results: Vec<ScenarioResult> = Vec::new();
    for scenario in &scenarios {
        let result = match &args.output_dir {
            Some(root) => {
                let (result, export) = runner.run_with_export(*scenario)?;
                let dir = export_dir(root, *scenario, scenarios.len() > 1);
                export
                    .write_to_dir(&dir)
                    .with_context(|| format!("writing export to {}", dir.display()))?;
                info!("Exported {} frames to {}", export.frames.len(), dir.display());
                result
            }
            None => runner.run(*scenario)?,
        };

        if !args.json {
            report(&result);
        }
        results.push(result);
    }

    let failed = results.iter().filter(|r| !r.passed).count();

    if args.json {
        let summary = serde_json::json!({
            "total": results.len(),
            "passed": results.len() - failed,
            "failed": failed,
            "results": results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "ticks": r.ticks,
                    "time_secs": r.final_time,
                    "all_arrived": r.all_arrived,
                    "total_reroutes": r.total_reroutes,
                    "failure_reason": r.failure_reason,
                    "summary": r.summary,
                })
            }).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if failed == 0 {
        info!("All {} scenario runs passed", results.len());
    } else {
        error!("{}/{} scenario runs failed", failed, results.len());
    }

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn report(result: &ScenarioResult) {
    let s = &result.summary;
    if result.passed {
        info!("✓ {} (seed={}) PASSED", result.scenario.name(), result.seed);
    } else {
        error!(
            "✗ {} (seed={}) FAILED: {}",
            result.scenario.name(),
            result.seed,
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
    }
    info!(
        "  ticks={} time={:.1}s arrived={} reroutes={}",
        result.ticks, result.final_time, result.all_arrived, result.total_reroutes
    );
    info!(
        "  risk: mean={:.4} max={:.4}",
        s.average_collision_risk, s.max_collision_risk_observed
    );
    for (id, completion) in &s.final_completion_percentage {
        let speed = s.average_velocities.get(id).copied().unwrap_or(0.0);
        info!("  {:<10} completion={:>6.1}% avg_speed={:.2}", id, completion, speed);
    }
}
