//! Scenario runner - builds a grid for a scenario and drives it.

use crate::exporter::{FrameDetail, SimExport, SimFrame};
use crate::scenarios::ScenarioId;

use shadowgrid_core::{GridConfig, GridError, MetricsSummary, ShadowGrid};
use tracing::{debug, info};

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether the scenario held its checks
    pub passed: bool,

    /// Total ticks executed
    pub ticks: u64,

    /// Final simulation time in seconds
    pub final_time: f64,

    /// Whether every agent reached its original goal
    pub all_arrived: bool,

    /// Reroutes across all agents
    pub total_reroutes: u32,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Whole-run statistics
    pub summary: MetricsSummary,
}

/// Runs scenarios against a [`ShadowGrid`].
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Tick budget
    frames: u64,

    /// Seconds per tick
    dt: f64,

    /// Grid tunables (the seed is overridden by the runner's)
    config: GridConfig,

    /// Agents per flow in the crossing scenario
    drones_per_flow: usize,

    /// Stop as soon as every agent has arrived
    until_arrived: bool,

    /// Capture a frame every this many ticks (0 disables frames)
    export_interval: u64,

    /// Optional payloads of captured frames
    detail: FrameDetail,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            frames: 1000,
            dt: 0.1,
            config: GridConfig::default(),
            drones_per_flow: 3,
            until_arrived: false,
            export_interval: 10,
            detail: FrameDetail::default(),
        }
    }

    /// Sets the tick budget.
    pub fn with_frames(mut self, frames: u64) -> Self {
        self.frames = frames;
        self
    }

    /// Sets the tick length in seconds.
    pub fn with_dt(mut self, dt: f64) -> Self {
        self.dt = dt;
        self
    }

    /// Sets the grid configuration.
    pub fn with_config(mut self, config: GridConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the crossing scenario's flow size.
    pub fn with_drones_per_flow(mut self, n: usize) -> Self {
        self.drones_per_flow = n.max(1);
        self
    }

    /// Stops early once every agent has arrived.
    pub fn until_arrived(mut self, enabled: bool) -> Self {
        self.until_arrived = enabled;
        self
    }

    /// Sets frame capture for [`ScenarioRunner::run_with_export`].
    pub fn with_export_interval(mut self, interval: u64, include_shadows: bool) -> Self {
        self.export_interval = interval;
        self.detail.shadows = include_shadows;
        self
    }

    /// Includes each agent's path history in captured frames.
    pub fn with_path_history(mut self, enabled: bool) -> Self {
        self.detail.paths = enabled;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> Result<ScenarioResult, GridError> {
        self.execute(scenario, None)
    }

    /// Runs a scenario while capturing frames and metrics for export.
    pub fn run_with_export(&self, scenario: ScenarioId) -> Result<(ScenarioResult, SimExport), GridError> {
        let mut export = SimExport::new(scenario.name(), self.seed, self.config.space_size.into());
        let result = self.execute(scenario, Some(&mut export))?;
        Ok((result, export))
    }

    /// Builds the grid for `scenario` with every agent spawned.
    pub fn build_grid(&self, scenario: ScenarioId) -> Result<ShadowGrid, GridError> {
        let config = self.config.clone().with_seed(self.seed);
        let specs = scenario.agents(&config.space_size, self.drones_per_flow, self.seed);

        let mut grid = ShadowGrid::new(config)?;
        for spec in specs {
            grid.add_agent(spec.id, spec.start, spec.goal)?;
        }
        Ok(grid)
    }

    fn execute(&self, scenario: ScenarioId, mut export: Option<&mut SimExport>) -> Result<ScenarioResult, GridError> {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let mut grid = self.build_grid(scenario)?;
        let space = grid.config().space_size;
        let mut escaped: Option<String> = None;

        self.capture(&grid, export.as_deref_mut());

        while grid.tick_count() < self.frames {
            if self.until_arrived && grid.all_arrived() {
                break;
            }
            grid.tick(self.dt);
            self.capture(&grid, export.as_deref_mut());

            if escaped.is_none() {
                escaped = grid
                    .agents()
                    .iter()
                    .find(|a| (0..3).any(|i| a.position()[i] < 0.0 || a.position()[i] > space[i]))
                    .map(|a| a.id().to_string());
            }

            if grid.tick_count() % 100 == 0 {
                if let Some(m) = grid.latest_metrics() {
                    debug!(
                        "  t={:.1}s | mean_risk={:.3} | max_risk={:.3} | rerouting={}",
                        grid.time(),
                        m.mean_risk,
                        m.max_risk,
                        grid.agents().iter().filter(|a| a.is_rerouting()).count()
                    );
                }
            }
        }

        let summary = MetricsSummary::from_history(grid.metrics_history().iter());
        let all_arrived = grid.all_arrived();
        let total_reroutes: u32 = grid.agents().iter().map(|a| a.reroute_count()).sum();

        let failure_reason = match escaped {
            Some(id) => Some(format!("agent {} left the volume", id)),
            None => check(scenario, &summary, total_reroutes, all_arrived),
        };
        let passed = failure_reason.is_none();

        if let Some(export) = export {
            export.finalize(grid.metrics_history().to_vec(), summary.clone(), passed);
        }

        info!(
            "Finished {} after {} ticks ({:.1}s), {} reroutes",
            scenario.name(),
            grid.tick_count(),
            grid.time(),
            total_reroutes
        );

        Ok(ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            ticks: grid.tick_count(),
            final_time: grid.time(),
            all_arrived,
            total_reroutes,
            failure_reason,
            summary,
        })
    }

    fn capture(&self, grid: &ShadowGrid, export: Option<&mut SimExport>) {
        if let Some(export) = export {
            if self.export_interval > 0 && grid.tick_count() % self.export_interval == 0 {
                export.add_frame(SimFrame::capture(grid, self.detail));
            }
        }
    }
}

/// Scenario-specific checks on a finished run.
fn check(scenario: ScenarioId, summary: &MetricsSummary, total_reroutes: u32, all_arrived: bool) -> Option<String> {
    match scenario {
        ScenarioId::Single => {
            if summary.max_collision_risk_observed > 0.0 {
                Some(format!(
                    "lone agent saw risk {:.3}",
                    summary.max_collision_risk_observed
                ))
            } else if total_reroutes > 0 {
                Some(format!("lone agent rerouted {} times", total_reroutes))
            } else {
                None
            }
        }
        ScenarioId::HeadOn if all_arrived => {
            if total_reroutes == 0 {
                Some("head-on pair never rerouted".to_string())
            } else if summary.final_completion_percentage.values().any(|c| *c < 100.0) {
                Some("arrived agents report incomplete routes".to_string())
            } else {
                None
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_single_runs_clean() {
        let result = ScenarioRunner::new(7)
            .with_frames(1000)
            .until_arrived(true)
            .run(ScenarioId::Single)
            .unwrap();

        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.all_arrived);
        assert!(result.ticks < 1000);
        assert_eq!(result.total_reroutes, 0);
        assert_relative_eq!(result.final_time, result.ticks as f64 * 0.1, epsilon = 1e-9);
        assert_eq!(result.summary.final_completion_percentage["solo"], 100.0);
    }

    #[test]
    fn test_frame_budget_is_respected() {
        let result = ScenarioRunner::new(1)
            .with_frames(25)
            .with_drones_per_flow(2)
            .run(ScenarioId::Crossing)
            .unwrap();

        assert_eq!(result.ticks, 25);
        assert!(!result.all_arrived);
        assert_eq!(result.summary.final_completion_percentage.len(), 8);
    }

    #[test]
    fn test_runs_are_deterministic() {
        let runner = ScenarioRunner::new(99).with_frames(120).with_drones_per_flow(2);
        let a = runner.run(ScenarioId::Crossing).unwrap();
        let b = runner.run(ScenarioId::Crossing).unwrap();

        assert_eq!(a.summary, b.summary);
        assert_eq!(a.total_reroutes, b.total_reroutes);
    }

    #[test]
    fn test_boundary_stays_inside() {
        let result = ScenarioRunner::new(3)
            .with_frames(600)
            .until_arrived(true)
            .run(ScenarioId::Boundary)
            .unwrap();
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.all_arrived);
    }

    #[test]
    fn test_export_captures_every_interval() {
        let runner = ScenarioRunner::new(5)
            .with_frames(30)
            .with_export_interval(10, true)
            .with_path_history(true);
        let (result, export) = runner.run_with_export(ScenarioId::HeadOn).unwrap();

        // Frames at ticks 0, 10, 20 and 30
        assert_eq!(export.frames.len(), 4);
        assert_eq!(export.frames[3].tick, 30);
        assert!(!export.frames[1].agents[0].shadow.is_empty());
        assert_eq!(export.frames[3].agents[0].path_history.len(), 31);
        assert_eq!(export.metrics.len(), result.ticks as usize);
        assert_eq!(export.summary.as_ref(), Some(&result.summary));
        assert_eq!(export.passed, result.passed);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = GridConfig::default().with_space_size(0.0, 50.0, 30.0);
        let err = ScenarioRunner::new(1).with_config(config).run(ScenarioId::Single);
        assert!(matches!(err, Err(GridError::InvalidConfig(_))));
    }
}
