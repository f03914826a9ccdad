//! JSON/CSV exporter for offline visualization.
//!
//! Writes into an output directory: `simulation_frames.json`,
//! `simulation_metrics.json`, `simulation_metrics.csv` (one row per tick,
//! one column per agent and metric) and `simulation_summary.json`.

use serde::{Deserialize, Serialize};
use shadowgrid_core::{AgentState, MetricsSummary, ShadowGrid, TickMetrics};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const FRAMES_FILE: &str = "simulation_frames.json";
pub const METRICS_FILE: &str = "simulation_metrics.json";
pub const METRICS_CSV_FILE: &str = "simulation_metrics.csv";
pub const SUMMARY_FILE: &str = "simulation_summary.json";

/// Optional per-agent payloads of a captured frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameDetail {
    /// Weighted shadow points
    pub shadows: bool,

    /// Every position visited so far
    pub paths: bool,
}

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Tick index at capture
    pub tick: u64,

    /// Simulation time in seconds
    pub time_sec: f64,

    /// Agent snapshots
    pub agents: Vec<AgentFrame>,
}

impl SimFrame {
    /// Captures the grid as it stands between ticks.
    pub fn capture(grid: &ShadowGrid, detail: FrameDetail) -> Self {
        Self {
            tick: grid.tick_count(),
            time_sec: grid.time(),
            agents: grid
                .agents()
                .iter()
                .map(|a| AgentFrame::from_agent(a, detail))
                .collect(),
        }
    }
}

/// Agent frame data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentFrame {
    pub id: String,
    pub position: [f64; 3],
    pub velocity: [f64; 3],
    pub goal: [f64; 3],
    pub rerouting: bool,
    pub collision_risk: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shadow: Vec<ShadowSample>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path_history: Vec<[f64; 3]>,
}

impl AgentFrame {
    pub fn from_agent(agent: &AgentState, detail: FrameDetail) -> Self {
        let shadow = if detail.shadows {
            agent
                .shadow()
                .iter()
                .map(|p| ShadowSample {
                    x: p.position.x,
                    y: p.position.y,
                    z: p.position.z,
                    weight: p.weight,
                })
                .collect()
        } else {
            Vec::new()
        };
        let path_history = if detail.paths {
            agent.path_history().iter().map(|p| (*p).into()).collect()
        } else {
            Vec::new()
        };

        Self {
            id: agent.id().to_string(),
            position: (*agent.position()).into(),
            velocity: (*agent.velocity()).into(),
            goal: agent.goal().into(),
            rerouting: agent.is_rerouting(),
            collision_risk: agent.collision_risk(),
            shadow,
            path_history,
        }
    }
}

/// Weighted shadow point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub weight: f64,
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Volume extents
    pub space_size: [f64; 3],

    /// Duration in seconds
    pub duration_sec: f64,

    /// Captured frames
    pub frames: Vec<SimFrame>,

    /// Per-tick metrics
    pub metrics: Vec<TickMetrics>,

    /// Whole-run statistics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<MetricsSummary>,

    /// Final verdict
    pub passed: bool,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64, space_size: [f64; 3]) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            space_size,
            duration_sec: 0.0,
            frames: Vec::new(),
            metrics: Vec::new(),
            summary: None,
            passed: false,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Attaches the metrics and the verdict once the run is over.
    pub fn finalize(&mut self, metrics: Vec<TickMetrics>, summary: MetricsSummary, passed: bool) {
        self.duration_sec = self.duration_sec.max(summary.total_simulation_time);
        self.metrics = metrics;
        self.summary = Some(summary);
        self.passed = passed;
    }

    /// Writes the export files, creating `dir` if needed.
    pub fn write_to_dir(&self, dir: impl AsRef<Path>) -> std::io::Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let frames = serde_json::json!({
            "scenario": self.scenario,
            "seed": self.seed,
            "space_size": self.space_size,
            "duration_sec": self.duration_sec,
            "frames": self.frames,
        });
        let summary = serde_json::json!({
            "scenario": self.scenario,
            "seed": self.seed,
            "passed": self.passed,
            "summary": self.summary,
        });

        let files = [
            (FRAMES_FILE, serde_json::to_string_pretty(&frames)?),
            (METRICS_FILE, serde_json::to_string_pretty(&self.metrics)?),
            (SUMMARY_FILE, serde_json::to_string_pretty(&summary)?),
        ];

        let mut written = Vec::with_capacity(files.len() + 1);
        for (name, json) in files {
            let path = dir.join(name);
            let mut file = File::create(&path)?;
            file.write_all(json.as_bytes())?;
            written.push(path);
        }

        let csv_path = dir.join(METRICS_CSV_FILE);
        write_metrics_csv(&self.metrics, File::create(&csv_path)?)?;
        written.push(csv_path);

        Ok(written)
    }
}

/// Writes one row per tick with `distance_`, `velocity_`, `rerouting_` and
/// `completion_` columns for every agent seen in `metrics`.
pub fn write_metrics_csv<W: Write>(metrics: &[TickMetrics], out: W) -> csv::Result<()> {
    let ids: BTreeSet<&str> = metrics
        .iter()
        .flat_map(|m| m.path_length.keys().map(String::as_str))
        .collect();

    let mut header = vec![
        "tick".to_string(),
        "timestamp".to_string(),
        "average_collision_risk".to_string(),
        "max_collision_risk".to_string(),
    ];
    for prefix in ["distance", "velocity", "rerouting", "completion"] {
        header.extend(ids.iter().map(|id| format!("{prefix}_{id}")));
    }

    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(&header)?;

    for m in metrics {
        let mut row = vec![
            m.tick.to_string(),
            m.timestamp.to_string(),
            m.mean_risk.to_string(),
            m.max_risk.to_string(),
        ];
        let cell = |v: Option<String>| v.unwrap_or_default();
        row.extend(ids.iter().map(|id| cell(m.path_length.get(*id).map(f64::to_string))));
        row.extend(ids.iter().map(|id| cell(m.speed.get(*id).map(f64::to_string))));
        row.extend(ids.iter().map(|id| cell(m.reroute_count.get(*id).map(u32::to_string))));
        row.extend(ids.iter().map(|id| cell(m.completion.get(*id).map(f64::to_string))));
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(())
}
