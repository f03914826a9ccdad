//! Traffic scenarios for the grid simulator.

use nalgebra::Vector3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// Two drones at opposite corners flying at each other
    HeadOn,

    /// Four corner-to-corner flows crossing in the middle
    Crossing,

    /// A lone drone across the volume
    Single,

    /// A drone aimed far outside the volume
    Boundary,
}

/// Spawn request for one agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSpec {
    pub id: String,
    pub start: Vector3<f64>,
    pub goal: Vector3<f64>,
}

impl AgentSpec {
    pub fn new(id: impl Into<String>, start: Vector3<f64>, goal: Vector3<f64>) -> Self {
        Self {
            id: id.into(),
            start,
            goal,
        }
    }
}

/// Corner-to-corner routes of the crossing scenario, as fractions of the volume.
const FLOWS: [([f64; 3], [f64; 3]); 4] = [
    ([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]),
    ([1.0, 0.0, 0.0], [0.0, 1.0, 1.0]),
    ([0.0, 1.0, 0.0], [1.0, 0.0, 1.0]),
    ([1.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
];

/// Half-width of the uniform spawn offset around each flow endpoint.
const FLOW_OFFSET: f64 = 5.0;

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::HeadOn,
            ScenarioId::Crossing,
            ScenarioId::Single,
            ScenarioId::Boundary,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::HeadOn => "head_on",
            ScenarioId::Crossing => "crossing",
            ScenarioId::Single => "single",
            ScenarioId::Boundary => "boundary",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::HeadOn => "Two drones at opposite corners with swapped goals",
            ScenarioId::Crossing => "Four corner-to-corner flows with jittered spawn points",
            ScenarioId::Single => "One drone alone in the volume, risk must stay zero",
            ScenarioId::Boundary => "Goal outside the volume, clamped onto the wall",
        }
    }

    /// Builds the agents for this scenario.
    ///
    /// Only `Crossing` uses `drones_per_flow` and `seed`; the other layouts
    /// are fixed fractions of `space`.
    pub fn agents(&self, space: &Vector3<f64>, drones_per_flow: usize, seed: u64) -> Vec<AgentSpec> {
        let at = |fx: f64, fy: f64, fz: f64| Vector3::new(fx * space.x, fy * space.y, fz * space.z);

        match self {
            ScenarioId::HeadOn => vec![
                AgentSpec::new("alpha", at(0.0, 0.0, 0.0), at(1.0, 1.0, 1.0)),
                AgentSpec::new("bravo", at(1.0, 1.0, 1.0), at(0.0, 0.0, 0.0)),
            ],
            ScenarioId::Crossing => crossing_flows(space, drones_per_flow, seed),
            ScenarioId::Single => vec![AgentSpec::new("solo", at(0.1, 0.1, 0.1), at(0.9, 0.8, 0.8))],
            ScenarioId::Boundary => vec![
                AgentSpec::new("wall", at(0.9, 0.9, 0.8), at(1.8, 2.4, 2.0)),
                AgentSpec::new("floor", at(0.5, 0.5, 0.5), at(0.2, 0.3, -1.0)),
            ],
        }
    }
}

fn crossing_flows(space: &Vector3<f64>, drones_per_flow: usize, seed: u64) -> Vec<AgentSpec> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_mul(0x9e3779b97f4a7c15));
    let scale = |f: [f64; 3]| Vector3::new(f[0] * space.x, f[1] * space.y, f[2] * space.z);

    let mut specs = Vec::with_capacity(FLOWS.len() * drones_per_flow);
    for (flow, (start, goal)) in FLOWS.iter().enumerate() {
        for n in 0..drones_per_flow {
            let mut jitter = || {
                Vector3::new(
                    rng.gen_range(-FLOW_OFFSET..=FLOW_OFFSET),
                    rng.gen_range(-FLOW_OFFSET..=FLOW_OFFSET),
                    rng.gen_range(-FLOW_OFFSET..=FLOW_OFFSET),
                )
            };
            let start = scale(*start) + jitter();
            let goal = scale(*goal) + jitter();
            specs.push(AgentSpec::new(format!("flow{flow}_{n}"), start, goal));
        }
    }
    specs
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "head_on" | "headon" => Ok(ScenarioId::HeadOn),
            "crossing" | "flows" => Ok(ScenarioId::Crossing),
            "single" | "solo" => Ok(ScenarioId::Single),
            "boundary" | "wall" => Ok(ScenarioId::Boundary),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
