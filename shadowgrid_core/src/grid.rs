//! ShadowGrid - the simulation tick orchestrator.
//!
//! # Tick discipline
//!
//! ```text
//!  tick start ──▶ freeze: every agent's shadow as of the previous tick
//!                   │
//!        ┌──────────┼──────────┐   (rayon, one task per agent)
//!        ▼          ▼          ▼
//!     agent 0    agent 1 ... agent N     private clone + own RNG stream:
//!                                         route advance → move → shadow →
//!                                         risk vs frozen peers → replan
//!        └──────────┼──────────┘
//!                   ▼
//!  barrier ──▶ publish all agents, log transitions, append metrics
//! ```
//!
//! Agents only ever read their peers' published state, so the per-agent
//! phase gives identical results whatever the thread scheduling.

use crate::agent::{clamp_to_volume, AgentState};
use crate::config::GridConfig;
use crate::error::{GridError, Result};
use crate::metrics::{MetricsHistory, TickMetrics};
use crate::replanner::{Replanner, RouteEvent, RouteTransition};
use crate::risk::field_risk;
use crate::shadow::{Shadow, ShadowGenerator};
use nalgebra::Vector3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use std::collections::HashMap;
use tracing::{debug, info, trace, warn};

/// Derives the RNG stream for one agent at one tick.
///
/// Tick 0 is used at spawn; ticks count from 1.
fn agent_rng(seed: u64, index: usize, tick: u64) -> ChaCha8Rng {
    let mixed = seed.wrapping_mul(0x9e3779b97f4a7c15)
        ^ (index as u64).wrapping_add(1).wrapping_mul(0x517cc1b727220a95)
        ^ tick.wrapping_mul(0xbf58476d1ce4e5b9);
    ChaCha8Rng::seed_from_u64(mixed)
}

/// Result of one agent's private update.
struct AgentUpdate {
    state: AgentState,
    transitions: Vec<RouteTransition>,
}

/// A bounded volume of agents advanced in lock-step ticks.
pub struct ShadowGrid {
    /// Tunables shared by every agent
    config: GridConfig,

    /// Shadow generator built from the config
    generator: ShadowGenerator,

    /// Route state machine and candidate search
    replanner: Replanner,

    /// Agents in spawn order
    agents: Vec<AgentState>,

    /// Agent id → index into `agents`
    index: HashMap<String, usize>,

    /// Speed perturbation applied to every move
    speed_noise: Normal<f64>,

    /// One record per completed tick
    metrics: MetricsHistory,

    /// Completed ticks
    tick_count: u64,

    /// Simulated seconds elapsed
    time: f64,
}

impl ShadowGrid {
    /// Creates an empty grid.
    pub fn new(config: GridConfig) -> Result<Self> {
        config.validate()?;

        let speed_noise = Normal::new(0.0, config.speed_jitter)
            .map_err(|e| GridError::invalid(format!("speed_jitter: {e}")))?;

        Ok(Self {
            generator: ShadowGenerator::from_config(&config),
            replanner: Replanner::from_config(&config),
            metrics: MetricsHistory::new(config.metrics_capacity),
            agents: Vec::new(),
            index: HashMap::new(),
            speed_noise,
            tick_count: 0,
            time: 0.0,
            config,
        })
    }

    /// Registers an agent and generates its first shadow.
    ///
    /// A start or goal outside the volume is clamped into it.
    pub fn add_agent(&mut self, id: impl Into<String>, start: Vector3<f64>, goal: Vector3<f64>) -> Result<()> {
        let id = id.into();
        if self.index.contains_key(&id) {
            return Err(GridError::DuplicateAgent(id));
        }

        let size = &self.config.space_size;
        let clamped_start = clamp_to_volume(&start, size);
        let clamped_goal = clamp_to_volume(&goal, size);
        if clamped_start != start || clamped_goal != goal {
            warn!(
                agent = %id,
                "start/goal outside volume, clamped to {:?} -> {:?}",
                clamped_start.as_slice(),
                clamped_goal.as_slice()
            );
        }

        let slot = self.agents.len();
        let mut agent = AgentState::new(id.clone(), clamped_start, clamped_goal, self.config.initial_uncertainty);
        let mut rng = agent_rng(self.config.seed, slot, 0);
        let shadow = self.generator.generate(
            agent.position(),
            agent.velocity(),
            &agent.goal(),
            agent.covariance(),
            &mut rng,
        );
        agent.set_shadow(shadow);

        info!(
            agent = %id,
            "Initialized drone at {:?} heading for {:?}",
            clamped_start.as_slice(),
            clamped_goal.as_slice()
        );

        self.index.insert(id, slot);
        self.agents.push(agent);
        Ok(())
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn replanner(&self) -> &Replanner {
        &self.replanner
    }

    pub fn generator(&self) -> &ShadowGenerator {
        &self.generator
    }

    /// Agents in spawn order.
    pub fn agents(&self) -> &[AgentState] {
        &self.agents
    }

    pub fn agent(&self, id: &str) -> Result<&AgentState> {
        self.index
            .get(id)
            .map(|&slot| &self.agents[slot])
            .ok_or_else(|| GridError::UnknownAgent(id.to_string()))
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Simulated seconds elapsed.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn metrics_history(&self) -> &MetricsHistory {
        &self.metrics
    }

    /// Record of the most recent tick.
    pub fn latest_metrics(&self) -> Option<&TickMetrics> {
        self.metrics.latest()
    }

    /// Drops every metrics record; the next tick starts a fresh history.
    pub fn reset_metrics(&mut self) {
        self.metrics.clear();
    }

    /// True when every agent is within `arrival_epsilon` of its original goal.
    pub fn all_arrived(&self) -> bool {
        self.agents
            .iter()
            .all(|a| a.has_arrived(self.config.arrival_epsilon))
    }

    /// Advances every agent by `dt` seconds and records one metrics entry.
    pub fn tick(&mut self, dt: f64) {
        let dt = dt.max(0.0);
        let tick = self.tick_count + 1;

        let updates: Vec<AgentUpdate> = self
            .agents
            .par_iter()
            .enumerate()
            .map(|(slot, agent)| {
                let peers: Vec<&Shadow> = self
                    .agents
                    .iter()
                    .enumerate()
                    .filter(|(other, _)| *other != slot)
                    .map(|(_, a)| a.shadow())
                    .collect();
                let mut rng = agent_rng(self.config.seed, slot, tick);
                self.step_agent(agent.clone(), &peers, dt, &mut rng)
            })
            .collect();

        // Barrier: publish every private result at once
        self.agents = updates
            .into_iter()
            .map(|update| {
                for transition in &update.transitions {
                    log_transition(update.state.id(), tick, transition);
                }
                update.state
            })
            .collect();

        self.tick_count = tick;
        self.time += dt;

        let record = TickMetrics::from_agents(tick, self.time, &self.agents, self.config.arrival_epsilon);
        trace!(
            tick,
            mean_risk = record.mean_risk,
            max_risk = record.max_risk,
            "tick complete"
        );
        self.metrics.push(record);
    }

    /// Runs ticks until every agent arrives or `max_ticks` is reached.
    ///
    /// Returns the number of ticks executed.
    pub fn run_until_arrived(&mut self, dt: f64, max_ticks: u64) -> u64 {
        let mut executed = 0;
        while executed < max_ticks && !self.all_arrived() {
            self.tick(dt);
            executed += 1;
        }
        executed
    }

    // ========== Per-agent update ==========

    fn step_agent(&self, mut agent: AgentState, peers: &[&Shadow], dt: f64, rng: &mut ChaCha8Rng) -> AgentUpdate {
        let mut transitions = Vec::new();
        let arrived = agent.has_arrived(self.config.arrival_epsilon);

        if arrived {
            // Parked agents drop any alternate goal and never search again
            transitions.extend(self.replanner.apply(agent.route_mut(), RouteEvent::Arrive));
            agent.hold();
        } else {
            let previous_risk = agent.collision_risk();
            transitions.extend(
                self.replanner
                    .apply(agent.route_mut(), RouteEvent::Advance { risk: previous_risk }),
            );
            self.advance_position(&mut agent, dt, rng);
        }

        let shadow = self.generator.generate(
            agent.position(),
            agent.velocity(),
            &agent.goal(),
            agent.covariance(),
            rng,
        );
        agent.set_shadow(shadow);

        let risk = field_risk(agent.shadow(), peers.iter().copied(), self.config.safe_distance);
        agent.set_collision_risk(risk);

        let parked = arrived || agent.has_arrived(self.config.arrival_epsilon);
        if !parked && self.replanner.needs_search(agent.route(), risk) {
            let candidate = self.replanner.search(&agent, &self.generator, peers, rng);
            transitions.extend(
                self.replanner
                    .apply(agent.route_mut(), RouteEvent::Assess { risk, candidate }),
            );
        }

        AgentUpdate {
            state: agent,
            transitions,
        }
    }

    /// Moves the agent towards its current goal, never past it.
    fn advance_position(&self, agent: &mut AgentState, dt: f64, rng: &mut ChaCha8Rng) {
        let goal = agent.goal();
        let offset = goal - agent.position();
        let distance = offset.norm();
        if distance <= 0.0 {
            agent.hold();
            return;
        }

        let direction = offset / distance;
        let speed = (self.config.nominal_speed + self.speed_noise.sample(rng)).max(0.0);
        let step = speed * dt;

        let target = if step >= distance {
            goal
        } else {
            agent.position() + direction * step
        };
        let position = clamp_to_volume(&target, &self.config.space_size);
        agent.move_to(position, direction * speed);
    }
}

fn log_transition(agent: &str, tick: u64, transition: &RouteTransition) {
    match transition {
        RouteTransition::Entered {
            goal,
            risk_before,
            risk_after,
        } => debug!(
            agent,
            tick,
            risk_before,
            risk_after,
            "rerouting via {:?}",
            goal.as_slice()
        ),
        RouteTransition::Exited { reason, steps } => {
            debug!(agent, tick, steps, "reroute ended: {:?}", reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid() -> ShadowGrid {
        ShadowGrid::new(GridConfig::default()).unwrap()
    }

    #[test]
    fn test_grid_creation() {
        let g = grid();
        assert_eq!(g.agent_count(), 0);
        assert_eq!(g.tick_count(), 0);
        assert!(g.latest_metrics().is_none());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = GridConfig::default().with_safe_distance(-1.0);
        assert!(matches!(ShadowGrid::new(config), Err(GridError::InvalidConfig(_))));
    }

    #[test]
    fn test_duplicate_and_unknown_agents() {
        let mut g = grid();
        g.add_agent("a", Vector3::zeros(), Vector3::new(10.0, 0.0, 0.0)).unwrap();
        let err = g.add_agent("a", Vector3::zeros(), Vector3::new(5.0, 0.0, 0.0)).unwrap_err();
        assert_eq!(err, GridError::DuplicateAgent("a".to_string()));

        assert!(g.agent("a").is_ok());
        assert!(matches!(g.agent("zz"), Err(GridError::UnknownAgent(_))));
    }

    #[test]
    fn test_spawn_generates_shadow_and_clamps() {
        let mut g = grid();
        g.add_agent("a", Vector3::new(-5.0, 10.0, 10.0), Vector3::new(80.0, 10.0, 40.0)).unwrap();
        let a = g.agent("a").unwrap();

        assert_eq!(*a.position(), Vector3::new(0.0, 10.0, 10.0));
        assert_eq!(*a.original_goal(), Vector3::new(50.0, 10.0, 30.0));
        assert_eq!(a.shadow().len(), g.generator().shadow_len());
    }

    #[test]
    fn test_tick_moves_toward_goal() {
        let mut g = grid();
        g.add_agent("a", Vector3::new(10.0, 10.0, 10.0), Vector3::new(40.0, 10.0, 10.0)).unwrap();
        g.tick(0.1);

        let a = g.agent("a").unwrap();
        assert!(a.position().x > 10.0);
        assert_relative_eq!(a.position().y, 10.0, epsilon = 1e-12);
        assert!((a.speed() - 1.5).abs() < 0.5);
        assert_eq!(a.path_history().len(), 2);

        let m = g.latest_metrics().unwrap();
        assert_eq!(m.tick, 1);
        assert_relative_eq!(m.timestamp, 0.1);
        assert_eq!(g.metrics_history().len(), 1);
    }

    #[test]
    fn test_final_step_lands_on_goal() {
        let mut g = grid();
        g.add_agent("a", Vector3::new(10.0, 10.0, 10.0), Vector3::new(10.05, 10.0, 10.0)).unwrap();
        // Already within arrival epsilon: holds position
        g.tick(0.1);
        assert_eq!(*g.agent("a").unwrap().position(), Vector3::new(10.0, 10.0, 10.0));
        assert_eq!(g.agent("a").unwrap().speed(), 0.0);

        let mut g = grid();
        g.add_agent("b", Vector3::new(10.0, 10.0, 10.0), Vector3::new(10.12, 10.0, 10.0)).unwrap();
        g.tick(0.1);
        let b = g.agent("b").unwrap();
        assert_eq!(*b.position(), Vector3::new(10.12, 10.0, 10.0));
        assert_eq!(b.completion_percentage(0.1), 100.0);
    }

    #[test]
    fn test_same_seed_same_run() {
        let build = || {
            let mut g = grid();
            g.add_agent("a", Vector3::new(0.0, 0.0, 10.0), Vector3::new(50.0, 50.0, 10.0)).unwrap();
            g.add_agent("b", Vector3::new(50.0, 50.0, 10.0), Vector3::new(0.0, 0.0, 10.0)).unwrap();
            for _ in 0..40 {
                g.tick(0.1);
            }
            g
        };
        let g1 = build();
        let g2 = build();
        for (a, b) in g1.agents().iter().zip(g2.agents()) {
            assert_eq!(a.position(), b.position());
            assert_eq!(a.collision_risk(), b.collision_risk());
            assert_eq!(a.shadow(), b.shadow());
        }
    }

    #[test]
    fn test_metrics_capacity_and_reset() {
        let config = GridConfig::default().with_metrics_capacity(5);
        let mut g = ShadowGrid::new(config).unwrap();
        g.add_agent("a", Vector3::new(1.0, 1.0, 1.0), Vector3::new(40.0, 1.0, 1.0)).unwrap();
        for _ in 0..12 {
            g.tick(0.1);
        }
        assert_eq!(g.metrics_history().len(), 5);
        assert_eq!(g.latest_metrics().unwrap().tick, 12);

        g.reset_metrics();
        assert!(g.metrics_history().is_empty());
        g.tick(0.1);
        assert_eq!(g.latest_metrics().unwrap().tick, 13);
    }

    #[test]
    fn test_parked_agent_never_reroutes() {
        let mut g = grid();
        g.add_agent("parked", Vector3::new(25.0, 25.0, 10.0), Vector3::new(25.05, 25.0, 10.0)).unwrap();
        g.add_agent("passer", Vector3::new(5.0, 25.0, 10.0), Vector3::new(45.0, 25.0, 10.0)).unwrap();

        let mut saw_risk = false;
        for _ in 0..400 {
            g.tick(0.1);
            let parked = g.agent("parked").unwrap();
            saw_risk |= parked.collision_risk() > g.config().collision_threshold;

            assert!(!parked.is_rerouting());
            assert_eq!(parked.reroute_count(), 0);
            assert_eq!(parked.goal(), *parked.original_goal());
            assert_eq!(*parked.position(), Vector3::new(25.0, 25.0, 10.0));
        }
        assert!(saw_risk, "passer should fly through the parked agent's shadow");
        assert!(g.agent("passer").unwrap().position().x > 25.0);
    }

    #[test]
    fn test_agent_rng_streams_differ() {
        use rand::RngCore;
        let mut a = agent_rng(42, 0, 1);
        let mut b = agent_rng(42, 1, 1);
        let mut c = agent_rng(42, 0, 2);
        let (x, y, z) = (a.next_u64(), b.next_u64(), c.next_u64());
        assert_ne!(x, y);
        assert_ne!(x, z);
        assert_eq!(x, agent_rng(42, 0, 1).next_u64());
    }
}
