//! Local replanner and the rerouting state machine.
//!
//! # States
//!
//! ```text
//!              risk > threshold  &&  better candidate found
//!   ┌─────────┐ ───────────────────────────────────────────▶ ┌───────────┐
//!   │ Nominal │                                               │ Rerouting │
//!   └─────────┘ ◀─────────────────────────────────────────── └───────────┘
//!        steps > timeout  ||  risk < threshold × hysteresis  ||  arrived
//! ```
//!
//! The replanner is the only writer of [`RouteState`]; every change goes
//! through [`Replanner::apply`]. Candidate trials are pure evaluations over
//! the agent's current state and a frozen set of peer shadows.

use crate::agent::{clamp_to_volume, AgentState};
use crate::config::GridConfig;
use crate::risk::field_risk;
use crate::shadow::{unit_direction, Shadow, ShadowGenerator};
use crate::uncertainty::UncertaintyModel;
use nalgebra::{Rotation3, Vector3};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

// ============================================================================
// ROUTE STATE
// ============================================================================

/// Whether an agent steers for its own goal or a temporary alternate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RouteMode {
    /// Steering for the original goal
    Nominal,

    /// Steering for a temporary alternate goal
    Rerouting {
        /// The alternate goal
        goal: Vector3<f64>,
        /// Movement ticks spent rerouting so far
        steps: u32,
    },
}

/// Goal bookkeeping for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteState {
    original_goal: Vector3<f64>,
    mode: RouteMode,
    reroute_count: u32,
}

impl RouteState {
    pub fn new(original_goal: Vector3<f64>) -> Self {
        Self {
            original_goal,
            mode: RouteMode::Nominal,
            reroute_count: 0,
        }
    }

    /// Current steering target.
    pub fn goal(&self) -> Vector3<f64> {
        match self.mode {
            RouteMode::Nominal => self.original_goal,
            RouteMode::Rerouting { goal, .. } => goal,
        }
    }

    pub fn original_goal(&self) -> &Vector3<f64> {
        &self.original_goal
    }

    pub fn mode(&self) -> &RouteMode {
        &self.mode
    }

    pub fn is_rerouting(&self) -> bool {
        matches!(self.mode, RouteMode::Rerouting { .. })
    }

    /// Ticks spent in the current reroute (0 when nominal).
    pub fn rerouting_steps(&self) -> u32 {
        match self.mode {
            RouteMode::Nominal => 0,
            RouteMode::Rerouting { steps, .. } => steps,
        }
    }

    /// Lifetime number of reroutes entered.
    pub fn reroute_count(&self) -> u32 {
        self.reroute_count
    }

    fn enter(&mut self, goal: Vector3<f64>) {
        self.mode = RouteMode::Rerouting { goal, steps: 0 };
        self.reroute_count += 1;
    }

    fn exit(&mut self) {
        self.mode = RouteMode::Nominal;
    }
}

// ============================================================================
// EVENTS & TRANSITIONS
// ============================================================================

/// A scored alternate goal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Alternate goal, already clamped to the volume
    pub goal: Vector3<f64>,

    /// Field risk with this goal substituted
    pub risk: f64,

    /// Probe distance from the agent
    pub radius: f64,

    /// Probe heading relative to the goal direction (radians)
    pub angle: f64,
}

/// Input to the route state machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RouteEvent {
    /// A movement tick is about to happen; `risk` is the latest field risk.
    Advance { risk: f64 },

    /// Fresh risk has been computed; `candidate` is the best alternate found, if searched.
    Assess { risk: f64, candidate: Option<Candidate> },

    /// The agent is parked within arrival distance of its original goal.
    Arrive,
}

/// Why a reroute ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    /// The step counter passed the timeout
    Timeout,

    /// Risk fell inside the hysteresis band
    RiskCleared,

    /// The agent reached its original goal
    Arrived,
}

/// A state change reported by [`Replanner::apply`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RouteTransition {
    Entered {
        goal: Vector3<f64>,
        risk_before: f64,
        risk_after: f64,
    },
    Exited {
        reason: ExitReason,
        steps: u32,
    },
}

// ============================================================================
// REPLANNER
// ============================================================================

/// Searches alternate goals and drives the route state machine.
#[derive(Debug, Clone)]
pub struct Replanner {
    /// Risk above which a reroute is attempted
    pub collision_threshold: f64,

    /// Exit once risk drops below `collision_threshold × hysteresis_factor`
    pub hysteresis_factor: f64,

    /// Exit once the reroute has lasted more than this many ticks
    pub reroute_timeout: u32,

    /// Probe distances
    pub radii: Vec<f64>,

    /// Probe headings in radians, relative to the goal direction
    pub headings: Vec<f64>,

    /// Extent of the volume candidates are clamped into
    pub space_size: Vector3<f64>,

    /// Separation used when scoring candidates
    pub safe_distance: f64,
}

impl Replanner {
    pub fn from_config(config: &GridConfig) -> Self {
        Self {
            collision_threshold: config.collision_threshold,
            hysteresis_factor: config.hysteresis_factor,
            reroute_timeout: config.reroute_timeout,
            radii: config.search_radii.clone(),
            headings: config.search_headings(),
            space_size: config.space_size,
            safe_distance: config.safe_distance,
        }
    }

    /// Risk below which a reroute ends.
    pub fn exit_threshold(&self) -> f64 {
        self.collision_threshold * self.hysteresis_factor
    }

    /// True when the agent should look for an alternate goal.
    pub fn needs_search(&self, route: &RouteState, risk: f64) -> bool {
        !route.is_rerouting() && risk > self.collision_threshold
    }

    /// Candidate goals around `position`, as `(radius, angle, goal)`.
    ///
    /// Headings rotate the direction to `original_goal` about the vertical
    /// axis. Empty when the agent sits on its original goal.
    pub fn candidate_goals(
        &self,
        position: &Vector3<f64>,
        original_goal: &Vector3<f64>,
    ) -> Vec<(f64, f64, Vector3<f64>)> {
        let direction = unit_direction(position, original_goal);
        if direction == Vector3::zeros() {
            return Vec::new();
        }

        let mut goals = Vec::with_capacity(self.radii.len() * self.headings.len());
        for &radius in &self.radii {
            for &angle in &self.headings {
                let rotated = Rotation3::from_axis_angle(&Vector3::z_axis(), angle) * direction;
                let goal = clamp_to_volume(&(position + rotated * radius), &self.space_size);
                goals.push((radius, angle, goal));
            }
        }
        goals
    }

    /// Risk the agent would carry if it steered for `goal` instead.
    ///
    /// Does not touch the agent; the hypothetical shadow is discarded.
    pub fn evaluate<M, R>(
        &self,
        agent: &AgentState,
        goal: &Vector3<f64>,
        generator: &ShadowGenerator<M>,
        peers: &[&Shadow],
        rng: &mut R,
    ) -> f64
    where
        M: UncertaintyModel,
        R: Rng + ?Sized,
    {
        let shadow = generator.generate(
            agent.position(),
            agent.velocity(),
            goal,
            agent.covariance(),
            rng,
        );
        field_risk(&shadow, peers.iter().copied(), self.safe_distance)
    }

    /// Exhaustive local search for the lowest-risk alternate goal.
    ///
    /// Returns the best candidate regardless of whether it beats the
    /// current risk; [`Replanner::apply`] makes that comparison. The first
    /// candidate wins ties.
    pub fn search<M, R>(
        &self,
        agent: &AgentState,
        generator: &ShadowGenerator<M>,
        peers: &[&Shadow],
        rng: &mut R,
    ) -> Option<Candidate>
    where
        M: UncertaintyModel,
        R: Rng + ?Sized,
    {
        let original_goal = agent.original_goal();
        let mut best: Option<Candidate> = None;

        for (radius, angle, goal) in self.candidate_goals(agent.position(), original_goal) {
            if goal == *original_goal {
                continue;
            }

            let risk = self.evaluate(agent, &goal, generator, peers, rng);
            trace!(
                agent = agent.id(),
                radius,
                angle,
                risk,
                "candidate evaluated"
            );

            if best.map_or(true, |b| risk < b.risk) {
                best = Some(Candidate {
                    goal,
                    risk,
                    radius,
                    angle,
                });
            }
        }

        best
    }

    /// The single transition operation of the route state machine.
    pub fn apply(&self, route: &mut RouteState, event: RouteEvent) -> Option<RouteTransition> {
        match event {
            RouteEvent::Advance { risk } => {
                let RouteMode::Rerouting { steps, .. } = &mut route.mode else {
                    return None;
                };
                *steps += 1;
                let steps = *steps;

                let reason = if steps > self.reroute_timeout {
                    ExitReason::Timeout
                } else if risk < self.exit_threshold() {
                    ExitReason::RiskCleared
                } else {
                    return None;
                };

                route.exit();
                Some(RouteTransition::Exited { reason, steps })
            }

            RouteEvent::Arrive => {
                let steps = route.rerouting_steps();
                if !route.is_rerouting() {
                    return None;
                }
                route.exit();
                Some(RouteTransition::Exited {
                    reason: ExitReason::Arrived,
                    steps,
                })
            }

            RouteEvent::Assess { risk, candidate } => {
                if !self.needs_search(route, risk) {
                    return None;
                }
                let candidate = candidate?;
                if candidate.risk >= risk || candidate.goal == route.original_goal {
                    return None;
                }

                route.enter(candidate.goal);
                Some(RouteTransition::Entered {
                    goal: candidate.goal,
                    risk_before: risk,
                    risk_after: candidate.risk,
                })
            }
        }
    }
}
