//! Per-drone state.
//!
//! Fields are private: the movement step in [`crate::grid`] owns position,
//! velocity and path history, and the [`Replanner`](crate::Replanner) owns
//! the route through [`RouteState`]. Everything else reads via accessors.

use crate::replanner::RouteState;
use crate::shadow::Shadow;
use crate::uncertainty::isotropic;
use nalgebra::{Matrix3, Vector3};

/// Clamps a point into the box `[0, size]` on every axis.
pub fn clamp_to_volume(point: &Vector3<f64>, size: &Vector3<f64>) -> Vector3<f64> {
    point.sup(&Vector3::zeros()).inf(size)
}

/// State of a single drone.
#[derive(Debug, Clone)]
pub struct AgentState {
    /// Unique id within the grid
    id: String,

    /// Current position (always inside the volume)
    position: Vector3<f64>,

    /// Velocity applied during the last move
    velocity: Vector3<f64>,

    /// Where the agent started; baseline for completion
    start_position: Vector3<f64>,

    /// Base prediction covariance, the value every shadow starts from
    covariance: Matrix3<f64>,

    /// Current shadow, regenerated every tick
    shadow: Shadow,

    /// Every visited position, starting with the spawn point
    path_history: Vec<Vector3<f64>>,

    /// Cumulative length of `path_history`
    path_length: f64,

    /// Worst risk against the field at the end of the last tick
    collision_risk: f64,

    /// Goal and rerouting state
    route: RouteState,
}

impl AgentState {
    /// Creates an agent at `start` heading for `goal`.
    pub fn new(id: impl Into<String>, start: Vector3<f64>, goal: Vector3<f64>, initial_uncertainty: f64) -> Self {
        Self {
            id: id.into(),
            position: start,
            velocity: Vector3::zeros(),
            start_position: start,
            covariance: isotropic(initial_uncertainty),
            shadow: Shadow::default(),
            path_history: vec![start],
            path_length: 0.0,
            collision_risk: 0.0,
            route: RouteState::new(goal),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn position(&self) -> &Vector3<f64> {
        &self.position
    }

    pub fn velocity(&self) -> &Vector3<f64> {
        &self.velocity
    }

    /// Instantaneous speed.
    pub fn speed(&self) -> f64 {
        self.velocity.norm()
    }

    /// Current steering target (a temporary alternate while rerouting).
    pub fn goal(&self) -> Vector3<f64> {
        self.route.goal()
    }

    pub fn original_goal(&self) -> &Vector3<f64> {
        self.route.original_goal()
    }

    pub fn start_position(&self) -> &Vector3<f64> {
        &self.start_position
    }

    pub fn covariance(&self) -> &Matrix3<f64> {
        &self.covariance
    }

    pub fn shadow(&self) -> &Shadow {
        &self.shadow
    }

    pub fn path_history(&self) -> &[Vector3<f64>] {
        &self.path_history
    }

    pub fn path_length(&self) -> f64 {
        self.path_length
    }

    pub fn collision_risk(&self) -> f64 {
        self.collision_risk
    }

    pub fn route(&self) -> &RouteState {
        &self.route
    }

    pub fn is_rerouting(&self) -> bool {
        self.route.is_rerouting()
    }

    pub fn rerouting_steps(&self) -> u32 {
        self.route.rerouting_steps()
    }

    pub fn reroute_count(&self) -> u32 {
        self.route.reroute_count()
    }

    /// Distance left to the original goal.
    pub fn distance_to_goal(&self) -> f64 {
        (self.original_goal() - self.position).norm()
    }

    pub fn has_arrived(&self, arrival_epsilon: f64) -> bool {
        self.distance_to_goal() <= arrival_epsilon
    }

    /// Progress towards the original goal in percent.
    ///
    /// `100 × (1 − remaining / total)`, capped at 100. An agent whose start
    /// equals its goal, or that has arrived, is complete.
    pub fn completion_percentage(&self, arrival_epsilon: f64) -> f64 {
        let total = (self.original_goal() - self.start_position).norm();
        if total <= 0.0 || self.has_arrived(arrival_epsilon) {
            return 100.0;
        }
        (100.0 * (1.0 - self.distance_to_goal() / total)).min(100.0)
    }

    // ========== Crate-internal mutators ==========

    /// Records a move. Only the tick's movement step calls this.
    pub(crate) fn move_to(&mut self, position: Vector3<f64>, velocity: Vector3<f64>) {
        self.path_length += (position - self.position).norm();
        self.position = position;
        self.velocity = velocity;
        self.path_history.push(position);
    }

    /// Marks the agent as hovering.
    pub(crate) fn hold(&mut self) {
        self.velocity = Vector3::zeros();
    }

    pub(crate) fn set_shadow(&mut self, shadow: Shadow) {
        self.shadow = shadow;
    }

    pub(crate) fn set_collision_risk(&mut self, risk: f64) {
        self.collision_risk = risk;
    }

    pub(crate) fn route_mut(&mut self) -> &mut RouteState {
        &mut self.route
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn agent(start: Vector3<f64>, goal: Vector3<f64>) -> AgentState {
        AgentState::new("a", start, goal, 0.1)
    }

    #[test]
    fn test_new_agent_is_nominal() {
        let a = agent(Vector3::zeros(), Vector3::new(10.0, 0.0, 0.0));
        assert!(!a.is_rerouting());
        assert_eq!(a.rerouting_steps(), 0);
        assert_eq!(a.reroute_count(), 0);
        assert_eq!(a.goal(), *a.original_goal());
        assert_eq!(a.path_history().len(), 1);
        assert_relative_eq!(a.covariance()[(1, 1)], 0.1);
    }

    #[test]
    fn test_move_accumulates_path_length() {
        let mut a = agent(Vector3::zeros(), Vector3::new(10.0, 0.0, 0.0));
        a.move_to(Vector3::new(3.0, 4.0, 0.0), Vector3::new(1.5, 0.0, 0.0));
        a.move_to(Vector3::new(3.0, 4.0, 2.0), Vector3::new(0.0, 0.0, 1.5));

        assert_relative_eq!(a.path_length(), 7.0);
        assert_eq!(a.path_history().len(), 3);
        assert_relative_eq!(a.speed(), 1.5);

        a.hold();
        assert_eq!(a.speed(), 0.0);
    }

    #[test]
    fn test_completion_percentage() {
        let mut a = agent(Vector3::zeros(), Vector3::new(10.0, 0.0, 0.0));
        assert_relative_eq!(a.completion_percentage(0.1), 0.0);

        a.move_to(Vector3::new(2.5, 0.0, 0.0), Vector3::zeros());
        assert_relative_eq!(a.completion_percentage(0.1), 25.0);

        a.move_to(Vector3::new(9.95, 0.0, 0.0), Vector3::zeros());
        assert_eq!(a.completion_percentage(0.1), 100.0);

        let same = agent(Vector3::new(1.0, 1.0, 1.0), Vector3::new(1.0, 1.0, 1.0));
        assert_eq!(same.completion_percentage(0.0), 100.0);
    }

    #[test]
    fn test_clamp_to_volume() {
        let size = Vector3::new(50.0, 50.0, 30.0);
        let clamped = clamp_to_volume(&Vector3::new(-3.0, 60.0, 12.0), &size);
        assert_eq!(clamped, Vector3::new(0.0, 50.0, 12.0));
    }
}
