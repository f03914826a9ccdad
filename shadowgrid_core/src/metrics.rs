//! Per-tick metrics and whole-run summaries.
//!
//! One [`TickMetrics`] record is appended after every tick. The history is
//! cleared when a grid is built, appended once per tick and otherwise
//! read-only; an optional capacity drops the oldest records first.

use crate::agent::AgentState;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Aggregated state of the whole grid after one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickMetrics {
    /// Tick index (1 for the first tick)
    pub tick: u64,

    /// Simulated time in seconds
    pub timestamp: f64,

    /// Mean collision risk across agents
    pub mean_risk: f64,

    /// Maximum collision risk across agents
    pub max_risk: f64,

    /// Cumulative path length per agent
    pub path_length: BTreeMap<String, f64>,

    /// Instantaneous speed per agent
    pub speed: BTreeMap<String, f64>,

    /// Lifetime reroute count per agent
    pub reroute_count: BTreeMap<String, u32>,

    /// Completion percentage per agent
    pub completion: BTreeMap<String, f64>,
}

impl TickMetrics {
    /// Builds the record for the current agent states.
    pub fn from_agents(tick: u64, timestamp: f64, agents: &[AgentState], arrival_epsilon: f64) -> Self {
        let risks: Vec<f64> = agents.iter().map(AgentState::collision_risk).collect();
        let mean_risk = if risks.is_empty() {
            0.0
        } else {
            risks.iter().sum::<f64>() / risks.len() as f64
        };
        let max_risk = risks.iter().copied().fold(0.0, f64::max);

        Self {
            tick,
            timestamp,
            mean_risk,
            max_risk,
            path_length: per_agent(agents, AgentState::path_length),
            speed: per_agent(agents, AgentState::speed),
            reroute_count: agents
                .iter()
                .map(|a| (a.id().to_string(), a.reroute_count()))
                .collect(),
            completion: per_agent(agents, |a| a.completion_percentage(arrival_epsilon)),
        }
    }
}

fn per_agent<F>(agents: &[AgentState], f: F) -> BTreeMap<String, f64>
where
    F: Fn(&AgentState) -> f64,
{
    agents.iter().map(|a| (a.id().to_string(), f(a))).collect()
}

// ============================================================================
// HISTORY
// ============================================================================

/// Ordered record of tick metrics, optionally capped.
#[derive(Debug, Clone, Default)]
pub struct MetricsHistory {
    records: VecDeque<TickMetrics>,
    capacity: Option<usize>,
}

impl MetricsHistory {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            records: VecDeque::new(),
            capacity,
        }
    }

    /// Appends a record, evicting the oldest when over capacity.
    pub fn push(&mut self, record: TickMetrics) {
        self.records.push_back(record);
        if let Some(cap) = self.capacity {
            while self.records.len() > cap.max(1) {
                self.records.pop_front();
            }
        }
    }

    /// The most recent record.
    pub fn latest(&self) -> Option<&TickMetrics> {
        self.records.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TickMetrics> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn to_vec(&self) -> Vec<TickMetrics> {
        self.records.iter().cloned().collect()
    }
}

// ============================================================================
// SUMMARY
// ============================================================================

/// Statistics over a whole run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    /// Timestamp of the last record
    pub total_simulation_time: f64,

    /// Mean of the per-tick mean risk
    pub average_collision_risk: f64,

    /// Largest per-tick maximum risk
    pub max_collision_risk_observed: f64,

    /// Completion per agent in the last record
    pub final_completion_percentage: BTreeMap<String, f64>,

    /// Reroute count per agent in the last record
    pub total_rerouting_events: BTreeMap<String, u32>,

    /// Mean speed per agent over all records
    pub average_velocities: BTreeMap<String, f64>,
}

impl MetricsSummary {
    pub fn from_history<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a TickMetrics>,
    {
        let records: Vec<&TickMetrics> = records.into_iter().collect();
        let Some(last) = records.last() else {
            return Self::default();
        };

        let n = records.len() as f64;
        let mut speed_sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for record in &records {
            for (id, speed) in &record.speed {
                let entry = speed_sums.entry(id.clone()).or_insert((0.0, 0));
                entry.0 += speed;
                entry.1 += 1;
            }
        }

        Self {
            total_simulation_time: last.timestamp,
            average_collision_risk: records.iter().map(|r| r.mean_risk).sum::<f64>() / n,
            max_collision_risk_observed: records.iter().map(|r| r.max_risk).fold(0.0, f64::max),
            final_completion_percentage: last.completion.clone(),
            total_rerouting_events: last.reroute_count.clone(),
            average_velocities: speed_sums
                .into_iter()
                .map(|(id, (sum, count))| (id, sum / count as f64))
                .collect(),
        }
    }

    /// Sum of reroutes across every agent.
    pub fn total_reroutes(&self) -> u32 {
        self.total_rerouting_events.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn record(tick: u64, mean: f64, max: f64, speed: f64) -> TickMetrics {
        TickMetrics {
            tick,
            timestamp: tick as f64 * 0.1,
            mean_risk: mean,
            max_risk: max,
            path_length: BTreeMap::new(),
            speed: [("a".to_string(), speed)].into_iter().collect(),
            reroute_count: [("a".to_string(), tick as u32)].into_iter().collect(),
            completion: [("a".to_string(), 10.0 * tick as f64)].into_iter().collect(),
        }
    }

    #[test]
    fn test_from_agents_aggregates() {
        let mut a = AgentState::new("a", Vector3::zeros(), Vector3::new(10.0, 0.0, 0.0), 0.1);
        let b = AgentState::new("b", Vector3::zeros(), Vector3::new(0.0, 10.0, 0.0), 0.1);
        a.set_collision_risk(0.4);
        a.move_to(Vector3::new(5.0, 0.0, 0.0), Vector3::new(1.5, 0.0, 0.0));

        let m = TickMetrics::from_agents(3, 0.3, &[a, b], 0.1);
        assert_relative_eq!(m.mean_risk, 0.2);
        assert_relative_eq!(m.max_risk, 0.4);
        assert_relative_eq!(m.path_length["a"], 5.0);
        assert_relative_eq!(m.speed["a"], 1.5);
        assert_relative_eq!(m.completion["a"], 50.0);
        assert_relative_eq!(m.completion["b"], 0.0);
        assert_eq!(m.reroute_count["b"], 0);
    }

    #[test]
    fn test_empty_grid_metrics() {
        let m = TickMetrics::from_agents(1, 0.1, &[], 0.1);
        assert_eq!(m.mean_risk, 0.0);
        assert_eq!(m.max_risk, 0.0);
        assert!(m.completion.is_empty());
    }

    #[test]
    fn test_history_capacity_keeps_latest() {
        let mut history = MetricsHistory::new(Some(3));
        for tick in 1..=5 {
            history.push(record(tick, 0.0, 0.0, 1.0));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.latest().unwrap().tick, 5);
        assert_eq!(history.iter().next().unwrap().tick, 3);

        history.clear();
        assert!(history.latest().is_none());
    }

    #[test]
    fn test_summary() {
        let records = vec![record(1, 0.1, 0.3, 1.0), record(2, 0.3, 0.7, 2.0)];
        let summary = MetricsSummary::from_history(&records);

        assert_relative_eq!(summary.total_simulation_time, 0.2);
        assert_relative_eq!(summary.average_collision_risk, 0.2);
        assert_relative_eq!(summary.max_collision_risk_observed, 0.7);
        assert_relative_eq!(summary.final_completion_percentage["a"], 20.0);
        assert_eq!(summary.total_rerouting_events["a"], 2);
        assert_relative_eq!(summary.average_velocities["a"], 1.5);
        assert_eq!(summary.total_reroutes(), 2);

        assert_eq!(MetricsSummary::from_history(std::iter::empty()), MetricsSummary::default());
    }
}
