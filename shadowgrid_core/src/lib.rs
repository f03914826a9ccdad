//! ShadowGrid Core - probabilistic collision prediction for drone swarms
//!
//! Agents fly straight at their goals through a bounded volume. Instead of
//! checking geometric intersections, every agent carries a *probability
//! shadow*: a weighted cloud of where it is likely to be over the next few
//! seconds, widening with look-ahead. Overlapping shadows yield a collision
//! risk, and an agent whose risk crosses a threshold temporarily steers for
//! a nearby alternate goal until the threat clears.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                        ShadowGrid                         │
//! │   tick: freeze peers → per-agent update (rayon) → publish │
//! │                                                           │
//! │  ┌────────────┐   ┌────────────┐   ┌──────────────────┐   │
//! │  │   SHADOW   │──▶│    RISK    │──▶│    REPLANNER     │   │
//! │  │ generator  │   │ estimator  │   │ search + routes  │   │
//! │  └─────▲──────┘   └────────────┘   └──────────────────┘   │
//! │        │                                                  │
//! │  ┌─────┴──────┐                    ┌──────────────────┐   │
//! │  │UNCERTAINTY │                    │     METRICS      │   │
//! │  │   model    │                    │ history/summary  │   │
//! │  └────────────┘                    └──────────────────┘   │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use nalgebra::Vector3;
//! use shadowgrid_core::{GridConfig, ShadowGrid};
//!
//! let mut grid = ShadowGrid::new(GridConfig::default())?;
//! grid.add_agent("alpha", Vector3::new(0.0, 0.0, 0.0), Vector3::new(50.0, 50.0, 30.0))?;
//! grid.add_agent("bravo", Vector3::new(50.0, 50.0, 30.0), Vector3::new(0.0, 0.0, 0.0))?;
//!
//! grid.run_until_arrived(0.1, 3000);
//! println!("{:?}", grid.latest_metrics());
//! # Ok::<(), shadowgrid_core::GridError>(())
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod grid;
pub mod metrics;
pub mod replanner;
pub mod risk;
pub mod shadow;
pub mod uncertainty;

// Re-export key types for convenience
pub use agent::{clamp_to_volume, AgentState};
pub use config::GridConfig;
pub use error::{GridError, Result};
pub use grid::ShadowGrid;
pub use metrics::{MetricsHistory, MetricsSummary, TickMetrics};
pub use replanner::{Candidate, ExitReason, Replanner, RouteEvent, RouteMode, RouteState, RouteTransition};
pub use risk::{collision_risk, field_risk};
pub use shadow::{Shadow, ShadowGenerator, ShadowPoint};
pub use uncertainty::{LinearGrowth, UncertaintyModel};
