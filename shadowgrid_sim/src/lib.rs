//! ShadowGrid simulation harness
//!
//! Named traffic scenarios driven through a [`shadowgrid_core::ShadowGrid`],
//! with pass/fail checks per scenario and a JSON exporter for replaying runs
//! in an external viewer.
//!
//! # Usage
//!
//! ```no_run
//! use shadowgrid_sim::{ScenarioId, ScenarioRunner};
//!
//! let result = ScenarioRunner::new(42)
//!     .with_frames(2000)
//!     .until_arrived(true)
//!     .run(ScenarioId::HeadOn)?;
//! assert!(result.passed);
//! # Ok::<(), shadowgrid_core::GridError>(())
//! ```

pub mod exporter;
pub mod runner;
pub mod scenarios;

pub use exporter::{write_metrics_csv, AgentFrame, FrameDetail, ShadowSample, SimExport, SimFrame};
pub use runner::{ScenarioResult, ScenarioRunner};
pub use scenarios::{AgentSpec, ScenarioId};
