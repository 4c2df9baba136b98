//! # gat-core: shared data model for grid stability calculations
//!
//! Types shared by the descriptor loader, the schedulers and the command line:
//!
//! - [`GatError`] / [`GatResult`] - unified error type
//! - [`SimulationStatus`] - probe and calculation outcomes with stable integer codes
//! - [`SimulationResult`], [`LoadIncreaseResult`], [`CriticalTimeResult`] - probe outcomes
//! - [`DiscreteLevels`] - the load levels a margin calculation searches over
//! - [`round_to_accuracy`] and [`ApproxKey`] - deterministic rounding and tolerant float keys
//!
//! ## Quick Start
//!
//! ```rust
//! use gat_core::{round_to_accuracy, DiscreteLevels, SimulationResult, SimulationStatus};
//!
//! let levels = DiscreteLevels::new(25).unwrap();
//! assert_eq!(levels.values(), &[0.0, 25.0, 50.0, 75.0, 100.0]);
//!
//! let mut result = SimulationResult::new("loadIncrease").with_variation(levels.value(2));
//! result.set_outcome(SimulationStatus::Convergence);
//! assert_eq!(result.unique_scenario_id(), "loadIncrease-50");
//!
//! assert_eq!(round_to_accuracy(1.25, 0.1), 1.2);
//! ```

pub mod error;
pub mod levels;
pub mod result;
pub mod status;

pub use error::{GatError, GatResult};
pub use levels::{
    accuracy_multiplier, round_half_down, round_to_accuracy, ApproxKey, DiscreteLevels,
    DOUBLE_EPSILON,
};
pub use result::{CriticalTimeResult, FailingCriterion, LoadIncreaseResult, SimulationResult};
pub use status::SimulationStatus;
