//! Planner error types.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PlanError {
    /// Start or goal outside the operational bounds or inside prohibited
    /// airspace.
    #[error("start or goal lies outside the plannable airspace")]
    OutOfBounds,
    /// Start and goal are the same point.
    #[error("start and goal are the same point")]
    ZeroLength,
    /// The open set drained without reaching the goal.
    #[error("no feasible path between start and goal")]
    NoPath,
    /// The expansion budget ran out before the goal was reached.
    #[error("search exhausted after {0} node expansions")]
    Exhausted(usize),
}
