pub mod exact;
pub mod heuristic;

use strum_macros::{Display, EnumString};

/// Outcome of one constraint-model solve attempt.
///
/// Only `Optimal` and `Feasible` carry an assignment; the other statuses
/// surface as distinct error kinds so callers can tell "relax the
/// parameters" apart from "raise the budget and retry".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SolveStatus {
    Optimal,
    Feasible,
    Infeasible,
    ModelInvalid,
    Unknown,
}

/// Which assignment engine to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum SolverStrategy {
    /// Constraint-programming search. Guarantees zero violations on
    /// success but only scales to modest block sizes.
    Exact,
    /// Social-golfer style local search. Scales to large rosters and
    /// usually reaches zero violations, but does not prove optimality.
    Heuristic,
}

/// Initialization strategy for the heuristic solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum InitStrategy {
    /// Pack preferred neighbors first, then fill each round by choosing
    /// the pool with the fewest repeat encounters.
    Greedy,
    /// Independent random shuffle per round.
    Random,
    /// Build one round and replicate it. Useful only as a worst-case
    /// baseline for the optimizer.
    Repeat,
}
