//! Incremental pose-graph engine: transactions, the engine contract, and the
//! default relaxation solver.

mod relaxation;
mod transaction;

pub use relaxation::{RelaxationConfig, RelaxationGraph};
pub use transaction::{
    uniform_covariance, CovarianceDiagonal, PosePrior, RelativePoseEdge, Transaction,
};

use crate::core::Transform;

/// Incremental nonlinear estimator over poses.
///
/// Accepts transactions (variable declarations plus weighted constraints)
/// and re-solves for a globally consistent pose estimate per variable on
/// [`optimize`](GraphEngine::optimize). `update` is idempotent for variables
/// already present; committed constraints are append-only.
pub trait GraphEngine {
    /// Commit a transaction.
    fn update(&mut self, transaction: Transaction);

    /// Re-solve for all variables given all constraints added so far.
    /// Returns the number of solver iterations performed.
    fn optimize(&mut self) -> usize;

    /// Current estimate for a variable, if declared.
    fn pose(&self, key: u64) -> Option<Transform>;

    /// Number of declared variables.
    fn variable_count(&self) -> usize;
}

/// Factory producing fresh engine instances.
///
/// Stages that need a solver of their own (one per run, or one per submap)
/// receive a factory rather than a shared engine, so no solver state leaks
/// across stage invocations.
pub type GraphEngineFactory = Box<dyn Fn() -> Box<dyn GraphEngine>>;
