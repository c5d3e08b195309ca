//! Transactions: atomic batches of variables and constraints.

use crate::core::Transform;

/// Diagonal of a 6x6 covariance, ordered translation xyz then rotation xyz.
pub type CovarianceDiagonal = [f64; 6];

/// Expand a scalar diagonal value into a full covariance diagonal.
pub fn uniform_covariance(diagonal: f64) -> CovarianceDiagonal {
    [diagonal; 6]
}

/// Absolute pose prior on a single variable.
#[derive(Clone, Debug)]
pub struct PosePrior {
    /// Variable key (timestamp in microseconds).
    pub key: u64,
    /// Prior pose value.
    pub pose: Transform,
    /// Prior covariance diagonal.
    pub covariance: CovarianceDiagonal,
}

/// Relative pose constraint between two variables.
#[derive(Clone, Debug)]
pub struct RelativePoseEdge {
    /// Source variable key.
    pub from: u64,
    /// Destination variable key.
    pub to: u64,
    /// Measured relative transform `T_from_to`.
    pub relative: Transform,
    /// Measurement covariance diagonal.
    pub covariance: CovarianceDiagonal,
}

/// An atomic batch of variable declarations and weighted constraints.
///
/// Transactions are the only way to grow a graph. Once committed through
/// [`GraphEngine::update`](super::GraphEngine::update), the contained edges
/// are never removed or edited.
#[derive(Clone, Debug, Default)]
pub struct Transaction {
    variables: Vec<(u64, Transform)>,
    priors: Vec<PosePrior>,
    edges: Vec<RelativePoseEdge>,
}

impl Transaction {
    /// Create an empty transaction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a pose variable with an initial value.
    ///
    /// Re-declaring a key the engine already holds is a no-op at commit time.
    pub fn add_variable(&mut self, key: u64, pose: Transform) {
        self.variables.push((key, pose));
    }

    /// Add an absolute pose prior.
    pub fn add_prior(&mut self, key: u64, pose: Transform, covariance: CovarianceDiagonal) {
        self.priors.push(PosePrior {
            key,
            pose,
            covariance,
        });
    }

    /// Add a relative pose constraint.
    pub fn add_edge(
        &mut self,
        from: u64,
        to: u64,
        relative: Transform,
        covariance: CovarianceDiagonal,
    ) {
        self.edges.push(RelativePoseEdge {
            from,
            to,
            relative,
            covariance,
        });
    }

    /// Merge another transaction into this one.
    pub fn merge(&mut self, other: Transaction) {
        self.variables.extend(other.variables);
        self.priors.extend(other.priors);
        self.edges.extend(other.edges);
    }

    /// Declared variables.
    pub fn variables(&self) -> &[(u64, Transform)] {
        &self.variables
    }

    /// Declared priors.
    pub fn priors(&self) -> &[PosePrior] {
        &self.priors
    }

    /// Declared edges.
    pub fn edges(&self) -> &[RelativePoseEdge] {
        &self.edges
    }

    /// True when the transaction carries no constraints (edges or priors).
    pub fn has_constraints(&self) -> bool {
        !self.edges.is_empty() || !self.priors.is_empty()
    }
}
