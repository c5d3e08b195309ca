//! Loop closure services: candidate search and candidate refinement.
//!
//! Both are consumed by the pose-graph stage as black boxes behind traits.
//! The crate ships a proximity-based search and a matcher-backed refinement;
//! callers can inject their own implementations.

mod proximity;
mod refinement;

pub use proximity::{ProximitySearch, ProximitySearchConfig};
pub use refinement::MatcherRefinement;

use std::path::Path;

use crate::core::{SubmapStore, Transform};

/// A candidate match for a query submap.
///
/// Ephemeral: produced by candidate search and consumed immediately by
/// refinement.
#[derive(Clone, Debug)]
pub struct Candidate {
    /// Store index of the candidate submap.
    pub index: usize,
    /// Coarse relative transform `T_candidate_query`.
    pub coarse: Transform,
}

/// Loop-closure candidate search.
pub trait CandidateSearch {
    /// Find candidate matches for the submap at `query_index`.
    ///
    /// The trailing `exclude_last_n` submaps of the store must never be
    /// returned as candidates. When `use_initial_poses` is set, search runs
    /// against initial instead of current world poses. `output_dir`, when
    /// given, may receive diagnostic artifacts.
    fn find_candidates(
        &mut self,
        store: &SubmapStore,
        query_index: usize,
        exclude_last_n: usize,
        use_initial_poses: bool,
        output_dir: Option<&Path>,
    ) -> Vec<Candidate>;
}

/// Result of refining one loop-closure candidate.
///
/// Ephemeral: either accepted into the pose graph or discarded.
#[derive(Clone, Debug)]
pub struct RefinementOutcome {
    /// Whether precise registration succeeded.
    pub successful: bool,
    /// Refined relative transform `T_candidate_query`.
    pub relative: Transform,
}

/// Precise registration of a loop-closure candidate pair.
pub trait LoopRefinement {
    /// Attempt precise registration between a candidate and a query submap,
    /// seeded with the coarse relative transform.
    fn refine(
        &mut self,
        candidate: &crate::core::Submap,
        query: &crate::core::Submap,
        coarse: &Transform,
        output_dir: Option<&Path>,
    ) -> RefinementOutcome;
}
