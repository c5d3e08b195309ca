//! Matcher-backed loop closure refinement.

use std::path::Path;

use log::debug;

use crate::core::{Submap, Transform};
use crate::matching::Matcher;

use super::{LoopRefinement, RefinementOutcome};

/// Refines a loop-closure candidate by registering the two submaps' full
/// point clouds, seeded with the coarse relative transform.
pub struct MatcherRefinement {
    matcher: Box<dyn Matcher>,
}

impl MatcherRefinement {
    /// Create a refinement service around the given matcher.
    pub fn new(matcher: Box<dyn Matcher>) -> Self {
        Self { matcher }
    }
}

impl LoopRefinement for MatcherRefinement {
    fn refine(
        &mut self,
        candidate: &Submap,
        query: &Submap,
        coarse: &Transform,
        output_dir: Option<&Path>,
    ) -> RefinementOutcome {
        // both clouds in the candidate's frame: the reference directly, the
        // query pre-aligned through the coarse transform
        let t_candidate_world = candidate.pose().inverse();
        let reference = candidate.points_in_frame(&t_candidate_world, false);
        let t_query_world = query.pose().inverse();
        let target_in_query = query.points_in_frame(&t_query_world, false);
        let target = target_in_query.transformed(coarse);

        self.matcher.set_reference(&reference);
        self.matcher.set_target(&target);
        let successful = self.matcher.match_clouds();
        let relative = self.matcher.apply_result(coarse);

        if let Some(dir) = output_dir {
            let prefix = format!("loop_{}_{}_", candidate.stamp_us(), query.stamp_us());
            if let Err(e) = self.matcher.save_results(dir, &prefix) {
                log::warn!("failed to save loop refinement clouds: {e}");
            }
        }

        debug!(
            "loop refinement {} -> {}: successful={}",
            candidate.stamp_us(),
            query.stamp_us(),
            successful
        );

        RefinementOutcome {
            successful,
            relative,
        }
    }
}
