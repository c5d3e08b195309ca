//! Submap alignment: correct drift between consecutive submaps with one
//! full-resolution registration per pair.
//!
//! Alignment runs strictly sequentially so each correction builds on the
//! corrected pose of its predecessor. The initial relative guess and the
//! registration frame come from the submaps' *initial* world poses, keeping
//! the registration itself independent of upstream corrections; the new
//! target pose is then anchored to the reference's *current* pose so
//! corrections compound forward through the chain.

use std::path::Path;

use log::{info, warn};

use crate::core::SubmapStore;
use crate::error::Result;
use crate::io::prepare_stage_dir;
use crate::matching::Matcher;
use crate::summary::{RefinementSummary, RegistrationDelta};

/// The submap alignment stage.
pub struct SubmapAligner {
    matcher: Box<dyn Matcher>,
}

impl SubmapAligner {
    /// Create the stage with an injected matcher.
    pub fn new(matcher: Box<dyn Matcher>) -> Self {
        Self { matcher }
    }

    /// Align every consecutive submap pair in store order.
    ///
    /// Fewer than two submaps is a no-op success. A registration failure
    /// for one pair carries the uncorrected relative pose forward for that
    /// link and does not block subsequent pairs.
    pub fn run(
        &mut self,
        store: &mut SubmapStore,
        summary: &mut RefinementSummary,
        output: Option<&Path>,
    ) -> Result<()> {
        if store.len() < 2 {
            warn!("not enough submaps to run submap alignment, at least two are needed");
            return Ok(());
        }

        for i in 1..store.len() {
            info!("aligning submap {} of {}", i, store.len() - 1);

            // reference data, captured before mutably borrowing the target
            let (t_world_ref, t_world_ref_init, reference_cloud) = match store.get(i - 1) {
                Some(r) => {
                    let t_refinit_world = r.pose_init().inverse();
                    (
                        r.pose(),
                        r.pose_init(),
                        r.points_in_frame(&t_refinit_world, true),
                    )
                }
                None => continue,
            };

            let Some(target) = store.get_mut(i) else {
                continue;
            };
            let pair_dir = prepare_stage_dir(output, &format!("submap_{}", target.stamp_us()))?;

            // initial relative pose from the original world poses
            let t_ref_tgt_init = t_world_ref_init.between(&target.pose_init());

            // both clouds in the reference submap's initial local frame,
            // never its current, possibly-already-corrected one
            let t_refinit_world = t_world_ref_init.inverse();
            let target_cloud = target.points_in_frame(&t_refinit_world, true);

            self.matcher.set_reference(&reference_cloud);
            self.matcher.set_target(&target_cloud);

            let t_ref_tgt = if self.matcher.match_clouds() {
                self.matcher.apply_result(&t_ref_tgt_init)
            } else {
                warn!(
                    "registration failed for submap pair {} -> {}, keeping initial relative pose",
                    i - 1,
                    i
                );
                t_ref_tgt_init
            };

            if let Some(dir) = &pair_dir {
                self.matcher.save_results(dir, "submap_cloud_")?;
            }

            // anchor to the reference's current pose so corrections compound
            let before = target.pose();
            let t_world_tgt = t_world_ref.compose(&t_ref_tgt);
            target.update_pose(t_world_tgt);

            summary.record_alignment(
                target.stamp_us(),
                RegistrationDelta::between(&before, &t_world_tgt),
            );
        }

        Ok(())
    }
}
