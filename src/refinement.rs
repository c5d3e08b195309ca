//! Submap refinement: correct drift within a single submap's keyframe
//! trajectory using only that submap's own point data.
//!
//! Each submap gets a fresh local pose graph and a fresh local registration
//! map. Keyframes are registered against the accumulating map in temporal
//! order, each producing one relative-pose constraint; a single solve at the
//! end rewrites every keyframe pose in place.

use std::path::Path;

use log::{info, warn};

use crate::config::SubmapRefinementConfig;
use crate::core::{PointCloud, Submap, SubmapStore, Transform};
use crate::error::Result;
use crate::graph::{uniform_covariance, CovarianceDiagonal, GraphEngineFactory, Transaction};
use crate::io::ply::write_ply;
use crate::io::prepare_stage_dir;
use crate::matching::Matcher;
use crate::summary::{RefinementSummary, RegistrationDelta};

/// Accumulated registration map in the submap's local frame.
///
/// Holds the points of every successfully registered keyframe, projected at
/// their refined poses, as the reference for the next registration.
#[derive(Default)]
pub struct LocalRegistrationMap {
    cloud: PointCloud,
}

impl LocalRegistrationMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all accumulated points.
    pub fn clear(&mut self) {
        self.cloud.clear();
    }

    /// Insert a keyframe cloud at the given submap-frame pose.
    pub fn insert(&mut self, cloud: &PointCloud, pose: &Transform) {
        self.cloud.merge_transformed(cloud, pose);
    }

    /// The accumulated reference cloud.
    pub fn cloud(&self) -> &PointCloud {
        &self.cloud
    }

    /// True if nothing has been inserted yet.
    pub fn is_empty(&self) -> bool {
        self.cloud.is_empty()
    }
}

/// The submap refinement stage.
pub struct SubmapRefiner {
    matcher: Box<dyn Matcher>,
    engine_factory: GraphEngineFactory,
    scan_covariance: CovarianceDiagonal,
    prior_covariance: CovarianceDiagonal,
}

impl SubmapRefiner {
    /// Create the stage with an injected matcher and graph engine factory.
    pub fn new(
        matcher: Box<dyn Matcher>,
        engine_factory: GraphEngineFactory,
        config: &SubmapRefinementConfig,
    ) -> Self {
        Self {
            matcher,
            engine_factory,
            scan_covariance: uniform_covariance(config.scan_registration_covariance),
            prior_covariance: uniform_covariance(config.pose_prior_covariance),
        }
    }

    /// Refine every submap in store order.
    pub fn run(
        &mut self,
        store: &mut SubmapStore,
        summary: &mut RefinementSummary,
        output: Option<&Path>,
    ) -> Result<()> {
        let total = store.len();
        for (i, submap) in store.submaps_mut().iter_mut().enumerate() {
            info!("refining submap {} of {}", i + 1, total);
            self.refine(submap, summary, output)?;
        }
        Ok(())
    }

    /// Refine a single submap in place.
    ///
    /// Registration failure for a single keyframe is non-fatal: that
    /// keyframe contributes no constraint but its pose is still read back
    /// from the solved graph at the end.
    pub fn refine(
        &mut self,
        submap: &mut Submap,
        summary: &mut RefinementSummary,
        output: Option<&Path>,
    ) -> Result<()> {
        let submap_dir = prepare_stage_dir(output, &format!("submap_{}", submap.stamp_us()))?;

        let mut graph = (self.engine_factory)();
        let mut map = LocalRegistrationMap::new();
        map.clear();

        // anchor: the first keyframe is held by a prior; later keyframes are
        // constrained relative to it through scan-to-map registration
        let mut anchor: Option<(u64, Transform)> = None;

        for kf in submap.keyframes() {
            let mut transaction = Transaction::new();
            transaction.add_variable(kf.timestamp_us(), kf.local_pose());

            match anchor {
                None => {
                    transaction.add_prior(kf.timestamp_us(), kf.local_pose(), self.prior_covariance);
                    anchor = Some((kf.timestamp_us(), kf.local_pose()));
                    map.insert(kf.cloud(), &kf.local_pose());
                }
                Some((anchor_stamp, anchor_pose)) => {
                    self.matcher.set_reference(map.cloud());
                    let target = kf.cloud_in_submap_frame();
                    self.matcher.set_target(&target);

                    if self.matcher.match_clouds() {
                        let refined = self.matcher.apply_result(&kf.local_pose());
                        transaction.add_edge(
                            anchor_stamp,
                            kf.timestamp_us(),
                            anchor_pose.between(&refined),
                            self.scan_covariance,
                        );
                        map.insert(kf.cloud(), &refined);
                    } else {
                        warn!(
                            "scan registration failed for keyframe {}, no constraint added",
                            kf.timestamp_us()
                        );
                    }
                }
            }

            graph.update(transaction);
        }

        // TODO: fold visual constraints into the local graph once a visual
        // front-end produces them
        graph.optimize();

        for kf in submap.keyframes_mut() {
            let before = kf.local_pose();
            if let Some(after) = graph.pose(kf.timestamp_us()) {
                kf.set_local_pose(after);
                summary.record_refinement(
                    kf.timestamp_us(),
                    RegistrationDelta::between(&before, &after),
                );
            }
        }

        if let Some(dir) = submap_dir {
            write_ply(&dir.join("registration_map.ply"), map.cloud())?;
        }

        Ok(())
    }
}
