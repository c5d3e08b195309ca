//! Point-to-point ICP over raw 3D point clouds.
//!
//! Iteratively pairs each target point with its nearest reference neighbour,
//! solves the closed-form rigid alignment, and accumulates the corrections
//! until the incremental step falls below the convergence thresholds.

use std::path::Path;

use log::warn;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::core::{PointCloud, Transform};
use crate::error::Result;
use crate::io::ply::write_ply;

use super::icp_core::{
    apply_transform, build_tree, find_correspondences, reject_outliers, solve_rigid,
};
use super::Matcher;

/// Configuration for point-to-point ICP.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IcpConfig {
    /// Maximum number of iterations.
    pub max_iterations: u32,

    /// Convergence threshold for the incremental translation (meters).
    pub translation_epsilon: f64,

    /// Convergence threshold for the incremental rotation (radians).
    pub rotation_epsilon: f64,

    /// Maximum correspondence distance (meters). Pairs farther than this
    /// are rejected.
    pub max_correspondence_distance: f64,

    /// Minimum number of valid correspondences required per iteration.
    pub min_correspondences: usize,

    /// Fraction of the worst correspondences rejected each iteration.
    pub outlier_ratio: f64,
}

impl Default for IcpConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            translation_epsilon: 1e-6,
            rotation_epsilon: 1e-6,
            max_correspondence_distance: 1.0,
            min_correspondences: 10,
            outlier_ratio: 0.05,
        }
    }
}

/// Point-to-point ICP matcher.
pub struct PointToPointMatcher {
    config: IcpConfig,
    reference: PointCloud,
    target: PointCloud,
    aligned: Vec<Point3<f64>>,
    correction: Option<Transform>,
}

impl PointToPointMatcher {
    /// Create a new matcher with the given configuration.
    pub fn new(config: IcpConfig) -> Self {
        Self {
            config,
            reference: PointCloud::new(),
            target: PointCloud::new(),
            aligned: Vec::new(),
            correction: None,
        }
    }
}

impl Matcher for PointToPointMatcher {
    fn set_reference(&mut self, cloud: &PointCloud) {
        self.reference = cloud.clone();
        self.correction = None;
    }

    fn set_target(&mut self, cloud: &PointCloud) {
        self.target = cloud.clone();
        self.correction = None;
    }

    fn match_clouds(&mut self) -> bool {
        self.correction = None;
        self.aligned.clear();

        if self.reference.is_empty() || self.target.len() < self.config.min_correspondences {
            warn!(
                "icp: not enough points (reference {}, target {})",
                self.reference.len(),
                self.target.len()
            );
            return false;
        }

        let tree = build_tree(self.reference.points());
        let mut moved = self.target.points().to_vec();
        let mut correction = Transform::identity();
        let mut converged = false;

        for _ in 0..self.config.max_iterations {
            let mut pairs = find_correspondences(
                &moved,
                self.reference.points(),
                &tree,
                self.config.max_correspondence_distance,
            );
            if pairs.len() < self.config.min_correspondences {
                warn!("icp: only {} correspondences, giving up", pairs.len());
                self.aligned = moved;
                return false;
            }
            reject_outliers(
                &mut pairs,
                self.config.outlier_ratio,
                self.config.min_correspondences,
            );

            let delta = match solve_rigid(&pairs) {
                Some(d) => d,
                None => {
                    warn!("icp: degenerate correspondence set");
                    self.aligned = moved;
                    return false;
                }
            };

            apply_transform(&mut moved, &delta);
            correction = delta.compose(&correction);

            if delta.translation().norm() < self.config.translation_epsilon
                && delta.rotation().angle() < self.config.rotation_epsilon
            {
                converged = true;
                break;
            }
        }

        self.aligned = moved;
        self.correction = Some(correction);
        converged
    }

    fn apply_result(&self, initial: &Transform) -> Transform {
        match &self.correction {
            Some(correction) => correction.compose(initial),
            None => *initial,
        }
    }

    fn save_results(&self, dir: &Path, prefix: &str) -> Result<()> {
        write_ply(&dir.join(format!("{prefix}reference.ply")), &self.reference)?;
        write_ply(&dir.join(format!("{prefix}target.ply")), &self.target)?;
        write_ply(
            &dir.join(format!("{prefix}aligned.ply")),
            &PointCloud::from_points(self.aligned.clone()),
        )?;
        Ok(())
    }

    fn name(&self) -> &str {
        "point_to_point"
    }
}
