//! Feature-based registration on edge/surface point classes.
//!
//! Points are classified by the eigenvalue spectrum of their local
//! neighbourhood covariance: strongly linear neighbourhoods become edge
//! points, strongly planar ones surface points, the rest are discarded.
//! Matching then runs per class against the matching class of the
//! reference, with a single joint rigid update per iteration.

use std::path::Path;

use kiddo::SquaredEuclidean;
use log::warn;
use nalgebra::{Matrix3, Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::core::{FeatureCloud, PointCloud, Transform};
use crate::error::Result;
use crate::io::ply::write_ply;

use super::icp_core::{
    apply_transform, build_tree, find_correspondences, reject_outliers, solve_rigid,
    CorrespondencePair, Tree,
};
use super::point_to_point::IcpConfig;
use super::Matcher;

/// Configuration for edge/surface feature extraction.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureExtractorConfig {
    /// Neighbourhood size for the local covariance.
    pub neighbors: usize,

    /// Minimum linearity `(l1 - l2) / l1` for edge points.
    pub linearity_threshold: f64,

    /// Minimum planarity `(l2 - l3) / l1` for surface points.
    pub planarity_threshold: f64,
}

impl Default for FeatureExtractorConfig {
    fn default() -> Self {
        Self {
            neighbors: 8,
            linearity_threshold: 0.7,
            planarity_threshold: 0.3,
        }
    }
}

/// Sorted eigenvalues (descending) of a neighbourhood covariance.
fn neighborhood_eigenvalues(
    center: &Point3<f64>,
    tree: &Tree,
    points: &[Point3<f64>],
    k: usize,
) -> [f64; 3] {
    let neighbors = tree.nearest_n::<SquaredEuclidean>(&[center.x, center.y, center.z], k);

    let mut mean = Vector3::zeros();
    for n in &neighbors {
        mean += points[n.item as usize].coords;
    }
    mean /= neighbors.len() as f64;

    let mut cov = Matrix3::zeros();
    for n in &neighbors {
        let d = points[n.item as usize].coords - mean;
        cov += d * d.transpose();
    }
    cov /= neighbors.len() as f64;

    let mut eig: Vec<f64> = cov.symmetric_eigen().eigenvalues.iter().copied().collect();
    eig.sort_by(|a, b| b.total_cmp(a));
    [eig[0], eig[1], eig[2]]
}

/// Split a cloud into edge and surface feature classes.
pub fn extract_features(cloud: &PointCloud, config: &FeatureExtractorConfig) -> FeatureCloud {
    let mut features = FeatureCloud::default();
    let points = cloud.points();

    if points.len() <= config.neighbors {
        // too small to classify; treat everything as surface
        features.surfaces = cloud.clone();
        return features;
    }

    let tree = build_tree(points);
    for p in points {
        let [l1, l2, l3] = neighborhood_eigenvalues(p, &tree, points, config.neighbors);
        if l1 <= f64::EPSILON {
            continue;
        }
        let linearity = (l1 - l2) / l1;
        let planarity = (l2 - l3) / l1;
        if linearity > config.linearity_threshold {
            features.edges.push(*p);
        } else if planarity > config.planarity_threshold {
            features.surfaces.push(*p);
        }
    }
    features
}

/// Feature-based matcher.
pub struct FeatureMatcher {
    icp: IcpConfig,
    extractor: FeatureExtractorConfig,
    reference: FeatureCloud,
    target: FeatureCloud,
    aligned: FeatureCloud,
    correction: Option<Transform>,
}

impl FeatureMatcher {
    /// Create a new feature matcher.
    pub fn new(icp: IcpConfig, extractor: FeatureExtractorConfig) -> Self {
        Self {
            icp,
            extractor,
            reference: FeatureCloud::default(),
            target: FeatureCloud::default(),
            aligned: FeatureCloud::default(),
            correction: None,
        }
    }
}

impl Matcher for FeatureMatcher {
    fn set_reference(&mut self, cloud: &PointCloud) {
        self.reference = extract_features(cloud, &self.extractor);
        self.correction = None;
    }

    fn set_target(&mut self, cloud: &PointCloud) {
        self.target = extract_features(cloud, &self.extractor);
        self.correction = None;
    }

    fn match_clouds(&mut self) -> bool {
        self.correction = None;

        if self.reference.is_empty() || self.target.len() < self.icp.min_correspondences {
            warn!(
                "feature matcher: not enough feature points (reference {}, target {})",
                self.reference.len(),
                self.target.len()
            );
            return false;
        }

        let edge_tree = build_tree(self.reference.edges.points());
        let surface_tree = build_tree(self.reference.surfaces.points());

        let mut moved_edges = self.target.edges.points().to_vec();
        let mut moved_surfaces = self.target.surfaces.points().to_vec();
        let mut correction = Transform::identity();
        let mut converged = false;

        for _ in 0..self.icp.max_iterations {
            let mut pairs: Vec<CorrespondencePair> = Vec::new();
            if !self.reference.edges.is_empty() {
                pairs.extend(find_correspondences(
                    &moved_edges,
                    self.reference.edges.points(),
                    &edge_tree,
                    self.icp.max_correspondence_distance,
                ));
            }
            if !self.reference.surfaces.is_empty() {
                pairs.extend(find_correspondences(
                    &moved_surfaces,
                    self.reference.surfaces.points(),
                    &surface_tree,
                    self.icp.max_correspondence_distance,
                ));
            }

            if pairs.len() < self.icp.min_correspondences {
                warn!(
                    "feature matcher: only {} correspondences, giving up",
                    pairs.len()
                );
                return false;
            }
            reject_outliers(&mut pairs, self.icp.outlier_ratio, self.icp.min_correspondences);

            let delta = match solve_rigid(&pairs) {
                Some(d) => d,
                None => {
                    warn!("feature matcher: degenerate correspondence set");
                    return false;
                }
            };

            apply_transform(&mut moved_edges, &delta);
            apply_transform(&mut moved_surfaces, &delta);
            correction = delta.compose(&correction);

            if delta.translation().norm() < self.icp.translation_epsilon
                && delta.rotation().angle() < self.icp.rotation_epsilon
            {
                converged = true;
                break;
            }
        }

        self.aligned = FeatureCloud {
            edges: PointCloud::from_points(moved_edges),
            surfaces: PointCloud::from_points(moved_surfaces),
        };
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
        write_ply(
            &dir.join(format!("{prefix}reference_edges.ply")),
            &self.reference.edges,
        )?;
        write_ply(
            &dir.join(format!("{prefix}reference_surfaces.ply")),
            &self.reference.surfaces,
        )?;
        write_ply(
            &dir.join(format!("{prefix}aligned_edges.ply")),
            &self.aligned.edges,
        )?;
        write_ply(
            &dir.join(format!("{prefix}aligned_surfaces.ply")),
            &self.aligned.surfaces,
        )?;
        Ok(())
    }

    fn name(&self) -> &str {
        "feature"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;

    /// A plane patch plus a line, so both feature classes are populated.
    fn structured_cloud() -> PointCloud {
        let mut points = Vec::new();
        for i in 0..20 {
            for j in 0..20 {
                points.push(Point3::new(i as f64 * 0.1, j as f64 * 0.1, 0.0));
            }
        }
        for i in 0..40 {
            points.push(Point3::new(1.0, 1.0, 0.1 + i as f64 * 0.05));
        }
        PointCloud::from_points(points)
    }

    #[test]
    fn test_classification_splits_classes() {
        let features = extract_features(&structured_cloud(), &FeatureExtractorConfig::default());
        assert!(!features.surfaces.is_empty(), "plane points expected");
        assert!(!features.edges.is_empty(), "line points expected");
    }

    #[test]
    fn test_recovers_small_offset() {
        let reference = structured_cloud();
        let offset = Transform::from_parts(
            Vector3::new(0.012, 0.008, -0.01),
            UnitQuaternion::identity(),
        );
        let target = reference.transformed(&offset.inverse());

        let mut matcher = FeatureMatcher::new(IcpConfig::default(), FeatureExtractorConfig::default());
        matcher.set_reference(&reference);
        matcher.set_target(&target);
        assert!(matcher.match_clouds());

        let refined = matcher.apply_result(&Transform::identity());
        assert_relative_eq!(
            refined.between(&offset).translation().norm(),
            0.0,
            epsilon = 1e-3
        );
    }
}
