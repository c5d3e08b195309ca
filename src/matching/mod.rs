//! Point cloud registration: the matcher contract and its implementations.
//!
//! Stages consume registration through the [`Matcher`] trait only. The
//! concrete variant is a closed set of tagged implementations selected once
//! at construction via [`build_matcher`], never by runtime type dispatch at
//! call sites.

mod feature;
mod icp_core;
mod point_to_point;

pub use feature::{FeatureExtractorConfig, FeatureMatcher};
pub use point_to_point::{IcpConfig, PointToPointMatcher};

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{PointCloud, Transform};
use crate::error::{RefineError, Result};

/// Stateless-per-match point set registration.
///
/// Reference and target clouds are supplied in a common frame, already
/// roughly aligned by the caller. [`match_clouds`](Matcher::match_clouds)
/// estimates the residual correction that maps the target onto the
/// reference; [`apply_result`](Matcher::apply_result) left-composes that
/// correction onto the caller's initial relative transform, yielding the
/// refined relative transform.
pub trait Matcher {
    /// Set the reference cloud.
    fn set_reference(&mut self, cloud: &PointCloud);

    /// Set the target cloud.
    fn set_target(&mut self, cloud: &PointCloud);

    /// Run registration. Returns true on success.
    fn match_clouds(&mut self) -> bool;

    /// Compose the estimated correction with an initial relative transform.
    ///
    /// If no match has been run (or the last match produced no estimate)
    /// the initial transform is returned unchanged.
    fn apply_result(&self, initial: &Transform) -> Transform;

    /// Dump the clouds of the last match for offline inspection.
    fn save_results(&self, dir: &Path, prefix: &str) -> Result<()>;

    /// Matcher name for logging.
    fn name(&self) -> &str;
}

/// Registration variant tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatcherKind {
    /// Raw point-to-point ICP.
    PointToPoint,
    /// Feature-based registration on edge/surface classes.
    Feature,
}

impl Default for MatcherKind {
    fn default() -> Self {
        MatcherKind::PointToPoint
    }
}

/// Matcher selection plus per-variant parameters.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Which registration variant to construct.
    pub kind: MatcherKind,

    /// ICP parameters (used by both variants).
    pub icp: IcpConfig,

    /// Feature extraction parameters (feature variant only).
    pub feature: FeatureExtractorConfig,
}

impl MatcherConfig {
    /// Validate parameter ranges. Violations are fatal configuration errors.
    pub fn validate(&self) -> Result<()> {
        if self.icp.max_correspondence_distance <= 0.0 {
            return Err(RefineError::Config(
                "max_correspondence_distance must be positive".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.icp.outlier_ratio) {
            return Err(RefineError::Config(
                "outlier_ratio must be in [0, 1)".into(),
            ));
        }
        if self.icp.min_correspondences < 3 {
            return Err(RefineError::Config(
                "min_correspondences must be at least 3".into(),
            ));
        }
        Ok(())
    }
}

/// Construct the configured matcher variant.
pub fn build_matcher(config: &MatcherConfig) -> Result<Box<dyn Matcher>> {
    config.validate()?;
    match config.kind {
        MatcherKind::PointToPoint => Ok(Box::new(PointToPointMatcher::new(config.icp.clone()))),
        MatcherKind::Feature => Ok(Box::new(FeatureMatcher::new(
            config.icp.clone(),
            config.feature.clone(),
        ))),
    }
}
