//! Unified configuration for the refinement pipeline.
//!
//! The JSON layout mirrors the pipeline structure: one section per stage
//! plus a `loop_closure` section shared by the pose-graph stage. The three
//! stage sections are required; inner fields fall back to defaults.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RefineError, Result};
use crate::graph::RelaxationConfig;
use crate::loop_closure::ProximitySearchConfig;
use crate::matching::MatcherConfig;

/// Loop closure parameters: candidate search, refinement matcher, and the
/// two fixed edge covariances.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoopClosureConfig {
    /// Candidate search parameters.
    #[serde(default)]
    pub candidate_search: ProximitySearchConfig,

    /// Matcher used by the refinement service.
    #[serde(default)]
    pub matcher: MatcherConfig,

    /// Diagonal of the sequential-edge covariance.
    pub local_mapper_covariance: f64,

    /// Diagonal of the loop-closure-edge covariance (typically tighter).
    pub loop_closure_covariance: f64,
}

impl Default for LoopClosureConfig {
    fn default() -> Self {
        Self {
            candidate_search: ProximitySearchConfig::default(),
            matcher: MatcherConfig::default(),
            local_mapper_covariance: 1e-3,
            loop_closure_covariance: 1e-5,
        }
    }
}

/// Submap refinement stage parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmapRefinementConfig {
    /// Matcher used for scan-to-map registration.
    #[serde(default)]
    pub matcher: MatcherConfig,

    /// Diagonal of the scan registration edge covariance.
    pub scan_registration_covariance: f64,

    /// Diagonal of the anchor keyframe prior covariance.
    #[serde(default = "default_pose_prior_covariance")]
    pub pose_prior_covariance: f64,

    /// Local graph solver parameters.
    #[serde(default)]
    pub graph: RelaxationConfig,
}

impl Default for SubmapRefinementConfig {
    fn default() -> Self {
        Self {
            matcher: MatcherConfig::default(),
            scan_registration_covariance: 1e-4,
            pose_prior_covariance: default_pose_prior_covariance(),
            graph: RelaxationConfig::default(),
        }
    }
}

/// Submap alignment stage parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmapAlignmentConfig {
    /// Matcher used for the pairwise full-resolution registration.
    pub matcher: MatcherConfig,
}

impl Default for SubmapAlignmentConfig {
    fn default() -> Self {
        Self {
            matcher: MatcherConfig::default(),
        }
    }
}

fn default_pose_prior_covariance() -> f64 {
    1e-9
}

fn default_skip_first_n_submaps() -> usize {
    2
}

/// Pose-graph optimization stage parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseGraphConfig {
    /// Number of leading submaps never used as loop-closure queries.
    pub skip_first_n_submaps: usize,

    /// Diagonal of the gauge prior covariance on the first submap.
    pub pose_prior_covariance: f64,

    /// Global graph solver parameters.
    pub graph: RelaxationConfig,
}

impl Default for PoseGraphConfig {
    fn default() -> Self {
        Self {
            skip_first_n_submaps: default_skip_first_n_submaps(),
            pose_prior_covariance: default_pose_prior_covariance(),
            graph: RelaxationConfig::default(),
        }
    }
}

/// Top-level pipeline configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefinementConfig {
    /// Loop closure section (required).
    pub loop_closure: LoopClosureConfig,

    /// Submap refinement section (required).
    pub submap_refinement: SubmapRefinementConfig,

    /// Submap alignment section (required).
    pub submap_alignment: SubmapAlignmentConfig,

    /// Pose-graph optimization section.
    #[serde(default)]
    pub pose_graph: PoseGraphConfig,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            loop_closure: LoopClosureConfig::default(),
            submap_refinement: SubmapRefinementConfig::default(),
            submap_alignment: SubmapAlignmentConfig::default(),
            pose_graph: PoseGraphConfig::default(),
        }
    }
}

impl RefinementConfig {
    /// Load and validate a configuration from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            RefineError::Config(format!("unable to read config {}: {e}", path.display()))
        })?;
        let config: RefinementConfig = serde_json::from_str(&text)
            .map_err(|e| RefineError::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate parameter ranges. Any violation is a fatal setup error.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            (
                "local_mapper_covariance",
                self.loop_closure.local_mapper_covariance,
            ),
            (
                "loop_closure_covariance",
                self.loop_closure.loop_closure_covariance,
            ),
            (
                "scan_registration_covariance",
                self.submap_refinement.scan_registration_covariance,
            ),
            (
                "pose_prior_covariance",
                self.pose_graph.pose_prior_covariance,
            ),
        ] {
            if value <= 0.0 {
                return Err(RefineError::Config(format!("{name} must be positive")));
            }
        }

        self.loop_closure.matcher.validate()?;
        self.submap_refinement.matcher.validate()?;
        self.submap_alignment.matcher.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "loop_closure": {
            "local_mapper_covariance": 1e-3,
            "loop_closure_covariance": 1e-5
        },
        "submap_refinement": { "scan_registration_covariance": 1e-4 },
        "submap_alignment": { "matcher": { "kind": "point_to_point" } }
    }"#;

    #[test]
    fn test_minimal_config_parses() {
        let config: RefinementConfig = serde_json::from_str(MINIMAL).unwrap();
        config.validate().unwrap();
        assert_eq!(config.pose_graph.skip_first_n_submaps, 2);
    }

    #[test]
    fn test_missing_section_is_rejected() {
        let r: std::result::Result<RefinementConfig, _> =
            serde_json::from_str(r#"{ "loop_closure": { "local_mapper_covariance": 1e-3, "loop_closure_covariance": 1e-5 } }"#);
        assert!(r.is_err());
    }

    #[test]
    fn test_non_positive_covariance_is_fatal() {
        let mut config = RefinementConfig::default();
        config.loop_closure.loop_closure_covariance = 0.0;
        assert!(matches!(
            config.validate(),
            Err(RefineError::Config(_))
        ));
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, MINIMAL).unwrap();
        let config = RefinementConfig::from_json_file(&path).unwrap();
        assert!(config.loop_closure.loop_closure_covariance < config.loop_closure.local_mapper_covariance);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = RefinementConfig::from_json_file(Path::new("/nonexistent/config.json"))
            .unwrap_err();
        assert!(matches!(err, RefineError::Config(_)));
    }
}
