//! The global map refinement pipeline.
//!
//! Orchestrates the three refinement stages over one submap store. Stages
//! are independent: each can be invoked on its own, but the intended order
//! is refinement, then alignment, then pose-graph optimization, each run to
//! completion before the next starts.

use std::fs;
use std::path::Path;

use log::{error, info};

use crate::alignment::SubmapAligner;
use crate::config::RefinementConfig;
use crate::core::SubmapStore;
use crate::error::{RefineError, Result};
use crate::graph::{uniform_covariance, GraphEngineFactory, RelaxationGraph};
use crate::io::{save_store, save_trajectory};
use crate::loop_closure::{CandidateSearch, LoopRefinement, MatcherRefinement, ProximitySearch};
use crate::matching::build_matcher;
use crate::pose_graph::{PoseGraphOptimizer, PoseGraphStageConfig};
use crate::refinement::SubmapRefiner;
use crate::summary::RefinementSummary;

/// Global map refinement: owns the store, the summary, and the injected
/// loop-closure services for the duration of a run.
pub struct GlobalMapRefinement {
    config: RefinementConfig,
    store: SubmapStore,
    summary: RefinementSummary,
    candidate_search: Box<dyn CandidateSearch>,
    loop_refinement: Box<dyn LoopRefinement>,
}

impl GlobalMapRefinement {
    /// Set up the pipeline. Configuration errors are fatal here; no stage
    /// ever starts on an invalid configuration.
    pub fn new(store: SubmapStore, config: RefinementConfig) -> Result<Self> {
        config.validate()?;

        let candidate_search: Box<dyn CandidateSearch> = Box::new(ProximitySearch::new(
            config.loop_closure.candidate_search.clone(),
        ));
        let loop_matcher = build_matcher(&config.loop_closure.matcher)?;
        let loop_refinement: Box<dyn LoopRefinement> =
            Box::new(MatcherRefinement::new(loop_matcher));

        info!("global map refinement set up over {} submaps", store.len());
        Ok(Self {
            config,
            store,
            summary: RefinementSummary::new(),
            candidate_search,
            loop_refinement,
        })
    }

    /// Replace the candidate search service.
    pub fn with_candidate_search(mut self, service: Box<dyn CandidateSearch>) -> Self {
        self.candidate_search = service;
        self
    }

    /// Replace the loop refinement service.
    pub fn with_loop_refinement(mut self, service: Box<dyn LoopRefinement>) -> Self {
        self.loop_refinement = service;
        self
    }

    /// The submap store.
    pub fn store(&self) -> &SubmapStore {
        &self.store
    }

    /// Consume the pipeline, returning the refined store.
    pub fn into_store(self) -> SubmapStore {
        self.store
    }

    /// The accumulated summary.
    pub fn summary(&self) -> &RefinementSummary {
        &self.summary
    }

    /// Run submap refinement over every submap in store order.
    pub fn run_submap_refinement(&mut self, output: Option<&Path>) -> Result<()> {
        let matcher = build_matcher(&self.config.submap_refinement.matcher)?;
        let graph_config = self.config.submap_refinement.graph.clone();
        let factory: GraphEngineFactory =
            Box::new(move || Box::new(RelaxationGraph::new(graph_config.clone())));
        let mut refiner = SubmapRefiner::new(matcher, factory, &self.config.submap_refinement);
        refiner.run(&mut self.store, &mut self.summary, output)
    }

    /// Run submap alignment over every consecutive pair.
    pub fn run_submap_alignment(&mut self, output: Option<&Path>) -> Result<()> {
        let matcher = build_matcher(&self.config.submap_alignment.matcher)?;
        let mut aligner = SubmapAligner::new(matcher);
        aligner.run(&mut self.store, &mut self.summary, output)
    }

    /// Run pose-graph optimization with the embedded loop-closure sweep.
    pub fn run_pose_graph_optimization(&mut self, output: Option<&Path>) -> Result<()> {
        let engine = Box::new(RelaxationGraph::new(self.config.pose_graph.graph.clone()));
        let stage_config = PoseGraphStageConfig {
            skip_first_n_submaps: self.config.pose_graph.skip_first_n_submaps,
            local_mapper_covariance: uniform_covariance(
                self.config.loop_closure.local_mapper_covariance,
            ),
            loop_closure_covariance: uniform_covariance(
                self.config.loop_closure.loop_closure_covariance,
            ),
            pose_prior_covariance: uniform_covariance(self.config.pose_graph.pose_prior_covariance),
        };
        let mut stage = PoseGraphOptimizer::new(
            engine,
            self.candidate_search.as_mut(),
            self.loop_refinement.as_mut(),
            stage_config,
        );
        stage.run(&mut self.store, output)
    }

    /// Save the summary and the refined trajectory into an existing
    /// directory.
    pub fn save_results(&self, output: &Path, save_initial: bool) -> Result<()> {
        if !output.exists() {
            error!(
                "output directory does not exist, not saving refinement results: {}",
                output.display()
            );
            return Err(RefineError::OutputDir(output.to_path_buf()));
        }
        self.summary.save(output)?;
        save_trajectory(&self.store, &output.join("trajectory.json"), save_initial)?;
        Ok(())
    }

    /// Save the full refined store under `<output>/map_data_refined/`.
    pub fn save_map_data(&self, output: &Path) -> Result<()> {
        if !output.exists() {
            error!(
                "output directory does not exist, not saving refined map data: {}",
                output.display()
            );
            return Err(RefineError::OutputDir(output.to_path_buf()));
        }
        let dir = output.join("map_data_refined");
        fs::create_dir_all(&dir)?;
        save_store(&self.store, &dir.join("map.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Submap, Transform};

    fn small_store() -> SubmapStore {
        let mut store = SubmapStore::new();
        for i in 0..3u64 {
            store.push(Submap::new(
                i,
                Transform::from_translation(i as f64, 0.0, 0.0),
            ));
        }
        store
    }

    #[test]
    fn test_invalid_config_never_starts() {
        let mut config = RefinementConfig::default();
        config.submap_refinement.scan_registration_covariance = -1.0;
        assert!(GlobalMapRefinement::new(small_store(), config).is_err());
    }

    #[test]
    fn test_save_results_requires_existing_dir() {
        let pipeline =
            GlobalMapRefinement::new(small_store(), RefinementConfig::default()).unwrap();
        let err = pipeline
            .save_results(Path::new("/nonexistent/results"), false)
            .unwrap_err();
        assert!(matches!(err, RefineError::OutputDir(_)));
    }

    #[test]
    fn test_save_results_writes_artifacts() {
        let pipeline =
            GlobalMapRefinement::new(small_store(), RefinementConfig::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        pipeline.save_results(dir.path(), true).unwrap();
        assert!(dir.path().join("summary.json").is_file());
        assert!(dir.path().join("trajectory.json").is_file());

        pipeline.save_map_data(dir.path()).unwrap();
        assert!(dir.path().join("map_data_refined/map.json").is_file());
    }
}
