//! Pose-graph optimization: enforce global consistency across all submaps
//! by combining sequential relative-pose constraints with opportunistically
//! discovered loop closures, re-solving after each accepted batch.

use std::path::Path;

use log::{debug, error, info};

use crate::core::SubmapStore;
use crate::error::{RefineError, Result};
use crate::graph::{CovarianceDiagonal, GraphEngine, Transaction};
use crate::io::prepare_stage_dir;
use crate::loop_closure::{CandidateSearch, LoopRefinement};

/// Resolved parameters for one pose-graph optimization run.
#[derive(Clone, Debug)]
pub struct PoseGraphStageConfig {
    /// Number of leading submaps never used as loop-closure queries.
    pub skip_first_n_submaps: usize,

    /// Covariance for sequential edges between consecutive submaps.
    pub local_mapper_covariance: CovarianceDiagonal,

    /// Covariance for loop-closure edges (typically tighter).
    pub loop_closure_covariance: CovarianceDiagonal,

    /// Covariance of the absolute prior fixing the first submap.
    pub pose_prior_covariance: CovarianceDiagonal,
}

/// The pose-graph optimization stage.
///
/// Holds a graph engine fresh for this run plus the injected loop-closure
/// services. Sequential edges are weighted with the local-mapper covariance,
/// loop closures with the loop-closure covariance; neither is re-estimated
/// from registration quality.
pub struct PoseGraphOptimizer<'a> {
    engine: Box<dyn GraphEngine>,
    candidate_search: &'a mut dyn CandidateSearch,
    loop_refinement: &'a mut dyn LoopRefinement,
    config: PoseGraphStageConfig,
}

impl<'a> PoseGraphOptimizer<'a> {
    /// Create the stage with injected engine and services.
    pub fn new(
        engine: Box<dyn GraphEngine>,
        candidate_search: &'a mut dyn CandidateSearch,
        loop_refinement: &'a mut dyn LoopRefinement,
        config: PoseGraphStageConfig,
    ) -> Self {
        Self {
            engine,
            candidate_search,
            loop_refinement,
            config,
        }
    }

    /// The underlying graph engine.
    pub fn engine(&self) -> &dyn GraphEngine {
        self.engine.as_ref()
    }

    /// Run bootstrap and the loop-closure sweep over the whole store.
    pub fn run(&mut self, store: &mut SubmapStore, output: Option<&Path>) -> Result<()> {
        let num_submaps = store.len();
        if num_submaps <= self.config.skip_first_n_submaps {
            error!(
                "store size {} not large enough to run pose-graph optimization, \
                 must exceed {} submaps",
                num_submaps, self.config.skip_first_n_submaps
            );
            return Err(RefineError::InsufficientSubmaps {
                have: num_submaps,
                min_required: self.config.skip_first_n_submaps,
            });
        }

        let refinement_dir = prepare_stage_dir(output, "refinement")?;
        let candidate_dir = prepare_stage_dir(output, "candidate_search")?;

        self.bootstrap(store);

        info!(
            "running loop-closure sweep over query indices {}..{}",
            self.config.skip_first_n_submaps,
            num_submaps.saturating_sub(1)
        );

        // the last submap is never a query (it can still be the target of a
        // closure from an earlier query)
        for query_index in self.config.skip_first_n_submaps..num_submaps.saturating_sub(1) {
            // ignore all submaps from (query - 1) backward through the end
            let exclude_last_n = num_submaps - query_index + 1;
            let candidates = self.candidate_search.find_candidates(
                store,
                query_index,
                exclude_last_n,
                false,
                candidate_dir.as_deref(),
            );

            if candidates.is_empty() {
                continue;
            }
            info!(
                "found {} loop closure candidate(s) for query index {}: {:?}",
                candidates.len(),
                query_index,
                candidates.iter().map(|c| c.index).collect::<Vec<_>>()
            );

            let mut transaction = Transaction::new();
            let mut accepted = 0usize;
            for candidate in &candidates {
                if candidate.index + 1 >= query_index {
                    error!(
                        "candidate search returned index {} inside the exclusion window \
                         of query {}, skipping",
                        candidate.index, query_index
                    );
                    continue;
                }

                let (Some(matched), Some(query)) =
                    (store.get(candidate.index), store.get(query_index))
                else {
                    continue;
                };

                let outcome = self.loop_refinement.refine(
                    matched,
                    query,
                    &candidate.coarse,
                    refinement_dir.as_deref(),
                );
                if !outcome.successful {
                    debug!(
                        "loop refinement rejected candidate {} for query {}",
                        candidate.index, query_index
                    );
                    continue;
                }

                // re-declaring an existing variable is a no-op in the engine
                transaction.add_variable(matched.stamp_us(), matched.pose());
                transaction.add_variable(query.stamp_us(), query.pose());
                transaction.add_edge(
                    matched.stamp_us(),
                    query.stamp_us(),
                    outcome.relative,
                    self.config.loop_closure_covariance,
                );
                accepted += 1;
            }

            self.engine.update(transaction);
            self.engine.optimize();
            self.propagate(store);
            debug!("query {query_index}: {accepted} closure(s) accepted");
        }

        Ok(())
    }

    /// Bootstrap: gauge prior on the first submap, one variable per submap,
    /// one sequential edge per consecutive pair, committed as a single
    /// transaction and solved once.
    fn bootstrap(&mut self, store: &SubmapStore) {
        let mut transaction = Transaction::new();

        if let Some(first) = store.get(0) {
            transaction.add_variable(first.stamp_us(), first.pose());
            transaction.add_prior(
                first.stamp_us(),
                first.pose(),
                self.config.pose_prior_covariance,
            );
        }

        for i in 1..store.len() {
            if let (Some(previous), Some(current)) = (store.get(i - 1), store.get(i)) {
                transaction.add_variable(current.stamp_us(), current.pose());
                transaction.add_edge(
                    previous.stamp_us(),
                    current.stamp_us(),
                    previous.pose().between(&current.pose()),
                    self.config.local_mapper_covariance,
                );
            }
        }

        self.engine.update(transaction);
        self.engine.optimize();
        info!(
            "pose graph bootstrapped with {} variables",
            self.engine.variable_count()
        );
    }

    /// Write the solved poses back onto every submap in the store.
    fn propagate(&self, store: &mut SubmapStore) {
        for submap in store.submaps_mut() {
            if let Some(pose) = self.engine.pose(submap.stamp_us()) {
                submap.update_pose(pose);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Submap, SubmapStore, Transform};
    use crate::graph::{uniform_covariance, RelaxationGraph};
    use crate::loop_closure::{Candidate, RefinementOutcome};

    /// Candidate search stub returning a scripted candidate list per query.
    struct ScriptedSearch {
        candidates: Vec<Candidate>,
        queries_seen: Vec<usize>,
    }

    impl CandidateSearch for ScriptedSearch {
        fn find_candidates(
            &mut self,
            _store: &SubmapStore,
            query_index: usize,
            _exclude_last_n: usize,
            _use_initial_poses: bool,
            _output_dir: Option<&Path>,
        ) -> Vec<Candidate> {
            self.queries_seen.push(query_index);
            self.candidates.clone()
        }
    }

    /// Refinement stub accepting everything with the coarse transform.
    struct AcceptAll {
        calls: usize,
    }

    impl LoopRefinement for AcceptAll {
        fn refine(
            &mut self,
            _candidate: &Submap,
            _query: &Submap,
            coarse: &Transform,
            _output_dir: Option<&Path>,
        ) -> RefinementOutcome {
            self.calls += 1;
            RefinementOutcome {
                successful: true,
                relative: *coarse,
            }
        }
    }

    fn line_store(n: usize) -> SubmapStore {
        let mut store = SubmapStore::new();
        for i in 0..n {
            store.push(Submap::new(
                i as u64,
                Transform::from_translation(i as f64, 0.0, 0.0),
            ));
        }
        store
    }

    fn stage_config(skip: usize) -> PoseGraphStageConfig {
        PoseGraphStageConfig {
            skip_first_n_submaps: skip,
            local_mapper_covariance: uniform_covariance(1e-3),
            loop_closure_covariance: uniform_covariance(1e-5),
            pose_prior_covariance: uniform_covariance(1e-9),
        }
    }

    #[test]
    fn test_insufficient_submaps_is_an_error() {
        let mut store = line_store(2);
        let mut search = ScriptedSearch {
            candidates: vec![],
            queries_seen: vec![],
        };
        let mut refine = AcceptAll { calls: 0 };
        let mut stage = PoseGraphOptimizer::new(
            Box::new(RelaxationGraph::with_defaults()),
            &mut search,
            &mut refine,
            stage_config(2),
        );
        let err = stage.run(&mut store, None).unwrap_err();
        assert!(matches!(err, RefineError::InsufficientSubmaps { have: 2, .. }));
    }

    #[test]
    fn test_gauge_prior_holds_first_submap() {
        let mut store = line_store(4);
        let first_before = store.get(0).map(|s| s.pose());
        let mut search = ScriptedSearch {
            candidates: vec![],
            queries_seen: vec![],
        };
        let mut refine = AcceptAll { calls: 0 };
        let mut stage = PoseGraphOptimizer::new(
            Box::new(RelaxationGraph::with_defaults()),
            &mut search,
            &mut refine,
            stage_config(1),
        );
        stage.run(&mut store, None).unwrap();

        let solved = stage.engine().pose(0).unwrap();
        let delta = solved.between(&first_before.unwrap());
        // only a prior, not a hard constraint; stays within the prior's bound
        assert!(delta.translation().norm() < 1e-4);
    }

    #[test]
    fn test_sweep_never_queries_last_submap() {
        let mut store = line_store(5);
        let mut search = ScriptedSearch {
            candidates: vec![],
            queries_seen: vec![],
        };
        let mut refine = AcceptAll { calls: 0 };
        let mut stage = PoseGraphOptimizer::new(
            Box::new(RelaxationGraph::with_defaults()),
            &mut search,
            &mut refine,
            stage_config(1),
        );
        stage.run(&mut store, None).unwrap();

        assert_eq!(search.queries_seen, vec![1, 2, 3]);
    }

    #[test]
    fn test_invalid_candidate_skipped_without_refinement() {
        let mut store = line_store(5);
        // candidate index 3 is inside the exclusion window of every query
        let mut search = ScriptedSearch {
            candidates: vec![Candidate {
                index: 3,
                coarse: Transform::identity(),
            }],
            queries_seen: vec![],
        };
        let mut refine = AcceptAll { calls: 0 };
        let mut stage = PoseGraphOptimizer::new(
            Box::new(RelaxationGraph::with_defaults()),
            &mut search,
            &mut refine,
            stage_config(1),
        );
        stage.run(&mut store, None).unwrap();

        assert_eq!(refine.calls, 0, "invalid candidates must never be refined");
    }

    #[test]
    fn test_variables_declared_once_across_closures() {
        let mut store = line_store(5);
        // index 0 is a valid candidate for queries 2 and 3; its variable is
        // re-declared by each accepted closure
        let mut search = ScriptedSearch {
            candidates: vec![Candidate {
                index: 0,
                coarse: Transform::from_translation(2.0, 0.0, 0.0),
            }],
            queries_seen: vec![],
        };
        let mut refine = AcceptAll { calls: 0 };
        let mut stage = PoseGraphOptimizer::new(
            Box::new(RelaxationGraph::with_defaults()),
            &mut search,
            &mut refine,
            stage_config(1),
        );
        stage.run(&mut store, None).unwrap();

        assert_eq!(stage.engine().variable_count(), 5);
        drop(stage);
        assert!(refine.calls > 0);
    }
}
