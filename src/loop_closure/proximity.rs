//! Euclidean-distance candidate search.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::core::SubmapStore;

use super::{Candidate, CandidateSearch};

/// Configuration for proximity-based candidate search.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ProximitySearchConfig {
    /// Maximum distance between submap origins for a candidate (meters).
    pub max_distance: f64,

    /// Maximum number of candidates returned per query, closest first.
    pub max_candidates: usize,
}

impl Default for ProximitySearchConfig {
    fn default() -> Self {
        Self {
            max_distance: 5.0,
            max_candidates: 3,
        }
    }
}

/// Candidate search gating on the distance between submap origins.
pub struct ProximitySearch {
    config: ProximitySearchConfig,
}

impl ProximitySearch {
    /// Create a new search with the given configuration.
    pub fn new(config: ProximitySearchConfig) -> Self {
        Self { config }
    }
}

#[derive(Serialize)]
struct CandidateDump {
    query_index: usize,
    candidates: Vec<(usize, f64)>,
}

impl CandidateSearch for ProximitySearch {
    fn find_candidates(
        &mut self,
        store: &SubmapStore,
        query_index: usize,
        exclude_last_n: usize,
        use_initial_poses: bool,
        output_dir: Option<&Path>,
    ) -> Vec<Candidate> {
        let Some(query) = store.get(query_index) else {
            return Vec::new();
        };
        let query_pose = if use_initial_poses {
            query.pose_init()
        } else {
            query.pose()
        };

        // the trailing window (query itself, its predecessor, anything after)
        // is never searched
        let searchable = store.len().saturating_sub(exclude_last_n);

        let mut scored: Vec<(usize, f64)> = (0..searchable)
            .filter_map(|i| {
                let submap = store.get(i)?;
                let pose = if use_initial_poses {
                    submap.pose_init()
                } else {
                    submap.pose()
                };
                let distance = (pose.translation() - query_pose.translation()).norm();
                (distance <= self.config.max_distance).then_some((i, distance))
            })
            .collect();

        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(self.config.max_candidates);

        if let Some(dir) = output_dir {
            let dump = CandidateDump {
                query_index,
                candidates: scored.clone(),
            };
            let path = dir.join(format!("candidates_{query_index}.json"));
            match File::create(&path) {
                Ok(file) => {
                    if let Err(e) = serde_json::to_writer_pretty(BufWriter::new(file), &dump) {
                        warn!("failed to write candidate dump {}: {e}", path.display());
                    }
                }
                Err(e) => warn!("failed to create candidate dump {}: {e}", path.display()),
            }
        }

        debug!(
            "proximity search: query {} -> {} candidate(s)",
            query_index,
            scored.len()
        );

        scored
            .into_iter()
            .map(|(index, _)| {
                let candidate_pose = if use_initial_poses {
                    store.get(index).map(|s| s.pose_init())
                } else {
                    store.get(index).map(|s| s.pose())
                }
                .unwrap_or_default();
                Candidate {
                    index,
                    coarse: candidate_pose.between(&query_pose),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Submap, Transform};

    fn line_store(n: usize, spacing: f64) -> SubmapStore {
        let mut store = SubmapStore::new();
        for i in 0..n {
            store.push(Submap::new(
                i as u64,
                Transform::from_translation(i as f64 * spacing, 0.0, 0.0),
            ));
        }
        store
    }

    #[test]
    fn test_exclusion_window_respected() {
        let store = line_store(6, 0.5);
        let mut search = ProximitySearch::new(ProximitySearchConfig {
            max_distance: 100.0,
            max_candidates: 10,
        });

        for query in 1..store.len() - 1 {
            let exclude = store.len() - query + 1;
            let candidates = search.find_candidates(&store, query, exclude, false, None);
            for c in &candidates {
                assert!(
                    c.index + 1 < query,
                    "candidate {} not excluded for query {}",
                    c.index,
                    query
                );
            }
        }
    }

    #[test]
    fn test_distance_gate() {
        let store = line_store(6, 10.0);
        let mut search = ProximitySearch::new(ProximitySearchConfig {
            max_distance: 5.0,
            max_candidates: 10,
        });
        // every earlier submap is at least 20m away from query 4
        let candidates = search.find_candidates(&store, 4, 3, false, None);
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_coarse_transform_relates_candidate_to_query() {
        let store = line_store(5, 1.0);
        let mut search = ProximitySearch::new(ProximitySearchConfig {
            max_distance: 100.0,
            max_candidates: 1,
        });
        let candidates = search.find_candidates(&store, 3, 3, false, None);
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        // pose(candidate) * coarse == pose(query)
        let recomposed = store.get(c.index).unwrap().pose().compose(&c.coarse);
        let query_pose = store.get(3).unwrap().pose();
        assert!((recomposed.between(&query_pose)).translation().norm() < 1e-12);
    }
}
