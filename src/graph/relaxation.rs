//! Weighted pose relaxation over SE(3).
//!
//! Incremental estimator solving for a maximum-likelihood-style assignment
//! of all pose variables by coordinate descent: each sweep revisits every
//! variable and moves it toward the weighted blend of the poses its incident
//! constraints predict for it. Cheap, dependency-free, and well behaved on
//! the chain-plus-loop-closure graphs this pipeline builds.

use std::collections::HashMap;

use log::debug;
use nalgebra::{Quaternion, UnitQuaternion, Vector3, Vector4};
use serde::{Deserialize, Serialize};

use crate::core::Transform;

use super::transaction::{CovarianceDiagonal, PosePrior, RelativePoseEdge, Transaction};
use super::GraphEngine;

/// Configuration for the relaxation solver.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelaxationConfig {
    /// Maximum relaxation sweeps per `optimize()` call.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Convergence threshold on the largest per-sweep pose update
    /// (meters of translation plus radians of rotation).
    #[serde(default = "default_convergence_threshold")]
    pub convergence_threshold: f64,

    /// Step damping factor. Updates are scaled by `1 / (1 + damping)`.
    #[serde(default = "default_damping")]
    pub damping: f64,
}

fn default_max_iterations() -> usize {
    200
}

fn default_convergence_threshold() -> f64 {
    1e-7
}

fn default_damping() -> f64 {
    0.0
}

impl Default for RelaxationConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            convergence_threshold: default_convergence_threshold(),
            damping: default_damping(),
        }
    }
}

/// One pose variable.
#[derive(Clone, Debug)]
struct Node {
    key: u64,
    pose: Transform,
}

/// Per-constraint scalar weights, translation and rotation blocks separate.
#[derive(Clone, Copy, Debug)]
struct Weights {
    translation: f64,
    rotation: f64,
}

fn weights_from_covariance(cov: &CovarianceDiagonal) -> Weights {
    let t = (cov[0] + cov[1] + cov[2]) / 3.0;
    let r = (cov[3] + cov[4] + cov[5]) / 3.0;
    Weights {
        translation: 1.0 / t.max(f64::MIN_POSITIVE),
        rotation: 1.0 / r.max(f64::MIN_POSITIVE),
    }
}

/// Weighted blend accumulator for the poses predicted for one variable.
#[derive(Default)]
struct PoseBlend {
    translation_sum: Vector3<f64>,
    translation_weight: f64,
    quaternion_sum: Vector4<f64>,
    rotation_weight: f64,
}

impl PoseBlend {
    /// Accumulate one predicted pose. Quaternion signs are aligned against
    /// `reference` so antipodal representations do not cancel.
    fn add(&mut self, predicted: &Transform, weights: Weights, reference: &UnitQuaternion<f64>) {
        self.translation_sum += weights.translation * predicted.translation();
        self.translation_weight += weights.translation;

        let mut q = predicted.rotation().coords;
        if q.dot(&reference.coords) < 0.0 {
            q = -q;
        }
        self.quaternion_sum += weights.rotation * q;
        self.rotation_weight += weights.rotation;
    }

    fn is_empty(&self) -> bool {
        self.translation_weight == 0.0 && self.rotation_weight == 0.0
    }

    fn resolve(&self, current: &Transform) -> Transform {
        let translation = if self.translation_weight > 0.0 {
            self.translation_sum / self.translation_weight
        } else {
            current.translation()
        };
        let rotation = if self.rotation_weight > 0.0 {
            UnitQuaternion::from_quaternion(Quaternion::from_vector(self.quaternion_sum))
        } else {
            current.rotation()
        };
        Transform::from_parts(translation, rotation)
    }
}

/// Default incremental graph engine: weighted pose relaxation.
pub struct RelaxationGraph {
    config: RelaxationConfig,
    nodes: Vec<Node>,
    index: HashMap<u64, usize>,
    priors: Vec<PosePrior>,
    edges: Vec<RelativePoseEdge>,
}

impl RelaxationGraph {
    /// Create an empty graph.
    pub fn new(config: RelaxationConfig) -> Self {
        Self {
            config,
            nodes: Vec::new(),
            index: HashMap::new(),
            priors: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(RelaxationConfig::default())
    }

    /// Number of constraints (priors plus edges).
    pub fn constraint_count(&self) -> usize {
        self.priors.len() + self.edges.len()
    }

    fn node_pose(&self, key: u64) -> Option<Transform> {
        self.index.get(&key).map(|&i| self.nodes[i].pose)
    }

    /// One relaxation sweep. Returns the largest pose update applied.
    fn sweep(&mut self) -> f64 {
        let step = 1.0 / (1.0 + self.config.damping);
        let mut max_update = 0.0f64;

        for i in 0..self.nodes.len() {
            let key = self.nodes[i].key;
            let current = self.nodes[i].pose;
            let reference = current.rotation();
            let mut blend = PoseBlend::default();

            for prior in &self.priors {
                if prior.key == key {
                    blend.add(&prior.pose, weights_from_covariance(&prior.covariance), &reference);
                }
            }

            for edge in &self.edges {
                if edge.to == key {
                    if let Some(from_pose) = self.node_pose(edge.from) {
                        let predicted = from_pose.compose(&edge.relative);
                        blend.add(&predicted, weights_from_covariance(&edge.covariance), &reference);
                    }
                }
                if edge.from == key {
                    if let Some(to_pose) = self.node_pose(edge.to) {
                        let predicted = to_pose.compose(&edge.relative.inverse());
                        blend.add(&predicted, weights_from_covariance(&edge.covariance), &reference);
                    }
                }
            }

            if blend.is_empty() {
                continue;
            }

            let target = blend.resolve(&current);
            let new_translation =
                current.translation() + step * (target.translation() - current.translation());
            let new_rotation = current.rotation().slerp(&target.rotation(), step);
            let updated = Transform::from_parts(new_translation, new_rotation);

            let update = (target.translation() - current.translation()).norm()
                + current.rotation().angle_to(&target.rotation());
            if update > max_update {
                max_update = update;
            }

            self.nodes[i].pose = updated;
        }

        max_update
    }
}

impl GraphEngine for RelaxationGraph {
    fn update(&mut self, transaction: Transaction) {
        for (key, pose) in transaction.variables() {
            // re-declaring an existing variable is a no-op
            if !self.index.contains_key(key) {
                self.index.insert(*key, self.nodes.len());
                self.nodes.push(Node {
                    key: *key,
                    pose: *pose,
                });
            }
        }
        self.priors.extend_from_slice(transaction.priors());
        self.edges.extend_from_slice(transaction.edges());
    }

    fn optimize(&mut self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }

        let mut iterations = 0;
        for i in 0..self.config.max_iterations {
            iterations = i + 1;
            let max_update = self.sweep();
            if max_update < self.config.convergence_threshold {
                break;
            }
        }
        debug!(
            "relaxation finished after {} sweeps ({} nodes, {} constraints)",
            iterations,
            self.nodes.len(),
            self.constraint_count()
        );
        iterations
    }

    fn pose(&self, key: u64) -> Option<Transform> {
        self.node_pose(key)
    }

    fn variable_count(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::uniform_covariance;
    use approx::assert_relative_eq;

    fn tx() -> Transaction {
        Transaction::new()
    }

    #[test]
    fn test_idempotent_variable_declaration() {
        let mut graph = RelaxationGraph::with_defaults();
        let mut t = tx();
        t.add_variable(0, Transform::identity());
        t.add_variable(0, Transform::from_translation(9.0, 0.0, 0.0));
        graph.update(t);

        let mut t2 = tx();
        t2.add_variable(0, Transform::from_translation(3.0, 0.0, 0.0));
        graph.update(t2);

        assert_eq!(graph.variable_count(), 1);
        // the first declared value wins
        assert_relative_eq!(graph.pose(0).unwrap().translation().norm(), 0.0);
    }

    #[test]
    fn test_prior_holds_anchor() {
        let mut graph = RelaxationGraph::with_defaults();
        let anchor = Transform::from_translation(1.0, 2.0, 3.0);
        let mut t = tx();
        t.add_variable(0, anchor);
        t.add_prior(0, anchor, uniform_covariance(1e-9));
        graph.update(t);
        graph.optimize();

        let solved = graph.pose(0).unwrap();
        assert_relative_eq!(
            solved.between(&anchor).translation().norm(),
            0.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_loop_closure_corrects_drift() {
        // chain 0 -> 1 -> 2 with 1m steps; node 2 starts 0.1m off.
        // a loop closure from 2 back to 0 pulls it toward the truth.
        let mut graph = RelaxationGraph::with_defaults();

        let mut t = tx();
        t.add_variable(0, Transform::identity());
        t.add_variable(1, Transform::from_translation(1.0, 0.0, 0.0));
        t.add_variable(2, Transform::from_translation(2.1, 0.0, 0.0));
        t.add_prior(0, Transform::identity(), uniform_covariance(1e-9));
        let step = Transform::from_translation(1.0, 0.0, 0.0);
        t.add_edge(0, 1, step, uniform_covariance(1e-3));
        t.add_edge(1, 2, step, uniform_covariance(1e-3));
        graph.update(t);
        graph.optimize();

        let mut t2 = tx();
        t2.add_edge(
            2,
            0,
            Transform::from_translation(-2.0, 0.0, 0.0),
            uniform_covariance(1e-5),
        );
        graph.update(t2);
        graph.optimize();

        let node2 = graph.pose(2).unwrap();
        assert!(
            (node2.translation().x - 2.0).abs() < 0.02,
            "expected node 2 near x=2.0, got {}",
            node2.translation().x
        );
    }

    #[test]
    fn test_unconstrained_node_stays_put() {
        let mut graph = RelaxationGraph::with_defaults();
        let start = Transform::from_translation(4.0, 0.0, 0.0);
        let mut t = tx();
        t.add_variable(7, start);
        graph.update(t);
        graph.optimize();
        assert_relative_eq!(
            graph.pose(7).unwrap().between(&start).translation().norm(),
            0.0
        );
    }
}
