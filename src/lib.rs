//! # VishvaMap
//!
//! Global map refinement for submap-based 3D SLAM.
//!
//! Builds a globally consistent map and trajectory from a sequence of
//! locally-accurate submaps, each a bundle of time-ordered keyframes (point
//! sets plus an anchoring pose) produced by a front-end mapper. Raw submaps
//! drift relative to one another; this crate corrects that drift through
//! three compounding stages:
//!
//! 1. **Submap refinement** - per-submap correction of keyframe poses
//!    against a local registration map
//! 2. **Submap alignment** - sequential pairwise correction of
//!    submap-to-submap poses with full-resolution registration
//! 3. **Pose-graph optimization** - a pose graph over all submaps mixing
//!    sequential constraints with opportunistically detected loop closures,
//!    re-solved after each accepted closure
//!
//! Already-optimized local structure is never re-derived: stages only
//! rewrite poses.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use vishva_map::{GlobalMapRefinement, RefinementConfig};
//!
//! let store = vishva_map::io::load_store(Path::new("map.json"))?;
//! let mut pipeline = GlobalMapRefinement::new(store, RefinementConfig::default())?;
//!
//! pipeline.run_submap_refinement(None)?;
//! pipeline.run_submap_alignment(None)?;
//! pipeline.run_pose_graph_optimization(None)?;
//!
//! pipeline.save_results(Path::new("results/"), true)?;
//! ```
//!
//! ## External collaborators
//!
//! Registration ([`matching::Matcher`]), the incremental graph engine
//! ([`graph::GraphEngine`]), loop-closure candidate search
//! ([`loop_closure::CandidateSearch`]) and loop-closure refinement
//! ([`loop_closure::LoopRefinement`]) are consumed through traits. Default
//! implementations ship with the crate; custom ones can be injected on the
//! pipeline.

#![warn(missing_docs)]

// Core data types
pub mod core;

// Unified configuration
pub mod config;

// Error types
pub mod error;

// Pose-graph engine (transactions, trait, default solver)
pub mod graph;

// Persistence and diagnostic dumps
pub mod io;

// Loop closure candidate search and refinement services
pub mod loop_closure;

// Point cloud registration
pub mod matching;

// Stage 1: submap refinement
pub mod refinement;

// Stage 2: submap alignment
pub mod alignment;

// Stage 3: pose-graph optimization
pub mod pose_graph;

// Orchestration
pub mod pipeline;

// Result summary
pub mod summary;

// Re-export commonly used types
pub use config::{
    LoopClosureConfig, PoseGraphConfig, RefinementConfig, SubmapAlignmentConfig,
    SubmapRefinementConfig,
};
pub use crate::core::{FeatureCloud, Keyframe, PointCloud, Submap, SubmapStore, Transform};
pub use error::{RefineError, Result};
pub use graph::{GraphEngine, RelaxationConfig, RelaxationGraph, Transaction};
pub use loop_closure::{Candidate, CandidateSearch, LoopRefinement, RefinementOutcome};
pub use matching::{build_matcher, Matcher, MatcherConfig, MatcherKind};
pub use pipeline::GlobalMapRefinement;
pub use summary::{RefinementSummary, RegistrationDelta};
