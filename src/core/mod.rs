//! Core data types: transforms, point clouds, keyframes, submaps.

mod cloud;
mod keyframe;
mod submap;
mod transform;

pub use cloud::{FeatureCloud, PointCloud};
pub use keyframe::Keyframe;
pub use submap::{Submap, SubmapStore};
pub use transform::Transform;
