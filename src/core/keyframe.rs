//! Keyframes: timestamped sensor observations inside a submap.

use super::{PointCloud, Transform};

/// A single timestamped point-set observation.
///
/// The pose is relative to the owning submap's reference frame, not the
/// world frame. It is only rewritten by the submap refinement stage, from
/// the solved estimate of the local pose graph.
#[derive(Clone, Debug)]
pub struct Keyframe {
    /// Timestamp in microseconds since epoch.
    timestamp_us: u64,

    /// Pose relative to the submap origin.
    local_pose: Transform,

    /// Measured points in the keyframe's own frame.
    cloud: PointCloud,
}

impl Keyframe {
    /// Create a new keyframe.
    pub fn new(timestamp_us: u64, local_pose: Transform, cloud: PointCloud) -> Self {
        Self {
            timestamp_us,
            local_pose,
            cloud,
        }
    }

    /// Timestamp in microseconds.
    #[inline]
    pub fn timestamp_us(&self) -> u64 {
        self.timestamp_us
    }

    /// Pose relative to the submap origin.
    #[inline]
    pub fn local_pose(&self) -> Transform {
        self.local_pose
    }

    /// Overwrite the stored local pose with a solved estimate.
    #[inline]
    pub fn set_local_pose(&mut self, pose: Transform) {
        self.local_pose = pose;
    }

    /// Measured points in the keyframe frame.
    #[inline]
    pub fn cloud(&self) -> &PointCloud {
        &self.cloud
    }

    /// Points projected into the submap frame at the current local pose.
    pub fn cloud_in_submap_frame(&self) -> PointCloud {
        self.cloud.transformed(&self.local_pose)
    }
}
