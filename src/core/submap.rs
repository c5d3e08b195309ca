//! Submaps and the ordered submap store.

use super::{Keyframe, PointCloud, Transform};

/// A locally-consistent map fragment with an adjustable world pose.
///
/// A submap owns an ordered sequence of keyframes plus a single anchoring
/// world pose. The initial pose recorded at creation is never mutated; the
/// current pose is rewritten by the alignment and pose-graph stages. The raw
/// measurement data inside the keyframes is never touched by either.
#[derive(Clone, Debug)]
pub struct Submap {
    /// Timestamp key in microseconds (store order follows this).
    stamp_us: u64,

    /// Current pose in the world frame.
    pose: Transform,

    /// Pose in the world frame at creation time. Immutable.
    pose_init: Transform,

    /// Keyframes in temporal order.
    keyframes: Vec<Keyframe>,
}

impl Submap {
    /// Create a new submap anchored at `pose`.
    ///
    /// The initial pose is recorded from `pose` and never changes afterwards.
    pub fn new(stamp_us: u64, pose: Transform) -> Self {
        Self {
            stamp_us,
            pose,
            pose_init: pose,
            keyframes: Vec::new(),
        }
    }

    /// Reassemble a submap whose current and initial poses already diverge,
    /// e.g. when loading a previously refined map from disk.
    pub fn from_parts(
        stamp_us: u64,
        pose: Transform,
        pose_init: Transform,
        keyframes: Vec<Keyframe>,
    ) -> Self {
        Self {
            stamp_us,
            pose,
            pose_init,
            keyframes,
        }
    }

    /// Timestamp key in microseconds.
    #[inline]
    pub fn stamp_us(&self) -> u64 {
        self.stamp_us
    }

    /// Current pose in the world frame.
    #[inline]
    pub fn pose(&self) -> Transform {
        self.pose
    }

    /// Pose in the world frame at creation time.
    #[inline]
    pub fn pose_init(&self) -> Transform {
        self.pose_init
    }

    /// Overwrite the current world pose.
    ///
    /// This is the only mutation path for the pose; the initial pose is
    /// left untouched.
    #[inline]
    pub fn update_pose(&mut self, pose: Transform) {
        self.pose = pose;
    }

    /// Append a keyframe. Keyframes must arrive in temporal order.
    pub fn push_keyframe(&mut self, keyframe: Keyframe) {
        debug_assert!(
            self.keyframes
                .last()
                .map_or(true, |k| k.timestamp_us() < keyframe.timestamp_us()),
            "keyframes must be pushed in temporal order"
        );
        self.keyframes.push(keyframe);
    }

    /// Keyframes in temporal order.
    #[inline]
    pub fn keyframes(&self) -> &[Keyframe] {
        &self.keyframes
    }

    /// Mutable access to the keyframes (refinement write-back).
    #[inline]
    pub fn keyframes_mut(&mut self) -> &mut [Keyframe] {
        &mut self.keyframes
    }

    /// All keyframe points projected into the world frame.
    ///
    /// When `use_initial` is set the projection uses the initial world pose
    /// instead of the current one.
    pub fn points_in_world(&self, use_initial: bool) -> PointCloud {
        let world = if use_initial {
            self.pose_init
        } else {
            self.pose
        };
        let mut cloud = PointCloud::new();
        for kf in &self.keyframes {
            let t = world.compose(&kf.local_pose());
            cloud.merge_transformed(kf.cloud(), &t);
        }
        cloud
    }

    /// All keyframe points projected into an arbitrary frame.
    ///
    /// `t_frame_world` maps world coordinates into the requested frame.
    pub fn points_in_frame(&self, t_frame_world: &Transform, use_initial: bool) -> PointCloud {
        let world = if use_initial {
            self.pose_init
        } else {
            self.pose
        };
        let mut cloud = PointCloud::new();
        for kf in &self.keyframes {
            let t = t_frame_world.compose(&world).compose(&kf.local_pose());
            cloud.merge_transformed(kf.cloud(), &t);
        }
        cloud
    }
}

/// Ordered collection of submaps.
///
/// Store order is processing order for every refinement stage. The store
/// owns all submaps; stages mutate poses through it but never remove or
/// reorder entries.
#[derive(Clone, Debug, Default)]
pub struct SubmapStore {
    submaps: Vec<Submap>,
}

impl SubmapStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            submaps: Vec::new(),
        }
    }

    /// Append a submap. Submaps must arrive in timestamp order.
    pub fn push(&mut self, submap: Submap) {
        debug_assert!(
            self.submaps
                .last()
                .map_or(true, |s| s.stamp_us() < submap.stamp_us()),
            "submaps must be pushed in timestamp order"
        );
        self.submaps.push(submap);
    }

    /// Number of submaps.
    #[inline]
    pub fn len(&self) -> usize {
        self.submaps.len()
    }

    /// True if the store holds no submaps.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.submaps.is_empty()
    }

    /// Submap by store index.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Submap> {
        self.submaps.get(index)
    }

    /// Mutable submap by store index.
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Submap> {
        self.submaps.get_mut(index)
    }

    /// All submaps in store order.
    #[inline]
    pub fn submaps(&self) -> &[Submap] {
        &self.submaps
    }

    /// Mutable access to all submaps.
    #[inline]
    pub fn submaps_mut(&mut self) -> &mut [Submap] {
        &mut self.submaps
    }
}
