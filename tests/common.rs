//! Test utilities for pipeline evaluation.
//!
//! Builds synthetic submap stores observing a fixed world structure, with
//! controllable drift between the true and stored poses.

#![allow(dead_code)]

use nalgebra::Point3;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use vishva_map::{Keyframe, PointCloud, Submap, SubmapStore, Transform};

/// A corner structure: three orthogonal plane patches, dense enough to
/// constrain all six degrees of freedom during registration.
pub fn corner_structure() -> Vec<Point3<f64>> {
    let mut points = Vec::new();
    for i in 0..12 {
        for j in 0..12 {
            let a = i as f64 * 0.2;
            let b = j as f64 * 0.2;
            points.push(Point3::new(a, b, 0.0));
            points.push(Point3::new(a, 0.0, b));
            points.push(Point3::new(0.0, a, b));
        }
    }
    points
}

/// A submap observing the world corner structure from `true_pose`, stored
/// with `stored_pose` (current and initial alike) and one keyframe.
pub fn submap_observing(stamp_us: u64, true_pose: Transform, stored_pose: Transform) -> Submap {
    let to_local = true_pose.inverse();
    let cloud = PointCloud::from_points(
        corner_structure()
            .iter()
            .map(|p| to_local.transform_point(p))
            .collect(),
    );
    let mut submap = Submap::new(stamp_us, stored_pose);
    submap.push_keyframe(Keyframe::new(stamp_us, Transform::identity(), cloud));
    submap
}

/// A straight-line store: true poses at `spacing` intervals along x, stored
/// poses displaced by the per-submap `drift` offsets (also along x).
pub fn drifted_line_store(spacing: f64, drift: &[f64]) -> SubmapStore {
    let mut store = SubmapStore::new();
    for (i, &d) in drift.iter().enumerate() {
        let truth = Transform::from_translation(i as f64 * spacing, 0.0, 0.0);
        let stored = Transform::from_translation(i as f64 * spacing + d, 0.0, 0.0);
        store.push(submap_observing(i as u64, truth, stored));
    }
    store
}

/// Like [`drifted_line_store`], with zero-mean Gaussian noise of the given
/// standard deviation added to every measured point.
pub fn noisy_drifted_line_store(
    spacing: f64,
    drift: &[f64],
    noise_sigma: f64,
    seed: u64,
) -> SubmapStore {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, noise_sigma).expect("valid sigma");
    let mut store = SubmapStore::new();

    for (i, &d) in drift.iter().enumerate() {
        let truth = Transform::from_translation(i as f64 * spacing, 0.0, 0.0);
        let stored = Transform::from_translation(i as f64 * spacing + d, 0.0, 0.0);
        let to_local = truth.inverse();
        let cloud = PointCloud::from_points(
            corner_structure()
                .iter()
                .map(|p| {
                    let q = to_local.transform_point(p);
                    Point3::new(
                        q.x + normal.sample(&mut rng),
                        q.y + normal.sample(&mut rng),
                        q.z + normal.sample(&mut rng),
                    )
                })
                .collect(),
        );
        let mut submap = Submap::new(i as u64, stored);
        submap.push_keyframe(Keyframe::new(i as u64, Transform::identity(), cloud));
        store.push(submap);
    }
    store
}
