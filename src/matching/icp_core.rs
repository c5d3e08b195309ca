//! Shared ICP building blocks: correspondence search and the closed-form
//! rigid alignment step.

use kiddo::float::kdtree::KdTree;
use kiddo::SquaredEuclidean;
use nalgebra::{Matrix3, Point3, Rotation3, UnitQuaternion, Vector3};

use crate::core::Transform;

/// K-d tree used for correspondence search.
///
/// This is kiddo's float tree with an enlarged bucket size. kiddo's
/// construction panics when more points than the bucket size share a
/// coordinate on a single axis, which the dense coplanar patches in these
/// clouds (wall/floor planes) routinely exceed with the default bucket of
/// 32. The bucket size only controls leaf capacity — nearest-neighbour
/// query results are identical regardless of its value.
pub(crate) type Tree = KdTree<f64, u64, 3, 1024, u32>;

/// One source-to-reference point pairing.
pub(crate) struct CorrespondencePair {
    pub source: Point3<f64>,
    pub reference: Point3<f64>,
    pub dist_sq: f64,
}

/// Build a k-d tree over a point slice.
pub(crate) fn build_tree(points: &[Point3<f64>]) -> Tree {
    let mut tree: Tree = Tree::new();
    for (i, p) in points.iter().enumerate() {
        tree.add(&[p.x, p.y, p.z], i as u64);
    }
    tree
}

/// Nearest-neighbour correspondences within the distance gate.
pub(crate) fn find_correspondences(
    source: &[Point3<f64>],
    reference: &[Point3<f64>],
    tree: &Tree,
    max_distance: f64,
) -> Vec<CorrespondencePair> {
    let max_dist_sq = max_distance * max_distance;
    let mut pairs = Vec::with_capacity(source.len());

    for p in source {
        let nearest = tree.nearest_one::<SquaredEuclidean>(&[p.x, p.y, p.z]);
        if nearest.distance <= max_dist_sq {
            pairs.push(CorrespondencePair {
                source: *p,
                reference: reference[nearest.item as usize],
                dist_sq: nearest.distance,
            });
        }
    }
    pairs
}

/// Drop the worst fraction of pairs by distance, keeping at least `min_keep`.
pub(crate) fn reject_outliers(
    pairs: &mut Vec<CorrespondencePair>,
    outlier_ratio: f64,
    min_keep: usize,
) {
    if outlier_ratio <= 0.0 || pairs.is_empty() {
        return;
    }
    pairs.sort_by(|a, b| a.dist_sq.total_cmp(&b.dist_sq));
    let keep = ((1.0 - outlier_ratio) * pairs.len() as f64) as usize;
    pairs.truncate(keep.max(min_keep));
}

/// Closed-form rigid transform minimizing point-to-point distances
/// (Kabsch/SVD). Returns `None` for degenerate pairings.
pub(crate) fn solve_rigid(pairs: &[CorrespondencePair]) -> Option<Transform> {
    if pairs.len() < 3 {
        return None;
    }

    let n = pairs.len() as f64;
    let mut centroid_src = Vector3::zeros();
    let mut centroid_ref = Vector3::zeros();
    for pair in pairs {
        centroid_src += pair.source.coords;
        centroid_ref += pair.reference.coords;
    }
    centroid_src /= n;
    centroid_ref /= n;

    let mut h = Matrix3::zeros();
    for pair in pairs {
        let s = pair.source.coords - centroid_src;
        let r = pair.reference.coords - centroid_ref;
        h += s * r.transpose();
    }

    let svd = h.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut rotation = v_t.transpose() * u.transpose();

    // reflection guard
    if rotation.determinant() < 0.0 {
        let mut v = v_t.transpose();
        v.column_mut(2).neg_mut();
        rotation = v * u.transpose();
    }

    let translation = centroid_ref - rotation * centroid_src;
    let q = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rotation));
    Some(Transform::from_parts(translation, q))
}

/// Apply a transform to every point in place.
pub(crate) fn apply_transform(points: &mut [Point3<f64>], transform: &Transform) {
    for p in points.iter_mut() {
        *p = transform.transform_point(p);
    }
}
