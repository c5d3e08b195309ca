//! Point cloud containers.

use nalgebra::Point3;

use super::Transform;

/// An owned 3D point set.
#[derive(Clone, Debug, Default)]
pub struct PointCloud {
    points: Vec<Point3<f64>>,
}

impl PointCloud {
    /// Create an empty cloud.
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    /// Create from a list of points.
    pub fn from_points(points: Vec<Point3<f64>>) -> Self {
        Self { points }
    }

    /// Number of points.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True if the cloud holds no points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Point slice.
    #[inline]
    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    /// Append a point.
    #[inline]
    pub fn push(&mut self, p: Point3<f64>) {
        self.points.push(p);
    }

    /// Append all points of another cloud.
    pub fn merge(&mut self, other: &PointCloud) {
        self.points.extend_from_slice(&other.points);
    }

    /// Append another cloud transformed by `transform`.
    pub fn merge_transformed(&mut self, other: &PointCloud, transform: &Transform) {
        self.points
            .extend(other.points.iter().map(|p| transform.transform_point(p)));
    }

    /// Return a copy with every point transformed.
    pub fn transformed(&self, transform: &Transform) -> PointCloud {
        PointCloud {
            points: self
                .points
                .iter()
                .map(|p| transform.transform_point(p))
                .collect(),
        }
    }

    /// Clear all points.
    pub fn clear(&mut self) {
        self.points.clear();
    }
}

/// A point set split into geometric feature classes.
///
/// Edge points lie on linear structures, surface points on planar ones.
/// Used by the feature-based matcher path; the raw-point path ignores the
/// split entirely.
#[derive(Clone, Debug, Default)]
pub struct FeatureCloud {
    /// Points on linear structures.
    pub edges: PointCloud,
    /// Points on planar structures.
    pub surfaces: PointCloud,
}

impl FeatureCloud {
    /// Total number of feature points across both classes.
    pub fn len(&self) -> usize {
        self.edges.len() + self.surfaces.len()
    }

    /// True if both classes are empty.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty() && self.surfaces.is_empty()
    }

    /// Return a copy with every point transformed.
    pub fn transformed(&self, transform: &Transform) -> FeatureCloud {
        FeatureCloud {
            edges: self.edges.transformed(transform),
            surfaces: self.surfaces.transformed(transform),
        }
    }
}
