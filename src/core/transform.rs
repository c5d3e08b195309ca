//! Rigid 3D transforms.

use nalgebra::{Isometry3, Matrix4, Point3, Rotation3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// A rigid transform in SE(3).
///
/// Composition follows the usual convention: `T_a_c = T_a_b.compose(&T_b_c)`.
/// Serializes as a translation vector plus a `[w, x, y, z]` quaternion.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "TransformRepr", into = "TransformRepr")]
pub struct Transform {
    iso: Isometry3<f64>,
}

impl Transform {
    /// Identity transform.
    pub fn identity() -> Self {
        Self {
            iso: Isometry3::identity(),
        }
    }

    /// Create from a translation vector and a rotation.
    pub fn from_parts(translation: Vector3<f64>, rotation: UnitQuaternion<f64>) -> Self {
        Self {
            iso: Isometry3::from_parts(Translation3::from(translation), rotation),
        }
    }

    /// Pure translation.
    pub fn from_translation(x: f64, y: f64, z: f64) -> Self {
        Self::from_parts(Vector3::new(x, y, z), UnitQuaternion::identity())
    }

    /// Create from a 4x4 homogeneous matrix.
    ///
    /// The upper-left 3x3 block must be a rotation; it is re-orthonormalized
    /// through the quaternion conversion.
    pub fn from_matrix(m: &Matrix4<f64>) -> Self {
        let r = m.fixed_view::<3, 3>(0, 0).into_owned();
        let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix(&r));
        let translation = m.fixed_view::<3, 1>(0, 3).into_owned();
        Self::from_parts(translation, rotation)
    }

    /// Convert to a 4x4 homogeneous matrix.
    pub fn to_matrix(&self) -> Matrix4<f64> {
        self.iso.to_homogeneous()
    }

    /// Translation component.
    #[inline]
    pub fn translation(&self) -> Vector3<f64> {
        self.iso.translation.vector
    }

    /// Rotation component.
    #[inline]
    pub fn rotation(&self) -> UnitQuaternion<f64> {
        self.iso.rotation
    }

    /// Compose with another transform: `self * other`.
    #[inline]
    pub fn compose(&self, other: &Transform) -> Transform {
        Transform {
            iso: self.iso * other.iso,
        }
    }

    /// Inverse transform.
    #[inline]
    pub fn inverse(&self) -> Transform {
        Transform {
            iso: self.iso.inverse(),
        }
    }

    /// Relative transform from `self` to `other`: `inverse(self) * other`.
    #[inline]
    pub fn between(&self, other: &Transform) -> Transform {
        Transform {
            iso: self.iso.inverse() * other.iso,
        }
    }

    /// Apply to a point.
    #[inline]
    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        self.iso.transform_point(p)
    }

    /// Rotation angle of this transform in degrees (always non-negative).
    pub fn rotation_angle_deg(&self) -> f64 {
        self.iso.rotation.angle().to_degrees()
    }

    /// Euclidean norm of the translation in millimeters.
    pub fn translation_norm_mm(&self) -> f64 {
        self.iso.translation.vector.norm() * 1000.0
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Serialized form: translation `[x, y, z]`, rotation quaternion `[w, x, y, z]`.
#[derive(Serialize, Deserialize)]
struct TransformRepr {
    translation: [f64; 3],
    rotation: [f64; 4],
}

impl From<TransformRepr> for Transform {
    fn from(r: TransformRepr) -> Self {
        let [x, y, z] = r.translation;
        let [w, i, j, k] = r.rotation;
        let q = UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(w, i, j, k));
        Transform::from_parts(Vector3::new(x, y, z), q)
    }
}

impl From<Transform> for TransformRepr {
    fn from(t: Transform) -> Self {
        let v = t.translation();
        let q = t.rotation();
        TransformRepr {
            translation: [v.x, v.y, v.z],
            rotation: [q.w, q.i, q.j, q.k],
        }
    }
}
