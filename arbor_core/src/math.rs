//! Small vector and tensor helpers shared by both simulator backends

use nalgebra::{Matrix3, Quaternion, UnitQuaternion, Vector3, Vector4};

pub type Vec3 = Vector3<f32>;
pub type Mat3 = Matrix3<f32>;
pub type Quat = UnitQuaternion<f32>;

/// Angles below this magnitude produce an identity rotation
pub const ANGLE_EPSILON: f32 = 1e-9;

/// Cross-product matrix: `skew(a) * b == a.cross(&b)`
#[inline]
pub fn skew(v: &Vec3) -> Mat3 {
    v.cross_matrix()
}

/// `skew(v)²`, the parallel-axis correction term
#[inline]
pub fn skew_squared(v: &Vec3) -> Mat3 {
    let s = skew(v);
    s * s
}

/// Conjugate a body-frame tensor into the frame of `rotation`
#[inline]
pub fn rotate_tensor(rotation: &Quat, tensor: &Mat3) -> Mat3 {
    let r = rotation.to_rotation_matrix().into_inner();
    r * tensor * r.transpose()
}

/// Rotation for an angle vector (axis = direction, angle = magnitude)
#[inline]
pub fn rotation_from_angles(angles: &Vec3) -> Quat {
    if angles.norm() < ANGLE_EPSILON {
        Quat::identity()
    } else {
        Quat::from_scaled_axis(*angles)
    }
}

pub fn mat3_is_finite(m: &Mat3) -> bool {
    m.iter().all(|x| x.is_finite())
}

pub fn vec3_is_finite(v: &Vec3) -> bool {
    v.iter().all(|x| x.is_finite())
}

// Plain array conversions used by the device buffers.

#[inline]
pub fn vec3_to_array(v: &Vec3) -> [f32; 3] {
    [v.x, v.y, v.z]
}

#[inline]
pub fn vec3_from_array(a: [f32; 3]) -> Vec3 {
    Vec3::new(a[0], a[1], a[2])
}

/// Stored as `[x, y, z, w]`
#[inline]
pub fn quat_to_array(q: &Quat) -> [f32; 4] {
    let c = q.coords;
    [c.x, c.y, c.z, c.w]
}

#[inline]
pub fn quat_from_array(a: [f32; 4]) -> Quat {
    UnitQuaternion::new_unchecked(Quaternion::from(Vector4::new(a[0], a[1], a[2], a[3])))
}

/// Column-major, matching nalgebra storage
#[inline]
pub fn mat3_to_array(m: &Mat3) -> [[f32; 3]; 3] {
    [
        [m[(0, 0)], m[(1, 0)], m[(2, 0)]],
        [m[(0, 1)], m[(1, 1)], m[(2, 1)]],
        [m[(0, 2)], m[(1, 2)], m[(2, 2)]],
    ]
}

#[inline]
pub fn mat3_from_array(a: [[f32; 3]; 3]) -> Mat3 {
    Mat3::from_columns(&[
        vec3_from_array(a[0]),
        vec3_from_array(a[1]),
        vec3_from_array(a[2]),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_skew_matches_cross() {
        let a = Vec3::new(1.0, -2.0, 0.5);
        let b = Vec3::new(0.3, 4.0, -1.0);
        assert_relative_eq!(skew(&a) * b, a.cross(&b), epsilon = 1e-6);
    }

    #[test]
    fn test_skew_squared_is_outer_minus_norm() {
        let p = Vec3::new(0.0, 0.5, 0.0);
        let expected = p * p.transpose() - Mat3::identity() * p.norm_squared();
        assert_relative_eq!(skew_squared(&p), expected, epsilon = 1e-6);
    }

    #[test]
    fn test_small_angles_are_identity() {
        let q = rotation_from_angles(&Vec3::new(1e-12, 0.0, 0.0));
        assert_eq!(q, Quat::identity());
    }

    #[test]
    fn test_array_conversions_are_lossless() {
        let q = Quat::from_euler_angles(0.3, -0.2, 1.1);
        assert_eq!(quat_from_array(quat_to_array(&q)), q);

        let m = Mat3::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0);
        assert_eq!(mat3_from_array(mat3_to_array(&m)), m);
    }
}
