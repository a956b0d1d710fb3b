pub use glam::*;

/// Returned by [`decompose`] when a matrix has no usable TRS factorization.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DegenerateTransformError;

impl std::fmt::Display for DegenerateTransformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "matrix is not an invertible TRS transform")
    }
}

impl std::error::Error for DegenerateTransformError {}

/// Builds a 4x4 matrix applying scale, then rotation, then translation.
pub fn compose(translation: Vec3, rotation: Quat, scale: Vec3) -> Mat4 {
    Mat4::from_scale_rotation_translation(scale, rotation, translation)
}

/// Splits a matrix back into translation, rotation and scale.
///
/// Fails on non-finite or non-invertible input; callers that can degrade
/// substitute the identity transform instead.
pub fn decompose(matrix: Mat4) -> Result<(Vec3, Quat, Vec3), DegenerateTransformError> {
    if !matrix.is_finite() || matrix.determinant().abs() < 1e-8 {
        return Err(DegenerateTransformError);
    }

    let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
    Ok((translation, rotation, scale))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    #[test]
    fn compose_decompose_round_trip() {
        let t = Vec3::new(1.0, -2.0, 3.5);
        let r = Quat::from_rotation_y(0.83);
        let s = Vec3::new(2.0, 0.5, 1.25);

        let (t2, r2, s2) = decompose(compose(t, r, s)).unwrap();
        assert!(t2.abs_diff_eq(t, EPS));
        assert!(r2.abs_diff_eq(r, EPS));
        assert!(s2.abs_diff_eq(s, EPS));
    }

    #[test]
    fn compose_applies_scale_before_rotation() {
        // Point on the x axis, scaled by 2, rotated a quarter turn around y.
        let m = compose(
            Vec3::ZERO,
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
            Vec3::splat(2.0),
        );
        let p = m.transform_point3(Vec3::X);
        assert!(p.abs_diff_eq(Vec3::new(0.0, 0.0, -2.0), EPS));
    }

    #[test]
    fn decompose_rejects_degenerate_matrices() {
        let zero_scale = compose(Vec3::ONE, Quat::IDENTITY, Vec3::new(1.0, 0.0, 1.0));
        assert_eq!(decompose(zero_scale), Err(DegenerateTransformError));

        let nan = Mat4::from_cols_array(&[f32::NAN; 16]);
        assert_eq!(decompose(nan), Err(DegenerateTransformError));
    }
}
