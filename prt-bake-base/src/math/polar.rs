use core::f64::consts::{PI, TAU};

use crate::math::{FreeCoordinate, FreeVector};

/// Spherical-polar direction on the unit sphere.
///
/// `theta` is the polar angle measured from the +Z pole in `[0, π]`;
/// `phi` is the azimuth in `[0, 2π)`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[expect(clippy::exhaustive_structs)]
pub struct PolarCoord {
    #[allow(missing_docs)]
    pub theta: FreeCoordinate,
    #[allow(missing_docs)]
    pub phi: FreeCoordinate,
}

impl PolarCoord {
    /// Convert to a cartesian unit vector.
    #[inline]
    pub fn to_cartesian(self) -> FreeVector {
        let (sin_theta, cos_theta) = self.theta.sin_cos();
        let (sin_phi, cos_phi) = self.phi.sin_cos();
        FreeVector::new(sin_theta * cos_phi, sin_theta * sin_phi, cos_theta)
    }

    /// Convert a unit cartesian vector to polar form.
    ///
    /// The input must already be normalized; only its direction is meaningful.
    /// The returned `phi` lies in `[0, 2π)`.
    #[inline]
    pub fn from_cartesian(direction: FreeVector) -> Self {
        let theta = direction.z.clamp(-1.0, 1.0).acos();
        let mut phi = direction.y.atan2(direction.x);
        if phi < 0.0 {
            phi += TAU;
        }
        Self { theta, phi }
    }

    /// Whether the direction lies in the lower hemisphere (`theta > π/2`).
    #[inline]
    pub fn is_lower_hemisphere(self) -> bool {
        self.theta > PI / 2.0
    }
}
