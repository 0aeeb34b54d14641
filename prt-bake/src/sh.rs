//! Real spherical-harmonics basis evaluation and coefficient storage.
//!
//! Geometry is computed in `f64`; coefficients are stored as `f32`, which is
//! plenty for lighting data and halves the size of the per-vertex output.

use core::f64::consts::PI;
use core::ops::{AddAssign, Index, IndexMut, MulAssign};

use prt_bake_base::math::PolarCoord;


// -------------------------------------------------------------------------------------------------

/// Describes the size of a spherical-harmonics expansion: the number of bands
/// (`l = 0..bands`), hence `bands²` coefficients.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ShDescriptor {
    bands: usize,
}

impl ShDescriptor {
    /// The usual choice for diffuse transfer; bands beyond the third contribute
    /// almost nothing to a cosine lobe.
    pub const THREE_BANDS: Self = Self { bands: 3 };

    /// A descriptor for `bands` bands (`bands²` coefficients).
    ///
    /// Panics if `bands` is zero.
    #[track_caller]
    pub fn new(bands: usize) -> Self {
        assert!(bands > 0, "a spherical-harmonics expansion needs at least one band");
        Self { bands }
    }

    /// Number of bands `l = 0..bands`.
    #[inline]
    pub fn bands(self) -> usize {
        self.bands
    }

    /// Number of coefficients, `bands²`.
    #[inline]
    pub fn coefficient_count(self) -> usize {
        self.bands * self.bands
    }

    /// Flat index of the `(l, m)` coefficient, `l(l+1) + m`.
    #[inline]
    pub fn index_of(self, l: usize, m: isize) -> usize {
        debug_assert!(l < self.bands && m.unsigned_abs() <= l);
        (l * (l + 1)).wrapping_add_signed(m)
    }
}

// -------------------------------------------------------------------------------------------------

/// A fixed-length list of spherical-harmonics coefficients; the projection of
/// some spherical function onto the basis given by an [`ShDescriptor`].
#[derive(Clone, Debug, PartialEq)]
pub struct CoeffList(Box<[f32]>);

impl CoeffList {
    /// An all-zero list sized for `descriptor`.
    pub fn zero(descriptor: ShDescriptor) -> Self {
        Self(vec![0.0; descriptor.coefficient_count()].into_boxed_slice())
    }

    /// Number of coefficients.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[allow(missing_docs)]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The coefficients in `l(l+1) + m` order.
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Set every coefficient to zero, keeping the length.
    pub fn clear(&mut self) {
        self.0.fill(0.0);
    }

    /// `self += other * scale`, the inner loop of Monte-Carlo accumulation.
    ///
    /// Panics if the lengths differ.
    #[inline]
    pub fn add_scaled(&mut self, other: &CoeffList, scale: f32) {
        assert_eq!(self.0.len(), other.0.len());
        for (a, b) in self.0.iter_mut().zip(other.0.iter()) {
            *a += b * scale;
        }
    }
}

impl From<Vec<f32>> for CoeffList {
    fn from(coefficients: Vec<f32>) -> Self {
        Self(coefficients.into_boxed_slice())
    }
}

impl Index<usize> for CoeffList {
    type Output = f32;
    #[inline]
    fn index(&self, index: usize) -> &f32 {
        &self.0[index]
    }
}

impl IndexMut<usize> for CoeffList {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut f32 {
        &mut self.0[index]
    }
}

impl AddAssign<&CoeffList> for CoeffList {
    fn add_assign(&mut self, other: &CoeffList) {
        self.add_scaled(other, 1.0);
    }
}

impl MulAssign<f32> for CoeffList {
    fn mul_assign(&mut self, scale: f32) {
        for a in self.0.iter_mut() {
            *a *= scale;
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Evaluate the full real SH basis `Y(l, m)` for every `(l, m)` of `descriptor`
/// at the direction `polar`, in `l(l+1) + m` order.
pub fn sh_basis(descriptor: ShDescriptor, polar: PolarCoord) -> CoeffList {
    let bands = descriptor.bands();
    let cos_theta = polar.theta.cos();
    let mut out = vec![0.0f32; descriptor.coefficient_count()];
    for l in 0..bands {
        for m in -(l as isize)..=(l as isize) {
            out[descriptor.index_of(l, m)] = sh_value(l, m, cos_theta, polar.phi) as f32;
        }
    }
    out.into()
}

/// One real SH basis function `Y(l, m)` at polar angle `acos(cos_theta)`, azimuth `phi`.
fn sh_value(l: usize, m: isize, cos_theta: f64, phi: f64) -> f64 {
    let abs_m = m.unsigned_abs();
    let k = normalization(l, abs_m);
    let p = legendre(l, abs_m, cos_theta);
    match m {
        0 => k * p,
        _ if m > 0 => core::f64::consts::SQRT_2 * k * (abs_m as f64 * phi).cos() * p,
        _ => core::f64::consts::SQRT_2 * k * (abs_m as f64 * phi).sin() * p,
    }
}

/// Associated Legendre polynomial `P(l, m, x)` by the standard three-step recurrence.
fn legendre(l: usize, m: usize, x: f64) -> f64 {
    // P(m, m, x) = (-1)^m (2m-1)!! (1-x²)^(m/2)
    let mut pmm = 1.0;
    if m > 0 {
        let somx2 = ((1.0 - x) * (1.0 + x)).max(0.0).sqrt();
        let mut fact = 1.0;
        for _ in 0..m {
            pmm *= -fact * somx2;
            fact += 2.0;
        }
    }
    if l == m {
        return pmm;
    }
    // P(m+1, m, x) = x (2m+1) P(m, m, x)
    let mut pmmp1 = x * (2.0 * m as f64 + 1.0) * pmm;
    if l == m + 1 {
        return pmmp1;
    }
    // Lift l by the full recurrence.
    let mut pll = 0.0;
    for ll in (m + 2)..=l {
        pll = ((2.0 * ll as f64 - 1.0) * x * pmmp1 - (ll as f64 + m as f64 - 1.0) * pmm)
            / (ll as f64 - m as f64);
        pmm = pmmp1;
        pmmp1 = pll;
    }
    pll
}

/// `K(l, m) = sqrt((2l+1)/(4π) · (l-m)!/(l+m)!)`
fn normalization(l: usize, m: usize) -> f64 {
    ((2.0 * l as f64 + 1.0) / (4.0 * PI) * factorial(l - m) / factorial(l + m)).sqrt()
}

fn factorial(n: usize) -> f64 {
    (1..=n).map(|i| i as f64).product()
}

// -------------------------------------------------------------------------------------------------

/// A rotation of spherical-harmonics coefficient space: a dense block-diagonal
/// `n²×n²` matrix corresponding to some 3D rotation.
///
/// This crate only applies such matrices; computing one from a 3D rotation is
/// the mesh provider's concern.
#[derive(Clone, Debug, PartialEq)]
pub struct ShRotationMatrix {
    descriptor: ShDescriptor,
    /// Row-major, `coefficient_count()` squared.
    elements: Box<[f32]>,
}

impl ShRotationMatrix {
    /// Wrap a row-major matrix of `descriptor.coefficient_count()²` elements.
    ///
    /// Returns [`None`] if the element count does not match the descriptor.
    pub fn checked_from_rows(descriptor: ShDescriptor, elements: Vec<f32>) -> Option<Self> {
        let n = descriptor.coefficient_count();
        (elements.len() == n * n).then(|| Self {
            descriptor,
            elements: elements.into_boxed_slice(),
        })
    }

    /// The identity rotation (useful as a default and in tests).
    pub fn identity(descriptor: ShDescriptor) -> Self {
        let n = descriptor.coefficient_count();
        let mut elements = vec![0.0; n * n];
        for i in 0..n {
            elements[i * n + i] = 1.0;
        }
        Self {
            descriptor,
            elements: elements.into_boxed_slice(),
        }
    }

    #[allow(missing_docs)]
    #[inline]
    pub fn descriptor(&self) -> ShDescriptor {
        self.descriptor
    }

    /// `matrix · coefficients`, rotating the projected function.
    ///
    /// Panics if the coefficient list's length does not match the descriptor.
    pub fn apply(&self, coefficients: &CoeffList) -> CoeffList {
        let n = self.descriptor.coefficient_count();
        assert_eq!(coefficients.len(), n);
        let mut out = vec![0.0f32; n];
        for (row, slot) in out.iter_mut().enumerate() {
            let mut sum = 0.0;
            for col in 0..n {
                sum += self.elements[row * n + col] * coefficients[col];
            }
            *slot = sum;
        }
        out.into()
    }
}
