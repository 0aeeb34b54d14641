use core::fmt;

use euclid::Point3D;

use crate::math::{Axis, FreeCoordinate, FreePoint, FreeVector};

/// Axis-Aligned Box with continuous coordinates.
///
/// The invariant `lower_bounds ≤ upper_bounds` (component-wise, no NaN) is
/// enforced by all constructors.
#[derive(Copy, Clone, PartialEq)]
pub struct Aab {
    lower_bounds: FreePoint,
    upper_bounds: FreePoint,
}

impl Aab {
    /// The [`Aab`] of zero size at the origin.
    pub const ZERO: Aab = Aab {
        lower_bounds: Point3D::new(0., 0., 0.),
        upper_bounds: Point3D::new(0., 0., 0.),
    };

    /// Constructs an [`Aab`] from most-negative and most-positive corner points.
    ///
    /// Panics if the points are not in the proper order or if they are NaN.
    #[inline]
    #[track_caller]
    pub fn from_lower_upper(
        lower_bounds: impl Into<FreePoint>,
        upper_bounds: impl Into<FreePoint>,
    ) -> Self {
        let lower_bounds = lower_bounds.into();
        let upper_bounds = upper_bounds.into();
        match Self::checked_from_lower_upper(lower_bounds, upper_bounds) {
            Some(aab) => aab,
            None => panic!(
                "invalid AAB points that are misordered or NaN: \
                lower {lower_bounds:?} upper {upper_bounds:?}"
            ),
        }
    }

    /// Constructs an [`Aab`] from most-negative and most-positive corner points.
    ///
    /// Returns [`None`] if the points are not in the proper order or if they are NaN.
    #[inline]
    pub fn checked_from_lower_upper(
        lower_bounds: FreePoint,
        upper_bounds: FreePoint,
    ) -> Option<Self> {
        if lower_bounds.x <= upper_bounds.x
            && lower_bounds.y <= upper_bounds.y
            && lower_bounds.z <= upper_bounds.z
        {
            Some(Self {
                lower_bounds,
                upper_bounds,
            })
        } else {
            None
        }
    }

    /// A box containing a single point.
    #[inline]
    pub fn from_point(point: FreePoint) -> Self {
        Self {
            lower_bounds: point,
            upper_bounds: point,
        }
    }

    /// The most negative corner of the box.
    #[inline]
    pub const fn lower_bounds(&self) -> FreePoint {
        self.lower_bounds
    }

    /// The most positive corner of the box.
    #[inline]
    pub const fn upper_bounds(&self) -> FreePoint {
        self.upper_bounds
    }

    /// Side length of the box along the given axis.
    #[inline]
    pub fn size(&self, axis: Axis) -> FreeCoordinate {
        self.upper_bounds[axis] - self.lower_bounds[axis]
    }

    /// The vector from the most negative corner to the most positive corner.
    #[inline]
    pub fn extent(&self) -> FreeVector {
        self.upper_bounds - self.lower_bounds
    }

    /// Length of the box's diagonal; zero for a degenerate box.
    #[inline]
    pub fn diagonal_length(&self) -> FreeCoordinate {
        self.extent().length()
    }

    /// Whether the box has zero extent along at least one axis.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        Axis::ALL.into_iter().any(|axis| self.size(axis) == 0.0)
    }

    /// The smallest box containing both `self` and `other`.
    #[must_use]
    #[inline]
    pub fn union(&self, other: &Aab) -> Aab {
        Aab {
            lower_bounds: self.lower_bounds.min(other.lower_bounds),
            upper_bounds: self.upper_bounds.max(other.upper_bounds),
        }
    }

    /// Enlarge the box containing the given point if necessary.
    #[must_use]
    #[inline]
    pub fn union_point(&self, point: FreePoint) -> Aab {
        Aab {
            lower_bounds: self.lower_bounds.min(point),
            upper_bounds: self.upper_bounds.max(point),
        }
    }

    /// Expand the box symmetrically by the given amount on all six faces.
    ///
    /// Panics if this would produce an invalid box (negative distance larger
    /// than the half-size).
    #[must_use]
    #[inline]
    #[track_caller]
    pub fn expand(self, distance: FreeCoordinate) -> Self {
        let distance_vec = FreeVector::splat(distance);
        Self::from_lower_upper(
            self.lower_bounds - distance_vec,
            self.upper_bounds + distance_vec,
        )
    }

    /// Whether the box contains the given point (inclusive of the boundary).
    #[inline]
    pub fn contains(&self, point: FreePoint) -> bool {
        Axis::ALL.into_iter().all(|axis| {
            (self.lower_bounds[axis]..=self.upper_bounds[axis]).contains(&point[axis])
        })
    }
}

impl fmt::Debug for Aab {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Aab {
            lower_bounds: l,
            upper_bounds: u,
        } = *self;
        fmt.write_str("Aab(")?;
        fmt.debug_list()
            .entries([l.x..u.x, l.y..u.y, l.z..u.z])
            .finish()?;
        fmt.write_str(")")
    }
}
