use core::f64::consts::{FRAC_PI_2, TAU};

use prt_bake_base::math::{FreeCoordinate, FreeVector, PolarCoord};

use crate::mesh::TangentFrame;

/// Polar angle of the hemisphere boundary used for visibility classification
/// and for the border lookups of the transfer pass: slightly inside π/2 so
/// that grazing directions are never treated as part of a hemisphere.
pub(crate) const VIS_LOOKUP_ANGLE: FreeCoordinate = FRAC_PI_2 * 0.95;

/// Hemisphere pre-sampling resolution: polar rings × azimuthal sectors.
const RINGS: usize = 7;
const SECTORS: usize = 14;

/// Polar offsets of the pre-sample rings, degrees from the hemisphere pole.
const RING_MIN_DEG: FreeCoordinate = 5.0;
const RING_MAX_DEG: FreeCoordinate = 85.0;

/// Number of blocked pre-sample rays a hemisphere may have and still count as
/// fully visible. Zero: a single blocked ray disqualifies the hemisphere.
const FAIL_THRESHOLD: usize = 0;

// -------------------------------------------------------------------------------------------------

/// Per-vertex cache answering "is this whole hemisphere unobstructed?".
///
/// Built by casting `RINGS × SECTORS` probe rays per hemisphere once per
/// vertex; afterwards, any sample ray pointing well inside a fully-visible
/// hemisphere is known unblocked without touching the grid. Worth it because
/// most vertices of an ordinary mesh see open sky over at least one hemisphere
/// while the transfer casts hundreds of sample rays per vertex.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct FullVisCache {
    enabled: bool,
    upper_visible: bool,
    lower_visible: bool,
    normal: FreeVector,
}

impl FullVisCache {
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Probe both hemispheres around `normal`, classifying each via `blocked`,
    /// which casts one world-space ray and reports whether anything stops it.
    pub fn probe(normal: FreeVector, mut blocked: impl FnMut(FreeVector) -> bool) -> Self {
        let mut visible = [false; 2];
        for (hemisphere, slot) in [normal, -normal].into_iter().zip(&mut visible) {
            let frame = TangentFrame::around_normal(hemisphere);
            let mut failures = 0;
            'rings: for ring in 0..RINGS {
                let theta = (RING_MIN_DEG
                    + (RING_MAX_DEG - RING_MIN_DEG) * ring as FreeCoordinate
                        / (RINGS - 1) as FreeCoordinate)
                    .to_radians();
                for sector in 0..SECTORS {
                    let phi = TAU * sector as FreeCoordinate / SECTORS as FreeCoordinate;
                    let direction = frame.to_world(PolarCoord { theta, phi }.to_cartesian());
                    if blocked(direction) {
                        failures += 1;
                        if failures > FAIL_THRESHOLD {
                            break 'rings;
                        }
                    }
                }
            }
            *slot = failures <= FAIL_THRESHOLD;
        }
        Self {
            enabled: true,
            upper_visible: visible[0],
            lower_visible: visible[1],
            normal,
        }
    }

    #[inline]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the hemisphere around the cached normal is fully visible.
    #[inline]
    pub fn upper_hemisphere_visible(&self) -> bool {
        self.upper_visible
    }

    /// Whether `direction` lies well inside a hemisphere known to be fully
    /// visible, so a ray that way cannot hit anything.
    #[inline]
    pub fn is_fully_visible(&self, direction: FreeVector) -> bool {
        if !self.enabled {
            return false;
        }
        let cos = self.normal.dot(direction);
        let boundary = VIS_LOOKUP_ANGLE.cos();
        (self.upper_visible && cos > boundary) || (self.lower_visible && -cos > boundary)
    }
}

// -------------------------------------------------------------------------------------------------

/// Memo of the triangle set that blocked the previous ray.
///
/// Consecutive sample rays from one vertex usually hit the same nearby
/// occluder; re-testing just that set answers most blocked rays without a
/// grid traversal. A miss invalidates the memo and falls back to the grid.
#[derive(Clone, Debug, Default)]
pub(crate) struct RayCache {
    triangles: Vec<u32>,
}

impl RayCache {
    /// The previously-blocking triangle indices to re-test first.
    #[inline]
    pub fn candidates(&self) -> &[u32] {
        &self.triangles
    }

    /// Replace the memo with the triangle that blocked the current ray.
    pub fn record(&mut self, triangle_index: u32) {
        self.triangles.clear();
        self.triangles.push(triangle_index);
    }

    pub fn clear(&mut self) {
        self.triangles.clear();
    }
}
