//! Spatial raster index accelerating “which triangles might lie along this ray”
//! queries over a static triangle soup.
//!
//! Triangles are projected onto two axis-aligned planes (ZX and XY) and
//! rasterized conservatively into per-plane occupancy tables; a 3D cell's
//! candidate set is the intersection of its two per-plane lists. A third
//! (YZ) table would reduce false positives further but costs memory for
//! little gain, so it is deliberately not built.

use arrayvec::ArrayVec;

use crate::math::FreeCoordinate;

mod table;

mod grid;
pub use grid::{GridInitError, RasterGrid};


// -------------------------------------------------------------------------------------------------

/// Verdict returned by a [`CandidateSink`] for one candidate triangle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[expect(clippy::exhaustive_enums)]
pub enum CandidateResult {
    /// The candidate was not a hit.
    Miss,
    /// The candidate was a hit; traversal continues (unless the traversal was
    /// started with `break_after_first_hit`).
    Hit,
    /// The candidate was a hit and traversal must stop immediately
    /// (e.g. an opaque occluder was struck).
    HitAndStop,
}

/// Receiver for candidate triangle indices produced by grid traversal.
///
/// `max_distance` is the current upper bound on useful hit distances, in units
/// of the traversal ray's direction vector; the sink may tighten it (never
/// loosen it) to shrink the remaining traversal.
pub trait CandidateSink {
    /// Test one candidate element and report whether it hit.
    fn test(&mut self, element: u32, max_distance: &mut FreeCoordinate) -> CandidateResult;
}

impl<F> CandidateSink for F
where
    F: FnMut(u32, &mut FreeCoordinate) -> CandidateResult,
{
    fn test(&mut self, element: u32, max_distance: &mut FreeCoordinate) -> CandidateResult {
        self(element, max_distance)
    }
}

// -------------------------------------------------------------------------------------------------

/// Capacity of [`AlreadyTested`]. On overflow, further deduplication is dropped
/// (duplicate candidate tests, not incorrect results).
const ALREADY_TESTED_CAPACITY: usize = 512;

/// Per-traversal record of candidate indices already handed to the sink, so that a
/// triangle spanning several cells is tested only once per ray.
#[derive(Debug, Default)]
pub(crate) struct AlreadyTested {
    elements: ArrayVec<u32, ALREADY_TESTED_CAPACITY>,
    overflowed: bool,
}

impl AlreadyTested {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `element` was newly inserted, false if it was already present.
    ///
    /// When the fixed capacity is exhausted, the element is treated as new and an
    /// error is logged once per traversal; correctness degrades to duplicate testing.
    pub fn insert(&mut self, element: u32) -> bool {
        if self.elements.contains(&element) {
            return false;
        }
        if self.elements.try_push(element).is_err() && !self.overflowed {
            self.overflowed = true;
            log::error!(
                "raster traversal exceeded {ALREADY_TESTED_CAPACITY} distinct candidates; \
                 duplicate tests may occur"
            );
        }
        true
    }
}
