use euclid::{Point3D, Vector3D, vec3};

use crate::math::{Aab, Axis, FreeCoordinate, FreePoint, GridCoordinate, GridPoint, Ray, signum_101};
use crate::raster::table::{RasterTable, rasterize_triangle};
use crate::raster::{AlreadyTested, CandidateResult, CandidateSink};

// -------------------------------------------------------------------------------------------------

/// Error from [`RasterGrid::new()`]. Construction failure is fatal to the bake run;
/// there is no recovery or partial grid.
#[derive(Clone, Debug, displaydoc::Display, PartialEq)]
#[non_exhaustive]
pub enum GridInitError {
    /// cannot index a bounding box of zero volume: {bounds:?}
    DegenerateBounds {
        /// The offending box.
        bounds: Aab,
    },
    /// cannot index zero elements
    Empty,
}

impl core::error::Error for GridInitError {}

// -------------------------------------------------------------------------------------------------

/// Unit type for traversal parameter values (distance in multiples of the ray direction).
enum Tc {}

/// Spatial raster index over a static triangle soup.
///
/// An integer grid spanning the (slightly expanded) bounding box of the scene.
/// Triangles are inserted in two phases — count, [`Self::preprocess()`], fill —
/// into two 2D projection tables (ZX and XY); see the module documentation.
///
/// After [`Self::finish()`], the grid is immutable and may be shared freely
/// between threads.
#[derive(Clone, Debug)]
pub struct RasterGrid {
    /// Scene bounds expanded by a border so triangles on the hull are not clipped.
    bounds: Aab,
    /// Cells per axis, each at least 3.
    dims: [u32; 3],
    /// Reciprocal of the world-space cell size per axis.
    inv_cell: Vector3D<FreeCoordinate, euclid::UnknownUnit>,
    /// Projection along Y; indexed by (z, x).
    table_zx: RasterTable,
    /// Projection along Z; indexed by (x, y).
    table_xy: RasterTable,
}

impl RasterGrid {
    /// Minimum cell count per axis.
    const MIN_DIM: u32 = 3;

    /// Size the grid for `element_count` triangles within `bounds`.
    ///
    /// `magnifier` scales the overall grid resolution; the per-axis dimensions are
    /// `floor(sqrt(element_count) * magnifier)` weighted by the box's aspect ratio,
    /// so the expected number of triangles per cell is roughly constant.
    pub fn new(
        bounds: Aab,
        element_count: usize,
        magnifier: FreeCoordinate,
    ) -> Result<Self, GridInitError> {
        if element_count == 0 {
            return Err(GridInitError::Empty);
        }
        if bounds.is_degenerate() {
            return Err(GridInitError::DegenerateBounds { bounds });
        }

        // Expand so triangles lying exactly on the hull don't rasterize out of range.
        let border = (bounds.diagonal_length() * 0.005).max(1e-6);
        let bounds = bounds.expand(border);

        let base = (element_count as FreeCoordinate).sqrt() * magnifier;
        let mean_extent = (bounds.size(Axis::X) + bounds.size(Axis::Y) + bounds.size(Axis::Z)) / 3.;
        let mut dims = [0u32; 3];
        for axis in Axis::ALL {
            let weighted = (base * bounds.size(axis) / mean_extent).floor();
            dims[axis] = (weighted as u32).max(Self::MIN_DIM);
        }

        let inv_cell = vec3(
            FreeCoordinate::from(dims[0]) / bounds.size(Axis::X),
            FreeCoordinate::from(dims[1]) / bounds.size(Axis::Y),
            FreeCoordinate::from(dims[2]) / bounds.size(Axis::Z),
        );

        Ok(Self {
            bounds,
            dims,
            inv_cell,
            table_zx: RasterTable::new(dims[2], dims[0]),
            table_xy: RasterTable::new(dims[0], dims[1]),
        })
    }

    /// The expanded bounds actually covered by the grid.
    #[inline]
    pub fn bounds(&self) -> Aab {
        self.bounds
    }

    /// Cells per axis.
    #[inline]
    pub fn dims(&self) -> [u32; 3] {
        self.dims
    }

    /// World point → continuous cell-unit coordinates (cells are unit cubes).
    #[inline]
    fn to_local(&self, point: FreePoint) -> Point3D<FreeCoordinate, euclid::UnknownUnit> {
        let rel = point - self.bounds.lower_bounds();
        Point3D::new(
            rel.x * self.inv_cell.x,
            rel.y * self.inv_cell.y,
            rel.z * self.inv_cell.z,
        )
    }

    /// The cell containing `point`, or [`None`] if outside the grid.
    #[inline]
    pub fn cell_containing(&self, point: FreePoint) -> Option<GridPoint> {
        let local = self.to_local(point);
        let mut cell = GridPoint::new(0, 0, 0);
        for axis in Axis::ALL {
            let c = local[axis].floor();
            if c < 0.0 || c >= FreeCoordinate::from(self.dims[axis]) {
                return None;
            }
            cell[axis] = c as GridCoordinate;
        }
        Some(cell)
    }

    fn project<const U: usize, const V: usize>(
        &self,
        triangle: &[FreePoint; 3],
    ) -> [[FreeCoordinate; 2]; 3] {
        triangle.map(|p| {
            let local = self.to_local(p);
            [local.to_array()[U], local.to_array()[V]]
        })
    }

    /// Phase 1 of insertion: tally the cells the triangle's projections touch.
    ///
    /// Must be called exactly once per triangle before [`Self::preprocess()`],
    /// in the same (ascending-index) order as the later [`Self::insert_triangle()`] calls.
    pub fn count_triangle(&mut self, triangle: &[FreePoint; 3]) {
        let zx = self.project::<2, 0>(triangle);
        rasterize_triangle(&zx, self.dims[2], self.dims[0], |u, v| {
            self.table_zx.count(u, v);
        });
        let xy = self.project::<0, 1>(triangle);
        rasterize_triangle(&xy, self.dims[0], self.dims[1], |u, v| {
            self.table_xy.count(u, v);
        });
    }

    /// Consolidate phase-1 counts into pre-sized index pools.
    pub fn preprocess(&mut self) {
        self.table_zx.preprocess();
        self.table_xy.preprocess();
    }

    /// Phase 2 of insertion: write `index` into every cell the triangle touches.
    pub fn insert_triangle(&mut self, triangle: &[FreePoint; 3], index: u32) {
        let zx = self.project::<2, 0>(triangle);
        rasterize_triangle(&zx, self.dims[2], self.dims[0], |u, v| {
            self.table_zx.fill(u, v, index);
        });
        let xy = self.project::<0, 1>(triangle);
        rasterize_triangle(&xy, self.dims[0], self.dims[1], |u, v| {
            self.table_xy.fill(u, v, index);
        });
    }

    /// Complete the build; the grid is immutable afterwards.
    pub fn finish(&mut self) {
        self.table_zx.finish();
        self.table_xy.finish();
    }

    /// Candidate triangles for one cell: the merge intersection of the cell's two
    /// per-plane lists (both strictly ascending).
    ///
    /// Candidates already present in `tested` are skipped. Returns the strongest
    /// verdict any candidate produced.
    pub(crate) fn gather_at(
        &self,
        cell: GridPoint,
        tested: &mut AlreadyTested,
        max_distance: &mut FreeCoordinate,
        sink: &mut impl CandidateSink,
    ) -> CandidateResult {
        let list_a = self.table_zx.cell(cell.z as u32, cell.x as u32);
        let list_b = self.table_xy.cell(cell.x as u32, cell.y as u32);

        let mut outcome = CandidateResult::Miss;
        let (mut ia, mut ib) = (0, 0);
        while ia < list_a.len() && ib < list_b.len() {
            let (a, b) = (list_a[ia], list_b[ib]);
            if a < b {
                ia += 1;
            } else if b < a {
                ib += 1;
            } else {
                ia += 1;
                ib += 1;
                if tested.insert(a) {
                    match sink.test(a, max_distance) {
                        CandidateResult::Miss => {}
                        CandidateResult::Hit => outcome = CandidateResult::Hit,
                        CandidateResult::HitAndStop => return CandidateResult::HitAndStop,
                    }
                }
            }
        }
        outcome
    }

    /// Walk the grid cells pierced by `ray` (3D DDA), handing each cell's candidate
    /// triangles to `sink` at most once per traversal.
    ///
    /// `max_distance` bounds the useful hit distance in units of `ray.direction`;
    /// when the sink tightens it, the traversal's exit boundary shrinks accordingly.
    /// If `break_after_first_hit`, the walk stops at the first cell in which any
    /// candidate reports a hit. Returns whether any hit was reported.
    ///
    /// A zero direction component simply never steps on that axis; degenerate
    /// directions are not an error.
    pub fn gather_ray_hits(
        &self,
        ray: Ray,
        max_distance: &mut FreeCoordinate,
        break_after_first_hit: bool,
        sink: &mut impl CandidateSink,
    ) -> bool {
        let local_origin = self.to_local(ray.origin);
        let local_dir: Vector3D<FreeCoordinate, euclid::UnknownUnit> = vec3(
            ray.direction.x * self.inv_cell.x,
            ray.direction.y * self.inv_cell.y,
            ray.direction.z * self.inv_cell.z,
        );

        // Find the traversal start: the ray origin if inside the grid, else the
        // entry intersection with the grid's box.
        let mut t_start: FreeCoordinate = 0.0;
        if !self.local_in_bounds(local_origin) {
            let Some((t_enter, t_exit)) = self.local_slab_intersect(local_origin, local_dir) else {
                return false;
            };
            if t_exit < 0.0 || t_enter > *max_distance {
                return false;
            }
            t_start = t_enter.max(0.0) + 1e-9;
        }

        let start = local_origin + local_dir * t_start;
        let mut cube = GridPoint::new(0, 0, 0);
        for axis in Axis::ALL {
            let clamped = start[axis]
                .floor()
                .clamp(0.0, FreeCoordinate::from(self.dims[axis] - 1));
            cube[axis] = clamped as GridCoordinate;
        }

        let step: Vector3D<GridCoordinate, euclid::UnknownUnit> = vec3(
            signum_101(local_dir.x),
            signum_101(local_dir.y),
            signum_101(local_dir.z),
        );
        let t_delta: Vector3D<FreeCoordinate, Tc> = vec3(
            local_dir.x.abs().recip(),
            local_dir.y.abs().recip(),
            local_dir.z.abs().recip(),
        );
        let mut t_max: Vector3D<FreeCoordinate, Tc> = vec3(
            t_start + scale_to_integer_step(start.x, local_dir.x),
            t_start + scale_to_integer_step(start.y, local_dir.y),
            t_start + scale_to_integer_step(start.z, local_dir.z),
        );

        let mut tested = AlreadyTested::new();
        let mut any_hit = false;
        loop {
            match self.gather_at(cube, &mut tested, max_distance, sink) {
                CandidateResult::Miss => {}
                CandidateResult::Hit => {
                    any_hit = true;
                    if break_after_first_hit {
                        return true;
                    }
                }
                CandidateResult::HitAndStop => return true,
            }

            // Choose the axis whose cell boundary is crossed soonest.
            let axis: Axis = if t_max.x < t_max.y {
                if t_max.x < t_max.z { Axis::X } else { Axis::Z }
            } else if t_max.y < t_max.z {
                Axis::Y
            } else {
                Axis::Z
            };

            if step[axis] == 0 || !t_max[axis].is_finite() {
                // Ray points in no steppable direction (or a numeric problem);
                // no further cells can be reached.
                break;
            }
            if t_max[axis] > *max_distance {
                // All remaining cells begin beyond the useful distance.
                break;
            }

            cube[axis] += step[axis];
            if cube[axis] < 0 || cube[axis] >= self.dims[axis] as GridCoordinate {
                break;
            }
            t_max[axis] += t_delta[axis];
        }
        any_hit
    }

    #[inline]
    fn local_in_bounds(&self, local: Point3D<FreeCoordinate, euclid::UnknownUnit>) -> bool {
        Axis::ALL
            .into_iter()
            .all(|axis| local[axis] >= 0.0 && local[axis] < FreeCoordinate::from(self.dims[axis]))
    }

    /// Slab intersection of a local-space ray with the whole grid box `[0, dims]³`.
    fn local_slab_intersect(
        &self,
        origin: Point3D<FreeCoordinate, euclid::UnknownUnit>,
        dir: Vector3D<FreeCoordinate, euclid::UnknownUnit>,
    ) -> Option<(FreeCoordinate, FreeCoordinate)> {
        let mut t_enter = FreeCoordinate::NEG_INFINITY;
        let mut t_exit = FreeCoordinate::INFINITY;
        for axis in Axis::ALL {
            let extent = FreeCoordinate::from(self.dims[axis]);
            if dir[axis] == 0.0 {
                if origin[axis] < 0.0 || origin[axis] > extent {
                    return None;
                }
            } else {
                let t0 = (0.0 - origin[axis]) / dir[axis];
                let t1 = (extent - origin[axis]) / dir[axis];
                let (near, far) = if t0 < t1 { (t0, t1) } else { (t1, t0) };
                t_enter = t_enter.max(near);
                t_exit = t_exit.min(far);
                if t_enter > t_exit {
                    return None;
                }
            }
        }
        Some((t_enter, t_exit))
    }
}

// -------------------------------------------------------------------------------------------------

/// Find the smallest positive `t` such that `s + t * ds` is an integer.
///
/// If `ds` is zero, returns positive infinity; this is a useful answer because
/// it means that the less-than comparisons in the traversal algorithm will never
/// pick the corresponding axis. If any input is NaN, returns NaN.
fn scale_to_integer_step(mut s: FreeCoordinate, mut ds: FreeCoordinate) -> FreeCoordinate {
    if ds == 0.0 && !s.is_nan() {
        // Explicitly handle zero case.
        // This almost could be implicit, but it is possible for the below division to
        // return NaN instead of +inf, in the case where (1.0 - s) rounds down to zero.
        return FreeCoordinate::INFINITY;
    } else if ds < 0.0 {
        // Simplify to positive case only.
        // Note that the previous condition eliminated the case of negative zero.
        s = -s;
        ds = -ds;
    }

    let s = s.rem_euclid(1.0);
    // problem is now s + t * ds = 1
    let result = (1.0 - s) / ds;

    debug_assert!(
        result.signum() > 0.0 || ds.is_nan() || s.is_nan(),
        "scale_to_integer_step failed ({s}, {ds}) => {result}"
    );
    result
}
