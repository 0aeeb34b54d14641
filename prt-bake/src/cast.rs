//! Ray casting against the baked scene: a raster-grid-accelerated
//! triangle-soup caster with two layers of per-vertex caching.
//!
//! The caster answers the transfer engine's only question — "is this sample
//! ray blocked, and by what?" — as cheaply as possible: a fully-visible
//! hemisphere short-circuits to "no", the previous ray's occluder is re-tested
//! before anything else, and only then is the grid traversed.

use std::sync::Arc;

use ordered_float::NotNan;
use prt_bake_base::math::{FreeCoordinate, FreePoint, FreeVector, Ray};
use prt_bake_base::raster::{CandidateResult, GridInitError, RasterGrid};

use crate::mesh::IndexedMesh;

mod triangle;
pub(crate) use triangle::{CastTriangle, TriangleHit};

mod vis;
pub(crate) use vis::VIS_LOOKUP_ANGLE;
use vis::{FullVisCache, RayCache};

#[cfg(test)]
mod tests;

// -------------------------------------------------------------------------------------------------

/// Error from [`RayCaster::setup_geometry()`].
#[derive(Clone, Debug, displaydoc::Display, PartialEq)]
#[non_exhaustive]
pub enum SetupError {
    /// no ray-castable geometry (no meshes, or every face opts out)
    NoGeometry,
    /// could not build the spatial index: {0}
    Grid(GridInitError),
}

impl core::error::Error for SetupError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            SetupError::NoGeometry => None,
            SetupError::Grid(e) => Some(e),
        }
    }
}

impl From<GridInitError> for SetupError {
    fn from(error: GridInitError) -> Self {
        SetupError::Grid(error)
    }
}

// -------------------------------------------------------------------------------------------------

/// One ray/scene intersection as reported to the transfer engine.
#[derive(Clone, Copy, Debug, PartialEq)]
#[non_exhaustive]
pub struct RayResult {
    /// Index of the mesh the hit face belongs to.
    pub mesh_index: u32,
    /// Index of the face within its mesh.
    pub face_index: u32,
    /// Distance from the ray origin (the direction is a unit vector).
    pub distance: FreeCoordinate,
    /// Barycentric weights of the face's second and third corner at the hit.
    pub barycentric: [FreeCoordinate; 2],
    /// Whether the hit face is fully opaque, settling the ray by itself.
    pub fast_processing: bool,
}

// -------------------------------------------------------------------------------------------------

/// Counters describing how a [`RayCaster`] spent its time.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[expect(clippy::exhaustive_structs)]
pub struct CastStats {
    /// Sample rays asked about.
    pub rays: u64,
    /// Rays that required walking the raster grid.
    pub grid_traversals: u64,
    /// Rays checked against the full-visibility cache.
    pub full_vis_queries: u64,
    /// Rays the full-visibility cache answered by itself.
    pub full_vis_successes: u64,
    /// Rays answered by re-testing the previous ray's occluder.
    pub cache_hits: u64,
    /// Vertices whose hemisphere probe found full upper visibility.
    pub fully_visible_vertices: u64,
    /// Vertices probed in total.
    pub probed_vertices: u64,
}

impl CastStats {
    /// Fold another caster's counters (e.g. from a worker thread) into this one.
    pub fn merge(&mut self, other: CastStats) {
        self.rays += other.rays;
        self.grid_traversals += other.grid_traversals;
        self.full_vis_queries += other.full_vis_queries;
        self.full_vis_successes += other.full_vis_successes;
        self.cache_hits += other.cache_hits;
        self.fully_visible_vertices += other.fully_visible_vertices;
        self.probed_vertices += other.probed_vertices;
    }

    /// Fraction of probed vertices with a fully visible upper hemisphere.
    pub fn average_full_visibility(&self) -> f64 {
        if self.probed_vertices == 0 {
            0.0
        } else {
            self.fully_visible_vertices as f64 / self.probed_vertices as f64
        }
    }

    /// Fraction of rays that were unblocked.
    pub fn average_visibility(&self, unblocked_rays: u64) -> f64 {
        if self.rays == 0 {
            0.0
        } else {
            unblocked_rays as f64 / self.rays as f64
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Resolution multiplier for the raster grid; 1.0 targets a constant expected
/// triangle count per cell.
const GRID_MAGNIFIER: FreeCoordinate = 1.0;

/// Relative distance below which two same-mesh hits of one ray are treated as
/// the same surface (a shared triangle edge).
const COINCIDENT_HIT_EPSILON: FreeCoordinate = 1e-9;

/// Caching ray caster over the combined geometry of a bake.
///
/// The grid and triangle list are immutable and shared; cache state and
/// statistics are per-instance, so [`Self::clone_for_thread()`] gives each
/// worker an independent caster over the same scene.
#[derive(Clone, Debug)]
pub struct RayCaster {
    grid: Arc<RasterGrid>,
    triangles: Arc<[CastTriangle]>,
    ray_length: FreeCoordinate,
    bias: FreeCoordinate,
    full_vis: FullVisCache,
    last_ray: RayCache,
    stats: CastStats,
}

impl RayCaster {
    /// Build the caster over every ray-castable face of `meshes`.
    ///
    /// `bias` is the minimum accepted hit distance, pushing hits off the
    /// surface a ray starts on. The maximum ray length is the diagonal of the
    /// meshes' combined bounding box (no two scene points are farther apart).
    pub fn setup_geometry(meshes: &[IndexedMesh], bias: FreeCoordinate) -> Result<Self, SetupError> {
        let mut bounds = None;
        let mut triangles = Vec::new();
        for (mesh_index, mesh) in meshes.iter().enumerate() {
            if let Some(mesh_bounds) = mesh.bounding_box() {
                bounds = Some(match bounds {
                    None => mesh_bounds,
                    Some(b) => mesh_bounds.union(&b),
                });
            }
            for (face_index, face) in mesh.faces().iter().enumerate() {
                if !mesh.consider_for_ray_casting(face) {
                    continue;
                }
                let material = mesh.material(face);
                triangles.push(CastTriangle::new(
                    mesh.face_positions(face),
                    mesh_index as u32,
                    face_index as u32,
                    !material.has_transparency_transfer(),
                    material.single_sided(),
                ));
            }
        }
        let mut bounds = bounds.ok_or(SetupError::NoGeometry)?;
        if triangles.is_empty() {
            return Err(SetupError::NoGeometry);
        }
        let ray_length = bounds.diagonal_length();
        if bounds.is_degenerate() {
            // A perfectly flat scene (a lone ground quad) still needs a volume
            // to index.
            bounds = bounds.expand((ray_length * 0.01).max(1e-3));
        }

        let mut grid = RasterGrid::new(bounds, triangles.len(), GRID_MAGNIFIER)?;
        for triangle in &triangles {
            grid.count_triangle(&triangle.vertices);
        }
        grid.preprocess();
        for (index, triangle) in triangles.iter().enumerate() {
            grid.insert_triangle(&triangle.vertices, index as u32);
        }
        grid.finish();

        log::debug!(
            "ray caster ready: {count} triangles, grid {dims:?}, ray length {ray_length:.3}",
            count = triangles.len(),
            dims = grid.dims(),
        );

        Ok(Self {
            grid: Arc::new(grid),
            triangles: triangles.into(),
            ray_length,
            bias,
            full_vis: FullVisCache::disabled(),
            last_ray: RayCache::default(),
            stats: CastStats::default(),
        })
    }

    /// Longest distance any cast ray is traced.
    #[inline]
    pub fn ray_length(&self) -> FreeCoordinate {
        self.ray_length
    }

    /// An independent caster over the same immutable scene, with empty caches
    /// and zeroed statistics, for use on a worker thread.
    #[must_use]
    pub fn clone_for_thread(&self) -> Self {
        Self {
            grid: Arc::clone(&self.grid),
            triangles: Arc::clone(&self.triangles),
            ray_length: self.ray_length,
            bias: self.bias,
            full_vis: FullVisCache::disabled(),
            last_ray: RayCache::default(),
            stats: CastStats::default(),
        }
    }

    /// Prepare for a new batch of rays from one surface point: drop the
    /// last-ray memo and, if `use_full_vis`, probe both hemispheres around
    /// `normal` from `origin` so later casts can short-circuit.
    pub fn reset_cache(&mut self, origin: FreePoint, normal: FreeVector, use_full_vis: bool) {
        self.last_ray.clear();
        if !use_full_vis {
            self.full_vis = FullVisCache::disabled();
            return;
        }
        let grid = &self.grid;
        let triangles = &self.triangles;
        let (bias, max) = (self.bias, self.ray_length);
        let mut traversals: u64 = 0;
        self.full_vis = FullVisCache::probe(normal, |direction| {
            traversals += 1;
            traverse_any(grid, triangles, origin, direction, bias, max)
        });
        self.stats.grid_traversals += traversals;
        self.stats.probed_vertices += 1;
        if self.full_vis.upper_hemisphere_visible() {
            self.stats.fully_visible_vertices += 1;
        }
    }

    /// Cast one ray and return a blocking hit, or [`None`] if nothing blocks it.
    ///
    /// `direction` must be a unit vector. When the last-ray memo answers, the
    /// returned hit is the memoized occluder, which blocks the ray but is not
    /// necessarily the nearest of all intersections; whether *any* hit exists
    /// always agrees with a full traversal.
    pub fn cast(&mut self, origin: FreePoint, direction: FreeVector) -> Option<RayResult> {
        self.stats.rays += 1;
        if self.full_vis.enabled() {
            self.stats.full_vis_queries += 1;
            if self.full_vis.is_fully_visible(direction) {
                self.stats.full_vis_successes += 1;
                return None;
            }
        }

        // Re-test the previous ray's occluder set before touching the grid.
        let mut memoized: Option<(u32, TriangleHit)> = None;
        for &index in self.last_ray.candidates() {
            let triangle = &self.triangles[index as usize];
            if let Some(hit) = triangle.intersect(origin, direction, self.bias, self.ray_length) {
                match memoized {
                    Some((_, best)) if best.distance <= hit.distance => {}
                    _ => memoized = Some((index, hit)),
                }
            }
        }
        if let Some((index, hit)) = memoized {
            self.stats.cache_hits += 1;
            return Some(self.to_result(index, hit));
        }
        self.last_ray.clear();

        self.stats.grid_traversals += 1;
        let found = traverse_closest(
            &self.grid,
            &self.triangles,
            origin,
            direction,
            self.bias,
            self.ray_length,
        );
        found.map(|(index, hit)| {
            self.last_ray.record(index);
            self.to_result(index, hit)
        })
    }

    /// Cast one ray and collect every intersection into `out`, sorted by
    /// ascending distance. Returns whether any of them is opaque.
    ///
    /// Bypasses the last-ray memo (which only knows about single occluders)
    /// but still honors the full-visibility cache.
    pub fn cast_all(
        &mut self,
        origin: FreePoint,
        direction: FreeVector,
        out: &mut Vec<RayResult>,
    ) -> bool {
        out.clear();
        self.stats.rays += 1;
        if self.full_vis.enabled() {
            self.stats.full_vis_queries += 1;
            if self.full_vis.is_fully_visible(direction) {
                self.stats.full_vis_successes += 1;
                return false;
            }
        }

        self.stats.grid_traversals += 1;
        let ray = Ray::new(origin, direction);
        let mut max_distance = self.ray_length;
        let mut hits: Vec<(u32, TriangleHit)> = Vec::new();
        let triangles = &self.triangles;
        let (bias, ray_length) = (self.bias, self.ray_length);
        self.grid.gather_ray_hits(
            ray,
            &mut max_distance,
            false,
            &mut |index: u32, _max: &mut FreeCoordinate| {
                match triangles[index as usize].intersect(origin, direction, bias, ray_length) {
                    Some(hit) => {
                        hits.push((index, hit));
                        CandidateResult::Hit
                    }
                    None => CandidateResult::Miss,
                }
            },
        );
        hits.sort_by_key(|&(_, hit)| NotNan::new(hit.distance).ok());
        let mut any_opaque = false;
        for (index, hit) in hits {
            let result = self.to_result(index, hit);
            any_opaque |= result.fast_processing;
            out.push(result);
        }
        // A ray through the shared edge of two faces of one mesh strikes one
        // surface, not two; keep a single hit so transmission is applied once.
        out.dedup_by(|b, a| {
            b.mesh_index == a.mesh_index
                && (b.distance - a.distance).abs()
                    <= COINCIDENT_HIT_EPSILON * (1.0 + a.distance)
        });
        any_opaque
    }

    /// Counters accumulated since construction (or the last [`Self::take_stats()`]).
    #[inline]
    pub fn stats(&self) -> &CastStats {
        &self.stats
    }

    /// Return and reset the counters.
    pub fn take_stats(&mut self) -> CastStats {
        core::mem::take(&mut self.stats)
    }

    fn to_result(&self, index: u32, hit: TriangleHit) -> RayResult {
        let triangle = &self.triangles[index as usize];
        RayResult {
            mesh_index: triangle.mesh_index,
            face_index: triangle.face_index,
            distance: hit.distance,
            barycentric: hit.barycentric,
            fast_processing: triangle.fast_processing,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Walk the grid and return the nearest intersection within
/// `[bias, max_distance)`, by triangle index.
fn traverse_closest(
    grid: &RasterGrid,
    triangles: &[CastTriangle],
    origin: FreePoint,
    direction: FreeVector,
    bias: FreeCoordinate,
    max_distance: FreeCoordinate,
) -> Option<(u32, TriangleHit)> {
    let ray = Ray::new(origin, direction);
    let mut max_distance = max_distance;
    let mut best: Option<(u32, TriangleHit)> = None;
    grid.gather_ray_hits(
        ray,
        &mut max_distance,
        false,
        &mut |index: u32, max: &mut FreeCoordinate| {
            match triangles[index as usize].intersect(origin, direction, bias, *max) {
                Some(hit) => {
                    // Nothing farther can be the closest hit; shrink the walk.
                    *max = hit.distance;
                    best = Some((index, hit));
                    CandidateResult::Hit
                }
                None => CandidateResult::Miss,
            }
        },
    );
    best
}

/// Walk the grid only until it is known whether anything blocks the ray within
/// `[bias, max_distance)`.
///
/// An opaque hit stops the walk mid-cell; a transmitting hit stops it at the
/// end of its cell.
fn traverse_any(
    grid: &RasterGrid,
    triangles: &[CastTriangle],
    origin: FreePoint,
    direction: FreeVector,
    bias: FreeCoordinate,
    max_distance: FreeCoordinate,
) -> bool {
    let ray = Ray::new(origin, direction);
    let mut max_distance = max_distance;
    grid.gather_ray_hits(
        ray,
        &mut max_distance,
        true,
        &mut |index: u32, max: &mut FreeCoordinate| {
            let triangle = &triangles[index as usize];
            match triangle.intersect(origin, direction, bias, *max) {
                Some(_) if triangle.fast_processing => CandidateResult::HitAndStop,
                Some(_) => CandidateResult::Hit,
                None => CandidateResult::Miss,
            }
        },
    )
}
