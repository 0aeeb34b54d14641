//! The transfer passes: Monte-Carlo integration of per-vertex visibility into
//! spherical-harmonics coefficients.
//!
//! [`InterreflectionTransfer::process()`] runs the direct pass over every
//! unique vertex of every mesh, casting one ray per sphere sample through a
//! cached [`RayCaster`] and accumulating basis-weighted contributions through
//! a [`TransferConfigurator`]. The blocked-ray records it keeps are the input
//! a future interreflection pass would consume.

use core::f64::consts::{PI, TAU};

use hashbrown::HashSet;
use prt_bake_base::math::{FreeCoordinate, FreePoint, FreeVector, PolarCoord};

use crate::cast::{CastStats, RayCaster, RayResult, SetupError, VIS_LOOKUP_ANGLE};
use crate::material::{Intensity, MaterialKind};
use crate::mesh::{Face, IndexedMesh, TangentFrame};
use crate::sample::{HandleOverflow, Sample, SampleGenerator, SampleHandle};
use crate::sh::{CoeffList, ShDescriptor};

mod configurator;
pub use configurator::{DefaultTransferConfigurator, TransferConfigurator};

#[cfg(test)]
mod tests;

// -------------------------------------------------------------------------------------------------

/// Samples closer to the horizon than this cosine are treated as below it for
/// upper-hemisphere materials.
const SAMPLE_COS_THRESHOLD: FreeCoordinate = 1e-6;

/// Azimuthal resolution of the border-visibility lookup ring.
const BORDER_BINS: usize = 256;

/// How far below the horizon lower-hemisphere samples still receive border
/// visibility, as a fraction of the lower quarter sphere: 30° of 90°.
const LOWER_BAND_FRACTION: FreeCoordinate = 30.0 / 90.0;

// -------------------------------------------------------------------------------------------------

/// Error from [`InterreflectionTransfer::process()`].
#[derive(Clone, Debug, displaydoc::Display, PartialEq)]
#[non_exhaustive]
pub enum TransferError {
    /// inconsistent transfer parameters: {reason}
    InconsistentParameters {
        #[allow(missing_docs)]
        reason: &'static str,
    },
    /// geometry setup failed: {0}
    Setup(SetupError),
    /// sample generation failed: {0}
    Samples(HandleOverflow),
}

impl core::error::Error for TransferError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            TransferError::InconsistentParameters { .. } => None,
            TransferError::Setup(e) => Some(e),
            TransferError::Samples(e) => Some(e),
        }
    }
}

impl From<SetupError> for TransferError {
    fn from(error: SetupError) -> Self {
        TransferError::Setup(error)
    }
}

impl From<HandleOverflow> for TransferError {
    fn from(error: HandleOverflow) -> Self {
        TransferError::Samples(error)
    }
}

// -------------------------------------------------------------------------------------------------

/// Tunable inputs of a transfer run.
#[derive(Clone, Copy, Debug, PartialEq)]
#[expect(clippy::exhaustive_structs)]
pub struct TransferParameters {
    /// Sphere samples (and hence rays) cast per vertex.
    pub sample_count_per_vertex: usize,
    /// Worker threads for the direct pass; `1` forces single-threaded
    /// processing even with the `auto-threads` feature enabled.
    pub ray_casting_threads: usize,
    /// Minimum accepted hit distance, pushing hits off the surface a ray
    /// starts on.
    pub ray_tracing_bias: FreeCoordinate,
    /// Enable the border-visibility treatment of below-horizon directions so
    /// bump-mapped normals bending below the vertex horizon still get
    /// plausible visibility.
    pub bump_granularity: bool,
    /// Look at what blocked a ray instead of discarding it, so alpha-textured
    /// occluders transmit scaled light.
    pub support_transparency: bool,
    /// Lower bound on directional visibility, `0.0..=1.0`; blocked rays still
    /// contribute this fraction. Zero disables the floor.
    pub min_direct_bump_coeff_visibility: f32,
    /// Visibility factor for border lookups fired toward the ground
    /// (world-space z < 0), standing in for light blocked by whatever the
    /// object rests on, `0.0..=1.0`; `1.0` is neutral.
    pub ground_plane_block_value: f32,
}

impl Default for TransferParameters {
    fn default() -> Self {
        Self {
            sample_count_per_vertex: 400,
            ray_casting_threads: 1,
            ray_tracing_bias: 1e-4,
            bump_granularity: false,
            support_transparency: false,
            min_direct_bump_coeff_visibility: 0.0,
            ground_plane_block_value: 1.0,
        }
    }
}

impl TransferParameters {
    /// Fail fast on parameter combinations that cannot produce a meaningful
    /// bake.
    pub fn check_for_consistency(&self) -> Result<(), TransferError> {
        let fail = |reason| Err(TransferError::InconsistentParameters { reason });
        if self.sample_count_per_vertex == 0 {
            return fail("sample_count_per_vertex must be nonzero");
        }
        if self.ray_casting_threads == 0 {
            return fail("ray_casting_threads must be nonzero");
        }
        if !self.ray_tracing_bias.is_finite() || self.ray_tracing_bias < 0.0 {
            return fail("ray_tracing_bias must be finite and nonnegative");
        }
        if !(0.0..=1.0).contains(&self.min_direct_bump_coeff_visibility) {
            return fail("min_direct_bump_coeff_visibility must lie in [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.ground_plane_block_value) {
            return fail("ground_plane_block_value must lie in [0, 1]");
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

/// One blocked sample ray, recorded for the interreflection pass: which sample
/// was blocked and by which face.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct RayCacheEntry {
    /// Handle of the blocked sample.
    pub sample_handle: SampleHandle,
    /// Face the ray hit.
    pub face_index: u32,
    /// Mesh that face belongs to.
    pub mesh_index: u32,
}

// -------------------------------------------------------------------------------------------------

/// Progress counters pushed to a [`ProgressObserver`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct TransferStatus {
    /// Index of the mesh currently being processed.
    pub mesh_index: usize,
    /// Total meshes in this run.
    pub mesh_count: usize,
    /// Unique vertices finished so far, across all meshes.
    pub vertices_processed: usize,
    /// Unique vertices this run will process in total.
    pub vertex_count: usize,
    /// Pass number; `0` is the direct pass.
    pub pass: usize,
    /// Worker threads currently active.
    pub running_threads: usize,
}

/// Receives push notifications while a transfer runs.
pub trait ProgressObserver {
    /// One vertex finished.
    fn vertex_processed(&mut self, status: &TransferStatus) {
        let _ = status;
    }
    /// One mesh finished.
    fn mesh_processed(&mut self, status: &TransferStatus) {
        let _ = status;
    }
}

/// The no-op observer.
impl ProgressObserver for () {}

/// Observer reporting through the [`log`] crate: per-mesh at info level,
/// per-vertex at trace level.
#[derive(Clone, Copy, Debug, Default)]
#[non_exhaustive]
pub struct LogProgressObserver;

impl ProgressObserver for LogProgressObserver {
    fn vertex_processed(&mut self, status: &TransferStatus) {
        log::trace!(
            "vertex {}/{} (mesh {}/{})",
            status.vertices_processed,
            status.vertex_count,
            status.mesh_index + 1,
            status.mesh_count,
        );
    }

    fn mesh_processed(&mut self, status: &TransferStatus) {
        log::info!(
            "mesh {}/{} done, {}/{} vertices",
            status.mesh_index + 1,
            status.mesh_count,
            status.vertices_processed,
            status.vertex_count,
        );
    }
}

// -------------------------------------------------------------------------------------------------

/// Everything a transfer run needs besides the meshes: samples, parameters,
/// and the shading policy. Constructed explicitly by the caller and passed in,
/// so concurrent bakes with different setups don't interfere.
#[derive(Debug)]
pub struct BakeSession {
    generator: SampleGenerator,
    descriptor: ShDescriptor,
    parameters: TransferParameters,
    configurator: Box<dyn TransferConfigurator>,
}

impl BakeSession {
    #[allow(missing_docs)]
    pub fn new(
        generator: SampleGenerator,
        descriptor: ShDescriptor,
        parameters: TransferParameters,
        configurator: Box<dyn TransferConfigurator>,
    ) -> Self {
        Self {
            generator,
            descriptor,
            parameters,
            configurator,
        }
    }

    #[allow(missing_docs)]
    pub fn parameters(&self) -> &TransferParameters {
        &self.parameters
    }

    /// The sample set of the last run, e.g. for resolving recorded
    /// [`RayCacheEntry`] handles.
    pub fn generator(&self) -> &SampleGenerator {
        &self.generator
    }

    #[allow(missing_docs)]
    pub fn descriptor(&self) -> ShDescriptor {
        self.descriptor
    }
}

// -------------------------------------------------------------------------------------------------

/// The transfer engine. Owns the scratch and the records that persist between
/// passes; one instance per bake.
#[derive(Debug, Default)]
pub struct InterreflectionTransfer {
    status: TransferStatus,
    stats: CastStats,
    unblocked_rays: u64,
    /// Per mesh: every blocked sample ray of the direct pass, for the
    /// interreflection pass.
    ray_cache_entries: Vec<Vec<RayCacheEntry>>,
    /// Per mesh, per vertex: how many samples fell below the horizon.
    lower_hemisphere_counts: Vec<Vec<u32>>,
    /// Tangent-space directions of the border-visibility ring, built lazily on
    /// the first run that needs them.
    vis_lookup_directions: Option<Vec<FreeVector>>,
}

impl InterreflectionTransfer {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the direct transfer pass over `meshes`, returning one coefficient
    /// list per vertex position per mesh.
    ///
    /// Vertices only referenced by faces whose material opts out of transfer
    /// keep all-zero coefficients.
    pub fn process(
        &mut self,
        session: &mut BakeSession,
        meshes: &[IndexedMesh],
        observer: &mut dyn ProgressObserver,
    ) -> Result<Vec<Vec<CoeffList>>, TransferError> {
        session.parameters.check_for_consistency()?;
        let caster = RayCaster::setup_geometry(meshes, session.parameters.ray_tracing_bias)?;

        self.status = TransferStatus {
            mesh_count: meshes.len(),
            vertex_count: meshes.iter().map(|m| m.positions().len()).sum(),
            ..TransferStatus::default()
        };
        self.stats = CastStats::default();
        self.unblocked_rays = 0;

        session
            .generator
            .restart(session.parameters.sample_count_per_vertex, session.descriptor)?;

        if session.parameters.bump_granularity && self.vis_lookup_directions.is_none() {
            self.vis_lookup_directions = Some(border_lookup_directions());
        }

        // Pre-size every per-mesh container before any work happens.
        let mut outputs: Vec<Vec<CoeffList>> = meshes
            .iter()
            .map(|m| vec![CoeffList::zero(session.descriptor); m.positions().len()])
            .collect();
        self.ray_cache_entries = meshes.iter().map(|_| Vec::new()).collect();
        self.lower_hemisphere_counts = meshes
            .iter()
            .map(|m| vec![0; m.positions().len()])
            .collect();

        for (mesh_index, mesh) in meshes.iter().enumerate() {
            self.status.mesh_index = mesh_index;
            let tasks = collect_vertex_tasks(mesh);
            let context = PassContext {
                meshes,
                mesh,
                samples: session.generator.samples(),
                parameters: &session.parameters,
                descriptor: session.descriptor,
                vis_lookup_directions: self.vis_lookup_directions.as_deref(),
            };

            let (threads_used, outcomes) =
                run_tasks(&tasks, &context, &caster, &*session.configurator);
            self.status.running_threads = threads_used;

            let mesh_outputs = &mut outputs[mesh_index];
            for outcome in outcomes {
                mesh_outputs[outcome.vertex as usize] = outcome.coefficients;
                self.lower_hemisphere_counts[mesh_index][outcome.vertex as usize] =
                    outcome.lower_hemisphere_count;
                self.ray_cache_entries[mesh_index].extend(outcome.entries);
                self.stats.merge(outcome.stats);
                self.unblocked_rays += outcome.unblocked_rays;
                self.status.vertices_processed += 1;
                observer.vertex_processed(&self.status);
            }
            self.status.running_threads = 0;
            observer.mesh_processed(&self.status);
        }

        log::info!(
            "direct pass done: {vertices} vertices, {rays} rays, \
             average full visibility {full_vis:.3}, average visibility {vis:.3}",
            vertices = self.status.vertices_processed,
            rays = self.stats.rays,
            full_vis = self.stats.average_full_visibility(),
            vis = self.stats.average_visibility(self.unblocked_rays),
        );
        Ok(outputs)
    }

    /// Caster statistics accumulated over the last run.
    pub fn stats(&self) -> &CastStats {
        &self.stats
    }

    /// Progress counters of the last (or running) pass.
    pub fn status(&self) -> &TransferStatus {
        &self.status
    }

    /// Per mesh: the blocked sample rays recorded by the direct pass.
    pub fn ray_cache_entries(&self) -> &[Vec<RayCacheEntry>] {
        &self.ray_cache_entries
    }

    /// Per mesh, per vertex: samples that fell below the horizon.
    pub fn lower_hemisphere_counts(&self) -> &[Vec<u32>] {
        &self.lower_hemisphere_counts
    }
}

/// Run one mesh's vertex tasks, in parallel when possible, returning how many
/// threads were used and the outcomes in task order.
#[cfg(feature = "auto-threads")]
fn run_tasks(
    tasks: &[VertexTask],
    context: &PassContext<'_>,
    caster: &RayCaster,
    configurator: &dyn TransferConfigurator,
) -> (usize, Vec<VertexOutcome>) {
    use rayon::iter::ParallelIterator as _;
    use rayon::slice::ParallelSlice as _;

    let threads = context.parameters.ray_casting_threads;
    if threads == 1 || tasks.len() <= 1 {
        return run_tasks_sequential(tasks, context, caster, configurator);
    }
    let chunk_size = tasks.len().div_ceil(threads);
    let outcomes = tasks
        .par_chunks(chunk_size)
        .map(|chunk| {
            let mut caster = caster.clone_for_thread();
            let configurator = configurator.clone_box();
            chunk
                .iter()
                .map(|task| process_vertex(context, task, &mut caster, &*configurator))
                .collect::<Vec<VertexOutcome>>()
        })
        .flatten()
        .collect();
    // The pool may be narrower than requested; report what actually ran.
    (threads.min(rayon::current_num_threads()), outcomes)
}

#[cfg(not(feature = "auto-threads"))]
fn run_tasks(
    tasks: &[VertexTask],
    context: &PassContext<'_>,
    caster: &RayCaster,
    configurator: &dyn TransferConfigurator,
) -> (usize, Vec<VertexOutcome>) {
    run_tasks_sequential(tasks, context, caster, configurator)
}

fn run_tasks_sequential(
    tasks: &[VertexTask],
    context: &PassContext<'_>,
    caster: &RayCaster,
    configurator: &dyn TransferConfigurator,
) -> (usize, Vec<VertexOutcome>) {
    let mut caster = caster.clone_for_thread();
    let outcomes = tasks
        .iter()
        .map(|task| process_vertex(context, task, &mut caster, configurator))
        .collect();
    (1, outcomes)
}

// -------------------------------------------------------------------------------------------------

/// Shared read-only inputs of one mesh's direct pass.
struct PassContext<'a> {
    meshes: &'a [IndexedMesh],
    mesh: &'a IndexedMesh,
    samples: &'a [Sample],
    parameters: &'a TransferParameters,
    descriptor: ShDescriptor,
    vis_lookup_directions: Option<&'a [FreeVector]>,
}

/// One unique vertex to integrate, with everything resolved up front.
#[derive(Clone, Copy, Debug)]
struct VertexTask {
    vertex: u32,
    position: FreePoint,
    normal: FreeVector,
    frame: TangentFrame,
    intensity: Intensity,
    kind: MaterialKind,
}

/// What one vertex's integration produced, merged on the main thread.
struct VertexOutcome {
    vertex: u32,
    coefficients: CoeffList,
    entries: Vec<RayCacheEntry>,
    lower_hemisphere_count: u32,
    unblocked_rays: u64,
    stats: CastStats,
}

/// Deduplicate the mesh's vertices across faces, skipping faces whose material
/// opts out of transfer. The first face referencing a vertex supplies its
/// normal and material.
fn collect_vertex_tasks(mesh: &IndexedMesh) -> Vec<VertexTask> {
    let mut visited: HashSet<u32> = HashSet::with_capacity(mesh.positions().len());
    let mut tasks = Vec::new();
    for face in mesh.faces() {
        if !mesh.compute_sh_coeffs(face) {
            continue;
        }
        let material = mesh.material(face);
        for corner in 0..3 {
            let vertex = face.positions[corner];
            if !visited.insert(vertex) {
                continue;
            }
            let texcoord = mesh.texcoords()[face.texcoords[corner] as usize];
            tasks.push(VertexTask {
                vertex,
                position: mesh.positions()[vertex as usize],
                normal: mesh.normals()[face.normals[corner] as usize],
                frame: mesh.tangent_frames()[vertex as usize],
                intensity: material.diffuse_intensity(texcoord),
                kind: material.kind(),
            });
        }
    }
    tasks
}

// -------------------------------------------------------------------------------------------------

/// Integrate one vertex: cast every sample ray, accumulate contributions, and
/// normalize.
fn process_vertex(
    context: &PassContext<'_>,
    task: &VertexTask,
    caster: &mut RayCaster,
    configurator: &dyn TransferConfigurator,
) -> VertexOutcome {
    let parameters = context.parameters;
    let upper_only = configurator.process_only_upper_hemisphere(task.kind);
    // The floor is part of the bump-granularity treatment only.
    let use_min_visibility =
        parameters.bump_granularity && parameters.min_direct_bump_coeff_visibility > 0.0;

    caster.reset_cache(task.position, task.normal, true);

    let mut coefficients = CoeffList::zero(context.descriptor);
    let mut entries = Vec::new();
    let mut lower_hemisphere_count: u32 = 0;
    let mut hemisphere_samples: usize = 0;
    let mut unblocked_rays: u64 = 0;
    let mut all_hits: Vec<RayResult> = Vec::new();
    let mut hit_intensities: Vec<Intensity> = Vec::new();

    for sample in context.samples {
        let cos_angle = task.normal.dot(sample.direction());
        if upper_only && cos_angle < SAMPLE_COS_THRESHOLD {
            lower_hemisphere_count += 1;
            continue;
        }
        hemisphere_samples += 1;
        let cos = cos_angle as f32;
        let mut transmitted = false;

        let blocked = if parameters.support_transparency {
            let any_opaque = caster.cast_all(task.position, sample.direction(), &mut all_hits);
            match all_hits.first() {
                None => false,
                Some(first) => {
                    entries.push(RayCacheEntry {
                        sample_handle: sample.handle(),
                        face_index: first.face_index,
                        mesh_index: first.mesh_index,
                    });
                    if !any_opaque {
                        // Everything in the way transmits; blend instead of block.
                        hit_intensities.clear();
                        hit_intensities
                            .extend(all_hits.iter().map(|hit| hit_intensity(context.meshes, hit)));
                        configurator.process_ray_casting_result(
                            &mut coefficients,
                            cos,
                            task.intensity,
                            &hit_intensities,
                            sample,
                        );
                        transmitted = true;
                    }
                    true
                }
            }
        } else {
            match caster.cast(task.position, sample.direction()) {
                None => false,
                Some(hit) => {
                    entries.push(RayCacheEntry {
                        sample_handle: sample.handle(),
                        face_index: hit.face_index,
                        mesh_index: hit.mesh_index,
                    });
                    true
                }
            }
        };

        if blocked {
            // A ray that already contributed through transmission gets no floor.
            if use_min_visibility && !transmitted {
                configurator.add_direct_scalar_coefficient_value(
                    &mut coefficients,
                    parameters.min_direct_bump_coeff_visibility,
                    sample,
                );
            }
        } else {
            unblocked_rays += 1;
            configurator.transform_ray_casting_result(
                &mut coefficients,
                cos,
                task.intensity,
                sample,
            );
        }
    }

    adjust_direct_coefficients(
        context,
        task,
        caster,
        configurator,
        &mut coefficients,
        upper_only,
        hemisphere_samples,
    );

    VertexOutcome {
        vertex: task.vertex,
        coefficients,
        entries,
        lower_hemisphere_count,
        unblocked_rays,
        stats: caster.take_stats(),
    }
}

/// Normalize the Monte-Carlo sum, apply the bump-granularity border treatment,
/// and rotate into object space.
fn adjust_direct_coefficients(
    context: &PassContext<'_>,
    task: &VertexTask,
    caster: &mut RayCaster,
    configurator: &dyn TransferConfigurator,
    coefficients: &mut CoeffList,
    upper_only: bool,
    hemisphere_samples: usize,
) {
    let sample_count = context.samples.len();
    // Hemisphere integration: (2π/N)·Σ, with the diffuse 1/π folded in.
    // Full sphere: (4π/N)·Σ, likewise.
    let base_scale = if upper_only {
        if hemisphere_samples == 0 {
            0.0
        } else {
            2.0 / hemisphere_samples as f32
        }
    } else {
        4.0 / sample_count as f32
    };

    if !context.parameters.bump_granularity || !upper_only {
        // Bump-granularity coefficients are read back as a lookup, so the
        // diffuse 1/π must not be folded in.
        let direct_scale = if context.parameters.bump_granularity {
            PI as f32 * base_scale
        } else {
            base_scale
        };
        *coefficients *= direct_scale;
    } else {
        // Give the lower hemisphere useful values: every sample in the band
        // just below the horizon receives the visibility of the nearest
        // border-ring direction, then the whole list is rescaled over the
        // enlarged integration area.
        if let Some(lookup_directions) = context.vis_lookup_directions {
            let border =
                border_visibility(context, task, caster, configurator, lookup_directions);
            for sample in context.samples {
                let cos_tangent = task.frame.normal.dot(sample.direction());
                if !below_horizon_band(cos_tangent) {
                    continue;
                }
                let visibility = border[border_bin(task.frame, sample.direction())];
                if visibility > 0.0 {
                    configurator.add_direct_scalar_coefficient_value(
                        coefficients,
                        visibility,
                        sample,
                    );
                }
            }
        }
        *coefficients *= 4.0 * PI as f32 / sample_count as f32;
    }

    if let Some(rotation) = context.mesh.sh_rotation() {
        *coefficients = rotation.apply(coefficients);
    }
}

/// Whether a tangent-space cosine lies in the below-horizon band that still
/// receives border visibility (0° to 30° below the horizon).
#[inline]
fn below_horizon_band(cos_tangent: FreeCoordinate) -> bool {
    let band_floor = -(LOWER_BAND_FRACTION * core::f64::consts::FRAC_PI_2).sin();
    (band_floor..0.0).contains(&cos_tangent)
}

/// The border ring bin a direction's tangent-space azimuth falls into.
fn border_bin(frame: TangentFrame, direction: FreeVector) -> usize {
    let mut phi = direction
        .dot(frame.binormal)
        .atan2(direction.dot(frame.tangent));
    if phi < 0.0 {
        phi += TAU;
    }
    ((phi / TAU * BORDER_BINS as FreeCoordinate) as usize).min(BORDER_BINS - 1)
}

/// Cast the 256 border-ring rays just above the horizon and record each bin's
/// visibility: transmission through whatever is in the way, the ground-plane
/// block for rays fired downward, and finally the minimum-visibility floor.
fn border_visibility(
    context: &PassContext<'_>,
    task: &VertexTask,
    caster: &mut RayCaster,
    configurator: &dyn TransferConfigurator,
    lookup_directions: &[FreeVector],
) -> Vec<f32> {
    let parameters = context.parameters;
    let mut all_hits: Vec<RayResult> = Vec::new();
    let mut hit_intensities: Vec<Intensity> = Vec::new();
    lookup_directions
        .iter()
        .map(|&local| {
            let world = task.frame.to_world(local);
            let mut visibility: f32 = if parameters.support_transparency {
                let any_opaque = caster.cast_all(task.position, world, &mut all_hits);
                if all_hits.is_empty() {
                    1.0
                } else if any_opaque {
                    0.0
                } else {
                    hit_intensities.clear();
                    hit_intensities
                        .extend(all_hits.iter().map(|hit| hit_intensity(context.meshes, hit)));
                    configurator.transmission_factor(&hit_intensities)
                }
            } else if caster.cast(task.position, world).is_none() {
                1.0
            } else {
                0.0
            };
            if parameters.ground_plane_block_value != 1.0 && world.z < 0.0 {
                // Fired toward the ground; treat as partly blocked.
                visibility *= parameters.ground_plane_block_value;
            }
            visibility.max(parameters.min_direct_bump_coeff_visibility)
        })
        .collect()
}

/// The tangent-space directions of the border ring: one per azimuth bin, at
/// the visibility-lookup polar angle just above the horizon.
fn border_lookup_directions() -> Vec<FreeVector> {
    (0..BORDER_BINS)
        .map(|bin| {
            PolarCoord {
                theta: VIS_LOOKUP_ANGLE,
                phi: TAU * bin as FreeCoordinate / BORDER_BINS as FreeCoordinate,
            }
            .to_cartesian()
        })
        .collect()
}

/// The intensity of the material at a ray hit, sampled at the hit's
/// barycentric-interpolated texture coordinate.
fn hit_intensity(meshes: &[IndexedMesh], hit: &RayResult) -> Intensity {
    let mesh = &meshes[hit.mesh_index as usize];
    let face: &Face = &mesh.faces()[hit.face_index as usize];
    let [t0, t1, t2] = face.texcoords.map(|i| mesh.texcoords()[i as usize]);
    let [u, v] = hit.barycentric.map(|w| w as f32);
    let w0 = 1.0 - u - v;
    let texcoord = [
        t0[0] * w0 + t1[0] * u + t2[0] * v,
        t0[1] * w0 + t1[1] * u + t2[1] * v,
    ];
    mesh.material(face).diffuse_intensity(texcoord)
}
