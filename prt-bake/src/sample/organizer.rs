use core::fmt;
use core::ops::Range;

use arrayvec::ArrayVec;
use hashbrown::HashMap;
use itertools::Itertools as _;
use prt_bake_base::math::{FreeVector, PolarCoord};

use crate::sample::handle::{FACE_BITS, HandleOverflow, SampleHandle};
use crate::sample::Sample;
use crate::sh::ShDescriptor;

// -------------------------------------------------------------------------------------------------

/// Storage strategy for a generator's samples: assigns each sample a stable
/// [`SampleHandle`] and an iteration order.
pub trait SampleOrganizer: fmt::Debug + Send + Sync {
    /// Replace the current contents with `directions`, evaluating the SH basis
    /// for `descriptor` at each and assigning fresh handles.
    fn convert_into_sh_and_reorganize(
        &mut self,
        directions: &[PolarCoord],
        descriptor: ShDescriptor,
    ) -> Result<(), HandleOverflow>;

    /// All samples in this organizer's iteration order.
    fn samples(&self) -> &[Sample];

    /// Retrieve one sample by handle; [`None`] for a handle this organizer did
    /// not issue (or issued before the last [`Self::reset()`]).
    fn sample(&self, handle: SampleHandle) -> Option<&Sample>;

    /// Discard all samples and handle assignments.
    fn reset(&mut self);

    /// Largest sample count this organizer supports.
    fn capacity(&self) -> usize;

    /// Smallest sample count this organizer supports.
    fn min_capacity(&self) -> usize;

    /// Number of samples currently organized.
    fn ordered_size(&self) -> usize {
        self.samples().len()
    }
}

// -------------------------------------------------------------------------------------------------

/// The trivial organizer: handles are flat indices, iteration order is
/// generation order.
#[derive(Debug)]
pub struct LinearOrganizer {
    capacity: usize,
    samples: Vec<Sample>,
}

impl LinearOrganizer {
    /// An organizer accepting up to `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.min(u32::MAX as usize),
            samples: Vec::new(),
        }
    }
}

impl SampleOrganizer for LinearOrganizer {
    fn convert_into_sh_and_reorganize(
        &mut self,
        directions: &[PolarCoord],
        descriptor: ShDescriptor,
    ) -> Result<(), HandleOverflow> {
        debug_assert!(self.samples.is_empty(), "reset() must precede reorganization");
        self.samples.reserve_exact(directions.len());
        for (index, &polar) in directions.iter().enumerate() {
            let handle = SampleHandle::from_index(index)?;
            self.samples.push(Sample::new(handle, polar, descriptor));
        }
        Ok(())
    }

    fn samples(&self) -> &[Sample] {
        &self.samples
    }

    fn sample(&self, handle: SampleHandle) -> Option<&Sample> {
        self.samples.get(handle.as_index())
    }

    fn reset(&mut self) {
        self.samples.clear();
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn min_capacity(&self) -> usize {
        1
    }
}

// -------------------------------------------------------------------------------------------------

/// Maximum subdivision depth expressible in a handle (2 bits per level after
/// the 5-bit face field, leaving at least one bit for the leaf index).
const MAX_DEPTH: usize = 13;

/// Samples per leaf triangle the subdivision depth aims for.
const LEAF_TARGET: usize = 10;

/// Organizes samples into the 20 faces of an icosahedron, each face split
/// recursively into 4 sub-triangles, so that all samples around a given
/// direction can be retrieved as one contiguous leaf slice.
///
/// Handles pack the face / sub-triangle path / leaf position; see
/// [`SampleHandle::pack`].
#[derive(Debug)]
pub struct IcosahedronOrganizer {
    capacity: usize,
    min_sample_count_to_retrieve: usize,
    /// Subdivision depth of the current contents (recomputed per reorganization).
    depth: usize,
    /// Leaf-major: each leaf's samples are contiguous.
    samples: Vec<Sample>,
    /// Handle prefix (face + path bits) → range within `samples`.
    leaf_ranges: HashMap<u32, Range<usize>>,
}

impl IcosahedronOrganizer {
    /// An organizer accepting up to `capacity` samples and choosing its
    /// subdivision depth so that a retrieval by direction yields at least
    /// `min_sample_count_to_retrieve` samples on average.
    pub fn new(capacity: usize, min_sample_count_to_retrieve: usize) -> Self {
        Self {
            capacity: capacity.min(u32::MAX as usize),
            min_sample_count_to_retrieve: min_sample_count_to_retrieve.max(1),
            depth: 0,
            samples: Vec::new(),
            leaf_ranges: HashMap::new(),
        }
    }

    fn choose_depth(&self, count: usize) -> usize {
        let target = self.min_sample_count_to_retrieve.max(LEAF_TARGET);
        let mut depth = 0;
        while depth < MAX_DEPTH && count / (20 * 4usize.pow(depth as u32 + 1)) >= target {
            depth += 1;
        }
        depth
    }

    /// The samples of the leaf triangle containing `direction` — the
    /// neighborhood retrieval this organizer exists for.
    pub fn samples_near(&self, direction: FreeVector) -> &[Sample] {
        let (face, path) = assign(direction, self.depth);
        let prefix = prefix_bits(face, &path);
        match self.leaf_ranges.get(&prefix) {
            Some(range) => &self.samples[range.clone()],
            None => &[],
        }
    }
}

impl SampleOrganizer for IcosahedronOrganizer {
    fn convert_into_sh_and_reorganize(
        &mut self,
        directions: &[PolarCoord],
        descriptor: ShDescriptor,
    ) -> Result<(), HandleOverflow> {
        debug_assert!(self.samples.is_empty(), "reset() must precede reorganization");
        self.depth = self.choose_depth(directions.len());

        struct Assigned {
            prefix: u32,
            face: u32,
            path: ArrayVec<u8, MAX_DEPTH>,
            polar: PolarCoord,
        }
        let mut assigned: Vec<Assigned> = directions
            .iter()
            .map(|&polar| {
                let (face, path) = assign(polar.to_cartesian(), self.depth);
                Assigned {
                    prefix: prefix_bits(face, &path),
                    face,
                    path,
                    polar,
                }
            })
            .collect();
        // Stable sort: samples within a leaf keep generation order, so the
        // whole arrangement is deterministic.
        assigned.sort_by_key(|a| a.prefix);

        self.samples.reserve_exact(assigned.len());
        let mut next = 0;
        for (prefix, leaf) in &assigned.iter().chunk_by(|a| a.prefix) {
            let leaf_start = next;
            for (leaf_index, a) in leaf.enumerate() {
                let handle = SampleHandle::pack(a.face, &a.path, leaf_index as u32)?;
                self.samples.push(Sample::new(handle, a.polar, descriptor));
                next += 1;
            }
            self.leaf_ranges.insert(prefix, leaf_start..next);
        }
        Ok(())
    }

    fn samples(&self) -> &[Sample] {
        &self.samples
    }

    fn sample(&self, handle: SampleHandle) -> Option<&Sample> {
        let (_, _, leaf) = handle.unpack(self.depth);
        let leaf_bits = u32::BITS - FACE_BITS - 2 * self.depth as u32;
        let prefix = handle.bits() >> leaf_bits;
        let range = self.leaf_ranges.get(&prefix)?;
        let leaf = leaf as usize;
        if leaf >= range.len() {
            return None;
        }
        self.samples.get(range.start + leaf)
    }

    fn reset(&mut self) {
        self.samples.clear();
        self.leaf_ranges.clear();
        self.depth = 0;
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn min_capacity(&self) -> usize {
        // One sample per face leaves no face's retrieval empty at depth 0.
        20
    }
}

// -------------------------------------------------------------------------------------------------

/// Handle prefix (face and path fields, right-aligned) used as a leaf key and
/// as the sort key that makes leaves contiguous.
fn prefix_bits(face: u32, path: &[u8]) -> u32 {
    let mut bits = face;
    for &selector in path {
        bits = (bits << 2) | u32::from(selector);
    }
    bits
}

/// Descend the icosahedron subdivision to `depth`, choosing at each level the
/// (sub-)triangle whose centroid is nearest to `direction`.
fn assign(direction: FreeVector, depth: usize) -> (u32, ArrayVec<u8, MAX_DEPTH>) {
    let (face, mut triangle) = nearest_face(direction);
    let mut path = ArrayVec::new();
    for _ in 0..depth {
        let [a, b, c] = triangle;
        let ab = midpoint(a, b);
        let bc = midpoint(b, c);
        let ca = midpoint(c, a);
        let children = [[a, ab, ca], [ab, b, bc], [ca, bc, c], [ab, bc, ca]];
        let (selector, child) = children
            .iter()
            .enumerate()
            .max_by(|(_, t1), (_, t2)| {
                centroid_dot(t1, direction)
                    .partial_cmp(&centroid_dot(t2, direction))
                    .unwrap_or(core::cmp::Ordering::Equal)
            })
            .unwrap_or((0, &children[0]));
        path.push(selector as u8);
        triangle = *child;
    }
    (face, path)
}

fn nearest_face(direction: FreeVector) -> (u32, [FreeVector; 3]) {
    let mut best = (0u32, f64::NEG_INFINITY);
    for (i, face) in FACES.iter().enumerate() {
        let triangle = face.map(vertex);
        let dot = centroid_dot(&triangle, direction);
        if dot > best.1 {
            best = (i as u32, dot);
        }
    }
    (best.0, FACES[best.0 as usize].map(vertex))
}

fn centroid_dot(triangle: &[FreeVector; 3], direction: FreeVector) -> f64 {
    ((triangle[0] + triangle[1] + triangle[2]) / 3.0)
        .normalize()
        .dot(direction)
}

fn midpoint(a: FreeVector, b: FreeVector) -> FreeVector {
    ((a + b) / 2.0).normalize()
}

fn vertex(index: usize) -> FreeVector {
    let [x, y, z] = VERTICES[index];
    FreeVector::new(x, y, z).normalize()
}

/// The golden ratio, (1 + √5)/2.
const PHI: f64 = 1.618_033_988_749_895;

/// The 12 icosahedron vertices before normalization; ±1 and ±φ components.
const VERTICES: [[f64; 3]; 12] = [
    [-1.0, PHI, 0.0],
    [1.0, PHI, 0.0],
    [-1.0, -PHI, 0.0],
    [1.0, -PHI, 0.0],
    [0.0, -1.0, PHI],
    [0.0, 1.0, PHI],
    [0.0, -1.0, -PHI],
    [0.0, 1.0, -PHI],
    [PHI, 0.0, -1.0],
    [PHI, 0.0, 1.0],
    [-PHI, 0.0, -1.0],
    [-PHI, 0.0, 1.0],
];

const FACES: [[usize; 3]; 20] = [
    [0, 11, 5],
    [0, 5, 1],
    [0, 1, 7],
    [0, 7, 10],
    [0, 10, 11],
    [1, 5, 9],
    [5, 11, 4],
    [11, 10, 2],
    [10, 7, 6],
    [7, 1, 8],
    [3, 9, 4],
    [3, 4, 2],
    [3, 2, 6],
    [3, 6, 8],
    [3, 8, 9],
    [4, 9, 5],
    [2, 4, 11],
    [6, 2, 10],
    [8, 6, 7],
    [9, 8, 1],
];
