use crate::math::FreeCoordinate;

/// One 2D occupancy table of the raster index: for each cell of an axis-aligned
/// projection plane, the indices of the triangles whose projection touches that cell.
///
/// Built in two passes over the same insertion sequence:
///
/// 1. [`Self::count`] tallies per-cell occupancy.
/// 2. [`Self::preprocess`] converts the tallies to prefix-sum offsets into one
///    contiguous pool sized exactly to the total.
/// 3. [`Self::fill`] writes the indices into the pool.
///
/// This avoids any per-cell growable buckets; the pool is allocated once.
/// Because phase 2 inserts triangles in ascending index order and each
/// (cell, triangle) pair occurs once, every cell list ends up strictly
/// ascending, which the cross-plane merge intersection relies on.
#[derive(Clone, Debug)]
pub(crate) struct RasterTable {
    width: u32,
    height: u32,
    phase: Phase,
    /// Phase 1: per-cell counts. Phase 2: per-cell write cursors.
    counters: Vec<u32>,
    /// Prefix sums; `offsets[cell]..offsets[cell + 1]` spans the cell's pool slice.
    offsets: Vec<u32>,
    pool: Vec<u32>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase {
    Counting,
    Filling,
    Ready,
}

impl RasterTable {
    pub fn new(width: u32, height: u32) -> Self {
        let cells = width as usize * height as usize;
        Self {
            width,
            height,
            phase: Phase::Counting,
            counters: vec![0; cells],
            offsets: Vec::new(),
            pool: Vec::new(),
        }
    }

    #[inline]
    fn cell_index(&self, x: u32, y: u32) -> usize {
        debug_assert!(x < self.width && y < self.height);
        y as usize * self.width as usize + x as usize
    }

    /// Phase 1: record that a triangle touches cell `(x, y)`.
    pub fn count(&mut self, x: u32, y: u32) {
        debug_assert_eq!(self.phase, Phase::Counting);
        let index = self.cell_index(x, y);
        self.counters[index] += 1;
    }

    /// Consolidate phase-1 counts into a single pre-sized pool with per-cell offsets.
    pub fn preprocess(&mut self) {
        debug_assert_eq!(self.phase, Phase::Counting);
        let cells = self.counters.len();
        self.offsets = Vec::with_capacity(cells + 1);
        let mut total: u32 = 0;
        for &count in &self.counters {
            self.offsets.push(total);
            total += count;
        }
        self.offsets.push(total);
        self.pool = vec![u32::MAX; total as usize];
        // Reset counters for use as fill cursors.
        self.counters.fill(0);
        self.phase = Phase::Filling;
    }

    /// Phase 2: write a triangle index into cell `(x, y)`'s slice of the pool.
    ///
    /// Triangles must be inserted in ascending `element` order (the same order
    /// phase 1 counted them), keeping each cell list strictly ascending.
    pub fn fill(&mut self, x: u32, y: u32, element: u32) {
        debug_assert_eq!(self.phase, Phase::Filling);
        let index = self.cell_index(x, y);
        let slot = self.offsets[index] + self.counters[index];
        debug_assert!(slot < self.offsets[index + 1], "phase 2 overran phase 1 count");
        self.pool[slot as usize] = element;
        self.counters[index] += 1;
    }

    /// Mark the table complete and verify the two phases agreed.
    pub fn finish(&mut self) {
        debug_assert_eq!(self.phase, Phase::Filling);
        debug_assert!(
            self.counters
                .iter()
                .enumerate()
                .all(|(i, &c)| self.offsets[i] + c == self.offsets[i + 1]),
            "phase 2 insertions did not match phase 1 counts"
        );
        self.phase = Phase::Ready;
    }

    /// The (strictly ascending) triangle indices whose projections touch cell `(x, y)`.
    #[inline]
    pub fn cell(&self, x: u32, y: u32) -> &[u32] {
        debug_assert_eq!(self.phase, Phase::Ready);
        let index = self.cell_index(x, y);
        &self.pool[self.offsets[index] as usize..self.offsets[index + 1] as usize]
    }
}

// -------------------------------------------------------------------------------------------------

/// Invoke `visit(x, y)` for every cell of a `width`×`height` table whose unit box is
/// touched by the given 2D triangle (coordinates already in cell units).
///
/// Conservative: a cell counts if the triangle overlaps it even partially.
pub(crate) fn rasterize_triangle(
    triangle: &[[FreeCoordinate; 2]; 3],
    width: u32,
    height: u32,
    mut visit: impl FnMut(u32, u32),
) {
    let min_x = triangle.iter().map(|p| p[0]).fold(f64::INFINITY, f64::min);
    let max_x = triangle
        .iter()
        .map(|p| p[0])
        .fold(f64::NEG_INFINITY, f64::max);
    let min_y = triangle.iter().map(|p| p[1]).fold(f64::INFINITY, f64::min);
    let max_y = triangle
        .iter()
        .map(|p| p[1])
        .fold(f64::NEG_INFINITY, f64::max);

    let x0 = (min_x.floor().max(0.0) as u32).min(width.saturating_sub(1));
    let x1 = (max_x.floor().max(0.0) as u32).min(width.saturating_sub(1));
    let y0 = (min_y.floor().max(0.0) as u32).min(height.saturating_sub(1));
    let y1 = (max_y.floor().max(0.0) as u32).min(height.saturating_sub(1));

    for y in y0..=y1 {
        for x in x0..=x1 {
            let cell_min = [f64::from(x), f64::from(y)];
            let cell_max = [f64::from(x) + 1.0, f64::from(y) + 1.0];
            if triangle_box_overlap(triangle, cell_min, cell_max) {
                visit(x, y);
            }
        }
    }
}

/// Exact 2D triangle / axis-aligned box overlap by separating-axis test.
///
/// Touching boundaries count as overlapping, matching the “even partially” rule.
fn triangle_box_overlap(
    triangle: &[[FreeCoordinate; 2]; 3],
    box_min: [FreeCoordinate; 2],
    box_max: [FreeCoordinate; 2],
) -> bool {
    // Box axes.
    for axis in 0..2 {
        let tri_min = triangle.iter().map(|p| p[axis]).fold(f64::INFINITY, f64::min);
        let tri_max = triangle
            .iter()
            .map(|p| p[axis])
            .fold(f64::NEG_INFINITY, f64::max);
        if tri_max < box_min[axis] || tri_min > box_max[axis] {
            return false;
        }
    }

    // Triangle edge normals.
    for i in 0..3 {
        let a = triangle[i];
        let b = triangle[(i + 1) % 3];
        let normal = [-(b[1] - a[1]), b[0] - a[0]];

        let project = |p: [FreeCoordinate; 2]| normal[0] * p[0] + normal[1] * p[1];
        let tri_proj: [FreeCoordinate; 3] = [
            project(triangle[0]),
            project(triangle[1]),
            project(triangle[2]),
        ];
        let tri_min = tri_proj.into_iter().fold(f64::INFINITY, f64::min);
        let tri_max = tri_proj.into_iter().fold(f64::NEG_INFINITY, f64::max);

        let corners = [
            project([box_min[0], box_min[1]]),
            project([box_max[0], box_min[1]]),
            project([box_min[0], box_max[1]]),
            project([box_max[0], box_max[1]]),
        ];
        let box_proj_min = corners.into_iter().fold(f64::INFINITY, f64::min);
        let box_proj_max = corners.into_iter().fold(f64::NEG_INFINITY, f64::max);

        if tri_max < box_proj_min || tri_min > box_proj_max {
            return false;
        }
    }

    true
}
