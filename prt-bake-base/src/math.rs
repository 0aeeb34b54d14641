//! Mathematical types for world-space geometry and grid coordinates.
//!
//! Coordinates use [`euclid`] types with distinct units so that world-space
//! positions and raster-grid cell coordinates cannot be mixed up silently.

use euclid::{Point3D, Vector3D};

mod aab;
pub use aab::Aab;

mod axis;
pub use axis::Axis;

mod polar;
pub use polar::PolarCoord;

mod ray;
pub use ray::Ray;

// -------------------------------------------------------------------------------------------------

/// Unit-of-measure type for world-space coordinates (meters, or whatever the mesh uses).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[expect(clippy::exhaustive_enums)]
pub enum World {}

/// Unit-of-measure type for integer raster-grid cell coordinates.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[expect(clippy::exhaustive_enums)]
pub enum Cell {}

/// Coordinate type for continuous (world-space) geometry.
pub type FreeCoordinate = f64;

/// Coordinate type for raster-grid cells.
pub type GridCoordinate = i32;

/// A point in world space.
pub type FreePoint = Point3D<FreeCoordinate, World>;

/// A vector in world space.
pub type FreeVector = Vector3D<FreeCoordinate, World>;

/// An integer cell position within a raster grid.
pub type GridPoint = Point3D<GridCoordinate, Cell>;

/// An integer offset between raster-grid cells.
pub type GridVector = Vector3D<GridCoordinate, Cell>;

// -------------------------------------------------------------------------------------------------

/// 3-valued signum (zero produces zero) rather than the 2-valued one Rust gives,
/// and with an integer result.
#[inline]
pub fn signum_101(x: FreeCoordinate) -> GridCoordinate {
    if x == 0.0 { 0 } else { x.signum() as GridCoordinate }
}
