//! This library is an internal component of [`prt-bake`],
//! which defines the core math types and the spatial raster index used for
//! accelerating ray/triangle queries.
//! Do not depend on this library; use only [`prt-bake`] instead.
//!
//! [`prt-bake`]: https://crates.io/crates/prt-bake/

pub mod math;

/// Do not use this module directly; its contents are re-exported from `prt-bake`.
pub mod raster;

// reexport for convenience of our tests
#[doc(hidden)]
pub use euclid;
