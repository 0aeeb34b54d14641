//! Offline precomputed radiance transfer (PRT) baking.
//!
//! Given triangle meshes with materials, this library integrates per-vertex
//! visibility over the sphere by Monte-Carlo ray casting and projects the
//! result onto a real spherical-harmonics basis, producing one coefficient
//! list per vertex suitable for runtime relighting.
//!
//! The main entry point is [`transfer::InterreflectionTransfer::process()`],
//! driven by a [`transfer::BakeSession`].
//!
//! # Crate features
//!
//! * `auto-threads` (default): the direct transfer pass may spread its work
//!   over a `rayon` thread pool, `TransferParameters::ray_casting_threads`
//!   wide. Without it, the pass always runs on the calling thread.

pub use prt_bake_base::{math, raster};

pub mod cast;
pub mod material;
pub mod mesh;
pub mod sample;
pub mod sh;
pub mod transfer;
