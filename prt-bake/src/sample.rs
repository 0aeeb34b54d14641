//! Deterministic generation of unit-sphere sample directions with
//! pre-evaluated spherical-harmonics basis values.
//!
//! A [`SampleGenerator`] turns a point set on the unit square (chosen by a
//! [`SamplePolicy`]) into [`Sample`]s via an equal-area sphere mapping, and
//! hands them to a [`SampleOrganizer`] which assigns stable handles and an
//! iteration order.

use core::f64::consts::TAU;

use prt_bake_base::math::{FreeVector, PolarCoord};
use rand::{Rng as _, SeedableRng as _};
use rand_xoshiro::Xoshiro256Plus;

use crate::sh::{CoeffList, ShDescriptor, sh_basis};

mod handle;
pub use handle::{HandleOverflow, SampleHandle};

mod organizer;
pub use organizer::{IcosahedronOrganizer, LinearOrganizer, SampleOrganizer};


// -------------------------------------------------------------------------------------------------

/// One direction on the unit sphere together with its pre-evaluated
/// spherical-harmonics basis values and the handle it is retrievable by.
#[derive(Clone, Debug)]
pub struct Sample {
    handle: SampleHandle,
    polar: PolarCoord,
    direction: FreeVector,
    coefficients: CoeffList,
}

impl Sample {
    fn new(handle: SampleHandle, polar: PolarCoord, descriptor: ShDescriptor) -> Self {
        Self {
            handle,
            polar,
            direction: polar.to_cartesian(),
            coefficients: sh_basis(descriptor, polar),
        }
    }

    /// The handle this sample may be retrieved by until the next restart.
    #[inline]
    pub fn handle(&self) -> SampleHandle {
        self.handle
    }

    /// The direction in polar form.
    #[inline]
    pub fn polar(&self) -> PolarCoord {
        self.polar
    }

    /// The direction as a cartesian unit vector.
    #[inline]
    pub fn direction(&self) -> FreeVector {
        self.direction
    }

    /// The SH basis evaluated at this direction.
    #[inline]
    pub fn coefficients(&self) -> &CoeffList {
        &self.coefficients
    }
}

// -------------------------------------------------------------------------------------------------

/// How positions on the unit square (and hence, equal-area-mapped, on the
/// sphere) are chosen.
#[derive(Clone, Copy, Debug, PartialEq)]
#[non_exhaustive]
pub enum SamplePolicy {
    /// Independent uniform random points; highest variance, useful as a baseline.
    NaiveRandom {
        /// RNG seed; the same seed always produces the same samples.
        seed: u64,
    },
    /// One jittered point per cell of a `⌈√n⌉ × ⌈√n⌉` grid.
    StratifiedJittered {
        /// RNG seed for the jitter.
        seed: u64,
    },
    /// The Hammersley low-discrepancy point set; fully deterministic.
    /// The production default.
    Hammersley,
}

impl SamplePolicy {
    /// Generate exactly `count` sphere directions.
    fn generate(self, count: usize) -> Vec<PolarCoord> {
        match self {
            SamplePolicy::NaiveRandom { seed } => {
                let mut rng = Xoshiro256Plus::seed_from_u64(seed);
                (0..count)
                    .map(|_| map_unit_square_to_sphere(rng.random(), rng.random()))
                    .collect()
            }
            SamplePolicy::StratifiedJittered { seed } => {
                let mut rng = Xoshiro256Plus::seed_from_u64(seed);
                let grid = (count as f64).sqrt().ceil() as usize;
                let cell = 1.0 / grid as f64;
                (0..count)
                    .map(|i| {
                        let (gx, gy) = (i % grid, i / grid);
                        let u = (gx as f64 + rng.random::<f64>()) * cell;
                        let v = (gy as f64 + rng.random::<f64>()) * cell;
                        map_unit_square_to_sphere(u, v)
                    })
                    .collect()
            }
            SamplePolicy::Hammersley => (0..count)
                .map(|i| {
                    map_unit_square_to_sphere(
                        (i as f64 + 0.5) / count as f64,
                        radical_inverse_base2(i as u32),
                    )
                })
                .collect(),
        }
    }
}

/// Equal-area mapping of the unit square onto the sphere: uniformly distributed
/// `(u, v)` become uniformly distributed directions.
#[inline]
fn map_unit_square_to_sphere(u: f64, v: f64) -> PolarCoord {
    PolarCoord {
        theta: 2.0 * (1.0 - u).sqrt().acos(),
        phi: TAU * v,
    }
}

/// Van der Corput radical inverse in base 2 (bit reversal).
#[inline]
fn radical_inverse_base2(i: u32) -> f64 {
    f64::from(i.reverse_bits()) * 2.0f64.powi(-32)
}

// -------------------------------------------------------------------------------------------------

/// Generates and owns the sphere sample set used by a bake.
///
/// All samples live inside the chosen [`SampleOrganizer`]; the generator adds
/// the policy and the clamping/regeneration protocol on top.
#[derive(Debug)]
pub struct SampleGenerator {
    policy: SamplePolicy,
    organizer: Box<dyn SampleOrganizer>,
}

impl SampleGenerator {
    #[allow(missing_docs)]
    pub fn new(policy: SamplePolicy, organizer: Box<dyn SampleOrganizer>) -> Self {
        Self { policy, organizer }
    }

    /// Discard all current samples and generate a fresh set of (approximately)
    /// `count` samples with basis values for `descriptor`.
    ///
    /// The request is clamped to the organizer's `[min_capacity, capacity]`
    /// range, with a warning logged when that changes it. Afterwards,
    /// [`Self::ordered_size()`] equals the clamped request.
    pub fn restart(
        &mut self,
        count: usize,
        descriptor: ShDescriptor,
    ) -> Result<(), HandleOverflow> {
        let clamped = count.clamp(self.organizer.min_capacity(), self.organizer.capacity());
        if clamped != count {
            log::warn!(
                "sample count {count} clamped to {clamped} (organizer supports {min}..={max})",
                min = self.organizer.min_capacity(),
                max = self.organizer.capacity(),
            );
        }
        self.organizer.reset();
        self.organizer
            .convert_into_sh_and_reorganize(&self.policy.generate(clamped), descriptor)
    }

    /// All current samples, in the organizer's iteration order.
    #[inline]
    pub fn samples(&self) -> &[Sample] {
        self.organizer.samples()
    }

    /// Retrieve one sample by the handle it was issued.
    #[inline]
    pub fn sample(&self, handle: SampleHandle) -> Option<&Sample> {
        self.organizer.sample(handle)
    }

    /// Number of samples currently held.
    #[inline]
    pub fn ordered_size(&self) -> usize {
        self.organizer.ordered_size()
    }
}
