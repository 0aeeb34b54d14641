use core::fmt;

use crate::material::{Intensity, MaterialKind};
use crate::sample::Sample;
use crate::sh::CoeffList;

// -------------------------------------------------------------------------------------------------

/// Policy hooks deciding how individual sample rays turn into coefficient
/// contributions. The engine drives the passes; the configurator owns the
/// shading decisions, so alternative transfer models plug in here.
pub trait TransferConfigurator: fmt::Debug + Send + Sync {
    /// Whether vertices of `kind` materials integrate only the hemisphere
    /// around their normal (as opposed to the full sphere).
    fn process_only_upper_hemisphere(&self, kind: MaterialKind) -> bool;

    /// Accumulate `scalar × basis(sample)` into `coefficients`; the shared
    /// primitive the other hooks (and the engine's visibility floors) build on.
    fn add_direct_scalar_coefficient_value(
        &self,
        coefficients: &mut CoeffList,
        scalar: f32,
        sample: &Sample,
    );

    /// An unblocked sample ray: accumulate its contribution, given the cosine
    /// between the vertex normal and the ray and the vertex material's response.
    fn transform_ray_casting_result(
        &self,
        coefficients: &mut CoeffList,
        cos_angle: f32,
        intensity: Intensity,
        sample: &Sample,
    );

    /// A ray blocked only by transmitting surfaces: accumulate the scaled-down
    /// contribution, given the intensities of everything it passed through
    /// (nearest first).
    fn process_ray_casting_result(
        &self,
        coefficients: &mut CoeffList,
        cos_angle: f32,
        intensity: Intensity,
        hits: &[Intensity],
        sample: &Sample,
    );

    /// Combined transmission of a stack of transmitting surfaces a ray passed
    /// through (nearest first); also used for border-visibility lookups.
    fn transmission_factor(&self, hits: &[Intensity]) -> f32 {
        let mut transmission = 1.0f32;
        for hit in hits {
            transmission *= (1.0 - hit.alpha) * hit.luminance();
            if transmission <= 0.0 {
                break;
            }
        }
        transmission
    }

    /// A fresh boxed copy for a worker thread.
    fn clone_box(&self) -> Box<dyn TransferConfigurator>;
}

// -------------------------------------------------------------------------------------------------

/// The standard diffuse transfer model.
///
/// Cosine-weighted accumulation modulated by the vertex material; transmitting
/// occluders scale a ray's contribution by the product of their per-surface
/// transmission factors (colour-weighted, so a tinted pane passes tinted light).
#[derive(Clone, Copy, Debug, Default)]
#[non_exhaustive]
pub struct DefaultTransferConfigurator;

impl TransferConfigurator for DefaultTransferConfigurator {
    fn process_only_upper_hemisphere(&self, kind: MaterialKind) -> bool {
        kind != MaterialKind::Backlighting
    }

    fn add_direct_scalar_coefficient_value(
        &self,
        coefficients: &mut CoeffList,
        scalar: f32,
        sample: &Sample,
    ) {
        coefficients.add_scaled(sample.coefficients(), scalar);
    }

    fn transform_ray_casting_result(
        &self,
        coefficients: &mut CoeffList,
        cos_angle: f32,
        intensity: Intensity,
        sample: &Sample,
    ) {
        self.add_direct_scalar_coefficient_value(
            coefficients,
            cos_angle * intensity.luminance(),
            sample,
        );
    }

    fn process_ray_casting_result(
        &self,
        coefficients: &mut CoeffList,
        cos_angle: f32,
        intensity: Intensity,
        hits: &[Intensity],
        sample: &Sample,
    ) {
        let transmission = self.transmission_factor(hits);
        if transmission <= 0.0 {
            return;
        }
        self.add_direct_scalar_coefficient_value(
            coefficients,
            cos_angle * intensity.luminance() * transmission,
            sample,
        );
    }

    fn clone_box(&self) -> Box<dyn TransferConfigurator> {
        Box::new(*self)
    }
}
