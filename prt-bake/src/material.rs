//! Material behavior as seen by the transfer engine.
//!
//! The engine needs very little from a material: how it classifies for
//! hemisphere handling, what it contributes where a ray hits or starts, and
//! whether blocked rays still transmit light through it.

use core::fmt;

// -------------------------------------------------------------------------------------------------

/// Classification driving hemisphere handling in the transfer passes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum MaterialKind {
    /// Ordinary opaque surface; only the upper hemisphere is integrated.
    Default,
    /// Surface with an alpha texture; blocked rays may transmit scaled light.
    AlphaTextured,
    /// Translucent surface lit from behind; the full sphere is integrated.
    Backlighting,
}

/// Diffuse response of a material at one surface point.
#[derive(Clone, Copy, Debug, PartialEq)]
#[expect(clippy::exhaustive_structs)]
pub struct Intensity {
    /// Diffuse reflectance per channel, normally within `[0, 1]`.
    pub rgb: [f32; 3],
    /// Opacity; `1.0` fully blocks, `0.0` fully transmits.
    pub alpha: f32,
}

impl Intensity {
    /// Fully opaque white; the neutral element for modulation.
    pub const WHITE: Self = Self {
        rgb: [1.0, 1.0, 1.0],
        alpha: 1.0,
    };

    /// Mean of the colour channels, used as a scalar modulation factor.
    #[inline]
    pub fn luminance(self) -> f32 {
        (self.rgb[0] + self.rgb[1] + self.rgb[2]) / 3.0
    }
}

// -------------------------------------------------------------------------------------------------

/// A mesh material, from the transfer engine's point of view.
pub trait ShMaterial: fmt::Debug + Send + Sync {
    /// Hemisphere/transparency classification.
    fn kind(&self) -> MaterialKind;

    /// Diffuse response at the given texture coordinate (used both for the
    /// vertex a transfer starts from and for points rays hit).
    fn diffuse_intensity(&self, texcoord: [f32; 2]) -> Intensity;

    /// Whether rays blocked by this material still transmit scaled light,
    /// so the transfer must look at the hit rather than just discard the ray.
    fn has_transparency_transfer(&self) -> bool {
        false
    }

    /// Whether faces with this material contribute transfer coefficients.
    fn computes_sh_coefficients(&self) -> bool {
        true
    }

    /// Whether faces with this material can block rays.
    fn considered_for_ray_casting(&self) -> bool {
        true
    }

    /// Whether faces with this material only block rays arriving from their
    /// front side. Double-sided blocking is the conservative default.
    fn single_sided(&self) -> bool {
        false
    }
}

// -------------------------------------------------------------------------------------------------

/// A plain opaque diffuse material with a constant colour.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DiffuseMaterial {
    /// Constant diffuse reflectance.
    pub rgb: [f32; 3],
}

impl DiffuseMaterial {
    #[allow(missing_docs)]
    pub const WHITE: Self = Self {
        rgb: [1.0, 1.0, 1.0],
    };
}

impl ShMaterial for DiffuseMaterial {
    fn kind(&self) -> MaterialKind {
        MaterialKind::Default
    }

    fn diffuse_intensity(&self, _texcoord: [f32; 2]) -> Intensity {
        Intensity {
            rgb: self.rgb,
            alpha: 1.0,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// A material whose colour and opacity come from a small texture, sampled
/// with nearest-neighbor lookup and repeat wrapping.
#[derive(Clone, Debug)]
pub struct AlphaTexturedMaterial {
    width: usize,
    height: usize,
    texels: Vec<Intensity>,
}

impl AlphaTexturedMaterial {
    /// Wrap a row-major texel array.
    ///
    /// Returns [`None`] if the texel count does not equal `width × height` or
    /// either dimension is zero.
    pub fn new(width: usize, height: usize, texels: Vec<Intensity>) -> Option<Self> {
        (width > 0 && height > 0 && texels.len() == width * height).then_some(Self {
            width,
            height,
            texels,
        })
    }
}

impl ShMaterial for AlphaTexturedMaterial {
    fn kind(&self) -> MaterialKind {
        MaterialKind::AlphaTextured
    }

    fn diffuse_intensity(&self, texcoord: [f32; 2]) -> Intensity {
        let wrap = |t: f32, extent: usize| {
            let t = f64::from(t).rem_euclid(1.0);
            ((t * extent as f64) as usize).min(extent - 1)
        };
        let x = wrap(texcoord[0], self.width);
        let y = wrap(texcoord[1], self.height);
        self.texels[y * self.width + x]
    }

    fn has_transparency_transfer(&self) -> bool {
        true
    }
}

// -------------------------------------------------------------------------------------------------
