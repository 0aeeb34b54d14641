use core::fmt;

// -------------------------------------------------------------------------------------------------

/// Error from constructing a [`SampleHandle`] whose fields do not fit the
/// packed 32-bit layout.
#[derive(Clone, Copy, Debug, displaydoc::Display, Eq, PartialEq)]
#[non_exhaustive]
pub enum HandleOverflow {
    /// face index {face} does not fit the 5-bit face field
    Face {
        #[allow(missing_docs)]
        face: u32,
    },
    /// subdivision depth {depth} exceeds the available handle bits
    Depth {
        #[allow(missing_docs)]
        depth: usize,
    },
    /// leaf index {leaf} does not fit in the {bits} bits left by the subdivision path
    Leaf {
        #[allow(missing_docs)]
        leaf: u32,
        #[allow(missing_docs)]
        bits: u32,
    },
    /// sample index {index} exceeds the handle range
    Index {
        #[allow(missing_docs)]
        index: usize,
    },
}

impl core::error::Error for HandleOverflow {}

/// Bits reserved for the icosahedron face index (20 faces).
pub const FACE_BITS: u32 = 5;

// -------------------------------------------------------------------------------------------------

/// Stable identifier of one sphere sample, valid until the next generator restart.
///
/// For a linear organizer this is a plain index. For the icosahedron organizer
/// it packs, from the most significant bits down:
/// the face index ([`FACE_BITS`] bits), then two bits per subdivision level
/// selecting a sub-triangle, then the sample's index within the leaf.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SampleHandle(u32);

impl SampleHandle {
    /// A handle that is a plain flat index.
    #[inline]
    pub fn from_index(index: usize) -> Result<Self, HandleOverflow> {
        u32::try_from(index)
            .map(Self)
            .map_err(|_| HandleOverflow::Index { index })
    }

    /// Pack an icosahedron sample address.
    ///
    /// `path` holds one sub-triangle selector (`0..4`) per subdivision level,
    /// coarsest first; values `≥ 4` are a programmer error. `leaf` is the
    /// sample's index within its leaf triangle.
    pub fn pack(face: u32, path: &[u8], leaf: u32) -> Result<Self, HandleOverflow> {
        if face >= 20 {
            return Err(HandleOverflow::Face { face });
        }
        let path_bits = 2 * u32::try_from(path.len())
            .map_err(|_| HandleOverflow::Depth { depth: path.len() })?;
        if FACE_BITS + path_bits > u32::BITS {
            return Err(HandleOverflow::Depth { depth: path.len() });
        }
        let leaf_bits = u32::BITS - FACE_BITS - path_bits;
        if leaf >= 1 << leaf_bits {
            return Err(HandleOverflow::Leaf {
                leaf,
                bits: leaf_bits,
            });
        }

        let mut bits = face << (u32::BITS - FACE_BITS);
        for (level, &selector) in path.iter().enumerate() {
            debug_assert!(selector < 4);
            let shift = u32::BITS - FACE_BITS - 2 * (level as u32 + 1);
            bits |= u32::from(selector & 0b11) << shift;
        }
        bits |= leaf;
        Ok(Self(bits))
    }

    /// The raw packed value; meaningful only to the organizer that issued the handle.
    #[inline]
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Interpret the handle as the flat index [`Self::from_index`] created it from.
    #[inline]
    pub(crate) fn as_index(self) -> usize {
        self.0 as usize
    }

    /// Unpack an icosahedron address packed with the given subdivision depth.
    pub(crate) fn unpack(self, depth: usize) -> (u32, u32, u32) {
        let path_bits = 2 * depth as u32;
        let leaf_bits = u32::BITS - FACE_BITS - path_bits;
        let face = self.0 >> (u32::BITS - FACE_BITS);
        let path = (self.0 >> leaf_bits) & ((1 << path_bits) - 1);
        let leaf = self.0 & ((1u32 << leaf_bits) - 1);
        (face, path, leaf)
    }
}

impl fmt::Debug for SampleHandle {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "SampleHandle({:#010x})", self.0)
    }
}
