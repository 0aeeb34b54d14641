//! Mesh data as consumed by the transfer engine.

use std::sync::Arc;

use prt_bake_base::math::{Aab, FreePoint, FreeVector};

use crate::material::ShMaterial;
use crate::sh::ShRotationMatrix;

// -------------------------------------------------------------------------------------------------

/// One triangle of an [`IndexedMesh`]: three corners, each addressing a
/// position, a normal, and a texture coordinate, plus the face's material.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[expect(clippy::exhaustive_structs)]
pub struct Face {
    /// Indices into [`IndexedMesh::positions`] (and tangent frames).
    pub positions: [u32; 3],
    /// Indices into [`IndexedMesh::normals`].
    pub normals: [u32; 3],
    /// Indices into [`IndexedMesh::texcoords`].
    pub texcoords: [u32; 3],
    /// Index into the mesh's material table.
    pub material: u32,
}

/// Orthonormal surface frame at a vertex, for tangent-space lookups.
#[derive(Clone, Copy, Debug, PartialEq)]
#[expect(clippy::exhaustive_structs)]
pub struct TangentFrame {
    #[allow(missing_docs)]
    pub normal: FreeVector,
    #[allow(missing_docs)]
    pub binormal: FreeVector,
    #[allow(missing_docs)]
    pub tangent: FreeVector,
}

impl TangentFrame {
    /// Map a tangent-space direction (Z up along the normal) to world space.
    #[inline]
    pub fn to_world(&self, local: FreeVector) -> FreeVector {
        self.tangent * local.x + self.binormal * local.y + self.normal * local.z
    }

    /// An arbitrary but deterministic frame around `normal`.
    pub fn around_normal(normal: FreeVector) -> Self {
        let reference = if normal.x.abs() < 0.9 {
            FreeVector::new(1.0, 0.0, 0.0)
        } else {
            FreeVector::new(0.0, 1.0, 0.0)
        };
        let tangent = normal.cross(reference).normalize();
        let binormal = normal.cross(tangent);
        Self {
            normal,
            binormal,
            tangent,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Error from [`IndexedMesh::new()`]: some face refers past the end of an
/// attribute table.
#[derive(Clone, Copy, Debug, displaydoc::Display, Eq, PartialEq)]
#[non_exhaustive]
pub enum MeshError {
    /// face {face} refers to {attribute} index {index}, table has {len} entries
    IndexOutOfRange {
        #[allow(missing_docs)]
        face: usize,
        #[allow(missing_docs)]
        attribute: &'static str,
        #[allow(missing_docs)]
        index: u32,
        #[allow(missing_docs)]
        len: usize,
    },
}

impl core::error::Error for MeshError {}

// -------------------------------------------------------------------------------------------------

/// An indexed triangle mesh with the attributes the transfer passes need:
/// world-space positions and normals, per-vertex tangent frames, texture
/// coordinates, per-face materials, and an optional rotation of the
/// spherical-harmonics output into object space.
#[derive(Clone, Debug)]
pub struct IndexedMesh {
    faces: Vec<Face>,
    positions: Vec<FreePoint>,
    normals: Vec<FreeVector>,
    tangent_frames: Vec<TangentFrame>,
    texcoords: Vec<[f32; 2]>,
    materials: Vec<Arc<dyn ShMaterial>>,
    sh_rotation: Option<ShRotationMatrix>,
}

impl IndexedMesh {
    /// Validates that every face index is within its attribute table.
    ///
    /// `tangent_frames` is indexed like `positions` (one frame per vertex
    /// position). `sh_rotation` rotates finished coefficient lists from world
    /// into object space; [`None`] means the mesh is unrotated.
    pub fn new(
        faces: Vec<Face>,
        positions: Vec<FreePoint>,
        normals: Vec<FreeVector>,
        tangent_frames: Vec<TangentFrame>,
        texcoords: Vec<[f32; 2]>,
        materials: Vec<Arc<dyn ShMaterial>>,
        sh_rotation: Option<ShRotationMatrix>,
    ) -> Result<Self, MeshError> {
        for (face_number, face) in faces.iter().enumerate() {
            let check = |attribute: &'static str, index: u32, len: usize| {
                if (index as usize) < len {
                    Ok(())
                } else {
                    Err(MeshError::IndexOutOfRange {
                        face: face_number,
                        attribute,
                        index,
                        len,
                    })
                }
            };
            for corner in 0..3 {
                check("position", face.positions[corner], positions.len())?;
                check("position", face.positions[corner], tangent_frames.len())?;
                check("normal", face.normals[corner], normals.len())?;
                check("texcoord", face.texcoords[corner], texcoords.len())?;
            }
            check("material", face.material, materials.len())?;
        }
        Ok(Self {
            faces,
            positions,
            normals,
            tangent_frames,
            texcoords,
            materials,
            sh_rotation,
        })
    }

    #[allow(missing_docs)]
    #[inline]
    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    #[allow(missing_docs)]
    #[inline]
    pub fn positions(&self) -> &[FreePoint] {
        &self.positions
    }

    #[allow(missing_docs)]
    #[inline]
    pub fn normals(&self) -> &[FreeVector] {
        &self.normals
    }

    #[allow(missing_docs)]
    #[inline]
    pub fn tangent_frames(&self) -> &[TangentFrame] {
        &self.tangent_frames
    }

    #[allow(missing_docs)]
    #[inline]
    pub fn texcoords(&self) -> &[[f32; 2]] {
        &self.texcoords
    }

    /// The face's material.
    #[inline]
    pub fn material(&self, face: &Face) -> &dyn ShMaterial {
        &*self.materials[face.material as usize]
    }

    /// Whether this face's vertices get transfer coefficients computed.
    #[inline]
    pub fn compute_sh_coeffs(&self, face: &Face) -> bool {
        self.material(face).computes_sh_coefficients()
    }

    /// Whether this face may block rays during casting.
    #[inline]
    pub fn consider_for_ray_casting(&self, face: &Face) -> bool {
        self.material(face).considered_for_ray_casting()
    }

    /// World→object rotation applied to finished coefficient lists, if any.
    #[inline]
    pub fn sh_rotation(&self) -> Option<&ShRotationMatrix> {
        self.sh_rotation.as_ref()
    }

    /// World positions of a face's three corners.
    #[inline]
    pub fn face_positions(&self, face: &Face) -> [FreePoint; 3] {
        face.positions.map(|i| self.positions[i as usize])
    }

    /// Bounding box of all vertex positions; [`None`] for an empty mesh.
    pub fn bounding_box(&self) -> Option<Aab> {
        let mut points = self.positions.iter();
        let mut bounds = Aab::from_point(*points.next()?);
        for &point in points {
            bounds = bounds.union_point(point);
        }
        Some(bounds)
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use euclid::{point3, vec3};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::material::DiffuseMaterial;

    fn quad_mesh() -> IndexedMesh {
        let up = vec3(0.0, 0.0, 1.0);
        IndexedMesh::new(
            vec![
                Face {
                    positions: [0, 1, 2],
                    normals: [0, 0, 0],
                    texcoords: [0, 0, 0],
                    material: 0,
                },
                Face {
                    positions: [0, 2, 3],
                    normals: [0, 0, 0],
                    texcoords: [0, 0, 0],
                    material: 0,
                },
            ],
            vec![
                point3(0., 0., 0.),
                point3(1., 0., 0.),
                point3(1., 1., 0.),
                point3(0., 1., 0.),
            ],
            vec![up],
            vec![TangentFrame::around_normal(up); 4],
            vec![[0.0, 0.0]],
            vec![Arc::new(DiffuseMaterial::WHITE)],
            None,
        )
        .unwrap()
    }

    #[test]
    fn bounding_box() {
        assert_eq!(
            quad_mesh().bounding_box(),
            Some(Aab::from_lower_upper([0., 0., 0.], [1., 1., 0.]))
        );
    }

    #[test]
    fn out_of_range_index_rejected() {
        let mut bad = quad_mesh();
        // Rebuild with a face pointing past the position table.
        let mut faces = bad.faces().to_vec();
        faces[0].positions[1] = 9;
        let result = IndexedMesh::new(
            faces,
            bad.positions.clone(),
            bad.normals.clone(),
            bad.tangent_frames.clone(),
            bad.texcoords.clone(),
            core::mem::take(&mut bad.materials),
            None,
        );
        assert_eq!(
            result.unwrap_err(),
            MeshError::IndexOutOfRange {
                face: 0,
                attribute: "position",
                index: 9,
                len: 4,
            }
        );
    }

    #[test]
    fn tangent_frame_is_orthonormal() {
        for normal in [vec3(0.0, 0.0, 1.0), vec3(1.0, 0.0, 0.0), vec3(0.6, 0.0, 0.8)] {
            let frame = TangentFrame::around_normal(normal);
            assert!((frame.tangent.length() - 1.0).abs() < 1e-12);
            assert!(frame.tangent.dot(frame.normal).abs() < 1e-12);
            assert!(frame.binormal.dot(frame.normal).abs() < 1e-12);
            assert!(frame.binormal.dot(frame.tangent).abs() < 1e-12);
            // Z in tangent space maps back to the normal.
            let world = frame.to_world(vec3(0.0, 0.0, 1.0));
            assert!((world - normal).length() < 1e-12);
        }
    }
}
