use prt_bake_base::math::{FreeCoordinate, FreePoint, FreeVector};

/// A ray must not be blocked by a triangle whose plane its origin lies on
/// (the triangle it was cast from); "lies on" means within this distance.
const SOURCE_PLANE_EPSILON: FreeCoordinate = 1e-5;

/// Rays closer than this to parallel with a triangle's plane do not hit it;
/// such grazing intersections are numerically meaningless.
const PARALLEL_EPSILON: FreeCoordinate = 1e-5;

// -------------------------------------------------------------------------------------------------

/// One triangle as stored by the ray caster: world-space corners plus the
/// fields needed to interpret a hit.
#[derive(Clone, Copy, Debug)]
pub(crate) struct CastTriangle {
    pub(crate) vertices: [FreePoint; 3],
    /// Unit face normal; +Z for degenerate faces (which then never pass the
    /// parallel test against near-horizontal rays, a harmless outcome for
    /// zero-area geometry).
    pub(crate) normal: FreeVector,
    pub(crate) mesh_index: u32,
    pub(crate) face_index: u32,
    /// Fully opaque: a hit settles the ray with no need to look further.
    pub(crate) fast_processing: bool,
    pub(crate) single_sided: bool,
}

/// Raw ray/triangle intersection, before interpretation by the caster.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct TriangleHit {
    pub(crate) distance: FreeCoordinate,
    /// Barycentric weights of the second and third vertex.
    pub(crate) barycentric: [FreeCoordinate; 2],
}

impl CastTriangle {
    pub(crate) fn new(
        vertices: [FreePoint; 3],
        mesh_index: u32,
        face_index: u32,
        fast_processing: bool,
        single_sided: bool,
    ) -> Self {
        let cross = (vertices[1] - vertices[0]).cross(vertices[2] - vertices[0]);
        let normal = if cross.square_length() > 0.0 {
            cross.normalize()
        } else {
            FreeVector::new(0.0, 0.0, 1.0)
        };
        Self {
            vertices,
            normal,
            mesh_index,
            face_index,
            fast_processing,
            single_sided,
        }
    }

    /// Möller–Trumbore intersection against a unit-direction ray, accepting
    /// `distance ∈ [bias, max_distance)`.
    ///
    /// Rejects near-parallel rays, rays originating in this triangle's plane,
    /// and (for single-sided triangles) back-face hits.
    pub(crate) fn intersect(
        &self,
        origin: FreePoint,
        direction: FreeVector,
        bias: FreeCoordinate,
        max_distance: FreeCoordinate,
    ) -> Option<TriangleHit> {
        let facing = self.normal.dot(direction);
        if facing.abs() <= PARALLEL_EPSILON {
            return None;
        }
        if self.single_sided && facing > 0.0 {
            return None;
        }
        // Self-intersection guard: a ray starting on this plane was cast from it.
        if self.normal.dot(origin - self.vertices[0]).abs() <= SOURCE_PLANE_EPSILON {
            return None;
        }

        let edge1 = self.vertices[1] - self.vertices[0];
        let edge2 = self.vertices[2] - self.vertices[0];
        let pvec = direction.cross(edge2);
        let det = edge1.dot(pvec);
        if det.abs() < f64::EPSILON {
            return None;
        }
        let inv_det = det.recip();
        let tvec = origin - self.vertices[0];
        let u = tvec.dot(pvec) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let qvec = tvec.cross(edge1);
        let v = direction.dot(qvec) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let distance = edge2.dot(qvec) * inv_det;
        if distance < bias || distance >= max_distance {
            return None;
        }
        Some(TriangleHit {
            distance,
            barycentric: [u, v],
        })
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use euclid::{point3, vec3};

    use super::*;

    fn unit_triangle() -> CastTriangle {
        CastTriangle::new(
            [
                point3(0., 0., 0.),
                point3(1., 0., 0.),
                point3(0., 1., 0.),
            ],
            0,
            0,
            true,
            false,
        )
    }

    #[test]
    fn straight_hit() {
        let hit = unit_triangle()
            .intersect(point3(0.25, 0.25, 1.0), vec3(0., 0., -1.), 0.0, 10.0)
            .unwrap();
        assert!((hit.distance - 1.0).abs() < 1e-12);
        assert!((hit.barycentric[0] - 0.25).abs() < 1e-12);
        assert!((hit.barycentric[1] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn miss_outside_edges() {
        assert_eq!(
            unit_triangle().intersect(point3(0.9, 0.9, 1.0), vec3(0., 0., -1.), 0.0, 10.0),
            None
        );
    }

    #[test]
    fn bias_window() {
        let tri = unit_triangle();
        let origin = point3(0.25, 0.25, 1.0);
        let down = vec3(0., 0., -1.);
        assert!(tri.intersect(origin, down, 1.5, 10.0).is_none(), "below bias");
        assert!(tri.intersect(origin, down, 0.0, 0.5).is_none(), "beyond max");
        assert!(tri.intersect(origin, down, 0.5, 1.5).is_some());
    }

    #[test]
    fn near_parallel_rejected() {
        let grazing = vec3(1.0, 0.0, -1e-6).normalize();
        assert_eq!(
            unit_triangle().intersect(point3(-1.0, 0.25, 1e-4), grazing, 0.0, 10.0),
            None
        );
    }

    #[test]
    fn source_plane_rejected() {
        // Origin within epsilon of the triangle's plane: cast from this surface.
        assert_eq!(
            unit_triangle().intersect(point3(0.25, 0.25, 1e-6), vec3(0., 0., -1.), 0.0, 10.0),
            None
        );
    }

    #[test]
    fn single_sided_rejects_back_face() {
        let tri = CastTriangle::new(
            [
                point3(0., 0., 0.),
                point3(1., 0., 0.),
                point3(0., 1., 0.),
            ],
            0,
            0,
            true,
            true,
        );
        // Normal is +Z; a ray travelling +Z hits the back face.
        assert_eq!(
            tri.intersect(point3(0.25, 0.25, -1.0), vec3(0., 0., 1.), 0.0, 10.0),
            None
        );
        assert!(
            tri.intersect(point3(0.25, 0.25, 1.0), vec3(0., 0., -1.), 0.0, 10.0)
                .is_some()
        );
    }

    #[test]
    fn degenerate_face_gets_fallback_normal() {
        let degenerate = CastTriangle::new(
            [point3(0., 0., 0.), point3(1., 1., 1.), point3(2., 2., 2.)],
            0,
            0,
            true,
            false,
        );
        assert_eq!(degenerate.normal, vec3(0., 0., 1.));
    }
}
