use std::sync::Arc;

use euclid::{point3, vec3};
use pretty_assertions::assert_eq;

use super::*;
use crate::material::{DiffuseMaterial, Intensity, MaterialKind, ShMaterial};
use crate::mesh::{Face, IndexedMesh, TangentFrame};

/// An axis-aligned square in the z = `z` plane spanning `[lo, hi]²`.
fn quad_mesh(z: f64, lo: f64, hi: f64, material: Arc<dyn ShMaterial>) -> IndexedMesh {
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
            point3(lo, lo, z),
            point3(hi, lo, z),
            point3(hi, hi, z),
            point3(lo, hi, z),
        ],
        vec![up],
        vec![TangentFrame::around_normal(up); 4],
        vec![[0.0, 0.0]],
        vec![material],
        None,
    )
    .unwrap()
}

fn opaque() -> Arc<dyn ShMaterial> {
    Arc::new(DiffuseMaterial::WHITE)
}

/// A material whose faces never block rays.
#[derive(Debug)]
struct NonBlocking;
impl ShMaterial for NonBlocking {
    fn kind(&self) -> MaterialKind {
        MaterialKind::Default
    }
    fn diffuse_intensity(&self, _texcoord: [f32; 2]) -> Intensity {
        Intensity::WHITE
    }
    fn considered_for_ray_casting(&self) -> bool {
        false
    }
}

/// See-through material for `cast_all` tests.
#[derive(Debug)]
struct Transparent;
impl ShMaterial for Transparent {
    fn kind(&self) -> MaterialKind {
        MaterialKind::AlphaTextured
    }
    fn diffuse_intensity(&self, _texcoord: [f32; 2]) -> Intensity {
        Intensity {
            rgb: [1.0, 1.0, 1.0],
            alpha: 0.5,
        }
    }
    fn has_transparency_transfer(&self) -> bool {
        true
    }
}

// -------------------------------------------------------------------------------------------------

#[test]
fn setup_rejects_empty_scene() {
    assert_eq!(
        RayCaster::setup_geometry(&[], 1e-4).unwrap_err(),
        SetupError::NoGeometry
    );
}

#[test]
fn setup_rejects_scene_where_every_face_opts_out() {
    let mesh = quad_mesh(0.0, 0.0, 4.0, Arc::new(NonBlocking));
    assert_eq!(
        RayCaster::setup_geometry(&[mesh], 1e-4).unwrap_err(),
        SetupError::NoGeometry
    );
}

#[test]
fn flat_scene_is_accepted() {
    let mesh = quad_mesh(0.0, 0.0, 4.0, opaque());
    let caster = RayCaster::setup_geometry(&[mesh], 1e-4).unwrap();
    // Ray length is the corner-to-corner diagonal of the (flat) scene box.
    assert!((caster.ray_length() - 32.0f64.sqrt()).abs() < 1e-12);
}

#[test]
fn closest_hit_of_stacked_quads() {
    let meshes = [
        quad_mesh(0.0, 0.0, 4.0, opaque()),
        quad_mesh(2.0, 0.0, 4.0, opaque()),
    ];
    let mut caster = RayCaster::setup_geometry(&meshes, 1e-4).unwrap();
    let hit = caster
        .cast(point3(2.0, 2.0, 5.0), vec3(0.0, 0.0, -1.0))
        .expect("both quads lie under the ray");
    assert_eq!(hit.mesh_index, 1, "the z=2 quad is nearer");
    assert!((hit.distance - 3.0).abs() < 1e-9);
    assert!(hit.fast_processing);
}

#[test]
fn miss_reports_none() {
    let mesh = quad_mesh(0.0, 0.0, 4.0, opaque());
    let mut caster = RayCaster::setup_geometry(&[mesh], 1e-4).unwrap();
    assert_eq!(caster.cast(point3(2.0, 2.0, 1.0), vec3(0.0, 0.0, 1.0)), None);
}

/// A fully unobstructed hemisphere must be detected, after which rays well
/// inside it are answered without touching the grid at all.
#[test]
fn full_vis_cache_short_circuits_open_sky() {
    let mesh = quad_mesh(0.0, -10.0, 10.0, opaque());
    let mut caster = RayCaster::setup_geometry(&[mesh], 1e-4).unwrap();

    // A point just above the middle of the floor: open sky upward.
    caster.reset_cache(point3(0.0, 0.0, 0.01), vec3(0.0, 0.0, 1.0), true);
    assert_eq!(caster.stats().probed_vertices, 1);
    assert_eq!(caster.stats().fully_visible_vertices, 1);

    let traversals_after_probe = caster.stats().grid_traversals;
    for direction in [
        vec3(0.0, 0.0, 1.0),
        vec3(0.5, 0.0, 1.0).normalize(),
        vec3(-0.3, 0.4, 0.9).normalize(),
    ] {
        assert_eq!(caster.cast(point3(0.0, 0.0, 0.01), direction), None);
    }
    assert_eq!(
        caster.stats().grid_traversals,
        traversals_after_probe,
        "short-circuited rays must not walk the grid"
    );
    assert_eq!(caster.stats().full_vis_successes, 3);
}

#[test]
fn full_vis_cache_rejects_blocked_hemisphere() {
    let meshes = [
        quad_mesh(0.0, -10.0, 10.0, opaque()),
        quad_mesh(5.0, -10.0, 10.0, opaque()), // roof
    ];
    let mut caster = RayCaster::setup_geometry(&meshes, 1e-4).unwrap();
    caster.reset_cache(point3(0.0, 0.0, 0.01), vec3(0.0, 0.0, 1.0), true);
    assert_eq!(caster.stats().fully_visible_vertices, 0);
    // Upward rays now really get cast, and really get blocked.
    assert!(
        caster
            .cast(point3(0.0, 0.0, 0.01), vec3(0.0, 0.0, 1.0))
            .is_some()
    );
}

/// Cache-assisted casting must agree with cache-free casting on whether each
/// ray is blocked.
#[test]
fn memo_cache_matches_full_traversal() {
    let meshes = [
        quad_mesh(0.0, -10.0, 10.0, opaque()),
        quad_mesh(3.0, -2.0, 2.0, opaque()), // a small occluder overhead
    ];
    let caster = RayCaster::setup_geometry(&meshes, 1e-4).unwrap();

    let origin = point3(0.0, 0.0, 0.01);
    let mut cached = caster.clone_for_thread();
    cached.reset_cache(origin, vec3(0.0, 0.0, 1.0), false);

    // A fan of directions, many consecutive ones hitting the same occluder so
    // the memo actually engages.
    for i in 0..64 {
        let angle = (i as f64 / 64.0 - 0.5) * 1.4;
        let direction = vec3(angle.sin(), 0.0, angle.cos()).normalize();

        let mut reference = caster.clone_for_thread();
        let expected = reference.cast(origin, direction).is_some();
        assert_eq!(
            cached.cast(origin, direction).is_some(),
            expected,
            "direction {direction:?}"
        );
    }
    assert!(
        cached.stats().cache_hits > 0,
        "the memo should have answered some of the consecutive blocked rays"
    );
    assert!(cached.stats().grid_traversals < cached.stats().rays);
}

#[test]
fn cast_all_returns_sorted_hits_and_opacity() {
    let meshes = [
        quad_mesh(0.0, 0.0, 4.0, opaque()),
        quad_mesh(2.0, 0.0, 4.0, Arc::new(Transparent)),
    ];
    let mut caster = RayCaster::setup_geometry(&meshes, 1e-4).unwrap();
    let mut hits = Vec::new();
    let any_opaque = caster.cast_all(point3(2.0, 2.0, 5.0), vec3(0.0, 0.0, -1.0), &mut hits);
    assert!(any_opaque, "the floor is opaque");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].mesh_index, 1);
    assert!(!hits[0].fast_processing);
    assert_eq!(hits[1].mesh_index, 0);
    assert!(hits[0].distance < hits[1].distance);

    // Transparent-only blocking is reported as not opaque.
    let transparent_only = [quad_mesh(2.0, 0.0, 4.0, Arc::new(Transparent))];
    let mut caster = RayCaster::setup_geometry(&transparent_only, 1e-4).unwrap();
    let any_opaque = caster.cast_all(point3(2.0, 2.0, 5.0), vec3(0.0, 0.0, -1.0), &mut hits);
    assert!(!any_opaque);
    assert_eq!(hits.len(), 1);
}

/// A ray through the shared diagonal of a quad's two triangles must report one
/// surface, not two, or transmission would be applied twice at every shared edge.
#[test]
fn cast_all_merges_shared_edge_hits() {
    let mesh = quad_mesh(0.0, 0.0, 4.0, Arc::new(Transparent));
    let mut caster = RayCaster::setup_geometry(&[mesh], 1e-4).unwrap();
    let mut hits = Vec::new();
    // (2, 2) lies exactly on the diagonal shared by the quad's two triangles.
    caster.cast_all(point3(2.0, 2.0, 5.0), vec3(0.0, 0.0, -1.0), &mut hits);
    assert_eq!(hits.len(), 1);
    // Off the diagonal there is only one intersecting triangle to begin with.
    caster.cast_all(point3(1.0, 2.0, 5.0), vec3(0.0, 0.0, -1.0), &mut hits);
    assert_eq!(hits.len(), 1);
}

/// The hemisphere probe must count transmitting occluders as blocking;
/// only blocked-or-not matters to it, not opacity.
#[test]
fn full_vis_probe_counts_transparent_occluders() {
    let meshes = [
        quad_mesh(0.0, -10.0, 10.0, opaque()),
        quad_mesh(5.0, -10.0, 10.0, Arc::new(Transparent)),
    ];
    let mut caster = RayCaster::setup_geometry(&meshes, 1e-4).unwrap();
    caster.reset_cache(point3(0.0, 0.0, 0.01), vec3(0.0, 0.0, 1.0), true);
    assert_eq!(caster.stats().probed_vertices, 1);
    assert_eq!(caster.stats().fully_visible_vertices, 0);
}

#[test]
fn bias_suppresses_self_intersection() {
    let mesh = quad_mesh(0.0, 0.0, 4.0, opaque());
    let mut caster = RayCaster::setup_geometry(&[mesh], 1e-3).unwrap();
    // Starting just barely above the floor and grazing down: the only hit
    // would be at a distance below the bias.
    assert_eq!(
        caster.cast(point3(2.0, 2.0, 1e-4), vec3(0.0, 0.0, -1.0)),
        None
    );
}

#[test]
fn stats_merge_accumulates() {
    let mut a = CastStats {
        rays: 10,
        grid_traversals: 4,
        full_vis_queries: 10,
        full_vis_successes: 5,
        cache_hits: 1,
        fully_visible_vertices: 1,
        probed_vertices: 2,
    };
    a.merge(CastStats {
        rays: 2,
        grid_traversals: 1,
        full_vis_queries: 0,
        full_vis_successes: 0,
        cache_hits: 0,
        fully_visible_vertices: 0,
        probed_vertices: 1,
    });
    assert_eq!(a.rays, 12);
    assert_eq!(a.probed_vertices, 3);
    assert!((a.average_full_visibility() - 1.0 / 3.0).abs() < 1e-12);
}
