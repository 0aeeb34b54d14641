use std::f64::consts::PI;
use std::sync::Arc;

use euclid::{point3, vec3};
use pretty_assertions::assert_eq;
use rstest::rstest;

use super::*;
use crate::material::{DiffuseMaterial, ShMaterial};
use crate::mesh::{Face, IndexedMesh, TangentFrame};
use crate::sample::{LinearOrganizer, SampleGenerator, SamplePolicy};

/// An axis-aligned square in the z = `z` plane spanning `[lo, hi]²`,
/// facing +Z.
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

/// A see-through white pane: alpha 0.5, so it transmits half the light.
#[derive(Debug)]
struct HalfPane;
impl ShMaterial for HalfPane {
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

fn session(parameters: TransferParameters) -> BakeSession {
    BakeSession::new(
        SampleGenerator::new(
            SamplePolicy::Hammersley,
            Box::new(LinearOrganizer::new(1 << 20)),
        ),
        ShDescriptor::THREE_BANDS,
        parameters,
        Box::new(DefaultTransferConfigurator),
    )
}

fn run(
    parameters: TransferParameters,
    meshes: &[IndexedMesh],
) -> (InterreflectionTransfer, Vec<Vec<CoeffList>>) {
    let mut engine = InterreflectionTransfer::new();
    let mut session = session(parameters);
    let outputs = engine.process(&mut session, meshes, &mut ()).unwrap();
    (engine, outputs)
}

// -------------------------------------------------------------------------------------------------

#[rstest]
#[case(TransferParameters { sample_count_per_vertex: 0, ..TransferParameters::default() })]
#[case(TransferParameters { ray_casting_threads: 0, ..TransferParameters::default() })]
#[case(TransferParameters { ray_tracing_bias: -1.0, ..TransferParameters::default() })]
#[case(TransferParameters { ray_tracing_bias: f64::NAN, ..TransferParameters::default() })]
#[case(TransferParameters { min_direct_bump_coeff_visibility: 1.5, ..TransferParameters::default() })]
#[case(TransferParameters { ground_plane_block_value: -0.1, ..TransferParameters::default() })]
fn inconsistent_parameters_fail_fast(#[case] parameters: TransferParameters) {
    assert!(matches!(
        parameters.check_for_consistency(),
        Err(TransferError::InconsistentParameters { .. })
    ));
    // process() must fail the same way, before doing any work.
    let mesh = quad_mesh(0.0, 0.0, 4.0, Arc::new(DiffuseMaterial::WHITE));
    let mut engine = InterreflectionTransfer::new();
    assert!(matches!(
        engine.process(&mut session(parameters), &[mesh], &mut ()),
        Err(TransferError::InconsistentParameters { .. })
    ));
}

#[test]
fn empty_scene_is_a_setup_error() {
    let mut engine = InterreflectionTransfer::new();
    assert!(matches!(
        engine.process(&mut session(TransferParameters::default()), &[], &mut ()),
        Err(TransferError::Setup(SetupError::NoGeometry))
    ));
}

/// An unshadowed white quad must converge to the analytic cosine-lobe
/// projection: `Y00 → 1/(2√π)`, `Y10 → 2/3·√(3/(4π))·…` — numerically
/// 0.2821 and 0.3257 — with all `m ≠ 0` coefficients vanishing.
#[test]
fn unshadowed_quad_converges_to_cosine_lobe() {
    let mesh = quad_mesh(0.0, -5.0, 5.0, Arc::new(DiffuseMaterial::WHITE));
    let (_, outputs) = run(
        TransferParameters {
            sample_count_per_vertex: 4000,
            ..TransferParameters::default()
        },
        &[mesh],
    );

    let d = ShDescriptor::THREE_BANDS;
    let expected_y00 = 1.0 / (2.0 * PI.sqrt());
    let expected_y10 = 2.0 / 3.0 * (3.0 / (4.0 * PI)).sqrt();
    for (vertex, coefficients) in outputs[0].iter().enumerate() {
        let y00 = f64::from(coefficients[d.index_of(0, 0)]);
        let y10 = f64::from(coefficients[d.index_of(1, 0)]);
        assert!(
            (y00 - expected_y00).abs() < 0.02,
            "vertex {vertex}: Y00 = {y00}, expected {expected_y00}"
        );
        assert!(
            (y10 - expected_y10).abs() < 0.02,
            "vertex {vertex}: Y10 = {y10}, expected {expected_y10}"
        );
        for (l, m) in [(1, -1), (1, 1), (2, -2), (2, -1), (2, 1), (2, 2)] {
            let value = f64::from(coefficients[d.index_of(l, m)]);
            assert!(
                value.abs() < 0.02,
                "vertex {vertex}: Y({l},{m}) = {value}, expected 0"
            );
        }
    }
}

/// The equal-area Hammersley set keeps the estimate tight from modest sample
/// counts up; at these error levels (f32 rounding noise) monotone shrinkage
/// is not guaranteed, so each count is held to a tolerance instead.
#[test]
fn estimate_stays_tight_across_sample_counts() {
    let expected_y00 = 1.0 / (2.0 * PI.sqrt());
    let error_at = |count: usize| {
        let mesh = quad_mesh(0.0, -5.0, 5.0, Arc::new(DiffuseMaterial::WHITE));
        let (_, outputs) = run(
            TransferParameters {
                sample_count_per_vertex: count,
                ..TransferParameters::default()
            },
            &[mesh],
        );
        (f64::from(outputs[0][0][0]) - expected_y00).abs()
    };
    for count in [100, 1000, 8000] {
        let error = error_at(count);
        assert!(error < 1e-3, "{count} samples: error {error}");
    }
}

/// A vertex under a light-tight roof sees nothing.
#[test]
fn fully_shadowed_vertex_gets_zero_coefficients() {
    let meshes = [
        quad_mesh(0.0, -2.0, 2.0, Arc::new(DiffuseMaterial::WHITE)),
        quad_mesh(1.0, -50.0, 50.0, Arc::new(DiffuseMaterial::WHITE)),
    ];
    let (engine, outputs) = run(
        TransferParameters {
            sample_count_per_vertex: 500,
            ..TransferParameters::default()
        },
        &meshes,
    );
    for coefficients in &outputs[0] {
        for &c in coefficients.as_slice() {
            assert!(c.abs() < 1e-3, "shadowed coefficient {c} should vanish");
        }
    }
    // Every blocked ray left a record naming the roof.
    assert!(!engine.ray_cache_entries()[0].is_empty());
    assert!(
        engine.ray_cache_entries()[0]
            .iter()
            .all(|entry| entry.mesh_index == 1)
    );
}

#[test]
fn recorded_handles_resolve_to_samples() {
    let meshes = [
        quad_mesh(0.0, -2.0, 2.0, Arc::new(DiffuseMaterial::WHITE)),
        quad_mesh(1.0, -50.0, 50.0, Arc::new(DiffuseMaterial::WHITE)),
    ];
    let mut engine = InterreflectionTransfer::new();
    let mut session = session(TransferParameters {
        sample_count_per_vertex: 200,
        ..TransferParameters::default()
    });
    engine.process(&mut session, &meshes, &mut ()).unwrap();
    for entry in &engine.ray_cache_entries()[0] {
        let sample = session
            .generator()
            .sample(entry.sample_handle)
            .expect("recorded handle must resolve");
        // Direct-pass records are upper-hemisphere rays.
        assert!(sample.direction().z >= 0.0);
    }
}

/// Roughly half of an upper-hemisphere vertex's samples lie below its horizon.
#[test]
fn lower_hemisphere_counts_are_tracked() {
    let mesh = quad_mesh(0.0, -5.0, 5.0, Arc::new(DiffuseMaterial::WHITE));
    let (engine, _) = run(
        TransferParameters {
            sample_count_per_vertex: 1000,
            ..TransferParameters::default()
        },
        &[mesh],
    );
    for &count in &engine.lower_hemisphere_counts()[0] {
        assert!((400..600).contains(&(count as usize)), "count {count}");
    }
}

/// Multi-threaded and single-threaded runs must agree.
#[test]
fn thread_count_does_not_change_results() {
    let meshes = [
        quad_mesh(0.0, -5.0, 5.0, Arc::new(DiffuseMaterial::WHITE)),
        quad_mesh(2.0, -1.5, 1.5, Arc::new(DiffuseMaterial::WHITE)),
    ];
    let base = TransferParameters {
        sample_count_per_vertex: 600,
        ..TransferParameters::default()
    };
    let (_, single) = run(
        TransferParameters {
            ray_casting_threads: 1,
            ..base
        },
        &meshes,
    );
    let (_, multi) = run(
        TransferParameters {
            ray_casting_threads: 4,
            ..base
        },
        &meshes,
    );
    for (mesh_single, mesh_multi) in single.iter().zip(&multi) {
        for (a, b) in mesh_single.iter().zip(mesh_multi) {
            for (ca, cb) in a.as_slice().iter().zip(b.as_slice()) {
                assert!((ca - cb).abs() < 1e-6, "{ca} != {cb}");
            }
        }
    }
}

/// A half-transparent pane dims the sky instead of blacking it out.
#[test]
fn transparency_transmits_scaled_light() {
    let floor = || quad_mesh(0.0, -2.0, 2.0, Arc::new(DiffuseMaterial::WHITE));
    let pane = quad_mesh(1.0, -50.0, 50.0, Arc::new(HalfPane));
    let parameters = TransferParameters {
        sample_count_per_vertex: 1500,
        support_transparency: true,
        ..TransferParameters::default()
    };

    let (_, open) = run(parameters, &[floor()]);
    let (_, covered) = run(parameters, &[floor(), pane]);

    let open_y00 = f64::from(open[0][0][0]);
    let covered_y00 = f64::from(covered[0][0][0]);
    assert!(
        covered_y00 < open_y00 * 0.7,
        "pane must dim: {covered_y00} vs {open_y00}"
    );
    assert!(
        covered_y00 > open_y00 * 0.3,
        "pane must not black out: {covered_y00} vs {open_y00}"
    );
}

/// Faces whose material opts out of transfer leave their vertices untouched.
#[test]
fn opted_out_material_is_skipped() {
    #[derive(Debug)]
    struct NoTransfer;
    impl ShMaterial for NoTransfer {
        fn kind(&self) -> MaterialKind {
            MaterialKind::Default
        }
        fn diffuse_intensity(&self, _texcoord: [f32; 2]) -> Intensity {
            Intensity::WHITE
        }
        fn computes_sh_coefficients(&self) -> bool {
            false
        }
    }

    let meshes = [
        quad_mesh(0.0, -2.0, 2.0, Arc::new(NoTransfer)),
        quad_mesh(5.0, -2.0, 2.0, Arc::new(DiffuseMaterial::WHITE)),
    ];
    let (engine, outputs) = run(
        TransferParameters {
            sample_count_per_vertex: 200,
            ..TransferParameters::default()
        },
        &meshes,
    );
    for coefficients in &outputs[0] {
        assert!(coefficients.as_slice().iter().all(|&c| c == 0.0));
    }
    assert!(outputs[1].iter().any(|c| c[0] != 0.0));
    // Only the second mesh's four vertices were processed.
    assert_eq!(engine.status().vertices_processed, 4);
}

/// The observer sees one notification per vertex and per mesh.
#[test]
fn observer_receives_progress() {
    #[derive(Default)]
    struct Recorder {
        vertices: usize,
        meshes: usize,
        last_vertex_count: usize,
    }
    impl ProgressObserver for Recorder {
        fn vertex_processed(&mut self, status: &TransferStatus) {
            self.vertices += 1;
            self.last_vertex_count = status.vertices_processed;
        }
        fn mesh_processed(&mut self, status: &TransferStatus) {
            self.meshes += 1;
            assert_eq!(status.mesh_count, 2);
        }
    }

    let meshes = [
        quad_mesh(0.0, -2.0, 2.0, Arc::new(DiffuseMaterial::WHITE)),
        quad_mesh(5.0, -2.0, 2.0, Arc::new(DiffuseMaterial::WHITE)),
    ];
    let mut engine = InterreflectionTransfer::new();
    let mut recorder = Recorder::default();
    engine
        .process(
            &mut session(TransferParameters {
                sample_count_per_vertex: 100,
                ..TransferParameters::default()
            }),
            &meshes,
            &mut recorder,
        )
        .unwrap();
    assert_eq!(recorder.vertices, 8);
    assert_eq!(recorder.meshes, 2);
    assert_eq!(recorder.last_vertex_count, 8);
}

/// Bump granularity adds below-horizon energy where the border is open.
#[test]
fn bump_granularity_adds_border_visibility() {
    let mesh = || quad_mesh(0.0, -5.0, 5.0, Arc::new(DiffuseMaterial::WHITE));
    let base = TransferParameters {
        sample_count_per_vertex: 2000,
        ..TransferParameters::default()
    };
    let (_, plain) = run(base, &[mesh()]);
    let (_, bumped) = run(
        TransferParameters {
            bump_granularity: true,
            ..base
        },
        &[mesh()],
    );
    // The open border around a bare quad adds energy to the constant term.
    assert!(f64::from(bumped[0][0][0]) > f64::from(plain[0][0][0]));
}

/// Bump-granularity output is a visibility lookup, not an irradiance
/// convolution: for a fully open quad the constant term converges to
/// `4π/N · Y00 · (Σ_upper cos + Σ_band 1) = 2π · Y00 = √π`.
#[test]
fn bump_mode_constant_term_matches_lookup_scale() {
    let mesh = quad_mesh(0.0, -5.0, 5.0, Arc::new(DiffuseMaterial::WHITE));
    let (_, outputs) = run(
        TransferParameters {
            sample_count_per_vertex: 4000,
            bump_granularity: true,
            ..TransferParameters::default()
        },
        &[mesh],
    );
    let y00 = f64::from(outputs[0][0][0]);
    let expected = PI.sqrt();
    assert!((y00 - expected).abs() < 0.03, "Y00 = {y00}, expected {expected}");
}

/// The ground-plane block dims only border lookups fired toward world-space
/// z < 0; upward lookups keep their visibility even at a block value of zero.
#[test]
fn ground_plane_block_dims_only_downward_border_bins() {
    // A sideways-facing triangle in the x = 0 plane, so half of its
    // border-ring directions point below the world horizon.
    let side = vec3(1.0, 0.0, 0.0);
    let mesh = || {
        IndexedMesh::new(
            vec![Face {
                positions: [0, 1, 2],
                normals: [0, 0, 0],
                texcoords: [0, 0, 0],
                material: 0,
            }],
            vec![point3(0., 0., 0.), point3(0., 1., 0.), point3(0., 0., 1.)],
            vec![side],
            vec![TangentFrame::around_normal(side); 3],
            vec![[0.0, 0.0]],
            vec![Arc::new(DiffuseMaterial::WHITE) as Arc<dyn ShMaterial>],
            None,
        )
        .unwrap()
    };
    let base = TransferParameters {
        sample_count_per_vertex: 4000,
        bump_granularity: true,
        ..TransferParameters::default()
    };
    let (_, neutral) = run(base, &[mesh()]);
    let (_, grounded) = run(
        TransferParameters {
            ground_plane_block_value: 0.0,
            ..base
        },
        &[mesh()],
    );
    let y00_neutral = f64::from(neutral[0][0][0]);
    let y00_grounded = f64::from(grounded[0][0][0]);
    // Neutral: upper cosine sum plus the whole border band, 2π·Y00.
    assert!((y00_neutral - PI.sqrt()).abs() < 0.05, "neutral {y00_neutral}");
    // Fully blocked ground: the downward half of the band drops out,
    // 4π·Y00·(1/4 + 1/8) = 1.5π·Y00; the upward half must survive.
    let expected = 1.5 * PI * 1.0 / (2.0 * PI.sqrt());
    assert!(
        (y00_grounded - expected).abs() < 0.06,
        "grounded {y00_grounded}, expected {expected}"
    );
}

/// The minimum-visibility floor belongs to the bump treatment: with bump
/// granularity it lifts fully shadowed vertices, without it it must change
/// nothing at all.
#[test]
fn min_visibility_floor_requires_bump_granularity() {
    let meshes = || {
        [
            quad_mesh(0.0, -2.0, 2.0, Arc::new(DiffuseMaterial::WHITE)),
            quad_mesh(1.0, -50.0, 50.0, Arc::new(DiffuseMaterial::WHITE)),
        ]
    };
    let base = TransferParameters {
        sample_count_per_vertex: 800,
        bump_granularity: true,
        ..TransferParameters::default()
    };
    let (_, unfloored) = run(base, &meshes());
    let (_, floored) = run(
        TransferParameters {
            min_direct_bump_coeff_visibility: 0.5,
            ..base
        },
        &meshes(),
    );
    let y00_unfloored = f64::from(unfloored[0][0][0]);
    let y00_floored = f64::from(floored[0][0][0]);
    assert!(y00_unfloored.abs() < 0.05, "unfloored {y00_unfloored}");
    // Blocked rays contribute the raw floor value, border bins are floored
    // too: 4π·Y00·(0.5·1/2 + 0.5·1/4) = 1.5π·Y00.
    let expected = 1.5 * PI * 1.0 / (2.0 * PI.sqrt());
    assert!(
        (y00_floored - expected).abs() < 0.08,
        "floored {y00_floored}, expected {expected}"
    );

    // Without bump granularity the floor parameter is inert.
    let plain = TransferParameters {
        sample_count_per_vertex: 800,
        ..TransferParameters::default()
    };
    let (_, without) = run(plain, &meshes());
    let (_, with) = run(
        TransferParameters {
            min_direct_bump_coeff_visibility: 0.5,
            ..plain
        },
        &meshes(),
    );
    for (a, b) in without[0].iter().zip(&with[0]) {
        assert_eq!(a.as_slice(), b.as_slice());
    }
}

/// Border-ring lookups see through transmitting occluders the same way the
/// main pass does.
#[test]
fn border_lookups_respect_transparency() {
    let meshes = || {
        [
            quad_mesh(0.0, -2.0, 2.0, Arc::new(DiffuseMaterial::WHITE)),
            quad_mesh(1.0, -50.0, 50.0, Arc::new(HalfPane)),
        ]
    };
    let base = TransferParameters {
        sample_count_per_vertex: 3000,
        bump_granularity: true,
        ..TransferParameters::default()
    };
    let (_, opaque_casts) = run(base, &meshes());
    let (_, transmitting) = run(
        TransferParameters {
            support_transparency: true,
            ..base
        },
        &meshes(),
    );
    let y00_binary = f64::from(opaque_casts[0][0][0]);
    let y00_transmitting = f64::from(transmitting[0][0][0]);
    // Binary casting under the pane sees nothing, border included.
    assert!(y00_binary.abs() < 0.05, "binary {y00_binary}");
    // Half transmission on both the upper sum and the border band:
    // 4π·Y00·(0.5·1/4 + 0.5·1/4) = π·Y00.
    let expected = PI * 1.0 / (2.0 * PI.sqrt());
    assert!(
        (y00_transmitting - expected).abs() < 0.1,
        "transmitting {y00_transmitting}, expected {expected}"
    );
}

/// The output is rotated into object space when the mesh carries a rotation.
#[test]
fn sh_rotation_is_applied() {
    let up = vec3(0.0, 0.0, 1.0);
    let d = ShDescriptor::THREE_BANDS;
    // A "rotation" that scales everything by 2 is easy to observe.
    let doubling = crate::sh::ShRotationMatrix::checked_from_rows(
        d,
        {
            let n = d.coefficient_count();
            let mut m = vec![0.0; n * n];
            for i in 0..n {
                m[i * n + i] = 2.0;
            }
            m
        },
    )
    .unwrap();
    let rotated_mesh = IndexedMesh::new(
        vec![Face {
            positions: [0, 1, 2],
            normals: [0, 0, 0],
            texcoords: [0, 0, 0],
            material: 0,
        }],
        vec![point3(0., 0., 0.), point3(1., 0., 0.), point3(0., 1., 0.)],
        vec![up],
        vec![TangentFrame::around_normal(up); 3],
        vec![[0.0, 0.0]],
        vec![Arc::new(DiffuseMaterial::WHITE)],
        Some(doubling),
    )
    .unwrap();

    let parameters = TransferParameters {
        sample_count_per_vertex: 1000,
        ..TransferParameters::default()
    };
    let (_, rotated) = run(parameters, &[rotated_mesh]);
    let plain_mesh = quad_mesh(0.0, 0.0, 1.0, Arc::new(DiffuseMaterial::WHITE));
    let (_, plain) = run(parameters, &[plain_mesh]);

    let ratio = f64::from(rotated[0][0][0]) / f64::from(plain[0][0][0]);
    assert!((ratio - 2.0).abs() < 0.1, "ratio {ratio}");
}
