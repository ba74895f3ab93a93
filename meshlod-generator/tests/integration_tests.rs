//! Integration tests for meshlod-generator
//!
//! These tests drive whole generation runs through the public API: levels
//! baked into a mesh, compressed against plain output, the background
//! worker and LOD0 stripping.

use meshlod_core::*;
use meshlod_generator::*;
use std::f32::consts::PI;

fn make_single_triangle() -> LodMesh {
    LodMesh::from_triangles(
        "triangle",
        vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(0.0, 1.0, 0.0),
        ],
        &[[0, 1, 2]],
    )
}

fn make_tetrahedron() -> LodMesh {
    LodMesh::from_triangles(
        "tetrahedron",
        vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(0.5, 1.0, 0.0),
            Point3f::new(0.5, 0.5, 1.0),
        ],
        &[[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]],
    )
}

/// Flat `size` x `size` vertex grid in the XY plane
fn make_grid(size: usize) -> LodMesh {
    let mut positions = Vec::with_capacity(size * size);
    for y in 0..size {
        for x in 0..size {
            positions.push(Point3f::new(x as f32, y as f32, 0.0));
        }
    }
    let mut faces = Vec::new();
    for y in 0..size - 1 {
        for x in 0..size - 1 {
            let tl = (y * size + x) as u32;
            let tr = tl + 1;
            let bl = tl + size as u32;
            let br = bl + 1;
            faces.push([tl, bl, tr]);
            faces.push([tr, bl, br]);
        }
    }
    LodMesh::from_triangles("grid", positions, &faces)
}

fn make_cube() -> LodMesh {
    let positions = (0..8)
        .map(|i| Point3f::new((i & 1) as f32, ((i >> 1) & 1) as f32, ((i >> 2) & 1) as f32))
        .collect();
    LodMesh::from_triangles(
        "cube",
        positions,
        &[
            [0, 2, 1],
            [1, 2, 3],
            [4, 5, 6],
            [5, 7, 6],
            [0, 1, 4],
            [1, 5, 4],
            [2, 6, 3],
            [3, 6, 7],
            [0, 4, 2],
            [2, 4, 6],
            [1, 3, 5],
            [3, 7, 5],
        ],
    )
}

/// Closed UV sphere with single pole vertices
fn make_sphere(rings: usize) -> LodMesh {
    let segments = rings * 2;
    let mut positions = vec![Point3f::new(0.0, 1.0, 0.0)];
    for r in 1..rings {
        let theta = r as f32 / rings as f32 * PI;
        for s in 0..segments {
            let phi = s as f32 / segments as f32 * 2.0 * PI;
            positions.push(Point3f::new(
                theta.sin() * phi.cos(),
                theta.cos(),
                theta.sin() * phi.sin(),
            ));
        }
    }
    positions.push(Point3f::new(0.0, -1.0, 0.0));
    let south = (positions.len() - 1) as u32;
    let ring = |r: usize, s: usize| (1 + (r - 1) * segments + s % segments) as u32;

    let mut faces = Vec::new();
    for s in 0..segments {
        faces.push([0, ring(1, s + 1), ring(1, s)]);
        faces.push([south, ring(rings - 1, s), ring(rings - 1, s + 1)]);
    }
    for r in 1..rings - 1 {
        for s in 0..segments {
            let (a, b) = (ring(r, s), ring(r, s + 1));
            let (c, d) = (ring(r + 1, s), ring(r + 1, s + 1));
            faces.push([a, b, d]);
            faces.push([a, d, c]);
        }
    }
    LodMesh::from_triangles("sphere", positions, &faces)
}

fn is_degenerate(t: &[u32; 3]) -> bool {
    t[0] == t[1] || t[1] == t[2] || t[0] == t[2]
}

/// Non-degenerate triangles of a level, sorted for order independent comparison
fn level_triangles(mesh: &LodMesh, level: usize) -> Vec<[u32; 3]> {
    let mut triangles: Vec<[u32; 3]> = mesh.submeshes[0]
        .lod_index(level)
        .map(|d| d.triangles())
        .unwrap_or_default()
        .into_iter()
        .filter(|t| !is_degenerate(t))
        .collect();
    triangles.sort_unstable();
    triangles
}

fn proportional_config(reductions: &[f32], compressed: bool) -> LodConfig {
    let mut config = LodConfig::new(LodStrategy::Distance);
    for (i, r) in reductions.iter().enumerate() {
        config = config.with_level(LodLevel::proportional((i + 1) as f32 * 10.0, *r));
    }
    config.advanced.use_compression = compressed;
    config
}

// ---- End-to-end generation ----

#[test]
fn test_single_triangle_is_kept() {
    let mut mesh = make_single_triangle();
    let config = LodConfig::new(LodStrategy::Distance).with_level(LodLevel::constant(10.0, 0));
    let report = MeshLodGenerator::new()
        .generate_lod_levels(&mut mesh, &config)
        .expect("generation succeeds");

    assert_eq!(report.levels[0].collapses, 0);
    assert_eq!(report.levels[0].unique_vertex_count, 3);
    assert_eq!(mesh.lod_level_count(), 2);
    assert_eq!(level_triangles(&mesh, 1), level_triangles(&mesh, 0));
}

#[test]
fn test_tetrahedron_loses_one_vertex() {
    let mut mesh = make_tetrahedron();
    let config = LodConfig::new(LodStrategy::Distance).with_level(LodLevel::constant(10.0, 1));
    let report = MeshLodGenerator::new()
        .generate_lod_levels(&mut mesh, &config)
        .expect("generation succeeds");

    assert_eq!(report.levels[0].collapses, 1);
    assert_eq!(report.levels[0].unique_vertex_count, 3);
    let triangles = level_triangles(&mesh, 1);
    assert_eq!(triangles.len(), 2);
    let used: std::collections::BTreeSet<u32> = triangles.iter().flatten().copied().collect();
    assert_eq!(used.len(), 3);
}

#[test]
fn test_grid_collapses_to_one_vertex() {
    let mut mesh = make_grid(4);
    let mut config = proportional_config(&[], false);
    config.levels.push(LodLevel::constant(10.0, 15));
    let report = MeshLodGenerator::new()
        .generate_lod_levels(&mut mesh, &config)
        .expect("generation succeeds");
    assert_eq!(report.levels[0].unique_vertex_count, 1);
    assert!(level_triangles(&mesh, 1).is_empty());

    let mut stripifier = Lod0Stripifier::new();
    assert!(stripifier.strip_lod0_vertices(&mut mesh).expect("strips"));
    let remap = stripifier
        .remap(VertexPoolId::SubMesh(0))
        .expect("pool remapped");
    for old in 0..16 {
        if let Some(new) = remap.get(old) {
            assert!((new as usize) < remap.new_vertex_count());
        }
    }
    assert_eq!(remap.new_vertex_count(), 1);
}

#[test]
fn test_triangle_count_is_monotonic() {
    let mut mesh = make_sphere(10);
    let config = proportional_config(&[0.1, 0.3, 0.5, 0.7, 0.9], true);
    let report = MeshLodGenerator::new()
        .with_topology_validation(true)
        .generate_lod_levels(&mut mesh, &config)
        .expect("generation succeeds");

    assert_eq!(report.levels.len(), 5);
    let counts: Vec<usize> = (0..mesh.lod_level_count())
        .map(|l| level_triangles(&mesh, l).len())
        .collect();
    assert!(counts.windows(2).all(|w| w[1] <= w[0]), "{:?}", counts);
    let vertices: Vec<usize> = report.levels.iter().map(|l| l.unique_vertex_count).collect();
    assert!(vertices.windows(2).all(|w| w[1] <= w[0]), "{:?}", vertices);
}

#[test]
fn test_pinned_border_survives() {
    let mesh = make_grid(5);
    let advanced = LodConfigAdvanced {
        prevent_punching_holes: true,
        ..Default::default()
    };
    let generator = MeshLodGenerator::new();
    let mut data = generator
        .load(&MeshInputProvider::new(&mesh), &advanced)
        .expect("grid loads");
    let mut cost = cost_from_config(&advanced);
    cost.init_collapse_costs(&mut data);
    let mut output = UncompressedOutput::new(LodOutputBuffer::new(1));
    LodCollapser::new().collapse_cheapest_vertices(
        &mut data,
        &mut cost,
        &mut output,
        1,
        NEVER_COLLAPSE_COST,
    );

    data.assert_valid_mesh();
    let border = data
        .vertex_ids()
        .filter(|&v| {
            let p = data[v].position;
            p.x == 0.0 || p.y == 0.0 || p.x == 4.0 || p.y == 4.0
        })
        .collect::<Vec<_>>();
    assert_eq!(border.len(), 16);
    assert!(border.iter().all(|&v| !data[v].is_removed));
    assert_eq!(data.live_vertex_count, 16);
}

#[test]
fn test_cost_only_level_keeps_pinned_border() {
    let mut mesh = make_grid(5);
    let mut config = LodConfig::new(LodStrategy::Distance)
        .with_level(LodLevel::collapse_cost(10.0, NEVER_COLLAPSE_COST));
    config.advanced.prevent_punching_holes = true;
    let report = MeshLodGenerator::new()
        .generate_lod_levels(&mut mesh, &config)
        .expect("generation succeeds");

    assert_eq!(report.levels[0].unique_vertex_count, 16);
    let used: std::collections::BTreeSet<u32> =
        level_triangles(&mesh, 1).into_iter().flatten().collect();
    let border: std::collections::BTreeSet<u32> = (0..25u32)
        .filter(|i| i % 5 == 0 || i % 5 == 4 || *i < 5 || *i >= 20)
        .collect();
    assert_eq!(used, border);
}

#[test]
fn test_non_finite_cost_limits_are_rejected() {
    let levels = [
        LodLevel::collapse_cost(10.0, f32::INFINITY),
        LodLevel::collapse_cost(10.0, f32::NAN),
        LodLevel::proportional(10.0, 0.5).with_max_collapse_cost(f32::INFINITY),
        LodLevel::constant(10.0, 4).with_max_collapse_cost(f32::NAN),
    ];
    for level in levels {
        let mut mesh = make_grid(5);
        let mut config = LodConfig::new(LodStrategy::Distance).with_level(level);
        config.advanced.prevent_punching_holes = true;
        let result = MeshLodGenerator::new().generate_lod_levels(&mut mesh, &config);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
        assert_eq!(mesh.lod_level_count(), 1);
    }
}

#[test]
fn test_disjoint_pieces_count_live_vertices() {
    let mut mesh = LodMesh::from_triangles(
        "pieces",
        vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(0.0, 1.0, 0.0),
            Point3f::new(5.0, 0.0, 0.0),
            Point3f::new(6.0, 0.0, 0.0),
            Point3f::new(5.0, 1.0, 0.0),
        ],
        &[[0, 1, 2], [3, 4, 5]],
    );
    let config = LodConfig::new(LodStrategy::Distance)
        .with_level(LodLevel::constant(10.0, 3))
        .with_level(LodLevel::constant(20.0, 5));
    let report = MeshLodGenerator::new()
        .generate_lod_levels(&mut mesh, &config)
        .expect("generation succeeds");

    assert_eq!(report.levels[0].unique_vertex_count, 3);
    assert_eq!(level_triangles(&mesh, 1).len(), 1);
    assert_eq!(report.levels[1].unique_vertex_count, 1);
    assert!(level_triangles(&mesh, 2).is_empty());
}

#[test]
fn test_cube_corners_are_outside() {
    let mesh = make_cube();
    let mut data = MeshLodGenerator::new()
        .load(&MeshInputProvider::new(&mesh), &LodConfigAdvanced::default())
        .expect("cube loads");
    let mut marker = OutsideMarker::new(mesh.bounding_sphere_radius, 1.0);
    marker.mark_outside(&mut data);
    assert_eq!(data.vertices.len(), 8);
    assert!(data.vertices.iter().all(|v| v.is_outside));
    assert_eq!(marker.hull_triangle_count(), 12);
}

#[test]
fn test_auto_configuration() {
    let mut mesh = make_sphere(8);
    let report = MeshLodGenerator::new()
        .generate_auto_configured_lod_levels(&mut mesh)
        .expect("generation succeeds");
    assert_eq!(report.levels.len(), 4);
    assert_eq!(mesh.lod_usages.len(), report.baked_level_count());
    assert!(mesh
        .lod_usages
        .windows(2)
        .all(|w| w[0].value > w[1].value));
}

// ---- Compressed output ----

#[test]
fn test_compression_keeps_level_geometry() {
    let reductions = [0.2, 0.4, 0.6, 0.8];
    let mut plain = make_sphere(8);
    let mut packed = plain.clone();
    let generator = MeshLodGenerator::new();
    generator
        .generate_lod_levels(&mut plain, &proportional_config(&reductions, false))
        .expect("plain generation succeeds");
    generator
        .generate_lod_levels(&mut packed, &proportional_config(&reductions, true))
        .expect("compressed generation succeeds");

    assert_eq!(plain.lod_usages, packed.lod_usages);
    for level in 1..plain.lod_level_count() {
        assert_eq!(level_triangles(&plain, level), level_triangles(&packed, level));
    }
}

#[test]
fn test_compressed_levels_share_buffers_in_pairs() {
    let mut mesh = make_sphere(8);
    MeshLodGenerator::new()
        .generate_lod_levels(&mut mesh, &proportional_config(&[0.2, 0.4, 0.6, 0.8, 0.85], true))
        .expect("generation succeeds");

    let levels = &mesh.submeshes[0].lod_index_data;
    assert_eq!(levels.len(), 5);
    assert!(levels[0].shares_buffer_with(&levels[1]));
    assert!(levels[2].shares_buffer_with(&levels[3]));
    assert!(!levels[1].shares_buffer_with(&levels[2]));
    assert!(!levels[3].shares_buffer_with(&levels[4]));

    let plain_size: usize = levels.iter().map(|l| l.count).sum();
    let buffer_size: usize = [0, 2, 4].iter().map(|&i| levels[i].buffer.len()).sum();
    assert!(buffer_size < plain_size);
}

#[test]
fn test_detached_output_matches_mesh_output() {
    let config = proportional_config(&[0.3, 0.6, 0.85], true);
    let mesh = make_sphere(6);
    let mut direct = mesh.clone();
    let generator = MeshLodGenerator::new();
    generator
        .generate_lod_levels(&mut direct, &config)
        .expect("generation succeeds");

    let input = BufferInputProvider::new(LodInputBuffer::from_mesh(&mesh));
    let mut cost = cost_from_config(&config.advanced);
    let mut output = CompressedOutput::new(LodOutputBuffer::new(1));
    generator
        .generate_with(&input, &mut cost, &mut output, &config)
        .expect("generation succeeds");
    let mut injected = mesh.clone();
    output
        .into_inner()
        .inject(&mut injected)
        .expect("buffers fit the mesh");

    assert_eq!(injected.lod_usages, direct.lod_usages);
    assert_eq!(
        injected.submeshes[0].lod_index_data,
        direct.submeshes[0].lod_index_data
    );
}

// ---- Background worker ----

#[test]
fn test_worker_round_trip() {
    let config = proportional_config(&[0.25, 0.5], true);
    let meshes = vec![make_sphere(6), make_grid(5), make_cube()];
    let worker = LodWorker::spawn().expect("worker starts");
    for mesh in &meshes {
        worker
            .submit(LodRequest::new(mesh, config.clone()))
            .expect("worker accepts");
    }

    for mesh in &meshes {
        let response = worker.recv().expect("worker responds");
        assert_eq!(response.mesh_name, mesh.name);

        let mut injected = mesh.clone();
        assert!(response.inject(&mut injected, None).expect("injects"));
        let mut direct = mesh.clone();
        MeshLodGenerator::new()
            .generate_lod_levels(&mut direct, &config)
            .expect("generation succeeds");
        assert_eq!(injected.lod_usages, direct.lod_usages);
        assert_eq!(injected.submeshes[0].lod_index_data, direct.submeshes[0].lod_index_data);
    }
    assert!(worker.shutdown().is_empty());
}

#[test]
fn test_worker_drop_with_pending_requests() {
    let worker = LodWorker::spawn().expect("worker starts");
    let mesh = make_sphere(6);
    for _ in 0..3 {
        worker
            .submit(LodRequest::new(&mesh, proportional_config(&[0.5], false)))
            .expect("worker accepts");
    }
    drop(worker);
}
