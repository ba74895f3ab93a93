//! Benchmarks for convex hull construction and outside marking

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use meshlod_core::{LodConfigAdvanced, LodMesh, Point3f};
use meshlod_generator::{MeshInputProvider, MeshLodGenerator, OutsideMarker};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Triangle soup of random points inside the unit ball
fn generate_random_mesh(point_count: usize) -> LodMesh {
    let mut rng = StdRng::seed_from_u64(42);
    let mut vertices = Vec::with_capacity(point_count);
    while vertices.len() < point_count {
        let p = Point3f::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        );
        if p.coords.norm() <= 1.0 {
            vertices.push(p);
        }
    }
    let faces: Vec<[u32; 3]> = (0..point_count as u32 / 3)
        .map(|i| [i * 3, i * 3 + 1, i * 3 + 2])
        .collect();
    LodMesh::from_triangles("cloud", vertices, &faces)
}

fn bench_outside_marker(c: &mut Criterion) {
    let generator = MeshLodGenerator::new();
    let mut group = c.benchmark_group("outside_marker");

    for &count in &[300, 3000, 30000] {
        let mesh = generate_random_mesh(count);
        let data = generator
            .load(&MeshInputProvider::new(&mesh), &LodConfigAdvanced::default())
            .unwrap();

        group.bench_with_input(BenchmarkId::new("hull", count), &data, |b, data| {
            b.iter(|| {
                let mut marker = OutsideMarker::new(data.mesh_bounding_sphere_radius, 1.0);
                marker.generate_hull(black_box(data));
                black_box(marker.hull_triangle_count());
            });
        });

        group.bench_with_input(BenchmarkId::new("mark", count), &mesh, |b, mesh| {
            b.iter(|| {
                let mut data = generator
                    .load(&MeshInputProvider::new(mesh), &LodConfigAdvanced::default())
                    .unwrap();
                let mut marker = OutsideMarker::new(data.mesh_bounding_sphere_radius, 0.5);
                marker.mark_outside(&mut data);
                black_box(data.vertices.iter().filter(|v| v.is_outside).count());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_outside_marker);
criterion_main!(benches);
