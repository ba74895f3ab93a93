//! Mesh builders shared by the unit tests.

use crate::data::LodData;
use crate::input::{LodInputProvider, MeshInputProvider};
use meshlod_core::{LodMesh, Point3f};

pub fn make_single_triangle() -> LodMesh {
    LodMesh::from_triangles(
        "triangle",
        vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(0.5, 1.0, 0.0),
        ],
        &[[0, 1, 2]],
    )
}

pub fn make_tetrahedron() -> LodMesh {
    // Consistently wound: each shared edge appears in opposite directions
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

fn grid_faces(size: usize) -> Vec<[u32; 3]> {
    let mut faces = Vec::new();
    for y in 0..(size - 1) {
        for x in 0..(size - 1) {
            let tl = (y * size + x) as u32;
            let tr = tl + 1;
            let bl = ((y + 1) * size + x) as u32;
            let br = bl + 1;
            faces.push([tl, bl, tr]);
            faces.push([tr, bl, br]);
        }
    }
    faces
}

/// `size` x `size` vertices in the z = 0 plane.
pub fn make_plane_grid(size: usize) -> LodMesh {
    let mut vertices = Vec::new();
    for y in 0..size {
        for x in 0..size {
            vertices.push(Point3f::new(x as f32, y as f32, 0.0));
        }
    }
    LodMesh::from_triangles("grid", vertices, &grid_faces(size))
}

pub fn make_curved_surface(size: usize) -> LodMesh {
    let mut vertices = Vec::new();
    for y in 0..size {
        for x in 0..size {
            let fx = x as f32 / (size - 1) as f32 * std::f32::consts::PI;
            let fy = y as f32 / (size - 1) as f32 * std::f32::consts::PI;
            vertices.push(Point3f::new(x as f32, y as f32, (fx.sin() * fy.sin()) * 2.0));
        }
    }
    LodMesh::from_triangles("curved", vertices, &grid_faces(size))
}

/// Unit cube, outward facing.
pub fn make_cube() -> LodMesh {
    let vertices = (0..8)
        .map(|i| {
            Point3f::new(
                (i & 1) as f32,
                ((i >> 1) & 1) as f32,
                ((i >> 2) & 1) as f32,
            )
        })
        .collect();
    LodMesh::from_triangles(
        "cube",
        vertices,
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

pub fn load(mesh: &LodMesh) -> LodData {
    let mut data = LodData::new(mesh.name.clone(), mesh.bounding_sphere_radius);
    MeshInputProvider::new(mesh)
        .initialize_data(&mut data)
        .expect("test mesh loads");
    data
}
