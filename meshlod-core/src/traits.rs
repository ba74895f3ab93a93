//! Core traits for meshlod

use crate::{mesh::*, point::*};

/// Trait for objects with a spatial extent
pub trait Bounded {
    /// Visit every vertex position of the object
    fn for_each_position(&self, f: &mut dyn FnMut(&Point3f));

    /// Get the bounding box of the object
    fn bounding_box(&self) -> (Point3f, Point3f) {
        let mut bounds: Option<(Point3f, Point3f)> = None;
        self.for_each_position(&mut |p| {
            let (min, max) = bounds.get_or_insert((*p, *p));
            *min = min.inf(p);
            *max = max.sup(p);
        });
        bounds.unwrap_or((Point3f::origin(), Point3f::origin()))
    }

    /// Get the center point of the object
    fn center(&self) -> Point3f {
        let (min, max) = self.bounding_box();
        nalgebra::center(&min, &max)
    }

    /// Radius of the origin-centered sphere enclosing every vertex
    fn bounding_sphere_radius_from_origin(&self) -> f32 {
        let mut radius_sq = 0.0f32;
        self.for_each_position(&mut |p| {
            radius_sq = radius_sq.max(p.coords.norm_squared());
        });
        radius_sq.sqrt()
    }
}

impl Bounded for VertexData {
    fn for_each_position(&self, f: &mut dyn FnMut(&Point3f)) {
        self.positions.iter().for_each(|p| f(p));
    }
}

impl Bounded for LodMesh {
    fn for_each_position(&self, f: &mut dyn FnMut(&Point3f)) {
        if let Some(shared) = &self.shared_vertex_data {
            shared.for_each_position(f);
        }
        for sub in &self.submeshes {
            if let Some(data) = &sub.vertex_data {
                data.for_each_position(f);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bounding_box() {
        let data = VertexData::new(vec![
            Point3f::new(-1.0, 2.0, 0.5),
            Point3f::new(3.0, -2.0, 0.0),
            Point3f::new(0.0, 0.0, 4.0),
        ]);
        let (min, max) = data.bounding_box();
        assert_eq!(min, Point3f::new(-1.0, -2.0, 0.0));
        assert_eq!(max, Point3f::new(3.0, 2.0, 4.0));
        assert_eq!(data.center(), Point3f::new(1.0, 0.0, 2.0));
    }

    #[test]
    fn test_empty_bounds() {
        let data = VertexData::default();
        assert_eq!(data.bounding_box(), (Point3f::origin(), Point3f::origin()));
        assert_eq!(data.bounding_sphere_radius_from_origin(), 0.0);
    }

    #[test]
    fn test_mesh_radius_covers_all_pools() {
        let mut mesh = LodMesh::from_triangles(
            "tri",
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
            ],
            &[[0, 1, 2]],
        )
        .with_shared_vertices(VertexData::new(vec![Point3f::new(0.0, 0.0, -5.0)]));
        mesh.update_bounds();
        assert_relative_eq!(mesh.bounding_sphere_radius, 5.0);
    }
}
