//! Outside vertex classification
//!
//! Builds the convex hull of the mesh vertices with an incremental quickhull,
//! then walks the original mesh from every hull triangle, marking vertices
//! whose triangles face roughly the same way as the hull triangle. The result
//! is the outer skin of the mesh, which the outside cost decorator protects.

use crate::data::{LodData, VertexId};
use log::debug;
use meshlod_core::{
    Error, IndexBuffer, IndexData, IndexWidth, LodMesh, Point3f, Result, SubMesh, Vector3f,
    VertexData,
};

#[derive(Debug, Clone)]
struct HullTriangle {
    vertices: [VertexId; 3],
    normal: Vector3f,
    removed: bool,
}

#[derive(Debug, Clone)]
pub struct OutsideMarker {
    /// Tolerance for coplanar and collinear tests
    epsilon: f32,
    walk_angle: f32,
    centroid: Point3f,
    hull: Vec<HullTriangle>,
    /// Vertex already added to, or found inside, the hull.
    processed: Vec<bool>,
    visible: Vec<usize>,
    horizon: Vec<(VertexId, VertexId)>,
}

impl OutsideMarker {
    /// `walk_angle` is the minimum dot product between a hull triangle and a
    /// mesh triangle for the walk to continue. 1 disables the walk.
    pub fn new(bounding_sphere_radius: f32, walk_angle: f32) -> Self {
        debug_assert!((-1.0001..=1.0001).contains(&walk_angle));
        Self {
            epsilon: bounding_sphere_radius * f32::EPSILON * 4.0,
            walk_angle,
            centroid: Point3f::origin(),
            hull: Vec::new(),
            processed: Vec::new(),
            visible: Vec::new(),
            horizon: Vec::new(),
        }
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    /// Set `Vertex::is_outside` for every vertex of `data`.
    pub fn mark_outside(&mut self, data: &mut LodData) {
        self.generate_hull(data);
        self.mark_vertices(data);
    }

    /// Triangles of the last generated hull, wound outwards.
    pub fn hull_triangles(&self) -> impl Iterator<Item = [VertexId; 3]> + '_ {
        self.hull.iter().map(|t| t.vertices)
    }

    pub fn hull_triangle_count(&self) -> usize {
        self.hull.len()
    }

    /// Standalone mesh of the convex hull with one unshared vertex per corner.
    pub fn create_convex_hull_mesh(&mut self, data: &LodData, name: &str) -> Result<LodMesh> {
        self.generate_hull(data);
        if self.hull.is_empty() {
            return Err(Error::Algorithm(format!(
                "convex hull of {} is empty",
                data.mesh_name
            )));
        }
        let positions: Vec<Point3f> = self
            .hull
            .iter()
            .flat_map(|t| t.vertices)
            .map(|v| data[v].position)
            .collect();
        let width = IndexWidth::for_vertex_count(positions.len());
        let indices = IndexBuffer::from_indices(width, 0..positions.len() as u32);
        let mut mesh = LodMesh::new(name).with_shared_vertices(VertexData::new(positions));
        mesh.add_submesh(SubMesh::shared("hull", IndexData::new(indices)));
        mesh.update_bounds();
        Ok(mesh)
    }

    pub fn generate_hull(&mut self, data: &LodData) {
        self.hull.clear();
        self.processed = vec![false; data.vertices.len()];
        if !self.init_hull(data) {
            debug!(
                "{}: vertices are coplanar, convex hull is empty",
                data.mesh_name
            );
            self.hull.clear();
            return;
        }
        // The hull grows while it is walked
        let mut i = 0;
        while i < self.hull.len() {
            if !self.hull[i].removed {
                if let Some(v) = self.furthest_vertex(data, i) {
                    self.add_vertex(data, v);
                }
            }
            i += 1;
        }
        self.hull.retain(|t| !t.removed);
        debug!(
            "{}: convex hull has {} triangles",
            data.mesh_name,
            self.hull.len()
        );
    }

    /// Seed tetrahedron. False when the points span no volume.
    fn init_hull(&mut self, data: &LodData) -> bool {
        if data.vertices.len() < 4 {
            return false;
        }
        let pos = |v: VertexId| data[v].position;

        let mut min_y = f32::MAX;
        let mut a = None;
        for v in data.vertex_ids() {
            if pos(v).y < min_y {
                min_y = pos(v).y;
                a = Some(v);
            }
        }
        let Some(a) = a else { return false };

        let b = Self::furthest_by(data, |p| (p - pos(a)).norm_squared());
        let Some(b) = b else { return false };

        let line = pos(b) - pos(a);
        let c = Self::furthest_by(data, |p| {
            line.cross(&(pos(a) - p)).norm_squared() / line.norm_squared()
        });
        let Some(c) = c else { return false };

        let plane_normal = (pos(b) - pos(a)).cross(&(pos(c) - pos(a))).normalize();
        let plane_d = -plane_normal.dot(&pos(a).coords);
        let d = Self::furthest_by(data, |p| (plane_normal.dot(&p.coords) + plane_d).abs());
        let Some(d) = d else { return false };

        let volume = ((pos(a) - pos(d)).dot(&(pos(b) - pos(d)).cross(&(pos(c) - pos(d))))).abs()
            / 6.0;
        if volume <= self.epsilon || !volume.is_finite() {
            return false;
        }

        self.centroid =
            Point3f::from((pos(a).coords + pos(b).coords + pos(c).coords + pos(d).coords) / 4.0);
        for v in [a, b, c, d] {
            self.processed[v.0] = true;
        }
        self.create_triangle(data, a, b, c);
        self.create_triangle(data, a, b, d);
        self.create_triangle(data, a, c, d);
        self.create_triangle(data, b, c, d);
        true
    }

    /// Vertex maximizing `metric`, if any scores above zero. First wins ties.
    fn furthest_by(data: &LodData, metric: impl Fn(Point3f) -> f32) -> Option<VertexId> {
        let mut best = 0.0f32;
        let mut found = None;
        for v in data.vertex_ids() {
            let value = metric(data[v].position);
            if value > best {
                best = value;
                found = Some(v);
            }
        }
        found
    }

    fn create_triangle(&mut self, data: &LodData, a: VertexId, b: VertexId, c: VertexId) {
        let mut tri = HullTriangle {
            vertices: [a, b, c],
            normal: Self::normal_of(data, [a, b, c]),
            removed: false,
        };
        if Self::is_visible(data, &tri, &self.centroid) {
            tri.vertices = [b, a, c];
            tri.normal = Self::normal_of(data, tri.vertices);
        }
        self.hull.push(tri);
    }

    fn normal_of(data: &LodData, [a, b, c]: [VertexId; 3]) -> Vector3f {
        LodData::face_normal(&data[a].position, &data[b].position, &data[c].position)
    }

    fn is_visible(data: &LodData, tri: &HullTriangle, point: &Point3f) -> bool {
        tri.normal.dot(&data[tri.vertices[0]].position.coords) < tri.normal.dot(&point.coords)
    }

    /// Unprocessed vertex furthest in front of a hull triangle.
    fn furthest_vertex(&self, data: &LodData, tri: usize) -> Option<VertexId> {
        let tri = &self.hull[tri];
        let n = tri.normal;
        let d = -n.dot(&data[tri.vertices[0]].position.coords);
        let mut furthest = None;
        let mut furthest_distance = 0.0f32;
        for v in data.vertex_ids() {
            if self.processed[v.0] {
                continue;
            }
            let dist = n.dot(&data[v].position.coords) + d;
            if dist > furthest_distance {
                furthest_distance = dist;
                furthest = Some(v);
            }
        }
        furthest
    }

    fn add_vertex(&mut self, data: &LodData, v: VertexId) -> usize {
        self.processed[v.0] = true;
        self.collect_visible_triangles(data, v);
        if self.visible.is_empty() {
            return 0;
        }
        self.collect_horizon();
        let horizon = std::mem::take(&mut self.horizon);
        for &(a, b) in &horizon {
            self.create_triangle(data, a, b, v);
        }
        let added = horizon.len();
        self.horizon = horizon;
        added
    }

    fn collect_visible_triangles(&mut self, data: &LodData, target: VertexId) {
        self.visible.clear();
        let p = data[target].position;
        for (i, tri) in self.hull.iter().enumerate() {
            if tri.removed {
                continue;
            }
            let dot1 = tri.normal.dot(&data[tri.vertices[0]].position.coords);
            let dot2 = tri.normal.dot(&p.coords);
            if (dot2 - dot1).abs() <= self.epsilon {
                // On the triangle plane
                if self.is_inside_triangle(data, &p, tri) {
                    self.visible.clear();
                    return;
                }
                self.visible.push(i);
            } else if dot1 < dot2 {
                self.visible.push(i);
            }
        }
    }

    /// Remove the visible triangles and keep the edges around them.
    fn collect_horizon(&mut self) {
        self.horizon.clear();
        for &i in &self.visible {
            let tri = &mut self.hull[i];
            let [a, b, c] = tri.vertices;
            for (p, q) in [(a, b), (b, c), (c, a)] {
                self.horizon.push(if p <= q { (p, q) } else { (q, p) });
            }
            tri.removed = true;
        }
        // Interior edges appear twice
        self.horizon.sort_unstable();
        let edges = std::mem::take(&mut self.horizon);
        let mut i = 0;
        while i < edges.len() {
            let mut j = i + 1;
            while j < edges.len() && edges[j] == edges[i] {
                j += 1;
            }
            if j - i == 1 {
                self.horizon.push(edges[i]);
            }
            i = j;
        }
    }

    /// `target` is assumed to lie on the plane of `tri`.
    fn is_inside_triangle(&self, data: &LodData, target: &Point3f, tri: &HullTriangle) -> bool {
        let [p0, p1, p2] = tri.vertices.map(|v| data[v].position);
        let n = tri.normal;
        let sides = [(p0, p1), (p1, p2), (p2, p0)];
        let mut side = None;
        for (from, to) in sides {
            let d = n.cross(&(to - from)).dot(&(target - from));
            if d.abs() <= self.epsilon {
                return self.is_inside_line(target, &from, &to);
            }
            let negative = d < 0.0;
            match side {
                Some(s) if s != negative => return false,
                _ => side = Some(negative),
            }
        }
        true
    }

    /// `target` is assumed to lie on the line through `p0` and `p1`.
    fn is_inside_line(&self, target: &Point3f, p0: &Point3f, p1: &Point3f) -> bool {
        let v1 = p1 - p0;
        let v2 = target - p0;
        self.is_same_position(target, p1)
            || (v1.dot(&v2) > 0.0 && v1.norm_squared() > v2.norm_squared())
    }

    fn is_same_position(&self, a: &Point3f, b: &Point3f) -> bool {
        (a - b).iter().all(|d| d.abs() <= self.epsilon)
    }

    fn mark_vertices(&self, data: &mut LodData) {
        let mut outside = vec![false; data.vertices.len()];
        let mut in_pass = vec![false; data.vertices.len()];
        let mut stack = Vec::new();
        for hull_tri in &self.hull {
            in_pass.fill(false);
            stack.clear();
            Self::push_unvisited(&hull_tri.vertices, &mut in_pass, &mut outside, &mut stack);
            while let Some(v) = stack.pop() {
                for &t in &data[v].triangles {
                    let tri = &data[t];
                    if hull_tri.normal.dot(&tri.normal) > self.walk_angle {
                        Self::push_unvisited(&tri.vertices, &mut in_pass, &mut outside, &mut stack);
                    }
                }
            }
        }
        for (vertex, is_outside) in data.vertices.iter_mut().zip(outside) {
            vertex.is_outside = is_outside;
        }
        debug!(
            "{}: {} of {} vertices are outside",
            data.mesh_name,
            data.vertices.iter().filter(|v| v.is_outside).count(),
            data.vertices.len()
        );
    }

    fn push_unvisited(
        vertices: &[VertexId; 3],
        in_pass: &mut [bool],
        outside: &mut [bool],
        stack: &mut Vec<VertexId>,
    ) {
        for &v in vertices {
            if !in_pass[v.0] {
                in_pass[v.0] = true;
                outside[v.0] = true;
                stack.push(v);
            }
        }
    }
}
