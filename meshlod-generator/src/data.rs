//! Topology model for progressive mesh reduction
//!
//! Vertices and triangles live in arenas sized once by the input adapter and
//! are addressed by [`VertexId`] / [`TriangleId`]. Nothing is ever erased
//! during a run; removed elements are flagged instead. Every vertex owns a
//! small set of outgoing directed edges, each counting the live triangles
//! that use it.

use crate::heap::CollapseCostHeap;
use meshlod_core::{normalize_or_zero, Error, IndexData, IndexWidth, Point3f, Result, Vector3f};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::ops::{Index, IndexMut};

/// Cost of a collapse that must never happen.
pub const NEVER_COLLAPSE_COST: f32 = f32::MAX;
/// Cost of a vertex without any edge to collapse along.
pub const UNINITIALIZED_COLLAPSE_COST: f32 = f32::INFINITY;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TriangleId(pub usize);

/// Directed edge from its owning vertex to `dst`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub dst: VertexId,
    pub collapse_cost: f32,
    /// Live triangles containing both endpoints.
    pub ref_count: u32,
}

impl Edge {
    fn new(dst: VertexId) -> Self {
        Self {
            dst,
            collapse_cost: UNINITIALIZED_COLLAPSE_COST,
            ref_count: 0,
        }
    }
}

pub type VertexEdges = SmallVec<[Edge; 8]>;
pub type VertexTriangles = SmallVec<[TriangleId; 8]>;

#[derive(Debug, Clone)]
pub struct Vertex {
    pub position: Point3f,
    pub normal: Vector3f,
    pub edges: VertexEdges,
    pub triangles: VertexTriangles,
    /// Cheapest neighbor to collapse into.
    pub collapse_to: Option<VertexId>,
    /// Several source vertices share this position.
    pub seam: bool,
    /// Reachable from the convex hull.
    pub is_outside: bool,
    /// Referenced by a line primitive.
    pub is_line_vertex: bool,
    pub has_profile: bool,
    pub is_removed: bool,
}

impl Vertex {
    pub fn new(position: Point3f) -> Self {
        Self {
            position,
            normal: Vector3f::zeros(),
            edges: VertexEdges::new(),
            triangles: VertexTriangles::new(),
            collapse_to: None,
            seam: false,
            is_outside: false,
            is_line_vertex: false,
            has_profile: false,
            is_removed: false,
        }
    }

    pub fn edge(&self, dst: VertexId) -> Option<&Edge> {
        self.edges.iter().find(|e| e.dst == dst)
    }

    /// Not removed and still part of at least one triangle.
    pub fn is_live(&self) -> bool {
        !self.is_removed && !self.triangles.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Triangle {
    pub vertices: [VertexId; 3],
    /// Indices into the submesh's original vertex pool.
    pub vertex_ids: [u32; 3],
    pub normal: Vector3f,
    pub submesh_id: usize,
    pub is_removed: bool,
    /// Changed since the last compressed bake pass.
    pub vertex_changed: bool,
    /// Slot in `LodData::triangle_cache` holding the previous level's ids.
    pub prev_lod: Option<usize>,
}

impl Triangle {
    pub fn new(vertices: [VertexId; 3], vertex_ids: [u32; 3], submesh_id: usize) -> Self {
        Self {
            vertices,
            vertex_ids,
            normal: Vector3f::zeros(),
            submesh_id,
            is_removed: false,
            vertex_changed: false,
            prev_lod: None,
        }
    }

    pub fn has_vertex(&self, v: VertexId) -> bool {
        self.vertices.contains(&v)
    }

    pub fn corner_of(&self, v: VertexId) -> Option<usize> {
        self.vertices.iter().position(|&x| x == v)
    }

    pub fn vertex_id_of(&self, v: VertexId) -> Option<u32> {
        self.corner_of(v).map(|c| self.vertex_ids[c])
    }

    /// Two corners share a vertex.
    pub fn is_malformed(&self) -> bool {
        let [a, b, c] = self.vertices;
        a == b || b == c || c == a
    }
}

/// Per submesh index bookkeeping.
#[derive(Debug, Clone)]
pub struct IndexBufferInfo {
    pub index_width: IndexWidth,
    /// Indices of the live triangles.
    pub index_count: usize,
    /// Live index count at the first compressed pass.
    pub prev_index_count: usize,
    /// Indices only the previous level still needs.
    pub prev_only_index_count: usize,
    /// Non-triangle index data copied into every level unchanged.
    pub passthrough: Option<IndexData>,
}

impl IndexBufferInfo {
    pub fn new(index_width: IndexWidth) -> Self {
        Self {
            index_width,
            index_count: 0,
            prev_index_count: 0,
            prev_only_index_count: 0,
            passthrough: None,
        }
    }
}

/// Deduplicates vertices by exact position.
#[derive(Debug, Default)]
pub struct UniqueVertexSet {
    lookup: HashMap<[u32; 3], VertexId>,
}

impl UniqueVertexSet {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lookup: HashMap::with_capacity(capacity),
        }
    }

    fn key(position: &Point3f) -> [u32; 3] {
        // +0.0 and -0.0 are the same position
        let bits = |v: f32| if v == 0.0 { 0 } else { v.to_bits() };
        [bits(position.x), bits(position.y), bits(position.z)]
    }

    pub fn get(&self, position: &Point3f) -> Option<VertexId> {
        self.lookup.get(&Self::key(position)).copied()
    }

    /// Returns the existing vertex at `position`, or registers `id`.
    pub fn insert(&mut self, position: &Point3f, id: VertexId) -> Option<VertexId> {
        match self.lookup.entry(Self::key(position)) {
            std::collections::hash_map::Entry::Occupied(e) => Some(*e.get()),
            std::collections::hash_map::Entry::Vacant(e) => {
                e.insert(id);
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }
}

/// Everything a reduction run works on.
#[derive(Debug)]
pub struct LodData {
    pub mesh_name: String,
    pub mesh_bounding_sphere_radius: f32,
    pub vertices: Vec<Vertex>,
    pub triangles: Vec<Triangle>,
    pub index_buffer_infos: Vec<IndexBufferInfo>,
    pub cost_heap: CollapseCostHeap,
    /// Vertex ids of each triangle at the first compressed pass.
    pub triangle_cache: Vec<[u32; 3]>,
    /// Vertices that are not removed and have a triangle.
    pub live_vertex_count: usize,
    pub use_vertex_normals: bool,
    pub prevent_punching_holes: bool,
    pub prevent_breaking_lines: bool,
}

impl Index<VertexId> for LodData {
    type Output = Vertex;

    #[inline]
    fn index(&self, id: VertexId) -> &Vertex {
        &self.vertices[id.0]
    }
}

impl IndexMut<VertexId> for LodData {
    #[inline]
    fn index_mut(&mut self, id: VertexId) -> &mut Vertex {
        &mut self.vertices[id.0]
    }
}

impl Index<TriangleId> for LodData {
    type Output = Triangle;

    #[inline]
    fn index(&self, id: TriangleId) -> &Triangle {
        &self.triangles[id.0]
    }
}

impl IndexMut<TriangleId> for LodData {
    #[inline]
    fn index_mut(&mut self, id: TriangleId) -> &mut Triangle {
        &mut self.triangles[id.0]
    }
}

impl LodData {
    pub fn new(mesh_name: impl Into<String>, mesh_bounding_sphere_radius: f32) -> Self {
        Self {
            mesh_name: mesh_name.into(),
            mesh_bounding_sphere_radius,
            vertices: Vec::new(),
            triangles: Vec::new(),
            index_buffer_infos: Vec::new(),
            cost_heap: CollapseCostHeap::new(),
            triangle_cache: Vec::new(),
            live_vertex_count: 0,
            use_vertex_normals: true,
            prevent_punching_holes: false,
            prevent_breaking_lines: false,
        }
    }

    /// Size the arenas. They must not grow past this afterwards.
    pub fn reserve_exact(&mut self, vertex_count: usize, triangle_count: usize) {
        self.vertices.reserve_exact(vertex_count);
        self.triangles.reserve_exact(triangle_count);
    }

    pub fn push_vertex(&mut self, vertex: Vertex) -> VertexId {
        assert!(
            self.vertices.len() < self.vertices.capacity(),
            "vertex arena of {} exceeded its reserved capacity",
            self.mesh_name
        );
        self.vertices.push(vertex);
        VertexId(self.vertices.len() - 1)
    }

    pub fn push_triangle(&mut self, triangle: Triangle) -> TriangleId {
        assert!(
            self.triangles.len() < self.triangles.capacity(),
            "triangle arena of {} exceeded its reserved capacity",
            self.mesh_name
        );
        self.triangles.push(triangle);
        TriangleId(self.triangles.len() - 1)
    }

    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId> {
        (0..self.vertices.len()).map(VertexId)
    }

    pub fn live_triangle_count(&self) -> usize {
        self.triangles.iter().filter(|t| !t.is_removed).count()
    }

    /// Face normal for the given corner positions.
    pub fn face_normal(p0: &Point3f, p1: &Point3f, p2: &Point3f) -> Vector3f {
        let e1 = p1 - p0;
        let e2 = p2 - p1;
        normalize_or_zero(e1.cross(&e2))
    }

    pub fn compute_triangle_normal(&mut self, tri: TriangleId) {
        let [a, b, c] = self[tri].vertices;
        let normal = Self::face_normal(&self[a].position, &self[b].position, &self[c].position);
        self[tri].normal = normal;
    }

    pub fn add_edge(&mut self, v: VertexId, dst: VertexId) {
        let edges = &mut self[v].edges;
        match edges.iter_mut().find(|e| e.dst == dst) {
            Some(edge) => edge.ref_count += 1,
            None => {
                let mut edge = Edge::new(dst);
                edge.ref_count = 1;
                edges.push(edge);
            }
        }
    }

    pub fn remove_edge(&mut self, v: VertexId, dst: VertexId) {
        let edges = &mut self[v].edges;
        let pos = edges.iter().position(|e| e.dst == dst);
        let pos = match pos {
            Some(pos) => pos,
            None => panic!("edge {:?} -> {:?} does not exist", v, dst),
        };
        if edges[pos].ref_count == 1 {
            edges.swap_remove(pos);
        } else {
            edges[pos].ref_count -= 1;
        }
    }

    /// Register a live triangle with its corners and their edges.
    pub fn add_triangle_to_edges(&mut self, tri: TriangleId) {
        let corners = self[tri].vertices;
        for &v in &corners {
            debug_assert!(!self[v].triangles.contains(&tri));
            self[v].triangles.push(tri);
        }
        for i in 0..3 {
            for n in 0..3 {
                if i != n {
                    self.add_edge(corners[i], corners[n]);
                }
            }
        }
    }

    /// Unregister a triangle, leaving the lists of `skip` untouched.
    pub fn remove_triangle_from_edges(&mut self, tri: TriangleId, skip: Option<VertexId>) {
        let corners = self[tri].vertices;
        for &v in &corners {
            if Some(v) == skip {
                continue;
            }
            let list = &mut self[v].triangles;
            match list.iter().position(|&t| t == tri) {
                Some(pos) => {
                    list.swap_remove(pos);
                }
                None => panic!("{:?} is not registered with {:?}", tri, v),
            }
        }
        for i in 0..3 {
            if Some(corners[i]) == skip {
                continue;
            }
            for n in 0..3 {
                if i != n {
                    self.remove_edge(corners[i], corners[n]);
                }
            }
        }
    }

    /// Move the `src` corner of `tri` onto `dst` with original index `dst_id`.
    ///
    /// Edges owned by `src` are left alone; the caller drops them with `src`.
    pub fn replace_vertex(&mut self, tri: TriangleId, src: VertexId, dst: VertexId, dst_id: u32) {
        let corner = match self[tri].corner_of(src) {
            Some(corner) => corner,
            None => panic!("{:?} does not contain {:?}", tri, src),
        };
        debug_assert!(!self[tri].has_vertex(dst));
        self[dst].triangles.push(tri);
        let corners = self[tri].vertices;
        for (n, &other) in corners.iter().enumerate() {
            if n != corner {
                self.remove_edge(other, src);
                self.add_edge(other, dst);
                self.add_edge(dst, other);
            }
        }
        let t = &mut self[tri];
        t.vertices[corner] = dst;
        t.vertex_ids[corner] = dst_id;
    }

    /// Some edge is used by a single triangle.
    pub fn is_border_vertex(&self, v: VertexId) -> bool {
        self[v].edges.iter().any(|e| e.ref_count == 1)
    }

    /// Pinned by one of the mesh integrity options.
    pub fn is_pinned(&self, v: VertexId) -> bool {
        (self.prevent_punching_holes && self.is_border_vertex(v))
            || (self.prevent_breaking_lines && self[v].is_line_vertex)
    }

    /// Check refcounts and triangle membership against the live triangles.
    pub fn validate(&self) -> Result<()> {
        let mut expected: HashMap<(VertexId, VertexId), u32> = HashMap::new();
        for (ti, tri) in self.triangles.iter().enumerate() {
            if tri.is_removed {
                continue;
            }
            let id = TriangleId(ti);
            if tri.is_malformed() {
                return Err(Error::Algorithm(format!(
                    "live {:?} is malformed: {:?}",
                    id, tri.vertices
                )));
            }
            for i in 0..3 {
                let v = tri.vertices[i];
                if self[v].is_removed {
                    return Err(Error::Algorithm(format!(
                        "live {:?} references removed {:?}",
                        id, v
                    )));
                }
                if !self[v].triangles.contains(&id) {
                    return Err(Error::Algorithm(format!(
                        "{:?} is missing from {:?}",
                        id, v
                    )));
                }
                for n in 0..3 {
                    if i != n {
                        *expected.entry((v, tri.vertices[n])).or_insert(0) += 1;
                    }
                }
            }
        }
        let mut edge_total = 0usize;
        for (vi, vertex) in self.vertices.iter().enumerate() {
            let v = VertexId(vi);
            for &tri in &vertex.triangles {
                if self[tri].is_removed || !self[tri].has_vertex(v) {
                    return Err(Error::Algorithm(format!("{:?} lists stale {:?}", v, tri)));
                }
            }
            for edge in &vertex.edges {
                let count = expected.get(&(v, edge.dst)).copied().unwrap_or(0);
                if edge.ref_count != count {
                    return Err(Error::Algorithm(format!(
                        "edge {:?} -> {:?} has refcount {}, {} live triangles use it",
                        v, edge.dst, edge.ref_count, count
                    )));
                }
            }
            edge_total += vertex.edges.len();
        }
        if edge_total != expected.len() {
            return Err(Error::Algorithm(format!(
                "{} edges stored, {} used by live triangles",
                edge_total,
                expected.len()
            )));
        }
        Ok(())
    }

    pub fn assert_valid_mesh(&self) {
        if let Err(err) = self.validate() {
            panic!("invalid topology in {}: {}", self.mesh_name, err);
        }
    }
}
