//! Input adapters building the topology model
//!
//! [`MeshInputProvider`] reads a borrowed [`LodMesh`] directly.
//! [`BufferInputProvider`] reads a [`LodInputBuffer`], a detached snapshot
//! that can be sent to another thread. Both feed the same loader.

use crate::data::{IndexBufferInfo, LodData, Triangle, UniqueVertexSet, Vertex, VertexId};
use crate::heap::CollapseCostHeap;
use log::{debug, warn};
use meshlod_core::{
    normalize_or_zero, Error, IndexData, IndexWidth, LodMesh, OperationType, Result, VertexData,
    Vector3f,
};
use std::sync::Arc;

/// Source of the topology model for one reduction run.
pub trait LodInputProvider {
    /// Fill `data`, which must be freshly constructed.
    fn initialize_data(&self, data: &mut LodData) -> Result<()>;

    fn mesh_name(&self) -> &str;

    fn bounding_sphere_radius(&self) -> f32;
}

/// Borrowed view of one submesh.
struct SubmeshSource<'a> {
    use_shared_vertices: bool,
    vertex_data: Option<&'a VertexData>,
    operation_type: OperationType,
    index_data: &'a IndexData,
}

/// Borrowed view of the whole mesh, shared by both providers.
struct MeshSource<'a> {
    name: &'a str,
    shared_vertex_data: Option<&'a VertexData>,
    submeshes: Vec<SubmeshSource<'a>>,
}

impl<'a> MeshSource<'a> {
    fn pool(&self, sub: &SubmeshSource<'a>) -> Option<&'a VertexData> {
        if sub.use_shared_vertices {
            self.shared_vertex_data
        } else {
            sub.vertex_data
        }
    }

    /// Upper bounds for the arenas: every source vertex, every triangle.
    fn count_elements(&self) -> (usize, usize) {
        let mut shared_added = false;
        let mut vertex_count = 0;
        let mut triangle_count = 0;
        for sub in &self.submeshes {
            if sub.use_shared_vertices {
                if !shared_added {
                    shared_added = true;
                    vertex_count += self.shared_vertex_data.map_or(0, VertexData::len);
                }
            } else {
                vertex_count += sub.vertex_data.map_or(0, VertexData::len);
            }
            triangle_count += sub.operation_type.triangle_count(sub.index_data.count);
        }
        (vertex_count, triangle_count)
    }

    fn validate(&self) -> Result<()> {
        for (i, sub) in self.submeshes.iter().enumerate() {
            let pool = self.pool(sub).ok_or_else(|| {
                Error::InvalidData(format!(
                    "submesh {} of {} has no vertex data",
                    i, self.name
                ))
            })?;
            if let Some(normals) = &pool.normals {
                if normals.len() != pool.len() {
                    return Err(Error::InvalidData(format!(
                        "submesh {} of {} has {} normals for {} vertices",
                        i,
                        self.name,
                        normals.len(),
                        pool.len()
                    )));
                }
            }
            if let Some(bad) = sub.index_data.indices().find(|&idx| idx as usize >= pool.len()) {
                return Err(Error::InvalidData(format!(
                    "submesh {} of {} references vertex {} of {}",
                    i,
                    self.name,
                    bad,
                    pool.len()
                )));
            }
        }
        Ok(())
    }

    fn has_normals(&self) -> bool {
        self.submeshes
            .iter()
            .filter_map(|sub| self.pool(sub))
            .all(|pool| pool.normals.is_some())
    }
}

/// Builds a [`LodData`] from a [`MeshSource`].
struct DataLoader<'d> {
    data: &'d mut LodData,
    unique_vertices: UniqueVertexSet,
    shared_lookup: Vec<VertexId>,
    malformed: usize,
}

impl<'d> DataLoader<'d> {
    fn load(source: &MeshSource<'_>, data: &'d mut LodData) -> Result<()> {
        source.validate()?;
        let (vertex_count, triangle_count) = source.count_elements();
        data.reserve_exact(vertex_count, triangle_count);
        data.cost_heap = CollapseCostHeap::with_capacity(vertex_count);
        data.use_vertex_normals &= source.has_normals();

        let mut loader = DataLoader {
            data,
            unique_vertices: UniqueVertexSet::with_capacity(vertex_count),
            shared_lookup: Vec::new(),
            malformed: 0,
        };

        for (submesh_id, sub) in source.submeshes.iter().enumerate() {
            let lookup = match source.pool(sub) {
                Some(pool) if sub.use_shared_vertices => {
                    if loader.shared_lookup.is_empty() {
                        loader.shared_lookup = loader.add_vertex_data(pool);
                    }
                    loader.shared_lookup.clone()
                }
                Some(pool) => loader.add_vertex_data(pool),
                None => Vec::new(),
            };
            let width = IndexWidth::for_vertex_count(lookup.len());
            loader.data.index_buffer_infos.push(IndexBufferInfo::new(width));
            if sub.index_data.count == 0 {
                continue;
            }
            if sub.operation_type.is_triangles() {
                loader.add_index_data(sub, &lookup, submesh_id);
            } else {
                loader.add_line_data(sub, &lookup, submesh_id);
            }
        }

        let data = loader.data;
        data.live_vertex_count = data.vertices.iter().filter(|v| v.is_live()).count();
        let unused = data.vertices.len() - data.live_vertex_count;
        if unused > 0 {
            debug!(
                "{}: {} vertices are not used by any triangle and are excluded from reduction",
                data.mesh_name, unused
            );
        }
        debug!(
            "{}: loaded {} unique vertices, {} triangles ({} malformed)",
            data.mesh_name,
            data.vertices.len(),
            data.triangles.len(),
            loader.malformed
        );
        Ok(())
    }

    /// Merge a vertex pool into the unique vertex set.
    fn add_vertex_data(&mut self, pool: &VertexData) -> Vec<VertexId> {
        let use_normals = self.data.use_vertex_normals;
        let mut lookup = Vec::with_capacity(pool.len());
        for (i, position) in pool.positions.iter().enumerate() {
            let next_id = VertexId(self.data.vertices.len());
            let normal = pool
                .normals
                .as_ref()
                .map(|n| n[i])
                .filter(|_| use_normals);
            let id = match self.unique_vertices.insert(position, next_id) {
                Some(existing) => {
                    let vertex = &mut self.data[existing];
                    vertex.seam = true;
                    if let Some(n) = normal {
                        if vertex.normal.x != n.x {
                            let sum = vertex.normal + n;
                            vertex.normal = if sum == Vector3f::zeros() {
                                Vector3f::x()
                            } else {
                                normalize_or_zero(sum)
                            };
                        }
                    }
                    existing
                }
                None => {
                    let mut vertex = Vertex::new(*position);
                    if let Some(n) = normal {
                        vertex.normal = normalize_or_zero(n);
                    }
                    self.data.push_vertex(vertex)
                }
            };
            lookup.push(id);
        }
        lookup
    }

    fn add_index_data(&mut self, sub: &SubmeshSource<'_>, lookup: &[VertexId], submesh_id: usize) {
        let indices: Vec<u32> = sub.index_data.indices().collect();
        let corners = triangulate(sub.operation_type, &indices);
        self.data.index_buffer_infos[submesh_id].index_count = corners.len() * 3;
        for ids in corners {
            let vertices = ids.map(|i| lookup[i as usize]);
            let tri = self.data.push_triangle(Triangle::new(vertices, ids, submesh_id));
            if self.data[tri].is_malformed() {
                warn!(
                    "In {} malformed triangle found with ID: {}. Vertex ids {:?}. \
                     It will be excluded from Lod level calculations.",
                    self.data.mesh_name, tri.0, ids
                );
                self.data[tri].is_removed = true;
                self.data.index_buffer_infos[submesh_id].index_count -= 3;
                self.malformed += 1;
                continue;
            }
            self.data.compute_triangle_normal(tri);
            self.data.add_triangle_to_edges(tri);
        }
    }

    fn add_line_data(&mut self, sub: &SubmeshSource<'_>, lookup: &[VertexId], submesh_id: usize) {
        for idx in sub.index_data.indices() {
            self.data[lookup[idx as usize]].is_line_vertex = true;
        }
        let info = &mut self.data.index_buffer_infos[submesh_id];
        info.index_count = sub.index_data.count;
        info.passthrough = Some(sub.index_data.clone());
    }
}

/// Corner indices of every triangle of an index stream.
///
/// Strips alternate winding so every triangle faces the same way.
pub fn triangulate(operation_type: OperationType, indices: &[u32]) -> Vec<[u32; 3]> {
    match operation_type {
        OperationType::TriangleList => indices
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect(),
        OperationType::TriangleStrip => indices
            .windows(3)
            .enumerate()
            .map(|(i, w)| {
                if i % 2 == 0 {
                    [w[0], w[1], w[2]]
                } else {
                    [w[1], w[0], w[2]]
                }
            })
            .collect(),
        OperationType::TriangleFan => match indices.split_first() {
            Some((&center, rest)) => rest.windows(2).map(|w| [center, w[0], w[1]]).collect(),
            None => Vec::new(),
        },
        OperationType::LineList | OperationType::LineStrip => Vec::new(),
    }
}

/// Reads the live mesh. The mesh stays borrowed for the whole load.
pub struct MeshInputProvider<'a> {
    mesh: &'a LodMesh,
}

impl<'a> MeshInputProvider<'a> {
    pub fn new(mesh: &'a LodMesh) -> Self {
        Self { mesh }
    }

    fn source(&self) -> MeshSource<'a> {
        let mesh = self.mesh;
        MeshSource {
            name: &mesh.name,
            shared_vertex_data: mesh.shared_vertex_data.as_ref(),
            submeshes: mesh
                .submeshes
                .iter()
                .map(|sub| SubmeshSource {
                    use_shared_vertices: sub.use_shared_vertices,
                    vertex_data: sub.vertex_data.as_ref(),
                    operation_type: sub.operation_type,
                    index_data: &sub.index_data,
                })
                .collect(),
        }
    }
}

impl LodInputProvider for MeshInputProvider<'_> {
    fn initialize_data(&self, data: &mut LodData) -> Result<()> {
        DataLoader::load(&self.source(), data)
    }

    fn mesh_name(&self) -> &str {
        &self.mesh.name
    }

    fn bounding_sphere_radius(&self) -> f32 {
        self.mesh.bounding_sphere_radius
    }
}

#[derive(Debug, Clone)]
pub struct LodInputSubmeshBuffer {
    pub use_shared_vertices: bool,
    pub vertex_buffer: Option<VertexData>,
    pub operation_type: OperationType,
    pub index_buffer: IndexData,
}

/// Snapshot of everything the loader reads from a mesh.
///
/// Positions and normals are copied. Index buffers are immutable behind an
/// `Arc`, so the snapshot shares them with the mesh.
#[derive(Debug, Clone)]
pub struct LodInputBuffer {
    pub mesh_name: String,
    pub bounding_sphere_radius: f32,
    pub shared_vertex_buffer: Option<VertexData>,
    pub submeshes: Vec<LodInputSubmeshBuffer>,
}

impl LodInputBuffer {
    pub fn from_mesh(mesh: &LodMesh) -> Self {
        let copy_pool = |pool: &VertexData| VertexData {
            positions: pool.positions.clone(),
            normals: pool.normals.clone(),
            texcoords: None,
        };
        Self {
            mesh_name: mesh.name.clone(),
            bounding_sphere_radius: mesh.bounding_sphere_radius,
            shared_vertex_buffer: mesh.shared_vertex_data.as_ref().map(copy_pool),
            submeshes: mesh
                .submeshes
                .iter()
                .map(|sub| LodInputSubmeshBuffer {
                    use_shared_vertices: sub.use_shared_vertices,
                    vertex_buffer: sub.vertex_data.as_ref().map(copy_pool),
                    operation_type: sub.operation_type,
                    index_buffer: IndexData::from_shared(
                        Arc::clone(&sub.index_data.buffer),
                        sub.index_data.start,
                        sub.index_data.count,
                    ),
                })
                .collect(),
        }
    }

    fn source(&self) -> MeshSource<'_> {
        MeshSource {
            name: &self.mesh_name,
            shared_vertex_data: self.shared_vertex_buffer.as_ref(),
            submeshes: self
                .submeshes
                .iter()
                .map(|sub| SubmeshSource {
                    use_shared_vertices: sub.use_shared_vertices,
                    vertex_data: sub.vertex_buffer.as_ref(),
                    operation_type: sub.operation_type,
                    index_data: &sub.index_buffer,
                })
                .collect(),
        }
    }
}

/// Reads a detached [`LodInputBuffer`].
pub struct BufferInputProvider {
    buffer: LodInputBuffer,
}

impl BufferInputProvider {
    pub fn new(buffer: LodInputBuffer) -> Self {
        Self { buffer }
    }

    pub fn buffer(&self) -> &LodInputBuffer {
        &self.buffer
    }
}

impl LodInputProvider for BufferInputProvider {
    fn initialize_data(&self, data: &mut LodData) -> Result<()> {
        DataLoader::load(&self.buffer.source(), data)
    }

    fn mesh_name(&self) -> &str {
        &self.buffer.mesh_name
    }

    fn bounding_sphere_radius(&self) -> f32 {
        self.buffer.bounding_sphere_radius
    }
}
