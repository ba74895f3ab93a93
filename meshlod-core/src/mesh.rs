//! Mesh data structures consumed and produced by LOD generation
//!
//! A [`LodMesh`] is the renderer-facing representation: vertex pools (one
//! optional shared pool plus one per submesh), per-submesh index data with a
//! primitive topology, and the skinning/pose/animation data that refers to
//! vertices by their pool index.

use crate::point::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Width of a single element of an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexWidth {
    U16,
    U32,
}

impl IndexWidth {
    /// Smallest width able to address `vertex_count` vertices.
    pub fn for_vertex_count(vertex_count: usize) -> Self {
        if vertex_count <= u16::MAX as usize + 1 {
            IndexWidth::U16
        } else {
            IndexWidth::U32
        }
    }

    pub fn size_in_bytes(self) -> usize {
        match self {
            IndexWidth::U16 => 2,
            IndexWidth::U32 => 4,
        }
    }
}

/// Index buffer storage, either 16 or 32 bit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexBuffer {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl IndexBuffer {
    pub fn with_capacity(width: IndexWidth, capacity: usize) -> Self {
        match width {
            IndexWidth::U16 => IndexBuffer::U16(Vec::with_capacity(capacity)),
            IndexWidth::U32 => IndexBuffer::U32(Vec::with_capacity(capacity)),
        }
    }

    /// Build a buffer of the given width from 32 bit indices.
    ///
    /// Every index must be addressable with `width`.
    pub fn from_indices<I: IntoIterator<Item = u32>>(width: IndexWidth, indices: I) -> Self {
        let iter = indices.into_iter();
        let mut buffer = Self::with_capacity(width, iter.size_hint().0);
        for index in iter {
            buffer.push(index);
        }
        buffer
    }

    pub fn width(&self) -> IndexWidth {
        match self {
            IndexBuffer::U16(_) => IndexWidth::U16,
            IndexBuffer::U32(_) => IndexWidth::U32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            IndexBuffer::U16(v) => v.len(),
            IndexBuffer::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index at `position`, widened to 32 bit.
    #[inline]
    pub fn get(&self, position: usize) -> Option<u32> {
        match self {
            IndexBuffer::U16(v) => v.get(position).map(|&i| i as u32),
            IndexBuffer::U32(v) => v.get(position).copied(),
        }
    }

    #[inline]
    pub fn push(&mut self, index: u32) {
        match self {
            IndexBuffer::U16(v) => {
                debug_assert!(index <= u16::MAX as u32, "index {} does not fit 16 bit", index);
                v.push(index as u16)
            }
            IndexBuffer::U32(v) => v.push(index),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    /// Raw little-endian view, as uploaded to a GPU.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            IndexBuffer::U16(v) => bytemuck::cast_slice(v),
            IndexBuffer::U32(v) => bytemuck::cast_slice(v),
        }
    }
}

/// A range inside an index buffer. Two LOD levels may share one buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexData {
    pub buffer: Arc<IndexBuffer>,
    pub start: usize,
    pub count: usize,
}

impl IndexData {
    /// Index data covering the whole of `buffer`.
    pub fn new(buffer: IndexBuffer) -> Self {
        let count = buffer.len();
        Self {
            buffer: Arc::new(buffer),
            start: 0,
            count,
        }
    }

    pub fn from_shared(buffer: Arc<IndexBuffer>, start: usize, count: usize) -> Self {
        debug_assert!(start + count <= buffer.len());
        Self {
            buffer,
            start,
            count,
        }
    }

    pub fn empty(width: IndexWidth) -> Self {
        Self::new(IndexBuffer::with_capacity(width, 0))
    }

    pub fn width(&self) -> IndexWidth {
        self.buffer.width()
    }

    /// Indices in `[start, start + count)`.
    pub fn indices(&self) -> impl Iterator<Item = u32> + '_ {
        (self.start..self.start + self.count).filter_map(move |i| self.buffer.get(i))
    }

    /// Index triples, assuming a triangle list.
    pub fn triangles(&self) -> Vec<[u32; 3]> {
        let indices: Vec<u32> = self.indices().collect();
        indices
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect()
    }

    pub fn shares_buffer_with(&self, other: &IndexData) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }
}

/// Primitive topology of a submesh index stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationType {
    TriangleList,
    TriangleStrip,
    TriangleFan,
    LineList,
    LineStrip,
}

impl OperationType {
    pub fn is_triangles(self) -> bool {
        matches!(
            self,
            OperationType::TriangleList | OperationType::TriangleStrip | OperationType::TriangleFan
        )
    }

    /// Number of triangles described by `index_count` indices.
    pub fn triangle_count(self, index_count: usize) -> usize {
        match self {
            OperationType::TriangleList => index_count / 3,
            OperationType::TriangleStrip | OperationType::TriangleFan => {
                index_count.saturating_sub(2)
            }
            OperationType::LineList | OperationType::LineStrip => 0,
        }
    }
}

/// A vertex pool: positions plus optional per-vertex attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VertexData {
    pub positions: Vec<Point3f>,
    pub normals: Option<Vec<Vector3f>>,
    pub texcoords: Option<Vec<[f32; 2]>>,
}

impl VertexData {
    pub fn new(positions: Vec<Point3f>) -> Self {
        Self {
            positions,
            normals: None,
            texcoords: None,
        }
    }

    pub fn with_normals(mut self, normals: Vec<Vector3f>) -> Self {
        if normals.len() == self.positions.len() {
            self.normals = Some(normals);
        }
        self
    }

    pub fn with_texcoords(mut self, texcoords: Vec<[f32; 2]>) -> Self {
        if texcoords.len() == self.positions.len() {
            self.texcoords = Some(texcoords);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// New pool whose vertex `i` is this pool's vertex `old_indices[i]`.
    pub fn gather(&self, old_indices: &[u32]) -> VertexData {
        let pick = |i: &u32| *i as usize;
        VertexData {
            positions: old_indices.iter().map(|i| self.positions[pick(i)]).collect(),
            normals: self
                .normals
                .as_ref()
                .map(|n| old_indices.iter().map(|i| n[pick(i)]).collect()),
            texcoords: self
                .texcoords
                .as_ref()
                .map(|t| old_indices.iter().map(|i| t[pick(i)]).collect()),
        }
    }
}

/// Identifies the vertex pool a pose or animation track deforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VertexPoolId {
    Shared,
    SubMesh(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VertexBoneAssignment {
    pub vertex_index: u32,
    pub bone_index: u16,
    pub weight: f32,
}

/// A morph target stored as sparse per-vertex offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub name: String,
    pub target: VertexPoolId,
    pub offsets: BTreeMap<u32, Vector3f>,
    pub normals: BTreeMap<u32, Vector3f>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseRef {
    pub pose_index: usize,
    pub influence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VertexKeyFrame {
    /// Full replacement positions for every vertex of the target pool.
    Morph {
        time: f32,
        positions: Vec<Point3f>,
        normals: Option<Vec<Vector3f>>,
    },
    /// Weighted blend of poses.
    Pose { time: f32, pose_refs: Vec<PoseRef> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexAnimationTrack {
    pub target: VertexPoolId,
    pub keyframes: Vec<VertexKeyFrame>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Animation {
    pub name: String,
    pub length: f32,
    pub vertex_tracks: Vec<VertexAnimationTrack>,
}

/// One generated LOD level as seen by the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshLodUsage {
    /// Distance or pixel count at which the level activates.
    pub value: f32,
    pub manual_mesh_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubMesh {
    pub name: String,
    pub use_shared_vertices: bool,
    /// Own vertex pool, `None` when `use_shared_vertices` is set.
    pub vertex_data: Option<VertexData>,
    pub operation_type: OperationType,
    pub index_data: IndexData,
    /// Generated levels. Triangle submeshes get triangle lists, line
    /// submeshes share their original data. Entry `i` belongs to
    /// `LodMesh::lod_usages[i]`.
    pub lod_index_data: Vec<IndexData>,
    pub bone_assignments: Vec<VertexBoneAssignment>,
}

impl SubMesh {
    /// Submesh with its own vertex pool.
    pub fn new(name: impl Into<String>, vertex_data: VertexData, index_data: IndexData) -> Self {
        Self {
            name: name.into(),
            use_shared_vertices: false,
            vertex_data: Some(vertex_data),
            operation_type: OperationType::TriangleList,
            index_data,
            lod_index_data: Vec::new(),
            bone_assignments: Vec::new(),
        }
    }

    /// Submesh indexing into the mesh's shared pool.
    pub fn shared(name: impl Into<String>, index_data: IndexData) -> Self {
        Self {
            name: name.into(),
            use_shared_vertices: true,
            vertex_data: None,
            operation_type: OperationType::TriangleList,
            index_data,
            lod_index_data: Vec::new(),
            bone_assignments: Vec::new(),
        }
    }

    pub fn with_operation_type(mut self, operation_type: OperationType) -> Self {
        self.operation_type = operation_type;
        self
    }

    /// Index data of a LOD level; level 0 is the original geometry.
    pub fn lod_index(&self, level: usize) -> Option<&IndexData> {
        if level == 0 {
            Some(&self.index_data)
        } else {
            self.lod_index_data.get(level - 1)
        }
    }
}

/// A mesh ready for LOD generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LodMesh {
    pub name: String,
    pub shared_vertex_data: Option<VertexData>,
    pub submeshes: Vec<SubMesh>,
    pub bounding_sphere_radius: f32,
    pub shared_bone_assignments: Vec<VertexBoneAssignment>,
    pub poses: Vec<Pose>,
    pub animations: Vec<Animation>,
    pub lod_usages: Vec<MeshLodUsage>,
}

impl LodMesh {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shared_vertex_data: None,
            submeshes: Vec::new(),
            bounding_sphere_radius: 0.0,
            shared_bone_assignments: Vec::new(),
            poses: Vec::new(),
            animations: Vec::new(),
            lod_usages: Vec::new(),
        }
    }

    /// Single-submesh triangle list mesh with its own vertex pool.
    pub fn from_triangles(
        name: impl Into<String>,
        positions: Vec<Point3f>,
        faces: &[[u32; 3]],
    ) -> Self {
        let width = IndexWidth::for_vertex_count(positions.len());
        let indices = IndexBuffer::from_indices(width, faces.iter().flatten().copied());
        let mut mesh = Self::new(name);
        mesh.submeshes.push(SubMesh::new(
            "submesh0",
            VertexData::new(positions),
            IndexData::new(indices),
        ));
        mesh.update_bounds();
        mesh
    }

    pub fn with_shared_vertices(mut self, vertex_data: VertexData) -> Self {
        self.shared_vertex_data = Some(vertex_data);
        self
    }

    pub fn add_submesh(&mut self, submesh: SubMesh) -> usize {
        self.submeshes.push(submesh);
        self.submeshes.len() - 1
    }

    /// The pool a submesh's indices refer to.
    pub fn submesh_vertex_data(&self, submesh: usize) -> Option<&VertexData> {
        let sub = self.submeshes.get(submesh)?;
        if sub.use_shared_vertices {
            self.shared_vertex_data.as_ref()
        } else {
            sub.vertex_data.as_ref()
        }
    }

    pub fn vertex_pool(&self, pool: VertexPoolId) -> Option<&VertexData> {
        match pool {
            VertexPoolId::Shared => self.shared_vertex_data.as_ref(),
            VertexPoolId::SubMesh(i) => self.submeshes.get(i)?.vertex_data.as_ref(),
        }
    }

    /// Number of levels including the original geometry.
    pub fn lod_level_count(&self) -> usize {
        self.lod_usages.len() + 1
    }

    pub fn has_manual_lod_levels(&self) -> bool {
        self.lod_usages.iter().any(|u| u.manual_mesh_name.is_some())
    }

    /// Drop every generated level.
    pub fn remove_lod_levels(&mut self) {
        self.lod_usages.clear();
        for sub in &mut self.submeshes {
            sub.lod_index_data.clear();
        }
    }

    /// Recompute the bounding sphere radius from the vertex pools.
    pub fn update_bounds(&mut self) {
        use crate::traits::Bounded;
        self.bounding_sphere_radius = self.bounding_sphere_radius_from_origin();
    }
}
