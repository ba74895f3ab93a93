//! Index buffer baking
//!
//! An output provider turns the live triangles of [`LodData`] into one index
//! buffer per submesh and level. [`UncompressedOutput`] writes a fresh buffer
//! per level. [`CompressedOutput`] packs two consecutive levels into a single
//! buffer: the indices only the finer level needs come first, the indices
//! both levels share sit in the middle and the coarser level's new indices
//! close the buffer, so each level is a range of it.
//!
//! Where the buffers go is up to an [`LodIndexSink`]: straight into a
//! [`LodMesh`] through [`MeshOutput`], or into a detached [`LodOutputBuffer`]
//! that is injected later.

use crate::data::{LodData, TriangleId};
use meshlod_core::{Error, IndexBuffer, IndexData, IndexWidth, LodMesh, MeshLodUsage, Result};
use std::sync::Arc;

/// Receives baked index data.
pub trait LodIndexSink {
    fn submesh_count(&self) -> usize;

    /// Generated levels registered so far for `submesh`.
    fn lod_index_count(&self, submesh: usize) -> usize;

    fn allocate_index_buffer(&mut self, width: IndexWidth, index_count: usize) -> IndexBuffer {
        IndexBuffer::with_capacity(width, index_count)
    }

    /// Register `index_data` as generated level `position` of `submesh`,
    /// moving the levels at and after `position` one back.
    fn insert_lod_index(&mut self, submesh: usize, position: usize, index_data: IndexData);

    fn push_lod_usage(&mut self, usage: MeshLodUsage);
}

impl<S: LodIndexSink + ?Sized> LodIndexSink for &mut S {
    fn submesh_count(&self) -> usize {
        (**self).submesh_count()
    }

    fn lod_index_count(&self, submesh: usize) -> usize {
        (**self).lod_index_count(submesh)
    }

    fn allocate_index_buffer(&mut self, width: IndexWidth, index_count: usize) -> IndexBuffer {
        (**self).allocate_index_buffer(width, index_count)
    }

    fn insert_lod_index(&mut self, submesh: usize, position: usize, index_data: IndexData) {
        (**self).insert_lod_index(submesh, position, index_data)
    }

    fn push_lod_usage(&mut self, usage: MeshLodUsage) {
        (**self).push_lod_usage(usage)
    }
}

pub trait LodOutputProvider {
    /// Check the destination against the loaded topology.
    fn prepare(&mut self, _data: &LodData) -> Result<()> {
        Ok(())
    }

    /// Placeholder level for a manually supplied mesh.
    fn bake_manual_lods(&mut self, data: &LodData);

    /// Bake the live triangles as the next level.
    fn bake_lods(&mut self, data: &mut LodData, last_level: bool);

    /// Emit anything still held back once all levels are baked.
    fn finalize(&mut self, _data: &mut LodData) {}

    fn add_lod_usage(&mut self, usage: MeshLodUsage);

    fn triangle_removed(&mut self, _data: &mut LodData, _tri: TriangleId) {}

    fn triangle_changed(&mut self, _data: &mut LodData, _tri: TriangleId) {}
}

/// A buffer holding one degenerate triangle.
///
/// Stands in for empty levels, some renderers reject zero-length buffers.
pub fn dummy_index_data(width: IndexWidth) -> IndexData {
    IndexData::new(IndexBuffer::from_indices(width, [0, 0, 0]))
}

fn check_submesh_count<S: LodIndexSink>(sink: &S, data: &LodData) -> Result<()> {
    if sink.submesh_count() != data.index_buffer_infos.len() {
        return Err(Error::InvalidData(format!(
            "output has {} submeshes, {} has {}",
            sink.submesh_count(),
            data.mesh_name,
            data.index_buffer_infos.len()
        )));
    }
    Ok(())
}

fn bake_manual<S: LodIndexSink>(sink: &mut S, data: &LodData) {
    for (i, info) in data.index_buffer_infos.iter().enumerate() {
        let position = sink.lod_index_count(i);
        sink.insert_lod_index(i, position, dummy_index_data(info.index_width));
    }
}

/// Write the live triangles of every submesh into fresh buffers.
///
/// `positions` overrides where each submesh's level is inserted, by default
/// it is appended.
fn bake_fresh<S: LodIndexSink>(sink: &mut S, data: &LodData, positions: Option<&[usize]>) {
    let mut buffers: Vec<Option<IndexBuffer>> = data
        .index_buffer_infos
        .iter()
        .map(|info| {
            if info.passthrough.is_some() {
                None
            } else {
                Some(sink.allocate_index_buffer(info.index_width, info.index_count.max(3)))
            }
        })
        .collect();

    for tri in data.triangles.iter().filter(|t| !t.is_removed) {
        if let Some(buffer) = buffers[tri.submesh_id].as_mut() {
            for &id in &tri.vertex_ids {
                buffer.push(id);
            }
        }
    }

    for (i, (info, buffer)) in data.index_buffer_infos.iter().zip(buffers).enumerate() {
        let index_data = match (&info.passthrough, buffer) {
            (Some(passthrough), _) => passthrough.clone(),
            (None, Some(mut buffer)) => {
                debug_assert_eq!(buffer.len(), info.index_count);
                if buffer.is_empty() {
                    for _ in 0..3 {
                        buffer.push(0);
                    }
                }
                IndexData::new(buffer)
            }
            (None, None) => unreachable!(),
        };
        let position = positions
            .map(|p| p[i])
            .unwrap_or_else(|| sink.lod_index_count(i));
        sink.insert_lod_index(i, position, index_data);
    }
}

/// One freshly written buffer per submesh and level.
#[derive(Debug)]
pub struct UncompressedOutput<S> {
    sink: S,
}

impl<S: LodIndexSink> UncompressedOutput<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_inner(self) -> S {
        self.sink
    }
}

impl<S: LodIndexSink> LodOutputProvider for UncompressedOutput<S> {
    fn prepare(&mut self, data: &LodData) -> Result<()> {
        check_submesh_count(&self.sink, data)
    }

    fn bake_manual_lods(&mut self, data: &LodData) {
        bake_manual(&mut self.sink, data);
    }

    fn bake_lods(&mut self, data: &mut LodData, _last_level: bool) {
        bake_fresh(&mut self.sink, data, None);
    }

    fn add_lod_usage(&mut self, usage: MeshLodUsage) {
        self.sink.push_lod_usage(usage);
    }
}

/// Two consecutive levels per buffer.
///
/// The first of a pair only snapshots the triangles. The second emits the
/// shared buffer for both. A trailing unpaired level is written fresh.
#[derive(Debug)]
pub struct CompressedOutput<S> {
    sink: S,
    first_buffer_pass: bool,
    /// Where each submesh's snapshot level goes once it is written.
    pending_positions: Vec<usize>,
}

impl<S: LodIndexSink> CompressedOutput<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            first_buffer_pass: true,
            pending_positions: Vec::new(),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_inner(self) -> S {
        self.sink
    }

    /// Run one of the two passes of a shared buffer.
    pub fn bake_merged_lods(&mut self, data: &mut LodData, first_buffer_pass: bool) {
        if first_buffer_pass {
            self.snapshot(data);
        } else {
            self.emit_merged(data);
        }
    }

    fn snapshot(&mut self, data: &mut LodData) {
        self.pending_positions = (0..data.index_buffer_infos.len())
            .map(|i| self.sink.lod_index_count(i))
            .collect();
        let mut index_count = 0;
        for info in &mut data.index_buffer_infos {
            info.prev_index_count = info.index_count;
            info.prev_only_index_count = 0;
            index_count += info.index_count;
        }
        data.triangle_cache.clear();
        data.triangle_cache.reserve(index_count / 3);
        for tri in &mut data.triangles {
            tri.vertex_changed = false;
            tri.prev_lod = if tri.is_removed {
                None
            } else {
                data.triangle_cache.push(tri.vertex_ids);
                Some(data.triangle_cache.len() - 1)
            };
        }
    }

    fn emit_merged(&mut self, data: &mut LodData) {
        let mut buffers: Vec<Option<IndexBuffer>> = data
            .index_buffer_infos
            .iter()
            .map(|info| {
                if info.passthrough.is_some() {
                    return None;
                }
                debug_assert!(info.prev_index_count >= info.index_count);
                debug_assert!(info.prev_index_count >= info.prev_only_index_count);
                let index_count = info.index_count + info.prev_only_index_count;
                Some(self.sink.allocate_index_buffer(info.index_width, index_count.max(3)))
            })
            .collect();

        let mut write = |submesh: usize, ids: [u32; 3]| {
            if let Some(buffer) = buffers[submesh].as_mut() {
                for id in ids {
                    buffer.push(id);
                }
            }
        };
        // Finer level only
        for tri in data.triangles.iter().filter(|t| t.vertex_changed) {
            let slot = match tri.prev_lod {
                Some(slot) => slot,
                None => panic!("changed triangle in {} has no snapshot", data.mesh_name),
            };
            write(tri.submesh_id, data.triangle_cache[slot]);
        }
        // Both levels
        for tri in data.triangles.iter() {
            if !tri.is_removed && !tri.vertex_changed {
                debug_assert_eq!(tri.prev_lod.map(|s| data.triangle_cache[s]), Some(tri.vertex_ids));
                write(tri.submesh_id, tri.vertex_ids);
            }
        }
        // Coarser level only
        for tri in data.triangles.iter() {
            if !tri.is_removed && tri.vertex_changed {
                write(tri.submesh_id, tri.vertex_ids);
            }
        }

        for (i, (info, buffer)) in data.index_buffer_infos.iter().zip(buffers).enumerate() {
            let (prev, cur) = match (&info.passthrough, buffer) {
                (Some(passthrough), _) => (passthrough.clone(), passthrough.clone()),
                (None, Some(mut buffer)) => {
                    debug_assert_eq!(
                        buffer.len(),
                        info.index_count + info.prev_only_index_count
                    );
                    let prev_count = if buffer.is_empty() {
                        3
                    } else {
                        info.prev_index_count
                    };
                    let cur_count = if info.index_count == 0 {
                        for _ in 0..3 {
                            buffer.push(0);
                        }
                        3
                    } else {
                        info.index_count
                    };
                    let start = buffer.len() - cur_count;
                    let buffer = Arc::new(buffer);
                    (
                        IndexData::from_shared(buffer.clone(), 0, prev_count),
                        IndexData::from_shared(buffer, start, cur_count),
                    )
                }
                (None, None) => unreachable!(),
            };
            self.sink.insert_lod_index(i, self.pending_positions[i], prev);
            let position = self.sink.lod_index_count(i);
            self.sink.insert_lod_index(i, position, cur);
        }
    }

    fn mark_changed(data: &mut LodData, tri: TriangleId) {
        if !data[tri].vertex_changed {
            data[tri].vertex_changed = true;
            let submesh = data[tri].submesh_id;
            data.index_buffer_infos[submesh].prev_only_index_count += 3;
        }
    }
}

impl<S: LodIndexSink> LodOutputProvider for CompressedOutput<S> {
    fn prepare(&mut self, data: &LodData) -> Result<()> {
        check_submesh_count(&self.sink, data)
    }

    fn bake_manual_lods(&mut self, data: &LodData) {
        bake_manual(&mut self.sink, data);
    }

    fn bake_lods(&mut self, data: &mut LodData, last_level: bool) {
        if !last_level || !self.first_buffer_pass {
            self.bake_merged_lods(data, self.first_buffer_pass);
            self.first_buffer_pass = !self.first_buffer_pass;
        } else {
            bake_fresh(&mut self.sink, data, None);
        }
    }

    fn finalize(&mut self, data: &mut LodData) {
        if !self.first_buffer_pass {
            // Nothing collapsed since the snapshot, the live triangles are
            // still the snapshot level
            bake_fresh(&mut self.sink, data, Some(&self.pending_positions));
            self.first_buffer_pass = true;
        }
    }

    fn add_lod_usage(&mut self, usage: MeshLodUsage) {
        self.sink.push_lod_usage(usage);
    }

    fn triangle_removed(&mut self, data: &mut LodData, tri: TriangleId) {
        Self::mark_changed(data, tri);
    }

    fn triangle_changed(&mut self, data: &mut LodData, tri: TriangleId) {
        Self::mark_changed(data, tri);
    }
}

/// Bakes into the submeshes of a live mesh.
#[derive(Debug)]
pub struct MeshOutput<'a> {
    mesh: &'a mut LodMesh,
}

impl<'a> MeshOutput<'a> {
    pub fn new(mesh: &'a mut LodMesh) -> Self {
        Self { mesh }
    }
}

impl LodIndexSink for MeshOutput<'_> {
    fn submesh_count(&self) -> usize {
        self.mesh.submeshes.len()
    }

    fn lod_index_count(&self, submesh: usize) -> usize {
        self.mesh.submeshes[submesh].lod_index_data.len()
    }

    fn insert_lod_index(&mut self, submesh: usize, position: usize, index_data: IndexData) {
        self.mesh.submeshes[submesh]
            .lod_index_data
            .insert(position, index_data);
    }

    fn push_lod_usage(&mut self, usage: MeshLodUsage) {
        self.mesh.lod_usages.push(usage);
    }
}

/// Baked levels kept apart from any mesh.
///
/// Owns everything it holds, so it can be produced on a worker thread and
/// injected into the mesh later.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LodOutputBuffer {
    /// Generated levels, per submesh.
    pub submeshes: Vec<Vec<IndexData>>,
    pub lod_usages: Vec<MeshLodUsage>,
}

impl LodOutputBuffer {
    pub fn new(submesh_count: usize) -> Self {
        Self {
            submeshes: vec![Vec::new(); submesh_count],
            lod_usages: Vec::new(),
        }
    }

    /// Replace the generated levels of `mesh` with the buffered ones.
    pub fn inject(&self, mesh: &mut LodMesh) -> Result<()> {
        if mesh.submeshes.len() != self.submeshes.len() {
            return Err(Error::InvalidData(format!(
                "{} has {} submeshes, the output buffer {}",
                mesh.name,
                mesh.submeshes.len(),
                self.submeshes.len()
            )));
        }
        mesh.remove_lod_levels();
        for (sub, levels) in mesh.submeshes.iter_mut().zip(&self.submeshes) {
            sub.lod_index_data = levels.clone();
        }
        mesh.lod_usages = self.lod_usages.clone();
        Ok(())
    }
}

impl LodIndexSink for LodOutputBuffer {
    fn submesh_count(&self) -> usize {
        self.submeshes.len()
    }

    fn lod_index_count(&self, submesh: usize) -> usize {
        self.submeshes[submesh].len()
    }

    fn insert_lod_index(&mut self, submesh: usize, position: usize, index_data: IndexData) {
        self.submeshes[submesh].insert(position, index_data);
    }

    fn push_lod_usage(&mut self, usage: MeshLodUsage) {
        self.lod_usages.push(usage);
    }
}
