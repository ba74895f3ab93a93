//! Promote the first generated level to the base geometry
//!
//! Once LOD0 is dropped some vertices are no longer referenced by any level.
//! [`Lod0Stripifier`] removes them from every vertex pool and renumbers the
//! index buffers, bone assignments, poses and morph animations that refer to
//! the pool.

use log::debug;
use meshlod_core::{
    Error, IndexBuffer, IndexData, IndexWidth, LodMesh, OperationType, Result, VertexBoneAssignment,
    VertexKeyFrame, VertexPoolId,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Old index to new index mapping of one vertex pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexRemap {
    old_to_new: Vec<Option<u32>>,
    new_to_old: Vec<u32>,
}

impl VertexRemap {
    /// Keep the used vertices in their current relative order.
    pub fn from_used(used: &[bool]) -> Self {
        let mut old_to_new = vec![None; used.len()];
        let mut new_to_old = Vec::new();
        for (old, _) in used.iter().enumerate().filter(|(_, u)| **u) {
            old_to_new[old] = Some(new_to_old.len() as u32);
            new_to_old.push(old as u32);
        }
        Self {
            old_to_new,
            new_to_old,
        }
    }

    /// Number the vertices in the order `indices` first reference them.
    pub fn from_first_use<I: IntoIterator<Item = u32>>(vertex_count: usize, indices: I) -> Self {
        let mut old_to_new = vec![None; vertex_count];
        let mut new_to_old = Vec::new();
        for old in indices {
            let slot = &mut old_to_new[old as usize];
            if slot.is_none() {
                *slot = Some(new_to_old.len() as u32);
                new_to_old.push(old);
            }
        }
        Self {
            old_to_new,
            new_to_old,
        }
    }

    #[inline]
    pub fn get(&self, old: u32) -> Option<u32> {
        self.old_to_new.get(old as usize).copied().flatten()
    }

    pub fn new_vertex_count(&self) -> usize {
        self.new_to_old.len()
    }

    pub fn old_vertex_count(&self) -> usize {
        self.old_to_new.len()
    }

    /// Old index of every new vertex, in new order.
    pub fn old_indices(&self) -> &[u32] {
        &self.new_to_old
    }

    /// Renumber a whole buffer, narrowing it when the pool got small enough.
    pub fn remap_index_buffer(&self, buffer: &IndexBuffer) -> Result<IndexBuffer> {
        let width = IndexWidth::for_vertex_count(self.new_vertex_count());
        let mut remapped = IndexBuffer::with_capacity(width, buffer.len());
        for old in buffer.iter() {
            let new = self.get(old).ok_or_else(|| {
                Error::InvalidData(format!("index {} refers to a stripped vertex", old))
            })?;
            remapped.push(new);
        }
        Ok(remapped)
    }

    fn remap_bone_assignments(&self, assignments: &mut Vec<VertexBoneAssignment>) {
        assignments.retain_mut(|a| match self.get(a.vertex_index) {
            Some(new) => {
                a.vertex_index = new;
                true
            }
            None => false,
        });
    }

    fn remap_sparse<T>(&self, entries: &BTreeMap<u32, T>) -> BTreeMap<u32, T>
    where
        T: Copy,
    {
        entries
            .iter()
            .filter_map(|(old, value)| self.get(*old).map(|new| (new, *value)))
            .collect()
    }

    fn gather<T: Copy>(&self, values: &[T]) -> Vec<T> {
        self.new_to_old.iter().map(|&old| values[old as usize]).collect()
    }
}

/// Drops LOD0 and the vertices only LOD0 used.
#[derive(Debug)]
pub struct Lod0Stripifier {
    stable_vertex_order: bool,
    remaps: Vec<(VertexPoolId, VertexRemap)>,
}

impl Default for Lod0Stripifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Lod0Stripifier {
    pub fn new() -> Self {
        Self {
            stable_vertex_order: true,
            remaps: Vec::new(),
        }
    }

    /// With `false`, vertices are renumbered in order of first use by the
    /// promoted level instead of keeping their relative order.
    pub fn with_stable_vertex_order(mut self, stable: bool) -> Self {
        self.stable_vertex_order = stable;
        self
    }

    /// The mapping applied to `pool` by the last strip.
    pub fn remap(&self, pool: VertexPoolId) -> Option<&VertexRemap> {
        self.remaps
            .iter()
            .find(|(id, _)| *id == pool)
            .map(|(_, remap)| remap)
    }

    /// Make LOD1 the base level of `mesh`.
    ///
    /// Returns `Ok(false)` and leaves the mesh alone when it has no generated
    /// levels or uses manual levels.
    pub fn strip_lod0_vertices(&mut self, mesh: &mut LodMesh) -> Result<bool> {
        self.remaps.clear();
        if mesh.lod_usages.is_empty() || mesh.has_manual_lod_levels() {
            return Ok(false);
        }
        let levels = mesh.lod_usages.len();
        if let Some((i, sub)) = mesh
            .submeshes
            .iter()
            .enumerate()
            .find(|(_, s)| s.lod_index_data.len() != levels)
        {
            return Err(Error::InvalidData(format!(
                "submesh {} of {} has {} LOD levels, expected {}",
                i,
                mesh.name,
                sub.lod_index_data.len(),
                levels
            )));
        }

        let pools = pool_ids(mesh);
        let mut remaps = Vec::with_capacity(pools.len());
        for pool in pools {
            remaps.push((pool, self.build_remap(mesh, pool)?));
        }

        for (pool, remap) in &remaps {
            strip_pool(mesh, *pool, remap)?;
            debug!(
                "{}: {:?} keeps {} of {} vertices",
                mesh.name,
                pool,
                remap.new_vertex_count(),
                remap.old_vertex_count()
            );
        }

        for sub in &mut mesh.submeshes {
            sub.index_data = sub.lod_index_data.remove(0);
            if sub.operation_type.is_triangles() {
                sub.operation_type = OperationType::TriangleList;
            }
        }
        mesh.lod_usages.remove(0);
        self.remaps = remaps;
        Ok(true)
    }

    fn build_remap(&self, mesh: &LodMesh, pool: VertexPoolId) -> Result<VertexRemap> {
        let vertex_count = mesh.vertex_pool(pool).map_or(0, |v| v.len());
        let submeshes: Vec<usize> = submeshes_of(mesh, pool).collect();
        // Level-major, so the promoted level numbers its vertices first.
        let mut indices = Vec::new();
        for level in 0..mesh.lod_usages.len() {
            for &i in &submeshes {
                indices.extend(mesh.submeshes[i].lod_index_data[level].buffer.iter());
            }
        }
        if let Some(bad) = indices.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(Error::InvalidData(format!(
                "index {} past the {} vertices of {:?}",
                bad, vertex_count, pool
            )));
        }
        if self.stable_vertex_order {
            let mut used = vec![false; vertex_count];
            for index in indices {
                used[index as usize] = true;
            }
            Ok(VertexRemap::from_used(&used))
        } else {
            Ok(VertexRemap::from_first_use(vertex_count, indices))
        }
    }
}

/// Vertex pools referenced by at least one submesh.
fn pool_ids(mesh: &LodMesh) -> Vec<VertexPoolId> {
    let mut pools = Vec::new();
    if mesh.shared_vertex_data.is_some() && mesh.submeshes.iter().any(|s| s.use_shared_vertices) {
        pools.push(VertexPoolId::Shared);
    }
    for (i, sub) in mesh.submeshes.iter().enumerate() {
        if !sub.use_shared_vertices && sub.vertex_data.is_some() {
            pools.push(VertexPoolId::SubMesh(i));
        }
    }
    pools
}

fn submeshes_of(mesh: &LodMesh, pool: VertexPoolId) -> impl Iterator<Item = usize> + '_ {
    mesh.submeshes
        .iter()
        .enumerate()
        .filter(move |(i, s)| match pool {
            VertexPoolId::Shared => s.use_shared_vertices,
            VertexPoolId::SubMesh(p) => !s.use_shared_vertices && p == *i,
        })
        .map(|(i, _)| i)
}

fn strip_pool(mesh: &mut LodMesh, pool: VertexPoolId, remap: &VertexRemap) -> Result<()> {
    let gathered = mesh
        .vertex_pool(pool)
        .map(|v| v.gather(remap.old_indices()));
    match pool {
        VertexPoolId::Shared => {
            mesh.shared_vertex_data = gathered;
            remap.remap_bone_assignments(&mut mesh.shared_bone_assignments);
        }
        VertexPoolId::SubMesh(i) => {
            let sub = &mut mesh.submeshes[i];
            sub.vertex_data = gathered;
            remap.remap_bone_assignments(&mut sub.bone_assignments);
        }
    }

    // Levels of one submesh may share a buffer; renumber it once.
    let mut done: Vec<(Arc<IndexBuffer>, Arc<IndexBuffer>)> = Vec::new();
    let targets: Vec<usize> = submeshes_of(mesh, pool).collect();
    for i in targets {
        for level in &mut mesh.submeshes[i].lod_index_data {
            let cached = done
                .iter()
                .find(|(old, _)| Arc::ptr_eq(old, &level.buffer))
                .map(|(_, new)| new.clone());
            let buffer = match cached {
                Some(buffer) => buffer,
                None => {
                    let buffer = Arc::new(remap.remap_index_buffer(&level.buffer)?);
                    done.push((level.buffer.clone(), buffer.clone()));
                    buffer
                }
            };
            *level = IndexData::from_shared(buffer, level.start, level.count);
        }
    }

    for pose in mesh.poses.iter_mut().filter(|p| p.target == pool) {
        pose.offsets = remap.remap_sparse(&pose.offsets);
        pose.normals = remap.remap_sparse(&pose.normals);
    }

    let tracks = mesh
        .animations
        .iter_mut()
        .flat_map(|a| a.vertex_tracks.iter_mut())
        .filter(|t| t.target == pool);
    for track in tracks {
        for keyframe in &mut track.keyframes {
            if let VertexKeyFrame::Morph {
                positions, normals, ..
            } = keyframe
            {
                if positions.len() != remap.old_vertex_count() {
                    return Err(Error::InvalidData(format!(
                        "morph keyframe has {} positions for {} vertices",
                        positions.len(),
                        remap.old_vertex_count()
                    )));
                }
                *positions = remap.gather(positions);
                if let Some(normals) = normals {
                    *normals = remap.gather(normals);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::MeshLodGenerator;
    use crate::test_meshes::*;
    use meshlod_core::{
        Animation, LodConfig, LodLevel, LodStrategy, MeshLodUsage, Point3f, Pose, SubMesh,
        VertexAnimationTrack, VertexData, Vector3f,
    };
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn usage(value: f32) -> MeshLodUsage {
        MeshLodUsage {
            value,
            manual_mesh_name: None,
        }
    }

    fn indices(values: &[u32]) -> IndexData {
        IndexData::new(IndexBuffer::from_indices(IndexWidth::U16, values.iter().copied()))
    }

    fn level_positions(mesh: &LodMesh, level: &IndexData) -> Vec<Point3f> {
        let pool = mesh.submesh_vertex_data(0).expect("pool");
        level.indices().map(|i| pool.positions[i as usize]).collect()
    }

    /// Five vertices in a strip, LOD1 uses only the last three.
    fn make_strip_with_lod() -> LodMesh {
        let positions = (0..5).map(|i| Point3f::new(i as f32, (i % 2) as f32, 0.0)).collect();
        let mut mesh = LodMesh::from_triangles("strip", positions, &[[0, 1, 2], [1, 3, 2], [2, 3, 4]]);
        mesh.submeshes[0].lod_index_data.push(indices(&[2, 3, 4]));
        mesh.lod_usages.push(usage(10.0));
        mesh
    }

    // ---- VertexRemap tests ----

    #[test]
    fn test_remap_is_bijection() {
        let mut rng = StdRng::seed_from_u64(7);
        let used: Vec<bool> = (0..500).map(|_| rng.gen_bool(0.4)).collect();
        let remap = VertexRemap::from_used(&used);
        let count = remap.new_vertex_count();
        assert_eq!(count, used.iter().filter(|u| **u).count());

        let mut hits = vec![0; count];
        for old in 0..used.len() as u32 {
            match remap.get(old) {
                Some(new) => {
                    assert!(used[old as usize]);
                    assert!((new as usize) < count);
                    assert_eq!(remap.old_indices()[new as usize], old);
                    hits[new as usize] += 1;
                }
                None => assert!(!used[old as usize]),
            }
        }
        assert!(hits.iter().all(|h| *h == 1));
    }

    #[test]
    fn test_first_use_order() {
        let remap = VertexRemap::from_first_use(6, [4, 1, 4, 5, 1]);
        assert_eq!(remap.old_indices(), &[4, 1, 5]);
        assert_eq!(remap.get(5), Some(2));
        assert_eq!(remap.get(0), None);
        assert_eq!(remap.get(99), None);
        assert_eq!(remap.old_vertex_count(), 6);
    }

    #[test]
    fn test_remap_index_buffer() {
        let remap = VertexRemap::from_used(&[false, true, true]);
        let buffer = IndexBuffer::from_indices(IndexWidth::U32, [2, 1, 2]);
        let remapped = remap.remap_index_buffer(&buffer).expect("all used");
        assert_eq!(remapped.width(), IndexWidth::U16);
        assert_eq!(remapped.iter().collect::<Vec<_>>(), vec![1, 0, 1]);

        let stale = IndexBuffer::from_indices(IndexWidth::U16, [0]);
        assert!(remap.remap_index_buffer(&stale).is_err());
    }

    // ---- Lod0Stripifier tests ----

    #[test]
    fn test_grid_reduced_to_one_vertex() {
        let mut mesh = make_plane_grid(4);
        let mut config = LodConfig::new(LodStrategy::Distance).with_level(LodLevel::constant(10.0, 15));
        config.advanced.use_compression = false;
        MeshLodGenerator::new()
            .generate_lod_levels(&mut mesh, &config)
            .expect("generation succeeds");

        let mut stripifier = Lod0Stripifier::new();
        assert!(stripifier.strip_lod0_vertices(&mut mesh).expect("strips"));
        let remap = stripifier.remap(VertexPoolId::SubMesh(0)).expect("pool remapped");
        assert_eq!(remap.old_vertex_count(), 16);
        assert_eq!(remap.new_vertex_count(), 1);
        assert_eq!(remap.get(0), Some(0));
        for old in 1..16 {
            assert_eq!(remap.get(old), None);
        }
        assert_eq!(mesh.submesh_vertex_data(0).map(VertexData::len), Some(1));
        assert_eq!(mesh.submeshes[0].index_data.triangles(), vec![[0, 0, 0]]);
        assert!(mesh.lod_usages.is_empty());
        assert!(mesh.submeshes[0].lod_index_data.is_empty());
    }

    #[test]
    fn test_nothing_to_strip() {
        let mut mesh = make_tetrahedron();
        let before = mesh.clone();
        let mut stripifier = Lod0Stripifier::new();
        assert!(!stripifier.strip_lod0_vertices(&mut mesh).expect("no levels"));
        assert_eq!(mesh, before);

        mesh.submeshes[0].lod_index_data.push(indices(&[0, 0, 0]));
        mesh.lod_usages.push(MeshLodUsage {
            value: 10.0,
            manual_mesh_name: Some("far".into()),
        });
        let before = mesh.clone();
        assert!(!stripifier.strip_lod0_vertices(&mut mesh).expect("manual levels"));
        assert_eq!(mesh, before);
        assert!(stripifier.remap(VertexPoolId::SubMesh(0)).is_none());
    }

    #[test]
    fn test_level_count_mismatch_rejected() {
        let mut mesh = make_tetrahedron();
        mesh.lod_usages.push(usage(10.0));
        assert!(matches!(
            Lod0Stripifier::new().strip_lod0_vertices(&mut mesh),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn test_skinning_and_animation_follow_remap() {
        let mut mesh = make_strip_with_lod();
        let assign = |vertex_index| VertexBoneAssignment {
            vertex_index,
            bone_index: 1,
            weight: 1.0,
        };
        mesh.submeshes[0].bone_assignments = vec![assign(0), assign(3), assign(4)];
        mesh.poses.push(Pose {
            name: "smile".into(),
            target: VertexPoolId::SubMesh(0),
            offsets: [(1, Vector3f::x()), (4, Vector3f::y())].into_iter().collect(),
            normals: [(4, Vector3f::z())].into_iter().collect(),
        });
        let morph: Vec<Point3f> = (0..5).map(|i| Point3f::new(0.0, 0.0, i as f32)).collect();
        mesh.animations.push(Animation {
            name: "wave".into(),
            length: 1.0,
            vertex_tracks: vec![VertexAnimationTrack {
                target: VertexPoolId::SubMesh(0),
                keyframes: vec![VertexKeyFrame::Morph {
                    time: 0.0,
                    positions: morph,
                    normals: Some(vec![Vector3f::z(); 5]),
                }],
            }],
        });

        assert!(Lod0Stripifier::new().strip_lod0_vertices(&mut mesh).expect("strips"));
        let sub = &mesh.submeshes[0];
        assert_eq!(sub.index_data.triangles(), vec![[0, 1, 2]]);
        let bones: Vec<u32> = sub.bone_assignments.iter().map(|a| a.vertex_index).collect();
        assert_eq!(bones, vec![1, 2]);

        let pose = &mesh.poses[0];
        assert_eq!(pose.offsets.keys().copied().collect::<Vec<_>>(), vec![2]);
        assert_eq!(pose.offsets[&2], Vector3f::y());
        assert_eq!(pose.normals.keys().copied().collect::<Vec<_>>(), vec![2]);

        match &mesh.animations[0].vertex_tracks[0].keyframes[0] {
            VertexKeyFrame::Morph {
                positions, normals, ..
            } => {
                let z: Vec<f32> = positions.iter().map(|p| p.z).collect();
                assert_eq!(z, vec![2.0, 3.0, 4.0]);
                assert_eq!(normals.as_ref().map(Vec::len), Some(3));
            }
            other => panic!("unexpected keyframe {:?}", other),
        }
    }

    #[test]
    fn test_first_use_renumbering() {
        let mut mesh = make_strip_with_lod();
        mesh.submeshes[0].lod_index_data[0] = indices(&[4, 2, 3]);
        let mut stripifier = Lod0Stripifier::new().with_stable_vertex_order(false);
        assert!(stripifier.strip_lod0_vertices(&mut mesh).expect("strips"));
        assert_eq!(mesh.submeshes[0].index_data.triangles(), vec![[0, 1, 2]]);
        let x: Vec<f32> = mesh
            .submesh_vertex_data(0)
            .expect("pool")
            .positions
            .iter()
            .map(|p| p.x)
            .collect();
        assert_eq!(x, vec![4.0, 2.0, 3.0]);
    }

    #[test]
    fn test_shared_pool_uses_every_submesh() {
        let positions = (0..6).map(|i| Point3f::new(i as f32, 0.0, (i % 3) as f32)).collect();
        let mut mesh = LodMesh::new("shared").with_shared_vertices(VertexData::new(positions));
        let mut a = SubMesh::shared("a", indices(&[0, 1, 2]));
        a.lod_index_data.push(indices(&[1, 1, 1]));
        let mut b = SubMesh::shared("b", indices(&[3, 4, 5]));
        b.lod_index_data.push(indices(&[3, 4, 5]));
        mesh.add_submesh(a);
        mesh.add_submesh(b);
        mesh.lod_usages.push(usage(5.0));
        mesh.shared_bone_assignments = vec![VertexBoneAssignment {
            vertex_index: 5,
            bone_index: 0,
            weight: 0.5,
        }];

        let mut stripifier = Lod0Stripifier::new();
        assert!(stripifier.strip_lod0_vertices(&mut mesh).expect("strips"));
        let remap = stripifier.remap(VertexPoolId::Shared).expect("shared remapped");
        assert_eq!(remap.old_indices(), &[1, 3, 4, 5]);
        assert_eq!(mesh.shared_vertex_data.as_ref().map(VertexData::len), Some(4));
        assert_eq!(mesh.submeshes[0].index_data.triangles(), vec![[0, 0, 0]]);
        assert_eq!(mesh.submeshes[1].index_data.triangles(), vec![[1, 2, 3]]);
        assert_eq!(mesh.shared_bone_assignments[0].vertex_index, 3);
    }

    #[test]
    fn test_compressed_levels_keep_geometry() {
        let mut mesh = make_curved_surface(6);
        let config = LodConfig::new(LodStrategy::Distance)
            .with_level(LodLevel::proportional(10.0, 0.3))
            .with_level(LodLevel::proportional(20.0, 0.6));
        MeshLodGenerator::new()
            .generate_lod_levels(&mut mesh, &config)
            .expect("generation succeeds");
        let before: Vec<Vec<Point3f>> = mesh.submeshes[0]
            .lod_index_data
            .iter()
            .map(|l| level_positions(&mesh, l))
            .collect();
        let old_count = mesh.submesh_vertex_data(0).map_or(0, VertexData::len);

        assert!(Lod0Stripifier::new().strip_lod0_vertices(&mut mesh).expect("strips"));
        let sub = &mesh.submeshes[0];
        assert_eq!(mesh.lod_usages.len(), 1);
        assert!(sub.index_data.shares_buffer_with(&sub.lod_index_data[0]));
        assert_eq!(level_positions(&mesh, &sub.index_data), before[0]);
        assert_eq!(level_positions(&mesh, &sub.lod_index_data[0]), before[1]);

        let new_count = mesh.submesh_vertex_data(0).map_or(0, VertexData::len);
        assert!(new_count < old_count);
        assert!(sub.index_data.buffer.iter().all(|i| (i as usize) < new_count));
    }
}
