//! Greedy edge collapse
//!
//! [`LodCollapser`] repeatedly pops the cheapest vertex from the cost heap and
//! folds it into its collapse target until a vertex floor or a cost ceiling
//! is reached. Triangles that degenerate are removed, the rest are rewired
//! onto the target, and every vertex within two edges of the collapse gets
//! its cost recomputed.

use crate::cost::LodCollapseCost;
use crate::data::{LodData, TriangleId, VertexId, NEVER_COLLAPSE_COST};
use crate::output::LodOutputProvider;
use log::trace;
use meshlod_core::Point3f;
use smallvec::SmallVec;

/// Original index pair consumed by the last collapse, per submesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollapsedEdge {
    pub src_id: u32,
    pub dst_id: u32,
    pub submesh_id: usize,
}

/// Outcome of one [`LodCollapser::collapse_cheapest_vertices`] call.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CollapseRun {
    pub collapses: usize,
    /// Cost of the last performed collapse.
    pub last_cost: Option<f32>,
}

#[derive(Debug, Default)]
pub struct LodCollapser {
    last_reduced_vertex: Option<VertexId>,
    last_collapse_target: Option<VertexId>,
    tmp_collapsed_edges: Vec<CollapsedEdge>,
}

impl LodCollapser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collapse vertices until at most `vertex_count_limit` are live or the
    /// cheapest collapse costs `collapse_cost_limit` or more.
    pub fn collapse_cheapest_vertices<C, O>(
        &mut self,
        data: &mut LodData,
        cost: &mut C,
        output: &mut O,
        vertex_count_limit: usize,
        collapse_cost_limit: f32,
    ) -> CollapseRun
    where
        C: LodCollapseCost + ?Sized,
        O: LodOutputProvider + ?Sized,
    {
        let mut run = CollapseRun::default();
        while data.live_vertex_count > vertex_count_limit {
            let (src, src_cost) = match data.cost_heap.peek() {
                Some(entry) => entry,
                None => break,
            };
            // Pinned vertices sit at the sentinel whatever the limit
            if !(src_cost < collapse_cost_limit) || src_cost >= NEVER_COLLAPSE_COST {
                break;
            }
            let dst = match Self::valid_target(data, src) {
                Some(dst) => dst,
                None => {
                    // Outdated entry: reprice it and look again
                    if data[src].is_removed {
                        data.cost_heap.remove(src);
                    } else {
                        cost.update_vertex_collapse_cost(data, src);
                        if Self::valid_target(data, src).is_none() {
                            data.cost_heap.remove(src);
                        }
                    }
                    continue;
                }
            };
            cost.on_collapse(data, src, dst);
            self.collapse(data, &*cost, output, src);
            run.collapses += 1;
            run.last_cost = Some(src_cost);
        }
        run
    }

    fn valid_target(data: &LodData, src: VertexId) -> Option<VertexId> {
        let dst = data[src].collapse_to?;
        let valid =
            !data[src].is_removed && !data[dst].is_removed && data[src].edge(dst).is_some();
        valid.then_some(dst)
    }

    /// Fold `src` into its collapse target.
    ///
    /// Panics if `src` has no valid target; the heap never hands out such a
    /// vertex while the topology is consistent.
    pub fn collapse<C, O>(&mut self, data: &mut LodData, cost: &C, output: &mut O, src: VertexId)
    where
        C: LodCollapseCost + ?Sized,
        O: LodOutputProvider + ?Sized,
    {
        let dst = match data[src].collapse_to {
            Some(dst) => dst,
            None => panic!("{:?} of {} has no collapse target", src, data.mesh_name),
        };
        assert!(
            !data[src].is_removed && !data[dst].is_removed,
            "collapse of {:?} into {:?} touches a removed vertex",
            src,
            dst
        );
        debug_assert!(data[src].edge(dst).is_some());

        self.tmp_collapsed_edges.clear();
        let src_triangles = data[src].triangles.clone();

        // Triangles on the collapsed edge vanish
        for &tri in &src_triangles {
            if !data[tri].has_vertex(dst) {
                continue;
            }
            let (src_id, dst_id, submesh_id) = {
                let t = &data[tri];
                match (t.vertex_id_of(src), t.vertex_id_of(dst)) {
                    (Some(s), Some(d)) => (s, d, t.submesh_id),
                    _ => unreachable!(),
                }
            };
            if !self.has_src_id(src_id, submesh_id) {
                self.tmp_collapsed_edges.push(CollapsedEdge {
                    src_id,
                    dst_id,
                    submesh_id,
                });
            }
            Self::remove_triangle(data, output, tri, src);
        }

        // The others are moved onto dst
        for &tri in &src_triangles {
            if data[tri].is_removed {
                continue;
            }
            let submesh_id = data[tri].submesh_id;
            let src_id = match data[tri].vertex_id_of(src) {
                Some(id) => id,
                None => panic!("{:?} lists {:?} without using it", src, tri),
            };
            match self.find_dst_id(src_id, submesh_id) {
                Some(dst_id) => {
                    data.replace_vertex(tri, src, dst, dst_id);
                    data.compute_triangle_normal(tri);
                    output.triangle_changed(data, tri);
                }
                // No compatible index in this submesh, the triangle has to go
                None => Self::remove_triangle(data, output, tri, src),
            }
        }

        let src_seam = data[src].seam;
        data[dst].seam |= src_seam;

        let adjacent: SmallVec<[VertexId; 8]> = data[src].edges.iter().map(|e| e.dst).collect();
        let mut neighbors: SmallVec<[VertexId; 64]> = SmallVec::new();
        for &n in &adjacent {
            neighbors.push(n);
            neighbors.extend(data[n].edges.iter().map(|e| e.dst));
        }
        neighbors.sort_unstable();
        neighbors.dedup();

        // Neighbors left without triangles go with src. dst only stays when
        // the mesh has no triangle left at all.
        let keep_dst = data
            .index_buffer_infos
            .iter()
            .filter(|info| info.passthrough.is_none())
            .all(|info| info.index_count == 0);
        let mut retired = 0;
        for &n in &adjacent {
            if (n != dst || !keep_dst) && !data[n].is_removed && data[n].triangles.is_empty() {
                debug_assert!(data[n].edges.is_empty());
                data[n].is_removed = true;
                data[n].collapse_to = None;
                retired += 1;
            }
        }
        if retired > 0 {
            for &n in &neighbors {
                if data[n].is_removed {
                    data.cost_heap.remove(n);
                }
            }
        }

        data.cost_heap.remove(src);
        let vertex = &mut data[src];
        vertex.is_removed = true;
        vertex.collapse_to = None;
        vertex.edges.clear();
        vertex.triangles.clear();
        data.live_vertex_count -= 1 + retired;

        for &n in &neighbors {
            if n != src && !data[n].is_removed {
                cost.update_vertex_collapse_cost(data, n);
            }
        }

        trace!(
            "{}: collapsed {:?} into {:?}, {} vertices left",
            data.mesh_name,
            src,
            dst,
            data.live_vertex_count
        );
        self.last_reduced_vertex = Some(src);
        self.last_collapse_target = Some(dst);
    }

    fn remove_triangle<O>(data: &mut LodData, output: &mut O, tri: TriangleId, src: VertexId)
    where
        O: LodOutputProvider + ?Sized,
    {
        let submesh_id = data[tri].submesh_id;
        data[tri].is_removed = true;
        data.index_buffer_infos[submesh_id].index_count -= 3;
        data.remove_triangle_from_edges(tri, Some(src));
        output.triangle_removed(data, tri);
    }

    fn has_src_id(&self, src_id: u32, submesh_id: usize) -> bool {
        self.tmp_collapsed_edges
            .iter()
            .any(|e| e.src_id == src_id && e.submesh_id == submesh_id)
    }

    /// Index replacing `src_id`: the exact match if one was collapsed, else
    /// any collapsed index of the same submesh.
    fn find_dst_id(&self, src_id: u32, submesh_id: usize) -> Option<u32> {
        self.tmp_collapsed_edges
            .iter()
            .find(|e| e.src_id == src_id && e.submesh_id == submesh_id)
            .or_else(|| {
                self.tmp_collapsed_edges
                    .iter()
                    .find(|e| e.submesh_id == submesh_id)
            })
            .map(|e| e.dst_id)
    }

    pub fn last_reduced_vertex(&self) -> Option<VertexId> {
        self.last_reduced_vertex
    }

    pub fn last_reduced_vertex_position(&self, data: &LodData) -> Option<Point3f> {
        self.last_reduced_vertex.map(|v| data[v].position)
    }

    pub fn last_collapse_target_position(&self, data: &LodData) -> Option<Point3f> {
        self.last_collapse_target.map(|v| data[v].position)
    }

    /// Index pairs merged by the last collapse.
    pub fn last_collapsed_edges(&self) -> &[CollapsedEdge] {
        &self.tmp_collapsed_edges
    }
}
