//! Collapse cost strategies
//!
//! A [`LodCollapseCost`] prices the collapse of a vertex along each of its
//! outgoing edges and keeps the cost heap in sync. Base estimators
//! ([`CurvatureCost`], [`QuadricErrorCost`]) can be wrapped by decorators
//! ([`OutsideWeightedCost`], [`ProfiledCost`]).

use crate::data::{
    Edge, LodData, UniqueVertexSet, VertexId, NEVER_COLLAPSE_COST, UNINITIALIZED_COLLAPSE_COST,
};
use crate::outside::OutsideMarker;
use log::{debug, warn};
use meshlod_core::{normalize_or_zero, CostEstimator, LodConfigAdvanced, ProfiledEdge};
use nalgebra::{Matrix4, Vector4};
use rayon::prelude::*;
use smallvec::SmallVec;
use std::collections::HashMap;

/// Best collapse of one vertex, with the cost of every outgoing edge.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexCollapseCost {
    /// In the order of the vertex's edge list.
    pub edge_costs: SmallVec<[f32; 8]>,
    pub cost: f32,
    pub collapse_to: Option<VertexId>,
}

pub trait LodCollapseCost: Send + Sync {
    /// Per-run setup before the first cost is computed.
    fn prepare(&mut self, _data: &mut LodData) {}

    /// Compute every vertex's initial cost and seed the heap.
    fn init_collapse_costs(&mut self, data: &mut LodData) {
        self.prepare(data);
        seed_collapse_costs(&*self, data);
    }

    /// Cost of collapsing `src` into `edge.dst`. Never negative.
    fn compute_edge_collapse_cost(&self, data: &LodData, src: VertexId, edge: &Edge) -> f32;

    /// Cheapest edge of `v`. The first edge wins exact ties.
    fn compute_vertex_collapse_cost(&self, data: &LodData, v: VertexId) -> VertexCollapseCost {
        let pinned = data.is_pinned(v);
        let mut best = VertexCollapseCost {
            edge_costs: SmallVec::with_capacity(data[v].edges.len()),
            cost: UNINITIALIZED_COLLAPSE_COST,
            collapse_to: None,
        };
        for edge in &data[v].edges {
            let cost = if pinned {
                NEVER_COLLAPSE_COST
            } else {
                self.compute_edge_collapse_cost(data, v, edge)
            };
            debug_assert!(cost >= 0.0, "negative collapse cost {} for {:?}", cost, v);
            best.edge_costs.push(cost);
            if cost < best.cost {
                best.cost = cost;
                best.collapse_to = Some(edge.dst);
            }
        }
        best
    }

    /// Recompute the cost of `v` after its neighborhood changed.
    fn update_vertex_collapse_cost(&self, data: &mut LodData, v: VertexId) {
        let result = self.compute_vertex_collapse_cost(data, v);
        apply_vertex_collapse_cost(data, v, result);
    }

    /// Called right before `src` is collapsed into `dst`.
    fn on_collapse(&mut self, _data: &LodData, _src: VertexId, _dst: VertexId) {}
}

impl<C: LodCollapseCost + ?Sized> LodCollapseCost for Box<C> {
    fn prepare(&mut self, data: &mut LodData) {
        (**self).prepare(data)
    }

    fn init_collapse_costs(&mut self, data: &mut LodData) {
        (**self).init_collapse_costs(data)
    }

    fn compute_edge_collapse_cost(&self, data: &LodData, src: VertexId, edge: &Edge) -> f32 {
        (**self).compute_edge_collapse_cost(data, src, edge)
    }

    fn compute_vertex_collapse_cost(&self, data: &LodData, v: VertexId) -> VertexCollapseCost {
        (**self).compute_vertex_collapse_cost(data, v)
    }

    fn update_vertex_collapse_cost(&self, data: &mut LodData, v: VertexId) {
        (**self).update_vertex_collapse_cost(data, v)
    }

    fn on_collapse(&mut self, data: &LodData, src: VertexId, dst: VertexId) {
        (**self).on_collapse(data, src, dst)
    }
}

/// Compute all vertex costs in parallel, then fill the heap in vertex order.
pub fn seed_collapse_costs<C: LodCollapseCost + ?Sized>(cost: &C, data: &mut LodData) {
    let results: Vec<VertexCollapseCost> = {
        let view = &*data;
        (0..view.vertices.len())
            .into_par_iter()
            .map(|i| cost.compute_vertex_collapse_cost(view, VertexId(i)))
            .collect()
    };
    for (i, result) in results.into_iter().enumerate() {
        apply_vertex_collapse_cost(data, VertexId(i), result);
    }
    debug!(
        "{}: seeded {} collapse costs",
        data.mesh_name,
        data.cost_heap.len()
    );
}

/// Store edge costs and move the heap entry of `v` if its best collapse changed.
pub fn apply_vertex_collapse_cost(data: &mut LodData, v: VertexId, result: VertexCollapseCost) {
    let vertex = &mut data[v];
    debug_assert_eq!(vertex.edges.len(), result.edge_costs.len());
    for (edge, &cost) in vertex.edges.iter_mut().zip(&result.edge_costs) {
        edge.collapse_cost = cost;
    }
    let old_target = vertex.collapse_to;
    vertex.collapse_to = result.collapse_to;
    let old_cost = data
        .cost_heap
        .cost_of(v)
        .unwrap_or(UNINITIALIZED_COLLAPSE_COST);
    if old_target != result.collapse_to || old_cost != result.cost {
        data.cost_heap.remove(v);
        if result.cost != UNINITIALIZED_COLLAPSE_COST {
            data.cost_heap.push(v, result.cost);
        }
    }
}

/// Collapsing `src` into `dst` would turn a surviving triangle over.
pub fn flips_triangle(data: &LodData, src: VertexId, dst: VertexId) -> bool {
    let dst_position = data[dst].position;
    data[src]
        .triangles
        .iter()
        .map(|&t| &data[t])
        .filter(|tri| !tri.has_vertex(dst))
        .any(|tri| {
            let p = tri.vertices.map(|v| {
                if v == src {
                    dst_position
                } else {
                    data[v].position
                }
            });
            let e1 = p[1] - p[0];
            let e2 = p[2] - p[1];
            e1.cross(&e2).dot(&tri.normal) < 0.0
        })
}

/// Base strategy built from the configured estimator and decorators.
pub fn cost_from_config(advanced: &LodConfigAdvanced) -> Box<dyn LodCollapseCost> {
    let mut cost: Box<dyn LodCollapseCost> = match advanced.cost_estimator {
        CostEstimator::Curvature => Box::new(CurvatureCost::new()),
        CostEstimator::Quadric => Box::new(QuadricErrorCost::new()),
    };
    if advanced.outside_weight != 0.0 {
        cost = Box::new(OutsideWeightedCost::new(
            cost,
            advanced.outside_weight,
            advanced.outside_walk_angle,
        ));
    }
    if !advanced.profile.is_empty() {
        cost = Box::new(ProfiledCost::new(cost, advanced.profile.clone()));
    }
    cost
}

/// Curvature and edge length heuristic.
///
/// Interior vertices cost more the more the surface bends around them.
/// Border vertices prefer to slide along a straight border. Seam vertices
/// are penalized so texture seams survive longer.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurvatureCost;

impl CurvatureCost {
    pub fn new() -> Self {
        Self
    }

    fn border_cost(data: &LodData, src: VertexId, edge: &Edge) -> f32 {
        if edge.ref_count > 1 {
            return 1.0;
        }
        let src_position = data[src].position;
        let collapse_dir = normalize_or_zero(src_position - data[edge.dst].position);
        let mut kink = -1.0f32;
        for other in &data[src].edges {
            if other.dst != edge.dst && other.ref_count == 1 {
                let border_dir = normalize_or_zero(src_position - data[other.dst].position);
                // Opposite border edges (dot -1) keep the border straight
                kink = kink.max(border_dir.dot(&collapse_dir));
            }
        }
        (1.002 + kink) * 0.5
    }

    fn interior_cost(data: &LodData, src: VertexId, dst: VertexId) -> f32 {
        let triangles = &data[src].triangles;
        let mut curvature = 1.0f32;
        for &t in triangles {
            let normal = data[t].normal;
            let mut agreement = -1.0f32;
            for &t2 in triangles {
                if data[t2].has_vertex(dst) {
                    agreement = agreement.max(normal.dot(&data[t2].normal));
                }
            }
            curvature = curvature.min(agreement);
        }
        (1.002 - curvature) * 0.5
    }
}

impl LodCollapseCost for CurvatureCost {
    fn compute_edge_collapse_cost(&self, data: &LodData, src: VertexId, edge: &Edge) -> f32 {
        let dst = edge.dst;
        if flips_triangle(data, src, dst) {
            return NEVER_COLLAPSE_COST;
        }

        let mut cost = if data.is_border_vertex(src) {
            Self::border_cost(data, src, edge)
        } else {
            Self::interior_cost(data, src, dst)
        };

        let (s, d) = (&data[src], &data[dst]);
        if s.seam {
            cost = if d.seam {
                cost.max(0.005) * 8.0
            } else {
                cost.max(0.05) * 64.0
            };
        }

        let diff = s.normal.dot(&d.normal) / 8.0;
        let dist = (s.position - d.position).norm();
        cost *= dist;

        if data.use_vertex_normals {
            let mut normal_cost = 0.0f32;
            for neighbor in s.edges.iter().map(|e| &data[e.dst]) {
                let before_dist = (neighbor.position - s.position).norm();
                let after_dist = (neighbor.position - d.position).norm();
                let before_dot = neighbor.normal.dot(&s.normal);
                let after_dot = neighbor.normal.dot(&d.normal);
                normal_cost = normal_cost.max(
                    diff.max((before_dot - after_dot).abs())
                        * (after_dist / 8.0).max(dist.max((before_dist - after_dist).abs())),
                );
            }
            cost = cost.max(normal_cost * 0.25);
        }
        cost
    }
}

/// Quadric error metric (Garland-Heckbert) evaluated at the collapse target.
///
/// Each vertex accumulates the plane quadrics of its triangles. A collapse
/// costs `v^T (Q_src + Q_dst) v` with `v` the destination position, and the
/// destination inherits the source quadric afterwards.
#[derive(Debug, Clone)]
pub struct QuadricErrorCost {
    /// Extra cost added when the source lies on a border or seam
    pub boundary_weight: f64,
    quadrics: Vec<Matrix4<f64>>,
}

impl Default for QuadricErrorCost {
    fn default() -> Self {
        Self {
            boundary_weight: 100.0,
            quadrics: Vec::new(),
        }
    }
}

impl QuadricErrorCost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(boundary_weight: f64) -> Self {
        Self {
            boundary_weight,
            ..Self::default()
        }
    }

    fn plane_to_quadric(p: &Vector4<f64>) -> Matrix4<f64> {
        let (a, b, c, d) = (p[0], p[1], p[2], p[3]);
        Matrix4::new(
            a * a, a * b, a * c, a * d,
            a * b, b * b, b * c, b * d,
            a * c, b * c, c * c, c * d,
            a * d, b * d, c * d, d * d,
        )
    }

    pub fn quadric(&self, v: VertexId) -> Option<&Matrix4<f64>> {
        self.quadrics.get(v.0)
    }
}

impl LodCollapseCost for QuadricErrorCost {
    fn prepare(&mut self, data: &mut LodData) {
        self.quadrics = vec![Matrix4::zeros(); data.vertices.len()];
        for tri in data.triangles.iter().filter(|t| !t.is_removed) {
            let n = tri.normal;
            if n == nalgebra::Vector3::zeros() {
                continue;
            }
            let p0 = data[tri.vertices[0]].position;
            let d = -n.dot(&p0.coords);
            let plane = Vector4::new(n.x as f64, n.y as f64, n.z as f64, d as f64);
            let q = Self::plane_to_quadric(&plane);
            for v in tri.vertices {
                self.quadrics[v.0] += q;
            }
        }
    }

    fn compute_edge_collapse_cost(&self, data: &LodData, src: VertexId, edge: &Edge) -> f32 {
        let dst = edge.dst;
        if flips_triangle(data, src, dst) {
            return NEVER_COLLAPSE_COST;
        }
        let q = self.quadrics[src.0] + self.quadrics[dst.0];
        let p = data[dst].position;
        let vh = Vector4::new(p.x as f64, p.y as f64, p.z as f64, 1.0);
        let mut cost = (vh.transpose() * q * vh)[0].max(0.0);
        if data[src].seam || data.is_border_vertex(src) {
            cost += self.boundary_weight;
        }
        (cost as f32).min(NEVER_COLLAPSE_COST)
    }

    fn on_collapse(&mut self, _data: &LodData, src: VertexId, dst: VertexId) {
        let q = self.quadrics[src.0];
        self.quadrics[dst.0] += q;
    }
}

/// Scales the cost of edges touching the outside skin of the mesh.
///
/// Outside vertices are found with an [`OutsideMarker`] during preparation.
/// A weight of 1 never collapses them. Other weights multiply the wrapped
/// cost by `max(1/128, weight * 8)`.
pub struct OutsideWeightedCost<C> {
    inner: C,
    outside_weight: f32,
    walk_angle: f32,
}

impl<C: LodCollapseCost> OutsideWeightedCost<C> {
    pub fn new(inner: C, outside_weight: f32, walk_angle: f32) -> Self {
        Self {
            inner,
            outside_weight,
            walk_angle,
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: LodCollapseCost> LodCollapseCost for OutsideWeightedCost<C> {
    fn prepare(&mut self, data: &mut LodData) {
        self.inner.prepare(data);
        if self.outside_weight != 0.0 {
            let mut marker = OutsideMarker::new(data.mesh_bounding_sphere_radius, self.walk_angle);
            marker.mark_outside(data);
        }
    }

    fn compute_edge_collapse_cost(&self, data: &LodData, src: VertexId, edge: &Edge) -> f32 {
        let cost = self.inner.compute_edge_collapse_cost(data, src, edge);
        if self.outside_weight == 0.0
            || cost == NEVER_COLLAPSE_COST
            || !(data[src].is_outside || data[edge.dst].is_outside)
        {
            return cost;
        }
        if self.outside_weight == 1.0 {
            return NEVER_COLLAPSE_COST;
        }
        (cost * (self.outside_weight * 8.0).max(1.0 / 128.0)).min(NEVER_COLLAPSE_COST)
    }

    fn on_collapse(&mut self, data: &LodData, src: VertexId, dst: VertexId) {
        self.inner.on_collapse(data, src, dst);
    }
}

/// Forces the cost of hand-picked edges, identified by endpoint positions.
pub struct ProfiledCost<C> {
    inner: C,
    profile: Vec<ProfiledEdge>,
    resolved: HashMap<(VertexId, VertexId), f32>,
}

impl<C: LodCollapseCost> ProfiledCost<C> {
    pub fn new(inner: C, profile: Vec<ProfiledEdge>) -> Self {
        Self {
            inner,
            profile,
            resolved: HashMap::new(),
        }
    }

    pub fn profile(&self) -> &[ProfiledEdge] {
        &self.profile
    }
}

impl<C: LodCollapseCost> LodCollapseCost for ProfiledCost<C> {
    fn prepare(&mut self, data: &mut LodData) {
        self.inner.prepare(data);
        let mut lookup = UniqueVertexSet::with_capacity(data.vertices.len());
        for v in data.vertex_ids() {
            lookup.insert(&data[v].position, v);
        }
        self.resolved.clear();
        for entry in &self.profile {
            match (lookup.get(&entry.src), lookup.get(&entry.dst)) {
                (Some(src), Some(dst)) => {
                    data[src].has_profile = true;
                    self.resolved.insert((src, dst), entry.cost);
                }
                _ => warn!(
                    "{}: profiled edge {:?} -> {:?} does not match any vertex",
                    data.mesh_name, entry.src, entry.dst
                ),
            }
        }
    }

    fn compute_edge_collapse_cost(&self, data: &LodData, src: VertexId, edge: &Edge) -> f32 {
        if data[src].has_profile {
            if let Some(&cost) = self.resolved.get(&(src, edge.dst)) {
                return cost;
            }
        }
        self.inner.compute_edge_collapse_cost(data, src, edge)
    }

    fn on_collapse(&mut self, data: &LodData, src: VertexId, dst: VertexId) {
        self.inner.on_collapse(data, src, dst);
    }
}
