//! LOD generation settings
//!
//! A [`LodConfig`] is a plain record: the strategy the renderer uses to pick
//! a level, one [`LodLevel`] per generated level and the global
//! [`LodConfigAdvanced`] options.

use crate::{error::*, mesh::LodMesh, point::Point3f};
use serde::{Deserialize, Serialize};

/// How the renderer interprets `LodLevel::distance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LodStrategy {
    /// Camera distance, levels sorted ascending.
    Distance,
    /// Screen coverage in pixels, levels sorted descending.
    PixelCount,
}

impl LodStrategy {
    pub fn is_sorted(self, values: &[f32]) -> bool {
        values.windows(2).all(|w| match self {
            LodStrategy::Distance => w[0] < w[1],
            LodStrategy::PixelCount => w[0] > w[1],
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReductionMethod {
    /// Remove `value` (0..=1) of the unique vertices.
    Proportional,
    /// Remove exactly `value` vertices.
    Constant,
    /// Collapse until the cheapest collapse costs `value` or more.
    CollapseCost,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LodLevel {
    pub distance: f32,
    pub reduction_method: ReductionMethod,
    pub reduction_value: f32,
    /// Optional cost ceiling on top of a vertex-count target.
    pub max_collapse_cost: Option<f32>,
    /// Use another mesh for this level instead of generating one.
    pub manual_mesh_name: Option<String>,
}

impl LodLevel {
    pub fn proportional(distance: f32, reduction: f32) -> Self {
        Self::with_method(distance, ReductionMethod::Proportional, reduction)
    }

    pub fn constant(distance: f32, vertex_reduction: usize) -> Self {
        Self::with_method(distance, ReductionMethod::Constant, vertex_reduction as f32)
    }

    pub fn collapse_cost(distance: f32, cost_limit: f32) -> Self {
        Self::with_method(distance, ReductionMethod::CollapseCost, cost_limit)
    }

    pub fn manual(distance: f32, mesh_name: impl Into<String>) -> Self {
        Self {
            manual_mesh_name: Some(mesh_name.into()),
            ..Self::with_method(distance, ReductionMethod::Constant, 0.0)
        }
    }

    pub fn with_max_collapse_cost(mut self, cost: f32) -> Self {
        self.max_collapse_cost = Some(cost);
        self
    }

    pub fn is_manual(&self) -> bool {
        self.manual_mesh_name.is_some()
    }

    fn with_method(distance: f32, reduction_method: ReductionMethod, reduction_value: f32) -> Self {
        Self {
            distance,
            reduction_method,
            reduction_value,
            max_collapse_cost: None,
            manual_mesh_name: None,
        }
    }
}

/// Base collapse cost estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CostEstimator {
    #[default]
    Curvature,
    Quadric,
}

/// Forced cost for the edge between two vertex positions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfiledEdge {
    pub src: Point3f,
    pub dst: Point3f,
    pub cost: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LodConfigAdvanced {
    /// Share one index buffer between consecutive levels.
    pub use_compression: bool,
    /// Take vertex normals into account, when the mesh has them.
    pub use_vertex_normals: bool,
    /// 0 disables outside marking, 1 never collapses outside vertices.
    pub outside_weight: f32,
    /// Dot product threshold of the outside walk, in `[-1, 1]`.
    pub outside_walk_angle: f32,
    pub prevent_punching_holes: bool,
    pub prevent_breaking_lines: bool,
    pub cost_estimator: CostEstimator,
    pub profile: Vec<ProfiledEdge>,
}

impl Default for LodConfigAdvanced {
    fn default() -> Self {
        Self {
            use_compression: true,
            use_vertex_normals: true,
            outside_weight: 0.0,
            outside_walk_angle: 0.0,
            prevent_punching_holes: false,
            prevent_breaking_lines: false,
            cost_estimator: CostEstimator::default(),
            profile: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LodConfig {
    pub strategy: LodStrategy,
    pub levels: Vec<LodLevel>,
    pub advanced: LodConfigAdvanced,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self::new(LodStrategy::Distance)
    }
}

impl LodConfig {
    pub fn new(strategy: LodStrategy) -> Self {
        Self {
            strategy,
            levels: Vec::new(),
            advanced: LodConfigAdvanced::default(),
        }
    }

    pub fn with_level(mut self, level: LodLevel) -> Self {
        self.levels.push(level);
        self
    }

    pub fn with_advanced(mut self, advanced: LodConfigAdvanced) -> Self {
        self.advanced = advanced;
        self
    }

    /// Default level set scaled to the mesh size.
    ///
    /// Four collapse-cost levels with pixel count distances falling off with
    /// the fourth power and cost limits growing with the fifth power.
    pub fn auto(mesh: &LodMesh) -> Self {
        let radius = mesh.bounding_sphere_radius;
        let mut config = Self::new(LodStrategy::PixelCount);
        for i in 2..6 {
            let i4 = (i * i * i * i) as f32;
            let i5 = i4 * i as f32;
            config
                .levels
                .push(LodLevel::collapse_cost(3_388_608.0 / i4, radius / 100_000.0 * i5));
        }
        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.levels.len() > u16::MAX as usize {
            return Err(Error::InvalidConfig(format!(
                "{} LOD levels requested, at most {} supported",
                self.levels.len(),
                u16::MAX
            )));
        }
        let distances: Vec<f32> = self.levels.iter().map(|l| l.distance).collect();
        if !self.strategy.is_sorted(&distances) {
            return Err(Error::InvalidConfig(format!(
                "LOD distances {:?} are not sorted for {:?}",
                distances, self.strategy
            )));
        }
        for (i, level) in self.levels.iter().enumerate() {
            let value = level.reduction_value;
            let valid = match level.reduction_method {
                ReductionMethod::Proportional => (0.0..=1.0).contains(&value),
                ReductionMethod::Constant | ReductionMethod::CollapseCost => {
                    value.is_finite() && value >= 0.0
                }
            };
            if !valid {
                return Err(Error::InvalidConfig(format!(
                    "LOD level {} has invalid {:?} reduction value {}",
                    i, level.reduction_method, value
                )));
            }
            if let Some(max) = level.max_collapse_cost.filter(|m| !(m.is_finite() && *m >= 0.0)) {
                return Err(Error::InvalidConfig(format!(
                    "LOD level {} has invalid max collapse cost {}",
                    i, max
                )));
            }
        }
        let walk = self.advanced.outside_walk_angle;
        if !(-1.0001..=1.0001).contains(&walk) {
            return Err(Error::InvalidConfig(format!(
                "outside walk angle {} is not a dot product",
                walk
            )));
        }
        if !(0.0..=1.0).contains(&self.advanced.outside_weight) {
            return Err(Error::InvalidConfig(format!(
                "outside weight {} is outside [0, 1]",
                self.advanced.outside_weight
            )));
        }
        if let Some(edge) = self.advanced.profile.iter().find(|e| !(e.cost >= 0.0)) {
            return Err(Error::InvalidConfig(format!(
                "profiled edge {:?} -> {:?} has negative cost {}",
                edge.src, edge.dst, edge.cost
            )));
        }
        Ok(())
    }
}
