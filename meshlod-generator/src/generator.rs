//! LOD generation service
//!
//! [`MeshLodGenerator`] wires the pieces together: load the topology through
//! an input provider, price every vertex, then collapse level by level and
//! bake each level through an output provider.

use crate::collapser::LodCollapser;
use crate::cost::{cost_from_config, LodCollapseCost};
use crate::data::{LodData, NEVER_COLLAPSE_COST};
use crate::input::{LodInputProvider, MeshInputProvider};
use crate::output::{CompressedOutput, LodOutputProvider, MeshOutput, UncompressedOutput};
use log::{debug, info};
use meshlod_core::{
    LodConfig, LodConfigAdvanced, LodLevel, LodMesh, MeshLodUsage, ReductionMethod, Result,
};

/// What happened at one requested level.
#[derive(Debug, Clone, PartialEq)]
pub struct LodLevelOutcome {
    /// Live unique vertices after the level, 0 for manual levels.
    pub unique_vertex_count: usize,
    /// Nothing collapsed since the previous baked level, no level was baked.
    pub skipped: bool,
    pub collapses: usize,
    pub last_cost: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LodGenerationReport {
    pub mesh_name: String,
    /// One entry per requested level, in request order.
    pub levels: Vec<LodLevelOutcome>,
}

impl LodGenerationReport {
    fn empty(mesh_name: impl Into<String>) -> Self {
        Self {
            mesh_name: mesh_name.into(),
            levels: Vec::new(),
        }
    }

    /// Levels that produced index data.
    pub fn baked_level_count(&self) -> usize {
        self.levels.iter().filter(|l| !l.skipped).count()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// Vertex floor and cost ceiling of a generated level.
pub fn lod_targets(level: &LodLevel, unique_vertex_count: usize) -> (usize, f32) {
    let value = level.reduction_value;
    let (floor, limit) = match level.reduction_method {
        ReductionMethod::Proportional => {
            let removed = (unique_vertex_count as f32 * value) as usize;
            (unique_vertex_count.saturating_sub(removed), NEVER_COLLAPSE_COST)
        }
        ReductionMethod::Constant => (
            unique_vertex_count.saturating_sub(value as usize),
            NEVER_COLLAPSE_COST,
        ),
        ReductionMethod::CollapseCost => (0, value),
    };
    let limit = match level.max_collapse_cost {
        Some(max) => limit.min(max),
        None => limit,
    };
    (floor, limit.min(NEVER_COLLAPSE_COST))
}

/// Level set scaled to the size of `mesh`.
pub fn auto_config(mesh: &LodMesh) -> LodConfig {
    LodConfig::auto(mesh)
}

#[derive(Debug, Clone)]
pub struct MeshLodGenerator {
    validate_topology: bool,
}

impl Default for MeshLodGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MeshLodGenerator {
    pub fn new() -> Self {
        Self {
            validate_topology: cfg!(debug_assertions),
        }
    }

    /// Re-check the whole topology after loading and before each bake.
    pub fn with_topology_validation(mut self, enabled: bool) -> Self {
        self.validate_topology = enabled;
        self
    }

    /// Replace the generated levels of `mesh` with ones built from `config`.
    pub fn generate_lod_levels(
        &self,
        mesh: &mut LodMesh,
        config: &LodConfig,
    ) -> Result<LodGenerationReport> {
        config.validate()?;
        if config.levels.is_empty() || mesh.submeshes.is_empty() {
            info!("{}: nothing to reduce", mesh.name);
            return Ok(LodGenerationReport::empty(mesh.name.clone()));
        }
        let mut data = self.load(&MeshInputProvider::new(mesh), &config.advanced)?;
        mesh.remove_lod_levels();
        let mut cost = cost_from_config(&config.advanced);
        let mut output: Box<dyn LodOutputProvider + '_> = if config.advanced.use_compression {
            Box::new(CompressedOutput::new(MeshOutput::new(mesh)))
        } else {
            Box::new(UncompressedOutput::new(MeshOutput::new(mesh)))
        };
        self.compute_lods(&mut data, &mut cost, &mut *output, config)
    }

    pub fn generate_auto_configured_lod_levels(
        &self,
        mesh: &mut LodMesh,
    ) -> Result<LodGenerationReport> {
        let config = auto_config(mesh);
        self.generate_lod_levels(mesh, &config)
    }

    /// Run with caller supplied providers and cost strategy.
    pub fn generate_with<I, C, O>(
        &self,
        input: &I,
        cost: &mut C,
        output: &mut O,
        config: &LodConfig,
    ) -> Result<LodGenerationReport>
    where
        I: LodInputProvider + ?Sized,
        C: LodCollapseCost + ?Sized,
        O: LodOutputProvider + ?Sized,
    {
        config.validate()?;
        if config.levels.is_empty() {
            info!("{}: no LOD levels requested", input.mesh_name());
            return Ok(LodGenerationReport::empty(input.mesh_name()));
        }
        let mut data = self.load(input, &config.advanced)?;
        self.compute_lods(&mut data, cost, output, config)
    }

    /// Build the topology model for `input`.
    pub fn load<I>(&self, input: &I, advanced: &LodConfigAdvanced) -> Result<LodData>
    where
        I: LodInputProvider + ?Sized,
    {
        let mut data = LodData::new(input.mesh_name(), input.bounding_sphere_radius());
        data.use_vertex_normals = advanced.use_vertex_normals;
        data.prevent_punching_holes = advanced.prevent_punching_holes;
        data.prevent_breaking_lines = advanced.prevent_breaking_lines;
        input.initialize_data(&mut data)?;
        Ok(data)
    }

    /// Collapse and bake every level of `config` on loaded data.
    pub fn compute_lods<C, O>(
        &self,
        data: &mut LodData,
        cost: &mut C,
        output: &mut O,
        config: &LodConfig,
    ) -> Result<LodGenerationReport>
    where
        C: LodCollapseCost + ?Sized,
        O: LodOutputProvider + ?Sized,
    {
        output.prepare(data)?;
        cost.init_collapse_costs(data);
        if self.validate_topology {
            data.assert_valid_mesh();
        }

        let unique_vertex_count = data.live_vertex_count;
        let level_count = config.levels.len();
        let mut report = LodGenerationReport::empty(data.mesh_name.clone());
        let mut collapser = LodCollapser::new();
        let mut last_bake_vertex_count = None;

        for (i, level) in config.levels.iter().enumerate() {
            if level.is_manual() {
                output.bake_manual_lods(data);
                output.add_lod_usage(MeshLodUsage {
                    value: level.distance,
                    manual_mesh_name: level.manual_mesh_name.clone(),
                });
                report.levels.push(LodLevelOutcome {
                    unique_vertex_count: 0,
                    skipped: false,
                    collapses: 0,
                    last_cost: None,
                });
                debug!("{}: level {} is manual", data.mesh_name, i);
                continue;
            }

            let (floor, limit) = lod_targets(level, unique_vertex_count);
            let run = collapser.collapse_cheapest_vertices(data, cost, output, floor, limit);
            let vertex_count = data.live_vertex_count;
            let skipped = last_bake_vertex_count == Some(vertex_count);
            debug!(
                "{}: level {} targets {} vertices below cost {}, {} collapses left {}{}",
                data.mesh_name,
                i,
                floor,
                limit,
                run.collapses,
                vertex_count,
                if skipped { ", skipped" } else { "" }
            );
            if !skipped {
                last_bake_vertex_count = Some(vertex_count);
                if self.validate_topology {
                    data.assert_valid_mesh();
                }
                output.bake_lods(data, i + 1 == level_count);
                output.add_lod_usage(MeshLodUsage {
                    value: level.distance,
                    manual_mesh_name: None,
                });
            }
            report.levels.push(LodLevelOutcome {
                unique_vertex_count: vertex_count,
                skipped,
                collapses: run.collapses,
                last_cost: run.last_cost,
            });
        }
        output.finalize(data);
        Ok(report)
    }
}
