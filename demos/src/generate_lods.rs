use std::f32::consts::PI;
use std::time::Instant;

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use env_logger::Env;
use log::info;

use meshlod::prelude::*;

/// Generate LOD levels for a procedural mesh and print their sizes
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Mesh to build
    #[clap(short, long, value_enum, default_value_t = Shape::Sphere)]
    shape: Shape,

    /// Rings of the sphere, rows of the terrain
    #[clap(short, long, default_value_t = 32)]
    resolution: usize,

    /// Fraction of vertices removed by each level, ascending
    #[clap(short, long, value_delimiter = ',', default_values_t = vec![0.25, 0.5, 0.75, 0.9])]
    levels: Vec<f32>,

    /// Derive the levels from the mesh size instead of `--levels`
    #[clap(long)]
    auto: bool,

    /// Bake every level into its own index buffer
    #[clap(long)]
    no_compression: bool,

    /// Penalty for collapsing vertices visible from outside, in [0, 1]
    #[clap(long, default_value_t = 0.0)]
    outside_weight: f32,

    /// Estimate collapse costs with plane quadrics
    #[clap(long)]
    quadric: bool,

    /// Generate on the background worker
    #[clap(long)]
    background: bool,

    /// Drop LOD0 afterwards and strip the vertices only it used
    #[clap(long)]
    strip: bool,
}

#[derive(ValueEnum, Clone, Copy)]
enum Shape {
    Sphere,
    Terrain,
}

fn make_sphere(rings: usize) -> LodMesh {
    let segments = rings * 2;
    let mut positions = vec![Point3f::new(0.0, 1.0, 0.0)];
    for r in 1..rings {
        let theta = r as f32 / rings as f32 * PI;
        for s in 0..segments {
            let phi = s as f32 / segments as f32 * 2.0 * PI;
            positions.push(Point3f::new(
                theta.sin() * phi.cos(),
                theta.cos(),
                theta.sin() * phi.sin(),
            ));
        }
    }
    positions.push(Point3f::new(0.0, -1.0, 0.0));
    let south = (positions.len() - 1) as u32;

    let ring = |r: usize, s: usize| (1 + (r - 1) * segments + s % segments) as u32;
    let mut faces = Vec::new();
    for s in 0..segments {
        faces.push([0, ring(1, s + 1), ring(1, s)]);
        faces.push([south, ring(rings - 1, s), ring(rings - 1, s + 1)]);
    }
    for r in 1..rings - 1 {
        for s in 0..segments {
            let (a, b) = (ring(r, s), ring(r, s + 1));
            let (c, d) = (ring(r + 1, s), ring(r + 1, s + 1));
            faces.push([a, b, d]);
            faces.push([a, d, c]);
        }
    }
    LodMesh::from_triangles("sphere", positions, &faces)
}

fn make_terrain(rows: usize) -> LodMesh {
    let mut positions = Vec::with_capacity(rows * rows);
    for y in 0..rows {
        for x in 0..rows {
            let fx = x as f32 / (rows - 1) as f32 * 2.0 * PI;
            let fy = y as f32 / (rows - 1) as f32 * 2.0 * PI;
            positions.push(Point3f::new(x as f32, y as f32, fx.sin() * fy.cos() * 2.0));
        }
    }
    let mut faces = Vec::with_capacity((rows - 1) * (rows - 1) * 2);
    for y in 0..rows - 1 {
        for x in 0..rows - 1 {
            let tl = (y * rows + x) as u32;
            let tr = tl + 1;
            let bl = tl + rows as u32;
            let br = bl + 1;
            faces.push([tl, bl, tr]);
            faces.push([tr, bl, br]);
        }
    }
    LodMesh::from_triangles("terrain", positions, &faces)
}

fn triangle_count(mesh: &LodMesh, level: usize) -> usize {
    mesh.submeshes
        .iter()
        .filter_map(|s| s.lod_index(level))
        .flat_map(|d| d.triangles())
        .filter(|t| t[0] != t[1] && t[1] != t[2] && t[0] != t[2])
        .count()
}

fn build_config(args: &Args, mesh: &LodMesh) -> Result<LodConfig> {
    let mut config = if args.auto {
        auto_config(mesh)
    } else {
        let mut config = LodConfig::new(LodStrategy::Distance);
        for (i, reduction) in args.levels.iter().enumerate() {
            config = config.with_level(LodLevel::proportional((i + 1) as f32 * 10.0, *reduction));
        }
        config
    };
    config.advanced.use_compression = !args.no_compression;
    config.advanced.outside_weight = args.outside_weight;
    if args.quadric {
        config.advanced.cost_estimator = CostEstimator::Quadric;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if args.resolution < 3 {
        bail!("resolution must be at least 3, got {}", args.resolution);
    }

    let mut mesh = match args.shape {
        Shape::Sphere => make_sphere(args.resolution),
        Shape::Terrain => make_terrain(args.resolution),
    };
    let config = build_config(&args, &mesh)?;
    info!(
        "{}: {} vertices, {} triangles, {} levels requested",
        mesh.name,
        mesh.submesh_vertex_data(0).map_or(0, |v| v.len()),
        triangle_count(&mesh, 0),
        config.levels.len()
    );

    let start = Instant::now();
    let report = if args.background {
        let worker = LodWorker::spawn()?;
        worker.submit(LodRequest::new(&mesh, config.clone()))?;
        let response = worker.recv()?;
        response.inject(&mut mesh, None)?;
        response.report?
    } else {
        MeshLodGenerator::new().generate_lod_levels(&mut mesh, &config)?
    };
    info!("generated in {:?}", start.elapsed());

    let mut baked = 0;
    for (i, outcome) in report.levels.iter().enumerate() {
        if outcome.skipped {
            println!("level {}: skipped, {} vertices", i + 1, outcome.unique_vertex_count);
            continue;
        }
        baked += 1;
        println!(
            "level {}: {} vertices, {} triangles, {} collapses, last cost {:?}",
            i + 1,
            outcome.unique_vertex_count,
            triangle_count(&mesh, baked),
            outcome.collapses,
            outcome.last_cost
        );
    }

    if args.strip {
        let before = mesh.submesh_vertex_data(0).map_or(0, |v| v.len());
        if Lod0Stripifier::new().strip_lod0_vertices(&mut mesh)? {
            println!(
                "stripped LOD0: {} of {} vertices left",
                mesh.submesh_vertex_data(0).map_or(0, |v| v.len()),
                before
            );
        }
    }
    Ok(())
}
