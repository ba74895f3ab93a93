//! Progressive mesh LOD generation
//!
//! This crate reduces a [`meshlod_core::LodMesh`] one vertex at a time by
//! collapsing its cheapest edge, and bakes the surviving triangles into one
//! index buffer per requested level:
//! - Topology model and collapse-cost heap
//! - Curvature, quadric, outside-weighted and profiled cost strategies
//! - Convex hull based outside marking
//! - Plain and compressed (buffer sharing) output
//! - Background generation on a worker thread
//! - Promotion of LOD1 to the base level

pub mod data;
pub mod heap;
pub mod input;
pub mod cost;
pub mod outside;
pub mod collapser;
pub mod output;
pub mod generator;
pub mod queue;
pub mod stripifier;

#[cfg(test)]
mod test_meshes;

pub use data::*;
pub use heap::*;
pub use input::*;
pub use cost::*;
pub use outside::*;
pub use collapser::*;
pub use output::*;
pub use generator::*;
pub use queue::*;
pub use stripifier::*;
