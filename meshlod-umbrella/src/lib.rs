//! # meshlod
//!
//! Progressive mesh level-of-detail generation for Rust.
//!
//! This is the umbrella crate that provides convenient access to all meshlod
//! functionality. You can use this crate to get everything in one place, or
//! depend on `meshlod-core` alone when you only need the mesh model.
//!
//! ## Quick Start
//!
//! ```rust
//! use meshlod::prelude::*;
//!
//! let mut mesh = LodMesh::from_triangles(
//!     "quad",
//!     vec![
//!         Point3f::new(0.0, 0.0, 0.0),
//!         Point3f::new(1.0, 0.0, 0.0),
//!         Point3f::new(1.0, 1.0, 0.0),
//!         Point3f::new(0.0, 1.0, 0.0),
//!     ],
//!     &[[0, 1, 2], [0, 2, 3]],
//! );
//! let config = LodConfig::new(LodStrategy::Distance)
//!     .with_level(LodLevel::proportional(10.0, 0.25));
//!
//! let report = MeshLodGenerator::new()
//!     .generate_lod_levels(&mut mesh, &config)
//!     .unwrap();
//! assert_eq!(report.levels.len(), 1);
//! ```
//!
//! ## Feature Flags
//!
//! - `default`: Enables the generator
//! - `generator`: Edge collapse LOD generation, background worker and stripifier

// Re-export core functionality
pub use meshlod_core::*;

#[cfg(feature = "generator")]
pub use meshlod_generator as generator;

/// Convenient imports for common use cases
pub mod prelude {
    pub use meshlod_core::*;

    #[cfg(feature = "generator")]
    pub use meshlod_generator::{
        auto_config, CompressedOutput, Lod0Stripifier, LodCollapseCost, LodGenerationReport,
        LodInjectorListener, LodOutputBuffer, LodOutputProvider, LodRequest, LodResponse,
        LodWorker, MeshInputProvider, MeshLodGenerator, MeshOutput, UncompressedOutput,
    };
}
