//! Core data structures and traits for meshlod
//!
//! This crate provides the types shared by every stage of LOD generation:
//! geometry aliases, the renderer-facing mesh model, the generation settings
//! record and the error type.

pub mod point;
pub mod mesh;
pub mod config;
pub mod traits;
pub mod error;

pub use point::*;
pub use mesh::*;
pub use config::*;
pub use traits::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector3, Matrix4, Vector4};
