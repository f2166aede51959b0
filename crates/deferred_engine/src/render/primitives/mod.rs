//! Rendering primitives
//!
//! The camera collaborator and plain mesh data handed to the device.

pub mod camera;
pub mod mesh;

pub use camera::{Camera, MoveType};
pub use mesh::{Mesh, Vertex};
