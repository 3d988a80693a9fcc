//! cadswarm Geometry Engine Boundary
//!
//! The coordinator treats geometry as a black box behind the
//! [`GeometryEngine`] trait: create, extrude, boolean and pattern
//! operations go in, entity payloads and measured properties come out.
//! This crate also owns the vector math the constraint layer delegates
//! to (dot, cross, angle-between with a fixed angular tolerance).

pub mod engine;
pub mod error;
pub mod payload;
pub mod vector;

pub use engine::{GeometryEngine, GeometryRequest, GeometryResponse, InProcessEngine};
pub use error::{GeomError, GeomResult};
pub use payload::{GeometryPayload, Measurements, SolidKind, TopologyFlags};
pub use vector::{Vec3, ANGULAR_TOLERANCE};
