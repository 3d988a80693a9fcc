//! Typed geometric payloads and measured properties.
//!
//! The payload is the type-specific body of an entity record. The
//! coordinator never interprets it beyond digest comparison; the
//! constraint layer reads directions and positions out of it.

use serde::{Deserialize, Serialize};

use crate::vector::Vec3;

/// Solid primitive classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolidKind {
    Box,
    Cylinder,
    Extrusion,
    Boolean,
    Pattern,
}

/// Topology flags reported by the engine for solids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TopologyFlags {
    pub closed: bool,
    pub manifold: bool,
}

/// Type-specific geometric payload of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeometryPayload {
    Point {
        position: Vec3,
    },
    Line {
        start: Vec3,
        end: Vec3,
    },
    Circle {
        center: Vec3,
        normal: Vec3,
        radius: f64,
    },
    Solid {
        kind: SolidKind,
        /// Engine-specific dimension vector (e.g. `[w, d, h]` for a box).
        dims: Vec<f64>,
        volume: f64,
        surface_area: f64,
        topology: TopologyFlags,
    },
}

impl GeometryPayload {
    /// Short type suffix used when minting namespaced entity ids.
    pub fn type_suffix(&self) -> &'static str {
        match self {
            GeometryPayload::Point { .. } => "point",
            GeometryPayload::Line { .. } => "line",
            GeometryPayload::Circle { .. } => "circle",
            GeometryPayload::Solid { .. } => "solid",
        }
    }

    /// Direction of a line payload, `None` for other types.
    pub fn direction(&self) -> Option<Vec3> {
        match self {
            GeometryPayload::Line { start, end } => Some(end.sub(start)),
            _ => None,
        }
    }

    /// Position of a point payload, `None` for other types.
    pub fn position(&self) -> Option<Vec3> {
        match self {
            GeometryPayload::Point { position } => Some(*position),
            _ => None,
        }
    }
}

/// Derived measurements returned alongside a payload.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Measurements {
    pub volume: Option<f64>,
    pub surface_area: Option<f64>,
    pub length: Option<f64>,
}

impl Measurements {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn length(length: f64) -> Self {
        Self {
            length: Some(length),
            ..Self::default()
        }
    }

    pub fn solid(volume: f64, surface_area: f64) -> Self {
        Self {
            volume: Some(volume),
            surface_area: Some(surface_area),
            length: None,
        }
    }
}
