//! Geometry engine contract and the in-process reference engine.
//!
//! The engine is a narrow black-box boundary: the coordinator sends an
//! operation name, typed parameters and a workspace scope, and receives
//! a payload plus derived measurements. The engine is deterministic for
//! identical inputs and side-effect-free beyond the entity it
//! describes; entity identity is minted by the coordinator, not here.
//!
//! [`InProcessEngine`] is the deterministic reference implementation
//! used by tests and default sessions. Production deployments swap in a
//! real kernel behind the same trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GeomError, GeomResult};
use crate::payload::{GeometryPayload, Measurements, SolidKind, TopologyFlags};
use crate::vector::Vec3;

/// Request sent to the geometry engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometryRequest {
    /// Dot-namespaced operation name (e.g. `entity.create.point`).
    pub operation: String,
    /// Operation parameters; each operation deserializes its own shape.
    pub params: serde_json::Value,
    /// Workspace the resulting entity is scoped to.
    pub workspace: String,
}

impl GeometryRequest {
    pub fn new(operation: &str, params: serde_json::Value, workspace: &str) -> Self {
        Self {
            operation: operation.to_string(),
            params,
            workspace: workspace.to_string(),
        }
    }
}

/// Response returned by the geometry engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometryResponse {
    /// The produced or updated payload, when the operation creates one.
    pub payload: Option<GeometryPayload>,
    /// Derived measurements for the payload.
    pub measurements: Measurements,
}

impl GeometryResponse {
    fn with_payload(payload: GeometryPayload, measurements: Measurements) -> Self {
        Self {
            payload: Some(payload),
            measurements,
        }
    }
}

/// The geometry kernel boundary.
///
/// Guarantees required of any implementation:
/// - Deterministic: identical requests yield identical responses.
/// - Side-effect-free beyond describing the named entity.
/// - Every failure is a typed [`GeomError`], never a silent default.
#[async_trait]
pub trait GeometryEngine: Send + Sync {
    async fn execute(&self, request: GeometryRequest) -> GeomResult<GeometryResponse>;
}

// ---------------------------------------------------------------------------
// Typed parameter shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PointParams {
    position: Vec3,
}

#[derive(Debug, Deserialize)]
struct LineParams {
    start: Vec3,
    end: Vec3,
}

#[derive(Debug, Deserialize)]
struct CircleParams {
    center: Vec3,
    normal: Vec3,
    radius: f64,
}

#[derive(Debug, Deserialize)]
struct BoxParams {
    width: f64,
    depth: f64,
    height: f64,
}

#[derive(Debug, Deserialize)]
struct CylinderParams {
    radius: f64,
    height: f64,
}

#[derive(Debug, Deserialize)]
struct ExtrudeParams {
    profile: GeometryPayload,
    distance: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum BooleanOp {
    Union,
    Difference,
    Intersection,
}

#[derive(Debug, Deserialize)]
struct BooleanParams {
    op: BooleanOp,
    a: GeometryPayload,
    b: GeometryPayload,
}

#[derive(Debug, Deserialize)]
struct PatternParams {
    source: GeometryPayload,
    count: u32,
    spacing: f64,
}

#[derive(Debug, Deserialize)]
struct UpdateParams {
    payload: GeometryPayload,
}

fn parse<T: serde::de::DeserializeOwned>(params: serde_json::Value) -> GeomResult<T> {
    serde_json::from_value(params).map_err(|e| GeomError::InvalidParameter {
        field: "params".to_string(),
        reason: e.to_string(),
    })
}

fn require_positive(field: &str, value: f64) -> GeomResult<()> {
    if value <= 0.0 || !value.is_finite() {
        return Err(GeomError::InvalidGeometry(format!(
            "{field} must be positive and finite, got {value}"
        )));
    }
    Ok(())
}

fn solid_volume(payload: &GeometryPayload) -> GeomResult<(f64, f64)> {
    match payload {
        GeometryPayload::Solid {
            volume,
            surface_area,
            ..
        } => Ok((*volume, *surface_area)),
        other => Err(GeomError::InvalidGeometry(format!(
            "expected a solid operand, got {}",
            other.type_suffix()
        ))),
    }
}

// ---------------------------------------------------------------------------
// InProcessEngine
// ---------------------------------------------------------------------------

/// Deterministic in-process reference engine.
///
/// Closed-form measurements only; no tessellation, no kernel state.
#[derive(Debug, Default)]
pub struct InProcessEngine;

impl InProcessEngine {
    pub fn new() -> Self {
        Self
    }

    fn create_point(&self, params: serde_json::Value) -> GeomResult<GeometryResponse> {
        let p: PointParams = parse(params)?;
        Ok(GeometryResponse::with_payload(
            GeometryPayload::Point {
                position: p.position,
            },
            Measurements::none(),
        ))
    }

    fn create_line(&self, params: serde_json::Value) -> GeomResult<GeometryResponse> {
        let p: LineParams = parse(params)?;
        let direction = p.end.sub(&p.start);
        if direction.is_degenerate() {
            return Err(GeomError::InvalidGeometry(
                "line endpoints coincide".to_string(),
            ));
        }
        let length = direction.norm();
        Ok(GeometryResponse::with_payload(
            GeometryPayload::Line {
                start: p.start,
                end: p.end,
            },
            Measurements::length(length),
        ))
    }

    fn create_circle(&self, params: serde_json::Value) -> GeomResult<GeometryResponse> {
        let p: CircleParams = parse(params)?;
        require_positive("radius", p.radius)?;
        if p.normal.is_degenerate() {
            return Err(GeomError::InvalidGeometry(
                "circle normal is degenerate".to_string(),
            ));
        }
        let area = std::f64::consts::PI * p.radius * p.radius;
        Ok(GeometryResponse::with_payload(
            GeometryPayload::Circle {
                center: p.center,
                normal: p.normal,
                radius: p.radius,
            },
            Measurements {
                surface_area: Some(area),
                ..Measurements::none()
            },
        ))
    }

    fn create_box(&self, params: serde_json::Value) -> GeomResult<GeometryResponse> {
        let p: BoxParams = parse(params)?;
        require_positive("width", p.width)?;
        require_positive("depth", p.depth)?;
        require_positive("height", p.height)?;
        let volume = p.width * p.depth * p.height;
        let area = 2.0 * (p.width * p.depth + p.width * p.height + p.depth * p.height);
        Ok(GeometryResponse::with_payload(
            GeometryPayload::Solid {
                kind: SolidKind::Box,
                dims: vec![p.width, p.depth, p.height],
                volume,
                surface_area: area,
                topology: TopologyFlags {
                    closed: true,
                    manifold: true,
                },
            },
            Measurements::solid(volume, area),
        ))
    }

    fn create_cylinder(&self, params: serde_json::Value) -> GeomResult<GeometryResponse> {
        let p: CylinderParams = parse(params)?;
        require_positive("radius", p.radius)?;
        require_positive("height", p.height)?;
        let base = std::f64::consts::PI * p.radius * p.radius;
        let volume = base * p.height;
        let area = 2.0 * base + 2.0 * std::f64::consts::PI * p.radius * p.height;
        Ok(GeometryResponse::with_payload(
            GeometryPayload::Solid {
                kind: SolidKind::Cylinder,
                dims: vec![p.radius, p.height],
                volume,
                surface_area: area,
                topology: TopologyFlags {
                    closed: true,
                    manifold: true,
                },
            },
            Measurements::solid(volume, area),
        ))
    }

    fn extrude(&self, params: serde_json::Value) -> GeomResult<GeometryResponse> {
        let p: ExtrudeParams = parse(params)?;
        require_positive("distance", p.distance)?;
        let profile_area = match &p.profile {
            GeometryPayload::Circle { radius, .. } => {
                require_positive("radius", *radius)?;
                std::f64::consts::PI * radius * radius
            }
            other => {
                return Err(GeomError::InvalidGeometry(format!(
                    "extrude profile must be a circle, got {}",
                    other.type_suffix()
                )))
            }
        };
        let volume = profile_area * p.distance;
        // Lateral surface of the swept circle plus the two caps.
        let perimeter = 2.0 * (std::f64::consts::PI * profile_area).sqrt();
        let area = 2.0 * profile_area + perimeter * p.distance;
        Ok(GeometryResponse::with_payload(
            GeometryPayload::Solid {
                kind: SolidKind::Extrusion,
                dims: vec![profile_area, p.distance],
                volume,
                surface_area: area,
                topology: TopologyFlags {
                    closed: true,
                    manifold: true,
                },
            },
            Measurements::solid(volume, area),
        ))
    }

    fn boolean(&self, params: serde_json::Value) -> GeomResult<GeometryResponse> {
        let p: BooleanParams = parse(params)?;
        let (va, sa) = solid_volume(&p.a)?;
        let (vb, sb) = solid_volume(&p.b)?;
        // Non-overlapping approximation; a real kernel replaces this.
        let (volume, area) = match p.op {
            BooleanOp::Union => (va + vb, sa + sb),
            BooleanOp::Difference => ((va - vb).max(0.0), sa),
            BooleanOp::Intersection => (va.min(vb), sa.min(sb)),
        };
        Ok(GeometryResponse::with_payload(
            GeometryPayload::Solid {
                kind: SolidKind::Boolean,
                dims: vec![va, vb],
                volume,
                surface_area: area,
                topology: TopologyFlags {
                    closed: volume > 0.0,
                    manifold: volume > 0.0,
                },
            },
            Measurements::solid(volume, area),
        ))
    }

    fn pattern(&self, params: serde_json::Value) -> GeomResult<GeometryResponse> {
        let p: PatternParams = parse(params)?;
        if p.count == 0 {
            return Err(GeomError::InvalidParameter {
                field: "count".to_string(),
                reason: "pattern count must be at least 1".to_string(),
            });
        }
        require_positive("spacing", p.spacing)?;
        let (v, s) = solid_volume(&p.source)?;
        let count = f64::from(p.count);
        Ok(GeometryResponse::with_payload(
            GeometryPayload::Solid {
                kind: SolidKind::Pattern,
                dims: vec![count, p.spacing],
                volume: v * count,
                surface_area: s * count,
                topology: TopologyFlags {
                    closed: true,
                    manifold: true,
                },
            },
            Measurements::solid(v * count, s * count),
        ))
    }

    fn update(&self, params: serde_json::Value) -> GeomResult<GeometryResponse> {
        let p: UpdateParams = parse(params)?;
        // Re-validate the incoming payload the same way creation would.
        match &p.payload {
            GeometryPayload::Line { start, end } => {
                if end.sub(start).is_degenerate() {
                    return Err(GeomError::InvalidGeometry(
                        "line endpoints coincide".to_string(),
                    ));
                }
            }
            GeometryPayload::Circle { radius, normal, .. } => {
                require_positive("radius", *radius)?;
                if normal.is_degenerate() {
                    return Err(GeomError::InvalidGeometry(
                        "circle normal is degenerate".to_string(),
                    ));
                }
            }
            GeometryPayload::Solid { volume, .. } => {
                require_positive("volume", *volume)?;
            }
            GeometryPayload::Point { .. } => {}
        }
        Ok(GeometryResponse::with_payload(
            p.payload,
            Measurements::none(),
        ))
    }
}

#[async_trait]
impl GeometryEngine for InProcessEngine {
    async fn execute(&self, request: GeometryRequest) -> GeomResult<GeometryResponse> {
        debug!(
            operation = %request.operation,
            workspace = %request.workspace,
            "geometry request"
        );
        match request.operation.as_str() {
            "entity.create.point" => self.create_point(request.params),
            "entity.create.line" => self.create_line(request.params),
            "entity.create.circle" => self.create_circle(request.params),
            "entity.update" => self.update(request.params),
            "solid.create.box" => self.create_box(request.params),
            "solid.create.cylinder" => self.create_cylinder(request.params),
            "solid.extrude" => self.extrude(request.params),
            "solid.boolean" => self.boolean(request.params),
            "solid.pattern" => self.pattern(request.params),
            other => Err(GeomError::Unsupported(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine() -> InProcessEngine {
        InProcessEngine::new()
    }

    #[tokio::test]
    async fn test_create_point_round_trips_position() {
        let resp = engine()
            .execute(GeometryRequest::new(
                "entity.create.point",
                json!({"position": {"x": 1.0, "y": 2.0, "z": 3.0}}),
                "main",
            ))
            .await
            .unwrap();
        match resp.payload.unwrap() {
            GeometryPayload::Point { position } => {
                assert_eq!(position, Vec3::new(1.0, 2.0, 3.0));
            }
            other => panic!("expected point, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_line_measures_length() {
        let resp = engine()
            .execute(GeometryRequest::new(
                "entity.create.line",
                json!({
                    "start": {"x": 0.0, "y": 0.0, "z": 0.0},
                    "end": {"x": 3.0, "y": 4.0, "z": 0.0}
                }),
                "main",
            ))
            .await
            .unwrap();
        assert_eq!(resp.measurements.length, Some(5.0));
    }

    #[tokio::test]
    async fn test_degenerate_line_is_invalid_geometry() {
        let err = engine()
            .execute(GeometryRequest::new(
                "entity.create.line",
                json!({
                    "start": {"x": 1.0, "y": 1.0, "z": 1.0},
                    "end": {"x": 1.0, "y": 1.0, "z": 1.0}
                }),
                "main",
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, GeomError::InvalidGeometry(_)));
    }

    #[tokio::test]
    async fn test_box_volume_and_area() {
        let resp = engine()
            .execute(GeometryRequest::new(
                "solid.create.box",
                json!({"width": 2.0, "depth": 3.0, "height": 4.0}),
                "main",
            ))
            .await
            .unwrap();
        assert_eq!(resp.measurements.volume, Some(24.0));
        assert_eq!(resp.measurements.surface_area, Some(52.0));
    }

    #[tokio::test]
    async fn test_negative_box_dimension_rejected() {
        let err = engine()
            .execute(GeometryRequest::new(
                "solid.create.box",
                json!({"width": -2.0, "depth": 3.0, "height": 4.0}),
                "main",
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, GeomError::InvalidGeometry(_)));
    }

    #[tokio::test]
    async fn test_extrude_circle_volume_is_area_times_distance() {
        let resp = engine()
            .execute(GeometryRequest::new(
                "solid.extrude",
                json!({
                    "profile": {
                        "type": "circle",
                        "center": {"x": 0.0, "y": 0.0, "z": 0.0},
                        "normal": {"x": 0.0, "y": 0.0, "z": 1.0},
                        "radius": 1.0
                    },
                    "distance": 2.0
                }),
                "main",
            ))
            .await
            .unwrap();
        let expected = std::f64::consts::PI * 2.0;
        assert!((resp.measurements.volume.unwrap() - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_boolean_union_sums_volumes() {
        let solid = |v: f64| {
            json!({
                "type": "solid",
                "kind": "box",
                "dims": [1.0, 1.0, v],
                "volume": v,
                "surface_area": 6.0,
                "topology": {"closed": true, "manifold": true}
            })
        };
        let resp = engine()
            .execute(GeometryRequest::new(
                "solid.boolean",
                json!({"op": "union", "a": solid(2.0), "b": solid(3.0)}),
                "main",
            ))
            .await
            .unwrap();
        assert_eq!(resp.measurements.volume, Some(5.0));
    }

    #[tokio::test]
    async fn test_pattern_multiplies_volume_by_count() {
        let resp = engine()
            .execute(GeometryRequest::new(
                "solid.pattern",
                json!({
                    "source": {
                        "type": "solid",
                        "kind": "box",
                        "dims": [1.0, 1.0, 1.0],
                        "volume": 1.0,
                        "surface_area": 6.0,
                        "topology": {"closed": true, "manifold": true}
                    },
                    "count": 4,
                    "spacing": 0.5
                }),
                "main",
            ))
            .await
            .unwrap();
        assert_eq!(resp.measurements.volume, Some(4.0));
    }

    #[tokio::test]
    async fn test_unknown_operation_is_unsupported() {
        let err = engine()
            .execute(GeometryRequest::new("solid.teleport", json!({}), "main"))
            .await
            .unwrap_err();
        assert!(matches!(err, GeomError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_engine_is_deterministic_for_identical_inputs() {
        let req = || {
            GeometryRequest::new(
                "solid.create.cylinder",
                json!({"radius": 1.5, "height": 4.0}),
                "main",
            )
        };
        let a = engine().execute(req()).await.unwrap();
        let b = engine().execute(req()).await.unwrap();
        assert_eq!(a.payload, b.payload);
        assert_eq!(a.measurements, b.measurements);
    }
}
