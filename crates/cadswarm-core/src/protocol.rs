//! Wire protocol envelopes for external callers.
//!
//! The envelope is the public API boundary between agents/tooling and
//! the coordinator. Requests carry a protocol version tag, a
//! dot-namespaced method, a parameter object and a correlation id;
//! responses carry either a `result` object or an `error` object with
//! a numeric code. The numeric bands are stable — external callers
//! branch on them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cadswarm_geom::GeomError;

use crate::domain::error::CoreError;

/// Current protocol version tag.
pub const PROTOCOL_VERSION: &str = "1";

/// Reserved error code bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidParameter,
    EntityNotFound,
    InvalidGeometry,
    ConstraintConflict,
    OperationInvalid,
    UnsupportedFormat,
    InternalError,
}

impl ErrorCode {
    /// The stable numeric value of this band.
    pub fn value(self) -> u32 {
        match self {
            ErrorCode::InvalidParameter => 1000,
            ErrorCode::EntityNotFound => 2000,
            ErrorCode::InvalidGeometry => 3000,
            ErrorCode::ConstraintConflict => 4000,
            ErrorCode::OperationInvalid => 5000,
            ErrorCode::UnsupportedFormat => 6000,
            ErrorCode::InternalError => 9000,
        }
    }
}

impl From<&CoreError> for ErrorCode {
    fn from(err: &CoreError) -> Self {
        match err {
            CoreError::Validation { .. } => ErrorCode::InvalidParameter,
            CoreError::DuplicateAgent(_) => ErrorCode::InvalidParameter,
            CoreError::InvalidRole(_) => ErrorCode::InvalidParameter,
            CoreError::NotFound { .. } => ErrorCode::EntityNotFound,
            CoreError::InvalidBranch(_) => ErrorCode::OperationInvalid,
            CoreError::ConstraintConflict { .. } => ErrorCode::ConstraintConflict,
            CoreError::MergeBlocked { .. } => ErrorCode::OperationInvalid,
            CoreError::Permission { .. } => ErrorCode::OperationInvalid,
            CoreError::CatalogUnavailable { .. } => ErrorCode::InternalError,
            CoreError::Engine(GeomError::InvalidGeometry(_)) => ErrorCode::InvalidGeometry,
            CoreError::Engine(GeomError::InvalidParameter { .. }) => ErrorCode::InvalidParameter,
            CoreError::Engine(GeomError::EntityNotFound(_)) => ErrorCode::EntityNotFound,
            CoreError::Engine(GeomError::Unsupported(_)) => ErrorCode::UnsupportedFormat,
            CoreError::Engine(_) => ErrorCode::InternalError,
            CoreError::Storage(_) => ErrorCode::InternalError,
            CoreError::Serialization(_) => ErrorCode::InternalError,
        }
    }
}

/// Request envelope from an external caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub version: String,
    /// Dot-namespaced method, e.g. `workspace.create`.
    pub method: String,
    /// Parameter object; must include `agent_id` for dispatch.
    #[serde(default)]
    pub params: serde_json::Value,
    pub correlation_id: String,
}

impl RequestEnvelope {
    /// Build a current-version request with a fresh correlation id.
    pub fn new(method: &str, params: serde_json::Value) -> Self {
        RequestEnvelope {
            version: PROTOCOL_VERSION.to_string(),
            method: method.to_string(),
            params,
            correlation_id: Uuid::new_v4().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Successful result body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseResult {
    pub status: ResponseStatus,
    pub data: serde_json::Value,
}

/// Error body with its stable numeric code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: u32,
    pub message: String,
}

/// Response envelope echoing the request's correlation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub version: String,
    pub correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResponseResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl ResponseEnvelope {
    pub fn success(correlation_id: &str, data: serde_json::Value) -> Self {
        ResponseEnvelope {
            version: PROTOCOL_VERSION.to_string(),
            correlation_id: correlation_id.to_string(),
            result: Some(ResponseResult {
                status: ResponseStatus::Success,
                data,
            }),
            error: None,
        }
    }

    pub fn failure(correlation_id: &str, code: ErrorCode, message: String) -> Self {
        ResponseEnvelope {
            version: PROTOCOL_VERSION.to_string(),
            correlation_id: correlation_id.to_string(),
            result: None,
            error: Some(ResponseError {
                code: code.value(),
                message,
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_bands_are_stable() {
        // External callers branch on these values; they must not move.
        assert_eq!(ErrorCode::InvalidParameter.value(), 1000);
        assert_eq!(ErrorCode::EntityNotFound.value(), 2000);
        assert_eq!(ErrorCode::InvalidGeometry.value(), 3000);
        assert_eq!(ErrorCode::ConstraintConflict.value(), 4000);
        assert_eq!(ErrorCode::OperationInvalid.value(), 5000);
        assert_eq!(ErrorCode::UnsupportedFormat.value(), 6000);
        assert_eq!(ErrorCode::InternalError.value(), 9000);
    }

    #[test]
    fn test_core_error_mapping_covers_conflict_and_permission() {
        let err = CoreError::ConstraintConflict {
            description: "parallel vs perpendicular".to_string(),
        };
        assert_eq!(ErrorCode::from(&err), ErrorCode::ConstraintConflict);

        let err = CoreError::Permission {
            agent: "a".to_string(),
            role: "validator".to_string(),
            operation: "solid.extrude".to_string(),
        };
        assert_eq!(ErrorCode::from(&err), ErrorCode::OperationInvalid);

        let err = CoreError::not_found("workspace", "ghost");
        assert_eq!(ErrorCode::from(&err), ErrorCode::EntityNotFound);
    }

    #[test]
    fn test_success_envelope_shape() {
        let req = RequestEnvelope::new("workspace.status", serde_json::json!({}));
        let resp = ResponseEnvelope::success(&req.correlation_id, serde_json::json!({"ok": true}));

        assert!(resp.is_success());
        assert_eq!(resp.correlation_id, req.correlation_id);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["result"]["status"], "success");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_failure_envelope_carries_numeric_code() {
        let resp =
            ResponseEnvelope::failure("corr-1", ErrorCode::ConstraintConflict, "nope".into());
        assert!(!resp.is_success());
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["error"]["code"], 4000);
        assert!(json.get("result").is_none());
    }

    #[test]
    fn test_request_envelope_round_trip() {
        let req = RequestEnvelope::new(
            "entity.create.point",
            serde_json::json!({"agent_id": "a1", "position": {"x": 0.0, "y": 0.0, "z": 0.0}}),
        );
        let json = serde_json::to_string(&req).unwrap();
        let back: RequestEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.method, "entity.create.point");
        assert_eq!(back.version, PROTOCOL_VERSION);
    }
}
