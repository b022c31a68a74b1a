//! The closed error taxonomy (C2) and the external-facing error value.
//!
//! `ErrorCode` is the stable, wire-visible identifier. `lookup` is a pure
//! table read — nothing here raises; other components build a `CoreError`
//! and the boundary consults this table to enrich it with retryability and
//! a suggested fix.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The closed set of error kinds this crate can produce.
///
/// Variant names match the wire codes verbatim (spec.md §6: "Error codes on
/// the wire match the Error Taxonomy kinds verbatim").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    // Not-found family
    ProjectNotFound,
    ClipNotFound,
    LayerNotFound,
    AssetNotFound,
    AudioTrackNotFound,
    AudioClipNotFound,
    MarkerNotFound,
    OperationNotFound,
    // Validation family
    InvalidTimeRange,
    OutOfBounds,
    InvalidFieldValue,
    MissingRequiredField,
    InvalidClipType,
    InvalidLayerType,
    InvalidAssetType,
    LayerLocked,
    DurationTooLong,
    TooManyClips,
    TooManyLayers,
    // Conflict family
    ClipOverlap,
    ConcurrentModification,
    IdempotencyConflict,
    OperationInProgress,
    // Semantic operations
    SemanticOperationFailed,
    // Feature / capability
    FeatureNotSupported,
    OperationNotSupported,
    // Rollback family
    RollbackNotAvailable,
    OperationAlreadyRolledBack,
    RollbackFailed,
    // Auth family
    Unauthorized,
    Forbidden,
    TokenExpired,
    // System family
    RateLimited,
    InternalError,
    ServiceUnavailable,
    DatabaseError,
    StorageError,
    // Generic request errors
    BadRequest,
    ValidationError,
    NotFound,
    HttpError,
}

impl ErrorCode {
    /// The wire string for this code, exactly as spec.md §6 requires.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ProjectNotFound => "PROJECT_NOT_FOUND",
            ErrorCode::ClipNotFound => "CLIP_NOT_FOUND",
            ErrorCode::LayerNotFound => "LAYER_NOT_FOUND",
            ErrorCode::AssetNotFound => "ASSET_NOT_FOUND",
            ErrorCode::AudioTrackNotFound => "AUDIO_TRACK_NOT_FOUND",
            ErrorCode::AudioClipNotFound => "AUDIO_CLIP_NOT_FOUND",
            ErrorCode::MarkerNotFound => "MARKER_NOT_FOUND",
            ErrorCode::OperationNotFound => "OPERATION_NOT_FOUND",
            ErrorCode::InvalidTimeRange => "INVALID_TIME_RANGE",
            ErrorCode::OutOfBounds => "OUT_OF_BOUNDS",
            ErrorCode::InvalidFieldValue => "INVALID_FIELD_VALUE",
            ErrorCode::MissingRequiredField => "MISSING_REQUIRED_FIELD",
            ErrorCode::InvalidClipType => "INVALID_CLIP_TYPE",
            ErrorCode::InvalidLayerType => "INVALID_LAYER_TYPE",
            ErrorCode::InvalidAssetType => "INVALID_ASSET_TYPE",
            ErrorCode::LayerLocked => "LAYER_LOCKED",
            ErrorCode::DurationTooLong => "DURATION_TOO_LONG",
            ErrorCode::TooManyClips => "TOO_MANY_CLIPS",
            ErrorCode::TooManyLayers => "TOO_MANY_LAYERS",
            ErrorCode::ClipOverlap => "CLIP_OVERLAP",
            ErrorCode::ConcurrentModification => "CONCURRENT_MODIFICATION",
            ErrorCode::IdempotencyConflict => "IDEMPOTENCY_CONFLICT",
            ErrorCode::OperationInProgress => "OPERATION_IN_PROGRESS",
            ErrorCode::SemanticOperationFailed => "SEMANTIC_OPERATION_FAILED",
            ErrorCode::FeatureNotSupported => "FEATURE_NOT_SUPPORTED",
            ErrorCode::OperationNotSupported => "OPERATION_NOT_SUPPORTED",
            ErrorCode::RollbackNotAvailable => "ROLLBACK_NOT_AVAILABLE",
            ErrorCode::OperationAlreadyRolledBack => "OPERATION_ALREADY_ROLLED_BACK",
            ErrorCode::RollbackFailed => "ROLLBACK_FAILED",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::TokenExpired => "TOKEN_EXPIRED",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::StorageError => "STORAGE_ERROR",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::HttpError => "HTTP_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A suggested follow-up action an agent can take automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    RefreshIds,
    RefreshEtag,
    RetryWithBackoff,
    WaitAndRetry,
    RefreshToken,
}

/// The resolved taxonomy entry for one `ErrorCode`: retryability plus
/// whatever recovery hints the table fixes for that code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorSpec {
    pub retryable: bool,
    pub suggested_fix: &'static str,
    pub suggested_action: Option<SuggestedAction>,
    pub suggested_endpoint: Option<&'static str>,
    pub parameters: Option<Value>,
}

impl ErrorSpec {
    const fn new(retryable: bool, suggested_fix: &'static str) -> Self {
        Self {
            retryable,
            suggested_fix,
            suggested_action: None,
            suggested_endpoint: None,
            parameters: None,
        }
    }

    const fn with_action(mut self, action: SuggestedAction) -> Self {
        self.suggested_action = Some(action);
        self
    }

    fn with_endpoint(mut self, endpoint: &'static str) -> Self {
        self.suggested_endpoint = Some(endpoint);
        self
    }

    fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = Some(parameters);
        self
    }
}

/// Default spec returned for a code the table doesn't otherwise cover.
/// The closed enum above means this path is unreachable from `lookup`, but
/// `lookup` keeps the signature non-`Option` by falling back to it rather
/// than panicking, matching the original's `get_error_spec` default.
fn default_spec() -> ErrorSpec {
    ErrorSpec::new(false, "Check the error code and message for details")
}

/// Look up the fixed taxonomy entry for `code` (C2: "a lookup, not a
/// thrower"). This is read-only shared state populated once, consulted at
/// the response boundary.
pub fn lookup(code: ErrorCode) -> ErrorSpec {
    use ErrorCode::*;
    use SuggestedAction::*;
    match code {
        ProjectNotFound => ErrorSpec::new(
            true,
            "Verify the project_id exists and you have access to it",
        )
        .with_action(RefreshIds),
        ClipNotFound => ErrorSpec::new(true, "Refresh timeline structure to get current clip IDs")
            .with_action(RefreshIds)
            .with_endpoint("GET /projects/{project_id}/structure"),
        LayerNotFound => {
            ErrorSpec::new(true, "Refresh timeline structure to get current layer IDs")
                .with_action(RefreshIds)
                .with_endpoint("GET /projects/{project_id}/structure")
        }
        AssetNotFound => ErrorSpec::new(true, "Refresh asset catalog to get available asset IDs")
            .with_action(RefreshIds)
            .with_endpoint("GET /projects/{project_id}/assets"),
        AudioTrackNotFound => ErrorSpec::new(
            true,
            "Refresh timeline structure to get current audio track IDs",
        )
        .with_action(RefreshIds)
        .with_endpoint("GET /projects/{project_id}/structure"),
        AudioClipNotFound => ErrorSpec::new(
            true,
            "Refresh timeline structure to get current audio clip IDs",
        )
        .with_action(RefreshIds)
        .with_endpoint("GET /projects/{project_id}/structure"),
        MarkerNotFound => ErrorSpec::new(
            true,
            "Refresh timeline structure to get current marker IDs",
        )
        .with_action(RefreshIds)
        .with_endpoint("GET /projects/{project_id}/structure"),
        OperationNotFound => {
            ErrorSpec::new(true, "Refresh operation history to get valid operation IDs")
                .with_action(RefreshIds)
                .with_endpoint("GET /projects/{project_id}/history")
        }
        InvalidTimeRange => ErrorSpec::new(
            false,
            "Ensure start_ms >= 0, duration_ms > 0, and in_point_ms < out_point_ms",
        ),
        OutOfBounds => ErrorSpec::new(
            false,
            "Check the allowed range in /capabilities and adjust the value",
        ),
        InvalidFieldValue => ErrorSpec::new(
            false,
            "Check the field's allowed values in /capabilities and correct the value",
        ),
        MissingRequiredField => {
            ErrorSpec::new(false, "Add the missing required field to your request")
        }
        InvalidClipType => ErrorSpec::new(
            false,
            "Use a clip with the required type for this operation (e.g., text clip for text style updates)",
        ),
        InvalidLayerType => ErrorSpec::new(false, "Use a valid layer type for this operation"),
        InvalidAssetType => {
            ErrorSpec::new(false, "Use an asset with a compatible type for this clip")
        }
        LayerLocked => ErrorSpec::new(
            false,
            "Unlock the layer before making changes, or use a different layer",
        ),
        DurationTooLong => ErrorSpec::new(
            false,
            "Reduce the duration to be within the maximum limit (check /capabilities)",
        ),
        TooManyClips => ErrorSpec::new(
            false,
            "Remove some clips from the layer before adding more",
        ),
        TooManyLayers => ErrorSpec::new(
            false,
            "Remove some layers from the project before adding more",
        ),
        ClipOverlap => ErrorSpec::new(
            false,
            "Adjust the clip timing to avoid overlapping with existing clips",
        ),
        ConcurrentModification => ErrorSpec::new(
            true,
            "Re-fetch the project structure, get the new version, and retry with the updated If-Match header",
        )
        .with_action(RefreshEtag)
        .with_endpoint("GET /projects/{project_id}/structure"),
        IdempotencyConflict => ErrorSpec::new(
            false,
            "Use a new unique Idempotency-Key for different request parameters",
        ),
        OperationInProgress => {
            ErrorSpec::new(true, "Wait for the current operation to complete, then retry")
                .with_action(WaitAndRetry)
                .with_parameters(serde_json::json!({ "delay_ms": 1000 }))
        }
        SemanticOperationFailed => ErrorSpec::new(
            false,
            "Check the error_message for details; common causes include missing target_clip_id, no previous/next clip to snap to, or layer not found",
        )
        .with_action(RefreshIds)
        .with_endpoint("GET /projects/{project_id}/structure"),
        FeatureNotSupported => {
            ErrorSpec::new(false, "Check /capabilities for supported features")
        }
        OperationNotSupported => {
            ErrorSpec::new(false, "Check /capabilities for supported operations")
        }
        RollbackNotAvailable => ErrorSpec::new(
            false,
            "This operation cannot be rolled back; manual correction is required",
        ),
        OperationAlreadyRolledBack => ErrorSpec::new(
            false,
            "This operation was already rolled back; no further action needed",
        ),
        RollbackFailed => ErrorSpec::new(true, "Wait a moment and retry the rollback operation")
            .with_action(RetryWithBackoff)
            .with_parameters(serde_json::json!({ "delay_ms": 1000, "max_retries": 2 })),
        Unauthorized => {
            ErrorSpec::new(false, "Provide a valid Authorization header with a Bearer token")
        }
        Forbidden => ErrorSpec::new(false, "You do not have permission to access this resource"),
        TokenExpired => ErrorSpec::new(true, "Refresh your authentication token and retry")
            .with_action(RefreshToken),
        RateLimited => ErrorSpec::new(true, "Wait and retry with exponential backoff")
            .with_action(RetryWithBackoff)
            .with_parameters(serde_json::json!({ "delay_ms": 1000, "max_retries": 3 })),
        InternalError => ErrorSpec::new(
            true,
            "Wait a moment and retry; if the problem persists, contact support",
        )
        .with_action(RetryWithBackoff)
        .with_parameters(serde_json::json!({ "delay_ms": 2000, "max_retries": 2 })),
        ServiceUnavailable => ErrorSpec::new(
            true,
            "The service is temporarily unavailable; retry after a short delay",
        )
        .with_action(RetryWithBackoff)
        .with_parameters(serde_json::json!({ "delay_ms": 5000, "max_retries": 3 })),
        DatabaseError => ErrorSpec::new(true, "Database operation failed; retry after a short delay")
            .with_action(RetryWithBackoff)
            .with_parameters(serde_json::json!({ "delay_ms": 2000, "max_retries": 2 })),
        StorageError => ErrorSpec::new(true, "Storage operation failed; retry after a short delay")
            .with_action(RetryWithBackoff)
            .with_parameters(serde_json::json!({ "delay_ms": 2000, "max_retries": 2 })),
        BadRequest => ErrorSpec::new(false, "Check the request format and parameters"),
        ValidationError => {
            ErrorSpec::new(false, "Fix the validation errors indicated in the error message")
        }
        NotFound => ErrorSpec::new(false, "Verify the resource path and ID are correct"),
        HttpError => ErrorSpec::new(
            false,
            "An unexpected HTTP error occurred; check the status code and message for details",
        ),
    }
}

/// The value every fallible core operation can return at its public
/// boundary: a code plus enough context to act on it, already enriched from
/// the taxonomy table so callers never need to consult `lookup` themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreError {
    pub code: ErrorCode,
    pub message: String,
    pub field: Option<String>,
    pub details: Option<Value>,
    pub retryable: bool,
    pub suggested_fix: String,
    pub suggested_action: Option<SuggestedAction>,
    pub suggested_endpoint: Option<String>,
    pub parameters: Option<Value>,
}

impl CoreError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let spec = lookup(code);
        Self {
            code,
            message: message.into(),
            field: None,
            details: None,
            retryable: spec.retryable,
            suggested_fix: spec.suggested_fix.to_string(),
            suggested_action: spec.suggested_action,
            suggested_endpoint: spec.suggested_endpoint.map(str::to_string),
            parameters: spec.parameters,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Substitute a concrete `project_id` into `{project_id}` in the
    /// suggested endpoint template, the way the suggestion generator (C9)
    /// does when it has the id in hand (spec.md §4.9).
    pub fn resolve_endpoint(mut self, project_id: &str) -> Self {
        if let Some(endpoint) = &self.suggested_endpoint {
            self.suggested_endpoint = Some(endpoint.replace("{project_id}", project_id));
        }
        self
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CoreError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_codes_are_retryable_with_refresh_ids() {
        for code in [
            ErrorCode::ProjectNotFound,
            ErrorCode::ClipNotFound,
            ErrorCode::LayerNotFound,
            ErrorCode::AssetNotFound,
        ] {
            let spec = lookup(code);
            assert!(spec.retryable, "{code} should be retryable");
            assert_eq!(spec.suggested_action, Some(SuggestedAction::RefreshIds));
        }
    }

    #[test]
    fn clip_overlap_is_not_retryable() {
        assert!(!lookup(ErrorCode::ClipOverlap).retryable);
    }

    #[test]
    fn concurrent_modification_suggests_refresh_etag() {
        let spec = lookup(ErrorCode::ConcurrentModification);
        assert!(spec.retryable);
        assert_eq!(spec.suggested_action, Some(SuggestedAction::RefreshEtag));
    }

    #[test]
    fn resolve_endpoint_substitutes_project_id() {
        let err = CoreError::new(ErrorCode::ClipNotFound, "no such clip")
            .resolve_endpoint("proj-123");
        assert_eq!(
            err.suggested_endpoint.as_deref(),
            Some("GET /projects/proj-123/structure")
        );
    }

    #[test]
    fn wire_codes_match_spec_strings() {
        assert_eq!(ErrorCode::ClipOverlap.as_str(), "CLIP_OVERLAP");
        assert_eq!(
            ErrorCode::OperationAlreadyRolledBack.as_str(),
            "OPERATION_ALREADY_ROLLED_BACK"
        );
    }
}
