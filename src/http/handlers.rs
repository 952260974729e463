//! Route handlers.
//!
//! Status mapping for `/optimize-schedule`:
//!
//! | Outcome | Status | `error_kind` |
//! |---|---|---|
//! | schedule produced | 200 | - |
//! | invalid input | 400 | `validation` |
//! | no feasible schedule | 200 (`success: false`) | `infeasible` |
//! | time ceiling hit | 504 | `timeout` |
//! | internal fault | 500 | `internal` |

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::OptimizationError;
use crate::materializer::ScheduleStats;
use crate::models::{Assignment, Violation};
use crate::sandbox::ScriptRequest;
use crate::service::{OptimizeRequest, ScheduleResult};
use crate::solver::SolverStatus;
use crate::validation::ValidationError;

use super::ApiState;

/// Body of `/optimize-schedule` responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeResponse {
    pub success: bool,
    pub schedule: Vec<Assignment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solver_status: Option<SolverStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ScheduleStats>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    /// Constraint group blamed for an infeasible request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint_group: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_errors: Vec<ValidationError>,
}

impl From<ScheduleResult> for OptimizeResponse {
    fn from(result: ScheduleResult) -> Self {
        Self {
            success: true,
            schedule: result.schedule.assignments,
            solver_status: Some(result.status),
            stats: Some(result.stats),
            violations: result.schedule.violations,
            warnings: result.warnings,
            error: None,
            error_kind: None,
            constraint_group: None,
            validation_errors: Vec::new(),
        }
    }
}

impl OptimizeResponse {
    fn failure(error: &OptimizationError) -> Self {
        Self {
            success: false,
            schedule: Vec::new(),
            solver_status: matches!(error, OptimizationError::Infeasible { .. })
                .then_some(SolverStatus::Infeasible),
            stats: None,
            violations: Vec::new(),
            warnings: Vec::new(),
            error: Some(error.to_string()),
            error_kind: Some(error.kind().to_string()),
            constraint_group: match error {
                OptimizationError::Infeasible { constraint_group, .. } => {
                    Some(constraint_group.clone())
                }
                _ => None,
            },
            validation_errors: match error {
                OptimizationError::Validation(errors) => errors.clone(),
                _ => Vec::new(),
            },
        }
    }
}

/// HTTP status for a failed optimization.
pub fn status_for(error: &OptimizationError) -> StatusCode {
    match error {
        OptimizationError::Validation(_) => StatusCode::BAD_REQUEST,
        OptimizationError::Infeasible { .. } => StatusCode::OK,
        OptimizationError::TimeoutExceeded { .. } => StatusCode::GATEWAY_TIMEOUT,
        OptimizationError::InternalSolver { .. } | OptimizationError::Sandbox(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for OptimizationError {
    fn into_response(self) -> Response {
        (status_for(&self), Json(OptimizeResponse::failure(&self))).into_response()
    }
}

/// Body of `/health` responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `healthy` or `unhealthy`.
    pub status: String,
    /// Solver availability; the name is what the dashboard expects.
    pub ortools_available: bool,
    pub timestamp: DateTime<Utc>,
}

/// POST /optimize-schedule
pub async fn optimize_schedule(
    State(state): State<ApiState>,
    Json(request): Json<OptimizeRequest>,
) -> Result<Json<OptimizeResponse>, OptimizationError> {
    let result = state.service.optimize(request).await?;
    Ok(Json(result.into()))
}

/// POST /execute-optimization
///
/// Script failures come back as `success: false` with status 200.
pub async fn execute_optimization(
    State(state): State<ApiState>,
    Json(request): Json<ScriptRequest>,
) -> impl IntoResponse {
    Json(state.service.execute_custom_script(request).await)
}

/// GET /health
pub async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let healthy = state.service.health().await;
    let body = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        ortools_available: healthy,
        timestamp: Utc::now(),
    };
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&OptimizationError::Validation(vec![])), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&OptimizationError::Infeasible {
                constraint_group: "deadline".into(),
                message: String::new()
            }),
            StatusCode::OK
        );
        assert_eq!(
            status_for(&OptimizationError::TimeoutExceeded {
                limit: Duration::from_secs(1)
            }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&OptimizationError::InternalSolver {
                message: "boom".into(),
                fingerprint: "abc".into()
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_failure_body() {
        let err = OptimizationError::Infeasible {
            constraint_group: "machine_capacity".into(),
            message: "no oven".into(),
        };
        let body = serde_json::to_value(OptimizeResponse::failure(&err)).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error_kind"], "infeasible");
        assert_eq!(body["solver_status"], "infeasible");
        assert_eq!(body["constraint_group"], "machine_capacity");
        assert_eq!(body["schedule"].as_array().map(Vec::len), Some(0));
        assert!(body.get("stats").is_none());
    }
}
