use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

use crate::auth::{AuthError, Role};
use crate::core::TerritoryError;
use crate::import::ImportError;

pub type ApiResult<T> = Result<T, ApiProblem>;

/// RFC 7807 error body (`application/problem+json`).
#[derive(Debug)]
pub struct ApiProblem {
    status: StatusCode,
    title: &'static str,
    detail: String,
    kind: &'static str,
    correlation_id: String,
}

impl ApiProblem {
    pub fn from_domain(error: TerritoryError) -> Self {
        match error {
            TerritoryError::InvalidArgument(detail) => Self::bad_request(detail),
            err @ TerritoryError::NotFound(_) => Self::new(
                StatusCode::NOT_FOUND,
                "Not found",
                "https://territory-tracker.dev/problems/not-found",
                err.to_string(),
            ),
            TerritoryError::Conflict(detail) => Self::new(
                StatusCode::CONFLICT,
                "Conflict",
                "https://territory-tracker.dev/problems/conflict",
                detail,
            ),
            TerritoryError::Storage(detail) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Storage error",
                "https://territory-tracker.dev/problems/storage",
                detail,
            ),
        }
    }

    pub fn from_import(error: ImportError) -> Self {
        match error {
            ImportError::Territory(err) => Self::from_domain(err),
            err @ ImportError::Io { .. } => Self::internal(err.to_string()),
            err => Self::bad_request(err.to_string()),
        }
    }

    pub fn from_auth(error: AuthError) -> Self {
        match error {
            AuthError::Hash(detail) => Self::internal(detail),
            err => Self::bad_request(err.to_string()),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "Validation failed",
            "https://territory-tracker.dev/problems/validation",
            detail,
        )
    }

    pub fn forbidden(role: Role) -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            "Forbidden",
            "https://territory-tracker.dev/problems/forbidden",
            format!("role '{}' may not change territories", role),
        )
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
            "https://territory-tracker.dev/problems/internal",
            detail,
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    fn new(
        status: StatusCode,
        title: &'static str,
        kind: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            status,
            title,
            detail: detail.into(),
            kind,
            correlation_id: Uuid::new_v4().to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ProblemDetails {
    #[serde(rename = "type")]
    kind: String,
    title: String,
    status: u16,
    detail: String,
    correlation_id: String,
}

impl IntoResponse for ApiProblem {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(
                correlation_id = %self.correlation_id,
                status = self.status.as_u16(),
                detail = %self.detail,
                "request failed"
            );
        }

        let payload = ProblemDetails {
            kind: self.kind.to_string(),
            title: self.title.to_string(),
            status: self.status.as_u16(),
            detail: self.detail,
            correlation_id: self.correlation_id,
        };

        let mut response = (self.status, Json(payload)).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TerritoryId;

    #[test]
    fn domain_errors_map_to_status_codes() {
        let id = TerritoryId::new(3).unwrap();
        let cases = [
            (TerritoryError::NotFound(id), StatusCode::NOT_FOUND),
            (TerritoryError::invalid("bad"), StatusCode::BAD_REQUEST),
            (TerritoryError::conflict("free"), StatusCode::CONFLICT),
            (TerritoryError::storage("disk"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiProblem::from_domain(err).status(), status);
        }
    }

    #[test]
    fn import_errors_map_to_status_codes() {
        assert_eq!(
            ApiProblem::from_import(ImportError::EmptyUpload).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiProblem::from_import(ImportError::Territory(TerritoryError::NotFound(
                TerritoryId::new(1).unwrap()
            )))
            .status(),
            StatusCode::NOT_FOUND
        );
    }
}
