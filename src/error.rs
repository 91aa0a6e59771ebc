use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("course is not published")]
    NotPublished,
    #[error("not enrolled in this course")]
    NotEnrolled,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("no lecture selected")]
    NoLectureSelected,
    #[error("course is not complete")]
    CourseIncomplete,
    #[error("missing learner credential")]
    Unauthorized,
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl EngineError {
    /// Stable machine-readable code; the UI routes on this (e.g. to the
    /// purchase flow for `not_enrolled`).
    pub fn reason(&self) -> &'static str {
        match self {
            EngineError::NotPublished => "not_published",
            EngineError::NotEnrolled => "not_enrolled",
            EngineError::NotFound(_) => "not_found",
            EngineError::NoLectureSelected => "no_lecture_selected",
            EngineError::CourseIncomplete => "course_incomplete",
            EngineError::Unauthorized => "unauthorized",
            EngineError::StoreUnavailable(_) => "store_unavailable",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            EngineError::NotPublished | EngineError::NotEnrolled => StatusCode::FORBIDDEN,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::NoLectureSelected | EngineError::CourseIncomplete => StatusCode::CONFLICT,
            EngineError::Unauthorized => StatusCode::UNAUTHORIZED,
            EngineError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        match &self {
            // referential mismatches are data errors, never swallowed
            EngineError::NotFound(what) => tracing::error!(entity = %what, "referential lookup failed"),
            EngineError::StoreUnavailable(detail) => tracing::error!(%detail, "store unavailable"),
            _ => {}
        }
        let body = json!({ "error": self.to_string(), "reason": self.reason() });
        (self.status(), Json(body)).into_response()
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => EngineError::NotFound("row"),
            other => EngineError::StoreUnavailable(other.to_string()),
        }
    }
}
