use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::EngineError;

/// Ambient learner identity. Upstream auth has already resolved the
/// session credential; handlers only ever see the opaque id it mapped to.
#[derive(Debug, Clone)]
pub struct Learner(pub String);

pub const LEARNER_HEADER: &str = "x-learner-id";

#[async_trait]
impl<S> FromRequestParts<S> for Learner
where
    S: Send + Sync,
{
    type Rejection = EngineError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(LEARNER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(EngineError::Unauthorized)?;
        Ok(Learner(id.to_string()))
    }
}
