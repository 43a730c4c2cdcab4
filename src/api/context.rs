use crate::protocol::InvocationContext;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use std::convert::Infallible;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ARN_HEADER: &str = "x-user-arn";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Caller identity as set by the hosting platform's headers
#[async_trait]
impl<S> FromRequestParts<S> for InvocationContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(InvocationContext::new(
            header(&parts.headers, USER_ID_HEADER),
            header(&parts.headers, USER_ARN_HEADER),
            header(&parts.headers, REQUEST_ID_HEADER),
        ))
    }
}
