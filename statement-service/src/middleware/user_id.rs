use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "X-User-ID";
pub const USER_ROLE_HEADER: &str = "X-User-Role";

/// Caller identity forwarded by the upstream identity layer.
///
/// The gateway authenticates the user and sets `X-User-ID`; this service only
/// parses it. Missing or malformed ids are rejected with 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!("Missing X-User-ID header"))
            })?;

        let user_id = Uuid::parse_str(raw.trim()).map_err(|_| {
            AppError::Unauthorized(anyhow::anyhow!("X-User-ID header is not a valid UUID"))
        })?;

        // Add to tracing span for observability
        tracing::Span::current().record("user_id", tracing::field::display(user_id));

        Ok(UserId(user_id))
    }
}

/// A caller whose forwarded role is `admin`; anyone else gets 403.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let UserId(user_id) = UserId::from_request_parts(parts, state).await?;

        let is_admin = parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|role| role.trim().eq_ignore_ascii_case("admin"))
            .unwrap_or(false);

        if !is_admin {
            tracing::warn!(user_id = %user_id, "Non-admin caller rejected from admin route");
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "Administrator privileges required"
            )));
        }

        Ok(AdminUser(user_id))
    }
}
