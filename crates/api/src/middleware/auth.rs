use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use nimbus_core::admins::AdminList;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

pub const USER_ID_HEADER: &str = "X-User-Id";

/// Caller identity. The chat platform user id is forwarded by the gateway in
/// front of this service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    pub user_id: String,
    pub is_admin: bool,
}

impl UserContext {
    pub fn require_admin(&self) -> ApiResult<()> {
        if self.is_admin {
            Ok(())
        } else {
            Err(ApiError::Forbidden(
                "only administrators can manage alert feeds".to_string(),
            ))
        }
    }
}

pub async fn user_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let context = resolve_user(req.headers(), &state.admins)?;
    req.extensions_mut().insert(context);
    Ok(next.run(req).await)
}

fn resolve_user(headers: &HeaderMap, admins: &AdminList) -> ApiResult<UserContext> {
    let user_id = headers
        .get(USER_ID_HEADER)
        .ok_or_else(|| ApiError::Unauthorized("missing X-User-Id header".to_string()))?
        .to_str()
        .map_err(|_| ApiError::Unauthorized("invalid X-User-Id header".to_string()))?
        .trim();

    if user_id.is_empty() {
        return Err(ApiError::Unauthorized("invalid X-User-Id header".to_string()));
    }

    Ok(UserContext {
        user_id: user_id.to_string(),
        is_admin: admins.is_admin(user_id),
    })
}
