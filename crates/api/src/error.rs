use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    /// The weather, geocoding or feed service failed.
    Upstream(String),
    Internal(String),
}

impl From<nimbus_core::Error> for ApiError {
    fn from(err: nimbus_core::Error) -> Self {
        use nimbus_core::Error;
        match err {
            Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::Transport(msg) | Error::Parse(msg) => ApiError::Upstream(msg),
            Error::Persistence(msg) | Error::Config(msg) => ApiError::Internal(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "invalid_request", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Upstream(msg) => {
                tracing::warn!(error = %msg, "upstream failure");
                (
                    StatusCode::BAD_GATEWAY,
                    "upstream_unavailable",
                    "Weather service is temporarily unavailable".to_string(),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Unexpected error".to_string(),
                )
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: ErrorBody {
                    code: code.to_string(),
                    message,
                },
            }),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_bad_request_response() {
        let (status, json) = body_of(ApiError::BadRequest("missing location".to_string())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "invalid_request");
        assert_eq!(json["error"]["message"], "missing location");
    }

    #[tokio::test]
    async fn test_unauthorized_response() {
        let (status, json) = body_of(ApiError::Unauthorized("missing X-User-Id header".to_string())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"]["code"], "unauthorized");
    }

    #[tokio::test]
    async fn test_forbidden_response() {
        let (status, json) = body_of(ApiError::Forbidden("admins only".to_string())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["error"]["code"], "forbidden");
        assert_eq!(json["error"]["message"], "admins only");
    }

    #[tokio::test]
    async fn test_upstream_details_are_hidden() {
        let (status, json) = body_of(ApiError::Upstream("HTTP 503 from api.weather.gov".to_string())).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["error"]["code"], "upstream_unavailable");
        assert!(!json["error"]["message"].as_str().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_internal_error_response() {
        let (status, json) = body_of(ApiError::Internal("disk full".to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"]["message"], "Unexpected error");
    }

    #[test]
    fn test_core_error_mapping() {
        use nimbus_core::Error;
        assert!(matches!(
            ApiError::from(Error::InvalidInput(String::new())),
            ApiError::BadRequest(_)
        ));
        assert!(matches!(
            ApiError::from(Error::NotFound(String::new())),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from(Error::Transport(String::new())),
            ApiError::Upstream(_)
        ));
        assert!(matches!(
            ApiError::from(Error::Parse(String::new())),
            ApiError::Upstream(_)
        ));
        assert!(matches!(
            ApiError::from(Error::Persistence(String::new())),
            ApiError::Internal(_)
        ));
        assert!(matches!(
            ApiError::from(Error::Config(String::new())),
            ApiError::Internal(_)
        ));
    }
}
