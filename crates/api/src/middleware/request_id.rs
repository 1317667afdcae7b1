use axum::{body::Body, http::Request, middleware::Next, response::Response};
use nanoid::nanoid;
use tracing::Instrument;

/// Tags every request with a `req_` id: handler logs run inside a span that
/// carries it and the response echoes it in `X-Request-Id`.
pub async fn request_id(req: Request<Body>, next: Next) -> Response {
    let request_id = format!("req_{}", nanoid!(16));
    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    let mut resp = next.run(req).instrument(span.clone()).await;
    if let Ok(value) = request_id.parse() {
        resp.headers_mut().insert("X-Request-Id", value);
    }
    span.in_scope(|| tracing::info!(status = resp.status().as_u16(), "request complete"));
    resp
}
