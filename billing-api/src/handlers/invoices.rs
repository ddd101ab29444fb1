use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{HeaderMap, Method, Uri},
    response::Response,
    Extension,
};
use service_core::middleware::tracing::RequestId;

use crate::AppState;

/// Fallback handler: every request outside the operational endpoints goes
/// through the gateway pipeline.
///
/// A body the server refuses to read is handed over as-is so the gateway
/// still authenticates first and answers with CORS headers.
pub async fn dispatch(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    request_id: Option<Extension<RequestId>>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let request_id = request_id.map(|Extension(id)| id.0);
    state
        .gateway
        .handle(method, uri.path(), &headers, body, request_id.as_deref())
        .await
}
