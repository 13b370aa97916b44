//! Request-id propagation.
//!
//! Every request gets a correlation id: the caller's `x-request-id` if one
//! came in, a fresh UUID otherwise. The id is visible to downstream handlers
//! on the request and echoed back on the response so the console and the
//! service logs can be lined up.

use axum::http::{HeaderName, HeaderValue};
use axum::{extract::Request, middleware::Next, response::Response};
use uuid::Uuid;

pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

fn request_id_of(req: &Request) -> String {
    req.headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = request_id_of(&req);

    // A caller-supplied id can still be junk bytes; a value that does not
    // form a valid header is dropped, never a reason to reject the request.
    let header_value = HeaderValue::from_str(&request_id).ok();

    if let Some(value) = &header_value {
        req.headers_mut().insert(&REQUEST_ID_HEADER, value.clone());
    }

    let mut response = next.run(req).await;

    if let Some(value) = header_value {
        response.headers_mut().insert(&REQUEST_ID_HEADER, value);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_incoming_id_is_kept() {
        let req = Request::builder()
            .header(&REQUEST_ID_HEADER, "abc-123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(request_id_of(&req), "abc-123");
    }

    #[test]
    fn test_missing_id_gets_generated() {
        let req = Request::builder().body(Body::empty()).unwrap();
        let id = request_id_of(&req);
        assert!(id.parse::<Uuid>().is_ok());
    }
}
