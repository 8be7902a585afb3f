pub mod company_routes;
pub mod contact_routes;
pub mod credentials_routes;
pub mod dispatch_routes;
pub mod instance_routes;
pub mod list_routes;
pub mod places_routes;

use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};

/// Wraps a generated file as a download.
pub(crate) fn attachment(content_type: &'static str, filename: &str, body: String) -> Response {
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response()
}
