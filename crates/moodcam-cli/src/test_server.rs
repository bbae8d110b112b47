//! Local axum server for exercising the HTTP clients.

use axum::http::{header, StatusCode};
use axum::Router;

/// Serve `app` on an ephemeral port and return its base URL.
pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// A fixed response with a JSON content type.
pub fn json(
    status: StatusCode,
    body: &'static str,
) -> (StatusCode, [(header::HeaderName, &'static str); 1], &'static str) {
    (status, [(header::CONTENT_TYPE, "application/json")], body)
}
