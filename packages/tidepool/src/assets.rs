//! Bundled chat page served from the binary.
//!
//! The page is embedded at compile time, so `tide serve` finds it from
//! any working directory. A configured `server.static_dir` bypasses this
//! module entirely.

use axum::{
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use rust_embed::Embed;

/// Chat client assets compiled in from `public/`.
#[derive(Embed)]
#[folder = "public/"]
struct Assets;

/// Serve one embedded asset; the root path maps to the chat page.
pub async fn serve_asset(req: Request<Body>) -> Response<Body> {
    let path = req.uri().path().trim_start_matches('/');
    let path = if path.is_empty() { "index.html" } else { path };
    serve_file(path)
}

fn serve_file(path: &str) -> Response<Body> {
    if let Some(content) = Assets::get(path) {
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, mime.as_ref())
            .body(Body::from(content.data.into_owned()))
            .unwrap_or_else(|_| not_found_response())
    } else {
        not_found_response()
    }
}

/// Helper to create a 404 response without unwrap
fn not_found_response() -> Response<Body> {
    let mut response = Response::new(Body::from("Not Found"));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_chat_page_is_embedded() {
        assert!(Assets::get("index.html").is_some());
    }

    #[tokio::test]
    async fn root_serves_the_chat_page() {
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = serve_asset(req).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok()),
            Some("text/html")
        );
    }

    #[tokio::test]
    async fn the_page_is_reachable_by_name() {
        let req = Request::builder()
            .uri("/index.html")
            .body(Body::empty())
            .unwrap();
        let response = serve_asset(req).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_assets_are_not_found() {
        let req = Request::builder()
            .uri("/missing.js")
            .body(Body::empty())
            .unwrap();
        let response = serve_asset(req).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
