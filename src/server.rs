//! HTTP front end
//!
//! `GET /<target>` reads the target URL; request headers select the output
//! mode and scraping constraints. Published screenshots are served back from
//! `/instant-screenshots/{filename}`.

use crate::{
    ReadOutcome, ReaderError, ReaderResponse, ReaderService, RawRequestOptions, RequestOptions,
    ResponseMode, ScreenshotSink, SCREENSHOT_ROUTE_PREFIX,
};
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const TEXT_HTML: &str = "text/html";

pub const RESPOND_WITH_HEADER: &str = "x-respond-with";
pub const TIMEOUT_HEADER: &str = "x-timeout";
pub const USER_AGENT_HEADER: &str = "x-user-agent";
pub const WAIT_FOR_SELECTOR_HEADER: &str = "x-wait-for-selector";

pub const USAGE: &str = "page-reader\n\n\
Endpoints:\n\
- GET /<url> - Fetch and convert URL\n\
- GET /instant-screenshots/<file> - Retrieve a published screenshot\n\n\
Headers:\n\
- X-Respond-With: markdown|html|text|screenshot|pageshot\n\
- X-Timeout: navigation timeout in milliseconds\n\
- X-User-Agent: user agent override\n\
- X-Wait-For-Selector: CSS selector to wait for (repeatable)\n";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ReaderService>,
    /// Absolute base for screenshot redirects; derived from `Host` when unset.
    pub public_base_url: Option<String>,
    pub metrics: Option<PrometheusHandle>,
}

pub fn router(state: AppState) -> Router {
    let mut router = Router::new().route(
        &format!("{SCREENSHOT_ROUTE_PREFIX}/{{filename}}"),
        get(get_screenshot),
    );

    if state.metrics.is_some() {
        router = router.route("/metrics", get(get_metrics));
    }

    router
        .fallback(read_target)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: AppState, bind: &str, port: u16) -> Result<(), ReaderError> {
    let listener = tokio::net::TcpListener::bind((bind, port)).await?;
    info!("Reader service listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Collects the reader headers exactly as sent.
pub fn raw_options_from_headers(headers: &HeaderMap) -> RawRequestOptions {
    let single = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };

    RawRequestOptions {
        respond_with: single(RESPOND_WITH_HEADER),
        timeout: single(TIMEOUT_HEADER),
        user_agent: single(USER_AGENT_HEADER),
        wait_for_selector: headers
            .get_all(WAIT_FOR_SELECTOR_HEADER)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(str::to_string)
            .collect(),
    }
}

async fn get_screenshot(State(state): State<AppState>, Path(filename): Path<String>) -> Response {
    match state.service.sink().get(&filename).await {
        Ok(Some(bytes)) => {
            let content_type = image_content_type(&bytes);
            ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
        Ok(None) => not_found(),
        Err(e) => {
            error!(filename = %filename, error = %e, "Failed to load screenshot");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn get_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn read_target(State(state): State<AppState>, uri: Uri, headers: HeaderMap) -> Response {
    let path = uri.path();
    if path.starts_with(&format!("{SCREENSHOT_ROUTE_PREFIX}/")) {
        return not_found();
    }

    let target = path.strip_prefix('/').unwrap_or(path);
    if target.is_empty() || target == "favicon.ico" {
        return text_response(StatusCode::OK, TEXT_PLAIN, USAGE.to_string());
    }

    let target = match uri.query() {
        Some(query) => format!("{target}?{query}"),
        None => target.to_string(),
    };
    let options = RequestOptions::from(raw_options_from_headers(&headers));

    match state.service.read(&target, &options).await {
        Ok(ReadOutcome::Rendered(response)) => {
            let base = public_base(&state, &headers);
            respond(response, options.mode, &base)
        }
        Ok(ReadOutcome::Failed(message)) => {
            text_response(StatusCode::BAD_GATEWAY, TEXT_PLAIN, message)
        }
        Err(ReaderError::InvalidUrl(reason)) => {
            info!(url = %target, reason = %reason, "Rejected target");
            text_response(StatusCode::BAD_REQUEST, TEXT_PLAIN, "Invalid URL".to_string())
        }
        Err(e) => {
            error!(url = %target, error = %e, "Read failed");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, TEXT_PLAIN, e.to_string())
        }
    }
}

fn respond(response: ReaderResponse, mode: ResponseMode, base: &str) -> Response {
    if let Some(reference) = response.screenshot_reference() {
        let location = format!("{base}{reference}");
        return (StatusCode::FOUND, [(header::LOCATION, location)]).into_response();
    }

    if let Some(body) = response.text_body() {
        let content_type = if mode == ResponseMode::Html {
            TEXT_HTML
        } else {
            TEXT_PLAIN
        };
        return text_response(StatusCode::OK, content_type, body.to_string());
    }

    match response.to_json() {
        Ok(json) => text_response(StatusCode::OK, TEXT_PLAIN, json),
        Err(e) => text_response(StatusCode::INTERNAL_SERVER_ERROR, TEXT_PLAIN, e.to_string()),
    }
}

pub(crate) fn public_base(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(base) = &state.public_base_url {
        return base.trim_end_matches('/').to_string();
    }
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{host}")
}

fn image_content_type(bytes: &[u8]) -> &'static str {
    use image::ImageFormat;

    match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::WebP) => "image/webp",
        Ok(ImageFormat::Gif) => "image/gif",
        _ => "image/png",
    }
}

fn text_response(status: StatusCode, content_type: &'static str, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, content_type)], body).into_response()
}

fn not_found() -> Response {
    text_response(
        StatusCode::NOT_FOUND,
        TEXT_PLAIN,
        "Screenshot not found".to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MockPageDriver, MockSessionProvider};
    use crate::{MemoryScreenshotStore, Metrics, PageReader, RawDocument, SessionHandle};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];

    fn page_driver() -> MockPageDriver {
        let mut driver = MockPageDriver::new();
        driver.expect_reset_user_agent().returning(|| Ok(()));
        driver.expect_set_user_agent().returning(|_| Ok(()));
        driver.expect_wait_for_selector().returning(|_, _| Ok(()));
        driver.expect_navigate().returning(|url| {
            if url.contains("unreachable") {
                Err(ReaderError::NavigationFailed("net::ERR_CONNECTION_REFUSED".into()))
            } else {
                Ok(())
            }
        });
        driver.expect_extract_document().returning(|| {
            Ok(RawDocument {
                title: "Example".to_string(),
                href: "https://example.com/".to_string(),
                html: "<html><body><h2>Hello</h2><p>World</p></body></html>".to_string(),
                text: "Hello\nWorld".to_string(),
            })
        });
        driver
            .expect_capture_screenshot()
            .returning(|_| Ok(PNG_MAGIC.to_vec()));
        driver
    }

    fn state_with(store: Arc<MemoryScreenshotStore>, public_base_url: Option<String>) -> AppState {
        let handle: SessionHandle = Arc::new(page_driver());
        let mut session = MockSessionProvider::new();
        session
            .expect_ensure_ready()
            .returning(move || Ok(handle.clone()));

        let reader = Arc::new(PageReader::new(Arc::new(session)));
        let service = ReaderService::new(reader, store, Arc::new(Metrics::noop()));
        AppState {
            service: Arc::new(service),
            public_base_url,
            metrics: None,
        }
    }

    fn app() -> Router {
        router(state_with(Arc::new(MemoryScreenshotStore::new()), None))
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn get(uri: &str) -> axum::http::request::Builder {
        Request::builder().uri(uri).header(header::HOST, "reader.local")
    }

    #[tokio::test]
    async fn test_usage_on_root_and_favicon() {
        for uri in ["/", "/favicon.ico"] {
            let response = app()
                .oneshot(get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(body_string(response).await.contains("X-Respond-With"));
        }
    }

    #[tokio::test]
    async fn test_markdown_is_default() {
        let response = app()
            .oneshot(get("/https://example.com").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], TEXT_PLAIN);
        assert_eq!(
            body_string(response).await,
            "# Example\n\nWorld\n\n\n## Hello\n\n"
        );
    }

    #[tokio::test]
    async fn test_html_mode_content_type() {
        let response = app()
            .oneshot(
                get("/example.com")
                    .header("X-Respond-With", "html")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()[header::CONTENT_TYPE], TEXT_HTML);
        assert!(body_string(response).await.contains("<h2>Hello</h2>"));
    }

    #[tokio::test]
    async fn test_invalid_url_is_bad_request() {
        let response = app()
            .oneshot(get("/httpx://example.com/file").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_string(response).await, "Invalid URL");
    }

    #[tokio::test]
    async fn test_navigation_failure_is_bad_gateway() {
        let response = app()
            .oneshot(get("/https://unreachable.test/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_string(response).await, "net::ERR_CONNECTION_REFUSED");
    }

    #[tokio::test]
    async fn test_screenshot_redirect_and_retrieval() {
        let store = Arc::new(MemoryScreenshotStore::new());
        let app = router(state_with(store.clone(), None));

        let response = app
            .clone()
            .oneshot(
                get("/https://example.com")
                    .header("X-Respond-With", "screenshot")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response.headers()[header::LOCATION].to_str().unwrap().to_string();
        assert!(location.starts_with("http://reader.local/instant-screenshots/"));
        assert_eq!(store.len(), 1);

        let path = location.trim_start_matches("http://reader.local");
        let image = app
            .oneshot(get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(image.status(), StatusCode::OK);
        assert_eq!(image.headers()[header::CONTENT_TYPE], "image/png");
        let bytes = to_bytes(image.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes.as_ref(), PNG_MAGIC);
    }

    #[tokio::test]
    async fn test_pageshot_uses_public_base_url() {
        let store = Arc::new(MemoryScreenshotStore::new());
        let app = router(state_with(
            store,
            Some("https://reader.example.org/".to_string()),
        ));

        let response = app
            .oneshot(
                get("/example.com")
                    .header("X-Respond-With", "pageshot")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("https://reader.example.org/instant-screenshots/"));
    }

    #[tokio::test]
    async fn test_missing_screenshot_is_not_found() {
        let response = app()
            .oneshot(
                get("/instant-screenshots/missing.png")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_string(response).await, "Screenshot not found");
    }

    #[tokio::test]
    async fn test_screenshot_served_from_sink() {
        let store = Arc::new(MemoryScreenshotStore::new());
        let id = store.put(PNG_MAGIC.to_vec()).await.unwrap();
        let app = router(state_with(store, None));

        let response = app
            .oneshot(
                get(&format!("/instant-screenshots/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_raw_options_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-respond-with", "text".parse().unwrap());
        headers.insert("x-timeout", "1500".parse().unwrap());
        headers.insert("x-user-agent", "bot/2".parse().unwrap());
        headers.append("x-wait-for-selector", "#a".parse().unwrap());
        headers.append("x-wait-for-selector", ".b, .c".parse().unwrap());

        let raw = raw_options_from_headers(&headers);
        assert_eq!(raw.respond_with.as_deref(), Some("text"));
        assert_eq!(raw.timeout.as_deref(), Some("1500"));
        assert_eq!(raw.user_agent.as_deref(), Some("bot/2"));
        assert_eq!(raw.wait_for_selector, vec!["#a", ".b, .c"]);
    }
}
