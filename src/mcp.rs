//! MCP tool surface
//!
//! A JSON-RPC 2.0 endpoint speaking the tool subset of the Model Context
//! Protocol: `initialize`, `tools/list` and `tools/call`. Each tool reads one
//! URL through [`ReaderService::read`] in a fixed [`ResponseMode`]. Tool
//! failures are reported in-band as `isError` results; only protocol errors
//! use JSON-RPC error objects.

use crate::server::public_base;
use crate::{AppState, RawRequestOptions, ReadOutcome, ReaderError, RequestOptions, ResponseMode};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
pub const MCP_SERVER_NAME: &str = "page-reader-mcp";

const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const INTERNAL_ERROR: i64 = -32603;

/// One tool per output mode.
pub struct ReaderTool {
    pub name: &'static str,
    pub mode: ResponseMode,
    pub description: &'static str,
    url_description: &'static str,
}

pub const READER_TOOLS: [ReaderTool; 5] = [
    ReaderTool {
        name: "get_markdown",
        mode: ResponseMode::Markdown,
        description: "Convert a URL to markdown: the title, then paragraphs, links and headings of the rendered page.",
        url_description: "The URL to fetch and convert to markdown",
    },
    ReaderTool {
        name: "get_html",
        mode: ResponseMode::Html,
        description: "Fetch a URL and return documentElement.outerHTML after rendering.",
        url_description: "The URL to fetch and convert to HTML",
    },
    ReaderTool {
        name: "get_text",
        mode: ResponseMode::Text,
        description: "Fetch a URL and return document.body.innerText after rendering.",
        url_description: "The URL to fetch and convert to text",
    },
    ReaderTool {
        name: "get_screenshot",
        mode: ResponseMode::Screenshot,
        description: "Take a screen-size screenshot of a URL. Returns the URL of the screenshot image.",
        url_description: "The URL to screenshot",
    },
    ReaderTool {
        name: "get_pageshot",
        mode: ResponseMode::Pageshot,
        description: "Take a full-page screenshot of a URL. Returns the URL of the full-page screenshot image.",
        url_description: "The URL to take a full-page screenshot of",
    },
];

pub fn tool_mode(name: &str) -> Option<ResponseMode> {
    READER_TOOLS
        .iter()
        .find(|tool| tool.name == name)
        .map(|tool| tool.mode)
}

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    method: String,
    #[serde(default)]
    params: Value,
    /// Absent for notifications.
    #[serde(default)]
    id: Option<Value>,
}

pub fn mcp_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(server_info).post(rpc_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve_mcp(state: AppState, bind: &str, port: u16) -> Result<(), ReaderError> {
    let listener = tokio::net::TcpListener::bind((bind, port)).await?;
    info!("MCP tool server listening on {}", listener.local_addr()?);

    axum::serve(listener, mcp_router(state)).await?;
    Ok(())
}

async fn server_info() -> Json<Value> {
    Json(json!({
        "name": MCP_SERVER_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "description": "MCP server reading web pages as markdown, html, text or screenshots",
    }))
}

async fn rpc_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<JsonRpcRequest>,
) -> Response {
    let Some(id) = request.id else {
        debug!(method = %request.method, "MCP notification");
        return StatusCode::ACCEPTED.into_response();
    };

    let result = match request.method.as_str() {
        "initialize" => Ok(json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": MCP_SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            },
        })),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({ "tools": tool_list() })),
        "tools/call" => call_tool(&state, &headers, &request.params).await,
        other => Err((METHOD_NOT_FOUND, format!("Method not found: {other}"))),
    };

    let body = match result {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err((code, message)) => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": code, "message": message },
        }),
    };
    Json(body).into_response()
}

fn tool_list() -> Vec<Value> {
    READER_TOOLS
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "url": { "type": "string", "description": tool.url_description }
                    },
                    "required": ["url"],
                },
            })
        })
        .collect()
}

async fn call_tool(
    state: &AppState,
    headers: &HeaderMap,
    params: &Value,
) -> Result<Value, (i64, String)> {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| (INVALID_PARAMS, "Missing tool name".to_string()))?;

    let Some(mode) = tool_mode(name) else {
        return Ok(tool_result(format!("Unknown tool: {name}"), true));
    };

    let url = params
        .get("arguments")
        .and_then(|arguments| arguments.get("url"))
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if url.is_empty() {
        return Ok(tool_result("Error: URL is required".to_string(), true));
    }

    let options = RequestOptions::from(RawRequestOptions {
        respond_with: Some(mode.as_str().to_string()),
        ..Default::default()
    });

    info!(tool = name, url = %url, "MCP tool call");
    let text = match state.service.read(url, &options).await {
        Ok(ReadOutcome::Rendered(response)) => {
            if let Some(reference) = response.screenshot_reference() {
                format!("{}{reference}", public_base(state, headers))
            } else if let Some(body) = response.text_body() {
                body.to_string()
            } else {
                response
                    .to_json()
                    .map_err(|e| (INTERNAL_ERROR, e.to_string()))?
            }
        }
        Ok(ReadOutcome::Failed(message)) => {
            warn!(tool = name, url = %url, error = %message, "MCP tool read failed");
            return Ok(tool_result(format!("Error: {message}"), true));
        }
        Err(e) => {
            warn!(tool = name, url = %url, error = %e, "MCP tool read failed");
            return Ok(tool_result(format!("Error: {e}"), true));
        }
    };

    Ok(tool_result(text, false))
}

fn tool_result(text: String, is_error: bool) -> Value {
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": is_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MockPageDriver, MockSessionProvider};
    use crate::{MemoryScreenshotStore, Metrics, PageReader, RawDocument, ReaderService, SessionHandle};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn page_driver() -> MockPageDriver {
        let mut driver = MockPageDriver::new();
        driver.expect_reset_user_agent().returning(|| Ok(()));
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
            .returning(|_| Ok(vec![0x89, b'P', b'N', b'G']));
        driver
    }

    fn app(store: Arc<MemoryScreenshotStore>) -> Router {
        let handle: SessionHandle = Arc::new(page_driver());
        let mut session = MockSessionProvider::new();
        session
            .expect_ensure_ready()
            .returning(move || Ok(handle.clone()));

        let reader = Arc::new(PageReader::new(Arc::new(session)));
        let service = ReaderService::new(reader, store, Arc::new(Metrics::noop()));
        mcp_router(AppState {
            service: Arc::new(service),
            public_base_url: None,
            metrics: None,
        })
    }

    async fn rpc(app: Router, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(header::HOST, "reader.local")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn call(id: u64, tool: &str, url: &str) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": { "name": tool, "arguments": { "url": url } },
        })
    }

    fn text_of(response: &Value) -> &str {
        response["result"]["content"][0]["text"].as_str().unwrap()
    }

    #[tokio::test]
    async fn test_initialize_reports_tools_capability() {
        let store = Arc::new(MemoryScreenshotStore::new());
        let (status, response) = rpc(
            app(store),
            json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {} }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["protocolVersion"], MCP_PROTOCOL_VERSION);
        assert_eq!(response["result"]["serverInfo"]["name"], MCP_SERVER_NAME);
        assert!(response["result"]["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn test_tools_list_has_one_tool_per_mode() {
        let store = Arc::new(MemoryScreenshotStore::new());
        let (_, response) = rpc(
            app(store),
            json!({ "jsonrpc": "2.0", "id": "list", "method": "tools/list" }),
        )
        .await;

        let names: Vec<&str> = response["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|tool| tool["name"].as_str().unwrap())
            .collect();
        assert_eq!(
            names,
            ["get_markdown", "get_html", "get_text", "get_screenshot", "get_pageshot"]
        );
        assert_eq!(response["id"], "list");
        assert_eq!(
            response["result"]["tools"][0]["inputSchema"]["required"],
            json!(["url"])
        );
    }

    #[test]
    fn test_tool_modes() {
        assert_eq!(tool_mode("get_markdown"), Some(ResponseMode::Markdown));
        assert_eq!(tool_mode("get_html"), Some(ResponseMode::Html));
        assert_eq!(tool_mode("get_text"), Some(ResponseMode::Text));
        assert_eq!(tool_mode("get_screenshot"), Some(ResponseMode::Screenshot));
        assert_eq!(tool_mode("get_pageshot"), Some(ResponseMode::Pageshot));
        assert_eq!(tool_mode("get_pdf"), None);
    }

    #[tokio::test]
    async fn test_text_tools_return_rendered_bodies() {
        let store = Arc::new(MemoryScreenshotStore::new());

        let (_, markdown) = rpc(app(store.clone()), call(1, "get_markdown", "example.com")).await;
        assert_eq!(text_of(&markdown), "# Example\n\nWorld\n\n\n## Hello\n\n");
        assert_eq!(markdown["result"]["isError"], false);

        let (_, html) = rpc(app(store.clone()), call(2, "get_html", "example.com")).await;
        assert!(text_of(&html).contains("<h2>Hello</h2>"));

        let (_, text) = rpc(app(store.clone()), call(3, "get_text", "example.com")).await;
        assert_eq!(text_of(&text), "Hello\nWorld");

        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_screenshot_tools_return_absolute_urls() {
        let store = Arc::new(MemoryScreenshotStore::new());

        for tool in ["get_screenshot", "get_pageshot"] {
            let (_, response) = rpc(app(store.clone()), call(7, tool, "https://example.com")).await;
            assert!(text_of(&response).starts_with("http://reader.local/instant-screenshots/"));
            assert_eq!(response["result"]["isError"], false);
        }
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_tool_failures_are_in_band() {
        let store = Arc::new(MemoryScreenshotStore::new());

        let (status, failed) = rpc(
            app(store.clone()),
            call(1, "get_text", "https://unreachable.test/"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(failed["result"]["isError"], true);
        assert_eq!(text_of(&failed), "Error: net::ERR_CONNECTION_REFUSED");

        let (_, missing) = rpc(app(store.clone()), call(2, "get_text", "  ")).await;
        assert_eq!(text_of(&missing), "Error: URL is required");

        let (_, unknown) = rpc(app(store.clone()), call(3, "get_pdf", "example.com")).await;
        assert_eq!(unknown["result"]["isError"], true);
        assert_eq!(text_of(&unknown), "Unknown tool: get_pdf");

        let (_, invalid) = rpc(app(store), call(4, "get_html", "httpx://example.com")).await;
        assert_eq!(invalid["result"]["isError"], true);
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let store = Arc::new(MemoryScreenshotStore::new());

        let (_, response) = rpc(
            app(store.clone()),
            json!({ "jsonrpc": "2.0", "id": 9, "method": "resources/list" }),
        )
        .await;
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);
        assert_eq!(response["error"]["message"], "Method not found: resources/list");

        let (_, response) = rpc(
            app(store),
            json!({ "jsonrpc": "2.0", "id": 10, "method": "tools/call", "params": {} }),
        )
        .await;
        assert_eq!(response["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_notifications_are_accepted_without_body() {
        let store = Arc::new(MemoryScreenshotStore::new());
        let (status, response) = rpc(
            app(store),
            json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(response.is_null());
    }

    #[tokio::test]
    async fn test_get_returns_server_info() {
        let store = Arc::new(MemoryScreenshotStore::new());
        let response = app(store)
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let info: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(info["name"], MCP_SERVER_NAME);
    }
}
