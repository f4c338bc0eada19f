//! # Page Reader
//!
//! Reads a single web page in headless Chrome and returns it in the
//! representation the caller asks for: markdown, raw HTML, visible text, or a
//! reference to a viewport or full-page screenshot.
//!
//! ## Pipeline
//!
//! 1. The target is normalized to an absolute http(s) URL.
//! 2. [`PageReader`] drives the shared session page: user agent, navigation
//!    under a timeout, best-effort selector waits, document extraction and,
//!    for screenshot modes, both captures. Requests are serialized on the one
//!    page.
//! 3. [`render`] turns the resulting [`PageSnapshot`] into a
//!    [`ReaderResponse`].
//! 4. Screenshot modes publish the image to a [`ScreenshotSink`] and the
//!    response carries `/instant-screenshots/<id>`.
//!
//! Navigation and session failures never surface as errors from the engine;
//! they come back as a failure snapshot (title `"Error"`, message as text).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use page_reader::{
//!     BrowserSession, Config, MemoryScreenshotStore, Metrics, PageReader, ReadOutcome,
//!     ReaderService, RequestOptions,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let session = Arc::new(BrowserSession::new(config.clone()));
//!     let reader = Arc::new(PageReader::new(session));
//!     let service = ReaderService::new(
//!         reader,
//!         Arc::new(MemoryScreenshotStore::new()),
//!         Arc::new(Metrics::noop()),
//!     );
//!
//!     if let ReadOutcome::Rendered(response) =
//!         service.read("example.com", &RequestOptions::default()).await?
//!     {
//!         println!("{}", response.text_body().unwrap_or_default());
//!     }
//!
//!     service.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! page-reader serve --port 3000
//! page-reader mcp --port 8000
//! page-reader read https://example.com --respond-with text
//! curl -H 'X-Respond-With: html' http://localhost:3000/https://example.com
//! ```

/// Configuration, response modes and per-request options
pub mod config;

/// Error types and expected best-effort outcomes
pub mod error;

/// Page snapshot data model
pub mod snapshot;

/// Browser session management for the shared Chrome page
pub mod session;

/// Readable article extraction
pub mod article;

/// Navigation and extraction engine
pub mod page_reader;

/// Snapshot rendering into output formats
pub mod render;

/// Screenshot storage
pub mod storage;

/// Reader pipeline orchestration
pub mod service;

/// HTTP front end
pub mod server;

/// MCP tool server over the reader pipeline
pub mod mcp;

/// Command-line interface implementation
pub mod cli;

/// Metrics instruments and Prometheus exporter
pub mod metrics;

/// Utility functions and helpers
pub mod utils;


pub use article::*;
pub use cli::*;
pub use config::*;
pub use error::*;
pub use mcp::*;
pub use metrics::*;
pub use page_reader::*;
pub use render::*;
pub use server::*;
pub use service::*;
pub use session::*;
pub use snapshot::*;
pub use storage::*;
pub use utils::*;
