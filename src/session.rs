//! Browser session management for the shared Chrome page
//!
//! One browser process, one isolated browsing context and one page are
//! launched lazily and reused across requests. The page is reached only
//! through the [`PageDriver`] seam, so the navigation engine never touches
//! chromiumoxide directly.

use crate::{create_browser_config, Config, Ignored, RawDocument, ReaderError};
use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, SetBypassCspParams};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams,
};
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Polling interval while waiting for a selector to appear.
const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Reads `title`, final location, serialized document and visible text in a
/// single evaluation.
const EXTRACT_DOCUMENT_JS: &str = r#"(() => ({
    title: document.title || '',
    href: document.location.href,
    html: document.documentElement ? document.documentElement.outerHTML : '',
    text: document.body ? document.body.innerText : ''
}))()"#;

/// Operations the navigation engine performs against the session page.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn set_user_agent(&self, user_agent: &str) -> Result<(), ReaderError>;

    /// Restores the browser's own user agent if an earlier request overrode it.
    async fn reset_user_agent(&self) -> Result<(), ReaderError>;

    /// Loads `url` and resolves once the page reports load and DOM-ready.
    async fn navigate(&self, url: &str) -> Result<(), ReaderError>;

    async fn wait_for_selector(&self, selector: &str, budget: Duration) -> Result<(), Ignored>;

    async fn extract_document(&self) -> Result<RawDocument, ReaderError>;

    async fn capture_screenshot(&self, full_page: bool) -> Result<Vec<u8>, ReaderError>;
}

/// Shared handle to the ready session page.
pub type SessionHandle = Arc<dyn PageDriver>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Returns the live session, launching one first if there is none.
    async fn ensure_ready(&self) -> Result<SessionHandle, ReaderError>;

    /// Tears the session down; the next `ensure_ready` launches a new one.
    async fn close(&self);
}

/// Marks the page as overridden before `command` runs, so an override that is
/// cancelled mid-flight is still reset by the next request.
async fn apply_user_agent_override<F>(overridden: &AtomicBool, command: F) -> Result<(), ReaderError>
where
    F: Future<Output = Result<(), ReaderError>>,
{
    overridden.store(true, Ordering::SeqCst);
    command.await
}

/// The session page backed by a real Chrome tab.
pub struct ChromePage {
    page: Page,
    default_user_agent: String,
    user_agent_overridden: AtomicBool,
}

impl ChromePage {
    fn new(page: Page, default_user_agent: String) -> Self {
        Self {
            page,
            default_user_agent,
            user_agent_overridden: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl PageDriver for ChromePage {
    async fn set_user_agent(&self, user_agent: &str) -> Result<(), ReaderError> {
        let command = async {
            self.page
                .set_user_agent(SetUserAgentOverrideParams::new(user_agent))
                .await?;
            Ok::<(), ReaderError>(())
        };
        apply_user_agent_override(&self.user_agent_overridden, command).await
    }

    async fn reset_user_agent(&self) -> Result<(), ReaderError> {
        if !self.user_agent_overridden.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.page
            .set_user_agent(SetUserAgentOverrideParams::new(
                self.default_user_agent.clone(),
            ))
            .await?;
        self.user_agent_overridden.store(false, Ordering::SeqCst);
        debug!("Restored default user agent");
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<(), ReaderError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| ReaderError::NavigationFailed(e.to_string()))?;
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, budget: Duration) -> Result<(), Ignored> {
        let poll = async {
            loop {
                if self.page.find_element(selector).await.is_ok() {
                    return;
                }
                tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
            }
        };

        tokio::time::timeout(budget, poll)
            .await
            .map_err(|_| Ignored::SelectorMissing {
                selector: selector.to_string(),
                budget,
            })
    }

    async fn extract_document(&self) -> Result<RawDocument, ReaderError> {
        self.page
            .evaluate(EXTRACT_DOCUMENT_JS)
            .await?
            .into_value::<RawDocument>()
            .map_err(|e| ReaderError::PageError(format!("Failed to decode document: {e}")))
    }

    async fn capture_screenshot(&self, full_page: bool) -> Result<Vec<u8>, ReaderError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(full_page)
            .build();

        self.page
            .screenshot(params)
            .await
            .map_err(|e| ReaderError::CaptureFailed(e.to_string()))
    }
}

/// A launched browser together with its CDP handler task and the session page.
struct LiveSession {
    browser: Browser,
    handler: tokio::task::JoinHandle<Result<(), chromiumoxide::error::CdpError>>,
    context_id: BrowserContextId,
    page: Arc<ChromePage>,
    launched_at: Instant,
}

impl LiveSession {
    fn is_alive(&self) -> bool {
        !self.handler.is_finished()
    }

    async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser cleanly: {}", e);
        }
        self.handler.abort();
        info!(
            context = ?self.context_id,
            uptime = ?self.launched_at.elapsed(),
            "Browser session closed"
        );
    }
}

/// Lazily launched Chrome session with a fixed, hardened configuration
pub struct BrowserSession {
    config: Config,
    state: Mutex<Option<LiveSession>>,
}

impl BrowserSession {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: Mutex::new(None),
        }
    }

    async fn launch(&self) -> Result<LiveSession, ReaderError> {
        let browser_config = create_browser_config(&self.config)?;

        let (mut browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ReaderError::BrowserLaunchFailed(e.to_string()))?;

        // The handler is a stream that must be polled for the browser to make
        // progress.
        let handler_task = tokio::spawn(async move {
            loop {
                match handler.next().await {
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        error!("Browser handler error: {}", e);
                        return Err(e);
                    }
                    None => {
                        info!("Browser handler stream ended");
                        break;
                    }
                }
            }
            Ok(())
        });

        match Self::open_page(&mut browser, &self.config).await {
            Ok((context_id, page)) => {
                info!(
                    width = self.config.viewport.width,
                    height = self.config.viewport.height,
                    "Browser session launched"
                );
                Ok(LiveSession {
                    browser,
                    handler: handler_task,
                    context_id,
                    page: Arc::new(page),
                    launched_at: Instant::now(),
                })
            }
            Err(e) => {
                let _ = browser.close().await;
                handler_task.abort();
                Err(e)
            }
        }
    }

    async fn open_page(
        browser: &mut Browser,
        config: &Config,
    ) -> Result<(BrowserContextId, ChromePage), ReaderError> {
        let launch_failed = |e: String| ReaderError::BrowserLaunchFailed(e);

        let default_user_agent = browser
            .user_agent()
            .await
            .map_err(|e| launch_failed(e.to_string()))?;

        let context_id = browser
            .create_browser_context(CreateBrowserContextParams::default())
            .await
            .map_err(|e| launch_failed(e.to_string()))?;

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(launch_failed)?;

        let page = browser
            .new_page(target)
            .await
            .map_err(|e| launch_failed(e.to_string()))?;

        page.execute(SetBypassCspParams::new(true))
            .await
            .map_err(|e| launch_failed(e.to_string()))?;

        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(config.viewport.width)
            .height(config.viewport.height)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(launch_failed)?;
        page.execute(metrics)
            .await
            .map_err(|e| launch_failed(e.to_string()))?;

        Ok((context_id, ChromePage::new(page, default_user_agent)))
    }
}

#[async_trait]
impl SessionProvider for BrowserSession {
    async fn ensure_ready(&self) -> Result<SessionHandle, ReaderError> {
        let mut state = self.state.lock().await;

        if let Some(session) = state.as_ref() {
            if session.is_alive() {
                let page: SessionHandle = session.page.clone();
                return Ok(page);
            }
            warn!("Browser handler has stopped, relaunching session");
            if let Some(dead) = state.take() {
                dead.shutdown().await;
            }
        }

        let session = self.launch().await?;
        let page: SessionHandle = session.page.clone();
        *state = Some(session);
        Ok(page)
    }

    async fn close(&self) {
        if let Some(session) = self.state.lock().await.take() {
            info!("Shutting down browser session...");
            session.shutdown().await;
        }
    }
}
