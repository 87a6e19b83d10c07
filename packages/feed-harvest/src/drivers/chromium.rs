//! Chromium driver over the DevTools protocol.
//!
//! Page interaction goes through small evaluated scripts rather than CDP
//! DOM calls: scripts see the same DOM the site's own code does, and one
//! round trip captures a whole feed.

use async_trait::async_trait;
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{DriverError, DriverResult};
use crate::traits::driver::{BrowserDriver, Launcher, PageState};
use crate::types::fragment::{FragmentQuery, RawFragment};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Launches local Chromium instances.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    headless: bool,
    user_data_dir: Option<PathBuf>,
    executable: Option<PathBuf>,
    window: (u32, u32),
}

impl Default for ChromiumLauncher {
    fn default() -> Self {
        Self {
            headless: true,
            user_data_dir: None,
            executable: None,
            window: (1366, 900),
        }
    }
}

impl ChromiumLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Persist cookies and storage here so later runs start signed in.
    pub fn with_user_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.user_data_dir = Some(dir.into());
        self
    }

    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    fn browser_config(&self) -> DriverResult<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .window_size(self.window.0, self.window.1)
            .arg("--disable-blink-features=AutomationControlled");
        if !self.headless {
            builder = builder.with_head();
        }
        if let Some(dir) = &self.user_data_dir {
            builder = builder.user_data_dir(dir);
        }
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        builder.build().map_err(DriverError::Launch)
    }
}

#[async_trait]
impl Launcher for ChromiumLauncher {
    type Driver = ChromiumDriver;

    async fn launch(&self) -> DriverResult<ChromiumDriver> {
        let config = self.browser_config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("chromium handler event error: {}", e);
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(DriverError::Launch(e.to_string()));
            }
        };
        debug!(headless = self.headless, "Launched chromium");

        Ok(ChromiumDriver {
            page,
            browser: Mutex::new(Some(browser)),
            handler_task: Mutex::new(Some(handler_task)),
        })
    }
}

/// One Chromium window with a single tab.
pub struct ChromiumDriver {
    page: Page,
    browser: Mutex<Option<Browser>>,
    handler_task: Mutex<Option<JoinHandle<()>>>,
}

impl ChromiumDriver {
    async fn eval<T: DeserializeOwned>(&self, script: String) -> DriverResult<T> {
        let result = self.page.evaluate(script).await.map_err(cdp_error)?;
        result
            .into_value::<T>()
            .map_err(|e| DriverError::Script(e.to_string()))
    }
}

fn cdp_error(error: CdpError) -> DriverError {
    match error {
        CdpError::Timeout => DriverError::Timeout(error.to_string()),
        CdpError::NotFound => DriverError::NotFound(error.to_string()),
        CdpError::JavascriptException(_) => DriverError::Script(error.to_string()),
        other => DriverError::Transport(other.to_string()),
    }
}

/// JSON-encode a value for splicing into a script.
fn js(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn goto(&self, url: &str) -> DriverResult<PageState> {
        self.page.goto(url).await.map_err(cdp_error)?;
        self.page_state().await
    }

    async fn page_state(&self) -> DriverResult<PageState> {
        let url = self.page.url().await.map_err(cdp_error)?.unwrap_or_default();
        let title = self
            .page
            .get_title()
            .await
            .map_err(cdp_error)?
            .unwrap_or_default();
        Ok(PageState { url, title })
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> DriverResult<bool> {
        let script = format!("document.querySelector({}) !== null", js(selector));
        let started = Instant::now();
        loop {
            if self.eval::<bool>(script.clone()).await? {
                return Ok(true);
            }
            if started.elapsed() >= timeout {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn fill(&self, selector: &str, value: &str) -> DriverResult<()> {
        let element = self.page.find_element(selector).await.map_err(cdp_error)?;
        element.click().await.map_err(cdp_error)?;
        element.type_str(value).await.map_err(cdp_error)?;
        Ok(())
    }

    async fn click(&self, selector: &str, text: Option<&str>) -> DriverResult<bool> {
        let script = format!(
            r#"(() => {{
                const wanted = {text};
                const el = Array.from(document.querySelectorAll({selector})).find(e =>
                    e.offsetParent !== null && !e.disabled &&
                    (wanted === null || (e.innerText || '').includes(wanted)));
                if (!el) return false;
                el.scrollIntoView({{block: 'center'}});
                el.click();
                return true;
            }})()"#,
            selector = js(selector),
            text = text.map(js).unwrap_or_else(|| "null".to_string()),
        );
        self.eval(script).await
    }

    async fn capture(&self, query: &FragmentQuery) -> DriverResult<Vec<RawFragment>> {
        let script = format!(
            r#"(() => {{
                const sel = {item};
                const replies = {reply};
                return Array.from(document.querySelectorAll(sel)).map((el, i) => {{
                    let depth = 0;
                    for (let p = el.parentElement; p; p = p.parentElement) {{
                        if (p.matches(sel)) depth++;
                    }}
                    const parent = el.parentElement;
                    return {{
                        position: i,
                        html: el.outerHTML,
                        depth: depth,
                        is_reply: replies !== null && parent !== null && parent.closest(replies) !== null,
                        dom_key: el.getAttribute('data-id') || el.getAttribute('data-urn')
                            || el.getAttribute('data-entity-urn') || null,
                    }};
                }});
            }})()"#,
            item = js(&query.item_selector),
            reply = query
                .reply_container_selector
                .as_deref()
                .map(js)
                .unwrap_or_else(|| "null".to_string()),
        );
        self.eval(script).await
    }

    async fn attribute(&self, selector: &str, name: &str) -> DriverResult<Option<String>> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); return el ? el.getAttribute({}) : null; }})()",
            js(selector),
            js(name)
        );
        self.eval(script).await
    }

    async fn body_text(&self) -> DriverResult<String> {
        self.eval("document.body ? document.body.innerText : ''".to_string())
            .await
    }

    async fn scroll_to_bottom(&self) -> DriverResult<()> {
        let script = r#"(async () => {
            for (let i = 0; i < 20; i++) {
                const before = document.body.scrollHeight;
                window.scrollBy(0, window.innerHeight);
                await new Promise(r => setTimeout(r, 150));
                if (window.innerHeight + window.scrollY >= document.body.scrollHeight
                    && document.body.scrollHeight === before) break;
            }
            return true;
        })()"#;
        self.eval::<bool>(script.to_string()).await.map(|_| ())
    }

    async fn close(&self) -> DriverResult<()> {
        let browser = self.browser.lock().await.take();
        if let Some(mut browser) = browser {
            if let Err(e) = browser.close().await {
                warn!("chromium close error: {}", e);
            }
            let _ = browser.wait().await;
        }
        if let Some(task) = self.handler_task.lock().await.take() {
            task.abort();
        }
        Ok(())
    }
}
