//! Testing utilities including mock implementations.
//!
//! These let applications exercise a full extraction run without a browser
//! or a real inference backend. The mocks share state through `Arc`, so a
//! clone handed to a launcher can still be inspected by the test afterwards.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{DriverError, DriverResult, InferenceError};
use crate::traits::driver::{BrowserDriver, Launcher, PageState};
use crate::traits::inference::Inference;
use crate::types::config::SiteConfig;
use crate::types::fragment::{FragmentQuery, RawFragment};

/// Record of a call made to the mock driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Goto(String),
    PageState,
    WaitFor(String),
    Fill { selector: String, value_len: usize },
    Click { selector: String, text: Option<String> },
    Capture,
    Attribute { selector: String, name: String },
    BodyText,
    Scroll,
    Close,
}

#[derive(Default)]
struct MockPage {
    site: SiteConfig,
    signed_in: bool,
    reject_login: bool,
    challenge_url: Option<String>,
    login_delay: Option<Duration>,
    submitted: bool,
    current: PageState,

    /// Capture output after 0, 1, 2... reveals; the last entry repeats
    cycles: Vec<Vec<RawFragment>>,
    /// Every reveal adds one fresh item
    growing: bool,
    reveal_limit: Option<usize>,
    reveals: usize,

    routes: HashMap<String, PageState>,
    attributes: HashMap<(String, String), String>,
    body_text: String,

    goto_failures: VecDeque<DriverError>,
    reveal_failures: VecDeque<DriverError>,
    capture_failure: Option<(usize, DriverError)>,
    captures: usize,
    closes: usize,
}

/// A scripted browser driver.
///
/// The feed is described as a list of captures, one per reveal cycle. The
/// login form succeeds unless told otherwise; the reveal control is any
/// click that is not the login submit button.
#[derive(Clone, Default)]
pub struct MockDriver {
    page: Arc<RwLock<MockPage>>,
    calls: Arc<RwLock<Vec<DriverCall>>>,
}

impl MockDriver {
    /// Signed-out browser whose login form accepts any credentials.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a site layout other than the default.
    pub fn with_site(self, site: SiteConfig) -> Self {
        self.page.write().unwrap().site = site;
        self
    }

    /// Start with an already-authenticated profile.
    pub fn signed_in(self) -> Self {
        self.page.write().unwrap().signed_in = true;
        self
    }

    /// Login submissions never succeed.
    pub fn rejecting_login(self) -> Self {
        self.page.write().unwrap().reject_login = true;
        self
    }

    /// Login submissions land on a challenge page.
    pub fn challenging_login(self, url: impl Into<String>) -> Self {
        {
            let mut page = self.page.write().unwrap();
            page.reject_login = true;
            page.challenge_url = Some(url.into());
        }
        self
    }

    /// The post-login wait takes `delay` before the feed appears.
    pub fn with_slow_login(self, delay: Duration) -> Self {
        self.page.write().unwrap().login_delay = Some(delay);
        self
    }

    /// Append the capture returned after the next reveal.
    pub fn with_cycle(self, fragments: Vec<RawFragment>) -> Self {
        self.page.write().unwrap().cycles.push(fragments);
        self
    }

    /// A feed that grows by one distinct item per reveal, forever.
    pub fn with_growing_feed(self) -> Self {
        self.page.write().unwrap().growing = true;
        self
    }

    /// The reveal control disappears after `n` successful clicks.
    pub fn with_reveal_limit(self, n: usize) -> Self {
        self.page.write().unwrap().reveal_limit = Some(n);
        self
    }

    /// Navigating to `url` lands on `landed` instead.
    pub fn with_route(self, url: impl Into<String>, landed: PageState) -> Self {
        self.page.write().unwrap().routes.insert(url.into(), landed);
        self
    }

    pub fn with_attribute(
        self,
        selector: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.page
            .write()
            .unwrap()
            .attributes
            .insert((selector.into(), name.into()), value.into());
        self
    }

    pub fn with_body_text(self, text: impl Into<String>) -> Self {
        self.page.write().unwrap().body_text = text.into();
        self
    }

    /// Fail the next navigation with `error`. Calls queue up.
    pub fn fail_next_goto(&self, error: DriverError) {
        self.page.write().unwrap().goto_failures.push_back(error);
    }

    /// The next reveal click lands but reports `error`. Calls queue up.
    pub fn fail_next_reveal(&self, error: DriverError) {
        self.page.write().unwrap().reveal_failures.push_back(error);
    }

    /// Every capture after the first `n` fails with `error`.
    pub fn fail_captures_after(&self, n: usize, error: DriverError) {
        self.page.write().unwrap().capture_failure = Some((n, error));
    }

    /// Get all recorded calls.
    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls.read().unwrap().clone()
    }

    /// Successful reveal clicks.
    pub fn reveal_clicks(&self) -> usize {
        self.page.read().unwrap().reveals
    }

    pub fn close_count(&self) -> usize {
        self.page.read().unwrap().closes
    }

    pub fn capture_count(&self) -> usize {
        self.page.read().unwrap().captures
    }

    fn record(&self, call: DriverCall) {
        self.calls.write().unwrap().push(call);
    }

    fn ensure_open(&self) -> DriverResult<()> {
        if self.page.read().unwrap().closes > 0 {
            Err(DriverError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BrowserDriver for MockDriver {
    async fn goto(&self, url: &str) -> DriverResult<PageState> {
        self.record(DriverCall::Goto(url.to_string()));
        self.ensure_open()?;

        let mut page = self.page.write().unwrap();
        if let Some(error) = page.goto_failures.pop_front() {
            return Err(error);
        }
        let landed = page
            .routes
            .get(url)
            .cloned()
            .unwrap_or_else(|| PageState::new(url, "Mock page"));
        page.current = landed.clone();
        Ok(landed)
    }

    async fn page_state(&self) -> DriverResult<PageState> {
        self.record(DriverCall::PageState);
        self.ensure_open()?;
        Ok(self.page.read().unwrap().current.clone())
    }

    async fn wait_for(&self, selector: &str, _timeout: Duration) -> DriverResult<bool> {
        self.record(DriverCall::WaitFor(selector.to_string()));
        self.ensure_open()?;

        let (found, delay) = {
            let page = self.page.read().unwrap();
            if selector == page.site.search_box_selector {
                (page.signed_in, page.login_delay.filter(|_| page.submitted))
            } else {
                (true, None)
            }
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(found)
    }

    async fn fill(&self, selector: &str, value: &str) -> DriverResult<()> {
        self.record(DriverCall::Fill {
            selector: selector.to_string(),
            value_len: value.len(),
        });
        self.ensure_open()
    }

    async fn click(&self, selector: &str, text: Option<&str>) -> DriverResult<bool> {
        self.record(DriverCall::Click {
            selector: selector.to_string(),
            text: text.map(str::to_string),
        });
        self.ensure_open()?;

        let mut page = self.page.write().unwrap();
        if selector == page.site.submit_selector {
            page.submitted = true;
            if page.reject_login {
                if let Some(url) = page.challenge_url.clone() {
                    page.current = PageState::new(url, "Security check");
                }
            } else {
                page.signed_in = true;
                page.current = PageState::new(page.site.feed_url.clone(), "Feed");
            }
            return Ok(true);
        }

        if page.reveal_limit.is_some_and(|limit| page.reveals >= limit) {
            return Ok(false);
        }
        page.reveals += 1;
        match page.reveal_failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(true),
        }
    }

    async fn capture(&self, _query: &FragmentQuery) -> DriverResult<Vec<RawFragment>> {
        self.record(DriverCall::Capture);
        self.ensure_open()?;

        let mut page = self.page.write().unwrap();
        page.captures += 1;
        if let Some((after, error)) = &page.capture_failure {
            if page.captures > *after {
                return Err(error.clone());
            }
        }

        if page.growing {
            return Ok((0..=page.reveals)
                .map(|i| RawFragment::new(i, format!("<article>item {}</article>", i)))
                .collect());
        }
        if page.cycles.is_empty() {
            return Ok(Vec::new());
        }
        let index = page.reveals.min(page.cycles.len() - 1);
        Ok(page.cycles[index].clone())
    }

    async fn attribute(&self, selector: &str, name: &str) -> DriverResult<Option<String>> {
        self.record(DriverCall::Attribute {
            selector: selector.to_string(),
            name: name.to_string(),
        });
        self.ensure_open()?;
        Ok(self
            .page
            .read()
            .unwrap()
            .attributes
            .get(&(selector.to_string(), name.to_string()))
            .cloned())
    }

    async fn body_text(&self) -> DriverResult<String> {
        self.record(DriverCall::BodyText);
        self.ensure_open()?;
        Ok(self.page.read().unwrap().body_text.clone())
    }

    async fn scroll_to_bottom(&self) -> DriverResult<()> {
        self.record(DriverCall::Scroll);
        self.ensure_open()
    }

    async fn close(&self) -> DriverResult<()> {
        self.record(DriverCall::Close);
        self.page.write().unwrap().closes += 1;
        Ok(())
    }
}

/// Hands out clones of one [`MockDriver`].
#[derive(Clone)]
pub struct MockLauncher {
    driver: MockDriver,
    fail_launch: Option<DriverError>,
    launches: Arc<AtomicUsize>,
}

impl MockLauncher {
    pub fn new(driver: MockDriver) -> Self {
        Self {
            driver,
            fail_launch: None,
            launches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every launch fails with `error`.
    pub fn failing_launch(mut self, error: DriverError) -> Self {
        self.fail_launch = Some(error);
        self
    }

    pub fn driver(&self) -> &MockDriver {
        &self.driver
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Launcher for MockLauncher {
    type Driver = MockDriver;

    async fn launch(&self) -> DriverResult<MockDriver> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        match &self.fail_launch {
            Some(error) => Err(error.clone()),
            None => Ok(self.driver.clone()),
        }
    }
}

/// A scripted inference backend.
///
/// Replies are consumed in order; the last one repeats.
#[derive(Clone, Default)]
pub struct MockInference {
    replies: Arc<RwLock<VecDeque<Result<String, InferenceError>>>>,
    delay: Option<Duration>,
    calls: Arc<RwLock<Vec<String>>>,
}

impl MockInference {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, response: impl Into<String>) -> Self {
        self.replies.write().unwrap().push_back(Ok(response.into()));
        self
    }

    pub fn with_failure(self, error: InferenceError) -> Self {
        self.replies.write().unwrap().push_back(Err(error));
        self
    }

    /// Sleep this long before replying.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Prompts received so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }

    fn next_reply(&self) -> Result<String, InferenceError> {
        let mut replies = self.replies.write().unwrap();
        match replies.len() {
            0 => Err(InferenceError::Config("no reply scripted".to_string())),
            1 => replies[0].clone(),
            _ => replies
                .pop_front()
                .unwrap_or_else(|| Err(InferenceError::Config("no reply scripted".to_string()))),
        }
    }
}

#[async_trait]
impl Inference for MockInference {
    async fn complete(&self, prompt: &str) -> Result<String, InferenceError> {
        self.calls.write().unwrap().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.next_reply()
    }

    fn name(&self) -> &str {
        "mock"
    }
}
