//! Browser driver capability.
//!
//! A [`BrowserDriver`] is one live browsing context. Only the session
//! manager and the pagination driver hold one; everything above them works
//! with typed [`RawFragment`]s instead of page state.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::DriverResult;
use crate::types::fragment::{FragmentQuery, RawFragment};

/// Where the browser ended up after an action.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageState {
    /// Final URL after redirects
    pub url: String,
    /// Document title
    pub title: String,
}

impl PageState {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
        }
    }
}

/// Primitive actions against one browsing context.
///
/// Actions are issued sequentially; implementations need not support
/// concurrent calls against the same context.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Navigate and wait for the load to finish.
    async fn goto(&self, url: &str) -> DriverResult<PageState>;

    /// Current URL and title without navigating.
    async fn page_state(&self) -> DriverResult<PageState>;

    /// Wait until `selector` matches. Returns `false` on timeout.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> DriverResult<bool>;

    /// Replace the value of the first input matching `selector`.
    async fn fill(&self, selector: &str, value: &str) -> DriverResult<()>;

    /// Click the first element matching `selector` (and containing `text`,
    /// when given). Returns `false` when nothing matched.
    async fn click(&self, selector: &str, text: Option<&str>) -> DriverResult<bool>;

    /// Every item currently matching the query, in DOM order.
    async fn capture(&self, query: &FragmentQuery) -> DriverResult<Vec<RawFragment>>;

    /// Attribute of the first element matching `selector`.
    async fn attribute(&self, selector: &str, name: &str) -> DriverResult<Option<String>>;

    /// Visible text of the document body.
    async fn body_text(&self) -> DriverResult<String>;

    /// Scroll incrementally to the bottom so lazy content renders.
    async fn scroll_to_bottom(&self) -> DriverResult<()>;

    /// Tear down the context. Implementations should tolerate repeat calls.
    async fn close(&self) -> DriverResult<()>;
}

/// Starts fresh browsing contexts.
#[async_trait]
pub trait Launcher: Send + Sync {
    type Driver: BrowserDriver + 'static;

    /// Start a new, unauthenticated context.
    async fn launch(&self) -> DriverResult<Self::Driver>;
}
