//! Rate-limited driver wrapper.
//!
//! Wraps any BrowserDriver so every page action waits for a governor
//! permit. This is the per-action politeness floor; the per-cycle delay
//! lives in the paginator.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{DriverError, DriverResult};
use crate::traits::driver::{BrowserDriver, Launcher, PageState};
use crate::types::fragment::{FragmentQuery, RawFragment};

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// A driver wrapper that enforces an action rate.
pub struct RateLimitedDriver<D: BrowserDriver> {
    inner: D,
    limiter: Arc<DefaultRateLimiter>,
}

impl<D: BrowserDriver> RateLimitedDriver<D> {
    /// Wrap `driver` with a shared limiter.
    pub fn new(driver: D, limiter: Arc<DefaultRateLimiter>) -> Self {
        Self {
            inner: driver,
            limiter,
        }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    async fn wait_for_permit(&self) {
        self.limiter.until_ready().await;
    }
}

#[async_trait]
impl<D: BrowserDriver> BrowserDriver for RateLimitedDriver<D> {
    async fn goto(&self, url: &str) -> DriverResult<PageState> {
        self.wait_for_permit().await;
        self.inner.goto(url).await
    }

    async fn page_state(&self) -> DriverResult<PageState> {
        self.inner.page_state().await
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> DriverResult<bool> {
        self.inner.wait_for(selector, timeout).await
    }

    async fn fill(&self, selector: &str, value: &str) -> DriverResult<()> {
        self.wait_for_permit().await;
        self.inner.fill(selector, value).await
    }

    async fn click(&self, selector: &str, text: Option<&str>) -> DriverResult<bool> {
        self.wait_for_permit().await;
        self.inner.click(selector, text).await
    }

    async fn capture(&self, query: &FragmentQuery) -> DriverResult<Vec<RawFragment>> {
        self.inner.capture(query).await
    }

    async fn attribute(&self, selector: &str, name: &str) -> DriverResult<Option<String>> {
        self.inner.attribute(selector, name).await
    }

    async fn body_text(&self) -> DriverResult<String> {
        self.inner.body_text().await
    }

    async fn scroll_to_bottom(&self) -> DriverResult<()> {
        self.wait_for_permit().await;
        self.inner.scroll_to_bottom().await
    }

    async fn close(&self) -> DriverResult<()> {
        // Never throttle teardown
        self.inner.close().await
    }
}

/// Launcher whose drivers share one action budget.
pub struct RateLimitedLauncher<L: Launcher> {
    inner: L,
    limiter: Arc<DefaultRateLimiter>,
}

impl<L: Launcher> RateLimitedLauncher<L> {
    /// Allow at most `actions_per_second` throttled actions per second,
    /// evenly spaced (no bursts).
    pub fn new(launcher: L, actions_per_second: u32) -> DriverResult<Self> {
        let rate = NonZeroU32::new(actions_per_second).ok_or_else(|| {
            DriverError::Launch("actions_per_second must be > 0".to_string())
        })?;
        Ok(Self::with_quota(
            launcher,
            Quota::per_second(rate).allow_burst(NonZeroU32::MIN),
        ))
    }

    /// Create with a custom quota.
    pub fn with_quota(launcher: L, quota: Quota) -> Self {
        Self {
            inner: launcher,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }
}

#[async_trait]
impl<L: Launcher> Launcher for RateLimitedLauncher<L> {
    type Driver = RateLimitedDriver<L::Driver>;

    async fn launch(&self) -> DriverResult<Self::Driver> {
        let driver = self.inner.launch().await?;
        Ok(RateLimitedDriver::new(driver, Arc::clone(&self.limiter)))
    }
}
