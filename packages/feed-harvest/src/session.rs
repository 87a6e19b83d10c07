//! Session manager: owns the authenticated browsing context.
//!
//! A [`Session`] wraps one driver. It is created by
//! [`SessionManager::open`], borrowed by the pagination driver, and closed
//! exactly once however the run ends.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{AuthError, DriverError, NavigationError};
use crate::pagination::interrupted;
use crate::retry::with_retry;
use crate::security::Credentials;
use crate::traits::driver::{BrowserDriver, Launcher, PageState};
use crate::types::config::{CompanyRef, HarvestConfig, SiteConfig, Target};

/// Selector for the first company link on a search results page.
const COMPANY_LINK_SELECTOR: &str = "a[href*='/company/']";

/// An authenticated browsing context.
pub struct Session<D: BrowserDriver> {
    id: Uuid,
    created_at: DateTime<Utc>,
    driver: D,
    valid: AtomicBool,
    closed: AtomicBool,
}

impl<D: BrowserDriver> Session<D> {
    fn new(driver: D) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            driver,
            valid: AtomicBool::new(true),
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Open and not invalidated by a fatal driver error.
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst) && !self.is_closed()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Mark the context unusable without closing it.
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::SeqCst);
    }

    pub(crate) fn driver(&self) -> &D {
        &self.driver
    }

    /// Tear down the context. Only the first call reaches the driver;
    /// returns whether this call was it.
    pub async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.valid.store(false, Ordering::SeqCst);
        if let Err(e) = self.driver.close().await {
            warn!(session_id = %self.id, error = %e, "Error while closing browser session");
        } else {
            debug!(session_id = %self.id, "Closed browser session");
        }
        true
    }
}

impl<D: BrowserDriver> std::fmt::Debug for Session<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("valid", &self.is_valid())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// The view a navigation landed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewHandle {
    /// URL that was requested
    pub requested: String,
    /// URL after redirects
    pub url: String,
    pub title: String,
}

/// Opens sessions and moves them between views.
pub struct SessionManager<L: Launcher> {
    launcher: L,
    config: HarvestConfig,
}

impl<L: Launcher> SessionManager<L> {
    pub fn new(launcher: L, config: HarvestConfig) -> Self {
        Self { launcher, config }
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Launch a browser and authenticate it.
    ///
    /// An already-authenticated profile is reused without credentials.
    /// Otherwise the login form is submitted with `credentials`. Any failure
    /// closes the browser before returning; authentication is never retried
    /// here.
    pub async fn open(
        &self,
        credentials: Option<&Credentials>,
    ) -> Result<Session<L::Driver>, AuthError> {
        self.open_until(credentials, &CancellationToken::new(), None)
            .await
    }

    /// Like [`open`](Self::open), giving up with [`AuthError::Interrupted`]
    /// if `cancel` fires or `deadline` passes while login is pending.
    pub async fn open_until(
        &self,
        credentials: Option<&Credentials>,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<Session<L::Driver>, AuthError> {
        let driver = self.launcher.launch().await.map_err(AuthError::Launch)?;
        let session = Session::new(driver);

        let result = tokio::select! {
            biased;
            result = self.authenticate(&session, credentials) => result,
            _ = interrupted(cancel, deadline) => Err(AuthError::Interrupted),
        };
        match result {
            Ok(()) => {
                info!(session_id = %session.id, "Session authenticated");
                Ok(session)
            }
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Authentication failed");
                session.close().await;
                Err(e)
            }
        }
    }

    async fn authenticate(
        &self,
        session: &Session<L::Driver>,
        credentials: Option<&Credentials>,
    ) -> Result<(), AuthError> {
        let site = &self.config.site;
        let driver = session.driver();

        driver.goto(&site.feed_url).await.map_err(AuthError::Driver)?;
        let reused = driver
            .wait_for(&site.search_box_selector, self.config.login_probe_timeout)
            .await
            .map_err(AuthError::Driver)?;
        if reused {
            debug!("Existing browser profile is already signed in");
            return Ok(());
        }

        let credentials = credentials.ok_or(AuthError::MissingCredentials)?;
        info!(username = %credentials.username, "Signing in");

        driver.goto(&site.login_url).await.map_err(AuthError::Driver)?;
        driver
            .fill(&site.username_selector, &credentials.username)
            .await
            .map_err(AuthError::Driver)?;
        driver
            .fill(&site.password_selector, credentials.password.expose())
            .await
            .map_err(AuthError::Driver)?;
        let submitted = driver
            .click(&site.submit_selector, None)
            .await
            .map_err(AuthError::Driver)?;
        if !submitted {
            return Err(AuthError::Driver(DriverError::NotFound(
                site.submit_selector.clone(),
            )));
        }

        let signed_in = driver
            .wait_for(&site.search_box_selector, self.config.login_timeout)
            .await
            .map_err(AuthError::Driver)?;
        if signed_in {
            return Ok(());
        }

        let landed = driver.page_state().await.map_err(AuthError::Driver)?;
        if matches_any(&landed.url, &site.challenge_markers) {
            return Err(AuthError::Blocked { url: landed.url });
        }
        Err(AuthError::Rejected)
    }

    /// Navigate to `url`, retrying transient failures, then wait for the
    /// page to settle.
    pub async fn navigate(
        &self,
        session: &Session<L::Driver>,
        url: &str,
    ) -> Result<ViewHandle, NavigationError> {
        if !session.is_valid() {
            return Err(NavigationError::Driver {
                url: url.to_string(),
                source: DriverError::Closed,
            });
        }

        debug!(url, "Navigating");
        let state = with_retry(
            &self.config.retry,
            "navigate",
            |e: &DriverError| e.is_transient(),
            || session.driver().goto(url),
        )
        .await
        .map_err(|e| {
            if !e.is_transient() && !matches!(e, DriverError::NotFound(_) | DriverError::AccessDenied(_)) {
                session.invalidate();
            }
            navigation_error(url, e)
        })?;

        check_landing(&self.config.site, url, &state)?;

        if !self.config.settle_delay.is_zero() {
            tokio::time::sleep(self.config.settle_delay).await;
        }

        Ok(ViewHandle {
            requested: url.to_string(),
            url: state.url,
            title: state.title,
        })
    }

    /// Resolve a target to the URL of its feed view.
    ///
    /// Company names are looked up through site search, which navigates the
    /// session as a side effect.
    pub async fn resolve_target(
        &self,
        session: &Session<L::Driver>,
        target: &Target,
    ) -> Result<String, NavigationError> {
        let site = &self.config.site;
        match target {
            Target::PostComments { url } => absolute_url(site, url)
                .ok_or_else(|| NavigationError::InvalidTarget {
                    reason: format!("not a URL: {}", url),
                }),
            Target::CompanyPeople {
                company: CompanyRef::Url(url),
            } => roster_url(site, url).ok_or_else(|| NavigationError::InvalidTarget {
                reason: format!("not a company page: {}", url),
            }),
            Target::CompanyPeople {
                company: CompanyRef::Name(name),
            } => {
                let name = name.trim();
                if name.is_empty() {
                    return Err(NavigationError::InvalidTarget {
                        reason: "empty company name".to_string(),
                    });
                }
                let search = Url::parse_with_params(&site.company_search_url, &[("keywords", name)])
                    .map_err(|e| NavigationError::InvalidTarget {
                        reason: format!("company search URL: {}", e),
                    })?
                    .to_string();

                self.navigate(session, &search).await?;
                let href = session
                    .driver()
                    .attribute(COMPANY_LINK_SELECTOR, "href")
                    .await
                    .map_err(|e| navigation_error(&search, e))?;

                let resolved = href.as_deref().and_then(|h| roster_url(site, h));
                match resolved {
                    Some(url) => {
                        info!(company = name, url = %url, "Resolved company");
                        Ok(url)
                    }
                    None => Err(NavigationError::NotFound { url: search }),
                }
            }
        }
    }

    /// Resolve and open a target's feed view.
    pub async fn open_view(
        &self,
        session: &Session<L::Driver>,
        target: &Target,
    ) -> Result<ViewHandle, NavigationError> {
        let url = self.resolve_target(session, target).await?;
        self.navigate(session, &url).await
    }
}

pub(crate) fn navigation_error(url: &str, error: DriverError) -> NavigationError {
    let url = url.to_string();
    match error {
        DriverError::NotFound(_) => NavigationError::NotFound { url },
        DriverError::AccessDenied(_) => NavigationError::AccessDenied { url },
        e if e.is_transient() => NavigationError::Unreachable { url, source: e },
        e => NavigationError::Driver { url, source: e },
    }
}

/// Reject landings on a login wall, challenge or not-found page.
fn check_landing(site: &SiteConfig, requested: &str, state: &PageState) -> Result<(), NavigationError> {
    let url = requested.to_string();
    let bounced = |markers: &[String]| matches_any(&state.url, markers) && !matches_any(requested, markers);

    if bounced(&site.access_denied_markers) || bounced(&site.challenge_markers) {
        return Err(NavigationError::AccessDenied { url });
    }
    if matches_any(&state.title, &site.not_found_markers) || bounced(&site.not_found_markers) {
        return Err(NavigationError::NotFound { url });
    }
    Ok(())
}

fn matches_any(haystack: &str, markers: &[String]) -> bool {
    markers.iter().any(|m| haystack.contains(m.as_str()))
}

fn absolute_url(site: &SiteConfig, href: &str) -> Option<String> {
    let base = Url::parse(&site.base_url).ok()?;
    let url = base.join(href.trim()).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

/// People-tab URL for a company or people page link.
///
/// `/company/<slug>/people/` pages are kept as is (minus the query);
/// any other `/company/<slug>/...` page maps to its people tab.
pub fn roster_url(site: &SiteConfig, href: &str) -> Option<String> {
    let base = Url::parse(&site.base_url).ok()?;
    let mut url = base.join(href.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_query(None);
    url.set_fragment(None);

    let segments: Vec<String> = url
        .path_segments()?
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    let company = segments.iter().position(|s| s == "company")?;
    let slug = segments.get(company + 1)?;
    url.set_path(&format!("/company/{}/people/", slug));
    Some(url.to_string())
}
