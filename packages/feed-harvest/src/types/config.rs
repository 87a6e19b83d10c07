//! Configuration types for extraction runs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Tunables for one extraction run.
///
/// Constructed once per run and threaded through by reference; nothing in
/// the library reads configuration from globals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Pause between reveal cycles.
    ///
    /// Default: 2s.
    pub politeness_delay: Duration,

    /// Wait after navigating before the first capture.
    ///
    /// Default: 5s.
    pub settle_delay: Duration,

    /// Maximum reveal actions per run. `None` uses the target's default
    /// (10 for comment threads, 30 for rosters).
    pub max_cycles: Option<usize>,

    /// Consecutive captures with no new fragments before the feed is
    /// considered exhausted.
    ///
    /// Default: 2.
    pub empty_cycles_before_exhausted: usize,

    /// How long to probe for an already-authenticated session.
    pub login_probe_timeout: Duration,

    /// How long to wait for an interactive login to complete.
    pub login_timeout: Duration,

    /// Retry policy for transient driver and inference failures.
    pub retry: RetryPolicy,

    /// Timeout for one inference call.
    pub inference_timeout: Duration,

    /// Wall-clock bound for the whole run. Partial results are kept.
    pub deadline: Option<Duration>,

    /// Run the normalizer over accepted records when one is configured.
    pub normalize_records: bool,

    /// Site-specific URLs and selectors.
    #[serde(default)]
    pub site: SiteConfig,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            politeness_delay: Duration::from_secs(2),
            settle_delay: Duration::from_secs(5),
            max_cycles: None,
            empty_cycles_before_exhausted: 2,
            login_probe_timeout: Duration::from_secs(8),
            login_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            inference_timeout: Duration::from_secs(60),
            deadline: None,
            normalize_records: false,
            site: SiteConfig::default(),
        }
    }
}

impl HarvestConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Config with every wait set to zero; used by tests and mocks.
    pub fn immediate() -> Self {
        Self {
            politeness_delay: Duration::ZERO,
            settle_delay: Duration::ZERO,
            login_probe_timeout: Duration::ZERO,
            login_timeout: Duration::ZERO,
            retry: RetryPolicy::immediate(3),
            ..Self::default()
        }
    }

    pub fn with_politeness_delay(mut self, delay: Duration) -> Self {
        self.politeness_delay = delay;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_max_cycles(mut self, max: usize) -> Self {
        self.max_cycles = Some(max);
        self
    }

    pub fn with_empty_cycles_before_exhausted(mut self, cycles: usize) -> Self {
        self.empty_cycles_before_exhausted = cycles.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_inference_timeout(mut self, timeout: Duration) -> Self {
        self.inference_timeout = timeout;
        self
    }

    /// Enable the normalization post-pass for entity runs.
    pub fn normalize(mut self) -> Self {
        self.normalize_records = true;
        self
    }

    pub fn with_site(mut self, site: SiteConfig) -> Self {
        self.site = site;
        self
    }

    /// Effective reveal bound for a target.
    pub fn max_cycles_for(&self, target: &Target) -> usize {
        self.max_cycles.unwrap_or_else(|| target.default_max_cycles())
    }
}

/// URLs and selectors of the site being harvested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteConfig {
    pub base_url: String,
    pub feed_url: String,
    pub login_url: String,
    pub company_search_url: String,

    /// Present only when authenticated
    pub search_box_selector: String,
    pub username_selector: String,
    pub password_selector: String,
    pub submit_selector: String,

    /// URL fragments that mean the session was bounced to a login wall
    pub access_denied_markers: Vec<String>,
    /// URL fragments that mean the account hit a challenge
    pub challenge_markers: Vec<String>,
    /// Title fragments of the site's not-found page
    pub not_found_markers: Vec<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.linkedin.com".to_string(),
            feed_url: "https://www.linkedin.com/feed/".to_string(),
            login_url: "https://www.linkedin.com/login".to_string(),
            company_search_url: "https://www.linkedin.com/search/results/companies/".to_string(),
            search_box_selector: "input[aria-label='Search']".to_string(),
            username_selector: "#username".to_string(),
            password_selector: "#password".to_string(),
            submit_selector: "button[type='submit']".to_string(),
            access_denied_markers: vec![
                "/login".to_string(),
                "/authwall".to_string(),
                "/uas/login".to_string(),
            ],
            challenge_markers: vec!["/checkpoint".to_string(), "/challenge".to_string()],
            not_found_markers: vec!["Page not found".to_string(), "/404".to_string()],
        }
    }
}

/// Which company roster to open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyRef {
    /// Company page or people page URL
    Url(String),
    /// Company name to search for
    Name(String),
}

/// What an extraction run harvests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    /// Top-level comments on a post that carry a contact identifier
    PostComments { url: String },
    /// Employee cards on a company's people page
    CompanyPeople { company: CompanyRef },
}

impl Target {
    pub fn post_comments(url: impl Into<String>) -> Self {
        Self::PostComments { url: url.into() }
    }

    pub fn company_url(url: impl Into<String>) -> Self {
        Self::CompanyPeople {
            company: CompanyRef::Url(url.into()),
        }
    }

    pub fn company_name(name: impl Into<String>) -> Self {
        Self::CompanyPeople {
            company: CompanyRef::Name(name.into()),
        }
    }

    /// Reveal bound when the config does not override it.
    pub fn default_max_cycles(&self) -> usize {
        match self {
            Self::PostComments { .. } => 10,
            Self::CompanyPeople { .. } => 30,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PostComments { url } => write!(f, "comments:{}", url),
            Self::CompanyPeople {
                company: CompanyRef::Url(url),
            } => write!(f, "people:{}", url),
            Self::CompanyPeople {
                company: CompanyRef::Name(name),
            } => write!(f, "people:\"{}\"", name),
        }
    }
}
