//! Entity extraction: one raw fragment in, zero or one candidate out.
//!
//! The extractor is a pure function over [`RawFragment`]. It never errors:
//! anything it cannot use becomes a [`Rejection`] so a single odd item can't
//! abort a run.

pub mod designation;
pub mod profile_text;
pub mod profiles;

use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::ProfileError;
use crate::types::fragment::RawFragment;
use crate::types::record::{CandidateRecord, IdentityKey};

pub use designation::designation_score;
pub use profile_text::clean_profile_text;
pub use profiles::{ExtractionProfile, KeyStrategy, RevealControl};

/// Base used to resolve relative profile links.
pub const DEFAULT_BASE_URL: &str = "https://www.linkedin.com";

lazy_static! {
    // Contact identifier: email-shaped substring
    static ref CONTACT_IDENTIFIER: Regex =
        Regex::new(r"[\w.-]+@[\w.-]+\.[A-Za-z]{2,}").unwrap();
}

/// First contact identifier in `text`, if any.
pub fn find_contact_identifier(text: &str) -> Option<&str> {
    CONTACT_IDENTIFIER.find(text).map(|m| m.as_str())
}

/// Why a fragment produced no candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Nested under another entry (depth > 0 or reply container)
    Nested,
    /// Free text starts with the reply marker
    ReplyMarker,
    /// Profile requires a display name and none was found
    MissingName,
    /// Display name is a placeholder
    ExcludedName,
    /// No identity key could be derived
    NoIdentityKey,
}

/// Compiled form of an [`ExtractionProfile`].
#[derive(Debug)]
pub struct EntityExtractor {
    profile: ExtractionProfile,
    base_url: Url,
    link: Option<Selector>,
    name: Option<Selector>,
    headline: Option<Selector>,
    body: Option<Selector>,
}

impl EntityExtractor {
    /// Compile a profile against the default base URL.
    pub fn new(profile: ExtractionProfile) -> Result<Self, ProfileError> {
        Self::with_base_url(profile, DEFAULT_BASE_URL)
    }

    /// Compile a profile, resolving relative links against `base_url`.
    pub fn with_base_url(profile: ExtractionProfile, base_url: &str) -> Result<Self, ProfileError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ProfileError::Invalid(format!("base URL `{}`: {}", base_url, e)))?;

        Ok(Self {
            link: compile(profile.profile_link_selector.as_deref())?,
            name: compile(profile.name_selector.as_deref())?,
            headline: compile(profile.headline_selector.as_deref())?,
            body: compile(profile.body_selector.as_deref())?,
            base_url,
            profile,
        })
    }

    pub fn profile(&self) -> &ExtractionProfile {
        &self.profile
    }

    /// Candidate for `fragment`, or `None` when it is unusable.
    pub fn extract(&self, fragment: &RawFragment) -> Option<CandidateRecord> {
        self.classify(fragment).ok()
    }

    /// Like [`extract`](Self::extract) but reports why a fragment was dropped.
    pub fn classify(&self, fragment: &RawFragment) -> Result<CandidateRecord, Rejection> {
        // Only top-level entries count
        if fragment.is_nested() {
            return Err(Rejection::Nested);
        }

        let document = Html::parse_fragment(&fragment.html);
        let root = document.root_element();

        let free_text = match &self.body {
            Some(selector) => first_text(root, selector).unwrap_or_default(),
            None => element_text(root),
        };

        if let Some(marker) = self.profile.reply_marker {
            if free_text.starts_with(marker) {
                return Err(Rejection::ReplyMarker);
            }
        }

        let display_name = self.name.as_ref().and_then(|s| first_text(root, s));
        let headline = self.headline.as_ref().and_then(|s| first_text(root, s));
        let profile_url = self
            .link
            .as_ref()
            .and_then(|s| root.select(s).next())
            .and_then(|el| el.value().attr("href"))
            .and_then(|href| self.canonical_url(href));

        match &display_name {
            None if self.profile.require_name => return Err(Rejection::MissingName),
            Some(name) if self.profile.excluded_names.iter().any(|x| x == name) => {
                return Err(Rejection::ExcludedName)
            }
            _ => {}
        }

        let identity_key = match self.profile.key_strategy {
            KeyStrategy::ContactIdentifier => {
                find_contact_identifier(&free_text).and_then(IdentityKey::new)
            }
            KeyStrategy::ProfileUrl => profile_url.as_deref().and_then(IdentityKey::new),
        }
        .ok_or(Rejection::NoIdentityKey)?;

        Ok(CandidateRecord {
            identity_key,
            display_name,
            headline,
            profile_url,
            free_text,
            depth: fragment.depth,
        })
    }

    /// Absolute http(s) URL without query or fragment.
    pub fn canonical_url(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() {
            return None;
        }
        let mut url = self.base_url.join(href).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        url.set_query(None);
        url.set_fragment(None);
        Some(url.to_string())
    }
}

fn compile(selector: Option<&str>) -> Result<Option<Selector>, ProfileError> {
    selector
        .map(|s| {
            Selector::parse(s).map_err(|e| ProfileError::InvalidSelector {
                selector: s.to_string(),
                reason: format!("{:?}", e),
            })
        })
        .transpose()
}

/// Whitespace-collapsed text of an element.
fn element_text(element: ElementRef<'_>) -> String {
    let joined = element.text().collect::<Vec<_>>().join(" ");
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text of the first match, if non-empty.
fn first_text(root: ElementRef<'_>, selector: &Selector) -> Option<String> {
    root.select(selector)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
}
