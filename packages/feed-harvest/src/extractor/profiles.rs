//! Selector profiles: where things live inside one feed item.
//!
//! Each [`Target`] maps to a profile. All guessing about page structure is
//! confined here and in the extractor that compiles it.

use serde::{Deserialize, Serialize};

use crate::types::config::Target;
use crate::types::fragment::FragmentQuery;

/// How an item's identity key is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    /// First contact identifier (email-shaped substring) in the free text
    ContactIdentifier,
    /// Canonical profile URL (query and fragment stripped)
    ProfileUrl,
}

/// The "reveal more" control of a feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealControl {
    /// Selector for candidate controls
    pub selector: String,

    /// Required visible text, when the selector alone is ambiguous
    #[serde(default)]
    pub text: Option<String>,

    /// Scroll to the bottom before each reveal so lazy items render
    #[serde(default)]
    pub scroll_before: bool,
}

/// Everything needed to turn a feed's fragments into candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionProfile {
    /// Label used in logs
    pub name: String,

    pub query: FragmentQuery,
    pub reveal: RevealControl,

    pub profile_link_selector: Option<String>,
    pub name_selector: Option<String>,
    pub headline_selector: Option<String>,

    /// Free-text container. `None` uses the whole fragment's text.
    pub body_selector: Option<String>,

    pub key_strategy: KeyStrategy,

    /// Free text starting with this character is a reply
    pub reply_marker: Option<char>,

    /// Display names that mark placeholder entries
    #[serde(default)]
    pub excluded_names: Vec<String>,

    /// Reject items without a display name
    #[serde(default)]
    pub require_name: bool,
}

impl ExtractionProfile {
    /// Top-level comments on a post, keyed by contact identifier.
    pub fn post_comments() -> Self {
        const META: &str = "a.comments-comment-meta__description-container";
        Self {
            name: "post_comments".to_string(),
            query: FragmentQuery::new("article.comments-comment-entity"),
            reveal: RevealControl {
                selector: "button".to_string(),
                text: Some("Load more comments".to_string()),
                scroll_before: false,
            },
            profile_link_selector: Some(META.to_string()),
            name_selector: Some(format!(
                "{} h3.comments-comment-meta__description span.comments-comment-meta__description-title",
                META
            )),
            headline_selector: Some(format!(
                "{} div.comments-comment-meta__description-subtitle",
                META
            )),
            body_selector: Some("span.comments-comment-item__main-content".to_string()),
            key_strategy: KeyStrategy::ContactIdentifier,
            reply_marker: Some('@'),
            excluded_names: vec![],
            require_name: false,
        }
    }

    /// Employee cards on a company people page, keyed by profile URL.
    pub fn company_people() -> Self {
        Self {
            name: "company_people".to_string(),
            query: FragmentQuery::new(".org-people-profile-card__profile-info"),
            reveal: RevealControl {
                selector: "button.scaffold-finite-scroll__load-button".to_string(),
                text: None,
                scroll_before: true,
            },
            profile_link_selector: Some(".artdeco-entity-lockup__title a".to_string()),
            name_selector: Some(".artdeco-entity-lockup__title a .lt-line-clamp".to_string()),
            headline_selector: Some(".artdeco-entity-lockup__subtitle .lt-line-clamp".to_string()),
            body_selector: None,
            key_strategy: KeyStrategy::ProfileUrl,
            reply_marker: None,
            excluded_names: vec!["LinkedIn Member".to_string(), "N/A".to_string()],
            require_name: true,
        }
    }

    /// Profile for a run target.
    pub fn for_target(target: &Target) -> Self {
        match target {
            Target::PostComments { .. } => Self::post_comments(),
            Target::CompanyPeople { .. } => Self::company_people(),
        }
    }
}
