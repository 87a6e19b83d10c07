//! Raw fragments captured from a rendered feed.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One feed item as rendered, before structured parsing.
///
/// Produced by a driver capture, handed once to the extractor and then
/// dropped. Only its [`fingerprint`](Self::fingerprint) outlives a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFragment {
    /// Position of the item in DOM order at capture time
    pub position: usize,

    /// Outer markup of the item
    pub html: String,

    /// Number of enclosing items of the same kind (0 = top level)
    #[serde(default)]
    pub depth: u32,

    /// Item sits inside a reply/child container
    #[serde(default)]
    pub is_reply: bool,

    /// Stable identifier exposed by the page (data-id, data-urn), if any
    #[serde(default)]
    pub dom_key: Option<String>,
}

impl RawFragment {
    /// Create a top-level fragment.
    pub fn new(position: usize, html: impl Into<String>) -> Self {
        Self {
            position,
            html: html.into(),
            depth: 0,
            is_reply: false,
            dom_key: None,
        }
    }

    /// Set the nesting depth.
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Mark as a reply.
    pub fn as_reply(mut self) -> Self {
        self.is_reply = true;
        self
    }

    /// Set the page-provided key.
    pub fn with_dom_key(mut self, key: impl Into<String>) -> Self {
        self.dom_key = Some(key.into());
        self
    }

    /// Whether this fragment is nested under another entry.
    pub fn is_nested(&self) -> bool {
        self.depth > 0 || self.is_reply
    }

    /// Identity used to diff captures across reveal cycles.
    ///
    /// Prefers the page's own key; otherwise hashes the markup, since
    /// DOM positions shift as replies expand.
    pub fn fingerprint(&self) -> String {
        match &self.dom_key {
            Some(key) if !key.is_empty() => format!("key:{}", key),
            _ => {
                let mut hasher = Sha256::new();
                hasher.update(self.html.as_bytes());
                format!("sha256:{:x}", hasher.finalize())
            }
        }
    }
}

/// What a driver should capture on each cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentQuery {
    /// CSS selector matching one feed item
    pub item_selector: String,

    /// Optional selector for containers whose descendants are replies
    #[serde(default)]
    pub reply_container_selector: Option<String>,
}

impl FragmentQuery {
    pub fn new(item_selector: impl Into<String>) -> Self {
        Self {
            item_selector: item_selector.into(),
            reply_container_selector: None,
        }
    }

    pub fn with_reply_container(mut self, selector: impl Into<String>) -> Self {
        self.reply_container_selector = Some(selector.into());
        self
    }
}
