//! Candidate and accepted records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::extractor::designation::designation_score;

/// The value used to deduplicate records within a run.
///
/// Never empty: construction fails for blank input, so a record without an
/// extractable key cannot exist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Build a key from trimmed, non-empty input.
    pub fn new(value: impl AsRef<str>) -> Option<Self> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A parsed fragment awaiting admission to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRecord {
    pub identity_key: IdentityKey,
    pub display_name: Option<String>,
    pub headline: Option<String>,
    pub profile_url: Option<String>,
    pub free_text: String,
    pub depth: u32,
}

impl CandidateRecord {
    /// Create a candidate with only a key and free text.
    pub fn new(identity_key: IdentityKey, free_text: impl Into<String>) -> Self {
        Self {
            identity_key,
            display_name: None,
            headline: None,
            profile_url: None,
            free_text: free_text.into(),
            depth: 0,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_headline(mut self, headline: impl Into<String>) -> Self {
        self.headline = Some(headline.into());
        self
    }

    pub fn with_profile_url(mut self, url: impl Into<String>) -> Self {
        self.profile_url = Some(url.into());
        self
    }
}

/// A record admitted to the accumulation store.
///
/// The identity key and admission sequence are fixed at acceptance;
/// enrichment only ever fills [`structured`](Self::structured).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedRecord {
    identity_key: IdentityKey,
    sequence: usize,

    pub display_name: Option<String>,
    pub headline: Option<String>,
    pub profile_url: Option<String>,
    pub free_text: String,
    pub accepted_at: DateTime<Utc>,

    /// Normalized fields, when the optional post-pass ran
    #[serde(default)]
    pub structured: Option<StructuredFields>,
}

impl AcceptedRecord {
    pub(crate) fn admit(candidate: CandidateRecord, sequence: usize) -> Self {
        Self {
            identity_key: candidate.identity_key,
            sequence,
            display_name: candidate.display_name,
            headline: candidate.headline,
            profile_url: candidate.profile_url,
            free_text: candidate.free_text,
            accepted_at: Utc::now(),
            structured: None,
        }
    }

    pub fn identity_key(&self) -> &IdentityKey {
        &self.identity_key
    }

    /// Zero-based admission order within the run.
    pub fn sequence(&self) -> usize {
        self.sequence
    }

    /// Count of seniority keywords in the headline.
    pub fn designation_score(&self) -> usize {
        self.headline.as_deref().map(designation_score).unwrap_or(0)
    }

    pub(crate) fn with_structured(mut self, fields: StructuredFields) -> Self {
        self.structured = Some(fields);
        self
    }
}

/// Where a set of structured fields came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    /// Parsed from an inference response
    Inference,
    /// Built locally after inference failed or was disabled
    Fallback,
}

/// Normalized profile-shaped fields.
///
/// List-valued sections are flattened to `"; "`-joined strings so every
/// field maps to a single output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredFields {
    pub name: String,
    pub headline: String,
    pub location: String,
    pub about: String,
    pub experience: String,
    pub education: String,
    pub skills: String,
    pub certifications: String,
    pub languages: String,
    pub source: FieldSource,
}

impl StructuredFields {
    /// All-empty fields with the given source.
    pub fn empty(source: FieldSource) -> Self {
        Self {
            name: String::new(),
            headline: String::new(),
            location: String::new(),
            about: String::new(),
            experience: String::new(),
            education: String::new(),
            skills: String::new(),
            certifications: String::new(),
            languages: String::new(),
            source,
        }
    }

    /// Pass-through of what the extractor already captured.
    pub fn from_record(record: &AcceptedRecord) -> Self {
        Self {
            name: record.display_name.clone().unwrap_or_default(),
            headline: record.headline.clone().unwrap_or_default(),
            about: record.free_text.clone(),
            ..Self::empty(FieldSource::Fallback)
        }
    }

    /// Best-effort split of cleaned profile text: first line is the name,
    /// second the headline, the rest is kept as the about section.
    pub fn from_profile_text(text: &str) -> Self {
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
        let name = lines.next().unwrap_or_default().to_string();
        let headline = lines.next().unwrap_or_default().to_string();
        let about = lines.collect::<Vec<_>>().join("\n");
        Self {
            name,
            headline,
            about,
            ..Self::empty(FieldSource::Fallback)
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.source == FieldSource::Fallback
    }
}

/// Result of a single-profile extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub profile_url: String,
    pub fields: StructuredFields,
    /// Cleaned page text the fields were derived from
    pub cleaned_text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_key_rejects_blank() {
        assert!(IdentityKey::new("").is_none());
        assert!(IdentityKey::new("   ").is_none());
        assert_eq!(IdentityKey::new(" a@x.com ").unwrap().as_str(), "a@x.com");
    }

    #[test]
    fn test_fallback_from_record_keeps_captured_fields() {
        let candidate = CandidateRecord::new(IdentityKey::new("a@x.com").unwrap(), "hello")
            .with_name("Ada")
            .with_headline("CTO at X");
        let record = AcceptedRecord::admit(candidate, 0);
        let fields = StructuredFields::from_record(&record);
        assert_eq!(fields.name, "Ada");
        assert_eq!(fields.headline, "CTO at X");
        assert_eq!(fields.about, "hello");
        assert!(fields.is_fallback());
    }

    #[test]
    fn test_fallback_from_profile_text() {
        let fields = StructuredFields::from_profile_text("Ada Lovelace\n\nAnalyst\nLondon\nLoves engines");
        assert_eq!(fields.name, "Ada Lovelace");
        assert_eq!(fields.headline, "Analyst");
        assert_eq!(fields.about, "London\nLoves engines");
    }

    #[test]
    fn test_designation_score_on_record() {
        let candidate = CandidateRecord::new(IdentityKey::new("k").unwrap(), "")
            .with_headline("Co-Founder & CEO");
        let record = AcceptedRecord::admit(candidate, 0);
        assert!(record.designation_score() >= 2);
    }
}
