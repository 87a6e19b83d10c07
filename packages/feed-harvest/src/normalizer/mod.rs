//! Structured-data normalizer.
//!
//! Sends free text to an [`Inference`] backend and parses the reply into
//! [`StructuredFields`]. Enrichment never gates a record: on any failure
//! the record keeps a locally built fallback instead.

pub mod prompts;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{NormalizationError, NormalizeResult};
use crate::retry::{with_retry, RetryPolicy};
use crate::traits::inference::Inference;
use crate::types::config::HarvestConfig;
use crate::types::record::{AcceptedRecord, FieldSource, StructuredFields};

pub use prompts::{format_normalize_prompt, normalize_prompt_hash};

lazy_static! {
    static ref JSON_OBJECT: Regex = Regex::new(r"(?s)\{.*\}").unwrap();
}

/// Inference-backed normalizer with timeout and bounded retry.
#[derive(Clone)]
pub struct Normalizer {
    inference: Arc<dyn Inference>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl Normalizer {
    pub fn new(inference: Arc<dyn Inference>, config: &HarvestConfig) -> Self {
        Self {
            inference,
            retry: config.retry.clone(),
            timeout: config.inference_timeout,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Name of the inference backend.
    pub fn backend(&self) -> &str {
        self.inference.name()
    }

    /// Structure `text` through the inference backend.
    pub async fn normalize(&self, text: &str) -> NormalizeResult<StructuredFields> {
        if text.trim().is_empty() {
            return Err(NormalizationError::Empty);
        }

        let prompt = format_normalize_prompt(text);
        let prompt_hash = normalize_prompt_hash();
        debug!(
            backend = self.backend(),
            prompt_hash = %&prompt_hash[..12],
            text_len = text.len(),
            "Normalizing text"
        );

        let response = with_retry(
            &self.retry,
            "normalize",
            |e: &NormalizationError| e.is_transient(),
            || self.call(&prompt),
        )
        .await?;

        parse_structured_response(&response)
    }

    async fn call(&self, prompt: &str) -> NormalizeResult<String> {
        match tokio::time::timeout(self.timeout, self.inference.complete(prompt)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(NormalizationError::Timeout),
        }
    }

    /// Normalize `text`, substituting `fallback` on failure. The flag is
    /// `true` when the fallback was used.
    pub async fn normalize_or(
        &self,
        text: &str,
        fallback: impl FnOnce() -> StructuredFields,
    ) -> (StructuredFields, bool) {
        match self.normalize(text).await {
            Ok(fields) => (fields, false),
            Err(e) => {
                warn!(error = %e, "Normalization failed, using local fields");
                (fallback(), true)
            }
        }
    }

    /// Attach structured fields to an accepted record. The identity key is
    /// untouched; only `structured` is filled.
    pub async fn enrich(&self, record: AcceptedRecord) -> (AcceptedRecord, bool) {
        let text = record_text(&record);
        let (fields, fell_back) = self
            .normalize_or(&text, || StructuredFields::from_record(&record))
            .await;
        if fell_back {
            debug!(identity_key = %record.identity_key(), "Record kept with fallback fields");
        }
        (record.with_structured(fields), fell_back)
    }
}

impl std::fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normalizer")
            .field("backend", &self.backend())
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Everything the extractor captured, one item per line.
fn record_text(record: &AcceptedRecord) -> String {
    [
        record.display_name.as_deref(),
        record.headline.as_deref(),
        Some(record.free_text.as_str()),
    ]
    .into_iter()
    .flatten()
    .filter(|s| !s.trim().is_empty())
    .collect::<Vec<_>>()
    .join("\n")
}

/// Parse an inference reply into structured fields.
///
/// Tolerates code fences and chatter around the JSON object. Scalar fields
/// may arrive as strings or lists; list sections are flattened to
/// `"; "`-joined strings.
pub fn parse_structured_response(raw: &str) -> NormalizeResult<StructuredFields> {
    let unfenced = strip_fences(raw);
    if unfenced.is_empty() {
        return Err(NormalizationError::Empty);
    }

    let json = JSON_OBJECT
        .find(unfenced)
        .ok_or_else(|| NormalizationError::Malformed("no JSON object in response".to_string()))?;
    let profile: ProfileResponse = serde_json::from_str(json.as_str())
        .map_err(|e| NormalizationError::Malformed(e.to_string()))?;

    let fields = profile.into_fields();
    if fields == StructuredFields::empty(FieldSource::Inference) {
        return Err(NormalizationError::Empty);
    }
    Ok(fields)
}

fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

#[derive(Debug, Default, Deserialize)]
struct ProfileResponse {
    #[serde(rename = "Name", default, deserialize_with = "text")]
    name: String,
    #[serde(rename = "Headline", default, deserialize_with = "text")]
    headline: String,
    #[serde(rename = "Location", default, deserialize_with = "text")]
    location: String,
    #[serde(rename = "About", default, deserialize_with = "text")]
    about: String,
    #[serde(rename = "Experience", default, deserialize_with = "entries")]
    experience: Vec<ExperienceEntry>,
    #[serde(rename = "Education", default, deserialize_with = "entries")]
    education: Vec<EducationEntry>,
    #[serde(rename = "Skills", default, deserialize_with = "text")]
    skills: String,
    #[serde(rename = "Certifications", default, deserialize_with = "text")]
    certifications: String,
    #[serde(rename = "Languages", default, deserialize_with = "text")]
    languages: String,
}

#[derive(Debug, Default, Deserialize)]
struct ExperienceEntry {
    #[serde(rename = "Title", default, deserialize_with = "text")]
    title: String,
    #[serde(rename = "Company", default, deserialize_with = "text")]
    company: String,
    #[serde(rename = "Start_Date", default, deserialize_with = "text")]
    start: String,
    #[serde(rename = "End_Date", default, deserialize_with = "text")]
    end: String,
}

#[derive(Debug, Default, Deserialize)]
struct EducationEntry {
    #[serde(rename = "Institution", default, deserialize_with = "text")]
    institution: String,
    #[serde(rename = "Degree", default, deserialize_with = "text")]
    degree: String,
    #[serde(rename = "Field_of_Study", default, deserialize_with = "text")]
    field: String,
    #[serde(rename = "Start_Date", default, deserialize_with = "text")]
    start: String,
    #[serde(rename = "End_Date", default, deserialize_with = "text")]
    end: String,
}

impl ExperienceEntry {
    /// "Title at Company (Start - End)"
    fn render(&self) -> String {
        let mut out = format!("{} at {}", self.title, self.company);
        if !self.start.is_empty() || !self.end.is_empty() {
            out.push_str(&format!(" ({} - {})", self.start, self.end));
        }
        out
    }
}

impl EducationEntry {
    /// "Degree at Institution (Field) [Start - End]"
    fn render(&self) -> String {
        let mut out = format!("{} at {}", self.degree, self.institution);
        if !self.field.is_empty() {
            out.push_str(&format!(" ({})", self.field));
        }
        if !self.start.is_empty() || !self.end.is_empty() {
            out.push_str(&format!(" [{} - {}]", self.start, self.end));
        }
        out
    }
}

impl ProfileResponse {
    fn into_fields(self) -> StructuredFields {
        StructuredFields {
            experience: join_rendered(self.experience.iter().map(ExperienceEntry::render)),
            education: join_rendered(self.education.iter().map(EducationEntry::render)),
            name: self.name,
            headline: self.headline,
            location: self.location,
            about: self.about,
            skills: self.skills,
            certifications: self.certifications,
            languages: self.languages,
            source: FieldSource::Inference,
        }
    }
}

fn join_rendered(items: impl Iterator<Item = String>) -> String {
    items.collect::<Vec<_>>().join("; ")
}

/// Strings pass through; lists of strings are comma-joined; null is empty.
fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    })
}

/// A list of objects; entries that are not objects of the right shape are
/// dropped. Anything other than a list is treated as empty.
fn entries<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter(Value::is_object)
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect(),
        _ => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InferenceError;
    use crate::testing::MockInference;
    use crate::types::record::{CandidateRecord, IdentityKey};

    const RESPONSE: &str = r#"```json
{
  "Name": "Ada Lovelace",
  "Headline": "Analyst",
  "Location": "London",
  "About": "",
  "Experience": [
    {"Title": "Analyst", "Company": "Engines Ltd", "Start_Date": "1842", "End_Date": "Present"},
    {"Title": "Translator", "Company": "Self"},
    "not an object"
  ],
  "Education": [
    {"Degree": "Tutoring", "Institution": "Home", "Field_of_Study": "Mathematics", "Start_Date": "1830", "End_Date": "1835"}
  ],
  "Skills": ["Mathematics", "Notes"],
  "Certifications": null,
  "Languages": "English, French"
}
```"#;

    fn normalizer(inference: MockInference) -> Normalizer {
        Normalizer::new(Arc::new(inference), &HarvestConfig::immediate())
    }

    fn record() -> AcceptedRecord {
        let candidate = CandidateRecord::new(IdentityKey::new("a@x.com").unwrap(), "contact me at a@x.com")
            .with_name("Ada")
            .with_headline("Analyst");
        AcceptedRecord::admit(candidate, 0)
    }

    #[test]
    fn test_parse_and_flatten() {
        let fields = parse_structured_response(RESPONSE).unwrap();
        assert_eq!(fields.name, "Ada Lovelace");
        assert_eq!(
            fields.experience,
            "Analyst at Engines Ltd (1842 - Present); Translator at Self"
        );
        assert_eq!(
            fields.education,
            "Tutoring at Home (Mathematics) [1830 - 1835]"
        );
        assert_eq!(fields.skills, "Mathematics, Notes");
        assert_eq!(fields.certifications, "");
        assert_eq!(fields.languages, "English, French");
        assert_eq!(fields.source, FieldSource::Inference);
    }

    #[test]
    fn test_parse_with_surrounding_chatter() {
        let fields =
            parse_structured_response("Sure! Here you go: {\"Name\": \"Ada\"} Hope that helps.")
                .unwrap();
        assert_eq!(fields.name, "Ada");
        assert_eq!(fields.experience, "");
    }

    #[test]
    fn test_parse_failures() {
        assert!(matches!(
            parse_structured_response("   "),
            Err(NormalizationError::Empty)
        ));
        assert!(matches!(
            parse_structured_response("```json\n```"),
            Err(NormalizationError::Empty)
        ));
        assert!(matches!(
            parse_structured_response("I cannot help with that."),
            Err(NormalizationError::Malformed(_))
        ));
        assert!(matches!(
            parse_structured_response("{\"Name\": \"Ada\",}"),
            Err(NormalizationError::Malformed(_))
        ));
        assert!(matches!(
            parse_structured_response("{}"),
            Err(NormalizationError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_enrich_uses_inference() {
        let inference = MockInference::new().with_response(RESPONSE);
        let (enriched, fell_back) = normalizer(inference.clone()).enrich(record()).await;

        assert!(!fell_back);
        assert_eq!(enriched.identity_key().as_str(), "a@x.com");
        let fields = enriched.structured.unwrap();
        assert_eq!(fields.location, "London");
        assert_eq!(inference.calls().len(), 1);
        assert!(inference.calls()[0].contains("contact me at a@x.com"));
    }

    #[tokio::test]
    async fn test_enrich_falls_back_on_malformed() {
        let inference = MockInference::new().with_response("not json at all");
        let (enriched, fell_back) = normalizer(inference).enrich(record()).await;

        assert!(fell_back);
        assert_eq!(enriched.identity_key().as_str(), "a@x.com");
        let fields = enriched.structured.unwrap();
        assert!(fields.is_fallback());
        assert_eq!(fields.name, "Ada");
        assert_eq!(fields.about, "contact me at a@x.com");
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let inference = MockInference::new()
            .with_failure(InferenceError::Api {
                status: 503,
                message: "overloaded".into(),
            })
            .with_response(RESPONSE);
        let fields = normalizer(inference.clone())
            .normalize("Ada Lovelace")
            .await
            .unwrap();
        assert_eq!(fields.name, "Ada Lovelace");
        assert_eq!(inference.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let inference = MockInference::new().with_failure(InferenceError::Api {
            status: 401,
            message: "bad key".into(),
        });
        let result = normalizer(inference.clone()).normalize("Ada").await;
        assert!(matches!(result, Err(NormalizationError::Inference(_))));
        assert_eq!(inference.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_timeout() {
        let inference = MockInference::new()
            .with_response(RESPONSE)
            .with_delay(Duration::from_millis(200));
        let result = normalizer(inference)
            .with_retry(RetryPolicy::none())
            .with_timeout(Duration::from_millis(10))
            .normalize("Ada")
            .await;
        assert!(matches!(result, Err(NormalizationError::Timeout)));
    }

    #[tokio::test]
    async fn test_empty_input_skips_backend() {
        let inference = MockInference::new().with_response(RESPONSE);
        let result = normalizer(inference.clone()).normalize("  \n ").await;
        assert!(matches!(result, Err(NormalizationError::Empty)));
        assert!(inference.calls().is_empty());
    }
}
