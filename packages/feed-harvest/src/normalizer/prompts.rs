//! Prompt for the structured-data normalizer.

use sha2::{Digest, Sha256};

/// Prompt for turning profile-shaped free text into structured fields.
pub const NORMALIZE_PROMPT: &str = r#"Extract structured profile information from the text below.

Return ONLY a JSON object, no commentary, with exactly these keys:
{
  "Name": "string",
  "Headline": "string",
  "Location": "string",
  "About": "string",
  "Experience": [
    {
      "Title": "string",
      "Company": "string",
      "Employment_Type": "string",
      "Start_Date": "string",
      "End_Date": "string",
      "Location": "string",
      "Description": "string"
    }
  ],
  "Education": [
    {
      "Institution": "string",
      "Degree": "string",
      "Field_of_Study": "string",
      "Start_Date": "string",
      "End_Date": "string"
    }
  ],
  "Skills": "comma-separated string",
  "Certifications": "comma-separated string",
  "Languages": "comma-separated string"
}

Rules:
- Use "" for missing text fields and [] for missing Experience/Education
- Use "Present" as End_Date for ongoing roles
- Keep dates as written in the text

Text:
{content}"#;

/// Hash of the prompt template, logged so responses can be traced to the
/// prompt revision that produced them.
pub fn normalize_prompt_hash() -> String {
    let mut hasher = Sha256::new();
    hasher.update(NORMALIZE_PROMPT.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Format the normalization prompt.
pub fn format_normalize_prompt(content: &str) -> String {
    NORMALIZE_PROMPT.replace("{content}", content)
}
