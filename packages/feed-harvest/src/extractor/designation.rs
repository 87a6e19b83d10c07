//! Seniority keywords for roster headlines.

use lazy_static::lazy_static;
use regex::Regex;

/// Titles that mark a senior or decision-making role.
pub const DESIGNATION_KEYWORDS: &[&str] = &[
    "CEO",
    "CTO",
    "CFO",
    "COO",
    "President",
    "Vice President",
    "VP",
    "SVP",
    "EVP",
    "Director",
    "Managing Director",
    "Head of",
    "Lead",
    "Manager",
    "Principal",
    "Senior",
    "Founder",
    "Co-Founder",
    "Partner",
    "Chief",
];

lazy_static! {
    static ref DESIGNATION_PATTERNS: Vec<Regex> = DESIGNATION_KEYWORDS
        .iter()
        .map(|kw| Regex::new(&format!(r"(?i)\b{}\b", regex::escape(kw))).unwrap())
        .collect();
}

/// Number of distinct seniority keywords present in `headline`.
///
/// Overlapping keywords count separately ("Vice President" also matches
/// "President"), which ranks compound titles higher.
pub fn designation_score(headline: &str) -> usize {
    DESIGNATION_PATTERNS
        .iter()
        .filter(|re| re.is_match(headline))
        .count()
}
