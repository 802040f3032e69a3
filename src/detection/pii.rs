//! PII (Personally Identifiable Information) types and pattern-based detection.
//!
//! Detects emails, SSNs, phone numbers, credit cards, IP addresses, street
//! addresses and API secrets with regular expressions.

use super::{resolve_overlaps, Detector};
use crate::redaction::placeholder;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Types of PII that can be detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PiiType {
    Email,
    Phone,
    CreditCard,
    Ssn,
    IpAddress,
    Address,
    Name,
    Location,
    Organization,
    Secret,
}

impl PiiType {
    /// Every category, in declaration order.
    pub const ALL: [PiiType; 10] = [
        PiiType::Email,
        PiiType::Phone,
        PiiType::CreditCard,
        PiiType::Ssn,
        PiiType::IpAddress,
        PiiType::Address,
        PiiType::Name,
        PiiType::Location,
        PiiType::Organization,
        PiiType::Secret,
    ];

    /// Get the label used inside placeholder tokens (`[<LABEL>_<N>]`)
    pub fn as_str(&self) -> &'static str {
        match self {
            PiiType::Email => "EMAIL",
            PiiType::Phone => "PHONE",
            PiiType::CreditCard => "CREDIT_CARD",
            PiiType::Ssn => "SSN",
            PiiType::IpAddress => "IP_ADDRESS",
            PiiType::Address => "ADDRESS",
            PiiType::Name => "NAME",
            PiiType::Location => "LOCATION",
            PiiType::Organization => "ORGANIZATION",
            PiiType::Secret => "SECRET",
        }
    }
}

impl fmt::Display for PiiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PiiType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().to_uppercase().replace('-', "_");
        PiiType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == label)
            .ok_or_else(|| format!("Invalid PII type: {}", s))
    }
}

/// A detected occurrence of PII in text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PiiSpan {
    #[serde(rename = "type")]
    pub pii_type: PiiType,
    /// The exact substring that was matched
    pub value: String,
    /// Byte offset of `value` in the source text
    pub index: usize,
}

impl PiiSpan {
    pub fn new(pii_type: PiiType, value: impl Into<String>, index: usize) -> Self {
        Self {
            pii_type,
            value: value.into(),
            index,
        }
    }

    /// Byte offset one past the end of the span
    pub fn end(&self) -> usize {
        self.index + self.value.len()
    }
}

/// A single regex rule with an optional post-match validator
struct PatternRule {
    pii_type: PiiType,
    regex: Regex,
    validate: Option<fn(&str) -> bool>,
}

/// Detector for structured PII that has a recognizable shape
pub struct PatternDetector {
    rules: Vec<PatternRule>,
}

impl Default for PatternDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternDetector {
    /// Create a new pattern detector with every rule enabled
    pub fn new() -> Self {
        Self::without(&[])
    }

    /// Create a pattern detector that skips the given categories
    pub fn without(disabled: &[PiiType]) -> Self {
        let rules = vec![
            PatternRule {
                pii_type: PiiType::Email,
                regex: Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}")
                    .expect("Invalid email regex"),
                validate: None,
            },
            PatternRule {
                pii_type: PiiType::Ssn,
                regex: Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("Invalid SSN regex"),
                validate: None,
            },
            PatternRule {
                pii_type: PiiType::CreditCard,
                regex: Regex::new(r"\b(?:\d[ -]?){12,18}\d\b")
                    .expect("Invalid credit card regex"),
                validate: Some(passes_luhn),
            },
            PatternRule {
                pii_type: PiiType::Phone,
                regex: Regex::new(r"(?:\+1[-.\s]?)?(?:\(\d{3}\)|\b\d{3})[-.\s]?\d{3}[-.\s]?\d{4}\b")
                    .expect("Invalid phone regex"),
                validate: None,
            },
            PatternRule {
                pii_type: PiiType::IpAddress,
                regex: Regex::new(
                    r"\b(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\b",
                )
                .expect("Invalid IP regex"),
                validate: None,
            },
            PatternRule {
                pii_type: PiiType::Address,
                regex: Regex::new(
                    r"\b\d{1,6}\s+(?:[A-Z][a-zA-Z]*\s+){1,4}(?:Street|St|Avenue|Ave|Road|Rd|Boulevard|Blvd|Lane|Ln|Drive|Dr|Court|Ct|Way|Place|Pl|Terrace|Parkway|Pkwy|Highway|Hwy)\b",
                )
                .expect("Invalid address regex"),
                validate: None,
            },
            PatternRule {
                pii_type: PiiType::Secret,
                regex: Regex::new(
                    r"\b(?:sk-ant-[A-Za-z0-9_\-]{10,}|sk-[A-Za-z0-9]{32,}|ghp_[A-Za-z0-9]{20,}|glpat-[A-Za-z0-9_\-]{16,}|xox[abps]-[A-Za-z0-9\-]{10,}|AKIA[0-9A-Z]{16})",
                )
                .expect("Invalid secret regex"),
                validate: None,
            },
        ];

        Self {
            rules: rules
                .into_iter()
                .filter(|rule| !disabled.contains(&rule.pii_type))
                .collect(),
        }
    }

    /// Categories this detector can report
    pub fn types(&self) -> Vec<PiiType> {
        self.rules.iter().map(|r| r.pii_type).collect()
    }

    /// Check if text contains any PII
    pub fn has_pii(&self, text: &str) -> bool {
        !self.detect(text).is_empty()
    }
}

impl Detector for PatternDetector {
    fn name(&self) -> &str {
        "patterns"
    }

    fn detect(&self, text: &str) -> Vec<PiiSpan> {
        if text.is_empty() {
            return Vec::new();
        }

        let reserved = placeholder::token_ranges(text);
        let mut spans = Vec::new();

        for rule in &self.rules {
            for m in rule.regex.find_iter(text) {
                if placeholder::overlaps_any(&reserved, m.start(), m.end()) {
                    continue;
                }
                if let Some(validate) = rule.validate {
                    if !validate(m.as_str()) {
                        continue;
                    }
                }
                spans.push(PiiSpan::new(rule.pii_type, m.as_str(), m.start()));
            }
        }

        resolve_overlaps(spans)
    }
}

/// Luhn checksum over the digits of a candidate card number
fn passes_luhn(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if !(13..=19).contains(&digits.len()) {
        return false;
    }

    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();

    sum % 10 == 0
}
