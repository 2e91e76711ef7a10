//! Validator (spec §4.7): record-by-record cleaning and garbage
//! rejection, independent of the `HallucinationFilter` (evidence-driven
//! confidence adjustment) which lives in `hallucination.rs`.

use std::sync::OnceLock;

use crate::domain::UnifiedContact;

const DISPOSABLE_DOMAINS: &[&str] = &[
    "mailinator.com", "guerrillamail.com", "10minutemail.com", "tempmail.com", "yopmail.com",
    "trashmail.com",
];

const TEST_DOMAINS: &[&str] = &["example.com", "example.org", "test.com", "domain.com"];

const TRACKING_DOMAINS: &[&str] = &["sentry.io", "google-analytics.com", "doubleclick.net", "cloudfront.net"];

const ROLE_PREFIXES: &[&str] = &["info", "contact", "support", "admin", "sales", "noreply"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub cleaned: UnifiedContact,
    pub issues: Vec<ValidationIssue>,
    pub quality_score: f32,
    pub rejected: bool,
}

fn six_digit_run_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"\d{6,}").expect("valid regex"))
}

fn is_garbage_email(email: &str) -> Option<&'static str> {
    let lower = email.to_lowercase();
    let Some((local, domain)) = lower.split_once('@') else {
        return Some("malformed address");
    };
    if DISPOSABLE_DOMAINS.contains(&domain) {
        return Some("disposable mail domain");
    }
    if TEST_DOMAINS.contains(&domain) {
        return Some("example/test domain");
    }
    if TRACKING_DOMAINS.iter().any(|d| domain.ends_with(d)) {
        return Some("tracking/CDN domain");
    }
    let local_prefix = local.split(['+', '.']).next().unwrap_or(local);
    if ROLE_PREFIXES.contains(&local_prefix) {
        return Some("role-only address");
    }
    if six_digit_run_regex().is_match(local) {
        return Some("anti-bot-shaped username");
    }
    None
}

fn clean_field(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(collapse_whitespace(trimmed))
        }
    })
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn field_valid(value: &Option<String>, min_len: usize, max_len: usize) -> bool {
    match value {
        None => true,
        Some(v) => v.len() >= min_len && v.len() <= max_len,
    }
}

/// Clean and validate a single contact. Returns `rejected=true` with no
/// further processing expected downstream when a garbage rule fires.
pub fn validate(contact: UnifiedContact) -> ValidationResult {
    let mut issues = Vec::new();

    if let Some(email) = &contact.email {
        if let Some(reason) = is_garbage_email(email) {
            issues.push(ValidationIssue {
                field: "email".to_string(),
                reason: reason.to_string(),
            });
            return ValidationResult {
                cleaned: contact,
                issues,
                quality_score: 0.0,
                rejected: true,
            };
        }
    }

    let mut cleaned = contact;
    cleaned.email = cleaned.email.map(|e| e.to_lowercase());
    cleaned.contact_name = clean_field(cleaned.contact_name);
    cleaned.company_name = clean_field(cleaned.company_name);
    cleaned.job_title = clean_field(cleaned.job_title);
    cleaned.city = clean_field(cleaned.city);
    cleaned.address = clean_field(cleaned.address);

    let mut field_signals = 0u32;
    let mut checked = 0u32;
    for ok in [
        field_valid(&cleaned.contact_name, 2, 100),
        field_valid(&cleaned.company_name, 2, 200),
        field_valid(&cleaned.job_title, 2, 100),
        field_valid(&cleaned.phone, 5, 30),
    ] {
        checked += 1;
        if ok {
            field_signals += 1;
        } else {
            issues.push(ValidationIssue {
                field: "unspecified".to_string(),
                reason: "field failed length band".to_string(),
            });
        }
    }

    let quality_score = if checked == 0 {
        100.0
    } else {
        (field_signals as f32 / checked as f32) * 100.0
    };

    ValidationResult {
        cleaned,
        issues,
        quality_score,
        rejected: false,
    }
}

/// Idempotence law (spec §8): re-validating an already-cleaned contact
/// yields the same cleaned record.
pub fn is_idempotent(contact: &UnifiedContact) -> bool {
    let once = validate(contact.clone());
    if once.rejected {
        return true;
    }
    let twice = validate(once.cleaned.clone());
    once.cleaned.email == twice.cleaned.email
        && once.cleaned.contact_name == twice.cleaned.contact_name
        && once.cleaned.company_name == twice.cleaned.company_name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ContactSource, EmailType};
    use chrono::Utc;

    fn contact(email: &str, name: &str) -> UnifiedContact {
        UnifiedContact {
            email: Some(email.to_string()),
            additional_emails: vec![],
            contact_name: Some(format!("  {name}  ")),
            job_title: None,
            company_name: None,
            website: None,
            country: None,
            city: None,
            address: None,
            phone: None,
            source: ContactSource::Manual,
            source_url: "https://example.com".to_string(),
            confidence: 50.0,
            evidence: vec![],
            email_type: EmailType::Unknown,
            extracted_at: Utc::now(),
        }
    }

    #[test]
    fn rejects_disposable_domains() {
        let result = validate(contact("a@mailinator.com", "A"));
        assert!(result.rejected);
    }

    #[test]
    fn cleans_whitespace_in_name() {
        let result = validate(contact("a@b.com", "Ada Lovelace"));
        assert!(!result.rejected);
        assert_eq!(result.cleaned.contact_name.as_deref(), Some("Ada Lovelace"));
    }

    #[test]
    fn validate_is_idempotent() {
        let c = contact("a@b.com", "Ada Lovelace");
        assert!(is_idempotent(&c));
    }
}
