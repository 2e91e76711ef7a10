//! HallucinationFilter (spec §4.7): adjusts a candidate's confidence
//! based on its evidence, and runs heuristic hallucination detection that
//! rejects records whose cumulative suspicion score crosses a threshold.

use crate::domain::{ContactSource, Evidence, UnifiedContact};

/// Evidence kind reliability, 0–100 (spec §4.7). `None` (no evidence)
/// scores the floor of 30.
fn evidence_reliability(evidence: &Evidence) -> u8 {
    match evidence {
        Evidence::DomSelector { .. } => 75,
        Evidence::RegexMatch { .. } => 60,
        Evidence::StructuredData { .. } => 90,
        Evidence::AiReasoning { .. } => 30,
    }
}

/// `mailto:`/`schema.org`/vCard/table-cell/microdata/meta-tag evidence
/// kinds aren't represented by distinct `Evidence` variants in this
/// build; callers producing those should tag them via
/// `Evidence::StructuredData`/`DomSelector` with the appropriate
/// `schema`/`selector` string so this scoring still applies correctly.
fn best_reliability(evidence: &[Evidence]) -> u8 {
    evidence.iter().map(evidence_reliability).max().unwrap_or(30)
}

const HALLUCINATION_REJECT_THRESHOLD: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HallucinationVerdict {
    pub score: u32,
    pub reasons: Vec<String>,
    pub rejected: bool,
}

/// Adjust a contact's confidence per the evidence-reliability rules, then
/// run heuristic hallucination detection. Does not mutate `contact` in
/// place — callers apply `new_confidence` themselves, matching the
/// "never invent, only adjust" framing the rest of the pipeline uses.
pub fn adjust_confidence(contact: &UnifiedContact) -> f32 {
    let mut confidence = contact.confidence;

    if contact.source == ContactSource::AiExtractor && contact.evidence.is_empty() {
        return confidence.min(40.0);
    }

    let reliability = best_reliability(&contact.evidence);
    if reliability >= 80 {
        confidence = (confidence + 20.0).min(100.0);
    }
    if reliability >= 90 {
        confidence = confidence.max(85.0);
    }
    confidence.min(100.0)
}

fn looks_like_placeholder_name(name: &str) -> bool {
    const PLACEHOLDERS: &[&str] = &["john doe", "jane doe", "test user", "first last", "foo bar"];
    PLACEHOLDERS.contains(&name.trim().to_lowercase().as_str())
}

fn is_repeated_or_sequential_digit(phone: &str) -> bool {
    let digits: Vec<u32> = phone.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() < 5 {
        return false;
    }
    if digits.iter().all(|d| *d == digits[0]) {
        return true;
    }
    digits.windows(2).all(|w| w[1] == (w[0] + 1) % 10)
}

fn email_domain(email: &str) -> Option<&str> {
    email.split_once('@').map(|(_, d)| d)
}

fn website_domain(website: &str) -> Option<String> {
    website
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .split('/')
        .next()
        .map(|h| h.trim_start_matches("www.").to_string())
}

/// Major-city → canonical-country lookup (spec §4.7 rule f), deliberately
/// small: it exists to catch obvious fabrications ("Paris, Germany"), not
/// to be a geocoder.
const CANONICAL_CITY_COUNTRY: &[(&str, &str)] = &[
    ("paris", "FR"),
    ("berlin", "DE"),
    ("london", "GB"),
    ("madrid", "ES"),
    ("rome", "IT"),
    ("amsterdam", "NL"),
    ("brussels", "BE"),
    ("vienna", "AT"),
    ("zurich", "CH"),
    ("stockholm", "SE"),
    ("oslo", "NO"),
    ("copenhagen", "DK"),
    ("warsaw", "PL"),
    ("lisbon", "PT"),
    ("dublin", "IE"),
    ("toronto", "CA"),
    ("tokyo", "JP"),
    ("beijing", "CN"),
    ("sydney", "AU"),
    ("singapore", "SG"),
];

fn canonical_country_for_city(city: &str) -> Option<&'static str> {
    let lower = city.trim().to_lowercase();
    CANONICAL_CITY_COUNTRY
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, code)| *code)
}

fn count_filled_fields(contact: &UnifiedContact) -> usize {
    [
        contact.contact_name.is_some(),
        contact.job_title.is_some(),
        contact.company_name.is_some(),
        contact.website.is_some(),
        contact.country.is_some(),
        contact.city.is_some(),
        contact.address.is_some(),
        contact.phone.is_some(),
        contact.email.is_some(),
    ]
    .into_iter()
    .filter(|v| *v)
    .count()
}

/// Heuristic hallucination scoring (spec §4.7). A cumulative score ≥50
/// rejects the record.
pub fn detect_hallucination(contact: &UnifiedContact) -> HallucinationVerdict {
    let mut score = 0u32;
    let mut reasons = Vec::new();

    if contact.source == ContactSource::AiExtractor && contact.evidence.is_empty() {
        score += 30;
        reasons.push("AI source with no evidence".to_string());
    }

    if contact.source == ContactSource::AiExtractor && count_filled_fields(contact) >= 8 {
        score += 20;
        reasons.push("AI source with unusually many filled fields".to_string());
    }

    if let Some(name) = &contact.contact_name {
        if looks_like_placeholder_name(name) {
            score += 40;
            reasons.push("placeholder-shaped name".to_string());
        }
    }

    if let (Some(email), Some(website)) = (&contact.email, &contact.website) {
        if let (Some(email_domain), Some(site_domain)) =
            (email_domain(email), website_domain(website))
        {
            if email_domain.to_lowercase() != site_domain.to_lowercase() {
                score += 15;
                reasons.push("email domain / website domain mismatch".to_string());
            }
        }
    }

    if let Some(phone) = &contact.phone {
        if is_repeated_or_sequential_digit(phone) {
            score += 50;
            reasons.push("phone number looks synthetic".to_string());
        }
    }

    if let (Some(city), Some(country)) = (&contact.city, &contact.country) {
        if let Some(canonical) = canonical_country_for_city(city) {
            if let Some(given) = crate::countries::to_iso2(country) {
                if given != canonical {
                    score += 25;
                    reasons.push("city / country mismatch".to_string());
                }
            }
        }
    }

    HallucinationVerdict {
        score,
        rejected: score >= HALLUCINATION_REJECT_THRESHOLD,
        reasons,
    }
}

/// Stateless wrapper bundling `adjust_confidence`/`detect_hallucination`
/// behind a single handle, so callers that take a filter as a dependency
/// (rather than free functions) have something to hold and pass around.
#[derive(Debug, Default, Clone, Copy)]
pub struct HallucinationFilter;

impl HallucinationFilter {
    pub fn new() -> Self {
        Self
    }

    pub fn adjust_confidence(&self, contact: &UnifiedContact) -> f32 {
        adjust_confidence(contact)
    }

    pub fn detect(&self, contact: &UnifiedContact) -> HallucinationVerdict {
        detect_hallucination(contact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::domain::EmailType;

    fn contact() -> UnifiedContact {
        UnifiedContact {
            email: Some("a@acme.com".to_string()),
            additional_emails: vec![],
            contact_name: Some("Ada Lovelace".to_string()),
            job_title: None,
            company_name: None,
            website: None,
            country: None,
            city: None,
            address: None,
            phone: None,
            source: ContactSource::TableExtractor,
            source_url: "https://example.com".to_string(),
            confidence: 50.0,
            evidence: vec![],
            email_type: EmailType::Unknown,
            extracted_at: Utc::now(),
        }
    }

    #[test]
    fn ai_source_with_no_evidence_caps_at_40() {
        let mut c = contact();
        c.source = ContactSource::AiExtractor;
        c.confidence = 90.0;
        assert_eq!(adjust_confidence(&c), 40.0);
    }

    #[test]
    fn high_reliability_evidence_boosts_and_raises_floor() {
        let mut c = contact();
        c.confidence = 50.0;
        c.evidence = vec![Evidence::StructuredData { schema: "Person".to_string() }];
        assert_eq!(adjust_confidence(&c), 85.0);
    }

    #[test]
    fn placeholder_name_flagged() {
        let mut c = contact();
        c.contact_name = Some("John Doe".to_string());
        let verdict = detect_hallucination(&c);
        assert!(verdict.score >= 40);
    }

    #[test]
    fn synthetic_phone_alone_triggers_rejection() {
        let mut c = contact();
        c.phone = Some("11111".to_string());
        let verdict = detect_hallucination(&c);
        assert!(verdict.rejected);
    }

    #[test]
    fn city_country_mismatch_flagged() {
        let mut c = contact();
        c.city = Some("Paris".to_string());
        c.country = Some("Germany".to_string());
        let verdict = detect_hallucination(&c);
        assert!(verdict.score >= 25);
        assert!(verdict.reasons.iter().any(|r| r.contains("mismatch")));
    }

    #[test]
    fn city_country_match_not_flagged() {
        let mut c = contact();
        c.city = Some("Paris".to_string());
        c.country = Some("France".to_string());
        let verdict = detect_hallucination(&c);
        assert!(!verdict.reasons.iter().any(|r| r.contains("mismatch")));
    }
}
