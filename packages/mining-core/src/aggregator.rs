//! ResultAggregator (spec §4.8): the deterministic merge used by both
//! Flow-1 (`aggregate_v1`) and Flow-2 (`aggregate_v2`), plus the
//! enrichment-rate and website-url extraction helpers they share.

use std::collections::HashMap;

use crate::domain::UnifiedContact;

/// Merge two contacts referring to the same identity. Picks the
/// higher-confidence record as the base; for each string field prefers
/// non-null, then the longer string; unions `additional_emails`;
/// confidence = max (spec §4.8 step 1).
pub fn merge_contacts(a: &UnifiedContact, b: &UnifiedContact) -> UnifiedContact {
    let (base, other) = if a.confidence >= b.confidence { (a, b) } else { (b, a) };

    macro_rules! prefer {
        ($field:ident) => {
            match (&base.$field, &other.$field) {
                (Some(x), Some(y)) => Some(if y.len() > x.len() { y.clone() } else { x.clone() }),
                (Some(x), None) => Some(x.clone()),
                (None, Some(y)) => Some(y.clone()),
                (None, None) => None,
            }
        };
    }

    let mut additional_emails = base.additional_emails.clone();
    for email in &other.additional_emails {
        if !additional_emails.contains(email) {
            additional_emails.push(email.clone());
        }
    }
    if let Some(other_email) = &other.email {
        if base.email.as_deref() != Some(other_email.as_str())
            && !additional_emails.contains(other_email)
        {
            additional_emails.push(other_email.clone());
        }
    }

    let confidence_ceiling = base.confidence_ceiling().min(other.confidence_ceiling());

    UnifiedContact {
        email: base.email.clone().or_else(|| other.email.clone()),
        additional_emails,
        contact_name: prefer!(contact_name),
        job_title: prefer!(job_title),
        company_name: prefer!(company_name),
        website: prefer!(website),
        country: prefer!(country),
        city: prefer!(city),
        address: prefer!(address),
        phone: prefer!(phone),
        source: base.source.clone(),
        source_url: base.source_url.clone(),
        confidence: base.confidence.max(other.confidence).min(confidence_ceiling),
        evidence: {
            let mut ev = base.evidence.clone();
            ev.extend(other.evidence.iter().cloned());
            ev
        },
        email_type: base.email_type,
        extracted_at: base.extracted_at.min(other.extracted_at),
    }
}

/// Identity key for the two-map merge algorithm: email-keyed contacts
/// collide on `lower(email)`; profile-only contacts collide on
/// `(name_lower, source_url_lower)` and never collide with the email map.
enum Identity {
    Email(String),
    Profile(String, String),
}

fn identity_of(contact: &UnifiedContact) -> Identity {
    match contact.email_key() {
        Some(email) => Identity::Email(email),
        None => {
            let (name, url) = contact.profile_key();
            Identity::Profile(name, url)
        }
    }
}

/// Deterministic merge across all extractor results (spec §4.8 step 1).
/// Returns merged contacts in first-seen order for reproducibility.
pub fn deterministic_merge(results: Vec<Vec<UnifiedContact>>) -> Vec<UnifiedContact> {
    let mut email_index: HashMap<String, usize> = HashMap::new();
    let mut profile_index: HashMap<(String, String), usize> = HashMap::new();
    let mut merged: Vec<UnifiedContact> = Vec::new();

    for batch in results {
        for mut contact in batch {
            if contact.is_profile_only() {
                contact.confidence = contact.confidence.min(25.0);
            }

            match identity_of(&contact) {
                Identity::Email(key) => {
                    if let Some(&idx) = email_index.get(&key) {
                        merged[idx] = merge_contacts(&merged[idx], &contact);
                    } else {
                        email_index.insert(key, merged.len());
                        merged.push(contact);
                    }
                }
                Identity::Profile(name, url) => {
                    let key = (name, url);
                    if let Some(&idx) = profile_index.get(&key) {
                        merged[idx] = merge_contacts(&merged[idx], &contact);
                    } else {
                        profile_index.insert(key, merged.len());
                        merged.push(contact);
                    }
                }
            }
        }
    }

    merged
}

const ENRICHMENT_FIELDS: usize = 5; // contact_name, company_name, phone, website, country

/// Enrichment rate = filled non-null count / (contacts × fields_checked)
/// over `{contact_name, company_name, phone, website, country}` (spec §4.8
/// step 2).
pub fn enrichment_rate(contacts: &[UnifiedContact]) -> f32 {
    if contacts.is_empty() {
        return 0.0;
    }
    let filled: usize = contacts
        .iter()
        .map(|c| {
            [
                c.contact_name.is_some(),
                c.company_name.is_some(),
                c.phone.is_some(),
                c.website.is_some(),
                c.country.is_some(),
            ]
            .into_iter()
            .filter(|v| *v)
            .count()
        })
        .sum();
    filled as f32 / (contacts.len() * ENRICHMENT_FIELDS) as f32
}

const GENERIC_EMAIL_PROVIDERS: &[&str] = &[
    "gmail.com", "yahoo.com", "hotmail.com", "outlook.com", "icloud.com", "aol.com",
];

/// Unique origins from contact websites plus `https://<domain>` for
/// non-generic email domains (spec §4.8 step 3), capped to 50 entries to
/// match the event payload bound used when publishing `aggregation:done`.
pub fn extract_website_urls(contacts: &[UnifiedContact]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut urls = Vec::new();

    for contact in contacts {
        if let Some(website) = &contact.website {
            if seen.insert(website.clone()) {
                urls.push(website.clone());
            }
        }
        if let Some(email) = &contact.email {
            if let Some((_, domain)) = email.split_once('@') {
                if !GENERIC_EMAIL_PROVIDERS.contains(&domain) {
                    let url = format!("https://{domain}");
                    if seen.insert(url.clone()) {
                        urls.push(url);
                    }
                }
            }
        }
        if urls.len() >= 50 {
            break;
        }
    }

    urls.truncate(50);
    urls
}

#[derive(Debug, Clone)]
pub struct AggregationSummary {
    pub enrichment_rate: f32,
    pub contact_count: usize,
    pub email_based_count: usize,
    pub profile_only_count: usize,
    pub website_urls: Vec<String>,
}

pub fn summarize(contacts: &[UnifiedContact]) -> AggregationSummary {
    let email_based_count = contacts.iter().filter(|c| !c.is_profile_only()).count();
    AggregationSummary {
        enrichment_rate: enrichment_rate(contacts),
        contact_count: contacts.len(),
        email_based_count,
        profile_only_count: contacts.len() - email_based_count,
        website_urls: extract_website_urls(contacts),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ContactSource, EmailType};
    use chrono::Utc;

    fn contact(email: Option<&str>, name: &str, url: &str, confidence: f32) -> UnifiedContact {
        UnifiedContact {
            email: email.map(|e| e.to_string()),
            additional_emails: vec![],
            contact_name: Some(name.to_string()),
            job_title: None,
            company_name: None,
            website: None,
            country: None,
            city: None,
            address: None,
            phone: None,
            source: ContactSource::Manual,
            source_url: url.to_string(),
            confidence,
            evidence: vec![],
            email_type: EmailType::Unknown,
            extracted_at: Utc::now(),
        }
    }

    #[test]
    fn profile_only_dedup_caps_confidence_at_25() {
        let a = contact(None, "Ada Lovelace", "https://example.com/team", 50.0);
        let b = contact(None, " ada  lovelace ", "https://example.com/team", 60.0);
        let merged = deterministic_merge(vec![vec![a], vec![b]]);
        assert_eq!(merged.len(), 1);
        assert!(merged[0].confidence <= 25.0);
        assert!(merged[0].email.is_none());
    }

    #[test]
    fn profile_only_never_collides_with_email_keyed() {
        let email_contact = contact(Some("ada@example.com"), "Ada", "https://example.com", 80.0);
        let profile_contact = contact(None, "Ada", "https://example.com", 50.0);
        let merged = deterministic_merge(vec![vec![email_contact], vec![profile_contact]]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn merge_is_commutative_with_equal_confidence() {
        let a = contact(Some("a@b.com"), "Ada", "https://example.com", 50.0);
        let mut b = contact(Some("a@b.com"), "Ada Lovelace", "https://example.com", 50.0);
        b.company_name = Some("Acme".to_string());
        let ab = merge_contacts(&a, &b);
        let ba = merge_contacts(&b, &a);
        assert_eq!(ab.contact_name, ba.contact_name);
        assert_eq!(ab.company_name, ba.company_name);
    }
}
