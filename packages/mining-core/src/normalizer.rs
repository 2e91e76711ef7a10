//! Normalizer (spec §4.6): stateless `normalize(miner_output) → candidates`.
//! Never touches the database, never dedups across jobs, never invents a
//! confidence score, never performs tenant logic — it only turns raw
//! miner text/structured blocks into `UnifiedContactCandidate`s.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::countries::extract_country_from_context;
use crate::domain::{CandidateAffiliation, UnifiedContactCandidate};

const EMAIL_CONTEXT_RADIUS: usize = 50;

const GENERIC_PREFIXES: &[&str] = &[
    "info", "contact", "support", "admin", "sales", "hello", "office", "help", "enquiries",
    "inquiries", "mail", "noreply", "no-reply", "webmaster", "press", "media",
];

const BLACKLISTED_DOMAINS: &[&str] = &[
    "example.com", "example.org", "example.net", "test.com", "sentry.io", "wixpress.com",
    "godaddy.com", "localhost",
];

const GENERIC_EMAIL_PROVIDERS: &[&str] = &[
    "gmail.com", "yahoo.com", "hotmail.com", "outlook.com", "icloud.com", "aol.com",
    "protonmail.com", "gmx.com", "mail.com",
];

const IMAGE_OR_DOC_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".svg", ".pdf", ".doc", ".docx", ".webp",
];

const TITLE_SUFFIXES: &[&str] = &[" | home", " - home", " | welcome", " - official site"];

const POSITION_KEYWORDS: &[&str] = &[
    "ceo", "cto", "cfo", "coo", "founder", "co-founder", "president", "director", "manager",
    "head of", "vp", "vice president", "engineer", "lead", "chairman", "owner",
];

const SOCIAL_DOMAINS: &[&str] = &[
    "facebook.com", "twitter.com", "x.com", "linkedin.com", "instagram.com", "youtube.com",
    "tiktok.com",
];

const GENERIC_COMPANY_TERMS: &[&str] = &["n/a", "none", "unknown", "company", "inc", "llc"];

fn email_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("valid regex")
    })
}

fn name_shape_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^[a-z]+\.[a-z]+$").expect("valid regex"))
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NormalizeStats {
    pub emails_seen: usize,
    pub emails_rejected: usize,
    pub candidates_produced: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeResult {
    pub success: bool,
    pub candidates: Vec<UnifiedContactCandidate>,
    pub stats: NormalizeStats,
    pub errors: Vec<String>,
}

struct EmailMatch {
    email: String,
    context: String,
}

fn is_rejected_email(email: &str) -> bool {
    let lower = email.to_lowercase();
    let Some((local, domain)) = lower.split_once('@') else {
        return true;
    };
    if domain.contains("localhost") || domain.ends_with(".local") {
        return true;
    }
    if BLACKLISTED_DOMAINS.iter().any(|d| domain == *d || domain.ends_with(&format!(".{d}"))) {
        return true;
    }
    if IMAGE_OR_DOC_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return true;
    }
    let local_prefix = local.split(|c| c == '+' || c == '.').next().unwrap_or(local);
    if GENERIC_PREFIXES.contains(&local_prefix) {
        return true;
    }
    false
}

fn extract_emails(text: &str) -> Vec<EmailMatch> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for m in email_regex().find_iter(text) {
        let email = m.as_str().to_lowercase();
        if is_rejected_email(&email) || !seen.insert(email.clone()) {
            continue;
        }
        let start = m.start().saturating_sub(EMAIL_CONTEXT_RADIUS);
        let end = (m.end() + EMAIL_CONTEXT_RADIUS).min(text.len());
        let context = safe_slice(text, start, end);
        out.push(EmailMatch { email, context });
    }
    out
}

/// Slice on char boundaries, tolerating the regex byte offsets landing
/// mid-character in non-ASCII surrounding text.
fn safe_slice(text: &str, mut start: usize, mut end: usize) -> String {
    while start > 0 && !text.is_char_boundary(start) {
        start -= 1;
    }
    while end < text.len() && !text.is_char_boundary(end) {
        end += 1;
    }
    text[start..end].to_string()
}

fn parse_name(context: &str, local_part: &str) -> (Option<String>, Option<String>) {
    // A `first.last`-shaped local part is unambiguous — prefer it over the
    // context heuristic, which can't tell a real two-word name from
    // incidental adjacent capitalized words (e.g. "Reach Priya:
    // priya.mehta@..." would otherwise parse as first="Reach").
    if name_shape_regex().is_match(local_part) {
        if let Some((first, last)) = local_part.split_once('.') {
            return (Some(title_case(first)), Some(title_case(last)));
        }
    }
    // Otherwise look for a two-word capitalized run in the surrounding context.
    static NAME_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = NAME_RE.get_or_init(|| {
        regex::Regex::new(r"\b([A-Z][a-z]+)\s+([A-Z][a-z]+)\b").expect("valid regex")
    });
    if let Some(caps) = re.captures(context) {
        return (Some(caps[1].to_string()), Some(caps[2].to_string()));
    }
    (None, None)
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn resolve_company(context: &str, page_title: Option<&str>, domain: &str) -> Option<String> {
    static CTX_PATTERNS: OnceLock<Vec<regex::Regex>> = OnceLock::new();
    let patterns = CTX_PATTERNS.get_or_init(|| {
        vec![
            regex::Regex::new(r"([A-Z][\w&.\- ]{1,80})\s*\|").unwrap(),
            regex::Regex::new(r"([A-Z][\w&.\- ]{1,80})\s*-\s").unwrap(),
            regex::Regex::new(r"\bat\s+([A-Z][\w&.\- ]{1,80})").unwrap(),
            regex::Regex::new(r"\bfrom\s+([A-Z][\w&.\- ]{1,80})").unwrap(),
        ]
    });
    for re in patterns {
        if let Some(caps) = re.captures(context) {
            if let Some(name) = validate_company(caps[1].trim()) {
                return Some(name);
            }
        }
    }
    if let Some(title) = page_title {
        let mut cleaned = title.to_lowercase();
        for suffix in TITLE_SUFFIXES {
            cleaned = cleaned.replace(suffix, "");
        }
        let candidate = title[..cleaned.len().min(title.len())]
            .split(['|', '-'])
            .next()
            .unwrap_or(title)
            .trim();
        if let Some(name) = validate_company(candidate) {
            return Some(name);
        }
    }
    if !GENERIC_EMAIL_PROVIDERS.contains(&domain) {
        let base = domain.split('.').next().unwrap_or(domain);
        return validate_company(&title_case_words(base));
    }
    None
}

/// Title-case every hyphen/space-separated word, e.g. "acme-global" →
/// "Acme-Global" (spec §8 scenario 2).
fn title_case_words(s: &str) -> String {
    s.split('-')
        .map(title_case)
        .collect::<Vec<_>>()
        .join("-")
}

fn validate_company(candidate: &str) -> Option<String> {
    let trimmed = candidate.trim();
    if trimmed.len() < 2 || trimmed.len() > 200 {
        return None;
    }
    if !trimmed.chars().any(|c| c.is_alphabetic()) {
        return None;
    }
    if GENERIC_COMPANY_TERMS.contains(&trimmed.to_lowercase().as_str()) {
        return None;
    }
    Some(trimmed.to_string())
}

fn extract_position(context: &str) -> Option<String> {
    let lower = context.to_lowercase();
    POSITION_KEYWORDS
        .iter()
        .find(|kw| lower.contains(*kw))
        .map(|kw| title_case(kw))
}

fn resolve_website(context: &str, domain: &str) -> Option<String> {
    static URL_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = URL_RE.get_or_init(|| {
        regex::Regex::new(r"https?://[\w.\-]+\.[a-z]{2,}(?:/\S*)?").expect("valid regex")
    });
    if let Some(m) = re.find(context) {
        let url = m.as_str();
        if !SOCIAL_DOMAINS.iter().any(|s| url.contains(s)) {
            return Some(url.trim_end_matches(['.', ',', ')']).to_string());
        }
    }
    if !GENERIC_EMAIL_PROVIDERS.contains(&domain) {
        return Some(format!("https://{domain}"));
    }
    None
}

/// Raw miner output handed to the normalizer: free text, optional HTML,
/// and an optional page title. Matches the "text, then HTML if text
/// empty" precedence spec §4.6 step 1 describes.
#[derive(Debug, Clone, Default)]
pub struct MinerOutput {
    pub text: String,
    pub html: Option<String>,
    pub page_title: Option<String>,
}

pub fn normalize(input: &MinerOutput) -> NormalizeResult {
    let mut errors = Vec::new();
    let mut stats = NormalizeStats::default();

    let source_text = if !input.text.trim().is_empty() {
        input.text.as_str()
    } else {
        input.html.as_deref().unwrap_or("")
    };

    let matches = extract_emails(source_text);
    stats.emails_seen = matches.len();

    let mut candidates = Vec::new();
    for m in &matches {
        let Some((local, domain)) = m.email.split_once('@') else {
            stats.emails_rejected += 1;
            continue;
        };

        let (first_name, last_name) = parse_name(&m.context, local);
        let company = resolve_company(&m.context, input.page_title.as_deref(), domain);
        let country_code = extract_country_from_context(&m.context).map(|c| c.to_string());
        let position = extract_position(&m.context);
        let website = resolve_website(&m.context, domain);

        let mut affiliation = CandidateAffiliation {
            company_name: company,
            position,
            country_code,
            city: None,
            website,
            phone: None,
            confidence: None,
        };

        let has_any_field = affiliation.company_name.is_some()
            || affiliation.position.is_some()
            || affiliation.country_code.is_some()
            || affiliation.website.is_some();

        let affiliations = if has_any_field {
            vec![std::mem::take(&mut affiliation)]
        } else {
            Vec::new()
        };

        candidates.push(UnifiedContactCandidate {
            email: m.email.clone(),
            first_name,
            last_name,
            affiliations,
            extraction_meta: Value::Null,
        });
    }

    if candidates.is_empty() && matches.is_empty() {
        errors.push("No valid emails found in miner output".to_string());
    }

    stats.candidates_produced = candidates.len();

    NormalizeResult {
        success: true,
        candidates,
        stats,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_email_is_discarded() {
        let input = MinerOutput {
            text: "Contact us: info@acme.com".to_string(),
            html: None,
            page_title: None,
        };
        let result = normalize(&input);
        assert_eq!(result.candidates.len(), 0);
        assert_eq!(result.errors, vec!["No valid emails found in miner output"]);
        assert!(result.success);
    }

    #[test]
    fn domain_fallback_company_name() {
        let input = MinerOutput {
            text: "Reach Priya: priya.mehta@acme-global.io".to_string(),
            html: None,
            page_title: None,
        };
        let result = normalize(&input);
        assert_eq!(result.candidates.len(), 1);
        let c = &result.candidates[0];
        assert_eq!(c.email, "priya.mehta@acme-global.io");
        assert_eq!(c.first_name.as_deref(), Some("Priya"));
        assert_eq!(c.last_name.as_deref(), Some("Mehta"));
        assert_eq!(c.affiliations.len(), 1);
        assert_eq!(c.affiliations[0].company_name.as_deref(), Some("Acme-Global"));
        assert_eq!(c.affiliations[0].website.as_deref(), Some("https://acme-global.io"));
        assert!(c.affiliations[0].country_code.is_none());
    }

    #[test]
    fn dedups_case_insensitively() {
        let input = MinerOutput {
            text: "a@b.com and A@B.COM".to_string(),
            html: None,
            page_title: None,
        };
        let result = normalize(&input);
        assert_eq!(result.candidates.len(), 1);
    }
}
