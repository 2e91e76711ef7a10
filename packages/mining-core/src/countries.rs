//! Country-name → ISO-3166-alpha-2 lookup table (spec §4.6 step 4). A
//! curated subset covering English names, common market localizations,
//! and the ISO codes themselves; unknowns normalize to `None` rather than
//! guessing.

/// `(name-or-alias, iso2)` pairs, all lowercase. Multiple aliases can map
/// to the same code (e.g. "deutschland" and "germany" both → "DE").
const COUNTRIES: &[(&str, &str)] = &[
    ("united states", "US"),
    ("united states of america", "US"),
    ("usa", "US"),
    ("us", "US"),
    ("united kingdom", "GB"),
    ("uk", "GB"),
    ("great britain", "GB"),
    ("germany", "DE"),
    ("deutschland", "DE"),
    ("de", "DE"),
    ("france", "FR"),
    ("fr", "FR"),
    ("spain", "ES"),
    ("espana", "ES"),
    ("españa", "ES"),
    ("italy", "IT"),
    ("italia", "IT"),
    ("netherlands", "NL"),
    ("the netherlands", "NL"),
    ("holland", "NL"),
    ("belgium", "BE"),
    ("switzerland", "CH"),
    ("schweiz", "CH"),
    ("austria", "AT"),
    ("osterreich", "AT"),
    ("österreich", "AT"),
    ("sweden", "SE"),
    ("norway", "NO"),
    ("denmark", "DK"),
    ("finland", "FI"),
    ("poland", "PL"),
    ("polska", "PL"),
    ("portugal", "PT"),
    ("ireland", "IE"),
    ("canada", "CA"),
    ("mexico", "MX"),
    ("méxico", "MX"),
    ("brazil", "BR"),
    ("brasil", "BR"),
    ("china", "CN"),
    ("japan", "JP"),
    ("india", "IN"),
    ("australia", "AU"),
    ("new zealand", "NZ"),
    ("south africa", "ZA"),
    ("united arab emirates", "AE"),
    ("uae", "AE"),
    ("singapore", "SG"),
    ("south korea", "KR"),
    ("korea", "KR"),
];

/// Resolve a country name, common alias, or bare ISO-2 code to its
/// canonical ISO-3166-alpha-2 code. Case-insensitive, trims whitespace.
pub fn to_iso2(input: &str) -> Option<&'static str> {
    let normalized = input.trim().to_lowercase();
    if normalized.len() == 2 {
        if let Some((_, code)) = COUNTRIES.iter().find(|(_, code)| code.to_lowercase() == normalized) {
            return Some(code);
        }
    }
    COUNTRIES
        .iter()
        .find(|(name, _)| *name == normalized)
        .map(|(_, code)| *code)
}

/// Scan free text for the longest matching country-name substring,
/// falling back to a standalone two-letter ISO token (spec §4.6 step 4:
/// `extract_country_from_context`).
pub fn extract_country_from_context(context: &str) -> Option<&'static str> {
    let lower = context.to_lowercase();
    let mut best: Option<(&str, &str)> = None;
    for (name, code) in COUNTRIES {
        if name.len() < 3 {
            continue; // skip bare 2-letter codes in substring scan
        }
        if lower.contains(name) {
            if best.map(|(b, _)| name.len() > b.len()).unwrap_or(true) {
                best = Some((name, code));
            }
        }
    }
    if let Some((_, code)) = best {
        return Some(code);
    }
    // Standalone 2-letter ISO token, e.g. " DE " or "(US)".
    for token in context.split(|c: char| !c.is_alphanumeric()) {
        if token.len() == 2 {
            if let Some(code) = to_iso2(token) {
                return Some(code);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_common_aliases() {
        assert_eq!(to_iso2("Germany"), Some("DE"));
        assert_eq!(to_iso2("deutschland"), Some("DE"));
        assert_eq!(to_iso2("US"), Some("US"));
        assert_eq!(to_iso2("Atlantis"), None);
    }

    #[test]
    fn context_scan_finds_longest_match() {
        assert_eq!(
            extract_country_from_context("Our HQ is in the United Kingdom, near London"),
            Some("GB")
        );
    }

    #[test]
    fn context_scan_falls_back_to_iso_token() {
        assert_eq!(extract_country_from_context("Office (DE) only"), Some("DE"));
        assert_eq!(extract_country_from_context("nothing relevant here"), None);
    }
}
