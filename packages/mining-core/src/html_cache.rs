//! HTMLCache (spec §4.12): caches fetched HTML keyed by
//! `md5(lower(normalized url))`, guarded by a signature and a set of
//! "poisoned" heuristics so anti-bot/block pages never get cached, and
//! get evicted on the way out if one slips through.

use std::time::Duration;

use crate::error::Result;
use crate::ttl_store::TtlStore;

/// Default TTL for a cached page (spec §4.12).
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);
/// Reject bodies larger than this.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;
/// Reject bodies shorter than this — too small to be a real page.
const MIN_BODY_BYTES: usize = 500;

/// Substrings that mark a response as an anti-bot/block page (spec
/// GLOSSARY: "poisoned HTML"). Matched case-insensitively.
const BLOCK_INDICATORS: &[&str] = &[
    "access denied",
    "captcha",
    "cloudflare",
    "rate limit",
    "are you a human",
    "unusual traffic",
    "403 forbidden",
];

fn key_for(url: &str) -> String {
    let normalized = url.trim().to_lowercase();
    format!("html_cache:{:x}", md5::compute(normalized.as_bytes()))
}

/// Small first-1KB + length + tag-count signature, cheap enough to
/// recompute on every read without a DOM parse.
fn signature(body: &str) -> String {
    let prefix: String = body.chars().take(1024).collect();
    let tables = body.matches("<table").count();
    let divs = body.matches("<div").count();
    let anchors = body.matches("<a").count();
    let ats = body.matches('@').count();
    format!(
        "{:x}:{}:{}:{}:{}:{}",
        md5::compute(prefix.as_bytes()),
        body.len(),
        tables,
        divs,
        anchors,
        ats
    )
}

fn has_structural_markers(body: &str) -> bool {
    body.contains("<div") || body.contains("<table") || body.contains("<a")
}

fn is_poisoned(body: &str) -> Option<&'static str> {
    if body.len() < MIN_BODY_BYTES {
        return Some("body shorter than minimum");
    }
    if !has_structural_markers(body) {
        return Some("lacks structural markers");
    }
    let lower = body.to_lowercase();
    for indicator in BLOCK_INDICATORS {
        if lower.contains(indicator) {
            return Some("contains block indicator");
        }
    }
    if body.len() > MAX_BODY_BYTES {
        return Some("exceeds max cache size");
    }
    None
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct CachedEntry {
    body: String,
    signature: String,
}

pub struct HtmlCache<'a> {
    store: &'a dyn TtlStore,
}

impl<'a> HtmlCache<'a> {
    pub fn new(store: &'a dyn TtlStore) -> Self {
        Self { store }
    }

    /// Store `body` under `url`'s cache key. Rejects (returns `Ok(false)`,
    /// no error — caching is best-effort) poisoned bodies without ever
    /// writing them.
    pub async fn store(&self, url: &str, body: &str) -> Result<bool> {
        if let Some(reason) = is_poisoned(body) {
            tracing::warn!(url, reason, "refusing to cache poisoned HTML");
            return Ok(false);
        }
        let entry = CachedEntry {
            body: body.to_string(),
            signature: signature(body),
        };
        let json = serde_json::to_vec(&entry)?;
        self.store.set(&key_for(url), json, DEFAULT_TTL).await?;
        Ok(true)
    }

    /// Retrieve a cached body, re-validating it against the same
    /// poisoned-content checks and deleting it if it now looks poisoned
    /// (spec: "delete poisoned entries on retrieval detection").
    pub async fn get(&self, url: &str) -> Result<Option<String>> {
        let key = key_for(url);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };
        let entry: CachedEntry = match serde_json::from_slice(&raw) {
            Ok(e) => e,
            Err(_) => {
                self.store.delete(&key).await?;
                return Ok(None);
            }
        };
        if is_poisoned(&entry.body).is_some() || signature(&entry.body) != entry.signature {
            self.store.delete(&key).await?;
            return Ok(None);
        }
        Ok(Some(entry.body))
    }
}
