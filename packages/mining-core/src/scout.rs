//! PageAnalyzer / "Scout" (spec §4.1): a single-page triage pass that
//! recommends which miner should handle a URL, never throwing — failures
//! degrade to `page_type = error` with a browser-based fallback.

use std::sync::OnceLock;

use extraction::Crawler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    ExhibitorTable,
    ExhibitorList,
    SinglePage,
    Paginated,
    Dynamic,
    DocumentViewer,
    Directory,
    SpaCatalog,
    Blocked,
    Error,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationType {
    Numbered,
    NextButton,
    LoadMore,
    Infinite,
    None,
}

#[derive(Debug, Clone)]
pub struct Recommendation {
    pub miner: String,
    pub use_cache: bool,
    pub reason: String,
    pub own_pagination: bool,
}

#[derive(Debug, Clone)]
pub struct Report {
    pub page_type: PageType,
    pub pagination_type: PaginationType,
    pub email_count: usize,
    pub detail_link_count: usize,
    pub has_table: bool,
    pub has_dynamic_indicators: bool,
    pub recommendation: Recommendation,
    pub analysis_time_ms: u64,
}

const KNOWN_DIRECTORY_HOSTS: &[&str] = &["expofp.com", "map-dynamics.com", "a2zinc.net"];

const FRAMEWORK_MARKERS: &[&str] = &["react", "vue", "angular", "__next", "ng-app"];
const JS_REQUIRED_STRING: &str = "enable javascript";

fn email_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("valid regex")
    })
}

fn strip_scripts_and_styles(html: &str) -> String {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        regex::Regex::new(r"(?is)<(script|style)[^>]*>.*?</\1>").expect("valid regex")
    });
    re.replace_all(html, "").to_string()
}

fn is_spa_catalog(html: &str) -> bool {
    let stripped = strip_scripts_and_styles(html);
    let small_body = stripped.len() < 15_000;
    let script_count = html.matches("<script").count();
    let empty_root = html.contains(r#"id="root""#) && stripped.trim().len() < 200;
    let framework_marker = FRAMEWORK_MARKERS.iter().any(|m| html.to_lowercase().contains(m));
    let js_required = html.to_lowercase().contains(JS_REQUIRED_STRING);

    (small_body && script_count >= 3) || empty_root || framework_marker || js_required
}

fn document_viewer_score(html: &str) -> u32 {
    let mut score = 0;
    let page_text_blocks = regex_count(html, r"P:\d+");
    if page_text_blocks >= 3 {
        score += 50;
    }
    if html.matches("<canvas").count() >= 2 {
        score += 20;
    }
    if html.to_lowercase().contains("flipbook") {
        score += 15;
    }
    if html.to_lowercase().contains(".pdf") {
        score += 10;
    }
    score
}

fn regex_count(haystack: &str, pattern: &str) -> usize {
    regex::Regex::new(pattern)
        .map(|re| re.find_iter(haystack).count())
        .unwrap_or(0)
}

fn detect_pagination(url: &str, html: &str) -> PaginationType {
    if url.contains("page=") || regex_count(html, r#"class="[^"]*pagination"#) > 0 {
        return PaginationType::Numbered;
    }
    if html.to_lowercase().contains("rel=\"next\"") {
        return PaginationType::NextButton;
    }
    if html.to_lowercase().contains("load more") {
        return PaginationType::LoadMore;
    }
    if html.to_lowercase().contains("infinite-scroll") {
        return PaginationType::Infinite;
    }
    PaginationType::None
}

fn has_dynamic_indicators(html: &str) -> bool {
    let framework = FRAMEWORK_MARKERS.iter().any(|m| html.to_lowercase().contains(m));
    let stripped_len = strip_scripts_and_styles(html).len();
    let low_text_high_html = html.len() > 20_000 && stripped_len < html.len() / 10;
    framework || low_text_high_html
}

/// Analyze a single URL, never returning an `Err` — failures degrade to
/// `Report { page_type: Error, .. }` with a browser-fallback recommendation
/// (spec §4.1 failure policy).
pub async fn analyze(crawler: &dyn Crawler, url: &str, started: std::time::Instant) -> Report {
    if url.to_lowercase().ends_with(".pdf") {
        return Report {
            page_type: PageType::DocumentViewer,
            pagination_type: PaginationType::None,
            email_count: 0,
            detail_link_count: 0,
            has_table: false,
            has_dynamic_indicators: false,
            recommendation: Recommendation {
                miner: "documentMiner".to_string(),
                use_cache: false,
                reason: "URL path ends in .pdf".to_string(),
                own_pagination: false,
            },
            analysis_time_ms: elapsed_ms(started),
        };
    }

    let page = match crawler.fetch(url).await {
        Ok(p) => p,
        Err(err) => {
            return Report {
                page_type: PageType::Error,
                pagination_type: PaginationType::None,
                email_count: 0,
                detail_link_count: 0,
                has_table: false,
                has_dynamic_indicators: false,
                recommendation: Recommendation {
                    miner: "playwrightMiner".to_string(),
                    use_cache: false,
                    reason: format!("fetch failed: {err}"),
                    own_pagination: false,
                },
                analysis_time_ms: elapsed_ms(started),
            };
        }
    };

    if matches!(page.status_code, 401 | 403 | 429) {
        return Report {
            page_type: PageType::Blocked,
            pagination_type: PaginationType::None,
            email_count: 0,
            detail_link_count: 0,
            has_table: false,
            has_dynamic_indicators: false,
            recommendation: Recommendation {
                miner: "none".to_string(),
                use_cache: false,
                reason: format!("blocked with status {}", page.status_code),
                own_pagination: false,
            },
            analysis_time_ms: elapsed_ms(started),
        };
    }

    let html = &page.content;
    let host_is_directory = url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .map(|host| KNOWN_DIRECTORY_HOSTS.iter().any(|d| host.ends_with(d)))
        .unwrap_or(false);

    let email_count = email_regex().find_iter(html).count();
    let detail_link_count = regex_count(html, r#"href="[^"]*/(detail|profile|exhibitor)/"#);
    let has_table = html.to_lowercase().contains("<table");
    let dynamic = has_dynamic_indicators(html);
    let pagination_type = detect_pagination(url, html);

    let (page_type, recommendation) = if host_is_directory {
        (
            PageType::Directory,
            Recommendation {
                miner: "directoryMiner".to_string(),
                use_cache: true,
                reason: "known directory host".to_string(),
                own_pagination: true,
            },
        )
    } else if is_spa_catalog(html) {
        (
            PageType::SpaCatalog,
            Recommendation {
                miner: "spaNetworkMiner".to_string(),
                use_cache: false,
                reason: "SPA-catalog heuristics matched".to_string(),
                own_pagination: true,
            },
        )
    } else if document_viewer_score(html) >= 40 {
        (
            PageType::DocumentViewer,
            Recommendation {
                miner: "documentMiner".to_string(),
                use_cache: true,
                reason: "document-viewer score >= 40".to_string(),
                own_pagination: false,
            },
        )
    } else if has_table {
        (
            PageType::ExhibitorTable,
            Recommendation {
                miner: "httpBasicMiner".to_string(),
                use_cache: true,
                reason: "table markup present".to_string(),
                own_pagination: false,
            },
        )
    } else if pagination_type != PaginationType::None {
        (
            PageType::Paginated,
            Recommendation {
                miner: "httpBasicMiner".to_string(),
                use_cache: true,
                reason: "pagination signals present".to_string(),
                own_pagination: false,
            },
        )
    } else if dynamic {
        (
            PageType::Dynamic,
            Recommendation {
                miner: "playwrightMiner".to_string(),
                use_cache: false,
                reason: "dynamic-content indicators present".to_string(),
                own_pagination: false,
            },
        )
    } else {
        (
            PageType::SinglePage,
            Recommendation {
                miner: "httpBasicMiner".to_string(),
                use_cache: true,
                reason: "no stronger signal matched".to_string(),
                own_pagination: false,
            },
        )
    };

    Report {
        page_type,
        pagination_type,
        email_count,
        detail_link_count,
        has_table,
        has_dynamic_indicators: dynamic,
        recommendation,
        analysis_time_ms: elapsed_ms(started),
    }
}

fn elapsed_ms(started: std::time::Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
