//! Client id discovery and caching
//!
//! The SoundCloud API requires a `client_id` query parameter. The web player
//! embeds one in its page and script bundles and rotates it from time to
//! time, so the id is scraped, validated against a probe request, cached,
//! and rediscovered when the API starts answering 401.
//!
//! Discovery order:
//! 1. the configured override (`SOUNDCLOUD_CLIENT_ID`)
//! 2. ids scraped from the home page and its script bundles
//! 3. the static [`FALLBACK_CLIENT_IDS`]

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Result, SoundCloudError};

/// Ids known to have worked, tried after the scraped ones
pub const FALLBACK_CLIENT_IDS: [&str; 4] = [
    "xXKzFLdhfXAtbaLbKFp4cNoiduLizuYO",
    "LvWovRaZq8q5f1Z2K0t1Y7v5fJ8xK9pL",
    "dH1Xed1fpITYonugor6sw39jvdq58M3h",
    "02gUJC0hH2ct1EGOcYXQIzRFU91c72Ea",
];

/// Script bundles fetched per discovery
pub const MAX_BUNDLES: usize = 15;

const BUNDLE_TIMEOUT: Duration = Duration::from_secs(10);
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

const PROBE_TRACK_IDS: &str = "13158665";
const PROBE_RESOLVE_URL: &str = "https://soundcloud.com/johnnycash";

const MIN_ID_LEN: usize = 30;
const MAX_ID_LEN: usize = 35;

lazy_static! {
    static ref PAGE_PATTERNS: Vec<Regex> = [
        r#"(?i)client_id["']?\s*[:=]\s*["']([a-zA-Z0-9]{32,})["']"#,
        r#"(?i)"client_id":"([a-zA-Z0-9]{32,})""#,
        r#"(?i)clientId["']?\s*[:=]\s*["']([a-zA-Z0-9]{32,})["']"#,
        r#"(?i)client_id=([a-zA-Z0-9]{32,})"#,
        r#"(?i)clientId=([a-zA-Z0-9]{32,})"#,
        r#"(?i)CLIENT_ID["']?\s*[:=]\s*["']([a-zA-Z0-9]{32,})["']"#,
        r#"(?i)window\.__sc_hydration\s*=\s*[^;]*client[Ii]d["']?\s*[:=]\s*["']([a-zA-Z0-9]{32,})["']"#,
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect();

    static ref BUNDLE_PATTERNS: Vec<Regex> = [
        r#"client_id["']?\s*[:=]\s*["']([a-zA-Z0-9]{32,})["']"#,
        r#"clientId["']?\s*[:=]\s*["']([a-zA-Z0-9]{32,})["']"#,
        r#"CLIENT_ID["']?\s*[:=]\s*["']([a-zA-Z0-9]{32,})["']"#,
        r#"["']([a-zA-Z0-9]{32})["']"#,
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect();
}

/// Process-wide client id holder with single-flight refresh
#[derive(Debug)]
pub struct ClientIdCache {
    client: Client,
    api_base: String,
    site_base: String,
    override_id: Option<String>,
    fallback_ids: Vec<String>,
    current: RwLock<Option<String>>,
    generation: AtomicU64,
    refresh: Mutex<()>,
}

impl ClientIdCache {
    pub fn new(
        client: Client,
        api_base: String,
        site_base: String,
        override_id: Option<String>,
        fallback_ids: Vec<String>,
    ) -> Self {
        Self {
            client,
            api_base,
            site_base,
            override_id,
            fallback_ids,
            current: RwLock::new(None),
            generation: AtomicU64::new(0),
            refresh: Mutex::new(()),
        }
    }

    /// Returns a validated client id
    ///
    /// With `force_refresh` the cached id is ignored and discovery runs again,
    /// unless another caller completed a refresh while this one was waiting
    /// for the lock.
    pub async fn get(&self, force_refresh: bool) -> Result<String> {
        let seen = self.generation.load(Ordering::Acquire);

        if !force_refresh {
            if let Some(id) = self.cached() {
                return Ok(id);
            }
        }

        let _guard = self.refresh.lock().await;

        if self.generation.load(Ordering::Acquire) != seen {
            if let Some(id) = self.cached() {
                debug!("Reusing client_id refreshed by a concurrent request");
                return Ok(id);
            }
        }

        let id = self.discover().await?;
        self.store(id.clone());
        Ok(id)
    }

    /// Drops the cached id
    pub fn invalidate(&self) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn cached(&self) -> Option<String> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store(&self, id: String) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(id);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    async fn discover(&self) -> Result<String> {
        let mut tried = 0;
        if let Some(id) = &self.override_id {
            info!("Using client_id from SOUNDCLOUD_CLIENT_ID");
            if self.validate(id).await {
                return Ok(id.clone());
            }
            tried += 1;
            warn!("Configured client_id is invalid, falling back to extraction");
        }

        let mut candidates = self.scrape_candidates().await;
        candidates.extend(self.fallback_ids.iter().cloned());

        for candidate in &candidates {
            if self.validate(candidate).await {
                info!("Validated client_id: {}...", prefix(candidate));
                return Ok(candidate.clone());
            }
            debug!("Rejected client_id {}...", prefix(candidate));
        }

        Err(SoundCloudError::NoValidToken {
            tried: tried + candidates.len(),
        })
    }

    /// Probes the API with a candidate id
    ///
    /// Valid when either probe answers 200 with a non-empty JSON object or
    /// array.
    pub async fn validate(&self, client_id: &str) -> bool {
        let probes = [
            ("/tracks", [("ids", PROBE_TRACK_IDS), ("client_id", client_id)]),
            ("/resolve", [("url", PROBE_RESOLVE_URL), ("client_id", client_id)]),
        ];

        for (path, params) in probes {
            let response = self
                .client
                .get(format!("{}{}", self.api_base, path))
                .query(&params)
                .timeout(PROBE_TIMEOUT)
                .send()
                .await;

            let Ok(response) = response else { continue };
            if response.status() != StatusCode::OK {
                continue;
            }
            if let Ok(body) = response.json::<Value>().await {
                if is_non_empty_payload(&body) {
                    return true;
                }
            }
        }

        false
    }

    /// Collects candidate ids from the home page and its script bundles
    ///
    /// Failures yield no candidates.
    pub async fn scrape_candidates(&self) -> Vec<String> {
        let html = match self.fetch_home_page().await {
            Ok(html) => html,
            Err(e) => {
                warn!("Failed to extract client IDs: {}", e);
                return Vec::new();
            }
        };

        let (mut found, bundles) = parse_home_page(&html, &self.site_base);

        for bundle in bundles.into_iter().take(MAX_BUNDLES) {
            let response = self
                .client
                .get(bundle.clone())
                .timeout(BUNDLE_TIMEOUT)
                .send()
                .await;

            let Ok(response) = response else { continue };
            if response.status() != StatusCode::OK {
                continue;
            }
            if let Ok(script) = response.text().await {
                found.extend(extract_ids(&script, &BUNDLE_PATTERNS));
            }
        }

        let candidates = dedupe_candidates(found);
        info!("Extracted {} potential client_id(s) from SoundCloud", candidates.len());
        candidates
    }

    async fn fetch_home_page(&self) -> std::result::Result<String, reqwest::Error> {
        self.client
            .get(&self.site_base)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

fn prefix(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn is_non_empty_payload(body: &Value) -> bool {
    match body {
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => false,
    }
}

fn extract_ids(text: &str, patterns: &[Regex]) -> Vec<String> {
    patterns
        .iter()
        .flat_map(|re| re.captures_iter(text))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Extracts ids and script bundle URLs from the home page
///
/// Bundles are `.js` URLs served from `sndcdn` hosts or from the site
/// itself, in page order without duplicates.
fn parse_home_page(html: &str, site_base: &str) -> (Vec<String>, Vec<Url>) {
    let mut found = extract_ids(html, &PAGE_PATTERNS);

    let document = Html::parse_document(html);
    let site = Url::parse(site_base).ok();

    if let Ok(inline) = Selector::parse("script:not([src])") {
        for script in document.select(&inline) {
            let body: String = script.text().collect();
            found.extend(extract_ids(&body, &PAGE_PATTERNS));
        }
    }

    let mut bundles = Vec::new();
    let mut seen = HashSet::new();
    if let Ok(with_src) = Selector::parse("script[src]") {
        for script in document.select(&with_src) {
            let Some(src) = script.value().attr("src") else { continue };
            let resolved = match &site {
                Some(site) => site.join(src).ok(),
                None => Url::parse(src).ok(),
            };
            let Some(url) = resolved else { continue };

            if is_bundle_url(&url, site.as_ref()) && seen.insert(url.to_string()) {
                bundles.push(url);
            }
        }
    }

    (found, bundles)
}

fn is_bundle_url(url: &Url, site: Option<&Url>) -> bool {
    if !url.path().ends_with(".js") {
        return false;
    }
    let Some(host) = url.host_str() else {
        return false;
    };
    host.contains("sndcdn") || site.and_then(Url::host_str) == Some(host)
}

/// Keeps first-seen order and plausible lengths
fn dedupe_candidates(found: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    found
        .into_iter()
        .filter(|id| (MIN_ID_LEN..=MAX_ID_LEN).contains(&id.len()))
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const ID_B: &str = "BBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB";

    #[test]
    fn test_parse_home_page() {
        let html = format!(
            r#"<html><head>
            <script>window.config = {{"client_id":"{ID_A}"}};</script>
            <script crossorigin src="https://a-v2.sndcdn.com/assets/0-abc.js"></script>
            <script src="/assets/app.js"></script>
            <script src="https://a-v2.sndcdn.com/assets/0-abc.js"></script>
            <script src="https://cdn.example.com/tracker.js"></script>
            <script src="https://a-v2.sndcdn.com/assets/styles.css"></script>
            </head><body>clientId="{ID_B}"</body></html>"#
        );

        let (found, bundles) = parse_home_page(&html, "https://soundcloud.com");

        let ids = dedupe_candidates(found);
        assert_eq!(ids, vec![ID_A.to_string(), ID_B.to_string()]);

        let bundles: Vec<String> = bundles.iter().map(Url::to_string).collect();
        assert_eq!(
            bundles,
            vec![
                "https://a-v2.sndcdn.com/assets/0-abc.js".to_string(),
                "https://soundcloud.com/assets/app.js".to_string(),
            ]
        );
    }

    #[test]
    fn test_bundle_patterns_include_quoted_ids() {
        let script = format!(r#"var e="{ID_A}",t={{client_id:"{ID_B}"}}"#);
        let ids = dedupe_candidates(extract_ids(&script, &BUNDLE_PATTERNS));
        assert!(ids.contains(&ID_A.to_string()));
        assert!(ids.contains(&ID_B.to_string()));
    }

    #[test]
    fn test_dedupe_filters_lengths() {
        let found = vec![
            ID_A.to_string(),
            "short".to_string(),
            "x".repeat(40),
            ID_A.to_string(),
            "c".repeat(35),
        ];
        assert_eq!(
            dedupe_candidates(found),
            vec![ID_A.to_string(), "c".repeat(35)]
        );
    }

    #[test]
    fn test_non_empty_payload() {
        assert!(is_non_empty_payload(&serde_json::json!([{"id": 1}])));
        assert!(is_non_empty_payload(&serde_json::json!({"kind": "user"})));
        assert!(!is_non_empty_payload(&serde_json::json!([])));
        assert!(!is_non_empty_payload(&serde_json::json!({})));
        assert!(!is_non_empty_payload(&serde_json::json!(null)));
    }

    #[tokio::test]
    async fn test_invalidate_clears_cache() {
        let cache = ClientIdCache::new(
            Client::new(),
            "http://127.0.0.1:9".into(),
            "http://127.0.0.1:9".into(),
            None,
            Vec::new(),
        );
        cache.store(ID_A.to_string());
        assert_eq!(cache.get(false).await.unwrap(), ID_A);

        cache.invalidate();
        assert!(cache.cached().is_none());
    }
}
