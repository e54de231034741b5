// Session discovery: which tokens to try against which API hosts

use crate::cookies::{Cookie, CookieQuery, CookieStore};
use crate::error::{Result, ScanError};
use crate::events::{SharedSink, mask_token};
use serde_json::json;
use std::collections::HashSet;
use tracing::debug;
use url::Url;

pub const SESSION_COOKIE: &str = "sid";

/// Production domains searched for an org-scoped session, most common first
pub const ORG_SESSION_DOMAINS: &[&str] = &[
    "salesforce.com",
    "cloudforce.com",
    "salesforce.mil",
    "cloudforce.mil",
    "sfcrmproducts.cn",
    "force.com",
];

const EXCLUDED_SESSION_DOMAIN: &str = "help.salesforce.com";
const PROXY_HOST_SUFFIX: &str = ".mcas.ms";
const STATIC_ASSET_SUFFIX: &str = ".file.force.com";
const ORG_ID_PREFIX: &str = "00D";
const ORG_ID_SEPARATOR: char = '!';

#[derive(Debug, Clone)]
pub struct SessionCandidates {
    pub host: String,
    pub token_candidates: Vec<String>,
    pub endpoint_candidates: Vec<Url>,
}

pub fn parse_locator(locator: &str) -> Result<Url> {
    let url = Url::parse(locator.trim())
        .map_err(|e| ScanError::InvalidLocator(format!("{}: {}", locator, e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ScanError::InvalidLocator(format!(
            "unsupported scheme in {}",
            locator
        )));
    }

    let host = url.host_str().unwrap_or_default().to_lowercase();
    if !host.ends_with(".salesforce.com") && !host.ends_with(".force.com") {
        return Err(ScanError::InvalidLocator(format!(
            "{} is not a Salesforce host",
            locator
        )));
    }

    Ok(url)
}

/// Token shape check: an org id prefix followed by the session part
pub fn is_likely_token(value: &str) -> bool {
    let Some(rest) = value.strip_prefix(ORG_ID_PREFIX) else {
        return false;
    };
    let run = rest.chars().take_while(|c| c.is_ascii_alphanumeric()).count();
    run >= 12
}

/// Score how well a cookie's domain fits `hostname`; higher is better
pub fn cookie_match_score(hostname: &str, domain: &str) -> usize {
    let clean = domain.trim_start_matches('.').to_lowercase();
    let host = hostname.to_lowercase();
    if clean.is_empty() {
        return 0;
    }
    if host == clean {
        return clean.len() + 100;
    }
    if host.ends_with(&format!(".{}", clean)) {
        return clean.len();
    }
    1
}

/// Stable sort of cookies by descending [`cookie_match_score`]
pub fn rank_cookies_for_host(hostname: &str, cookies: Vec<Cookie>) -> Vec<Cookie> {
    let mut scored: Vec<(usize, Cookie)> = cookies
        .into_iter()
        .map(|c| (cookie_match_score(hostname, &c.domain), c))
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().map(|(_, c)| c).collect()
}

/// Expand a host into the API base URLs that may serve the same org
pub fn derive_api_base_urls(host: &str) -> Vec<String> {
    let mut urls = vec![format!("https://{}", host)];
    if let Some(prefix) = host.strip_suffix(".lightning.force.com") {
        urls.push(format!("https://{}.my.salesforce.com", prefix));
        urls.push(format!("https://{}.salesforce.com", prefix));
    }
    if let Some(prefix) = host.strip_suffix(".my.salesforce.com") {
        urls.push(format!("https://{}.lightning.force.com", prefix));
    }
    urls
}

fn unique<I: IntoIterator<Item = String>>(values: I) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|v| !v.is_empty() && seen.insert(v.clone()))
        .collect()
}

pub struct CredentialSource<S: CookieStore> {
    store: S,
    events: SharedSink,
}

impl<S: CookieStore> CredentialSource<S> {
    pub fn new(store: S, events: SharedSink) -> Self {
        Self { store, events }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn resolve_candidates(&self, locator: &str) -> Result<SessionCandidates> {
        let url = parse_locator(locator)?;
        let hostname = url.host_str().unwrap_or_default().to_string();
        let host = match url.port() {
            Some(port) => format!("{}:{}", hostname, port),
            None => hostname.clone(),
        };

        let direct = self.store.get(&url, SESSION_COOKIE);
        let org_id = direct
            .as_ref()
            .and_then(|c| c.value.split(ORG_ID_SEPARATOR).next())
            .map(|s| s.to_string());

        let matched = match org_id {
            Some(ref org_id)
                if org_id.starts_with(ORG_ID_PREFIX) && !hostname.ends_with(PROXY_HOST_SUFFIX) =>
            {
                self.find_org_session(org_id)
            }
            _ => None,
        };

        let ranked = rank_cookies_for_host(
            &hostname,
            self.store.get_all(&CookieQuery::named(SESSION_COOKIE)),
        );

        let best = matched
            .clone()
            .or_else(|| ranked.first().cloned())
            .or_else(|| direct.clone());

        let best_host = best
            .as_ref()
            .map(|c| c.domain.trim_start_matches('.').to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| host.clone());

        let raw_tokens = unique(
            [
                best.as_ref().map(|c| c.value.clone()),
                direct.as_ref().map(|c| c.value.clone()),
            ]
            .into_iter()
            .flatten(),
        );
        let (token_candidates, rejected): (Vec<String>, Vec<String>) =
            raw_tokens.into_iter().partition(|t| is_likely_token(t));
        if !rejected.is_empty() {
            debug!("Dropped {} token candidates failing the shape check", rejected.len());
        }

        let endpoint_candidates: Vec<Url> = unique(
            derive_api_base_urls(&best_host)
                .into_iter()
                .chain(derive_api_base_urls(&host)),
        )
        .into_iter()
        .filter_map(|u| Url::parse(&u).ok())
        .filter(|u| {
            !u.host_str()
                .map(|h| h.to_lowercase().ends_with(STATIC_ASSET_SUFFIX))
                .unwrap_or(false)
        })
        .collect();

        self.events.record(
            "session:candidates",
            json!({
                "host": host,
                "orgId": org_id,
                "matched": matched.is_some(),
                "bestHost": best_host,
                "tokenHints": token_candidates.iter().map(|t| mask_token(t)).collect::<Vec<_>>(),
                "rejectedTokens": rejected.len(),
                "baseUrls": endpoint_candidates.iter().map(|u| u.as_str()).collect::<Vec<_>>(),
            }),
        );

        Ok(SessionCandidates {
            host,
            token_candidates,
            endpoint_candidates,
        })
    }

    fn find_org_session(&self, org_id: &str) -> Option<Cookie> {
        let prefix = format!("{}{}", org_id, ORG_ID_SEPARATOR);
        for domain in ORG_SESSION_DOMAINS {
            let query = CookieQuery::named(SESSION_COOKIE)
                .with_domain(domain)
                .with_secure(true);
            let found = self.store.get_all(&query).into_iter().find(|c| {
                c.value.starts_with(&prefix) && c.bare_domain() != EXCLUDED_SESSION_DOMAIN
            });
            if found.is_some() {
                return found;
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookies::MemoryCookieStore;
    use crate::events::EventLog;

    const ORG: &str = "00D5g000000AbCd";
    const LOCATOR: &str = "https://acme.lightning.force.com/lightning/r/Account/001XXXXXXXXXXXXXXX/view";

    fn token(suffix: &str) -> String {
        format!("{}!AQ0AQ{}", ORG, suffix)
    }

    fn source(cookies: Vec<Cookie>) -> CredentialSource<MemoryCookieStore> {
        CredentialSource::new(MemoryCookieStore::new(cookies), EventLog::shared())
    }

    #[test]
    fn test_parse_locator_rejects_foreign_hosts() {
        assert!(matches!(
            parse_locator("https://example.com/lightning/r/Account/001/view"),
            Err(ScanError::InvalidLocator(_))
        ));
        assert!(matches!(
            parse_locator("not a url"),
            Err(ScanError::InvalidLocator(_))
        ));
        assert!(matches!(
            parse_locator("ftp://acme.my.salesforce.com/"),
            Err(ScanError::InvalidLocator(_))
        ));
        assert!(parse_locator(LOCATOR).is_ok());
    }

    #[test]
    fn test_is_likely_token() {
        assert!(is_likely_token(&token("xyz")));
        assert!(is_likely_token("00D5g000000AbCd"));
        assert!(!is_likely_token("00D12"));
        assert!(!is_likely_token("abc!def"));
        assert!(!is_likely_token(""));
    }

    #[test]
    fn test_cookie_match_score() {
        let host = "acme.my.salesforce.com";
        assert_eq!(cookie_match_score(host, "acme.my.salesforce.com"), 122);
        assert_eq!(cookie_match_score(host, ".salesforce.com"), 14);
        assert_eq!(cookie_match_score(host, "other.force.com"), 1);
        assert_eq!(cookie_match_score(host, ""), 0);
    }

    #[test]
    fn test_derive_api_base_urls() {
        assert_eq!(
            derive_api_base_urls("acme.lightning.force.com"),
            vec![
                "https://acme.lightning.force.com",
                "https://acme.my.salesforce.com",
                "https://acme.salesforce.com",
            ]
        );
        assert_eq!(
            derive_api_base_urls("acme.my.salesforce.com"),
            vec![
                "https://acme.my.salesforce.com",
                "https://acme.lightning.force.com",
            ]
        );
        assert_eq!(
            derive_api_base_urls("acme.force.com"),
            vec!["https://acme.force.com"]
        );
    }

    #[test]
    fn test_org_session_preferred_over_direct() {
        let direct = token("lightning");
        let api = token("api");
        let source = source(vec![
            Cookie::new("sid", &direct, "acme.lightning.force.com", true),
            Cookie::new("sid", &api, "acme.my.salesforce.com", true),
        ]);

        let candidates = source.resolve_candidates(LOCATOR).unwrap();

        assert_eq!(candidates.host, "acme.lightning.force.com");
        assert_eq!(candidates.token_candidates, vec![api, direct]);
        let hosts: Vec<_> = candidates
            .endpoint_candidates
            .iter()
            .map(|u| u.host_str().unwrap().to_string())
            .collect();
        assert_eq!(
            hosts,
            vec![
                "acme.my.salesforce.com",
                "acme.lightning.force.com",
                "acme.salesforce.com",
            ]
        );
    }

    #[test]
    fn test_help_domain_is_never_matched() {
        let direct = token("lightning");
        let source = source(vec![
            Cookie::new("sid", &direct, "acme.lightning.force.com", true),
            Cookie::new("sid", &token("help"), "help.salesforce.com", true),
        ]);

        let candidates = source.resolve_candidates(LOCATOR).unwrap();

        // help.salesforce.com is skipped, the force.com pass finds the page cookie
        assert_eq!(candidates.token_candidates, vec![direct]);
    }

    #[test]
    fn test_rank_cookies_for_host() {
        let ranked = rank_cookies_for_host(
            "acme.lightning.force.com",
            vec![
                Cookie::new("sid", "unrelated", "other.my.salesforce.com", true),
                Cookie::new("sid", "parent", ".force.com", true),
                Cookie::new("sid", "exact", "acme.lightning.force.com", true),
                Cookie::new("sid", "also-unrelated", "zzz.salesforce.com", true),
            ],
        );
        let values: Vec<_> = ranked.iter().map(|c| c.value.as_str()).collect();
        assert_eq!(values, vec!["exact", "parent", "unrelated", "also-unrelated"]);
    }

    #[test]
    fn test_fallback_to_ranked_cookie_without_direct_session() {
        let source = source(vec![Cookie::new(
            "sid",
            "00D000000000002!elsewhere",
            "other.my.salesforce.com",
            true,
        )]);

        let candidates = source.resolve_candidates(LOCATOR).unwrap();

        assert_eq!(candidates.token_candidates, vec!["00D000000000002!elsewhere"]);
        assert_eq!(
            candidates.endpoint_candidates[0].as_str(),
            "https://other.my.salesforce.com/"
        );
        assert_eq!(candidates.endpoint_candidates.len(), 5);
    }

    #[test]
    fn test_malformed_tokens_are_dropped() {
        let source = source(vec![Cookie::new(
            "sid",
            "garbage-session",
            "acme.lightning.force.com",
            true,
        )]);

        let candidates = source.resolve_candidates(LOCATOR).unwrap();

        assert!(candidates.token_candidates.is_empty());
        assert!(!candidates.endpoint_candidates.is_empty());
    }

    #[test]
    fn test_static_asset_hosts_are_filtered() {
        let source = source(vec![Cookie::new(
            "sid",
            &token("file"),
            "acme.file.force.com",
            true,
        )]);

        let candidates = source.resolve_candidates(LOCATOR).unwrap();

        assert!(
            candidates
                .endpoint_candidates
                .iter()
                .all(|u| !u.host_str().unwrap().ends_with(".file.force.com"))
        );
    }

    #[test]
    fn test_invalid_locator() {
        let source = source(vec![]);
        assert!(matches!(
            source.resolve_candidates("https://example.org/path"),
            Err(ScanError::InvalidLocator(_))
        ));
    }
}
