use crate::client::{API_ROOT, body_hint, content_type_of, is_html};
use crate::connection::Connection;
use crate::error::{Result, ScanError};
use crate::events::{SharedSink, mask_token};
use crate::schema::ApiVersion;
use reqwest::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde_json::json;
use tracing::{debug, info};
use url::Url;

const REJECTION_HINT_LEN: usize = 180;

/// Desirability tier of an API host; canonical API hosts first
pub fn score_api_base_url(url: &Url) -> u32 {
    let host = url.host_str().unwrap_or_default().to_lowercase();
    if host.contains(".my.salesforce.com") {
        400
    } else if host.ends_with(".salesforce.com") {
        300
    } else if host.ends_with(".lightning.force.com") {
        200
    } else if host.ends_with(".force.com") {
        100
    } else {
        0
    }
}

/// Stable sort of endpoints by descending tier
pub fn rank_endpoints(endpoints: &[Url]) -> Vec<Url> {
    let mut ranked = endpoints.to_vec();
    ranked.sort_by_key(|u| std::cmp::Reverse(score_api_base_url(u)));
    ranked
}

fn parse_version(version: &str) -> Option<(u32, u32)> {
    let mut parts = version.trim().splitn(2, '.');
    let major = parts.next()?.parse().ok()?;
    let minor = match parts.next() {
        Some(m) => m.parse().ok()?,
        None => 0,
    };
    Some((major, minor))
}

/// Highest version offered; falls back to the last listed one when none parse
pub fn latest_version(versions: &[ApiVersion]) -> Option<String> {
    versions
        .iter()
        .filter_map(|v| parse_version(&v.version).map(|parsed| (parsed, v)))
        .max_by_key(|(parsed, _)| *parsed)
        .map(|(_, v)| v.version.trim().to_string())
        .or_else(|| {
            versions
                .iter()
                .rev()
                .map(|v| v.version.trim())
                .find(|v| !v.is_empty())
                .map(str::to_string)
        })
}

enum Attempt {
    Accepted(Connection),
    Rejected,
}

/// Finds the first (token, endpoint) pair the API accepts
pub struct EndpointResolver {
    client: Client,
    events: SharedSink,
}

impl EndpointResolver {
    pub fn new(client: Client, events: SharedSink) -> Self {
        Self { client, events }
    }

    pub async fn resolve(&self, tokens: &[String], endpoints: &[Url]) -> Result<Connection> {
        let ranked = rank_endpoints(endpoints);
        let mut last_endpoint: Option<String> = None;

        for token in tokens {
            for base in &ranked {
                self.events.record(
                    "endpoint:attempt",
                    json!({ "baseUrl": base.as_str(), "tokenHint": mask_token(token) }),
                );

                match self.try_endpoint(base, token).await {
                    Attempt::Accepted(connection) => {
                        info!(
                            "Resolved API endpoint {} (v{})",
                            connection.base_endpoint(),
                            connection.api_version()
                        );
                        self.events.record(
                            "endpoint:accepted",
                            json!({
                                "baseUrl": connection.base_endpoint().as_str(),
                                "apiVersion": connection.api_version(),
                                "tokenHint": connection.token_hint(),
                            }),
                        );
                        return Ok(connection);
                    }
                    Attempt::Rejected => {
                        last_endpoint = Some(base.to_string());
                    }
                }
            }
        }

        Err(ScanError::NoValidSession {
            last_endpoint: last_endpoint.unwrap_or_else(|| "none".to_string()),
        })
    }

    async fn try_endpoint(&self, base: &Url, token: &str) -> Attempt {
        let origin = base.origin().ascii_serialization();
        let url = match Url::parse(&origin).and_then(|o| o.join(API_ROOT)) {
            Ok(url) => url,
            Err(e) => {
                self.reject(base, json!({ "error": format!("invalid base URL: {}", e) }));
                return Attempt::Rejected;
            }
        };

        debug!("Checking {}", url);
        let response = match self
            .client
            .get(url.clone())
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.reject(base, json!({ "error": e.to_string() }));
                return Attempt::Rejected;
            }
        };

        let status = response.status();
        let final_origin = response.url().origin().ascii_serialization();
        let content_type = content_type_of(&response);

        if !status.is_success() || is_html(&content_type) {
            let text = response.text().await.unwrap_or_default();
            self.reject(
                base,
                json!({
                    "status": status.as_u16(),
                    "contentType": content_type,
                    "finalOrigin": final_origin,
                    "bodyHint": body_hint(&text, REJECTION_HINT_LEN),
                }),
            );
            return Attempt::Rejected;
        }

        let versions: Vec<ApiVersion> = match response.json().await {
            Ok(versions) => versions,
            Err(e) => {
                self.reject(base, json!({ "error": format!("unreadable versions: {}", e) }));
                return Attempt::Rejected;
            }
        };
        let Some(version) = latest_version(&versions) else {
            self.reject(base, json!({ "error": "no API version offered" }));
            return Attempt::Rejected;
        };

        if final_origin != origin {
            self.events.record(
                "endpoint:redirect",
                json!({ "from": origin, "to": final_origin }),
            );
        }

        match Url::parse(&final_origin) {
            Ok(resolved) => Attempt::Accepted(Connection::new(resolved, token, version)),
            Err(e) => {
                self.reject(base, json!({ "error": format!("invalid final origin: {}", e) }));
                Attempt::Rejected
            }
        }
    }

    fn reject(&self, base: &Url, mut detail: serde_json::Value) {
        debug!("Endpoint {} rejected", base);
        if let Some(map) = detail.as_object_mut() {
            map.insert("baseUrl".to_string(), json!(base.as_str()));
        }
        self.events.record("endpoint:rejected", detail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::build_http_client;
    use crate::events::{Event, EventLog};
    use std::sync::Arc;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path},
    };

    fn versions_body() -> serde_json::Value {
        json!([
            { "label": "Spring '24", "url": "/services/data/v60.0", "version": "60.0" },
            { "label": "Winter '25", "url": "/services/data/v62.0", "version": "62.0" },
            { "label": "Summer '24", "url": "/services/data/v61.0", "version": "61.0" }
        ])
    }

    fn resolver(events: Arc<EventLog>) -> EndpointResolver {
        EndpointResolver::new(build_http_client(5).unwrap(), events)
    }

    fn attempted(events: &EventLog) -> Vec<String> {
        events
            .snapshot()
            .into_iter()
            .filter(|e: &Event| e.event == "endpoint:attempt")
            .map(|e| e.data["baseUrl"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn test_rank_endpoints_by_tier() {
        let endpoints: Vec<Url> = [
            "https://a.force.com",
            "https://b.my.salesforce.com",
            "https://c.lightning.force.com",
            "https://d.example.com",
            "https://e.salesforce.com",
        ]
        .iter()
        .map(|u| Url::parse(u).unwrap())
        .collect();

        let hosts: Vec<_> = rank_endpoints(&endpoints)
            .iter()
            .map(|u| u.host_str().unwrap().to_string())
            .collect();

        assert_eq!(
            hosts,
            vec![
                "b.my.salesforce.com",
                "e.salesforce.com",
                "c.lightning.force.com",
                "a.force.com",
                "d.example.com",
            ]
        );
    }

    #[test]
    fn test_latest_version() {
        let versions: Vec<ApiVersion> = serde_json::from_value(versions_body()).unwrap();
        assert_eq!(latest_version(&versions).as_deref(), Some("62.0"));
        assert_eq!(latest_version(&[]), None);
    }

    #[tokio::test]
    async fn test_accepts_first_json_endpoint() {
        let login = MockServer::start().await;
        let api = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/services/data/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("<html>Login</html>", "text/html"),
            )
            .mount(&login)
            .await;
        Mock::given(method("GET"))
            .and(path("/services/data/"))
            .and(header("Authorization", "Bearer 00D000000000001!good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(versions_body()))
            .mount(&api)
            .await;

        let events = EventLog::shared();
        let endpoints = vec![
            Url::parse(&login.uri()).unwrap(),
            Url::parse(&api.uri()).unwrap(),
        ];
        let connection = resolver(events.clone())
            .resolve(&["00D000000000001!good".to_string()], &endpoints)
            .await
            .unwrap();

        assert_eq!(connection.origin(), api.uri());
        assert_eq!(connection.api_version(), "62.0");
        assert_eq!(
            events.event_names(),
            vec!["endpoint:attempt", "endpoint:rejected", "endpoint:attempt", "endpoint:accepted"]
        );
    }

    #[tokio::test]
    async fn test_tokens_are_the_outer_loop() {
        let first = MockServer::start().await;
        let second = MockServer::start().await;

        for server in [&first, &second] {
            Mock::given(method("GET"))
                .and(path("/services/data/"))
                .and(header("Authorization", "Bearer 00D000000000001!stale"))
                .respond_with(ResponseTemplate::new(401).set_body_json(json!([
                    { "errorCode": "INVALID_SESSION_ID" }
                ])))
                .mount(server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/services/data/"))
            .and(header("Authorization", "Bearer 00D000000000001!fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(versions_body()))
            .mount(&first)
            .await;

        let events = EventLog::shared();
        let endpoints = vec![
            Url::parse(&first.uri()).unwrap(),
            Url::parse(&second.uri()).unwrap(),
        ];
        let tokens = vec![
            "00D000000000001!stale".to_string(),
            "00D000000000001!fresh".to_string(),
        ];
        let connection = resolver(events.clone())
            .resolve(&tokens, &endpoints)
            .await
            .unwrap();

        assert_eq!(connection.token(), "00D000000000001!fresh");
        assert_eq!(connection.origin(), first.uri());
        let first_url = endpoints[0].to_string();
        let second_url = endpoints[1].to_string();
        assert_eq!(
            attempted(&events),
            vec![first_url.clone(), second_url, first_url]
        );
    }

    #[tokio::test]
    async fn test_redirect_target_becomes_base() {
        let ui = MockServer::start().await;
        let api = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/services/data/"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", format!("{}/services/data/", api.uri()).as_str()),
            )
            .mount(&ui)
            .await;
        Mock::given(method("GET"))
            .and(path("/services/data/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(versions_body()))
            .mount(&api)
            .await;

        let events = EventLog::shared();
        let connection = resolver(events.clone())
            .resolve(
                &["00D000000000001!tok".to_string()],
                &[Url::parse(&ui.uri()).unwrap()],
            )
            .await
            .unwrap();

        assert_eq!(connection.origin(), api.uri());
        assert!(events.event_names().contains(&"endpoint:redirect".to_string()));
    }

    #[tokio::test]
    async fn test_all_rejected_reports_last_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let endpoint = Url::parse(&server.uri()).unwrap();
        let err = resolver(EventLog::shared())
            .resolve(&["00D000000000001!tok".to_string()], &[endpoint.clone()])
            .await
            .unwrap_err();

        match err {
            ScanError::NoValidSession { last_endpoint } => {
                assert_eq!(last_endpoint, endpoint.to_string())
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_candidates() {
        let err = resolver(EventLog::shared()).resolve(&[], &[]).await.unwrap_err();
        assert!(matches!(
            err,
            ScanError::NoValidSession { ref last_endpoint } if last_endpoint == "none"
        ));
    }

    #[tokio::test]
    async fn test_connection_refused_is_a_rejection() {
        let server = MockServer::start().await;
        let endpoint = Url::parse(&server.uri()).unwrap();
        drop(server);

        let events = EventLog::shared();
        let result = resolver(events.clone())
            .resolve(&["00D000000000001!tok".to_string()], &[endpoint])
            .await;

        assert!(matches!(result, Err(ScanError::NoValidSession { .. })));
        assert_eq!(events.event_names(), vec!["endpoint:attempt", "endpoint:rejected"]);
    }
}
