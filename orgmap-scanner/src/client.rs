use crate::connection::Connection;
use crate::error::{Result, ScanError};
use crate::events::SharedSink;
use crate::schema::{GlobalDescribe, ObjectSchema, QueryResponse, Record, SObjectSummary};
use reqwest::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const API_ROOT: &str = "/services/data/";

const BODY_HINT_LEN: usize = 200;
const EVENT_BODY_HINT_LEN: usize = 180;

pub fn build_http_client(timeout_secs: u64) -> Result<Client> {
    let client = Client::builder()
        .user_agent(concat!("orgmap/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs((timeout_secs / 2).max(1)))
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()?;
    Ok(client)
}

/// An HTML body on an API route is a login page, never data
pub fn is_html(content_type: &str) -> bool {
    content_type.to_lowercase().contains("text/html")
}

/// First `max` characters of a response body
pub fn body_hint(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

pub(crate) fn content_type_of(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Deduplicate field names, dropping blanks, preserving first occurrence
pub fn unique_fields<'a, I>(fields: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    fields
        .into_iter()
        .map(str::trim)
        .filter(|f| !f.is_empty() && seen.insert(f.to_string()))
        .map(str::to_string)
        .collect()
}

pub fn single_record_query(object: &str, record_id: &str, fields: &[&str]) -> String {
    format!(
        "SELECT {} FROM {} WHERE Id = '{}' LIMIT 1",
        unique_fields(fields.iter().copied()).join(", "),
        object,
        record_id
    )
}

/// Typed request layer over one resolved [`Connection`]
#[derive(Clone)]
pub struct SchemaClient {
    http: Client,
    connection: Connection,
    events: SharedSink,
}

impl SchemaClient {
    pub fn new(http: Client, connection: Connection, events: SharedSink) -> Self {
        Self {
            http,
            connection,
            events,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Qualify `path` with the API version unless it already targets the API root
    pub fn api_path(&self, path: &str) -> Result<String> {
        if !path.starts_with('/') {
            return Err(ScanError::InvalidUrl(format!(
                "API paths must be absolute, got {}",
                path
            )));
        }
        if path.starts_with(API_ROOT) {
            Ok(path.to_string())
        } else {
            Ok(format!(
                "{}v{}{}",
                API_ROOT,
                self.connection.api_version(),
                path
            ))
        }
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let full_path = self.api_path(path)?;
        let url = self
            .connection
            .base_endpoint()
            .join(&full_path)
            .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", full_path, e)))?;

        debug!("GET {}", url);
        let mut request = self
            .http
            .get(url.clone())
            .header(ACCEPT, "application/json")
            .header(
                AUTHORIZATION,
                format!("Bearer {}", self.connection.token()),
            );
        if !query.is_empty() {
            request = request.query(query);
        }

        let response = request.send().await?;
        let status = response.status();
        let final_url = response.url().to_string();
        let content_type = content_type_of(&response);
        let body = response.text().await?;

        if !status.is_success() || is_html(&content_type) {
            warn!("Request to {} failed with status {}", url, status.as_u16());
            self.events.record(
                "http:error",
                json!({
                    "url": url.as_str(),
                    "finalUrl": final_url,
                    "status": status.as_u16(),
                    "contentType": content_type,
                    "bodyHint": body_hint(&body, EVENT_BODY_HINT_LEN),
                }),
            );
            return Err(ScanError::RemoteRequest {
                status: status.as_u16(),
                body_hint: body_hint(&body, BODY_HINT_LEN),
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| ScanError::ParseError(format!("Unexpected payload from {}: {}", url, e)))
    }

    pub async fn describe(&self, object: &str) -> Result<ObjectSchema> {
        self.get_json(&format!("/sobjects/{}/describe", object), &[])
            .await
    }

    pub async fn list_sobjects(&self) -> Result<Vec<SObjectSummary>> {
        let global: GlobalDescribe = self.get_json("/sobjects", &[]).await?;
        Ok(global.sobjects)
    }

    pub async fn query_one(
        &self,
        object: &str,
        record_id: &str,
        fields: &[&str],
    ) -> Result<Option<Record>> {
        let soql = single_record_query(object, record_id, fields);
        let page: QueryResponse = self.get_json("/query", &[("q", soql.as_str())]).await?;
        Ok(page.records.into_iter().next())
    }

    /// Run `soql`, following continuation pages until exhausted or
    /// `max_records` rows are collected
    pub async fn query_all(&self, soql: &str, max_records: usize) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        if max_records == 0 {
            return Ok(records);
        }

        let mut page: QueryResponse = self.get_json("/query", &[("q", soql)]).await?;
        loop {
            records.extend(page.records);
            if records.len() >= max_records {
                break;
            }
            match page.next_records_url {
                Some(next) if !next.is_empty() => {
                    debug!("Following continuation {}", next);
                    page = self.get_json(&next, &[]).await?;
                }
                _ => break,
            }
        }

        records.truncate(max_records);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventLog;
    use std::sync::Arc;
    use url::Url;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path, query_param},
    };

    fn client_for(server: &MockServer, events: Arc<EventLog>) -> SchemaClient {
        let connection = Connection::new(
            Url::parse(&server.uri()).unwrap(),
            "00D000000000001!token",
            "60.0",
        );
        SchemaClient::new(build_http_client(5).unwrap(), connection, events)
    }

    fn page(ids: &[&str], next: Option<&str>) -> serde_json::Value {
        json!({
            "totalSize": 5,
            "done": next.is_none(),
            "records": ids.iter().map(|id| json!({ "Id": id })).collect::<Vec<_>>(),
            "nextRecordsUrl": next,
        })
    }

    #[test]
    fn test_single_record_query_deduplicates_fields() {
        assert_eq!(
            single_record_query("Account", "001000000000001AAA", &["Id", "Name", "", "Id", "ParentId"]),
            "SELECT Id, Name, ParentId FROM Account WHERE Id = '001000000000001AAA' LIMIT 1"
        );
    }

    #[tokio::test]
    async fn test_api_path_rules() {
        let server = MockServer::start().await;
        let client = client_for(&server, EventLog::shared());

        assert_eq!(
            client.api_path("/sobjects").unwrap(),
            "/services/data/v60.0/sobjects"
        );
        assert_eq!(
            client.api_path("/services/data/v60.0/query/01gNEXT-2000").unwrap(),
            "/services/data/v60.0/query/01gNEXT-2000"
        );
        assert!(matches!(
            client.api_path("sobjects"),
            Err(ScanError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_describe_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/services/data/v60.0/sobjects/Account/describe"))
            .and(header("Authorization", "Bearer 00D000000000001!token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "Account",
                "fields": [{ "name": "Name", "type": "string", "nameField": true }],
                "childRelationships": []
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, EventLog::shared());
        let schema = client.describe("Account").await.unwrap();

        assert_eq!(schema.name, "Account");
        assert_eq!(schema.name_field().unwrap().name, "Name");
    }

    #[tokio::test]
    async fn test_query_all_follows_pages_and_truncates() {
        let server = MockServer::start().await;
        let soql = "SELECT Id FROM Contact WHERE AccountId = '001000000000001AAA'";

        Mock::given(method("GET"))
            .and(path("/services/data/v60.0/query"))
            .and(query_param("q", soql))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(
                &["003000000000001AAA", "003000000000002AAA"],
                Some("/services/data/v60.0/query/01gNEXT-2000"),
            )))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/services/data/v60.0/query/01gNEXT-2000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(
                &["003000000000003AAA", "003000000000004AAA"],
                Some("/services/data/v60.0/query/01gNEXT-4000"),
            )))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/services/data/v60.0/query/01gNEXT-4000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(
                &["003000000000005AAA"],
                None,
            )))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server, EventLog::shared());
        let records = client.query_all(soql, 3).await.unwrap();

        let ids: Vec<_> = records.iter().filter_map(|r| r.id()).collect();
        assert_eq!(
            ids,
            vec!["003000000000001AAA", "003000000000002AAA", "003000000000003AAA"]
        );
    }

    #[tokio::test]
    async fn test_query_one_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/services/data/v60.0/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(&[], None)))
            .mount(&server)
            .await;

        let client = client_for(&server, EventLog::shared());
        let record = client
            .query_one("Account", "001000000000001AAA", &["Id", "Name"])
            .await
            .unwrap();

        assert!(record.is_none());
    }

    #[tokio::test]
    async fn test_remote_error_carries_status_and_hint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/services/data/v60.0/sobjects/Nope/describe"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_string(r#"[{"errorCode":"NOT_FOUND","message":"The requested resource does not exist"}]"#),
            )
            .mount(&server)
            .await;

        let events = EventLog::shared();
        let client = client_for(&server, events.clone());
        let err = client.describe("Nope").await.unwrap_err();

        match err {
            ScanError::RemoteRequest { status, body_hint } => {
                assert_eq!(status, 404);
                assert!(body_hint.contains("NOT_FOUND"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(events.event_names(), vec!["http:error"]);
    }

    #[tokio::test]
    async fn test_html_success_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/services/data/v60.0/sobjects"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<html>login</html>", "text/html; charset=UTF-8"),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, EventLog::shared());
        let err = client.list_sobjects().await.unwrap_err();

        assert!(matches!(err, ScanError::RemoteRequest { status: 200, .. }));
    }
}
