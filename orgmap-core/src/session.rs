// One analysis request: locate the record, resolve a connection, crawl.

use crate::cache::MetadataCache;
use crate::crawl::{CrawlOptions, CrawlProgressCallback, GraphCrawler};
use crate::error::{AnalyzeError, Result};
use crate::filter::{TrackedObjects, is_config_object_name};
use crate::ids::{find_object_name, find_record_id};
use crate::model::{AnalysisResult, BusinessObject, SessionDetails};
use crate::sobjects;
use orgmap_scanner::auth::parse_locator;
use orgmap_scanner::events::{SharedSink, mask_token};
use orgmap_scanner::{Connection, CookieStore, CredentialSource, EndpointResolver, ScanError, SchemaClient};
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use url::Url;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    /// Record page URL
    pub locator: String,
    pub tracked_objects: Vec<String>,
    pub crawl: CrawlOptions,
}

impl AnalyzeOptions {
    pub fn new(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            tracked_objects: Vec::new(),
            crawl: CrawlOptions::default(),
        }
    }

    pub fn with_tracked_objects<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tracked_objects = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_crawl_options(mut self, crawl: CrawlOptions) -> Self {
        self.crawl = crawl;
        self
    }
}

/// Record located on a page, before any API access
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLocation {
    pub page: Url,
    pub object_name: String,
    pub record_id: String,
}

impl RecordLocation {
    pub fn host(&self) -> String {
        host_of(&self.page)
    }

    pub fn origin(&self) -> String {
        self.page.origin().ascii_serialization()
    }
}

fn host_of(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

/// Parse a record page URL into the object and record to start from
pub fn locate_record(locator: &str) -> Result<RecordLocation> {
    let page = parse_locator(locator)?;
    let record_id = find_record_id(locator).ok_or_else(|| {
        ScanError::InvalidLocator(format!("no record id found in {}", locator))
    })?;
    let object_name = find_object_name(locator).ok_or_else(|| {
        AnalyzeError::UnsupportedRootObject(format!("no object type found in {}", locator))
    })?;
    if is_config_object_name(&object_name) {
        return Err(AnalyzeError::UnsupportedRootObject(object_name));
    }

    Ok(RecordLocation {
        page,
        object_name,
        record_id,
    })
}

/// Wires credential discovery, endpoint probing, the schema client and the
/// crawler together for analyses against one cookie store
pub struct SessionContext<S: CookieStore> {
    credentials: CredentialSource<S>,
    http: Client,
    cache: Arc<MetadataCache>,
    events: SharedSink,
    progress_callback: Option<CrawlProgressCallback>,
}

impl<S: CookieStore> SessionContext<S> {
    pub fn new(store: S, http: Client, cache: Arc<MetadataCache>, events: SharedSink) -> Self {
        Self {
            credentials: CredentialSource::new(store, events.clone()),
            http,
            cache,
            events,
            progress_callback: None,
        }
    }

    pub fn with_progress_callback(mut self, callback: CrawlProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    pub fn credentials(&self) -> &CredentialSource<S> {
        &self.credentials
    }

    /// Session cookie facts for a page, without contacting the API
    pub fn session_details(&self, locator: &str) -> Result<SessionDetails> {
        let candidates = self.credentials.resolve_candidates(locator)?;
        let token_hint = candidates.token_candidates.first().map(|t| mask_token(t));
        self.events.record(
            "session:cookie",
            json!({
                "host": candidates.host,
                "hasSid": token_hint.is_some(),
                "sidHint": token_hint,
            }),
        );

        Ok(SessionDetails {
            host: candidates.host,
            has_session_cookie: token_hint.is_some(),
            token_hint,
        })
    }

    pub async fn resolve_connection(&self, locator: &str) -> Result<Connection> {
        let candidates = self.credentials.resolve_candidates(locator)?;
        let resolver = EndpointResolver::new(self.http.clone(), self.events.clone());
        let connection = resolver
            .resolve(&candidates.token_candidates, &candidates.endpoint_candidates)
            .await?;

        self.events.record(
            "api:resolved",
            json!({
                "baseUrl": connection.base_endpoint().as_str(),
                "apiVersion": connection.api_version(),
                "tokenHint": connection.token_hint(),
            }),
        );
        Ok(connection)
    }

    pub fn schema_client(&self, connection: Connection) -> SchemaClient {
        SchemaClient::new(self.http.clone(), connection, self.events.clone())
    }

    pub async fn list_business_sobjects(&self, locator: &str) -> Result<Vec<BusinessObject>> {
        let connection = self.resolve_connection(locator).await?;
        let client = self.schema_client(connection);
        sobjects::list_business_sobjects(&client, &self.cache).await
    }

    pub async fn analyze(&self, options: &AnalyzeOptions) -> Result<AnalysisResult> {
        let location = locate_record(&options.locator)?;
        let connection = self.resolve_connection(&options.locator).await?;
        self.analyze_with(connection, &location, options).await
    }

    /// Crawl from an already located record over an already resolved connection
    pub async fn analyze_with(
        &self,
        connection: Connection,
        location: &RecordLocation,
        options: &AnalyzeOptions,
    ) -> Result<AnalysisResult> {
        let analysis_id = Uuid::new_v4().to_string();
        info!(
            "Analysis {} of {}:{}",
            analysis_id, location.object_name, location.record_id
        );
        self.events.record(
            "analyze:start",
            json!({
                "analysisId": analysis_id,
                "host": location.host(),
                "rootObject": location.object_name,
                "recordIdPrefix": location.record_id.chars().take(3).collect::<String>(),
            }),
        );

        let tracked = TrackedObjects::new(&options.tracked_objects, &location.object_name);
        let api_version = connection.api_version().to_string();

        let mut crawler = GraphCrawler::new(
            self.schema_client(connection),
            self.cache.clone(),
            tracked.clone(),
            location.origin(),
            self.events.clone(),
        )
        .with_options(options.crawl.clone());
        if let Some(ref callback) = self.progress_callback {
            crawler = crawler.with_progress_callback(callback.clone());
        }

        let graph = crawler
            .crawl(&location.object_name, &location.record_id)
            .await?;

        Ok(AnalysisResult {
            analysis_id,
            host: location.host(),
            api_version,
            root_object: location.object_name.clone(),
            tracked_objects: tracked.to_vec(),
            graph,
        })
    }
}
