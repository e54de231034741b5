pub mod auth;
pub mod client;
pub mod connection;
pub mod cookies;
pub mod error;
pub mod events;
pub mod resolver;
pub mod schema;

pub use auth::{CredentialSource, SessionCandidates};
pub use client::{SchemaClient, build_http_client};
pub use connection::Connection;
pub use cookies::{Cookie, CookieQuery, CookieStore, MemoryCookieStore};
pub use error::ScanError;
pub use events::{Event, EventLog, EventSink, NullSink, SharedSink, mask_token};
pub use resolver::EndpointResolver;
pub use schema::{
    ApiVersion, ChildRelationship, Field, ObjectSchema, Record, ReferenceTarget, SObjectSummary,
};
