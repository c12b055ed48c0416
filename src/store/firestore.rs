//! Firestore Store
//!
//! Collection-style store backed by the Cloud Firestore REST API (v1).
//! One document per record, addressed by document id:
//!
//! ```text
//! value:     stringValue     (absent on touch-only writes)
//! expires:   timestampValue  (second resolution)
//! namespace: stringValue     (used to scope clear)
//! ```
//!
//! Point the endpoint at the Firestore emulator for local runs.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use reqwest::{StatusCode, Url};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::cache::expiry;
use crate::error::{CacheError, Result};
use crate::store::client::{ensure_success, ClientOptions, RestClient};
use crate::store::{clear_by_scan, Addressing, CacheRecord, NamespaceScan, RecordAddress, RecordStore};

/// Public Firestore REST endpoint.
pub const FIRESTORE_ENDPOINT: &str = "https://firestore.googleapis.com/v1";

const FIELD_VALUE: &str = "value";
const FIELD_EXPIRES: &str = "expires";
const FIELD_NAMESPACE: &str = "namespace";
const FIELD_NAME: &str = "__name__";

/// Documents fetched per `:runQuery` page when scanning a namespace.
pub const DEFAULT_SCAN_PAGE_SIZE: u32 = 300;

// == Options ==
#[derive(Debug, Clone)]
pub struct FirestoreOptions {
    /// REST base, e.g. [`FIRESTORE_ENDPOINT`] or `http://localhost:8080/v1`
    pub endpoint: String,
    pub project_id: String,
    /// Database id, usually `(default)`
    pub database: String,
    /// Collection holding the cache documents
    pub collection: String,
    /// OAuth access token, obtained outside this crate
    pub bearer_token: Option<String>,
    /// Page size of the namespace scan behind `clear`
    pub scan_page_size: u32,
    pub client: ClientOptions,
}

impl FirestoreOptions {
    pub fn new(project_id: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            endpoint: FIRESTORE_ENDPOINT.to_string(),
            project_id: project_id.into(),
            database: "(default)".to_string(),
            collection: collection.into(),
            bearer_token: None,
            scan_page_size: DEFAULT_SCAN_PAGE_SIZE,
            client: ClientOptions::default(),
        }
    }
}

// == Firestore Store ==
#[derive(Debug)]
pub struct FirestoreStore {
    client: RestClient,
    documents_url: Url,
    collection: String,
    scan_page_size: u32,
}

impl FirestoreStore {
    pub fn new(options: FirestoreOptions) -> Result<Self> {
        if options.project_id.is_empty() {
            return Err(CacheError::Config("Firestore project id is required".to_string()));
        }

        let documents_url = Url::parse(&format!(
            "{}/projects/{}/databases/{}/documents",
            options.endpoint.trim_end_matches('/'),
            options.project_id,
            options.database
        ))
        .map_err(|e| CacheError::Config(format!("Invalid Firestore endpoint: {}", e)))?;

        let client = RestClient::new(options.client, options.bearer_token)?;

        Ok(Self {
            client,
            documents_url,
            collection: options.collection,
            scan_page_size: options.scan_page_size.max(1),
        })
    }

    fn document_url(&self, key: &str) -> Result<Url> {
        let mut url = self.documents_url.clone();
        url.path_segments_mut()
            .map_err(|_| CacheError::Config("Firestore endpoint cannot be a base URL".to_string()))?
            .push(&self.collection)
            .push(key);
        Ok(url)
    }

    fn run_query_url(&self) -> Result<Url> {
        Url::parse(&format!("{}:runQuery", self.documents_url))
            .map_err(|e| CacheError::Config(format!("Invalid Firestore endpoint: {}", e)))
    }
}

// == Wire Format ==
fn to_fields(record: &CacheRecord) -> Map<String, Value> {
    let mut fields = Map::new();
    if let Some(value) = &record.value {
        fields.insert(FIELD_VALUE.to_string(), json!({ "stringValue": value }));
    }
    fields.insert(
        FIELD_EXPIRES.to_string(),
        json!({ "timestampValue": record.expires.to_rfc3339_opts(SecondsFormat::Secs, true) }),
    );
    if let Some(namespace) = &record.namespace {
        fields.insert(FIELD_NAMESPACE.to_string(), json!({ "stringValue": namespace }));
    }
    fields
}

fn from_document(document: &Value) -> CacheRecord {
    let fields = &document["fields"];
    let string_field = |name: &str| fields[name]["stringValue"].as_str().map(str::to_string);

    // A document without a readable expiry is treated as long dead.
    let expires = fields[FIELD_EXPIRES]["timestampValue"]
        .as_str()
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or_else(expiry::epoch);

    CacheRecord {
        value: string_field(FIELD_VALUE),
        expires,
        namespace: string_field(FIELD_NAMESPACE),
    }
}

fn document_id(name: &str) -> Option<String> {
    name.rsplit('/').next().filter(|id| !id.is_empty()).map(str::to_string)
}

#[async_trait]
impl RecordStore for FirestoreStore {
    fn name(&self) -> &'static str {
        "firestore"
    }

    fn addressing(&self) -> Addressing {
        Addressing::Collection
    }

    async fn put(&self, address: &RecordAddress, record: &CacheRecord, merge: bool) -> Result<()> {
        let url = self.document_url(&address.key)?;
        let fields = to_fields(record);
        let mask: Vec<(&str, String)> = if merge {
            fields.keys().map(|field| ("updateMask.fieldPaths", field.clone())).collect()
        } else {
            Vec::new()
        };
        let body = json!({ "fields": fields });

        let response = self
            .client
            .send(|http| http.patch(url.clone()).query(&mask).json(&body))
            .await?;
        ensure_success(response, "Firestore write").await?;

        debug!(key = %address.key, merge, "firestore document written");
        Ok(())
    }

    async fn fetch(&self, address: &RecordAddress) -> Result<Option<CacheRecord>> {
        let url = self.document_url(&address.key)?;
        let response = self.client.send(|http| http.get(url.clone())).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let document: Value = ensure_success(response, "Firestore read").await?.json().await?;
        Ok(Some(from_document(&document)))
    }

    async fn remove(&self, address: &RecordAddress) -> Result<()> {
        let url = self.document_url(&address.key)?;
        let response = self.client.send(|http| http.delete(url.clone())).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        ensure_success(response, "Firestore delete").await?;
        Ok(())
    }

    async fn clear_namespace(&self, namespace: &str) -> Result<Option<u64>> {
        clear_by_scan(self, namespace).await.map(Some)
    }
}

// == Namespace Paging ==
/// Issues one `:runQuery` page per call, ordered by document name and
/// resumed just after the last name already seen. Deleting scanned
/// documents between pages does not move the cursor.
struct NamespacePager {
    client: RestClient,
    url: Url,
    collection: String,
    namespace: String,
    page_size: u32,
}

impl NamespacePager {
    fn query(&self, after: Option<&str>) -> Value {
        let mut query = json!({
            "structuredQuery": {
                "from": [{ "collectionId": self.collection }],
                "where": {
                    "fieldFilter": {
                        "field": { "fieldPath": FIELD_NAMESPACE },
                        "op": "EQUAL",
                        "value": { "stringValue": self.namespace }
                    }
                },
                "select": { "fields": [{ "fieldPath": FIELD_NAME }] },
                "orderBy": [{ "field": { "fieldPath": FIELD_NAME }, "direction": "ASCENDING" }],
                "limit": self.page_size
            }
        });
        if let Some(name) = after {
            query["structuredQuery"]["startAt"] = json!({
                "values": [{ "referenceValue": name }],
                "before": false
            });
        }
        query
    }

    /// Full document names of the next page.
    async fn page(&self, after: Option<&str>) -> Result<Vec<String>> {
        let query = self.query(after);
        let response = self
            .client
            .send(|http| http.post(self.url.clone()).json(&query))
            .await?;
        let results: Vec<Value> = ensure_success(response, "Firestore query").await?.json().await?;

        Ok(results
            .iter()
            .filter_map(|result| result["document"]["name"].as_str())
            .map(str::to_string)
            .collect())
    }
}

#[async_trait]
impl NamespaceScan for FirestoreStore {
    async fn scan_namespace(&self, namespace: &str) -> Result<BoxStream<'static, Result<String>>> {
        let pager = NamespacePager {
            client: self.client.clone(),
            url: self.run_query_url()?,
            collection: self.collection.clone(),
            namespace: namespace.to_string(),
            page_size: self.scan_page_size,
        };

        // A short page is the last one; the next page is requested only
        // once the consumer has drained the current one.
        let pages = stream::try_unfold(Some((pager, None::<String>)), |state| async move {
            let Some((pager, after)) = state else {
                return Ok::<_, CacheError>(None);
            };

            let names = pager.page(after.as_deref()).await?;
            debug!(namespace = %pager.namespace, documents = names.len(), "firestore scan page");

            let next = match names.last() {
                Some(last) if names.len() >= pager.page_size as usize => {
                    Some((pager, Some(last.clone())))
                }
                _ => None,
            };
            let ids: Vec<Result<String>> = names
                .iter()
                .filter_map(|name| document_id(name))
                .map(Ok)
                .collect();

            Ok(Some((stream::iter(ids), next)))
        });

        Ok(pages.try_flatten().boxed())
    }
}
