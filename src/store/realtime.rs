//! Realtime Database Store
//!
//! Tree-style store backed by the Firebase Realtime Database REST API.
//! Records live at `{root}/{namespace node}/{key}` as
//! `{"value": "<encoded>", "expires": <unix seconds>}`; clearing a
//! namespace deletes its whole subtree in one request.

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Url;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::cache::expiry;
use crate::error::{CacheError, Result};
use crate::store::client::{ensure_success, ClientOptions, RestClient};
use crate::store::{tree_namespace_node, Addressing, CacheRecord, RecordAddress, RecordStore};

// == Options ==
#[derive(Debug, Clone)]
pub struct RealtimeDatabaseOptions {
    /// Database URL, e.g. `https://<project>-default-rtdb.firebaseio.com`
    pub database_url: String,
    /// Path under which all namespaces are stored
    pub root: String,
    /// Hash address keys so any cache key is a legal path segment
    pub hash_keys: bool,
    /// OAuth access token, obtained outside this crate
    pub bearer_token: Option<String>,
    pub client: ClientOptions,
}

impl RealtimeDatabaseOptions {
    pub fn new(database_url: impl Into<String>, root: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            root: root.into(),
            hash_keys: true,
            bearer_token: None,
            client: ClientOptions::default(),
        }
    }
}

// == Realtime Database Store ==
#[derive(Debug)]
pub struct RealtimeDatabaseStore {
    client: RestClient,
    database_url: Url,
    root: Vec<String>,
    hash_keys: bool,
}

impl RealtimeDatabaseStore {
    pub fn new(options: RealtimeDatabaseOptions) -> Result<Self> {
        let database_url = Url::parse(&options.database_url)
            .map_err(|e| CacheError::Config(format!("Invalid database URL: {}", e)))?;
        if database_url.cannot_be_a_base() {
            return Err(CacheError::Config(format!(
                "Invalid database URL: {}",
                options.database_url
            )));
        }

        let root = options
            .root
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();
        let client = RestClient::new(options.client, options.bearer_token)?;

        Ok(Self {
            client,
            database_url,
            root,
            hash_keys: options.hash_keys,
        })
    }

    /// REST URL of the node at `{root}/{namespace}/{key}`.
    ///
    /// The namespace always has a node of its own (see
    /// [`tree_namespace_node`]), so a namespace URL is never the root or an
    /// ancestor of another namespace.
    fn node_url(&self, namespace: &str, key: Option<&str>) -> Result<Url> {
        let namespace = tree_namespace_node(namespace)?;
        let mut segments: Vec<&str> = self.root.iter().map(String::as_str).collect();
        segments.push(namespace.as_str());
        if let Some(key) = key {
            segments.push(key);
        }
        let last = format!("{}.json", segments.pop().unwrap_or_default());

        let mut url = self.database_url.clone();
        url.path_segments_mut()
            .map_err(|_| CacheError::Config("database URL cannot be a base URL".to_string()))?
            .pop_if_empty()
            .extend(segments)
            .push(&last);
        Ok(url)
    }
}

// == Wire Format ==
fn to_node(record: &CacheRecord) -> Map<String, Value> {
    let mut node = Map::new();
    if let Some(value) = &record.value {
        node.insert("value".to_string(), json!(value));
    }
    node.insert("expires".to_string(), json!(record.expires.timestamp()));
    node
}

fn from_node(node: &Value) -> Option<CacheRecord> {
    if !node.is_object() {
        return None;
    }

    let expires = node["expires"]
        .as_i64()
        .or_else(|| node["expires"].as_f64().map(|secs| secs as i64))
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(expiry::epoch);

    Some(CacheRecord {
        value: node["value"].as_str().map(str::to_string),
        expires,
        namespace: None,
    })
}

#[async_trait]
impl RecordStore for RealtimeDatabaseStore {
    fn name(&self) -> &'static str {
        "realtime-database"
    }

    fn addressing(&self) -> Addressing {
        Addressing::Tree {
            hash_keys: self.hash_keys,
        }
    }

    async fn put(&self, address: &RecordAddress, record: &CacheRecord, merge: bool) -> Result<()> {
        let url = self.node_url(&address.namespace, Some(&address.key))?;
        let body = Value::Object(to_node(record));

        let response = self
            .client
            .send(|http| {
                let request = if merge {
                    http.patch(url.clone())
                } else {
                    http.put(url.clone())
                };
                request.json(&body)
            })
            .await?;
        ensure_success(response, "Realtime Database write").await?;

        debug!(namespace = %address.namespace, key = %address.key, merge, "realtime database node written");
        Ok(())
    }

    async fn fetch(&self, address: &RecordAddress) -> Result<Option<CacheRecord>> {
        let url = self.node_url(&address.namespace, Some(&address.key))?;
        let response = self.client.send(|http| http.get(url.clone())).await?;
        let node: Value = ensure_success(response, "Realtime Database read")
            .await?
            .json()
            .await?;

        Ok(from_node(&node))
    }

    async fn remove(&self, address: &RecordAddress) -> Result<()> {
        let url = self.node_url(&address.namespace, Some(&address.key))?;
        let response = self.client.send(|http| http.delete(url.clone())).await?;
        ensure_success(response, "Realtime Database delete").await?;
        Ok(())
    }

    async fn clear_namespace(&self, namespace: &str) -> Result<Option<u64>> {
        let url = self.node_url(namespace, None)?;
        let response = self.client.send(|http| http.delete(url.clone())).await?;
        ensure_success(response, "Realtime Database subtree delete").await?;

        debug!(namespace, node = url.path(), "realtime database subtree removed");
        Ok(None)
    }
}
