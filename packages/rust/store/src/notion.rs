//! Notion REST adapter for [`DocumentStore`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lingoflow_blocks::{ContentNode, nodes_to_request, parse_block};
use lingoflow_shared::{LingoflowError, NotionConfig, Result, read_secret};
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::{
    ChildrenPage, CollectionQuery, DocumentPage, DocumentRecord, DocumentStore,
    MAX_CHILDREN_PER_WRITE, Properties, PropertyFilter, parse_properties, properties_to_json,
    widest_child_list,
};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Page size requested from list and query endpoints (the API maximum).
const PAGE_SIZE: u32 = 100;

/// Longest error body excerpt kept in error messages.
const MAX_ERROR_EXCERPT: usize = 300;

const USER_AGENT: &str = concat!("Lingoflow/", env!("CARGO_PKG_VERSION"));

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    has_more: bool,
    next_cursor: Option<String>,
}

impl ListResponse {
    fn next(&self) -> Option<String> {
        if self.has_more {
            self.next_cursor.clone()
        } else {
            None
        }
    }
}

#[derive(Deserialize)]
struct PageResponse {
    id: String,
    #[serde(default)]
    properties: Value,
    created_time: Option<DateTime<Utc>>,
}

/// Response to an append: the new top-level blocks, in order.
#[derive(Deserialize)]
struct AppendResponse {
    #[serde(default)]
    results: Vec<CreatedBlock>,
}

#[derive(Deserialize)]
struct CreatedBlock {
    id: String,
}

#[derive(Deserialize)]
struct ApiError {
    code: Option<String>,
    message: Option<String>,
}

/// HTTP client for the Notion API.
#[derive(Debug, Clone)]
pub struct NotionClient {
    http: Client,
    base_url: String,
    token: String,
    version: String,
}

impl NotionClient {
    /// Build a client with an explicit token.
    pub fn new(token: impl Into<String>, config: &NotionConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| LingoflowError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: token.into(),
            version: config.version.clone(),
        })
    }

    /// Build a client reading the token from the configured environment variable.
    pub fn from_config(config: &NotionConfig) -> Result<Self> {
        let token = read_secret(&config.api_key_env)?;
        Self::new(token, config)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .header("Notion-Version", &self.version)
    }

    async fn send<T: serde::de::DeserializeOwned>(&self, req: RequestBuilder, what: &str) -> Result<T> {
        let response = req
            .send()
            .await
            .map_err(|e| LingoflowError::Network(format!("{what}: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LingoflowError::Network(format!("{what}: failed to read body: {e}")))?;

        if !status.is_success() {
            return Err(LingoflowError::store_status(
                status.as_u16(),
                format!("{what}: {}", error_excerpt(&body)),
            ));
        }

        serde_json::from_str(&body)
            .map_err(|e| LingoflowError::parse(format!("{what}: unexpected response: {e}")))
    }
}

/// Pull `code: message` out of an API error body, or fall back to the raw text.
fn error_excerpt(body: &str) -> String {
    if let Ok(ApiError {
        code: Some(code),
        message: Some(message),
    }) = serde_json::from_str::<ApiError>(body)
    {
        return format!("{code}: {message}");
    }
    body.chars().take(MAX_ERROR_EXCERPT).collect()
}

fn check_write_size(nodes: &[ContentNode]) -> Result<()> {
    let widest = widest_child_list(nodes);
    if widest > MAX_CHILDREN_PER_WRITE {
        return Err(LingoflowError::validation(format!(
            "child list of {widest} nodes in one write, limit is {MAX_CHILDREN_PER_WRITE}"
        )));
    }
    Ok(())
}

fn filter_to_json(filter: &PropertyFilter) -> Value {
    match filter {
        PropertyFilter::Checkbox { property, equals } => {
            json!({ "property": property, "checkbox": { "equals": equals } })
        }
        PropertyFilter::Select { property, equals } => {
            json!({ "property": property, "select": { "equals": equals } })
        }
    }
}

fn query_body(query: &CollectionQuery, cursor: Option<&str>) -> Value {
    let mut body = json!({ "page_size": PAGE_SIZE });
    match query.filters.as_slice() {
        [] => {}
        [single] => body["filter"] = filter_to_json(single),
        many => body["filter"] = json!({ "and": many.iter().map(filter_to_json).collect::<Vec<_>>() }),
    }
    if query.newest_first {
        body["sorts"] = json!([{ "timestamp": "created_time", "direction": "descending" }]);
    }
    if let Some(cursor) = cursor {
        body["start_cursor"] = json!(cursor);
    }
    body
}

#[async_trait]
impl DocumentStore for NotionClient {
    #[instrument(skip(self))]
    async fn list_children(&self, node_id: &str, cursor: Option<&str>) -> Result<ChildrenPage> {
        let mut req = self
            .request(Method::GET, &format!("/blocks/{node_id}/children"))
            .query(&[("page_size", PAGE_SIZE.to_string())]);
        if let Some(cursor) = cursor {
            req = req.query(&[("start_cursor", cursor)]);
        }

        let list: ListResponse = self.send(req, "list children").await?;
        let next_cursor = list.next();
        let items = list
            .results
            .into_iter()
            .map(parse_block)
            .collect::<Result<Vec<_>>>()?;
        debug!(items = items.len(), has_more = next_cursor.is_some(), "listed children");

        Ok(ChildrenPage { items, next_cursor })
    }

    #[instrument(skip_all, fields(collection = %collection_id, children = children.len()))]
    async fn create_document(
        &self,
        collection_id: &str,
        properties: &Properties,
        children: &[ContentNode],
    ) -> Result<String> {
        check_write_size(children)?;
        let body = json!({
            "parent": { "database_id": collection_id },
            "properties": properties_to_json(properties),
            "children": nodes_to_request(children),
        });

        let page: PageResponse = self
            .send(self.request(Method::POST, "/pages").json(&body), "create page")
            .await?;
        debug!(id = %page.id, "created page");
        Ok(page.id)
    }

    #[instrument(skip_all, fields(parent = %parent_id, count = nodes.len()))]
    async fn append_children(&self, parent_id: &str, nodes: &[ContentNode]) -> Result<Vec<String>> {
        check_write_size(nodes)?;
        let body = json!({ "children": nodes_to_request(nodes) });
        let appended: AppendResponse = self
            .send(
                self.request(Method::PATCH, &format!("/blocks/{parent_id}/children"))
                    .json(&body),
                "append children",
            )
            .await?;
        Ok(appended.results.into_iter().map(|b| b.id).collect())
    }

    #[instrument(skip_all, fields(document = %document_id))]
    async fn update_properties(&self, document_id: &str, properties: &Properties) -> Result<()> {
        let body = json!({ "properties": properties_to_json(properties) });
        let _: Value = self
            .send(
                self.request(Method::PATCH, &format!("/pages/{document_id}")).json(&body),
                "update page",
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_properties(&self, document_id: &str) -> Result<Properties> {
        let page: PageResponse = self
            .send(
                self.request(Method::GET, &format!("/pages/{document_id}")),
                "retrieve page",
            )
            .await?;
        parse_properties(&page.properties)
    }

    #[instrument(skip(self, query))]
    async fn query_collection(
        &self,
        collection_id: &str,
        query: &CollectionQuery,
        cursor: Option<&str>,
    ) -> Result<DocumentPage> {
        let req = self
            .request(Method::POST, &format!("/databases/{collection_id}/query"))
            .json(&query_body(query, cursor));
        let list: ListResponse = self.send(req, "query database").await?;
        let next_cursor = list.next();

        let mut items = Vec::with_capacity(list.results.len());
        for raw in list.results {
            let page: PageResponse = serde_json::from_value(raw)
                .map_err(|e| LingoflowError::parse(format!("malformed page: {e}")))?;
            items.push(DocumentRecord {
                properties: parse_properties(&page.properties)?,
                created_time: page.created_time.unwrap_or_default(),
                id: page.id,
            });
        }

        Ok(DocumentPage { items, next_cursor })
    }
}
