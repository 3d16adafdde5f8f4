//! HTTP client for the Notion REST API.

use async_trait::async_trait;
use serde::Deserialize;

use super::{NotionApi, NotionError, PageRef, NOTION_API_BASE_URL, NOTION_API_VERSION};

pub struct NotionClient {
    client: reqwest::Client,
    base_url: String,
}

impl NotionClient {
    pub fn new() -> Self {
        Self::with_base_url(NOTION_API_BASE_URL)
    }

    /// Point the client at a different API root. Used by tests.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        api_key: &str,
    ) -> Result<serde_json::Value, NotionError> {
        let response = request
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Notion-Version", NOTION_API_VERSION)
            .header("Content-Type", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(NotionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

impl Default for NotionClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<PageRef>,
}

#[async_trait]
impl NotionApi for NotionClient {
    async fn search_pages(
        &self,
        api_key: &str,
        query: &str,
    ) -> Result<Vec<PageRef>, NotionError> {
        let body = serde_json::json!({
            "query": query,
            "filter": { "property": "object", "value": "page" },
        });
        let request = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&body);
        let value = self.send(request, api_key).await?;
        let parsed: SearchResponse = serde_json::from_value(value)?;
        Ok(parsed.results)
    }

    async fn create_page(
        &self,
        api_key: &str,
        database_id: &str,
        properties: serde_json::Value,
    ) -> Result<PageRef, NotionError> {
        let body = serde_json::json!({
            "parent": { "database_id": database_id },
            "properties": properties,
        });
        let request = self
            .client
            .post(format!("{}/pages", self.base_url))
            .json(&body);
        let value = self.send(request, api_key).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn update_page(
        &self,
        api_key: &str,
        page_id: &str,
        properties: serde_json::Value,
    ) -> Result<PageRef, NotionError> {
        let body = serde_json::json!({ "properties": properties });
        let request = self
            .client
            .patch(format!("{}/pages/{}", self.base_url, page_id))
            .json(&body);
        let value = self.send(request, api_key).await?;
        Ok(serde_json::from_value(value)?)
    }
}
