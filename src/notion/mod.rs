//! Notion REST integration.
//!
//! Three calls against `https://api.notion.com/v1`: page search, page
//! create, page update. Follows the same architectural pattern as the other
//! integration clients: a thin reqwest wrapper plus a trait seam so the
//! submission flow can be tested against a fake.

pub mod client;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::types::TaskDraft;

pub const NOTION_API_BASE_URL: &str = "https://api.notion.com/v1";
pub const NOTION_API_VERSION: &str = "2022-06-28";

#[derive(Debug, thiserror::Error)]
pub enum NotionError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Notion API {status}: {message}")]
    Api { status: u16, message: String },
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A page reference returned by search, create, and update responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRef {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// The Notion operations the submission flow depends on.
///
/// The API key is passed per call: settings are read at submit time, never
/// cached in the client.
#[async_trait]
pub trait NotionApi: Send + Sync {
    /// POST /search with a page filter. Returns matches in response order.
    async fn search_pages(&self, api_key: &str, query: &str)
        -> Result<Vec<PageRef>, NotionError>;

    /// POST /pages creating a record in `database_id` with `properties`.
    async fn create_page(
        &self,
        api_key: &str,
        database_id: &str,
        properties: serde_json::Value,
    ) -> Result<PageRef, NotionError>;

    /// PATCH /pages/{page_id} replacing `properties`.
    async fn update_page(
        &self,
        api_key: &str,
        page_id: &str,
        properties: serde_json::Value,
    ) -> Result<PageRef, NotionError>;
}

/// Build the property set written for a draft.
///
/// Property names and value shapes must match the target database schema:
/// Task (title), "Priority Level" (select), ID (rich_text), Type (select),
/// Status (status), URL (url), CreatedAt (date).
pub fn task_properties(draft: &TaskDraft) -> serde_json::Value {
    let created_at = draft
        .created_at
        .unwrap_or_else(Utc::now)
        .to_rfc3339_opts(SecondsFormat::Millis, true);

    serde_json::json!({
        "Task": {
            "title": [
                { "text": { "content": draft.title } }
            ]
        },
        "Priority Level": {
            "select": { "name": draft.priority }
        },
        "ID": {
            "rich_text": [
                { "text": { "content": draft.external_id } }
            ]
        },
        "Type": {
            "select": { "name": draft.task_type }
        },
        "Status": {
            "status": { "name": draft.status }
        },
        "URL": {
            "url": draft.source_url
        },
        "CreatedAt": {
            "date": { "start": created_at }
        }
    })
}
