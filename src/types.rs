use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A task pending submission to Notion.
///
/// Built once per capture from the page scrape (plus any CLI overrides) and
/// discarded after submission. The serde names are the keys the scrape
/// expression emits, so a scrape result deserializes straight into a draft.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    /// Story title. Becomes the Task title property.
    #[serde(default)]
    pub title: String,
    /// Priority label, e.g. "P5". Becomes the "Priority Level" select.
    #[serde(default)]
    pub priority: String,
    /// The tracker's story id. Becomes the ID rich_text.
    /// An empty value skips the search step on submit.
    #[serde(default)]
    pub external_id: String,
    /// Story type, e.g. "Bug". Becomes the Type select.
    #[serde(default, rename = "type")]
    pub task_type: String,
    /// Workflow state, e.g. "Ready for Development". Becomes the Status property.
    #[serde(default)]
    pub status: String,
    /// URL of the page the story was captured from.
    #[serde(default)]
    pub source_url: String,
    /// When the record was captured. Stamped at submit time if absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl TaskDraft {
    /// True when every user-visible field is empty (the post-success reset state).
    pub fn is_empty(&self) -> bool {
        self.title.is_empty()
            && self.priority.is_empty()
            && self.external_id.is_empty()
            && self.task_type.is_empty()
            && self.status.is_empty()
    }
}
