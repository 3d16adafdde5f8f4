//! Scrape a task draft out of the page open in the active tab.
//!
//! Shortcut renders an open story as a dialog with stable element ids, so
//! each draft field maps to one CSS selector. The selectors, together with
//! how to read the matched element and what to fall back to, live in
//! [`FieldExtractor`] values; the whole set is compiled into a single
//! JavaScript object expression and evaluated in the page.

use log::warn;

use crate::types::TaskDraft;

use super::cdp::CdpClient;
use super::{BrowserError, DebugEndpoint};

// Story dialog elements, outermost container down.
const TITLE_SELECTOR: &str = "#story-dialog-parent > div > div.content.story-container > div.scrollable-content > div > div > div > div.title-container > h2"; // Main heading
const PRIORITY_SELECTOR: &str = "#story-dialog-parent > div > div.content.story-container > div.scrollable-content > div > div > div > div.async-details > div.right-column.r_react > div > div:nth-child(20) > div > div > div > div > div.css-mkkf9p.emkynbd0 > div.css-mcez24.e1o1j54b0 > span"; // Priority indicator
const ID_SELECTOR: &str = "#story-dialog-parent > div > div.content.story-container > div.scrollable-content > div > div > div > div.async-details > div.right-column.r_react > div > div.attribute.story-id > button > span > input"; // Story id input
const TYPE_SELECTOR: &str = "#story-dialog-story-type-dropdown > span.value"; // Type dropdown
const STATE_SELECTOR: &str = "#story-dialog-state-dropdown > div > div > div > div > span.value > span"; // Workflow state dropdown

/// How a matched element is read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReadMode {
    InnerHtml,
    /// `element.value`, for form inputs.
    Value,
}

/// What the field becomes when the selector matches nothing (or matches an
/// element with empty content).
#[derive(Debug, Clone, PartialEq)]
pub enum Fallback {
    Literal(&'static str),
    DocumentTitle,
    Empty,
}

/// One scraped field: where it comes from and how it degrades.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldExtractor {
    /// Draft field this extractor feeds, in wire form (`externalId`, ...).
    pub field: &'static str,
    pub selector: &'static str,
    pub read: ReadMode,
    pub fallback: Fallback,
}

impl FieldExtractor {
    /// The JavaScript expression that reads this field from the page.
    pub fn js_expression(&self) -> String {
        let accessor = match self.read {
            ReadMode::InnerHtml => "innerHTML",
            ReadMode::Value => "value",
        };
        let fallback = match &self.fallback {
            Fallback::Literal(text) => js_string(text),
            Fallback::DocumentTitle => format!("document.title || {}", js_string("")),
            Fallback::Empty => js_string(""),
        };
        format!(
            "document.querySelector({})?.{} || {}",
            js_string(self.selector),
            accessor,
            fallback
        )
    }
}

/// The extractor set for Shortcut's story dialog.
pub fn story_dialog_extractors() -> Vec<FieldExtractor> {
    vec![
        FieldExtractor {
            field: "title",
            selector: TITLE_SELECTOR,
            read: ReadMode::InnerHtml,
            fallback: Fallback::DocumentTitle,
        },
        FieldExtractor {
            field: "priority",
            selector: PRIORITY_SELECTOR,
            read: ReadMode::InnerHtml,
            fallback: Fallback::Literal("P5"),
        },
        FieldExtractor {
            field: "externalId",
            selector: ID_SELECTOR,
            read: ReadMode::Value,
            fallback: Fallback::Empty,
        },
        FieldExtractor {
            field: "type",
            selector: TYPE_SELECTOR,
            read: ReadMode::InnerHtml,
            fallback: Fallback::Literal("Bug"),
        },
        FieldExtractor {
            field: "status",
            selector: STATE_SELECTOR,
            read: ReadMode::InnerHtml,
            fallback: Fallback::Literal("Ready for Development"),
        },
    ]
}

/// Compile extractors into one object-literal expression, so the whole
/// scrape is a single `Runtime.evaluate` round trip.
pub fn build_scrape_expression(extractors: &[FieldExtractor]) -> String {
    let fields: Vec<String> = extractors
        .iter()
        .map(|extractor| format!("{}: {}", js_string(extractor.field), extractor.js_expression()))
        .collect();
    format!("({{ {} }})", fields.join(", "))
}

fn js_string(text: &str) -> String {
    serde_json::Value::from(text).to_string()
}

/// Scrape the active tab into a draft. The tab's URL becomes `source_url`.
pub async fn scrape_active_tab(endpoint: &DebugEndpoint) -> Result<TaskDraft, BrowserError> {
    let page = endpoint.active_page().await?;
    let ws_url = page
        .web_socket_debugger_url
        .clone()
        .ok_or_else(|| BrowserError::NoDebuggerUrl(page.url.clone()))?;

    let client = CdpClient::connect(&ws_url).await?;
    let expression = build_scrape_expression(&story_dialog_extractors());
    let value = client.evaluate(&expression).await?;

    let mut draft: TaskDraft = serde_json::from_value(value)?;
    draft.source_url = page.url;
    Ok(draft)
}

/// Scrape, degrading any failure to an empty draft.
///
/// Capture prefills the form from whatever the page yields; when the
/// browser is unreachable the user types everything by hand instead.
pub async fn scrape_or_empty(endpoint: &DebugEndpoint) -> TaskDraft {
    match scrape_active_tab(endpoint).await {
        Ok(draft) => draft,
        Err(e) => {
            warn!("Scrape failed, starting from an empty draft: {e}");
            TaskDraft::default()
        }
    }
}
