//! The find-or-update submission flow.
//!
//! State machine: `Idle -> Submitting -> {Success, Error} -> Idle`, with the
//! terminal states decaying back to `Idle` on a timer (3s after success, 5s
//! after an error). A submission searches Notion for an existing page when
//! the draft carries an external id, then patches the first hit or creates a
//! fresh page. Settings are read from the injected service at call time, and
//! an explicit guard rejects a second submission while one is in flight.
//!
//! The search step queries by draft title, not by external id, so a
//! same-titled page belonging to a different task can be picked up. Known
//! weakness, kept as observed behavior.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::notion::{task_properties, NotionApi, NotionError, PageRef};
use crate::settings::SettingsService;
use crate::types::TaskDraft;

pub const SUCCESS_RESET_MS: u64 = 3_000;
pub const ERROR_RESET_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitStatus {
    #[default]
    Idle,
    Submitting,
    Success,
    Error,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Notion API key and database id must both be configured")]
    NotConfigured,
    #[error("A submission is already in flight")]
    InFlight,
    #[error("{0}")]
    Api(#[from] NotionError),
}

/// What a successful submission did to the database.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Created(PageRef),
    Updated(PageRef),
}

impl SubmitOutcome {
    pub fn page(&self) -> &PageRef {
        match self {
            SubmitOutcome::Created(page) | SubmitOutcome::Updated(page) => page,
        }
    }
}

/// Status plus a generation counter so a stale reset timer cannot clobber
/// the state of a newer submission.
#[derive(Debug, Default)]
struct StatusCell {
    status: SubmitStatus,
    generation: u64,
}

pub struct SubmitFlow {
    settings: SettingsService,
    api: Arc<dyn NotionApi>,
    draft: Mutex<TaskDraft>,
    status: Arc<Mutex<StatusCell>>,
    in_flight: AtomicBool,
    success_reset: Duration,
    error_reset: Duration,
}

impl SubmitFlow {
    pub fn new(settings: SettingsService, api: Arc<dyn NotionApi>) -> Self {
        Self {
            settings,
            api,
            draft: Mutex::new(TaskDraft::default()),
            status: Arc::new(Mutex::new(StatusCell::default())),
            in_flight: AtomicBool::new(false),
            success_reset: Duration::from_millis(SUCCESS_RESET_MS),
            error_reset: Duration::from_millis(ERROR_RESET_MS),
        }
    }

    /// Shorten the auto-reset delays. Used by tests.
    pub fn with_reset_delays(mut self, success: Duration, error: Duration) -> Self {
        self.success_reset = success;
        self.error_reset = error;
        self
    }

    pub fn status(&self) -> SubmitStatus {
        self.status.lock().status
    }

    pub fn set_draft(&self, draft: TaskDraft) {
        *self.draft.lock() = draft;
    }

    pub fn draft(&self) -> TaskDraft {
        self.draft.lock().clone()
    }

    /// Run one submission attempt.
    ///
    /// Rejected immediately when another attempt holds the guard; that
    /// rejection leaves the owning attempt's status untouched.
    pub async fn submit(&self) -> Result<SubmitOutcome, SubmitError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SubmitError::InFlight);
        }

        let result = self.run_attempt().await;
        match &result {
            Ok(outcome) => {
                *self.draft.lock() = TaskDraft::default();
                info!("Submission succeeded, page {}", outcome.page().id);
                self.settle(SubmitStatus::Success, self.success_reset);
            }
            Err(e) => {
                warn!("Submission failed: {e}");
                self.settle(SubmitStatus::Error, self.error_reset);
            }
        }
        self.in_flight.store(false, Ordering::SeqCst);
        result
    }

    async fn run_attempt(&self) -> Result<SubmitOutcome, SubmitError> {
        let settings = self.settings.get();
        if !settings.is_complete() {
            return Err(SubmitError::NotConfigured);
        }

        self.set_status(SubmitStatus::Submitting);

        let draft = self.draft.lock().clone();
        let properties = task_properties(&draft);

        let existing = if draft.external_id.is_empty() {
            None
        } else {
            info!("Searching for an existing page");
            self.api
                .search_pages(&settings.notion_api_key, &draft.title)
                .await?
                .into_iter()
                .next()
        };

        let outcome = match existing {
            Some(page) => {
                info!("Found existing page {}, updating", page.id);
                let updated = self
                    .api
                    .update_page(&settings.notion_api_key, &page.id, properties)
                    .await?;
                SubmitOutcome::Updated(updated)
            }
            None => {
                info!("No existing page, creating a new one");
                let created = self
                    .api
                    .create_page(
                        &settings.notion_api_key,
                        &settings.notion_database_id,
                        properties,
                    )
                    .await?;
                SubmitOutcome::Created(created)
            }
        };

        Ok(outcome)
    }

    fn set_status(&self, status: SubmitStatus) -> u64 {
        let mut cell = self.status.lock();
        cell.generation += 1;
        cell.status = status;
        cell.generation
    }

    /// Enter a terminal status and schedule the decay back to `Idle`. The
    /// timer only fires if no newer transition happened in the meantime.
    fn settle(&self, status: SubmitStatus, reset_after: Duration) {
        let generation = self.set_status(status);
        let cell = Arc::clone(&self.status);
        tokio::spawn(async move {
            tokio::time::sleep(reset_after).await;
            let mut cell = cell.lock();
            if cell.generation == generation {
                cell.status = SubmitStatus::Idle;
            }
        });
    }
}
