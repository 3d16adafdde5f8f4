//! TaskBridge CLI: capture the story open in your browser into Notion.
//!
//! Talks to a Chrome started with `--remote-debugging-port`, scrapes the
//! story dialog out of the active tab, and files the draft into a Notion
//! database, updating the existing page when a search finds one. Credentials
//! and the theme preference live under `~/.taskbridge/`.
//!
//! Usage: `taskbridge capture`, or `taskbridge settings set --api-key ...
//! --database-id ...` first on a fresh machine.

use std::sync::Arc;

use clap::{Parser, Subcommand};

use taskbridge_lib::browser::scrape::{scrape_active_tab, scrape_or_empty};
use taskbridge_lib::browser::{DebugEndpoint, DEFAULT_DEBUG_PORT};
use taskbridge_lib::notion::client::NotionClient;
use taskbridge_lib::settings::{open_theme_store, NotionSettingsPatch, SettingsService, Theme};
use taskbridge_lib::submit::{SubmitFlow, SubmitOutcome};
use taskbridge_lib::types::TaskDraft;

/// TaskBridge -- file the story open in your browser into Notion.
#[derive(Parser, Debug)]
#[command(name = "taskbridge", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scrape the active tab, apply any overrides, and submit
    Capture {
        /// Skip the scrape and start from an empty draft
        #[arg(long)]
        no_scrape: bool,

        /// Override the task title
        #[arg(long)]
        title: Option<String>,

        /// Override the priority level
        #[arg(long)]
        priority: Option<String>,

        /// Override the story id used for find-or-update
        #[arg(long = "id")]
        external_id: Option<String>,

        /// Override the task type
        #[arg(long = "type")]
        task_type: Option<String>,

        /// Override the workflow status
        #[arg(long)]
        status: Option<String>,

        /// Override the source URL written to the record
        #[arg(long)]
        url: Option<String>,

        /// Port of the browser's DevTools endpoint
        #[arg(long, env = "TASKBRIDGE_DEBUG_PORT", default_value_t = DEFAULT_DEBUG_PORT)]
        debug_port: u16,
    },

    /// Scrape the active tab and print the draft without submitting
    Scrape {
        /// Print the draft as JSON
        #[arg(long)]
        json: bool,

        /// Port of the browser's DevTools endpoint
        #[arg(long, env = "TASKBRIDGE_DEBUG_PORT", default_value_t = DEFAULT_DEBUG_PORT)]
        debug_port: u16,
    },

    /// Inspect or change the stored Notion credentials
    Settings {
        #[command(subcommand)]
        action: SettingsCommands,
    },

    /// Show or set the theme preference
    Theme {
        /// `light` or `dark`; prints the current theme when omitted
        theme: Option<Theme>,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsCommands {
    /// Print the stored settings
    Show,

    /// Update one or both credential fields
    Set {
        /// Notion integration API key
        #[arg(long)]
        api_key: Option<String>,

        /// Target Notion database id
        #[arg(long)]
        database_id: Option<String>,
    },

    /// Follow the settings file and print every change
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Capture {
            no_scrape,
            title,
            priority,
            external_id,
            task_type,
            status,
            url,
            debug_port,
        } => {
            let endpoint = DebugEndpoint::with_port(debug_port);
            let mut draft = if no_scrape {
                TaskDraft::default()
            } else {
                scrape_or_empty(&endpoint).await
            };

            if let Some(title) = title {
                draft.title = title;
            }
            if let Some(priority) = priority {
                draft.priority = priority;
            }
            if let Some(external_id) = external_id {
                draft.external_id = external_id;
            }
            if let Some(task_type) = task_type {
                draft.task_type = task_type;
            }
            if let Some(status) = status {
                draft.status = status;
            }
            if let Some(url) = url {
                draft.source_url = url;
            }

            let settings = SettingsService::open()?;
            let flow = SubmitFlow::new(settings, Arc::new(NotionClient::new()));
            flow.set_draft(draft);

            let outcome = flow
                .submit()
                .await
                .map_err(|e| anyhow::anyhow!("Submission failed: {e}"))?;
            let (verb, page) = match &outcome {
                SubmitOutcome::Created(page) => ("Created", page),
                SubmitOutcome::Updated(page) => ("Updated", page),
            };
            match &page.url {
                Some(url) => println!("{verb} {} ({url})", page.id),
                None => println!("{verb} {}", page.id),
            }
        }

        Commands::Scrape { json, debug_port } => {
            let endpoint = DebugEndpoint::with_port(debug_port);
            let draft = scrape_active_tab(&endpoint)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to scrape the active tab: {e}"))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&draft)?);
            } else {
                println!("Title:    {}", draft.title);
                println!("Priority: {}", draft.priority);
                println!("ID:       {}", draft.external_id);
                println!("Type:     {}", draft.task_type);
                println!("Status:   {}", draft.status);
                println!("URL:      {}", draft.source_url);
            }
        }

        Commands::Settings { action } => match action {
            SettingsCommands::Show => {
                let settings = SettingsService::open()?.get();
                println!("API key:     {}", mask_key(&settings.notion_api_key));
                println!("Database id: {}", display_or_unset(&settings.notion_database_id));
            }
            SettingsCommands::Set {
                api_key,
                database_id,
            } => {
                let patch = NotionSettingsPatch {
                    notion_api_key: api_key,
                    notion_database_id: database_id,
                };
                if patch.is_empty() {
                    anyhow::bail!("Nothing to change. Pass --api-key and/or --database-id.");
                }
                SettingsService::open()?
                    .update(patch)
                    .map_err(|e| anyhow::anyhow!("Error saving settings: {e}"))?;
                println!("Settings saved");
            }
            SettingsCommands::Watch => {
                let settings = SettingsService::open()?;
                let current = settings.get();
                println!(
                    "API key: {}  Database id: {}",
                    mask_key(&current.notion_api_key),
                    display_or_unset(&current.notion_database_id)
                );

                let _subscription = settings.subscribe(|changed| {
                    println!(
                        "API key: {}  Database id: {}",
                        mask_key(&changed.notion_api_key),
                        display_or_unset(&changed.notion_database_id)
                    );
                });
                settings.spawn_live_update().await?;
            }
        },

        Commands::Theme { theme } => {
            let store = open_theme_store()?;
            match theme {
                Some(next) => {
                    store.set(|current| *current = next)?;
                    println!("{next}");
                }
                None => println!("{}", store.get()),
            }
        }
    }

    Ok(())
}

/// The key is secret; show enough to recognize it.
fn mask_key(key: &str) -> String {
    if key.is_empty() {
        return "(not set)".to_string();
    }
    let prefix: String = key.chars().take(4).collect();
    format!("{prefix}****")
}

fn display_or_unset(value: &str) -> String {
    if value.is_empty() {
        "(not set)".to_string()
    } else {
        value.to_string()
    }
}
