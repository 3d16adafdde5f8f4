//! Notion credentials and theme preference stores.
//!
//! Two storage slots: `notion-settings-storage-key` for the API
//! credentials and `theme-storage-key` for the theme.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::storage::{JsonStore, StorageError, Subscription};

/// Storage key for the Notion credentials slot.
pub const NOTION_SETTINGS_STORAGE_KEY: &str = "notion-settings-storage-key";
/// Storage key for the theme preference slot.
pub const THEME_STORAGE_KEY: &str = "theme-storage-key";

/// Notion credentials. Empty values are valid and mean "not configured".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotionSettings {
    #[serde(default)]
    pub notion_api_key: String,
    #[serde(default)]
    pub notion_database_id: String,
}

impl NotionSettings {
    /// Both fields non-empty. The submission flow refuses to run otherwise.
    pub fn is_complete(&self) -> bool {
        !self.notion_api_key.is_empty() && !self.notion_database_id.is_empty()
    }
}

/// Partial update merged over the stored settings. Absent fields keep their
/// current value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotionSettingsPatch {
    #[serde(default)]
    pub notion_api_key: Option<String>,
    #[serde(default)]
    pub notion_database_id: Option<String>,
}

impl NotionSettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.notion_api_key.is_none() && self.notion_database_id.is_none()
    }
}

/// Settings service handed to the submission flow: synchronous reads,
/// persistent partial writes, change subscription, optional live update.
#[derive(Clone)]
pub struct SettingsService {
    store: JsonStore<NotionSettings>,
}

impl SettingsService {
    /// Open against the default state directory (~/.taskbridge).
    pub fn open() -> Result<Self, StorageError> {
        Ok(Self {
            store: JsonStore::open(NOTION_SETTINGS_STORAGE_KEY)?,
        })
    }

    /// Open against an explicit directory.
    pub fn open_in(dir: &Path) -> Result<Self, StorageError> {
        Ok(Self {
            store: JsonStore::open_in(dir, NOTION_SETTINGS_STORAGE_KEY)?,
        })
    }

    /// Current settings snapshot.
    pub fn get(&self) -> NotionSettings {
        self.store.get()
    }

    /// Merge a partial update into the stored settings and persist.
    pub fn update(&self, patch: NotionSettingsPatch) -> Result<NotionSettings, StorageError> {
        self.store.set(|settings| {
            if let Some(api_key) = patch.notion_api_key {
                settings.notion_api_key = api_key;
            }
            if let Some(database_id) = patch.notion_database_id {
                settings.notion_database_id = database_id;
            }
        })
    }

    /// Register a change listener. The handle unsubscribes on drop.
    pub fn subscribe(
        &self,
        listener: impl Fn(&NotionSettings) + Send + Sync + 'static,
    ) -> Subscription {
        self.store.subscribe(listener)
    }

    /// Watch the backing file so edits made outside the process propagate.
    pub fn spawn_live_update(&self) -> tokio::task::JoinHandle<()> {
        self.store.spawn_live_update()
    }
}

/// Color theme preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Theme::Light => write!(f, "light"),
            Theme::Dark => write!(f, "dark"),
        }
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(format!("Unknown theme '{}'. Use light or dark.", other)),
        }
    }
}

/// Open the theme slot against the default state directory.
pub fn open_theme_store() -> Result<JsonStore<Theme>, StorageError> {
    JsonStore::open(THEME_STORAGE_KEY)
}

/// Open the theme slot against an explicit directory.
pub fn open_theme_store_in(dir: &Path) -> Result<JsonStore<Theme>, StorageError> {
    JsonStore::open_in(dir, THEME_STORAGE_KEY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_empty_and_incomplete() {
        let settings = NotionSettings::default();
        assert_eq!(settings.notion_api_key, "");
        assert_eq!(settings.notion_database_id, "");
        assert!(!settings.is_complete());
    }

    #[test]
    fn test_is_complete_requires_both_fields() {
        let only_key = NotionSettings {
            notion_api_key: "secret".to_string(),
            notion_database_id: String::new(),
        };
        assert!(!only_key.is_complete());

        let both = NotionSettings {
            notion_api_key: "secret".to_string(),
            notion_database_id: "db-1".to_string(),
        };
        assert!(both.is_complete());
    }

    #[test]
    fn test_partial_update_keeps_other_field() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = SettingsService::open_in(dir.path()).unwrap();

        service
            .update(NotionSettingsPatch {
                notion_api_key: Some("k1".to_string()),
                notion_database_id: Some("db-1".to_string()),
            })
            .unwrap();

        service
            .update(NotionSettingsPatch {
                notion_api_key: Some("x".to_string()),
                notion_database_id: None,
            })
            .unwrap();

        let settings = service.get();
        assert_eq!(settings.notion_api_key, "x");
        assert_eq!(settings.notion_database_id, "db-1");
    }

    #[test]
    fn test_update_notifies_subscribers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = SettingsService::open_in(dir.path()).unwrap();

        let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = std::sync::Arc::clone(&seen);
        let _sub = service.subscribe(move |settings: &NotionSettings| {
            sink.lock().push(settings.notion_api_key.clone());
        });

        service
            .update(NotionSettingsPatch {
                notion_api_key: Some("k1".to_string()),
                notion_database_id: None,
            })
            .unwrap();

        assert_eq!(*seen.lock(), vec!["k1".to_string()]);
    }

    #[test]
    fn test_settings_persist_across_opens() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let service = SettingsService::open_in(dir.path()).unwrap();
            service
                .update(NotionSettingsPatch {
                    notion_api_key: Some("k1".to_string()),
                    notion_database_id: Some("db-1".to_string()),
                })
                .unwrap();
        }

        let service = SettingsService::open_in(dir.path()).unwrap();
        let settings = service.get();
        assert_eq!(settings.notion_api_key, "k1");
        assert_eq!(settings.notion_database_id, "db-1");
    }

    #[test]
    fn test_settings_file_uses_storage_key_and_camel_case() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = SettingsService::open_in(dir.path()).unwrap();
        service
            .update(NotionSettingsPatch {
                notion_api_key: Some("k1".to_string()),
                notion_database_id: None,
            })
            .unwrap();

        let path = dir.path().join("notion-settings-storage-key.json");
        let raw = std::fs::read_to_string(path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["notionApiKey"], "k1");
        assert_eq!(json["notionDatabaseId"], "");
    }

    #[test]
    fn test_theme_defaults_persists_and_parses() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_theme_store_in(dir.path()).unwrap();
        assert_eq!(store.get(), Theme::Light);

        store.set(|t| *t = Theme::Dark).unwrap();
        assert_eq!(store.get(), Theme::Dark);

        let reopened = open_theme_store_in(dir.path()).unwrap();
        assert_eq!(reopened.get(), Theme::Dark);

        assert_eq!("dark".parse::<Theme>().unwrap(), Theme::Dark);
        assert!("blue".parse::<Theme>().is_err());
        assert_eq!(Theme::Dark.to_string(), "dark");
    }
}
