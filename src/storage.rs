//! JSON-file-backed key-value storage with change subscription.
//!
//! One storage key maps to one file under `~/.taskbridge/`. Each slot loads
//! its defaults when the file is absent, persists atomically on every
//! update, notifies subscribers on change, and can watch its own file so
//! edits made outside the process propagate to subscribers as well.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::util::atomic_write_str;

/// Debounce window for file system events
const DEBOUNCE_MS: u64 = 500;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Could not find home directory")]
    HomeDirNotFound,
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Root directory for persisted state (~/.taskbridge).
pub fn state_dir() -> Result<PathBuf, StorageError> {
    let home = dirs::home_dir().ok_or(StorageError::HomeDirNotFound)?;
    Ok(home.join(".taskbridge"))
}

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Inner<T> {
    path: PathBuf,
    state: RwLock<T>,
    listeners: Mutex<Vec<(u64, Listener<T>)>>,
    next_listener_id: AtomicU64,
}

/// A persistent storage slot holding one value of type `T`.
///
/// Clones share the same underlying state and listener list.
pub struct JsonStore<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for JsonStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Handle returned by [`JsonStore::subscribe`]. The listener stays registered
/// until this handle is dropped or `unsubscribe` is called.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl<T> JsonStore<T>
where
    T: Clone + Default + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Open the slot for `key` under the default state directory.
    pub fn open(key: &str) -> Result<Self, StorageError> {
        Self::open_in(&state_dir()?, key)
    }

    /// Open the slot for `key` under an explicit directory.
    pub fn open_in(dir: &Path, key: &str) -> Result<Self, StorageError> {
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
            }
        }

        let path = dir.join(format!("{}.json", key));
        let state = load_value(&path)?;

        Ok(Self {
            inner: Arc::new(Inner {
                path,
                state: RwLock::new(state),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(1),
            }),
        })
    }

    /// Snapshot of the current value.
    pub fn get(&self) -> T {
        self.inner.state.read().clone()
    }

    /// Apply a mutation to the current value, persist it, and notify
    /// subscribers. Returns the new value.
    pub fn set(&self, mutator: impl FnOnce(&mut T)) -> Result<T, StorageError> {
        let next = {
            let mut guard = self.inner.state.write();
            let mut next = guard.clone();
            mutator(&mut next);
            persist_value(&self.inner.path, &next)?;
            *guard = next.clone();
            next
        };
        self.notify(&next);
        Ok(next)
    }

    /// Register a change listener. The returned handle unsubscribes on drop.
    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, Arc::new(listener)));

        let weak: Weak<Inner<T>> = Arc::downgrade(&self.inner);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.listeners.lock().retain(|(lid, _)| *lid != id);
                }
            })),
        }
    }

    /// Re-read the backing file and notify subscribers if the value changed.
    /// A missing file resets to defaults.
    pub fn reload(&self) -> Result<Option<T>, StorageError> {
        let fresh = load_value(&self.inner.path)?;
        let changed = {
            let mut guard = self.inner.state.write();
            if *guard == fresh {
                false
            } else {
                *guard = fresh.clone();
                true
            }
        };
        if changed {
            self.notify(&fresh);
            Ok(Some(fresh))
        } else {
            Ok(None)
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Start watching the backing file for external edits.
    ///
    /// Spawns a background task that debounces filesystem events (500ms
    /// window) and reloads the slot, notifying subscribers when the stored
    /// value actually changed. Runs until the returned handle is aborted.
    pub fn spawn_live_update(&self) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let dir = match store.inner.path.parent() {
                Some(dir) => dir.to_path_buf(),
                None => return,
            };
            let file_name = match store.inner.path.file_name() {
                Some(name) => name.to_os_string(),
                None => return,
            };

            // Channel for forwarding notify events to the async debouncer
            let (fs_tx, mut fs_rx) = mpsc::channel::<()>(64);

            let tx = fs_tx.clone();
            let watched = file_name.clone();
            let mut watcher = match RecommendedWatcher::new(
                move |result: Result<Event, notify::Error>| {
                    if let Ok(event) = result {
                        if matches!(
                            event.kind,
                            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                        ) {
                            let ours = event
                                .paths
                                .iter()
                                .any(|p| p.file_name() == Some(watched.as_os_str()));
                            if ours {
                                let _ = tx.try_send(());
                            }
                        }
                    }
                },
                notify::Config::default(),
            ) {
                Ok(w) => w,
                Err(e) => {
                    log::error!("Storage: failed to create filesystem watcher: {}", e);
                    return;
                }
            };

            // Watch the directory rather than the file: atomic writes replace
            // the file by rename, which breaks a direct file watch.
            if let Err(e) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
                log::error!("Storage: failed to watch {}: {}", dir.display(), e);
                return;
            }

            log::info!("Storage: watching {} for changes", store.inner.path.display());

            loop {
                if fs_rx.recv().await.is_none() {
                    break;
                }

                // Debounce: drain any events that arrive within the window
                sleep(Duration::from_millis(DEBOUNCE_MS)).await;
                while fs_rx.try_recv().is_ok() {}

                match store.reload() {
                    Ok(Some(_)) => {
                        log::debug!("Storage: reloaded {}", store.inner.path.display())
                    }
                    Ok(None) => {}
                    Err(e) => log::warn!(
                        "Storage: reload of {} failed: {}",
                        store.inner.path.display(),
                        e
                    ),
                }
            }

            log::info!("Storage: watcher for {} stopped", store.inner.path.display());
        })
    }

    fn notify(&self, value: &T) {
        let listeners: Vec<Listener<T>> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(value);
        }
    }
}

fn load_value<T: Default + DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    if !path.exists() {
        return Ok(T::default());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn persist_value<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let content = serde_json::to_string_pretty(value)?;
    atomic_write_str(path, &content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}
