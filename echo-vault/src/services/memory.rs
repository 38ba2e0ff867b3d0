//! In-memory Record Store and Blob Store
//!
//! Used by tests and demos. Both count calls and can be told to fail so
//! error paths can be driven deterministically.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use echo_common::events::{ChangeCallback, EchoEvent, EventBus, SubscriptionHandle, Table};
use echo_common::models::{
    Echo, EchoFilter, EchoOrder, EchoPatch, NewEcho, Profile, ProfileUpdate, UserSettings,
};
use echo_common::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;
use uuid::Uuid;

use super::{check_echo_patch, BlobStore, RecordStore};

#[derive(Default)]
struct Tables {
    echoes: Vec<Echo>,
    profiles: HashMap<Uuid, Profile>,
    settings: HashMap<Uuid, UserSettings>,
}

/// Record Store kept in process memory
pub struct MemoryRecordStore {
    tables: RwLock<Tables>,
    events: EventBus,
    select_calls: AtomicUsize,
    insert_calls: AtomicUsize,
    update_calls: AtomicUsize,
    fail_selects: AtomicBool,
    fail_inserts: AtomicBool,
    fail_updates: AtomicBool,
}

impl MemoryRecordStore {
    pub fn new(events: EventBus) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            events,
            select_calls: AtomicUsize::new(0),
            insert_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            fail_selects: AtomicBool::new(false),
            fail_inserts: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
        }
    }

    /// Insert a fully formed row without publishing a change
    pub fn seed(&self, echo: Echo) {
        self.write().echoes.push(echo);
    }

    /// Snapshot of every stored echo in insertion order
    pub fn all_echoes(&self) -> Vec<Echo> {
        self.read().echoes.clone()
    }

    pub fn select_calls(&self) -> usize {
        self.select_calls.load(Ordering::SeqCst)
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn fail_selects(&self, fail: bool) {
        self.fail_selects.store(fail, Ordering::SeqCst);
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn sort_echoes(echoes: &mut [Echo], order: EchoOrder) {
    match order {
        // Stable sorts keep insertion order for equal keys; reverse it for desc
        EchoOrder::CreatedAtDesc => {
            echoes.reverse();
            echoes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        }
        EchoOrder::CreatedAtAsc => echoes.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        EchoOrder::UnlockDateAsc => echoes.sort_by(|a, b| {
            a.unlock_date
                .cmp(&b.unlock_date)
                .then(a.created_at.cmp(&b.created_at))
        }),
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn select_echoes(&self, filter: &EchoFilter, order: EchoOrder) -> Result<Vec<Echo>> {
        self.select_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_selects.load(Ordering::SeqCst) {
            return Err(Error::Store("select failed".to_string()));
        }

        let mut echoes: Vec<Echo> = self
            .read()
            .echoes
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        sort_echoes(&mut echoes, order);
        Ok(echoes)
    }

    async fn insert_echo(&self, echo: NewEcho) -> Result<Echo> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(Error::Store("insert failed".to_string()));
        }

        let stored = Echo {
            id: Uuid::new_v4(),
            user_id: echo.user_id,
            title: echo.title,
            mood: echo.mood,
            created_at: echo.created_at,
            unlock_date: echo.unlock_date,
            duration_seconds: echo.duration_seconds,
            unlocked: echo.unlocked,
            audio_url: echo.audio_url,
        };
        self.write().echoes.push(stored.clone());

        self.events.emit_lossy(EchoEvent::EchoInserted {
            user_id: stored.user_id,
            echo_id: stored.id,
            timestamp: Utc::now(),
        });
        Ok(stored)
    }

    async fn update_echoes(&self, filter: &EchoFilter, patch: EchoPatch) -> Result<Vec<Echo>> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        check_echo_patch(&patch)?;
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(Error::Store("update failed".to_string()));
        }

        let updated: Vec<Echo> = {
            let mut tables = self.write();
            tables
                .echoes
                .iter_mut()
                .filter(|e| filter.matches(e))
                .map(|e| {
                    e.unlocked = true;
                    e.clone()
                })
                .collect()
        };

        if !updated.is_empty() {
            self.events.emit_lossy(EchoEvent::EchoesUnlocked {
                user_id: filter.user_id,
                echo_ids: updated.iter().map(|e| e.id).collect(),
                timestamp: Utc::now(),
            });
        }
        Ok(updated)
    }

    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        Ok(self.read().profiles.get(&user_id).cloned())
    }

    async fn update_profile(&self, user_id: Uuid, update: ProfileUpdate) -> Result<Profile> {
        let profile = Profile {
            id: user_id,
            first_name: update.first_name,
            last_name: update.last_name,
            bio: update.bio,
        };
        self.write().profiles.insert(user_id, profile.clone());
        self.events.emit_lossy(EchoEvent::ProfileUpdated {
            user_id,
            timestamp: Utc::now(),
        });
        Ok(profile)
    }

    async fn get_settings(&self, user_id: Uuid) -> Result<Option<UserSettings>> {
        Ok(self.read().settings.get(&user_id).cloned())
    }

    async fn upsert_settings(&self, settings: UserSettings) -> Result<UserSettings> {
        self.write().settings.insert(settings.user_id, settings.clone());
        self.events.emit_lossy(EchoEvent::SettingsUpdated {
            user_id: settings.user_id,
            timestamp: Utc::now(),
        });
        Ok(settings)
    }

    fn subscribe(&self, table: Table, callback: ChangeCallback) -> SubscriptionHandle {
        self.events.on_change(table, callback)
    }
}

/// Blob Store kept in process memory
pub struct MemoryBlobStore {
    base_url: String,
    objects: RwLock<HashMap<String, (Bytes, String)>>,
    upload_calls: AtomicUsize,
    fail_uploads: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            objects: RwLock::new(HashMap::new()),
            upload_calls: AtomicUsize::new(0),
            fail_uploads: AtomicBool::new(false),
        }
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    /// Stored paths, sorted
    pub fn paths(&self) -> Vec<String> {
        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        let mut paths: Vec<String> = objects.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn content_type(&self, path: &str) -> Option<String> {
        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        objects.get(path).map(|(_, ct)| ct.clone())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, path: &str, bytes: Bytes, content_type: &str) -> Result<()> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(Error::Upload("upload failed".to_string()));
        }

        let mut objects = self.objects.write().unwrap_or_else(|e| e.into_inner());
        if objects.contains_key(path) {
            return Err(Error::Upload(format!("Object already exists: {}", path)));
        }
        objects.insert(path.to_string(), (bytes, content_type.to_string()));
        Ok(())
    }

    async fn download(&self, path: &str) -> Result<Bytes> {
        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        objects
            .get(path)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| Error::NotFound(format!("Blob {}", path)))
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/blobs/{}", self.base_url, path)
    }
}
