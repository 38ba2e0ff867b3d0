//! SQLite-backed Record Store

use async_trait::async_trait;
use chrono::Utc;
use echo_common::db::{
    echo_from_row, profile_from_row, settings_from_row, to_millis, ECHO_COLUMNS,
};
use echo_common::events::{ChangeCallback, EchoEvent, EventBus, SubscriptionHandle, Table};
use echo_common::models::{
    Echo, EchoFilter, EchoOrder, EchoPatch, NewEcho, Profile, ProfileUpdate, UserSettings,
};
use echo_common::Result;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use super::{check_echo_patch, RecordStore};

/// Record Store over the shared SQLite pool.
///
/// Every successful write is published on the [`EventBus`].
#[derive(Clone)]
pub struct SqliteRecordStore {
    db: SqlitePool,
    events: EventBus,
}

impl SqliteRecordStore {
    pub fn new(db: SqlitePool, events: EventBus) -> Self {
        Self { db, events }
    }
}

/// Append `AND ...` clauses for every set field of `filter`
fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &EchoFilter) {
    qb.push(" WHERE user_id = ");
    qb.push_bind(filter.user_id.to_string());

    if let Some(ids) = &filter.ids {
        qb.push(" AND id IN (");
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(id.to_string());
        }
        separated.push_unseparated(")");
    }
    if let Some(unlocked) = filter.unlocked {
        qb.push(" AND unlocked = ");
        qb.push_bind(unlocked as i64);
    }
    if let Some(cutoff) = filter.unlock_at_or_before {
        qb.push(" AND unlock_date <= ");
        qb.push_bind(to_millis(cutoff));
    }
    if let Some(mood) = &filter.mood {
        qb.push(" AND mood = ");
        qb.push_bind(mood.clone());
    }
}

fn order_clause(order: EchoOrder) -> &'static str {
    match order {
        EchoOrder::CreatedAtDesc => " ORDER BY created_at DESC, rowid DESC",
        EchoOrder::CreatedAtAsc => " ORDER BY created_at ASC, rowid ASC",
        EchoOrder::UnlockDateAsc => " ORDER BY unlock_date ASC, created_at ASC",
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn select_echoes(&self, filter: &EchoFilter, order: EchoOrder) -> Result<Vec<Echo>> {
        if filter.ids.as_ref().is_some_and(|ids| ids.is_empty()) {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM echoes", ECHO_COLUMNS));
        push_filter(&mut qb, filter);
        qb.push(order_clause(order));

        let rows = qb.build().fetch_all(&self.db).await?;
        rows.iter().map(echo_from_row).collect()
    }

    async fn insert_echo(&self, echo: NewEcho) -> Result<Echo> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO echoes (id, user_id, title, mood, created_at, unlock_date,
                                duration_seconds, unlocked, audio_url)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(echo.user_id.to_string())
        .bind(&echo.title)
        .bind(&echo.mood)
        .bind(to_millis(echo.created_at))
        .bind(to_millis(echo.unlock_date))
        .bind(echo.duration_seconds as i64)
        .bind(echo.unlocked as i64)
        .bind(&echo.audio_url)
        .execute(&self.db)
        .await?;

        let stored = Echo {
            id,
            user_id: echo.user_id,
            title: echo.title,
            mood: echo.mood,
            created_at: echo.created_at,
            unlock_date: echo.unlock_date,
            duration_seconds: echo.duration_seconds,
            unlocked: echo.unlocked,
            audio_url: echo.audio_url,
        };

        debug!("Inserted echo {} for {}", stored.id, stored.user_id);
        self.events.emit_lossy(EchoEvent::EchoInserted {
            user_id: stored.user_id,
            echo_id: stored.id,
            timestamp: Utc::now(),
        });

        Ok(stored)
    }

    async fn update_echoes(&self, filter: &EchoFilter, patch: EchoPatch) -> Result<Vec<Echo>> {
        check_echo_patch(&patch)?;
        if filter.ids.as_ref().is_some_and(|ids| ids.is_empty()) {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE echoes SET unlocked = 1");
        push_filter(&mut qb, filter);
        qb.push(format!(" RETURNING {}", ECHO_COLUMNS));

        let rows = qb.build().fetch_all(&self.db).await?;
        let updated: Vec<Echo> = rows.iter().map(echo_from_row).collect::<Result<_>>()?;

        if !updated.is_empty() {
            debug!("Unlocked {} echoes for {}", updated.len(), filter.user_id);
            self.events.emit_lossy(EchoEvent::EchoesUnlocked {
                user_id: filter.user_id,
                echo_ids: updated.iter().map(|e| e.id).collect(),
                timestamp: Utc::now(),
            });
        }

        Ok(updated)
    }

    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        let row = sqlx::query("SELECT id, first_name, last_name, bio FROM profiles WHERE id = ?")
            .bind(user_id.to_string())
            .fetch_optional(&self.db)
            .await?;

        row.as_ref().map(profile_from_row).transpose()
    }

    async fn update_profile(&self, user_id: Uuid, update: ProfileUpdate) -> Result<Profile> {
        sqlx::query(
            r#"
            INSERT INTO profiles (id, first_name, last_name, bio)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                bio = excluded.bio
            "#,
        )
        .bind(user_id.to_string())
        .bind(&update.first_name)
        .bind(&update.last_name)
        .bind(&update.bio)
        .execute(&self.db)
        .await?;

        self.events.emit_lossy(EchoEvent::ProfileUpdated {
            user_id,
            timestamp: Utc::now(),
        });

        Ok(Profile {
            id: user_id,
            first_name: update.first_name,
            last_name: update.last_name,
            bio: update.bio,
        })
    }

    async fn get_settings(&self, user_id: Uuid) -> Result<Option<UserSettings>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, time_capsule_enabled, email_notifications, unlock_notifications,
                   notification_frequency, dark_mode, updated_at
            FROM user_settings WHERE user_id = ?
            "#,
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(settings_from_row).transpose()
    }

    async fn upsert_settings(&self, settings: UserSettings) -> Result<UserSettings> {
        sqlx::query(
            r#"
            INSERT INTO user_settings (user_id, time_capsule_enabled, email_notifications,
                                       unlock_notifications, notification_frequency,
                                       dark_mode, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                time_capsule_enabled = excluded.time_capsule_enabled,
                email_notifications = excluded.email_notifications,
                unlock_notifications = excluded.unlock_notifications,
                notification_frequency = excluded.notification_frequency,
                dark_mode = excluded.dark_mode,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(settings.user_id.to_string())
        .bind(settings.time_capsule_enabled as i64)
        .bind(settings.email_notifications as i64)
        .bind(settings.unlock_notifications as i64)
        .bind(settings.notification_frequency.as_str())
        .bind(settings.dark_mode as i64)
        .bind(to_millis(settings.updated_at))
        .execute(&self.db)
        .await?;

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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use echo_common::db::init_memory_database;
    use echo_common::Error;

    async fn store() -> SqliteRecordStore {
        let db = init_memory_database().await.unwrap();
        SqliteRecordStore::new(db, EventBus::new(16))
    }

    fn new_echo(user_id: Uuid, title: &str, created_day: u32, unlock_in_hours: i64) -> NewEcho {
        let created_at = Utc.with_ymd_and_hms(2025, 3, created_day, 10, 0, 0).unwrap();
        NewEcho {
            user_id,
            title: title.to_string(),
            mood: "calm".to_string(),
            created_at,
            unlock_date: created_at + Duration::hours(unlock_in_hours),
            duration_seconds: 30,
            unlocked: false,
            audio_url: format!("http://localhost/blobs/{}.wav", title),
        }
    }

    #[tokio::test]
    async fn test_insert_and_select_newest_first() {
        let store = store().await;
        let owner = Uuid::new_v4();
        store.insert_echo(new_echo(owner, "older", 1, 24)).await.unwrap();
        store.insert_echo(new_echo(owner, "newer", 5, 24)).await.unwrap();
        store.insert_echo(new_echo(Uuid::new_v4(), "other", 6, 24)).await.unwrap();

        let echoes = store
            .select_echoes(&EchoFilter::owner(owner), EchoOrder::CreatedAtDesc)
            .await
            .unwrap();
        let titles: Vec<&str> = echoes.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["newer", "older"]);
    }

    #[tokio::test]
    async fn test_update_only_touches_matching_locked_rows() {
        let store = store().await;
        let owner = Uuid::new_v4();
        let due = store.insert_echo(new_echo(owner, "due", 1, 1)).await.unwrap();
        let later = store.insert_echo(new_echo(owner, "later", 1, 24 * 365)).await.unwrap();

        let now = due.unlock_date + Duration::minutes(1);
        let filter = EchoFilter::owner(owner)
            .with_ids(vec![due.id, later.id])
            .with_unlocked(false)
            .due_by(now);

        let updated = store.update_echoes(&filter, EchoPatch::unlock()).await.unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].id, due.id);
        assert!(updated[0].unlocked);

        let again = store.update_echoes(&filter, EchoPatch::unlock()).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_relock_rejected() {
        let store = store().await;
        let owner = Uuid::new_v4();
        let echo = store.insert_echo(new_echo(owner, "x", 1, 1)).await.unwrap();
        let filter = EchoFilter::owner(owner).with_ids(vec![echo.id]);

        store.update_echoes(&filter, EchoPatch::unlock()).await.unwrap();
        let result = store
            .update_echoes(&filter, EchoPatch { unlocked: Some(false) })
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));

        let stored = store
            .select_echoes(&filter, EchoOrder::default())
            .await
            .unwrap();
        assert!(stored[0].unlocked);
    }

    #[tokio::test]
    async fn test_empty_id_list_matches_nothing() {
        let store = store().await;
        let owner = Uuid::new_v4();
        store.insert_echo(new_echo(owner, "x", 1, 1)).await.unwrap();
        let filter = EchoFilter::owner(owner).with_ids(vec![]);
        assert!(store.select_echoes(&filter, EchoOrder::default()).await.unwrap().is_empty());
        assert!(store.update_echoes(&filter, EchoPatch::unlock()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insert_publishes_change() {
        let store = store().await;
        let mut rx = store.events.subscribe();
        let owner = Uuid::new_v4();
        let echo = store.insert_echo(new_echo(owner, "x", 1, 1)).await.unwrap();

        match rx.recv().await.unwrap() {
            EchoEvent::EchoInserted { echo_id, user_id, .. } => {
                assert_eq!(echo_id, echo.id);
                assert_eq!(user_id, owner);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_profile_update_upserts() {
        let store = store().await;
        let owner = Uuid::new_v4();
        assert!(store.get_profile(owner).await.unwrap().is_none());

        store
            .update_profile(
                owner,
                ProfileUpdate {
                    first_name: "Ada".into(),
                    last_name: "Lovelace".into(),
                    bio: "".into(),
                },
            )
            .await
            .unwrap();

        let profile = store.get_profile(owner).await.unwrap().unwrap();
        assert_eq!(profile.first_name, "Ada");
    }
}
