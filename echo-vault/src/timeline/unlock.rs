//! Lock state reconciliation against "now"

use chrono::{DateTime, Utc};
use echo_common::models::{Echo, EchoFilter, EchoPatch};
use echo_common::Result;
use std::collections::HashSet;
use tracing::{debug, info};
use uuid::Uuid;

use crate::services::RecordStore;

/// Records after reconciliation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciled {
    /// Input records with due ones marked unlocked, original order
    pub echoes: Vec<Echo>,
    /// Ids this run flipped in the store
    pub newly_unlocked: Vec<Uuid>,
}

/// Flip `unlocked` for every locked record of `owner` whose unlock date has
/// passed.
///
/// Issues at most one store update, and none when nothing is due, so a
/// repeated run with the same `now` touches nothing.
pub async fn reconcile_unlocks(
    store: &dyn RecordStore,
    owner: Uuid,
    records: Vec<Echo>,
    now: DateTime<Utc>,
) -> Result<Reconciled> {
    let due: Vec<Uuid> = records
        .iter()
        .filter(|e| e.user_id == owner && !e.unlocked && e.is_due(now))
        .map(|e| e.id)
        .collect();

    if due.is_empty() {
        return Ok(Reconciled {
            echoes: records,
            newly_unlocked: Vec::new(),
        });
    }

    debug!("{} echo(es) due for {}", due.len(), owner);
    let filter = EchoFilter::owner(owner)
        .with_ids(due.clone())
        .with_unlocked(false)
        .due_by(now);
    let updated = store.update_echoes(&filter, EchoPatch::unlock()).await?;
    let newly_unlocked: Vec<Uuid> = updated.iter().map(|e| e.id).collect();
    if !newly_unlocked.is_empty() {
        info!("Unlocked {} echo(es) for {}", newly_unlocked.len(), owner);
    }

    // Rows missing from `updated` were unlocked elsewhere; they are unlocked either way
    let due: HashSet<Uuid> = due.into_iter().collect();
    let echoes = records
        .into_iter()
        .map(|mut e| {
            if due.contains(&e.id) {
                e.unlocked = true;
            }
            e
        })
        .collect();

    Ok(Reconciled {
        echoes,
        newly_unlocked,
    })
}

/// The unlocked record with the latest unlock date, ties by latest creation
pub fn select_featured(records: &[Echo]) -> Option<&Echo> {
    records
        .iter()
        .filter(|e| e.unlocked)
        .max_by(|a, b| {
            a.unlock_date
                .cmp(&b.unlock_date)
                .then(a.created_at.cmp(&b.created_at))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::MemoryRecordStore;
    use chrono::{Duration, TimeZone};
    use echo_common::events::EventBus;
    use echo_common::Error;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap()
    }

    fn echo(owner: Uuid, created: DateTime<Utc>, unlock: DateTime<Utc>, unlocked: bool) -> Echo {
        Echo {
            id: Uuid::new_v4(),
            user_id: owner,
            title: "echo".to_string(),
            mood: "calm".to_string(),
            created_at: created,
            unlock_date: unlock,
            duration_seconds: 10,
            unlocked,
            audio_url: String::new(),
        }
    }

    #[tokio::test]
    async fn test_nothing_due_makes_no_update_call() {
        let store = MemoryRecordStore::new(EventBus::new(16));
        let owner = Uuid::new_v4();
        let records = vec![echo(owner, at(1, 0), at(20, 0), false)];

        let result = reconcile_unlocks(&store, owner, records.clone(), at(5, 0))
            .await
            .unwrap();
        assert_eq!(result.echoes, records);
        assert!(result.newly_unlocked.is_empty());
        assert_eq!(store.update_calls(), 0);
    }

    #[tokio::test]
    async fn test_due_records_unlock_once() {
        let store = MemoryRecordStore::new(EventBus::new(16));
        let owner = Uuid::new_v4();
        let due = echo(owner, at(1, 0), at(3, 0), false);
        let later = echo(owner, at(1, 0), at(20, 0), false);
        store.seed(due.clone());
        store.seed(later.clone());

        let first = reconcile_unlocks(&store, owner, vec![due.clone(), later.clone()], at(5, 0))
            .await
            .unwrap();
        assert_eq!(first.newly_unlocked, vec![due.id]);
        assert!(first.echoes[0].unlocked);
        assert!(!first.echoes[1].unlocked);
        assert_eq!(store.update_calls(), 1);

        // Second run over the reconciled set is a no-op
        let second = reconcile_unlocks(&store, owner, first.echoes.clone(), at(5, 0))
            .await
            .unwrap();
        assert_eq!(second.echoes, first.echoes);
        assert!(second.newly_unlocked.is_empty());
        assert_eq!(store.update_calls(), 1);
    }

    #[tokio::test]
    async fn test_unlocked_never_reverts() {
        let store = MemoryRecordStore::new(EventBus::new(16));
        let owner = Uuid::new_v4();
        let record = echo(owner, at(1, 0), at(3, 0), false);
        store.seed(record.clone());

        let unlocked = reconcile_unlocks(&store, owner, vec![record], at(4, 0))
            .await
            .unwrap()
            .echoes;
        // An earlier "now" must not lock it again
        let earlier = reconcile_unlocks(&store, owner, unlocked, at(2, 0))
            .await
            .unwrap();
        assert!(earlier.echoes[0].unlocked);
        assert!(store.all_echoes()[0].unlocked);
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let store = MemoryRecordStore::new(EventBus::new(16));
        store.fail_updates(true);
        let owner = Uuid::new_v4();
        let records = vec![echo(owner, at(1, 0), at(3, 0), false)];

        let result = reconcile_unlocks(&store, owner, records, at(5, 0)).await;
        assert!(matches!(result, Err(Error::Store(_))));
    }

    #[tokio::test]
    async fn test_other_owners_ignored() {
        let store = MemoryRecordStore::new(EventBus::new(16));
        let owner = Uuid::new_v4();
        let foreign = echo(Uuid::new_v4(), at(1, 0), at(3, 0), false);

        let result = reconcile_unlocks(&store, owner, vec![foreign], at(5, 0))
            .await
            .unwrap();
        assert!(!result.echoes[0].unlocked);
        assert_eq!(store.update_calls(), 0);
    }

    #[test]
    fn test_featured_prefers_latest_unlock_then_creation() {
        let owner = Uuid::new_v4();
        let old = echo(owner, at(1, 0), at(3, 0), true);
        let tie_early = echo(owner, at(1, 0), at(4, 0), true);
        let tie_late = echo(owner, at(2, 0), at(4, 0), true);
        let locked = echo(owner, at(2, 0), at(9, 0), false);
        let records = vec![old, tie_late.clone(), tie_early, locked];

        assert_eq!(select_featured(&records).map(|e| e.id), Some(tie_late.id));
    }

    #[test]
    fn test_featured_none_without_unlocked() {
        let owner = Uuid::new_v4();
        let records = vec![echo(owner, at(1, 0), at(1, 0) + Duration::days(3), false)];
        assert!(select_featured(&records).is_none());
        assert!(select_featured(&[]).is_none());
    }
}
