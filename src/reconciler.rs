use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::engine::Engine;

/// One reconciliation pass: heal every pending occupant reference, then drop
/// idle occupant locks. Returns how many occupants were healed.
pub async fn reconcile_pending(engine: &Engine) -> usize {
    let mut healed = 0;
    for occupant_id in engine.pending_reconciliations() {
        match engine.reconcile_occupant(occupant_id).await {
            Ok(room) => {
                healed += 1;
                debug!("reconciled occupant {occupant_id} → {room:?}");
            }
            // Still pending; the next tick retries.
            Err(e) => warn!("reconcile {occupant_id} failed: {e}"),
        }
    }
    engine.prune_occupant_locks();
    healed
}

/// Background task that periodically heals stale occupant references.
pub async fn run_reconciler(engine: Arc<Engine>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let healed = reconcile_pending(&engine).await;
        if healed > 0 {
            info!("reconciler healed {healed} occupant references");
        }
    }
}

/// Background task that compacts the WAL once enough appends accumulate.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => info!("compacted WAL after {appends} appends"),
            Err(e) => warn!("WAL compaction failed: {e}"),
        }
    }
}

/// Spawn the reconciler and compactor for an engine.
pub fn spawn_background(engine: Arc<Engine>, config: &EngineConfig) -> Vec<JoinHandle<()>> {
    vec![
        tokio::spawn(run_reconciler(engine.clone(), config.reconcile_interval)),
        tokio::spawn(run_compactor(engine, config.compact_threshold)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use ulid::Ulid;

    use crate::directory::{Directory, DirectoryError, InMemoryDirectory, OccupantRecord};
    use crate::model::{NewRoom, RoomType};
    use crate::notify::NotifyHub;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("roomkeep_test_reconciler");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    /// Directory whose reference updates can be switched off.
    struct Outage {
        inner: InMemoryDirectory,
        down: AtomicBool,
    }

    #[async_trait]
    impl Directory for Outage {
        async fn lookup(&self, id: Ulid) -> Result<Option<OccupantRecord>, DirectoryError> {
            self.inner.lookup(id).await
        }

        async fn set_room(&self, id: Ulid, room: Option<Ulid>) -> Result<(), DirectoryError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(DirectoryError("unreachable".into()));
            }
            self.inner.set_room(id, room).await
        }
    }

    #[tokio::test]
    async fn pass_heals_pending_references() {
        let directory = Arc::new(Outage {
            inner: InMemoryDirectory::new(),
            down: AtomicBool::new(true),
        });
        let engine = Engine::new(
            test_wal_path("heal_pending.wal"),
            directory.clone(),
            Arc::new(NotifyHub::new()),
        )
        .unwrap();

        let room_id = Ulid::new();
        engine
            .create_room(room_id, NewRoom::new("R1", 0, 2, RoomType::Double))
            .await
            .unwrap();
        let occupant = Ulid::new();
        directory.inner.register(occupant, "Chen", true);

        engine.assign(room_id, occupant).await.unwrap();
        assert_eq!(engine.pending_reconciliations(), vec![occupant]);
        assert_eq!(directory.inner.get(&occupant).unwrap().room_id, None);

        // Still down: nothing healed, still pending.
        assert_eq!(reconcile_pending(&engine).await, 0);
        assert_eq!(engine.pending_reconciliations(), vec![occupant]);

        directory.down.store(false, Ordering::SeqCst);
        assert_eq!(reconcile_pending(&engine).await, 1);
        assert!(engine.pending_reconciliations().is_empty());
        assert_eq!(directory.inner.get(&occupant).unwrap().room_id, Some(room_id));
    }
}
