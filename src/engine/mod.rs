mod admin;
mod assignment;
mod error;
pub mod invariant;
mod queries;
mod stats;
mod store;

pub use error::{EngineError, ErrorKind, IneligibleReason};
pub use stats::{OccupancyStats, aggregate};
pub use store::{RoomStore, SharedRoom};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, RwLockReadGuard, mpsc, oneshot};
use ulid::Ulid;

use crate::config::EngineConfig;
use crate::directory::Directory;
use crate::limits::{DEFAULT_COMMIT_ATTEMPTS, MAX_COMMIT_ATTEMPTS};
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Owns the WAL. Takes the first queued append, drains whatever else is
/// already queued, fsyncs once, then answers every sender in the batch.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let mut batch = match cmd {
            WalCommand::Append { event, response } => vec![(event, response)],
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        for (_, tx) in batch {
            let r = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = tx.send(r);
        }

        // Non-append commands queued behind the batch run after it is durable.
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after a failed append so half-buffered bytes don't leak into
    // the next batch.
    let flush_result = wal.flush_sync();
    match append_err {
        Some(e) => Err(e),
        None => flush_result,
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result =
                Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// The room occupancy engine: room records, assignment service, and the
/// administrative surface, over a write-ahead log.
///
/// Concurrency model:
/// - each room is an `Arc<RwLock<Room>>`; commits take the write lock and
///   compare the room's `version` against the snapshot the decision was made on
/// - each occupant has an async mutex held for the whole of an assign, remove,
///   reassign or reconcile, so at most one writer touches its room reference
/// - every WAL append happens under a shared hold of the compaction gate;
///   compaction takes it exclusively from snapshot to file swap. The gate is
///   always taken before any room lock.
pub struct Engine {
    pub(super) store: RoomStore,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    pub(super) directory: Arc<dyn Directory>,
    occupant_locks: DashMap<Ulid, Arc<Mutex<()>>>,
    /// Occupants whose directory reference failed to update after a commit.
    pub(super) pending_reconcile: DashSet<Ulid>,
    pub(super) max_commit_attempts: u32,
    compaction_gate: RwLock<()>,
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        directory: Arc<dyn Directory>,
        notify: Arc<NotifyHub>,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            store: RoomStore::new(),
            wal_tx,
            notify,
            directory,
            occupant_locks: DashMap::new(),
            pending_reconcile: DashSet::new(),
            max_commit_attempts: DEFAULT_COMMIT_ATTEMPTS,
            compaction_gate: RwLock::new(()),
        };

        // Sole owner of every lock during replay, so try_write never contends.
        for event in &events {
            match event {
                Event::RoomCreated { .. } => {
                    if let Some(room) = room_from_created(event) {
                        engine.store.insert(room);
                    }
                }
                Event::RoomDeleted { id } => {
                    if let Some(shared) = engine.store.get(id)
                        && let Ok(guard) = shared.try_read()
                    {
                        engine.store.remove(&guard);
                    }
                }
                other => {
                    if let Some(shared) = engine.store.get(&other.room_id())
                        && let Ok(mut guard) = shared.try_write()
                    {
                        engine.store.apply_event(&mut guard, other);
                    }
                }
            }
        }
        tracing::info!(
            "replayed {} events: {} rooms, {} assigned occupants",
            events.len(),
            engine.store.len(),
            engine.store.assigned_count()
        );

        Ok(engine)
    }

    /// Open the engine described by `config`, creating its data directory.
    pub fn open(config: &EngineConfig, directory: Arc<dyn Directory>) -> io::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let engine = Self::new(config.wal_path(), directory, Arc::new(NotifyHub::new()))?;
        Ok(engine.with_max_commit_attempts(config.max_commit_attempts))
    }

    pub fn with_max_commit_attempts(mut self, attempts: u32) -> Self {
        self.max_commit_attempts = attempts.clamp(1, MAX_COMMIT_ATTEMPTS);
        self
    }

    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }

    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Shared hold on the compaction gate. Take it before any room lock and
    /// keep it until the event is appended and applied.
    pub(super) async fn log_gate(&self) -> RwLockReadGuard<'_, ()> {
        self.compaction_gate.read().await
    }

    /// Check the post-state, log, apply, notify. Caller holds the log gate and
    /// the room's write lock.
    pub(super) async fn persist_and_apply(
        &self,
        room: &mut Room,
        event: &Event,
    ) -> Result<(), EngineError> {
        let mut proposed = room.clone();
        store::transition(&mut proposed, event);
        if let Some(violation) = invariant::check_room(&proposed).first() {
            return Err(EngineError::InvariantViolation(violation.to_string()));
        }
        self.wal_append(event).await?;
        self.store.apply_event(room, event);
        self.notify.send(event);
        Ok(())
    }

    /// Compare-and-swap commit of a per-room event. `Ok(None)` means the room
    /// moved past `expected_version` since the caller's snapshot.
    pub(super) async fn commit(
        &self,
        room_id: Ulid,
        expected_version: u64,
        event: &Event,
    ) -> Result<Option<Room>, EngineError> {
        let shared = self
            .store
            .get(&room_id)
            .ok_or(EngineError::RoomNotFound(room_id))?;
        let _gate = self.log_gate().await;
        let mut guard = shared.write().await;
        if !self.store.is_current(&room_id, &shared) {
            return Err(EngineError::RoomNotFound(room_id));
        }
        if guard.version != expected_version {
            return Ok(None);
        }
        self.persist_and_apply(&mut guard, event).await?;
        Ok(Some(guard.clone()))
    }

    /// Serialize all work on one occupant.
    pub(super) async fn lock_occupant(&self, occupant_id: Ulid) -> OwnedMutexGuard<()> {
        let lock = self.occupant_locks.entry(occupant_id).or_default().clone();
        lock.lock_owned().await
    }

    /// Drop mutexes nobody holds or waits on.
    pub fn prune_occupant_locks(&self) -> usize {
        let before = self.occupant_locks.len();
        self.occupant_locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - self.occupant_locks.len()
    }

    /// Rewrite the WAL with the minimal events that recreate current state.
    /// Appends wait until the rewritten file is in place.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _exclusive = self.compaction_gate.write().await;
        let mut events = Vec::new();
        for room in self.store.snapshot_all().await {
            let base_status = if room.status.is_sticky() {
                room.status
            } else {
                RoomStatus::Available
            };
            events.push(Event::RoomCreated {
                id: room.id,
                room_number: room.room_number.clone(),
                floor: room.floor,
                capacity: room.capacity,
                room_type: room.room_type,
                monthly_rent: room.monthly_rent,
                security_deposit: room.security_deposit,
                amenities: room.amenities.clone(),
                description: room.description.clone(),
                status: base_status,
            });
            for occupant_id in &room.occupants {
                events.push(Event::OccupantAssigned {
                    room_id: room.id,
                    occupant_id: *occupant_id,
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

fn room_from_created(event: &Event) -> Option<Room> {
    let Event::RoomCreated {
        id,
        room_number,
        floor,
        capacity,
        room_type,
        monthly_rent,
        security_deposit,
        amenities,
        description,
        status,
    } = event
    else {
        return None;
    };
    Some(Room::new(
        *id,
        &NewRoom {
            room_number: room_number.clone(),
            floor: *floor,
            capacity: *capacity,
            room_type: *room_type,
            monthly_rent: *monthly_rent,
            security_deposit: *security_deposit,
            amenities: amenities.clone(),
            description: description.clone(),
            status: *status,
        },
    ))
}
