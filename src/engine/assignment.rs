use std::time::Instant;

use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::model::*;
use crate::observability::{
    COMMIT_CONFLICTS_TOTAL, COMMIT_RETRIES_TOTAL, OPERATION_DURATION_SECONDS, OPERATIONS_TOTAL,
    PENDING_RECONCILIATIONS, RECONCILE_REPAIRS_TOTAL,
};

use super::invariant::{self, AssignRejection, OccupantState, RemoveRejection};
use super::{Engine, EngineError};

fn record_outcome<T>(op: &'static str, started: Instant, result: &Result<T, EngineError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.label(),
    };
    metrics::counter!(OPERATIONS_TOTAL, "op" => op, "outcome" => outcome).increment(1);
    metrics::histogram!(OPERATION_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());
}

fn assign_rejection(room: &Room, occupant_id: Ulid, rejection: AssignRejection) -> EngineError {
    match rejection {
        AssignRejection::AlreadyFull => EngineError::RoomFull {
            room_id: room.id,
            capacity: room.capacity,
        },
        AssignRejection::RoomNotAvailable => EngineError::RoomNotAvailable {
            room_id: room.id,
            status: room.status,
        },
        AssignRejection::OccupantNotEligible(reason) => {
            EngineError::OccupantNotEligible { occupant_id, reason }
        }
        // Membership is a success path; callers never translate it.
        AssignRejection::AlreadyAssigned => EngineError::InvariantViolation(format!(
            "occupant {occupant_id} already in room {}",
            room.id
        )),
    }
}

impl Engine {
    /// Place an approved, unassigned occupant in a room. Assigning an occupant
    /// to the room it already occupies is a successful no-op.
    pub async fn assign(&self, room_id: Ulid, occupant_id: Ulid) -> Result<Room, EngineError> {
        let started = Instant::now();
        let _occupant = self.lock_occupant(occupant_id).await;
        let result = self.assign_locked(room_id, occupant_id).await;
        record_outcome("assign", started, &result);
        result
    }

    /// Take an occupant out of a room.
    pub async fn remove(&self, room_id: Ulid, occupant_id: Ulid) -> Result<Room, EngineError> {
        let started = Instant::now();
        let _occupant = self.lock_occupant(occupant_id).await;
        let result = self.remove_locked(room_id, occupant_id).await;
        record_outcome("remove", started, &result);
        result
    }

    /// Move an occupant from one room to another: remove, then assign.
    ///
    /// Deterministic destination failures (missing, full, not assignable) are
    /// caught before the source room is touched. If the assign leg still fails
    /// after the remove committed, the occupant is left unassigned and
    /// `PartialReassignment` is returned; the source room is never re-entered.
    pub async fn reassign(
        &self,
        occupant_id: Ulid,
        from: Ulid,
        to: Ulid,
    ) -> Result<Room, EngineError> {
        let started = Instant::now();
        let _occupant = self.lock_occupant(occupant_id).await;
        let result = self.reassign_locked(occupant_id, from, to).await;
        record_outcome("reassign", started, &result);
        result
    }

    /// Remove an occupant from whichever room holds it.
    pub async fn vacate(&self, occupant_id: Ulid) -> Result<Room, EngineError> {
        let started = Instant::now();
        let _occupant = self.lock_occupant(occupant_id).await;
        let result = match self.store.room_of(&occupant_id) {
            Some(room_id) => self.remove_locked(room_id, occupant_id).await,
            None => match self.directory.is_approved_occupant(occupant_id).await {
                Ok(Some(_)) => Err(EngineError::NotAssigned(occupant_id)),
                Ok(None) => Err(EngineError::OccupantNotFound(occupant_id)),
                Err(e) => Err(e.into()),
            },
        };
        record_outcome("vacate", started, &result);
        result
    }

    /// Bring the directory's room reference for an occupant in line with room
    /// membership. Returns the room the occupant is actually in.
    pub async fn reconcile_occupant(&self, occupant_id: Ulid) -> Result<Option<Ulid>, EngineError> {
        let _occupant = self.lock_occupant(occupant_id).await;
        self.reconcile_locked(occupant_id).await
    }

    /// Reconciling read of an occupant's room.
    pub async fn occupant_room(&self, occupant_id: Ulid) -> Result<Option<Ulid>, EngineError> {
        self.reconcile_occupant(occupant_id).await
    }

    /// Occupants whose directory reference is known to be stale.
    pub fn pending_reconciliations(&self) -> Vec<Ulid> {
        self.pending_reconcile.iter().map(|e| *e.key()).collect()
    }

    // ── Locked bodies: caller holds the occupant's mutex ─────

    async fn approval_of(&self, occupant_id: Ulid) -> Result<bool, EngineError> {
        self.directory
            .is_approved_occupant(occupant_id)
            .await?
            .ok_or(EngineError::OccupantNotFound(occupant_id))
    }

    async fn assign_locked(&self, room_id: Ulid, occupant_id: Ulid) -> Result<Room, EngineError> {
        if !self.store.contains(&room_id) {
            return Err(EngineError::RoomNotFound(room_id));
        }
        let approved = self.approval_of(occupant_id).await?;
        self.heal_if_pending(occupant_id).await;

        for attempt in 1..=self.max_commit_attempts {
            let room = self
                .store
                .snapshot(&room_id)
                .await
                .ok_or(EngineError::RoomNotFound(room_id))?;
            let occupant = OccupantState {
                id: occupant_id,
                approved,
                room_id: self.store.room_of(&occupant_id),
            };
            match invariant::can_assign(&room, &occupant) {
                Ok(()) => {}
                Err(AssignRejection::AlreadyAssigned) => {
                    self.sync_reference(occupant_id, Some(room_id)).await;
                    return Ok(room);
                }
                Err(rejection) => return Err(assign_rejection(&room, occupant_id, rejection)),
            }

            let event = Event::OccupantAssigned { room_id, occupant_id };
            if let Some(updated) = self.commit(room_id, room.version, &event).await? {
                self.sync_reference(occupant_id, Some(room_id)).await;
                return Ok(updated);
            }
            debug!("assign {occupant_id} → {room_id}: stale version {}, attempt {attempt}", room.version);
            metrics::counter!(COMMIT_RETRIES_TOTAL).increment(1);
            tokio::task::yield_now().await;
        }

        metrics::counter!(COMMIT_CONFLICTS_TOTAL).increment(1);
        Err(EngineError::Conflict(room_id))
    }

    async fn remove_locked(&self, room_id: Ulid, occupant_id: Ulid) -> Result<Room, EngineError> {
        if !self.store.contains(&room_id) {
            return Err(EngineError::RoomNotFound(room_id));
        }
        self.approval_of(occupant_id).await?;
        self.heal_if_pending(occupant_id).await;

        for attempt in 1..=self.max_commit_attempts {
            let room = self
                .store
                .snapshot(&room_id)
                .await
                .ok_or(EngineError::RoomNotFound(room_id))?;
            if let Err(RemoveRejection::NotAssignedHere) = invariant::can_remove(&room, &occupant_id) {
                return Err(EngineError::NotAssignedHere { room_id, occupant_id });
            }

            let event = Event::OccupantRemoved { room_id, occupant_id };
            if let Some(updated) = self.commit(room_id, room.version, &event).await? {
                self.sync_reference(occupant_id, None).await;
                return Ok(updated);
            }
            debug!("remove {occupant_id} ← {room_id}: stale version {}, attempt {attempt}", room.version);
            metrics::counter!(COMMIT_RETRIES_TOTAL).increment(1);
            tokio::task::yield_now().await;
        }

        metrics::counter!(COMMIT_CONFLICTS_TOTAL).increment(1);
        Err(EngineError::Conflict(room_id))
    }

    async fn reassign_locked(
        &self,
        occupant_id: Ulid,
        from: Ulid,
        to: Ulid,
    ) -> Result<Room, EngineError> {
        if from == to {
            let room = self
                .store
                .snapshot(&from)
                .await
                .ok_or(EngineError::RoomNotFound(from))?;
            self.approval_of(occupant_id).await?;
            if !room.has_occupant(&occupant_id) {
                return Err(EngineError::NotAssignedHere { room_id: from, occupant_id });
            }
            return Ok(room);
        }

        if !self.store.contains(&from) {
            return Err(EngineError::RoomNotFound(from));
        }
        let destination = self
            .store
            .snapshot(&to)
            .await
            .ok_or(EngineError::RoomNotFound(to))?;
        let approved = self.approval_of(occupant_id).await?;
        // Judge the destination as if the remove leg had already happened.
        let moved = OccupantState {
            id: occupant_id,
            approved,
            room_id: None,
        };
        match invariant::can_assign(&destination, &moved) {
            Ok(()) | Err(AssignRejection::AlreadyAssigned) => {}
            Err(rejection) => return Err(assign_rejection(&destination, occupant_id, rejection)),
        }

        self.remove_locked(from, occupant_id).await?;
        match self.assign_locked(to, occupant_id).await {
            Ok(room) => Ok(room),
            Err(cause) => {
                warn!("reassign {occupant_id}: removed from {from}, assign to {to} failed: {cause}");
                Err(EngineError::PartialReassignment {
                    occupant_id,
                    from,
                    to,
                    cause: Box::new(cause),
                })
            }
        }
    }

    // ── Occupant reference maintenance ───────────────────────

    /// Push the committed membership to the directory. A failure leaves the
    /// occupant pending; the next read or the background reconciler heals it.
    async fn sync_reference(&self, occupant_id: Ulid, room_id: Option<Ulid>) {
        match self.directory.set_room(occupant_id, room_id).await {
            Ok(()) => {
                if self.pending_reconcile.remove(&occupant_id).is_some() {
                    metrics::gauge!(PENDING_RECONCILIATIONS).decrement(1.0);
                }
            }
            Err(e) => {
                warn!("occupant {occupant_id}: room reference update failed, queued for reconciliation: {e}");
                if self.pending_reconcile.insert(occupant_id) {
                    metrics::gauge!(PENDING_RECONCILIATIONS).increment(1.0);
                }
            }
        }
    }

    async fn heal_if_pending(&self, occupant_id: Ulid) {
        if !self.pending_reconcile.contains(&occupant_id) {
            return;
        }
        if let Err(e) = self.reconcile_locked(occupant_id).await {
            debug!("occupant {occupant_id}: reconciliation deferred: {e}");
        }
    }

    async fn reconcile_locked(&self, occupant_id: Ulid) -> Result<Option<Ulid>, EngineError> {
        let actual = self.store.room_of(&occupant_id);
        let cached = self.directory.current_room_of(occupant_id).await?;
        if cached != actual {
            self.directory.set_room(occupant_id, actual).await?;
            metrics::counter!(RECONCILE_REPAIRS_TOTAL).increment(1);
            info!("occupant {occupant_id}: repaired room reference {cached:?} → {actual:?}");
        }
        if self.pending_reconcile.remove(&occupant_id).is_some() {
            metrics::gauge!(PENDING_RECONCILIATIONS).decrement(1.0);
        }
        Ok(actual)
    }
}
