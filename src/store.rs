use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

#[derive(Debug)]
pub enum StoreError {
    /// Exclusion check failed: the slot comes within the buffer of these.
    Conflict(Vec<Reservation>),
    /// The stored status moved away from the one the write was based on.
    StatusChanged { id: Ulid, current: BookingStatus },
    NotFound(Ulid),
    Wal(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Conflict(hits) => {
                write!(f, "overlaps {} existing reservation(s)", hits.len())
            }
            StoreError::StatusChanged { id, current } => {
                write!(f, "reservation {id} changed status to {current}")
            }
            StoreError::NotFound(id) => write!(f, "reservation not found: {id}"),
            StoreError::Wal(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Persistence boundary for reservations.
///
/// Implementations must make `insert_reservation` / `update_reservation` an
/// atomic check-and-write: of two racing writes whose spans violate each
/// other's buffered window, at most one succeeds and the other gets
/// `StoreError::Conflict`. The window checked is the incoming reservation's
/// `buffered`, so the buffer in force at write time applies.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn fetch_reservations(
        &self,
        resource_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<Reservation>, StoreError>;

    async fn get_reservation(&self, id: Ulid) -> Result<Option<Reservation>, StoreError>;

    async fn insert_reservation(&self, reservation: Reservation) -> Result<Reservation, StoreError>;

    /// Replace a stored reservation (possibly moving it to another hall/day).
    /// Fails with `StatusChanged` unless the stored status is still `expected`.
    async fn update_reservation(
        &self,
        reservation: Reservation,
        expected: BookingStatus,
    ) -> Result<Reservation, StoreError>;

    /// Compare-and-set on status. `Ok(false)` if the current status is not `expected`.
    async fn transition_status(
        &self,
        id: Ulid,
        expected: BookingStatus,
        next: BookingStatus,
        reason: Option<String>,
        at: NaiveDateTime,
    ) -> Result<bool, StoreError>;

    async fn fetch_by_status(&self, status: BookingStatus) -> Result<Vec<Reservation>, StoreError>;
}

// ── In-memory reference store ───────────────────────────────────

type DayKey = (String, NaiveDate);

/// All reservations of one hall on one day, sorted by start.
#[derive(Debug, Default)]
pub struct DayState {
    reservations: Vec<Reservation>,
}

impl DayState {
    fn insert(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .partition_point(|r| r.span.start <= reservation.span.start);
        self.reservations.insert(pos, reservation);
    }

    fn remove(&mut self, id: Ulid) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == id)?;
        Some(self.reservations.remove(pos))
    }

    fn get_mut(&mut self, id: Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    fn check_status(&self, id: Ulid, expected: BookingStatus) -> Result<(), StoreError> {
        let current = self
            .reservations
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.status)
            .ok_or(StoreError::NotFound(id))?;
        if current != expected {
            return Err(StoreError::StatusChanged { id, current });
        }
        Ok(())
    }

    /// Active reservations that `candidate`'s buffered window reaches.
    fn clashes(&self, candidate: &Reservation) -> Vec<Reservation> {
        if !candidate.is_active() {
            return Vec::new();
        }
        self.reservations
            .iter()
            .filter(|r| r.id != candidate.id && r.is_active())
            .filter(|r| candidate.buffered.overlaps(&r.span))
            .cloned()
            .collect()
    }
}

pub type SharedDay = Arc<RwLock<DayState>>;

/// Reservation store held in memory, one write lock per hall/day, with an
/// optional write-ahead log for durability.
pub struct InMemoryStore {
    days: DashMap<DayKey, SharedDay>,
    /// Reverse lookup: reservation id → hall/day.
    index: DashMap<Ulid, DayKey>,
    wal: Option<Mutex<Wal>>,
    /// Shared by every write, exclusive for compaction.
    write_gate: RwLock<()>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Volatile store; nothing survives a restart.
    pub fn new() -> Self {
        Self {
            days: DashMap::new(),
            index: DashMap::new(),
            wal: None,
            write_gate: RwLock::new(()),
        }
    }

    /// Durable store backed by the log at `path`, replayed on open.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let wal = Wal::open(path)?;
        let restored = fold_events(Wal::replay(path)?);

        let mut by_day: HashMap<DayKey, DayState> = HashMap::new();
        let index = DashMap::new();
        for r in restored.into_values() {
            let key = (r.resource_id.clone(), r.date);
            index.insert(r.id, key.clone());
            by_day.entry(key).or_default().insert(r);
        }
        let days = DashMap::new();
        for (key, state) in by_day {
            days.insert(key, Arc::new(RwLock::new(state)));
        }

        Ok(Self {
            days,
            index,
            wal: Some(Mutex::new(wal)),
            write_gate: RwLock::new(()),
        })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn day(&self, key: &DayKey) -> SharedDay {
        self.days
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RwLock::new(DayState::default())))
            .clone()
    }

    fn existing_day(&self, key: &DayKey) -> Option<SharedDay> {
        self.days.get(key).map(|e| e.value().clone())
    }

    async fn log(&self, event: &Event) -> Result<(), StoreError> {
        if let Some(wal) = &self.wal {
            wal.lock()
                .await
                .append(event)
                .map_err(|e| StoreError::Wal(e.to_string()))?;
        }
        Ok(())
    }

    /// Write lock on the day currently holding `id`. Retries if the
    /// reservation moves between the index lookup and the lock.
    async fn lock_owner_day(
        &self,
        id: Ulid,
    ) -> Result<(DayKey, OwnedRwLockWriteGuard<DayState>), StoreError> {
        for _ in 0..3 {
            let key = self
                .index
                .get(&id)
                .map(|e| e.value().clone())
                .ok_or(StoreError::NotFound(id))?;
            let day = self.existing_day(&key).ok_or(StoreError::NotFound(id))?;
            let guard = day.write_owned().await;
            if guard.reservations.iter().any(|r| r.id == id) {
                return Ok((key, guard));
            }
        }
        Err(StoreError::NotFound(id))
    }

    pub async fn appends_since_compact(&self) -> u64 {
        match &self.wal {
            Some(wal) => wal.lock().await.appends_since_compact(),
            None => 0,
        }
    }

    /// Rewrite the log as one record per reservation held in memory.
    ///
    /// Writes are held off for the duration, so the snapshot and the swap see
    /// the same state.
    pub async fn compact(&self) -> Result<usize, StoreError> {
        let Some(wal) = &self.wal else {
            return Ok(0);
        };
        let _quiet = self.write_gate.write().await;

        let days: Vec<SharedDay> = self.days.iter().map(|e| e.value().clone()).collect();
        let mut snapshot = Vec::with_capacity(self.index.len());
        for day in days {
            let guard = day.read().await;
            snapshot.extend(guard.reservations.iter().cloned());
        }
        snapshot.sort_by_key(|r| r.id);
        let events: Vec<Event> = snapshot.into_iter().map(Event::ReservationRecorded).collect();

        let mut wal = wal.lock().await;
        wal.compact(&events)
            .map_err(|e| StoreError::Wal(e.to_string()))?;
        Ok(events.len())
    }
}

/// Apply log records in order to rebuild the latest reservation states.
fn fold_events(events: Vec<Event>) -> HashMap<Ulid, Reservation> {
    let mut current: HashMap<Ulid, Reservation> = HashMap::new();
    for event in events {
        match event {
            Event::ReservationRecorded(r) => {
                current.insert(r.id, r);
            }
            Event::StatusChanged {
                id,
                status,
                reason,
                at,
            } => {
                if let Some(r) = current.get_mut(&id) {
                    apply_status(r, status, reason, at);
                }
            }
        }
    }
    current
}

fn apply_status(r: &mut Reservation, status: BookingStatus, reason: Option<String>, at: NaiveDateTime) {
    r.status = status;
    if reason.is_some() {
        r.cancellation_reason = reason;
    }
    r.updated_at = at;
}

#[async_trait]
impl ReservationStore for InMemoryStore {
    async fn fetch_reservations(
        &self,
        resource_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<Reservation>, StoreError> {
        let Some(day) = self.existing_day(&(resource_id.to_string(), date)) else {
            return Ok(Vec::new());
        };
        let guard = day.read().await;
        Ok(guard.reservations.clone())
    }

    async fn get_reservation(&self, id: Ulid) -> Result<Option<Reservation>, StoreError> {
        let Some(key) = self.index.get(&id).map(|e| e.value().clone()) else {
            return Ok(None);
        };
        let Some(day) = self.existing_day(&key) else {
            return Ok(None);
        };
        let guard = day.read().await;
        Ok(guard.reservations.iter().find(|r| r.id == id).cloned())
    }

    async fn insert_reservation(&self, reservation: Reservation) -> Result<Reservation, StoreError> {
        let _gate = self.write_gate.read().await;
        let key = (reservation.resource_id.clone(), reservation.date);
        let day = self.day(&key);
        let mut guard = day.write().await;

        let clashes = guard.clashes(&reservation);
        if !clashes.is_empty() {
            return Err(StoreError::Conflict(clashes));
        }

        self.log(&Event::ReservationRecorded(reservation.clone())).await?;
        self.index.insert(reservation.id, key);
        guard.insert(reservation.clone());
        Ok(reservation)
    }

    async fn update_reservation(
        &self,
        reservation: Reservation,
        expected: BookingStatus,
    ) -> Result<Reservation, StoreError> {
        let _gate = self.write_gate.read().await;
        let id = reservation.id;
        let new_key = (reservation.resource_id.clone(), reservation.date);
        let (old_key, mut old_guard) = self.lock_owner_day(id).await?;
        old_guard.check_status(id, expected)?;

        if old_key == new_key {
            let clashes = old_guard.clashes(&reservation);
            if !clashes.is_empty() {
                return Err(StoreError::Conflict(clashes));
            }
            self.log(&Event::ReservationRecorded(reservation.clone())).await?;
            old_guard.remove(id);
            old_guard.insert(reservation.clone());
            return Ok(reservation);
        }

        // Moving to another hall/day: lock both in key order.
        drop(old_guard);
        let old_day = self.existing_day(&old_key).ok_or(StoreError::NotFound(id))?;
        let new_day = self.day(&new_key);
        let (mut old_guard, mut new_guard) = if old_key < new_key {
            let o = old_day.write_owned().await;
            let n = new_day.write_owned().await;
            (o, n)
        } else {
            let n = new_day.write_owned().await;
            let o = old_day.write_owned().await;
            (o, n)
        };
        old_guard.check_status(id, expected)?;
        let clashes = new_guard.clashes(&reservation);
        if !clashes.is_empty() {
            return Err(StoreError::Conflict(clashes));
        }

        self.log(&Event::ReservationRecorded(reservation.clone())).await?;
        old_guard.remove(id);
        new_guard.insert(reservation.clone());
        self.index.insert(id, new_key);
        Ok(reservation)
    }

    async fn transition_status(
        &self,
        id: Ulid,
        expected: BookingStatus,
        next: BookingStatus,
        reason: Option<String>,
        at: NaiveDateTime,
    ) -> Result<bool, StoreError> {
        let _gate = self.write_gate.read().await;
        let (_, mut guard) = self.lock_owner_day(id).await?;
        let current = guard
            .get_mut(id)
            .map(|r| r.status)
            .ok_or(StoreError::NotFound(id))?;
        if current != expected {
            return Ok(false);
        }

        self.log(&Event::StatusChanged {
            id,
            status: next,
            reason: reason.clone(),
            at,
        })
        .await?;
        if let Some(r) = guard.get_mut(id) {
            apply_status(r, next, reason, at);
        }
        Ok(true)
    }

    async fn fetch_by_status(&self, status: BookingStatus) -> Result<Vec<Reservation>, StoreError> {
        let days: Vec<SharedDay> = self.days.iter().map(|e| e.value().clone()).collect();
        let mut found = Vec::new();
        for day in days {
            let guard = day.read().await;
            found.extend(guard.reservations.iter().filter(|r| r.status == status).cloned());
        }
        found.sort_by_key(|r| (r.date, r.span.start, r.id));
        Ok(found)
    }
}
