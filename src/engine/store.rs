use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::RwLock;
use tracing::warn;

use crate::model::*;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

/// In-memory materialisation of the log: one locked `RoomState` per room plus
/// reverse indexes so reservation and interval ids resolve to their room.
pub struct IntervalStore {
    rooms: DashMap<RoomId, SharedRoomState>,
    reservation_to_room: DashMap<ReservationId, RoomId>,
    interval_to_room: DashMap<IntervalId, RoomId>,
    next_reservation_id: AtomicU64,
    next_interval_id: AtomicU64,
}

impl Default for IntervalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IntervalStore {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            reservation_to_room: DashMap::new(),
            interval_to_room: DashMap::new(),
            next_reservation_id: AtomicU64::new(1),
            next_interval_id: AtomicU64::new(1),
        }
    }

    // ── Rooms ────────────────────────────────────────────────

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn get_room(&self, id: RoomId) -> Option<SharedRoomState> {
        self.rooms.get(&id).map(|e| e.value().clone())
    }

    pub fn insert_room(&self, room: Room) {
        self.insert_room_state(RoomState::new(room));
    }

    pub fn insert_room_state(&self, rs: RoomState) {
        self.rooms.insert(rs.room.id, Arc::new(RwLock::new(rs)));
    }

    /// Ascending ids; also the lock order for anything holding several rooms.
    pub fn room_ids(&self) -> Vec<RoomId> {
        let mut ids: Vec<RoomId> = self.rooms.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    // ── Reverse indexes ──────────────────────────────────────

    pub fn room_for_reservation(&self, id: ReservationId) -> Option<RoomId> {
        self.reservation_to_room.get(&id).map(|e| *e.value())
    }

    pub fn room_for_interval(&self, id: IntervalId) -> Option<RoomId> {
        self.interval_to_room.get(&id).map(|e| *e.value())
    }

    // ── Id sequences ─────────────────────────────────────────

    pub fn allocate_reservation_id(&self) -> ReservationId {
        self.next_reservation_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn allocate_interval_id(&self) -> IntervalId {
        self.next_interval_id.fetch_add(1, Ordering::Relaxed)
    }

    /// `(next_reservation_id, next_interval_id)`.
    pub fn next_ids(&self) -> (ReservationId, IntervalId) {
        (
            self.next_reservation_id.load(Ordering::Relaxed),
            self.next_interval_id.load(Ordering::Relaxed),
        )
    }

    pub fn advance_sequences(&self, next_reservation_id: ReservationId, next_interval_id: IntervalId) {
        self.next_reservation_id.fetch_max(next_reservation_id, Ordering::Relaxed);
        self.next_interval_id.fetch_max(next_interval_id, Ordering::Relaxed);
    }

    fn observe_reservation_id(&self, id: ReservationId) {
        self.next_reservation_id.fetch_max(id + 1, Ordering::Relaxed);
    }

    fn observe_interval_id(&self, id: IntervalId) {
        self.next_interval_id.fetch_max(id + 1, Ordering::Relaxed);
    }

    // ── Event application ────────────────────────────────────

    /// Apply a room-scoped event to a room the caller holds exclusively.
    ///
    /// Live writes have already been checked, so the overlap branches only
    /// fire while replaying a log written by something other than this engine.
    pub fn apply_event(&self, rs: &mut RoomState, event: &Event) {
        match event {
            Event::ReservationCommitted { reservation, interval } => {
                self.observe_reservation_id(reservation.id);
                self.observe_interval_id(interval.id);
                if let Err(conflicting) = rs.insert_interval(interval.clone()) {
                    warn!(
                        "skipping reservation {} on room {}: overlaps interval {conflicting}",
                        reservation.id, rs.room.id
                    );
                    return;
                }
                rs.reservations.insert(reservation.id, reservation.clone());
                self.reservation_to_room.insert(reservation.id, rs.room.id);
                self.interval_to_room.insert(interval.id, rs.room.id);
            }
            Event::GuestInfoUpdated { id, guest, updated_at, .. } => {
                if let Some(r) = rs.reservations.get_mut(id) {
                    r.guest = guest.clone();
                    r.updated_at = *updated_at;
                }
            }
            Event::ReservationProcessed { id, updated_at, .. } => {
                if let Some(r) = rs.reservations.get_mut(id) {
                    r.processed = true;
                    r.updated_at = *updated_at;
                }
            }
            Event::ReservationDeleted { id, interval_id, .. } => {
                rs.reservations.remove(id);
                rs.remove_interval(*interval_id);
                self.reservation_to_room.remove(id);
                self.interval_to_room.remove(interval_id);
            }
            Event::CalendarEdited { removed, added, .. } => {
                for id in removed {
                    rs.remove_interval(*id);
                    self.interval_to_room.remove(id);
                }
                for interval in added {
                    self.observe_interval_id(interval.id);
                    match rs.insert_interval(interval.clone()) {
                        Ok(()) => {
                            self.interval_to_room.insert(interval.id, rs.room.id);
                        }
                        Err(conflicting) => warn!(
                            "skipping block {} on room {}: overlaps interval {conflicting}",
                            interval.id, rs.room.id
                        ),
                    }
                }
            }
            // Handled at the map level.
            Event::RoomCreated { .. } | Event::SequencesAdvanced { .. } => {}
        }
    }
}
