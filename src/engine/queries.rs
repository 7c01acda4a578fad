use crate::model::*;

use super::overlap::validate_window;
use super::{Engine, EngineError};

impl Engine {
    pub async fn list_rooms(&self) -> Result<Vec<Room>, EngineError> {
        let mut rooms = Vec::with_capacity(self.store.room_count());
        for id in self.store.room_ids() {
            rooms.push(self.read_room(id).await?.room.clone());
        }
        Ok(rooms)
    }

    pub async fn get_room(&self, id: RoomId) -> Result<Room, EngineError> {
        Ok(self.read_room(id).await?.room.clone())
    }

    pub async fn get_reservation(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        let room_id = self
            .store
            .room_for_reservation(id)
            .ok_or(EngineError::ReservationNotFound(id))?;
        self.read_room(room_id)
            .await?
            .reservations
            .get(&id)
            .cloned()
            .ok_or(EngineError::ReservationNotFound(id))
    }

    pub async fn get_interval(&self, id: IntervalId) -> Result<Interval, EngineError> {
        let not_found = |room_id| EngineError::IntervalNotFound {
            room_id,
            interval_id: id,
        };
        let room_id = self.store.room_for_interval(id).ok_or_else(|| not_found(0))?;
        self.read_room(room_id)
            .await?
            .interval(id)
            .cloned()
            .ok_or_else(|| not_found(room_id))
    }

    /// Every reservation, ordered by arrival then id.
    pub async fn all_reservations(&self) -> Result<Vec<Reservation>, EngineError> {
        self.collect_reservations(|_| true).await
    }

    /// Reservations staff have not yet marked processed.
    pub async fn new_reservations(&self) -> Result<Vec<Reservation>, EngineError> {
        self.collect_reservations(|r| !r.processed).await
    }

    async fn collect_reservations(
        &self,
        keep: impl Fn(&Reservation) -> bool,
    ) -> Result<Vec<Reservation>, EngineError> {
        let mut out = Vec::new();
        for id in self.store.room_ids() {
            let guard = self.read_room(id).await?;
            out.extend(guard.reservations.values().filter(|r| keep(r)).cloned());
        }
        out.sort_by_key(|r| (r.stay.start, r.id));
        Ok(out)
    }

    /// Intervals on `room_id` overlapping `range`, in start order.
    pub async fn intervals_for_room(&self, room_id: RoomId, range: Stay) -> Result<Vec<Interval>, EngineError> {
        validate_window(&range)?;
        let guard = self.read_room(room_id).await?;
        Ok(guard.overlapping(&range).cloned().collect())
    }

    /// Whether anything on `room_id` other than `exclude` overlaps `stay`.
    pub async fn exists_overlap(
        &self,
        room_id: RoomId,
        stay: Stay,
        exclude: Option<IntervalId>,
    ) -> Result<bool, EngineError> {
        validate_window(&stay)?;
        let guard = self.read_room(room_id).await?;
        Ok(guard.exists_overlap(&stay, exclude))
    }
}
