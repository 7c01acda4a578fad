use tracing::info;

use crate::model::*;
use crate::observability::{self, RESERVATIONS_DELETED_TOTAL};

use super::overlap::validate_guest;
use super::{Engine, EngineError};

impl Engine {
    /// Replace the guest details on a reservation. Its interval is untouched.
    pub async fn update_guest_info(
        &self,
        id: ReservationId,
        guest: GuestInfo,
    ) -> Result<Reservation, EngineError> {
        validate_guest(&guest)?;
        let guard = self.lock_reservation(id).await?;
        let event = Event::GuestInfoUpdated {
            id,
            room_id: guard.room.id,
            guest,
            updated_at: self.clock.now(),
        };
        let guard = self.persist_and_apply(guard, event).await?;
        guard
            .reservations
            .get(&id)
            .cloned()
            .ok_or(EngineError::ReservationNotFound(id))
    }

    /// Flag a reservation as handled by staff. Already-processed is a no-op.
    pub async fn mark_processed(&self, id: ReservationId) -> Result<(), EngineError> {
        let guard = self.lock_reservation(id).await?;
        if guard.reservations.get(&id).is_some_and(|r| r.processed) {
            return Ok(());
        }
        let event = Event::ReservationProcessed {
            id,
            room_id: guard.room.id,
            updated_at: self.clock.now(),
        };
        self.persist_and_apply(guard, event).await?;
        Ok(())
    }

    /// Delete a reservation and the interval it owns in one record, freeing
    /// its nights. A processed reservation, or one already deleted, is
    /// `ReservationNotFound`.
    pub async fn delete_reservation(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        let result = self.try_delete_reservation(id).await;
        if let Err(e) = &result {
            observability::record_error("delete_reservation", e);
        }
        result
    }

    async fn try_delete_reservation(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        let guard = self.lock_reservation(id).await?;
        let room_id = guard.room.id;
        let reservation = guard
            .reservations
            .get(&id)
            .filter(|r| !r.processed)
            .cloned()
            .ok_or(EngineError::ReservationNotFound(id))?;
        let interval_id = guard
            .interval_for_reservation(id)
            .map(|i| i.id)
            .ok_or_else(|| EngineError::Storage(format!("reservation {id} has no backing interval")))?;

        let event = Event::ReservationDeleted {
            id,
            room_id,
            interval_id,
        };
        self.persist_and_apply(guard, event).await?;

        metrics::counter!(RESERVATIONS_DELETED_TOTAL).increment(1);
        info!(
            "reservation {id} deleted from room {room_id}, freeing [{}, {})",
            reservation.stay.start, reservation.stay.end
        );
        Ok(reservation)
    }
}
