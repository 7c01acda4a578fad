use tracing::{debug, info};

use crate::model::*;
use crate::observability::{self, COMMITS_TOTAL};

use super::overlap::{check_no_overlap, validate_guest, validate_stay};
use super::{Engine, EngineError};

impl Engine {
    /// Create a reservation and the interval that occupies its room, as one
    /// durable record.
    ///
    /// The overlap check runs again here under the room's write lock even if
    /// the caller searched first; a prior search reserves nothing.
    pub async fn commit(&self, draft: ReservationDraft) -> Result<CommitReceipt, EngineError> {
        let result = self.try_commit(draft).await;
        match &result {
            Ok(_) => metrics::counter!(COMMITS_TOTAL, "status" => "ok").increment(1),
            Err(e) => {
                metrics::counter!(COMMITS_TOTAL, "status" => e.kind().as_str()).increment(1);
                observability::record_error("commit", e);
            }
        }
        result
    }

    async fn try_commit(&self, draft: ReservationDraft) -> Result<CommitReceipt, EngineError> {
        let ReservationDraft { room_id, stay, guest } = draft;
        validate_stay(&stay)?;
        validate_guest(&guest)?;

        let guard = self.lock_room(room_id).await?;
        if let Err(e) = check_no_overlap(&guard, &stay, None) {
            debug!("commit rejected on room {room_id} for [{}, {}): {e}", stay.start, stay.end);
            return Err(e);
        }

        let reservation_id = self.store.allocate_reservation_id();
        let interval_id = self.store.allocate_interval_id();
        let now = self.clock.now();
        let event = Event::ReservationCommitted {
            reservation: Reservation {
                id: reservation_id,
                room_id,
                guest,
                stay,
                processed: false,
                created_at: now,
                updated_at: now,
            },
            interval: Interval {
                id: interval_id,
                room_id,
                stay,
                kind: IntervalKind::Reservation(reservation_id),
            },
        };
        self.persist_and_apply(guard, event).await?;

        info!(
            "reservation {reservation_id} committed on room {room_id} for [{}, {})",
            stay.start, stay.end
        );
        Ok(CommitReceipt {
            reservation_id,
            interval_id,
        })
    }
}
