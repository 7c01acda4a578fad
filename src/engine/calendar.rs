use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::limits::MAX_EDITS_PER_ROOM;
use crate::model::*;
use crate::observability::{self, CALENDAR_EDITS_TOTAL};

use super::{Engine, EngineError};

/// The days of `month` as a half-open stay from the 1st to the 1st of the next month.
pub fn month_range(year: i32, month: u32) -> Result<Stay, EngineError> {
    let invalid = || EngineError::InvalidMonth { year, month };
    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
    let next = if month == 12 {
        year.checked_add(1).and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1))
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(invalid)?;
    Ok(Stay::new(first, next))
}

/// Fold one room's intervals over `range` into a day-by-day state map.
/// Intervals never share a day, so each day takes the state of at most one.
pub(crate) fn fold_room(rs: &RoomState, range: &Stay) -> RoomCalendar {
    let mut days: BTreeMap<NaiveDate, DayState> =
        range.days().map(|day| (day, DayState::Free)).collect();
    for interval in rs.overlapping(range) {
        let state = match interval.kind {
            IntervalKind::Reservation(reservation_id) => DayState::Reserved(reservation_id),
            IntervalKind::OwnerBlock => DayState::Blocked(interval.id),
        };
        if let Some(visible) = interval.stay.clamp_to(range) {
            for day in visible.days() {
                days.insert(day, state);
            }
        }
    }
    RoomCalendar {
        room: rs.room.clone(),
        days,
    }
}

impl Engine {
    /// Per-room, per-day occupancy for one month, rooms by ascending id.
    pub async fn build_month_view(&self, year: i32, month: u32) -> Result<MonthView, EngineError> {
        let range = month_range(year, month)?;
        let mut rooms = Vec::with_capacity(self.store.room_count());
        for id in self.store.room_ids() {
            let guard = self.read_room(id).await?;
            rooms.push(fold_room(&guard, &range));
        }
        Ok(MonthView {
            year,
            month,
            range,
            rooms,
        })
    }

    /// Apply one room's manual-block edits as a single transaction.
    ///
    /// Every removal must name a manual block on this room; every added day
    /// must be free once the removals are accounted for. Any violation
    /// rejects the whole set and nothing is written.
    pub async fn apply_edits(&self, room_id: RoomId, edits: EditSet) -> Result<EditOutcome, EngineError> {
        let result = self.try_apply_edits(room_id, edits).await;
        if let Err(e) = &result {
            debug!("calendar edits rejected on room {room_id}: {e}");
            observability::record_error("apply_edits", e);
        }
        result
    }

    async fn try_apply_edits(&self, room_id: RoomId, edits: EditSet) -> Result<EditOutcome, EngineError> {
        if edits.len() > MAX_EDITS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many calendar edits"));
        }
        let guard = self.lock_room(room_id).await?;
        if edits.is_empty() {
            return Ok(EditOutcome {
                room_id,
                removed: Vec::new(),
                added: Vec::new(),
            });
        }

        for &interval_id in &edits.remove {
            let interval = guard
                .interval(interval_id)
                .ok_or(EngineError::IntervalNotFound { room_id, interval_id })?;
            if let Some(reservation_id) = interval.reservation_id() {
                return Err(EngineError::ForbiddenEdit {
                    interval_id,
                    reservation_id,
                });
            }
        }

        let mut stays = Vec::with_capacity(edits.add.len());
        for &day in &edits.add {
            let stay = Stay::single_day(day).ok_or(EngineError::LimitExceeded("date out of range"))?;
            // Days in a set are distinct, so new blocks can't collide with each other.
            if let Some(existing) = guard
                .overlapping(&stay)
                .find(|i| !edits.remove.contains(&i.id))
            {
                return Err(EngineError::Overlap {
                    room_id,
                    conflicting: existing.id,
                });
            }
            stays.push(stay);
        }

        let added: Vec<Interval> = stays
            .into_iter()
            .map(|stay| Interval {
                id: self.store.allocate_interval_id(),
                room_id,
                stay,
                kind: IntervalKind::OwnerBlock,
            })
            .collect();
        let outcome = EditOutcome {
            room_id,
            removed: edits.remove.iter().copied().collect(),
            added: added.iter().map(|i| i.id).collect(),
        };
        let event = Event::CalendarEdited {
            room_id,
            removed: outcome.removed.clone(),
            added,
        };
        self.persist_and_apply(guard, event).await?;

        metrics::counter!(CALENDAR_EDITS_TOTAL).increment(1);
        info!(
            "room {room_id} calendar: {} blocks lifted, {} added",
            outcome.removed.len(),
            outcome.added.len()
        );
        Ok(outcome)
    }

    /// Apply edit sets for several rooms. Each room commits or fails on its
    /// own; a failure on one room leaves the others' committed edits in place.
    pub async fn apply_edit_batch(
        &self,
        batch: BTreeMap<RoomId, EditSet>,
    ) -> Vec<(RoomId, Result<EditOutcome, EngineError>)> {
        let mut results = Vec::with_capacity(batch.len());
        for (room_id, edits) in batch {
            let result = self.apply_edits(room_id, edits).await;
            results.push((room_id, result));
        }
        results
    }
}
