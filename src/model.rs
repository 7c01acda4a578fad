use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub type RoomId = u64;
pub type ReservationId = u64;
pub type IntervalId = u64;

/// Half-open night range `[start, end)`: the guest arrives on `start` and
/// leaves on `end`, so `end` itself is free for the next arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Stay {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Stay {
    /// Builds a stay without checking ordering; the engine rejects
    /// zero-length and inverted stays at the point of use.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// The one-night stay covering `day`. `None` only at the end of the calendar.
    pub fn single_day(day: NaiveDate) -> Option<Self> {
        day.succ_opt().map(|end| Self { start: day, end })
    }

    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn is_well_formed(&self) -> bool {
        self.start < self.end
    }

    pub fn overlaps(&self, other: &Stay) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_day(&self, day: NaiveDate) -> bool {
        self.start <= day && day < self.end
    }

    /// Intersection with `other`, or `None` when they do not overlap.
    pub fn clamp_to(&self, other: &Stay) -> Option<Stay> {
        let clamped = Stay::new(self.start.max(other.start), self.end.min(other.end));
        clamped.is_well_formed().then_some(clamped)
    }

    /// Every night in the stay, in order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d < end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestInfo {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub room_id: RoomId,
    pub guest: GuestInfo,
    pub stay: Stay,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What the request layer hands to the booking committer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationDraft {
    pub room_id: RoomId,
    pub stay: Stay,
    pub guest: GuestInfo,
}

/// Why a room is occupied over an interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntervalKind {
    /// Backs a guest reservation; removed only together with it.
    Reservation(ReservationId),
    /// Operator-placed block with no owning reservation.
    OwnerBlock,
}

/// A single occupancy claim on a room. Reservations and manual blocks are both intervals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub id: IntervalId,
    pub room_id: RoomId,
    pub stay: Stay,
    pub kind: IntervalKind,
}

impl Interval {
    pub fn reservation_id(&self) -> Option<ReservationId> {
        match self.kind {
            IntervalKind::Reservation(id) => Some(id),
            IntervalKind::OwnerBlock => None,
        }
    }

    pub fn is_manual_block(&self) -> bool {
        matches!(self.kind, IntervalKind::OwnerBlock)
    }
}

#[derive(Debug, Clone)]
pub struct RoomState {
    pub room: Room,
    /// All intervals, sorted by `stay.start` and pairwise non-overlapping.
    pub intervals: Vec<Interval>,
    pub reservations: BTreeMap<ReservationId, Reservation>,
}

impl RoomState {
    pub fn new(room: Room) -> Self {
        Self {
            room,
            intervals: Vec::new(),
            reservations: BTreeMap::new(),
        }
    }

    /// Insert keeping sort order. Fails with the id of the interval in the
    /// way if the new one would overlap anything already stored.
    pub fn insert_interval(&mut self, interval: Interval) -> Result<(), IntervalId> {
        if let Some(existing) = self.first_overlap(&interval.stay, None) {
            return Err(existing.id);
        }
        let pos = self
            .intervals
            .binary_search_by_key(&interval.stay.start, |i| i.stay.start)
            .unwrap_or_else(|e| e);
        self.intervals.insert(pos, interval);
        Ok(())
    }

    pub fn remove_interval(&mut self, id: IntervalId) -> Option<Interval> {
        let pos = self.intervals.iter().position(|i| i.id == id)?;
        Some(self.intervals.remove(pos))
    }

    pub fn interval(&self, id: IntervalId) -> Option<&Interval> {
        self.intervals.iter().find(|i| i.id == id)
    }

    pub fn interval_for_reservation(&self, reservation_id: ReservationId) -> Option<&Interval> {
        self.intervals
            .iter()
            .find(|i| i.reservation_id() == Some(reservation_id))
    }

    /// Intervals whose stay overlaps `query`, in start order.
    /// Binary search skips everything starting at or after `query.end`.
    pub fn overlapping(&self, query: &Stay) -> impl Iterator<Item = &Interval> {
        let right_bound = self
            .intervals
            .partition_point(|i| i.stay.start < query.end);
        let query_start = query.start;
        self.intervals[..right_bound]
            .iter()
            .filter(move |i| i.stay.end > query_start)
    }

    pub fn first_overlap(&self, stay: &Stay, exclude: Option<IntervalId>) -> Option<&Interval> {
        self.overlapping(stay).find(|i| Some(i.id) != exclude)
    }

    pub fn exists_overlap(&self, stay: &Stay, exclude: Option<IntervalId>) -> bool {
        self.first_overlap(stay, exclude).is_some()
    }
}

/// Log record format. Every engine write is exactly one event, so a record is
/// the unit of atomicity: replay sees all of it or none of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomCreated {
        room: Room,
    },
    ReservationCommitted {
        reservation: Reservation,
        interval: Interval,
    },
    GuestInfoUpdated {
        id: ReservationId,
        room_id: RoomId,
        guest: GuestInfo,
        updated_at: DateTime<Utc>,
    },
    ReservationProcessed {
        id: ReservationId,
        room_id: RoomId,
        updated_at: DateTime<Utc>,
    },
    ReservationDeleted {
        id: ReservationId,
        room_id: RoomId,
        interval_id: IntervalId,
    },
    CalendarEdited {
        room_id: RoomId,
        removed: Vec<IntervalId>,
        added: Vec<Interval>,
    },
    /// Written at the head of a compacted log so ids of deleted records are never reissued.
    SequencesAdvanced {
        next_reservation_id: ReservationId,
        next_interval_id: IntervalId,
    },
}

impl Event {
    /// The room whose state this event changes, if it is room-scoped.
    pub fn room_id(&self) -> Option<RoomId> {
        match self {
            Event::RoomCreated { room } => Some(room.id),
            Event::ReservationCommitted { reservation, .. } => Some(reservation.room_id),
            Event::GuestInfoUpdated { room_id, .. }
            | Event::ReservationProcessed { room_id, .. }
            | Event::ReservationDeleted { room_id, .. }
            | Event::CalendarEdited { room_id, .. } => Some(*room_id),
            Event::SequencesAdvanced { .. } => None,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

/// Answer to a search over every room or over one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    /// Rooms free for the whole range, by ascending id. Empty when nothing qualifies.
    Rooms(Vec<Room>),
    Room { room_id: RoomId, available: bool },
}

// ── Calendar types ───────────────────────────────────────────────

/// Occupancy of one room on one night. Derived on every request, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayState {
    Free,
    Reserved(ReservationId),
    Blocked(IntervalId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomCalendar {
    pub room: Room,
    /// One entry for every day of the month.
    pub days: BTreeMap<NaiveDate, DayState>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthView {
    pub year: i32,
    pub month: u32,
    /// The month as a stay: first day through the first day of next month.
    pub range: Stay,
    pub rooms: Vec<RoomCalendar>,
}

impl MonthView {
    pub fn state(&self, room_id: RoomId, day: NaiveDate) -> Option<DayState> {
        self.rooms
            .iter()
            .find(|rc| rc.room.id == room_id)
            .and_then(|rc| rc.days.get(&day).copied())
    }

    pub fn days_in_month(&self) -> i64 {
        self.range.nights()
    }
}

/// Operator edits for one room's calendar, built by the request layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditSet {
    /// Manual blocks to lift.
    pub remove: BTreeSet<IntervalId>,
    /// Days to block.
    pub add: BTreeSet<NaiveDate>,
}

impl EditSet {
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.add.is_empty()
    }

    pub fn len(&self) -> usize {
        self.remove.len() + self.add.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOutcome {
    pub room_id: RoomId,
    pub removed: Vec<IntervalId>,
    /// Ids of the new blocks, in date order.
    pub added: Vec<IntervalId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReceipt {
    pub reservation_id: ReservationId,
    pub interval_id: IntervalId,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, day).unwrap()
    }

    fn stay(m1: u32, d1: u32, m2: u32, d2: u32) -> Stay {
        Stay::new(d(m1, d1), d(m2, d2))
    }

    fn room_state() -> RoomState {
        RoomState::new(Room { id: 1, name: "General's Quarters".into() })
    }

    fn block(id: IntervalId, s: Stay) -> Interval {
        Interval { id, room_id: 1, stay: s, kind: IntervalKind::OwnerBlock }
    }

    #[test]
    fn stay_basics() {
        let s = stay(6, 1, 6, 3);
        assert_eq!(s.nights(), 2);
        assert!(s.contains_day(d(6, 1)));
        assert!(s.contains_day(d(6, 2)));
        assert!(!s.contains_day(d(6, 3))); // checkout day is free
        assert_eq!(s.days().collect::<Vec<_>>(), vec![d(6, 1), d(6, 2)]);
    }

    #[test]
    fn stay_well_formed() {
        assert!(stay(6, 1, 6, 2).is_well_formed());
        assert!(!stay(6, 1, 6, 1).is_well_formed());
        assert!(!stay(6, 2, 6, 1).is_well_formed());
    }

    #[test]
    fn stay_overlap_is_half_open() {
        let a = stay(6, 1, 6, 3);
        assert!(a.overlaps(&stay(6, 2, 6, 4)));
        assert!(!a.overlaps(&stay(6, 3, 6, 5)));
        assert!(!stay(6, 3, 6, 5).overlaps(&a));
        assert!(a.overlaps(&stay(5, 1, 7, 1)));
    }

    #[test]
    fn single_day_spans_one_night() {
        let s = Stay::single_day(d(6, 30)).unwrap();
        assert_eq!(s, stay(6, 30, 7, 1));
        assert_eq!(s.nights(), 1);
        assert!(Stay::single_day(NaiveDate::MAX).is_none());
    }

    #[test]
    fn clamp_to_month() {
        let month = stay(6, 1, 7, 1);
        assert_eq!(stay(5, 28, 6, 3).clamp_to(&month), Some(stay(6, 1, 6, 3)));
        assert_eq!(stay(5, 1, 5, 5).clamp_to(&month), None);
    }

    #[test]
    fn intervals_stay_sorted() {
        let mut rs = room_state();
        rs.insert_interval(block(1, stay(6, 10, 6, 11))).unwrap();
        rs.insert_interval(block(2, stay(6, 1, 6, 2))).unwrap();
        rs.insert_interval(block(3, stay(6, 5, 6, 6))).unwrap();
        let starts: Vec<_> = rs.intervals.iter().map(|i| i.stay.start).collect();
        assert_eq!(starts, vec![d(6, 1), d(6, 5), d(6, 10)]);
    }

    #[test]
    fn insert_rejects_overlap_with_conflicting_id() {
        let mut rs = room_state();
        rs.insert_interval(Interval {
            id: 7,
            room_id: 1,
            stay: stay(6, 1, 6, 3),
            kind: IntervalKind::Reservation(1),
        })
        .unwrap();
        assert_eq!(rs.insert_interval(block(8, stay(6, 2, 6, 3))), Err(7));
        assert_eq!(rs.intervals.len(), 1);
        // Block starting on checkout day fits.
        assert!(rs.insert_interval(block(9, stay(6, 3, 6, 4))).is_ok());
    }

    #[test]
    fn overlapping_skips_past_and_future() {
        let mut rs = room_state();
        rs.insert_interval(block(1, stay(5, 1, 5, 2))).unwrap();
        rs.insert_interval(block(2, stay(6, 9, 6, 12))).unwrap();
        rs.insert_interval(block(3, stay(8, 1, 8, 2))).unwrap();
        let hits: Vec<_> = rs.overlapping(&stay(6, 10, 6, 20)).map(|i| i.id).collect();
        assert_eq!(hits, vec![2]);
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        let mut rs = room_state();
        rs.insert_interval(block(1, stay(6, 1, 6, 3))).unwrap();
        assert_eq!(rs.overlapping(&stay(6, 3, 6, 4)).count(), 0);
        assert_eq!(rs.overlapping(&stay(5, 30, 6, 1)).count(), 0);
    }

    #[test]
    fn exists_overlap_honours_exclude() {
        let mut rs = room_state();
        rs.insert_interval(block(4, stay(6, 1, 6, 2))).unwrap();
        assert!(rs.exists_overlap(&stay(6, 1, 6, 2), None));
        assert!(!rs.exists_overlap(&stay(6, 1, 6, 2), Some(4)));
    }

    #[test]
    fn remove_interval_by_id() {
        let mut rs = room_state();
        rs.insert_interval(block(1, stay(6, 1, 6, 2))).unwrap();
        rs.insert_interval(block(2, stay(6, 2, 6, 3))).unwrap();
        assert_eq!(rs.remove_interval(1).map(|i| i.id), Some(1));
        assert!(rs.remove_interval(1).is_none());
        assert_eq!(rs.intervals.len(), 1);
        assert_eq!(rs.intervals[0].id, 2);
    }

    #[test]
    fn interval_for_reservation_finds_backing_interval() {
        let mut rs = room_state();
        rs.insert_interval(block(1, stay(6, 1, 6, 2))).unwrap();
        rs.insert_interval(Interval {
            id: 2,
            room_id: 1,
            stay: stay(6, 5, 6, 8),
            kind: IntervalKind::Reservation(11),
        })
        .unwrap();
        assert_eq!(rs.interval_for_reservation(11).map(|i| i.id), Some(2));
        assert!(rs.interval_for_reservation(12).is_none());
        assert!(rs.interval(1).unwrap().is_manual_block());
    }

    #[test]
    fn edit_set_counts_both_sides() {
        let mut edits = EditSet::default();
        assert!(edits.is_empty());
        edits.remove.insert(3);
        edits.add.insert(d(6, 1));
        edits.add.insert(d(6, 1));
        assert_eq!(edits.len(), 2);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::CalendarEdited {
            room_id: 2,
            removed: vec![5],
            added: vec![block(6, stay(6, 3, 6, 4))],
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
        assert_eq!(decoded.room_id(), Some(2));
    }
}
