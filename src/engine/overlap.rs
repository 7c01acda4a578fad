use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// A stay that can be committed: non-empty, in order, and of bounded length.
pub(crate) fn validate_stay(stay: &Stay) -> Result<(), EngineError> {
    if !stay.is_well_formed() {
        return Err(EngineError::InvalidRange {
            start: stay.start,
            end: stay.end,
        });
    }
    if stay.nights() > MAX_STAY_NIGHTS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(())
}

/// A range that can be queried. Looser than `validate_stay` on length only.
pub(crate) fn validate_window(range: &Stay) -> Result<(), EngineError> {
    if !range.is_well_formed() {
        return Err(EngineError::InvalidRange {
            start: range.start,
            end: range.end,
        });
    }
    if range.nights() > MAX_QUERY_WINDOW_DAYS {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    Ok(())
}

pub(crate) fn check_no_overlap(
    rs: &RoomState,
    stay: &Stay,
    exclude: Option<IntervalId>,
) -> Result<(), EngineError> {
    match rs.first_overlap(stay, exclude) {
        Some(existing) => Err(EngineError::Overlap {
            room_id: rs.room.id,
            conflicting: existing.id,
        }),
        None => Ok(()),
    }
}

/// Presence and size only; format checks belong to the form layer.
pub(crate) fn validate_guest(guest: &GuestInfo) -> Result<(), EngineError> {
    let required = [
        ("first_name", &guest.first_name),
        ("last_name", &guest.last_name),
        ("email", &guest.email),
    ];
    for (name, value) in required {
        if value.trim().is_empty() {
            return Err(EngineError::MissingField(name));
        }
    }
    let all = [&guest.first_name, &guest.last_name, &guest.email, &guest.phone];
    if all.iter().any(|v| v.len() > MAX_GUEST_FIELD_LEN) {
        return Err(EngineError::LimitExceeded("guest field too long"));
    }
    Ok(())
}
