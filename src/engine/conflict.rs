use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn require_non_empty(field: &'static str, value: &str) -> Result<(), EngineError> {
    if value.is_empty() {
        return Err(EngineError::InvalidInput(format!("{field} cannot be empty")));
    }
    Ok(())
}

pub(crate) fn validate_facility_name(name: &str) -> Result<(), EngineError> {
    require_non_empty("facility name", name)?;
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("facility name too long"));
    }
    Ok(())
}

pub(crate) fn validate_user(user: &str) -> Result<(), EngineError> {
    require_non_empty("user", user)?;
    if user.len() > MAX_USER_LEN {
        return Err(EngineError::LimitExceeded("user name too long"));
    }
    Ok(())
}

/// Reject `span` if any booking on the facility intersects it.
/// `skip` excludes one booking by index (the one being moved).
pub(crate) fn check_no_conflict(
    fs: &FacilityState,
    span: &Span,
    skip: Option<usize>,
) -> Result<(), EngineError> {
    let clash = fs
        .bookings
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != skip)
        .find(|(_, b)| b.span.overlaps(span));
    if let Some((_, b)) = clash {
        metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
        return Err(EngineError::OverlapConflict { user: b.user.clone() });
    }
    Ok(())
}
